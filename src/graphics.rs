use image::Pixel;
use ratatui::{
  buffer::Buffer,
  layout::Rect,
  style::{Color, Style},
  widgets::Widget,
};

use crate::display::DisplayMode;
use crate::thumbnail::Thumbnail;

// --- Thumbnail Widget ---

/// Draws a pre-scaled [`Thumbnail`] centred in its area. The bitmap carries
/// two pixel rows per cell, so no resampling happens at draw time.
pub struct ThumbnailWidget<'a> {
  pub thumbnail: &'a Thumbnail,
  pub display_mode: DisplayMode,
}

const ASCII_CHARS: [&str; 10] = [" ", ".", ":", "-", "=", "+", "*", "#", "%", "@"];

impl Widget for ThumbnailWidget<'_> {
  fn render(self, area: Rect, buf: &mut Buffer) {
    if area.is_empty() {
      return;
    }
    match self.display_mode {
      DisplayMode::Direct => render_direct(self.thumbnail, area, buf),
      DisplayMode::Ascii => render_ascii(self.thumbnail, area, buf),
    }
  }
}

/// Cell grid the bitmap covers and its offset inside `area`.
fn placement(thumbnail: &Thumbnail, area: Rect) -> (u16, u16, u16, u16) {
  let cols = (thumbnail.image.width().min(u16::MAX as u32) as u16).min(area.width);
  let rows = (thumbnail.image.height().div_ceil(2).min(u16::MAX as u32) as u16).min(area.height);
  let offset_x = (area.width - cols) / 2;
  let offset_y = (area.height - rows) / 2;
  (cols, rows, offset_x, offset_y)
}

fn render_direct(thumbnail: &Thumbnail, area: Rect, buf: &mut Buffer) {
  let image = &thumbnail.image;
  let (cols, rows, offset_x, offset_y) = placement(thumbnail, area);

  for y in 0..rows {
    for x in 0..cols {
      let upper = image.get_pixel(x as u32, y as u32 * 2);
      let lower_y = y as u32 * 2 + 1;
      let fg = Color::Rgb(upper[0], upper[1], upper[2]);
      let bg = if lower_y < image.height() {
        let lower = image.get_pixel(x as u32, lower_y);
        Color::Rgb(lower[0], lower[1], lower[2])
      } else {
        Color::Reset
      };
      buf.set_string(area.x + offset_x + x, area.y + offset_y + y, "▀", Style::default().fg(fg).bg(bg));
    }
  }
}

fn render_ascii(thumbnail: &Thumbnail, area: Rect, buf: &mut Buffer) {
  let image = &thumbnail.image;
  let (cols, rows, offset_x, offset_y) = placement(thumbnail, area);

  for y in 0..rows {
    for x in 0..cols {
      // Average the two pixels a cell stands for.
      let upper = image.get_pixel(x as u32, y as u32 * 2).to_luma()[0] as u32;
      let lower_y = y as u32 * 2 + 1;
      let lower = if lower_y < image.height() { image.get_pixel(x as u32, lower_y).to_luma()[0] as u32 } else { upper };
      let luma = (upper + lower) / 2;
      let idx = ((luma as f32 / 255.0) * (ASCII_CHARS.len() - 1) as f32).round() as usize;
      let idx = idx.min(ASCII_CHARS.len() - 1);
      buf.set_string(area.x + offset_x + x, area.y + offset_y + y, ASCII_CHARS[idx], Style::default());
    }
  }
}
