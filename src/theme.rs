use ratatui::style::Color;

pub struct Theme {
  pub name: &'static str,
  pub bg: Color,
  pub fg: Color,
  pub accent: Color,
  pub muted: Color,
  pub border: Color,
  pub error: Color,
  pub status: Color,
  pub highlight_bg: Color,
  pub highlight_fg: Color,
  pub key_bg: Color,
  pub key_fg: Color,
  pub stripe_bg: Color,
}

pub const THEMES: [Theme; 3] = [
  Theme {
    name: "pastel",
    bg: Color::Rgb(30, 30, 46),
    fg: Color::Rgb(205, 214, 244),
    accent: Color::Rgb(245, 194, 231),
    muted: Color::Rgb(127, 132, 156),
    border: Color::Rgb(88, 91, 112),
    error: Color::Rgb(243, 139, 168),
    status: Color::Rgb(249, 226, 175),
    highlight_bg: Color::Rgb(69, 71, 90),
    highlight_fg: Color::Rgb(245, 194, 231),
    key_bg: Color::Rgb(180, 190, 254),
    key_fg: Color::Rgb(30, 30, 46),
    stripe_bg: Color::Rgb(36, 36, 54),
  },
  Theme {
    name: "terminal",
    bg: Color::Reset,
    fg: Color::Reset,
    accent: Color::Cyan,
    muted: Color::DarkGray,
    border: Color::Gray,
    error: Color::Red,
    status: Color::Yellow,
    highlight_bg: Color::Blue,
    highlight_fg: Color::White,
    key_bg: Color::Cyan,
    key_fg: Color::Black,
    stripe_bg: Color::Reset,
  },
  Theme {
    name: "paper",
    bg: Color::Rgb(250, 244, 237),
    fg: Color::Rgb(87, 82, 121),
    accent: Color::Rgb(180, 99, 122),
    muted: Color::Rgb(152, 147, 165),
    border: Color::Rgb(206, 202, 205),
    error: Color::Rgb(180, 99, 122),
    status: Color::Rgb(234, 157, 52),
    highlight_bg: Color::Rgb(223, 218, 217),
    highlight_fg: Color::Rgb(40, 105, 131),
    key_bg: Color::Rgb(86, 148, 159),
    key_fg: Color::Rgb(250, 244, 237),
    stripe_bg: Color::Rgb(244, 237, 232),
  },
];

/// Index of the named palette, falling back to the first one.
pub fn theme_index(name: Option<&str>) -> usize {
  name.and_then(|n| THEMES.iter().position(|t| t.name.eq_ignore_ascii_case(n))).unwrap_or(0)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lookup_by_name() {
    assert_eq!(theme_index(Some("paper")), 2);
    assert_eq!(theme_index(Some("Terminal")), 1);
    assert_eq!(theme_index(Some("neon")), 0);
    assert_eq!(theme_index(None), 0);
  }
}
