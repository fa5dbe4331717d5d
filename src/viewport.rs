//! Viewport arithmetic for the item list.
//!
//! Maps `(cursor, item count, terminal height)` onto the visible window of
//! the list. Pure: the session calls it after every cursor move and every
//! resize, so `offset <= cursor < offset + height` always holds for a
//! non-empty list.

use std::ops::Range;

use crate::constants::constants;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
  pub height: usize,
  pub offset: usize,
}

/// Rows available for list items at a terminal height, never below the floor.
pub fn visible_height(terminal_height: u16) -> usize {
  let c = constants();
  (terminal_height as usize).saturating_sub(c.chrome_rows).max(c.minimum_visible_rows)
}

impl Viewport {
  pub fn new(terminal_height: u16) -> Self {
    Self { height: visible_height(terminal_height), offset: 0 }
  }

  /// Resize to the terminal and scroll just enough to keep `cursor` visible.
  pub fn recompute(&mut self, cursor: usize, terminal_height: u16) {
    self.height = visible_height(terminal_height);
    if cursor < self.offset {
      self.offset = cursor;
    } else if cursor >= self.offset + self.height {
      self.offset = cursor + 1 - self.height;
    }
  }

  pub fn reset(&mut self) {
    self.offset = 0;
  }

  /// Cursor position after jumping to the first item.
  pub fn jump_to_top(&mut self) -> usize {
    self.offset = 0;
    0
  }

  /// Cursor position after jumping to the last item; the last page is shown.
  pub fn jump_to_bottom(&mut self, count: usize) -> usize {
    self.offset = count.saturating_sub(self.height);
    count.saturating_sub(1)
  }

  /// Cursor moved up by one page, clamped to the first item.
  pub fn page_up(&self, cursor: usize) -> usize {
    cursor.saturating_sub(self.height)
  }

  /// Cursor moved down by one page, clamped to the last item.
  pub fn page_down(&self, cursor: usize, count: usize) -> usize {
    (cursor + self.height).min(count.saturating_sub(1))
  }

  /// Indices of the items currently on screen.
  pub fn visible_range(&self, count: usize) -> Range<usize> {
    let start = self.offset.min(count);
    start..(start + self.height).min(count)
  }

  pub fn more_above(&self) -> bool {
    self.offset > 0
  }

  pub fn more_below(&self, count: usize) -> bool {
    self.offset + self.height < count
  }
}
