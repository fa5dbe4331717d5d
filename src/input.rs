use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::session::{Command, Session, ViewState};

// --- Helpers ---

/// Convert a char index to a byte offset within the string.
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
  s.char_indices().nth(char_idx).map_or(s.len(), |(i, _)| i)
}

// --- Event Handling ---

pub fn handle_key_event(session: &mut Session, key: KeyEvent) -> Option<Command> {
  if key.kind == KeyEventKind::Release {
    return None;
  }
  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
    return session.quit();
  }

  if session.fatal.is_some() {
    if key.code == KeyCode::Char('q') {
      return session.quit();
    }
    return None;
  }

  session.status = None;
  match session.view {
    ViewState::SearchInput => handle_search_key(session, key),
    _ => handle_browse_key(session, key),
  }
}

fn handle_search_key(session: &mut Session, key: KeyEvent) -> Option<Command> {
  match key.code {
    KeyCode::Enter => session.submit_search(),
    KeyCode::Esc => session.back(false),
    KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
      let byte_idx = char_to_byte_index(&session.query, session.query_cursor);
      session.query.insert(byte_idx, c);
      session.query_cursor += 1;
      None
    }
    KeyCode::Backspace => {
      if session.query.is_empty() {
        return session.back(false);
      }
      if session.query_cursor > 0 {
        session.query_cursor -= 1;
        let byte_idx = char_to_byte_index(&session.query, session.query_cursor);
        session.query.remove(byte_idx);
      }
      None
    }
    KeyCode::Delete => {
      if session.query_cursor < session.query.chars().count() {
        let byte_idx = char_to_byte_index(&session.query, session.query_cursor);
        session.query.remove(byte_idx);
      }
      None
    }
    KeyCode::Left => {
      session.query_cursor = session.query_cursor.saturating_sub(1);
      None
    }
    KeyCode::Right => {
      if session.query_cursor < session.query.chars().count() {
        session.query_cursor += 1;
      }
      None
    }
    KeyCode::Home => {
      session.query_cursor = 0;
      None
    }
    KeyCode::End => {
      session.query_cursor = session.query.chars().count();
      None
    }
    _ => None,
  }
}

fn handle_browse_key(session: &mut Session, key: KeyEvent) -> Option<Command> {
  match key.code {
    KeyCode::Char('q') => session.quit(),
    KeyCode::Up | KeyCode::Char('k') => session.move_up(),
    KeyCode::Down | KeyCode::Char('j') => session.move_down(),
    KeyCode::PageUp | KeyCode::Left => session.page_up(),
    KeyCode::PageDown | KeyCode::Right => session.page_down(),
    KeyCode::Char('g') => session.jump_to_top(),
    KeyCode::Char('G') => session.jump_to_bottom(),
    KeyCode::Enter => session.select(),
    KeyCode::Backspace | KeyCode::Char('h') => session.back(true),
    KeyCode::Esc => session.back(false),
    KeyCode::Char('p') | KeyCode::Char(' ') => session.play_current(false),
    KeyCode::Char('d') => session.download_current(),
    KeyCode::Char('t') => session.open_thumbnail(),
    KeyCode::Char('s') => session.toggle_sort(),
    KeyCode::Char('/') => session.open_search(),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn press(session: &mut Session, code: KeyCode) -> Option<Command> {
    handle_key_event(session, KeyEvent::new(code, KeyModifiers::NONE))
  }

  fn typing(text: &str) -> Session {
    let mut session = Session::new(80, 16, true);
    press(&mut session, KeyCode::Char('/'));
    for c in text.chars() {
      press(&mut session, KeyCode::Char(c));
    }
    session
  }

  // --- char_to_byte_index ---

  #[test]
  fn char_to_byte_ascii() {
    assert_eq!(char_to_byte_index("hello", 0), 0);
    assert_eq!(char_to_byte_index("hello", 3), 3);
    assert_eq!(char_to_byte_index("hello", 5), 5); // past end
  }

  #[test]
  fn char_to_byte_multibyte() {
    let s = "aé日"; // a=1 byte, é=2 bytes, 日=3 bytes
    assert_eq!(char_to_byte_index(s, 1), 1);
    assert_eq!(char_to_byte_index(s, 2), 3);
    assert_eq!(char_to_byte_index(s, 3), 6); // past end
  }

  // --- Search input ---

  #[test]
  fn edits_in_the_middle_of_the_query() {
    let mut session = typing("rst");
    press(&mut session, KeyCode::Home);
    press(&mut session, KeyCode::Right);
    press(&mut session, KeyCode::Char('u'));
    assert_eq!(session.query, "rust");
    press(&mut session, KeyCode::End);
    press(&mut session, KeyCode::Char('é'));
    press(&mut session, KeyCode::Left);
    press(&mut session, KeyCode::Delete);
    assert_eq!(session.query, "rust");
    assert_eq!(session.query_cursor, 4);
  }

  #[test]
  fn backspace_at_start_of_non_empty_query_stays() {
    let mut session = typing("ab");
    press(&mut session, KeyCode::Home);
    press(&mut session, KeyCode::Backspace);
    assert_eq!(session.view, ViewState::SearchInput);
    assert_eq!(session.query, "ab");
  }

  #[test]
  fn submitted_query_is_trimmed() {
    let mut session = typing("  lo-fi  ");
    let cmd = press(&mut session, KeyCode::Enter);
    assert!(matches!(cmd, Some(Command::Search { ref query, .. }) if query == "lo-fi"));
  }

  #[test]
  fn whitespace_query_is_not_submitted() {
    let mut session = typing("   ");
    assert_eq!(press(&mut session, KeyCode::Enter), None);
    assert_eq!(session.view, ViewState::SearchInput);
  }

  #[test]
  fn release_events_are_ignored() {
    let mut session = typing("");
    let mut key = KeyEvent::new(KeyCode::Char('x'), KeyModifiers::NONE);
    key.kind = KeyEventKind::Release;
    handle_key_event(&mut session, key);
    assert!(session.query.is_empty());
  }

  #[test]
  fn keypress_clears_status() {
    let mut session = Session::new(80, 16, true);
    session.status = Some(crate::session::Status::Info("Downloaded".into()));
    press(&mut session, KeyCode::Down);
    assert!(session.status.is_none());
  }
}
