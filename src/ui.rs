use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Layout, Rect},
  style::{Modifier, Style},
  text::{Line, Span},
  widgets::{Block, BorderType, Padding, Paragraph, Wrap},
};

use crate::app::App;
use crate::graphics::ThumbnailWidget;
use crate::session::{Entry, Status, ViewState, thumbnail_size};
use crate::theme::Theme;
use crate::youtube::MediaItem;

// --- Helpers ---

/// Compute the display width of the first `n` chars (accounting for double-width CJK).
pub fn display_width(s: &str, n: usize) -> usize {
  use unicode_width::UnicodeWidthChar;
  s.chars().take(n).map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate a string to `max_width` characters, appending "…" if truncated.
fn truncate_str(s: &str, max_width: usize) -> String {
  if s.chars().count() <= max_width {
    s.to_string()
  } else {
    let truncated: String = s.chars().take(max_width.saturating_sub(1)).collect();
    format!("{}…", truncated)
  }
}

fn pane(theme: &Theme, title: String) -> Block<'_> {
  Block::bordered()
    .title(title)
    .title_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(theme.border))
    .padding(Padding::horizontal(1))
}

/// List pane on the left half, detail pane on the right.
pub fn split_panes(area: Rect) -> [Rect; 2] {
  Layout::horizontal([Constraint::Length(area.width / 2), Constraint::Min(0)]).areas(area)
}

// --- UI Rendering ---

pub fn ui(frame: &mut Frame, app: &mut App) {
  let theme = app.theme();
  frame.render_widget(Block::default().style(Style::default().bg(theme.bg)), frame.area());

  if let Some(reason) = &app.session.fatal {
    render_fatal(frame, theme, reason, frame.area());
    return;
  }

  let [header_area, main_area, status_area, footer_area] =
    Layout::vertical([Constraint::Length(1), Constraint::Min(3), Constraint::Length(1), Constraint::Length(1)])
      .areas(frame.area());
  let [list_area, detail_area] = split_panes(main_area);

  render_header(frame, theme, header_area);
  if app.session.view == ViewState::SearchInput {
    render_search_input(frame, app, list_area);
  } else {
    render_list(frame, app, list_area);
  }
  render_details(frame, app, detail_area);
  render_status(frame, app, status_area);
  render_footer(frame, app, footer_area);
}

fn render_header(frame: &mut Frame, theme: &Theme, area: Rect) {
  let left = Line::from(Span::styled(" ▶ ytui ", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)));
  frame.render_widget(left, area);

  let version = format!("v{} ", env!("CARGO_PKG_VERSION"));
  let right = Line::from(Span::styled(&version, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(version.len() as u16), width: version.len() as u16, ..area };
  frame.render_widget(right, right_area);
}

fn render_fatal(frame: &mut Frame, theme: &Theme, reason: &str, area: Rect) {
  let text = vec![
    Line::from(""),
    Line::from(Span::styled("Something went wrong", Style::default().fg(theme.error).add_modifier(Modifier::BOLD))),
    Line::from(""),
    Line::from(Span::styled(reason, Style::default().fg(theme.fg))),
    Line::from(""),
    Line::from(Span::styled("Press q to quit", Style::default().fg(theme.muted))),
  ];
  let paragraph = Paragraph::new(text).alignment(Alignment::Center).wrap(Wrap { trim: true }).block(
    Block::bordered().border_type(BorderType::Rounded).border_style(Style::default().fg(theme.error)),
  );
  frame.render_widget(paragraph, area);
}

fn list_title(app: &App) -> String {
  let session = &app.session;
  let sorted = if session.sort_by_date { " (sorted by date)" } else { "" };
  match session.view {
    ViewState::MainMenu | ViewState::SearchInput => " Main Menu ".to_string(),
    ViewState::SearchResults => format!(" Search: {} (by relevance) ", session.query.trim()),
    ViewState::Subscriptions => format!(" Subscriptions{} ", sorted),
    ViewState::History => format!(" Watch History{} ", sorted),
  }
}

fn render_list(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let session = &app.session;
  let block = pane(theme, list_title(app));

  let placeholder = if session.is_loading() {
    Some(vec![Line::from(Span::styled("Loading…", Style::default().fg(theme.status)))])
  } else if let Some(err) = &session.load_error {
    Some(vec![
      Line::from(Span::styled(err.as_str(), Style::default().fg(theme.error))),
      Line::from(""),
      Line::from(Span::styled("Press h to go back and try again.", Style::default().fg(theme.muted))),
    ])
  } else if session.items.is_empty() {
    let text = if session.view == ViewState::History { "No watch history yet." } else { "No videos found." };
    Some(vec![Line::from(Span::styled(text, Style::default().fg(theme.muted)))])
  } else {
    None
  };
  if let Some(lines) = placeholder {
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }).block(block), area);
    return;
  }

  // Inner width: area minus 2 borders, 2 padding and 2 for the cursor marker.
  let inner_w = area.width.saturating_sub(6) as usize;
  let count = session.items.len();
  let mut lines = Vec::with_capacity(session.viewport.height + 2);
  if session.viewport.more_above() {
    lines.push(Line::from(Span::styled("↑ more items above", Style::default().fg(theme.muted))));
  }
  for i in session.viewport.visible_range(count) {
    let selected = i == session.cursor;
    let (fg, bg) = if selected {
      (theme.highlight_fg, theme.highlight_bg)
    } else if i % 2 == 1 {
      (theme.fg, theme.stripe_bg)
    } else {
      (theme.fg, theme.bg)
    };
    let marker = if selected { "▶ " } else { "  " };
    let mut style = Style::default().fg(fg).bg(bg);
    if selected {
      style = style.add_modifier(Modifier::BOLD);
    }

    let line = match &session.items[i] {
      Entry::Menu(entry) => Line::from(vec![Span::styled(marker, style), Span::styled(entry.label, style)]),
      Entry::Media(item) => {
        let right = format!("{}  {}", item.duration_label(), item.published_label());
        let right_w = right.chars().count();
        let title = truncate_str(&item.title, inner_w.saturating_sub(right_w + 2));
        let gap = inner_w.saturating_sub(title.chars().count() + right_w);
        Line::from(vec![
          Span::styled(marker, style),
          Span::styled(title, style),
          Span::styled(" ".repeat(gap), style),
          Span::styled(right, Style::default().fg(theme.muted).bg(bg)),
        ])
      }
    };
    lines.push(line);
  }
  if session.viewport.more_below(count) {
    lines.push(Line::from(Span::styled("↓ more items below", Style::default().fg(theme.muted))));
  }

  frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_search_input(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let [input_area, hint_area] = Layout::vertical([Constraint::Length(3), Constraint::Min(0)]).areas(area);
  let input_block = Block::bordered()
    .title(" Search YouTube ")
    .title_style(Style::default().fg(theme.accent))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(theme.accent))
    .padding(Padding::horizontal(1));

  let query = &app.session.query;
  let inner_w = area.width.saturating_sub(4) as usize;
  let cursor_col = display_width(query, app.session.query_cursor);

  app.input_scroll = follow_cursor(app.input_scroll, cursor_col, inner_w);

  let visible: String = query
    .chars()
    .scan(0usize, |col, c| {
      let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
      let start = *col;
      *col += w;
      Some((start, *col, c))
    })
    .skip_while(|(_, end, _)| *end <= app.input_scroll)
    .take_while(|(start, _, _)| *start < app.input_scroll + inner_w)
    .map(|(_, _, c)| c)
    .collect();

  frame.render_widget(Paragraph::new(visible).style(Style::default().fg(theme.fg)).block(input_block), input_area);
  let hint = Paragraph::new(Line::from(Span::styled(
    "Type a query and press Enter. Esc goes back.",
    Style::default().fg(theme.muted),
  )))
  .block(Block::default().padding(Padding::horizontal(1)));
  frame.render_widget(hint, hint_area);

  let cursor_x = input_area.x + 2 + cursor_col.saturating_sub(app.input_scroll) as u16;
  frame.set_cursor_position((cursor_x, input_area.y + 1));
}

/// Scroll offset that keeps `cursor_col` visible in a field `width` columns
/// wide. A zero-width field pins the cursor to its first column.
fn follow_cursor(scroll: usize, cursor_col: usize, width: usize) -> usize {
  if cursor_col < scroll {
    cursor_col
  } else if cursor_col >= scroll + width {
    (cursor_col + 1).saturating_sub(width.max(1))
  } else {
    scroll
  }
}

fn field<'a>(theme: &Theme, label: &'a str, value: String) -> Line<'a> {
  Line::from(vec![
    Span::styled(label, Style::default().fg(theme.muted)),
    Span::styled(value, Style::default().fg(theme.fg)),
  ])
}

fn render_details(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let session = &app.session;
  let block = pane(theme, " Details ".to_string());
  let inner = block.inner(area);
  frame.render_widget(block, area);

  let entry = if session.view == ViewState::SearchInput { None } else { session.items.get(session.cursor) };
  match entry {
    Some(Entry::Menu(menu)) => {
      let lines = vec![
        Line::from(Span::styled(menu.label, Style::default().fg(theme.fg).add_modifier(Modifier::BOLD))),
        Line::from(""),
        Line::from(Span::styled(menu.description, Style::default().fg(theme.muted))),
      ];
      frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), inner);
    }
    Some(Entry::Media(item)) => render_media_details(frame, app, item, inner),
    None => {
      let text = "Select an item to see its details.";
      frame.render_widget(Paragraph::new(Span::styled(text, Style::default().fg(theme.muted))), inner);
    }
  }
}

fn render_media_details(frame: &mut Frame, app: &App, item: &MediaItem, area: Rect) {
  let theme = app.theme();
  let mut text_area = area;

  if let Some(thumbnail) = &app.session.thumbnail
    && thumbnail_size(app.session.width, app.session.height).is_some()
  {
    let height = thumbnail.height.min(area.height);
    let [thumb_area, rest] = Layout::vertical([Constraint::Length(height + 1), Constraint::Min(0)]).areas(area);
    let thumb_area = Rect { height, width: thumbnail.width.min(area.width), ..thumb_area };
    frame.render_widget(ThumbnailWidget { thumbnail: thumbnail.as_ref(), display_mode: app.display_mode }, thumb_area);
    text_area = rest;
  }

  let inner_w = text_area.width as usize;
  let mut lines = vec![
    Line::from(Span::styled(
      truncate_str(&item.title, inner_w),
      Style::default().fg(theme.fg).add_modifier(Modifier::BOLD),
    )),
    field(theme, "Channel:   ", item.author.clone()),
    field(theme, "Duration:  ", item.duration_label()),
  ];
  if !item.views_text.is_empty() {
    lines.push(field(theme, "Views:     ", item.views_text.clone()));
  }
  let published = item.published_label();
  if !published.is_empty() {
    lines.push(field(theme, "Published: ", published));
  }
  lines.push(Line::from(Span::styled(
    truncate_str(&item.watch_url(), inner_w),
    Style::default().fg(theme.accent).add_modifier(Modifier::UNDERLINED),
  )));
  lines.push(Line::from(""));
  lines.push(Line::from(Span::styled("Description:", Style::default().fg(theme.muted))));

  match app.dispatcher.descriptions().get(&item.id) {
    Some(description) if description.is_empty() => {
      lines.push(Line::from(Span::styled("No description.", Style::default().fg(theme.muted))));
    }
    Some(description) => {
      lines.extend(description.lines().map(|l| Line::from(Span::styled(l.to_string(), Style::default().fg(theme.fg)))));
    }
    None => lines.push(Line::from(Span::styled("Loading…", Style::default().fg(theme.status)))),
  }

  frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), text_area);
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let session = &app.session;
  let (text, style) = match &session.status {
    Some(Status::Error(err)) => (format!(" ⚠  {}", err), Style::default().fg(theme.error)),
    Some(Status::Info(msg)) => (format!(" ♪ {}", msg), Style::default().fg(theme.status)),
    None if session.is_loading() => (" ⏳ Loading…".to_string(), Style::default().fg(theme.status)),
    None => (" Ready".to_string(), Style::default().fg(theme.muted)),
  };
  frame.render_widget(Paragraph::new(text).style(style), area);

  let live = app.dispatcher.registry().live_count();
  if live > 0 {
    let label = format!("{} running ", live);
    let right_area =
      Rect { x: area.x + area.width.saturating_sub(label.len() as u16), width: label.len() as u16, ..area };
    frame.render_widget(Line::from(Span::styled(label, Style::default().fg(theme.muted))), right_area);
  }
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let keys: Vec<(&str, &str)> = match app.session.view {
    ViewState::MainMenu => vec![("Enter", "Select"), ("j/k", "Navigate"), ("/", "Search"), ("^t", "Theme"), ("q", "Quit")],
    ViewState::SearchInput => vec![("Enter", "Search"), ("Esc", "Back"), ("^c", "Quit")],
    view => {
      let mut k = vec![("Enter", "Play"), ("p", "Play only"), ("d", "Download"), ("t", "Thumbnail")];
      if view.is_sortable() {
        k.push(("s", "Sort"));
      }
      k.push(("/", "Search"));
      k.push(("h", "Back"));
      k.push(("q", "Quit"));
      k
    }
  };

  let spans: Vec<Span> = keys
    .iter()
    .enumerate()
    .flat_map(|(i, (key, action))| {
      let mut s = vec![
        Span::styled(format!(" {} ", key), Style::default().fg(theme.key_fg).bg(theme.key_bg)),
        Span::styled(format!(" {} ", action), Style::default().fg(theme.muted)),
      ];
      if i < keys.len() - 1 {
        s.push(Span::raw(" "));
      }
      s
    })
    .collect();

  frame.render_widget(Line::from(spans), area);

  let label = format!("{} · {} ", theme.name, app.display_mode.label().to_lowercase());
  let right = Line::from(Span::styled(&label, Style::default().fg(theme.muted)));
  let width = label.chars().count() as u16;
  let right_area = Rect { x: area.x + area.width.saturating_sub(width), width, ..area };
  frame.render_widget(right, right_area);
}
