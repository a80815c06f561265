use chatbot_core::{MessageRole, ProcessingStatus, Route};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, FocusPane, InputMode, Modal};
use crate::form::{Form, TextInput};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.char_indices().peekable();
    let mut current_text = String::new();

    while let Some((_, c)) = chars.next() {
        if c == '*' && chars.peek().map(|(_, c)| *c) == Some('*') {
            // Consume the second *
            chars.next();

            // Push any accumulated plain text
            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;

            while let Some((_, c)) = chars.next() {
                if c == '*' && chars.peek().map(|(_, c)| *c) == Some('*') {
                    chars.next(); // consume second *
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    // Push any remaining text
    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();
    let route = app.route();

    // Main layout: header, body, banner, footer
    let [header_area, body_area, banner_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match route {
        None => render_loading(frame, body_area),
        Some(Route::Login) => render_auth_form(frame, body_area, " Log in ", &app.login_form),
        Some(Route::Signup) => render_auth_form(frame, body_area, " Sign up ", &app.signup_form),
        Some(Route::Conversations) => render_conversations(app, frame, body_area),
        Some(Route::Account) => render_account(app, frame, body_area),
        Some(Route::DataSources) => render_datasources(app, frame, body_area),
        Some(Route::DataSourceCreate) => render_datasource_create(app, frame, body_area),
        Some(Route::Unauthorized) => render_unauthorized(frame, body_area),
    }

    render_banner(app, frame, banner_area);
    render_footer(app, route, frame, footer_area);

    if let Some(modal) = &app.modal {
        render_modal(modal, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let who = match app.auth.user() {
        Some(user) => format!(" {} ({}) ", user.display_name(), user.role.as_str()),
        None => String::new(),
    };

    let title = Line::from(vec![
        Span::styled(" Chatbot ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(who, Style::default().fg(Color::White)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_banner(app: &mut App, frame: &mut Frame, area: Rect) {
    let line = if let Some(error) = app.current_error() {
        Line::from(vec![
            Span::styled(format!(" {} ", error), Style::default().bg(Color::Red).fg(Color::White)),
            Span::styled(" x dismiss", Style::default().fg(Color::DarkGray)),
        ])
    } else if let Some(notice) = &app.notice {
        Line::from(Span::styled(
            format!(" {} ", notice),
            Style::default().bg(Color::Green).fg(Color::Black),
        ))
    } else {
        Line::default()
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn render_footer(app: &App, route: Option<Route>, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match route {
        None => " ... ",
        Some(Route::Login) => " LOGIN ",
        Some(Route::Signup) => " SIGN UP ",
        Some(Route::Conversations) => " CHAT ",
        Some(Route::Account) => " ACCOUNT ",
        Some(Route::DataSources) | Some(Route::DataSourceCreate) => " SOURCES ",
        Some(Route::Unauthorized) => " DENIED ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);
    let hint = |key: &'static str, label: &'static str| {
        [
            Span::styled(format!(" {} ", key), key_style),
            Span::styled(format!(" {} ", label), label_style),
        ]
    };

    let pairs: Vec<(&'static str, &'static str)> = match (route, app.input_mode) {
        _ if app.modal.is_some() => vec![("Enter", "confirm"), ("Esc", "cancel")],
        (None, _) => vec![("q", "quit")],
        (Some(Route::Login), _) => vec![
            ("Tab", "next field"),
            ("Enter", "log in"),
            ("^T", "sign up"),
            ("^C", "quit"),
        ],
        (Some(Route::Signup), _) => vec![
            ("Tab", "next field"),
            ("Enter", "create account"),
            ("^T", "log in"),
            ("^C", "quit"),
        ],
        (Some(Route::Conversations), InputMode::Editing) => vec![
            ("Enter", "send"),
            ("PgUp/PgDn", "scroll"),
            ("Esc", "done"),
        ],
        (Some(Route::Conversations), InputMode::Normal) => {
            let mut pairs = match app.focus {
                FocusPane::Sidebar => vec![("j/k", "nav"), ("Enter", "open")],
                FocusPane::Chat => vec![("j/k", "scroll")],
            };
            pairs.extend([
                ("Tab", "focus"),
                ("i", "type"),
                ("n", "new"),
                ("r", "rename"),
                ("d", "delete"),
                ("a", "account"),
            ]);
            if app.auth.is_admin() {
                pairs.push(("s", "sources"));
            }
            pairs.extend([("L", "logout"), ("q", "quit")]);
            pairs
        }
        (Some(Route::Account), _) => vec![("Tab", "next field"), ("Enter", "save"), ("Esc", "back")],
        (Some(Route::DataSources), _) => vec![
            ("j/k", "nav"),
            ("n", "new"),
            ("e", "edit"),
            ("p", "process"),
            ("d", "delete"),
            ("r", "refresh"),
            ("Esc", "back"),
        ],
        (Some(Route::DataSourceCreate), _) => vec![
            ("Tab", "next field"),
            ("^T", "file type"),
            ("Enter", "upload"),
            ("Esc", "back"),
        ],
        (Some(Route::Unauthorized), _) => vec![("Esc", "back")],
    };

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    for (key, label) in pairs {
        spans.extend(hint(key, label));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Rectangle of at most `width` x `height` centered in `area`.
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(2));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

fn render_loading(frame: &mut Frame, area: Rect) {
    let text = Paragraph::new("Checking session...")
        .style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC));
    frame.render_widget(text, centered(area, 20, 1));
}

fn render_unauthorized(frame: &mut Frame, area: Rect) {
    let text = Text::from(vec![
        Line::from(Span::styled("Access denied", Style::default().fg(Color::Red).bold())),
        Line::default(),
        Line::from("Only administrators can manage data sources."),
    ]);
    frame.render_widget(Paragraph::new(text), centered(area, 46, 3));
}

/// One bordered single-line input. Puts the terminal cursor in it when `focused`.
fn render_input(
    frame: &mut Frame,
    area: Rect,
    label: &str,
    input: &TextInput,
    secret: bool,
    focused: bool,
) {
    let border_color = if focused { Color::Yellow } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" {} ", label));

    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let (visible, cursor) = input.visible(inner_width);
    let text = if secret {
        "*".repeat(visible.chars().count())
    } else {
        visible
    };

    let paragraph = Paragraph::new(text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);
    frame.render_widget(paragraph, area);

    if focused {
        frame.set_cursor_position((area.x + cursor as u16 + 1, area.y + 1));
    }
}

fn render_form(frame: &mut Frame, area: Rect, form: &Form) {
    let rows = Layout::vertical(
        form.fields
            .iter()
            .map(|_| Constraint::Length(3))
            .chain(std::iter::once(Constraint::Min(0))),
    )
    .split(area);

    for (i, field) in form.fields.iter().enumerate() {
        render_input(
            frame,
            rows[i],
            field.label,
            &field.input,
            field.secret,
            i == form.focused,
        );
    }
}

fn render_auth_form(frame: &mut Frame, area: Rect, title: &str, form: &Form) {
    let height = form.fields.len() as u16 * 3 + 2;
    let popup = centered(area, 50, height);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(title.to_string());
    let inner = block.inner(popup);
    frame.render_widget(block, popup);

    render_form(frame, inner, form);
}

fn render_conversations(app: &mut App, frame: &mut Frame, area: Rect) {
    let [sidebar_area, chat_side] = Layout::horizontal([
        Constraint::Percentage(30),
        Constraint::Percentage(70),
    ])
    .areas(area);

    render_sidebar(app, frame, sidebar_area);

    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(chat_side);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);
    app.sync_chat_scroll();

    render_chat(app, frame, chat_area);

    let editing = app.input_mode == InputMode::Editing;
    let label = if app.messages.is_sending() {
        "Waiting for reply..."
    } else {
        "Message (i to type)"
    };
    render_input(frame, input_area, label, &app.message_input, false, editing);
}

fn render_sidebar(app: &mut App, frame: &mut Frame, area: Rect) {
    let focused = app.focus == FocusPane::Sidebar && app.input_mode == InputMode::Normal;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };
    let list_state = app.conversations.snapshot();
    let open = app.messages.conversation();

    let title = if list_state.loading {
        " Conversations (loading) ".to_string()
    } else {
        format!(" Conversations ({}) ", list_state.items.len())
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    if list_state.items.is_empty() && !list_state.loading {
        let empty = Paragraph::new("No conversations yet.\nPress n to start one.")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let items: Vec<ListItem> = list_state
        .items
        .iter()
        .map(|c| {
            let mut spans = vec![Span::raw(c.title.clone())];
            if list_state.deleting == Some(c.id) {
                spans.push(Span::styled(" (deleting)", Style::default().fg(Color::Red)));
            }
            let style = if open == Some(c.id) {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(Line::from(spans)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.conversation_state);
}

fn render_chat(app: &App, frame: &mut Frame, area: Rect) {
    let focused = app.focus == FocusPane::Chat && app.input_mode == InputMode::Normal;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };
    let state = app.messages.snapshot();

    let title = state
        .conversation
        .and_then(|id| app.conversations.get(id))
        .map(|c| format!(" {} ", c.title))
        .unwrap_or_else(|| " Chat ".to_string());
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    let chat_text = if state.conversation.is_none() {
        Text::from(Span::styled(
            "Select or create a conversation.",
            Style::default().fg(Color::DarkGray),
        ))
    } else if state.loading && state.entries.is_empty() {
        Text::from(Span::styled(
            "Loading messages...",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ))
    } else if state.entries.is_empty() && state.sending == 0 {
        Text::from(Span::styled(
            "Ask the assistant anything...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for entry in &state.entries {
            match entry.message.role {
                MessageRole::User => {
                    let mut role = vec![Span::styled(
                        "You:",
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    )];
                    if entry.is_pending() {
                        role.push(Span::styled(" (sending)", Style::default().fg(Color::DarkGray)));
                    }
                    lines.push(Line::from(role));
                    for line in entry.message.content.lines() {
                        lines.push(Line::from(line.to_string()));
                    }
                    lines.push(Line::default());
                }
                MessageRole::Assistant => {
                    lines.push(Line::from(Span::styled(
                        "Assistant:",
                        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                    )));
                    for line in entry.message.content.lines() {
                        lines.push(parse_markdown_line(line));
                    }
                    lines.push(Line::default());
                }
            }
        }

        if state.sending > 0 {
            lines.push(Line::from(Span::styled(
                "Assistant:",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_account(app: &App, frame: &mut Frame, area: Rect) {
    let Some(user) = app.auth.user() else {
        return;
    };
    let popup = centered(area, 56, app.account_form.fields.len() as u16 * 3 + 5);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Account ");
    let inner = block.inner(popup);
    frame.render_widget(block, popup);

    let [info_area, form_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(0),
    ])
    .areas(inner);

    let info = Text::from(vec![
        Line::from(vec![
            Span::styled("Username: ", Style::default().fg(Color::DarkGray)),
            Span::raw(user.username.clone()),
        ]),
        Line::from(vec![
            Span::styled("Role:     ", Style::default().fg(Color::DarkGray)),
            Span::raw(user.role.as_str()),
        ]),
        Line::from(vec![
            Span::styled("Joined:   ", Style::default().fg(Color::DarkGray)),
            Span::raw(user.date_joined.format("%Y-%m-%d").to_string()),
        ]),
    ]);
    frame.render_widget(Paragraph::new(info), info_area);

    render_form(frame, form_area, &app.account_form);
}

fn status_style(status: ProcessingStatus) -> Style {
    match status {
        ProcessingStatus::Unprocessed => Style::default().fg(Color::DarkGray),
        ProcessingStatus::Processing => Style::default().fg(Color::Yellow),
        ProcessingStatus::Completed => Style::default().fg(Color::Green),
        ProcessingStatus::Failed => Style::default().fg(Color::Red),
    }
}

fn render_datasources(app: &mut App, frame: &mut Frame, area: Rect) {
    let state = app.datasources.snapshot();
    let title = if state.loading {
        " Data sources (loading) ".to_string()
    } else if state.busy {
        " Data sources (working...) ".to_string()
    } else {
        format!(" Data sources ({}) ", state.items.len())
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(title);

    if state.items.is_empty() && !state.loading {
        let empty = Paragraph::new("No data sources. Press n to upload one.")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let items: Vec<ListItem> = state
        .items
        .iter()
        .map(|d| {
            let mut lines = vec![Line::from(vec![
                Span::styled(format!("{:<6}", d.source_type.label()), Style::default().fg(Color::Magenta)),
                Span::styled(d.title.clone(), Style::default().add_modifier(Modifier::BOLD)),
                Span::raw("  "),
                Span::styled(d.processing_status.as_str(), status_style(d.processing_status)),
            ])];
            if !d.description.is_empty() {
                lines.push(Line::from(Span::styled(
                    format!("      {}", d.description),
                    Style::default().fg(Color::DarkGray),
                )));
            }
            ListItem::new(lines)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::Blue).fg(Color::White))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.datasource_state);
}

fn render_datasource_create(app: &App, frame: &mut Frame, area: Rect) {
    let form = &app.datasource_form;
    let popup = centered(area, 64, form.fields.len() as u16 * 3 + 5);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Upload data source ");
    let inner = block.inner(popup);
    frame.render_widget(block, popup);

    let [type_area, form_area, status_area] = Layout::vertical([
        Constraint::Length(2),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(inner);

    let mut type_spans = vec![Span::styled("File type: ", Style::default().fg(Color::DarkGray))];
    for source_type in chatbot_core::SourceType::all() {
        let style = if app.datasource_type == Some(source_type) {
            Style::default().bg(Color::Magenta).fg(Color::White).bold()
        } else {
            Style::default().fg(Color::DarkGray)
        };
        type_spans.push(Span::styled(format!(" {} ", source_type.label()), style));
        type_spans.push(Span::raw(" "));
    }
    frame.render_widget(Paragraph::new(Line::from(type_spans)), type_area);

    render_form(frame, form_area, form);

    if app.datasources.snapshot().busy {
        let status = Paragraph::new("Uploading...")
            .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC));
        frame.render_widget(status, status_area);
    }
}

fn render_modal(modal: &Modal, frame: &mut Frame, area: Rect) {
    match modal {
        Modal::NewConversation { input, error } => {
            render_title_modal(frame, area, " New conversation ", input, error.as_deref())
        }
        Modal::Rename { input, error, .. } => {
            render_title_modal(frame, area, " Rename conversation ", input, error.as_deref())
        }
        Modal::ConfirmDelete { title, .. } => {
            render_confirm(frame, area, " Delete conversation ", title)
        }
        Modal::ConfirmDeleteSource { title, .. } => {
            render_confirm(frame, area, " Delete data source ", title)
        }
        Modal::EditSource { form, .. } => {
            let popup = centered(area, 60, form.fields.len() as u16 * 3 + 2);
            frame.render_widget(Clear, popup);
            let block = Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow))
                .title(" Edit data source ");
            let inner = block.inner(popup);
            frame.render_widget(block, popup);
            render_form(frame, inner, form);
        }
    }
}

fn render_title_modal(
    frame: &mut Frame,
    area: Rect,
    title: &str,
    input: &TextInput,
    error: Option<&str>,
) {
    let popup = centered(area, 60, 6);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(title.to_string());
    let inner = block.inner(popup);
    frame.render_widget(block, popup);

    let [input_area, status_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(inner);

    let count = input.value.chars().count();
    render_input(frame, input_area, &format!("Title {}/50", count), input, false, true);

    let status = match error {
        Some(error) => Paragraph::new(error.to_string()).style(Style::default().fg(Color::Red)),
        None => Paragraph::new("Enter to save, Esc to cancel")
            .style(Style::default().fg(Color::DarkGray)),
    };
    frame.render_widget(status, status_area);
}

fn render_confirm(frame: &mut Frame, area: Rect, title: &str, subject: &str) {
    let popup = centered(area, 50, 5);
    frame.render_widget(Clear, popup);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(title.to_string());

    let text = Text::from(vec![
        Line::from(format!("Delete \"{}\"?", subject)),
        Line::default(),
        Line::from(Span::styled("y confirm   n cancel", Style::default().fg(Color::DarkGray))),
    ]);
    frame.render_widget(Paragraph::new(text).block(block), popup);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_markdown_bold() {
        let line = parse_markdown_line("see **Lisbon** first");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "Lisbon");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_unclosed_bold_is_literal() {
        let line = parse_markdown_line("a **b");
        let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "a **b");
        assert!(line
            .spans
            .iter()
            .all(|s| !s.style.add_modifier.contains(Modifier::BOLD)));
    }

    #[test]
    fn test_centered_stays_inside() {
        let area = Rect::new(0, 0, 100, 40);
        let popup = centered(area, 50, 10);
        assert_eq!(popup, Rect::new(25, 15, 50, 10));

        let tiny = centered(Rect::new(0, 0, 10, 4), 50, 10);
        assert!(tiny.width <= 6 && tiny.height <= 2);
    }
}
