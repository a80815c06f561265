use chatbot_core::Route;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, FocusPane, InputMode, Modal};
use crate::form::{Form, TextInput};
use crate::tui::AppEvent;

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick_animation();
        }
        AppEvent::Done(completion) => app.on_completion(completion),
        AppEvent::Client(event) => app.on_client_event(event),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    if app.modal.is_some() {
        handle_modal(app, key);
        return;
    }

    match app.route() {
        None => {
            if key.code == KeyCode::Char('q') {
                app.should_quit = true;
            }
        }
        Some(Route::Login) => handle_login(app, key),
        Some(Route::Signup) => handle_signup(app, key),
        Some(Route::Conversations) => match app.input_mode {
            InputMode::Normal => handle_conversations_normal(app, key),
            InputMode::Editing => handle_message_editing(app, key),
        },
        Some(Route::Account) => handle_account(app, key),
        Some(Route::DataSources) => handle_datasources(app, key),
        Some(Route::DataSourceCreate) => handle_datasource_create(app, key),
        Some(Route::Unauthorized) => {
            if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q')) {
                app.navigate(Route::Conversations);
            }
        }
    }
}

/// Apply a text-editing key to `input`. Returns false if the key was not an edit.
fn edit_input(input: &mut TextInput, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => input.insert(c),
        KeyCode::Backspace => input.backspace(),
        KeyCode::Delete => input.delete(),
        KeyCode::Left => input.left(),
        KeyCode::Right => input.right(),
        KeyCode::Home => input.home(),
        KeyCode::End => input.end(),
        _ => return false,
    }
    true
}

/// Field navigation plus editing of the focused field.
fn edit_form(form: &mut Form, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Tab | KeyCode::Down => form.next(),
        KeyCode::BackTab | KeyCode::Up => form.prev(),
        _ => {
            return match form.input() {
                Some(input) => edit_input(input, key),
                None => false,
            }
        }
    }
    true
}

fn handle_login(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => {
            if !app.auth.is_loading() {
                app.submit_login();
            }
        }
        KeyCode::Char('t') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.auth.dismiss_error();
            app.navigate(Route::Signup);
        }
        KeyCode::Esc => app.dismiss_banner(),
        _ => {
            edit_form(&mut app.login_form, key);
        }
    }
}

fn handle_signup(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => {
            if !app.auth.is_loading() {
                app.submit_signup();
            }
        }
        KeyCode::Char('t') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.auth.dismiss_error();
            app.navigate(Route::Login);
        }
        KeyCode::Esc => app.dismiss_banner(),
        _ => {
            edit_form(&mut app.signup_form, key);
        }
    }
}

fn handle_conversations_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        // Quit
        KeyCode::Char('q') => app.should_quit = true,

        // Navigation
        KeyCode::Char('j') | KeyCode::Down => {
            if app.focus == FocusPane::Sidebar {
                app.conversation_nav_down();
            } else {
                app.scroll_chat_down();
            }
        }
        KeyCode::Char('k') | KeyCode::Up => {
            if app.focus == FocusPane::Sidebar {
                app.conversation_nav_up();
            } else {
                app.scroll_chat_up();
            }
        }
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),
        KeyCode::Enter | KeyCode::Char('l') => {
            if app.focus == FocusPane::Sidebar {
                app.open_highlighted();
            }
        }
        KeyCode::Char('h') | KeyCode::Left => app.focus = FocusPane::Sidebar,
        KeyCode::Tab => {
            app.focus = match app.focus {
                FocusPane::Sidebar => FocusPane::Chat,
                FocusPane::Chat => FocusPane::Sidebar,
            };
        }

        // Start typing a message
        KeyCode::Char('i') => {
            if app.messages.conversation().is_some() {
                app.focus = FocusPane::Chat;
                app.input_mode = InputMode::Editing;
            }
        }

        // Conversation actions
        KeyCode::Char('n') => app.open_new_conversation(),
        KeyCode::Char('r') => app.open_rename(),
        KeyCode::Char('d') => app.open_delete(),
        KeyCode::Char('R') => app.load_conversations(),

        // Screen switching
        KeyCode::Char('a') => app.open_account(),
        KeyCode::Char('s') => app.open_datasources(),
        KeyCode::Char('L') => app.logout(),

        KeyCode::Char('x') | KeyCode::Esc => app.dismiss_banner(),
        _ => {}
    }
}

fn handle_message_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Enter => app.send_message(),
        KeyCode::PageUp => app.scroll_chat_up(),
        KeyCode::PageDown => app.scroll_chat_down(),
        _ => {
            edit_input(&mut app.message_input, key);
        }
    }
}

fn handle_account(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.auth.dismiss_error();
            app.notice = None;
            app.navigate(Route::Conversations);
        }
        KeyCode::Enter => {
            if !app.auth.is_loading() {
                app.save_profile();
            }
        }
        _ => {
            edit_form(&mut app.account_form, key);
        }
    }
}

fn handle_datasources(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => app.navigate(Route::Conversations),
        KeyCode::Char('j') | KeyCode::Down => app.datasource_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.datasource_nav_up(),
        KeyCode::Char('p') => app.process_highlighted(),
        KeyCode::Char('e') => app.open_edit_source(),
        KeyCode::Char('d') => app.open_delete_source(),
        KeyCode::Char('n') => app.open_datasource_create(),
        KeyCode::Char('r') => app.load_datasources(),
        KeyCode::Char('x') => app.dismiss_banner(),
        _ => {}
    }
}

fn handle_datasource_create(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.navigate(Route::DataSources),
        KeyCode::Enter => app.submit_datasource(),
        KeyCode::Char('t') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.cycle_source_type(true)
        }
        _ => {
            edit_form(&mut app.datasource_form, key);
        }
    }
}

fn handle_modal(app: &mut App, key: KeyEvent) {
    let Some(modal) = app.modal.as_mut() else {
        return;
    };

    match modal {
        Modal::NewConversation { input, error } | Modal::Rename { input, error, .. } => {
            match key.code {
                KeyCode::Esc => app.modal = None,
                KeyCode::Enter => app.submit_title_modal(),
                _ => {
                    if edit_input(input, key) {
                        *error = None;
                    }
                }
            }
        }
        Modal::ConfirmDelete { .. } => match key.code {
            KeyCode::Char('y') | KeyCode::Enter => app.confirm_delete(),
            KeyCode::Char('n') | KeyCode::Esc => app.modal = None,
            _ => {}
        },
        Modal::ConfirmDeleteSource { .. } => match key.code {
            KeyCode::Char('y') | KeyCode::Enter => app.confirm_delete_source(),
            KeyCode::Char('n') | KeyCode::Esc => app.modal = None,
            _ => {}
        },
        Modal::EditSource { form, .. } => match key.code {
            KeyCode::Esc => app.modal = None,
            KeyCode::Enter => app.submit_edit_source(),
            _ => {
                edit_form(form, key);
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chatbot_core::testing::{conversation, user, Endpoint, FakeBackend};
    use chatbot_core::{
        AuthSession, Backend, ConversationList, DataSourceManager, MessageSession, UserRole,
    };
    use tokio::sync::mpsc;

    fn press(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            handle_event(app, press(KeyCode::Char(c)));
        }
    }

    async fn signed_in(fake: Arc<FakeBackend>) -> (App, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let backend: Arc<dyn Backend> = fake;
        let mut app = App::from_parts(
            AuthSession::new(backend.clone()),
            ConversationList::new(backend.clone()),
            MessageSession::new(backend.clone()),
            DataSourceManager::new(backend),
            tx,
        );
        app.start();
        // AuthResolved, then the conversation list.
        for _ in 0..2 {
            let event = rx.recv().await.unwrap();
            handle_event(&mut app, event);
        }
        (app, rx)
    }

    #[tokio::test]
    async fn test_ctrl_c_quits_from_any_screen() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let backend: Arc<dyn Backend> = Arc::new(FakeBackend::new());
        let mut app = App::from_parts(
            AuthSession::new(backend.clone()),
            ConversationList::new(backend.clone()),
            MessageSession::new(backend.clone()),
            DataSourceManager::new(backend),
            tx,
        );
        handle_event(
            &mut app,
            AppEvent::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
        );
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn test_new_conversation_modal_flow() {
        let fake = Arc::new(FakeBackend::new().signed_in(user(2, "ana", UserRole::User)));
        let (mut app, mut rx) = signed_in(fake.clone()).await;

        handle_event(&mut app, press(KeyCode::Char('n')));
        assert!(matches!(app.modal, Some(Modal::NewConversation { .. })));

        type_text(&mut app, "Trip Planning");
        handle_event(&mut app, press(KeyCode::Enter));
        assert!(app.modal.is_none());

        let event = rx.recv().await.unwrap();
        handle_event(&mut app, event);
        assert_eq!(fake.calls(Endpoint::CreateConversation), 1);
        assert_eq!(app.conversations.items()[0].title, "Trip Planning");
        assert_eq!(app.input_mode, InputMode::Editing);
    }

    #[tokio::test]
    async fn test_typing_in_modal_clears_error() {
        let fake = Arc::new(FakeBackend::new().signed_in(user(2, "ana", UserRole::User)));
        let (mut app, _rx) = signed_in(fake).await;

        handle_event(&mut app, press(KeyCode::Char('n')));
        handle_event(&mut app, press(KeyCode::Enter));
        assert!(matches!(
            app.modal,
            Some(Modal::NewConversation { error: Some(_), .. })
        ));

        type_text(&mut app, "a");
        assert!(matches!(
            app.modal,
            Some(Modal::NewConversation { error: None, .. })
        ));
    }

    #[tokio::test]
    async fn test_escape_leaves_message_input() {
        let fake = Arc::new(
            FakeBackend::new()
                .signed_in(user(2, "ana", UserRole::User))
                .with_conversations(vec![conversation(7, "Trip")]),
        );
        let (mut app, _rx) = signed_in(fake).await;

        handle_event(&mut app, press(KeyCode::Char('i')));
        assert_eq!(app.input_mode, InputMode::Editing);
        type_text(&mut app, "hey");
        assert_eq!(app.message_input.value, "hey");

        handle_event(&mut app, press(KeyCode::Esc));
        assert_eq!(app.input_mode, InputMode::Normal);
    }
}
