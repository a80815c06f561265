use std::future::Future;
use std::path::PathBuf;

use chatbot_core::context::AppContext;
use chatbot_core::conversations::validate_title;
use chatbot_core::models::{DataSourceUpdate, LoginCredentials, ProfileUpdate, SignupData};
use chatbot_core::{
    AuthSession, ClientEvent, ConversationId, ConversationList, DataSourceId, DataSourceManager,
    MessageSession, NewDataSource, Navigator, Route, SourceType,
};
use ratatui::widgets::ListState;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::form::{Form, TextInput};
use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Sidebar,
    Chat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Modal {
    NewConversation { input: TextInput, error: Option<String> },
    Rename { id: ConversationId, input: TextInput, error: Option<String> },
    ConfirmDelete { id: ConversationId, title: String },
    EditSource { id: DataSourceId, form: Form },
    ConfirmDeleteSource { id: DataSourceId, title: String },
}

/// Outcome of a spawned backend operation, reported back to the event loop.
///
/// Managers keep their own state and error text; these only carry what the
/// app needs for follow-up navigation.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    AuthResolved,
    LoggedIn { ok: bool, username: String },
    SignedUp { ok: bool },
    LoggedOut { ok: bool },
    ProfileSaved { ok: bool },
    ConversationsLoaded,
    ConversationCreated(Option<ConversationId>),
    ConversationRenamed,
    ConversationDeleted { id: ConversationId, ok: bool },
    MessagesLoaded,
    MessageSent {
        ok: bool,
        conversation: Option<ConversationId>,
        content: String,
    },
    DataSourcesLoaded,
    DataSourceCreated { ok: bool },
    DataSourceChanged,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub navigator: Navigator,
    pub input_mode: InputMode,
    pub focus: FocusPane,
    pub modal: Option<Modal>,
    /// Informational banner, e.g. after the session expired.
    pub notice: Option<String>,

    // Managers
    pub auth: AuthSession,
    pub conversations: ConversationList,
    pub messages: MessageSession,
    pub datasources: DataSourceManager,

    // Forms
    pub login_form: Form,
    pub signup_form: Form,
    pub account_form: Form,
    pub datasource_form: Form,
    pub datasource_type: Option<SourceType>,
    pub message_input: TextInput,

    // List selection
    pub conversation_state: ListState,
    pub datasource_state: ListState,

    // Chat view
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations
    seen_revision: u64,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    /// Username of the last successful login, saved to the config on exit.
    pub last_username: Option<String>,

    events: mpsc::UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(context: &AppContext, events: mpsc::UnboundedSender<AppEvent>) -> Self {
        let mut app = Self::from_parts(
            context.auth().clone(),
            context.conversations(),
            context.messages(),
            context.datasources(),
            events,
        );
        if let Some(username) = &context.config().last_username {
            app.login_form.set("username", username);
            app.login_form.focus("password");
            app.last_username = Some(username.clone());
        }
        app
    }

    pub fn from_parts(
        auth: AuthSession,
        conversations: ConversationList,
        messages: MessageSession,
        datasources: DataSourceManager,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            should_quit: false,
            navigator: Navigator::default(),
            input_mode: InputMode::Normal,
            focus: FocusPane::Sidebar,
            modal: None,
            notice: None,

            auth,
            conversations,
            messages,
            datasources,

            login_form: Form::login(),
            signup_form: Form::signup(),
            account_form: Form::account(),
            datasource_form: Form::datasource(),
            datasource_type: None,
            message_input: TextInput::default(),

            conversation_state: ListState::default(),
            datasource_state: ListState::default(),

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            seen_revision: 0,

            animation_frame: 0,
            last_username: None,
            events,
        }
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let tx = self.events.clone();
        tokio::spawn(async move {
            let completion = task.await;
            let _ = tx.send(AppEvent::Done(completion));
        });
    }

    /// The route to show right now. `None` while the session is resolving.
    pub fn route(&mut self) -> Option<Route> {
        self.navigator.resolve(self.auth.guard_state())
    }

    pub fn navigate(&mut self, route: Route) {
        debug!(route = %route, "Navigate");
        self.navigator.navigate(route);
        self.modal = None;
        self.input_mode = match route {
            Route::Login | Route::Signup | Route::Account | Route::DataSourceCreate => {
                InputMode::Editing
            }
            _ => InputMode::Normal,
        };
    }

    /// Error text for the banner on the current screen.
    pub fn current_error(&mut self) -> Option<String> {
        match self.route()? {
            Route::Login | Route::Signup | Route::Account | Route::Unauthorized => {
                self.auth.error()
            }
            Route::Conversations => self.messages.error().or_else(|| self.conversations.error()),
            Route::DataSources | Route::DataSourceCreate => self.datasources.error(),
        }
    }

    pub fn dismiss_banner(&mut self) {
        self.notice = None;
        match self.route() {
            Some(Route::Conversations) => {
                self.messages.dismiss_error();
                self.conversations.dismiss_error();
            }
            Some(Route::DataSources) | Some(Route::DataSourceCreate) => {
                self.datasources.dismiss_error()
            }
            Some(_) => self.auth.dismiss_error(),
            None => {}
        }
    }

    // ---- session ----------------------------------------------------------

    pub fn start(&self) {
        let auth = self.auth.clone();
        self.spawn(async move {
            auth.resolve().await;
            Completion::AuthResolved
        });
    }

    pub fn submit_login(&mut self) {
        let credentials = LoginCredentials {
            username: self.login_form.value("username").trim().to_string(),
            password: self.login_form.value("password").to_string(),
        };
        let auth = self.auth.clone();
        self.spawn(async move {
            let ok = auth.login(&credentials).await.is_ok();
            Completion::LoggedIn {
                ok,
                username: credentials.username,
            }
        });
    }

    pub fn submit_signup(&mut self) {
        let form = &self.signup_form;
        let data = SignupData {
            username: form.value("username").trim().to_string(),
            email: form.value("email").trim().to_string(),
            password: form.value("password").to_string(),
            password2: form.value("password2").to_string(),
            first_name: form.value("first_name").trim().to_string(),
            last_name: form.value("last_name").trim().to_string(),
        };
        let auth = self.auth.clone();
        self.spawn(async move {
            let ok = auth.signup(&data).await.is_ok();
            Completion::SignedUp { ok }
        });
    }

    pub fn logout(&self) {
        let auth = self.auth.clone();
        self.spawn(async move {
            let ok = auth.logout().await.is_ok();
            Completion::LoggedOut { ok }
        });
    }

    pub fn open_account(&mut self) {
        if let Some(user) = self.auth.user() {
            self.account_form.set("email", &user.email);
            self.account_form.set("first_name", &user.first_name);
            self.account_form.set("last_name", &user.last_name);
            self.account_form.focused = 0;
        }
        self.auth.dismiss_error();
        self.navigate(Route::Account);
    }

    pub fn save_profile(&mut self) {
        let Some(user) = self.auth.user() else {
            return;
        };
        let changed = |key: &str, current: &str| {
            let value = self.account_form.value(key).trim();
            (value != current).then(|| value.to_string())
        };
        let update = ProfileUpdate {
            email: changed("email", &user.email),
            first_name: changed("first_name", &user.first_name),
            last_name: changed("last_name", &user.last_name),
        };
        if update.is_empty() {
            self.notice = Some("Nothing to update".to_string());
            return;
        }

        let auth = self.auth.clone();
        self.spawn(async move {
            let ok = auth.update_profile(&update).await.is_ok();
            Completion::ProfileSaved { ok }
        });
    }

    fn after_sign_in(&mut self) {
        self.login_form.clear_secrets();
        self.signup_form.reset();
        self.notice = None;
        if matches!(self.navigator.requested(), Route::Login | Route::Signup) {
            self.navigate(Route::Conversations);
        }
        self.load_conversations();
    }

    /// The backend rejected our session: drop it and show the login form.
    /// Any 401 lands on `/login`, whichever screen triggered it.
    pub fn on_client_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Unauthorized => {
                if self.auth.is_signed_in() {
                    info!("Session expired");
                    self.auth.sign_out_locally();
                    self.messages.clear();
                    self.notice =
                        Some("Your session has expired. Please log in again.".to_string());
                }
                self.navigator.on_unauthorized();
                self.modal = None;
                self.input_mode = InputMode::Editing;
            }
        }
    }

    // ---- conversations ----------------------------------------------------

    pub fn load_conversations(&self) {
        let conversations = self.conversations.clone();
        self.spawn(async move {
            let _ = conversations.load().await;
            Completion::ConversationsLoaded
        });
    }

    pub fn select_conversation(&mut self, id: ConversationId) {
        self.messages.select(id);
        self.chat_scroll = 0;
        self.sync_sidebar_selection();
        let messages = self.messages.clone();
        self.spawn(async move {
            let _ = messages.load().await;
            Completion::MessagesLoaded
        });
    }

    /// Open the conversation highlighted in the sidebar.
    pub fn open_highlighted(&mut self) {
        let items = self.conversations.items();
        if let Some(conversation) = self.conversation_state.selected().and_then(|i| items.get(i)) {
            let id = conversation.id;
            if self.messages.conversation() != Some(id) {
                self.select_conversation(id);
            }
            self.focus = FocusPane::Chat;
        }
    }

    pub fn highlighted_conversation(&self) -> Option<(ConversationId, String)> {
        let items = self.conversations.items();
        self.conversation_state
            .selected()
            .and_then(|i| items.get(i))
            .map(|c| (c.id, c.title.clone()))
    }

    fn sync_sidebar_selection(&mut self) {
        let items = self.conversations.items();
        let index = self
            .messages
            .conversation()
            .and_then(|id| items.iter().position(|c| c.id == id))
            .or(if items.is_empty() { None } else { Some(0) });
        self.conversation_state.select(index);
    }

    pub fn conversation_nav_down(&mut self) {
        let len = self.conversations.items().len();
        if len > 0 {
            let i = self.conversation_state.selected().unwrap_or(0);
            self.conversation_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn conversation_nav_up(&mut self) {
        let i = self.conversation_state.selected().unwrap_or(0);
        self.conversation_state.select(Some(i.saturating_sub(1)));
    }

    pub fn open_new_conversation(&mut self) {
        self.modal = Some(Modal::NewConversation {
            input: TextInput::default(),
            error: None,
        });
    }

    pub fn open_rename(&mut self) {
        if let Some((id, title)) = self.highlighted_conversation() {
            self.modal = Some(Modal::Rename {
                id,
                input: TextInput::with_value(&title),
                error: None,
            });
        }
    }

    pub fn open_delete(&mut self) {
        if let Some((id, title)) = self.highlighted_conversation() {
            self.modal = Some(Modal::ConfirmDelete { id, title });
        }
    }

    /// Submit the open create/rename modal. Invalid titles keep it open.
    pub fn submit_title_modal(&mut self) {
        let Some(modal) = self.modal.as_mut() else {
            return;
        };
        let (target, input, error) = match modal {
            Modal::NewConversation { input, error } => (None, input, error),
            Modal::Rename { id, input, error } => (Some(*id), input, error),
            _ => return,
        };
        if let Err(err) = validate_title(&input.value) {
            *error = Some(err.to_string());
            return;
        }

        let title = input.value.clone();
        let conversations = self.conversations.clone();
        self.modal = None;
        match target {
            None => self.spawn(async move {
                let id = conversations.create(&title).await.ok().map(|c| c.id);
                Completion::ConversationCreated(id)
            }),
            Some(id) => self.spawn(async move {
                let _ = conversations.rename(id, &title).await;
                Completion::ConversationRenamed
            }),
        }
    }

    pub fn confirm_delete(&mut self) {
        if let Some(Modal::ConfirmDelete { id, .. }) = self.modal.take() {
            let conversations = self.conversations.clone();
            self.spawn(async move {
                let ok = conversations.delete(id).await.is_ok();
                Completion::ConversationDeleted { id, ok }
            });
        }
    }

    // ---- messages ---------------------------------------------------------

    /// Send the input box. Ignored while an earlier send is outstanding.
    pub fn send_message(&mut self) {
        if self.messages.is_sending() {
            return;
        }
        let content = self.message_input.take();
        let conversation = self.messages.conversation();
        let messages = self.messages.clone();
        self.spawn(async move {
            let ok = messages.send(&content).await.is_ok();
            Completion::MessageSent { ok, conversation, content }
        });
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.messages.is_sending() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Scroll to the newest message whenever the message list changed.
    pub fn sync_chat_scroll(&mut self) {
        let revision = self.messages.revision();
        if revision != self.seen_revision {
            self.seen_revision = revision;
            self.scroll_chat_to_bottom();
        }
    }

    pub fn scroll_chat_to_bottom(&mut self) {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: usize = 0;

        for entry in self.messages.entries() {
            total_lines = total_lines.saturating_add(1); // Role line ("You:" or "Assistant:")
            for line in entry.message.content.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                total_lines = total_lines.saturating_add(char_count / wrap_width + 1);
            }
            total_lines = total_lines.saturating_add(1); // Blank line after message
        }

        if self.messages.is_sending() {
            total_lines = total_lines.saturating_add(2); // "Assistant:" + "Thinking..."
        }

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        let total_lines = u16::try_from(total_lines).unwrap_or(u16::MAX);
        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }

    pub fn scroll_chat_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_chat_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1);
    }

    // ---- datasources ------------------------------------------------------

    pub fn open_datasources(&mut self) {
        self.navigate(Route::DataSources);
        if self.route() == Some(Route::DataSources) {
            self.load_datasources();
        }
    }

    pub fn open_datasource_create(&mut self) {
        self.datasource_form.reset();
        self.datasource_type = None;
        self.datasources.dismiss_error();
        self.navigate(Route::DataSourceCreate);
    }

    pub fn load_datasources(&self) {
        let datasources = self.datasources.clone();
        self.spawn(async move {
            let _ = datasources.list().await;
            Completion::DataSourcesLoaded
        });
    }

    pub fn cycle_source_type(&mut self, forward: bool) {
        let all = SourceType::all();
        let current = self
            .datasource_type
            .and_then(|t| all.iter().position(|a| *a == t));
        let next = match (current, forward) {
            (None, true) => 0,
            (None, false) => all.len() - 1,
            (Some(i), true) => (i + 1) % all.len(),
            (Some(i), false) => (i + all.len() - 1) % all.len(),
        };
        self.datasource_type = all.get(next).copied();
    }

    pub fn submit_datasource(&mut self) {
        let file = self.datasource_form.value("file").trim();
        let form = NewDataSource {
            title: self.datasource_form.value("title").to_string(),
            source_type: self.datasource_type,
            description: self.datasource_form.value("description").to_string(),
            file: (!file.is_empty()).then(|| expand_home(file)),
        };
        let datasources = self.datasources.clone();
        self.spawn(async move {
            let ok = datasources.create(&form).await.is_ok();
            Completion::DataSourceCreated { ok }
        });
    }

    pub fn highlighted_datasource(&self) -> Option<(DataSourceId, String)> {
        let items = self.datasources.items();
        self.datasource_state
            .selected()
            .and_then(|i| items.get(i))
            .map(|d| (d.id, d.title.clone()))
    }

    pub fn datasource_nav_down(&mut self) {
        let len = self.datasources.items().len();
        if len > 0 {
            let i = self.datasource_state.selected().unwrap_or(0);
            self.datasource_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn datasource_nav_up(&mut self) {
        let i = self.datasource_state.selected().unwrap_or(0);
        self.datasource_state.select(Some(i.saturating_sub(1)));
    }

    pub fn process_highlighted(&self) {
        if let Some((id, _)) = self.highlighted_datasource() {
            let datasources = self.datasources.clone();
            self.spawn(async move {
                let _ = datasources.process(id, None).await;
                Completion::DataSourceChanged
            });
        }
    }

    pub fn open_edit_source(&mut self) {
        let items = self.datasources.items();
        if let Some(source) = self.datasource_state.selected().and_then(|i| items.get(i)) {
            let mut form = Form::datasource_edit();
            form.set("title", &source.title);
            form.set("description", &source.description);
            self.modal = Some(Modal::EditSource {
                id: source.id,
                form,
            });
        }
    }

    pub fn submit_edit_source(&mut self) {
        let Some(Modal::EditSource { id, form }) = self.modal.take() else {
            return;
        };
        let Some(source) = self.datasources.items().into_iter().find(|d| d.id == id) else {
            return;
        };
        let title = form.value("title").trim();
        let description = form.value("description").trim();
        let update = DataSourceUpdate {
            title: (title != source.title).then(|| title.to_string()),
            description: (description != source.description).then(|| description.to_string()),
        };
        if update.is_empty() {
            return;
        }

        let datasources = self.datasources.clone();
        self.spawn(async move {
            let _ = datasources.update(id, &update).await;
            Completion::DataSourceChanged
        });
    }

    pub fn open_delete_source(&mut self) {
        if let Some((id, title)) = self.highlighted_datasource() {
            self.modal = Some(Modal::ConfirmDeleteSource { id, title });
        }
    }

    pub fn confirm_delete_source(&mut self) {
        if let Some(Modal::ConfirmDeleteSource { id, .. }) = self.modal.take() {
            let datasources = self.datasources.clone();
            self.spawn(async move {
                let _ = datasources.delete(id).await;
                Completion::DataSourceChanged
            });
        }
    }

    fn clamp_datasource_selection(&mut self) {
        let len = self.datasources.items().len();
        let selected = match (self.datasource_state.selected(), len) {
            (_, 0) => None,
            (None, _) => Some(0),
            (Some(i), len) => Some(i.min(len - 1)),
        };
        self.datasource_state.select(selected);
    }

    // ---- completions ------------------------------------------------------

    pub fn on_completion(&mut self, completion: Completion) {
        debug!(?completion, "Completed");
        match completion {
            Completion::AuthResolved => {
                if self.auth.is_signed_in() {
                    self.after_sign_in();
                } else {
                    self.input_mode = InputMode::Editing;
                }
            }
            Completion::LoggedIn { ok, username } => {
                if ok {
                    self.last_username = Some(username);
                    self.after_sign_in();
                }
            }
            Completion::SignedUp { ok } => {
                if ok {
                    self.after_sign_in();
                }
            }
            Completion::LoggedOut { ok } => {
                if ok {
                    self.messages.clear();
                    self.conversation_state.select(None);
                    self.navigate(Route::Login);
                }
            }
            Completion::ProfileSaved { ok } => {
                if ok {
                    self.notice = Some("Profile updated".to_string());
                }
            }
            Completion::ConversationsLoaded => {
                let items = self.conversations.items();
                let selected = self.messages.conversation();
                let still_listed = selected.is_some_and(|id| items.iter().any(|c| c.id == id));
                match items.first() {
                    Some(first) if !still_listed => self.select_conversation(first.id),
                    _ => self.sync_sidebar_selection(),
                }
            }
            Completion::ConversationCreated(Some(id)) => {
                self.select_conversation(id);
                self.focus = FocusPane::Chat;
                self.input_mode = InputMode::Editing;
            }
            Completion::ConversationCreated(None) | Completion::ConversationRenamed => {
                self.sync_sidebar_selection();
            }
            Completion::ConversationDeleted { id, ok } => {
                if ok && self.messages.conversation() == Some(id) {
                    match self.conversations.items().first() {
                        Some(next) => self.select_conversation(next.id),
                        None => {
                            self.messages.clear();
                            self.conversation_state.select(None);
                        }
                    }
                } else {
                    self.sync_sidebar_selection();
                }
            }
            Completion::MessagesLoaded => {}
            Completion::MessageSent { ok, conversation, content } => {
                if !ok
                    && conversation == self.messages.conversation()
                    && self.message_input.value.is_empty()
                    && !content.trim().is_empty()
                {
                    self.message_input = TextInput::with_value(&content);
                }
            }
            Completion::DataSourcesLoaded | Completion::DataSourceChanged => {
                self.clamp_datasource_selection();
            }
            Completion::DataSourceCreated { ok } => {
                if ok {
                    self.datasource_form.reset();
                    self.datasource_type = None;
                    self.navigate(Route::DataSources);
                    self.datasource_state.select(Some(0));
                }
            }
        }
    }
}

/// Expand a leading `~/` to the home directory.
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
