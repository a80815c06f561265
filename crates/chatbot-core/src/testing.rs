//! In-memory [`Backend`] double for manager and front-end tests.
//!
//! It behaves like a small version of the real backend (ids, ordering,
//! permission checks). Tests can also script failures, count calls per
//! endpoint, and hold a request in flight until it is released.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Semaphore;

use crate::api::Backend;
use crate::error::ApiError;
use crate::models::{
    Conversation, ConversationId, DataSource, DataSourceId, DataSourceUpdate, DataSourceUpload,
    LoginCredentials, Message, MessageRole, ProcessConfig, ProcessOutcome, ProcessingStatus,
    ProfileUpdate, SignupData, SourceType, User, UserRole,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Signup,
    Login,
    Logout,
    Profile,
    UpdateProfile,
    ListUsers,
    ListConversations,
    CreateConversation,
    RenameConversation,
    DeleteConversation,
    ListMessages,
    SendMessage,
    ListDataSources,
    GetDataSource,
    CreateDataSource,
    UpdateDataSource,
    DeleteDataSource,
    ProcessDataSource,
}

#[derive(Default)]
struct FakeState {
    accounts: Vec<(User, String)>,
    session: Option<User>,
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
    datasources: Vec<DataSource>,
    next_id: i64,
    echo_user_messages: bool,
    last_upload: Option<DataSourceUpload>,
    calls: HashMap<Endpoint, usize>,
    failures: HashMap<Endpoint, VecDeque<(u16, Option<String>)>>,
    holds: HashMap<Endpoint, Arc<Semaphore>>,
}

#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new() -> Self {
        let backend = Self::default();
        backend.lock().next_id = 100;
        backend
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ---- setup -----------------------------------------------------------

    pub fn with_account(self, user: User, password: &str) -> Self {
        self.lock().accounts.push((user, password.to_string()));
        self
    }

    /// Start with an existing server-side session for `user`.
    pub fn signed_in(self, user: User) -> Self {
        {
            let mut state = self.lock();
            state.accounts.push((user.clone(), "secret".to_string()));
            state.session = Some(user);
        }
        self
    }

    pub fn with_conversations(self, conversations: Vec<Conversation>) -> Self {
        self.lock().conversations = conversations;
        self
    }

    pub fn with_messages(self, messages: Vec<Message>) -> Self {
        self.lock().messages = messages;
        self
    }

    pub fn with_datasources(self, datasources: Vec<DataSource>) -> Self {
        self.lock().datasources = datasources;
        self
    }

    /// Answer message posts with the stored user message instead of a reply.
    pub fn echo_user_messages(self) -> Self {
        self.lock().echo_user_messages = true;
        self
    }

    /// Make the next call to `endpoint` fail with `status`.
    pub fn fail_next(&self, endpoint: Endpoint, status: u16, message: Option<&str>) {
        self.lock()
            .failures
            .entry(endpoint)
            .or_default()
            .push_back((status, message.map(str::to_string)));
    }

    /// Park every call to `endpoint` until [`release`](Self::release) is called.
    pub fn hold(&self, endpoint: Endpoint) {
        self.lock()
            .holds
            .insert(endpoint, Arc::new(Semaphore::new(0)));
    }

    /// Let one parked (or future) call to `endpoint` proceed.
    pub fn release(&self, endpoint: Endpoint) {
        if let Some(gate) = self.lock().holds.get(&endpoint) {
            gate.add_permits(1);
        }
    }

    // ---- inspection --------------------------------------------------------

    pub fn calls(&self, endpoint: Endpoint) -> usize {
        self.lock().calls.get(&endpoint).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    /// Yield until `endpoint` has been called at least `count` times.
    pub async fn until_called(&self, endpoint: Endpoint, count: usize) {
        while self.calls(endpoint) < count {
            tokio::task::yield_now().await;
        }
    }

    pub fn last_upload(&self) -> Option<DataSourceUpload> {
        self.lock().last_upload.clone()
    }

    pub fn stored_messages(&self, conversation: ConversationId) -> Vec<Message> {
        self.lock()
            .messages
            .iter()
            .filter(|m| m.conversation == conversation)
            .cloned()
            .collect()
    }

    pub fn session_user(&self) -> Option<User> {
        self.lock().session.clone()
    }

    // ---- plumbing ----------------------------------------------------------

    async fn enter(&self, endpoint: Endpoint) -> Result<(), ApiError> {
        let gate = {
            let mut state = self.lock();
            *state.calls.entry(endpoint).or_default() += 1;
            state.holds.get(&endpoint).cloned()
        };

        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let mut state = self.lock();
        match state.failures.get_mut(&endpoint).and_then(VecDeque::pop_front) {
            Some((401, message)) => Err(ApiError::Unauthorized { message }),
            Some((status, message)) => Err(ApiError::Http { status, message }),
            None => Ok(()),
        }
    }

    fn next_id(state: &mut FakeState) -> i64 {
        state.next_id += 1;
        state.next_id
    }
}

fn not_found() -> ApiError {
    ApiError::Http {
        status: 404,
        message: Some("Not found.".to_string()),
    }
}

fn unauthenticated() -> ApiError {
    ApiError::Unauthorized {
        message: Some("Authentication credentials were not provided.".to_string()),
    }
}

fn require_session(state: &FakeState) -> Result<User, ApiError> {
    state.session.clone().ok_or_else(unauthenticated)
}

fn require_admin(state: &FakeState) -> Result<User, ApiError> {
    let user = require_session(state)?;
    if user.role != UserRole::Admin {
        return Err(ApiError::Http {
            status: 403,
            message: Some("You do not have permission to perform this action.".to_string()),
        });
    }
    Ok(user)
}

#[async_trait]
impl Backend for FakeBackend {
    async fn signup(&self, data: &SignupData) -> Result<User, ApiError> {
        self.enter(Endpoint::Signup).await?;
        let mut state = self.lock();
        if state.accounts.iter().any(|(u, _)| u.username == data.username) {
            return Err(ApiError::Http {
                status: 400,
                message: Some("username: A user with that username already exists.".to_string()),
            });
        }
        let id = Self::next_id(&mut state);
        let user = User {
            id,
            username: data.username.clone(),
            email: data.email.clone(),
            first_name: data.first_name.clone(),
            last_name: data.last_name.clone(),
            role: UserRole::User,
            date_joined: Utc::now(),
        };
        state.accounts.push((user.clone(), data.password.clone()));
        state.session = Some(user.clone());
        Ok(user)
    }

    async fn login(&self, credentials: &LoginCredentials) -> Result<User, ApiError> {
        self.enter(Endpoint::Login).await?;
        let mut state = self.lock();
        let user = state
            .accounts
            .iter()
            .find(|(u, p)| u.username == credentials.username && *p == credentials.password)
            .map(|(u, _)| u.clone())
            .ok_or_else(|| ApiError::Unauthorized {
                message: Some("Invalid credentials".to_string()),
            })?;
        state.session = Some(user.clone());
        Ok(user)
    }

    async fn logout(&self) -> Result<(), ApiError> {
        self.enter(Endpoint::Logout).await?;
        let mut state = self.lock();
        require_session(&state)?;
        state.session = None;
        Ok(())
    }

    async fn profile(&self) -> Result<User, ApiError> {
        self.enter(Endpoint::Profile).await?;
        require_session(&self.lock())
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        self.enter(Endpoint::UpdateProfile).await?;
        let mut state = self.lock();
        let mut user = require_session(&state)?;
        if let Some(email) = &update.email {
            user.email = email.clone();
        }
        if let Some(first_name) = &update.first_name {
            user.first_name = first_name.clone();
        }
        if let Some(last_name) = &update.last_name {
            user.last_name = last_name.clone();
        }
        for (account, _) in state.accounts.iter_mut() {
            if account.id == user.id {
                *account = user.clone();
            }
        }
        state.session = Some(user.clone());
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        self.enter(Endpoint::ListUsers).await?;
        let state = self.lock();
        require_admin(&state)?;
        Ok(state.accounts.iter().map(|(u, _)| u.clone()).collect())
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        self.enter(Endpoint::ListConversations).await?;
        Ok(self.lock().conversations.clone())
    }

    async fn create_conversation(&self, title: &str) -> Result<Conversation, ApiError> {
        self.enter(Endpoint::CreateConversation).await?;
        let mut state = self.lock();
        let id = Self::next_id(&mut state);
        let conversation = Conversation {
            id: ConversationId(id),
            title: title.to_string(),
            created_at: Utc::now(),
            updated_at: None,
            data_sources: Vec::new(),
        };
        state.conversations.insert(0, conversation.clone());
        Ok(conversation)
    }

    async fn rename_conversation(
        &self,
        id: ConversationId,
        title: &str,
    ) -> Result<Conversation, ApiError> {
        self.enter(Endpoint::RenameConversation).await?;
        let mut state = self.lock();
        let conversation = state
            .conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(not_found)?;
        conversation.title = title.to_string();
        conversation.updated_at = Some(Utc::now());
        Ok(conversation.clone())
    }

    async fn delete_conversation(&self, id: ConversationId) -> Result<(), ApiError> {
        self.enter(Endpoint::DeleteConversation).await?;
        let mut state = self.lock();
        let before = state.conversations.len();
        state.conversations.retain(|c| c.id != id);
        if state.conversations.len() == before {
            return Err(not_found());
        }
        state.messages.retain(|m| m.conversation != id);
        Ok(())
    }

    async fn list_messages(&self, conversation: ConversationId) -> Result<Vec<Message>, ApiError> {
        self.enter(Endpoint::ListMessages).await?;
        Ok(self.stored_messages(conversation))
    }

    async fn send_message(
        &self,
        conversation: ConversationId,
        content: &str,
    ) -> Result<Message, ApiError> {
        self.enter(Endpoint::SendMessage).await?;
        let mut state = self.lock();
        if !state.conversations.iter().any(|c| c.id == conversation) {
            return Err(not_found());
        }

        let user_message = Message {
            id: Self::next_id(&mut state),
            conversation,
            role: MessageRole::User,
            content: content.to_string(),
            timestamp: Utc::now(),
            metadata: None,
        };
        state.messages.push(user_message.clone());
        if state.echo_user_messages {
            return Ok(user_message);
        }

        let reply = Message {
            id: Self::next_id(&mut state),
            conversation,
            role: MessageRole::Assistant,
            content: format!("Echo: {}", content),
            timestamp: Utc::now(),
            metadata: Some(serde_json::json!({"confidence": 0.5})),
        };
        state.messages.push(reply.clone());
        Ok(reply)
    }

    async fn list_datasources(&self) -> Result<Vec<DataSource>, ApiError> {
        self.enter(Endpoint::ListDataSources).await?;
        let state = self.lock();
        require_admin(&state)?;
        Ok(state.datasources.clone())
    }

    async fn get_datasource(&self, id: DataSourceId) -> Result<DataSource, ApiError> {
        self.enter(Endpoint::GetDataSource).await?;
        let state = self.lock();
        require_admin(&state)?;
        state
            .datasources
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(not_found)
    }

    async fn create_datasource(&self, upload: &DataSourceUpload) -> Result<DataSource, ApiError> {
        self.enter(Endpoint::CreateDataSource).await?;
        let mut state = self.lock();
        let admin = require_admin(&state)?;
        let id = Self::next_id(&mut state);
        let datasource = DataSource {
            id: DataSourceId(id),
            title: upload.title.clone(),
            source_type: upload.source_type,
            description: upload.description.clone().unwrap_or_default(),
            location: format!("datasources/{}", upload.file_name),
            created_at: Utc::now(),
            processing_status: ProcessingStatus::Unprocessed,
            processing_config: None,
            created_by: Some(admin.id),
            is_active: true,
        };
        state.datasources.insert(0, datasource.clone());
        state.last_upload = Some(upload.clone());
        Ok(datasource)
    }

    async fn update_datasource(
        &self,
        id: DataSourceId,
        update: &DataSourceUpdate,
    ) -> Result<DataSource, ApiError> {
        self.enter(Endpoint::UpdateDataSource).await?;
        let mut state = self.lock();
        require_admin(&state)?;
        let datasource = state
            .datasources
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(not_found)?;
        if let Some(title) = &update.title {
            datasource.title = title.clone();
        }
        if let Some(description) = &update.description {
            datasource.description = description.clone();
        }
        Ok(datasource.clone())
    }

    async fn delete_datasource(&self, id: DataSourceId) -> Result<(), ApiError> {
        self.enter(Endpoint::DeleteDataSource).await?;
        let mut state = self.lock();
        require_admin(&state)?;
        let before = state.datasources.len();
        state.datasources.retain(|d| d.id != id);
        if state.datasources.len() == before {
            return Err(not_found());
        }
        Ok(())
    }

    async fn process_datasource(
        &self,
        id: DataSourceId,
        config: Option<&ProcessConfig>,
    ) -> Result<ProcessOutcome, ApiError> {
        self.enter(Endpoint::ProcessDataSource).await?;
        let mut state = self.lock();
        require_admin(&state)?;
        let datasource = state
            .datasources
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(not_found)?;
        if !datasource.processing_status.is_processable() {
            return Err(ApiError::Http {
                status: 400,
                message: Some(
                    "Source can only be processed if unprocessed or previously failed".to_string(),
                ),
            });
        }

        let config = match config {
            Some(config) => serde_json::to_value(config)?,
            None => serde_json::json!({"chunk_size": 1000, "overlap": 200, "embedding_model": "default"}),
        };
        datasource.processing_config = config.as_object().cloned();
        datasource.processing_status = ProcessingStatus::Completed;
        Ok(ProcessOutcome {
            status: ProcessingStatus::Completed,
        })
    }
}

// ---- fixtures ----------------------------------------------------------------

fn fixture_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0)
        .single()
        .unwrap_or_default()
}

pub fn user(id: i64, username: &str, role: UserRole) -> User {
    User {
        id,
        username: username.to_string(),
        email: format!("{}@example.com", username),
        first_name: String::new(),
        last_name: String::new(),
        role,
        date_joined: fixture_time(),
    }
}

pub fn conversation(id: i64, title: &str) -> Conversation {
    Conversation {
        id: ConversationId(id),
        title: title.to_string(),
        created_at: fixture_time(),
        updated_at: None,
        data_sources: Vec::new(),
    }
}

pub fn message(id: i64, conversation: i64, role: MessageRole, content: &str) -> Message {
    Message {
        id,
        conversation: ConversationId(conversation),
        role,
        content: content.to_string(),
        timestamp: fixture_time(),
        metadata: None,
    }
}

pub fn datasource(id: i64, title: &str, source_type: SourceType, status: ProcessingStatus) -> DataSource {
    DataSource {
        id: DataSourceId(id),
        title: title.to_string(),
        source_type,
        description: String::new(),
        location: format!("datasources/{}.{}", id, source_type.as_str()),
        created_at: fixture_time(),
        processing_status: status,
        processing_config: None,
        created_by: Some(1),
        is_active: true,
    }
}
