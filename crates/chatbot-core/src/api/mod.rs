pub mod client;
pub mod cookies;

pub use client::ApiClient;

use async_trait::async_trait;

use crate::error::ApiError;
use crate::models::{
    Conversation, ConversationId, DataSource, DataSourceId, DataSourceUpdate, DataSourceUpload,
    LoginCredentials, Message, ProcessConfig, ProcessOutcome, ProfileUpdate, SignupData, User,
};

/// Events the client raises independently of the call that triggered them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    /// The backend answered 401; the session is gone.
    Unauthorized,
}

/// The REST surface of the chatbot backend, one method per endpoint.
///
/// Managers only talk to this trait, so they can run against [`ApiClient`] or
/// a test double.
#[async_trait]
pub trait Backend: Send + Sync {
    // Auth
    async fn signup(&self, data: &SignupData) -> Result<User, ApiError>;
    async fn login(&self, credentials: &LoginCredentials) -> Result<User, ApiError>;
    async fn logout(&self) -> Result<(), ApiError>;
    async fn profile(&self) -> Result<User, ApiError>;
    async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError>;
    async fn list_users(&self) -> Result<Vec<User>, ApiError>;

    // Conversations
    async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError>;
    async fn create_conversation(&self, title: &str) -> Result<Conversation, ApiError>;
    async fn rename_conversation(
        &self,
        id: ConversationId,
        title: &str,
    ) -> Result<Conversation, ApiError>;
    async fn delete_conversation(&self, id: ConversationId) -> Result<(), ApiError>;

    // Messages
    async fn list_messages(&self, conversation: ConversationId) -> Result<Vec<Message>, ApiError>;
    async fn send_message(
        &self,
        conversation: ConversationId,
        content: &str,
    ) -> Result<Message, ApiError>;

    // Datasources
    async fn list_datasources(&self) -> Result<Vec<DataSource>, ApiError>;
    async fn get_datasource(&self, id: DataSourceId) -> Result<DataSource, ApiError>;
    async fn create_datasource(&self, upload: &DataSourceUpload) -> Result<DataSource, ApiError>;
    async fn update_datasource(
        &self,
        id: DataSourceId,
        update: &DataSourceUpdate,
    ) -> Result<DataSource, ApiError>;
    async fn delete_datasource(&self, id: DataSourceId) -> Result<(), ApiError>;
    async fn process_datasource(
        &self,
        id: DataSourceId,
        config: Option<&ProcessConfig>,
    ) -> Result<ProcessOutcome, ApiError>;
}
