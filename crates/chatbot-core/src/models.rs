//! Wire types shared by the API client, the managers, and both front ends.
//!
//! Field names follow the backend's JSON. String-literal unions on the wire
//! (roles, source types, processing statuses) are closed enums here.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a conversation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub i64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a datasource record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataSourceId(pub i64);

impl fmt::Display for DataSourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::User => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(rename = "user_type")]
    pub role: UserRole,
    pub date_joined: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// "First Last", falling back to the username when no names are set.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SignupData {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password2: String,
    pub first_name: String,
    pub last_name: String,
}

/// Partial profile update; `None` fields are left untouched by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.first_name.is_none() && self.last_name.is_none()
    }
}

/// Envelope returned by the login and signup endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct AuthResponse {
    pub user: User,
}

// ============================================================================
// Conversations and messages
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data_sources: Vec<DataSourceId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub conversation: ConversationId,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Backend-attached context such as citations; opaque to the client.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

// ============================================================================
// Datasources
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Pdf,
    Doc,
    Txt,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Pdf => "pdf",
            SourceType::Doc => "doc",
            SourceType::Txt => "txt",
        }
    }

    /// Upper-case label used in form messages ("PDF", "DOC", "TXT").
    pub fn label(&self) -> &'static str {
        match self {
            SourceType::Pdf => "PDF",
            SourceType::Doc => "DOC",
            SourceType::Txt => "TXT",
        }
    }

    /// Map an upload MIME type onto a source type, if it is one we accept.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "application/pdf" => Some(SourceType::Pdf),
            "application/msword" => Some(SourceType::Doc),
            "text/plain" => Some(SourceType::Txt),
            _ => None,
        }
    }

    pub fn all() -> Vec<SourceType> {
        vec![SourceType::Pdf, SourceType::Doc, SourceType::Txt]
    }
}

impl FromStr for SourceType {
    type Err = String;

    /// Case-insensitive: "PDF" and "pdf" both parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pdf" => Ok(SourceType::Pdf),
            "doc" => Ok(SourceType::Doc),
            "txt" => Ok(SourceType::Txt),
            _ => Err(format!("unknown file type '{}' (pdf, doc, txt)", s)),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Unprocessed,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Unprocessed => "unprocessed",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    /// Processing may only be (re)started from these states.
    pub fn is_processable(&self) -> bool {
        match self {
            ProcessingStatus::Unprocessed | ProcessingStatus::Failed => true,
            ProcessingStatus::Processing | ProcessingStatus::Completed => false,
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_status() -> ProcessingStatus {
    ProcessingStatus::Unprocessed
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub id: DataSourceId,
    pub title: String,
    pub source_type: SourceType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_status")]
    pub processing_status: ProcessingStatus,
    #[serde(default)]
    pub processing_config: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub created_by: Option<i64>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

/// Partial datasource update. Location and processing status are read-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataSourceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DataSourceUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none()
    }
}

/// Options forwarded to the backend's processing pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlap: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProcessOutcome {
    pub status: ProcessingStatus,
}

/// A validated upload, ready to be sent as multipart form data.
#[derive(Debug, Clone)]
pub struct DataSourceUpload {
    pub title: String,
    pub source_type: SourceType,
    pub description: Option<String>,
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}
