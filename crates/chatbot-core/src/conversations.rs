//! Conversation list state: load, create, rename, delete.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{info, warn};

use crate::api::Backend;
use crate::error::{ApiError, ValidationError, MAX_TITLE_LEN};
use crate::models::{Conversation, ConversationId};

/// Trim `title` and check it against the 1..=50 character bounds.
///
/// Returns the trimmed title, which is what gets sent to the backend.
pub fn validate_title(title: &str) -> Result<String, ValidationError> {
    let trimmed = title.trim();
    let len = trimmed.chars().count();
    if len == 0 {
        return Err(ValidationError::TitleEmpty);
    }
    if len > MAX_TITLE_LEN {
        return Err(ValidationError::TitleTooLong { len });
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationListState {
    pub items: Vec<Conversation>,
    pub loading: bool,
    pub error: Option<String>,
    /// Id of the conversation whose delete request is in flight.
    pub deleting: Option<ConversationId>,
}

#[derive(Clone)]
pub struct ConversationList {
    backend: Arc<dyn Backend>,
    state: Arc<Mutex<ConversationListState>>,
}

impl ConversationList {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(ConversationListState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConversationListState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> ConversationListState {
        self.lock().clone()
    }

    pub fn items(&self) -> Vec<Conversation> {
        self.lock().items.clone()
    }

    pub fn get(&self, id: ConversationId) -> Option<Conversation> {
        self.lock().items.iter().find(|c| c.id == id).cloned()
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn dismiss_error(&self) {
        self.lock().error = None;
    }

    pub fn deleting(&self) -> Option<ConversationId> {
        self.lock().deleting
    }

    fn fail(&self, err: ApiError, fallback: &str) -> ApiError {
        let message = err.user_message(fallback);
        warn!(error = %err, "{}", fallback);
        let mut state = self.lock();
        state.error = Some(message);
        state.loading = false;
        err
    }

    fn reject(&self, err: ValidationError) -> ApiError {
        self.lock().error = Some(err.to_string());
        err.into()
    }

    /// Replace the list with the server's, in server order.
    pub async fn load(&self) -> Result<(), ApiError> {
        {
            let mut state = self.lock();
            state.loading = true;
            state.error = None;
        }

        match self.backend.list_conversations().await {
            Ok(items) => {
                let mut state = self.lock();
                state.items = items;
                state.loading = false;
                Ok(())
            }
            Err(err) => Err(self.fail(err, "Failed to load conversations")),
        }
    }

    /// Create a conversation and put it at the top of the list.
    pub async fn create(&self, title: &str) -> Result<Conversation, ApiError> {
        let title = validate_title(title).map_err(|e| self.reject(e))?;

        self.lock().loading = true;
        match self.backend.create_conversation(&title).await {
            Ok(conversation) => {
                info!(id = %conversation.id, "Created conversation");
                let mut state = self.lock();
                state.items.insert(0, conversation.clone());
                state.loading = false;
                state.error = None;
                Ok(conversation)
            }
            Err(err) => Err(self.fail(err, "Failed to create conversation")),
        }
    }

    /// Rename a conversation; the server's record replaces the cached one.
    pub async fn rename(&self, id: ConversationId, title: &str) -> Result<Conversation, ApiError> {
        let title = validate_title(title).map_err(|e| self.reject(e))?;

        self.lock().loading = true;
        match self.backend.rename_conversation(id, &title).await {
            Ok(updated) => {
                info!(id = %id, "Renamed conversation");
                let mut state = self.lock();
                if let Some(slot) = state.items.iter_mut().find(|c| c.id == id) {
                    *slot = updated.clone();
                }
                state.loading = false;
                state.error = None;
                Ok(updated)
            }
            Err(err) => Err(self.fail(err, "Failed to rename conversation")),
        }
    }

    /// Delete a conversation. `deleting` names it until the request resolves.
    pub async fn delete(&self, id: ConversationId) -> Result<(), ApiError> {
        self.lock().deleting = Some(id);

        let result = self.backend.delete_conversation(id).await;

        {
            let mut state = self.lock();
            if state.deleting == Some(id) {
                state.deleting = None;
            }
        }

        match result {
            Ok(()) => {
                info!(id = %id, "Deleted conversation");
                let mut state = self.lock();
                state.items.retain(|c| c.id != id);
                state.error = None;
                Ok(())
            }
            Err(err) => Err(self.fail(err, "Failed to delete conversation")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{conversation, Endpoint, FakeBackend};

    fn setup(fake: FakeBackend) -> (Arc<FakeBackend>, ConversationList) {
        let fake = Arc::new(fake);
        let list = ConversationList::new(fake.clone());
        (fake, list)
    }

    #[test]
    fn test_title_boundaries() {
        assert_eq!(validate_title("  Trip  ").unwrap(), "Trip");
        assert_eq!(validate_title("   "), Err(ValidationError::TitleEmpty));
        assert!(validate_title(&"a".repeat(50)).is_ok());
        assert_eq!(
            validate_title(&"a".repeat(51)),
            Err(ValidationError::TitleTooLong { len: 51 })
        );
        // Surrounding whitespace does not count toward the limit.
        assert!(validate_title(&format!("  {}  ", "a".repeat(50))).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_titles_never_reach_the_backend() {
        let (fake, list) = setup(FakeBackend::new().with_conversations(vec![conversation(1, "Old")]));

        let err = list.create("").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(ValidationError::TitleEmpty)));

        let err = list.rename(ConversationId(1), &"x".repeat(51)).await.unwrap_err();
        assert!(err.to_string().contains("current: 51"));
        assert_eq!(list.error().as_deref(), Some("Title cannot exceed 50 characters (current: 51)"));

        assert_eq!(fake.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_create_prepends_trimmed_title() {
        let (_fake, list) = setup(FakeBackend::new().with_conversations(vec![conversation(1, "Old")]));
        list.load().await.unwrap();

        let created = list.create("  Trip Planning ").await.unwrap();
        assert_eq!(created.title, "Trip Planning");

        let items = list.items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, created.id);
        assert_eq!(items[1].title, "Old");
    }

    #[tokio::test]
    async fn test_rename_replaces_in_place() {
        let (_fake, list) = setup(FakeBackend::new().with_conversations(vec![
            conversation(1, "First"),
            conversation(2, "Second"),
            conversation(3, "Third"),
        ]));
        list.load().await.unwrap();

        list.rename(ConversationId(2), "Renamed").await.unwrap();

        let titles: Vec<String> = list.items().into_iter().map(|c| c.title).collect();
        assert_eq!(titles, vec!["First", "Renamed", "Third"]);
    }

    #[tokio::test]
    async fn test_load_failure_uses_fallback_message() {
        let (fake, list) = setup(FakeBackend::new());
        fake.fail_next(Endpoint::ListConversations, 500, None);

        assert!(list.load().await.is_err());
        let state = list.snapshot();
        assert_eq!(state.error.as_deref(), Some("Failed to load conversations"));
        assert!(!state.loading);

        list.dismiss_error();
        assert!(list.error().is_none());
    }

    #[tokio::test]
    async fn test_delete_marks_id_while_in_flight() {
        let (fake, list) = setup(FakeBackend::new().with_conversations(vec![
            conversation(1, "Keep"),
            conversation(2, "Drop"),
        ]));
        list.load().await.unwrap();
        fake.hold(Endpoint::DeleteConversation);

        let task = tokio::spawn({
            let list = list.clone();
            async move { list.delete(ConversationId(2)).await }
        });
        fake.until_called(Endpoint::DeleteConversation, 1).await;
        assert_eq!(list.deleting(), Some(ConversationId(2)));

        fake.release(Endpoint::DeleteConversation);
        task.await.unwrap().unwrap();

        assert_eq!(list.deleting(), None);
        let ids: Vec<ConversationId> = list.items().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![ConversationId(1)]);
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_record() {
        let (fake, list) = setup(FakeBackend::new().with_conversations(vec![conversation(1, "Keep")]));
        list.load().await.unwrap();
        fake.fail_next(Endpoint::DeleteConversation, 403, Some("Not allowed"));

        assert!(list.delete(ConversationId(1)).await.is_err());
        let state = list.snapshot();
        assert_eq!(state.items.len(), 1);
        assert_eq!(state.deleting, None);
        assert_eq!(state.error.as_deref(), Some("Not allowed"));
    }
}
