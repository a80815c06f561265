//! Message history for the selected conversation, with optimistic sends.
//!
//! A send appends a `Pending` entry right away and reconciles that exact
//! entry when the backend answers. Entries keep array order; nothing is
//! re-sorted by timestamp.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::api::Backend;
use crate::error::{ApiError, ValidationError};
use crate::models::{ConversationId, Message, MessageRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Pending,
    Confirmed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageEntry {
    pub local_id: u64,
    pub status: EntryStatus,
    pub message: Message,
}

impl MessageEntry {
    pub fn is_pending(&self) -> bool {
        self.status == EntryStatus::Pending
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageSessionState {
    pub conversation: Option<ConversationId>,
    pub entries: Vec<MessageEntry>,
    pub loading: bool,
    /// Sends to the current conversation still waiting on the backend.
    pub sending: usize,
    pub error: Option<String>,
    /// Bumped on every change; front ends scroll to the bottom when it moves.
    pub revision: u64,
    epoch: u64,
}

impl MessageSessionState {
    fn touch(&mut self) {
        self.revision += 1;
    }
}

#[derive(Clone)]
pub struct MessageSession {
    backend: Arc<dyn Backend>,
    state: Arc<Mutex<MessageSessionState>>,
    next_local_id: Arc<AtomicU64>,
}

impl MessageSession {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let seed = Utc::now().timestamp_millis().max(0) as u64;
        Self {
            backend,
            state: Arc::new(Mutex::new(MessageSessionState::default())),
            next_local_id: Arc::new(AtomicU64::new(seed)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MessageSessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn local_id(&self) -> u64 {
        self.next_local_id.fetch_add(1, Ordering::Relaxed)
    }

    fn confirmed(&self, message: Message) -> MessageEntry {
        MessageEntry {
            local_id: self.local_id(),
            status: EntryStatus::Confirmed,
            message,
        }
    }

    pub fn snapshot(&self) -> MessageSessionState {
        self.lock().clone()
    }

    pub fn conversation(&self) -> Option<ConversationId> {
        self.lock().conversation
    }

    pub fn entries(&self) -> Vec<MessageEntry> {
        self.lock().entries.clone()
    }

    pub fn revision(&self) -> u64 {
        self.lock().revision
    }

    pub fn is_sending(&self) -> bool {
        self.lock().sending > 0
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn dismiss_error(&self) {
        let mut state = self.lock();
        state.error = None;
        state.touch();
    }

    /// Scope the session to `id`. Entries and error are cleared immediately;
    /// call [`load`](Self::load) afterwards to fetch the history.
    pub fn select(&self, id: ConversationId) {
        let mut state = self.lock();
        state.conversation = Some(id);
        state.entries.clear();
        state.error = None;
        state.loading = false;
        state.sending = 0;
        state.epoch += 1;
        state.touch();
        debug!(conversation = %id, epoch = state.epoch, "Selected conversation");
    }

    /// Drop the scope, e.g. after the selected conversation was deleted.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.conversation = None;
        state.entries.clear();
        state.error = None;
        state.loading = false;
        state.sending = 0;
        state.epoch += 1;
        state.touch();
    }

    /// Fetch the selected conversation's history. A no-op without a scope.
    pub async fn load(&self) -> Result<(), ApiError> {
        let (conversation, epoch) = {
            let mut state = self.lock();
            let Some(conversation) = state.conversation else {
                return Ok(());
            };
            state.loading = true;
            state.touch();
            (conversation, state.epoch)
        };

        let result = self.backend.list_messages(conversation).await;

        let mut state = self.lock();
        if state.epoch != epoch {
            debug!(conversation = %conversation, "Discarding stale history");
            return Ok(());
        }
        state.loading = false;
        state.touch();

        match result {
            Ok(messages) => {
                // Sends started before the history arrived stay at the end.
                let pending: Vec<MessageEntry> = state
                    .entries
                    .drain(..)
                    .filter(MessageEntry::is_pending)
                    .collect();
                let mut entries: Vec<MessageEntry> =
                    messages.into_iter().map(|m| self.confirmed(m)).collect();
                entries.extend(pending);
                state.entries = entries;
                Ok(())
            }
            Err(err) => {
                warn!(conversation = %conversation, error = %err, "Failed to load messages");
                state.error = Some(err.user_message("Failed to load messages"));
                Err(err)
            }
        }
    }

    /// Send `content` to the selected conversation.
    ///
    /// Returns the backend's reply. On failure the optimistic entry is removed
    /// again, so the list is exactly as long as before the call.
    pub async fn send(&self, content: &str) -> Result<Message, ApiError> {
        let (conversation, epoch, local_id) = {
            let mut state = self.lock();
            let Some(conversation) = state.conversation else {
                let err = ApiError::NoConversationSelected;
                state.error = Some(err.to_string());
                state.touch();
                return Err(err);
            };
            if content.trim().is_empty() {
                let err = ValidationError::EmptyMessage;
                state.error = Some(err.to_string());
                state.touch();
                return Err(err.into());
            }

            let local_id = self.local_id();
            state.entries.push(MessageEntry {
                local_id,
                status: EntryStatus::Pending,
                message: Message {
                    id: local_id as i64,
                    conversation,
                    role: MessageRole::User,
                    content: content.to_string(),
                    timestamp: Utc::now(),
                    metadata: None,
                },
            });
            state.sending += 1;
            state.touch();
            (conversation, state.epoch, local_id)
        };

        let result = self.backend.send_message(conversation, content).await;

        let mut state = self.lock();
        if state.epoch != epoch {
            debug!(conversation = %conversation, "Discarding reply for a previous conversation");
            return result;
        }
        state.sending = state.sending.saturating_sub(1);
        state.touch();

        let position = state.entries.iter().position(|e| e.local_id == local_id);
        match result {
            Ok(reply) => {
                info!(conversation = %conversation, "Message sent");
                match (reply.role, position) {
                    (MessageRole::User, Some(index)) => {
                        state.entries[index] = MessageEntry {
                            local_id,
                            status: EntryStatus::Confirmed,
                            message: reply.clone(),
                        };
                    }
                    (MessageRole::Assistant, Some(index)) => {
                        state.entries[index].status = EntryStatus::Confirmed;
                        let entry = self.confirmed(reply.clone());
                        state.entries.push(entry);
                    }
                    (_, None) => {
                        let entry = self.confirmed(reply.clone());
                        state.entries.push(entry);
                    }
                }
                Ok(reply)
            }
            Err(err) => {
                warn!(conversation = %conversation, error = %err, "Failed to send message");
                if let Some(index) = position {
                    state.entries.remove(index);
                }
                state.error = Some(err.user_message("Failed to send message"));
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{conversation, message, Endpoint, FakeBackend};

    fn setup(fake: FakeBackend) -> (Arc<FakeBackend>, MessageSession) {
        let fake = Arc::new(fake);
        let session = MessageSession::new(fake.clone());
        (fake, session)
    }

    fn two_conversations() -> FakeBackend {
        FakeBackend::new()
            .with_conversations(vec![conversation(1, "One"), conversation(2, "Two")])
            .with_messages(vec![
                message(10, 1, MessageRole::User, "hi"),
                message(11, 1, MessageRole::Assistant, "hello"),
                message(20, 2, MessageRole::User, "other"),
            ])
    }

    #[tokio::test]
    async fn test_send_without_scope_fails() {
        let (fake, session) = setup(FakeBackend::new());
        let err = session.send("hello").await.unwrap_err();
        assert!(matches!(err, ApiError::NoConversationSelected));
        assert_eq!(session.error().as_deref(), Some("No conversation selected"));
        assert_eq!(fake.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_blank_message_rejected_locally() {
        let (fake, session) = setup(two_conversations());
        session.select(ConversationId(1));
        let err = session.send("  \n ").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(ValidationError::EmptyMessage)));
        assert!(session.entries().is_empty());
        assert_eq!(fake.calls(Endpoint::SendMessage), 0);
    }

    #[tokio::test]
    async fn test_send_success_keeps_user_entry_then_reply() {
        let (_fake, session) = setup(two_conversations());
        session.select(ConversationId(1));
        session.load().await.unwrap();

        session.send("Where should we go?").await.unwrap();

        let entries = session.entries();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[2].message.role, MessageRole::User);
        assert_eq!(entries[2].message.content, "Where should we go?");
        assert_eq!(entries[2].status, EntryStatus::Confirmed);
        assert_eq!(entries[3].message.role, MessageRole::Assistant);
        assert_eq!(entries[3].message.content, "Echo: Where should we go?");
        assert!(!session.is_sending());
    }

    #[tokio::test]
    async fn test_user_role_reply_replaces_pending_entry() {
        let (_fake, session) = setup(two_conversations().echo_user_messages());
        session.select(ConversationId(2));
        session.load().await.unwrap();

        let reply = session.send("again").await.unwrap();

        let entries = session.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].message, reply);
        assert_eq!(entries[1].status, EntryStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_send_failure_restores_length() {
        let (fake, session) = setup(two_conversations());
        session.select(ConversationId(1));
        session.load().await.unwrap();
        let before = session.entries();
        fake.fail_next(Endpoint::SendMessage, 500, None);

        assert!(session.send("lost").await.is_err());

        assert_eq!(session.entries(), before);
        assert_eq!(session.error().as_deref(), Some("Failed to send message"));
    }

    #[tokio::test]
    async fn test_pending_entry_visible_while_in_flight() {
        let (fake, session) = setup(two_conversations());
        session.select(ConversationId(2));
        session.load().await.unwrap();
        fake.hold(Endpoint::SendMessage);

        let task = tokio::spawn({
            let session = session.clone();
            async move { session.send("waiting").await }
        });
        fake.until_called(Endpoint::SendMessage, 1).await;

        let state = session.snapshot();
        assert_eq!(state.sending, 1);
        let last = state.entries.last().unwrap();
        assert!(last.is_pending());
        assert_eq!(last.message.id, last.local_id as i64);

        fake.release(Endpoint::SendMessage);
        task.await.unwrap().unwrap();
        assert!(session.entries().iter().all(|e| !e.is_pending()));
    }

    #[tokio::test]
    async fn test_concurrent_sends_each_get_an_entry() {
        let (fake, session) = setup(two_conversations());
        session.select(ConversationId(2));
        fake.hold(Endpoint::SendMessage);

        let first = tokio::spawn({
            let session = session.clone();
            async move { session.send("one").await }
        });
        let second = tokio::spawn({
            let session = session.clone();
            async move { session.send("two").await }
        });
        fake.until_called(Endpoint::SendMessage, 2).await;
        assert_eq!(session.entries().len(), 2);
        assert_eq!(session.snapshot().sending, 2);

        fake.release(Endpoint::SendMessage);
        fake.release(Endpoint::SendMessage);
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let entries = session.entries();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].message.content, "one");
        assert_eq!(entries[1].message.content, "two");
        assert!(entries.iter().all(|e| e.status == EntryStatus::Confirmed));
    }

    #[tokio::test]
    async fn test_select_clears_before_load_resolves() {
        let (fake, session) = setup(two_conversations());
        session.select(ConversationId(1));
        session.load().await.unwrap();
        fake.fail_next(Endpoint::SendMessage, 500, Some("boom"));
        let _ = session.send("x").await;
        assert!(session.error().is_some());

        fake.hold(Endpoint::ListMessages);
        session.select(ConversationId(2));
        assert!(session.entries().is_empty());
        assert!(session.error().is_none());

        let task = tokio::spawn({
            let session = session.clone();
            async move { session.load().await }
        });
        fake.until_called(Endpoint::ListMessages, 2).await;
        let state = session.snapshot();
        assert!(state.entries.is_empty());
        assert!(state.loading);

        fake.release(Endpoint::ListMessages);
        task.await.unwrap().unwrap();
        let entries = session.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message.content, "other");
    }

    #[tokio::test]
    async fn test_stale_history_is_discarded() {
        let (fake, session) = setup(two_conversations());
        fake.hold(Endpoint::ListMessages);
        session.select(ConversationId(1));

        let task = tokio::spawn({
            let session = session.clone();
            async move { session.load().await }
        });
        fake.until_called(Endpoint::ListMessages, 1).await;
        session.select(ConversationId(2));
        fake.release(Endpoint::ListMessages);
        task.await.unwrap().unwrap();

        let state = session.snapshot();
        assert_eq!(state.conversation, Some(ConversationId(2)));
        assert!(state.entries.is_empty());
    }

    #[tokio::test]
    async fn test_switching_conversation_drops_in_flight_send() {
        let (fake, session) = setup(two_conversations());
        session.select(ConversationId(1));
        fake.hold(Endpoint::SendMessage);

        let task = tokio::spawn({
            let session = session.clone();
            async move { session.send("on one").await }
        });
        fake.until_called(Endpoint::SendMessage, 1).await;
        assert!(session.is_sending());

        session.select(ConversationId(2));
        let state = session.snapshot();
        assert_eq!(state.conversation, Some(ConversationId(2)));
        assert!(state.entries.is_empty());
        assert_eq!(state.sending, 0);

        // A send in the new conversation is counted on its own.
        let second = tokio::spawn({
            let session = session.clone();
            async move { session.send("on two").await }
        });
        fake.until_called(Endpoint::SendMessage, 2).await;
        assert_eq!(session.snapshot().sending, 1);

        // The old reply lands without touching the new counter or entries.
        fake.release(Endpoint::SendMessage);
        fake.release(Endpoint::SendMessage);
        task.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let state = session.snapshot();
        assert_eq!(state.sending, 0);
        assert!(state
            .entries
            .iter()
            .all(|e| e.message.conversation == ConversationId(2)));
        assert_eq!(state.entries.len(), 2);
    }

    #[tokio::test]
    async fn test_revision_moves_on_every_change() {
        let (_fake, session) = setup(two_conversations());
        let start = session.revision();
        session.select(ConversationId(1));
        let selected = session.revision();
        assert!(selected > start);

        session.load().await.unwrap();
        let loaded = session.revision();
        assert!(loaded > selected);

        session.send("hi").await.unwrap();
        assert!(session.revision() > loaded);
    }
}
