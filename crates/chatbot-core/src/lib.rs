pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod conversations;
pub mod datasources;
pub mod error;
pub mod guard;
pub mod messages;
pub mod models;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-export main types for convenience
pub use api::{ApiClient, Backend, ClientEvent};
pub use auth::{AuthSession, AuthStatus};
pub use config::Config;
pub use context::AppContext;
pub use conversations::{validate_title, ConversationList};
pub use datasources::{DataSourceManager, NewDataSource};
pub use error::{ApiError, ValidationError};
pub use guard::{Decision, GuardState, Navigator, Route};
pub use messages::{EntryStatus, MessageEntry, MessageSession};
pub use models::{
    Conversation, ConversationId, DataSource, DataSourceId, Message, MessageRole,
    ProcessingStatus, SourceType, User, UserRole,
};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{user, Endpoint, FakeBackend};

    #[tokio::test]
    async fn test_trip_planning_walkthrough() {
        let fake = Arc::new(FakeBackend::new().signed_in(user(1, "ana", UserRole::User)));
        let conversations = ConversationList::new(fake.clone());
        let messages = MessageSession::new(fake.clone());

        conversations.load().await.unwrap();
        let trip = conversations.create("Trip Planning").await.unwrap().id;
        assert_eq!(conversations.items()[0].id, trip);

        let err = conversations.rename(trip, &"y".repeat(51)).await.unwrap_err();
        assert!(err.to_string().contains("51"));
        assert_eq!(conversations.items()[0].title, "Trip Planning");

        messages.select(trip);
        messages.load().await.unwrap();

        fake.hold(Endpoint::SendMessage);
        fake.hold(Endpoint::DeleteConversation);
        let send = tokio::spawn({
            let messages = messages.clone();
            async move { messages.send("Lisbon or Porto?").await }
        });
        fake.until_called(Endpoint::SendMessage, 1).await;
        assert!(messages.is_sending());

        let delete = tokio::spawn({
            let conversations = conversations.clone();
            async move { conversations.delete(trip).await }
        });
        fake.until_called(Endpoint::DeleteConversation, 1).await;
        assert_eq!(conversations.deleting(), Some(trip));

        fake.release(Endpoint::DeleteConversation);
        delete.await.unwrap().unwrap();
        assert_eq!(conversations.deleting(), None);
        assert!(conversations.items().iter().all(|c| c.id != trip));

        // The conversation is gone by the time the send lands.
        fake.release(Endpoint::SendMessage);
        assert!(send.await.unwrap().is_err());
        assert!(messages.entries().is_empty());
        assert!(!messages.is_sending());
    }
}
