//! The object a front end creates at start-up and tears down on exit.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::api::{ApiClient, Backend, ClientEvent};
use crate::auth::AuthSession;
use crate::config::Config;
use crate::conversations::ConversationList;
use crate::datasources::DataSourceManager;
use crate::messages::MessageSession;

pub struct AppContext {
    config: Config,
    session_path: Option<PathBuf>,
    api: Arc<ApiClient>,
    auth: AuthSession,
}

impl AppContext {
    /// Build the client from `config` and restore the saved session cookies.
    pub fn init(config: Config) -> Result<Self> {
        let session_path = Config::session_path()?;
        Self::with_session_path(config, Some(session_path))
    }

    /// Like [`init`](Self::init), with an explicit cookie file (or none).
    pub fn with_session_path(config: Config, session_path: Option<PathBuf>) -> Result<Self> {
        let api = Arc::new(ApiClient::new(&config.api_url())?);

        if config.remember_session() {
            if let Some(path) = &session_path {
                let restored = api.restore_session(path)?;
                debug!(cookies = restored, path = %path.display(), "Restored session cookies");
            }
        }

        let backend: Arc<dyn Backend> = api.clone();
        Ok(Self {
            config,
            session_path,
            api,
            auth: AuthSession::new(backend),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn backend(&self) -> Arc<dyn Backend> {
        self.api.clone()
    }

    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.api.subscribe()
    }

    pub fn conversations(&self) -> ConversationList {
        ConversationList::new(self.backend())
    }

    pub fn messages(&self) -> MessageSession {
        MessageSession::new(self.backend())
    }

    pub fn datasources(&self) -> DataSourceManager {
        DataSourceManager::new(self.backend())
    }

    /// Persist the session when signed in, otherwise drop the cookie file.
    pub fn shutdown(self) -> Result<()> {
        let Some(path) = &self.session_path else {
            return Ok(());
        };

        if self.config.remember_session() && self.auth.is_signed_in() {
            self.api.save_session(path)?;
            info!(path = %path.display(), "Saved session");
        } else {
            crate::api::cookies::clear_session(path)?;
            debug!(path = %path.display(), "Cleared session");
        }
        Ok(())
    }
}
