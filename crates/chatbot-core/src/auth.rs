//! Who is signed in, and the account operations around it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::api::Backend;
use crate::error::{ApiError, ValidationError};
use crate::guard::GuardState;
use crate::models::{LoginCredentials, ProfileUpdate, SignupData, User};

#[derive(Debug, Clone, PartialEq)]
pub enum AuthStatus {
    /// The start-up profile check has not answered yet.
    Resolving,
    SignedIn(User),
    SignedOut,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    pub status: AuthStatus,
    pub loading: bool,
    pub error: Option<String>,
    /// Accounts from the last admin user listing.
    pub users: Vec<User>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            status: AuthStatus::Resolving,
            loading: false,
            error: None,
            users: Vec::new(),
        }
    }
}

fn require(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required { field });
    }
    Ok(())
}

pub fn validate_login(credentials: &LoginCredentials) -> Result<(), ValidationError> {
    require(&credentials.username, "username")?;
    require(&credentials.password, "password")
}

pub fn validate_signup(data: &SignupData) -> Result<(), ValidationError> {
    require(&data.username, "username")?;
    require(&data.email, "email")?;
    require(&data.first_name, "first_name")?;
    require(&data.last_name, "last_name")?;
    require(&data.password, "password")?;
    require(&data.password2, "password2")?;
    if data.password != data.password2 {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}

#[derive(Clone)]
pub struct AuthSession {
    backend: Arc<dyn Backend>,
    state: Arc<Mutex<AuthState>>,
}

impl AuthSession {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(AuthState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> AuthState {
        self.lock().clone()
    }

    pub fn user(&self) -> Option<User> {
        match &self.lock().status {
            AuthStatus::SignedIn(user) => Some(user.clone()),
            _ => None,
        }
    }

    pub fn is_signed_in(&self) -> bool {
        matches!(self.lock().status, AuthStatus::SignedIn(_))
    }

    pub fn is_admin(&self) -> bool {
        self.user().is_some_and(|u| u.is_admin())
    }

    pub fn is_loading(&self) -> bool {
        let state = self.lock();
        state.loading || state.status == AuthStatus::Resolving
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn dismiss_error(&self) {
        self.lock().error = None;
    }

    pub fn guard_state(&self) -> GuardState {
        match &self.lock().status {
            AuthStatus::Resolving => GuardState::ResolvingAuth,
            AuthStatus::SignedOut => GuardState::Unauthenticated,
            AuthStatus::SignedIn(user) => GuardState::Authenticated(user.role),
        }
    }

    fn begin(&self) {
        let mut state = self.lock();
        state.loading = true;
        state.error = None;
    }

    fn fail(&self, err: ApiError, fallback: &str) -> ApiError {
        if !matches!(err, ApiError::Validation(_)) {
            warn!(error = %err, "{}", fallback);
        }
        let mut state = self.lock();
        state.error = Some(err.user_message(fallback));
        state.loading = false;
        err
    }

    fn signed_in(&self, user: &User) {
        let mut state = self.lock();
        state.status = AuthStatus::SignedIn(user.clone());
        state.loading = false;
    }

    /// Ask the backend who we are. Any failure counts as signed out.
    pub async fn resolve(&self) -> Option<User> {
        self.lock().status = AuthStatus::Resolving;

        match self.backend.profile().await {
            Ok(user) => {
                debug!(username = %user.username, "Restored session");
                self.signed_in(&user);
                Some(user)
            }
            Err(err) => {
                debug!(error = %err, "No active session");
                self.lock().status = AuthStatus::SignedOut;
                None
            }
        }
    }

    pub async fn login(&self, credentials: &LoginCredentials) -> Result<User, ApiError> {
        if let Err(err) = validate_login(credentials) {
            return Err(self.fail(err.into(), "Login failed"));
        }

        self.begin();
        match self.backend.login(credentials).await {
            Ok(user) => {
                info!(username = %user.username, "Logged in");
                self.signed_in(&user);
                Ok(user)
            }
            Err(err) => Err(self.fail(err, "Login failed")),
        }
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        self.begin();
        match self.backend.logout().await {
            Ok(()) => {
                info!("Logged out");
                self.sign_out_locally();
                Ok(())
            }
            Err(err) => Err(self.fail(err, "Logout failed")),
        }
    }

    pub async fn signup(&self, data: &SignupData) -> Result<User, ApiError> {
        if let Err(err) = validate_signup(data) {
            return Err(self.fail(err.into(), "Signup failed"));
        }

        self.begin();
        match self.backend.signup(data).await {
            Ok(user) => {
                info!(username = %user.username, "Signed up");
                self.signed_in(&user);
                Ok(user)
            }
            Err(err) => Err(self.fail(err, "Signup failed")),
        }
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        self.begin();
        match self.backend.update_profile(update).await {
            Ok(user) => {
                info!(username = %user.username, "Profile updated");
                self.signed_in(&user);
                Ok(user)
            }
            Err(err) => Err(self.fail(err, "Failed to update profile")),
        }
    }

    /// All accounts; the backend only answers this for admins.
    pub async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        self.begin();
        match self.backend.list_users().await {
            Ok(users) => {
                let mut state = self.lock();
                state.users = users.clone();
                state.loading = false;
                Ok(users)
            }
            Err(err) => Err(self.fail(err, "Failed to fetch users")),
        }
    }

    /// Forget the user without calling the backend, e.g. after a 401.
    pub fn sign_out_locally(&self) {
        let mut state = self.lock();
        state.status = AuthStatus::SignedOut;
        state.loading = false;
        state.users.clear();
    }
}
