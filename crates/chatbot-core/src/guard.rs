//! Route table and access decisions shared by both front ends.

use std::fmt;

use crate::models::UserRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Signup,
    Conversations,
    Account,
    Unauthorized,
    DataSources,
    DataSourceCreate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Private,
    AdminOnly,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Signup => "/signup",
            Route::Conversations => "/conversations",
            Route::Account => "/account",
            Route::Unauthorized => "/unauthorized",
            Route::DataSources => "/datasources",
            Route::DataSourceCreate => "/datasources/new",
        }
    }

    /// Unknown paths land on the conversations page.
    pub fn parse(path: &str) -> Route {
        let trimmed = path.trim();
        let normalized = if trimmed.len() > 1 {
            trimmed.trim_end_matches('/')
        } else {
            trimmed
        };
        match normalized {
            "/login" => Route::Login,
            "/signup" => Route::Signup,
            "/account" => Route::Account,
            "/unauthorized" => Route::Unauthorized,
            "/datasources" => Route::DataSources,
            "/datasources/new" => Route::DataSourceCreate,
            _ => Route::Conversations,
        }
    }

    pub fn access(&self) -> Access {
        match self {
            Route::Login | Route::Signup => Access::Public,
            Route::Conversations | Route::Account | Route::Unauthorized => Access::Private,
            Route::DataSources | Route::DataSourceCreate => Access::AdminOnly,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    ResolvingAuth,
    Unauthenticated,
    Authenticated(UserRole),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Loading,
    Render,
    Redirect(Route),
}

pub fn evaluate(route: Route, state: GuardState) -> Decision {
    match (state, route.access()) {
        (GuardState::ResolvingAuth, _) => Decision::Loading,
        (_, Access::Public) => Decision::Render,
        (GuardState::Unauthenticated, _) => Decision::Redirect(Route::Login),
        (GuardState::Authenticated(UserRole::User), Access::AdminOnly) => {
            Decision::Redirect(Route::Unauthorized)
        }
        (GuardState::Authenticated(_), _) => Decision::Render,
    }
}

/// Tracks the route the user asked for and decides what to show for it.
///
/// Nothing is cached: every call to [`resolve`](Navigator::resolve) evaluates
/// the requested route against the auth state passed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigator {
    requested: Route,
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new(Route::Conversations)
    }
}

impl Navigator {
    pub fn new(requested: Route) -> Self {
        Self { requested }
    }

    pub fn requested(&self) -> Route {
        self.requested
    }

    pub fn navigate(&mut self, route: Route) {
        self.requested = route;
    }

    /// The route to show, following redirects. `None` while auth resolves.
    pub fn resolve(&mut self, state: GuardState) -> Option<Route> {
        match evaluate(self.requested, state) {
            Decision::Loading => None,
            Decision::Render => Some(self.requested),
            Decision::Redirect(target) => {
                self.requested = target;
                Some(target)
            }
        }
    }

    /// The backend rejected the session; go back to the login page.
    pub fn on_unauthorized(&mut self) {
        self.requested = Route::Login;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADMIN: GuardState = GuardState::Authenticated(UserRole::Admin);
    const USER: GuardState = GuardState::Authenticated(UserRole::User);

    #[test]
    fn test_parse_and_fallback() {
        assert_eq!(Route::parse("/datasources/new/"), Route::DataSourceCreate);
        assert_eq!(Route::parse("/login"), Route::Login);
        assert_eq!(Route::parse("/"), Route::Conversations);
        assert_eq!(Route::parse("/nowhere"), Route::Conversations);
        assert_eq!(Route::DataSources.to_string(), "/datasources");
    }

    #[test]
    fn test_resolving_blocks_every_route() {
        for route in [Route::Login, Route::Conversations, Route::DataSources] {
            assert_eq!(evaluate(route, GuardState::ResolvingAuth), Decision::Loading);
        }
    }

    #[test]
    fn test_decisions_per_state() {
        let anon = GuardState::Unauthenticated;
        assert_eq!(evaluate(Route::Signup, anon), Decision::Render);
        assert_eq!(evaluate(Route::Account, anon), Decision::Redirect(Route::Login));
        assert_eq!(evaluate(Route::DataSources, anon), Decision::Redirect(Route::Login));

        assert_eq!(evaluate(Route::Conversations, USER), Decision::Render);
        assert_eq!(
            evaluate(Route::DataSourceCreate, USER),
            Decision::Redirect(Route::Unauthorized)
        );
        assert_eq!(evaluate(Route::Unauthorized, USER), Decision::Render);

        assert_eq!(evaluate(Route::DataSourceCreate, ADMIN), Decision::Render);
        assert_eq!(evaluate(Route::Login, ADMIN), Decision::Render);
    }

    #[test]
    fn test_navigator_re_evaluates_each_time() {
        let mut nav = Navigator::new(Route::DataSources);
        assert_eq!(nav.resolve(GuardState::ResolvingAuth), None);
        assert_eq!(nav.resolve(ADMIN), Some(Route::DataSources));

        nav.on_unauthorized();
        assert_eq!(nav.resolve(GuardState::Unauthenticated), Some(Route::Login));

        nav.navigate(Route::DataSources);
        assert_eq!(nav.resolve(USER), Some(Route::Unauthorized));
    }
}
