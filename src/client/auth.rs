use std::sync::Arc;

use super::{
    ClientError,
    api::StorefrontApi,
    storage::{REMEMBER_ME_KEY, Storage, TOKEN_KEY, USER_KEY, read_json, write_json},
};
use crate::{dto::auth::RegisterRequest, models::User};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub token: Option<String>,
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthAction {
    LoginStart,
    LoginSuccess { token: String, user: User },
    LoginFailure(String),
    /// Session restore failed; the session is unauthenticated.
    RestoreFailure(String),
    Logout,
    UpdateUser(User),
    ClearError,
    SetLoading(bool),
}

pub fn reduce(state: &AuthState, action: AuthAction) -> AuthState {
    match action {
        AuthAction::LoginStart => AuthState {
            loading: true,
            error: None,
            ..state.clone()
        },
        AuthAction::LoginSuccess { token, user } => AuthState {
            token: Some(token),
            user: Some(user),
            is_authenticated: true,
            loading: false,
            error: None,
        },
        AuthAction::LoginFailure(message) | AuthAction::RestoreFailure(message) => AuthState {
            token: None,
            user: None,
            is_authenticated: false,
            loading: false,
            error: Some(message),
        },
        AuthAction::Logout => AuthState::default(),
        AuthAction::UpdateUser(user) => AuthState {
            user: Some(user),
            ..state.clone()
        },
        AuthAction::ClearError => AuthState {
            error: None,
            ..state.clone()
        },
        AuthAction::SetLoading(loading) => AuthState {
            loading,
            ..state.clone()
        },
    }
}

/// Whether stored credentials survive a failed session restore.
///
/// A rejected token is never kept. Anything else (server down, network
/// error) keeps the credentials only for remember-me sessions.
pub fn keep_credentials_after(error: &ClientError, remember_me: bool) -> bool {
    !error.is_auth_failure() && remember_me
}

/// Session holder backed by a [`Storage`].
pub struct AuthStore {
    api: Arc<dyn StorefrontApi>,
    storage: Arc<dyn Storage>,
    state: AuthState,
}

impl AuthStore {
    pub fn new(api: Arc<dyn StorefrontApi>, storage: Arc<dyn Storage>) -> Self {
        Self {
            api,
            storage,
            state: AuthState::default(),
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn token(&self) -> Option<&str> {
        self.state.token.as_deref()
    }

    pub fn dispatch(&mut self, action: AuthAction) {
        self.state = reduce(&self.state, action);
    }

    fn persist(&self, token: &str, user: &User, remember_me: bool) -> Result<(), ClientError> {
        self.storage.set(TOKEN_KEY, token)?;
        write_json(self.storage.as_ref(), USER_KEY, user)?;
        if remember_me {
            self.storage.set(REMEMBER_ME_KEY, "true")
        } else {
            self.storage.remove(REMEMBER_ME_KEY)
        }
    }

    fn forget(&self) -> Result<(), ClientError> {
        self.storage.remove(TOKEN_KEY)?;
        self.storage.remove(USER_KEY)?;
        self.storage.remove(REMEMBER_ME_KEY)
    }

    fn remember_me(&self) -> Result<bool, ClientError> {
        Ok(self.storage.get(REMEMBER_ME_KEY)?.as_deref() == Some("true"))
    }

    pub async fn login(
        &mut self,
        email: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<(), ClientError> {
        self.dispatch(AuthAction::LoginStart);
        match self.api.login(email, password).await {
            Ok(auth) => {
                self.persist(&auth.token, &auth.user, remember_me)?;
                self.dispatch(AuthAction::LoginSuccess {
                    token: auth.token,
                    user: auth.user,
                });
                Ok(())
            }
            Err(err) => {
                self.dispatch(AuthAction::LoginFailure(err.user_message()));
                Err(err)
            }
        }
    }

    pub async fn register(&mut self, request: &RegisterRequest) -> Result<(), ClientError> {
        self.dispatch(AuthAction::LoginStart);
        match self.api.register(request).await {
            Ok(auth) => {
                self.persist(&auth.token, &auth.user, false)?;
                self.dispatch(AuthAction::LoginSuccess {
                    token: auth.token,
                    user: auth.user,
                });
                Ok(())
            }
            Err(err) => {
                self.dispatch(AuthAction::LoginFailure(err.user_message()));
                Err(err)
            }
        }
    }

    pub fn logout(&mut self) -> Result<(), ClientError> {
        self.forget()?;
        self.dispatch(AuthAction::Logout);
        Ok(())
    }

    pub fn update_user(&mut self, user: User) -> Result<(), ClientError> {
        write_json(self.storage.as_ref(), USER_KEY, &user)?;
        self.dispatch(AuthAction::UpdateUser(user));
        Ok(())
    }

    /// Re-validate a stored token against the profile endpoint.
    ///
    /// The cached user snapshot is only a hint; the session becomes
    /// authenticated solely on a successful profile fetch.
    pub async fn restore_session(&mut self) -> Result<(), ClientError> {
        let Some(token) = self.storage.get(TOKEN_KEY)? else {
            self.dispatch(AuthAction::SetLoading(false));
            return Ok(());
        };

        self.dispatch(AuthAction::LoginStart);
        match self.api.profile(&token).await {
            Ok(user) => {
                write_json(self.storage.as_ref(), USER_KEY, &user)?;
                self.dispatch(AuthAction::LoginSuccess { token, user });
            }
            Err(err) => {
                let remember_me = self.remember_me()?;
                let keep = keep_credentials_after(&err, remember_me);
                tracing::warn!(error = %err, keep_credentials = keep, "session restore failed");
                if !keep {
                    self.forget()?;
                }
                self.dispatch(AuthAction::RestoreFailure(err.user_message()));
            }
        }
        Ok(())
    }

    /// The user snapshot stored by the last successful login, if any.
    pub fn cached_user(&self) -> Result<Option<User>, ClientError> {
        read_json(self.storage.as_ref(), USER_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{
        storage::MemoryStorage,
        testing::{FakeApi, ProfileReply, user},
    };

    fn store(api: Arc<FakeApi>, storage: Arc<MemoryStorage>) -> AuthStore {
        AuthStore::new(api, storage)
    }

    #[test]
    fn reducer_tracks_login_lifecycle() {
        let state = reduce(&AuthState::default(), AuthAction::LoginStart);
        assert!(state.loading);

        let u = user();
        let state = reduce(
            &state,
            AuthAction::LoginSuccess {
                token: "t".into(),
                user: u.clone(),
            },
        );
        assert!(state.is_authenticated);
        assert!(!state.loading);
        assert_eq!(state.user, Some(u));

        let state = reduce(&state, AuthAction::Logout);
        assert_eq!(state, AuthState::default());

        let state = reduce(&state, AuthAction::LoginFailure("nope".into()));
        assert_eq!(state.error.as_deref(), Some("nope"));
        let state = reduce(&state, AuthAction::ClearError);
        assert_eq!(state.error, None);
    }

    #[test]
    fn rejected_tokens_are_never_kept() {
        let rejected = ClientError::Unauthorized("Not authorized, token failed".into());
        assert!(!keep_credentials_after(&rejected, true));
        assert!(!keep_credentials_after(&rejected, false));

        let outage = ClientError::Api {
            status: 503,
            message: "down".into(),
        };
        assert!(keep_credentials_after(&outage, true));
        assert!(!keep_credentials_after(&outage, false));
    }

    #[tokio::test]
    async fn login_persists_the_session() {
        let api = Arc::new(FakeApi::new());
        let storage = Arc::new(MemoryStorage::default());
        let mut auth = store(api.clone(), storage.clone());

        auth.login("jane@example.com", "secret1", true).await.unwrap();
        assert!(auth.state().is_authenticated);
        assert_eq!(auth.token(), Some("token-1"));
        assert_eq!(storage.get(TOKEN_KEY).unwrap().as_deref(), Some("token-1"));
        assert_eq!(storage.get(REMEMBER_ME_KEY).unwrap().as_deref(), Some("true"));
        assert_eq!(auth.cached_user().unwrap(), Some(api.user.clone()));

        auth.logout().unwrap();
        assert!(!auth.state().is_authenticated);
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn failed_login_reports_the_server_message() {
        let api = Arc::new(FakeApi::new());
        let mut auth = store(api, Arc::new(MemoryStorage::default()));
        let err = auth.login("jane@example.com", "wrong", false).await.unwrap_err();
        assert!(err.is_auth_failure());
        assert_eq!(auth.state().error.as_deref(), Some("Invalid email or password"));
        assert!(!auth.state().loading);
    }

    #[tokio::test]
    async fn restore_succeeds_with_a_valid_token() {
        let api = Arc::new(FakeApi::new());
        let storage = Arc::new(MemoryStorage::default());
        storage.set(TOKEN_KEY, "token-1").unwrap();

        let mut auth = store(api.clone(), storage);
        auth.restore_session().await.unwrap();
        assert!(auth.state().is_authenticated);
        assert_eq!(auth.state().user, Some(api.user.clone()));
    }

    #[tokio::test]
    async fn restore_without_a_token_does_not_call_the_server() {
        let api = Arc::new(FakeApi::new());
        let mut auth = store(api.clone(), Arc::new(MemoryStorage::default()));
        auth.restore_session().await.unwrap();
        assert!(!auth.state().is_authenticated);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn rejected_restore_clears_credentials_even_with_remember_me() {
        let api = Arc::new(FakeApi::new());
        *api.profile.lock().unwrap() = ProfileReply::Unauthorized;
        let storage = Arc::new(MemoryStorage::default());
        storage.set(TOKEN_KEY, "stale").unwrap();
        storage.set(REMEMBER_ME_KEY, "true").unwrap();

        let mut auth = store(api, storage.clone());
        auth.restore_session().await.unwrap();
        assert!(!auth.state().is_authenticated);
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
        assert_eq!(storage.get(REMEMBER_ME_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn outage_keeps_remembered_credentials_but_stays_logged_out() {
        let api = Arc::new(FakeApi::new());
        *api.profile.lock().unwrap() = ProfileReply::ServerError;
        let storage = Arc::new(MemoryStorage::default());
        storage.set(TOKEN_KEY, "token-1").unwrap();
        storage.set(REMEMBER_ME_KEY, "true").unwrap();

        let mut auth = store(api, storage.clone());
        auth.restore_session().await.unwrap();
        assert!(!auth.state().is_authenticated);
        assert_eq!(auth.state().error.as_deref(), Some("Service Unavailable"));
        assert_eq!(storage.get(TOKEN_KEY).unwrap().as_deref(), Some("token-1"));
    }

    #[tokio::test]
    async fn outage_without_remember_me_clears_credentials() {
        let api = Arc::new(FakeApi::new());
        *api.profile.lock().unwrap() = ProfileReply::ServerError;
        let storage = Arc::new(MemoryStorage::default());
        storage.set(TOKEN_KEY, "token-1").unwrap();

        let mut auth = store(api, storage.clone());
        auth.restore_session().await.unwrap();
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
    }
}
