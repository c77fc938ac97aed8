//! User session lifecycle on top of [`ApiClient`].
//!
//! The client only ever refreshes tokens. Deciding that a session is over
//! (clearing tokens, forgetting the user) happens here.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError, RequestConfig};
use crate::models::{LoginRequest, Profile, SignupRequest, TokenPair};

pub const LOGIN_PATH: &str = "/api/auth/login/";
pub const SIGNUP_PATH: &str = "/api/auth/signup/";
pub const PROFILE_PATH: &str = "/api/auth/profile/";

pub struct Session {
    client: ApiClient,
    user: Option<Profile>,
    ready: bool,
}

impl Session {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            user: None,
            ready: false,
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn current_user(&self) -> Option<&Profile> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// True once `hydrate` has run, whatever its outcome.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Sign in, store both tokens, then load the profile.
    pub async fn login(&mut self, credentials: &LoginRequest) -> Result<&Profile, ApiError> {
        debug!(user = credentials.identifier(), "Logging in");
        let pair: TokenPair = self.client.post_json(LOGIN_PATH, credentials).await?;
        self.client
            .tokens()
            .set_pair(&pair.access, &pair.refresh)
            .map_err(|e| ApiError::Storage(format!("{:#}", e)))?;

        let profile = self.profile().await?;
        info!(user = %profile.username, "Logged in");
        Ok(profile)
    }

    /// Create an account. Does not sign in, and never sends stored tokens.
    pub async fn signup(&self, request: &SignupRequest) -> Result<Value, ApiError> {
        self.client
            .post_json_with(SIGNUP_PATH, request, RequestConfig::new().anonymous())
            .await
    }

    /// Fetch the current user and remember it.
    pub async fn profile(&mut self) -> Result<&Profile, ApiError> {
        let profile: Profile = self.client.get_json(PROFILE_PATH).await?;
        Ok(self.user.insert(profile))
    }

    /// Forget the user and remove both tokens.
    pub fn logout(&mut self) -> Result<(), ApiError> {
        self.user = None;
        self.client
            .tokens()
            .clear()
            .map_err(|e| ApiError::Storage(format!("{:#}", e)))?;
        info!("Logged out");
        Ok(())
    }

    /// Restore the session from stored tokens at startup.
    ///
    /// With no access token the session simply starts signed out. If the
    /// profile cannot be loaded (even after the client's refresh attempt)
    /// the stored tokens are discarded.
    pub async fn hydrate(&mut self) -> bool {
        let restored = if self.client.tokens().access().is_some() {
            match self.profile().await {
                Ok(profile) => {
                    debug!(user = %profile.username, "Session restored");
                    true
                }
                Err(e) => {
                    warn!(error = %e, "Stored session is no longer valid");
                    self.discard_tokens();
                    false
                }
            }
        } else {
            self.user = None;
            false
        };
        self.ready = true;
        restored
    }

    /// Apply the session-expired policy to a failed call.
    ///
    /// A 401 that reaches the caller has already survived one refresh and
    /// retry, so the stored tokens are useless: clear them and sign out.
    /// Returns true if the session was ended.
    pub fn handle_session_expired(&mut self, err: &ApiError) -> bool {
        if !err.is_unauthorized() {
            return false;
        }
        info!("Session expired");
        self.discard_tokens();
        true
    }

    fn discard_tokens(&mut self) {
        self.user = None;
        if let Err(e) = self.client.tokens().clear() {
            warn!(error = %e, "Failed to clear stored tokens");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Tokens;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn session_for(server: &MockServer) -> Session {
        let client =
            ApiClient::new(&server.uri(), Tokens::in_memory(), Duration::from_secs(5)).unwrap();
        Session::new(client)
    }

    #[tokio::test]
    async fn test_login_stores_tokens_and_loads_profile() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .and(body_json(serde_json::json!({"username": "ana", "password": "pw"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access": "A1", "refresh": "R1"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(PROFILE_PATH))
            .and(header("Authorization", "Bearer A1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"username": "ana"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut session = session_for(&server).await;
        let profile = session
            .login(&LoginRequest::username("ana", "pw"))
            .await
            .unwrap();
        assert_eq!(profile.username, "ana");
        assert!(session.is_authenticated());
        assert_eq!(session.client().tokens().refresh().as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn test_failed_login_stores_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"detail":"No active account"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let mut session = session_for(&server).await;
        let err = session
            .login(&LoginRequest::email("ana@x.io", "bad"))
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(session.client().tokens().access(), None);
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_signup_ignores_stored_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SIGNUP_PATH))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"username": "cy"})))
            .expect(1)
            .mount(&server)
            .await;

        let session = session_for(&server).await;
        session.client().tokens().set_pair("STALE", "R1").unwrap();

        let created = session
            .signup(&SignupRequest::new("cy", "cy@x.io", "pw"))
            .await
            .unwrap();
        assert_eq!(created["username"], "cy");

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].headers.contains_key("authorization"));
        assert_eq!(session.client().tokens().access().as_deref(), Some("STALE"));
    }

    #[tokio::test]
    async fn test_hydrate_without_tokens_is_signed_out() {
        let server = MockServer::start().await;
        let mut session = session_for(&server).await;

        assert!(!session.is_ready());
        assert!(!session.hydrate().await);
        assert!(session.is_ready());
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_hydrate_clears_invalid_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PROFILE_PATH))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let mut session = session_for(&server).await;
        session.client().tokens().set_access("stale").unwrap();

        assert!(!session.hydrate().await);
        assert!(session.is_ready());
        assert_eq!(session.client().tokens().access(), None);
    }

    #[tokio::test]
    async fn test_logout_clears_everything() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PROFILE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"username": "bo"})))
            .mount(&server)
            .await;

        let mut session = session_for(&server).await;
        session.client().tokens().set_pair("A1", "R1").unwrap();
        assert!(session.hydrate().await);
        assert_eq!(session.current_user().map(|u| u.username.as_str()), Some("bo"));

        session.logout().unwrap();
        assert!(!session.is_authenticated());
        assert_eq!(session.client().tokens().access(), None);
        assert_eq!(session.client().tokens().refresh(), None);
    }

    #[tokio::test]
    async fn test_session_expired_policy_only_applies_to_401() {
        let server = MockServer::start().await;
        let mut session = session_for(&server).await;
        session.client().tokens().set_pair("A1", "R1").unwrap();

        let server_error = ApiError::from_status(reqwest::StatusCode::BAD_GATEWAY, "");
        assert!(!session.handle_session_expired(&server_error));
        assert!(session.client().tokens().access().is_some());

        let unauthorized = ApiError::from_status(reqwest::StatusCode::UNAUTHORIZED, "");
        assert!(session.handle_session_expired(&unauthorized));
        assert_eq!(session.client().tokens().access(), None);
    }
}
