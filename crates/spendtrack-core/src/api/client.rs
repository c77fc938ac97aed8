//! API client for the spendtrack REST API.
//!
//! Every request runs through the same pipeline:
//!
//! 1. attach the stored access token as a bearer credential (if any),
//! 2. dispatch through the [`Transport`],
//! 3. on a first 401 with a refresh token available, refresh the access
//!    token (single-flight across all concurrent requests) and replay the
//!    request exactly once.
//!
//! Any other failure is returned to the caller untouched.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::refresh::{RefreshCoordinator, Role, SettleOnDrop};
use super::transport::{ApiRequest, ApiResponse, ReqwestTransport, Transport};
use super::ApiError;
use crate::auth::Tokens;
use crate::config::Config;
use crate::models::{RefreshRequest, RefreshResponse};

// ============================================================================
// Constants
// ============================================================================

/// Endpoint that exchanges a refresh token for a new access token
pub const REFRESH_PATH: &str = "/api/auth/refresh/";

/// Per-request options: query parameters, extra headers and whether the
/// request carries the stored credential at all.
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub anonymous: bool,
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Send without a bearer credential and never refresh on 401.
    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }

    /// Build query parameters from a serializable struct. Fields that
    /// serialize to `null` are left out.
    pub fn with_params<P: Serialize>(params: &P) -> Result<Self, ApiError> {
        let value = serde_json::to_value(params)
            .map_err(|e| ApiError::Config(format!("Invalid query parameters: {}", e)))?;
        let Value::Object(fields) = value else {
            return Err(ApiError::Config(
                "Query parameters must serialize to an object".to_string(),
            ));
        };

        let mut config = Self::new();
        for (key, value) in fields {
            match value {
                Value::Null => {}
                Value::String(s) => config.query.push((key, s)),
                other => config.query.push((key, other.to_string())),
            }
        }
        Ok(config)
    }
}

struct ClientInner {
    base_url: String,
    transport: Arc<dyn Transport>,
    tokens: Tokens,
    refresh: RefreshCoordinator,
}

impl ClientInner {
    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Exchange the stored refresh token for a new access token and store it.
    async fn refresh_access_token(&self) -> Result<(), ApiError> {
        let refresh = self
            .tokens
            .refresh()
            .ok_or_else(|| ApiError::Storage("No refresh token stored".to_string()))?;

        let mut request = ApiRequest::new(Method::POST, self.url(REFRESH_PATH));
        request.body = Some(
            serde_json::to_value(RefreshRequest { refresh })
                .map_err(|e| ApiError::Config(e.to_string()))?,
        );

        let response = self.transport.send(request).await?.error_for_status()?;
        let RefreshResponse { access } = response.json()?;

        self.tokens
            .set_access(&access)
            .map_err(|e| ApiError::Storage(format!("{:#}", e)))
    }
}

/// Authenticated API client.
/// Clone is cheap and clones share tokens, transport and refresh state.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    /// Create a client that talks HTTP to `base_url`.
    pub fn new(base_url: &str, tokens: Tokens, timeout: Duration) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new(timeout)?;
        Self::with_transport(base_url, tokens, Arc::new(transport))
    }

    pub fn from_config(config: &Config, tokens: Tokens) -> Result<Self, ApiError> {
        Self::new(config.api_url(), tokens, config.timeout())
    }

    /// Create a client with a custom transport.
    pub fn with_transport(
        base_url: &str,
        tokens: Tokens,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ApiError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ApiError::Config(format!(
                "Base URL must start with http:// or https://, got '{}'",
                base_url
            )));
        }

        Ok(Self {
            inner: Arc::new(ClientInner {
                base_url: base_url.to_string(),
                transport,
                tokens,
                refresh: RefreshCoordinator::new(),
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn tokens(&self) -> &Tokens {
        &self.inner.tokens
    }

    /// Whether a token refresh is in flight right now.
    pub fn is_refreshing(&self) -> bool {
        self.inner.refresh.is_refreshing()
    }

    fn attach_credential(&self, request: &mut ApiRequest) -> Result<(), ApiError> {
        if let Some(token) = self.inner.tokens.access() {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                ApiError::Storage("Stored access token is not a valid header value".to_string())
            })?;
            value.set_sensitive(true);
            request.headers.insert(header::AUTHORIZATION, value);
        } else {
            request.headers.remove(header::AUTHORIZATION);
        }
        Ok(())
    }

    /// Send a request through the full pipeline.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        config: Option<RequestConfig>,
    ) -> Result<ApiResponse, ApiError> {
        let config = config.unwrap_or_default();
        let anonymous = config.anonymous;
        let mut request = ApiRequest {
            method,
            url: self.inner.url(path),
            headers: config.headers,
            query: config.query,
            body,
        };

        let mut retried = false;
        loop {
            if !anonymous {
                self.attach_credential(&mut request)?;
            }
            let response = self.inner.transport.send(request.clone()).await?;
            if response.is_success() {
                return Ok(response);
            }

            if response.status != StatusCode::UNAUTHORIZED
                || anonymous
                || retried
                || self.inner.tokens.refresh().is_none()
            {
                return response.error_for_status();
            }

            debug!(method = %request.method, url = %request.url, "Access token rejected");
            self.await_refresh().await;
            retried = true;
        }
    }

    /// Wait for a refresh to settle, starting one if none is in flight.
    async fn await_refresh(&self) {
        let wake = match self.inner.refresh.join() {
            Role::Leader(wake) => {
                self.spawn_refresh();
                wake
            }
            Role::Waiter(wake) => {
                debug!("Token refresh already in flight, waiting");
                wake
            }
        };
        wake.settled().await;
    }

    /// The refresh runs in its own task so it still settles (and wakes
    /// everyone queued on it) if the request that started it is dropped.
    fn spawn_refresh(&self) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let _settle = SettleOnDrop(&inner.refresh);
            info!("Refreshing access token");
            match inner.refresh_access_token().await {
                Ok(()) => info!("Access token refreshed"),
                Err(e) => warn!(error = %e, "Token refresh failed"),
            }
        });
    }

    // ===== Verb helpers =====

    pub async fn get(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.request(Method::GET, path, None, None).await
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse, ApiError> {
        self.request(Method::POST, path, Some(to_body(body)?), None)
            .await
    }

    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse, ApiError> {
        self.request(Method::PATCH, path, Some(to_body(body)?), None)
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.request(Method::DELETE, path, None, None).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.get(path).await?.json()
    }

    pub async fn get_json_with<T: DeserializeOwned>(
        &self,
        path: &str,
        config: RequestConfig,
    ) -> Result<T, ApiError> {
        self.request(Method::GET, path, None, Some(config))
            .await?
            .json()
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.post(path, body).await?.json()
    }

    pub async fn post_json_with<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        config: RequestConfig,
    ) -> Result<T, ApiError> {
        self.request(Method::POST, path, Some(to_body(body)?), Some(config))
            .await?
            .json()
    }

    pub async fn patch_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.patch(path, body).await?.json()
    }
}

fn to_body<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiError> {
    serde_json::to_value(body)
        .map_err(|e| ApiError::InvalidResponse(format!("Failed to serialize request body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::future::join_all;
    use tokio::sync::Notify;

    const BASE: &str = "http://api.test";

    #[derive(Debug, Clone, PartialEq)]
    struct Call {
        path: String,
        bearer: Option<String>,
    }

    /// Scripted server: resources accept only the current valid access
    /// token, the refresh endpoint hands out `next_access`.
    struct FakeServer {
        calls: Mutex<Vec<Call>>,
        valid_access: Mutex<String>,
        next_access: String,
        refresh_status: StatusCode,
        forced_status: Option<StatusCode>,
        gate: Option<Notify>,
    }

    impl FakeServer {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                valid_access: Mutex::new("A2".to_string()),
                next_access: "A2".to_string(),
                refresh_status: StatusCode::OK,
                forced_status: None,
                gate: None,
            }
        }

        fn gated(mut self) -> Self {
            self.gate = Some(Notify::new());
            self
        }

        fn release_refresh(&self) {
            if let Some(ref gate) = self.gate {
                gate.notify_one();
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn calls_to(&self, path: &str) -> Vec<Call> {
            self.calls().into_iter().filter(|c| c.path == path).collect()
        }

        fn refresh_calls(&self) -> usize {
            self.calls_to(REFRESH_PATH).len()
        }
    }

    #[async_trait]
    impl Transport for FakeServer {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
            let path = request.url.trim_start_matches(BASE).to_string();
            self.calls.lock().unwrap().push(Call {
                path: path.clone(),
                bearer: request.bearer_token().map(str::to_string),
            });

            if path == REFRESH_PATH {
                if let Some(ref gate) = self.gate {
                    gate.notified().await;
                }
                if !self.refresh_status.is_success() {
                    return Ok(ApiResponse::new(self.refresh_status, r#"{"detail":"bad token"}"#));
                }
                *self.valid_access.lock().unwrap() = self.next_access.clone();
                let body = serde_json::json!({ "access": self.next_access });
                return Ok(ApiResponse::new(StatusCode::OK, body.to_string()));
            }

            if let Some(status) = self.forced_status {
                return Ok(ApiResponse::new(status, "forced"));
            }

            let valid = self.valid_access.lock().unwrap().clone();
            if request.bearer_token() == Some(valid.as_str()) {
                let body = serde_json::json!({ "path": path });
                Ok(ApiResponse::new(StatusCode::OK, body.to_string()))
            } else {
                Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, r#"{"detail":"expired"}"#))
            }
        }
    }

    fn client_for(server: &Arc<FakeServer>, access: Option<&str>, refresh: Option<&str>) -> ApiClient {
        let tokens = Tokens::in_memory();
        if let Some(access) = access {
            tokens.set_access(access).unwrap();
        }
        if let Some(refresh) = refresh {
            tokens.set_refresh(refresh).unwrap();
        }
        let transport: Arc<dyn Transport> = server.clone();
        ApiClient::with_transport(BASE, tokens, transport).unwrap()
    }

    async fn wait_for_queued(client: &ApiClient, n: usize) {
        while client.inner.refresh.queued() < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_attaches_bearer_token_when_present() {
        let server = Arc::new(FakeServer::new());
        let client = client_for(&server, Some("A2"), None);

        client.get("/api/expenses/").await.unwrap();
        client.post("/api/categories/", &serde_json::json!({"name": "x"})).await.unwrap();

        for call in server.calls() {
            assert_eq!(call.bearer.as_deref(), Some("A2"));
        }
    }

    #[tokio::test]
    async fn test_no_authorization_header_without_token() {
        let server = Arc::new(FakeServer::new());
        let client = client_for(&server, None, None);

        let err = client.get("/api/auth/profile/").await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(server.calls(), vec![Call { path: "/api/auth/profile/".into(), bearer: None }]);
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_request_replayed() {
        let server = Arc::new(FakeServer::new());
        let client = client_for(&server, Some("A1"), Some("R1"));

        let response = client.get("/api/expenses/").await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(client.tokens().access().as_deref(), Some("A2"));

        let calls = server.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].bearer.as_deref(), Some("A1"));
        assert_eq!(calls[1].path, REFRESH_PATH);
        assert_eq!(calls[1].bearer, None);
        assert_eq!(calls[2].bearer.as_deref(), Some("A2"));
        assert!(!client.is_refreshing());
    }

    #[tokio::test]
    async fn test_non_401_failure_passes_through_without_refresh() {
        let mut server = FakeServer::new();
        server.forced_status = Some(StatusCode::INTERNAL_SERVER_ERROR);
        let server = Arc::new(server);
        let client = client_for(&server, Some("A1"), Some("R1"));

        let err = client.get("/api/reports/summary/").await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(err.body(), Some("forced"));
        assert_eq!(server.calls().len(), 1);
        assert_eq!(server.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_retries_at_most_once() {
        let mut server = FakeServer::new();
        server.forced_status = Some(StatusCode::UNAUTHORIZED);
        let server = Arc::new(server);
        let client = client_for(&server, Some("A1"), Some("R1"));

        let err = client.get("/api/expenses/").await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(server.calls_to("/api/expenses/").len(), 2);
        assert_eq!(server.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_401_without_refresh_token_is_not_retried() {
        let server = Arc::new(FakeServer::new());
        let client = client_for(&server, Some("A1"), None);

        let err = client.get("/api/expenses/").await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(server.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_401s_share_one_refresh() {
        let server = Arc::new(FakeServer::new().gated());
        let client = client_for(&server, Some("A1"), Some("R1"));

        let paths: Vec<String> = (0..5).map(|i| format!("/api/expenses/{}/", i)).collect();
        let requests = join_all(paths.iter().map(|p| client.get(p)));
        let release = async {
            wait_for_queued(&client, paths.len()).await;
            server.release_refresh();
        };
        let (results, ()) = tokio::join!(requests, release);

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(server.refresh_calls(), 1);
        for path in &paths {
            let calls = server.calls_to(path);
            assert_eq!(calls.len(), 2);
            assert_eq!(calls[1].bearer.as_deref(), Some("A2"));
        }
    }

    #[tokio::test]
    async fn test_waiters_resume_in_arrival_order() {
        let server = Arc::new(FakeServer::new().gated());
        let client = client_for(&server, Some("A1"), Some("R1"));

        let mut handles = Vec::new();
        for (i, path) in ["/first/", "/a/", "/b/", "/c/"].into_iter().enumerate() {
            let c = client.clone();
            handles.push(tokio::spawn(async move { c.get(path).await }));
            wait_for_queued(&client, i + 1).await;
        }
        server.release_refresh();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let retried: Vec<String> = server
            .calls()
            .into_iter()
            .filter(|c| c.bearer.as_deref() == Some("A2"))
            .map(|c| c.path)
            .collect();
        assert_eq!(retried, vec!["/first/", "/a/", "/b/", "/c/"]);
    }

    #[tokio::test]
    async fn test_failed_refresh_releases_waiters_with_401() {
        let mut server = FakeServer::new().gated();
        server.refresh_status = StatusCode::BAD_REQUEST;
        let server = Arc::new(server);
        let client = client_for(&server, Some("A1"), Some("R1"));

        let requests = join_all(["/x/", "/y/", "/z/"].map(|p| client.get(p)));
        let release = async {
            wait_for_queued(&client, 3).await;
            server.release_refresh();
        };
        let (results, ()) = tokio::join!(requests, release);

        for result in results {
            assert!(result.unwrap_err().is_unauthorized());
        }
        assert_eq!(server.refresh_calls(), 1);
        assert_eq!(client.tokens().access().as_deref(), Some("A1"));
        // Each request: first attempt plus one retry with the stale token
        assert_eq!(server.calls().len(), 7);
        assert!(!client.is_refreshing());
    }

    #[tokio::test]
    async fn test_refresh_completes_when_initiator_is_cancelled() {
        let server = Arc::new(FakeServer::new().gated());
        let client = client_for(&server, Some("A1"), Some("R1"));

        let leader = {
            let c = client.clone();
            tokio::spawn(async move { c.get("/leader/").await })
        };
        wait_for_queued(&client, 1).await;
        let waiter = {
            let c = client.clone();
            tokio::spawn(async move { c.get("/waiter/").await })
        };
        wait_for_queued(&client, 2).await;

        leader.abort();
        server.release_refresh();

        let response = waiter.await.unwrap().unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(server.refresh_calls(), 1);
        assert_eq!(client.tokens().access().as_deref(), Some("A2"));
    }

    #[tokio::test]
    async fn test_later_expiry_triggers_a_new_refresh() {
        let server = Arc::new(FakeServer::new());
        let client = client_for(&server, Some("A1"), Some("R1"));
        client.get("/one/").await.unwrap();
        assert_eq!(server.refresh_calls(), 1);

        // Server revokes the refreshed token; the next 401 starts a new refresh
        *server.valid_access.lock().unwrap() = "revoked".to_string();
        client.get("/two/").await.unwrap();
        assert_eq!(server.refresh_calls(), 2);
        assert_eq!(server.calls_to("/two/").len(), 2);
    }

    #[tokio::test]
    async fn test_request_config_query_is_forwarded() {
        let server = Arc::new(FakeServer::new());
        let client = client_for(&server, Some("A2"), None);

        #[derive(Serialize)]
        struct Params {
            top_n: Option<u32>,
            start: Option<String>,
            include_uncategorized: bool,
        }
        let config = RequestConfig::with_params(&Params {
            top_n: Some(3),
            start: None,
            include_uncategorized: true,
        })
        .unwrap();
        let mut query = config.query.clone();
        query.sort();
        assert_eq!(
            query,
            vec![
                ("include_uncategorized".to_string(), "true".to_string()),
                ("top_n".to_string(), "3".to_string()),
            ]
        );

        let value: Value = client.get_json_with("/api/reports/by-category/", config).await.unwrap();
        assert_eq!(value["path"], "/api/reports/by-category/");
    }

    #[tokio::test]
    async fn test_retry_drops_bearer_when_refresh_leaves_no_access_token() {
        let mut server = FakeServer::new();
        server.next_access = String::new();
        let server = Arc::new(server);
        let client = client_for(&server, Some("A1"), Some("R1"));

        let err = client.get("/api/expenses/").await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(client.tokens().access(), None);

        let bearers: Vec<Option<String>> = server
            .calls_to("/api/expenses/")
            .into_iter()
            .map(|c| c.bearer)
            .collect();
        assert_eq!(bearers, vec![Some("A1".to_string()), None]);
    }

    #[tokio::test]
    async fn test_anonymous_request_skips_credential_and_refresh() {
        let server = Arc::new(FakeServer::new());
        let client = client_for(&server, Some("STALE"), Some("R1"));

        let err = client
            .request(
                Method::POST,
                "/api/auth/signup/",
                Some(serde_json::json!({"username": "ana"})),
                Some(RequestConfig::new().anonymous()),
            )
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(
            server.calls(),
            vec![Call { path: "/api/auth/signup/".into(), bearer: None }]
        );
        assert_eq!(client.tokens().access().as_deref(), Some("STALE"));
    }

    #[tokio::test]
    async fn test_query_builder_appends_pairs() {
        let server = Arc::new(FakeServer::new());
        let client = client_for(&server, Some("A2"), None);

        let config = RequestConfig::new().query("granularity", "month").query("top_n", 5);
        assert_eq!(
            config.query,
            vec![
                ("granularity".to_string(), "month".to_string()),
                ("top_n".to_string(), "5".to_string()),
            ]
        );
        let value: Value = client.get_json_with("/api/reports/trend/", config).await.unwrap();
        assert_eq!(value["path"], "/api/reports/trend/");
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        let err = ApiClient::with_transport(
            "ftp://example.com",
            Tokens::in_memory(),
            Arc::new(FakeServer::new()),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ApiError::Config(_)));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = ApiClient::with_transport(
            "http://127.0.0.1:8000/",
            Tokens::in_memory(),
            Arc::new(FakeServer::new()),
        )
        .unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:8000");
        assert_eq!(client.inner.url("api/x/"), "http://127.0.0.1:8000/api/x/");
    }
}
