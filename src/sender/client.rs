use super::error::{ClsError, check_response};
use super::serialization::{CONTENT_TYPE_JSON, Payload, SerializationError};
use crate::signer::{self, AuthParam};
use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Client, ClientBuilder, Method};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

pub const STRUCTURED_LOG_PATH: &str = "/structuredlog";

/// Which CLS endpoint family a client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    /// Tencent Cloud internal network
    #[default]
    Internal,
    /// Public internet
    Public,
}

impl Network {
    pub fn from_internal(use_internal_network: bool) -> Self {
        if use_internal_network {
            Network::Internal
        } else {
            Network::Public
        }
    }

    pub fn host_suffix(&self) -> &'static str {
        match self {
            Network::Internal => ".cls.tencentyun.com",
            Network::Public => ".cls.tencentcs.com",
        }
    }
}

/// Default endpoint host for a region.
pub fn endpoint_host(region: &str, network: Network) -> String {
    format!("{region}{}", network.host_suffix())
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub scheme: String,
    pub timeout: Duration,
    pub connection_timeout: Duration,
    pub max_connections: usize,
    pub keep_alive_timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            timeout: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
            max_connections: 20,
            keep_alive_timeout: Duration::from_secs(60),
            user_agent: format!("cls-log-shipper/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_response_time: Duration,
}

#[derive(Debug, Default)]
pub struct ClientStats {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    total_response_time: AtomicU64,
}

impl ClientStats {
    pub fn record_request(&self, success: bool, response_time: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time
            .fetch_add(response_time.as_millis() as u64, Ordering::Relaxed);

        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> ConnectionStats {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_response_time = self.total_response_time.load(Ordering::Relaxed);

        let average_response_time = if total_requests > 0 {
            Duration::from_millis(total_response_time / total_requests)
        } else {
            Duration::ZERO
        };

        ConnectionStats {
            total_requests,
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            average_response_time,
        }
    }
}

/// Request body as handed to [`ClsClient::send`].
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Sent verbatim.
    Raw(Bytes),
    /// Already JSON-encoded.
    Json(Bytes),
}

impl RequestBody {
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, ClsError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| ClsError::Serialization(SerializationError::JsonError(e)))?;
        Ok(RequestBody::Json(Bytes::from(bytes)))
    }
}

/// Shape of one API call before signing.
#[derive(Debug, Clone)]
pub struct ClsRequest {
    pub method: Method,
    pub path: String,
    pub params: HashMap<String, String>,
    pub body: RequestBody,
    pub content_type: Option<&'static str>,
}

impl ClsRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: HashMap::new(),
            body: RequestBody::Empty,
            content_type: None,
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Overrides the content type implied by the body.
    pub fn content_type(mut self, content_type: &'static str) -> Self {
        self.content_type = Some(content_type);
        self
    }
}

/// Signed HTTP client for the CLS API.
#[derive(Debug, Clone)]
pub struct ClsClient {
    http: Client,
    region: String,
    host: String,
    auth: AuthParam,
    config: ClientConfig,
    stats: Arc<ClientStats>,
}

impl ClsClient {
    pub fn new(
        region: impl Into<String>,
        auth: AuthParam,
        network: Network,
        config: ClientConfig,
    ) -> Result<Self, ClsError> {
        let region = region.into();
        let http = ClientBuilder::new()
            .connect_timeout(config.connection_timeout)
            .pool_max_idle_per_host(config.max_connections)
            .pool_idle_timeout(config.keep_alive_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| ClsError::InvalidRequest(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            host: endpoint_host(&region, network),
            http,
            region,
            auth,
            config,
            stats: Arc::new(ClientStats::default()),
        })
    }

    /// Replaces the default host. Empty strings are ignored.
    pub fn set_host(&mut self, host: &str) {
        if host.is_empty() {
            return;
        }
        self.host = host.to_string();
    }

    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Client-level credentials without host overrides.
    pub fn auth_param(&self) -> AuthParam {
        AuthParam::new(
            self.auth.secret_id.clone(),
            self.auth.secret_key.clone(),
            self.auth.token.clone(),
        )
    }

    pub fn connection_stats(&self) -> ConnectionStats {
        self.stats.snapshot()
    }

    /// Builds and signs a request using the current time.
    pub fn build_request(
        &self,
        request: ClsRequest,
        auth: &AuthParam,
    ) -> Result<reqwest::Request, ClsError> {
        self.build_request_at(request, auth, signer::unix_now())
    }

    /// Builds and signs a request as of `now` (unix seconds).
    pub fn build_request_at(
        &self,
        request: ClsRequest,
        auth: &AuthParam,
        now: i64,
    ) -> Result<reqwest::Request, ClsError> {
        let ClsRequest {
            method,
            path,
            params,
            body,
            content_type,
        } = request;

        let url_host = auth.host.as_deref().unwrap_or(&self.host);
        let header_host = auth.header_host.as_deref().unwrap_or(&self.host);

        let mut url = Url::parse(&format!("{}://{url_host}{path}", self.config.scheme))
            .map_err(|e| ClsError::InvalidRequest(format!("Invalid request URL: {e}")))?;
        if !params.is_empty() {
            let mut keys: Vec<&String> = params.keys().collect();
            keys.sort();
            let mut query = url.query_pairs_mut();
            for key in keys {
                query.append_pair(key, &params[key]);
            }
        }

        let mut req = reqwest::Request::new(method.clone(), url);
        let implied_content_type = match body {
            RequestBody::Empty => None,
            RequestBody::Raw(bytes) => {
                *req.body_mut() = Some(bytes.into());
                None
            }
            RequestBody::Json(bytes) => {
                *req.body_mut() = Some(bytes.into());
                Some(CONTENT_TYPE_JSON)
            }
        };
        if let Some(content_type) = content_type.or(implied_content_type) {
            req.headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }

        let sign_headers = HashMap::from([("Host".to_string(), header_host.to_string())]);
        signer::sign_request(auth, method.as_str(), &path, &params, &sign_headers, now)
            .apply(req.headers_mut())
            .map_err(|e| ClsError::InvalidRequest(format!("Invalid header value: {e}")))?;

        Ok(req)
    }

    /// Signs and executes a request.
    ///
    /// Non-2xx responses are classified into [`ClsError::Api`] or
    /// [`ClsError::Internal`]. On success the body is decoded into `T`; an
    /// empty body yields `Ok(None)`.
    pub async fn send<T: DeserializeOwned>(
        &self,
        request: ClsRequest,
        auth: &AuthParam,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, ClsError> {
        let request = self.build_request(request, auth)?;
        self.execute(request, cancel).await
    }

    pub async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::Request,
        cancel: &CancellationToken,
    ) -> Result<Option<T>, ClsError> {
        let method = request.method().to_string();
        let url = request.url().to_string();
        let start = Instant::now();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClsError::Cancelled),
            outcome = tokio::time::timeout(self.config.timeout, self.round_trip(request)) => {
                outcome.unwrap_or(Err(ClsError::Timeout(self.config.timeout)))
            }
        };

        let classified = result.and_then(|(status, body)| {
            check_response(&method, &url, status, &body)?;
            Ok(body)
        });
        self.stats.record_request(classified.is_ok(), start.elapsed());

        let body = classified?;
        debug!("{} {} completed in {:?}", method, url, start.elapsed());

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&body)?))
    }

    async fn round_trip(&self, request: reqwest::Request) -> Result<(u16, Bytes), ClsError> {
        let response = self.http.execute(request).await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok((status, body))
    }

    /// Uploads a serialized batch with the client's own credentials.
    pub async fn upload_structured_log(
        &self,
        topic_id: &str,
        payload: &Payload,
        cancel: &CancellationToken,
    ) -> Result<(), ClsError> {
        self.upload_structured_log_with_auth(topic_id, payload, &self.auth_param(), cancel)
            .await
    }

    /// Uploads a serialized batch signed with `auth`.
    pub async fn upload_structured_log_with_auth(
        &self,
        topic_id: &str,
        payload: &Payload,
        auth: &AuthParam,
        cancel: &CancellationToken,
    ) -> Result<(), ClsError> {
        let request = ClsRequest::new(Method::POST, STRUCTURED_LOG_PATH)
            .param("topic_id", topic_id)
            .body(RequestBody::Raw(payload.bytes.clone()))
            .content_type(payload.content_type());

        self.send::<serde_json::Value>(request, auth, cancel)
            .await
            .map(|_| ())
    }
}
