use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;
use urlencoding::encode as urlencode;

use crate::auth::{Credentials, RefreshPolicy};
use crate::config::{APPLICATION_JSON, BEARER_PREFIX, ClientConfig, FLAG_TRUE, normalize_url};
use crate::error::{Error, Result};
use crate::transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};

/// Ordered query parameters. Doubles as the switchboard for submission flags
/// (`facematch=true`, `extra-document=true`, `base64=true`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`QueryParams::insert`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Sets `key`, overwriting an earlier value in place so ordering is stable
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// true only for `key=true`
    pub fn has_flag(&self, key: &str) -> bool {
        self.get(key) == Some(FLAG_TRUE)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = QueryParams::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// UltraOCR api client.
///
/// Credentials sit behind an async mutex so a client can be shared between tasks and a
/// token refresh never races another one. Configuration setters take `&mut self`.
pub struct Client {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    credentials: Mutex<Credentials>,
}

impl Client {
    /// Default endpoints over a fresh reqwest transport, no auto-refresh
    pub fn new() -> Result<Self> {
        Ok(Self::from_config(
            ClientConfig::default(),
            Arc::new(ReqwestTransport::new()?),
        ))
    }

    pub fn with_transport(transport: impl Transport + 'static) -> Self {
        Self::from_config(ClientConfig::default(), Arc::new(transport))
    }

    pub fn from_config(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            credentials: Mutex::new(Credentials::default()),
        }
    }

    /// Builder form of [`Client::set_auto_refresh`]
    pub fn with_auto_refresh(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        expires: u64,
    ) -> Self {
        self.set_auto_refresh(client_id, client_secret, expires);
        self
    }

    /// Turns on transparent authentication before every authenticated request.
    /// `expires` is the token lifetime in minutes. A token obtained earlier through
    /// [`Client::authenticate`] stays in use until the policy replaces it.
    pub fn set_auto_refresh(
        &mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        expires: u64,
    ) {
        self.credentials
            .get_mut()
            .enable_auto_refresh(client_id, client_secret, expires);
    }

    pub fn set_refresh_policy(&mut self, policy: RefreshPolicy) {
        self.credentials.get_mut().set_policy(policy);
    }

    pub fn set_base_url(&mut self, base_url: &str) {
        self.config.base_url = normalize_url(base_url);
    }

    pub fn set_auth_base_url(&mut self, auth_base_url: &str) {
        self.config.auth_base_url = normalize_url(auth_base_url);
    }

    /// Seconds between two status checks
    pub fn set_interval(&mut self, seconds: u64) {
        self.config.interval = Duration::from_secs(seconds);
    }

    /// Seconds a wait keeps polling before giving up
    pub fn set_timeout(&mut self, seconds: u64) {
        self.config.timeout = Duration::from_secs(seconds);
    }

    pub fn set_transport(&mut self, transport: impl Transport + 'static) {
        self.transport = Arc::new(transport);
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Currently held bearer token, if any
    pub async fn token(&self) -> Option<String> {
        self.credentials.lock().await.token().map(str::to_string)
    }

    pub(crate) fn credentials(&self) -> &Mutex<Credentials> {
        &self.credentials
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// `{base_url}` followed by `segments`, each percent-encoded
    pub(crate) fn api_url(&self, segments: &[&str]) -> String {
        let mut url = self.config.base_url.clone();
        for segment in segments {
            url.push('/');
            url.push_str(&urlencode(segment));
        }
        url
    }

    pub(crate) async fn get(&self, url: &str, params: &QueryParams) -> Result<HttpResponse> {
        let token = self.auto_authenticate().await?;
        let request = authenticated(Method::GET, full_url(url, params)?, &token);

        tracing::debug!("GET {}", request.url);
        self.transport.send(request).await
    }

    pub(crate) async fn post<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        params: &QueryParams,
    ) -> Result<HttpResponse> {
        let payload = serde_json::to_vec(body)?;
        let token = self.auto_authenticate().await?;
        let request = authenticated(Method::POST, full_url(url, params)?, &token).body(payload);

        tracing::debug!("POST {}", request.url);
        self.transport.send(request).await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn authenticated(method: Method, url: String, token: &str) -> HttpRequest {
    HttpRequest::new(method, url)
        .header("Authorization", format!("{}{}", BEARER_PREFIX, token))
        .header("Accept", APPLICATION_JSON)
        .header("Content-Type", APPLICATION_JSON)
}

/// Appends `params` as a query string. No `?` at all when there are none.
pub(crate) fn full_url(url: &str, params: &QueryParams) -> Result<String> {
    let mut parsed = Url::parse(url)?;
    if !params.is_empty() {
        parsed.query_pairs_mut().extend_pairs(params.iter());
    }
    Ok(parsed.into())
}

/// Passes 2xx through, otherwise builds the call-site specific error from status + body
pub(crate) fn check_status(
    response: HttpResponse,
    to_error: fn(u16, String) -> Error,
) -> Result<HttpResponse> {
    if response.is_success() {
        return Ok(response);
    }

    let body = response.text();
    tracing::warn!("Request failed: {} - {}", response.status, body);
    Err(to_error(response.status, body))
}

pub(crate) fn decode<T: DeserializeOwned>(response: &HttpResponse) -> Result<T> {
    serde_json::from_slice(&response.body).map_err(|e| Error::MalformedResponse(e.to_string()))
}
