mod credentials;

pub use credentials::{Credentials, RefreshPolicy};

use chrono::Utc;
use reqwest::Method;

use crate::client::{Client, check_status, decode};
use crate::config::APPLICATION_JSON;
use crate::error::{Error, Result};
use crate::models::{TokenRequest, TokenResponse};
use crate::transport::HttpRequest;

impl Client {
    /// Exchanges client credentials for a bearer token and keeps it for later calls.
    /// `expires` is the requested token lifetime in minutes.
    pub async fn authenticate(
        &self,
        client_id: &str,
        client_secret: &str,
        expires: u64,
    ) -> Result<()> {
        let token = self.request_token(client_id, client_secret, expires).await?;
        self.credentials()
            .lock()
            .await
            .store(token, expires, Utc::now());
        Ok(())
    }

    /// Runs before every authenticated request. Refreshes inline when the policy says
    /// so (the lock is held throughout, so concurrent callers wait for one refresh) and
    /// hands back the token to put in the header.
    pub(crate) async fn auto_authenticate(&self) -> Result<String> {
        let mut credentials = self.credentials().lock().await;

        if credentials.needs_refresh(Utc::now()) {
            tracing::debug!("Refreshing token for client {}", credentials.client_id());
            let token = self
                .request_token(
                    credentials.client_id(),
                    credentials.client_secret(),
                    credentials.expires_in(),
                )
                .await?;
            let lifetime = credentials.expires_in();
            credentials.store(token, lifetime, Utc::now());
        }

        Ok(credentials.token().unwrap_or_default().to_string())
    }

    async fn request_token(
        &self,
        client_id: &str,
        client_secret: &str,
        expires: u64,
    ) -> Result<String> {
        let url = format!("{}/token", self.config().auth_base_url);
        let body = serde_json::to_vec(&TokenRequest {
            client_id,
            client_secret,
            expires_in: expires,
        })?;

        let request = HttpRequest::new(Method::POST, url)
            .header("Accept", APPLICATION_JSON)
            .header("Content-Type", APPLICATION_JSON)
            .body(body);

        let response = self.transport().send(request).await?;
        let response = check_status(response, |status, body| Error::Authentication {
            status,
            body,
        })?;
        let token: TokenResponse = decode(&response)?;

        tracing::info!("Authenticated client {}", client_id);
        Ok(token.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::QueryParams;
    use crate::transport::HttpResponse;
    use crate::transport::mock::MockTransport;
    use serde_json::json;
    use std::sync::Arc;

    fn client(mock: &Arc<MockTransport>) -> Client {
        let mut client = Client::with_transport(mock.clone());
        client.set_base_url("http://api.local/v2");
        client.set_auth_base_url("http://auth.local/v2");
        client
    }

    #[tokio::test]
    async fn test_authenticate_stores_token() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_json(Method::POST, "/token", json!({"token": "abc"}));
        let client = client(&mock);

        client.authenticate("id", "secret", 30).await.unwrap();
        assert_eq!(client.token().await.as_deref(), Some("abc"));

        let request = &mock.requests()[0];
        assert_eq!(request.url, "http://auth.local/v2/token");
        let body: serde_json::Value =
            serde_json::from_slice(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(
            body,
            json!({"ClientID": "id", "ClientSecret": "secret", "ExpiresIn": 30})
        );
    }

    #[tokio::test]
    async fn test_authenticate_rejects_bad_status() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(
            Method::POST,
            "/token",
            vec![HttpResponse::new(401, "invalid credentials")],
        );
        let client = client(&mock);

        let err = client.authenticate("id", "nope", 60).await.unwrap_err();
        assert!(matches!(err, Error::Authentication { status: 401, .. }));
        assert!(client.token().await.is_none());
    }

    #[tokio::test]
    async fn test_authenticate_rejects_body_without_token() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_json(Method::POST, "/token", json!({"access_token": "abc"}));
        let client = client(&mock);

        let err = client.authenticate("id", "secret", 60).await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_auto_refresh_runs_before_request() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_json(Method::POST, "/token", json!({"token": "fresh"}));
        mock.respond_json(Method::GET, "/ocr/batch/status/", json!({}));
        let client = client(&mock).with_auto_refresh("id", "secret", 60);

        client
            .get("http://api.local/v2/ocr/batch/status/1", &QueryParams::new())
            .await
            .unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].url.ends_with("/token"));
        assert_eq!(
            requests[1].header_value("Authorization"),
            Some("Bearer fresh")
        );
    }

    #[tokio::test]
    async fn test_failed_refresh_blocks_dependent_request() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(Method::POST, "/token", vec![HttpResponse::new(500, "down")]);
        mock.respond_json(Method::GET, "/ocr/", json!({}));
        let client = client(&mock).with_auto_refresh("id", "secret", 60);

        let err = client
            .get("http://api.local/v2/ocr/batch/status/1", &QueryParams::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Authentication { status: 500, .. }));
        assert_eq!(mock.count(Method::GET, "/ocr/"), 0);
    }

    #[tokio::test]
    async fn test_on_expiry_policy_reuses_token() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_json(Method::POST, "/token", json!({"token": "once"}));
        mock.respond_json(Method::GET, "/ocr/", json!({}));
        let mut client = client(&mock).with_auto_refresh("id", "secret", 60);
        client.set_refresh_policy(RefreshPolicy::OnExpiry);

        let url = "http://api.local/v2/ocr/batch/status/1";
        client.get(url, &QueryParams::new()).await.unwrap();
        client.get(url, &QueryParams::new()).await.unwrap();

        assert_eq!(mock.count(Method::POST, "/token"), 1);
        assert_eq!(mock.count(Method::GET, "/ocr/"), 2);
    }

    #[tokio::test]
    async fn test_stale_token_is_refreshed() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(
            Method::POST,
            "/token",
            vec![
                HttpResponse::new(200, json!({"token": "stale"}).to_string()),
                HttpResponse::new(200, json!({"token": "fresh"}).to_string()),
            ],
        );
        mock.respond_json(Method::GET, "/ocr/", json!({}));
        let mut client = client(&mock);
        // zero-minute lifetime: expired as soon as it is stored
        client.authenticate("id", "secret", 0).await.unwrap();
        client.set_auto_refresh("id", "secret", 60);

        client
            .get("http://api.local/v2/ocr/batch/status/1", &QueryParams::new())
            .await
            .unwrap();

        assert_eq!(mock.count(Method::POST, "/token"), 2);
        assert_eq!(
            mock.requests()[2].header_value("Authorization"),
            Some("Bearer fresh")
        );
    }

    #[tokio::test]
    async fn test_enabling_auto_refresh_keeps_explicit_token() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_json(Method::POST, "/token", json!({"token": "explicit"}));
        mock.respond_json(Method::GET, "/ocr/", json!({}));
        let mut client = client(&mock);
        client.set_refresh_policy(RefreshPolicy::OnExpiry);
        client.authenticate("id", "secret", 60).await.unwrap();

        client.set_auto_refresh("id", "secret", 60);
        assert_eq!(client.token().await.as_deref(), Some("explicit"));

        client
            .get("http://api.local/v2/ocr/batch/status/1", &QueryParams::new())
            .await
            .unwrap();
        assert_eq!(mock.count(Method::POST, "/token"), 1);
        assert_eq!(
            mock.requests()[1].header_value("Authorization"),
            Some("Bearer explicit")
        );
    }
}
