use marks_common::api::{LoginRequest, LoginResponse};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::RemoteError;

/// `{"error": {...}}` envelope returned by the API on failure.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// HTTP client bound to one API base URL and, once signed in, an access token.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, RemoteError> {
        let base = Url::parse(base_url)?;
        if base.cannot_be_a_base() {
            return Err(RemoteError::Transport(format!("not a base url: {base_url}")));
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Base URL extended by percent-encoded path `segments`.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Transport(format!("not a base url: {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// The gateway WebSocket URL beside the REST base: `http` becomes `ws`,
    /// `https` becomes `wss`.
    pub fn gateway_url(&self) -> Result<Url, RemoteError> {
        let mut url = self.endpoint(&["gateway"])?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| RemoteError::Transport(format!("cannot derive gateway url from {}", self.base)))?;
        Ok(url)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, RemoteError> {
        let resp = self.authorized(req).send().await?;
        check(resp).await
    }

    pub async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, RemoteError> {
        let resp = self.send(self.http.get(url)).await?;
        Ok(resp.json().await?)
    }

    pub async fn post<B, T>(&self, url: Url, body: &B) -> Result<T, RemoteError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let resp = self.send(self.http.post(url).json(body)).await?;
        Ok(resp.json().await?)
    }

    /// POST without a body, decoding the response.
    pub async fn post_for<T: DeserializeOwned>(&self, url: Url) -> Result<T, RemoteError> {
        let resp = self.send(self.http.post(url)).await?;
        Ok(resp.json().await?)
    }

    /// POST without a body, ignoring the response.
    pub async fn post_empty(&self, url: Url) -> Result<(), RemoteError> {
        self.send(self.http.post(url)).await?;
        Ok(())
    }

    pub async fn delete(&self, url: Url) -> Result<(), RemoteError> {
        self.send(self.http.delete(url)).await?;
        Ok(())
    }
}

async fn check(resp: Response) -> Result<Response, RemoteError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(RemoteError::Unauthorized);
    }
    let message = match resp.json::<ErrorEnvelope>().await {
        Ok(envelope) => envelope.error.message,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    };
    Err(RemoteError::Rejected {
        status: status.as_u16(),
        message,
    })
}

/// Exchange an identity assertion for an access token. The returned client
/// carries the token.
pub async fn login(base_url: &str, id_token: &str) -> Result<(ApiClient, LoginResponse), RemoteError> {
    let client = ApiClient::new(base_url)?;
    let url = client.endpoint(&["api", "v1", "auth", "login"])?;
    let resp: LoginResponse = client
        .post(
            url,
            &LoginRequest {
                id_token: id_token.to_string(),
            },
        )
        .await?;
    tracing::info!(user_id = %resp.user.id, "signed in");
    let client = client.with_token(resp.access_token.clone());
    Ok((client, resp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_keep_base_path_and_encode_segments() {
        let client = ApiClient::new("http://localhost:4100").unwrap();
        let url = client.endpoint(&["api", "v1", "users", "a b", "bookmarks"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:4100/api/v1/users/a%20b/bookmarks");

        let nested = ApiClient::new("https://example.com/marks/").unwrap();
        assert_eq!(
            nested.endpoint(&["health"]).unwrap().as_str(),
            "https://example.com/marks/health"
        );
    }

    #[test]
    fn gateway_url_follows_base_scheme() {
        let plain = ApiClient::new("http://localhost:4100").unwrap();
        assert_eq!(plain.gateway_url().unwrap().as_str(), "ws://localhost:4100/gateway");

        let tls = ApiClient::new("https://marks.example.com").unwrap();
        assert_eq!(tls.gateway_url().unwrap().as_str(), "wss://marks.example.com/gateway");
    }

    #[test]
    fn rejects_non_base_urls() {
        assert!(ApiClient::new("mailto:someone@example.com").is_err());
        assert!(ApiClient::new("not a url").is_err());
    }
}
