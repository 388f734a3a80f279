//! Transport over the marks REST API and its WebSocket gateway.

mod client;
mod gateway;

use async_trait::async_trait;
use marks_common::api::{ListBookmarksResponse, SessionResponse};
use marks_common::{Bookmark, NewBookmark};

use crate::error::RemoteError;
use crate::session::{Session, SessionProvider};
use crate::store::{RemoteStore, Subscription};

pub use client::{login, ApiClient};

/// [`RemoteStore`] backed by the marks API.
#[derive(Clone)]
pub struct HttpRemoteStore {
    client: ApiClient,
}

impl HttpRemoteStore {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn select(&self, owner_id: &str) -> Result<Vec<Bookmark>, RemoteError> {
        let url = self
            .client
            .endpoint(&["api", "v1", "users", owner_id, "bookmarks"])?;
        let list: ListBookmarksResponse = self.client.get(url).await?;
        Ok(list.data)
    }

    async fn insert(&self, bookmark: NewBookmark, owner_id: &str) -> Result<Bookmark, RemoteError> {
        let url = self
            .client
            .endpoint(&["api", "v1", "users", owner_id, "bookmarks"])?;
        self.client.post(url, &bookmark).await
    }

    async fn delete(&self, id: &str, owner_id: &str) -> Result<(), RemoteError> {
        let url = self
            .client
            .endpoint(&["api", "v1", "users", owner_id, "bookmarks", id])?;
        self.client.delete(url).await
    }

    async fn subscribe(&self, owner_id: &str) -> Result<Subscription, RemoteError> {
        gateway::subscribe(&self.client, owner_id).await
    }
}

/// [`SessionProvider`] backed by the marks API session endpoints.
#[derive(Clone)]
pub struct HttpSessionProvider {
    client: ApiClient,
}

impl HttpSessionProvider {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SessionProvider for HttpSessionProvider {
    async fn current_user(&self) -> Result<Option<Session>, RemoteError> {
        if !self.client.has_token() {
            return Ok(None);
        }
        let url = self.client.endpoint(&["api", "v1", "auth", "session"])?;
        match self.client.get::<SessionResponse>(url).await {
            Ok(resp) => Ok(Some(resp.user.into())),
            Err(RemoteError::Unauthorized) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        if !self.client.has_token() {
            return Ok(());
        }
        let url = self.client.endpoint(&["api", "v1", "auth", "logout"])?;
        match self.client.post_empty(url).await {
            Ok(()) | Err(RemoteError::Unauthorized) => Ok(()),
            Err(err) => Err(err),
        }
    }
}
