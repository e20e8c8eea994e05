use anyhow::{Context, Result};
use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::{Map, Value};

use flame_common::{
    App, AppPatch, Bookmark, BookmarkPatch, Category, CategoryPatch, CategoryView, NewApp,
    NewBookmark, NewCategory, ReorderItem, SearchQuery,
};

use crate::errors::ClientError;
use crate::server::auth::AUTH_HEADER;
use crate::settings::Settings;

#[derive(serde::Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(serde::Deserialize)]
struct Failure {
    error: String,
}

/// Typed client for the Flame REST API.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.header(AUTH_HEADER, format!("Bearer {}", token)),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let resp = builder.send().await.map_err(ClientError::from)?;
        let status = resp.status();
        if !status.is_success() {
            let message = match resp.json::<Failure>().await {
                Ok(f) => f.error,
                Err(_) => status.canonical_reason().unwrap_or("error").to_string(),
            };
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            }
            .into());
        }
        let envelope: Envelope<T> = resp
            .json()
            .await
            .map_err(ClientError::from)
            .context("Failed to decode response")?;
        Ok(envelope.data)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(self.request(Method::GET, path)).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.send(self.request(Method::PUT, path).json(body)).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let _: IgnoredAny = self.send(self.request(Method::DELETE, path)).await?;
        Ok(())
    }

    pub async fn health(&self) -> Result<bool> {
        let resp = self
            .request(Method::GET, "/health")
            .send()
            .await
            .map_err(ClientError::from)?;
        Ok(resp.status().is_success())
    }

    // ── Categories ───────────────────────────────────────────────────

    pub async fn get_categories(&self) -> Result<Vec<CategoryView>> {
        self.get("/api/categories").await
    }

    pub async fn create_category(&self, new: &NewCategory) -> Result<Category> {
        self.post("/api/categories", new).await
    }

    pub async fn update_category(&self, id: i64, patch: &CategoryPatch) -> Result<Category> {
        self.put(&format!("/api/categories/{}", id), patch).await
    }

    pub async fn delete_category(&self, id: i64) -> Result<()> {
        self.delete(&format!("/api/categories/{}", id)).await
    }

    pub async fn reorder_categories(&self, items: &[ReorderItem]) -> Result<()> {
        let body = serde_json::json!({ "categories": items });
        let _: IgnoredAny = self.put("/api/categories/0/reorder", &body).await?;
        Ok(())
    }

    // ── Apps ─────────────────────────────────────────────────────────

    pub async fn get_apps(&self) -> Result<Vec<App>> {
        self.get("/api/apps").await
    }

    pub async fn create_app(&self, new: &NewApp) -> Result<App> {
        self.post("/api/apps", new).await
    }

    pub async fn update_app(&self, id: i64, patch: &AppPatch) -> Result<App> {
        self.put(&format!("/api/apps/{}", id), patch).await
    }

    pub async fn delete_app(&self, id: i64) -> Result<()> {
        self.delete(&format!("/api/apps/{}", id)).await
    }

    pub async fn reorder_apps(&self, items: &[ReorderItem]) -> Result<()> {
        let body = serde_json::json!({ "apps": items });
        let _: IgnoredAny = self.put("/api/apps/0/reorder", &body).await?;
        Ok(())
    }

    // ── Bookmarks ────────────────────────────────────────────────────

    pub async fn get_bookmarks(&self) -> Result<Vec<Bookmark>> {
        self.get("/api/bookmarks").await
    }

    pub async fn create_bookmark(&self, new: &NewBookmark) -> Result<Bookmark> {
        self.post("/api/bookmarks", new).await
    }

    pub async fn update_bookmark(&self, id: i64, patch: &BookmarkPatch) -> Result<Bookmark> {
        self.put(&format!("/api/bookmarks/{}", id), patch).await
    }

    pub async fn delete_bookmark(&self, id: i64) -> Result<()> {
        self.delete(&format!("/api/bookmarks/{}", id)).await
    }

    pub async fn reorder_bookmarks(&self, items: &[ReorderItem]) -> Result<()> {
        let body = serde_json::json!({ "bookmarks": items });
        let _: IgnoredAny = self.put("/api/bookmarks/0/reorder", &body).await?;
        Ok(())
    }

    // ── Config & queries ─────────────────────────────────────────────

    pub async fn get_config(&self) -> Result<Settings> {
        self.get("/api/config").await
    }

    pub async fn update_config(&self, patch: &Map<String, Value>) -> Result<Settings> {
        self.put("/api/config", patch).await
    }

    pub async fn get_queries(&self) -> Result<Vec<SearchQuery>> {
        self.get("/api/queries").await
    }

    pub async fn create_query(&self, query: &SearchQuery) -> Result<SearchQuery> {
        self.post("/api/queries", query).await
    }

    pub async fn delete_query(&self, prefix: &str) -> Result<()> {
        self.delete(&format!("/api/queries/{}", prefix)).await
    }
}
