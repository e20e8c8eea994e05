//! Client-side dashboard state driven through the REST API.
//!
//! Each operation performs the request, applies the server's copy of the
//! record to the local [`CategoryStore`], re-sorts what it touched and queues
//! a user-facing [`Notification`]. Nothing is re-fetched after a write.

use std::collections::VecDeque;

use anyhow::Result;
use flame_common::ordering::{move_item, positions};
use flame_common::search::{self, SearchAction};
use flame_common::{
    App, AppPatch, Bookmark, BookmarkPatch, Category, CategoryKind, CategoryPatch, CategoryStore,
    Entry, NewApp, NewBookmark, NewCategory, OrderingStrategy, ReorderItem, SearchQuery,
};

use super::api::ApiClient;
use crate::errors::ClientError;
use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

pub struct Dashboard {
    api: ApiClient,
    pub apps: CategoryStore<App>,
    pub bookmarks: CategoryStore<Bookmark>,
    settings: Settings,
    queries: Vec<SearchQuery>,
    notifications: VecDeque<Notification>,
}

fn pin_status(was_pinned: bool) -> &'static str {
    if was_pinned {
        "unpinned from Homescreen"
    } else {
        "pinned to Homescreen"
    }
}

impl Dashboard {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            apps: CategoryStore::new(),
            bookmarks: CategoryStore::new(),
            settings: Settings::default(),
            queries: Vec::new(),
            notifications: VecDeque::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Drain queued notifications, oldest first.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        self.notifications.drain(..).collect()
    }

    fn notify(&mut self, title: &str, message: impl Into<String>) {
        self.notifications.push_back(Notification {
            title: title.to_string(),
            message: message.into(),
        });
    }

    /// Turn a failed request into an error notification and pass it on.
    fn report<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            let message = match e.downcast_ref::<ClientError>() {
                Some(ClientError::Api { message, .. }) => message.clone(),
                _ => e.to_string(),
            };
            tracing::debug!(error = %e, "dashboard request failed");
            self.notify("Error", message);
        }
        result
    }

    /// Fetch config, custom queries and the category tree.
    pub async fn load(&mut self) -> Result<()> {
        let settings = self.api.get_config().await;
        self.settings = self.report(settings)?;
        let queries = self.api.get_queries().await;
        self.queries = self.report(queries)?;
        let views = self.api.get_categories().await;
        let views = self.report(views)?;
        self.apps.load(views.clone());
        self.bookmarks.load(views);
        Ok(())
    }

    /// Current ordering strategy as stored on the server. Falls back to the
    /// cached strategy when the fetch fails.
    async fn ordering(&mut self) -> OrderingStrategy {
        match self.api.get_config().await {
            Ok(settings) => self.settings = settings,
            Err(e) => {
                tracing::warn!(error = %e, "config refresh failed, sorting with cached order");
            }
        }
        self.settings.use_ordering
    }

    fn require(&mut self, fields: &[(&str, &str)]) -> bool {
        for (label, value) in fields {
            if value.trim().is_empty() {
                self.notify("Error", format!("{} is required", label));
                return false;
            }
        }
        true
    }

    /// Refuse a manual reorder unless ordering is by `orderId`.
    fn custom_order_enabled(&mut self) -> bool {
        if self.settings.use_ordering.allows_manual_order() {
            return true;
        }
        self.notify("Error", "Custom order is disabled");
        false
    }

    // ── Categories ───────────────────────────────────────────────────

    pub async fn add_category(&mut self, new: NewCategory) -> Result<Option<Category>> {
        if !self.require(&[("Name", &new.name)]) {
            return Ok(None);
        }
        let result = self.api.create_category(&new).await;
        let category = self.report(result)?;
        self.notify("Success", format!("Category {} created", new.name));
        self.apps.add_category(category.clone());
        self.bookmarks.add_category(category.clone());
        let order = self.ordering().await;
        self.apps.sort_categories(order);
        self.bookmarks.sort_categories(order);
        Ok(Some(category))
    }

    pub async fn update_category(&mut self, id: i64, patch: CategoryPatch) -> Result<Category> {
        let result = self.api.update_category(id, &patch).await;
        let category = self.report(result)?;
        self.notify("Success", format!("Category {} updated", category.name));
        self.apps.update_category(category.clone());
        self.bookmarks.update_category(category.clone());
        let order = self.ordering().await;
        self.apps.sort_categories(order);
        self.bookmarks.sort_categories(order);
        Ok(category)
    }

    /// Toggle a category's pin.
    pub async fn pin_category(&mut self, id: i64) -> Result<Option<Category>> {
        let current = self
            .apps
            .category(id)
            .map(|node| node.category.clone())
            .or_else(|| self.bookmarks.category(id).map(|node| node.category.clone()));
        let Some(current) = current else {
            return Ok(None);
        };
        let patch = CategoryPatch {
            is_pinned: Some(!current.is_pinned),
            ..Default::default()
        };
        let result = self.api.update_category(id, &patch).await;
        let category = self.report(result)?;
        self.notify(
            "Success",
            format!("Category {} {}", current.name, pin_status(current.is_pinned)),
        );
        self.apps.pin_category(id, category.is_pinned);
        self.bookmarks.pin_category(id, category.is_pinned);
        Ok(Some(category))
    }

    pub async fn delete_category(&mut self, id: i64) -> Result<()> {
        let result = self.api.delete_category(id).await;
        self.report(result)?;
        self.notify("Success", "Category deleted");
        self.apps.delete_category(id);
        self.bookmarks.delete_category(id);
        Ok(())
    }

    /// Move one category of `kind` from `from` to `to` and persist the new order.
    pub async fn reorder_categories(&mut self, kind: CategoryKind, from: usize, to: usize) -> Result<bool> {
        if !self.custom_order_enabled() {
            return Ok(false);
        }
        let current: Vec<Category> = match kind {
            CategoryKind::Apps => self.apps.categories().iter().map(|n| n.category.clone()).collect(),
            CategoryKind::Bookmarks => self
                .bookmarks
                .categories()
                .iter()
                .map(|n| n.category.clone())
                .collect(),
        };
        let moved = move_item(&current, from, to)?;
        let items = positions(&moved);
        let result = self.api.reorder_categories(&items).await;
        self.report(result)?;
        match kind {
            CategoryKind::Apps => self.apps.replace_categories(&moved),
            CategoryKind::Bookmarks => self.bookmarks.replace_categories(&moved),
        }
        Ok(true)
    }

    // ── Apps ─────────────────────────────────────────────────────────

    pub async fn add_app(&mut self, new: NewApp) -> Result<Option<App>> {
        if !self.require(&[("Name", &new.name), ("URL", &new.url)]) {
            return Ok(None);
        }
        let result = self.api.create_app(&new).await;
        let app = self.report(result)?;
        self.notify("Success", "App created");
        self.apps.add_entry(app.clone());
        let order = self.ordering().await;
        self.apps.sort_entries(app.category_id, order);
        Ok(Some(app))
    }

    pub async fn update_app(&mut self, id: i64, patch: AppPatch) -> Result<App> {
        let prev = self.apps.find_entry(id).map(Entry::category_id);
        let result = self.api.update_app(id, &patch).await;
        let app = self.report(result)?;
        self.notify("Success", "App updated");
        self.apps
            .apply_update(prev.unwrap_or(app.category_id), app.clone());
        let order = self.ordering().await;
        self.apps.sort_entries(app.category_id, order);
        Ok(app)
    }

    /// Toggle an app's pin.
    pub async fn pin_app(&mut self, id: i64) -> Result<Option<App>> {
        let Some(current) = self.apps.find_entry(id).cloned() else {
            return Ok(None);
        };
        let patch = AppPatch {
            is_pinned: Some(!current.is_pinned),
            ..Default::default()
        };
        let result = self.api.update_app(id, &patch).await;
        let app = self.report(result)?;
        self.notify(
            "Success",
            format!("App {} {}", current.name, pin_status(current.is_pinned)),
        );
        self.apps.update_entry(app.clone());
        Ok(Some(app))
    }

    pub async fn delete_app(&mut self, id: i64, category_id: i64) -> Result<()> {
        let result = self.api.delete_app(id).await;
        self.report(result)?;
        self.notify("Success", "App deleted");
        self.apps.delete_entry(id, category_id);
        Ok(())
    }

    /// Move one app inside `category_id` and persist the category's new order.
    pub async fn reorder_apps(&mut self, category_id: i64, from: usize, to: usize) -> Result<bool> {
        if !self.custom_order_enabled() {
            return Ok(false);
        }
        let Some((moved, items)) = plan_reorder(&self.apps, category_id, from, to)? else {
            return Ok(false);
        };
        let result = self.api.reorder_apps(&items).await;
        self.report(result)?;
        self.apps.replace_entries(category_id, moved);
        Ok(true)
    }

    // ── Bookmarks ────────────────────────────────────────────────────

    pub async fn add_bookmark(&mut self, new: NewBookmark) -> Result<Option<Bookmark>> {
        if !self.require(&[("Name", &new.name), ("URL", &new.url)]) {
            return Ok(None);
        }
        let result = self.api.create_bookmark(&new).await;
        let bookmark = self.report(result)?;
        self.notify("Success", format!("Bookmark {} created", bookmark.name));
        self.bookmarks.add_entry(bookmark.clone());
        let order = self.ordering().await;
        self.bookmarks.sort_entries(bookmark.category_id, order);
        Ok(Some(bookmark))
    }

    pub async fn update_bookmark(&mut self, id: i64, patch: BookmarkPatch) -> Result<Bookmark> {
        let prev = self.bookmarks.find_entry(id).map(Entry::category_id);
        let result = self.api.update_bookmark(id, &patch).await;
        let bookmark = self.report(result)?;
        self.notify("Success", format!("Bookmark {} updated", bookmark.name));
        self.bookmarks
            .apply_update(prev.unwrap_or(bookmark.category_id), bookmark.clone());
        let order = self.ordering().await;
        self.bookmarks.sort_entries(bookmark.category_id, order);
        Ok(bookmark)
    }

    /// Toggle a bookmark's pin.
    pub async fn pin_bookmark(&mut self, id: i64) -> Result<Option<Bookmark>> {
        let Some(current) = self.bookmarks.find_entry(id).cloned() else {
            return Ok(None);
        };
        let patch = BookmarkPatch {
            is_pinned: Some(!current.is_pinned),
            ..Default::default()
        };
        let result = self.api.update_bookmark(id, &patch).await;
        let bookmark = self.report(result)?;
        self.notify(
            "Success",
            format!("Bookmark {} {}", current.name, pin_status(current.is_pinned)),
        );
        self.bookmarks.update_entry(bookmark.clone());
        Ok(Some(bookmark))
    }

    pub async fn delete_bookmark(&mut self, id: i64, category_id: i64) -> Result<()> {
        let result = self.api.delete_bookmark(id).await;
        self.report(result)?;
        self.notify("Success", "Bookmark deleted");
        self.bookmarks.delete_entry(id, category_id);
        Ok(())
    }

    pub async fn reorder_bookmarks(&mut self, category_id: i64, from: usize, to: usize) -> Result<bool> {
        if !self.custom_order_enabled() {
            return Ok(false);
        }
        let Some((moved, items)) = plan_reorder(&self.bookmarks, category_id, from, to)? else {
            return Ok(false);
        };
        let result = self.api.reorder_bookmarks(&items).await;
        self.report(result)?;
        self.bookmarks.replace_entries(category_id, moved);
        Ok(true)
    }

    // ── Search ───────────────────────────────────────────────────────

    /// What pressing Enter in the search bar does for `input`.
    pub fn search(&mut self, input: &str) -> SearchAction {
        let parsed = search::parse(input, &self.settings.search(), &self.queries);
        let needle = parsed.raw_query.to_lowercase();
        let first_app = first_match(&self.apps, &needle);
        let first_bookmark = first_match(&self.bookmarks, &needle);
        let action = search::resolve(
            input,
            &parsed,
            first_app.as_deref(),
            first_bookmark.as_deref(),
        );
        if let SearchAction::Notify(message) = &action {
            self.notify("Error", message.clone());
        }
        action
    }
}

fn plan_reorder<T: Entry>(
    store: &CategoryStore<T>,
    category_id: i64,
    from: usize,
    to: usize,
) -> Result<Option<(Vec<T>, Vec<ReorderItem>)>> {
    let Some(node) = store.category(category_id) else {
        return Ok(None);
    };
    let moved = move_item(&node.entries, from, to)?;
    let items = positions(&moved);
    Ok(Some((moved, items)))
}

/// URL of the first entry whose name contains `needle` (already lowercased).
fn first_match<T: Entry + HasUrl>(store: &CategoryStore<T>, needle: &str) -> Option<String> {
    if needle.trim().is_empty() {
        return None;
    }
    store
        .categories()
        .iter()
        .flat_map(|node| node.entries.iter())
        .find(|entry| entry.name().to_lowercase().contains(needle))
        .map(|entry| entry.url().to_string())
}

trait HasUrl {
    fn url(&self) -> &str;
}

impl HasUrl for App {
    fn url(&self) -> &str {
        &self.url
    }
}

impl HasUrl for Bookmark {
    fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flame_common::CategoryView;

    fn offline() -> Dashboard {
        Dashboard::new(ApiClient::new("http://127.0.0.1:1"))
    }

    fn app(id: i64, name: &str, category_id: i64) -> App {
        App {
            id,
            name: name.to_string(),
            url: format!("http://{}.lan", name),
            description: String::new(),
            category_id,
            icon: "cancel".to_string(),
            is_pinned: true,
            is_public: true,
            order_id: Some(id),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn media() -> CategoryView {
        let mut view = CategoryView::empty(Category {
            id: 1,
            name: "Media".into(),
            kind: CategoryKind::Apps,
            is_pinned: true,
            is_public: true,
            order_id: Some(1),
            created_at: String::new(),
            updated_at: String::new(),
        });
        view.apps = vec![app(1, "Plex", 1), app(2, "Jellyfin", 1)];
        view
    }

    #[tokio::test]
    async fn test_reorder_refused_before_any_request() {
        let mut dash = offline();
        dash.apps.load(vec![media()]);

        // The server is unreachable, so reaching the network would be an error.
        let reordered = dash.reorder_apps(1, 0, 1).await.unwrap();
        assert!(!reordered);
        assert_eq!(
            dash.take_notifications(),
            vec![Notification {
                title: "Error".into(),
                message: "Custom order is disabled".into(),
            }]
        );
        assert_eq!(dash.apps.category(1).unwrap().entries[0].name, "Plex");
    }

    #[tokio::test]
    async fn test_missing_fields_notify_without_request() {
        let mut dash = offline();
        let created = dash
            .add_app(NewApp {
                name: "Plex".into(),
                url: "  ".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(created.is_none());
        let notes = dash.take_notifications();
        assert_eq!(notes[0].message, "URL is required");
    }

    #[tokio::test]
    async fn test_failed_request_becomes_error_notification() {
        let mut dash = offline();
        let result = dash.delete_app(1, 1).await;
        assert!(result.is_err());
        let notes = dash.take_notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "Error");
    }

    async fn serve(router: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_config_failure_after_write_keeps_success() {
        use axum::Json;
        use axum::http::StatusCode;
        use axum::routing::{get, post};
        use serde_json::json;

        let router = axum::Router::new()
            .route(
                "/api/apps",
                post(|| async {
                    (
                        StatusCode::CREATED,
                        Json(json!({"success": true, "data": app(3, "Sonarr", 1)})),
                    )
                }),
            )
            .route(
                "/api/config",
                get(|| async {
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({"success": false, "error": "db down"})),
                    )
                }),
            );
        let mut dash = Dashboard::new(ApiClient::new(serve(router).await));
        dash.apps.load(vec![media()]);

        let created = dash
            .add_app(NewApp {
                name: "Sonarr".into(),
                url: "http://sonarr.lan".into(),
                category_id: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(created.map(|a| a.id), Some(3));
        assert_eq!(dash.apps.category(1).unwrap().entries.len(), 3);
        assert_eq!(
            dash.take_notifications(),
            vec![Notification {
                title: "Success".into(),
                message: "App created".into(),
            }]
        );
    }

    #[test]
    fn test_local_search_opens_first_match() {
        let mut dash = offline();
        dash.apps.load(vec![media()]);

        assert_eq!(
            dash.search("jelly"),
            SearchAction::Redirect {
                url: "http://Jellyfin.lan".into(),
                same_tab: false,
            }
        );
        assert_eq!(
            dash.search("/g rust"),
            SearchAction::Redirect {
                url: "https://www.google.com/search?q=rust".into(),
                same_tab: false,
            }
        );
        assert_eq!(
            dash.search("/zz rust"),
            SearchAction::Notify("Prefix not found".into())
        );
        assert_eq!(dash.take_notifications().len(), 1);
    }
}
