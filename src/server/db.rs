use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::{Map, Value};

use flame_common::ordering::sort_by_strategy;
use flame_common::{
    App, AppPatch, Bookmark, BookmarkPatch, Category, CategoryKind, CategoryPatch, CategoryView,
    NEW_CATEGORY_ORDER, NewApp, NewBookmark, NewCategory, OrderingStrategy, ReorderItem,
    SearchQuery, UNASSIGNED_CATEGORY_ID,
};

use crate::errors::FlameError;
use crate::settings::Settings;

/// Async-safe handle to the Flame database.
///
/// Wraps `FlameDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<FlameDb>>,
}

impl DbHandle {
    pub fn new(db: FlameDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&FlameDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

/// Visibility filter for listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Visibility {
    pub public_only: bool,
}

impl Visibility {
    pub const ALL: Self = Self { public_only: false };
    pub const PUBLIC: Self = Self { public_only: true };

    fn admits(&self, is_public: bool) -> bool {
        !self.public_only || is_public
    }
}

/// Rows removed by a category delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct DeletedCategory {
    pub apps: usize,
    pub bookmarks: usize,
}

pub struct FlameDb {
    conn: Connection,
}

const CATEGORY_COLUMNS: &str =
    "id, name, type, is_pinned, is_public, order_id, created_at, updated_at";
const APP_COLUMNS: &str = "id, name, url, description, category_id, icon, is_pinned, is_public, order_id, created_at, updated_at";
const BOOKMARK_COLUMNS: &str =
    "id, name, url, category_id, icon, is_pinned, is_public, order_id, created_at, updated_at";

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl FlameDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    // Children reference categories by id without a foreign key: -1 means
    // unassigned and the synthetic integration categories may not exist yet.
    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS categories (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    type TEXT NOT NULL DEFAULT 'bookmarks',
                    is_pinned INTEGER NOT NULL DEFAULT 0,
                    is_public INTEGER NOT NULL DEFAULT 1,
                    order_id INTEGER,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS apps (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    url TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    category_id INTEGER NOT NULL DEFAULT -1,
                    icon TEXT NOT NULL DEFAULT 'cancel',
                    is_pinned INTEGER NOT NULL DEFAULT 0,
                    is_public INTEGER NOT NULL DEFAULT 1,
                    order_id INTEGER,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS bookmarks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    url TEXT NOT NULL,
                    category_id INTEGER NOT NULL DEFAULT -1,
                    icon TEXT NOT NULL DEFAULT '',
                    is_pinned INTEGER NOT NULL DEFAULT 0,
                    is_public INTEGER NOT NULL DEFAULT 1,
                    order_id INTEGER,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS config (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS custom_queries (
                    prefix TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    template TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_apps_category ON apps(category_id);
                CREATE INDEX IF NOT EXISTS idx_apps_name ON apps(name);
                CREATE INDEX IF NOT EXISTS idx_bookmarks_category ON bookmarks(category_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    /// Run `f` inside one transaction. `f` must not start another.
    pub fn transaction<R>(&self, f: impl FnOnce(&Self) -> Result<R>) -> Result<R> {
        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let out = f(self)?;
        tx.commit().context("Failed to commit transaction")?;
        Ok(out)
    }

    // ── Category CRUD ─────────────────────────────────────────────────

    pub fn create_category(&self, new: &NewCategory, pin_by_default: bool) -> Result<Category> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(FlameError::Validation("Category name is required".into()).into());
        }
        let kind = new.kind.unwrap_or(CategoryKind::Bookmarks);
        let order_id = self.next_category_order()?;
        let ts = now();
        self.conn
            .execute(
                "INSERT INTO categories (name, type, is_pinned, is_public, order_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    name,
                    kind.as_str(),
                    new.is_pinned.unwrap_or(pin_by_default),
                    new.is_public.unwrap_or(true),
                    order_id,
                    ts
                ],
            )
            .context("Failed to insert category")?;
        let id = self.conn.last_insert_rowid();
        self.get_category(id)?
            .context("Category not found after insert")
    }

    /// Insert a category with a caller-chosen id and order.
    pub fn insert_category_with_id(&self, category: &Category) -> Result<Category> {
        let ts = now();
        self.conn
            .execute(
                "INSERT INTO categories (id, name, type, is_pinned, is_public, order_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    category.id,
                    category.name,
                    category.kind.as_str(),
                    category.is_pinned,
                    category.is_public,
                    category.order_id,
                    ts
                ],
            )
            .with_context(|| format!("Failed to insert category {}", category.id))?;
        self.get_category(category.id)?
            .context("Category not found after insert")
    }

    /// Insert an integration-created category: apps, pinned, sorted last.
    pub fn create_integration_category(&self, name: &str) -> Result<Category> {
        let ts = now();
        self.conn
            .execute(
                "INSERT INTO categories (name, type, is_pinned, is_public, order_id, created_at, updated_at)
                 VALUES (?1, 'apps', 1, 1, ?2, ?3, ?3)",
                params![name, NEW_CATEGORY_ORDER, ts],
            )
            .context("Failed to insert integration category")?;
        let id = self.conn.last_insert_rowid();
        self.get_category(id)?
            .context("Category not found after insert")
    }

    fn next_category_order(&self) -> Result<i64> {
        let max: i64 = self
            .conn
            .query_row(
                "SELECT COALESCE(MAX(order_id), 0) FROM categories WHERE order_id < ?1",
                params![NEW_CATEGORY_ORDER],
                |row| row.get(0),
            )
            .context("Failed to get max category order")?;
        Ok(max + 1)
    }

    pub fn get_category(&self, id: i64) -> Result<Option<Category>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM categories WHERE id = ?1", CATEGORY_COLUMNS),
                params![id],
                category_from_row,
            )
            .optional()
            .context("Failed to query category")
    }

    /// Case-insensitive lookup among categories of `kind`.
    pub fn find_category_by_name(&self, name: &str, kind: CategoryKind) -> Result<Option<Category>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM categories WHERE lower(name) = lower(?1) AND type = ?2 ORDER BY id LIMIT 1",
                    CATEGORY_COLUMNS
                ),
                params![name, kind.as_str()],
                category_from_row,
            )
            .optional()
            .context("Failed to query category by name")
    }

    pub fn list_category_rows(&self) -> Result<Vec<Category>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM categories ORDER BY id", CATEGORY_COLUMNS))
            .context("Failed to prepare list_categories")?;
        let rows = stmt
            .query_map([], category_from_row)
            .context("Failed to query categories")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read category row")
    }

    /// Categories with their children, sorted by `order` at both levels.
    pub fn list_categories(
        &self,
        kind: Option<CategoryKind>,
        order: OrderingStrategy,
        visibility: Visibility,
    ) -> Result<Vec<CategoryView>> {
        let mut categories: Vec<Category> = self
            .list_category_rows()?
            .into_iter()
            .filter(|c| kind.is_none_or(|k| c.kind == k) && visibility.admits(c.is_public))
            .collect();
        sort_by_strategy(&mut categories, order);

        let mut apps_by_category: HashMap<i64, Vec<App>> = HashMap::new();
        for app in self.list_apps(order, visibility)? {
            apps_by_category.entry(app.category_id).or_default().push(app);
        }
        let mut bookmarks_by_category: HashMap<i64, Vec<Bookmark>> = HashMap::new();
        for bookmark in self.list_bookmarks(order, visibility)? {
            bookmarks_by_category
                .entry(bookmark.category_id)
                .or_default()
                .push(bookmark);
        }

        Ok(categories
            .into_iter()
            .map(|category| {
                let id = category.id;
                CategoryView {
                    category,
                    apps: apps_by_category.remove(&id).unwrap_or_default(),
                    bookmarks: bookmarks_by_category.remove(&id).unwrap_or_default(),
                }
            })
            .collect())
    }

    pub fn get_category_view(
        &self,
        id: i64,
        order: OrderingStrategy,
        visibility: Visibility,
    ) -> Result<Option<CategoryView>> {
        let Some(category) = self.get_category(id)? else {
            return Ok(None);
        };
        if !visibility.admits(category.is_public) {
            return Ok(None);
        }
        let mut apps = self.list_apps_in(id)?;
        apps.retain(|a| visibility.admits(a.is_public));
        sort_by_strategy(&mut apps, order);
        let mut bookmarks = self.list_bookmarks_in(id)?;
        bookmarks.retain(|b| visibility.admits(b.is_public));
        sort_by_strategy(&mut bookmarks, order);
        Ok(Some(CategoryView {
            category,
            apps,
            bookmarks,
        }))
    }

    pub fn update_category(&self, id: i64, patch: &CategoryPatch) -> Result<Category> {
        let mut category = self
            .get_category(id)?
            .ok_or(FlameError::CategoryNotFound { id })?;
        if let Some(name) = &patch.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(FlameError::Validation("Category name is required".into()).into());
            }
            category.name = name.to_string();
        }
        if let Some(pinned) = patch.is_pinned {
            category.is_pinned = pinned;
        }
        if let Some(public) = patch.is_public {
            category.is_public = public;
        }
        if let Some(order_id) = patch.order_id {
            category.order_id = Some(order_id);
        }
        self.conn
            .execute(
                "UPDATE categories SET name = ?1, is_pinned = ?2, is_public = ?3, order_id = ?4, updated_at = ?5 WHERE id = ?6",
                params![
                    category.name,
                    category.is_pinned,
                    category.is_public,
                    category.order_id,
                    now(),
                    id
                ],
            )
            .context("Failed to update category")?;
        self.get_category(id)?
            .context("Category not found after update")
    }

    /// Delete a category's apps, then its bookmarks, then the category row, atomically.
    pub fn delete_category(&self, id: i64) -> Result<DeletedCategory> {
        if self.get_category(id)?.is_none() {
            return Err(FlameError::CategoryNotFound { id }.into());
        }
        self.transaction(|db| {
            let apps = db
                .conn
                .execute("DELETE FROM apps WHERE category_id = ?1", params![id])
                .context("Failed to delete category apps")?;
            let bookmarks = db
                .conn
                .execute("DELETE FROM bookmarks WHERE category_id = ?1", params![id])
                .context("Failed to delete category bookmarks")?;
            db.conn
                .execute("DELETE FROM categories WHERE id = ?1", params![id])
                .context("Failed to delete category")?;
            Ok(DeletedCategory { apps, bookmarks })
        })
    }

    pub fn reorder_categories(&self, items: &[ReorderItem]) -> Result<()> {
        self.reorder("categories", items)
    }

    // ── App CRUD ──────────────────────────────────────────────────────

    pub fn create_app(&self, new: &NewApp, pin_by_default: bool) -> Result<App> {
        let name = required(&new.name, "Name")?;
        let url = required(&new.url, "URL")?;
        let category_id = new.category_id.unwrap_or(UNASSIGNED_CATEGORY_ID);
        self.check_parent(category_id, CategoryKind::Apps)?;
        let icon = new
            .icon
            .as_deref()
            .map(str::trim)
            .filter(|i| !i.is_empty())
            .unwrap_or("cancel");
        let order_id = self.next_child_order("apps", category_id)?;
        let ts = now();
        self.conn
            .execute(
                "INSERT INTO apps (name, url, description, category_id, icon, is_pinned, is_public, order_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    name,
                    url,
                    new.description.as_deref().unwrap_or(""),
                    category_id,
                    icon,
                    pin_by_default,
                    new.is_public.unwrap_or(true),
                    order_id,
                    ts
                ],
            )
            .context("Failed to insert app")?;
        let id = self.conn.last_insert_rowid();
        self.get_app(id)?.context("App not found after insert")
    }

    /// Insert a fully specified app. Used by the integration upsert.
    pub fn insert_app(&self, app: &App) -> Result<App> {
        let ts = now();
        self.conn
            .execute(
                "INSERT INTO apps (name, url, description, category_id, icon, is_pinned, is_public, order_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    app.name,
                    app.url,
                    app.description,
                    app.category_id,
                    app.icon,
                    app.is_pinned,
                    app.is_public,
                    app.order_id,
                    ts
                ],
            )
            .context("Failed to insert app")?;
        let id = self.conn.last_insert_rowid();
        self.get_app(id)?.context("App not found after insert")
    }

    pub fn get_app(&self, id: i64) -> Result<Option<App>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM apps WHERE id = ?1", APP_COLUMNS),
                params![id],
                app_from_row,
            )
            .optional()
            .context("Failed to query app")
    }

    pub fn find_app_by_name(&self, name: &str) -> Result<Option<App>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM apps WHERE name = ?1 ORDER BY id LIMIT 1",
                    APP_COLUMNS
                ),
                params![name],
                app_from_row,
            )
            .optional()
            .context("Failed to query app by name")
    }

    pub fn list_apps(&self, order: OrderingStrategy, visibility: Visibility) -> Result<Vec<App>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM apps ORDER BY id", APP_COLUMNS))
            .context("Failed to prepare list_apps")?;
        let rows = stmt.query_map([], app_from_row).context("Failed to query apps")?;
        let mut apps = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read app row")?;
        apps.retain(|a| visibility.admits(a.is_public));
        sort_by_strategy(&mut apps, order);
        Ok(apps)
    }

    fn list_apps_in(&self, category_id: i64) -> Result<Vec<App>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM apps WHERE category_id = ?1 ORDER BY id",
                APP_COLUMNS
            ))
            .context("Failed to prepare list_apps_in")?;
        let rows = stmt
            .query_map(params![category_id], app_from_row)
            .context("Failed to query apps")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read app row")
    }

    pub fn update_app(&self, id: i64, patch: &AppPatch) -> Result<App> {
        let mut app = self.get_app(id)?.ok_or(FlameError::AppNotFound { id })?;
        if let Some(name) = &patch.name {
            app.name = required(name, "Name")?.to_string();
        }
        if let Some(url) = &patch.url {
            app.url = required(url, "URL")?.to_string();
        }
        if let Some(description) = &patch.description {
            app.description = description.clone();
        }
        if let Some(category_id) = patch.category_id {
            if category_id != app.category_id {
                self.check_parent(category_id, CategoryKind::Apps)?;
            }
            app.category_id = category_id;
        }
        if let Some(icon) = &patch.icon {
            let icon = icon.trim();
            app.icon = if icon.is_empty() { "cancel" } else { icon }.to_string();
        }
        if let Some(pinned) = patch.is_pinned {
            app.is_pinned = pinned;
        }
        if let Some(public) = patch.is_public {
            app.is_public = public;
        }
        if let Some(order_id) = patch.order_id {
            app.order_id = Some(order_id);
        }
        self.write_app(&app)?;
        self.get_app(id)?.context("App not found after update")
    }

    /// Overwrite every mutable column of an existing app.
    pub fn write_app(&self, app: &App) -> Result<()> {
        self.conn
            .execute(
                "UPDATE apps SET name = ?1, url = ?2, description = ?3, category_id = ?4, icon = ?5,
                 is_pinned = ?6, is_public = ?7, order_id = ?8, updated_at = ?9 WHERE id = ?10",
                params![
                    app.name,
                    app.url,
                    app.description,
                    app.category_id,
                    app.icon,
                    app.is_pinned,
                    app.is_public,
                    app.order_id,
                    now(),
                    app.id
                ],
            )
            .context("Failed to update app")?;
        Ok(())
    }

    pub fn delete_app(&self, id: i64) -> Result<()> {
        let removed = self
            .conn
            .execute("DELETE FROM apps WHERE id = ?1", params![id])
            .context("Failed to delete app")?;
        if removed == 0 {
            return Err(FlameError::AppNotFound { id }.into());
        }
        Ok(())
    }

    /// Unpin every app. Returns how many rows changed.
    pub fn unpin_all_apps(&self) -> Result<usize> {
        self.conn
            .execute(
                "UPDATE apps SET is_pinned = 0, updated_at = ?1 WHERE is_pinned = 1",
                params![now()],
            )
            .context("Failed to unpin apps")
    }

    pub fn reorder_apps(&self, items: &[ReorderItem]) -> Result<()> {
        self.reorder("apps", items)
    }

    // ── Bookmark CRUD ─────────────────────────────────────────────────

    pub fn create_bookmark(&self, new: &NewBookmark, pin_by_default: bool) -> Result<Bookmark> {
        let name = required(&new.name, "Name")?;
        let url = required(&new.url, "URL")?;
        let category_id = new.category_id.unwrap_or(UNASSIGNED_CATEGORY_ID);
        self.check_parent(category_id, CategoryKind::Bookmarks)?;
        let icon = new.icon.as_deref().map(str::trim).unwrap_or("");
        let order_id = self.next_child_order("bookmarks", category_id)?;
        let ts = now();
        self.conn
            .execute(
                "INSERT INTO bookmarks (name, url, category_id, icon, is_pinned, is_public, order_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    name,
                    url,
                    category_id,
                    icon,
                    pin_by_default,
                    new.is_public.unwrap_or(true),
                    order_id,
                    ts
                ],
            )
            .context("Failed to insert bookmark")?;
        let id = self.conn.last_insert_rowid();
        self.get_bookmark(id)?
            .context("Bookmark not found after insert")
    }

    pub fn get_bookmark(&self, id: i64) -> Result<Option<Bookmark>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM bookmarks WHERE id = ?1", BOOKMARK_COLUMNS),
                params![id],
                bookmark_from_row,
            )
            .optional()
            .context("Failed to query bookmark")
    }

    pub fn list_bookmarks(
        &self,
        order: OrderingStrategy,
        visibility: Visibility,
    ) -> Result<Vec<Bookmark>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM bookmarks ORDER BY id", BOOKMARK_COLUMNS))
            .context("Failed to prepare list_bookmarks")?;
        let rows = stmt
            .query_map([], bookmark_from_row)
            .context("Failed to query bookmarks")?;
        let mut bookmarks = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read bookmark row")?;
        bookmarks.retain(|b| visibility.admits(b.is_public));
        sort_by_strategy(&mut bookmarks, order);
        Ok(bookmarks)
    }

    fn list_bookmarks_in(&self, category_id: i64) -> Result<Vec<Bookmark>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM bookmarks WHERE category_id = ?1 ORDER BY id",
                BOOKMARK_COLUMNS
            ))
            .context("Failed to prepare list_bookmarks_in")?;
        let rows = stmt
            .query_map(params![category_id], bookmark_from_row)
            .context("Failed to query bookmarks")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read bookmark row")
    }

    pub fn update_bookmark(&self, id: i64, patch: &BookmarkPatch) -> Result<Bookmark> {
        let mut bookmark = self
            .get_bookmark(id)?
            .ok_or(FlameError::BookmarkNotFound { id })?;
        if let Some(name) = &patch.name {
            bookmark.name = required(name, "Name")?.to_string();
        }
        if let Some(url) = &patch.url {
            bookmark.url = required(url, "URL")?.to_string();
        }
        if let Some(category_id) = patch.category_id {
            if category_id != bookmark.category_id {
                self.check_parent(category_id, CategoryKind::Bookmarks)?;
            }
            bookmark.category_id = category_id;
        }
        if let Some(icon) = &patch.icon {
            bookmark.icon = icon.trim().to_string();
        }
        if let Some(pinned) = patch.is_pinned {
            bookmark.is_pinned = pinned;
        }
        if let Some(public) = patch.is_public {
            bookmark.is_public = public;
        }
        if let Some(order_id) = patch.order_id {
            bookmark.order_id = Some(order_id);
        }
        self.conn
            .execute(
                "UPDATE bookmarks SET name = ?1, url = ?2, category_id = ?3, icon = ?4,
                 is_pinned = ?5, is_public = ?6, order_id = ?7, updated_at = ?8 WHERE id = ?9",
                params![
                    bookmark.name,
                    bookmark.url,
                    bookmark.category_id,
                    bookmark.icon,
                    bookmark.is_pinned,
                    bookmark.is_public,
                    bookmark.order_id,
                    now(),
                    id
                ],
            )
            .context("Failed to update bookmark")?;
        self.get_bookmark(id)?
            .context("Bookmark not found after update")
    }

    pub fn delete_bookmark(&self, id: i64) -> Result<()> {
        let removed = self
            .conn
            .execute("DELETE FROM bookmarks WHERE id = ?1", params![id])
            .context("Failed to delete bookmark")?;
        if removed == 0 {
            return Err(FlameError::BookmarkNotFound { id }.into());
        }
        Ok(())
    }

    pub fn reorder_bookmarks(&self, items: &[ReorderItem]) -> Result<()> {
        self.reorder("bookmarks", items)
    }

    // ── Shared helpers ────────────────────────────────────────────────

    /// Children may only belong to a category of their own kind, or to none.
    fn check_parent(&self, category_id: i64, kind: CategoryKind) -> Result<()> {
        if category_id == UNASSIGNED_CATEGORY_ID {
            return Ok(());
        }
        match self.get_category(category_id)? {
            Some(category) if category.kind == kind => Ok(()),
            Some(category) => Err(FlameError::Validation(format!(
                "Category {} holds {}, not {}",
                category.name, category.kind, kind
            ))
            .into()),
            None => Err(FlameError::Validation(format!(
                "Category with id of {} does not exist",
                category_id
            ))
            .into()),
        }
    }

    fn next_child_order(&self, table: &str, category_id: i64) -> Result<i64> {
        let max: i64 = self
            .conn
            .query_row(
                &format!(
                    "SELECT COALESCE(MAX(order_id), 0) FROM {} WHERE category_id = ?1",
                    table
                ),
                params![category_id],
                |row| row.get(0),
            )
            .with_context(|| format!("Failed to get max order for {}", table))?;
        Ok(max + 1)
    }

    /// Write every submitted position in one transaction. Any unknown id
    /// rejects the whole batch and nothing changes.
    fn reorder(&self, table: &str, items: &[ReorderItem]) -> Result<()> {
        self.transaction(|db| {
            let ts = now();
            let mut unknown = Vec::new();
            for item in items {
                let changed = db
                    .conn
                    .execute(
                        &format!(
                            "UPDATE {} SET order_id = ?1, updated_at = ?2 WHERE id = ?3",
                            table
                        ),
                        params![item.order_id, ts, item.id],
                    )
                    .with_context(|| format!("Failed to reorder {} {}", table, item.id))?;
                if changed == 0 {
                    unknown.push(item.id);
                }
            }
            if !unknown.is_empty() {
                return Err(FlameError::UnknownReorderIds { ids: unknown }.into());
            }
            Ok(())
        })
    }

    // ── Config ────────────────────────────────────────────────────────

    pub fn list_config(&self) -> Result<Vec<(String, Value)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM config ORDER BY key")
            .context("Failed to prepare list_config")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .context("Failed to query config")?;
        let mut entries = Vec::new();
        for row in rows {
            let (key, raw) = row.context("Failed to read config row")?;
            let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            entries.push((key, value));
        }
        Ok(entries)
    }

    pub fn load_settings(&self) -> Result<Settings> {
        Ok(Settings::from_entries(self.list_config()?))
    }

    /// Merge `patch` into the stored config. Keys not in `patch` are untouched.
    pub fn update_settings(&self, patch: &Map<String, Value>) -> Result<Settings> {
        Settings::validate_patch(patch)?;
        self.transaction(|db| {
            let ts = now();
            for (key, value) in patch {
                db.conn
                    .execute(
                        "INSERT INTO config (key, value, updated_at) VALUES (?1, ?2, ?3)
                         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                        params![key, value.to_string(), ts],
                    )
                    .with_context(|| format!("Failed to upsert config key {}", key))?;
            }
            Ok(())
        })?;
        self.load_settings()
    }

    /// Store every default key that is not already present.
    pub fn seed_default_settings(&self) -> Result<usize> {
        let ts = now();
        let mut inserted = 0;
        for (key, value) in Settings::default().to_map() {
            inserted += self
                .conn
                .execute(
                    "INSERT OR IGNORE INTO config (key, value, updated_at) VALUES (?1, ?2, ?3)",
                    params![key, value.to_string(), ts],
                )
                .context("Failed to seed config")?;
        }
        Ok(inserted)
    }

    // ── Custom search queries ─────────────────────────────────────────

    pub fn list_queries(&self) -> Result<Vec<SearchQuery>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, prefix, template FROM custom_queries ORDER BY prefix")
            .context("Failed to prepare list_queries")?;
        let rows = stmt
            .query_map([], query_from_row)
            .context("Failed to query custom queries")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read custom query row")
    }

    pub fn create_query(&self, query: &SearchQuery) -> Result<SearchQuery> {
        validate_query(query)?;
        let exists: bool = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM custom_queries WHERE prefix = ?1)",
                params![query.prefix],
                |row| row.get(0),
            )
            .context("Failed to check custom query prefix")?;
        if exists {
            return Err(FlameError::Validation(format!(
                "Prefix {} is already in use",
                query.prefix
            ))
            .into());
        }
        self.conn
            .execute(
                "INSERT INTO custom_queries (prefix, name, template) VALUES (?1, ?2, ?3)",
                params![query.prefix, query.name, query.template],
            )
            .context("Failed to insert custom query")?;
        Ok(query.clone())
    }

    pub fn update_query(&self, prefix: &str, query: &SearchQuery) -> Result<SearchQuery> {
        validate_query(query)?;
        let changed = self
            .conn
            .execute(
                "UPDATE custom_queries SET prefix = ?1, name = ?2, template = ?3 WHERE prefix = ?4",
                params![query.prefix, query.name, query.template, prefix],
            )
            .context("Failed to update custom query")?;
        if changed == 0 {
            return Err(FlameError::QueryNotFound {
                prefix: prefix.to_string(),
            }
            .into());
        }
        Ok(query.clone())
    }

    pub fn delete_query(&self, prefix: &str) -> Result<()> {
        let removed = self
            .conn
            .execute("DELETE FROM custom_queries WHERE prefix = ?1", params![prefix])
            .context("Failed to delete custom query")?;
        if removed == 0 {
            return Err(FlameError::QueryNotFound {
                prefix: prefix.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(FlameError::Validation(format!("{} is required", field)).into());
    }
    Ok(value)
}

fn validate_query(query: &SearchQuery) -> Result<()> {
    required(&query.name, "Name")?;
    required(&query.template, "Template")?;
    let prefix = required(&query.prefix, "Prefix")?;
    if !prefix.chars().all(|c| c.is_ascii_lowercase()) {
        return Err(
            FlameError::Validation("Prefix may only contain lowercase letters".into()).into(),
        );
    }
    Ok(())
}

// ── Row mapping ───────────────────────────────────────────────────────

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    let kind: String = row.get(2)?;
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: kind.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?,
        is_pinned: row.get(3)?,
        is_public: row.get(4)?,
        order_id: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn app_from_row(row: &Row<'_>) -> rusqlite::Result<App> {
    Ok(App {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        description: row.get(3)?,
        category_id: row.get(4)?,
        icon: row.get(5)?,
        is_pinned: row.get(6)?,
        is_public: row.get(7)?,
        order_id: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn bookmark_from_row(row: &Row<'_>) -> rusqlite::Result<Bookmark> {
    Ok(Bookmark {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        category_id: row.get(3)?,
        icon: row.get(4)?,
        is_pinned: row.get(5)?,
        is_public: row.get(6)?,
        order_id: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn query_from_row(row: &Row<'_>) -> rusqlite::Result<SearchQuery> {
    Ok(SearchQuery {
        name: row.get(0)?,
        prefix: row.get(1)?,
        template: row.get(2)?,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_category(name: &str, kind: CategoryKind) -> NewCategory {
        NewCategory {
            name: name.to_string(),
            kind: Some(kind),
            ..Default::default()
        }
    }

    fn new_app(name: &str, category_id: i64) -> NewApp {
        NewApp {
            name: name.to_string(),
            url: format!("http://{}.lan", name),
            category_id: Some(category_id),
            ..Default::default()
        }
    }

    fn new_bookmark(name: &str, category_id: i64) -> NewBookmark {
        NewBookmark {
            name: name.to_string(),
            url: format!("https://{}.org", name),
            category_id: Some(category_id),
            ..Default::default()
        }
    }

    fn not_found(err: &anyhow::Error) -> bool {
        err.downcast_ref::<FlameError>()
            .is_some_and(FlameError::is_not_found)
    }

    #[test]
    fn test_create_database_and_run_migrations() -> Result<()> {
        let db = FlameDb::new_in_memory()?;
        let table_count: i32 = db.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('categories', 'apps', 'bookmarks', 'config', 'custom_queries')",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(table_count, 5);
        Ok(())
    }

    #[test]
    fn test_create_category_uses_pin_default_and_next_order() -> Result<()> {
        let db = FlameDb::new_in_memory()?;
        let first = db.create_category(&new_category("Media", CategoryKind::Apps), true)?;
        let second = db.create_category(&new_category("Docs", CategoryKind::Bookmarks), false)?;

        assert!(first.is_pinned);
        assert!(!second.is_pinned);
        assert_eq!(first.order_id, Some(1));
        assert_eq!(second.order_id, Some(2));
        assert_eq!(second.kind, CategoryKind::Bookmarks);
        assert!(first.is_public);
        Ok(())
    }

    #[test]
    fn test_create_category_requires_name() -> Result<()> {
        let db = FlameDb::new_in_memory()?;
        let err = db
            .create_category(&new_category("  ", CategoryKind::Apps), true)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlameError>(),
            Some(FlameError::Validation(_))
        ));
        Ok(())
    }

    #[test]
    fn test_create_app_defaults() -> Result<()> {
        let db = FlameDb::new_in_memory()?;
        let media = db.create_category(&new_category("Media", CategoryKind::Apps), true)?;
        let app = db.create_app(
            &NewApp {
                icon: Some("  plex  ".to_string()),
                ..new_app("plex", media.id)
            },
            true,
        )?;
        assert_eq!(app.icon, "plex");
        assert!(app.is_pinned);
        assert_eq!(app.order_id, Some(1));

        let bare = db.create_app(
            &NewApp {
                name: "bare".into(),
                url: "http://bare".into(),
                ..Default::default()
            },
            false,
        )?;
        assert_eq!(bare.icon, "cancel");
        assert_eq!(bare.category_id, UNASSIGNED_CATEGORY_ID);
        assert!(!bare.is_pinned);
        Ok(())
    }

    #[test]
    fn test_app_cannot_join_bookmark_category() -> Result<()> {
        let db = FlameDb::new_in_memory()?;
        let docs = db.create_category(&new_category("Docs", CategoryKind::Bookmarks), true)?;
        let err = db.create_app(&new_app("plex", docs.id), true).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlameError>(),
            Some(FlameError::Validation(_))
        ));
        Ok(())
    }

    #[test]
    fn test_update_app_moves_category() -> Result<()> {
        let db = FlameDb::new_in_memory()?;
        let media = db.create_category(&new_category("Media", CategoryKind::Apps), true)?;
        let tools = db.create_category(&new_category("Tools", CategoryKind::Apps), true)?;
        let app = db.create_app(&new_app("plex", media.id), true)?;

        let updated = db.update_app(
            app.id,
            &AppPatch {
                category_id: Some(tools.id),
                name: Some("Plex".into()),
                ..Default::default()
            },
        )?;
        assert_eq!(updated.category_id, tools.id);
        assert_eq!(updated.name, "Plex");
        assert_eq!(updated.url, app.url);

        let err = db.update_app(999, &AppPatch::default()).unwrap_err();
        assert!(not_found(&err));
        Ok(())
    }

    #[test]
    fn test_delete_category_removes_children() -> Result<()> {
        let db = FlameDb::new_in_memory()?;
        let media = db.create_category(&new_category("Media", CategoryKind::Apps), true)?;
        let other = db.create_category(&new_category("Other", CategoryKind::Apps), true)?;
        db.create_app(&new_app("plex", media.id), true)?;
        db.create_app(&new_app("jellyfin", media.id), true)?;
        let kept = db.create_app(&new_app("gitea", other.id), true)?;

        let deleted = db.delete_category(media.id)?;
        assert_eq!(deleted, DeletedCategory { apps: 2, bookmarks: 0 });
        assert!(db.get_category(media.id)?.is_none());
        let remaining = db.list_apps(OrderingStrategy::CreatedAt, Visibility::ALL)?;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, kept.id);

        assert!(not_found(&db.delete_category(media.id).unwrap_err()));
        Ok(())
    }

    #[test]
    fn test_delete_category_counts_apps_and_bookmarks() -> Result<()> {
        let db = FlameDb::new_in_memory()?;
        let mixed = db.create_category(&new_category("Mixed", CategoryKind::Apps), true)?;
        let other = db.create_category(&new_category("Other", CategoryKind::Bookmarks), true)?;
        db.create_app(&new_app("plex", mixed.id), true)?;
        db.create_app(&new_app("jellyfin", mixed.id), true)?;
        // Rows left behind by a category whose type changed.
        for name in ["a", "b", "c"] {
            db.conn.execute(
                "INSERT INTO bookmarks (name, url, category_id, created_at, updated_at)
                 VALUES (?1, 'https://x.org', ?2, '', '')",
                params![name, mixed.id],
            )?;
        }
        let kept = db.create_bookmark(&new_bookmark("rust", other.id), true)?;

        let deleted = db.delete_category(mixed.id)?;
        assert_eq!(deleted, DeletedCategory { apps: 2, bookmarks: 3 });

        let views = db.list_categories(None, OrderingStrategy::CreatedAt, Visibility::ALL)?;
        assert_eq!(views.len(), 1);
        assert!(db.list_apps(OrderingStrategy::CreatedAt, Visibility::ALL)?.is_empty());
        let bookmarks = db.list_bookmarks(OrderingStrategy::CreatedAt, Visibility::ALL)?;
        assert_eq!(bookmarks.len(), 1);
        assert_eq!(bookmarks[0].id, kept.id);
        Ok(())
    }

    #[test]
    fn test_list_categories_nests_and_filters() -> Result<()> {
        let db = FlameDb::new_in_memory()?;
        let media = db.create_category(&new_category("Media", CategoryKind::Apps), true)?;
        let secret = db.create_category(
            &NewCategory {
                is_public: Some(false),
                ..new_category("Secret", CategoryKind::Apps)
            },
            true,
        )?;
        let docs = db.create_category(&new_category("Docs", CategoryKind::Bookmarks), true)?;
        db.create_app(&new_app("plex", media.id), true)?;
        db.create_app(
            &NewApp {
                is_public: Some(false),
                ..new_app("hidden", media.id)
            },
            true,
        )?;
        db.create_app(&new_app("vault", secret.id), true)?;
        db.create_bookmark(&new_bookmark("rust", docs.id), true)?;

        let all = db.list_categories(None, OrderingStrategy::Name, Visibility::ALL)?;
        let names: Vec<_> = all.iter().map(|c| c.category.name.as_str()).collect();
        assert_eq!(names, vec!["Docs", "Media", "Secret"]);
        assert_eq!(all[1].apps.len(), 2);
        assert_eq!(all[0].bookmarks.len(), 1);

        let public = db.list_categories(None, OrderingStrategy::Name, Visibility::PUBLIC)?;
        assert_eq!(public.len(), 2);
        let media_view = public.iter().find(|c| c.category.id == media.id).unwrap();
        assert_eq!(media_view.apps.len(), 1);
        assert_eq!(media_view.apps[0].name, "plex");

        let apps_only =
            db.list_categories(Some(CategoryKind::Apps), OrderingStrategy::Name, Visibility::ALL)?;
        assert_eq!(apps_only.len(), 2);
        Ok(())
    }

    #[test]
    fn test_reorder_is_atomic() -> Result<()> {
        let db = FlameDb::new_in_memory()?;
        let media = db.create_category(&new_category("Media", CategoryKind::Apps), true)?;
        let a = db.create_app(&new_app("a", media.id), true)?;
        let b = db.create_app(&new_app("b", media.id), true)?;

        db.reorder_apps(&[
            ReorderItem { id: b.id, order_id: 1 },
            ReorderItem { id: a.id, order_id: 2 },
        ])?;
        let ordered = db.list_apps(OrderingStrategy::OrderId, Visibility::ALL)?;
        assert_eq!(ordered[0].id, b.id);

        let err = db
            .reorder_apps(&[
                ReorderItem { id: a.id, order_id: 1 },
                ReorderItem { id: 4242, order_id: 2 },
            ])
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlameError>(),
            Some(FlameError::UnknownReorderIds { ids }) if ids == &vec![4242]
        ));
        assert_eq!(db.get_app(a.id)?.unwrap().order_id, Some(2));
        Ok(())
    }

    #[test]
    fn test_reorder_resubmission_is_idempotent() -> Result<()> {
        let db = FlameDb::new_in_memory()?;
        let docs = db.create_category(&new_category("Docs", CategoryKind::Bookmarks), true)?;
        let x = db.create_bookmark(&new_bookmark("x", docs.id), true)?;
        let y = db.create_bookmark(&new_bookmark("y", docs.id), true)?;
        let items = [
            ReorderItem { id: y.id, order_id: 1 },
            ReorderItem { id: x.id, order_id: 2 },
        ];
        db.reorder_bookmarks(&items)?;
        let first = db.list_bookmarks(OrderingStrategy::OrderId, Visibility::ALL)?;
        db.reorder_bookmarks(&items)?;
        let second = db.list_bookmarks(OrderingStrategy::OrderId, Visibility::ALL)?;
        let ids = |list: &[Bookmark]| list.iter().map(|b| (b.id, b.order_id)).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
        Ok(())
    }

    #[test]
    fn test_unpin_all_apps_keeps_rows() -> Result<()> {
        let db = FlameDb::new_in_memory()?;
        db.create_app(&new_app("a", UNASSIGNED_CATEGORY_ID), true)?;
        db.create_app(&new_app("b", UNASSIGNED_CATEGORY_ID), true)?;
        assert_eq!(db.unpin_all_apps()?, 2);
        let apps = db.list_apps(OrderingStrategy::CreatedAt, Visibility::ALL)?;
        assert_eq!(apps.len(), 2);
        assert!(apps.iter().all(|a| !a.is_pinned));
        Ok(())
    }

    #[test]
    fn test_settings_seed_and_partial_update() -> Result<()> {
        let db = FlameDb::new_in_memory()?;
        assert!(db.seed_default_settings()? > 0);
        assert_eq!(db.seed_default_settings()?, 0);

        let mut patch = Map::new();
        patch.insert("useOrdering".into(), json!("orderId"));
        let settings = db.update_settings(&patch)?;
        assert_eq!(settings.use_ordering, OrderingStrategy::OrderId);
        assert!(settings.pin_apps_by_default);

        patch.insert("dockerApps".into(), json!("maybe"));
        assert!(db.update_settings(&patch).is_err());
        assert!(!db.load_settings()?.docker_apps);
        Ok(())
    }

    #[test]
    fn test_custom_query_crud() -> Result<()> {
        let db = FlameDb::new_in_memory()?;
        let query = SearchQuery {
            name: "Crates".into(),
            prefix: "cr".into(),
            template: "https://crates.io/search?q=".into(),
        };
        db.create_query(&query)?;
        assert!(db.create_query(&query).is_err());

        let renamed = SearchQuery {
            name: "Crates.io".into(),
            ..query.clone()
        };
        db.update_query("cr", &renamed)?;
        assert_eq!(db.list_queries()?, vec![renamed]);

        db.delete_query("cr")?;
        assert!(not_found(&db.delete_query("cr").unwrap_err()));
        Ok(())
    }

    #[test]
    fn test_transaction_rolls_back_on_error() -> Result<()> {
        let db = FlameDb::new_in_memory()?;
        let result: Result<()> = db.transaction(|db| {
            db.create_app(&new_app("temp", UNASSIGNED_CATEGORY_ID), true)?;
            anyhow::bail!("boom")
        });
        assert!(result.is_err());
        assert!(db.find_app_by_name("temp")?.is_none());
        Ok(())
    }
}
