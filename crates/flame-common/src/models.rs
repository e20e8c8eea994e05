use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Category id carried by entries that belong to no category.
pub const UNASSIGNED_CATEGORY_ID: i64 = -1;
/// Synthetic category that collects Docker-discovered apps without a category label.
pub const DOCKER_CATEGORY_ID: i64 = -2;
/// Synthetic category that collects Kubernetes-discovered apps without a category label.
pub const KUBERNETES_CATEGORY_ID: i64 = -3;
/// Order given to categories created from integration labels so they sort last.
pub const NEW_CATEGORY_ORDER: i64 = 9_007_199_254_740_991;
/// Order given to discovered apps without an order label.
pub const DEFAULT_INTEGRATION_ORDER: i64 = 500;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    Apps,
    Bookmarks,
}

impl CategoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apps => "apps",
            Self::Bookmarks => "bookmarks",
        }
    }
}

impl FromStr for CategoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apps" => Ok(Self::Apps),
            "bookmarks" => Ok(Self::Bookmarks),
            _ => Err(format!("Invalid category type: {}", s)),
        }
    }
}

impl std::fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort key used for categories and their entries.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum OrderingStrategy {
    Name,
    #[default]
    CreatedAt,
    OrderId,
}

impl OrderingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::CreatedAt => "createdAt",
            Self::OrderId => "orderId",
        }
    }

    /// Only the manual strategy accepts drag-and-drop reordering.
    pub fn allows_manual_order(&self) -> bool {
        matches!(self, Self::OrderId)
    }
}

impl FromStr for OrderingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(Self::Name),
            "createdAt" => Ok(Self::CreatedAt),
            "orderId" => Ok(Self::OrderId),
            _ => Err(format!("Invalid ordering: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CategoryKind,
    pub is_pinned: bool,
    pub is_public: bool,
    pub order_id: Option<i64>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Category {
    /// In-memory default for the Docker and Kubernetes categories.
    /// Returns `None` for any other id.
    pub fn synthetic(id: i64) -> Option<Self> {
        let (name, order_id) = match id {
            DOCKER_CATEGORY_ID => ("Docker", 998),
            KUBERNETES_CATEGORY_ID => ("Kubernetes", 999),
            _ => return None,
        };
        Some(Self {
            id,
            name: name.to_string(),
            kind: CategoryKind::Apps,
            is_pinned: true,
            is_public: true,
            order_id: Some(order_id),
            created_at: String::new(),
            updated_at: String::new(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct App {
    pub id: i64,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    pub category_id: i64,
    pub icon: String,
    pub is_pinned: bool,
    pub is_public: bool,
    pub order_id: Option<i64>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub category_id: i64,
    pub icon: String,
    pub is_pinned: bool,
    pub is_public: bool,
    pub order_id: Option<i64>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// A category together with its children, as returned by the categories API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryView {
    #[serde(flatten)]
    pub category: Category,
    #[serde(default)]
    pub apps: Vec<App>,
    #[serde(default)]
    pub bookmarks: Vec<Bookmark>,
}

impl CategoryView {
    pub fn empty(category: Category) -> Self {
        Self {
            category,
            apps: Vec::new(),
            bookmarks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReorderItem {
    pub id: i64,
    pub order_id: i64,
}

/// Search provider: built-in or user-defined.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchQuery {
    pub name: String,
    pub prefix: String,
    pub template: String,
}

// ── Request payloads ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Option<CategoryKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_pinned: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_pinned: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewApp {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_pinned: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBookmark {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_pinned: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
}
