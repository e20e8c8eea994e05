//! Shared domain types for Flame.
//!
//! Used by both the server and the HTTP client:
//!
//! | Module     | Contents                                                    |
//! |------------|-------------------------------------------------------------|
//! | `models`   | Category, App, Bookmark, request payloads, sentinel ids     |
//! | `ordering` | Sort strategies and reorder position computation            |
//! | `store`    | Categorized client state with structural sharing            |
//! | `search`   | Search bar prefix parsing and redirect resolution           |

pub mod models;
pub mod ordering;
pub mod search;
pub mod store;

pub use models::*;
pub use store::{CategoryNode, CategoryStore, Entry};
