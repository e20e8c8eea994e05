//! Flame REST server.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  http.rs  (Router, static frontend, start_server)│
//! │          │ <─────── │    └─ api.rs   (route handlers, AppState)        │
//! └──────────┘          │         ├─ auth.rs  (Caller, bearer token)       │
//!                       │         │                                        │
//!                       │         │ IntegrationSync::refresh()             │
//!                       │         v                                        │
//!                       │  integrations/  (Docker, Kubernetes upsert)      │
//!                       │         │                                        │
//!                       │         v                                        │
//!                       │  db.rs   (FlameDb, DbHandle, SQLite)             │
//!                       └──────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod auth;
pub mod db;
pub mod http;

pub use http::{build_router, build_state, serve, start_server};
