//! # planwise-core
//!
//! Core library for planwise - a client for a personal productivity backend
//! (tasks, goals, projects, routines, alarms and countdown timers).
//!
//! This library provides:
//! - Domain types and their wire shapes
//! - An authenticated API gateway with one-shot token refresh
//! - Client-side stores with filtering, sorting and optimistic updates
//! - A local countdown engine that persists and syncs in the background
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Requests flow through three layers:
//! - **Transport:** one HTTP request, outcome mapped onto [`Error`]
//! - **Gateway:** bearer token injection and refresh-and-retry on a 401
//! - **Stores:** per-entity state that UIs read and mutate
//!
//! ## Example
//!
//! ```rust,no_run
//! use planwise_core::{AppContext, Config};
//!
//! # async fn run() -> planwise_core::Result<()> {
//! let config = Config::load()?;
//! let app = AppContext::from_config(config)?;
//!
//! let session = app.initialize().await;
//! if session.is_authenticated {
//!     app.tasks().fetch_all(1, app.page_size()).await?;
//!     for task in app.tasks().view() {
//!         println!("{} [{}]", task.title, task.status);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use app::AppContext;
pub use auth::{CredentialStore, Credentials, Registration, Session};
pub use config::Config;
pub use dashboard::DashboardSummary;
pub use error::{Error, ErrorKind, Result, StoreError};
pub use types::*;

// Public modules
pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod logging;
pub mod storage;
pub mod stores;
pub mod types;
