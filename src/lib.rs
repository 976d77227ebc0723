//! Chapter boundary resolution and split orchestration for paginated documents.
//!
//! - **`services::detector`**: candidate chapters from outline bookmarks, heading patterns,
//!   or an even split.
//! - **`services::validator`**: chapter-set invariants and repair after resize/insert/remove.
//! - **`services::orchestrator`**: asynchronous split tasks and the shared task registry.
//! - **`services::evidence`** / **`services::splitter`**: collaborator seams for text
//!   extraction and page-range output.
//! - **`api`**: the HTTP layer served by the binary.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use error::{Result, SplitError};
