//! Data models for the image and task APIs.
//!
//! Tasks map to the `tasks` table via `sqlx::FromRow`; upload types are plain
//! request/response shapes that serialize as JSON via `serde`.

pub mod task;
pub mod upload;
