//! Represents a task record managed through `/api/tasks`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_COMPLETED: &str = "completed";

/// A stored task.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, ToSchema)]
pub struct Task {
    /// Database-generated identifier.
    pub id: i64,

    /// Short summary; never blank.
    pub title: String,

    pub description: Option<String>,

    /// Free-form status, `pending` until completed.
    pub status: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Body accepted by create and update.
#[derive(Deserialize, Clone, Debug, Default, ToSchema)]
pub struct TaskInput {
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    pub status: Option<String>,
}
