//! TaskService — CRUD over the `tasks` table in SQLite.

use crate::models::task::{STATUS_COMPLETED, STATUS_PENDING, Task, TaskInput};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

const MIGRATION_SQL: &str = include_str!("../../migrations/0001_init.sql");

const TASK_COLUMNS: &str = "id, title, description, status, created_at, updated_at";

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task not found with id: {0}")]
    NotFound(i64),
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type TaskResult<T> = Result<T, TaskError>;

/// Run the embedded schema statements. Safe to repeat.
pub async fn run_migrations(db: &SqlitePool) -> TaskResult<()> {
    let statements = MIGRATION_SQL
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct TaskService {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl TaskService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    fn validate(input: &TaskInput) -> TaskResult<()> {
        if input.title.trim().is_empty() {
            return Err(TaskError::Invalid("Title is required".into()));
        }
        if matches!(input.status.as_deref(), Some(status) if status.trim().is_empty()) {
            return Err(TaskError::Invalid("Status cannot be blank".into()));
        }
        Ok(())
    }

    pub async fn list(&self) -> TaskResult<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM tasks ORDER BY id ASC",
            TASK_COLUMNS
        ))
        .fetch_all(&*self.db)
        .await?;
        Ok(tasks)
    }

    pub async fn get(&self, id: i64) -> TaskResult<Task> {
        sqlx::query_as::<_, Task>(&format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS))
            .bind(id)
            .fetch_optional(&*self.db)
            .await?
            .ok_or(TaskError::NotFound(id))
    }

    pub async fn create(&self, input: TaskInput) -> TaskResult<Task> {
        Self::validate(&input)?;
        let now = Utc::now();
        let task = sqlx::query_as::<_, Task>(&format!(
            "INSERT INTO tasks (title, description, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(input.title.trim())
        .bind(input.description)
        .bind(input.status.as_deref().unwrap_or(STATUS_PENDING))
        .bind(now)
        .bind(now)
        .fetch_one(&*self.db)
        .await?;
        debug!("created task {}", task.id);
        Ok(task)
    }

    /// Replace title, description and status of an existing task.
    pub async fn update(&self, id: i64, input: TaskInput) -> TaskResult<Task> {
        Self::validate(&input)?;
        let current = self.get(id).await?;
        let status = input.status.unwrap_or(current.status);
        sqlx::query_as::<_, Task>(&format!(
            "UPDATE tasks SET title = ?, description = ?, status = ?, updated_at = ?
             WHERE id = ?
             RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(input.title.trim())
        .bind(input.description)
        .bind(status)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(TaskError::NotFound(id))
    }

    pub async fn delete(&self, id: i64) -> TaskResult<()> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(TaskError::NotFound(id));
        }
        debug!("deleted task {}", id);
        Ok(())
    }

    pub async fn mark_completed(&self, id: i64) -> TaskResult<Task> {
        sqlx::query_as::<_, Task>(&format!(
            "UPDATE tasks SET status = ?, updated_at = ? WHERE id = ? RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(STATUS_COMPLETED)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(TaskError::NotFound(id))
    }
}
