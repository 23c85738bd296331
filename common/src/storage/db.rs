use crate::error::{is_commit_conflict, AppError};

use super::indexes::ensure_schema;
use serde::Deserialize;
use std::{
    future::Future,
    ops::{Deref, Range},
    time::Duration,
};
use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Response, Surreal,
};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};
use tracing::debug;

/// Table holding one counter record per entity table.
const SEQUENCE_TABLE: &str = "sequence";

/// Re-runs granted to a write aborted by a concurrent transaction.
const WRITE_RETRIES: usize = 20;

#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

#[derive(Deserialize)]
struct SequenceRow {
    counter: i64,
}

impl SurrealDbClient {
    /// # Initialize a new database client
    ///
    /// # Arguments
    /// * `address` - Any engine address understood by `surrealdb::engine::any`
    ///
    /// # Returns
    /// * `SurrealDbClient` initialized
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;

        // Sign in to database
        db.signin(Root { username, password }).await?;

        // Set namespace
        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }

    /// Defines tables and indexes. Idempotent.
    pub async fn ensure_initialized(&self) -> Result<(), AppError> {
        ensure_schema(self).await
    }

    /// Reserves `count` consecutive identifiers for `table`.
    ///
    /// The counter is bumped in a single statement, so concurrent writers never
    /// receive overlapping ranges. A writer that loses the race on the counter
    /// fails with a retryable error; see [`SurrealDbClient::retry_on_conflict`].
    /// Identifiers of a failed write are not reused.
    pub async fn allocate_ids(&self, table: &'static str, count: usize) -> Result<Range<i64>, AppError> {
        let count = i64::try_from(count)
            .map_err(|_| AppError::Validation(format!("cannot allocate {count} ids")))?;
        if count == 0 {
            return Ok(0..0);
        }

        let rows: Vec<SequenceRow> = self
            .client
            .query("UPSERT type::thing($sequence, $table) SET counter += $count RETURN AFTER")
            .bind(("sequence", SEQUENCE_TABLE))
            .bind(("table", table))
            .bind(("count", count))
            .await?
            .take(0)?;

        let end = rows
            .into_iter()
            .next()
            .map(|row| row.counter)
            .ok_or_else(|| AppError::InternalError(format!("sequence for {table} returned nothing")))?;

        debug!(table, count, last_id = end, "Allocated identifiers");

        Ok(end.saturating_sub(count).saturating_add(1)..end.saturating_add(1))
    }

    /// Surfaces statement errors from a write, mapping unique index violations to
    /// [`AppError::Conflict`].
    ///
    /// Inside a failed transaction every statement reports an error, most of them
    /// the generic "not executed" one, so the most specific error wins.
    pub fn check_write(mut response: Response, action: &str) -> Result<Response, AppError> {
        let mut errors: Vec<(usize, Error)> = response.take_errors().into_iter().collect();
        if errors.is_empty() {
            return Ok(response);
        }
        errors.sort_by_key(|(index, _)| *index);

        if let Some((_, err)) = errors.iter().find(|(_, err)| is_unique_violation(err)) {
            return Err(AppError::Conflict(format!("{action}: {err}")));
        }
        if let Some(position) = errors
            .iter()
            .position(|(_, err)| is_commit_conflict(&err.to_string()))
        {
            let (_, err) = errors.swap_remove(position);
            return Err(AppError::Database(err));
        }

        let position = errors
            .iter()
            .position(|(_, err)| !is_cancelled_statement(err))
            .unwrap_or(0);
        let (_, err) = errors.swap_remove(position);
        Err(AppError::Database(err))
    }
}

impl SurrealDbClient {
    /// Runs a write, re-running it with jittered backoff while it fails with a
    /// commit conflict.
    ///
    /// Every write path re-checks its preconditions on each attempt, so the
    /// loser of a race on a unique value ends in [`AppError::Conflict`].
    pub async fn retry_on_conflict<T, F, Fut>(action: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let retry_strategy = ExponentialBackoff::from_millis(2)
            .factor(5)
            .max_delay(Duration::from_millis(200))
            .map(jitter)
            .take(WRITE_RETRIES);

        RetryIf::spawn(retry_strategy, action, |err: &AppError| {
            let retry = err.is_retryable();
            if retry {
                debug!(error = %err, "Write lost a commit race, retrying");
            }
            retry
        })
        .await
    }
}

fn is_unique_violation(err: &Error) -> bool {
    err.to_string().contains("already contains")
}

fn is_cancelled_statement(err: &Error) -> bool {
    let message = err.to_string();
    message.contains("not executed") || message.contains("cancelled transaction")
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Create an in-memory SurrealDB client for testing.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }
}
