use std::marker::PhantomData;

use futures::{
    stream::{self, Stream},
    TryStreamExt,
};
use serde_json::Value;
use tracing::debug;

use crate::{
    error::AppError,
    storage::{db::SurrealDbClient, types::CorpusRecord},
};

/// Rows fetched per round-trip unless a query overrides it.
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// A filtered read over one corpus table, ordered by primary key.
///
/// Nothing is fetched until the query is consumed. Consumption walks the table
/// in keyset pages (`id > last seen id`), so a stream can be dropped halfway
/// without cost and the same query can be replayed from the start at any time.
#[derive(Debug, Clone)]
pub struct RowQuery<T> {
    conditions: Vec<String>,
    bindings: Vec<(String, Value)>,
    page_size: usize,
    _row: PhantomData<fn() -> T>,
}

impl<T> Default for RowQuery<T>
where
    T: CorpusRecord,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RowQuery<T>
where
    T: CorpusRecord,
{
    pub fn new() -> Self {
        Self {
            conditions: Vec::new(),
            bindings: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
            _row: PhantomData,
        }
    }

    /// Adds a `WHERE` condition; conditions are AND-ed. Values must be passed
    /// through [`RowQuery::bind`], never spliced into the condition text.
    #[must_use]
    pub fn filter(mut self, condition: impl Into<String>) -> Self {
        self.conditions.push(condition.into());
        self
    }

    #[must_use]
    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.bindings.push((name.to_owned(), value.into()));
        self
    }

    #[must_use]
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn current_page_size(&self) -> usize {
        self.page_size
    }

    fn statement(&self, after: Option<i64>, limit: usize) -> String {
        let table = T::table_name();
        let mut conditions = self.conditions.clone();
        if after.is_some() {
            conditions.push(format!("id > type::thing('{table}', $after)"));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        format!("SELECT * FROM {table}{where_clause} ORDER BY id ASC LIMIT {limit}")
    }

    /// Fetches up to `limit` rows whose id is greater than `after`.
    pub async fn fetch_after(
        &self,
        after: Option<i64>,
        limit: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<T>, AppError> {
        let statement = self.statement(after, limit.max(1));
        debug!(%statement, ?after, "Fetching page");

        let mut query = db.client.query(statement);
        for (name, value) in &self.bindings {
            query = query.bind((name.clone(), value.clone()));
        }
        if let Some(after) = after {
            query = query.bind(("after", after));
        }

        let rows: Vec<T> = query.await?.take(0)?;
        Ok(rows)
    }

    /// Fetches one page of the configured size.
    pub async fn fetch_page(
        &self,
        after: Option<i64>,
        db: &SurrealDbClient,
    ) -> Result<Vec<T>, AppError> {
        self.fetch_after(after, self.page_size, db).await
    }

    /// Lazily yields every matching row, one page per round-trip.
    pub fn stream<'a>(
        &'a self,
        db: &'a SurrealDbClient,
    ) -> impl Stream<Item = Result<T, AppError>> + 'a {
        stream::try_unfold(Some(None), move |cursor: Option<Option<i64>>| async move {
            let Some(after) = cursor else {
                return Ok::<_, AppError>(None);
            };

            let page = self.fetch_page(after, db).await?;
            let next = if page.len() < self.page_size {
                None
            } else {
                page.last().map(|row| Some(row.record_key()))
            };

            Ok(Some((
                stream::iter(page.into_iter().map(Ok::<T, AppError>)),
                next,
            )))
        })
        .try_flatten()
    }

    pub async fn collect(&self, db: &SurrealDbClient) -> Result<Vec<T>, AppError> {
        self.stream(db).try_collect().await
    }
}
