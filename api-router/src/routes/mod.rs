pub mod books;
pub mod dependencies;
pub mod liveness;
pub mod readiness;
pub mod search;
pub mod sentences;
pub mod tokens;

use common::storage::{cursor::RowQuery, types::CorpusRecord};
use serde::Serialize;

use crate::{api_state::ApiState, error::ApiError};

/// A record together with its key, which the stored form keeps in the record id.
#[derive(Debug, Serialize)]
pub struct Row<T> {
    pub id: i64,
    #[serde(flatten)]
    pub record: T,
}

impl<T: CorpusRecord> From<T> for Row<T> {
    fn from(record: T) -> Self {
        Self {
            id: record.record_key(),
            record,
        }
    }
}

/// One keyset page of a listing. Pass `next_after` back as `after` to continue.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<Row<T>>,
    pub next_after: Option<i64>,
}

/// Splits a comma-separated query value, dropping blank entries.
pub(crate) fn comma_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) async fn fetch_page<T: CorpusRecord>(
    query: RowQuery<T>,
    after: Option<i64>,
    limit: Option<usize>,
    state: &ApiState,
) -> Result<Page<T>, ApiError> {
    let max = state.config.query_page_size.max(1);
    let limit = limit.unwrap_or(max).clamp(1, max);

    let rows = query.fetch_after(after, limit, &state.db).await?;
    let next_after = if rows.len() == limit {
        rows.last().map(CorpusRecord::record_key)
    } else {
        None
    };

    Ok(Page {
        items: rows.into_iter().map(Row::from).collect(),
        next_after,
    })
}
