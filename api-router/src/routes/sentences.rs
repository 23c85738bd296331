use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use common::storage::types::{
    book::BookFilter,
    sentence::{Sentence, SentenceFilter},
    token::Token,
};
use serde::Deserialize;

use super::{comma_list, fetch_page, Row};
use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Default, Deserialize)]
pub struct SentenceListParams {
    pub book_id: Option<i64>,
    /// Book names, comma-separated
    pub book: Option<String>,
    pub category: Option<String>,
    pub period: Option<String>,
    pub style: Option<String>,
    pub after: Option<i64>,
    pub limit: Option<usize>,
}

pub async fn list_sentences(
    State(state): State<ApiState>,
    Query(params): Query<SentenceListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = SentenceFilter {
        book_id: params.book_id,
        books: BookFilter {
            names: comma_list(params.book.as_deref()),
            categories: comma_list(params.category.as_deref()),
            periods: comma_list(params.period.as_deref()),
            styles: comma_list(params.style.as_deref()),
        },
    };
    let query = Sentence::query(&filter, &state.db).await?;
    let page = fetch_page(query, params.after, params.limit, &state).await?;

    Ok(Json(page))
}

pub async fn list_sentence_tokens(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    Sentence::require(id, &state.db).await?;
    let tokens: Vec<Row<Token>> = Token::list_by_sentence(id, &state.db)
        .await?
        .into_iter()
        .map(Row::from)
        .collect();

    Ok(Json(tokens))
}
