use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use common::storage::{
    ingest::{ingest_sentence, SentenceDraft},
    types::{
        book::{Book, BookFilter, BookTags},
        dependency::Dependency,
        sentence::Sentence,
        token::Token,
    },
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{comma_list, fetch_page, Row};
use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct CreateBookRequest {
    pub name: String,
    pub category: Option<String>,
    pub period: Option<String>,
    pub style: Option<String>,
}

pub async fn create_book(
    State(state): State<ApiState>,
    Json(input): Json<CreateBookRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tags = BookTags {
        category: input.category,
        period: input.period,
        style: input.style,
    };
    let book = Book::create(&input.name, tags, &state.db).await?;

    Ok((StatusCode::CREATED, Json(Row::from(book))))
}

/// Comma-separated lists; a book matches when each given list contains its value.
#[derive(Debug, Default, Deserialize)]
pub struct BookListParams {
    pub name: Option<String>,
    pub category: Option<String>,
    pub period: Option<String>,
    pub style: Option<String>,
    pub after: Option<i64>,
    pub limit: Option<usize>,
}

impl BookListParams {
    pub(crate) fn filter(&self) -> BookFilter {
        BookFilter {
            names: comma_list(self.name.as_deref()),
            categories: comma_list(self.category.as_deref()),
            periods: comma_list(self.period.as_deref()),
            styles: comma_list(self.style.as_deref()),
        }
    }
}

pub async fn list_books(
    State(state): State<ApiState>,
    Query(params): Query<BookListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = Book::query(&params.filter());
    let page = fetch_page(query, params.after, params.limit, &state).await?;

    Ok(Json(page))
}

pub async fn get_book(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let book = Book::require(id, &state.db).await?;

    Ok(Json(Row::from(book)))
}

pub async fn delete_book(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    Book::delete_cascade(id, &state.db).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct IngestedSentenceResponse {
    pub sentence: Row<Sentence>,
    pub tokens: Vec<Row<Token>>,
    pub dependencies: Vec<Row<Dependency>>,
}

pub async fn ingest_book_sentence(
    State(state): State<ApiState>,
    Path(book_id): Path<i64>,
    Json(draft): Json<SentenceDraft>,
) -> Result<impl IntoResponse, ApiError> {
    info!(
        book_id,
        content_chars = draft.content.chars().count(),
        token_count = draft.tokens.len(),
        "Received sentence ingestion request"
    );

    let ingested = ingest_sentence(book_id, &draft, &state.db).await?;
    let response = IngestedSentenceResponse {
        sentence: Row::from(ingested.sentence),
        tokens: ingested.tokens.into_iter().map(Row::from).collect(),
        dependencies: ingested.dependencies.into_iter().map(Row::from).collect(),
    };

    Ok((StatusCode::CREATED, Json(response)))
}
