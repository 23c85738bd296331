use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use common::storage::types::token::{Token, TokenFilter};
use serde::Deserialize;

use super::fetch_page;
use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Default, Deserialize)]
pub struct TokenListParams {
    pub text: Option<String>,
    pub pos: Option<String>,
    pub after: Option<i64>,
    pub limit: Option<usize>,
}

pub async fn list_tokens(
    State(state): State<ApiState>,
    Query(params): Query<TokenListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = TokenFilter {
        text: params.text,
        pos: params.pos,
    };
    let page = fetch_page(Token::query(&filter), params.after, params.limit, &state).await?;

    Ok(Json(page))
}
