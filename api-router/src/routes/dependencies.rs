use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use common::storage::types::dependency::{Dependency, DependencyFilter};
use serde::Deserialize;

use super::{comma_list, fetch_page};
use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Default, Deserialize)]
pub struct DependencyListParams {
    /// Relation types, comma-separated
    #[serde(rename = "type")]
    pub dependency_type: Option<String>,
    pub head: Option<i64>,
    pub dependent: Option<i64>,
    pub after: Option<i64>,
    pub limit: Option<usize>,
}

pub async fn list_dependencies(
    State(state): State<ApiState>,
    Query(params): Query<DependencyListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = DependencyFilter {
        head_id: params.head,
        dependent_id: params.dependent,
        types: comma_list(params.dependency_type.as_deref()),
    };
    let page = fetch_page(Dependency::query(&filter), params.after, params.limit, &state).await?;

    Ok(Json(page))
}
