use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use common::{
    search::collocation::{search_collocations_paged, CollocationQuery},
    storage::types::book::BookFilter,
};
use serde::Deserialize;
use tracing::info;

use super::comma_list;
use crate::{api_state::ApiState, error::ApiError};

/// Query string of `/search`. List-valued parameters are comma-separated and
/// OR-ed; the `book_*` parameters only restrict the example sentences.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub head_text: Option<String>,
    pub head_pos: Option<String>,
    pub dpdt_text: Option<String>,
    pub dpdt_pos: Option<String>,
    pub dep_type: Option<String>,
    pub freq_inf: Option<usize>,
    pub freq_sup: Option<usize>,
    pub results_limit: Option<usize>,
    pub results_offset: Option<usize>,
    pub examples_limit: Option<usize>,
    pub examples_offset: Option<usize>,
    pub book_names: Option<String>,
    pub book_categories: Option<String>,
    pub book_periods: Option<String>,
    pub book_styles: Option<String>,
}

impl From<SearchParams> for CollocationQuery {
    fn from(params: SearchParams) -> Self {
        let defaults = CollocationQuery::default();
        Self {
            head_pos: comma_list(params.head_pos.as_deref()),
            dependent_pos: comma_list(params.dpdt_pos.as_deref()),
            dependency_types: comma_list(params.dep_type.as_deref()),
            books: BookFilter {
                names: comma_list(params.book_names.as_deref()),
                categories: comma_list(params.book_categories.as_deref()),
                periods: comma_list(params.book_periods.as_deref()),
                styles: comma_list(params.book_styles.as_deref()),
            },
            head_text: params.head_text,
            dependent_text: params.dpdt_text,
            min_frequency: params.freq_inf.unwrap_or(defaults.min_frequency),
            max_frequency: params.freq_sup,
            results_limit: params.results_limit.unwrap_or(defaults.results_limit),
            results_offset: params.results_offset.unwrap_or(defaults.results_offset),
            examples_limit: params.examples_limit.unwrap_or(defaults.examples_limit),
            examples_offset: params.examples_offset.unwrap_or(defaults.examples_offset),
        }
    }
}

pub async fn search(
    State(state): State<ApiState>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = CollocationQuery::from(params);
    let page = search_collocations_paged(&query, state.config.query_page_size, &state.db).await?;

    info!(
        head_text = ?query.head_text,
        dependent_text = ?query.dependent_text,
        total = page.total_collocations_count,
        returned = page.results.len(),
        "Collocation search served"
    );

    Ok(Json(page))
}
