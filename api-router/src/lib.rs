use api_state::ApiState;
use axum::{
    extract::FromRef,
    routing::{get, post},
    Router,
};
use routes::{
    books::{create_book, delete_book, get_book, ingest_book_sentence, list_books},
    dependencies::list_dependencies,
    liveness::live,
    readiness::ready,
    search::search,
    sentences::{list_sentence_tokens, list_sentences},
    tokens::list_tokens,
};

pub mod api_state;
pub mod error;
mod routes;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Health checks (for k8s/systemd)
    let health = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live));

    let corpus = Router::new()
        .route("/search", get(search))
        .route("/books", post(create_book).get(list_books))
        .route("/books/{id}", get(get_book).delete(delete_book))
        .route("/books/{id}/sentences", post(ingest_book_sentence))
        .route("/sentences", get(list_sentences))
        .route("/sentences/{id}/tokens", get(list_sentence_tokens))
        .route("/tokens", get(list_tokens))
        .route("/dependencies", get(list_dependencies));

    health.merge(corpus)
}
