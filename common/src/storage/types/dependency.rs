use std::collections::HashMap;

use crate::{
    corpus_record,
    error::AppError,
    storage::{cursor::RowQuery, db::SurrealDbClient, types::token::Token},
};
use tracing::info;

corpus_record!(Dependency, "dependency", {
    head_id: i64,
    dependent_id: i64,
    dependency_type: String,
    sentence_id: i64,
    book_id: i64,
    /// Copies of the endpoint tokens' text and tags. Tokens never change, so
    /// these stay accurate and collocation search needs no joins.
    head_text: String,
    head_pos: Option<String>,
    dependent_text: String,
    dependent_pos: Option<String>
});

/// Edge criteria: relation types (any of), head and dependent. Unset fields
/// match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyFilter {
    pub head_id: Option<i64>,
    pub dependent_id: Option<i64>,
    #[serde(default)]
    pub types: Vec<String>,
}

/// Whether adding `head -> dependent` to a forest described by `heads`
/// (dependent -> head) would close a cycle. A self-loop is the root marker and
/// never counts.
pub fn closes_cycle(heads: &HashMap<i64, i64>, head: i64, dependent: i64) -> bool {
    if head == dependent {
        return false;
    }

    let mut current = head;
    // Each step visits a distinct node unless a cycle already exists, so the
    // walk is bounded by the number of edges.
    for _ in 0..=heads.len() {
        if current == dependent {
            return true;
        }
        match heads.get(&current) {
            Some(&next) if next != current => current = next,
            _ => return false,
        }
    }
    true
}

impl Dependency {
    pub(crate) fn new(
        id: i64,
        head: &Token,
        dependent: &Token,
        dependency_type: &str,
    ) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            head_id: head.id,
            dependent_id: dependent.id,
            dependency_type: dependency_type.to_owned(),
            sentence_id: dependent.sentence_id,
            book_id: dependent.book_id,
            head_text: head.text.clone(),
            head_pos: head.pos.clone(),
            dependent_text: dependent.text.clone(),
            dependent_pos: dependent.pos.clone(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.head_id == self.dependent_id
    }

    /// Records `head -> dependent`. Pass the same token twice to mark a root.
    pub async fn create(
        head_id: i64,
        dependent_id: i64,
        dependency_type: &str,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        SurrealDbClient::retry_on_conflict(|| {
            Self::try_create(head_id, dependent_id, dependency_type, db)
        })
        .await
    }

    async fn try_create(
        head_id: i64,
        dependent_id: i64,
        dependency_type: &str,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        AppError::require_text("dependency type", dependency_type)?;

        let head = Token::require(head_id, db).await?;
        let dependent = Token::require(dependent_id, db).await?;

        if head.sentence_id != dependent.sentence_id {
            return Err(AppError::Validation(format!(
                "tokens {head_id} and {dependent_id} belong to different sentences"
            )));
        }

        if let Some(existing) = Self::get_by_dependent(dependent_id, db).await? {
            return Err(AppError::Conflict(format!(
                "token {dependent_id} already has head {}",
                existing.head_id
            )));
        }

        let heads: HashMap<i64, i64> = Self::list_by_sentence(dependent.sentence_id, db)
            .await?
            .into_iter()
            .map(|edge| (edge.dependent_id, edge.head_id))
            .collect();
        if closes_cycle(&heads, head_id, dependent_id) {
            return Err(AppError::Validation(format!(
                "edge {head_id} -> {dependent_id} would create a cycle"
            )));
        }

        let ids = db.allocate_ids(Self::table_name(), 1).await?;
        let dependency = Self::new(ids.start, &head, &dependent, dependency_type);

        let response = db
            .client
            .query("CREATE type::thing($table, $id) CONTENT $row RETURN NONE")
            .bind(("table", Self::table_name()))
            .bind(("id", dependency.id))
            .bind(("row", dependency.clone()))
            .await?;
        SurrealDbClient::check_write(response, "create dependency")?;

        info!(
            dependency_id = dependency.id,
            head_id,
            dependent_id,
            dependency_type,
            "Dependency created"
        );

        Ok(dependency)
    }

    pub async fn get(id: i64, db: &SurrealDbClient) -> Result<Option<Self>, AppError> {
        let dependency: Option<Self> = db
            .client
            .query("SELECT * FROM type::thing($table, $id)")
            .bind(("table", Self::table_name()))
            .bind(("id", id))
            .await?
            .take(0)?;

        Ok(dependency)
    }

    /// The edge naming `dependent_id` as its dependent. There is at most one.
    pub async fn get_by_dependent(
        dependent_id: i64,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let edges: Vec<Self> = db
            .client
            .query("SELECT * FROM type::table($table) WHERE dependent_id = $dependent_id LIMIT 1")
            .bind(("table", Self::table_name()))
            .bind(("dependent_id", dependent_id))
            .await?
            .take(0)?;

        Ok(edges.into_iter().next())
    }

    pub async fn list_by_sentence(
        sentence_id: i64,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let edges: Vec<Self> = db
            .client
            .query("SELECT * FROM type::table($table) WHERE sentence_id = $sentence_id ORDER BY id ASC")
            .bind(("table", Self::table_name()))
            .bind(("sentence_id", sentence_id))
            .await?
            .take(0)?;

        Ok(edges)
    }

    /// Edges matching `filter`, in id order.
    pub fn query(filter: &DependencyFilter) -> RowQuery<Self> {
        let mut query = RowQuery::new();
        if let Some(head_id) = filter.head_id {
            query = query.filter("head_id = $head_id").bind("head_id", head_id);
        }
        if let Some(dependent_id) = filter.dependent_id {
            query = query
                .filter("dependent_id = $dependent_id")
                .bind("dependent_id", dependent_id);
        }
        if !filter.types.is_empty() {
            query = query
                .filter("dependency_type IN $types")
                .bind("types", filter.types.clone());
        }
        query
    }
}
