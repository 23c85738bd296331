use anyhow::{Context, Result};
use tracing::info;

use crate::{error::AppError, storage::db::SurrealDbClient};

const TABLES: [&str; 5] = ["book", "sentence", "token", "dependency", "sequence"];

#[derive(Clone, Copy)]
struct IndexSpec {
    index_name: &'static str,
    table: &'static str,
    fields: &'static str,
    unique: bool,
}

impl IndexSpec {
    const fn plain(index_name: &'static str, table: &'static str, fields: &'static str) -> Self {
        Self {
            index_name,
            table,
            fields,
            unique: false,
        }
    }

    const fn unique(index_name: &'static str, table: &'static str, fields: &'static str) -> Self {
        Self {
            index_name,
            table,
            fields,
            unique: true,
        }
    }

    fn definition(&self) -> String {
        let unique_clause = if self.unique { " UNIQUE" } else { "" };

        format!(
            "DEFINE INDEX IF NOT EXISTS {index} ON TABLE {table} FIELDS {fields}{unique_clause};",
            index = self.index_name,
            table = self.table,
            fields = self.fields,
        )
    }
}

/// One index per filter shape the query layer issues, plus the uniqueness
/// constraints the write paths rely on when racing each other.
fn index_specs() -> [IndexSpec; 20] {
    [
        IndexSpec::unique("book_name_unique", "book", "name"),
        IndexSpec::plain("book_category", "book", "category"),
        IndexSpec::plain("book_period", "book", "period"),
        IndexSpec::plain("book_style", "book", "style"),
        IndexSpec::plain("book_category_period_style", "book", "category, period, style"),
        IndexSpec::unique(
            "sentence_book_prefix_unique",
            "sentence",
            "book_id, content_prefix",
        ),
        IndexSpec::plain("sentence_book", "sentence", "book_id"),
        IndexSpec::unique(
            "token_sentence_position_unique",
            "token",
            "sentence_id, position",
        ),
        IndexSpec::plain("token_sentence", "token", "sentence_id"),
        IndexSpec::plain("token_book", "token", "book_id"),
        IndexSpec::plain("token_text", "token", "text"),
        IndexSpec::plain("token_pos", "token", "pos"),
        IndexSpec::plain("token_text_pos", "token", "text, pos"),
        IndexSpec::unique("dependency_dependent_unique", "dependency", "dependent_id"),
        IndexSpec::plain("dependency_head", "dependency", "head_id"),
        IndexSpec::plain("dependency_type", "dependency", "dependency_type"),
        IndexSpec::plain("dependency_head_type", "dependency", "head_id, dependency_type"),
        IndexSpec::plain("dependency_sentence", "dependency", "sentence_id"),
        IndexSpec::plain("dependency_book", "dependency", "book_id"),
        IndexSpec::plain(
            "dependency_collocation",
            "dependency",
            "head_pos, dependent_pos, dependency_type",
        ),
    ]
}

/// Define every corpus table and index. Safe to call on every start-up.
pub async fn ensure_schema(db: &SurrealDbClient) -> Result<(), AppError> {
    ensure_schema_inner(db).await.map_err(AppError::from)
}

async fn ensure_schema_inner(db: &SurrealDbClient) -> Result<()> {
    let mut statements = String::from("BEGIN TRANSACTION;");
    for table in TABLES {
        statements.push_str(&format!("DEFINE TABLE IF NOT EXISTS {table} SCHEMALESS;"));
    }
    for spec in index_specs() {
        statements.push_str(&spec.definition());
    }
    statements.push_str("COMMIT TRANSACTION;");

    let res = db
        .client
        .query(statements)
        .await
        .context("submitting schema definitions")?;
    res.check().context("one of the schema definitions failed")?;

    info!(
        tables = TABLES.len(),
        indexes = index_specs().len(),
        "Corpus schema ensured"
    );

    Ok(())
}
