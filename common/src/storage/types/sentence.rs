use crate::{
    corpus_record,
    error::AppError,
    storage::{cursor::RowQuery, db::SurrealDbClient, types::book::Book},
};
use tracing::info;

use super::book::BookFilter;

/// Sentences are unique per book on this many leading characters.
pub const CONTENT_PREFIX_CHARS: usize = 255;

corpus_record!(Sentence, "sentence", {
    book_id: i64,
    content: String,
    /// First [`CONTENT_PREFIX_CHARS`] characters of `content`, the indexed
    /// uniqueness key
    content_prefix: String
});

/// The uniqueness key of a sentence's content.
pub fn content_prefix(content: &str) -> String {
    content.chars().take(CONTENT_PREFIX_CHARS).collect()
}

/// Selects sentences by owning book and/or book metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentenceFilter {
    pub book_id: Option<i64>,
    #[serde(default)]
    pub books: BookFilter,
}

impl Sentence {
    pub(crate) fn new(id: i64, book_id: i64, content: &str) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            book_id,
            content: content.to_owned(),
            content_prefix: content_prefix(content),
        }
    }

    /// Adds a sentence to a book.
    ///
    /// Two sentences of one book conflict when their first
    /// [`CONTENT_PREFIX_CHARS`] characters are equal, even if they differ later on.
    pub async fn create(
        book_id: i64,
        content: &str,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        SurrealDbClient::retry_on_conflict(|| Self::try_create(book_id, content, db)).await
    }

    async fn try_create(
        book_id: i64,
        content: &str,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        AppError::require_text("sentence content", content)?;
        Book::require(book_id, db).await?;
        Self::ensure_prefix_free(book_id, content, db).await?;

        let ids = db.allocate_ids(Self::table_name(), 1).await?;
        let sentence = Self::new(ids.start, book_id, content);

        let response = db
            .client
            .query("CREATE type::thing($table, $id) CONTENT $row RETURN NONE")
            .bind(("table", Self::table_name()))
            .bind(("id", sentence.id))
            .bind(("row", sentence.clone()))
            .await?;
        SurrealDbClient::check_write(response, "create sentence")?;

        info!(sentence_id = sentence.id, book_id, "Sentence created");

        Ok(sentence)
    }

    /// Fails with [`AppError::Conflict`] when `book_id` already holds a sentence
    /// with the same content prefix.
    pub(crate) async fn ensure_prefix_free(
        book_id: i64,
        content: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let existing: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM type::table($table) WHERE book_id = $book_id AND content_prefix = $prefix LIMIT 1",
            )
            .bind(("table", Self::table_name()))
            .bind(("book_id", book_id))
            .bind(("prefix", content_prefix(content)))
            .await?
            .take(0)?;

        match existing.first() {
            Some(sentence) => Err(AppError::Conflict(format!(
                "book {book_id} already holds sentence {} with the same leading {CONTENT_PREFIX_CHARS} characters",
                sentence.id
            ))),
            None => Ok(()),
        }
    }

    pub async fn get(id: i64, db: &SurrealDbClient) -> Result<Option<Self>, AppError> {
        let sentence: Option<Self> = db
            .client
            .query("SELECT * FROM type::thing($table, $id)")
            .bind(("table", Self::table_name()))
            .bind(("id", id))
            .await?
            .take(0)?;

        Ok(sentence)
    }

    pub async fn require(id: i64, db: &SurrealDbClient) -> Result<Self, AppError> {
        Self::get(id, db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("sentence {id} not found")))
    }

    /// Sentences matching `filter`, in id order.
    ///
    /// Book metadata is resolved to book ids up front; the returned query then
    /// only touches the `sentence` table.
    pub async fn query(
        filter: &SentenceFilter,
        db: &SurrealDbClient,
    ) -> Result<RowQuery<Self>, AppError> {
        let mut query = RowQuery::new();
        if let Some(book_id) = filter.book_id {
            query = query.filter("book_id = $book_id").bind("book_id", book_id);
        }
        if !filter.books.is_empty() {
            let book_ids = Book::matching_ids(&filter.books, db).await?;
            query = query.filter("book_id IN $book_ids").bind("book_ids", book_ids);
        }
        Ok(query)
    }

    /// Deletes the sentence, its tokens and their dependency edges atomically.
    pub async fn delete_cascade(id: i64, db: &SurrealDbClient) -> Result<(), AppError> {
        SurrealDbClient::retry_on_conflict(|| Self::try_delete_cascade(id, db)).await
    }

    async fn try_delete_cascade(id: i64, db: &SurrealDbClient) -> Result<(), AppError> {
        Self::require(id, db).await?;

        let response = db
            .client
            .query(
                "BEGIN TRANSACTION;
                 DELETE dependency WHERE sentence_id = $sentence_id;
                 DELETE token WHERE sentence_id = $sentence_id;
                 DELETE type::thing('sentence', $sentence_id);
                 COMMIT TRANSACTION;",
            )
            .bind(("sentence_id", id))
            .await?;
        SurrealDbClient::check_write(response, "delete sentence")?;

        info!(sentence_id = id, "Sentence deleted with all descendants");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::book::BookTags;
    use uuid::Uuid;

    async fn setup_test_db() -> SurrealDbClient {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");
        db.ensure_initialized()
            .await
            .expect("Failed to initialize schema");
        db
    }

    async fn create_book(name: &str, category: &str, db: &SurrealDbClient) -> Book {
        Book::create(
            name,
            BookTags {
                category: Some(category.to_string()),
                ..Default::default()
            },
            db,
        )
        .await
        .expect("Failed to create book")
    }

    #[test]
    fn test_content_prefix_counts_characters() {
        let long: String = "項".repeat(300);
        let prefix = content_prefix(&long);
        assert_eq!(prefix.chars().count(), CONTENT_PREFIX_CHARS);

        assert_eq!(content_prefix("項籍者"), "項籍者");
    }

    #[tokio::test]
    async fn test_same_content_in_two_books_succeeds() {
        let db = setup_test_db().await;
        let shiji = create_book("史記", "history", &db).await;
        let hanshu = create_book("漢書", "history", &db).await;

        let content = "項籍者，下相人也";
        let first = Sentence::create(shiji.id, content, &db)
            .await
            .expect("Failed in first book");
        let second = Sentence::create(hanshu.id, content, &db)
            .await
            .expect("Failed in second book");

        assert_ne!(first.id, second.id);
        assert_eq!(second.book_id, hanshu.id);
    }

    #[tokio::test]
    async fn test_shared_prefix_in_one_book_conflicts() {
        let db = setup_test_db().await;
        let book = create_book("史記", "history", &db).await;

        let shared: String = "字".repeat(CONTENT_PREFIX_CHARS);
        Sentence::create(book.id, &format!("{shared}甲"), &db)
            .await
            .expect("Failed to create first sentence");

        let result = Sentence::create(book.id, &format!("{shared}乙"), &db).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        // A difference inside the prefix is fine
        Sentence::create(book.id, &format!("乙{shared}"), &db)
            .await
            .expect("Distinct prefix should be accepted");
    }

    #[tokio::test]
    async fn test_missing_book_is_not_found() {
        let db = setup_test_db().await;

        let result = Sentence::create(42, "太史公曰", &db).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_query_by_book_metadata() {
        let db = setup_test_db().await;
        let shiji = create_book("史記", "history", &db).await;
        let shijing = create_book("詩經", "poetry", &db).await;

        let s1 = Sentence::create(shiji.id, "項籍者，下相人也", &db).await.expect("create");
        Sentence::create(shijing.id, "關關雎鳩，在河之洲", &db).await.expect("create");
        let s3 = Sentence::create(shiji.id, "字羽", &db).await.expect("create");

        let history = Sentence::query(
            &SentenceFilter {
                books: BookFilter {
                    categories: vec!["history".into()],
                    ..Default::default()
                },
                ..Default::default()
            },
            &db,
        )
        .await
        .expect("Failed to build query")
        .collect(&db)
        .await
        .expect("Failed to run query");

        assert_eq!(
            history.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![s1.id, s3.id]
        );

        let by_id = Sentence::query(
            &SentenceFilter {
                book_id: Some(shijing.id),
                ..Default::default()
            },
            &db,
        )
        .await
        .expect("Failed to build query")
        .collect(&db)
        .await
        .expect("Failed to run query");
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].content, "關關雎鳩，在河之洲");

        let nothing = Sentence::query(
            &SentenceFilter {
                books: BookFilter {
                    categories: vec!["law".into()],
                    ..Default::default()
                },
                ..Default::default()
            },
            &db,
        )
        .await
        .expect("Failed to build query")
        .collect(&db)
        .await
        .expect("Failed to run query");
        assert!(nothing.is_empty());
    }
}
