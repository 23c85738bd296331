use crate::{
    corpus_record,
    error::AppError,
    storage::{cursor::RowQuery, db::SurrealDbClient},
};
use tracing::info;

corpus_record!(Book, "book", {
    name: String,
    category: Option<String>,
    period: Option<String>,
    style: Option<String>
});

/// Optional classification of a book.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookTags {
    pub category: Option<String>,
    pub period: Option<String>,
    pub style: Option<String>,
}

/// Book metadata criteria. Each non-empty list accepts any of its values;
/// the lists themselves are AND-ed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookFilter {
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub periods: Vec<String>,
    #[serde(default)]
    pub styles: Vec<String>,
}

impl BookFilter {
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
            && self.categories.is_empty()
            && self.periods.is_empty()
            && self.styles.is_empty()
    }

    pub fn matches(&self, book: &Book) -> bool {
        fn accepts(values: &[String], value: Option<&String>) -> bool {
            values.is_empty() || value.is_some_and(|value| values.contains(value))
        }

        accepts(&self.names, Some(&book.name))
            && accepts(&self.categories, book.category.as_ref())
            && accepts(&self.periods, book.period.as_ref())
            && accepts(&self.styles, book.style.as_ref())
    }
}

impl Book {
    /// Registers a new book under a fresh id.
    pub async fn create(name: &str, tags: BookTags, db: &SurrealDbClient) -> Result<Self, AppError> {
        SurrealDbClient::retry_on_conflict(|| Self::try_create(name, tags.clone(), db)).await
    }

    async fn try_create(name: &str, tags: BookTags, db: &SurrealDbClient) -> Result<Self, AppError> {
        AppError::require_text("book name", name)?;

        if Self::get_by_name(name, db).await?.is_some() {
            return Err(AppError::Conflict(format!("book '{name}' already exists")));
        }

        let ids = db.allocate_ids(Self::table_name(), 1).await?;
        let book = Self {
            id: ids.start,
            created_at: Utc::now(),
            name: name.to_owned(),
            category: tags.category,
            period: tags.period,
            style: tags.style,
        };

        let response = db
            .client
            .query("CREATE type::thing($table, $id) CONTENT $row RETURN NONE")
            .bind(("table", Self::table_name()))
            .bind(("id", book.id))
            .bind(("row", book.clone()))
            .await?;
        SurrealDbClient::check_write(response, "create book")?;

        info!(book_id = book.id, name = %book.name, "Book created");

        Ok(book)
    }

    pub async fn get(id: i64, db: &SurrealDbClient) -> Result<Option<Self>, AppError> {
        let book: Option<Self> = db
            .client
            .query("SELECT * FROM type::thing($table, $id)")
            .bind(("table", Self::table_name()))
            .bind(("id", id))
            .await?
            .take(0)?;

        Ok(book)
    }

    /// Like [`Book::get`], but a missing book is an error.
    pub async fn require(id: i64, db: &SurrealDbClient) -> Result<Self, AppError> {
        Self::get(id, db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("book {id} not found")))
    }

    pub async fn get_by_name(name: &str, db: &SurrealDbClient) -> Result<Option<Self>, AppError> {
        let books: Vec<Self> = db
            .client
            .query("SELECT * FROM type::table($table) WHERE name = $name LIMIT 1")
            .bind(("table", Self::table_name()))
            .bind(("name", name.to_owned()))
            .await?
            .take(0)?;

        Ok(books.into_iter().next())
    }

    /// Books matching `filter`, in id order.
    pub fn query(filter: &BookFilter) -> RowQuery<Self> {
        let mut query = RowQuery::new();
        if !filter.names.is_empty() {
            query = query.filter("name IN $names").bind("names", filter.names.clone());
        }
        if !filter.categories.is_empty() {
            query = query
                .filter("category IN $categories")
                .bind("categories", filter.categories.clone());
        }
        if !filter.periods.is_empty() {
            query = query
                .filter("period IN $periods")
                .bind("periods", filter.periods.clone());
        }
        if !filter.styles.is_empty() {
            query = query
                .filter("style IN $styles")
                .bind("styles", filter.styles.clone());
        }
        query
    }

    /// Ids of every book matching `filter`.
    pub async fn matching_ids(
        filter: &BookFilter,
        db: &SurrealDbClient,
    ) -> Result<Vec<i64>, AppError> {
        let books = Self::query(filter).collect(db).await?;
        Ok(books.into_iter().map(|book| book.id).collect())
    }

    /// Deletes the book together with its sentences, their tokens and every
    /// dependency edge between those tokens, all in one transaction.
    pub async fn delete_cascade(id: i64, db: &SurrealDbClient) -> Result<(), AppError> {
        SurrealDbClient::retry_on_conflict(|| Self::try_delete_cascade(id, db)).await
    }

    async fn try_delete_cascade(id: i64, db: &SurrealDbClient) -> Result<(), AppError> {
        Self::require(id, db).await?;

        let response = db
            .client
            .query(
                "BEGIN TRANSACTION;
                 DELETE dependency WHERE book_id = $book_id;
                 DELETE token WHERE book_id = $book_id;
                 DELETE sentence WHERE book_id = $book_id;
                 DELETE type::thing('book', $book_id);
                 COMMIT TRANSACTION;",
            )
            .bind(("book_id", id))
            .await?;
        SurrealDbClient::check_write(response, "delete book")?;

        info!(book_id = id, "Book deleted with all descendants");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn tags(category: &str, period: &str, style: &str) -> BookTags {
        BookTags {
            category: Some(category.to_string()),
            period: Some(period.to_string()),
            style: Some(style.to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_book() {
        let db = setup_test_db().await;

        let book = Book::create("史記", tags("history", "Han", "prose"), &db)
            .await
            .expect("Failed to create book");
        assert_eq!(book.name, "史記");

        let fetched = Book::get(book.id, &db)
            .await
            .expect("Failed to fetch")
            .expect("Book should exist");
        assert_eq!(fetched.id, book.id);
        assert_eq!(fetched.category.as_deref(), Some("history"));
        assert_eq!(fetched.period.as_deref(), Some("Han"));

        let by_name = Book::get_by_name("史記", &db)
            .await
            .expect("Failed to fetch by name");
        assert_eq!(by_name.map(|b| b.id), Some(book.id));
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let db = setup_test_db().await;

        Book::create("莊子", BookTags::default(), &db)
            .await
            .expect("Failed to create book");

        let result = Book::create("莊子", tags("philosophy", "Warring States", "prose"), &db).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_creates_of_distinct_books_all_succeed() {
        let db = setup_test_db().await;

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let db = db.clone();
                tokio::spawn(async move {
                    Book::create(&format!("書{i}"), BookTags::default(), &db).await
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            let book = handle
                .await
                .expect("task panicked")
                .expect("Failed to create book");
            ids.push(book.id);
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 16);

        let stored = Book::query(&BookFilter::default())
            .collect(&db)
            .await
            .expect("query failed");
        assert_eq!(stored.len(), 16);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_creates_of_same_name_conflict() {
        let db = setup_test_db().await;

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let db = db.clone();
                tokio::spawn(async move { Book::create("史記", BookTags::default(), &db).await })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            match handle.await.expect("task panicked") {
                Ok(_) => created += 1,
                Err(AppError::Conflict(_)) => {}
                Err(other) => panic!("expected a conflict, got {other:?}"),
            }
        }
        assert_eq!(created, 1);

        let stored = Book::query(&BookFilter::default())
            .collect(&db)
            .await
            .expect("query failed");
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_blank_name_is_rejected() {
        let db = setup_test_db().await;

        let result = Book::create("   ", BookTags::default(), &db).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_query_by_metadata_combinations() {
        let db = setup_test_db().await;

        let shiji = Book::create("史記", tags("history", "Han", "prose"), &db)
            .await
            .expect("create");
        let hanshu = Book::create("漢書", tags("history", "Eastern Han", "prose"), &db)
            .await
            .expect("create");
        let shijing = Book::create("詩經", tags("poetry", "Zhou", "verse"), &db)
            .await
            .expect("create");
        Book::create("無名", BookTags::default(), &db)
            .await
            .expect("create");

        let history = Book::query(&BookFilter {
            categories: vec!["history".into()],
            ..Default::default()
        })
        .collect(&db)
        .await
        .expect("query failed");
        assert_eq!(
            history.iter().map(|b| b.id).collect::<Vec<_>>(),
            vec![shiji.id, hanshu.id]
        );

        let han_history = Book::query(&BookFilter {
            categories: vec!["history".into()],
            periods: vec!["Han".into()],
            ..Default::default()
        })
        .collect(&db)
        .await
        .expect("query failed");
        assert_eq!(han_history.len(), 1);
        assert_eq!(han_history[0].id, shiji.id);

        let verse_or_prose = Book::matching_ids(
            &BookFilter {
                styles: vec!["verse".into(), "prose".into()],
                ..Default::default()
            },
            &db,
        )
        .await
        .expect("query failed");
        assert_eq!(verse_or_prose, vec![shiji.id, hanshu.id, shijing.id]);

        let everything = Book::query(&BookFilter::default())
            .collect(&db)
            .await
            .expect("query failed");
        assert_eq!(everything.len(), 4);
    }

    #[test]
    fn test_filter_matches_in_memory() {
        let book = Book {
            id: 1,
            created_at: Utc::now(),
            name: "左傳".into(),
            category: Some("history".into()),
            period: None,
            style: Some("prose".into()),
        };

        assert!(BookFilter::default().matches(&book));
        assert!(BookFilter {
            categories: vec!["history".into(), "poetry".into()],
            ..Default::default()
        }
        .matches(&book));
        // A book without a period never satisfies a period criterion
        assert!(!BookFilter {
            periods: vec!["Zhou".into()],
            ..Default::default()
        }
        .matches(&book));
    }

    #[tokio::test]
    async fn test_delete_missing_book_is_not_found() {
        let db = setup_test_db().await;

        let result = Book::delete_cascade(999, &db).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
