//! Collocation lookup for the dictionary front end.
//!
//! A collocation is a distinct (head, dependent, relation) combination, where
//! head and dependent are identified by surface text and part-of-speech. Its
//! frequency is the number of dependency edges realizing it; example sentences
//! are drawn from those edges, optionally restricted to certain books.

use std::collections::{BTreeSet, HashMap};

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    error::AppError,
    storage::{
        cursor::DEFAULT_PAGE_SIZE,
        db::SurrealDbClient,
        types::{
            book::{Book, BookFilter},
            dependency::Dependency,
            sentence::Sentence,
        },
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollocationKey {
    pub head_text: String,
    pub head_pos: Option<String>,
    pub dependent_text: String,
    pub dependent_pos: Option<String>,
    pub dependency_type: String,
}

#[derive(Debug, Clone)]
pub struct CollocationQuery {
    /// Substring of the head token's text
    pub head_text: Option<String>,
    pub head_pos: Vec<String>,
    /// Substring of the dependent token's text
    pub dependent_text: Option<String>,
    pub dependent_pos: Vec<String>,
    pub dependency_types: Vec<String>,
    pub min_frequency: usize,
    pub max_frequency: Option<usize>,
    pub results_limit: usize,
    pub results_offset: usize,
    pub examples_limit: usize,
    pub examples_offset: usize,
    /// Restricts which edges count as examples. Frequencies ignore it.
    pub books: BookFilter,
}

impl Default for CollocationQuery {
    fn default() -> Self {
        Self {
            head_text: None,
            head_pos: Vec::new(),
            dependent_text: None,
            dependent_pos: Vec::new(),
            dependency_types: Vec::new(),
            min_frequency: 1,
            max_frequency: None,
            results_limit: 8,
            results_offset: 0,
            examples_limit: 5,
            examples_offset: 0,
            books: BookFilter::default(),
        }
    }
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

impl CollocationQuery {
    pub fn validate(&self) -> Result<(), AppError> {
        if non_blank(self.head_text.as_ref()).is_none()
            && non_blank(self.dependent_text.as_ref()).is_none()
        {
            return Err(AppError::Validation(
                "at least one of head_text or dependent_text must be provided".into(),
            ));
        }
        if self.min_frequency == 0 {
            return Err(AppError::Validation("min_frequency must be at least 1".into()));
        }
        if let Some(max) = self.max_frequency {
            if max < self.min_frequency {
                return Err(AppError::Validation(format!(
                    "max_frequency {max} is below min_frequency {}",
                    self.min_frequency
                )));
            }
        }
        if self.results_limit == 0 || self.examples_limit == 0 {
            return Err(AppError::Validation(
                "results_limit and examples_limit must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// WHERE conditions and bindings selecting the edges that realize a
    /// matching collocation, regardless of book.
    fn edge_conditions(&self) -> (Vec<&'static str>, Vec<(&'static str, Value)>) {
        let mut conditions = Vec::new();
        let mut bindings: Vec<(&'static str, Value)> = Vec::new();
        if let Some(text) = non_blank(self.head_text.as_ref()) {
            conditions.push("string::contains(head_text, $head_text)");
            bindings.push(("head_text", text.into()));
        }
        if let Some(text) = non_blank(self.dependent_text.as_ref()) {
            conditions.push("string::contains(dependent_text, $dependent_text)");
            bindings.push(("dependent_text", text.into()));
        }
        if !self.head_pos.is_empty() {
            conditions.push("head_pos IN $head_pos");
            bindings.push(("head_pos", self.head_pos.clone().into()));
        }
        if !self.dependent_pos.is_empty() {
            conditions.push("dependent_pos IN $dependent_pos");
            bindings.push(("dependent_pos", self.dependent_pos.clone().into()));
        }
        if !self.dependency_types.is_empty() {
            conditions.push("dependency_type IN $dependency_types");
            bindings.push(("dependency_types", self.dependency_types.clone().into()));
        }
        (conditions, bindings)
    }

    fn frequency_in_range(&self, frequency: usize) -> bool {
        frequency >= self.min_frequency && self.max_frequency.map_or(true, |max| frequency <= max)
    }
}

/// One collocation as aggregated by the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollocationCount {
    pub head_text: String,
    #[serde(default)]
    pub head_pos: Option<String>,
    pub dependent_text: String,
    #[serde(default)]
    pub dependent_pos: Option<String>,
    pub dependency_type: String,
    /// Edges realizing the collocation in any book
    pub frequency: i64,
    /// Edges realizing it in books accepted by the book filter
    pub example_count: i64,
}

impl CollocationCount {
    pub fn key(&self) -> CollocationKey {
        CollocationKey {
            head_text: self.head_text.clone(),
            head_pos: self.head_pos.clone(),
            dependent_text: self.dependent_text.clone(),
            dependent_pos: self.dependent_pos.clone(),
            dependency_type: self.dependency_type.clone(),
        }
    }
}

fn count_of(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}

/// Applies the frequency bounds, then orders by example count, frequency and
/// key.
pub fn rank_counts(counts: Vec<CollocationCount>, query: &CollocationQuery) -> Vec<CollocationCount> {
    let mut ranked: Vec<CollocationCount> = counts
        .into_iter()
        .filter(|count| query.frequency_in_range(count_of(count.frequency)))
        .collect();

    ranked.sort_by(|a, b| {
        b.example_count
            .cmp(&a.example_count)
            .then_with(|| b.frequency.cmp(&a.frequency))
            .then_with(|| a.key().cmp(&b.key()))
    });
    ranked
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollocationExample {
    pub book: String,
    pub sentence_id: i64,
    pub sentence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collocation {
    #[serde(flatten)]
    pub key: CollocationKey,
    pub frequency: usize,
    pub example_count: usize,
    pub examples: Vec<CollocationExample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollocationPage {
    pub total_collocations_count: usize,
    pub results: Vec<Collocation>,
}

/// Runs a collocation search with the default page size.
pub async fn search_collocations(
    query: &CollocationQuery,
    db: &SurrealDbClient,
) -> Result<CollocationPage, AppError> {
    search_collocations_paged(query, DEFAULT_PAGE_SIZE, db).await
}

/// Runs a collocation search. `page_size` bounds each round-trip made while
/// resolving the book filter.
///
/// Edges are aggregated by the database, so memory grows with the number of
/// distinct collocations, not with the number of edges. Only the example
/// rows of the returned page are fetched.
pub async fn search_collocations_paged(
    query: &CollocationQuery,
    page_size: usize,
    db: &SurrealDbClient,
) -> Result<CollocationPage, AppError> {
    query.validate()?;
    debug!(?query, "Running collocation search");

    let example_books = if query.books.is_empty() {
        None
    } else {
        let ids: Vec<i64> = Book::query(&query.books)
            .page_size(page_size)
            .collect(db)
            .await?
            .into_iter()
            .map(|book| book.id)
            .collect();
        Some(ids)
    };

    let counts = count_collocations(query, example_books.as_deref(), db).await?;
    let ranked = rank_counts(counts, query);
    let total_collocations_count = ranked.len();

    let page: Vec<CollocationCount> = ranked
        .into_iter()
        .skip(query.results_offset)
        .take(query.results_limit)
        .collect();

    let mut books: HashMap<i64, String> = HashMap::new();
    let mut results = Vec::with_capacity(page.len());
    for count in page {
        let examples = load_examples(&count, query, example_books.as_deref(), &mut books, db).await?;
        results.push(Collocation {
            key: count.key(),
            frequency: count_of(count.frequency),
            example_count: count_of(count.example_count),
            examples,
        });
    }

    info!(
        total_collocations_count,
        returned = results.len(),
        "Collocation search finished"
    );

    Ok(CollocationPage {
        total_collocations_count,
        results,
    })
}

async fn count_collocations(
    query: &CollocationQuery,
    example_books: Option<&[i64]>,
    db: &SurrealDbClient,
) -> Result<Vec<CollocationCount>, AppError> {
    let (conditions, bindings) = query.edge_conditions();
    let example_count = if example_books.is_some() {
        "count(book_id IN $example_books)"
    } else {
        "count()"
    };
    let statement = format!(
        "SELECT head_text, head_pos, dependent_text, dependent_pos, dependency_type, \
         count() AS frequency, {example_count} AS example_count \
         FROM dependency WHERE {conditions} \
         GROUP BY head_text, head_pos, dependent_text, dependent_pos, dependency_type",
        conditions = conditions.join(" AND "),
    );
    debug!(%statement, "Aggregating collocations");

    let mut request = db.client.query(statement);
    for (name, value) in bindings {
        request = request.bind((name, value));
    }
    if let Some(ids) = example_books {
        request = request.bind(("example_books", ids.to_vec()));
    }

    let counts: Vec<CollocationCount> = request.await?.take(0)?;
    Ok(counts)
}

async fn load_examples(
    count: &CollocationCount,
    query: &CollocationQuery,
    example_books: Option<&[i64]>,
    books: &mut HashMap<i64, String>,
    db: &SurrealDbClient,
) -> Result<Vec<CollocationExample>, AppError> {
    let book_condition = if example_books.is_some() {
        " AND book_id IN $example_books"
    } else {
        ""
    };
    let statement = format!(
        "SELECT * FROM dependency \
         WHERE head_text = $head_text AND head_pos = $head_pos \
         AND dependent_text = $dependent_text AND dependent_pos = $dependent_pos \
         AND dependency_type = $dependency_type{book_condition} \
         ORDER BY id ASC LIMIT {limit} START {offset}",
        limit = query.examples_limit,
        offset = query.examples_offset,
    );

    let mut request = db
        .client
        .query(statement)
        .bind(("head_text", count.head_text.clone()))
        .bind(("head_pos", count.head_pos.clone()))
        .bind(("dependent_text", count.dependent_text.clone()))
        .bind(("dependent_pos", count.dependent_pos.clone()))
        .bind(("dependency_type", count.dependency_type.clone()));
    if let Some(ids) = example_books {
        request = request.bind(("example_books", ids.to_vec()));
    }
    let edges: Vec<Dependency> = request.await?.take(0)?;

    let missing: Vec<i64> = edges
        .iter()
        .map(|edge| edge.book_id)
        .filter(|id| !books.contains_key(id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    for book in try_join_all(missing.into_iter().map(|id| Book::require(id, db))).await? {
        books.insert(book.id, book.name);
    }

    let sentences =
        try_join_all(edges.iter().map(|edge| Sentence::require(edge.sentence_id, db))).await?;

    Ok(edges
        .iter()
        .zip(sentences)
        .map(|(edge, sentence)| CollocationExample {
            book: books.get(&edge.book_id).cloned().unwrap_or_default(),
            sentence_id: sentence.id,
            sentence: sentence.content,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{
        ingest::{ingest_sentence, SentenceDraft, TokenDraft},
        types::book::BookTags,
    };
    use uuid::Uuid;

    fn count(relation: &str, dependent: &str, frequency: i64, example_count: i64) -> CollocationCount {
        CollocationCount {
            head_text: "人".to_string(),
            head_pos: Some("NOUN".to_string()),
            dependent_text: dependent.to_string(),
            dependent_pos: Some("PART".to_string()),
            dependency_type: relation.to_string(),
            frequency,
            example_count,
        }
    }

    #[test]
    fn test_validation_requires_text() {
        let query = CollocationQuery::default();
        assert!(matches!(query.validate(), Err(AppError::Validation(_))));

        let blank = CollocationQuery {
            head_text: Some("  ".into()),
            ..Default::default()
        };
        assert!(matches!(blank.validate(), Err(AppError::Validation(_))));

        let inverted = CollocationQuery {
            dependent_text: Some("也".into()),
            min_frequency: 3,
            max_frequency: Some(2),
            ..Default::default()
        };
        assert!(matches!(inverted.validate(), Err(AppError::Validation(_))));

        let ok = CollocationQuery {
            dependent_text: Some("也".into()),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_rank_orders_by_examples_then_frequency() {
        let query = CollocationQuery {
            head_text: Some("人".into()),
            ..Default::default()
        };

        let ranked = rank_counts(
            vec![
                count("discourse", "也", 3, 0),
                count("amod", "美", 1, 1),
                count("nummod", "一", 2, 1),
            ],
            &query,
        );
        let order: Vec<&str> = ranked.iter().map(|c| c.dependency_type.as_str()).collect();
        // Ties on example count fall back to frequency: nummod occurs twice
        assert_eq!(order, vec!["nummod", "amod", "discourse"]);

        let ranked = rank_counts(
            vec![count("punct", "，", 2, 2), count("discourse", "也", 2, 2)],
            &query,
        );
        assert_eq!(ranked[0].dependent_text, "也");
    }

    #[test]
    fn test_rank_applies_frequency_bounds() {
        let frequent = CollocationQuery {
            head_text: Some("人".into()),
            min_frequency: 2,
            max_frequency: Some(2),
            ..Default::default()
        };

        let ranked = rank_counts(
            vec![
                count("discourse", "也", 3, 3),
                count("amod", "美", 1, 1),
                count("nummod", "一", 2, 2),
            ],
            &frequent,
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].dependency_type, "nummod");
    }

    fn arc(text: &str, pos: &str, head: usize, relation: &str) -> TokenDraft {
        TokenDraft {
            text: text.to_string(),
            pos: Some(pos.to_string()),
            head: Some(head),
            relation: Some(relation.to_string()),
        }
    }

    /// "<name>者，<place>人也" with 人 as the root.
    fn origin_sentence(name: &str, place: &str) -> SentenceDraft {
        SentenceDraft {
            content: format!("{name}者，{place}人也"),
            tokens: vec![
                arc(name, "PROPN", 4, "nsubj"),
                arc("者", "PART", 0, "case"),
                arc("，", "PUNCT", 4, "punct"),
                arc(place, "PROPN", 4, "nmod"),
                arc("人", "NOUN", 4, "root"),
                arc("也", "PART", 4, "discourse"),
            ],
        }
    }

    async fn setup_corpus() -> SurrealDbClient {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");
        db.ensure_initialized()
            .await
            .expect("Failed to initialize schema");

        let shiji = Book::create(
            "史記",
            BookTags {
                category: Some("history".into()),
                period: Some("Western Han".into()),
                style: Some("prose".into()),
            },
            &db,
        )
        .await
        .expect("create book");
        let hanshu = Book::create(
            "漢書",
            BookTags {
                category: Some("history".into()),
                period: Some("Eastern Han".into()),
                style: Some("prose".into()),
            },
            &db,
        )
        .await
        .expect("create book");

        for (book_id, name, place) in [
            (shiji.id, "項籍", "下相"),
            (shiji.id, "陳涉", "陽城"),
            (hanshu.id, "吳廣", "陽夏"),
        ] {
            ingest_sentence(book_id, &origin_sentence(name, place), &db)
                .await
                .expect("Failed to ingest");
        }

        db
    }

    #[tokio::test]
    async fn test_search_counts_frequency_and_examples() {
        let db = setup_corpus().await;

        let page = search_collocations(
            &CollocationQuery {
                dependent_text: Some("也".into()),
                ..Default::default()
            },
            &db,
        )
        .await
        .expect("search failed");

        assert_eq!(page.total_collocations_count, 1);
        let hit = &page.results[0];
        assert_eq!(hit.key.head_text, "人");
        assert_eq!(hit.key.dependency_type, "discourse");
        assert_eq!(hit.frequency, 3);
        assert_eq!(hit.example_count, 3);
        assert_eq!(hit.examples.len(), 3);
        assert_eq!(hit.examples[0].book, "史記");
        assert_eq!(hit.examples[0].sentence, "項籍者，下相人也");
    }

    #[tokio::test]
    async fn test_search_book_filter_limits_examples_only() {
        let db = setup_corpus().await;

        let page = search_collocations(
            &CollocationQuery {
                dependent_text: Some("也".into()),
                examples_limit: 1,
                examples_offset: 1,
                books: BookFilter {
                    periods: vec!["Western Han".into()],
                    ..Default::default()
                },
                ..Default::default()
            },
            &db,
        )
        .await
        .expect("search failed");

        let hit = &page.results[0];
        assert_eq!(hit.frequency, 3);
        assert_eq!(hit.example_count, 2);
        assert_eq!(hit.examples.len(), 1);
        assert_eq!(hit.examples[0].sentence, "陳涉者，陽城人也");
    }

    #[tokio::test]
    async fn test_search_paginates_results() {
        let db = setup_corpus().await;

        let query = CollocationQuery {
            head_text: Some("人".into()),
            dependency_types: vec!["discourse".into(), "punct".into()],
            ..Default::default()
        };
        let page = search_collocations(&query, &db).await.expect("search failed");
        assert_eq!(page.total_collocations_count, 2);
        assert_eq!(page.results[0].key.dependency_type, "discourse");
        assert_eq!(page.results[1].key.dependency_type, "punct");

        let second = search_collocations_paged(
            &CollocationQuery {
                results_limit: 1,
                results_offset: 1,
                ..query.clone()
            },
            2,
            &db,
        )
        .await
        .expect("search failed");
        assert_eq!(second.total_collocations_count, 2);
        assert_eq!(second.results.len(), 1);
        assert_eq!(second.results[0].key.dependency_type, "punct");

        let none = search_collocations(
            &CollocationQuery {
                min_frequency: 4,
                ..query
            },
            &db,
        )
        .await
        .expect("search failed");
        assert_eq!(none.total_collocations_count, 0);
        assert!(none.results.is_empty());
    }

    #[tokio::test]
    async fn test_search_filters_by_pos() {
        let db = setup_corpus().await;

        let page = search_collocations(
            &CollocationQuery {
                head_text: Some("人".into()),
                dependent_pos: vec!["PROPN".into()],
                dependency_types: vec!["nmod".into()],
                ..Default::default()
            },
            &db,
        )
        .await
        .expect("search failed");

        let places: Vec<&str> = page
            .results
            .iter()
            .map(|c| c.key.dependent_text.as_str())
            .collect();
        assert_eq!(page.total_collocations_count, 3);
        assert_eq!(places.len(), 3);
        assert!(places.contains(&"下相"));
        assert!(places.contains(&"陽夏"));
    }
}
