//! Bulk loading of parsed sentences.
//!
//! An annotation pipeline hands over one sentence at a time together with its
//! tokens and dependency arcs. Everything is validated up front and written in
//! a single transaction, so readers never observe a partially parsed sentence.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            book::Book,
            dependency::{closes_cycle, Dependency},
            sentence::Sentence,
            token::Token,
            CorpusRecord,
        },
    },
};

/// One token of a parsed sentence. Its position is its index in
/// [`SentenceDraft::tokens`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenDraft {
    pub text: String,
    pub pos: Option<String>,
    /// Position of the governing token; equal to the token's own position for
    /// the root. `None` leaves the token without an edge.
    pub head: Option<usize>,
    /// Relation label, required whenever `head` is set.
    pub relation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentenceDraft {
    pub content: String,
    #[serde(default)]
    pub tokens: Vec<TokenDraft>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestedSentence {
    pub sentence: Sentence,
    pub tokens: Vec<Token>,
    pub dependencies: Vec<Dependency>,
}

/// Arcs of a validated draft as `(head position, dependent position, relation)`.
type DraftArc<'a> = (usize, usize, &'a str);

impl SentenceDraft {
    /// Checks the draft in isolation and returns its arcs.
    pub fn arcs(&self) -> Result<Vec<DraftArc<'_>>, AppError> {
        AppError::require_text("sentence content", &self.content)?;

        let mut arcs = Vec::new();
        for (position, token) in self.tokens.iter().enumerate() {
            AppError::require_text("token text", &token.text)?;

            match (token.head, token.relation.as_deref()) {
                (None, None) => {}
                (Some(head), Some(relation)) => {
                    AppError::require_text("dependency type", relation)?;
                    if head >= self.tokens.len() {
                        return Err(AppError::Validation(format!(
                            "token {position} names head {head}, but the sentence has {} tokens",
                            self.tokens.len()
                        )));
                    }
                    arcs.push((head, position, relation));
                }
                _ => {
                    return Err(AppError::Validation(format!(
                        "token {position} must set both head and relation, or neither"
                    )));
                }
            }
        }

        let mut checked: HashMap<i64, i64> = HashMap::new();
        for &(head, dependent, _) in &arcs {
            let (head, dependent) = (position_key(head)?, position_key(dependent)?);
            if closes_cycle(&checked, head, dependent) {
                return Err(AppError::Validation(format!(
                    "arc {head} -> {dependent} closes a cycle"
                )));
            }
            checked.insert(dependent, head);
        }

        Ok(arcs)
    }
}

fn position_key(position: usize) -> Result<i64, AppError> {
    i64::try_from(position)
        .map_err(|_| AppError::Validation(format!("position {position} is out of range")))
}

/// Inserts a sentence with all its tokens and edges atomically.
///
/// A transaction aborted by a concurrent writer is re-run from the top, so a
/// racing duplicate ends in [`AppError::Conflict`] rather than a commit error.
pub async fn ingest_sentence(
    book_id: i64,
    draft: &SentenceDraft,
    db: &SurrealDbClient,
) -> Result<IngestedSentence, AppError> {
    SurrealDbClient::retry_on_conflict(|| try_ingest_sentence(book_id, draft, db)).await
}

async fn try_ingest_sentence(
    book_id: i64,
    draft: &SentenceDraft,
    db: &SurrealDbClient,
) -> Result<IngestedSentence, AppError> {
    let arcs = draft.arcs()?;
    Book::require(book_id, db).await?;
    Sentence::ensure_prefix_free(book_id, &draft.content, db).await?;

    let sentence_ids = db.allocate_ids(Sentence::table_name(), 1).await?;
    let token_ids = db
        .allocate_ids(Token::table_name(), draft.tokens.len())
        .await?;
    let dependency_ids = db
        .allocate_ids(Dependency::table_name(), arcs.len())
        .await?;

    let sentence = Sentence::new(sentence_ids.start, book_id, &draft.content);
    let tokens = token_ids
        .zip(draft.tokens.iter())
        .enumerate()
        .map(|(position, (id, token))| {
            Ok(Token::new(
                id,
                &sentence,
                position_key(position)?,
                &token.text,
                token.pos.clone(),
            ))
        })
        .collect::<Result<Vec<_>, AppError>>()?;
    let dependencies = dependency_ids
        .zip(arcs.iter())
        .map(|(id, &(head, dependent, relation))| {
            match (tokens.get(head), tokens.get(dependent)) {
                (Some(head), Some(dependent)) => Ok(Dependency::new(id, head, dependent, relation)),
                _ => Err(AppError::InternalError(format!(
                    "arc {head} -> {dependent} points outside the sentence"
                ))),
            }
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    let mut statements = String::from("BEGIN TRANSACTION;");
    statements.push_str("CREATE type::thing('sentence', $sentence_id) CONTENT $sentence RETURN NONE;");
    for index in 0..tokens.len() {
        statements.push_str(&format!(
            "CREATE type::thing('token', $token_{index}_id) CONTENT $token_{index} RETURN NONE;"
        ));
    }
    for index in 0..dependencies.len() {
        statements.push_str(&format!(
            "CREATE type::thing('dependency', $dependency_{index}_id) CONTENT $dependency_{index} RETURN NONE;"
        ));
    }
    statements.push_str("COMMIT TRANSACTION;");

    let mut query = db
        .client
        .query(statements)
        .bind(("sentence_id", sentence.id))
        .bind(("sentence", sentence.clone()));
    for (index, token) in tokens.iter().enumerate() {
        query = query
            .bind((format!("token_{index}_id"), token.id))
            .bind((format!("token_{index}"), token.clone()));
    }
    for (index, dependency) in dependencies.iter().enumerate() {
        query = query
            .bind((format!("dependency_{index}_id"), dependency.id))
            .bind((format!("dependency_{index}"), dependency.clone()));
    }

    let response = query.await?;
    SurrealDbClient::check_write(response, "ingest sentence")?;

    info!(
        book_id,
        sentence_id = sentence.id,
        tokens = tokens.len(),
        dependencies = dependencies.len(),
        "Sentence ingested"
    );

    Ok(IngestedSentence {
        sentence,
        tokens,
        dependencies,
    })
}
