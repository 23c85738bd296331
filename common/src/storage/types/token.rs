use crate::{
    corpus_record,
    error::AppError,
    storage::{cursor::RowQuery, db::SurrealDbClient, types::sentence::Sentence},
};
use tracing::info;

corpus_record!(Token, "token", {
    sentence_id: i64,
    /// Owning book of the sentence, kept for subtree deletes
    book_id: i64,
    /// Zero-based, unique within the sentence
    position: i64,
    text: String,
    /// Part-of-speech tag
    pos: Option<String>
});

/// Token text and/or part-of-speech criteria. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenFilter {
    pub text: Option<String>,
    pub pos: Option<String>,
}

impl Token {
    pub(crate) fn new(
        id: i64,
        sentence: &Sentence,
        position: i64,
        text: &str,
        pos: Option<String>,
    ) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            sentence_id: sentence.id,
            book_id: sentence.book_id,
            position,
            text: text.to_owned(),
            pos,
        }
    }

    pub async fn create(
        sentence_id: i64,
        position: i64,
        text: &str,
        pos: Option<String>,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        SurrealDbClient::retry_on_conflict(|| {
            Self::try_create(sentence_id, position, text, pos.clone(), db)
        })
        .await
    }

    async fn try_create(
        sentence_id: i64,
        position: i64,
        text: &str,
        pos: Option<String>,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        if position < 0 {
            return Err(AppError::Validation(format!(
                "token position must be zero or greater, got {position}"
            )));
        }
        AppError::require_text("token text", text)?;
        let sentence = Sentence::require(sentence_id, db).await?;

        if Self::get_at(sentence_id, position, db).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "sentence {sentence_id} already has a token at position {position}"
            )));
        }

        let ids = db.allocate_ids(Self::table_name(), 1).await?;
        let token = Self::new(ids.start, &sentence, position, text, pos);

        let response = db
            .client
            .query("CREATE type::thing($table, $id) CONTENT $row RETURN NONE")
            .bind(("table", Self::table_name()))
            .bind(("id", token.id))
            .bind(("row", token.clone()))
            .await?;
        SurrealDbClient::check_write(response, "create token")?;

        info!(token_id = token.id, sentence_id, position, "Token created");

        Ok(token)
    }

    pub async fn get(id: i64, db: &SurrealDbClient) -> Result<Option<Self>, AppError> {
        let token: Option<Self> = db
            .client
            .query("SELECT * FROM type::thing($table, $id)")
            .bind(("table", Self::table_name()))
            .bind(("id", id))
            .await?
            .take(0)?;

        Ok(token)
    }

    pub async fn require(id: i64, db: &SurrealDbClient) -> Result<Self, AppError> {
        Self::get(id, db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("token {id} not found")))
    }

    /// The token occupying `position` in a sentence, if any.
    pub async fn get_at(
        sentence_id: i64,
        position: i64,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let tokens: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM type::table($table) WHERE sentence_id = $sentence_id AND position = $position LIMIT 1",
            )
            .bind(("table", Self::table_name()))
            .bind(("sentence_id", sentence_id))
            .bind(("position", position))
            .await?
            .take(0)?;

        Ok(tokens.into_iter().next())
    }

    /// All tokens of a sentence, ordered by position.
    pub async fn list_by_sentence(
        sentence_id: i64,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let tokens: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM type::table($table) WHERE sentence_id = $sentence_id ORDER BY position ASC",
            )
            .bind(("table", Self::table_name()))
            .bind(("sentence_id", sentence_id))
            .await?
            .take(0)?;

        Ok(tokens)
    }

    /// Tokens matching `filter`, in id order.
    pub fn query(filter: &TokenFilter) -> RowQuery<Self> {
        let mut query = RowQuery::new();
        if let Some(text) = &filter.text {
            query = query.filter("text = $text").bind("text", text.clone());
        }
        if let Some(pos) = &filter.pos {
            query = query.filter("pos = $pos").bind("pos", pos.clone());
        }
        query
    }
}
