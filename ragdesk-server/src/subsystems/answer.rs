//! Answer subsystem — retrieval-augmented answering for `POST /ask`
//!
//! - Embeds the question with the shared embedding backend
//! - Takes the single most similar chunk from the vector store as context
//! - Asks the chat backend with that context (empty if nothing was found)

use anyhow::Result;
use ragdesk_core::embeddings::EmbeddingBackend;
use ragdesk_core::generator::ChatBackend;
use ragdesk_core::models::vector::PointId;
use ragdesk_core::vector_store::VectorStore;

/// Number of chunks used as context.
const CONTEXT_LIMIT: usize = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedContext {
    pub text: String,
    pub point_id: Option<PointId>,
    pub score: Option<f32>,
}

impl RetrievedContext {
    fn empty() -> Self {
        Self {
            text: String::new(),
            point_id: None,
            score: None,
        }
    }
}

/// Best-matching chunk text for `question`, or an empty context.
pub async fn retrieve_context(
    question: &str,
    embedder: &dyn EmbeddingBackend,
    store: &VectorStore,
    collection: &str,
) -> Result<RetrievedContext> {
    let query = embedder.embed(question).await?;
    let hits = store.search(collection, &query, CONTEXT_LIMIT)?;

    Ok(match hits.into_iter().next() {
        Some(hit) => {
            tracing::debug!(id = hit.id, score = hit.score, "Context retrieved");
            RetrievedContext {
                text: hit.payload.text,
                point_id: Some(hit.id),
                score: Some(hit.score),
            }
        }
        None => {
            tracing::info!(collection, "No context found; answering without grounding");
            RetrievedContext::empty()
        }
    })
}

/// Retrieve context and generate the answer.
pub async fn answer_question(
    question: &str,
    embedder: &dyn EmbeddingBackend,
    chat: &dyn ChatBackend,
    store: &VectorStore,
    collection: &str,
) -> Result<(String, RetrievedContext)> {
    let context = retrieve_context(question, embedder, store, collection).await?;
    let answer = chat.answer(question, &context.text).await?;
    tracing::info!(
        context_id = ?context.point_id,
        answer_chars = answer.chars().count(),
        "Question answered"
    );
    Ok((answer, context))
}
