//! Query pipeline: embed the question, search, assemble context, answer.

use tracing::debug;

use crate::answer::{answer_question, Generator};
use crate::context::assemble;
use crate::embedding::{embed_one, Embedder};
use crate::error::{Error, Result};
use crate::models::Answer;
use crate::store::Store;

/// Answer `question` from the stored corpus.
///
/// A blank question fails with [`Error::EmptyQuery`] before any external
/// call. An empty store (or retrieval that fits nothing into the context
/// budget) yields the decline answer rather than an error.
pub async fn run_query(
    store: &dyn Store,
    embedder: &dyn Embedder,
    generator: &dyn Generator,
    question: &str,
    top_k: usize,
    max_context_chars: usize,
) -> Result<Answer> {
    let question = question.trim();
    if question.is_empty() {
        return Err(Error::EmptyQuery);
    }

    let query_vec = embed_one(embedder, question).await?;
    let retrieved = store.search(&query_vec, top_k).await?;
    debug!(retrieved = retrieved.len(), top_k, "similarity search done");

    let context = assemble(&retrieved, max_context_chars);
    answer_question(generator, question, &context).await
}
