//! Contextual choice between the senses of an ambiguous word.

use ndarray::{Array1, ArrayView1};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::RemoteError;

/// Embedding of one sub-token; `start..end` is a char span of the sentence.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenEmbedding {
    pub start: usize,
    pub end: usize,
    pub vector: Vec<f32>,
}

/// Collaborator producing contextual sub-token embeddings for a sentence.
#[allow(async_fn_in_trait)]
pub trait TokenEmbedder {
    async fn embed_tokens(&self, sentence: &str) -> Result<Vec<TokenEmbedding>, RemoteError>;
}

/// Token embeddings served over HTTP: POST `{"text": ...}`, answer `{"tokens": [...]}`.
#[derive(Debug, Clone)]
pub struct HttpTokenEmbedder {
    client: Client,
    url: String,
}

impl HttpTokenEmbedder {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    tokens: Vec<TokenEmbedding>,
}

impl TokenEmbedder for HttpTokenEmbedder {
    #[instrument(skip(self, sentence), fields(chars = sentence.chars().count()))]
    async fn embed_tokens(&self, sentence: &str) -> Result<Vec<TokenEmbedding>, RemoteError> {
        let resp = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "text": sentence }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(RemoteError::Status {
                status: resp.status().as_u16(),
                url: self.url.clone(),
            });
        }
        let payload: EmbedResponse = resp.json().await?;
        Ok(payload.tokens)
    }
}

/// Picks a sense by comparing the pooled target-word embedding with each
/// candidate's sense embedding.
///
/// Holds the embeddings of the last sentence only: ambiguous words of one
/// sentence are resolved back to back.
#[derive(Debug)]
pub struct SenseDisambiguator<E> {
    embedder: E,
    cached: Option<(String, Vec<TokenEmbedding>)>,
}

impl<E: TokenEmbedder> SenseDisambiguator<E> {
    pub fn new(embedder: E) -> Self {
        Self {
            embedder,
            cached: None,
        }
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Index of the best candidate for the word at char span `word` of `sentence`.
    ///
    /// A single candidate, or a word that is the whole sentence, yields 0
    /// without consulting the embedder.
    pub async fn pick_sense(
        &mut self,
        sentence: &str,
        word: (usize, usize),
        candidates: &[&[f32]],
    ) -> Result<usize, RemoteError> {
        if candidates.len() <= 1 {
            return Ok(0);
        }
        let (start, end) = word;
        if start == 0 && end >= sentence.chars().count() {
            return Ok(0);
        }

        let stale = !matches!(&self.cached, Some((cached, _)) if cached == sentence);
        if stale {
            let tokens = self.embedder.embed_tokens(sentence).await?;
            self.cached = Some((sentence.to_string(), tokens));
        }
        let tokens = self
            .cached
            .as_ref()
            .map(|(_, tokens)| tokens.as_slice())
            .unwrap_or_default();

        let Some(target) = pooled_target(tokens, start, end) else {
            debug!(start, end, "no sub-token overlaps the word; using first sense");
            return Ok(0);
        };
        Ok(best_candidate(target.view(), candidates))
    }
}

/// Mean of the sub-token vectors intersecting `[start, end)`, L2-normalized.
fn pooled_target(tokens: &[TokenEmbedding], start: usize, end: usize) -> Option<Array1<f32>> {
    let mut sum: Option<Array1<f32>> = None;
    let mut hits = 0usize;
    for token in tokens
        .iter()
        .filter(|token| token.start < end && token.end > start)
    {
        let vector = ArrayView1::from(token.vector.as_slice());
        match sum.as_mut() {
            Some(acc) if acc.len() == vector.len() => *acc += &vector,
            Some(_) => continue,
            None => sum = Some(vector.to_owned()),
        }
        hits += 1;
    }
    let mean = sum? / hits as f32;
    let norm = mean.dot(&mean).sqrt();
    if norm == 0.0 {
        return Some(mean);
    }
    Some(mean / norm)
}

fn best_candidate(target: ArrayView1<'_, f32>, candidates: &[&[f32]]) -> usize {
    let mut best = (0usize, f32::NEG_INFINITY);
    for (idx, candidate) in candidates.iter().enumerate() {
        if candidate.len() != target.len() {
            continue;
        }
        let score = target.dot(&ArrayView1::from(*candidate));
        if score > best.1 {
            best = (idx, score);
        }
    }
    best.0
}
