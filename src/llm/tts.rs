//! Text-to-speech client returning MP3 audio.
//!
//! Long text is split at word boundaries into chunks the speech endpoint
//! accepts, each chunk is fetched in order and the MP3 frames concatenated.
//! Recently synthesized phrases are served from an LRU cache.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::chat::core::config::TtsConfig;
use crate::llm::errors::{LlmError, LlmResult};

/// Speech synthesis client.
pub struct TtsClient {
    client: Client,
    base_url: Url,
    lang: String,
    chunk_chars: usize,
    max_text_chars: usize,
    cache: Mutex<LruCache<String, Arc<Vec<u8>>>>,
}

impl TtsClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid, the cache capacity is zero, or
    /// the HTTP client cannot be built.
    pub fn new(config: &TtsConfig) -> LlmResult<Self> {
        let base_url = Url::parse(&config.base_url)?;
        let capacity = NonZeroUsize::new(config.cache_capacity).ok_or_else(|| {
            LlmError::InvalidInput("tts.cache_capacity must be > 0".to_string())
        })?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("Mozilla/5.0 (compatible; vocalis)")
            .build()?;

        Ok(Self {
            client,
            base_url,
            lang: config.lang.clone(),
            chunk_chars: config.chunk_chars,
            max_text_chars: config.max_text_chars,
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Synthesize `text` to MP3 bytes.
    ///
    /// # Errors
    /// Returns [`LlmError::InvalidInput`] for empty or oversized text, or an
    /// upstream error if any chunk fails.
    pub async fn synthesize(&self, text: &str) -> LlmResult<Arc<Vec<u8>>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(LlmError::InvalidInput("no text provided".to_string()));
        }
        if text.chars().count() > self.max_text_chars {
            return Err(LlmError::InvalidInput(format!(
                "text exceeds {} characters",
                self.max_text_chars
            )));
        }

        if let Some(audio) = self.cache.lock().await.get(text) {
            debug!("Serving cached speech");
            return Ok(Arc::clone(audio));
        }

        let chunks = split_for_speech(text, self.chunk_chars);
        let total = chunks.len();
        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            audio.extend_from_slice(&self.fetch_chunk(chunk, idx, total).await?);
        }

        let audio = Arc::new(audio);
        self.cache
            .lock()
            .await
            .put(text.to_string(), Arc::clone(&audio));
        Ok(audio)
    }

    async fn fetch_chunk(&self, chunk: &str, idx: usize, total: usize) -> LlmResult<Vec<u8>> {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("ie", "UTF-8")
            .append_pair("q", chunk)
            .append_pair("tl", &self.lang)
            .append_pair("client", "tw-ob")
            .append_pair("total", &total.to_string())
            .append_pair("idx", &idx.to_string())
            .append_pair("textlen", &chunk.chars().count().to_string());

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::HttpStatusNotOk(status.as_u16()));
        }
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(LlmError::MalformedResponse("empty audio".to_string()));
        }
        Ok(bytes.to_vec())
    }
}

/// Split text into chunks of at most `max_chars`, preferring sentence and
/// word boundaries. Words longer than `max_chars` are hard-split.
#[must_use]
pub fn split_for_speech(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if word_len > max_chars {
            flush_chunk(&mut chunks, &mut current, &mut current_len);
            let chars: Vec<char> = word.chars().collect();
            chunks.extend(chars.chunks(max_chars).map(|piece| piece.iter().collect::<String>()));
            continue;
        }

        let needed = if current_len == 0 {
            word_len
        } else {
            current_len + 1 + word_len
        };
        if needed > max_chars {
            flush_chunk(&mut chunks, &mut current, &mut current_len);
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;

        // Sentence ends make natural pauses once the chunk is half full.
        if word.ends_with(['.', '!', '?']) && current_len * 2 > max_chars {
            flush_chunk(&mut chunks, &mut current, &mut current_len);
        }
    }
    flush_chunk(&mut chunks, &mut current, &mut current_len);

    chunks
}

fn flush_chunk(chunks: &mut Vec<String>, current: &mut String, current_len: &mut usize) {
    if !current.is_empty() {
        chunks.push(std::mem::take(current));
    }
    *current_len = 0;
}
