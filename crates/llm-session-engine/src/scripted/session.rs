//! Scripted context and chat session.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use llm_session_core::{
    ChatHistoryItem, ContextMetadata, EngineError, EngineResult, SessionOptions, Token,
};

use super::{CancelBehavior, ScriptedCall, Shared};
use crate::traits::{ChatSession, GenerateOptions, InferenceContext};

/// Bytes of state the scripted context reports per token of context.
const STATE_BYTES_PER_TOKEN: u64 = 256;

/// Split a response into the chunks it is streamed in: one chunk per word,
/// each carrying the whitespace that precedes it.
///
/// Concatenating the chunks yields `text` unchanged.
pub fn split_chunks(text: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut prev_whitespace = true;

    for (idx, ch) in text.char_indices() {
        let whitespace = ch.is_whitespace();
        if whitespace && !prev_whitespace && idx > start {
            chunks.push(&text[start..idx]);
            start = idx;
        }
        prev_whitespace = whitespace;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

#[derive(Debug)]
struct Sequences {
    total: u32,
    in_use: AtomicU32,
}

/// A context sequence held by a session, returned to the context on drop.
#[derive(Debug)]
struct SequenceLease {
    sequences: Arc<Sequences>,
}

impl Drop for SequenceLease {
    fn drop(&mut self) {
        self.sequences.in_use.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Scripted [`InferenceContext`].
#[derive(Debug)]
pub struct ScriptedContext {
    shared: Arc<Shared>,
    batch_size: u32,
    context_size: u32,
    sequences: Arc<Sequences>,
}

impl ScriptedContext {
    pub(crate) fn new(
        shared: Arc<Shared>,
        batch_size: u32,
        context_size: u32,
        sequence_count: u32,
    ) -> Self {
        Self {
            shared,
            batch_size,
            context_size,
            sequences: Arc::new(Sequences {
                total: sequence_count,
                in_use: AtomicU32::new(0),
            }),
        }
    }

    fn lease(&self) -> EngineResult<SequenceLease> {
        let total = self.sequences.total;
        self.sequences
            .in_use
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                (used < total).then_some(used + 1)
            })
            .map_err(|_| EngineError::Failed("no sequences left in context".to_string()))?;
        Ok(SequenceLease {
            sequences: Arc::clone(&self.sequences),
        })
    }
}

#[async_trait]
impl InferenceContext for ScriptedContext {
    fn metadata(&self) -> ContextMetadata {
        let in_use = self.sequences.in_use.load(Ordering::SeqCst);
        ContextMetadata {
            batch_size: self.batch_size,
            context_size: self.context_size,
            sequences_remaining: self.sequences.total.saturating_sub(in_use),
            state_size_bytes: u64::from(self.context_size) * STATE_BYTES_PER_TOKEN,
            total_sequences: self.sequences.total,
        }
    }

    async fn open_session(&self, options: SessionOptions) -> EngineResult<Box<dyn ChatSession>> {
        self.shared.enter(ScriptedCall::OpenSession)?;
        let sequence = if self.shared.detached_sequence() {
            None
        } else {
            Some(self.lease()?)
        };

        debug!(
            "Scripted session opened: system_prompt={} chars, sequence={}",
            options.system_prompt.len(),
            sequence.is_some()
        );
        Ok(Box::new(ScriptedSession {
            shared: Arc::clone(&self.shared),
            system_prompt: options.system_prompt.clone(),
            history: initial_history(&options.system_prompt),
            sequence,
            disposed: false,
        }))
    }
}

fn initial_history(system_prompt: &str) -> Vec<ChatHistoryItem> {
    if system_prompt.is_empty() {
        Vec::new()
    } else {
        vec![ChatHistoryItem::system(system_prompt)]
    }
}

/// Scripted [`ChatSession`].
#[derive(Debug)]
pub struct ScriptedSession {
    shared: Arc<Shared>,
    system_prompt: String,
    history: Vec<ChatHistoryItem>,
    sequence: Option<SequenceLease>,
    disposed: bool,
}

impl ScriptedSession {
    fn ensure_open(&self) -> EngineResult<()> {
        if self.disposed {
            return Err(EngineError::Failed("session is disposed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatSession for ScriptedSession {
    async fn generate(
        &mut self,
        text: &str,
        mut options: GenerateOptions<'_>,
    ) -> EngineResult<String> {
        self.shared.enter(ScriptedCall::Generate)?;
        self.ensure_open()?;
        if self.sequence.is_none() {
            return Err(EngineError::Failed("session has no sequence".to_string()));
        }
        let on_cancel = self.shared.cancel_behavior();
        if on_cancel == CancelBehavior::Abort && options.cancellation.is_cancelled() {
            return Err(EngineError::Aborted);
        }

        let failure = self.shared.take_generation_failure();
        let reply = self.shared.next_response(text);
        let chunks = split_chunks(&reply);
        let mut streamed = chunks.len();

        for (idx, chunk) in chunks.iter().enumerate() {
            if let Some((after, err)) = &failure {
                if idx == *after {
                    return Err(err.clone());
                }
            }
            if options.cancellation.is_cancelled() {
                match on_cancel {
                    CancelBehavior::Abort => {
                        debug!("Scripted generation aborted after {} chunks", idx);
                        return Err(EngineError::Aborted);
                    }
                    CancelBehavior::Stop => {
                        debug!("Scripted generation stopped after {} chunks", idx);
                        streamed = idx;
                        break;
                    }
                    CancelBehavior::Ignore => {}
                }
            }

            let tokens: Vec<Token> = chunk.chars().map(Token::from).collect();
            if let Some(sink) = options.on_token_chunk.as_mut() {
                sink(&tokens);
            }
            tokio::task::yield_now().await;
        }

        if let Some((_, err)) = failure {
            return Err(err);
        }

        let response: Vec<String> = chunks[..streamed].iter().map(|c| c.to_string()).collect();
        let reply = response.concat();
        self.history.push(ChatHistoryItem::user(text));
        self.history.push(ChatHistoryItem::Model { response });
        Ok(reply)
    }

    async fn export_history(&self) -> EngineResult<Vec<ChatHistoryItem>> {
        self.shared.enter(ScriptedCall::ExportHistory)?;
        self.ensure_open()?;
        Ok(self.history.clone())
    }

    async fn import_history(&mut self, items: Vec<ChatHistoryItem>) -> EngineResult<()> {
        self.shared.enter(ScriptedCall::ImportHistory)?;
        self.ensure_open()?;
        self.history = items;
        Ok(())
    }

    async fn dispose(&mut self) {
        // Dispose cannot fail; a queued failure is only consumed.
        let _ = self.shared.enter(ScriptedCall::Dispose);
        self.sequence = None;
        self.disposed = true;
    }

    fn has_sequence(&self) -> bool {
        self.sequence.is_some()
    }

    async fn clear_sequence_history(&mut self) -> EngineResult<()> {
        self.shared.enter(ScriptedCall::ClearSequenceHistory)?;
        if self.sequence.is_none() {
            return Err(EngineError::Failed("session has no sequence".to_string()));
        }
        self.history = initial_history(&self.system_prompt);
        Ok(())
    }
}
