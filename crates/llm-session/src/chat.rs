//! Prompt and history operations on an active session.
//!
//! Engine failures during prompt, history export or history import run
//! [`LifecycleManager::abort_active_operation`] before the error is returned:
//! partially generated state is not resumable, so the session is torn down.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use llm_session_core::{ChatHistoryItem, EngineError, Error, Operation, Phase, Result, Token};
use llm_session_engine::GenerateOptions;

use crate::manager::{LifecycleManager, NO_SESSION};

impl LifecycleManager {
    /// Generate a response to `text`.
    pub async fn prompt(&mut self, text: &str) -> Result<String> {
        self.prompt_streaming(text, |_| {}).await
    }

    /// Generate a response to `text`, passing each decoded chunk to
    /// `on_token` as it is produced.
    ///
    /// `on_token` runs synchronously, once per chunk, in generation order.
    /// After the cancellation token fires it is not called again, and the
    /// prompt fails with `prompt:aborted` even if the engine returns text.
    /// On failure the error is returned and any partial response is discarded.
    pub async fn prompt_streaming<F>(&mut self, text: &str, mut on_token: F) -> Result<String>
    where
        F: FnMut(&str) + Send,
    {
        let (Some(active), Some(model)) = (self.session.as_mut(), self.model.as_deref()) else {
            return Err(self.fail(Error::precondition(Operation::Prompt, NO_SESSION)));
        };

        if self.cancellation.is_cancelled() {
            debug!("Re-arming cancellation token");
            self.cancellation = CancellationToken::new();
        }
        let cancellation = self.cancellation.clone();
        self.tracker.set_default(Phase::Generating);

        let watch = cancellation.clone();
        let mut chunks = 0usize;
        let mut sink = |tokens: &[Token]| {
            if watch.is_cancelled() {
                return;
            }
            chunks += 1;
            let piece = model.detokenize(tokens);
            on_token(piece.as_str());
        };

        let options = GenerateOptions::new(cancellation).with_sink(&mut sink);
        let result = active.chat.generate(text, options).await;

        match result {
            Ok(_) if watch.is_cancelled() => {
                debug!("Generation stopped by cancellation after {} chunks", chunks);
                let err = Error::stage(Operation::Prompt, &EngineError::Aborted);
                self.abort_active_operation().await;
                Err(self.fail(err))
            }
            Ok(response) => {
                debug!(
                    "Prompt completed: {} chunks, {} chars",
                    chunks,
                    response.len()
                );
                self.tracker.set_default(Phase::Ready);
                Ok(response)
            }
            Err(err) => {
                let err = Error::stage(Operation::Prompt, &err);
                self.abort_active_operation().await;
                Err(self.fail(err))
            }
        }
    }

    /// Export the session's chat history, oldest item first.
    pub async fn get_history(&mut self) -> Result<Vec<ChatHistoryItem>> {
        let Some(active) = self.session.as_mut() else {
            return Err(self.fail(Error::precondition(Operation::GetHistory, NO_SESSION)));
        };

        self.tracker.set(Phase::Generating, "exporting history");
        let result = active.chat.export_history().await;

        match result {
            Ok(items) => {
                debug!("History exported: {} items", items.len());
                self.tracker.set_default(Phase::Ready);
                Ok(items)
            }
            Err(err) => {
                let err = Error::stage(Operation::GetHistory, &err);
                self.abort_active_operation().await;
                Err(self.fail(err))
            }
        }
    }

    /// Replace the session's chat history.
    pub async fn set_history(&mut self, items: Vec<ChatHistoryItem>) -> Result<()> {
        let Some(active) = self.session.as_mut() else {
            return Err(self.fail(Error::precondition(Operation::SetHistory, NO_SESSION)));
        };

        let count = items.len();
        self.tracker.set(Phase::Loading, "importing history");
        let result = active.chat.import_history(items).await;

        match result {
            Ok(()) => {
                debug!("History imported: {} items", count);
                self.tracker.set_default(Phase::Ready);
                Ok(())
            }
            Err(err) => {
                let err = Error::stage(Operation::SetHistory, &err);
                self.abort_active_operation().await;
                Err(self.fail(err))
            }
        }
    }

    /// Release the chat session. Model, engine and module stay loaded and
    /// the phase is left as it is.
    pub async fn dispose_session(&mut self) -> Result<()> {
        let Some(mut active) = self.session.take() else {
            return Err(self.fail(Error::history_guard(
                Operation::DisposeSession,
                NO_SESSION,
            )));
        };

        active.chat.dispose().await;
        info!("Session disposed: id={}", self.id());
        Ok(())
    }

    /// Wipe the session's sequence history in place.
    pub async fn clear_history(&mut self) -> Result<()> {
        let Some(active) = self.session.as_mut() else {
            return Err(self.fail(Error::history_guard(Operation::ClearHistory, NO_SESSION)));
        };
        if !active.chat.has_sequence() {
            return Err(self.fail(Error::history_guard(
                Operation::ClearHistory,
                "session has no sequence",
            )));
        }

        let result = active.chat.clear_sequence_history().await;
        match result {
            Ok(()) => {
                debug!("Sequence history cleared: id={}", self.id());
                Ok(())
            }
            Err(err) => Err(self.fail(Error::stage(Operation::ClearHistory, &err))),
        }
    }

    /// Abort whatever the session is doing: fire the cancellation token and
    /// release the session if there is one.
    ///
    /// Safe to call repeatedly; the token fires once.
    pub async fn abort_active_operation(&mut self) {
        if !self.cancellation.is_cancelled() {
            info!("Cancelling active operation: id={}", self.id());
            self.cancellation.cancel();
        }
        self.release_session().await;
    }
}

#[cfg(test)]
mod tests {
    use llm_session_core::{ErrorKind, GpuPreference};
    use llm_session_engine::{CancelBehavior, ScriptedCall, ScriptedProvider};

    use super::*;

    const MODEL: &str = "models/tiny.gguf";

    async fn ready_manager(provider: &ScriptedProvider) -> LifecycleManager {
        let mut manager = LifecycleManager::new(provider.clone());
        manager.load_module().await.unwrap();
        manager.load_engine(GpuPreference::Auto).await.unwrap();
        manager.load_model(MODEL).await.unwrap();
        manager.init_session("sys").await.unwrap();
        manager
    }

    fn provider() -> ScriptedProvider {
        ScriptedProvider::new().with_model(MODEL, 4096)
    }

    #[tokio::test]
    async fn test_prompt_streams_decoded_chunks() {
        let provider = provider().with_response("The sky is blue.");
        let mut manager = ready_manager(&provider).await;

        let mut seen = Vec::new();
        let reply = manager
            .prompt_streaming("What colour is the sky?", |chunk| seen.push(chunk.to_string()))
            .await
            .unwrap();

        assert_eq!(reply, "The sky is blue.");
        assert_eq!(seen, vec!["The", " sky", " is", " blue."]);
        assert_eq!(seen.concat(), reply);
        assert_eq!(manager.phase(), Phase::Ready);
    }

    #[tokio::test]
    async fn test_prompt_without_session() {
        let provider = provider();
        let mut manager = LifecycleManager::new(provider.clone());
        let err = manager.prompt("hello").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert!(err.to_string().starts_with("prompt:"));
        assert_eq!(manager.phase(), Phase::Error);
        assert_eq!(provider.calls().count(ScriptedCall::Generate), 0);
    }

    #[tokio::test]
    async fn test_prompt_failure_aborts_and_discards_partial_text() {
        let provider = provider().with_response("one two three four");
        let mut manager = ready_manager(&provider).await;
        let token = manager.cancellation_token();
        provider.fail_generation_after(2, EngineError::Failed("decode error".to_string()));

        let mut seen = Vec::new();
        let err = manager
            .prompt_streaming("count", |chunk| seen.push(chunk.to_string()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Operation);
        assert_eq!(err.to_string(), "prompt:decode error");
        assert_eq!(seen.len(), 2);
        assert!(token.is_cancelled());
        assert!(!manager.has_session());
        assert_eq!(provider.calls().count(ScriptedCall::Dispose), 1);

        let status = manager.status();
        assert_eq!(status.phase, Phase::Error);
        assert_eq!(status.message.as_deref(), Some("prompt:decode error"));
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_stops_callbacks() {
        let provider = provider().with_response("alpha beta gamma delta");
        let mut manager = ready_manager(&provider).await;
        let token = manager.cancellation_token();

        let mut seen = 0;
        let err = manager
            .prompt_streaming("go", |_| {
                seen += 1;
                token.cancel();
            })
            .await
            .unwrap_err();

        assert_eq!(seen, 1);
        assert_eq!(err.to_string(), "prompt:aborted");
        assert_eq!(manager.phase(), Phase::Error);
    }

    #[tokio::test]
    async fn test_graceful_stop_on_cancel_is_an_error() {
        let provider = provider()
            .with_response("one two three")
            .with_cancel_behavior(CancelBehavior::Stop);
        let mut manager = ready_manager(&provider).await;
        let token = manager.cancellation_token();

        let mut seen = Vec::new();
        let err = manager
            .prompt_streaming("count", |chunk| {
                seen.push(chunk.to_string());
                token.cancel();
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Operation);
        assert_eq!(err.to_string(), "prompt:aborted");
        assert_eq!(seen, vec!["one"]);
        assert_eq!(manager.phase(), Phase::Error);
        assert!(!manager.has_session());
        assert_eq!(provider.calls().count(ScriptedCall::Dispose), 1);
    }

    #[tokio::test]
    async fn test_no_callbacks_after_cancel_even_if_engine_keeps_streaming() {
        let provider = provider()
            .with_response("alpha beta gamma delta")
            .with_cancel_behavior(CancelBehavior::Ignore);
        let mut manager = ready_manager(&provider).await;
        let token = manager.cancellation_token();

        let mut seen = 0;
        let err = manager
            .prompt_streaming("go", |_| {
                seen += 1;
                if seen == 2 {
                    token.cancel();
                }
            })
            .await
            .unwrap_err();

        assert_eq!(seen, 2);
        assert_eq!(err.to_string(), "prompt:aborted");
        assert!(!manager.has_session());
    }

    #[tokio::test]
    async fn test_abort_is_idempotent() {
        let provider = provider();
        let mut manager = ready_manager(&provider).await;
        let token = manager.cancellation_token();

        manager.abort_active_operation().await;
        manager.abort_active_operation().await;

        assert!(token.is_cancelled());
        assert!(!manager.has_session());
        assert_eq!(provider.calls().count(ScriptedCall::Dispose), 1);
    }

    #[tokio::test]
    async fn test_generation_after_recovery() {
        let provider = provider();
        let mut manager = ready_manager(&provider).await;
        provider.fail_next(
            ScriptedCall::Generate,
            EngineError::Failed("device lost".to_string()),
        );
        assert!(manager.prompt("first").await.is_err());
        assert!(manager.cancellation_token().is_cancelled());

        manager.init_session("sys").await.unwrap();
        assert!(!manager.cancellation_token().is_cancelled());
        assert_eq!(manager.prompt("second").await.unwrap(), "second");
        assert!(manager.is_ready());
    }

    #[tokio::test]
    async fn test_history_round_trip() {
        let provider = provider();
        let mut manager = ready_manager(&provider).await;
        let items = vec![
            ChatHistoryItem::system("Be terse."),
            ChatHistoryItem::user("Hi"),
            ChatHistoryItem::model("Hello."),
        ];

        manager.set_history(items.clone()).await.unwrap();
        assert_eq!(manager.phase(), Phase::Ready);
        assert_eq!(manager.get_history().await.unwrap(), items);
    }

    #[tokio::test]
    async fn test_history_records_prompts() {
        let provider = provider().with_response("Hi there");
        let mut manager = ready_manager(&provider).await;
        manager.prompt("hello").await.unwrap();

        let history = manager.get_history().await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0], ChatHistoryItem::system("sys"));
        assert_eq!(history[1], ChatHistoryItem::user("hello"));
        assert_eq!(history[2].text(), "Hi there");
    }

    #[tokio::test]
    async fn test_get_history_failure_aborts() {
        let provider = provider();
        let mut manager = ready_manager(&provider).await;
        provider.fail_next(
            ScriptedCall::ExportHistory,
            EngineError::Failed("state read".to_string()),
        );

        let err = manager.get_history().await.unwrap_err();
        assert_eq!(err.to_string(), "getHistory:state read");
        assert!(manager.cancellation_token().is_cancelled());
        assert!(!manager.has_session());
    }

    #[tokio::test]
    async fn test_set_history_failure_aborts() {
        let provider = provider();
        let mut manager = ready_manager(&provider).await;
        provider.fail_next(
            ScriptedCall::ImportHistory,
            EngineError::Failed("bad item".to_string()),
        );

        let err = manager
            .set_history(vec![ChatHistoryItem::user("x")])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "setHistory:bad item");
        assert_eq!(manager.phase(), Phase::Error);
        assert!(!manager.has_session());
    }

    #[tokio::test]
    async fn test_history_without_session() {
        let mut manager = LifecycleManager::new(provider());
        let err = manager.get_history().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);

        let err = manager.set_history(Vec::new()).await.unwrap_err();
        assert!(err.to_string().starts_with("setHistory:"));
    }

    #[tokio::test]
    async fn test_dispose_session() {
        let provider = provider();
        let mut manager = ready_manager(&provider).await;

        manager.dispose_session().await.unwrap();
        assert!(!manager.has_session());
        assert!(manager.has_model());
        assert_eq!(manager.phase(), Phase::Ready);

        let err = manager.prompt("hello").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert_eq!(provider.calls().count(ScriptedCall::Generate), 0);
    }

    #[tokio::test]
    async fn test_dispose_session_without_session() {
        let mut manager = LifecycleManager::new(provider());
        let err = manager.dispose_session().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HistoryGuard);
        assert_eq!(manager.phase(), Phase::Error);
    }

    #[tokio::test]
    async fn test_clear_history() {
        let provider = provider();
        let mut manager = ready_manager(&provider).await;
        manager.prompt("hello").await.unwrap();

        manager.clear_history().await.unwrap();
        manager.clear_history().await.unwrap();
        assert_eq!(
            manager.get_history().await.unwrap(),
            vec![ChatHistoryItem::system("sys")]
        );
    }

    #[tokio::test]
    async fn test_clear_history_guards() {
        let mut manager = LifecycleManager::new(provider());
        let err = manager.clear_history().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HistoryGuard);
        assert_eq!(manager.phase(), Phase::Error);

        let provider = provider().with_detached_sequence();
        let mut manager = ready_manager(&provider).await;
        let err = manager.clear_history().await.unwrap_err();
        assert_eq!(err.to_string(), "clearHistory:session has no sequence");
        assert_eq!(provider.calls().count(ScriptedCall::ClearSequenceHistory), 0);
    }
}
