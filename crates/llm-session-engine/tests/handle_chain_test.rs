//! Walks the full handle chain of the scripted engine through the public
//! traits only.

use llm_session_core::{
    ChatHistoryItem, ContextOptions, EngineError, EngineOptions, ModelOptions, SessionOptions,
    Token,
};
use llm_session_engine::{
    GenerateOptions, InferenceContext, InferenceProvider, ScriptedCall, ScriptedProvider,
};
use tokio_util::sync::CancellationToken;

const MODEL: &str = "models/chain.gguf";

async fn context(provider: &ScriptedProvider, sequences: u32) -> Box<dyn InferenceContext> {
    let module = provider.acquire_module().await.unwrap();
    let engine = module
        .configure_engine(EngineOptions::default())
        .await
        .unwrap();
    let model = engine.load_model(ModelOptions::new(MODEL)).await.unwrap();
    let options = ContextOptions {
        sequence_count: sequences,
        ..Default::default()
    };
    model.create_context(options).await.unwrap()
}

#[tokio::test]
async fn test_generate_streams_and_records_history() {
    let provider = ScriptedProvider::new()
        .with_model(MODEL, 2048)
        .with_response("It is 42.");
    let context = context(&provider, 1).await;
    let mut session = context
        .open_session(SessionOptions {
            system_prompt: "Be exact.".to_string(),
        })
        .await
        .unwrap();

    let mut received: Vec<Token> = Vec::new();
    let mut sink = |tokens: &[Token]| received.extend_from_slice(tokens);
    let options = GenerateOptions::new(CancellationToken::new()).with_sink(&mut sink);
    let reply = session.generate("What is the answer?", options).await.unwrap();

    assert_eq!(reply, "It is 42.");
    let decoded: String = received.iter().filter_map(|&t| char::from_u32(t)).collect();
    assert_eq!(decoded, reply);

    let history = session.export_history().await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0], ChatHistoryItem::system("Be exact."));
    assert_eq!(history[1], ChatHistoryItem::user("What is the answer?"));
    assert_eq!(
        history[2],
        ChatHistoryItem::Model {
            response: vec!["It".to_string(), " is".to_string(), " 42.".to_string()],
        }
    );
}

#[tokio::test]
async fn test_sequences_are_leased_and_returned() {
    let provider = ScriptedProvider::new().with_model(MODEL, 2048);
    let context = context(&provider, 2).await;
    assert_eq!(context.metadata().sequences_remaining, 2);

    let mut first = context.open_session(SessionOptions::default()).await.unwrap();
    let _second = context.open_session(SessionOptions::default()).await.unwrap();
    assert_eq!(context.metadata().sequences_remaining, 0);

    let err = context
        .open_session(SessionOptions::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, EngineError::Failed(_)));

    first.dispose().await;
    assert_eq!(context.metadata().sequences_remaining, 1);
    assert!(!first.has_sequence());
    assert_eq!(provider.calls().count(ScriptedCall::OpenSession), 3);
}

#[tokio::test]
async fn test_cancelled_token_aborts_before_first_chunk() {
    let provider = ScriptedProvider::new()
        .with_model(MODEL, 2048)
        .with_response("never seen");
    let context = context(&provider, 1).await;
    let mut session = context.open_session(SessionOptions::default()).await.unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let err = session
        .generate("hello", GenerateOptions::new(token))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::Aborted);
    assert!(session.export_history().await.unwrap().is_empty());
}
