//! End-to-end turn processing against stub collaborators.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use colloquy_core::config::ColloquyConfig;
use colloquy_core::error::KnowledgeError;
use colloquy_core::knowledge::{InMemoryKnowledgeStore, KnowledgeStore};
use colloquy_core::persona::PersonaRegistry;
use colloquy_core::seed::seed_knowledge;
use colloquy_core::types::{CharacterId, FactRecord, RetrievedFact, Route, SessionId};
use colloquy_dialogue::{
    DialogueError, DialogueOrchestrator, DialogueOrchestratorBuilder, SpeechError, SpeechToText,
    SynthesizedSpeech, TextToSpeech, Transcription, TurnRequest,
};
use colloquy_llm::{CompletionBackend, LlmError, LlmRequest, LlmResponse};

const GLADIATOR: &str = "roman_gladiator";
const SCRIBE: &str = "egyptian_scribe";
const TRAINING_QUERY: &str = "How did you train new gladiators for combat in the ludus?";
const TRAINING_ANSWER: &str = "I trained them daily with wooden swords, because the technique \
                               must become instinct. During my 8 years we drilled footwork specifically.";

// ---------------------------------------------------------------------------
// Stubs
// ---------------------------------------------------------------------------

/// Replies with a fixed line and records every prompt.
struct ScriptedBackend {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().last().cloned().expect("backend was called")
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.prompts.lock().push(request.prompt.clone());
        Ok(LlmResponse {
            text: self.reply.clone(),
            tokens_generated: 20,
            latency_ms: 1,
            model: "scripted".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

struct DownBackend;

#[async_trait]
impl CompletionBackend for DownBackend {
    async fn complete(&self, _: &LlmRequest) -> Result<LlmResponse, LlmError> {
        Err(LlmError::Unavailable("connection refused".into()))
    }

    fn model_name(&self) -> &str {
        "down"
    }
}

struct PanickingBackend;

#[async_trait]
impl CompletionBackend for PanickingBackend {
    async fn complete(&self, _: &LlmRequest) -> Result<LlmResponse, LlmError> {
        panic!("model runtime crashed");
    }

    fn model_name(&self) -> &str {
        "panicking"
    }
}

/// Every call fails, as if the vector database were offline.
struct OfflineStore;

#[async_trait]
impl KnowledgeStore for OfflineStore {
    async fn add(&self, _: &CharacterId, _: &[FactRecord]) -> Result<usize, KnowledgeError> {
        Err(KnowledgeError::Unavailable("connection reset".into()))
    }

    async fn search(
        &self,
        _: &CharacterId,
        _: &str,
        _: usize,
    ) -> Result<Vec<RetrievedFact>, KnowledgeError> {
        Err(KnowledgeError::Unavailable("connection reset".into()))
    }

    async fn count(&self, _: &CharacterId) -> Result<usize, KnowledgeError> {
        Err(KnowledgeError::Unavailable("connection reset".into()))
    }
}

struct StubStt(Result<Transcription, SpeechError>);

#[async_trait]
impl SpeechToText for StubStt {
    async fn transcribe(&self, _: &[u8]) -> Result<Transcription, SpeechError> {
        self.0.clone()
    }
}

struct StubTts {
    fail: bool,
}

#[async_trait]
impl TextToSpeech for StubTts {
    async fn synthesize(
        &self,
        character_id: &CharacterId,
        _: &str,
        session_id: &SessionId,
    ) -> Result<SynthesizedSpeech, SpeechError> {
        if self.fail {
            return Err(SpeechError::Failed("voice model missing".into()));
        }
        Ok(SynthesizedSpeech {
            audio_url: format!("/audio/{character_id}_{session_id}.wav"),
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn builder(backend: Arc<dyn CompletionBackend>) -> DialogueOrchestratorBuilder {
    let ids = PersonaRegistry::builtin().ids();
    let store = Arc::new(InMemoryKnowledgeStore::with_partitions(ids.iter()));
    seed_knowledge(store.as_ref(), &ids).await.expect("seed");
    DialogueOrchestrator::from_config(&ColloquyConfig::default(), store, backend)
}

async fn orchestrator(backend: Arc<dyn CompletionBackend>) -> DialogueOrchestrator {
    builder(backend).await.build()
}

fn greeting(id: &str) -> String {
    PersonaRegistry::builtin()
        .get(&id.into())
        .map(|p| p.greeting.clone())
        .expect("builtin persona")
}

// ---------------------------------------------------------------------------
// Caller errors and greetings
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_input_returns_greeting_without_exchange() {
    let backend = ScriptedBackend::new("unused");
    let engine = orchestrator(backend.clone()).await;

    for input in ["", "   "] {
        let result = engine
            .process_turn(TurnRequest::text(GLADIATOR, input))
            .await
            .expect("greeting turn");
        assert_eq!(result.response_text, greeting(GLADIATOR));
        assert_eq!(result.route, None);
        assert_eq!(result.model_used, "greeting");
    }

    assert_eq!(engine.session_stats().total_exchanges, 0);
    assert!(backend.prompts.lock().is_empty());
    assert_eq!(engine.learning_queue_stats().total_enqueued, 0);
}

#[tokio::test]
async fn unknown_character_is_rejected_before_any_session() {
    let engine = orchestrator(ScriptedBackend::new("unused")).await;

    let err = engine
        .process_turn(TurnRequest::text("unknown_character", "hi"))
        .await
        .expect_err("unknown character");

    match &err {
        DialogueError::UnknownCharacter { requested, available } => {
            assert_eq!(requested.as_str(), "unknown_character");
            assert_eq!(available.len(), 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(engine.session_stats().active_sessions, 0);
    assert_eq!(engine.counters().caller_errors, 1);
    assert_eq!(engine.counters().turns, 0);
}

#[tokio::test]
async fn session_bound_to_other_character_is_rejected() {
    let engine = orchestrator(ScriptedBackend::new("Salve!")).await;
    let first = engine
        .process_turn(TurnRequest::text(GLADIATOR, "hello"))
        .await
        .expect("first turn");

    let err = engine
        .process_turn(TurnRequest::text(SCRIBE, "hello").with_session(first.session_id.clone()))
        .await
        .expect_err("mismatch");

    assert!(matches!(err, DialogueError::SessionCharacterMismatch { .. }));
    let stats = engine.session_stats();
    assert_eq!(stats.active_sessions, 1);
    assert_eq!(stats.total_exchanges, 1);
}

// ---------------------------------------------------------------------------
// Routing and generation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn small_talk_takes_conversational_path() {
    let backend = ScriptedBackend::new("Salve, friend! Good to see you.");
    let engine = orchestrator(backend.clone()).await;

    let result = engine
        .process_turn(TurnRequest::text(GLADIATOR, "hello").with_scene("colosseum"))
        .await
        .expect("turn");

    assert_eq!(result.route, Some(Route::Conversational));
    assert_eq!(result.response_text, "Salve, friend! Good to see you.");
    assert_eq!(result.model_used, "scripted");
    assert_eq!(result.scene_context, "colosseum");
    assert_eq!(result.transcript, "hello");
    assert!(!backend.last_prompt().contains("HISTORICAL CONTEXT"));
    assert_eq!(engine.counters().conversational_routes, 1);
}

#[tokio::test]
async fn topical_question_takes_retrieval_path() {
    let backend = ScriptedBackend::new("We drilled with wooden swords.");
    let engine = orchestrator(backend.clone()).await;

    let result = engine
        .process_turn(TurnRequest::text(GLADIATOR, "How did gladiators train for combat?"))
        .await
        .expect("turn");

    assert_eq!(result.route, Some(Route::Retrieval));
    assert!(backend.last_prompt().contains("HISTORICAL CONTEXT"));
    assert_eq!(engine.counters().retrieval_routes, 1);
}

#[tokio::test]
async fn follow_up_turn_sees_previous_exchange() {
    let backend = ScriptedBackend::new("Salve, citizen!");
    let engine = orchestrator(backend.clone()).await;

    let first = engine
        .process_turn(TurnRequest::text(GLADIATOR, "hello"))
        .await
        .expect("first turn");
    let second = engine
        .process_turn(TurnRequest::text(GLADIATOR, "thanks").with_session(first.session_id.clone()))
        .await
        .expect("second turn");

    assert_eq!(first.session_id, second.session_id);
    assert!(backend.last_prompt().contains("User: hello\nYou: Salve, citizen!"));
    assert_eq!(engine.session_stats().total_exchanges, 2);
}

#[tokio::test]
async fn failing_backend_falls_back_to_greeting() {
    let engine = orchestrator(Arc::new(DownBackend)).await;

    let result = engine
        .process_turn(TurnRequest::text(GLADIATOR, TRAINING_QUERY))
        .await
        .expect("turn still succeeds");

    assert_eq!(result.response_text, greeting(GLADIATOR));
    assert_eq!(result.model_used, "fallback");
    assert_eq!(engine.session_stats().total_exchanges, 1);
    assert_eq!(engine.counters().fallback_generations, 1);
    assert_eq!(engine.learning_queue_stats().total_enqueued, 0);
}

#[tokio::test]
async fn panic_in_pipeline_is_reported_as_internal() {
    let engine = orchestrator(Arc::new(PanickingBackend)).await;

    let err = engine
        .process_turn(TurnRequest::text(GLADIATOR, "hello"))
        .await
        .expect_err("panic is caught");

    match err {
        DialogueError::Internal { message, .. } => assert!(message.contains("model runtime crashed")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(engine.session_stats().total_exchanges, 0);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_turns_on_one_session_append_in_order() {
    let engine = Arc::new(orchestrator(ScriptedBackend::new("Indeed.")).await);
    let session_id = SessionId::from("shared-session");

    let handles: Vec<_> = ["hello", "thanks"]
        .into_iter()
        .map(|text| {
            let engine = Arc::clone(&engine);
            let request = TurnRequest::text(GLADIATOR, text).with_session(session_id.clone());
            tokio::spawn(async move { engine.process_turn(request).await })
        })
        .collect();
    for handle in handles {
        let result = handle.await.expect("join").expect("turn");
        assert_eq!(result.session_id, session_id);
    }

    let session = engine.sessions().get(&session_id).expect("live session").snapshot();
    let sequence: Vec<u64> = session.history().map(|e| e.sequence_number).collect();
    assert_eq!(sequence, vec![1, 2]);
    assert_eq!(engine.session_stats().active_sessions, 1);
}

// ---------------------------------------------------------------------------
// Speech collaborators
// ---------------------------------------------------------------------------

#[tokio::test]
async fn audio_turns_are_transcribed_first() {
    let backend = ScriptedBackend::new("Salve!");
    let engine = builder(backend.clone())
        .await
        .speech_to_text(Arc::new(StubStt(Ok(Transcription {
            transcript: "hello".to_string(),
            language: "en".to_string(),
        }))))
        .build();

    let result = engine
        .process_turn(TurnRequest::audio(GLADIATOR, vec![1, 2, 3]))
        .await
        .expect("turn");
    assert_eq!(result.transcript, "hello");
    assert_eq!(result.route, Some(Route::Conversational));
}

#[tokio::test]
async fn empty_audio_is_a_caller_error() {
    let engine = orchestrator(ScriptedBackend::new("unused")).await;
    let err = engine
        .process_turn(TurnRequest::audio(GLADIATOR, Vec::new()))
        .await
        .expect_err("empty audio");
    assert!(matches!(err, DialogueError::EmptyAudio));
    assert_eq!(engine.session_stats().active_sessions, 0);
}

#[tokio::test]
async fn transcription_failure_aborts_the_turn() {
    let engine = builder(ScriptedBackend::new("unused"))
        .await
        .speech_to_text(Arc::new(StubStt(Err(SpeechError::Failed("garbled".into())))))
        .build();

    let err = engine
        .process_turn(TurnRequest::audio(GLADIATOR, vec![0; 16]))
        .await
        .expect_err("stt failure");
    assert!(matches!(err, DialogueError::Transcription(_)));
    assert_eq!(engine.counters().stt_failures, 1);
    assert_eq!(engine.session_stats().active_sessions, 0);
}

#[tokio::test]
async fn synthesis_attaches_audio_when_requested() {
    let engine = builder(ScriptedBackend::new("Salve!"))
        .await
        .text_to_speech(Arc::new(StubTts { fail: false }))
        .build();

    let silent = engine
        .process_turn(TurnRequest::text(GLADIATOR, "hello"))
        .await
        .expect("turn");
    assert!(silent.audio_url.is_none());

    let spoken = engine
        .process_turn(TurnRequest::text(GLADIATOR, "hello").with_speech(true))
        .await
        .expect("turn");
    let url = spoken.audio_url.expect("audio");
    assert!(url.starts_with("/audio/roman_gladiator_"));
}

#[tokio::test]
async fn synthesis_failure_keeps_the_text_response() {
    let engine = builder(ScriptedBackend::new("Salve!"))
        .await
        .text_to_speech(Arc::new(StubTts { fail: true }))
        .synthesize_by_default(true)
        .build();

    let result = engine
        .process_turn(TurnRequest::text(GLADIATOR, "hello"))
        .await
        .expect("turn");
    assert_eq!(result.response_text, "Salve!");
    assert!(result.audio_url.is_none());
    assert_eq!(engine.counters().tts_failures, 1);
}

// ---------------------------------------------------------------------------
// Learning
// ---------------------------------------------------------------------------

#[tokio::test]
async fn good_interaction_is_learned_through_the_queue() {
    let engine = orchestrator(ScriptedBackend::new(TRAINING_ANSWER)).await;

    let result = engine
        .process_turn(TurnRequest::text(GLADIATOR, TRAINING_QUERY))
        .await
        .expect("turn");
    assert_eq!(result.route, Some(Route::Retrieval));
    assert_eq!(engine.learning_statistics().total_learned_facts, 0);
    assert_eq!(engine.learning_queue_stats().depth, 1);

    let processed = engine.learning_worker().run_pending().await;
    assert_eq!(processed, 1);

    let stats = engine.learning_statistics();
    assert_eq!(stats.total_learned_facts, 1);
    assert_eq!(stats.characters_learning, 1);
    assert_eq!(engine.counters().promotions, 1);

    engine.reset_learning_statistics();
    assert_eq!(engine.learning_statistics().total_learned_facts, 0);
}

#[tokio::test]
async fn small_talk_is_evaluated_but_not_learned() {
    let engine = orchestrator(ScriptedBackend::new("Salve!")).await;
    engine
        .process_turn(TurnRequest::text(GLADIATOR, "hello"))
        .await
        .expect("turn");

    engine.learning_worker().run_pending().await;
    let stats = engine.learning_statistics();
    assert_eq!(stats.evaluations, 1);
    assert_eq!(stats.skips, 1);
    assert_eq!(stats.total_learned_facts, 0);
}

#[tokio::test]
async fn spawned_worker_drains_and_stops_on_shutdown() {
    let engine = orchestrator(ScriptedBackend::new(TRAINING_ANSWER)).await;
    let worker = engine.learning_worker().spawn();

    engine
        .process_turn(TurnRequest::text(GLADIATOR, TRAINING_QUERY))
        .await
        .expect("turn");
    engine.shutdown_learning();
    worker.await.expect("worker exits cleanly");

    assert_eq!(engine.learning_statistics().total_learned_facts, 1);
    assert_eq!(engine.learning_queue_stats().depth, 0);
}

#[tokio::test]
async fn offline_store_degrades_retrieval_and_learning_only() {
    let backend = ScriptedBackend::new(TRAINING_ANSWER);
    let engine = DialogueOrchestrator::from_config(
        &ColloquyConfig::default(),
        Arc::new(OfflineStore),
        backend.clone(),
    )
    .build();

    let result = engine
        .process_turn(TurnRequest::text(GLADIATOR, TRAINING_QUERY))
        .await
        .expect("turn succeeds without the store");
    assert_eq!(result.route, Some(Route::Retrieval));
    assert_eq!(result.response_text, TRAINING_ANSWER);
    assert_eq!(result.model_used, "scripted");
    assert!(backend.last_prompt().contains("general historical knowledge"));
    assert_eq!(engine.session_stats().total_exchanges, 1);

    assert_eq!(engine.learning_worker().run_pending().await, 1);

    let stats = engine.learning_statistics();
    assert_eq!(stats.evaluations, 1);
    assert_eq!(stats.promotion_failures, 1);
    assert_eq!(stats.total_learned_facts, 0);
    assert_eq!(engine.counters().promotions, 0);

    let session = engine.sessions().get(&result.session_id).expect("live session").snapshot();
    let exchange = session.history().next().expect("recorded exchange");
    assert_eq!(exchange.character_text, TRAINING_ANSWER);
}

#[tokio::test]
async fn characters_lists_the_builtin_cast() {
    let engine = orchestrator(ScriptedBackend::new("unused")).await;
    let ids: Vec<&str> = engine.characters().iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["egyptian_scribe", "mughal_architect", "roman_gladiator"]);
}
