//! Dialogue Orchestrator: one user turn from input to spoken line.
//!
//! ```text
//! Received -> Routed -> Generated -> Recorded -> LearningConsidered -> Done
//! ```
//!
//! Caller errors are raised in `Received`, before any session changes.
//! Collaborator failures degrade locally: retrieval yields no facts,
//! generation yields the persona greeting, synthesis yields no audio.
//! Learning is posted to a queue and never touches the response.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use colloquy_core::config::ColloquyConfig;
use colloquy_core::knowledge::KnowledgeStore;
use colloquy_core::learning::{LearningPromoter, LearningStatistics, LearningStatisticsSnapshot};
use colloquy_core::metrics::{
    spans, CounterSnapshot, DialogueCounters, LatencyPercentiles, TurnLatencyMonitor,
};
use colloquy_core::persona::{Persona, PersonaRegistry};
use colloquy_core::quality::QualityEvaluator;
use colloquy_core::retrieval::RetrievalGateway;
use colloquy_core::routing::RoutingPolicy;
use colloquy_core::session::{SessionHandle, SessionStats, SessionStore};
use colloquy_core::types::{CharacterId, RetrievedFact, Route, SessionId};
use colloquy_llm::generation::{CompletionBackend, GeneratedResponse, GenerationGateway};
use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, error, info, warn, Instrument};

use crate::error::{DialogueError, Result};
use crate::queue::{LearningQueue, LearningWorker, QueueStats};
use crate::speech::{SpeechError, SpeechToText, TextToSpeech};

const DEFAULT_SCENE: &str = "general";

// ---------------------------------------------------------------------------
// Request / Result
// ---------------------------------------------------------------------------

/// What the user said.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnInput {
    /// Typed text.
    Text(String),
    /// Raw audio to be transcribed first.
    Audio(Vec<u8>),
}

/// One turn as submitted by a caller.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// Character to speak as.
    pub character_id: CharacterId,
    /// The user's input.
    pub input: TurnInput,
    /// Existing session to continue, if any.
    pub session_id: Option<SessionId>,
    /// Scene label echoed back to the caller.
    pub scene_context: String,
    /// Request audio for the reply; `None` uses the configured default.
    pub synthesize_speech: Option<bool>,
}

impl TurnRequest {
    /// A typed turn.
    #[must_use]
    pub fn text(character_id: impl Into<CharacterId>, text: impl Into<String>) -> Self {
        Self::new(character_id.into(), TurnInput::Text(text.into()))
    }

    /// A spoken turn.
    #[must_use]
    pub fn audio(character_id: impl Into<CharacterId>, audio: Vec<u8>) -> Self {
        Self::new(character_id.into(), TurnInput::Audio(audio))
    }

    fn new(character_id: CharacterId, input: TurnInput) -> Self {
        Self {
            character_id,
            input,
            session_id: None,
            scene_context: DEFAULT_SCENE.to_string(),
            synthesize_speech: None,
        }
    }

    /// Continue an existing session.
    #[must_use]
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Set the scene label.
    #[must_use]
    pub fn with_scene(mut self, scene_context: impl Into<String>) -> Self {
        self.scene_context = scene_context.into();
        self
    }

    /// Ask for (or suppress) synthesized audio.
    #[must_use]
    pub fn with_speech(mut self, synthesize: bool) -> Self {
        self.synthesize_speech = Some(synthesize);
        self
    }
}

/// The outcome of a turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnResult {
    /// What the user said (typed or transcribed).
    pub transcript: String,
    /// What the character answered.
    pub response_text: String,
    /// Character that answered.
    pub character_id: CharacterId,
    /// Session the turn belongs to.
    pub session_id: SessionId,
    /// Scene label from the request.
    pub scene_context: String,
    /// Generation path; `None` for a greeting on empty input.
    pub route: Option<Route>,
    /// Synthesized audio, when requested and available.
    pub audio_url: Option<String>,
    /// Model that produced the text: a model name, `"fallback"` or `"greeting"`.
    pub model_used: String,
    /// Wall time spent on the turn.
    pub processing_time_ms: u64,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles a [`DialogueOrchestrator`] from explicitly constructed parts.
pub struct DialogueOrchestratorBuilder {
    personas: Arc<PersonaRegistry>,
    sessions: Arc<SessionStore>,
    retrieval: RetrievalGateway,
    generation: Arc<GenerationGateway>,
    promoter: Arc<LearningPromoter>,
    routing: RoutingPolicy,
    queue: Option<LearningQueue>,
    stt: Option<Arc<dyn SpeechToText>>,
    tts: Option<Arc<dyn TextToSpeech>>,
    counters: Option<Arc<DialogueCounters>>,
    max_facts: usize,
    synthesize_by_default: bool,
}

impl DialogueOrchestratorBuilder {
    /// Replace the default routing policy.
    #[must_use]
    pub fn routing(mut self, routing: RoutingPolicy) -> Self {
        self.routing = routing;
        self
    }

    /// Use an existing learning queue.
    #[must_use]
    pub fn learning_queue(mut self, queue: LearningQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Speech-to-text collaborator for audio turns.
    #[must_use]
    pub fn speech_to_text(mut self, stt: Arc<dyn SpeechToText>) -> Self {
        self.stt = Some(stt);
        self
    }

    /// Text-to-speech collaborator for spoken replies.
    #[must_use]
    pub fn text_to_speech(mut self, tts: Arc<dyn TextToSpeech>) -> Self {
        self.tts = Some(tts);
        self
    }

    /// Share counters with other components.
    #[must_use]
    pub fn counters(mut self, counters: Arc<DialogueCounters>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Facts requested on the retrieval path.
    #[must_use]
    pub fn max_facts(mut self, max_facts: usize) -> Self {
        self.max_facts = max_facts;
        self
    }

    /// Synthesize audio when the request does not say.
    #[must_use]
    pub fn synthesize_by_default(mut self, enabled: bool) -> Self {
        self.synthesize_by_default = enabled;
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> DialogueOrchestrator {
        DialogueOrchestrator {
            personas: self.personas,
            sessions: self.sessions,
            routing: self.routing,
            retrieval: self.retrieval,
            generation: self.generation,
            promoter: self.promoter,
            queue: self
                .queue
                .unwrap_or_else(|| LearningQueue::new(256, Duration::from_secs(300))),
            stt: self.stt,
            tts: self.tts,
            counters: self.counters.unwrap_or_default(),
            latency: TurnLatencyMonitor::new(),
            max_facts: self.max_facts,
            synthesize_by_default: self.synthesize_by_default,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs dialogue turns against injected components.
pub struct DialogueOrchestrator {
    personas: Arc<PersonaRegistry>,
    sessions: Arc<SessionStore>,
    routing: RoutingPolicy,
    retrieval: RetrievalGateway,
    generation: Arc<GenerationGateway>,
    promoter: Arc<LearningPromoter>,
    queue: LearningQueue,
    stt: Option<Arc<dyn SpeechToText>>,
    tts: Option<Arc<dyn TextToSpeech>>,
    counters: Arc<DialogueCounters>,
    latency: TurnLatencyMonitor,
    max_facts: usize,
    synthesize_by_default: bool,
}

impl DialogueOrchestrator {
    /// Start a builder from the mandatory components.
    #[must_use]
    pub fn builder(
        personas: Arc<PersonaRegistry>,
        sessions: Arc<SessionStore>,
        retrieval: RetrievalGateway,
        generation: Arc<GenerationGateway>,
        promoter: Arc<LearningPromoter>,
    ) -> DialogueOrchestratorBuilder {
        DialogueOrchestratorBuilder {
            personas,
            sessions,
            retrieval,
            generation,
            promoter,
            routing: RoutingPolicy::default(),
            queue: None,
            stt: None,
            tts: None,
            counters: None,
            max_facts: 3,
            synthesize_by_default: false,
        }
    }

    /// Wire every component from configuration.
    #[must_use]
    pub fn from_config(
        config: &ColloquyConfig,
        store: Arc<dyn KnowledgeStore>,
        backend: Arc<dyn CompletionBackend>,
    ) -> DialogueOrchestratorBuilder {
        let personas = Arc::new(PersonaRegistry::with_extra(&config.personas));
        let sessions = Arc::new(SessionStore::new(config.session.clone()));
        let retrieval = RetrievalGateway::new(Arc::clone(&store), &config.retrieval);
        let generation = Arc::new(GenerationGateway::new(
            backend,
            config.generation.clone(),
            &config.llm,
        ));
        let promoter = Arc::new(LearningPromoter::new(
            store,
            QualityEvaluator::new(&config.quality),
            config.learning.clone(),
        ));
        let queue = LearningQueue::new(
            config.learning.queue_capacity,
            Duration::from_secs(config.learning.job_deadline_secs),
        );

        Self::builder(personas, sessions, retrieval, generation, promoter)
            .routing(RoutingPolicy::new(&config.routing))
            .learning_queue(queue)
            .max_facts(config.retrieval.max_results)
            .synthesize_by_default(config.speech.synthesize_by_default)
    }

    /// Process one turn.
    ///
    /// # Errors
    /// Caller errors ([`DialogueError::UnknownCharacter`],
    /// [`DialogueError::EmptyAudio`], [`DialogueError::SessionCharacterMismatch`]),
    /// [`DialogueError::Transcription`] when speech-to-text fails, and
    /// [`DialogueError::Internal`] when the pipeline panics.
    pub async fn process_turn(&self, request: TurnRequest) -> Result<TurnResult> {
        let start = Instant::now();
        let span = tracing::info_span!(spans::TURN, character = %request.character_id);

        let outcome = AssertUnwindSafe(self.run_turn(request, start))
            .catch_unwind()
            .instrument(span)
            .await;

        let elapsed_ms = elapsed_ms(start);
        match outcome {
            Ok(Ok(result)) => {
                DialogueCounters::incr(&self.counters.turns);
                self.latency.record(elapsed_ms);
                Ok(result)
            }
            Ok(Err(e)) => {
                if e.is_caller_error() {
                    DialogueCounters::incr(&self.counters.caller_errors);
                }
                debug!(error = %e, elapsed_ms, "Turn rejected");
                Err(e)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(%message, elapsed_ms, "Dialogue processing failed");
                Err(DialogueError::Internal {
                    message,
                    elapsed_ms,
                })
            }
        }
    }

    async fn run_turn(&self, request: TurnRequest, start: Instant) -> Result<TurnResult> {
        let TurnRequest {
            character_id,
            input,
            session_id,
            scene_context,
            synthesize_speech,
        } = request;

        // Received
        let persona = self.personas.get(&character_id).ok_or_else(|| {
            DialogueError::UnknownCharacter {
                requested: character_id.clone(),
                available: self.personas.ids(),
            }
        })?;
        let transcript = self.read_input(input).await?;
        let session = self.resolve_session(&character_id, session_id.as_ref())?;
        let synthesize = synthesize_speech.unwrap_or(self.synthesize_by_default);

        if transcript.trim().is_empty() {
            debug!(session = %session.id(), "Empty input, answering with greeting");
            let audio_url = self
                .maybe_synthesize(synthesize, &character_id, &persona.greeting, session.id())
                .await;
            return Ok(TurnResult {
                transcript,
                response_text: persona.greeting.clone(),
                character_id,
                session_id: session.id().clone(),
                scene_context,
                route: None,
                audio_url,
                model_used: "greeting".to_string(),
                processing_time_ms: elapsed_ms(start),
            });
        }

        // Routed
        let decision = self.routing.decide(&transcript);
        let route = decision.route;
        match route {
            Route::Retrieval => DialogueCounters::incr(&self.counters.retrieval_routes),
            Route::Conversational => DialogueCounters::incr(&self.counters.conversational_routes),
        }
        debug!(%route, reason = %decision.reason, "Routed turn");

        // Generated
        let (facts, generated) = self.generate(persona, &session, &transcript, route).await;
        if generated.is_fallback() {
            DialogueCounters::incr(&self.counters.fallback_generations);
        }

        // Recorded
        let exchange = session.append_exchange(&transcript, &generated.text);

        // LearningConsidered
        if generated.is_fallback() {
            debug!("Fallback response, not considered for learning");
        } else if self.queue.enqueue(
            character_id.clone(),
            transcript.clone(),
            facts,
            generated.text.clone(),
        ) {
            DialogueCounters::incr(&self.counters.learning_enqueued);
        } else {
            DialogueCounters::incr(&self.counters.learning_dropped);
            warn!(session = %session.id(), "Learning queue full, job dropped");
        }

        // Done
        let audio_url = self
            .maybe_synthesize(synthesize, &character_id, &generated.text, session.id())
            .await;
        let processing_time_ms = elapsed_ms(start);
        info!(
            session = %session.id(),
            %route,
            model = %generated.model_used,
            sequence = exchange.sequence_number,
            processing_time_ms,
            "Turn complete"
        );

        Ok(TurnResult {
            transcript,
            response_text: generated.text,
            character_id,
            session_id: session.id().clone(),
            scene_context,
            route: Some(route),
            audio_url,
            model_used: generated.model_used,
            processing_time_ms,
        })
    }

    async fn read_input(&self, input: TurnInput) -> Result<String> {
        match input {
            TurnInput::Text(text) => Ok(text),
            TurnInput::Audio(audio) => {
                if audio.is_empty() {
                    return Err(DialogueError::EmptyAudio);
                }
                let stt = self.stt.as_ref().ok_or_else(|| {
                    DialogueError::Transcription(SpeechError::Unavailable(
                        "no speech-to-text service configured".into(),
                    ))
                })?;
                match stt.transcribe(&audio).await {
                    Ok(transcription) => {
                        debug!(
                            bytes = audio.len(),
                            language = %transcription.language,
                            "Transcribed audio"
                        );
                        Ok(transcription.transcript)
                    }
                    Err(e) => {
                        DialogueCounters::incr(&self.counters.stt_failures);
                        warn!(error = %e, "Transcription failed");
                        Err(DialogueError::Transcription(e))
                    }
                }
            }
        }
    }

    fn resolve_session(
        &self,
        character_id: &CharacterId,
        session_id: Option<&SessionId>,
    ) -> Result<SessionHandle> {
        let session = self.sessions.get_or_create(character_id, session_id);
        if session.character_id() != character_id {
            return Err(DialogueError::SessionCharacterMismatch {
                session_id: session.id().clone(),
                bound: session.character_id().clone(),
                requested: character_id.clone(),
            });
        }
        Ok(session)
    }

    async fn generate(
        &self,
        persona: &Persona,
        session: &SessionHandle,
        transcript: &str,
        route: Route,
    ) -> (Vec<RetrievedFact>, GeneratedResponse) {
        let history = session.recent_context(route.context_budget());
        match route {
            Route::Retrieval => {
                let facts = self
                    .retrieval
                    .retrieve(&persona.id, transcript, self.max_facts)
                    .instrument(tracing::debug_span!(spans::RETRIEVE))
                    .await;
                let generated = self
                    .generation
                    .generate(persona, transcript, Some(&facts), Some(&history))
                    .instrument(tracing::debug_span!(spans::GENERATE, %route))
                    .await;
                (facts, generated)
            }
            Route::Conversational => {
                let generated = self
                    .generation
                    .generate(persona, transcript, None, Some(&history))
                    .instrument(tracing::debug_span!(spans::GENERATE, %route))
                    .await;
                (Vec::new(), generated)
            }
        }
    }

    async fn maybe_synthesize(
        &self,
        requested: bool,
        character_id: &CharacterId,
        text: &str,
        session_id: &SessionId,
    ) -> Option<String> {
        if !requested {
            return None;
        }
        let tts = self.tts.as_ref()?;
        match tts.synthesize(character_id, text, session_id).await {
            Ok(speech) => Some(speech.audio_url),
            Err(e) => {
                DialogueCounters::incr(&self.counters.tts_failures);
                warn!(error = %e, "Speech synthesis failed, continuing without audio");
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Read and admin operations
    // -----------------------------------------------------------------------

    /// Current learning statistics.
    #[must_use]
    pub fn learning_statistics(&self) -> LearningStatisticsSnapshot {
        self.promoter.statistics().snapshot()
    }

    /// Shared statistics handle.
    #[must_use]
    pub fn learning_statistics_handle(&self) -> &Arc<LearningStatistics> {
        self.promoter.statistics()
    }

    /// Clear learning statistics.
    pub fn reset_learning_statistics(&self) {
        self.promoter.statistics().reset();
        info!("Learning statistics reset");
    }

    /// Registered characters.
    #[must_use]
    pub fn characters(&self) -> Vec<&Persona> {
        self.personas.iter().collect()
    }

    /// Session store statistics.
    #[must_use]
    pub fn session_stats(&self) -> SessionStats {
        self.sessions.stats()
    }

    /// The session store, for sweeping or inspection.
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Counter values.
    #[must_use]
    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    /// Turn latency percentiles.
    #[must_use]
    pub fn latency(&self) -> LatencyPercentiles {
        self.latency.percentiles()
    }

    /// Learning queue statistics.
    #[must_use]
    pub fn learning_queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// A worker draining this orchestrator's learning queue.
    #[must_use]
    pub fn learning_worker(&self) -> LearningWorker {
        LearningWorker::new(
            self.queue.clone(),
            Arc::clone(&self.promoter),
            Arc::clone(&self.counters),
        )
    }

    /// Stop accepting learning jobs; a spawned worker drains and exits.
    pub fn shutdown_learning(&self) {
        self.queue.close();
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
