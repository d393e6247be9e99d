//! Runtime metrics for the dialogue engine.
//!
//! Lock-free `AtomicU64` counters for the hot path, plus a small latency
//! window behind a `parking_lot::Mutex` that is only read on export.
//! Counters render as Prometheus text for scraping.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Atomic counters incremented by the orchestrator and the learning worker.
#[derive(Debug)]
pub struct DialogueCounters {
    /// Turns that produced a result (greetings included).
    pub turns: AtomicU64,
    /// Turns routed through retrieval.
    pub retrieval_routes: AtomicU64,
    /// Turns routed to plain conversation.
    pub conversational_routes: AtomicU64,
    /// Responses that fell back to the persona greeting.
    pub fallback_generations: AtomicU64,
    /// Requests rejected as caller errors.
    pub caller_errors: AtomicU64,
    /// Transcription failures.
    pub stt_failures: AtomicU64,
    /// Synthesis failures.
    pub tts_failures: AtomicU64,
    /// Learning jobs accepted by the queue.
    pub learning_enqueued: AtomicU64,
    /// Learning jobs dropped because the queue was full.
    pub learning_dropped: AtomicU64,
    /// Facts promoted into the store.
    pub promotions: AtomicU64,
}

impl DialogueCounters {
    /// Zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            turns: AtomicU64::new(0),
            retrieval_routes: AtomicU64::new(0),
            conversational_routes: AtomicU64::new(0),
            fallback_generations: AtomicU64::new(0),
            caller_errors: AtomicU64::new(0),
            stt_failures: AtomicU64::new(0),
            tts_failures: AtomicU64::new(0),
            learning_enqueued: AtomicU64::new(0),
            learning_dropped: AtomicU64::new(0),
            promotions: AtomicU64::new(0),
        }
    }

    /// Increment a counter by one.
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters for export.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            turns: self.turns.load(Ordering::Relaxed),
            retrieval_routes: self.retrieval_routes.load(Ordering::Relaxed),
            conversational_routes: self.conversational_routes.load(Ordering::Relaxed),
            fallback_generations: self.fallback_generations.load(Ordering::Relaxed),
            caller_errors: self.caller_errors.load(Ordering::Relaxed),
            stt_failures: self.stt_failures.load(Ordering::Relaxed),
            tts_failures: self.tts_failures.load(Ordering::Relaxed),
            learning_enqueued: self.learning_enqueued.load(Ordering::Relaxed),
            learning_dropped: self.learning_dropped.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
        }
    }
}

impl Default for DialogueCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter values at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    /// Completed turns.
    pub turns: u64,
    /// Retrieval-routed turns.
    pub retrieval_routes: u64,
    /// Conversational turns.
    pub conversational_routes: u64,
    /// Fallback responses.
    pub fallback_generations: u64,
    /// Caller errors.
    pub caller_errors: u64,
    /// Transcription failures.
    pub stt_failures: u64,
    /// Synthesis failures.
    pub tts_failures: u64,
    /// Learning jobs enqueued.
    pub learning_enqueued: u64,
    /// Learning jobs dropped.
    pub learning_dropped: u64,
    /// Promoted facts.
    pub promotions: u64,
}

impl CounterSnapshot {
    /// Format as Prometheus-compatible text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let rows: [(&str, &str, String); 8] = [
            ("colloquy_turns_total", "Dialogue turns completed", self.turns.to_string()),
            (
                "colloquy_routes_total",
                "Turns by generation route",
                format!(
                    "colloquy_routes_total{{route=\"retrieval\"}} {}\n\
                     colloquy_routes_total{{route=\"conversational\"}} {}",
                    self.retrieval_routes, self.conversational_routes
                ),
            ),
            (
                "colloquy_fallback_generations_total",
                "Responses replaced by the persona greeting",
                self.fallback_generations.to_string(),
            ),
            (
                "colloquy_caller_errors_total",
                "Requests rejected as caller errors",
                self.caller_errors.to_string(),
            ),
            (
                "colloquy_speech_failures_total",
                "Speech collaborator failures",
                format!(
                    "colloquy_speech_failures_total{{kind=\"stt\"}} {}\n\
                     colloquy_speech_failures_total{{kind=\"tts\"}} {}",
                    self.stt_failures, self.tts_failures
                ),
            ),
            (
                "colloquy_learning_enqueued_total",
                "Learning jobs enqueued",
                self.learning_enqueued.to_string(),
            ),
            (
                "colloquy_learning_dropped_total",
                "Learning jobs dropped on a full queue",
                self.learning_dropped.to_string(),
            ),
            (
                "colloquy_promotions_total",
                "Facts promoted into the knowledge store",
                self.promotions.to_string(),
            ),
        ];

        let mut out = String::new();
        for (name, help, value) in rows {
            out.push_str(&format!("# HELP {name} {help}\n# TYPE {name} counter\n"));
            if value.starts_with(name) {
                out.push_str(&value);
            } else {
                out.push_str(&format!("{name} {value}"));
            }
            out.push('\n');
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Turn latency window
// ---------------------------------------------------------------------------

const LATENCY_WINDOW: usize = 256;

/// Ring buffer of recent turn latencies.
pub struct TurnLatencyMonitor {
    history: Mutex<LatencyHistory>,
}

struct LatencyHistory {
    timings: Vec<u64>,
    write_idx: usize,
    count: u64,
}

/// Percentiles over the latency window, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LatencyPercentiles {
    /// Median.
    pub p50: u64,
    /// 95th percentile.
    pub p95: u64,
    /// 99th percentile.
    pub p99: u64,
    /// Slowest observed.
    pub max: u64,
}

impl TurnLatencyMonitor {
    /// Empty monitor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            history: Mutex::new(LatencyHistory {
                timings: vec![0; LATENCY_WINDOW],
                write_idx: 0,
                count: 0,
            }),
        }
    }

    /// Record one turn's processing time.
    pub fn record(&self, ms: u64) {
        let mut h = self.history.lock();
        let idx = h.write_idx;
        h.timings[idx] = ms;
        h.write_idx = (idx + 1) % LATENCY_WINDOW;
        h.count += 1;
    }

    /// Turns recorded since startup.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.history.lock().count
    }

    /// Percentiles over the retained window.
    #[must_use]
    pub fn percentiles(&self) -> LatencyPercentiles {
        let h = self.history.lock();
        let n = usize::try_from(h.count).map_or(LATENCY_WINDOW, |c| c.min(LATENCY_WINDOW));
        if n == 0 {
            return LatencyPercentiles::default();
        }

        let mut sorted = h.timings[..n].to_vec();
        drop(h);
        sorted.sort_unstable();

        let at = |q: usize| sorted[(n * q / 100).min(n - 1)];
        LatencyPercentiles {
            p50: at(50),
            p95: at(95),
            p99: at(99),
            max: sorted[n - 1],
        }
    }
}

impl Default for TurnLatencyMonitor {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Span names
// ---------------------------------------------------------------------------

/// Span names used with `tracing::span!`.
pub mod spans {
    /// One dialogue turn.
    pub const TURN: &str = "colloquy::turn";
    /// Knowledge retrieval.
    pub const RETRIEVE: &str = "colloquy::retrieve";
    /// LLM generation.
    pub const GENERATE: &str = "colloquy::generate";
    /// Learning consideration.
    pub const LEARN: &str = "colloquy::learn";
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
