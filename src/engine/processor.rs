//! The backtracking stream processor.
//!
//! [`TurnEngine`] drives one user turn end to end: it opens a streaming
//! generation, routes every delta through a fresh [`SignalParser`], and
//! reacts to the parsed events. Text accumulates and is forwarded to the
//! sink; a checkpoint updates the in-turn registry; an honoured backtrack
//! cancels the stream, truncates the accumulated response to the named
//! checkpoint, records a hint, and re-enters the retry loop.
//!
//! # Event Flow
//!
//! ```text
//! 1. Append the user message to committed history (optimistic)
//! 2. Compose messages + system prompt, open a stream
//! 3. Parse deltas: Text -> accumulate + on_text
//!                  Checkpoint -> register (spacing policy)
//!                  Backtrack -> cancel, rewind, on_backtrack, retry from 2
//! 4. Clean end: flush parser, commit response, on_done
//! 5. Provider failure: roll back the user message, on_error
//! ```
//!
//! Budget exhaustion and semantic violations (unknown checkpoint ID, unknown
//! mode, out-of-range temperature, spacing) are soft: the offending marker
//! or field is ignored and the stream continues.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::config::SelkieConfig;
use crate::error::Result;
use crate::history::ConversationHistory;
use crate::provider::{InferenceAdapter, Message};
use crate::signal::grammar::{BacktrackSignal, SignalEvent};
use crate::signal::parser::SignalParser;

use super::context::RunContext;
use super::prompt::build_system_prompt;

/// The ephemeral user directive appended after the preserved response prefix
/// when a retry request is composed. Never committed to history.
pub const CONTINUE_PROMPT: &str = "Continue directly from where you left off.";

/// Callbacks a turn delivers to the surrounding application.
///
/// All methods are async; synchronous implementations simply return ready
/// futures. Between an `on_backtrack` call and the next `on_text`, no other
/// event is delivered, so the application may re-render the response as the
/// given prefix and then append subsequent chunks.
#[async_trait]
pub trait TurnSink: Send + Sync {
    /// A visible-text chunk has been produced.
    async fn on_text(&self, segment: &str);

    /// A rewind just took effect; `new_visible` is the authoritative new
    /// user-visible text.
    async fn on_backtrack(&self, signal: &BacktrackSignal, new_visible: &str);

    /// A fatal provider error occurred and the turn has been rolled back.
    async fn on_error(&self, message: &str);

    /// The turn completed normally and `full_text` has been committed.
    async fn on_done(&self, full_text: &str);
}

/// Orchestrates inference, signal parsing, and checkpoint state for a
/// conversation.
///
/// The engine owns the committed history exclusively; it is mutated only
/// between turns (append user, run, commit assistant or roll back).
pub struct TurnEngine {
    config: SelkieConfig,
    adapter: Arc<dyn InferenceAdapter>,
    history: ConversationHistory,
}

impl TurnEngine {
    /// Create an engine over the given adapter with an empty history.
    pub fn new(config: SelkieConfig, adapter: Arc<dyn InferenceAdapter>) -> Self {
        Self {
            config,
            adapter,
            history: ConversationHistory::new(),
        }
    }

    /// The committed conversation history.
    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Run one user turn to completion.
    ///
    /// Returns the committed assistant text on clean completion.
    ///
    /// # Errors
    ///
    /// Returns the provider error after delivering it via
    /// [`TurnSink::on_error`] and rolling the user message back out of
    /// history. Marker malformation and semantic violations are recovered
    /// internally and never surface here.
    pub async fn run(&mut self, user_message: &str, sink: &dyn TurnSink) -> Result<String> {
        self.history.push_user(user_message);
        let mut ctx = RunContext::new(self.config.default_mode, self.config.min_spacing);

        'retry: loop {
            let messages = self.compose_messages(&ctx);
            let temperature = ctx.effective_temperature(&self.config.temperatures);
            let system_prompt = build_system_prompt(
                &ctx.hints,
                ctx.mode,
                temperature,
                self.config.hint_max_len,
            );

            tracing::debug!(
                iteration = ctx.rewinds_used,
                mode = %ctx.mode,
                temperature,
                "requesting generation"
            );

            let mut stream = match self
                .adapter
                .stream(&messages, &system_prompt, temperature)
                .await
            {
                Ok(stream) => stream,
                Err(err) => return self.abort_turn(err, sink).await,
            };

            // A fresh parser per iteration defends against any delta from a
            // cancelled stream touching the new attempt's state.
            let mut parser = SignalParser::new();
            let mut rewound = false;

            while let Some(item) = stream.next().await {
                let delta = match item {
                    Ok(delta) => delta,
                    Err(err) => return self.abort_turn(err, sink).await,
                };

                for event in parser.push(&delta) {
                    match event {
                        SignalEvent::Text(text) => {
                            ctx.append_text(&text);
                            sink.on_text(&text).await;
                        }
                        SignalEvent::Checkpoint(id) => {
                            ctx.register_checkpoint(&id, self.config.min_spacing);
                        }
                        SignalEvent::Backtrack(signal) => {
                            if self.try_rewind(&mut ctx, &signal).await {
                                sink.on_backtrack(&signal, &ctx.visible).await;
                                rewound = true;
                                break;
                            }
                        }
                    }
                }

                if rewound {
                    break;
                }
            }

            if rewound {
                continue 'retry;
            }

            // Clean end-of-stream: surface any partially buffered marker as
            // literal text.
            for event in parser.flush() {
                if let SignalEvent::Text(text) = event {
                    ctx.append_text(&text);
                    sink.on_text(&text).await;
                }
            }

            break 'retry;
        }

        self.history.push_assistant(&ctx.visible);
        sink.on_done(&ctx.visible).await;
        Ok(ctx.visible)
    }

    /// Apply a backtrack if policy allows, cancelling the active stream
    /// first. Returns whether the rewind took effect.
    async fn try_rewind(&self, ctx: &mut RunContext, signal: &BacktrackSignal) -> bool {
        if ctx.rewinds_used >= self.config.max_rewinds {
            tracing::debug!(
                id = %signal.id,
                rewinds_used = ctx.rewinds_used,
                "rewind budget exhausted, backtrack ignored"
            );
            return false;
        }
        let Some(record) = ctx.checkpoints.get(&signal.id).cloned() else {
            tracing::debug!(id = %signal.id, "backtrack to unknown checkpoint, ignored");
            return false;
        };

        // Awaiting cancel guarantees no further delta from the old stream.
        self.adapter.cancel().await;
        ctx.rewind_to(&record, signal);

        tracing::info!(
            id = %signal.id,
            reason = %signal.reason,
            rewinds_used = ctx.rewinds_used,
            "rewound to checkpoint"
        );
        true
    }

    /// Compose the outgoing message list for the next iteration.
    ///
    /// On the first iteration of a fresh turn the raw accumulator is empty
    /// and only the committed history is sent. After a rewind, the preserved
    /// prefix travels as an ephemeral assistant message (markers intact, so
    /// the model sees which checkpoints still exist) followed by the
    /// continue directive.
    fn compose_messages(&self, ctx: &RunContext) -> Vec<Message> {
        let mut messages = self.history.messages().to_vec();
        if !ctx.raw.is_empty() {
            messages.push(Message::assistant(&ctx.raw));
            messages.push(Message::user(CONTINUE_PROMPT));
        }
        messages
    }

    /// Roll back the optimistic user append and report the failure.
    async fn abort_turn<T>(
        &mut self,
        err: crate::error::SelkieError,
        sink: &dyn TurnSink,
    ) -> Result<T> {
        tracing::warn!(
            error = %err,
            mid_stream = err.occurred_mid_stream(),
            "provider failure, rolling back turn"
        );
        self.history.rollback_user();
        sink.on_error(&err.to_string()).await;
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SelkieError;
    use crate::provider::{DeltaStream, Role};
    use crate::signal::grammar::CognitiveMode;

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    // ── Scripted adapter ─────────────────────────────────────

    /// One recorded `stream` call.
    #[derive(Debug, Clone)]
    struct RecordedCall {
        messages: Vec<Message>,
        system_prompt: String,
        temperature: f64,
    }

    /// Adapter that pops a scripted delta list per `stream` call and records
    /// every call and cancel.
    struct ScriptedAdapter {
        responses: Mutex<Vec<Vec<String>>>,
        calls: Mutex<Vec<RecordedCall>>,
        cancels: AtomicU32,
    }

    impl ScriptedAdapter {
        fn new(responses: Vec<Vec<&str>>) -> Self {
            Self {
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .map(|deltas| deltas.into_iter().map(String::from).collect())
                        .collect(),
                ),
                calls: Mutex::new(Vec::new()),
                cancels: AtomicU32::new(0),
            }
        }

        fn cancel_count(&self) -> u32 {
            self.cancels.load(Ordering::Relaxed)
        }

        fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }
    }

    #[async_trait]
    impl InferenceAdapter for ScriptedAdapter {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn stream(
            &self,
            messages: &[Message],
            system_prompt: &str,
            temperature: f64,
        ) -> Result<DeltaStream> {
            self.calls
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(RecordedCall {
                    messages: messages.to_vec(),
                    system_prompt: system_prompt.to_string(),
                    temperature,
                });
            let deltas = {
                let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
                if responses.is_empty() {
                    Vec::new()
                } else {
                    responses.remove(0)
                }
            };
            let items: Vec<Result<String>> = deltas.into_iter().map(Ok).collect();
            Ok(Box::pin(futures_util::stream::iter(items)))
        }

        async fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Adapter whose `stream` call fails outright.
    struct FailingAdapter;

    #[async_trait]
    impl InferenceAdapter for FailingAdapter {
        fn name(&self) -> &str {
            "failing"
        }

        async fn stream(
            &self,
            _messages: &[Message],
            _system_prompt: &str,
            _temperature: f64,
        ) -> Result<DeltaStream> {
            Err(SelkieError::Request("connection refused".into()))
        }

        async fn cancel(&self) {}
    }

    /// Adapter that yields some text and then a stream-level error.
    struct MidStreamFailureAdapter;

    #[async_trait]
    impl InferenceAdapter for MidStreamFailureAdapter {
        fn name(&self) -> &str {
            "mid-stream-failure"
        }

        async fn stream(
            &self,
            _messages: &[Message],
            _system_prompt: &str,
            _temperature: f64,
        ) -> Result<DeltaStream> {
            let items: Vec<Result<String>> = vec![
                Ok("partial".to_string()),
                Err(SelkieError::StreamInterrupted("connection reset".into())),
            ];
            Ok(Box::pin(futures_util::stream::iter(items)))
        }

        async fn cancel(&self) {}
    }

    // ── Collecting sink ──────────────────────────────────────

    /// Everything a turn delivered, in order.
    #[derive(Debug, Clone, PartialEq)]
    enum SinkEvent {
        Text(String),
        Backtrack { reason: String, new_visible: String },
        Error(String),
        Done(String),
    }

    #[derive(Default)]
    struct CollectingSink {
        events: Mutex<Vec<SinkEvent>>,
    }

    impl CollectingSink {
        fn events(&self) -> Vec<SinkEvent> {
            self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }

        fn text(&self) -> String {
            self.events()
                .iter()
                .filter_map(|e| match e {
                    SinkEvent::Text(t) => Some(t.as_str()),
                    _ => None,
                })
                .collect()
        }

        fn backtracks(&self) -> usize {
            self.events()
                .iter()
                .filter(|e| matches!(e, SinkEvent::Backtrack { .. }))
                .count()
        }
    }

    #[async_trait]
    impl TurnSink for CollectingSink {
        async fn on_text(&self, segment: &str) {
            self.events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(SinkEvent::Text(segment.to_string()));
        }

        async fn on_backtrack(&self, signal: &BacktrackSignal, new_visible: &str) {
            self.events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(SinkEvent::Backtrack {
                    reason: signal.reason.clone(),
                    new_visible: new_visible.to_string(),
                });
        }

        async fn on_error(&self, message: &str) {
            self.events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(SinkEvent::Error(message.to_string()));
        }

        async fn on_done(&self, full_text: &str) {
            self.events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(SinkEvent::Done(full_text.to_string()));
        }
    }

    fn engine_with(
        adapter: Arc<dyn InferenceAdapter>,
        configure: impl FnOnce(&mut SelkieConfig),
    ) -> TurnEngine {
        let mut config = SelkieConfig::default();
        configure(&mut config);
        TurnEngine::new(config, adapter)
    }

    // ── Clean completion ─────────────────────────────────────

    #[tokio::test]
    async fn clean_completion_commits_response() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![vec!["Hello, world."]]));
        let mut engine = engine_with(adapter.clone(), |_| {});
        let sink = CollectingSink::default();

        let result = engine.run("Hi", &sink).await;
        assert!(result.is_ok_and(|text| text == "Hello, world."));
        assert_eq!(sink.text(), "Hello, world.");
        assert_eq!(sink.backtracks(), 0);
        assert_eq!(adapter.cancel_count(), 0);

        let history = engine.history().messages();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "Hello, world.");
    }

    #[tokio::test]
    async fn markers_are_invisible_to_the_user() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![vec![
            "<<checkpoint:a>>A",
            "B",
            "C",
        ]]));
        let mut engine = engine_with(adapter, |_| {});
        let sink = CollectingSink::default();

        let result = engine.run("Hi", &sink).await;
        assert!(result.is_ok_and(|text| text == "ABC"));
        assert_eq!(sink.text(), "ABC");
    }

    // ── Rewinds ──────────────────────────────────────────────

    #[tokio::test]
    async fn honoured_rewind_discards_and_retries() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![
            vec!["<<checkpoint:a>>Wrong.", "<<backtrack:a|too blunt>>Right."],
            vec!["Right."],
        ]));
        let mut engine = engine_with(adapter.clone(), |_| {});
        let sink = CollectingSink::default();

        let result = engine.run("Hi", &sink).await;
        assert!(result.is_ok_and(|text| text == "Right."));
        assert_eq!(adapter.cancel_count(), 1);
        assert_eq!(sink.backtracks(), 1);

        // The text trailing the backtrack marker in the cancelled stream
        // never reaches the sink.
        let events = sink.events();
        assert_eq!(
            events,
            vec![
                SinkEvent::Text("Wrong.".into()),
                SinkEvent::Backtrack {
                    reason: "too blunt".into(),
                    new_visible: String::new(),
                },
                SinkEvent::Text("Right.".into()),
                SinkEvent::Done("Right.".into()),
            ]
        );
    }

    #[tokio::test]
    async fn rewind_to_mid_response_checkpoint_keeps_prefix() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![
            vec!["Intro. <<checkpoint:body>>Bad body.<<backtrack:body|weak>>"],
            vec!["Good body."],
        ]));
        let mut engine = engine_with(adapter, |c| c.min_spacing = 0);
        let sink = CollectingSink::default();

        let result = engine.run("Hi", &sink).await;
        assert!(result.is_ok_and(|text| text == "Intro. Good body."));

        let events = sink.events();
        assert!(events.contains(&SinkEvent::Backtrack {
            reason: "weak".into(),
            new_visible: "Intro. ".into(),
        }));
    }

    #[tokio::test]
    async fn unknown_checkpoint_id_is_ignored() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![vec![
            "<<checkpoint:a>>Hi.",
            "<<backtrack:nope|bad>>Bye.",
        ]]));
        let mut engine = engine_with(adapter.clone(), |_| {});
        let sink = CollectingSink::default();

        let result = engine.run("Hi", &sink).await;
        assert!(result.is_ok_and(|text| text == "Hi.Bye."));
        assert_eq!(sink.backtracks(), 0);
        assert_eq!(adapter.cancel_count(), 0);
    }

    #[tokio::test]
    async fn rewind_budget_is_a_ceiling() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![
            vec!["<<checkpoint:a>>One."],
            vec!["<<backtrack:a|r1>>Two."],
            vec!["<<backtrack:a|r2>>Three."],
            vec!["<<backtrack:a|r3>>Four."],
            vec!["<<backtrack:a|r4>>Five."],
        ]));
        let mut engine = engine_with(adapter.clone(), |c| c.max_rewinds = 3);
        let sink = CollectingSink::default();

        let result = engine.run("Hi", &sink).await;
        // The fourth backtrack is over budget: ignored silently, the stream
        // continues, and its text is kept.
        assert!(result.is_ok_and(|text| text == "Five."));
        assert_eq!(sink.backtracks(), 3);
        assert_eq!(adapter.cancel_count(), 3);
    }

    #[tokio::test]
    async fn repeated_rewinds_to_same_checkpoint_are_allowed() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![
            vec!["<<checkpoint:a>>x<<backtrack:a|first>>"],
            vec!["<<backtrack:a|second>>"],
            vec!["Settled."],
        ]));
        let mut engine = engine_with(adapter, |c| c.min_spacing = 0);
        let sink = CollectingSink::default();

        let result = engine.run("Hi", &sink).await;
        assert!(result.is_ok_and(|text| text == "Settled."));
        assert_eq!(sink.backtracks(), 2);
    }

    // ── Spacing policy ───────────────────────────────────────

    #[tokio::test]
    async fn checkpoint_too_close_to_last_marker_is_ignored() {
        // `b` lands 5 characters after `a` with min_spacing 30, so it never
        // registers and the later backtrack to it is unknown.
        let adapter = Arc::new(ScriptedAdapter::new(vec![vec![
            "<<checkpoint:a>>12345<<checkpoint:b>>rest<<backtrack:b|r>>tail",
        ]]));
        let mut engine = engine_with(adapter.clone(), |_| {});
        let sink = CollectingSink::default();

        let result = engine.run("Hi", &sink).await;
        assert!(result.is_ok_and(|text| text == "12345resttail"));
        assert_eq!(sink.backtracks(), 0);
        assert_eq!(adapter.cancel_count(), 0);
    }

    #[tokio::test]
    async fn first_checkpoint_of_a_turn_is_always_eligible() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![
            vec!["<<checkpoint:a>>bad<<backtrack:a|r>>"],
            vec!["good"],
        ]));
        let mut engine = engine_with(adapter, |c| c.min_spacing = 30);
        let sink = CollectingSink::default();

        let result = engine.run("Hi", &sink).await;
        assert!(result.is_ok_and(|text| text == "good"));
        assert_eq!(sink.backtracks(), 1);
    }

    // ── Continuation protocol ────────────────────────────────

    #[tokio::test]
    async fn first_iteration_sends_only_committed_history() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![vec!["ok"]]));
        let mut engine = engine_with(adapter.clone(), |_| {});
        let sink = CollectingSink::default();

        let _ = engine.run("question", &sink).await;
        let calls = adapter.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].messages.len(), 1);
        assert_eq!(calls[0].messages[0].content, "question");
    }

    #[tokio::test]
    async fn retry_carries_raw_prefix_and_continue_directive() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![
            vec!["Intro. <<checkpoint:a>>bad<<backtrack:a|r>>"],
            vec!["good"],
        ]));
        let mut engine = engine_with(adapter.clone(), |c| c.min_spacing = 0);
        let sink = CollectingSink::default();

        let _ = engine.run("question", &sink).await;
        let calls = adapter.calls();
        assert_eq!(calls.len(), 2);

        let retry = &calls[1].messages;
        assert_eq!(retry.len(), 3);
        assert_eq!(retry[0].content, "question");
        assert_eq!(retry[1].role, Role::Assistant);
        // The preserved prefix keeps the checkpoint marker so the model sees
        // which rewind points still exist.
        assert_eq!(retry[1].content, "Intro. <<checkpoint:a>>");
        assert_eq!(retry[2].role, Role::User);
        assert_eq!(retry[2].content, CONTINUE_PROMPT);
    }

    #[tokio::test]
    async fn ephemeral_continuation_messages_are_never_committed() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![
            vec!["<<checkpoint:a>>bad<<backtrack:a|r>>"],
            vec!["good"],
        ]));
        let mut engine = engine_with(adapter, |c| c.min_spacing = 0);
        let sink = CollectingSink::default();

        let _ = engine.run("question", &sink).await;
        let history = engine.history().messages();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "question");
        assert_eq!(history[1].content, "good");
    }

    // ── Mode and temperature adoption ────────────────────────

    #[tokio::test]
    async fn rewind_adopts_requested_mode_temperature() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![
            vec!["<<checkpoint:a>>bad<<backtrack:a|r|mode:precise>>"],
            vec!["good"],
        ]));
        let mut engine = engine_with(adapter.clone(), |c| c.min_spacing = 0);
        let sink = CollectingSink::default();

        let _ = engine.run("q", &sink).await;
        let calls = adapter.calls();
        assert_eq!(calls[0].temperature, 0.6);
        assert_eq!(calls[1].temperature, 0.2);
        assert!(calls[1].system_prompt.contains("Current mode: precise"));
    }

    #[tokio::test]
    async fn rewind_explicit_temperature_beats_mode() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![
            vec!["<<checkpoint:a>>bad<<backtrack:a|r|mode:precise|temp:0.95>>"],
            vec!["good"],
        ]));
        let mut engine = engine_with(adapter.clone(), |c| c.min_spacing = 0);
        let sink = CollectingSink::default();

        let _ = engine.run("q", &sink).await;
        let calls = adapter.calls();
        assert_eq!(calls[1].temperature, 0.95);
    }

    #[tokio::test]
    async fn out_of_range_temperature_falls_back_to_mode() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![
            vec!["<<checkpoint:a>>bad<<backtrack:a|r|mode:exploratory|temp:5.0>>"],
            vec!["good"],
        ]));
        let mut engine = engine_with(adapter.clone(), |c| c.min_spacing = 0);
        let sink = CollectingSink::default();

        let _ = engine.run("q", &sink).await;
        let calls = adapter.calls();
        assert_eq!(calls[1].temperature, 0.9);
    }

    // ── Hints ────────────────────────────────────────────────

    #[tokio::test]
    async fn hints_accumulate_within_a_turn() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![
            vec!["<<checkpoint:a>>x<<backtrack:a|too vague>>"],
            vec!["<<backtrack:a|wrong tone>>"],
            vec!["done"],
        ]));
        let mut engine = engine_with(adapter.clone(), |c| c.min_spacing = 0);
        let sink = CollectingSink::default();

        let _ = engine.run("q", &sink).await;
        let calls = adapter.calls();
        assert_eq!(calls.len(), 3);
        assert!(!calls[0].system_prompt.contains("too vague"));
        assert!(calls[1].system_prompt.contains("too vague"));
        assert!(calls[2].system_prompt.contains("too vague"));
        assert!(calls[2].system_prompt.contains("wrong tone"));
    }

    #[tokio::test]
    async fn hints_reset_between_turns() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![
            vec!["<<checkpoint:a>>x<<backtrack:a|stale hint>>"],
            vec!["first answer"],
            vec!["second answer"],
        ]));
        let mut engine = engine_with(adapter.clone(), |c| c.min_spacing = 0);
        let sink = CollectingSink::default();

        let _ = engine.run("first", &sink).await;
        let _ = engine.run("second", &sink).await;

        let calls = adapter.calls();
        assert_eq!(calls.len(), 3);
        assert!(!calls[2].system_prompt.contains("stale hint"));
    }

    // ── Provider failure ─────────────────────────────────────

    #[tokio::test]
    async fn request_failure_rolls_back_history() {
        let mut engine = engine_with(Arc::new(FailingAdapter), |_| {});
        let sink = CollectingSink::default();

        let result = engine.run("doomed", &sink).await;
        assert!(result.is_err());
        assert!(engine.history().is_empty());

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], SinkEvent::Error(m) if m.contains("connection refused")));
    }

    #[tokio::test]
    async fn mid_stream_failure_rolls_back_history() {
        let mut engine = engine_with(Arc::new(MidStreamFailureAdapter), |_| {});
        let sink = CollectingSink::default();

        let result = engine.run("doomed", &sink).await;
        assert!(result.is_err());
        assert!(engine.history().is_empty());

        let events = sink.events();
        // The partial text was forwarded before the failure surfaced.
        assert_eq!(events[0], SinkEvent::Text("partial".into()));
        assert!(matches!(&events[1], SinkEvent::Error(_)));
        assert!(!events.iter().any(|e| matches!(e, SinkEvent::Done(_))));
    }

    #[tokio::test]
    async fn failure_preserves_prior_committed_turns() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![vec!["fine"]]));
        let mut engine = engine_with(adapter, |_| {});
        let sink = CollectingSink::default();
        let _ = engine.run("good turn", &sink).await;
        assert_eq!(engine.history().len(), 2);

        engine.adapter = Arc::new(FailingAdapter);
        let result = engine.run("bad turn", &sink).await;
        assert!(result.is_err());
        assert_eq!(engine.history().len(), 2);
    }

    // ── Marker split across deltas ───────────────────────────

    #[tokio::test]
    async fn marker_split_across_deltas_is_recognised() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![
            vec!["<<check", "point:a>>bad", "<<backtrack:a|sp", "lit>>"],
            vec!["good"],
        ]));
        let mut engine = engine_with(adapter, |c| c.min_spacing = 0);
        let sink = CollectingSink::default();

        let result = engine.run("q", &sink).await;
        assert!(result.is_ok_and(|text| text == "good"));
        assert_eq!(sink.backtracks(), 1);
    }

    #[tokio::test]
    async fn partial_marker_at_stream_end_is_flushed_as_text() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![vec!["answer<<backtra"]]));
        let mut engine = engine_with(adapter, |_| {});
        let sink = CollectingSink::default();

        let result = engine.run("q", &sink).await;
        assert!(result.is_ok_and(|text| text == "answer<<backtra"));
    }

    #[tokio::test]
    async fn default_mode_comes_from_config() {
        let adapter = Arc::new(ScriptedAdapter::new(vec![vec!["ok"]]));
        let mut engine = engine_with(adapter.clone(), |c| {
            c.default_mode = CognitiveMode::Exploratory;
        });
        let sink = CollectingSink::default();

        let _ = engine.run("q", &sink).await;
        let calls = adapter.calls();
        assert_eq!(calls[0].temperature, 0.9);
        assert!(calls[0].system_prompt.contains("Current mode: exploratory"));
    }
}
