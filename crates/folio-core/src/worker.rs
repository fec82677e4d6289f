//! The worker actor.
//!
//! One task owns all worker state and processes inbound messages one at a time.
//! Simulated waits run in spawned tasks that report back through an internal
//! event channel, so new messages are handled while earlier ones are still
//! waiting. Nothing outside the actor mutates state, and every message to the
//! host is sent from the actor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::agent::{AgentOutcome, AgentRun, AgentSlot};
use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::inference::{compute_cost, InferenceJob, InferenceSlot};
use crate::model::{IntentModel, IntentModelLoader, ModelState, ModelTier};
use crate::protocol::{AgentStatus, Inbound, ModelStatus, Outbound};

/// Counters for requests the worker drops without replying
#[derive(Debug, Default)]
pub struct WorkerStats {
    dropped_inferences: AtomicU64,
    ignored_agent_starts: AtomicU64,
    ignored_messages: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// `infer` requests dropped because one was already in flight
    pub dropped_inferences: u64,
    /// `agent-start` requests dropped because a run was active
    pub ignored_agent_starts: u64,
    /// Unknown or unparseable messages
    pub ignored_messages: u64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            dropped_inferences: self.dropped_inferences.load(Ordering::Relaxed),
            ignored_agent_starts: self.ignored_agent_starts.load(Ordering::Relaxed),
            ignored_messages: self.ignored_messages.load(Ordering::Relaxed),
        }
    }
}

/// Host-side handle. Cloneable; the worker stops once every handle is dropped.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    tx: mpsc::UnboundedSender<Inbound>,
    stats: Arc<WorkerStats>,
}

impl WorkerHandle {
    pub fn send(&self, message: Inbound) -> Result<()> {
        self.tx.send(message).map_err(|_| Error::WorkerClosed)
    }

    /// Parse a JSON frame and forward it. Frames that are not JSON objects are
    /// counted as ignored and dropped, matching unknown message types.
    pub fn send_json(&self, frame: &str) -> Result<()> {
        match Inbound::from_json(frame) {
            Ok(message) => self.send(message),
            Err(e) => {
                if self.tx.is_closed() {
                    return Err(Error::WorkerClosed);
                }
                debug!("Ignoring unparseable frame: {}", e);
                self.stats.ignored_messages.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Completion notices from spawned tasks back to the actor
#[derive(Debug)]
enum WorkerEvent {
    TinyLoaded(IntentModel),
    FullLoaded,
    InferenceDone(InferenceJob),
    AgentOutput {
        generation: u64,
        message: Outbound,
    },
    AgentFinished {
        generation: u64,
        outcome: AgentOutcome,
    },
}

pub struct Worker {
    config: WorkerConfig,
    loader: IntentModelLoader,
    models: ModelState,
    intent_model: Option<Arc<IntentModel>>,
    inference: InferenceSlot,
    agent: AgentSlot,
    next_generation: u64,
    stats: Arc<WorkerStats>,
    outbound: mpsc::UnboundedSender<Outbound>,
    events_tx: mpsc::UnboundedSender<WorkerEvent>,
    events_rx: mpsc::UnboundedReceiver<WorkerEvent>,
}

impl Worker {
    /// Start a worker on the current tokio runtime.
    pub fn spawn(
        config: WorkerConfig,
        loader: IntentModelLoader,
    ) -> (WorkerHandle, mpsc::UnboundedReceiver<Outbound>) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(WorkerStats::default());

        let worker = Worker {
            config,
            loader,
            models: ModelState::new(),
            intent_model: None,
            inference: InferenceSlot::default(),
            agent: AgentSlot::default(),
            next_generation: 0,
            stats: stats.clone(),
            outbound: outbound_tx,
            events_tx,
            events_rx,
        };
        tokio::spawn(worker.run(inbound_rx));

        (
            WorkerHandle {
                tx: inbound_tx,
                stats,
            },
            outbound_rx,
        )
    }

    async fn run(mut self, mut inbound: mpsc::UnboundedReceiver<Inbound>) {
        info!("Worker started (intent source: {:?})", self.loader.source());

        loop {
            tokio::select! {
                message = inbound.recv() => match message {
                    Some(message) => self.handle(message),
                    None => break,
                },
                Some(event) = self.events_rx.recv() => self.on_event(event),
            }
        }

        self.agent.cancel();
        info!("Worker stopped");
    }

    fn handle(&mut self, message: Inbound) {
        debug!("Handling {}", message.kind());
        match message {
            Inbound::LoadTinyModel => self.load_tiny_model(),
            Inbound::LoadFullModel => self.load_full_model(),
            Inbound::Infer { text } => self.infer(text),
            Inbound::AgentStart { goal } => self.agent_start(goal),
            Inbound::AgentCancel => self.agent_cancel(),
            Inbound::Unknown(kind) => {
                debug!("Ignoring unknown message type {:?}", kind);
                self.stats.ignored_messages.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn on_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::TinyLoaded(model) => {
                self.intent_model = Some(Arc::new(model));
                self.models.finish_load(ModelTier::Tiny);
                info!("Tiny model ready");
                self.emit(Outbound::ModelStatus(self.models.status()));
            }
            WorkerEvent::FullLoaded => {
                self.models.finish_load(ModelTier::Full);
                info!("Full model ready");
                self.emit(Outbound::ModelStatus(ModelStatus {
                    tiny: true,
                    full: true,
                }));
            }
            WorkerEvent::InferenceDone(job) => {
                self.inference.release();
                self.emit(Outbound::InferResult(job.finish()));
            }
            WorkerEvent::AgentOutput {
                generation,
                message,
            } => {
                // A cancelled run may still have output in flight; only the
                // current generation reaches the host.
                if self.agent.is_current(generation) {
                    self.emit(message);
                } else {
                    debug!("Dropping output from stale agent run {}", generation);
                }
            }
            WorkerEvent::AgentFinished {
                generation,
                outcome,
            } => {
                if self.agent.finish(generation) {
                    debug!("Agent run {} finished: {:?}", generation, outcome);
                }
            }
        }
    }

    fn load_tiny_model(&mut self) {
        if !self.models.begin_load(ModelTier::Tiny) {
            return;
        }

        let loader = self.loader.clone();
        let delay = self.config.tiny_load_delay();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let model = loader.load_or_default().await;
            let _ = events.send(WorkerEvent::TinyLoaded(model));
        });
    }

    fn load_full_model(&mut self) {
        if !self.models.begin_load(ModelTier::Full) {
            return;
        }

        let delay = self.config.full_load_delay();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(WorkerEvent::FullLoaded);
        });
    }

    fn infer(&mut self, text: Option<String>) {
        let model = match (&self.intent_model, self.models.tiny_loaded()) {
            (Some(model), true) => model.clone(),
            _ => {
                self.emit(Outbound::Error(Error::ModelNotLoaded.to_string()));
                return;
            }
        };

        if !self.inference.try_acquire() {
            debug!("Inference already in flight, dropping request");
            self.stats.dropped_inferences.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let started = Instant::now();
        let tier = self.models.active_tier();
        let classification = model.classify(text.as_deref().unwrap_or_default());
        debug!(
            "Classified as {} (score {}) on {} model",
            classification.intent, classification.score, tier
        );

        let job = InferenceJob {
            started,
            tier,
            intent: classification.intent,
        };
        let cost = compute_cost(&self.config, tier);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(cost).await;
            let _ = events.send(WorkerEvent::InferenceDone(job));
        });
    }

    fn agent_start(&mut self, goal: Option<String>) {
        if self.agent.is_running() {
            debug!("Agent run already active, ignoring start");
            self.stats
                .ignored_agent_starts
                .fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let cancel = CancellationToken::new();
        self.agent = AgentSlot::Running {
            generation,
            cancel: cancel.clone(),
        };

        let run = AgentRun::new(generation, goal, cancel, &self.config);
        info!("Starting agent run {} for goal {:?}", generation, run.goal());

        let output = self.events_tx.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let outcome = run
                .run(move |message| {
                    output
                        .send(WorkerEvent::AgentOutput {
                            generation,
                            message,
                        })
                        .is_ok()
                })
                .await;
            let _ = events.send(WorkerEvent::AgentFinished {
                generation,
                outcome,
            });
        });
    }

    fn agent_cancel(&mut self) {
        self.agent.cancel();
        self.emit(Outbound::AgentStatus(AgentStatus::cancelled()));
    }

    fn emit(&self, message: Outbound) {
        if self.outbound.send(message).is_err() {
            debug!("Host receiver dropped, discarding outbound message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IntentSource, DEFAULT_INTENT};
    use crate::protocol::{AgentState, InferResult};
    use std::time::Duration;

    fn spawn_default() -> (WorkerHandle, mpsc::UnboundedReceiver<Outbound>) {
        Worker::spawn(WorkerConfig::default(), IntentModelLoader::builtin())
    }

    async fn spawn_with_model(json: &str) -> (WorkerHandle, mpsc::UnboundedReceiver<Outbound>) {
        let path =
            std::env::temp_dir().join(format!("folio-worker-{}.json", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, json).await.unwrap();
        let config = WorkerConfig::default();
        let loader = IntentModelLoader::new(IntentSource::File(path), &config).unwrap();
        Worker::spawn(config, loader)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Outbound {
        tokio::time::timeout(Duration::from_secs(30), rx.recv())
            .await
            .expect("timed out waiting for worker")
            .expect("worker channel closed")
    }

    /// True if nothing arrives within a generous window of simulated time.
    async fn quiet(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> bool {
        tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .is_err()
    }

    async fn load_tiny(handle: &WorkerHandle, rx: &mut mpsc::UnboundedReceiver<Outbound>) {
        handle.send(Inbound::LoadTinyModel).unwrap();
        assert!(matches!(
            next(rx).await,
            Outbound::ModelStatus(ModelStatus { tiny: true, .. })
        ));
    }

    async fn infer(
        handle: &WorkerHandle,
        rx: &mut mpsc::UnboundedReceiver<Outbound>,
        text: &str,
    ) -> InferResult {
        handle
            .send(Inbound::Infer {
                text: Some(text.to_string()),
            })
            .unwrap();
        match next(rx).await {
            Outbound::InferResult(result) => result,
            other => panic!("expected infer-result, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_tiny_reports_status_once() {
        let (handle, mut rx) = spawn_default();
        handle.send(Inbound::LoadTinyModel).unwrap();
        handle.send(Inbound::LoadTinyModel).unwrap();

        assert_eq!(
            next(&mut rx).await,
            Outbound::ModelStatus(ModelStatus {
                tiny: true,
                full: false
            })
        );
        assert!(quiet(&mut rx).await);

        handle.send(Inbound::LoadTinyModel).unwrap();
        assert!(quiet(&mut rx).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_tiny_absorbs_broken_resource() {
        let (handle, mut rx) = spawn_with_model("{\"broken\": ").await;
        load_tiny(&handle, &mut rx).await;

        let result = infer(&handle, &mut rx, "please help").await;
        assert_eq!(result.intent, DEFAULT_INTENT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_infer_before_load_reports_error() {
        let (handle, mut rx) = spawn_default();
        handle
            .send(Inbound::Infer {
                text: Some("hello".to_string()),
            })
            .unwrap();

        assert_eq!(
            next(&mut rx).await,
            Outbound::Error("Model not loaded".to_string())
        );
        assert!(quiet(&mut rx).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_infer_while_loading_reports_error() {
        let (handle, mut rx) = spawn_default();
        handle.send(Inbound::LoadTinyModel).unwrap();
        handle.send(Inbound::Infer { text: None }).unwrap();

        assert_eq!(
            next(&mut rx).await,
            Outbound::Error("Model not loaded".to_string())
        );
        assert!(matches!(next(&mut rx).await, Outbound::ModelStatus(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_infer_is_dropped() {
        let (handle, mut rx) = spawn_default();
        load_tiny(&handle, &mut rx).await;

        handle.send(Inbound::Infer { text: None }).unwrap();
        handle.send(Inbound::Infer { text: None }).unwrap();

        assert!(matches!(next(&mut rx).await, Outbound::InferResult(_)));
        assert!(quiet(&mut rx).await);
        assert_eq!(handle.stats().dropped_inferences, 1);

        // The slot is free again afterwards
        let result = infer(&handle, &mut rx, "").await;
        assert_eq!(result.intent, DEFAULT_INTENT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_infer_resolves_weighted_intent() {
        let (handle, mut rx) = spawn_with_model(
            r#"{"general_inquiry": {"hello": 1}, "portfolio_analysis": {"portfolio": 5}}"#,
        )
        .await;
        load_tiny(&handle, &mut rx).await;

        let result = infer(&handle, &mut rx, "I want to analyze my portfolio").await;
        assert_eq!(result.intent, "portfolio_analysis");

        let result = infer(&handle, &mut rx, "nothing relevant").await;
        assert_eq!(result.intent, DEFAULT_INTENT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_tier_switches_after_full_load() {
        let (handle, mut rx) = spawn_default();
        load_tiny(&handle, &mut rx).await;

        let result = infer(&handle, &mut rx, "hi").await;
        assert_eq!(result.model, ModelTier::Tiny);
        assert!(result.latency >= 12);

        handle.send(Inbound::LoadFullModel).unwrap();
        assert_eq!(
            next(&mut rx).await,
            Outbound::ModelStatus(ModelStatus {
                tiny: true,
                full: true
            })
        );

        let result = infer(&handle, &mut rx, "hi").await;
        assert_eq!(result.model, ModelTier::Full);
        assert!(result.latency >= 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tiny_status_reflects_full_model() {
        let (handle, mut rx) = spawn_default();
        handle.send(Inbound::LoadFullModel).unwrap();
        assert!(matches!(next(&mut rx).await, Outbound::ModelStatus(_)));

        handle.send(Inbound::LoadTinyModel).unwrap();
        assert_eq!(
            next(&mut rx).await,
            Outbound::ModelStatus(ModelStatus {
                tiny: true,
                full: true
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_agent_run_emits_full_sequence() {
        let (handle, mut rx) = spawn_default();
        handle
            .send(Inbound::AgentStart {
                goal: Some("review case studies".to_string()),
            })
            .unwrap();

        match next(&mut rx).await {
            Outbound::AgentStatus(status) => {
                assert_eq!(status.state, AgentState::Planning);
                assert_eq!(status.goal.as_deref(), Some("review case studies"));
            }
            other => panic!("expected planning status, got {:?}", other),
        }
        match next(&mut rx).await {
            Outbound::AgentPlan(plan) => {
                assert_eq!(plan.steps.len(), 3);
                assert!(plan.steps[0].contains("review case studies"));
            }
            other => panic!("expected plan, got {:?}", other),
        }
        for expected in 1..=3 {
            match next(&mut rx).await {
                Outbound::AgentStatus(status) => {
                    assert_eq!(status.state, AgentState::Executing);
                    assert_eq!(status.step, Some(expected));
                }
                other => panic!("expected executing status, got {:?}", other),
            }
        }
        assert!(matches!(next(&mut rx).await, Outbound::AgentResult(_)));
        assert!(quiet(&mut rx).await);

        // Slot is free: a second run starts normally
        handle.send(Inbound::AgentStart { goal: None }).unwrap();
        assert!(matches!(
            next(&mut rx).await,
            Outbound::AgentStatus(s) if s.state == AgentState::Planning
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_agent_start_is_ignored() {
        let (handle, mut rx) = spawn_default();
        handle.send(Inbound::AgentStart { goal: None }).unwrap();
        handle.send(Inbound::AgentStart { goal: None }).unwrap();

        let mut planning = 0;
        loop {
            match next(&mut rx).await {
                Outbound::AgentStatus(s) if s.state == AgentState::Planning => planning += 1,
                Outbound::AgentResult(_) => break,
                _ => {}
            }
        }
        assert_eq!(planning, 1);
        assert_eq!(handle.stats().ignored_agent_starts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_idle_still_reports() {
        let (handle, mut rx) = spawn_default();
        handle.send(Inbound::AgentCancel).unwrap();
        assert_eq!(
            next(&mut rx).await,
            Outbound::AgentStatus(AgentStatus::cancelled())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_running_agent() {
        let (handle, mut rx) = spawn_default();
        handle.send(Inbound::AgentStart { goal: None }).unwrap();

        assert!(matches!(next(&mut rx).await, Outbound::AgentStatus(_)));
        assert!(matches!(next(&mut rx).await, Outbound::AgentPlan(_)));
        assert!(matches!(next(&mut rx).await, Outbound::AgentStatus(_)));

        handle.send(Inbound::AgentCancel).unwrap();
        assert_eq!(
            next(&mut rx).await,
            Outbound::AgentStatus(AgentStatus::cancelled())
        );
        assert!(quiet(&mut rx).await);

        // A fresh run may start right after cancelling
        handle.send(Inbound::AgentStart { goal: None }).unwrap();
        assert!(matches!(
            next(&mut rx).await,
            Outbound::AgentStatus(s) if s.state == AgentState::Planning
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_agent_output_after_cancel() {
        let config = WorkerConfig {
            agent_planning_ms: 0,
            agent_step_ms: 0,
            ..Default::default()
        };
        let (handle, mut rx) = Worker::spawn(config, IntentModelLoader::builtin());
        for _ in 0..500 {
            handle.send(Inbound::AgentStart { goal: None }).unwrap();
            handle.send(Inbound::AgentCancel).unwrap();
        }
        drop(handle);

        let mut after_cancel = false;
        let mut cancels = 0;
        while let Some(message) = rx.recv().await {
            match message {
                Outbound::AgentStatus(s) if s.state == AgentState::Cancelled => {
                    after_cancel = true;
                    cancels += 1;
                }
                Outbound::AgentStatus(s) if s.state == AgentState::Planning => {
                    after_cancel = false;
                }
                other => assert!(!after_cancel, "{:?} arrived after cancel", other),
            }
        }
        assert_eq!(cancels, 500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_messages_are_ignored() {
        let (handle, mut rx) = spawn_default();
        handle
            .send_json(r#"{"type":"warm-cache","payload":{"urls":[]}}"#)
            .unwrap();
        handle.send_json("definitely not json").unwrap();

        assert!(quiet(&mut rx).await);
        assert_eq!(handle.stats().ignored_messages, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_json_routes_known_messages() {
        let (handle, mut rx) = spawn_default();
        handle.send_json(r#"{"type":"load-tiny-model"}"#).unwrap();
        assert!(matches!(next(&mut rx).await, Outbound::ModelStatus(_)));
    }

    #[test]
    fn test_handle_reports_closed_worker() {
        let (tx, inbound_rx) = mpsc::unbounded_channel::<Inbound>();
        drop(inbound_rx);
        let handle = WorkerHandle {
            tx,
            stats: Arc::new(WorkerStats::default()),
        };

        assert!(handle.is_closed());
        assert!(matches!(
            handle.send(Inbound::LoadTinyModel),
            Err(Error::WorkerClosed)
        ));
        assert!(matches!(
            handle.send_json("not json"),
            Err(Error::WorkerClosed)
        ));
    }
}
