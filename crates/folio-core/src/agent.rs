//! Scripted multi-step agent run.
//!
//! A run plans, publishes a fixed three-step plan, executes each step with a
//! simulated pause and finally reports a summary. Every pause races the run's
//! [`CancellationToken`], so `agent-cancel` stops a run mid-step.
//!
//! A run never talks to the host directly: its messages go through an emitter,
//! which the worker routes back through its own event loop.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::WorkerConfig;
use crate::protocol::{AgentPlan, AgentResult, AgentStatus, Outbound};

/// Goal used when `agent-start` carries none
pub const DEFAULT_GOAL: &str = "Explore the portfolio";

/// Reported token usage of a completed run
pub const RESULT_TOKENS: u32 = 256;

/// Reported elapsed time of a completed run
pub const RESULT_TIME_MS: u64 = 1800;

pub fn build_plan(goal: &str) -> Vec<String> {
    vec![
        format!("Analyze goal: {}", goal),
        format!("Gather relevant portfolio context for: {}", goal),
        format!("Draft a response for: {}", goal),
    ]
}

/// Agent slot owned by the worker
#[derive(Debug, Default)]
pub enum AgentSlot {
    #[default]
    Idle,
    Running {
        generation: u64,
        cancel: CancellationToken,
    },
}

impl AgentSlot {
    pub fn is_running(&self) -> bool {
        matches!(self, AgentSlot::Running { .. })
    }

    /// Cancel the active run, if any, and return to idle.
    pub fn cancel(&mut self) {
        if let AgentSlot::Running { cancel, .. } = std::mem::take(self) {
            cancel.cancel();
        }
    }

    /// True while `generation` is the active run
    pub fn is_current(&self, generation: u64) -> bool {
        matches!(self, AgentSlot::Running { generation: g, .. } if *g == generation)
    }

    /// Return to idle only if `generation` is still the active run.
    pub fn finish(&mut self, generation: u64) -> bool {
        match self {
            AgentSlot::Running { generation: g, .. } if *g == generation => {
                *self = AgentSlot::Idle;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentOutcome {
    Completed,
    Cancelled,
}

/// A single run; consumed by [`AgentRun::run`]
#[derive(Debug)]
pub struct AgentRun {
    pub generation: u64,
    goal: String,
    cancel: CancellationToken,
    planning_delay: Duration,
    step_delay: Duration,
}

impl AgentRun {
    pub fn new(
        generation: u64,
        goal: Option<String>,
        cancel: CancellationToken,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            generation,
            goal: goal.unwrap_or_else(|| DEFAULT_GOAL.to_string()),
            cancel,
            planning_delay: config.agent_planning_delay(),
            step_delay: config.agent_step_delay(),
        }
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    /// Drive the run to completion. `emit` returns false once its receiver is gone,
    /// which ends the run like a cancellation.
    pub async fn run<E>(self, mut emit: E) -> AgentOutcome
    where
        E: FnMut(Outbound) -> bool,
    {
        if !self.emit(&mut emit, Outbound::AgentStatus(AgentStatus::planning(&self.goal))) {
            return AgentOutcome::Cancelled;
        }
        if !self.pause(self.planning_delay).await {
            return AgentOutcome::Cancelled;
        }

        let steps = build_plan(&self.goal);
        let total = steps.len();
        if !self.emit(
            &mut emit,
            Outbound::AgentPlan(AgentPlan {
                steps: steps.clone(),
            }),
        ) {
            return AgentOutcome::Cancelled;
        }

        for (index, description) in steps.iter().enumerate() {
            let status = AgentStatus::executing(index + 1, total, description);
            if !self.emit(&mut emit, Outbound::AgentStatus(status)) {
                return AgentOutcome::Cancelled;
            }
            if !self.pause(self.step_delay).await {
                return AgentOutcome::Cancelled;
            }
        }

        let result = AgentResult {
            summary: format!("Completed {} steps for: {}", total, self.goal),
            tokens: RESULT_TOKENS,
            time_ms: RESULT_TIME_MS,
        };
        if !self.emit(&mut emit, Outbound::AgentResult(result)) {
            return AgentOutcome::Cancelled;
        }

        AgentOutcome::Completed
    }

    fn emit<E>(&self, emit: &mut E, message: Outbound) -> bool
    where
        E: FnMut(Outbound) -> bool,
    {
        if self.cancel.is_cancelled() {
            return false;
        }
        emit(message)
    }

    /// Returns false if the run was cancelled before `delay` elapsed.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!("Agent run {} cancelled", self.generation);
                false
            }
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
