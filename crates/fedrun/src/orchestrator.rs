//! # Orchestrator
//!
//! Staged activation of several remotes. Steps run strictly in order: step N is not
//! issued until step N-1 has settled (either way) and step N's delay has elapsed.
//! Ordering comes from the orchestrator, never from which fetch happens to finish
//! first.
//!
//! Delays only shape timing. Running the same steps with zero delays loads the same
//! set of remotes.
//!
//! Progress is published on a watch channel, so a run in another task can be
//! observed through [`Orchestrator::subscribe_phase`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::info;
use tracing::warn;

use crate::client::FederationClient;
use crate::error::Result;
use crate::remote::RemoteId;
use crate::share::Module;

/// One activation: wait `delay`, then request `export` from `remote`.
#[derive(Clone, Debug)]
pub struct Step {
    pub remote: RemoteId,
    pub export: String,
    pub delay: Duration,
}

impl Step {
    pub fn new(remote: impl Into<RemoteId>, export: impl Into<String>, delay: Duration) -> Self {
        Self {
            remote: remote.into(),
            export: export.into(),
            delay,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Sleeping before issuing the step at this index.
    Waiting(usize),
    /// The step at this index has been issued and has not settled.
    Requesting(usize),
    Finished,
}

/// A settled step.
#[derive(Clone, Debug)]
pub struct StepOutcome {
    pub index: usize,
    pub remote: RemoteId,
    pub export: String,
    pub result: Result<Module>,
}

pub struct Orchestrator {
    client: Arc<FederationClient>,
    steps: Vec<Step>,
    phase: watch::Sender<Phase>,
    events: Option<mpsc::UnboundedSender<StepOutcome>>,
}

impl Orchestrator {
    pub fn new(client: Arc<FederationClient>) -> Self {
        Self {
            client,
            steps: Vec::new(),
            phase: watch::Sender::new(Phase::Idle),
            events: None,
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Returns a receiver that sees each outcome as soon as its step settles.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<StepOutcome> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Returns a receiver that tracks the phase while `run` is in progress.
    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    fn enter(&self, phase: Phase) {
        self.phase.send_replace(phase);
    }

    /// Runs every step in order and returns the outcomes in step order.
    pub async fn run(&mut self) -> Vec<StepOutcome> {
        let mut outcomes = Vec::with_capacity(self.steps.len());
        let steps = self.steps.clone();

        for (index, step) in steps.into_iter().enumerate() {
            if !step.delay.is_zero() {
                self.enter(Phase::Waiting(index));
                tokio::time::sleep(step.delay).await;
            }

            self.enter(Phase::Requesting(index));
            info!(step = index, remote = %step.remote, export = %step.export, "activating remote");
            let result = self.client.request_export(step.remote.clone(), &step.export).await;
            if let Err(e) = &result {
                warn!(step = index, remote = %step.remote, error = %e, "step failed");
            }

            let outcome = StepOutcome {
                index,
                remote: step.remote,
                export: step.export,
                result,
            };
            if let Some(events) = &self.events {
                // A dropped receiver only means nobody is listening.
                let _ = events.send(outcome.clone());
            }
            outcomes.push(outcome);
        }

        self.enter(Phase::Finished);
        self.events = None;
        outcomes
    }
}
