//! Operation sinks
//!
//! A sink is the external consumer a confirmed operation commits into. It
//! reports its own progress through a [`ProgressReporter`].

use crate::gate::{OperationEvent, OperationKind};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};
use ww_core::config::InstallConfig;
use ww_core::error::SinkFailure;
use ww_vfs::StagedEntry;

/// Receiver of committed entries
#[async_trait]
pub trait OperationSink: Send {
    fn name(&self) -> &str;

    /// Commit `entry`, reporting progress as it goes
    ///
    /// Returning `Ok` means the operation is complete; the gate fills in
    /// any missing progress up to 100.
    async fn commit(
        &mut self,
        kind: OperationKind,
        entry: &StagedEntry,
        progress: &mut ProgressReporter,
    ) -> Result<(), SinkFailure>;
}

/// Monotonic progress channel for one running operation
///
/// Values above 100 are clamped and values at or below the last reported
/// one are dropped, so observers only ever see a rising sequence.
pub struct ProgressReporter {
    id: u64,
    current: Option<u8>,
    events: Option<UnboundedSender<OperationEvent>>,
}

impl ProgressReporter {
    pub(crate) fn new(id: u64, events: Option<UnboundedSender<OperationEvent>>) -> Self {
        Self {
            id,
            current: None,
            events,
        }
    }

    /// Report `percent` complete
    pub fn report(&mut self, percent: u8) {
        let percent = percent.min(100);
        if self.current.is_some_and(|c| percent <= c) {
            return;
        }
        self.current = Some(percent);
        if let Some(tx) = &self.events {
            let _ = tx.send(OperationEvent::Progress {
                id: self.id,
                percent,
            });
        }
    }

    /// Last reported percentage
    pub fn current(&self) -> u8 {
        self.current.unwrap_or(0)
    }
}

/// Timer-driven fake progress
///
/// A test double standing in for a real sink: it advances by a fixed step
/// on every tick and never writes anything anywhere. It can be told to fail
/// once progress reaches a given percentage.
pub struct SimulatedSink {
    tick: Duration,
    step: u8,
    fail_at: Option<u8>,
    committed: Vec<String>,
}

impl SimulatedSink {
    pub fn new(tick: Duration, step: u8) -> Self {
        Self {
            tick,
            step: step.clamp(1, 100),
            fail_at: None,
            committed: Vec::new(),
        }
    }

    pub fn from_config(config: &InstallConfig) -> Self {
        Self::new(Duration::from_millis(config.tick_ms), config.step_percent)
    }

    /// Fail as soon as progress would reach `percent`
    pub fn failing_at(mut self, percent: u8) -> Self {
        self.fail_at = Some(percent);
        self
    }

    /// Paths committed so far, oldest first
    pub fn committed(&self) -> &[String] {
        &self.committed
    }
}

#[async_trait]
impl OperationSink for SimulatedSink {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn commit(
        &mut self,
        kind: OperationKind,
        entry: &StagedEntry,
        progress: &mut ProgressReporter,
    ) -> Result<(), SinkFailure> {
        info!("Simulating {} of {}", kind, entry.virtual_path());

        let mut interval = tokio::time::interval(self.tick);
        let mut percent = 0u8;
        while percent < 100 {
            interval.tick().await;
            percent = percent.saturating_add(self.step).min(100);

            if let Some(fail_at) = self.fail_at {
                if percent >= fail_at {
                    return Err(SinkFailure::new(
                        format!("simulated {} failure", kind),
                        progress.current(),
                    ));
                }
            }

            debug!("{}: {}%", entry.virtual_path(), percent);
            progress.report(percent);
        }

        self.committed.push(entry.virtual_path().to_string());
        Ok(())
    }
}
