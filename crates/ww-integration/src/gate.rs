//! Destructive-operation gate
//!
//! Anything that overwrites external state (installing a WAD, restoring a
//! NAND backup, booting an image into an engine) goes through here:
//!
//! ```text
//! Pending -> AwaitingConfirmation -> Running -> Succeeded | Failed
//!                                 \-> Cancelled
//! ```
//!
//! Cancellation is only possible before the operation starts running. At
//! most one operation runs per target path at a time.

use crate::sink::{OperationSink, ProgressReporter};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use ww_core::error::{GateError, SinkFailure};
use ww_loader::FileProfile;
use ww_vfs::StagedEntry;

/// What a destructive operation does to its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Install a title or boot an image
    Install,
    /// Overwrite persistent storage from a full backup
    Restore,
}

impl OperationKind {
    /// Default operation for a staged profile
    pub fn for_profile(profile: FileProfile) -> Self {
        match profile {
            FileProfile::FullBackupImage => Self::Restore,
            FileProfile::ContainerArchive | FileProfile::ExecutableImage => Self::Install,
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Install => write!(f, "install"),
            Self::Restore => write!(f, "restore"),
        }
    }
}

/// Lifecycle state of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    AwaitingConfirmation,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// Event stream for gate observers
///
/// Progress for an operation only ever rises, and its terminal event
/// (`Succeeded`, `Failed` or `Cancelled`) is always the last one sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationEvent {
    Started { id: u64, path: String },
    Progress { id: u64, percent: u8 },
    Succeeded { id: u64 },
    Failed { id: u64, reason: String },
    Cancelled { id: u64 },
}

impl OperationEvent {
    pub fn id(&self) -> u64 {
        match self {
            Self::Started { id, .. }
            | Self::Progress { id, .. }
            | Self::Succeeded { id }
            | Self::Failed { id, .. }
            | Self::Cancelled { id } => *id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }
}

/// An operation waiting for confirmation
#[derive(Debug)]
pub struct PendingOperation {
    id: u64,
    kind: OperationKind,
    entry: StagedEntry,
    progress: u8,
    state: OperationState,
}

impl PendingOperation {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn target(&self) -> &StagedEntry {
        &self.entry
    }

    pub fn target_path(&self) -> &str {
        self.entry.virtual_path()
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    /// Destructive operations always need an explicit yes
    pub fn confirmation_required(&self) -> bool {
        true
    }

    fn transition(&mut self, next: OperationState) {
        debug!("Operation {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }
}

/// Summary of an operation that ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationReport {
    pub id: u64,
    pub kind: OperationKind,
    pub path: String,
    pub profile: FileProfile,
    pub bytes: u64,
    pub progress: u8,
    pub state: OperationState,
}

impl OperationReport {
    fn of(op: &PendingOperation) -> Self {
        Self {
            id: op.id,
            kind: op.kind,
            path: op.target_path().to_string(),
            profile: op.entry.profile(),
            bytes: op.entry.buffer().len(),
            progress: op.progress,
            state: op.state,
        }
    }
}

/// How an operation ended
///
/// A succeeded or failed operation has consumed its entry. A failed one is
/// not rolled back; the caller has to stage the file again to retry.
#[derive(Debug)]
pub enum OperationOutcome {
    Succeeded(OperationReport),
    Failed {
        report: OperationReport,
        error: SinkFailure,
    },
    /// Declined at confirmation; the untouched entry is handed back
    Cancelled(StagedEntry),
}

/// A request the gate refused, with the entry handed back
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct RequestRejected {
    error: GateError,
    entry: StagedEntry,
}

impl RequestRejected {
    pub fn error(&self) -> &GateError {
        &self.error
    }

    pub fn into_entry(self) -> StagedEntry {
        self.entry
    }

    pub fn into_parts(self) -> (GateError, StagedEntry) {
        (self.error, self.entry)
    }
}

/// Source of the explicit yes/no for an operation
#[async_trait]
pub trait Confirmation: Send {
    async fn confirm(&mut self, op: &PendingOperation) -> bool;
}

/// Always answers the same way
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

#[async_trait]
impl Confirmation for FixedAnswer {
    async fn confirm(&mut self, _op: &PendingOperation) -> bool {
        self.0
    }
}

/// Answers with a closure
pub struct ConfirmWith<F>(pub F);

#[async_trait]
impl<F> Confirmation for ConfirmWith<F>
where
    F: FnMut(&PendingOperation) -> bool + Send,
{
    async fn confirm(&mut self, op: &PendingOperation) -> bool {
        (self.0)(op)
    }
}

/// Marks a path as running until dropped
struct RunningGuard {
    running: Arc<Mutex<HashSet<String>>>,
    path: String,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.lock().remove(&self.path);
    }
}

/// Confirmation gate for destructive operations
///
/// Clones share the same running set, id counter and event channel.
#[derive(Clone, Default)]
pub struct OperationGate {
    running: Arc<Mutex<HashSet<String>>>,
    next_id: Arc<AtomicU64>,
    events: Option<UnboundedSender<OperationEvent>>,
}

impl OperationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send lifecycle and progress events to `events`
    pub fn with_events(mut self, events: UnboundedSender<OperationEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Whether an operation is running against `path`
    pub fn is_running(&self, path: &str) -> bool {
        self.running.lock().contains(path)
    }

    /// Open a new operation against `entry`
    ///
    /// The operation comes back awaiting confirmation. Fails with
    /// [`GateError::OperationInProgress`] while another operation on the
    /// same path is running.
    pub fn request(
        &self,
        kind: OperationKind,
        entry: StagedEntry,
    ) -> Result<PendingOperation, RequestRejected> {
        if self.is_running(entry.virtual_path()) {
            warn!(
                "Refusing {} of {}: operation already running",
                kind,
                entry.virtual_path()
            );
            return Err(RequestRejected {
                error: GateError::OperationInProgress(entry.virtual_path().to_string()),
                entry,
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut op = PendingOperation {
            id,
            kind,
            entry,
            progress: 0,
            state: OperationState::Pending,
        };
        op.transition(OperationState::AwaitingConfirmation);

        info!(
            "Operation {} ({} of {}) awaiting confirmation",
            id,
            kind,
            op.target_path()
        );
        Ok(op)
    }

    /// Discard an operation that has not started, handing its entry back
    pub fn cancel(&self, mut op: PendingOperation) -> StagedEntry {
        op.transition(OperationState::Cancelled);
        info!("Operation {} cancelled", op.id);
        self.emit(OperationEvent::Cancelled { id: op.id });
        op.entry
    }

    /// Ask for confirmation and, if given, run the operation to completion
    ///
    /// Once running, the operation cannot be cancelled; it ends as
    /// `Succeeded` (after progress reaches 100) or `Failed` (when the sink
    /// reports an error).
    pub async fn run<C, S>(
        &self,
        mut op: PendingOperation,
        confirmation: &mut C,
        sink: &mut S,
    ) -> Result<OperationOutcome, RequestRejected>
    where
        C: Confirmation + ?Sized,
        S: OperationSink + ?Sized,
    {
        if op.state != OperationState::AwaitingConfirmation {
            return Err(RequestRejected {
                error: GateError::WrongState {
                    id: op.id,
                    state: format!("{:?}", op.state),
                    expected: format!("{:?}", OperationState::AwaitingConfirmation),
                },
                entry: op.entry,
            });
        }

        if !confirmation.confirm(&op).await {
            return Ok(OperationOutcome::Cancelled(self.cancel(op)));
        }

        let Some(guard) = self.claim(op.target_path()) else {
            return Err(RequestRejected {
                error: GateError::OperationInProgress(op.target_path().to_string()),
                entry: op.entry,
            });
        };

        op.transition(OperationState::Running);
        info!("Operation {} running on {} sink", op.id, sink.name());
        self.emit(OperationEvent::Started {
            id: op.id,
            path: op.target_path().to_string(),
        });

        let mut progress = ProgressReporter::new(op.id, self.events.clone());
        progress.report(0);

        let result = sink.commit(op.kind, &op.entry, &mut progress).await;

        if result.is_ok() {
            progress.report(100);
        }
        op.progress = progress.current();
        drop(guard);

        match result {
            Ok(()) => {
                op.transition(OperationState::Succeeded);
                info!("Operation {} succeeded", op.id);
                self.emit(OperationEvent::Succeeded { id: op.id });
                Ok(OperationOutcome::Succeeded(OperationReport::of(&op)))
            }
            Err(failure) => {
                op.transition(OperationState::Failed);
                warn!("Operation {} failed at {}%: {}", op.id, op.progress, failure.reason);
                self.emit(OperationEvent::Failed {
                    id: op.id,
                    reason: failure.reason.clone(),
                });
                let error = SinkFailure {
                    reason: failure.reason,
                    progress: op.progress,
                };
                Ok(OperationOutcome::Failed {
                    report: OperationReport::of(&op),
                    error,
                })
            }
        }
    }

    fn claim(&self, path: &str) -> Option<RunningGuard> {
        let mut running = self.running.lock();
        if !running.insert(path.to_string()) {
            return None;
        }
        Some(RunningGuard {
            running: Arc::clone(&self.running),
            path: path.to_string(),
        })
    }

    fn emit(&self, event: OperationEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SimulatedSink;
    use std::time::Duration;
    use tokio::sync::{mpsc, oneshot};
    use ww_loader::ByteBuffer;
    use ww_vfs::StagingNamespace;

    fn entry(path: &str) -> StagedEntry {
        let mut ns = StagingNamespace::new();
        ns.stage(path, FileProfile::ExecutableImage, ByteBuffer::new(vec![1; 256]))
            .unwrap();
        ns.take(path).unwrap()
    }

    fn fast_sink() -> SimulatedSink {
        SimulatedSink::new(Duration::from_millis(1), 25)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<OperationEvent>) -> Vec<OperationEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    /// Blocks inside commit until released
    struct HeldSink {
        started: Option<oneshot::Sender<()>>,
        release: Option<oneshot::Receiver<()>>,
    }

    #[async_trait]
    impl OperationSink for HeldSink {
        fn name(&self) -> &str {
            "held"
        }

        async fn commit(
            &mut self,
            _kind: OperationKind,
            _entry: &StagedEntry,
            progress: &mut ProgressReporter,
        ) -> Result<(), SinkFailure> {
            progress.report(50);
            if let Some(tx) = self.started.take() {
                let _ = tx.send(());
            }
            if let Some(rx) = self.release.take() {
                let _ = rx.await;
            }
            Ok(())
        }
    }

    #[test]
    fn test_request_awaits_confirmation() {
        let gate = OperationGate::new();
        let op = gate.request(OperationKind::Install, entry("/roms/a.dol")).unwrap();
        assert_eq!(op.state(), OperationState::AwaitingConfirmation);
        assert!(op.confirmation_required());
        assert_eq!(op.progress(), 0);
        assert_eq!(op.target_path(), "/roms/a.dol");

        let next = gate.request(OperationKind::Install, entry("/roms/b.dol")).unwrap();
        assert!(next.id() > op.id());
    }

    #[tokio::test]
    async fn test_confirmed_operation_succeeds() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let gate = OperationGate::new().with_events(tx);
        let op = gate.request(OperationKind::Install, entry("/roms/a.dol")).unwrap();
        let id = op.id();

        let mut sink = fast_sink();
        let outcome = gate.run(op, &mut FixedAnswer(true), &mut sink).await.unwrap();

        match outcome {
            OperationOutcome::Succeeded(report) => {
                assert_eq!(report.state, OperationState::Succeeded);
                assert_eq!(report.progress, 100);
                assert_eq!(report.bytes, 256);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(sink.committed(), ["/roms/a.dol".to_string()]);
        assert!(!gate.is_running("/roms/a.dol"));

        let events = drain(&mut rx);
        assert_eq!(
            events.first(),
            Some(&OperationEvent::Started {
                id,
                path: "/roms/a.dol".to_string()
            })
        );
        assert_eq!(events.last(), Some(&OperationEvent::Succeeded { id }));

        let progress: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                OperationEvent::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![0, 25, 50, 75, 100]);
    }

    #[tokio::test]
    async fn test_declined_operation_cancels() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let gate = OperationGate::new().with_events(tx);
        let op = gate.request(OperationKind::Install, entry("/roms/a.dol")).unwrap();
        let id = op.id();

        let mut sink = fast_sink();
        let outcome = gate.run(op, &mut FixedAnswer(false), &mut sink).await.unwrap();

        match outcome {
            OperationOutcome::Cancelled(entry) => {
                assert_eq!(entry.virtual_path(), "/roms/a.dol");
                assert_eq!(entry.buffer().len(), 256);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(sink.committed().is_empty());
        assert_eq!(drain(&mut rx), vec![OperationEvent::Cancelled { id }]);
    }

    #[tokio::test]
    async fn test_sink_failure_keeps_partial_progress() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let gate = OperationGate::new().with_events(tx);
        let op = gate.request(OperationKind::Install, entry("/roms/a.dol")).unwrap();

        let mut sink = fast_sink().failing_at(75);
        let outcome = gate.run(op, &mut FixedAnswer(true), &mut sink).await.unwrap();

        match outcome {
            OperationOutcome::Failed { report, error } => {
                assert_eq!(report.state, OperationState::Failed);
                assert_eq!(report.progress, 50);
                assert_eq!(error.progress, 50);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let events = drain(&mut rx);
        assert!(matches!(events.last(), Some(OperationEvent::Failed { .. })));
        assert!(!events
            .iter()
            .any(|e| matches!(e, OperationEvent::Progress { percent: 100, .. })));
        assert!(!gate.is_running("/roms/a.dol"));
    }

    #[tokio::test]
    async fn test_one_running_operation_per_path() {
        let gate = OperationGate::new();
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        let mut sink = HeldSink {
            started: Some(started_tx),
            release: Some(release_rx),
        };

        let op = gate.request(OperationKind::Install, entry("/roms/a.dol")).unwrap();
        let running_gate = gate.clone();
        let handle = tokio::spawn(async move {
            running_gate
                .run(op, &mut FixedAnswer(true), &mut sink)
                .await
        });

        started_rx.await.unwrap();
        assert!(gate.is_running("/roms/a.dol"));

        let rejected = gate
            .request(OperationKind::Install, entry("/roms/a.dol"))
            .unwrap_err();
        assert_eq!(
            rejected.error(),
            &GateError::OperationInProgress("/roms/a.dol".to_string())
        );
        assert_eq!(rejected.into_entry().virtual_path(), "/roms/a.dol");

        // Other paths are unaffected
        assert!(gate.request(OperationKind::Install, entry("/roms/b.dol")).is_ok());

        release_tx.send(()).unwrap();
        let outcome = handle.await.unwrap().unwrap();
        assert!(matches!(outcome, OperationOutcome::Succeeded(_)));

        assert!(gate.request(OperationKind::Install, entry("/roms/a.dol")).is_ok());
    }

    #[tokio::test]
    async fn test_request_allowed_after_failure() {
        let gate = OperationGate::new();
        let op = gate.request(OperationKind::Restore, entry("/user/nand/nand.bin")).unwrap();
        let mut sink = fast_sink().failing_at(1);
        let outcome = gate.run(op, &mut FixedAnswer(true), &mut sink).await.unwrap();
        assert!(matches!(outcome, OperationOutcome::Failed { .. }));

        assert!(gate
            .request(OperationKind::Restore, entry("/user/nand/nand.bin"))
            .is_ok());
    }

    #[tokio::test]
    async fn test_confirm_with_closure_sees_operation() {
        let gate = OperationGate::new();
        let op = gate.request(OperationKind::Restore, entry("/tmp/x.dol")).unwrap();
        let mut seen = None;
        let mut confirm = ConfirmWith(|op: &PendingOperation| {
            seen = Some((op.kind(), op.state()));
            false
        });

        let outcome = gate.run(op, &mut confirm, &mut fast_sink()).await.unwrap();
        assert!(matches!(outcome, OperationOutcome::Cancelled(_)));
        assert_eq!(
            seen,
            Some((OperationKind::Restore, OperationState::AwaitingConfirmation))
        );
    }

    #[test]
    fn test_explicit_cancel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let gate = OperationGate::new().with_events(tx);
        let op = gate.request(OperationKind::Install, entry("/roms/a.dol")).unwrap();
        let id = op.id();

        let entry = gate.cancel(op);
        assert_eq!(entry.virtual_path(), "/roms/a.dol");
        assert_eq!(drain(&mut rx), vec![OperationEvent::Cancelled { id }]);
    }

    #[test]
    fn test_kind_for_profile() {
        assert_eq!(
            OperationKind::for_profile(FileProfile::FullBackupImage),
            OperationKind::Restore
        );
        assert_eq!(
            OperationKind::for_profile(FileProfile::ContainerArchive),
            OperationKind::Install
        );
        assert_eq!(
            OperationKind::for_profile(FileProfile::ExecutableImage),
            OperationKind::Install
        );
    }
}
