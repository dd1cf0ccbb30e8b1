//! Integration layer for webwii
//!
//! Ties the loader and staging namespace to the outside world: the
//! confirmation-gated install/restore operations, the sinks they commit
//! into, and the external emulator engines.

pub mod consent;
pub mod engine;
pub mod gate;
pub mod pipeline;
pub mod sink;

pub use consent::{ConsentStore, MemoryConsentStore, DISCLAIMER_KEY};
pub use engine::{EmulatorEngine, EmulatorSession, EngineSink};
pub use gate::{
    Confirmation, ConfirmWith, FixedAnswer, OperationEvent, OperationGate, OperationKind,
    OperationOutcome, OperationReport, OperationState, PendingOperation, RequestRejected,
};
pub use pipeline::{CommitOutcome, IngestReport, LoadPipeline};
pub use sink::{OperationSink, ProgressReporter, SimulatedSink};
