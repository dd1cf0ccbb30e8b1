//! Load pipeline
//!
//! read -> classify -> validate -> stage, and later a confirmed commit of a
//! staged entry through the operation gate into a sink.

use crate::gate::{
    Confirmation, OperationGate, OperationKind, OperationOutcome, OperationReport,
};
use crate::sink::OperationSink;
use tracing::{info, warn};
use ww_core::error::{ValidationError, WebWiiError};
use ww_core::{Config, Result};
use ww_loader::{classify, read_to_buffer, ByteSource, FileProfile, ValidationVerdict, Validator};
use ww_vfs::{default_path_for, StagingNamespace};

/// What happened to a file that made it into staging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub path: String,
    pub profile: FileProfile,
    pub bytes: u64,
    pub verdict: ValidationVerdict,
}

/// Result of a commit that was not an error
#[derive(Debug)]
pub enum CommitOutcome {
    Completed(OperationReport),
    /// Declined at confirmation; the entry is back in staging
    Cancelled,
}

/// Reader, validator, staging namespace and gate bundled together
pub struct LoadPipeline {
    chunk_size: usize,
    validator: Validator,
    staging: StagingNamespace,
    gate: OperationGate,
}

impl LoadPipeline {
    pub fn new(config: &Config) -> Self {
        Self {
            chunk_size: config.reader.chunk_size,
            validator: Validator::from_config(&config.validation),
            staging: StagingNamespace::from_config(&config.staging),
            gate: OperationGate::new(),
        }
    }

    /// Use `gate` instead of a private one, e.g. to share its event channel
    pub fn with_gate(mut self, gate: OperationGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn staging(&self) -> &StagingNamespace {
        &self.staging
    }

    pub fn staging_mut(&mut self) -> &mut StagingNamespace {
        &mut self.staging
    }

    pub fn gate(&self) -> &OperationGate {
        &self.gate
    }

    /// Read, classify and validate `source`, staging it if accepted
    ///
    /// Unknown file types and rejected verdicts leave the staging namespace
    /// untouched.
    pub async fn ingest<S, F>(&mut self, source: S, on_progress: F) -> Result<IngestReport>
    where
        S: ByteSource,
        F: FnMut(Option<u8>),
    {
        let name = source.name().to_string();
        let buffer = read_to_buffer(source, self.chunk_size, on_progress).await?;

        let Some(profile) = classify(&name, &buffer).profile() else {
            warn!("{} is not a recognized file type", name);
            return Err(WebWiiError::UnknownType(name));
        };

        let verdict = self.validator.validate(profile, &buffer);
        if !verdict.accepted {
            return Err(ValidationError {
                errors: verdict.errors,
            }
            .into());
        }
        for warning in &verdict.warnings {
            warn!("{}: {}", name, warning);
        }

        let path = default_path_for(profile, &name)?;
        let bytes = buffer.len();
        self.staging.stage(&path, profile, buffer)?;

        Ok(IngestReport {
            path,
            profile,
            bytes,
            verdict,
        })
    }

    /// Commit the entry staged at `path` through the gate into `sink`
    ///
    /// The operation kind follows the entry's profile. A declined
    /// confirmation puts the entry back; a sink failure leaves it evicted.
    pub async fn commit<C, S>(
        &mut self,
        path: &str,
        confirmation: &mut C,
        sink: &mut S,
    ) -> Result<CommitOutcome>
    where
        C: Confirmation + ?Sized,
        S: OperationSink + ?Sized,
    {
        let entry = self.staging.take(path)?;
        let kind = OperationKind::for_profile(entry.profile());

        let op = match self.gate.request(kind, entry) {
            Ok(op) => op,
            Err(rejected) => {
                let (error, entry) = rejected.into_parts();
                self.staging.restore(entry);
                return Err(error.into());
            }
        };

        match self.gate.run(op, confirmation, sink).await {
            Ok(OperationOutcome::Succeeded(report)) => {
                info!("Committed {} ({})", report.path, report.kind);
                Ok(CommitOutcome::Completed(report))
            }
            Ok(OperationOutcome::Failed { error, .. }) => Err(error.into()),
            Ok(OperationOutcome::Cancelled(entry)) => {
                self.staging.restore(entry);
                Ok(CommitOutcome::Cancelled)
            }
            Err(rejected) => {
                let (error, entry) = rejected.into_parts();
                self.staging.restore(entry);
                Err(error.into())
            }
        }
    }
}
