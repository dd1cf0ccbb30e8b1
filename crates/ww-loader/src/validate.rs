//! Profile validator
//!
//! Checks a buffer against its profile: minimum size, leading signature,
//! size tolerance, and a blank-header heuristic. Malformed input never
//! panics; it only shows up as verdict errors or warnings.

use crate::buffer::ByteBuffer;
use crate::profile::{FileProfile, SizePolicy, BLANK_SCAN_BYTES};
use serde::Serialize;
use tracing::{debug, info, warn};
use ww_core::config::{SignaturePolicy, ValidationConfig};
use ww_core::error::ValidationError;

/// Outcome of validating one buffer
///
/// `accepted` implies `errors` is empty. Warnings never block acceptance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationVerdict {
    pub accepted: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationVerdict {
    fn new() -> Self {
        Self::default()
    }

    fn error(&mut self, message: String) {
        self.errors.push(message);
    }

    fn warn(&mut self, message: String) {
        self.warnings.push(message);
    }

    fn seal(mut self) -> Self {
        self.accepted = self.errors.is_empty();
        self
    }

    /// Warnings on acceptance, the collected errors otherwise
    pub fn into_result(self) -> Result<Vec<String>, ValidationError> {
        if self.accepted {
            Ok(self.warnings)
        } else {
            Err(ValidationError {
                errors: self.errors,
            })
        }
    }
}

/// Profile validator
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator {
    signature_policy: SignaturePolicy,
}

impl Validator {
    pub fn new(signature_policy: SignaturePolicy) -> Self {
        Self { signature_policy }
    }

    pub fn from_config(config: &ValidationConfig) -> Self {
        Self::new(config.signature_policy)
    }

    pub fn signature_policy(&self) -> SignaturePolicy {
        self.signature_policy
    }

    /// Validate `buffer` against `profile`
    pub fn validate(&self, profile: FileProfile, buffer: &ByteBuffer) -> ValidationVerdict {
        let mut verdict = ValidationVerdict::new();
        let len = buffer.len();

        if len < profile.min_size() {
            verdict.error(format!(
                "{} requires at least {} bytes, got {}",
                profile.label(),
                profile.min_size(),
                len
            ));
            return self.finish(profile, verdict.seal());
        }

        self.check_signature(profile, buffer, &mut verdict);

        if let SizePolicy::Tolerant {
            exact,
            tolerance,
            reject_factor,
        } = profile.size_policy()
        {
            let delta = len.abs_diff(exact);
            if delta > tolerance.saturating_mul(reject_factor) {
                verdict.error(format!(
                    "{} is {} bytes, too far from the expected {} bytes",
                    profile.label(),
                    len,
                    exact
                ));
            } else if delta > tolerance {
                verdict.warn(format!(
                    "{} is {} bytes, expected {} bytes",
                    profile.label(),
                    len,
                    exact
                ));
            }
        }

        if profile.checks_blank_header() && header_is_blank(buffer) {
            verdict.warn(format!(
                "First {} bytes are all zero; the {} may be corrupted or blank",
                BLANK_SCAN_BYTES,
                profile.label()
            ));
        }

        self.finish(profile, verdict.seal())
    }

    fn check_signature(&self, profile: FileProfile, buffer: &ByteBuffer, verdict: &mut ValidationVerdict) {
        let accepted = profile.signatures();
        if accepted.is_empty() {
            return;
        }

        // min_size is always >= 4 for profiles with signatures
        let Some(word) = buffer.read_u32_be(0) else {
            return;
        };

        if accepted.contains(&word) {
            debug!("{} signature 0x{:08X} recognized", profile.label(), word);
            return;
        }

        let expected = accepted
            .iter()
            .map(|s| format!("0x{:08X}", s))
            .collect::<Vec<_>>()
            .join(", ");
        let message = format!(
            "Unrecognized {} signature 0x{:08X} (expected {})",
            profile.label(),
            word,
            expected
        );

        match self.signature_policy {
            SignaturePolicy::Warn => verdict.warn(message),
            SignaturePolicy::Reject => verdict.error(message),
        }
    }

    fn finish(&self, profile: FileProfile, verdict: ValidationVerdict) -> ValidationVerdict {
        if verdict.accepted {
            info!(
                "{} accepted with {} warning(s)",
                profile.label(),
                verdict.warnings.len()
            );
        } else {
            warn!("{} rejected: {}", profile.label(), verdict.errors.join("; "));
        }
        verdict
    }
}

/// Validate with the default (warn on signature mismatch) policy
pub fn validate(profile: FileProfile, buffer: &ByteBuffer) -> ValidationVerdict {
    Validator::default().validate(profile, buffer)
}

/// Scan the leading bytes in little-endian words
fn header_is_blank(buffer: &ByteBuffer) -> bool {
    let scan = BLANK_SCAN_BYTES.min(buffer.as_slice().len());
    (0..scan)
        .step_by(4)
        .filter_map(|offset| buffer.read_u32_le(offset))
        .all(|word| word == 0)
}
