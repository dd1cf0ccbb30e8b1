//! External emulator engines
//!
//! The engines themselves (a Dolphin WASM build and a RetroArch core) live
//! outside this crate. [`EmulatorSession`] picks one: the preferred backend
//! first, the other as a fallback when the preferred one is missing or
//! refuses the image. The selected backend is an explicit field of the
//! session, never process-wide state.

use crate::consent::{ConsentStore, DISCLAIMER_KEY};
use crate::gate::OperationKind;
use crate::sink::{OperationSink, ProgressReporter};
use async_trait::async_trait;
use tracing::{info, warn};
use ww_core::config::{BackendKind, EmulatorConfig};
use ww_core::error::{EngineError, SinkFailure};
use ww_loader::ByteBuffer;
use ww_vfs::StagedEntry;

/// Number of save state slots exposed by the engines
pub const SAVE_STATE_SLOTS: u32 = 10;

/// Boot/pause/resume/save-state contract of an external engine
#[async_trait]
pub trait EmulatorEngine: Send + Sync {
    fn backend(&self) -> BackendKind;

    /// Whether the engine is loaded and usable
    async fn is_available(&self) -> bool;

    /// Boot `image`; `Ok(false)` means the engine declined it
    async fn boot_image(&mut self, path: &str, image: &ByteBuffer) -> Result<bool, EngineError>;

    async fn pause(&mut self) -> Result<(), EngineError>;
    async fn resume(&mut self) -> Result<(), EngineError>;
    async fn stop(&mut self) -> Result<(), EngineError>;
    async fn save_state(&mut self, slot: u32) -> Result<(), EngineError>;
    async fn load_state(&mut self, slot: u32) -> Result<(), EngineError>;
}

/// One emulator session over a set of candidate engines
pub struct EmulatorSession {
    /// Preferred engine first
    engines: Vec<Box<dyn EmulatorEngine>>,
    allow_fallback: bool,
    consent: Box<dyn ConsentStore>,
    selected: Option<BackendKind>,
    booted_path: Option<String>,
}

impl EmulatorSession {
    /// Build a session, ordering `engines` so the configured backend is tried first
    pub fn new(
        config: &EmulatorConfig,
        mut engines: Vec<Box<dyn EmulatorEngine>>,
        consent: Box<dyn ConsentStore>,
    ) -> Self {
        let preferred = config.preferred_backend;
        engines.sort_by_key(|engine| engine.backend() != preferred);

        Self {
            engines,
            allow_fallback: config.allow_fallback,
            consent,
            selected: None,
            booted_path: None,
        }
    }

    /// Backend currently running an image
    pub fn selected(&self) -> Option<BackendKind> {
        self.selected
    }

    /// Path of the image currently booted
    pub fn booted_path(&self) -> Option<&str> {
        self.booted_path.as_deref()
    }

    pub fn disclaimer_accepted(&self) -> bool {
        self.consent.is_accepted(DISCLAIMER_KEY)
    }

    pub fn accept_disclaimer(&mut self) {
        self.consent.set(DISCLAIMER_KEY, true);
    }

    /// Boot `image`, trying the preferred backend and then the fallback
    pub async fn boot(&mut self, path: &str, image: &ByteBuffer) -> Result<BackendKind, EngineError> {
        if !self.disclaimer_accepted() {
            return Err(EngineError::ConsentRequired);
        }

        if self.selected.is_some() {
            if let Err(e) = self.stop().await {
                warn!("Failed to stop running engine before boot: {}", e);
            }
        }

        let mut any_available = false;
        for (i, engine) in self.engines.iter_mut().enumerate() {
            if i > 0 && !self.allow_fallback {
                break;
            }

            let backend = engine.backend();
            if !engine.is_available().await {
                warn!("{} backend unavailable", backend);
                continue;
            }
            any_available = true;

            match engine.boot_image(path, image).await {
                Ok(true) => {
                    if i > 0 {
                        info!("Booted {} on fallback backend {}", path, backend);
                    } else {
                        info!("Booted {} on {}", path, backend);
                    }
                    self.selected = Some(backend);
                    self.booted_path = Some(path.to_string());
                    return Ok(backend);
                }
                Ok(false) => warn!("{} declined {}", backend, path),
                Err(e) => warn!("{} failed to boot {}: {}", backend, path, e),
            }
        }

        if !any_available {
            let backend = self
                .engines
                .first()
                .map_or_else(|| "no".to_string(), |e| e.backend().to_string());
            return Err(EngineError::Unavailable(backend));
        }
        Err(EngineError::BootFailed(path.to_string()))
    }

    fn active(&mut self) -> Result<&mut Box<dyn EmulatorEngine>, EngineError> {
        let selected = self.selected.ok_or(EngineError::NotBooted)?;
        self.engines
            .iter_mut()
            .find(|engine| engine.backend() == selected)
            .ok_or(EngineError::NotBooted)
    }

    pub async fn pause(&mut self) -> Result<(), EngineError> {
        self.active()?.pause().await
    }

    pub async fn resume(&mut self) -> Result<(), EngineError> {
        self.active()?.resume().await
    }

    /// Stop the running engine and clear the selection
    pub async fn stop(&mut self) -> Result<(), EngineError> {
        let result = self.active()?.stop().await;
        self.selected = None;
        self.booted_path = None;
        result
    }

    pub async fn save_state(&mut self, slot: u32) -> Result<(), EngineError> {
        check_slot(slot)?;
        self.active()?.save_state(slot).await
    }

    pub async fn load_state(&mut self, slot: u32) -> Result<(), EngineError> {
        check_slot(slot)?;
        self.active()?.load_state(slot).await
    }
}

fn check_slot(slot: u32) -> Result<(), EngineError> {
    if slot >= SAVE_STATE_SLOTS {
        return Err(EngineError::InvalidSlot(slot));
    }
    Ok(())
}

/// Commits staged images by booting them in an emulator session
pub struct EngineSink<'a> {
    session: &'a mut EmulatorSession,
}

impl<'a> EngineSink<'a> {
    pub fn new(session: &'a mut EmulatorSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl<'a> OperationSink for EngineSink<'a> {
    fn name(&self) -> &str {
        "emulator"
    }

    async fn commit(
        &mut self,
        kind: OperationKind,
        entry: &StagedEntry,
        progress: &mut ProgressReporter,
    ) -> Result<(), SinkFailure> {
        if kind == OperationKind::Restore {
            return Err(SinkFailure::new(
                "emulator engines do not accept NAND restores",
                progress.current(),
            ));
        }

        self.session
            .boot(entry.virtual_path(), entry.buffer())
            .await
            .map(|_| progress.report(100))
            .map_err(|e| SinkFailure::new(e.to_string(), progress.current()))
    }
}
