use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

/// Flag the frame state manager reads at the start of every frame. While set,
/// every tick runs the host's own update and captured input is flushed.
#[derive(Debug, Clone, Default)]
pub struct SoftToggle {
    disabled: Arc<AtomicBool>,
}

impl SoftToggle {
    pub fn new(disabled: bool) -> Self {
        Self {
            disabled: Arc::new(AtomicBool::new(disabled)),
        }
    }

    pub fn is_set(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    pub(crate) fn set(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::Release);
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("patch target '{target}' was not found")]
    NotFound { target: String },
    #[error("patch target '{target}' rejected the change: {reason}")]
    Rejected { target: String, reason: String },
}

/// A reversible change to the host that stops it from recomputing its own
/// end-of-tick velocity while the pipeline is active.
pub trait PatchPoint: Send {
    fn apply(&mut self) -> Result<(), PatchError>;
    fn revert(&mut self) -> Result<(), PatchError>;
}

/// Locates a [`PatchPoint`]. Only ever asked once.
pub trait PatchResolver: Send {
    fn resolve(&mut self) -> Result<Box<dyn PatchPoint>, PatchError>;
}

enum PatchSlot {
    None,
    Unresolved(Box<dyn PatchResolver>),
    Resolved {
        patch: Box<dyn PatchPoint>,
        applied: bool,
    },
    Unavailable,
}

/// Enables and disables the pipeline at runtime.
///
/// Enabling applies the host patch, disabling reverts it. The patch is
/// resolved on the first call either way. Setting the state it is already in
/// does nothing.
pub struct ToggleController {
    soft_toggle: SoftToggle,
    enabled: Option<bool>,
    patch: PatchSlot,
}

impl ToggleController {
    pub fn new(soft_toggle: SoftToggle) -> Self {
        Self {
            soft_toggle,
            enabled: None,
            patch: PatchSlot::None,
        }
    }

    pub fn with_patch(mut self, resolver: Box<dyn PatchResolver>) -> Self {
        self.patch = PatchSlot::Unresolved(resolver);
        self
    }

    pub fn soft_toggle(&self) -> &SoftToggle {
        &self.soft_toggle
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(!self.soft_toggle.is_set())
    }

    pub fn patch_applied(&self) -> bool {
        matches!(self.patch, PatchSlot::Resolved { applied: true, .. })
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == Some(enabled) {
            return;
        }
        self.enabled = Some(enabled);
        self.soft_toggle.set(!enabled);
        self.sync_patch(enabled);
        info!(enabled, "pipeline_toggled");
    }

    fn sync_patch(&mut self, applied_wanted: bool) {
        if let PatchSlot::Unresolved(_) = self.patch {
            let PatchSlot::Unresolved(mut resolver) =
                std::mem::replace(&mut self.patch, PatchSlot::Unavailable)
            else {
                return;
            };
            match resolver.resolve() {
                Ok(patch) => {
                    self.patch = PatchSlot::Resolved {
                        patch,
                        applied: false,
                    }
                }
                Err(error) => {
                    warn!(error = %error, "patch_resolve_failed");
                    return;
                }
            }
        }

        let PatchSlot::Resolved { patch, applied } = &mut self.patch else {
            return;
        };
        if *applied == applied_wanted {
            return;
        }
        let result = if applied_wanted {
            patch.apply()
        } else {
            patch.revert()
        };
        match result {
            Ok(()) => *applied = applied_wanted,
            Err(error) => warn!(error = %error, applied_wanted, "patch_toggle_failed"),
        }
    }
}
