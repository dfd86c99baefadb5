//! Per-bundle lazy trigger state machine.

use crate::mount::{MountPoint, MountedModule};
use crate::runtime::{Runtime, RuntimeError};
use crate::trigger::condition::{PageEvent, TriggerCondition};
use log::{debug, error, info};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// `Idle -> Loading -> Mounted | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Idle,
    Loading,
    Mounted,
    Failed,
}

impl TriggerState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Mounted => "mounted",
            Self::Failed => "failed",
        }
    }
}

/// Result of delivering one event to a trigger.
#[derive(Debug)]
pub enum TriggerOutcome {
    /// The event did not qualify or the trigger already left `Idle`.
    Ignored(TriggerState),
    Mounted(Arc<MountedModule>),
    Failed(RuntimeError),
}

/// Defers loading `bundle` and mounting `mount_point` until a qualifying event.
#[derive(Debug)]
pub struct LazyTrigger {
    bundle: String,
    condition: TriggerCondition,
    mount_point: MountPoint,
    state: Mutex<TriggerState>,
}

impl LazyTrigger {
    pub fn new(
        bundle: impl Into<String>,
        condition: TriggerCondition,
        mount_point: MountPoint,
    ) -> Self {
        Self {
            bundle: bundle.into(),
            condition,
            mount_point,
            state: Mutex::new(TriggerState::Idle),
        }
    }

    pub fn bundle(&self) -> &str {
        &self.bundle
    }

    pub fn mount_point(&self) -> &MountPoint {
        &self.mount_point
    }

    pub fn state(&self) -> TriggerState {
        *self.lock_state()
    }

    pub fn matches(&self, event: &PageEvent) -> bool {
        self.condition.matches(event)
    }

    /// Delivers `event`; on the first qualifying one, loads the bundle and
    /// mounts the module through `runtime`.
    ///
    /// Re-entry is guarded by a state check: events arriving while `Loading`
    /// or after a terminal state are ignored.
    pub async fn fire(&self, event: &PageEvent, runtime: &Runtime) -> TriggerOutcome {
        if !self.condition.matches(event) {
            return TriggerOutcome::Ignored(self.state());
        }
        if let Err(current) = self.begin() {
            debug!(
                "event=trigger_fire module=trigger status=skip bundle={} state={}",
                self.bundle,
                current.as_str()
            );
            return TriggerOutcome::Ignored(current);
        }

        info!(
            "event=trigger_fire module=trigger status=start bundle={} condition={} mount_id={}",
            self.bundle,
            self.condition.kind(),
            self.mount_point.id
        );

        match runtime.mount_bundle(&self.bundle, &self.mount_point).await {
            Ok(mounted) => {
                self.transition(TriggerState::Mounted);
                TriggerOutcome::Mounted(mounted)
            }
            Err(err) => {
                error!(
                    "event=trigger_fire module=trigger status=error bundle={} error={}",
                    self.bundle, err
                );
                self.transition(TriggerState::Failed);
                TriggerOutcome::Failed(err)
            }
        }
    }

    /// `Idle -> Loading`; returns the current state when already past `Idle`.
    fn begin(&self) -> Result<(), TriggerState> {
        let mut state = self.lock_state();
        if *state != TriggerState::Idle {
            return Err(*state);
        }
        *state = TriggerState::Loading;
        Ok(())
    }

    fn transition(&self, next: TriggerState) {
        *self.lock_state() = next;
        info!(
            "event=trigger_transition module=trigger status=ok bundle={} state={}",
            self.bundle,
            next.as_str()
        );
    }

    fn lock_state(&self) -> MutexGuard<'_, TriggerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
