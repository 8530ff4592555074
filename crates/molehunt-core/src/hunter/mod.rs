//! The hunt lifecycle.
//!
//! A [`MoleHunter`] owns the collaborators (recognizer, screen capture,
//! input) and at most one active run. `start` snapshots the groups, spawns
//! the run on the current tokio runtime and returns immediately; progress is
//! reported on the [`EventStream`] returned by [`MoleHunter::new`].

mod full_screen;
mod run;
mod settings;
mod stop;
#[cfg(test)]
mod testing;

pub use settings::HuntSettings;
pub use stop::{stop_pair, Cancelled, StopHandle, StopSignal};

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::watch;
use uuid::Uuid;

use crate::backend::{InputActuator, ScreenCapture};
use crate::error::ApiError;
use crate::events::{EventSink, EventStream, HuntEvent, StopReason};
use crate::matcher::Recognizer;
use crate::model::GroupSet;
use run::Run;

/// Identifies one run from `start` to `hunting_stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a round walks the root group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HuntMode {
    /// One step at a time, honoring waits, retries and jumps.
    #[default]
    Sequential,
    /// Match every image step against one capture and click all hits.
    FullScreen,
}

impl fmt::Display for HuntMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HuntMode::Sequential => write!(f, "sequential"),
            HuntMode::FullScreen => write!(f, "full_screen"),
        }
    }
}

struct ActiveRun {
    id: RunId,
    group: String,
    stop: StopHandle,
}

/// State shared between the hunter handle and its run task.
pub(crate) struct Inner {
    pub(crate) recognizer: Arc<dyn Recognizer>,
    pub(crate) capture: Arc<dyn ScreenCapture>,
    pub(crate) actuator: Arc<dyn InputActuator>,
    pub(crate) settings: HuntSettings,
    pub(crate) events: EventSink,
    mode: Mutex<HuntMode>,
    active: Mutex<Option<ActiveRun>>,
    running: watch::Sender<bool>,
}

impl Inner {
    pub(crate) fn mode(&self) -> HuntMode {
        *self.mode.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Tear down a finished run. Runs exactly once per run.
    fn finish(&self, id: RunId, reason: StopReason) {
        // Held until `running` drops so a concurrent start cannot be
        // reported idle.
        let mut active = self.active();
        if active.as_ref().is_some_and(|run| run.id == id) {
            *active = None;
        }
        self.events
            .info(format!("Hunt {} stopped: {}", id, describe(&reason)));
        self.events.emit(HuntEvent::HuntingStopped { run_id: id, reason });
        self.running.send_replace(false);
    }
}

fn describe(reason: &StopReason) -> String {
    match reason {
        StopReason::Cancelled => "cancelled".to_string(),
        StopReason::StopStep { group, step } => format!("stop step '{}' in '{}'", step, group),
        StopReason::RoundLimit { rounds } => format!("{} round(s) completed", rounds),
        StopReason::Failed { message } => format!("failed: {}", message),
    }
}

/// Drives hunts against the screen.
///
/// Cloning yields another handle to the same hunter.
#[derive(Clone)]
pub struct MoleHunter {
    inner: Arc<Inner>,
}

impl MoleHunter {
    pub fn new(
        recognizer: Arc<dyn Recognizer>,
        capture: Arc<dyn ScreenCapture>,
        actuator: Arc<dyn InputActuator>,
        settings: HuntSettings,
    ) -> (Self, EventStream) {
        let (events, stream) = EventSink::channel();
        let (running, _) = watch::channel(false);
        let inner = Inner {
            recognizer,
            capture,
            actuator,
            settings,
            events,
            mode: Mutex::new(HuntMode::default()),
            active: Mutex::new(None),
            running,
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            stream,
        )
    }

    pub fn settings(&self) -> &HuntSettings {
        &self.inner.settings
    }

    /// Start hunting from `root`.
    ///
    /// Must be called from within a tokio runtime. Fails when a run is
    /// already active, `root` is not one of `groups`, or `root` has no
    /// enabled step.
    pub fn start(&self, root: &str, groups: GroupSet, mode: HuntMode) -> Result<RunId, ApiError> {
        let runtime = Handle::try_current().map_err(|e| {
            let err = ApiError::internal(format!("No tokio runtime to run the hunt on: {}", e));
            self.inner.events.error(err.message.clone());
            err
        })?;

        let mut active = self.inner.active();
        if let Some(run) = active.as_ref() {
            let err = ApiError::already_running(&run.group);
            self.inner.events.warn(err.message.clone());
            return Err(err);
        }
        if groups.is_empty() {
            let err = ApiError::no_groups();
            self.inner.events.error(err.message.clone());
            return Err(err);
        }
        let Some(root_index) = groups.index_of(root) else {
            let err = ApiError::group_not_found(root);
            self.inner.events.error(err.message.clone());
            return Err(err);
        };
        if !groups.groups()[root_index].steps.iter().any(|s| s.enabled) {
            let err = ApiError::empty_group(root);
            self.inner.events.error(err.message.clone());
            return Err(err);
        }

        let id = RunId::new();
        let (stop, signal) = stop_pair();
        *self.inner.mode.lock().unwrap_or_else(|e| e.into_inner()) = mode;
        *active = Some(ActiveRun {
            id,
            group: root.to_string(),
            stop,
        });
        self.inner.running.send_replace(true);
        drop(active);

        self.inner.events.info(format!(
            "Hunt {} started on '{}' ({} mode)",
            id, root, mode
        ));
        self.inner.events.emit(HuntEvent::HuntingStarted {
            run_id: id,
            group: root.to_string(),
            mode,
        });

        let run = Run::new(
            id,
            Arc::new(groups),
            root_index,
            Arc::clone(&self.inner),
            signal,
        );
        let task = runtime.spawn(run.execute());
        let inner = Arc::clone(&self.inner);
        runtime.spawn(async move {
            let reason = match task.await {
                Ok(reason) => reason,
                Err(e) => {
                    let message = if e.is_panic() {
                        "run task panicked".to_string()
                    } else {
                        format!("run task aborted: {}", e)
                    };
                    inner.events.error(format!("Hunt {}: {}", id, message));
                    StopReason::Failed { message }
                }
            };
            inner.finish(id, reason);
        });

        Ok(id)
    }

    /// Ask the active run to stop. Safe to call at any time, any number of
    /// times, from any thread.
    pub fn stop(&self) {
        if let Some(run) = self.inner.active().as_ref() {
            tracing::debug!("Stop requested for hunt {}", run.id);
            run.stop.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        *self.inner.running.borrow()
    }

    pub fn mode(&self) -> HuntMode {
        self.inner.mode()
    }

    /// Switch modes. A running hunt picks the change up at its next round.
    pub fn set_mode(&self, mode: HuntMode) {
        let previous = std::mem::replace(
            &mut *self.inner.mode.lock().unwrap_or_else(|e| e.into_inner()),
            mode,
        );
        if previous != mode {
            self.inner
                .events
                .info(format!("Mode changed from {} to {}", previous, mode));
        }
    }

    /// Drop cached templates so edited files are re-read.
    pub fn clear_template_cache(&self) {
        self.inner.recognizer.clear_cache();
        self.inner.events.info("Template cache cleared");
    }

    /// Resolves once no run is active.
    pub async fn wait_until_idle(&self) {
        let mut rx = self.inner.running.subscribe();
        let _ = rx.wait_for(|running| !*running).await;
    }
}
