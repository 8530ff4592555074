//! Scripted collaborators for driving the hunter in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::RgbaImage;

use super::{HuntSettings, MoleHunter};
use crate::backend::{InputActuator, ScreenCapture};
use crate::error::BackendError;
use crate::events::{EventStream, HuntEvent, LogLevel, StopReason};
use crate::keys::KeyChord;
use crate::matcher::{Frame, MatchResult, Recognizer};
use crate::model::Point;

pub(crate) struct FakeScreen;

impl ScreenCapture for FakeScreen {
    fn capture(&self) -> Result<RgbaImage, BackendError> {
        Ok(RgbaImage::new(4, 4))
    }
}

pub(crate) struct BrokenScreen;

impl ScreenCapture for BrokenScreen {
    fn capture(&self) -> Result<RgbaImage, BackendError> {
        Err(BackendError::Capture("display unavailable".into()))
    }
}

#[derive(Default)]
struct Script {
    center: Point,
    visible: bool,
    /// Remaining sightings; None means always visible.
    remaining: Option<u32>,
    delay: Duration,
    error: Option<String>,
}

/// Recognizer whose answers are set per template path.
///
/// Templates without a script are never found.
#[derive(Default)]
pub(crate) struct ScriptedRecognizer {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<String>>,
    clears: AtomicUsize,
}

impl ScriptedRecognizer {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn script(&self, template: &str, f: impl FnOnce(&mut Script)) {
        let mut scripts = self.scripts.lock().unwrap();
        f(scripts.entry(template.to_string()).or_default());
    }

    pub(crate) fn show(&self, template: &str, center: Point) {
        self.script(template, |s| {
            s.visible = true;
            s.center = center;
            s.remaining = None;
        });
    }

    /// Visible for the next `times` matches, then gone.
    pub(crate) fn show_times(&self, template: &str, center: Point, times: u32) {
        self.script(template, |s| {
            s.visible = true;
            s.center = center;
            s.remaining = Some(times);
        });
    }

    pub(crate) fn fail(&self, template: &str, error: &str) {
        self.script(template, |s| s.error = Some(error.to_string()));
    }

    /// Make every match of `template` block for `delay`.
    pub(crate) fn slow(&self, template: &str, delay: Duration) {
        self.script(template, |s| s.delay = delay);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn cache_clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl Recognizer for ScriptedRecognizer {
    fn find(&self, _frame: &Frame, template: &str, _threshold: f64) -> MatchResult {
        self.calls.lock().unwrap().push(template.to_string());

        let (delay, outcome) = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(template) {
                None => (Duration::ZERO, Ok(None)),
                Some(script) => {
                    let outcome = if let Some(error) = &script.error {
                        Err(error.clone())
                    } else if !script.visible {
                        Ok(None)
                    } else {
                        match script.remaining.as_mut() {
                            Some(0) => Ok(None),
                            Some(n) => {
                                *n -= 1;
                                Ok(Some(script.center))
                            }
                            None => Ok(Some(script.center)),
                        }
                    };
                    (script.delay, outcome)
                }
            }
        };

        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        match outcome {
            Err(error) => MatchResult::failed(error),
            Ok(Some(center)) => MatchResult {
                found: true,
                top_left: Point::new(center.x - 2, center.y - 2),
                center,
                width: 4,
                height: 4,
                confidence: 0.97,
                error: None,
            },
            Ok(None) => MatchResult {
                found: false,
                top_left: Point::default(),
                center: Point::new(2, 2),
                width: 4,
                height: 4,
                confidence: 0.12,
                error: None,
            },
        }
    }

    fn clear_cache(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Action {
    Click(Point),
    Keys(Vec<KeyChord>),
    Scroll { up: bool, ticks: u32 },
}

#[derive(Default)]
pub(crate) struct RecordingActuator {
    actions: Mutex<Vec<Action>>,
}

impl RecordingActuator {
    pub(crate) fn actions(&self) -> Vec<Action> {
        self.actions.lock().unwrap().clone()
    }
}

impl InputActuator for RecordingActuator {
    fn click(&self, point: Point) -> Result<(), BackendError> {
        self.actions.lock().unwrap().push(Action::Click(point));
        Ok(())
    }

    fn send_keys(&self, chords: &[KeyChord]) -> Result<(), BackendError> {
        self.actions
            .lock()
            .unwrap()
            .push(Action::Keys(chords.to_vec()));
        Ok(())
    }

    fn scroll(&self, up: bool, ticks: u32) -> Result<(), BackendError> {
        self.actions
            .lock()
            .unwrap()
            .push(Action::Scroll { up, ticks });
        Ok(())
    }
}

/// Intervals short enough to keep tests fast.
pub(crate) fn quick_settings(max_rounds: Option<u64>) -> HuntSettings {
    HuntSettings {
        poll_interval_ms: 5,
        disappear_interval_ms: 1,
        click_delay_ms: 1,
        round_delay_ms: 1,
        max_rounds,
        ..HuntSettings::default()
    }
}

pub(crate) fn logged(events: &[HuntEvent], level: LogLevel, needle: &str) -> bool {
    events.iter().any(|e| {
        matches!(e, HuntEvent::Log { level: l, message, .. } if *l == level && message.contains(needle))
    })
}

/// A hunter wired to scripted collaborators.
pub(crate) struct Rig {
    pub(crate) hunter: MoleHunter,
    pub(crate) recognizer: Arc<ScriptedRecognizer>,
    pub(crate) actuator: Arc<RecordingActuator>,
    events: tokio::sync::Mutex<EventStream>,
}

impl Rig {
    pub(crate) fn new(recognizer: Arc<ScriptedRecognizer>, settings: HuntSettings) -> Self {
        Self::with_capture(recognizer, Arc::new(FakeScreen), settings)
    }

    pub(crate) fn with_capture(
        recognizer: Arc<ScriptedRecognizer>,
        capture: Arc<dyn ScreenCapture>,
        settings: HuntSettings,
    ) -> Self {
        let actuator = Arc::new(RecordingActuator::default());
        let (hunter, events) = MoleHunter::new(
            recognizer.clone(),
            capture,
            actuator.clone(),
            settings,
        );
        Self {
            hunter,
            recognizer,
            actuator,
            events: tokio::sync::Mutex::new(events),
        }
    }

    /// Collect events up to and including the next `hunting_stopped`.
    pub(crate) async fn finish(&self) -> (Vec<HuntEvent>, StopReason) {
        let mut rx = self.events.lock().await;
        let mut seen = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let event = tokio::time::timeout_at(deadline, rx.recv())
                .await
                .expect("hunt did not stop in time")
                .expect("event channel closed");
            if let HuntEvent::HuntingStopped { reason, .. } = &event {
                let reason = reason.clone();
                seen.push(event);
                return (seen, reason);
            }
            seen.push(event);
        }
    }
}
