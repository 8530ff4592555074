//! The execution loop of a single hunt.
//!
//! A run walks an immutable snapshot of the groups. Sequential mode keeps an
//! explicit stack of call frames: a branch jump pushes a frame for the
//! target group, falling off the end of a group or reaching a stop step
//! inside a called group pops it and resumes the caller at the step after
//! the jump. Only the root frame completing counts as a round, and only a
//! stop step in the root frame ends the run.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::backend::InputActuator;
use crate::error::BackendError;
use crate::events::{HuntEvent, StopReason};
use crate::hunter::stop::{Cancelled, StopSignal};
use crate::hunter::{HuntMode, Inner, RunId};
use crate::keys::parse_key_sequence;
use crate::matcher::{Frame, MatchResult};
use crate::model::{
    ConfigStep, Group, GroupSet, IdleClickStep, ImageStep, InputAction, InputOrder, JumpStep,
    Point, Step, StepKind,
};

/// Why execution left the loop.
#[derive(Debug)]
pub(crate) enum Halt {
    Cancelled,
    StopStep { group: String, step: String },
    RoundLimit(u64),
    Failed(String),
}

impl From<Cancelled> for Halt {
    fn from(_: Cancelled) -> Self {
        Halt::Cancelled
    }
}

impl From<Halt> for StopReason {
    fn from(halt: Halt) -> Self {
        match halt {
            Halt::Cancelled => StopReason::Cancelled,
            Halt::StopStep { group, step } => StopReason::StopStep { group, step },
            Halt::RoundLimit(rounds) => StopReason::RoundLimit { rounds },
            Halt::Failed(message) => StopReason::Failed { message },
        }
    }
}

pub(crate) type Flow<T> = Result<T, Halt>;

/// Where the cursor goes after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Advance,
    Back,
    Call { group: usize, start: usize },
    /// Leave the current called group early.
    Return,
}

/// Position inside one group on the call stack.
#[derive(Debug, Clone, Copy)]
struct CallFrame {
    group: usize,
    cursor: usize,
}

pub(crate) struct Run {
    pub(crate) id: RunId,
    pub(crate) groups: Arc<GroupSet>,
    pub(crate) root: usize,
    pub(crate) inner: Arc<Inner>,
    pub(crate) stop: StopSignal,
    /// Templates whose load error was already logged this run.
    warned: Mutex<Vec<String>>,
}

impl Run {
    pub(crate) fn new(
        id: RunId,
        groups: Arc<GroupSet>,
        root: usize,
        inner: Arc<Inner>,
        stop: StopSignal,
    ) -> Self {
        Self {
            id,
            groups,
            root,
            inner,
            stop,
            warned: Mutex::new(Vec::new()),
        }
    }

    /// Drive rounds until something halts the run.
    pub(crate) async fn execute(self) -> StopReason {
        let halt = match self.rounds().await {
            Ok(never) => match never {},
            Err(halt) => halt,
        };
        if let Halt::Failed(message) = &halt {
            self.inner.events.error(format!("Hunt aborted: {}", message));
        }
        halt.into()
    }

    async fn rounds(&self) -> Flow<std::convert::Infallible> {
        let settings = &self.inner.settings;
        let mut completed: u64 = 0;

        loop {
            self.stop.check()?;
            match self.inner.mode() {
                HuntMode::Sequential => self.sequential_round().await?,
                HuntMode::FullScreen => self.full_screen_round().await?,
            }

            completed += 1;
            tracing::debug!("Run {} finished round {}", self.id, completed);
            if settings.max_rounds.is_some_and(|max| completed >= max) {
                self.inner
                    .events
                    .info(format!("Round limit reached after {} round(s)", completed));
                return Err(Halt::RoundLimit(completed));
            }

            self.stop.sleep(settings.round_delay()).await?;
            // A group with nothing awaitable must not starve the runtime
            tokio::task::yield_now().await;
        }
    }

    async fn sequential_round(&self) -> Flow<()> {
        let groups = Arc::clone(&self.groups);
        let mut stack = vec![CallFrame {
            group: self.root,
            cursor: 0,
        }];

        while let Some(&frame) = stack.last() {
            let group = &groups.groups()[frame.group];

            if frame.cursor >= group.steps.len() {
                Self::return_to_caller(&mut stack, group);
                continue;
            }

            self.stop.check()?;
            let step = &group.steps[frame.cursor];
            let next = if step.enabled {
                self.step(group, frame.cursor, step, stack.len()).await?
            } else {
                Cursor::Advance
            };

            match next {
                Cursor::Advance => {
                    if let Some(top) = stack.last_mut() {
                        top.cursor += 1;
                    }
                }
                Cursor::Back => {
                    if let Some(top) = stack.last_mut() {
                        top.cursor = top.cursor.saturating_sub(1);
                    }
                }
                Cursor::Call { group, start } => stack.push(CallFrame {
                    group,
                    cursor: start,
                }),
                Cursor::Return => Self::return_to_caller(&mut stack, group),
            }
        }

        Ok(())
    }

    fn return_to_caller(stack: &mut Vec<CallFrame>, group: &Group) {
        stack.pop();
        if let Some(caller) = stack.last_mut() {
            tracing::debug!("Returned from group '{}'", group.name);
            caller.cursor += 1;
        }
    }

    async fn step(&self, group: &Group, index: usize, step: &Step, depth: usize) -> Flow<Cursor> {
        tracing::trace!(
            "{}[{}] '{}' ({})",
            group.name,
            index,
            step.name,
            step.kind.label()
        );
        match &step.kind {
            StepKind::Image(image) => self.image_step(group, index, step, image).await,
            StepKind::IdleClick(idle) if idle.stop_hunting && depth > 1 => {
                self.inner.events.info(format!(
                    "Stop step '{}' ends called group '{}'",
                    step.name, group.name
                ));
                Ok(Cursor::Return)
            }
            StepKind::IdleClick(idle) => {
                self.idle_click(group, step, idle).await?;
                Ok(Cursor::Advance)
            }
            StepKind::Jump(JumpStep::Branch {
                target_group,
                target_step,
            }) => Ok(self.branch(step, target_group, *target_step, depth)),
            StepKind::Jump(JumpStep::Input(action)) => {
                self.input_action(step, action).await?;
                Ok(Cursor::Advance)
            }
            StepKind::Config(config) => {
                self.config_switch(config).await?;
                Ok(Cursor::Advance)
            }
        }
    }

    async fn image_step(
        &self,
        group: &Group,
        index: usize,
        step: &Step,
        image: &ImageStep,
    ) -> Flow<Cursor> {
        let threshold = image.threshold();
        let poll = self.inner.settings.poll_interval();

        let hit = if image.wait_until_appear {
            loop {
                let result = self.recognize(&image.template, threshold).await?;
                if result.found {
                    break result;
                }
                self.stop.sleep(poll).await?;
            }
        } else if image.return_to_previous_on_timeout && image.timeout_ms > 0 {
            let deadline = Instant::now() + Duration::from_millis(u64::from(image.timeout_ms));
            loop {
                let result = self.recognize(&image.template, threshold).await?;
                if result.found {
                    break result;
                }
                let now = Instant::now();
                if now >= deadline {
                    return Ok(self.timed_out(group, index, step, image.timeout_ms));
                }
                self.stop.sleep(poll.min(deadline - now)).await?;
            }
        } else {
            let result = self.recognize(&image.template, threshold).await?;
            if !result.found {
                return Ok(self.missed(group, index, step, image, &result));
            }
            result
        };

        self.strike(step, &hit).await?;

        if image.click_until_disappear {
            self.click_until_gone(step, image, threshold).await?;
        }
        if let Some(ms) = image.wait_after_click_ms {
            self.stop.sleep(Duration::from_millis(u64::from(ms))).await?;
        }
        Ok(Cursor::Advance)
    }

    fn timed_out(&self, group: &Group, index: usize, step: &Step, timeout_ms: u32) -> Cursor {
        if index == 0 {
            self.inner.events.info(format!(
                "'{}' not seen within {}ms; first step of '{}', moving on",
                step.name, timeout_ms, group.name
            ));
            Cursor::Advance
        } else {
            self.inner.events.info(format!(
                "'{}' not seen within {}ms; returning to '{}'",
                step.name,
                timeout_ms,
                group.steps[index - 1].name
            ));
            Cursor::Back
        }
    }

    fn missed(
        &self,
        group: &Group,
        index: usize,
        step: &Step,
        image: &ImageStep,
        result: &MatchResult,
    ) -> Cursor {
        if image.jump_to_previous_on_fail && index > 0 {
            self.inner.events.debug(format!(
                "'{}' not found ({:.3}); retrying from '{}'",
                step.name,
                result.confidence,
                group.steps[index - 1].name
            ));
            Cursor::Back
        } else {
            self.inner.events.debug(format!(
                "'{}' not found ({:.3}); skipped",
                step.name, result.confidence
            ));
            Cursor::Advance
        }
    }

    /// Report and click a recognized target.
    pub(crate) async fn strike(&self, step: &Step, hit: &MatchResult) -> Flow<()> {
        self.inner.events.emit(HuntEvent::TargetFound {
            name: step.name.clone(),
            point: hit.center,
            confidence: hit.confidence,
        });
        self.inner.events.info(format!(
            "Found '{}' at {} ({:.3})",
            step.name, hit.center, hit.confidence
        ));
        self.click(hit.center).await
    }

    async fn click_until_gone(&self, step: &Step, image: &ImageStep, threshold: f64) -> Flow<()> {
        let settings = &self.inner.settings;
        let mut clicks: u32 = 0;
        loop {
            self.stop.sleep(settings.disappear_interval()).await?;
            let result = self.recognize(&image.template, threshold).await?;
            if !result.found {
                return Ok(());
            }
            if clicks >= settings.max_disappear_clicks {
                self.inner.events.warn(format!(
                    "'{}' still visible after {} extra clicks; giving up",
                    step.name, clicks
                ));
                return Ok(());
            }
            self.click(result.center).await?;
            clicks += 1;
        }
    }

    pub(crate) async fn idle_click(
        &self,
        group: &Group,
        step: &Step,
        idle: &IdleClickStep,
    ) -> Flow<()> {
        if idle.stop_hunting {
            self.inner.events.info(format!(
                "Stop step '{}' reached in '{}'",
                step.name, group.name
            ));
            return Err(Halt::StopStep {
                group: group.name.clone(),
                step: step.name.clone(),
            });
        }
        self.inner
            .events
            .debug(format!("Idle click '{}' at {}", step.name, idle.point));
        self.click(idle.point).await
    }

    fn branch(
        &self,
        step: &Step,
        target_group: &str,
        target_step: Option<usize>,
        depth: usize,
    ) -> Cursor {
        let Some(group) = self.groups.index_of(target_group) else {
            self.inner.events.warn(format!(
                "Jump '{}' targets missing group '{}'; continuing",
                step.name, target_group
            ));
            return Cursor::Advance;
        };

        let max_depth = self.inner.settings.max_call_depth;
        if depth > max_depth {
            self.inner.events.warn(format!(
                "Jump '{}' to '{}' exceeds call depth {}; skipped",
                step.name, target_group, max_depth
            ));
            return Cursor::Advance;
        }

        let len = self.groups.groups()[group].steps.len();
        let start = match target_step {
            None => 0,
            Some(i) if i < len => i,
            Some(i) => {
                self.inner.events.warn(format!(
                    "Jump '{}' targets step {} of '{}' which has {} step(s); starting at 0",
                    step.name, i, target_group, len
                ));
                0
            }
        };

        self.inner.events.debug(format!(
            "Jump '{}' into '{}' at step {}",
            step.name, target_group, start
        ));
        Cursor::Call { group, start }
    }

    async fn input_action(&self, step: &Step, action: &InputAction) -> Flow<()> {
        match action.order {
            InputOrder::KeyFirst => {
                self.press_keys(step, action).await?;
                self.scroll(action).await
            }
            InputOrder::ScrollFirst => {
                self.scroll(action).await?;
                self.press_keys(step, action).await
            }
        }
    }

    async fn press_keys(&self, step: &Step, action: &InputAction) -> Flow<()> {
        let Some(combo) = &action.key_combo else {
            return Ok(());
        };
        match parse_key_sequence(combo) {
            Some(chords) => {
                self.inner
                    .events
                    .debug(format!("Sending '{}' for '{}'", combo, step.name));
                self.actuate("send keys", move |a| a.send_keys(&chords))
                    .await?;
            }
            None => {
                self.inner.events.warn(format!(
                    "{} in step '{}'; key press skipped",
                    BackendError::UnknownKey(combo.clone()),
                    step.name
                ));
            }
        }
        self.stop
            .sleep(Duration::from_millis(u64::from(action.key_wait_ms)))
            .await?;
        Ok(())
    }

    async fn scroll(&self, action: &InputAction) -> Flow<()> {
        let Some(scroll) = &action.scroll else {
            return Ok(());
        };
        let (up, count) = (scroll.up, scroll.count);
        if count > 0 {
            self.actuate("scroll", move |a| a.scroll(up, count)).await?;
        }
        self.stop
            .sleep(Duration::from_millis(u64::from(scroll.wait_ms)))
            .await?;
        Ok(())
    }

    async fn config_switch(&self, config: &ConfigStep) -> Flow<()> {
        if let Some(name) = &config.switch_config {
            self.inner
                .events
                .info(format!("Requesting config switch to '{}'", name));
            self.inner
                .events
                .emit(HuntEvent::ConfigSwitchRequested { name: name.clone() });
            self.stop
                .sleep(Duration::from_millis(u64::from(config.config_wait_ms)))
                .await?;
        }
        if let Some(name) = &config.switch_text {
            self.inner
                .events
                .info(format!("Requesting text switch to '{}'", name));
            self.inner
                .events
                .emit(HuntEvent::TextSwitchRequested { name: name.clone() });
            self.stop
                .sleep(Duration::from_millis(u64::from(config.text_wait_ms)))
                .await?;
        }
        Ok(())
    }

    /// Grab the screen on the blocking pool.
    pub(crate) async fn capture(&self) -> Flow<Arc<Frame>> {
        let capture = Arc::clone(&self.inner.capture);
        match tokio::task::spawn_blocking(move || capture.capture().map(|img| Frame::from_rgba(&img)))
            .await
        {
            Ok(Ok(frame)) => Ok(Arc::new(frame)),
            Ok(Err(e)) => Err(Halt::Failed(e.to_string())),
            Err(e) => Err(Halt::Failed(format!("capture task failed: {}", e))),
        }
    }

    /// Capture, then match one template against the fresh frame.
    async fn recognize(&self, template: &str, threshold: f64) -> Flow<MatchResult> {
        let frame = self.capture().await?;
        let recognizer = Arc::clone(&self.inner.recognizer);
        let path = template.to_string();
        let result =
            tokio::task::spawn_blocking(move || recognizer.find(&frame, &path, threshold))
                .await
                .map_err(|e| Halt::Failed(format!("match task failed: {}", e)))?;
        self.note_error(template, &result);
        Ok(result)
    }

    /// Log a template error once per template per run.
    pub(crate) fn note_error(&self, template: &str, result: &MatchResult) {
        let Some(error) = &result.error else {
            return;
        };
        let mut warned = self.warned.lock().unwrap_or_else(|e| e.into_inner());
        if !warned.iter().any(|t| t == template) {
            warned.push(template.to_string());
            self.inner
                .events
                .warn(format!("Template treated as not found: {}", error));
        }
    }

    pub(crate) async fn click(&self, point: Point) -> Flow<()> {
        self.actuate("click", move |a| a.click(point)).await
    }

    async fn actuate<F>(&self, what: &'static str, f: F) -> Flow<()>
    where
        F: FnOnce(&dyn InputActuator) -> Result<(), BackendError> + Send + 'static,
    {
        let actuator = Arc::clone(&self.inner.actuator);
        match tokio::task::spawn_blocking(move || f(actuator.as_ref())).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Halt::Failed(format!("{}: {}", what, e))),
            Err(e) => Err(Halt::Failed(format!("{} task failed: {}", what, e))),
        }
    }
}
