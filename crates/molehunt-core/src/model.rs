//! Steps, groups and the group registry a hunt runs over.
//!
//! Steps and groups are authored elsewhere and handed to the hunter by
//! value; the hunter only reads them. Every type here round-trips through
//! serde so a project file can describe them directly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A screen position in physical pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// One configured action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// User-facing label, reported in events.
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub kind: StepKind,
}

fn default_enabled() -> bool {
    true
}

impl Step {
    pub fn new(name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            kind,
        }
    }

    pub fn image(name: impl Into<String>, step: ImageStep) -> Self {
        Self::new(name, StepKind::Image(step))
    }

    pub fn idle_click(name: impl Into<String>, x: i32, y: i32) -> Self {
        Self::new(
            name,
            StepKind::IdleClick(IdleClickStep {
                point: Point::new(x, y),
                stop_hunting: false,
            }),
        )
    }

    /// An idle click step that ends the hunt when reached.
    pub fn stop_hunting(name: impl Into<String>) -> Self {
        Self::new(
            name,
            StepKind::IdleClick(IdleClickStep {
                point: Point::default(),
                stop_hunting: true,
            }),
        )
    }

    pub fn branch(
        name: impl Into<String>,
        target_group: impl Into<String>,
        target_step: Option<usize>,
    ) -> Self {
        Self::new(
            name,
            StepKind::Jump(JumpStep::Branch {
                target_group: target_group.into(),
                target_step,
            }),
        )
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// The closed set of step kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    /// Recognize a template on screen and click it.
    Image(ImageStep),
    /// Click a fixed point without recognition.
    IdleClick(IdleClickStep),
    /// Call another group, or perform a key/scroll action in place.
    Jump(JumpStep),
    /// Ask the host to switch external configuration or text content.
    Config(ConfigStep),
}

impl StepKind {
    pub fn label(&self) -> &'static str {
        match self {
            StepKind::Image(_) => "image",
            StepKind::IdleClick(_) => "idle_click",
            StepKind::Jump(JumpStep::Branch { .. }) => "jump",
            StepKind::Jump(JumpStep::Input(_)) => "input",
            StepKind::Config(_) => "config",
        }
    }
}

/// Template recognition with its retry/wait refinements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageStep {
    /// Opaque template path, resolved by the host before the run.
    pub template: String,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub click_until_disappear: bool,
    #[serde(default)]
    pub wait_until_appear: bool,
    #[serde(default)]
    pub jump_to_previous_on_fail: bool,
    #[serde(default)]
    pub return_to_previous_on_timeout: bool,
    #[serde(default)]
    pub timeout_ms: u32,
    #[serde(default)]
    pub wait_after_click_ms: Option<u32>,
}

fn default_threshold() -> f64 {
    0.8
}

impl ImageStep {
    pub fn new(template: impl Into<String>, threshold: f64) -> Self {
        Self {
            template: template.into(),
            threshold,
            click_until_disappear: false,
            wait_until_appear: false,
            jump_to_previous_on_fail: false,
            return_to_previous_on_timeout: false,
            timeout_ms: 0,
            wait_after_click_ms: None,
        }
    }

    /// The configured threshold forced into `[0.0, 1.0]`.
    ///
    /// NaN is treated as 1.0 so a corrupt value never matches everything.
    pub fn threshold(&self) -> f64 {
        if self.threshold.is_nan() {
            return 1.0;
        }
        self.threshold.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdleClickStep {
    pub point: Point,
    /// End the hunt instead of clicking.
    #[serde(default)]
    pub stop_hunting: bool,
}

/// A jump either calls another group or performs input in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "jump", rename_all = "snake_case")]
pub enum JumpStep {
    Branch {
        target_group: String,
        /// Index to start at inside the target; None means the first step.
        #[serde(default)]
        target_step: Option<usize>,
    },
    Input(InputAction),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputAction {
    #[serde(default)]
    pub key_combo: Option<String>,
    #[serde(default)]
    pub key_wait_ms: u32,
    #[serde(default)]
    pub scroll: Option<ScrollAction>,
    #[serde(default)]
    pub order: InputOrder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollAction {
    pub up: bool,
    pub count: u32,
    #[serde(default)]
    pub wait_ms: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputOrder {
    #[default]
    KeyFirst,
    ScrollFirst,
}

/// Requests for the host to switch external state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigStep {
    #[serde(default)]
    pub switch_config: Option<String>,
    #[serde(default)]
    pub config_wait_ms: u32,
    #[serde(default)]
    pub switch_text: Option<String>,
    #[serde(default)]
    pub text_wait_ms: u32,
}

/// A named, ordered list of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Group {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }
}

/// Flat registry of sibling groups addressed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupSet {
    groups: Vec<Group>,
}

impl GroupSet {
    pub fn new(groups: Vec<Group>) -> Self {
        Self { groups }
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Position of a group by name. The first group wins on duplicates.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.groups.iter().position(|g| g.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Rewrite every image step's template path.
    ///
    /// Hosts use this to resolve relative paths before starting a run.
    pub fn map_templates(&mut self, mut f: impl FnMut(&str) -> String) {
        for group in &mut self.groups {
            for step in &mut group.steps {
                if let StepKind::Image(image) = &mut step.kind {
                    image.template = f(&image.template);
                }
            }
        }
    }

    /// Check the registry for authoring mistakes.
    ///
    /// Unresolved jumps are handled at execution time and out-of-range
    /// thresholds are clamped. The only finding that also blocks a start is
    /// an empty group used as the root.
    pub fn validate(&self) -> Vec<Finding> {
        let mut findings = Vec::new();

        for (gi, group) in self.groups.iter().enumerate() {
            if self.groups[..gi].iter().any(|g| g.name == group.name) {
                findings.push(Finding::error(
                    &group.name,
                    None,
                    format!("duplicate group name '{}'", group.name),
                ));
            }
            if group.steps.is_empty() {
                findings.push(Finding::warning(&group.name, None, "group has no steps"));
            }

            for (si, step) in group.steps.iter().enumerate() {
                match &step.kind {
                    StepKind::Image(image) => {
                        if !(0.0..=1.0).contains(&image.threshold) {
                            findings.push(Finding::error(
                                &group.name,
                                Some(si),
                                format!(
                                    "threshold {} is outside 0.0..=1.0 and will be clamped",
                                    image.threshold
                                ),
                            ));
                        }
                        if image.template.trim().is_empty() {
                            findings.push(Finding::error(
                                &group.name,
                                Some(si),
                                "image step has no template",
                            ));
                        }
                        if image.return_to_previous_on_timeout && image.timeout_ms == 0 {
                            findings.push(Finding::warning(
                                &group.name,
                                Some(si),
                                "return_to_previous_on_timeout has no effect without timeout_ms",
                            ));
                        }
                    }
                    StepKind::Jump(JumpStep::Branch {
                        target_group,
                        target_step,
                    }) => match self.get(target_group) {
                        None => findings.push(Finding::warning(
                            &group.name,
                            Some(si),
                            format!(
                                "jump target group '{}' does not exist and will be skipped",
                                target_group
                            ),
                        )),
                        Some(target) => {
                            if let Some(idx) = target_step {
                                if *idx >= target.steps.len() {
                                    findings.push(Finding::warning(
                                        &group.name,
                                        Some(si),
                                        format!(
                                            "jump target step {} is past the end of '{}' ({} steps)",
                                            idx,
                                            target_group,
                                            target.steps.len()
                                        ),
                                    ));
                                }
                            }
                        }
                    },
                    StepKind::Jump(JumpStep::Input(action)) => {
                        if let Some(combo) = &action.key_combo {
                            if crate::keys::parse_key_sequence(combo).is_none() {
                                findings.push(Finding::error(
                                    &group.name,
                                    Some(si),
                                    format!("unknown key combo '{}'", combo),
                                ));
                            }
                        }
                        if action.key_combo.is_none() && action.scroll.is_none() {
                            findings.push(Finding::warning(
                                &group.name,
                                Some(si),
                                "input jump has neither a key combo nor a scroll",
                            ));
                        }
                    }
                    StepKind::IdleClick(_) | StepKind::Config(_) => {}
                }
            }
        }

        findings
    }
}

impl From<Vec<Group>> for GroupSet {
    fn from(groups: Vec<Group>) -> Self {
        Self::new(groups)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// One validation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub group: String,
    pub step: Option<usize>,
    pub message: String,
}

impl Finding {
    fn error(group: &str, step: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            group: group.to_string(),
            step,
            message: message.into(),
        }
    }

    fn warning(group: &str, step: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            group: group.to_string(),
            step,
            message: message.into(),
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        match self.step {
            Some(step) => write!(f, "{}: {}[{}]: {}", level, self.group, step, self.message),
            None => write!(f, "{}: {}: {}", level, self.group, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_clamped() {
        assert_eq!(ImageStep::new("a.png", 1.5).threshold(), 1.0);
        assert_eq!(ImageStep::new("a.png", -0.2).threshold(), 0.0);
        assert_eq!(ImageStep::new("a.png", 0.75).threshold(), 0.75);
        assert_eq!(ImageStep::new("a.png", f64::NAN).threshold(), 1.0);
    }

    #[test]
    fn step_json_uses_kind_tag() {
        let json = r#"{
            "name": "mole",
            "kind": "image",
            "template": "mole.png",
            "threshold": 0.9,
            "click_until_disappear": true
        }"#;
        let step: Step = serde_json::from_str(json).unwrap();
        assert!(step.enabled);
        match step.kind {
            StepKind::Image(image) => {
                assert_eq!(image.template, "mole.png");
                assert!(image.click_until_disappear);
                assert!(!image.wait_until_appear);
                assert_eq!(image.wait_after_click_ms, None);
            }
            other => panic!("expected image step, got {:?}", other),
        }
    }

    #[test]
    fn jump_json_variants() {
        let branch: Step = serde_json::from_str(
            r#"{"name": "to boss", "kind": "jump", "jump": "branch", "target_group": "boss"}"#,
        )
        .unwrap();
        assert_eq!(
            branch.kind,
            StepKind::Jump(JumpStep::Branch {
                target_group: "boss".into(),
                target_step: None
            })
        );

        let input: Step = serde_json::from_str(
            r#"{
                "name": "scroll down",
                "enabled": false,
                "kind": "jump",
                "jump": "input",
                "scroll": {"up": false, "count": 3, "wait_ms": 100},
                "order": "scroll_first"
            }"#,
        )
        .unwrap();
        assert!(!input.enabled);
        match input.kind {
            StepKind::Jump(JumpStep::Input(action)) => {
                assert_eq!(action.order, InputOrder::ScrollFirst);
                assert_eq!(action.scroll.unwrap().count, 3);
                assert!(action.key_combo.is_none());
            }
            other => panic!("expected input jump, got {:?}", other),
        }
    }

    #[test]
    fn group_set_lookup() {
        let set = GroupSet::new(vec![
            Group::new("a", vec![Step::idle_click("x", 1, 1)]),
            Group::new("b", vec![]),
        ]);
        assert_eq!(set.index_of("b"), Some(1));
        assert!(set.get("missing").is_none());
    }

    #[test]
    fn map_templates_rewrites_only_image_steps() {
        let mut set = GroupSet::new(vec![Group::new(
            "a",
            vec![
                Step::image("m", ImageStep::new("mole.png", 0.8)),
                Step::idle_click("x", 1, 1),
            ],
        )]);
        set.map_templates(|p| format!("/assets/{}", p));
        match &set.groups()[0].steps[0].kind {
            StepKind::Image(image) => assert_eq!(image.template, "/assets/mole.png"),
            _ => unreachable!(),
        }
    }

    #[test]
    fn validate_reports_authoring_mistakes() {
        let set = GroupSet::new(vec![
            Group::new(
                "main",
                vec![
                    Step::image("bad", ImageStep::new("x.png", 1.2)),
                    Step::branch("nowhere", "ghost", None),
                    Step::branch("too far", "side", Some(5)),
                    Step::new(
                        "keys",
                        StepKind::Jump(JumpStep::Input(InputAction {
                            key_combo: Some("Ctrl+Nope".into()),
                            ..InputAction::default()
                        })),
                    ),
                ],
            ),
            Group::new("side", vec![Step::idle_click("x", 0, 0)]),
            Group::new("side", vec![]),
        ]);

        let findings = set.validate();
        let errors: Vec<_> = findings
            .iter()
            .filter(|f| f.severity == Severity::Error)
            .collect();

        assert!(errors.iter().any(|f| f.message.contains("threshold")));
        assert!(!errors.iter().any(|f| f.message.contains("ghost")));
        assert!(errors.iter().any(|f| f.message.contains("Ctrl+Nope")));
        assert!(errors.iter().any(|f| f.message.contains("duplicate")));
        assert!(findings
            .iter()
            .any(|f| f.severity == Severity::Warning && f.message.contains("past the end")));
        assert!(findings
            .iter()
            .any(|f| f.severity == Severity::Warning && f.message.contains("'ghost'")));
    }

    #[test]
    fn validate_clean_project_has_no_findings() {
        let set = GroupSet::new(vec![
            Group::new(
                "main",
                vec![
                    Step::image("mole", ImageStep::new("mole.png", 0.8)),
                    Step::branch("bonus", "bonus", None),
                ],
            ),
            Group::new("bonus", vec![Step::idle_click("tap", 10, 10)]),
        ]);
        assert!(set.validate().is_empty());
    }

    #[test]
    fn finding_display() {
        let f = Finding::error("main", Some(2), "boom");
        assert_eq!(f.to_string(), "error: main[2]: boom");
    }
}
