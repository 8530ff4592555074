//! Full-screen rounds: one capture, every image step matched at once.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::hunter::run::{Flow, Halt, Run};
use crate::matcher::MatchResult;
use crate::model::{Step, StepKind};

impl Run {
    /// One round in full-screen mode.
    ///
    /// Hits are clicked in list order no matter which match finished first.
    /// With no hits the idle clicks of the root group run instead. Jump and
    /// config steps, and the per-step wait and retry options, do not apply.
    pub(crate) async fn full_screen_round(&self) -> Flow<()> {
        let groups = Arc::clone(&self.groups);
        let root = &groups.groups()[self.root];
        let frame = self.capture().await?;

        let mut matches = JoinSet::new();
        for (index, step) in root.steps.iter().enumerate() {
            let StepKind::Image(image) = &step.kind else {
                continue;
            };
            if !step.enabled {
                continue;
            }
            let recognizer = Arc::clone(&self.inner.recognizer);
            let frame = Arc::clone(&frame);
            let template = image.template.clone();
            let threshold = image.threshold();
            matches.spawn_blocking(move || {
                let result = recognizer.find(&frame, &template, threshold);
                (index, template, result)
            });
        }

        let mut results = Vec::with_capacity(matches.len());
        loop {
            let joined = tokio::select! {
                joined = matches.join_next() => joined,
                _ = self.stop.stopped() => return Err(Halt::Cancelled),
            };
            match joined {
                Some(Ok(done)) => results.push(done),
                Some(Err(e)) => return Err(Halt::Failed(format!("match task failed: {}", e))),
                None => break,
            }
        }
        results.sort_by_key(|(index, _, _)| *index);

        let hits: Vec<(&Step, MatchResult)> = results
            .into_iter()
            .filter_map(|(index, template, result)| {
                self.note_error(&template, &result);
                result.found.then(|| (&root.steps[index], result))
            })
            .collect();

        let delay = self.inner.settings.click_delay();
        if hits.is_empty() {
            self.inner.events.debug("No targets on screen; running idle clicks");
            let mut first = true;
            for step in root.steps.iter().filter(|s| s.enabled) {
                let StepKind::IdleClick(idle) = &step.kind else {
                    continue;
                };
                if !first {
                    self.stop.sleep(delay).await?;
                }
                first = false;
                self.idle_click(root, step, idle).await?;
            }
            return Ok(());
        }

        for (n, (step, hit)) in hits.iter().enumerate() {
            if n > 0 {
                self.stop.sleep(delay).await?;
            }
            self.strike(step, hit).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::events::{HuntEvent, StopReason};
    use crate::hunter::testing::*;
    use crate::hunter::HuntMode;
    use crate::model::{Group, GroupSet, ImageStep, Point, Step};

    fn image(name: &str, template: &str) -> Step {
        Step::image(name, ImageStep::new(template, 0.8))
    }

    fn clicked(rig: &Rig) -> Vec<Point> {
        rig.actuator
            .actions()
            .into_iter()
            .filter_map(|a| match a {
                Action::Click(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_hits_clicked_in_list_order() {
        let recognizer = ScriptedRecognizer::new();
        recognizer.show("first.png", Point::new(10, 10));
        recognizer.show("second.png", Point::new(20, 20));
        // First in the list finishes last
        recognizer.slow("first.png", Duration::from_millis(60));
        let rig = Rig::new(recognizer, quick_settings(Some(1)));
        let groups = GroupSet::new(vec![Group::new(
            "main",
            vec![image("first", "first.png"), image("second", "second.png")],
        )]);

        rig.hunter.start("main", groups, HuntMode::FullScreen).unwrap();
        let (events, reason) = rig.finish().await;

        assert_eq!(reason, StopReason::RoundLimit { rounds: 1 });
        assert_eq!(clicked(&rig), vec![Point::new(10, 10), Point::new(20, 20)]);
        let found: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                HuntEvent::TargetFound { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(found, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_misses_and_non_image_steps_are_ignored() {
        let recognizer = ScriptedRecognizer::new();
        recognizer.show("hit.png", Point::new(3, 3));
        let rig = Rig::new(recognizer, quick_settings(Some(1)));
        let groups = GroupSet::new(vec![
            Group::new(
                "main",
                vec![
                    image("miss", "miss.png"),
                    Step::branch("jump", "other", None),
                    image("hit", "hit.png"),
                    image("off", "hit.png").disabled(),
                    Step::idle_click("idle", 50, 50),
                ],
            ),
            Group::new("other", vec![Step::idle_click("elsewhere", 99, 99)]),
        ]);

        rig.hunter.start("main", groups, HuntMode::FullScreen).unwrap();
        rig.finish().await;

        assert_eq!(clicked(&rig), vec![Point::new(3, 3)]);
        assert_eq!(rig.recognizer.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_idle_fallback_when_nothing_found() {
        let rig = Rig::new(ScriptedRecognizer::new(), quick_settings(Some(2)));
        let groups = GroupSet::new(vec![Group::new(
            "main",
            vec![
                image("mole", "mole.png"),
                Step::idle_click("a", 1, 0),
                Step::idle_click("off", 9, 9).disabled(),
                Step::idle_click("b", 2, 0),
            ],
        )]);

        rig.hunter.start("main", groups, HuntMode::FullScreen).unwrap();
        let (_, reason) = rig.finish().await;

        assert_eq!(reason, StopReason::RoundLimit { rounds: 2 });
        assert_eq!(
            clicked(&rig),
            vec![
                Point::new(1, 0),
                Point::new(2, 0),
                Point::new(1, 0),
                Point::new(2, 0)
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_step_in_fallback_ends_run() {
        let rig = Rig::new(ScriptedRecognizer::new(), quick_settings(None));
        let groups = GroupSet::new(vec![Group::new(
            "main",
            vec![
                Step::idle_click("a", 1, 0),
                Step::stop_hunting("enough"),
                Step::idle_click("b", 2, 0),
            ],
        )]);

        rig.hunter.start("main", groups, HuntMode::FullScreen).unwrap();
        let (_, reason) = rig.finish().await;

        assert_eq!(
            reason,
            StopReason::StopStep {
                group: "main".into(),
                step: "enough".into()
            }
        );
        assert_eq!(clicked(&rig), vec![Point::new(1, 0)]);
    }
}
