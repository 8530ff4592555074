//! Project files: settings plus the step groups to hunt with.

use std::path::{Path, PathBuf};

use molehunt_core::hunter::{HuntMode, HuntSettings};
use molehunt_core::model::{Finding, GroupSet, Severity, StepKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("cannot read project file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid project file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub settings: HuntSettings,
    #[serde(default)]
    pub mode: HuntMode,
    pub groups: GroupSet,
}

impl Project {
    /// Read a project and resolve its template paths.
    pub fn load(path: &Path) -> Result<Self, ProjectError> {
        let text = std::fs::read_to_string(path).map_err(|source| ProjectError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut project: Project =
            serde_json::from_str(&text).map_err(|source| ProjectError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        project.resolve_templates(base);
        tracing::debug!(
            "Loaded {} group(s) from {}",
            project.groups.groups().len(),
            path.display()
        );
        Ok(project)
    }

    /// Make relative template paths relative to `base`.
    pub fn resolve_templates(&mut self, base: &Path) {
        self.groups.map_templates(|template| {
            let path = Path::new(template);
            if template.is_empty() || path.is_absolute() {
                template.to_string()
            } else {
                base.join(path).to_string_lossy().into_owned()
            }
        });
    }

    /// The group a run starts from when none is named.
    #[cfg_attr(not(feature = "desktop"), allow(dead_code))]
    pub fn default_group(&self) -> Option<&str> {
        self.groups.groups().first().map(|g| g.name.as_str())
    }

    /// Structural problems plus template files that do not exist.
    pub fn findings(&self) -> Vec<Finding> {
        let mut findings = self.groups.validate();
        for group in self.groups.groups() {
            for (index, step) in group.steps.iter().enumerate() {
                let StepKind::Image(image) = &step.kind else {
                    continue;
                };
                if !image.template.is_empty() && !Path::new(&image.template).is_file() {
                    findings.push(Finding {
                        severity: Severity::Warning,
                        group: group.name.clone(),
                        step: Some(index),
                        message: format!("template '{}' does not exist", image.template),
                    });
                }
            }
        }
        findings
    }
}

pub fn has_errors(findings: &[Finding]) -> bool {
    findings.iter().any(|f| f.severity == Severity::Error)
}
