//! Template recognition with a per-path cache.
//!
//! [`TemplateMatcher::find`] answers "where is this template on this frame,
//! and how sure are we". Templates are decoded once per path and reused
//! until the cache is cleared, so a template edited on disk keeps matching
//! the old pixels until the host calls [`Recognizer::clear_cache`].
//!
//! Failures never escape: an unreadable or undecodable template yields a
//! [`MatchResult`] with `found = false` and the reason in `error`.

pub mod ncc;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TemplateError;
use crate::model::Point;
use ncc::{GrayPlane, SearchPlane, Template};

/// A captured screen prepared for matching.
///
/// Build one per capture and share it between every template matched
/// against that capture.
#[derive(Debug)]
pub struct Frame {
    plane: SearchPlane,
}

impl Frame {
    pub fn from_rgba(image: &RgbaImage) -> Self {
        Self {
            plane: SearchPlane::new(GrayPlane::from_rgba(image)),
        }
    }

    pub fn width(&self) -> u32 {
        self.plane.plane().width() as u32
    }

    pub fn height(&self) -> u32 {
        self.plane.plane().height() as u32
    }
}

/// Outcome of one template search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub found: bool,
    pub top_left: Point,
    /// Click target: top-left plus half the template size.
    pub center: Point,
    pub width: u32,
    pub height: u32,
    /// Best correlation score, reported even when below threshold.
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MatchResult {
    /// A result for a match that could not be attempted.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            found: false,
            top_left: Point::default(),
            center: Point::default(),
            width: 0,
            height: 0,
            confidence: 0.0,
            error: Some(error.into()),
        }
    }

    fn located(x: u32, y: u32, width: u32, height: u32, confidence: f64, threshold: f64) -> Self {
        let top_left = Point::new(x as i32, y as i32);
        Self {
            found: meets_threshold(confidence, threshold),
            top_left,
            center: Point::new(
                top_left.x + (width / 2) as i32,
                top_left.y + (height / 2) as i32,
            ),
            width,
            height,
            confidence,
            error: None,
        }
    }
}

/// A score equal to the threshold counts as found.
pub fn meets_threshold(confidence: f64, threshold: f64) -> bool {
    confidence >= threshold
}

/// Anything that can locate templates on a frame.
///
/// [`TemplateMatcher`] is the real implementation; the seam exists so the
/// interpreter can be driven by scripted recognizers.
pub trait Recognizer: Send + Sync {
    fn find(&self, frame: &Frame, template: &str, threshold: f64) -> MatchResult;

    /// Forget every cached template.
    fn clear_cache(&self);
}

/// Normalized cross-correlation matcher with a lazily filled template cache.
#[derive(Debug, Default)]
pub struct TemplateMatcher {
    cache: Mutex<HashMap<String, Arc<Template>>>,
}

impl TemplateMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, Arc<Template>>> {
        // A poisoned cache only ever holds fully decoded entries
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of decoded templates currently held.
    pub fn cached_len(&self) -> usize {
        self.cache().len()
    }

    /// Drop one template from the cache.
    pub fn evict(&self, path: &str) -> bool {
        self.cache().remove(path).is_some()
    }

    fn template(&self, path: &str) -> Result<Arc<Template>, TemplateError> {
        if let Some(hit) = self.cache().get(path) {
            return Ok(Arc::clone(hit));
        }

        // Decode outside the lock so parallel matches of other templates
        // are not serialized behind file IO.
        let loaded = Arc::new(load_template(path)?);
        debug!("Cached template {}", path);
        let mut cache = self.cache();
        Ok(Arc::clone(
            cache.entry(path.to_string()).or_insert(loaded),
        ))
    }

    /// Match `template_path` against `frame`.
    pub fn find(&self, frame: &Frame, template_path: &str, threshold: f64) -> MatchResult {
        let template = match self.template(template_path) {
            Ok(t) => t,
            Err(e) => return MatchResult::failed(e.to_string()),
        };

        let (tw, th) = (template.width() as u32, template.height() as u32);
        match ncc::best_match(&frame.plane, &template) {
            Some(peak) => MatchResult::located(
                peak.x as u32,
                peak.y as u32,
                tw,
                th,
                peak.score,
                threshold,
            ),
            None => MatchResult::failed(
                TemplateError::TooLarge {
                    path: template_path.to_string(),
                    tw,
                    th,
                    sw: frame.width(),
                    sh: frame.height(),
                }
                .to_string(),
            ),
        }
    }

    pub fn clear_cache(&self) {
        let mut cache = self.cache();
        debug!("Clearing {} cached template(s)", cache.len());
        cache.clear();
    }
}

impl Recognizer for TemplateMatcher {
    fn find(&self, frame: &Frame, template: &str, threshold: f64) -> MatchResult {
        TemplateMatcher::find(self, frame, template, threshold)
    }

    fn clear_cache(&self) {
        TemplateMatcher::clear_cache(self);
    }
}

fn load_template(path: &str) -> Result<Template, TemplateError> {
    let bytes = std::fs::read(path).map_err(|source| TemplateError::Read {
        path: path.to_string(),
        source,
    })?;
    let image = image::load_from_memory(&bytes)
        .map_err(|source| TemplateError::Decode {
            path: path.to_string(),
            source,
        })?
        .to_rgba8();
    if image.width() == 0 || image.height() == 0 {
        return Err(TemplateError::Empty {
            path: path.to_string(),
        });
    }
    Ok(Template::new(&GrayPlane::from_rgba(&image)))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use image::{Rgba, RgbaImage};

    /// Deterministic textured image so correlation has something to lock on.
    pub(crate) fn noise(w: u32, h: u32, seed: u32) -> RgbaImage {
        let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
        RgbaImage::from_fn(w, h, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let v = (state % 256) as u8;
            Rgba([v, v.wrapping_mul(3), v.wrapping_add(40), 255])
        })
    }

    pub(crate) fn crop(image: &RgbaImage, x: u32, y: u32, w: u32, h: u32) -> RgbaImage {
        image::imageops::crop_imm(image, x, y, w, h).to_image()
    }
}
