//! Timing and limit knobs for a hunt.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay between polls while waiting for a template.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Delay between re-matches of a click-until-disappear step.
pub const DEFAULT_DISAPPEAR_INTERVAL_MS: u64 = 300;

/// Upper bound on re-clicks of a click-until-disappear step.
pub const DEFAULT_MAX_DISAPPEAR_CLICKS: u32 = 50;

/// Delay between clicks in full-screen mode.
pub const DEFAULT_CLICK_DELAY_MS: u64 = 100;

/// Delay between rounds.
pub const DEFAULT_ROUND_DELAY_MS: u64 = 200;

/// Nesting limit for group jumps.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HuntSettings {
    pub poll_interval_ms: u64,
    pub disappear_interval_ms: u64,
    pub max_disappear_clicks: u32,
    pub click_delay_ms: u64,
    pub round_delay_ms: u64,
    pub max_call_depth: usize,
    /// Stop after this many rounds; None hunts until stopped.
    pub max_rounds: Option<u64>,
}

impl Default for HuntSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            disappear_interval_ms: DEFAULT_DISAPPEAR_INTERVAL_MS,
            max_disappear_clicks: DEFAULT_MAX_DISAPPEAR_CLICKS,
            click_delay_ms: DEFAULT_CLICK_DELAY_MS,
            round_delay_ms: DEFAULT_ROUND_DELAY_MS,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_rounds: None,
        }
    }
}

impl HuntSettings {
    /// Poll interval, never zero so wait loops always yield.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn disappear_interval(&self) -> Duration {
        Duration::from_millis(self.disappear_interval_ms.max(1))
    }

    pub fn click_delay(&self) -> Duration {
        Duration::from_millis(self.click_delay_ms)
    }

    pub fn round_delay(&self) -> Duration {
        Duration::from_millis(self.round_delay_ms)
    }
}
