//! Project file location and command-line overrides.
//!
//! Priority for the project file:
//! 1. `--project` flag
//! 2. `MOLEHUNT_PROJECT` (explicit override)
//! 3. `XDG_CONFIG_HOME/molehunt/project.json`
//! 4. `~/.molehunt/project.json` (home directory fallback)
//! 5. `molehunt.json` in the working directory (last resort)

use std::env;
use std::path::{Path, PathBuf};

use molehunt_core::hunter::HuntSettings;

use crate::args::RunArgs;

const PROJECT_FILE: &str = "project.json";

/// Get the project file path with priority fallback.
///
/// Empty environment variables are ignored.
pub fn project_path(flag: Option<&Path>) -> PathBuf {
    // 1. Command line
    if let Some(path) = flag {
        return path.to_path_buf();
    }

    // 2. Explicit override (ignore empty)
    if let Ok(path) = env::var("MOLEHUNT_PROJECT") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // 3. XDG config dir (ignore empty)
    if let Ok(config_dir) = env::var("XDG_CONFIG_HOME") {
        if !config_dir.is_empty() {
            return PathBuf::from(config_dir).join("molehunt").join(PROJECT_FILE);
        }
    }

    // 4. Home directory fallback
    if let Some(home) = dirs::home_dir() {
        return home.join(".molehunt").join(PROJECT_FILE);
    }

    // 5. Last resort: working directory
    PathBuf::from("molehunt.json")
}

/// Apply `run` flags on top of the settings read from the project.
#[cfg_attr(not(feature = "desktop"), allow(dead_code))]
pub fn apply_overrides(settings: &mut HuntSettings, args: &RunArgs) {
    if let Some(rounds) = args.rounds {
        settings.max_rounds = Some(rounds);
    }
    if let Some(ms) = args.poll_interval {
        settings.poll_interval_ms = ms;
    }
    if let Some(ms) = args.round_delay {
        settings.round_delay_ms = ms;
    }
}
