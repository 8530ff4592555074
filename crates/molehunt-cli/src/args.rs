//! CLI argument parsing with clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use molehunt_core::hunter::HuntMode;

/// Find images on screen and click them.
///
/// Runs the step groups of a project file against the live desktop: image
/// steps locate templates by normalized cross-correlation, idle clicks,
/// jumps, key presses and scrolls fill in the rest. Events are printed to
/// stdout as JSON lines; logs go to stderr.
#[derive(Debug, Parser)]
#[command(name = "molehunt", version)]
pub struct Cli {
    /// Project file [default: $MOLEHUNT_PROJECT, then the config directory]
    #[arg(short, long, global = true, value_name = "FILE")]
    pub project: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Hunt on the desktop until stopped
    #[command(after_help = "\
Examples:
  molehunt run                          # First group, settings from the project
  molehunt run -g farm                  # Start from the 'farm' group
  molehunt run --mode full-screen       # Click every visible target each round
  molehunt run --rounds 10              # Stop after ten rounds
  molehunt -p ./bot.json run            # Use a specific project file

Press Ctrl+C to stop. The hunt also ends at a stop-hunting step.")]
    Run(RunArgs),

    /// Check a project file and list problems
    #[command(after_help = "\
Exits with status 1 when any error is found. Warnings (missing template
files, jumps to unknown groups) are reported but do not fail validation.")]
    Validate,

    /// Match one template against a screenshot and print the result
    #[command(
        name = "match",
        after_help = "\
Examples:
  molehunt match screen.png button.png          # Default threshold 0.8
  molehunt match screen.png button.png -t 0.95  # Stricter match

Prints the match result as JSON. Exits 0 when found, 1 otherwise."
    )]
    Match(MatchArgs),

    /// Show an annotated example project
    Examples,
}

#[derive(Debug, Default, clap::Args)]
pub struct RunArgs {
    /// Group to start from [default: first group in the project]
    #[arg(short, long)]
    pub group: Option<String>,

    /// How each round walks the group
    #[arg(short, long, value_enum)]
    pub mode: Option<Mode>,

    /// Stop after this many rounds
    #[arg(long, value_name = "N")]
    pub rounds: Option<u64>,

    /// Delay between polls while waiting for a template (milliseconds)
    #[arg(long, value_name = "MS")]
    pub poll_interval: Option<u64>,

    /// Delay between rounds (milliseconds)
    #[arg(long, value_name = "MS")]
    pub round_delay: Option<u64>,
}

#[derive(Debug, clap::Args)]
pub struct MatchArgs {
    /// Screenshot to search
    pub screenshot: PathBuf,

    /// Template image to look for
    pub template: PathBuf,

    /// Minimum correlation score counted as found (0.0 to 1.0)
    #[arg(short, long, default_value_t = 0.8)]
    pub threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Step by step with waits, rollbacks and jumps
    Sequential,
    /// All image steps at once, hits clicked in list order
    FullScreen,
}

impl From<Mode> for HuntMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Sequential => HuntMode::Sequential,
            Mode::FullScreen => HuntMode::FullScreen,
        }
    }
}

/// Text for the `examples` command.
pub const EXAMPLES_TEXT: &str = r#"Example project

A project is a JSON file with optional "settings", an optional default
"mode" and a list of "groups". Each group is a named list of steps; the run
starts at the first group unless --group says otherwise.

Step kinds:
  image       find "template" on screen (score >= "threshold") and click it
  idle_click  click "point"; with "stop_hunting": true, end the hunt instead
  jump        "branch" into another group, or send "input" (keys, scroll)
  config      ask the host to switch configuration or text

Relative template paths are resolved against the project file's directory.
Save the following as ~/.config/molehunt/project.json and run
'molehunt validate', then 'molehunt run'.
"#;

/// The project printed by the `examples` command.
pub const EXAMPLE_PROJECT: &str = r#"{
  "settings": {
    "poll_interval_ms": 100,
    "round_delay_ms": 500
  },
  "mode": "sequential",
  "groups": [
    {
      "name": "main",
      "steps": [
        {
          "name": "open menu",
          "kind": "image",
          "template": "templates/menu.png",
          "threshold": 0.85,
          "wait_until_appear": true,
          "wait_after_click_ms": 300
        },
        {
          "name": "collect",
          "kind": "image",
          "template": "templates/collect.png",
          "click_until_disappear": true,
          "jump_to_previous_on_fail": true
        },
        {
          "name": "bonus round",
          "kind": "jump",
          "jump": "branch",
          "target_group": "bonus"
        },
        {
          "name": "close dialog",
          "kind": "jump",
          "jump": "input",
          "key_combo": "Escape",
          "key_wait_ms": 200,
          "scroll": { "up": false, "count": 3, "wait_ms": 100 }
        },
        {
          "name": "rest",
          "kind": "idle_click",
          "point": { "x": 960, "y": 540 }
        }
      ]
    },
    {
      "name": "bonus",
      "steps": [
        {
          "name": "chest",
          "kind": "image",
          "template": "templates/chest.png",
          "return_to_previous_on_timeout": true,
          "timeout_ms": 2000
        },
        {
          "name": "out of chests",
          "kind": "idle_click",
          "point": { "x": 0, "y": 0 },
          "stop_hunting": true,
          "enabled": false
        }
      ]
    }
  ]
}"#;

#[cfg(test)]
mod tests {
    use super::{Cli, Commands, Mode};
    use clap::Parser;
    use molehunt_core::hunter::HuntMode;

    #[test]
    fn test_run_parses_overrides() {
        let cli = Cli::parse_from([
            "molehunt",
            "run",
            "-g",
            "farm",
            "--mode",
            "full-screen",
            "--rounds",
            "3",
            "--poll-interval",
            "50",
        ]);

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.group.as_deref(), Some("farm"));
                assert_eq!(args.mode, Some(Mode::FullScreen));
                assert_eq!(args.rounds, Some(3));
                assert_eq!(args.poll_interval, Some(50));
                assert_eq!(args.round_delay, None);
            }
            _ => panic!("Expected run command"),
        }
    }

    #[test]
    fn test_project_flag_is_global() {
        let cli = Cli::parse_from(["molehunt", "validate", "--project", "/tmp/p.json"]);
        assert!(matches!(cli.command, Commands::Validate));
        assert_eq!(cli.project.unwrap().to_str(), Some("/tmp/p.json"));
    }

    #[test]
    fn test_match_default_threshold() {
        let cli = Cli::parse_from(["molehunt", "match", "screen.png", "button.png"]);
        match cli.command {
            Commands::Match(args) => {
                assert_eq!(args.threshold, 0.8);
                assert_eq!(args.template.to_str(), Some("button.png"));
            }
            _ => panic!("Expected match command"),
        }
    }

    #[test]
    fn test_mode_maps_to_hunt_mode() {
        assert_eq!(HuntMode::from(Mode::FullScreen), HuntMode::FullScreen);
        assert_eq!(HuntMode::from(Mode::Sequential), HuntMode::Sequential);
    }
}
