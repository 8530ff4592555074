//! Core types and logic for molehunt.
//!
//! This crate finds small reference images ("templates") on a captured
//! screen and runs user-defined step sequences that click, type and scroll
//! in response. It has no OS dependencies of its own: screen capture and
//! input are supplied by the host through the traits in [`backend`].
//!
//! # Modules
//!
//! - [`matcher`]: Normalized cross-correlation template matching with a cache
//! - [`model`]: Steps, groups and project validation
//! - [`hunter`]: The run lifecycle and step interpreter
//! - [`events`]: Notifications streamed to the host
//! - [`keys`]: Key combo parsing
//! - [`error`]: API error types with actionable suggestions
//!
//! # Modes
//!
//! | Mode | Per round |
//! |------|-----------|
//! | **Sequential** | Walk the group step by step, honoring waits, rollbacks and jumps |
//! | **Full screen** | One capture, all image steps matched in parallel, hits clicked in list order |

pub mod backend;
pub mod error;
pub mod events;
pub mod hunter;
pub mod keys;
pub mod matcher;
pub mod model;
