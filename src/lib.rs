//! Desktop client for the job chat service: phone login, a conversation list
//! and message threads with text, voice and file messages.
//!
//! Everything except the GTK front end (`ui`, behind the `gui` feature) is
//! plain library code.

pub mod api;
pub mod auth;
pub mod config;
pub mod directory;
pub mod error;
pub mod format;
pub mod recording;
pub mod router;
pub mod session;
pub mod storage;
pub mod thread;
pub mod utils;

#[cfg(feature = "gui")]
pub mod ui;

pub use error::{Error, Result, ValidationError};
