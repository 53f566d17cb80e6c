//! # Resona Platform
//!
//! Device abstraction layer for the Resona audio runtime.
//!
//! This crate provides the collaborators the scheduling core treats as opaque:
//! - **Source**: the physical emitting device behind a playback handle
//! - **Backend**: factory for sources (`Null` backend included for headless
//!   runs and deterministic tests)
//! - **Mixer**: named output-group registry and routing

pub mod mixer;
pub mod source;

pub use mixer::{GroupId, MixerGroup, MixerGroups};
pub use source::{AudioBackend, AudioClip, AudioSource, Curve, NullBackend, NullSource, Rolloff, SourceParams};

use thiserror::Error;

/// Platform-specific errors
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Audio group not found: {0}")]
    GroupNotFound(String),
}

/// Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;
