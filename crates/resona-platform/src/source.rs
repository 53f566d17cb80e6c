//! Audio Source Abstraction
//!
//! The physical emitting device behind a playback handle. The scheduling core
//! only configures sources and polls their state; mixing, decoding and 3D
//! attenuation happen behind this trait.

use std::sync::Arc;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};

use crate::mixer::GroupId;

/// Audio asset reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioClip {
    pub name: String,
    /// Duration in seconds
    pub duration: f32,
    pub sample_rate: u32,
    pub channels: u32,
}

impl AudioClip {
    /// Create a clip descriptor with default stereo 48 kHz format
    pub fn new(name: impl Into<String>, duration: f32) -> Self {
        Self {
            name: name.into(),
            duration,
            sample_rate: 48000,
            channels: 2,
        }
    }
}

/// A single keyframe of a parameter curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveKey {
    /// Normalized time (0 = min distance, 1 = max distance)
    pub t: f32,
    pub value: f32,
}

/// Piecewise-linear parameter curve over normalized distance
///
/// Single-key curves are applied to sources as plain scalars.
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    keys: SmallVec<[CurveKey; 2]>,
}

impl Curve {
    /// Create a constant (single-key) curve
    pub fn constant(value: f32) -> Self {
        Self {
            keys: smallvec![CurveKey { t: 0.0, value }],
        }
    }

    /// Create a curve from keyframes, sorted by time
    pub fn from_keys(mut keys: Vec<CurveKey>) -> Self {
        keys.sort_by(|a, b| a.t.total_cmp(&b.t));
        if keys.is_empty() {
            return Self::constant(0.0);
        }
        Self { keys: keys.into() }
    }

    /// Whether the curve holds a single value
    pub fn is_constant(&self) -> bool {
        self.keys.len() == 1
    }

    /// Sample the curve at normalized time `t` with linear interpolation
    pub fn sample(&self, t: f32) -> f32 {
        let first = self.keys[0];
        if t <= first.t {
            return first.value;
        }
        for pair in self.keys.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if t <= b.t {
                let span = b.t - a.t;
                if span <= f32::EPSILON {
                    return b.value;
                }
                let f = (t - a.t) / span;
                return a.value + (b.value - a.value) * f;
            }
        }
        self.keys[self.keys.len() - 1].value
    }
}

/// Distance attenuation model
#[derive(Debug, Clone, PartialEq)]
pub enum Rolloff {
    Logarithmic,
    Linear,
    Custom(Curve),
}

impl Default for Rolloff {
    fn default() -> Self {
        Self::Logarithmic
    }
}

/// Full parameter set applied to a source when a clip is configured
#[derive(Debug, Clone)]
pub struct SourceParams {
    /// Volume factor (0.0 to 1.0)
    pub volume: f32,
    /// Pitch multiplier
    pub pitch: f32,
    /// Voice priority; larger values are stolen first
    pub priority: u8,
    /// Stereo pan (-1 left to 1 right)
    pub pan: f32,
    /// How much the source is treated as 3D (0 ignores spatial attenuation)
    pub spatial_blend: Curve,
    /// Reverb zone mix
    pub reverb_mix: Curve,
    /// Spread of a 3D sound in speaker space
    pub spread: Curve,
    /// Doppler intensity
    pub doppler: f32,
    pub rolloff: Rolloff,
    /// Below this distance the volume stays at the loudest possible
    pub min_distance: f32,
    /// Distance at which the sound stops attenuating
    pub max_distance: f32,
}

impl Default for SourceParams {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pitch: 1.0,
            priority: 128,
            pan: 0.0,
            spatial_blend: Curve::constant(1.0),
            reverb_mix: Curve::constant(1.0),
            spread: Curve::constant(0.0),
            doppler: 1.0,
            rolloff: Rolloff::default(),
            min_distance: 1.0,
            max_distance: 500.0,
        }
    }
}

/// One physical emitting device
///
/// Implementations must report `is_playing() == false` once the clip ends so
/// the scheduler can advance or reclaim the handle.
pub trait AudioSource: Send {
    /// Assign the clip to emit
    fn set_clip(&mut self, clip: Arc<AudioClip>);

    /// Currently assigned clip, if any
    fn clip(&self) -> Option<Arc<AudioClip>>;

    /// Apply a full parameter set
    fn apply(&mut self, params: &SourceParams);

    /// Route output through a mixer group
    fn set_output_group(&mut self, group: GroupId);

    /// Set the effective volume directly (scheduler-computed product)
    fn set_volume(&mut self, volume: f32);

    /// Current effective volume
    fn volume(&self) -> f32;

    /// Move the emitter in world space
    fn set_position(&mut self, position: Vec3);

    /// Start emitting from the beginning of the clip
    fn play(&mut self);

    /// Halt emission, keeping the playback position
    fn pause(&mut self);

    /// Halt emission and reset the playback position
    fn stop(&mut self);

    /// Whether the device is currently emitting
    fn is_playing(&self) -> bool;

    /// Playback position in seconds
    fn time(&self) -> f32;

    /// Seek to a playback position in seconds
    fn seek(&mut self, time: f32);

    /// Advance simulated playback by `dt` seconds
    ///
    /// Hardware-backed sources run their own clock and ignore this; the null
    /// backend uses it to emulate clip completion.
    fn advance(&mut self, dt: f32);
}

/// Factory for playback sources
pub trait AudioBackend: Send {
    fn create_source(&self) -> Box<dyn AudioSource>;
}

/// Source that emits no sound but models playback timing faithfully
///
/// Used for headless servers and deterministic tests.
#[derive(Debug, Default)]
pub struct NullSource {
    clip: Option<Arc<AudioClip>>,
    group: Option<GroupId>,
    params: Option<SourceParams>,
    volume: f32,
    position: Vec3,
    playing: bool,
    time: f32,
}

impl NullSource {
    pub fn new() -> Self {
        Self {
            volume: 1.0,
            ..Self::default()
        }
    }

    /// Output group assigned by the last routing call
    pub fn output_group(&self) -> Option<GroupId> {
        self.group
    }

    /// Parameter set from the last `apply` call
    pub fn params(&self) -> Option<&SourceParams> {
        self.params.as_ref()
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }
}

impl AudioSource for NullSource {
    fn set_clip(&mut self, clip: Arc<AudioClip>) {
        self.clip = Some(clip);
    }

    fn clip(&self) -> Option<Arc<AudioClip>> {
        self.clip.clone()
    }

    fn apply(&mut self, params: &SourceParams) {
        self.volume = params.volume;
        self.params = Some(params.clone());
    }

    fn set_output_group(&mut self, group: GroupId) {
        self.group = Some(group);
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    fn play(&mut self) {
        if self.clip.is_some() {
            self.playing = true;
            self.time = 0.0;
        }
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn stop(&mut self) {
        self.playing = false;
        self.time = 0.0;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn time(&self) -> f32 {
        self.time
    }

    fn seek(&mut self, time: f32) {
        self.time = time.max(0.0);
    }

    fn advance(&mut self, dt: f32) {
        if !self.playing {
            return;
        }
        let Some(clip) = &self.clip else { return };
        let rate = self.params.as_ref().map_or(1.0, |p| p.pitch.max(0.0));
        self.time += dt * rate;
        if self.time >= clip.duration {
            // Clip ran out; mirror a real device reporting completion.
            self.playing = false;
            self.time = 0.0;
        }
    }
}

/// Backend producing [`NullSource`]s
#[derive(Debug, Default)]
pub struct NullBackend;

impl NullBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for NullBackend {
    fn create_source(&self) -> Box<dyn AudioSource> {
        Box::new(NullSource::new())
    }
}
