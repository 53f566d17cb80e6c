//! Audio File Descriptors
//!
//! Immutable, asset-owned descriptions of "what to play": a single clip with
//! its source parameters, a bag that draws one child at random, or an ordered
//! sequence. Files are cheap to clone and shared by many concurrent plays;
//! per-play progress lives in [`ClipCursor`](crate::cursor::ClipCursor), not
//! here.

use std::sync::Arc;

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use resona_platform::mixer::MixerGroups;
use resona_platform::source::{AudioClip, AudioSource, Curve, Rolloff, SourceParams};

use crate::AudioResult;

/// A float that is either fixed or drawn uniformly from a range per play
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FloatRange {
    Constant(f32),
    Range(f32, f32),
}

impl FloatRange {
    /// Build a range, normalizing swapped bounds
    pub fn range(min: f32, max: f32) -> Self {
        if min <= max {
            Self::Range(min, max)
        } else {
            Self::Range(max, min)
        }
    }

    pub fn sample(&self, rng: &mut StdRng) -> f32 {
        match *self {
            Self::Constant(value) => value,
            Self::Range(min, max) => {
                if max - min <= f32::EPSILON {
                    min
                } else {
                    rng.gen_range(min..max)
                }
            }
        }
    }
}

impl From<f32> for FloatRange {
    fn from(value: f32) -> Self {
        Self::Constant(value)
    }
}

/// A single playable clip and the source configuration it carries
#[derive(Debug, Clone)]
pub struct AudioUnit {
    clip: Arc<AudioClip>,
    /// Mixer group this audio belongs to
    group: String,
    /// Relative volume (0.0 to 1.0)
    volume: FloatRange,
    /// Relative pitch
    pitch: FloatRange,
    /// Voice priority; larger values are stolen first
    priority: u8,
    /// Stereo pan (-1 to 1)
    pan: f32,
    spatial_blend: Curve,
    reverb_mix: Curve,
    spread: Curve,
    doppler: f32,
    rolloff: Rolloff,
    min_distance: f32,
    max_distance: f32,
}

impl AudioUnit {
    /// Create a unit with defaults routed through the Master group
    pub fn new(clip: Arc<AudioClip>) -> Self {
        Self {
            clip,
            group: "Master".to_string(),
            volume: FloatRange::Constant(1.0),
            pitch: FloatRange::Constant(1.0),
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

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_volume(mut self, volume: impl Into<FloatRange>) -> Self {
        self.volume = volume.into();
        self
    }

    pub fn with_pitch(mut self, pitch: impl Into<FloatRange>) -> Self {
        self.pitch = pitch.into();
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_pan(mut self, pan: f32) -> Self {
        self.pan = pan.clamp(-1.0, 1.0);
        self
    }

    pub fn with_spatial_blend(mut self, curve: Curve) -> Self {
        self.spatial_blend = curve;
        self
    }

    pub fn with_reverb_mix(mut self, curve: Curve) -> Self {
        self.reverb_mix = curve;
        self
    }

    pub fn with_spread(mut self, curve: Curve) -> Self {
        self.spread = curve;
        self
    }

    pub fn with_doppler(mut self, doppler: f32) -> Self {
        self.doppler = doppler;
        self
    }

    pub fn with_rolloff(mut self, rolloff: Rolloff) -> Self {
        self.rolloff = rolloff;
        self
    }

    pub fn with_distances(mut self, min: f32, max: f32) -> Self {
        self.min_distance = min;
        self.max_distance = max;
        self
    }

    pub fn clip(&self) -> &Arc<AudioClip> {
        &self.clip
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Configure a source to play this unit
    ///
    /// Routing is resolved first so a bad group name fails before the device
    /// is touched. Volume and pitch ranges are sampled here, once per bind.
    pub(crate) fn configure(
        &self,
        source: &mut dyn AudioSource,
        mixer: &MixerGroups,
        rng: &mut StdRng,
    ) -> AudioResult<()> {
        let group = mixer.resolve(&self.group)?;
        source.set_output_group(group);
        source.set_clip(self.clip.clone());
        source.apply(&SourceParams {
            volume: self.volume.sample(rng),
            pitch: self.pitch.sample(rng),
            priority: self.priority,
            pan: self.pan,
            spatial_blend: self.spatial_blend.clone(),
            reverb_mix: self.reverb_mix.clone(),
            spread: self.spread.clone(),
            doppler: self.doppler,
            rolloff: self.rolloff.clone(),
            min_distance: self.min_distance,
            max_distance: self.max_distance,
        });
        Ok(())
    }
}

/// An audio file: a single unit or a composite of other files
///
/// Composites never mutate; a play request walks the tree through a cursor.
#[derive(Debug, Clone)]
pub enum AudioFile {
    /// One clip
    Unit(Arc<AudioUnit>),
    /// One child drawn uniformly at random per play
    Bag(Arc<[AudioFile]>),
    /// All children, in order
    Sequence(Arc<[AudioFile]>),
}

impl AudioFile {
    pub fn unit(unit: AudioUnit) -> Self {
        Self::Unit(Arc::new(unit))
    }

    pub fn bag(files: Vec<AudioFile>) -> Self {
        Self::Bag(files.into())
    }

    pub fn sequence(files: Vec<AudioFile>) -> Self {
        Self::Sequence(files.into())
    }
}

impl From<AudioUnit> for AudioFile {
    fn from(unit: AudioUnit) -> Self {
        Self::unit(unit)
    }
}
