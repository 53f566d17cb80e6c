//! Playback Handles
//!
//! A handle owns one physical audio source for the duration of a playback
//! session. It is recycled through the pool; a per-handle generation counter
//! tells sessions whether "their" handle still belongs to them. Pause and
//! stop detach the playback state into a [`Memento`] so the session can
//! continue later on a different handle.

use glam::Vec3;
use rand::rngs::StdRng;

use resona_platform::mixer::MixerGroups;
use resona_platform::source::AudioSource;

use crate::cursor::ClipCursor;
use crate::file::AudioFile;
use crate::{AudioError, AudioResult, TransformRef};

/// How long a source may report "playing" with a stuck zero clock before the
/// handle forces completion, in simulated seconds.
const STUCK_GRACE_SECS: f64 = 1.0;

/// Snapshot of a playback session, detached from its handle
///
/// The clip is stored redundantly because composite cursors (bags) do not
/// retain it themselves.
#[derive(Debug, Default)]
pub(crate) struct Memento {
    pub(crate) cursor: Option<ClipCursor>,
    pub(crate) clip: Option<std::sync::Arc<resona_platform::source::AudioClip>>,
    pub(crate) follow: Option<TransformRef>,
    pub(crate) position: Vec3,
    pub(crate) manual_volume: f32,
    /// Playback offset in seconds; zero for stop snapshots
    pub(crate) time: f32,
}

impl Memento {
    /// The same snapshot rewound to the start of the current clip
    pub(crate) fn from_zero(mut self) -> Self {
        self.time = 0.0;
        self
    }

    /// Copy of the snapshot without the detached cursor
    pub(crate) fn without_cursor(&self) -> Self {
        Self {
            cursor: None,
            clip: self.clip.clone(),
            follow: self.follow.clone(),
            position: self.position,
            manual_volume: self.manual_volume,
            time: self.time,
        }
    }
}

/// Outcome of one per-frame poll of an active handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickStatus {
    /// Still emitting (or advanced to the next clip)
    Playing,
    /// Iteration ended; the handle must go back to the pool
    Finished,
}

/// One pooled playback resource
pub(crate) struct Handle {
    source: Box<dyn AudioSource>,
    /// Bumped every time the handle returns to the pool
    generation: u64,
    cursor: Option<ClipCursor>,
    follow: Option<TransformRef>,
    position: Vec3,
    /// Volume factor taken from the file configuration at bind time
    automatic_volume: f32,
    /// User-settable factor, 0.0 to 1.0
    manual_volume: f32,
    /// Watchdog deadline for the stuck-clock quirk; 0 = disarmed
    return_at: f64,
}

impl Handle {
    pub(crate) fn new(source: Box<dyn AudioSource>) -> Self {
        Self {
            source,
            generation: 0,
            cursor: None,
            follow: None,
            position: Vec3::ZERO,
            automatic_volume: 1.0,
            manual_volume: 1.0,
            return_at: 0.0,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Bind an audio file, starting its cursor on the owned source
    pub(crate) fn feed(
        &mut self,
        file: &AudioFile,
        looping: bool,
        mixer: &MixerGroups,
        rng: &mut StdRng,
    ) -> AudioResult<()> {
        self.cursor = Some(file.start_cursor(&mut *self.source, looping, mixer, rng)?);
        self.automatic_volume = self.source.volume();
        self.manual_volume = 1.0;
        self.return_at = 0.0;
        Ok(())
    }

    pub(crate) fn play(&mut self) {
        self.source.play();
    }

    pub(crate) fn track_position(&mut self, position: Vec3) {
        self.position = position;
        self.source.set_position(position);
    }

    pub(crate) fn track_follow(&mut self, follow: TransformRef) {
        self.track_position(follow.position());
        self.follow = Some(follow);
    }

    pub(crate) fn volume(&self) -> f32 {
        self.manual_volume
    }

    /// Set the manual volume factor; the device hears the product of the
    /// automatic and manual factors immediately
    pub(crate) fn set_volume(&mut self, volume: f32) {
        self.manual_volume = volume;
        self.source.set_volume(self.automatic_volume * self.manual_volume);
    }

    /// Snapshot taken right after a fresh bind; carries no detached cursor
    pub(crate) fn save_memento(&self) -> Memento {
        Memento {
            cursor: None,
            clip: self.source.clip(),
            follow: self.follow.clone(),
            position: self.position,
            manual_volume: self.manual_volume,
            time: 0.0,
        }
    }

    /// Halt emission keeping the playback offset; detaches the cursor
    pub(crate) fn pause(&mut self) -> Memento {
        self.source.pause();
        Memento {
            cursor: self.cursor.take(),
            clip: self.source.clip(),
            follow: self.follow.take(),
            position: self.position,
            manual_volume: self.manual_volume,
            time: self.source.time(),
        }
    }

    /// Halt emission and rewind; detaches the cursor with a zero offset
    pub(crate) fn stop(&mut self) -> Memento {
        self.source.stop();
        Memento {
            cursor: self.cursor.take(),
            clip: self.source.clip(),
            follow: self.follow.take(),
            position: self.position,
            manual_volume: self.manual_volume,
            time: 0.0,
        }
    }

    /// Restore a snapshot and continue emission at its stored offset
    pub(crate) fn resume(
        &mut self,
        memento: Memento,
        mixer: &MixerGroups,
        rng: &mut StdRng,
    ) -> AudioResult<()> {
        let Memento {
            cursor,
            clip,
            follow,
            position,
            manual_volume,
            time,
        } = memento;
        let cursor = cursor.ok_or(AudioError::InvalidState)?;

        if let Some(clip) = clip {
            self.source.set_clip(clip);
        }
        self.position = position;
        self.source.set_position(position);
        self.follow = follow;

        cursor.apply_current(&mut *self.source, mixer, rng)?;
        self.automatic_volume = self.source.volume();
        self.cursor = Some(cursor);
        self.manual_volume = manual_volume;
        self.source.set_volume(self.automatic_volume * manual_volume);

        self.source.play();
        self.source.seek(time);
        self.return_at = 0.0;
        Ok(())
    }

    /// Per-frame poll while active
    ///
    /// `now` is the engine's simulated clock; `dt` the frame delta. The
    /// cursor advances at most once per call.
    pub(crate) fn tick(
        &mut self,
        now: f64,
        dt: f32,
        mixer: &MixerGroups,
        rng: &mut StdRng,
    ) -> AudioResult<TickStatus> {
        self.source.advance(dt);

        if !self.source.is_playing() {
            return self.advance_or_finish(mixer, rng);
        }

        if self.source.time() == 0.0 {
            // Some platforms keep reporting "playing" with a stuck clock
            // after a clip ends. Re-trigger once, then force completion.
            if self.return_at == 0.0 {
                self.return_at = now + STUCK_GRACE_SECS;
                self.source.play();
            } else if now >= self.return_at {
                log::warn!("audio source stuck at t=0 past grace period, forcing completion");
                return self.advance_or_finish(mixer, rng);
            }
        } else {
            self.return_at = 0.0;
        }

        if let Some(follow) = &self.follow {
            let position = follow.position();
            self.position = position;
            self.source.set_position(position);
        }

        Ok(TickStatus::Playing)
    }

    fn advance_or_finish(&mut self, mixer: &MixerGroups, rng: &mut StdRng) -> AudioResult<TickStatus> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(TickStatus::Finished);
        };
        if cursor.move_next(&mut *self.source, mixer, rng)? {
            // The next clip re-applied its own configured volume; refresh the
            // automatic factor and keep the manual one.
            self.automatic_volume = self.source.volume();
            self.source.set_volume(self.automatic_volume * self.manual_volume);
            self.source.play();
            self.return_at = 0.0;
            Ok(TickStatus::Playing)
        } else {
            Ok(TickStatus::Finished)
        }
    }

    /// Invalidate outstanding sessions and drop per-play state
    ///
    /// Called on every return to the pool.
    pub(crate) fn release(&mut self) {
        self.generation += 1;
        self.cursor = None;
        self.follow = None;
        self.return_at = 0.0;
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("generation", &self.generation)
            .field("has_cursor", &self.cursor.is_some())
            .field("automatic_volume", &self.automatic_volume)
            .field("manual_volume", &self.manual_volume)
            .finish()
    }
}
