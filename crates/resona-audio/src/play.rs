//! Playback Sessions
//!
//! [`AudioPlay`] is the caller-facing token for one logical play request. It
//! is move-only: the token owns the right to pause, resume and stop that
//! session. A session whose pooled handle was recycled for another sound has
//! finished implicitly; the token detects this through the handle's
//! generation counter and lets `play()` start over from zero.

use crate::handle::Memento;
use crate::pool::HandleRef;
use crate::{AudioEngine, AudioError, AudioFile, AudioResult, Emitter};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum PlayState {
    /// Zero-initialized trap state; only the engine's play factory leaves it
    #[default]
    Default,
    /// Bound to a handle at the recorded generation
    Playing(u64),
    Paused,
    Stopped,
}

/// Handle to one logical playing instance of an [`AudioFile`]
///
/// Obtained from [`AudioEngine::play`]; a zero-value `AudioPlay::default()`
/// rejects every operation with [`AudioError::InvalidState`].
#[derive(Debug, Default)]
pub struct AudioPlay {
    handle: Option<HandleRef>,
    state: PlayState,
    memento: Memento,
    file: Option<AudioFile>,
    emitter: Emitter,
    looping: bool,
}

impl AudioPlay {
    pub(crate) fn started(
        handle: HandleRef,
        generation: u64,
        memento: Memento,
        file: AudioFile,
        emitter: Emitter,
        looping: bool,
    ) -> Self {
        Self {
            handle: Some(handle),
            state: PlayState::Playing(generation),
            memento,
            file: Some(file),
            emitter,
            looping,
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|h| h.lock().generation() == generation)
    }

    /// Whether the session is actively emitting
    ///
    /// False once the sound finished naturally, even while the state still
    /// reads as playing: the pool recycling "our" handle advances its
    /// generation past ours.
    pub fn is_playing(&self) -> bool {
        match self.state {
            PlayState::Playing(generation) => self.is_current(generation),
            _ => false,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.state == PlayState::Paused
    }

    pub fn is_stopped(&self) -> bool {
        self.state == PlayState::Stopped
    }

    /// Whether the sound ran to completion on its own
    pub fn is_finished(&self) -> bool {
        matches!(self.state, PlayState::Playing(generation) if !self.is_current(generation))
    }

    /// Current manual volume factor
    ///
    /// Reads from the live handle while playing; otherwise from the last
    /// snapshot, so a finished or paused session still reports the value it
    /// had.
    pub fn volume(&self) -> AudioResult<f32> {
        match self.state {
            PlayState::Default => Err(AudioError::InvalidState),
            PlayState::Playing(generation) if self.is_current(generation) => {
                let handle = self.handle.as_ref().ok_or(AudioError::InvalidState)?;
                Ok(handle.lock().volume())
            }
            _ => Ok(self.memento.manual_volume),
        }
    }

    /// Set the manual volume factor (0.0 to 1.0)
    pub fn set_volume(&mut self, volume: f32) -> AudioResult<()> {
        if self.state == PlayState::Default {
            return Err(AudioError::InvalidState);
        }
        if !(0.0..=1.0).contains(&volume) {
            return Err(AudioError::OutOfRange(volume));
        }
        match self.state {
            PlayState::Playing(generation) if self.is_current(generation) => {
                let handle = self.handle.as_ref().ok_or(AudioError::InvalidState)?;
                handle.lock().set_volume(volume);
            }
            _ => {}
        }
        // Mirrored into the snapshot so the factor survives a natural finish
        // and applies again on restart.
        self.memento.manual_volume = volume;
        Ok(())
    }

    /// Resume a paused session, or restart a stopped/finished one from zero
    pub fn play(&mut self, engine: &mut AudioEngine) -> AudioResult<()> {
        match self.state {
            PlayState::Default => Err(AudioError::InvalidState),
            PlayState::Playing(generation) => {
                if self.is_current(generation) {
                    Err(AudioError::AlreadyPlaying)
                } else {
                    self.restart(engine)
                }
            }
            PlayState::Paused => {
                let memento = std::mem::take(&mut self.memento);
                self.memento = memento.without_cursor();
                self.resume(engine, memento)
            }
            PlayState::Stopped => {
                if self.memento.cursor.is_some() {
                    // Stop captured a rewound cursor; continue from the
                    // current clip at time zero.
                    let memento = std::mem::take(&mut self.memento).from_zero();
                    self.memento = memento.without_cursor();
                    self.resume(engine, memento)
                } else {
                    self.restart(engine)
                }
            }
        }
    }

    fn resume(&mut self, engine: &mut AudioEngine, memento: Memento) -> AudioResult<()> {
        match engine.resume_session(memento) {
            Ok((handle, generation)) => {
                self.handle = Some(handle);
                self.state = PlayState::Playing(generation);
                Ok(())
            }
            Err(err) => {
                // The detached cursor is gone; degrade so a later play()
                // starts over instead of failing on a cursorless snapshot.
                self.state = PlayState::Stopped;
                Err(err)
            }
        }
    }

    fn restart(&mut self, engine: &mut AudioEngine) -> AudioResult<()> {
        let file = self.file.clone().ok_or(AudioError::InvalidState)?;
        let volume = self.memento.manual_volume;
        let (handle, generation) =
            engine.begin_session(&file, &self.emitter, self.looping, volume)?;
        self.memento = handle.lock().save_memento();
        self.handle = Some(handle);
        self.state = PlayState::Playing(generation);
        Ok(())
    }

    /// Pause the session, releasing its handle back to the pool
    pub fn pause(&mut self, engine: &mut AudioEngine) -> AudioResult<()> {
        match self.state {
            PlayState::Default => Err(AudioError::InvalidState),
            PlayState::Playing(generation) => {
                let handle = self.handle.clone().ok_or(AudioError::InvalidState)?;
                if handle.lock().generation() != generation {
                    return Err(AudioError::InvalidTransition(
                        "cannot pause audio that already finished",
                    ));
                }
                self.memento = engine.pause_session(&handle);
                self.state = PlayState::Paused;
                Ok(())
            }
            PlayState::Paused => Err(AudioError::InvalidTransition("audio is already paused")),
            PlayState::Stopped => Err(AudioError::InvalidTransition(
                "cannot pause stopped audio",
            )),
        }
    }

    /// Stop the session, rewinding its snapshot to time zero
    pub fn stop(&mut self, engine: &mut AudioEngine) -> AudioResult<()> {
        match self.state {
            PlayState::Default => Err(AudioError::InvalidState),
            PlayState::Stopped => Err(AudioError::AlreadyStopped),
            PlayState::Paused => {
                let memento = std::mem::take(&mut self.memento);
                self.memento = memento.from_zero();
                self.state = PlayState::Stopped;
                Ok(())
            }
            PlayState::Playing(generation) => {
                let handle = self.handle.clone().ok_or(AudioError::InvalidState)?;
                if handle.lock().generation() == generation {
                    self.memento = engine.stop_session(&handle);
                } else {
                    // Finished on its own; nothing to halt.
                    let memento = std::mem::take(&mut self.memento);
                    self.memento = memento.from_zero();
                }
                self.state = PlayState::Stopped;
                Ok(())
            }
        }
    }
}
