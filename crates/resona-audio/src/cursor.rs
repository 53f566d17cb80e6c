//! Playback Cursors
//!
//! A cursor is the per-play iteration state over an [`AudioFile`] tree:
//! "configure the current clip / advance to the next, report whether more
//! remain". A fresh cursor is created per play; once consumed it is not
//! restartable.

use std::sync::Arc;

use rand::Rng;
use rand::rngs::StdRng;

use resona_platform::mixer::MixerGroups;
use resona_platform::source::AudioSource;

use crate::file::{AudioFile, AudioUnit};
use crate::{AudioError, AudioResult};

/// Draw a uniformly random child, failing on an empty collection
fn draw<'a>(files: &'a [AudioFile], rng: &mut StdRng) -> AudioResult<&'a AudioFile> {
    if files.is_empty() {
        return Err(AudioError::EmptyCollection);
    }
    Ok(&files[rng.gen_range(0..files.len())])
}

/// Cursor over an audio file tree
///
/// Owned by one handle at a time while playing; detached into a
/// [`Memento`](crate::handle::Memento) while paused.
#[derive(Debug)]
pub(crate) enum ClipCursor {
    /// Single clip, plays once
    Once(Arc<AudioUnit>),
    /// Single clip, reconfigures itself forever
    Loop(Arc<AudioUnit>),
    /// Looping bag: redraws a child whenever the current one exhausts
    BagLoop {
        files: Arc<[AudioFile]>,
        inner: Box<ClipCursor>,
    },
    /// Ordered walk over children, optionally wrapping
    Sequence {
        files: Arc<[AudioFile]>,
        /// Next child to start once `inner` exhausts
        index: usize,
        looping: bool,
        inner: Box<ClipCursor>,
    },
}

impl AudioFile {
    /// Begin playback of this file, configuring `source` for the first clip
    ///
    /// Called exactly once per play request; afterwards only
    /// [`ClipCursor::move_next`] and [`ClipCursor::apply_current`] are used.
    /// Children of composites are always started non-looping; looping is the
    /// composite's own responsibility.
    pub(crate) fn start_cursor(
        &self,
        source: &mut dyn AudioSource,
        looping: bool,
        mixer: &MixerGroups,
        rng: &mut StdRng,
    ) -> AudioResult<ClipCursor> {
        match self {
            AudioFile::Unit(unit) => {
                unit.configure(source, mixer, rng)?;
                if looping {
                    Ok(ClipCursor::Loop(unit.clone()))
                } else {
                    Ok(ClipCursor::Once(unit.clone()))
                }
            }
            AudioFile::Bag(files) => {
                let child = draw(files, rng)?;
                let inner = child.start_cursor(source, false, mixer, rng)?;
                if looping {
                    Ok(ClipCursor::BagLoop {
                        files: files.clone(),
                        inner: Box::new(inner),
                    })
                } else {
                    // A non-looping bag is just its drawn child.
                    Ok(inner)
                }
            }
            AudioFile::Sequence(files) => {
                let first = files.first().ok_or(AudioError::EmptyCollection)?;
                let inner = first.start_cursor(source, false, mixer, rng)?;
                Ok(ClipCursor::Sequence {
                    files: files.clone(),
                    index: 1,
                    looping,
                    inner: Box::new(inner),
                })
            }
        }
    }
}

impl ClipCursor {
    /// Re-apply the current clip's configuration to `source`
    pub(crate) fn apply_current(
        &self,
        source: &mut dyn AudioSource,
        mixer: &MixerGroups,
        rng: &mut StdRng,
    ) -> AudioResult<()> {
        match self {
            Self::Once(unit) | Self::Loop(unit) => unit.configure(source, mixer, rng),
            Self::BagLoop { inner, .. } | Self::Sequence { inner, .. } => {
                inner.apply_current(source, mixer, rng)
            }
        }
    }

    /// Configure `source` for the next clip, if any
    ///
    /// Returns `false` once the iteration has ended.
    pub(crate) fn move_next(
        &mut self,
        source: &mut dyn AudioSource,
        mixer: &MixerGroups,
        rng: &mut StdRng,
    ) -> AudioResult<bool> {
        match self {
            Self::Once(_) => Ok(false),
            Self::Loop(unit) => {
                unit.configure(source, mixer, rng)?;
                Ok(true)
            }
            Self::BagLoop { files, inner } => {
                if inner.move_next(source, mixer, rng)? {
                    return Ok(true);
                }
                let child = draw(files, rng)?;
                *inner = Box::new(child.start_cursor(source, false, mixer, rng)?);
                Ok(true)
            }
            Self::Sequence {
                files,
                index,
                looping,
                inner,
            } => {
                if inner.move_next(source, mixer, rng)? {
                    return Ok(true);
                }
                if *index < files.len() {
                    *inner = Box::new(files[*index].start_cursor(source, false, mixer, rng)?);
                    *index += 1;
                    Ok(true)
                } else if *looping {
                    let first = files.first().ok_or(AudioError::EmptyCollection)?;
                    *inner = Box::new(first.start_cursor(source, false, mixer, rng)?);
                    *index = 1;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }
}
