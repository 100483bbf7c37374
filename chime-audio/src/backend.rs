//! The playback backend collaborator interface.
//!
//! The engine owns the allocation and state logic; everything that actually
//! renders audio sits behind [`AudioBackend`]. Completion notifications flow
//! through an mpsc channel handed to the backend at engine construction and
//! are consumed on the engine's owner thread, never applied from a foreign
//! callback context.

use std::sync::mpsc::Sender;

use crate::error::BackendError;
use crate::loader::SoundBuffer;

pub mod kira;

/// Identifies one bind operation on a channel slot.
///
/// A completion event carries the binding it belongs to, so a stale event
/// for a channel that has since been stolen and rebound can be told apart
/// from a genuine completion of the current playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(u64);

impl BindingId {
    /// Creates a binding id from a backend-issued token.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw token.
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Playback parameters applied when binding a buffer to a channel slot.
///
/// The gain already has the mute/volume hierarchy folded in; the backend
/// never sees the individual levels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BindSettings {
    /// The effective linear gain.
    pub gain: f32,
    /// The playback rate multiplier.
    pub playback_rate: f32,
    /// Stereo panning in the range `[-1, 1]`.
    pub panning: f32,
    /// Whether playback repeats until stopped.
    pub looping: bool,
}

/// A notification that a channel finished playing on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionEvent {
    /// The channel slot that finished.
    pub slot: usize,
    /// The binding the completion belongs to.
    pub binding: BindingId,
}

/// The external audio rendering collaborator.
///
/// Channel slots are addressed by index; the engine decides which slot plays
/// what and the backend only executes. Implementations must issue a fresh
/// [`BindingId`] per bind and report natural playback completion through the
/// completion sender.
pub trait AudioBackend: Send + 'static {
    /// Returns the number of channel slots the backend provides.
    fn channel_count(&self) -> usize;

    /// Hands the backend the sender for completion events. Called once
    /// during engine construction.
    fn set_completion_sender(&mut self, sender: Sender<CompletionEvent>);

    /// Binds a buffer with the given parameters to a channel slot, replacing
    /// whatever was bound before.
    fn bind(&mut self, slot: usize, buffer: &SoundBuffer, settings: BindSettings) -> Result<BindingId, BackendError>;

    /// Starts playback of the bound buffer.
    fn start(&mut self, slot: usize) -> Result<(), BackendError>;

    /// Stops playback and releases the binding. No completion event is
    /// emitted for an explicit stop.
    fn stop(&mut self, slot: usize);

    /// Pauses or resumes playback without touching the binding.
    fn set_paused(&mut self, slot: usize, paused: bool);

    /// Updates the effective linear gain of a playing slot.
    fn set_gain(&mut self, slot: usize, gain: f32);

    /// Updates the stereo panning of a playing slot.
    fn set_panning(&mut self, slot: usize, pan: f32);

    /// Gives polling backends the opportunity to translate finished playback
    /// into completion events. Callback-driven backends may leave this empty
    /// and send from their own context instead.
    fn pump(&mut self);
}
