use std::num::NonZeroU32;
use std::time::Instant;

use chime_container::create_slot_key;

use crate::backend::BindingId;
use crate::settings::EffectSettings;
use crate::state::LevelState;

create_slot_key!(VoiceKey, "The key of an allocated effect voice");

/// The lifecycle state of a voice.
///
/// `Reserved` is the brief transition between allocation and the backend
/// acknowledging playback start; a failed start drops straight back to
/// `Free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VoiceState {
    Free,
    Reserved,
    Playing,
}

/// One playback unit bound to a fixed channel slot. Voices are created once
/// at pool initialization and rebound for every new play request.
pub(crate) struct Voice {
    /// The backend channel slot. Stable for the lifetime of the pool.
    pub(crate) slot: usize,
    /// Bumped on every allocation so stale [`VoiceKey`]s can't address the
    /// new playback.
    pub(crate) generation: NonZeroU32,
    pub(crate) state: VoiceState,
    pub(crate) binding: Option<BindingId>,
    /// The voice-level mute/pause/volume contribution.
    pub(crate) level: LevelState,
    pub(crate) pitch: f32,
    pub(crate) pan: f32,
    pub(crate) looping: bool,
    /// When the current playback started. Used by the interruption policy.
    pub(crate) started: Option<Instant>,
}

impl Voice {
    pub(crate) fn new(slot: usize) -> Self {
        Self {
            slot,
            generation: NonZeroU32::MIN,
            state: VoiceState::Free,
            binding: None,
            level: LevelState::default(),
            pitch: 1.0,
            pan: 0.0,
            looping: false,
            started: None,
        }
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.state != VoiceState::Free
    }

    /// Rebinds the voice for a new play request, invalidating all previous
    /// keys to this slot.
    pub(crate) fn begin(&mut self, settings: &EffectSettings, now: Instant) {
        self.generation = self.generation.checked_add(1).unwrap_or(NonZeroU32::MIN);
        self.state = VoiceState::Reserved;
        self.binding = None;
        self.level = LevelState {
            muted: false,
            paused: false,
            volume: settings.volume,
        };
        self.pitch = settings.pitch;
        self.pan = settings.pan;
        self.looping = settings.looping;
        self.started = Some(now);
    }

    /// Returns the voice to the free state.
    pub(crate) fn clear(&mut self) {
        self.state = VoiceState::Free;
        self.binding = None;
        self.started = None;
    }
}
