use chime_container::SlotKey;

use crate::backend::BindingId;
use crate::error::ConfigurationError;
use crate::voice::{Voice, VoiceKey, VoiceState};

/// The fixed-size pool of interruptible effect voices.
///
/// Interruption policy: a new request prefers the lowest free channel slot.
/// When every voice is busy, the voice with the oldest start timestamp among
/// the non-looping, playing voices is stolen; ties break to the lowest
/// channel slot. Looping voices are never stolen. If no voice qualifies, the
/// request is dropped silently.
pub(crate) struct ChannelPool {
    voices: Vec<Voice>,
    first_slot: usize,
}

impl ChannelPool {
    /// Creates the pool over the channel slots `reserved..total`. Slots
    /// below `reserved` are left for exclusive use outside the pool.
    pub(crate) fn new(total: u32, reserved: u32) -> Result<Self, ConfigurationError> {
        if reserved > total {
            return Err(ConfigurationError::ReservedExceedsTotal { reserved, total });
        }

        let voices = (reserved as usize..total as usize).map(Voice::new).collect();

        Ok(Self {
            voices,
            first_slot: reserved as usize,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.voices.len()
    }

    #[cfg(test)]
    pub(crate) fn free_count(&self) -> usize {
        self.voices.iter().filter(|voice| !voice.is_busy()).count()
    }

    /// Selects the voice to use for a new request without mutating anything.
    /// Returns `None` when the pool is exhausted and nothing is stealable.
    pub(crate) fn select(&self) -> Option<usize> {
        if let Some(index) = self.voices.iter().position(|voice| !voice.is_busy()) {
            return Some(index);
        }

        self.voices
            .iter()
            .enumerate()
            .filter(|(_, voice)| voice.state == VoiceState::Playing && !voice.looping)
            .min_by_key(|(_, voice)| (voice.started, voice.slot))
            .map(|(index, _)| index)
    }

    pub(crate) fn voice(&self, index: usize) -> &Voice {
        &self.voices[index]
    }

    pub(crate) fn voice_mut(&mut self, index: usize) -> &mut Voice {
        &mut self.voices[index]
    }

    pub(crate) fn key_of(&self, index: usize) -> VoiceKey {
        let voice = &self.voices[index];
        VoiceKey::new(voice.slot as u32, voice.generation)
    }

    /// Resolves a key to its voice index, rejecting keys from a previous
    /// generation of the slot.
    pub(crate) fn lookup(&self, key: VoiceKey) -> Option<usize> {
        let index = (key.slot() as usize).checked_sub(self.first_slot)?;
        let voice = self.voices.get(index)?;

        (voice.generation == key.generation()).then_some(index)
    }

    /// Releases the voice bound to `slot` if the binding still matches.
    /// Returns the index of the released voice.
    pub(crate) fn release_binding(&mut self, slot: usize, binding: BindingId) -> Option<usize> {
        let index = slot.checked_sub(self.first_slot)?;
        let voice = self.voices.get_mut(index)?;

        if voice.binding != Some(binding) {
            return None;
        }

        voice.clear();
        Some(index)
    }

    /// Frees every voice and returns the slots that were busy.
    pub(crate) fn clear_all(&mut self) -> Vec<usize> {
        let mut stopped = Vec::new();

        for voice in &mut self.voices {
            if voice.is_busy() {
                stopped.push(voice.slot);
                voice.clear();
            }
        }

        stopped
    }
}
