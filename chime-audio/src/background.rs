use crate::backend::BindingId;
use crate::loader::SoundBuffer;
use crate::state::LevelState;

/// The singleton voice of the background track.
///
/// At most one logical background track is ever alive: loading a new source
/// tears down the current one first. Stopping rewinds; the slot remembers
/// the last-loaded path for diagnostics, but the buffer binding is dropped
/// and the source must be reloaded before it can play again.
pub(crate) struct BackgroundSlot {
    /// The dedicated backend channel slot of the background track.
    pub(crate) slot: usize,
    /// The buffer that will play on the next start. Held by the slot itself,
    /// so it persists across pause/resume independently of the preload
    /// cache.
    pub(crate) loaded: Option<SoundBuffer>,
    pub(crate) last_path: Option<String>,
    pub(crate) binding: Option<BindingId>,
    /// The slot-level mute/pause/volume contribution.
    pub(crate) level: LevelState,
    pub(crate) pan: f32,
}

impl BackgroundSlot {
    pub(crate) fn new(slot: usize) -> Self {
        Self {
            slot,
            loaded: None,
            last_path: None,
            binding: None,
            level: LevelState::default(),
            pan: 0.0,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.binding.is_some()
    }

    /// Binds a freshly resolved source to the slot.
    pub(crate) fn load(&mut self, path: &str, buffer: SoundBuffer) {
        self.loaded = Some(buffer);
        self.last_path = Some(path.to_string());
    }

    /// Stop-and-rewind: playback state and the buffer binding are dropped,
    /// only the knowledge of the last source remains.
    pub(crate) fn finish_playback(&mut self) {
        self.binding = None;
        self.loaded = None;
    }
}
