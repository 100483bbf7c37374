/// Platform session preferences, passed through to the audio backend at
/// session-open time. The engine itself never interprets them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPreferences {
    /// Allow audio from other applications to keep playing.
    pub allow_external_audio: bool,
    /// Prefer hardware decoding when no other application is playing audio.
    pub prefer_hardware_decoding: bool,
    /// Honor the platform silent switch.
    pub honor_silent_switch: bool,
}

impl Default for SessionPreferences {
    fn default() -> Self {
        Self {
            allow_external_audio: true,
            prefer_hardware_decoding: true,
            honor_silent_switch: true,
        }
    }
}

/// Configuration of the audio engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// The total number of playback channels provided by the device.
    pub total_channels: u32,
    /// The number of channels reserved for exclusive use outside the effect
    /// pool. The remaining channels form the pool.
    pub reserved_channels: u32,
    /// Whether resolved effect buffers are kept in the preload cache.
    pub preload_cache_enabled: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            // Enough concurrent effects for a busy game scene.
            total_channels: 32,
            reserved_channels: 0,
            preload_cache_enabled: true,
        }
    }
}

/// Per-call playback parameters of a sound effect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectSettings {
    /// Linear playback volume in the range `[0, 1]`.
    pub volume: f32,
    /// Playback rate multiplier. Must be greater than zero.
    pub pitch: f32,
    /// Stereo panning in the range `[-1, 1]`.
    pub pan: f32,
    /// Whether the effect repeats until it is stopped or stolen.
    pub looping: bool,
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pitch: 1.0,
            pan: 0.0,
            looping: false,
        }
    }
}

/// Playback parameters of the background track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundSettings {
    /// Linear playback volume in the range `[0, 1]`.
    pub volume: f32,
    /// Stereo panning in the range `[-1, 1]`.
    pub pan: f32,
    /// Whether the track repeats until it is stopped.
    pub looping: bool,
}

impl Default for BackgroundSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pan: 0.0,
            looping: false,
        }
    }
}
