//! A simple interface to a game's sound system.
//!
//! The engine provides two independent playback domains: a fixed pool of
//! interruptible sound effect voices and a single persistent background
//! track. It owns the voice allocation and interruption policy, a preload
//! cache of decoded buffers keyed by source path, and the hierarchical
//! mute/pause/volume state (global, per-domain, per-voice). Rendering and
//! decoding are delegated to the [`AudioBackend`] and [`SoundLoader`]
//! collaborators; the production pair is [`KiraBackend`] and
//! [`SymphoniaLoader`].
#![warn(missing_docs)]

pub mod backend;
mod background;
mod cache;
mod error;
mod frame;
mod loader;
mod pool;
mod settings;
mod state;
mod voice;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, channel};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, warn};

pub use crate::backend::kira::KiraBackend;
pub use crate::backend::{AudioBackend, BindSettings, BindingId, CompletionEvent};
use crate::background::BackgroundSlot;
use crate::cache::PreloadCache;
pub use crate::error::{BackendError, ConfigurationError, InitializationError, LoadError};
pub use crate::frame::Frame;
pub use crate::loader::{MemoryLoader, SoundBuffer, SoundLoader, SymphoniaLoader};
use crate::pool::ChannelPool;
pub use crate::settings::{BackgroundSettings, EffectSettings, EngineSettings, SessionPreferences};
use crate::state::{LevelState, StateCoordinator, combine};
pub use crate::state::Domain;
pub use crate::voice::VoiceKey;
use crate::voice::VoiceState;

/// Guards the "construct once before use" contract of the shared engine.
static SHARED_ENGINE_CLAIMED: AtomicBool = AtomicBool::new(false);

fn claim_shared_slot() -> Result<(), ConfigurationError> {
    match SHARED_ENGINE_CLAIMED.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => Ok(()),
        Err(_) => Err(ConfigurationError::AlreadyInitialized),
    }
}

fn release_shared_slot() {
    SHARED_ENGINE_CLAIMED.store(false, Ordering::Release);
}

/// The audio engine. Provides a simple interface to play sound effects on a
/// pool of interruptible voices and one persistent background track.
///
/// All operations go through a shared reference; pass the engine explicitly
/// to whoever needs it. Playback-path failures degrade to an empty result
/// and a log line, a missed sound effect never tears down anything else.
pub struct AudioEngine<B: AudioBackend, L: SoundLoader> {
    cache: PreloadCache<L>,
    engine_context: Mutex<EngineContext<B>>,
    claimed_shared: bool,
}

struct EngineContext<B> {
    backend: B,
    background: BackgroundSlot,
    completion_receiver: Receiver<CompletionEvent>,
    pool: ChannelPool,
    state: StateCoordinator,
}

impl AudioEngine<KiraBackend, SymphoniaLoader> {
    /// Creates the shared engine over the default output device, resolving
    /// sources relative to `base_path`.
    ///
    /// Must be called at most once before [`purge`](Self::purge); a second
    /// call while an instance is alive fails with
    /// [`ConfigurationError::AlreadyInitialized`]. Backend failures are
    /// fatal here, nothing can play without a device.
    pub fn create_shared(
        settings: EngineSettings,
        preferences: SessionPreferences,
        base_path: impl Into<PathBuf>,
    ) -> Result<Self, InitializationError> {
        claim_shared_slot()?;

        // One extra slot for the background track.
        let backend = match KiraBackend::new(settings.total_channels as usize + 1, preferences) {
            Ok(backend) => backend,
            Err(error) => {
                release_shared_slot();
                return Err(error.into());
            }
        };

        let loader = Arc::new(SymphoniaLoader::new(base_path));
        match Self::new(settings, backend, loader) {
            Ok(mut engine) => {
                engine.claimed_shared = true;
                Ok(engine)
            }
            Err(error) => {
                release_shared_slot();
                Err(error.into())
            }
        }
    }
}

impl<B: AudioBackend, L: SoundLoader> AudioEngine<B, L> {
    /// Creates an engine from explicit collaborators.
    ///
    /// The backend must provide one channel slot per pool channel plus one
    /// for the background track.
    pub fn new(settings: EngineSettings, mut backend: B, loader: Arc<L>) -> Result<Self, ConfigurationError> {
        let pool = ChannelPool::new(settings.total_channels, settings.reserved_channels)?;

        let required = settings.total_channels as usize + 1;
        let available = backend.channel_count();
        if available < required {
            return Err(ConfigurationError::InsufficientBackendChannels { available, required });
        }

        let (completion_sender, completion_receiver) = channel();
        backend.set_completion_sender(completion_sender);

        let background = BackgroundSlot::new(settings.total_channels as usize);
        let cache = PreloadCache::new(loader, settings.preload_cache_enabled);

        let engine_context = Mutex::new(EngineContext {
            backend,
            background,
            completion_receiver,
            pool,
            state: StateCoordinator::default(),
        });

        Ok(Self {
            cache,
            engine_context,
            claimed_shared: false,
        })
    }

    /// Tears the engine down: stops everything and, for the shared engine,
    /// frees the initialization slot so a new instance may be created.
    pub fn purge(self) {
        self.stop_everything();
    }

    /// Collects completion notifications from the backend and frees the
    /// voices whose playback ended naturally. Should be called once a frame.
    pub fn update(&self) {
        let mut context = self.engine_context.lock().unwrap();
        context.backend.pump();
        context.drain_completions();
    }

    /// Loads a sound effect into the preload cache so the first play does
    /// not pay the decode cost.
    pub fn preload_effect(&self, path: &str) -> Result<(), LoadError> {
        self.cache.resolve(path).map(|_buffer| ())
    }

    /// Drops the cached buffer of the given path. Voices still playing it
    /// keep their own reference; absent paths are a no-op.
    pub fn unload_effect(&self, path: &str) {
        self.cache.unload(path);
    }

    /// Drops every cached effect buffer.
    pub fn unload_all_effects(&self) {
        self.cache.unload_all();
    }

    /// Plays a sound effect on a pool voice.
    ///
    /// Returns the key of the voice, or `None` when the source failed to
    /// load or the pool is exhausted with nothing stealable. Both cases are
    /// deliberately quiet, best-effort audio must not interrupt the rest of
    /// the game.
    pub fn play_effect(&self, path: &str, settings: EffectSettings) -> Option<VoiceKey> {
        let buffer = match self.cache.resolve(path) {
            Ok(buffer) => buffer,
            Err(error) => {
                warn!("can't load sound effect '{path}': {error}");
                return None;
            }
        };

        self.engine_context.lock().unwrap().play_effect(&buffer, &settings)
    }

    /// Stops the voice addressed by `key`. Keys of voices that have been
    /// stolen or released in the meantime are ignored.
    pub fn stop_effect(&self, key: VoiceKey) {
        self.engine_context.lock().unwrap().stop_effect(key);
    }

    /// Stops every effect voice, regardless of looping or priority.
    pub fn stop_all_effects(&self) {
        self.engine_context.lock().unwrap().stop_all_effects();
    }

    /// Sets the voice-level mute flag of a playing effect.
    pub fn set_effect_muted(&self, key: VoiceKey, muted: bool) {
        self.engine_context
            .lock()
            .unwrap()
            .update_voice_level(key, |level| level.muted = muted);
    }

    /// Sets the voice-level pause flag of a playing effect.
    pub fn set_effect_paused(&self, key: VoiceKey, paused: bool) {
        self.engine_context
            .lock()
            .unwrap()
            .update_voice_level(key, |level| level.paused = paused);
    }

    /// Sets the voice-level volume of a playing effect.
    pub fn set_effect_volume(&self, key: VoiceKey, volume: f32) {
        self.engine_context
            .lock()
            .unwrap()
            .update_voice_level(key, |level| level.volume = volume);
    }

    /// Loads the background source, replacing the current background track.
    /// The previous track is stopped even if the new source fails to load.
    pub fn preload_background(&self, path: &str) -> bool {
        self.engine_context.lock().unwrap().stop_background();

        let buffer = match self.cache.resolve_persistent(path) {
            Ok(buffer) => buffer,
            Err(error) => {
                warn!("can't load background track '{path}': {error}");
                return false;
            }
        };

        self.engine_context.lock().unwrap().load_background(path, buffer);
        true
    }

    /// Starts the preloaded background track. Fails when nothing is loaded,
    /// for example after a stop.
    pub fn play_background(&self, looping: bool) -> bool {
        self.engine_context.lock().unwrap().play_background(looping)
    }

    /// Loads and starts a background source in one step, failing as a whole
    /// when either step fails.
    pub fn play_background_file(&self, path: &str, settings: BackgroundSettings) -> bool {
        if !self.preload_background(path) {
            return false;
        }

        let mut context = self.engine_context.lock().unwrap();
        context.background.level.volume = settings.volume;
        context.background.pan = settings.pan;
        context.play_background(settings.looping)
    }

    /// Stops the background track and rewinds it. The source must be
    /// reloaded to play again.
    pub fn stop_background(&self) {
        self.engine_context.lock().unwrap().stop_background();
    }

    /// Pauses the background track without touching loaded content.
    pub fn pause_background(&self) {
        self.engine_context
            .lock()
            .unwrap()
            .update_background_level(|level| level.paused = true);
    }

    /// Resumes the background track.
    pub fn resume_background(&self) {
        self.engine_context
            .lock()
            .unwrap()
            .update_background_level(|level| level.paused = false);
    }

    /// Sets the slot-level mute flag of the background track.
    pub fn set_background_muted(&self, muted: bool) {
        self.engine_context
            .lock()
            .unwrap()
            .update_background_level(|level| level.muted = muted);
    }

    /// Sets the slot-level volume of the background track.
    pub fn set_background_volume(&self, volume: f32) {
        self.engine_context
            .lock()
            .unwrap()
            .update_background_level(|level| level.volume = volume);
    }

    /// Sets the stereo panning of the background track.
    pub fn set_background_panning(&self, pan: f32) {
        let mut context = self.engine_context.lock().unwrap();
        context.background.pan = pan;

        if context.background.is_active() {
            let slot = context.background.slot;
            context.backend.set_panning(slot, pan);
        }
    }

    /// Mutes or unmutes everything. Per-domain and per-voice flags are
    /// preserved and restored exactly when the global flag is cleared.
    pub fn set_muted(&self, muted: bool) {
        self.engine_context
            .lock()
            .unwrap()
            .update_levels(|state| state.set_global_muted(muted));
    }

    /// Pauses or resumes everything, preserving lower-level flags.
    pub fn set_paused(&self, paused: bool) {
        self.engine_context
            .lock()
            .unwrap()
            .update_levels(|state| state.set_global_paused(paused));
    }

    /// Sets the global volume. The audible gain of a voice is the product
    /// of the global, domain and voice volumes.
    pub fn set_volume(&self, volume: f32) {
        self.engine_context
            .lock()
            .unwrap()
            .update_levels(|state| state.set_global_volume(volume));
    }

    /// Mutes or unmutes one domain.
    pub fn set_domain_muted(&self, domain: Domain, muted: bool) {
        self.engine_context
            .lock()
            .unwrap()
            .update_levels(|state| state.set_domain_muted(domain, muted));
    }

    /// Pauses or resumes one domain.
    pub fn set_domain_paused(&self, domain: Domain, paused: bool) {
        self.engine_context
            .lock()
            .unwrap()
            .update_levels(|state| state.set_domain_paused(domain, paused));
    }

    /// Sets the volume of one domain.
    pub fn set_domain_volume(&self, domain: Domain, volume: f32) {
        self.engine_context
            .lock()
            .unwrap()
            .update_levels(|state| state.set_domain_volume(domain, volume));
    }

    /// Toggles the preload cache. Disabling makes every resolve load
    /// freshly but leaves existing entries untouched.
    pub fn set_preload_cache_enabled(&self, enabled: bool) {
        self.cache.set_enabled(enabled);
    }

    /// Returns whether the preload cache stores future loads.
    pub fn preload_cache_enabled(&self) -> bool {
        self.cache.is_enabled()
    }

    /// The number of entries in the preload cache, for diagnostics.
    pub fn preload_cache_count(&self) -> u32 {
        self.cache.count()
    }

    /// The path of the most recently loaded background source, if any. The
    /// path survives a stop, so callers can tell what was playing last.
    pub fn background_path(&self) -> Option<String> {
        self.engine_context.lock().unwrap().background.last_path.clone()
    }

    /// Stops every effect voice and the background track.
    pub fn stop_everything(&self) {
        let mut context = self.engine_context.lock().unwrap();
        context.stop_all_effects();
        context.stop_background();
    }
}

impl<B: AudioBackend, L: SoundLoader> Drop for AudioEngine<B, L> {
    fn drop(&mut self) {
        if self.claimed_shared {
            release_shared_slot();
        }
    }
}

impl<B: AudioBackend> EngineContext<B> {
    fn drain_completions(&mut self) {
        while let Ok(event) = self.completion_receiver.try_recv() {
            if event.slot == self.background.slot {
                if self.background.binding == Some(event.binding) {
                    self.background.finish_playback();
                }
                continue;
            }

            let _ = self.pool.release_binding(event.slot, event.binding);
        }
    }

    fn play_effect(&mut self, buffer: &SoundBuffer, settings: &EffectSettings) -> Option<VoiceKey> {
        // Voices that finished since the last update are free to reuse;
        // collect them before deciding to steal one.
        self.backend.pump();
        self.drain_completions();

        let Some(index) = self.pool.select() else {
            debug!("no effect voice available, dropping playback");
            return None;
        };

        let slot = self.pool.voice(index).slot;
        if self.pool.voice(index).is_busy() {
            self.backend.stop(slot);
        }

        self.pool.voice_mut(index).begin(settings, Instant::now());

        let voice = self.pool.voice(index);
        let effective = combine(voice.level, self.state.domain(Domain::Effect), self.state.global());
        let bind_settings = BindSettings {
            gain: effective.gain(),
            playback_rate: voice.pitch,
            panning: voice.pan,
            looping: voice.looping,
        };

        let binding = match self.backend.bind(slot, buffer, bind_settings) {
            Ok(binding) => binding,
            Err(error) => {
                warn!("can't bind sound effect: {error}");
                self.pool.voice_mut(index).clear();
                return None;
            }
        };

        if let Err(error) = self.backend.start(slot) {
            warn!("can't start sound effect: {error}");
            self.backend.stop(slot);
            self.pool.voice_mut(index).clear();
            return None;
        }

        let voice = self.pool.voice_mut(index);
        voice.state = VoiceState::Playing;
        voice.binding = Some(binding);

        if effective.paused {
            self.backend.set_paused(slot, true);
        }

        Some(self.pool.key_of(index))
    }

    fn stop_effect(&mut self, key: VoiceKey) {
        if let Some(index) = self.pool.lookup(key)
            && self.pool.voice(index).is_busy()
        {
            let slot = self.pool.voice(index).slot;
            self.backend.stop(slot);
            self.pool.voice_mut(index).clear();
        }
    }

    fn stop_all_effects(&mut self) {
        for slot in self.pool.clear_all() {
            self.backend.stop(slot);
        }
    }

    fn update_voice_level(&mut self, key: VoiceKey, update: impl FnOnce(&mut LevelState)) {
        let Some(index) = self.pool.lookup(key) else {
            return;
        };

        update(&mut self.pool.voice_mut(index).level);
        self.push_voice(index);
    }

    fn update_background_level(&mut self, update: impl FnOnce(&mut LevelState)) {
        update(&mut self.background.level);
        self.push_background();
    }

    fn update_levels(&mut self, update: impl FnOnce(&mut StateCoordinator)) {
        update(&mut self.state);

        // Re-derive and push the effective state of every live voice within
        // the same call, so the audible result changes immediately.
        for index in 0..self.pool.len() {
            self.push_voice(index);
        }
        self.push_background();
    }

    fn push_voice(&mut self, index: usize) {
        let (slot, level, voice_state) = {
            let voice = self.pool.voice(index);
            (voice.slot, voice.level, voice.state)
        };

        if voice_state != VoiceState::Playing {
            return;
        }

        let effective = combine(level, self.state.domain(Domain::Effect), self.state.global());
        self.backend.set_gain(slot, effective.gain());
        self.backend.set_paused(slot, effective.paused);
    }

    fn push_background(&mut self) {
        if !self.background.is_active() {
            return;
        }

        let effective = combine(self.background.level, self.state.domain(Domain::Background), self.state.global());
        self.backend.set_gain(self.background.slot, effective.gain());
        self.backend.set_paused(self.background.slot, effective.paused);
    }

    fn load_background(&mut self, path: &str, buffer: SoundBuffer) {
        self.background.load(path, buffer);
    }

    fn play_background(&mut self, looping: bool) -> bool {
        if self.background.is_active() {
            self.backend.stop(self.background.slot);
            self.background.binding = None;
        }

        let Some(buffer) = self.background.loaded.clone() else {
            return false;
        };

        let effective = combine(self.background.level, self.state.domain(Domain::Background), self.state.global());
        let bind_settings = BindSettings {
            gain: effective.gain(),
            playback_rate: 1.0,
            panning: self.background.pan,
            looping,
        };

        let slot = self.background.slot;
        let binding = match self.backend.bind(slot, &buffer, bind_settings) {
            Ok(binding) => binding,
            Err(error) => {
                warn!("can't bind background track: {error}");
                return false;
            }
        };

        if let Err(error) = self.backend.start(slot) {
            warn!("can't start background track: {error}");
            self.backend.stop(slot);
            return false;
        }

        self.background.binding = Some(binding);

        if effective.paused {
            self.backend.set_paused(slot, true);
        }

        true
    }

    fn stop_background(&mut self) {
        if self.background.is_active() {
            self.backend.stop(self.background.slot);
        }
        self.background.finish_playback();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::sync::mpsc::Sender;

    use hashbrown::HashMap;

    use super::*;

    #[derive(Default)]
    struct MockState {
        bindings: HashMap<usize, BindingId>,
        bound: Vec<(usize, BindSettings)>,
        fail_start: bool,
        gains: HashMap<usize, f32>,
        next_binding: u64,
        pans: HashMap<usize, f32>,
        paused: HashMap<usize, bool>,
        pending: Vec<CompletionEvent>,
        sender: Option<Sender<CompletionEvent>>,
        started: Vec<usize>,
        stopped: Vec<usize>,
    }

    #[derive(Clone)]
    struct MockBackend {
        channels: usize,
        state: Arc<Mutex<MockState>>,
    }

    impl MockBackend {
        fn new(channels: usize) -> Self {
            Self {
                channels,
                state: Arc::new(Mutex::new(MockState::default())),
            }
        }

        // Queues a completion event for the playback currently bound to the
        // slot. It is delivered on the next pump.
        fn finish(&self, slot: usize) {
            let mut state = self.state.lock().unwrap();
            if let Some(&binding) = state.bindings.get(&slot) {
                state.pending.push(CompletionEvent { slot, binding });
            }
        }

        fn set_fail_start(&self, fail: bool) {
            self.state.lock().unwrap().fail_start = fail;
        }

        fn started(&self) -> Vec<usize> {
            self.state.lock().unwrap().started.clone()
        }

        fn stopped(&self) -> Vec<usize> {
            self.state.lock().unwrap().stopped.clone()
        }

        fn bound(&self) -> Vec<(usize, BindSettings)> {
            self.state.lock().unwrap().bound.clone()
        }

        fn gain(&self, slot: usize) -> f32 {
            self.state.lock().unwrap().gains[&slot]
        }

        fn is_paused(&self, slot: usize) -> bool {
            self.state.lock().unwrap().paused[&slot]
        }

        fn pan(&self, slot: usize) -> f32 {
            self.state.lock().unwrap().pans[&slot]
        }
    }

    impl AudioBackend for MockBackend {
        fn channel_count(&self) -> usize {
            self.channels
        }

        fn set_completion_sender(&mut self, sender: Sender<CompletionEvent>) {
            self.state.lock().unwrap().sender = Some(sender);
        }

        fn bind(&mut self, slot: usize, _buffer: &SoundBuffer, settings: BindSettings) -> Result<BindingId, BackendError> {
            let mut state = self.state.lock().unwrap();
            state.next_binding += 1;
            let binding = BindingId::new(state.next_binding);
            state.bindings.insert(slot, binding);
            state.bound.push((slot, settings));
            state.gains.insert(slot, settings.gain);
            Ok(binding)
        }

        fn start(&mut self, slot: usize) -> Result<(), BackendError> {
            let mut state = self.state.lock().unwrap();
            if state.fail_start {
                return Err(BackendError::new("start rejected"));
            }
            state.started.push(slot);
            state.paused.insert(slot, false);
            Ok(())
        }

        fn stop(&mut self, slot: usize) {
            let mut state = self.state.lock().unwrap();
            state.stopped.push(slot);
            state.bindings.remove(&slot);
        }

        fn set_paused(&mut self, slot: usize, paused: bool) {
            self.state.lock().unwrap().paused.insert(slot, paused);
        }

        fn set_gain(&mut self, slot: usize, gain: f32) {
            self.state.lock().unwrap().gains.insert(slot, gain);
        }

        fn set_panning(&mut self, slot: usize, pan: f32) {
            self.state.lock().unwrap().pans.insert(slot, pan);
        }

        fn pump(&mut self) {
            let mut state = self.state.lock().unwrap();
            if let Some(sender) = state.sender.clone() {
                for event in state.pending.drain(..) {
                    let _ = sender.send(event);
                }
            }
        }
    }

    #[derive(Default)]
    struct CountingLoader {
        loads: AtomicU32,
    }

    impl CountingLoader {
        fn loads(&self) -> u32 {
            self.loads.load(Ordering::Acquire)
        }
    }

    impl SoundLoader for CountingLoader {
        fn load(&self, path: &str) -> Result<SoundBuffer, LoadError> {
            if path == "missing.wav" {
                return Err(LoadError::NotFound(path.to_owned()));
            }

            self.loads.fetch_add(1, Ordering::AcqRel);
            Ok(SoundBuffer::new(44100, vec![Frame::ZERO; 16]))
        }
    }

    fn test_engine(
        total_channels: u32,
        reserved_channels: u32,
    ) -> (AudioEngine<MockBackend, CountingLoader>, MockBackend, Arc<CountingLoader>) {
        let backend = MockBackend::new(total_channels as usize + 1);
        let handle = backend.clone();
        let loader = Arc::new(CountingLoader::default());
        let settings = EngineSettings {
            total_channels,
            reserved_channels,
            ..Default::default()
        };

        let engine = AudioEngine::new(settings, backend, loader.clone()).unwrap();
        (engine, handle, loader)
    }

    #[test]
    fn test_reserved_channels_must_fit() {
        let settings = EngineSettings {
            total_channels: 2,
            reserved_channels: 3,
            ..Default::default()
        };

        let result = AudioEngine::new(settings, MockBackend::new(8), Arc::new(CountingLoader::default()));
        assert!(matches!(
            result.err(),
            Some(ConfigurationError::ReservedExceedsTotal { reserved: 3, total: 2 })
        ));
    }

    #[test]
    fn test_backend_must_cover_pool_and_background() {
        let settings = EngineSettings {
            total_channels: 4,
            ..Default::default()
        };

        // Four pool channels plus the background track need five slots.
        let result = AudioEngine::new(settings, MockBackend::new(4), Arc::new(CountingLoader::default()));
        assert!(matches!(
            result.err(),
            Some(ConfigurationError::InsufficientBackendChannels { available: 4, required: 5 })
        ));
    }

    #[test]
    fn test_reserved_slots_are_never_allocated() {
        let (engine, backend, _loader) = test_engine(4, 2);

        engine.play_effect("one.wav", EffectSettings::default());
        engine.play_effect("two.wav", EffectSettings::default());
        let third = engine.play_effect("three.wav", EffectSettings::default());

        // Only slots 2 and 3 belong to the pool, so the third play steals
        // the oldest voice instead of touching a reserved slot.
        assert!(third.is_some());
        let slots: Vec<usize> = backend.bound().iter().map(|(slot, _)| *slot).collect();
        assert_eq!(slots, vec![2, 3, 2]);
        assert_eq!(backend.stopped(), vec![2]);
    }

    #[test]
    fn test_exhausted_pool_steals_exactly_once() {
        let (engine, backend, _loader) = test_engine(4, 0);

        let keys: Vec<Option<VoiceKey>> = (0..5)
            .map(|index| engine.play_effect(&format!("sound{index}.wav"), EffectSettings::default()))
            .collect();

        assert!(keys.iter().all(Option::is_some));

        let slots: Vec<usize> = backend.bound().iter().map(|(slot, _)| *slot).collect();
        assert_eq!(slots[..4], [0, 1, 2, 3]);
        assert_eq!(slots[4], 0);
        assert_eq!(backend.stopped(), vec![0]);
    }

    #[test]
    fn test_looping_voices_are_not_stolen() {
        let (engine, backend, _loader) = test_engine(2, 0);
        let looping = EffectSettings {
            looping: true,
            ..Default::default()
        };

        assert!(engine.play_effect("a.wav", looping).is_some());
        assert!(engine.play_effect("b.wav", looping).is_some());

        // Both voices are looping, the overflowing play is dropped quietly.
        assert!(engine.play_effect("c.wav", EffectSettings::default()).is_none());
        assert!(backend.stopped().is_empty());
    }

    #[test]
    fn test_preload_decodes_only_once() {
        let (engine, _backend, loader) = test_engine(2, 0);

        engine.preload_effect("step.wav").unwrap();
        engine.preload_effect("step.wav").unwrap();
        assert_eq!(loader.loads(), 1);
        assert_eq!(engine.preload_cache_count(), 1);

        engine.play_effect("step.wav", EffectSettings::default());
        assert_eq!(loader.loads(), 1);
    }

    #[test]
    fn test_disabled_cache_still_plays() {
        let (engine, _backend, loader) = test_engine(2, 0);
        engine.set_preload_cache_enabled(false);

        assert!(engine.play_effect("step.wav", EffectSettings::default()).is_some());
        assert!(engine.play_effect("step.wav", EffectSettings::default()).is_some());

        assert_eq!(loader.loads(), 2);
        assert_eq!(engine.preload_cache_count(), 0);
    }

    #[test]
    fn test_unloaded_effect_is_reloaded_on_play() {
        let (engine, _backend, loader) = test_engine(2, 0);

        engine.preload_effect("step.wav").unwrap();
        engine.unload_effect("step.wav");
        assert_eq!(engine.preload_cache_count(), 0);

        assert!(engine.play_effect("step.wav", EffectSettings::default()).is_some());
        assert_eq!(loader.loads(), 2);
        assert_eq!(engine.preload_cache_count(), 1);
    }

    #[test]
    fn test_missing_source_degrades_quietly() {
        let (engine, backend, _loader) = test_engine(2, 0);

        assert!(engine.play_effect("missing.wav", EffectSettings::default()).is_none());
        assert!(backend.bound().is_empty());
        assert!(!engine.preload_background("missing.wav"));
    }

    #[test]
    fn test_completion_frees_the_voice() {
        let (engine, backend, _loader) = test_engine(1, 0);

        engine.play_effect("a.wav", EffectSettings::default()).unwrap();
        backend.finish(0);
        engine.update();

        // The freed voice is reused without an interruption.
        assert!(engine.play_effect("b.wav", EffectSettings::default()).is_some());
        assert!(backend.stopped().is_empty());
        assert_eq!(backend.started(), vec![0, 0]);
    }

    #[test]
    fn test_stale_completion_is_ignored() {
        let (engine, backend, _loader) = test_engine(1, 0);
        let looping = EffectSettings {
            looping: true,
            ..Default::default()
        };

        let first = engine.play_effect("a.wav", EffectSettings::default()).unwrap();
        backend.finish(0);
        engine.stop_effect(first);
        assert!(engine.play_effect("b.wav", looping).is_some());

        // The queued completion belongs to the stopped playback and must
        // not free the voice now occupying the slot.
        engine.update();
        assert!(engine.play_effect("c.wav", EffectSettings::default()).is_none());
    }

    #[test]
    fn test_stopped_key_goes_stale() {
        let (engine, backend, _loader) = test_engine(2, 0);

        let key = engine.play_effect("a.wav", EffectSettings::default()).unwrap();
        engine.stop_effect(key);
        assert_eq!(backend.stopped(), vec![0]);

        // A second stop through the same key must not touch the backend.
        engine.stop_effect(key);
        engine.set_effect_muted(key, true);
        assert_eq!(backend.stopped(), vec![0]);
    }

    #[test]
    fn test_start_failure_leaves_the_voice_free() {
        let (engine, backend, _loader) = test_engine(1, 0);

        backend.set_fail_start(true);
        assert!(engine.play_effect("a.wav", EffectSettings::default()).is_none());

        backend.set_fail_start(false);
        assert!(engine.play_effect("a.wav", EffectSettings::default()).is_some());
        assert_eq!(backend.started(), vec![0]);
    }

    #[test]
    fn test_volumes_multiply_across_levels() {
        let (engine, backend, _loader) = test_engine(2, 0);

        engine.set_volume(0.5);
        engine.set_domain_volume(Domain::Effect, 0.5);

        let settings = EffectSettings {
            volume: 0.5,
            ..Default::default()
        };
        let key = engine.play_effect("a.wav", settings).unwrap();
        assert_eq!(backend.gain(0), 0.125);

        engine.set_effect_volume(key, 1.0);
        assert_eq!(backend.gain(0), 0.25);
    }

    #[test]
    fn test_global_mute_preserves_voice_flags() {
        let (engine, backend, _loader) = test_engine(2, 0);

        let first = engine.play_effect("a.wav", EffectSettings::default()).unwrap();
        let second = engine.play_effect("b.wav", EffectSettings::default()).unwrap();
        engine.set_effect_muted(first, true);

        engine.set_muted(true);
        assert_eq!(backend.gain(0), 0.0);
        assert_eq!(backend.gain(1), 0.0);

        // Clearing the global flag restores the per-voice flags exactly.
        engine.set_muted(false);
        assert_eq!(backend.gain(0), 0.0);
        assert_eq!(backend.gain(1), 1.0);

        engine.set_effect_muted(first, false);
        assert_eq!(backend.gain(0), 1.0);
        let _ = second;
    }

    #[test]
    fn test_pause_cascades_to_new_playback() {
        let (engine, backend, _loader) = test_engine(2, 0);

        engine.play_effect("a.wav", EffectSettings::default()).unwrap();
        engine.set_paused(true);
        assert!(backend.is_paused(0));

        // A voice started under a global pause comes up paused.
        engine.play_effect("b.wav", EffectSettings::default()).unwrap();
        assert!(backend.is_paused(1));

        engine.set_paused(false);
        assert!(!backend.is_paused(0));
        assert!(!backend.is_paused(1));
    }

    #[test]
    fn test_background_replacement_stops_previous_track() {
        let (engine, backend, _loader) = test_engine(2, 0);

        assert!(engine.play_background_file("town.ogg", BackgroundSettings::default()));
        assert!(engine.play_background_file("battle.ogg", BackgroundSettings::default()));

        let background_binds: Vec<usize> = backend
            .bound()
            .iter()
            .map(|(slot, _)| *slot)
            .filter(|&slot| slot == 2)
            .collect();
        assert_eq!(background_binds.len(), 2);
        assert_eq!(backend.stopped(), vec![2]);
        assert_eq!(engine.background_path(), Some("battle.ogg".to_owned()));
    }

    #[test]
    fn test_stopped_background_requires_reload() {
        let (engine, _backend, _loader) = test_engine(2, 0);

        assert!(engine.play_background_file("town.ogg", BackgroundSettings::default()));
        engine.stop_background();

        assert!(!engine.play_background(true));
        assert!(engine.preload_background("town.ogg"));
        assert!(engine.play_background(true));
    }

    #[test]
    fn test_background_completion_clears_the_slot() {
        let (engine, backend, _loader) = test_engine(2, 0);

        assert!(engine.play_background_file("town.ogg", BackgroundSettings::default()));
        backend.finish(2);
        engine.update();

        assert!(!engine.play_background(false));
        assert_eq!(engine.background_path(), Some("town.ogg".to_owned()));
    }

    #[test]
    fn test_background_levels_are_independent() {
        let (engine, backend, _loader) = test_engine(2, 0);

        engine.play_effect("a.wav", EffectSettings::default()).unwrap();
        let settings = BackgroundSettings {
            volume: 0.5,
            ..Default::default()
        };
        assert!(engine.play_background_file("town.ogg", settings));
        assert_eq!(backend.gain(2), 0.5);

        engine.set_domain_muted(Domain::Background, true);
        assert_eq!(backend.gain(2), 0.0);
        assert_eq!(backend.gain(0), 1.0);

        engine.pause_background();
        assert!(backend.is_paused(2));
        assert!(!backend.is_paused(0));

        engine.resume_background();
        assert!(!backend.is_paused(2));

        engine.set_background_panning(-0.5);
        assert_eq!(backend.pan(2), -0.5);
    }

    #[test]
    fn test_stop_everything_clears_both_domains() {
        let (engine, backend, _loader) = test_engine(2, 0);

        engine.play_effect("a.wav", EffectSettings::default()).unwrap();
        engine.play_effect("b.wav", EffectSettings::default()).unwrap();
        assert!(engine.play_background_file("town.ogg", BackgroundSettings::default()));

        engine.stop_everything();

        let mut stopped = backend.stopped();
        stopped.sort_unstable();
        assert_eq!(stopped, vec![0, 1, 2]);
        assert!(!engine.play_background(false));
    }

    #[test]
    fn test_shared_slot_is_exclusive() {
        claim_shared_slot().unwrap();
        assert!(matches!(claim_shared_slot(), Err(ConfigurationError::AlreadyInitialized)));

        release_shared_slot();
        claim_shared_slot().unwrap();
        release_shared_slot();
    }
}
