//! The production backend, rendering through kira and cpal.

use std::sync::Arc;
use std::sync::mpsc::Sender;

use cpal::BufferSize;
use kira::backend::cpal::{CpalBackend, CpalBackendSettings};
use kira::sound::PlaybackState;
use kira::sound::static_sound::{StaticSoundData, StaticSoundHandle, StaticSoundSettings};
use kira::track::{TrackBuilder, TrackHandle};
use kira::{AudioManager, AudioManagerSettings, Decibels, Frame, Panning, Tween};
use tracing::debug;

use crate::backend::{AudioBackend, BindSettings, BindingId, CompletionEvent};
use crate::error::BackendError;
use crate::loader::SoundBuffer;
use crate::settings::SessionPreferences;

struct Channel {
    /// The buffer bound for the next start.
    data: Option<StaticSoundData>,
    handle: Option<StaticSoundHandle>,
    binding: Option<BindingId>,
}

impl Channel {
    fn empty() -> Self {
        Self {
            data: None,
            handle: None,
            binding: None,
        }
    }
}

/// An [`AudioBackend`] backed by kira with its cpal output.
pub struct KiraBackend {
    _manager: AudioManager<CpalBackend>,
    track: TrackHandle,
    channels: Vec<Channel>,
    next_binding: u64,
    completion_sender: Option<Sender<CompletionEvent>>,
}

impl KiraBackend {
    /// Opens the default output device and prepares `channel_count` playback
    /// slots.
    pub fn new(channel_count: usize, preferences: SessionPreferences) -> Result<Self, BackendError> {
        // Desktop output has no session-level policy; the preferences are
        // accepted for interface parity and recorded for diagnostics.
        debug!(
            allow_external_audio = preferences.allow_external_audio,
            prefer_hardware_decoding = preferences.prefer_hardware_decoding,
            honor_silent_switch = preferences.honor_silent_switch,
            "opening audio session"
        );

        let mut manager = AudioManager::<CpalBackend>::new(AudioManagerSettings {
            backend_settings: CpalBackendSettings {
                device: None,
                // At a sampling rate of 48 kHz 1200 frames take 25 ms.
                buffer_size: BufferSize::Fixed(1200),
            },
            ..Default::default()
        })
        .map_err(|error| BackendError::new(format!("can't initialize audio backend: {error:?}")))?;

        let track = manager
            .add_sub_track(TrackBuilder::new())
            .map_err(|error| BackendError::new(format!("can't create playback track: {error}")))?;

        let channels = (0..channel_count).map(|_| Channel::empty()).collect();

        Ok(Self {
            _manager: manager,
            track,
            channels,
            next_binding: 0,
            completion_sender: None,
        })
    }
}

impl AudioBackend for KiraBackend {
    fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn set_completion_sender(&mut self, sender: Sender<CompletionEvent>) {
        self.completion_sender = Some(sender);
    }

    fn bind(&mut self, slot: usize, buffer: &SoundBuffer, settings: BindSettings) -> Result<BindingId, BackendError> {
        let channel = self
            .channels
            .get_mut(slot)
            .ok_or_else(|| BackendError::new(format!("channel slot {slot} out of range")))?;

        if let Some(mut handle) = channel.handle.take() {
            handle.stop(Tween::default());
        }

        let frames: Arc<[Frame]> = buffer
            .frames()
            .iter()
            .map(|frame| Frame::new(frame.left, frame.right))
            .collect();

        let mut data = StaticSoundData {
            sample_rate: buffer.sample_rate(),
            frames,
            settings: StaticSoundSettings::default(),
            slice: None,
        }
        .volume(linear_to_decibel(settings.gain))
        .panning(Panning(settings.panning))
        .playback_rate(settings.playback_rate as f64);

        if settings.looping {
            data = data.loop_region(..);
        }

        self.next_binding += 1;
        let binding = BindingId::new(self.next_binding);

        channel.data = Some(data);
        channel.binding = Some(binding);

        Ok(binding)
    }

    fn start(&mut self, slot: usize) -> Result<(), BackendError> {
        let channel = self
            .channels
            .get_mut(slot)
            .ok_or_else(|| BackendError::new(format!("channel slot {slot} out of range")))?;
        let data = channel
            .data
            .take()
            .ok_or_else(|| BackendError::new(format!("nothing bound to channel slot {slot}")))?;

        let handle = self
            .track
            .play(data)
            .map_err(|error| BackendError::new(format!("can't start playback: {error:?}")))?;
        channel.handle = Some(handle);

        Ok(())
    }

    fn stop(&mut self, slot: usize) {
        let Some(channel) = self.channels.get_mut(slot) else {
            return;
        };

        if let Some(mut handle) = channel.handle.take() {
            handle.stop(Tween::default());
        }
        channel.data = None;
        channel.binding = None;
    }

    fn set_paused(&mut self, slot: usize, paused: bool) {
        if let Some(handle) = self.channels.get_mut(slot).and_then(|channel| channel.handle.as_mut()) {
            match paused {
                true => handle.pause(Tween::default()),
                false => handle.resume(Tween::default()),
            }
        }
    }

    fn set_gain(&mut self, slot: usize, gain: f32) {
        if let Some(handle) = self.channels.get_mut(slot).and_then(|channel| channel.handle.as_mut()) {
            handle.set_volume(linear_to_decibel(gain), Tween::default());
        }
    }

    fn set_panning(&mut self, slot: usize, pan: f32) {
        if let Some(handle) = self.channels.get_mut(slot).and_then(|channel| channel.handle.as_mut()) {
            handle.set_panning(Panning(pan), Tween::default());
        }
    }

    fn pump(&mut self) {
        let Some(sender) = self.completion_sender.as_ref() else {
            return;
        };

        for (slot, channel) in self.channels.iter_mut().enumerate() {
            if let Some(handle) = channel.handle.as_ref()
                && handle.state() == PlaybackState::Stopped
                && let Some(binding) = channel.binding.take()
            {
                channel.handle = None;
                let _ = sender.send(CompletionEvent { slot, binding });
            }
        }
    }
}

fn linear_to_decibel(linear: f32) -> Decibels {
    if linear <= 0.0 {
        Decibels::SILENCE
    } else {
        Decibels::from(20.0 * linear.log10())
    }
}
