use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use chime_container::Cacheable;
use hashbrown::HashMap;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::probe::Hint;

use crate::error::LoadError;
use crate::frame::Frame;

/// A piece of audio decoded into memory all at once.
///
/// Buffers can be cheaply cloned, as the audio data is shared among all
/// clones. A voice that is still playing a buffer therefore keeps it alive
/// even after the buffer was evicted from the preload cache.
#[derive(Clone)]
pub struct SoundBuffer {
    sample_rate: u32,
    frames: Arc<[Frame]>,
}

impl SoundBuffer {
    /// Creates a new buffer from raw stereo frames.
    pub fn new(sample_rate: u32, frames: impl Into<Arc<[Frame]>>) -> Self {
        Self {
            sample_rate,
            frames: frames.into(),
        }
    }

    /// Returns the sample rate of the audio (in Hz).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the raw samples that make up the audio.
    pub fn frames(&self) -> &Arc<[Frame]> {
        &self.frames
    }
}

impl Cacheable for SoundBuffer {
    fn size(&self) -> usize {
        self.frames.len() * size_of::<Frame>()
    }
}

/// Trait for resolving a source path into a decoded [`SoundBuffer`].
///
/// Implementations may block; the engine never holds its channel table lock
/// while a load is in progress.
pub trait SoundLoader: Send + Sync + 'static {
    /// Loads and decodes the requested source.
    fn load(&self, path: &str) -> Result<SoundBuffer, LoadError>;
}

/// A [`SoundLoader`] that decodes audio files from the filesystem using
/// Symphonia.
pub struct SymphoniaLoader {
    base_path: PathBuf,
}

impl SymphoniaLoader {
    /// Creates a new loader that resolves paths relative to `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }
}

impl SoundLoader for SymphoniaLoader {
    fn load(&self, path: &str) -> Result<SoundBuffer, LoadError> {
        let full_path = self.base_path.join(path);
        let file = File::open(&full_path).map_err(|_| LoadError::NotFound(path.to_string()))?;

        let mut hint = Hint::new();
        if let Some(extension) = full_path.extension().and_then(|extension| extension.to_str()) {
            hint.with_extension(extension);
        }

        let media_source_stream = MediaSourceStream::new(Box::new(file), Default::default());
        let mut format_reader = symphonia::default::get_probe()
            .format(&hint, media_source_stream, &Default::default(), &Default::default())
            .map_err(|error| LoadError::Decode(error.to_string()))?
            .format;

        let default_track = format_reader.default_track().ok_or(LoadError::NoDefaultTrack)?;
        let default_track_id = default_track.id;
        let codec_params = &default_track.codec_params;
        let sample_rate = codec_params.sample_rate.ok_or(LoadError::UnknownSampleRate)?;
        let mut decoder = symphonia::default::get_codecs()
            .make(codec_params, &Default::default())
            .map_err(|error| LoadError::Decode(error.to_string()))?;

        let mut frames = Vec::new();
        loop {
            let packet = match format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(error)) if error.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(error) => return Err(LoadError::Decode(error.to_string())),
            };

            if packet.track_id() != default_track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                // Corrupt packets are skipped, matching Symphonia's
                // recommendation for recoverable decode errors.
                Err(SymphoniaError::IoError(_)) | Err(SymphoniaError::DecodeError(_)) => continue,
                Err(error) => return Err(LoadError::Decode(error.to_string())),
            };

            let spec = *decoded.spec();
            let channel_count = spec.channels.count();
            let mut sample_buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buffer.copy_interleaved_ref(decoded);

            match channel_count {
                0 => continue,
                1 => frames.extend(sample_buffer.samples().iter().copied().map(Frame::from_mono)),
                _ => frames.extend(
                    sample_buffer
                        .samples()
                        .chunks_exact(channel_count)
                        .map(|samples| Frame::new(samples[0], samples[1])),
                ),
            }
        }

        Ok(SoundBuffer::new(sample_rate, frames))
    }
}

/// A [`SoundLoader`] that serves buffers registered up front, for headless
/// use and tests.
#[derive(Default)]
pub struct MemoryLoader {
    sounds: HashMap<String, SoundBuffer>,
}

impl MemoryLoader {
    /// Creates a new, empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a buffer under the given path.
    pub fn insert(&mut self, path: impl Into<String>, buffer: SoundBuffer) {
        self.sounds.insert(path.into(), buffer);
    }
}

impl SoundLoader for MemoryLoader {
    fn load(&self, path: &str) -> Result<SoundBuffer, LoadError> {
        self.sounds.get(path).cloned().ok_or_else(|| LoadError::NotFound(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silent_buffer(frame_count: usize) -> SoundBuffer {
        SoundBuffer::new(48000, vec![Frame::ZERO; frame_count])
    }

    #[test]
    fn test_memory_loader_roundtrip() {
        let mut loader = MemoryLoader::new();
        loader.insert("chime.wav", silent_buffer(128));

        let buffer = loader.load("chime.wav").unwrap();
        assert_eq!(buffer.sample_rate(), 48000);
        assert_eq!(buffer.frames().len(), 128);
    }

    #[test]
    fn test_memory_loader_missing() {
        let loader = MemoryLoader::new();
        assert!(matches!(loader.load("missing.wav"), Err(LoadError::NotFound(_))));
    }

    #[test]
    fn test_symphonia_loader_missing_file() {
        let loader = SymphoniaLoader::new("/nonexistent");
        assert!(matches!(loader.load("missing.wav"), Err(LoadError::NotFound(_))));
    }

    #[test]
    fn test_buffer_size_accounting() {
        let buffer = silent_buffer(100);
        assert_eq!(buffer.size(), 100 * size_of::<Frame>());
    }
}
