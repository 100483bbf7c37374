use std::error::Error;
use std::fmt::Display;

/// Errors caused by an invalid engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// More channels were reserved than the device provides.
    ReservedExceedsTotal {
        /// The requested number of reserved channels.
        reserved: u32,
        /// The total number of channels.
        total: u32,
    },
    /// The backend does not provide enough channel slots for the configured
    /// pool plus the background slot.
    InsufficientBackendChannels {
        /// The number of channel slots the backend provides.
        available: usize,
        /// The number of channel slots the engine needs.
        required: usize,
    },
    /// The shared engine was initialized a second time without purging the
    /// first instance.
    AlreadyInitialized,
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigurationError::ReservedExceedsTotal { reserved, total } => {
                write!(f, "Can't reserve {reserved} of {total} channels")
            }
            ConfigurationError::InsufficientBackendChannels { available, required } => {
                write!(f, "Backend provides {available} channel slots but {required} are required")
            }
            ConfigurationError::AlreadyInitialized => f.write_str("The shared audio engine was already initialized"),
        }
    }
}

impl Error for ConfigurationError {}

/// Errors that can occur when loading and decoding a sound.
#[derive(Debug)]
pub enum LoadError {
    /// The requested source could not be found.
    NotFound(String),
    /// The source contains no decodable audio track.
    NoDefaultTrack,
    /// The sample rate of the source could not be determined.
    UnknownSampleRate,
    /// The source could not be decoded.
    Decode(String),
}

impl Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::NotFound(path) => write!(f, "Can't find audio source '{path}'"),
            LoadError::NoDefaultTrack => f.write_str("The source contains no default audio track"),
            LoadError::UnknownSampleRate => f.write_str("The sample rate of the source is unknown"),
            LoadError::Decode(message) => write!(f, "Can't decode audio source: {message}"),
        }
    }
}

impl Error for LoadError {}

/// An error reported by the audio backend.
#[derive(Debug)]
pub struct BackendError {
    message: String,
}

impl BackendError {
    /// Creates a new [`BackendError`] with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Audio backend error: {}", self.message)
    }
}

impl Error for BackendError {}

/// Errors that can occur while creating the audio engine.
#[derive(Debug)]
pub enum InitializationError {
    /// The engine configuration is invalid.
    Configuration(ConfigurationError),
    /// The audio backend could not be opened.
    Backend(BackendError),
}

impl Display for InitializationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitializationError::Configuration(error) => error.fmt(f),
            InitializationError::Backend(error) => error.fmt(f),
        }
    }
}

impl Error for InitializationError {}

impl From<ConfigurationError> for InitializationError {
    fn from(error: ConfigurationError) -> Self {
        InitializationError::Configuration(error)
    }
}

impl From<BackendError> for InitializationError {
    fn from(error: BackendError) -> Self {
        InitializationError::Backend(error)
    }
}
