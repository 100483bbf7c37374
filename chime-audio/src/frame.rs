/// A stereo audio sample.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct Frame {
    /// The sample for the left channel.
    pub left: f32,
    /// The sample for the right channel.
    pub right: f32,
}

impl Frame {
    /// A [`Frame`] with both the left and right samples set to `0.0`.
    pub const ZERO: Frame = Frame { left: 0.0, right: 0.0 };

    /// Creates a frame with the given left and right values.
    #[must_use]
    pub fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    /// Creates a frame with both the left and right channels set to the same
    /// value.
    #[must_use]
    pub fn from_mono(value: f32) -> Self {
        Self::new(value, value)
    }
}
