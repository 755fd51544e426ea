use thiserror::Error;

/// Error codes reported by [`Mixer`](crate::mixer::Mixer) operations.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MixerError {
    /// The id does not name a live buffer or source.
    #[error("unknown {kind} id {id}")]
    InvalidName { kind: &'static str, id: u32 },
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),
    /// The object is in a state that forbids the call.
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),
    /// Raised asynchronously by the output stream.
    #[error("output stream error: {0}")]
    Stream(String),
}
