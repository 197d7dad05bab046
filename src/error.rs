use std::io;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, RadioError>;

/// Errors raised by the streaming pipeline.
///
/// Configuration errors are returned synchronously when a stream is opened.
/// Device errors raised on the worker thread are stored and handed to the
/// consumer once, from its own `demux_read` call.
#[derive(Debug, thiserror::Error)]
pub enum RadioError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("ring buffer overrun: {requested} bytes requested, {free} bytes free")]
    RingBufferOverrun { requested: usize, free: usize },

    #[error("malformed UECP packet: {0}")]
    Uecp(&'static str),

    #[error("worker thread error: {0}")]
    Thread(String),
}

impl RadioError {
    pub fn config(msg: impl Into<String>) -> Self {
        RadioError::Config(msg.into())
    }

    pub fn device(msg: impl Into<String>) -> Self {
        RadioError::Device(msg.into())
    }
}
