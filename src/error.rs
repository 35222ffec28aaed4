//! Crate error type

use thiserror::Error;

use crate::capture::CaptureError;
use crate::config::ConfigError;
use crate::encode::EncodeError;
use crate::frame::FrameError;

/// Errors surfaced by the pipeline and the stream server
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The client sent a request the server cannot serve
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The client did not complete its request in time
    #[error("request timed out")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, Error>;
