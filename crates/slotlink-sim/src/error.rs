use std::io;

use thiserror::Error;

/// Errors raised by the emulator server.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
