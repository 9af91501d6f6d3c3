use thiserror::Error;

use crate::config::ConfigError;
use crate::generation::GenerationError;
use crate::media::MediaError;
use crate::session::SessionError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),
    #[error("Media error: {0}")]
    Media(#[from] MediaError),
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
