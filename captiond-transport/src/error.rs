use thiserror::Error;

use crate::channel::ChannelState;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Failed to connect to recognizer: {0}")]
    Connect(String),

    #[error("Channel is not open (state: {0})")]
    NotOpen(ChannelState),

    #[error("Transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
