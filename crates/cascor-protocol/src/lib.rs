mod auth;
mod codec;
mod message;
mod queue;

pub use auth::{challenge_digest, AuthKey, NONCE_LEN};
pub use codec::MessageCodec;
pub use message::{
    AuthenticateRequest, ChallengeResponse, HelloRequest, Message, MessageType, NackResponse,
    OpenQueueRequest, PutRequest, QueueOpenedResponse,
};
pub use queue::{QueueHandle, QueueName};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid message type: {0}")]
    InvalidMessageType(u8),

    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] bincode::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Maximum frame size. Task payloads are serialized candidate batches, so
/// allow a generous ceiling.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;
