use crate::{QueueHandle, QueueName};
use serde::{Deserialize, Serialize};

/// Message types for the manager protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Hello = 1,
    Challenge = 2,
    Authenticate = 3,
    Welcome = 4,
    OpenQueue = 5,
    QueueOpened = 6,
    Put = 7,
    Ack = 8,
    Nack = 9,
    Close = 10,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(MessageType::Hello),
            2 => Some(MessageType::Challenge),
            3 => Some(MessageType::Authenticate),
            4 => Some(MessageType::Welcome),
            5 => Some(MessageType::OpenQueue),
            6 => Some(MessageType::QueueOpened),
            7 => Some(MessageType::Put),
            8 => Some(MessageType::Ack),
            9 => Some(MessageType::Nack),
            10 => Some(MessageType::Close),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Protocol messages exchanged with the training manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Client opens a session
    Hello(HelloRequest),

    /// Manager issues an authentication challenge
    Challenge(ChallengeResponse),

    /// Client answers the challenge
    Authenticate(AuthenticateRequest),

    /// Manager accepted the client
    Welcome,

    /// Client asks for a shared queue
    OpenQueue(OpenQueueRequest),

    /// Manager confirms the queue and returns its handle
    QueueOpened(QueueOpenedResponse),

    /// Client enqueues an item (`None` is the stop sentinel)
    Put(PutRequest),

    /// Positive acknowledgment
    Ack,

    /// Negative acknowledgment
    Nack(NackResponse),

    /// Client ends the session
    Close,
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Hello(_) => MessageType::Hello,
            Message::Challenge(_) => MessageType::Challenge,
            Message::Authenticate(_) => MessageType::Authenticate,
            Message::Welcome => MessageType::Welcome,
            Message::OpenQueue(_) => MessageType::OpenQueue,
            Message::QueueOpened(_) => MessageType::QueueOpened,
            Message::Put(_) => MessageType::Put,
            Message::Ack => MessageType::Ack,
            Message::Nack(_) => MessageType::Nack,
            Message::Close => MessageType::Close,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloRequest {
    /// Free-form client identification, logged by the manager
    pub client: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub nonce: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticateRequest {
    pub digest: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenQueueRequest {
    pub name: QueueName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueOpenedResponse {
    pub handle: QueueHandle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutRequest {
    pub queue: QueueName,
    pub item: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NackResponse {
    pub error: String,
}
