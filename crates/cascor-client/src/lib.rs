mod manager_client;
mod remote_queue;

pub use manager_client::ManagerClient;
pub use remote_queue::RemoteQueue;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Authentication rejected: {0}")]
    AuthenticationFailed(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
pub(crate) mod fake_manager;
