use crate::{ClientError, RemoteQueue, Result};
use cascor_protocol::{
    challenge_digest, AuthKey, AuthenticateRequest, HelloRequest, Message, MessageCodec,
    OpenQueueRequest, ProtocolError, QueueName,
};

use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, info};

pub(crate) type Connection = Arc<Mutex<Framed<TcpStream, MessageCodec>>>;

/// Authenticated session with a remote training manager.
///
/// One TCP connection is shared by the client and every queue it opens;
/// requests are serialized on it.
pub struct ManagerClient {
    address: String,
    conn: Connection,
}

impl ManagerClient {
    /// Connect and authenticate, giving up after `connect_timeout`.
    pub async fn connect(
        address: impl Into<String>,
        authkey: &AuthKey,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let address = address.into();

        let framed = timeout(connect_timeout, Self::establish(&address, authkey))
            .await
            .map_err(|_| ClientError::Timeout(connect_timeout))??;

        info!("Authenticated with manager at {}", address);

        Ok(ManagerClient {
            address,
            conn: Arc::new(Mutex::new(framed)),
        })
    }

    async fn establish(
        address: &str,
        authkey: &AuthKey,
    ) -> Result<Framed<TcpStream, MessageCodec>> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|e| ClientError::ConnectionError(e.to_string()))?;

        let mut framed = Framed::new(stream, MessageCodec);

        let hello = Message::Hello(HelloRequest {
            client: format!(
                "cascor-client/{} pid={}",
                env!("CARGO_PKG_VERSION"),
                std::process::id()
            ),
        });

        let nonce = match roundtrip(&mut framed, hello).await? {
            Message::Challenge(challenge) => challenge.nonce,
            Message::Nack(nack) => return Err(ClientError::AuthenticationFailed(nack.error)),
            other => return Err(unexpected(&other)),
        };

        let answer = Message::Authenticate(AuthenticateRequest {
            digest: challenge_digest(&nonce, authkey),
        });

        match roundtrip(&mut framed, answer).await? {
            Message::Welcome => Ok(framed),
            Message::Nack(nack) => Err(ClientError::AuthenticationFailed(nack.error)),
            other => Err(unexpected(&other)),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Look up one of the manager's shared queues.
    pub async fn open_queue(&self, name: QueueName) -> Result<RemoteQueue> {
        let request = Message::OpenQueue(OpenQueueRequest { name });

        match exchange(&self.conn, request).await? {
            Message::QueueOpened(opened) if opened.handle.name == name => {
                debug!("Opened {} queue on {}", name, self.address);
                Ok(RemoteQueue::new(opened.handle, self.conn.clone()))
            }
            Message::Nack(nack) => Err(ClientError::ServerError(nack.error)),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn get_task_queue(&self) -> Result<RemoteQueue> {
        self.open_queue(QueueName::Tasks).await
    }

    pub async fn get_result_queue(&self) -> Result<RemoteQueue> {
        self.open_queue(QueueName::Results).await
    }

    /// End the session. Best effort: the socket may already be gone.
    pub async fn close(&self) {
        let mut framed = self.conn.lock().await;

        if let Err(e) = framed.send(Message::Close).await {
            debug!("Failed to send close to {}: {}", self.address, e);
        }
        if let Err(e) = framed.get_mut().shutdown().await {
            debug!("Failed to shut down connection to {}: {}", self.address, e);
        }
    }
}

/// Send one request on a shared connection and wait for its response.
pub(crate) async fn exchange(conn: &Connection, message: Message) -> Result<Message> {
    let mut framed = conn.lock().await;
    roundtrip(&mut framed, message).await
}

async fn roundtrip(
    framed: &mut Framed<TcpStream, MessageCodec>,
    message: Message,
) -> Result<Message> {
    framed.send(message).await.map_err(from_protocol)?;

    match framed.next().await {
        Some(Ok(response)) => Ok(response),
        Some(Err(e)) => Err(from_protocol(e)),
        None => Err(ClientError::ConnectionError(
            "Connection closed by manager".to_string(),
        )),
    }
}

fn from_protocol(e: ProtocolError) -> ClientError {
    match e {
        ProtocolError::IoError(io) => ClientError::ConnectionError(io.to_string()),
        other => ClientError::ProtocolError(other.to_string()),
    }
}

pub(crate) fn unexpected(message: &Message) -> ClientError {
    ClientError::ProtocolError(format!(
        "Unexpected response: {:?}",
        message.message_type()
    ))
}
