use crate::manager_client::{exchange, unexpected, Connection};
use crate::{ClientError, Result};
use cascor_protocol::{Message, PutRequest, QueueHandle};

/// Proxy for a queue that lives on the manager.
#[derive(Clone)]
pub struct RemoteQueue {
    handle: QueueHandle,
    conn: Connection,
}

impl RemoteQueue {
    pub(crate) fn new(handle: QueueHandle, conn: Connection) -> Self {
        RemoteQueue { handle, conn }
    }

    pub fn handle(&self) -> &QueueHandle {
        &self.handle
    }

    /// Enqueue an item. `None` is the stop sentinel for worker loops.
    pub async fn put(&self, item: Option<Vec<u8>>) -> Result<()> {
        let request = Message::Put(PutRequest {
            queue: self.handle.name,
            item,
        });

        match exchange(&self.conn, request).await? {
            Message::Ack => Ok(()),
            Message::Nack(nack) => Err(ClientError::ServerError(nack.error)),
            other => Err(unexpected(&other)),
        }
    }
}
