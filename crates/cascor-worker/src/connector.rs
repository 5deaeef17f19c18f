//! Manager access over the CasCor TCP protocol.

use crate::runtime::{Manager, ManagerConnector, SharedQueue};
use async_trait::async_trait;
use cascor_client::{ManagerClient, RemoteQueue};
use cascor_protocol::{AuthKey, QueueHandle};
use std::sync::Arc;
use std::time::Duration;

pub struct TcpConnector;

#[async_trait]
impl ManagerConnector for TcpConnector {
    async fn connect(
        &self,
        address: &str,
        authkey: &AuthKey,
        timeout: Duration,
    ) -> anyhow::Result<Box<dyn Manager>> {
        let client = ManagerClient::connect(address, authkey, timeout).await?;
        Ok(Box::new(client))
    }
}

#[async_trait]
impl Manager for ManagerClient {
    async fn get_task_queue(&self) -> anyhow::Result<Arc<dyn SharedQueue>> {
        let queue = ManagerClient::get_task_queue(self).await?;
        Ok(Arc::new(queue))
    }

    async fn get_result_queue(&self) -> anyhow::Result<Arc<dyn SharedQueue>> {
        let queue = ManagerClient::get_result_queue(self).await?;
        Ok(Arc::new(queue))
    }

    async fn close(&self) {
        ManagerClient::close(self).await
    }
}

#[async_trait]
impl SharedQueue for RemoteQueue {
    fn handle(&self) -> &QueueHandle {
        RemoteQueue::handle(self)
    }

    async fn put(&self, item: Option<Vec<u8>>) -> anyhow::Result<()> {
        RemoteQueue::put(self, item).await?;
        Ok(())
    }
}
