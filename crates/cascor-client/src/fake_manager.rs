//! Minimal in-process manager used by the client tests.

use cascor_protocol::{
    challenge_digest, AuthKey, ChallengeResponse, Message, MessageCodec, NackResponse, PutRequest,
    QueueHandle, QueueOpenedResponse, NONCE_LEN,
};
use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

pub(crate) struct FakeManager {
    pub address: String,
    puts: Arc<Mutex<Vec<PutRequest>>>,
}

impl FakeManager {
    pub async fn spawn(key: AuthKey) -> Self {
        Self::start(key, false).await
    }

    pub async fn spawn_rejecting_puts(key: AuthKey) -> Self {
        Self::start(key, true).await
    }

    async fn start(key: AuthKey, reject_puts: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let puts = Arc::new(Mutex::new(Vec::new()));

        let served_address = address.clone();
        let served_puts = puts.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(
                    stream,
                    key.clone(),
                    served_address.clone(),
                    served_puts.clone(),
                    reject_puts,
                ));
            }
        });

        FakeManager { address, puts }
    }

    pub fn puts(&self) -> Vec<PutRequest> {
        self.puts.lock().unwrap().clone()
    }
}

async fn serve(
    stream: TcpStream,
    key: AuthKey,
    address: String,
    puts: Arc<Mutex<Vec<PutRequest>>>,
    reject_puts: bool,
) {
    let mut framed = Framed::new(stream, MessageCodec);

    match framed.next().await {
        Some(Ok(Message::Hello(_))) => {}
        _ => return,
    }

    let nonce: Vec<u8> = (0..NONCE_LEN).map(|_| rand::random::<u8>()).collect();
    let challenge = Message::Challenge(ChallengeResponse {
        nonce: nonce.clone(),
    });
    if framed.send(challenge).await.is_err() {
        return;
    }

    match framed.next().await {
        Some(Ok(Message::Authenticate(req))) if req.digest == challenge_digest(&nonce, &key) => {
            if framed.send(Message::Welcome).await.is_err() {
                return;
            }
        }
        _ => {
            let _ = framed
                .send(Message::Nack(NackResponse {
                    error: "digest mismatch".to_string(),
                }))
                .await;
            return;
        }
    }

    while let Some(Ok(message)) = framed.next().await {
        let reply = match message {
            Message::OpenQueue(req) => Message::QueueOpened(QueueOpenedResponse {
                handle: QueueHandle::new(address.clone(), req.name),
            }),
            Message::Put(_) if reject_puts => Message::Nack(NackResponse {
                error: "queue full".to_string(),
            }),
            Message::Put(req) => {
                puts.lock().unwrap().push(req);
                Message::Ack
            }
            Message::Close => break,
            _ => Message::Nack(NackResponse {
                error: "unsupported".to_string(),
            }),
        };

        if framed.send(reply).await.is_err() {
            break;
        }
    }
}
