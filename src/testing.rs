//! In-memory doubles for the completion and history ports.

use crate::error::{CompletionError, HistoryError};
use crate::llm::{ApiMessage, CompletionClient};
use crate::message::{AuthUser, ChatMessage};
use crate::store::HistoryStore;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Clone)]
pub enum MockReply {
    Text(String),
    Fail,
    /// Wait for the notify before answering
    Gated(Arc<Notify>, String),
}

pub struct MockClient {
    pub reply: MockReply,
    pub requests: Mutex<Vec<Vec<ApiMessage>>>,
}

impl MockClient {
    pub fn new(reply: MockReply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn text(text: &str) -> Arc<Self> {
        Self::new(MockReply::Text(text.to_string()))
    }
}

impl CompletionClient for MockClient {
    fn complete(
        &self,
        messages: &[ApiMessage],
    ) -> impl Future<Output = Result<String, CompletionError>> + Send {
        self.requests.lock().unwrap().push(messages.to_vec());
        let reply = self.reply.clone();
        async move {
            match reply {
                MockReply::Text(text) => Ok(text),
                MockReply::Fail => Err(CompletionError::Status {
                    status: 500,
                    body: "boom".into(),
                }),
                MockReply::Gated(gate, text) => {
                    gate.notified().await;
                    Ok(text)
                }
            }
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub saved: Mutex<Vec<ChatMessage>>,
    pub fail_saves: bool,
    pub fail_list: bool,
}

impl HistoryStore for MemoryStore {
    fn save(
        &self,
        message: &ChatMessage,
    ) -> impl Future<Output = Result<(), HistoryError>> + Send {
        let result = if self.fail_saves {
            Err(HistoryError::Status { status: 503, body: "down".into() })
        } else {
            self.saved.lock().unwrap().push(message.clone());
            Ok(())
        };
        std::future::ready(result)
    }

    fn list_by_user(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<ChatMessage>, HistoryError>> + Send {
        let result = if self.fail_list {
            Err(HistoryError::Status { status: 503, body: "down".into() })
        } else {
            let mut rows: Vec<ChatMessage> = self
                .saved
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.user_id.as_deref() == Some(user_id))
                .cloned()
                .collect();
            rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            Ok(rows)
        };
        std::future::ready(result)
    }

    fn delete(&self, message_id: &str) -> impl Future<Output = Result<(), HistoryError>> + Send {
        self.saved
            .lock()
            .unwrap()
            .retain(|m| m.id.as_deref() != Some(message_id));
        std::future::ready(Ok(()))
    }
}

pub fn user(uid: &str) -> AuthUser {
    AuthUser {
        uid: uid.into(),
        email: format!("{uid}@example.com"),
        display_name: None,
        photo_url: None,
        id_token: "t".into(),
        refresh_token: "r".into(),
        expires_at: None,
    }
}

/// Answer a single HTTP request on a loopback port with `status` and a JSON
/// `body`. Returns the base URL.
pub async fn serve_once(status: u16, body: &'static str) -> String {
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {} Test\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
    });
    format!("http://{}", addr)
}

/// Consume the request head and body so closing the socket doesn't reset it
async fn read_request(socket: &mut tokio::net::TcpStream) {
    use tokio::io::AsyncReadExt;

    let mut request = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            return;
        }
        request.extend_from_slice(&chunk[..n]);

        let Some(head_end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&request[..head_end]).to_lowercase();
        let length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if request.len() >= head_end + 4 + length {
            return;
        }
    }
}
