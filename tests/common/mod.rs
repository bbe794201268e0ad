//! Local HTTP stand-in for Gemini and the Neo4j Query API. Each connection
//! gets the next canned reply; the last reply repeats once the list runs out.

#![allow(dead_code)]

use cinegraph::config::{ModelProfile, Neo4jCredentials};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub struct Recorded {
    /// Request line and headers, lowercased.
    pub head: String,
    pub body: String,
}

pub struct StubServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl StubServer {
    pub async fn start(replies: Vec<(u16, String)>) -> Self {
        assert!(!replies.is_empty());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        tokio::spawn(async move {
            let mut served = 0usize;
            while let Ok((mut socket, _)) = listener.accept().await {
                let request = read_request(&mut socket).await;
                seen.lock().unwrap().push(request);

                let (status, payload) = &replies[served.min(replies.len() - 1)];
                served += 1;
                let reply = format!(
                    "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{payload}",
                    payload.len()
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_request(socket: &mut TcpStream) -> Recorded {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
        let len = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let body_start = end + 4;
        if buf.len() >= body_start + len {
            let body = String::from_utf8_lossy(&buf[body_start..body_start + len]).into_owned();
            return Recorded { head, body };
        }
    }
    Recorded {
        head: String::from_utf8_lossy(&buf).to_lowercase(),
        body: String::new(),
    }
}

/// A `generateContent` reply whose single candidate says `text`.
pub fn gemini_reply(text: &str) -> (u16, String) {
    let body = json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 5, "totalTokenCount": 15}
    });
    (200, body.to_string())
}

/// A Query API success body with the given columns and rows.
pub fn neo4j_rows(fields: &[&str], values: serde_json::Value) -> (u16, String) {
    (202, json!({"data": {"fields": fields, "values": values}}).to_string())
}

pub fn test_profile() -> ModelProfile {
    ModelProfile {
        model: "gemini-test".into(),
        temperature: 0.0,
        max_output_tokens: None,
        max_retries: 0,
        timeout: Some(Duration::from_secs(5)),
    }
}

pub fn test_credentials(uri: &str) -> Neo4jCredentials {
    Neo4jCredentials {
        uri: uri.to_string(),
        username: "neo4j".into(),
        password: "secret".into(),
        database: "neo4j".into(),
    }
}
