//! # Test Support
//!
//! A scripted Venus device on a loopback UDP socket. Each test spawns one
//! (or several) and points a real client at it, so the full request path
//! runs: encode, send, listener dispatch, correlation, retry, cache.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use venuslink::ClientConfig;

/// How the mock answers one method.
#[derive(Clone)]
pub enum Script {
    /// Answer every request with this result payload.
    Result(Value),
    /// Answer with a device error object.
    Error { code: i64, message: String },
    /// Never answer.
    Silent,
    /// Drop the first `drop` requests for the method, then answer.
    AnswerAfter { drop: u32, result: Value },
    /// Answer the first `answers` requests, then go silent.
    SilentAfter { answers: u32, result: Value },
}

/// One request the mock received, in arrival order.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub id: u64,
    pub method: String,
    pub params: Option<Value>,
    pub source: SocketAddr,
}

/// A fake device bound to an ephemeral loopback port.
///
/// Methods without a script are answered with an empty result, so polling
/// tests do not need to script all eight query methods.
pub struct MockVenus {
    addr: SocketAddr,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
    task: JoinHandle<()>,
}

impl MockVenus {
    pub async fn spawn(scripts: Vec<(&str, Script)>) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let scripts: HashMap<String, Script> = scripts
            .into_iter()
            .map(|(method, script)| (method.to_string(), script))
            .collect();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&seen);
        let task = tokio::spawn(async move {
            let mut counters: HashMap<String, u32> = HashMap::new();
            let mut buf = vec![0u8; 2048];
            loop {
                let Ok((len, source)) = socket.recv_from(&mut buf).await else {
                    break;
                };
                let Ok(request) = serde_json::from_slice::<Value>(&buf[..len]) else {
                    continue;
                };

                let id = request["id"].as_u64().unwrap_or(0);
                let method = request["method"].as_str().unwrap_or("").to_string();
                log.lock().unwrap().push(SeenRequest {
                    id,
                    method: method.clone(),
                    params: request.get("params").cloned(),
                    source,
                });

                let count = counters.entry(method.clone()).or_insert(0);
                *count += 1;
                let nth = *count;

                let reply = match scripts.get(&method) {
                    Some(Script::Result(result)) => Some(reply_ok(id, result.clone())),
                    Some(Script::Error { code, message }) => Some(json!({
                        "id": id,
                        "src": "Venus-C",
                        "error": { "code": code, "message": message },
                    })),
                    Some(Script::Silent) => None,
                    Some(Script::AnswerAfter { drop, result }) => {
                        (nth > *drop).then(|| reply_ok(id, result.clone()))
                    }
                    Some(Script::SilentAfter { answers, result }) => {
                        (nth <= *answers).then(|| reply_ok(id, result.clone()))
                    }
                    None => Some(reply_ok(id, json!({}))),
                };

                if let Some(reply) = reply {
                    let _ = socket.send_to(reply.to_string().as_bytes(), source).await;
                }
            }
        });

        Self { addr, seen, task }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Requests received so far for `method`.
    pub fn seen(&self, method: &str) -> Vec<SeenRequest> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.method == method)
            .cloned()
            .collect()
    }

    pub fn seen_all(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

impl Drop for MockVenus {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn reply_ok(id: u64, result: Value) -> Value {
    json!({ "id": id, "src": "Venus-C", "result": result })
}

/// Client config aimed at `mock`, with waits shrunk so tests finish fast.
pub fn fast_client(mock: &MockVenus, local_port: u16) -> ClientConfig {
    fast_client_at(mock.host(), mock.port(), local_port)
}

/// Same tuning for an explicit address, e.g. one taken from discovery.
pub fn fast_client_at(host: String, port: u16, local_port: u16) -> ClientConfig {
    let mut config = ClientConfig::new(host);
    config.port = port;
    config.local_port = local_port;
    config.retry.command_timeout_secs = 1;
    config.retry.backoff_base_ms = 50;
    config.retry.backoff_factor = 1.0;
    config.retry.backoff_max_ms = 100;
    config.retry.backoff_jitter_ms = 0;
    config.poll.tick_interval_ms = 100;
    config.poll.inter_call_delay_ms = 0;
    config.poll.first_cycle_timeout_secs = 1;
    config.poll.first_cycle_attempts = 1;
    config.poll.first_cycle_delay_ms = 0;
    config
}
