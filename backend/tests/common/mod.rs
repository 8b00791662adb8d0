// Fake Mumble responder and wait helpers shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use mumble_ping_server::settings::Settings;
use ping_core::codec::{encode_probe_response, PROBE_REQUEST};
use ping_core::model::{ProbeResponse, Version};
use ping_core::status::StatusValue;

#[derive(Clone, Debug)]
pub enum Reply {
    Respond(ProbeResponse),
    Delayed(Duration, ProbeResponse),
    Raw(Vec<u8>),
}

pub struct FakeMumble {
    pub port: u16,
    requests: Arc<AtomicUsize>,
    script: Arc<Mutex<VecDeque<Reply>>>,
    fallback: Arc<Mutex<Reply>>,
    task: JoinHandle<()>,
}

impl FakeMumble {
    pub async fn start(fallback: Reply) -> Self {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let port = socket.local_addr().unwrap().port();
        let requests = Arc::new(AtomicUsize::new(0));
        let script = Arc::new(Mutex::new(VecDeque::new()));
        let fallback = Arc::new(Mutex::new(fallback));

        let task = tokio::spawn({
            let requests = requests.clone();
            let script = script.clone();
            let fallback = fallback.clone();
            async move {
                let mut buf = [0u8; 64];
                loop {
                    let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                        break;
                    };
                    if buf[..len] != PROBE_REQUEST {
                        continue;
                    }
                    requests.fetch_add(1, Ordering::SeqCst);
                    let next = script.lock().await.pop_front();
                    let reply = match next {
                        Some(reply) => reply,
                        None => fallback.lock().await.clone(),
                    };
                    let socket = socket.clone();
                    tokio::spawn(async move {
                        let bytes = match reply {
                            Reply::Respond(response) => encode_probe_response(&response).to_vec(),
                            Reply::Delayed(delay, response) => {
                                time::sleep(delay).await;
                                encode_probe_response(&response).to_vec()
                            }
                            Reply::Raw(bytes) => bytes,
                        };
                        let _ = socket.send_to(&bytes, from).await;
                    });
                }
            }
        });

        Self {
            port,
            requests,
            script,
            fallback,
            task,
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub async fn push(&self, reply: Reply) {
        self.script.lock().await.push_back(reply);
    }

    pub async fn set_fallback(&self, reply: Reply) {
        *self.fallback.lock().await = reply;
    }

    pub fn settings(&self, refresh_interval_secs: u64) -> Settings {
        Settings {
            host: "127.0.0.1".to_string(),
            port: self.port,
            refresh_interval_secs,
            enabled: true,
            debug: false,
        }
    }

    pub async fn wait_for_requests(&self, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.requests() < count {
            assert!(
                Instant::now() < deadline,
                "expected {count} requests, saw {}",
                self.requests()
            );
            time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for FakeMumble {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn response(users: u32, max_users: u32) -> ProbeResponse {
    ProbeResponse {
        version: Version::new(1, 4, 0),
        users,
        max_users,
        bandwidth: 72_000,
    }
}

pub fn users_of(status: &StatusValue) -> Option<u32> {
    match status {
        StatusValue::Neutral {
            last_result: Some(result),
        } => Some(result.users),
        _ => None,
    }
}

pub async fn wait_for_status(
    rx: &mut watch::Receiver<StatusValue>,
    mut predicate: impl FnMut(&StatusValue) -> bool,
) -> StatusValue {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        {
            let current = rx.borrow_and_update();
            if predicate(&*current) {
                return current.clone();
            }
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        match time::timeout(remaining, rx.changed()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => panic!("status channel closed"),
            Err(_) => panic!("timed out waiting for status, last {:?}", *rx.borrow()),
        }
    }
}
