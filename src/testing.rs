//! In process fake engine server for negotiation and connection tests.

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::{
    net::TcpListener,
    sync::{mpsc, watch, Mutex},
};

use crate::gateway::{
    packet::{Packet, PacketType, Payload},
    PacketHandler, SessionError,
};

pub(crate) const HANDSHAKE: &str =
    r#"0{"sid":"fake-sid","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":5000}"#;

/// Handler keeping everything it receives
#[derive(Debug, Default)]
pub(crate) struct Recorder {
    packets: std::sync::Mutex<Vec<Packet>>,
    ends: std::sync::Mutex<Vec<Option<SessionError>>>,
}

impl Recorder {
    pub fn packets(&self) -> Vec<Packet> {
        self.packets.lock().unwrap().clone()
    }

    pub fn ends(&self) -> Vec<Option<SessionError>> {
        self.ends.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl PacketHandler for Recorder {
    async fn on_packet(&self, packet: Packet) {
        self.packets.lock().unwrap().push(packet);
    }

    async fn on_session_end(&self, reason: Option<SessionError>) {
        self.ends.lock().unwrap().push(reason);
    }
}

/// Handshake body with custom heartbeat timing and no upgrade
pub(crate) fn handshake_polling_only(ping_interval: u64, ping_timeout: u64) -> String {
    format!(
        r#"0{{"sid":"fake-sid","upgrades":[],"pingInterval":{},"pingTimeout":{}}}"#,
        ping_interval, ping_timeout
    )
}

/// What the fake server saw
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Recorded {
    Http {
        method: String,
        query: HashMap<String, String>,
        body: String,
    },
    Socket(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Behavior {
    pub handshake_status: u16,
    pub handshake_body: String,
    /// reply to `2probe`, `None` closes the socket instead
    pub probe_reply: Option<String>,
    /// answer client PING with PONG
    pub answer_pings: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            handshake_status: 200,
            handshake_body: HANDSHAKE.to_string(),
            probe_reply: Some("3probe".to_string()),
            answer_pings: true,
        }
    }
}


#[derive(Debug)]
pub(crate) struct FakeServer {
    pub addr: SocketAddr,
    pub recorded: mpsc::UnboundedReceiver<Recorded>,
    polls: mpsc::UnboundedSender<String>,
    sockets_closed: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

#[derive(Debug)]
struct Shared {
    behavior: Behavior,
    recorded: mpsc::UnboundedSender<Recorded>,
    polls_tx: mpsc::UnboundedSender<String>,
    polls_rx: Mutex<mpsc::UnboundedReceiver<String>>,
    sockets_closed: watch::Receiver<bool>,
}

impl FakeServer {
    pub async fn start(behavior: Behavior) -> Self {
        let _ = pretty_env_logger::try_init();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (recorded_tx, recorded) = mpsc::unbounded_channel();
        let (polls, polls_rx) = mpsc::unbounded_channel();
        let (sockets_closed, sockets_closed_rx) = watch::channel(false);

        let shared = Arc::new(Shared {
            behavior,
            recorded: recorded_tx,
            polls_tx: polls.clone(),
            polls_rx: Mutex::new(polls_rx),
            sockets_closed: sockets_closed_rx,
        });

        let app = Router::new()
            .route("/socket.io/", get(poll_or_upgrade).post(post_payload))
            .with_state(shared);

        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            recorded,
            polls,
            sockets_closed,
            task,
        }
    }

    /// session url pointing at this server
    pub fn url(&self) -> String {
        format!("http://{}/?auth=token", self.addr)
    }

    /// Queue a body answered to the next polling GET
    pub fn push_poll(&self, body: &str) {
        self.polls.send(body.to_string()).unwrap();
    }

    /// Close every open websocket from the server side
    pub fn close_sockets(&self) {
        self.sockets_closed.send_replace(true);
    }

    /// Next recorded request or frame, skipping heartbeat traffic
    pub async fn next(&mut self) -> Recorded {
        loop {
            let recorded = tokio::time::timeout(Duration::from_secs(5), self.recorded.recv())
                .await
                .expect("fake server recorded nothing in time")
                .expect("fake server stopped");
            match recorded {
                Recorded::Socket(ref s) if s == "2" => continue,
                Recorded::Http { ref body, .. } if body == "2" => continue,
                _ => return recorded,
            }
        }
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.sockets_closed.send_replace(true);
        self.task.abort();
    }
}

/// Handshake without `sid`, long poll with it, or the websocket upgrade
async fn poll_or_upgrade(
    State(shared): State<Arc<Shared>>,
    Query(query): Query<HashMap<String, String>>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    if let Some(ws) = ws {
        return ws.on_upgrade(move |socket| serve_socket(shared, socket));
    }

    let _ = shared.recorded.send(Recorded::Http {
        method: "GET".to_string(),
        query: query.clone(),
        body: String::new(),
    });

    if !query.contains_key("sid") {
        let status = StatusCode::from_u16(shared.behavior.handshake_status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, shared.behavior.handshake_body.clone()).into_response();
    }

    let next = shared.polls_rx.lock().await.recv().await;
    next.unwrap_or_else(|| "6".to_string()).into_response()
}

async fn post_payload(
    State(shared): State<Arc<Shared>>,
    Query(query): Query<HashMap<String, String>>,
    body: String,
) -> &'static str {
    let _ = shared.recorded.send(Recorded::Http {
        method: "POST".to_string(),
        query,
        body: body.clone(),
    });

    if shared.behavior.answer_pings {
        if let Ok(payload) = Payload::decode(&body) {
            for packet in payload.packets() {
                if packet.packet_type() == PacketType::Ping {
                    let _ = shared.polls_tx.send("3".to_string());
                }
            }
        }
    }

    "ok"
}

async fn wait_closed(mut closed: watch::Receiver<bool>) {
    while !*closed.borrow_and_update() {
        if closed.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn serve_socket(shared: Arc<Shared>, mut socket: WebSocket) {
    let closed = wait_closed(shared.sockets_closed.clone());
    tokio::pin!(closed);

    loop {
        let text = tokio::select! {
            biased;

            _ = &mut closed => break,

            frame = socket.recv() => match frame {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => continue,
            },
        };

        let _ = shared.recorded.send(Recorded::Socket(text.clone()));

        let reply = match text.as_str() {
            "2probe" => match shared.behavior.probe_reply {
                Some(ref reply) => reply.clone(),
                None => break,
            },
            "2" if shared.behavior.answer_pings => "3".to_string(),
            _ => continue,
        };

        if socket.send(Message::Text(reply)).await.is_err() {
            return;
        }
    }

    let _ = socket.send(Message::Close(None)).await;
}
