use std::time::Duration;

use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use snafu::{prelude::*, IntoError};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message as Frame;
use url::Url;

use super::{
    error::{session_error, transport_error},
    SessionError, TransportError,
};
use crate::{
    gateway::{
        packet::{EncodedPacket, Packet, Payload},
        TransportKind, WebsocketClient,
    },
    http::{self, url::with_timestamp},
};

/// Convert a packet to a websocket frame
pub(crate) fn frame(packet: &Packet) -> Frame {
    match packet.encode(false) {
        EncodedPacket::Text(s) => Frame::Text(s),
        EncodedPacket::Binary(b) => Frame::Binary(b.to_vec()),
    }
}

fn lost(source: TransportError) -> SessionError {
    session_error::ConnectionLost {}.into_error(source)
}

#[derive(Debug)]
pub(crate) struct Polling {
    http: http::Client,
    url: Url,
    read_lock: Mutex<()>,
    write_lock: Mutex<()>,
}

#[derive(Debug)]
pub(crate) struct Socket {
    sink: Mutex<SplitSink<WebsocketClient, Frame>>,
    stream: Mutex<SplitStream<WebsocketClient>>,
}

/// The active transport of a gateway, reads and writes are each serialized
#[derive(Debug)]
pub(crate) enum Transport {
    Polling(Polling),
    Socket(Socket),
}

impl Transport {
    pub fn polling(http: http::Client, url: Url) -> Self {
        Self::Polling(Polling {
            http,
            url,
            read_lock: Mutex::new(()),
            write_lock: Mutex::new(()),
        })
    }

    pub fn socket(ws: WebsocketClient) -> Self {
        let (sink, stream) = ws.split();
        Self::Socket(Socket {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Polling(_) => TransportKind::Polling,
            Self::Socket(_) => TransportKind::Socket,
        }
    }

    pub async fn write(&self, payload: Payload) -> Result<(), SessionError> {
        match self {
            Self::Polling(p) => {
                let _guard = p.write_lock.lock().await;
                let body = payload.encode(None);

                log::trace!("Post payload: {:?}", body);

                match p.http.post(&with_timestamp(&p.url), body).await {
                    Ok(_) => Ok(()),
                    Err(err) => match err.status() {
                        Some(status) => session_error::HttpStatus { status }.fail(),
                        None => Err(lost(transport_error::Http {}.into_error(err))),
                    },
                }
            }
            Self::Socket(s) => {
                let mut sink = s.sink.lock().await;
                for packet in payload.packets() {
                    log::trace!("Send {} packet", packet.packet_type().name());
                    sink.feed(frame(packet))
                        .await
                        .context(transport_error::Websocket)
                        .context(session_error::ConnectionLost)?;
                }
                sink.flush()
                    .await
                    .context(transport_error::Websocket)
                    .context(session_error::ConnectionLost)
            }
        }
    }

    /// Read one unit of data, a payload that can't be decoded is logged and dropped.
    pub async fn read(&self, deadline: Duration) -> Result<Payload, SessionError> {
        match self {
            Self::Polling(p) => {
                let _guard = p.read_lock.lock().await;

                let body = match p.http.get(&with_timestamp(&p.url), Some(deadline)).await {
                    Ok(body) => body,
                    Err(err) if err.is_timeout() => {
                        return Err(lost(transport_error::ReadTimeout { deadline }.build()))
                    }
                    Err(err) => return Err(lost(transport_error::Http {}.into_error(err))),
                };

                Ok(match Payload::decode(&body) {
                    Ok(payload) => payload,
                    Err(err) => {
                        log::warn!("Drop malformed payload {:?}: {}", body, err);
                        Payload::default()
                    }
                })
            }
            Self::Socket(s) => {
                let mut stream = s.stream.lock().await;

                let frame = match tokio::time::timeout(deadline, stream.next()).await {
                    Err(_) => return Err(lost(transport_error::ReadTimeout { deadline }.build())),
                    Ok(None) => return Err(lost(transport_error::Closed.build())),
                    Ok(Some(result)) => result
                        .context(transport_error::Websocket)
                        .context(session_error::ConnectionLost)?,
                };

                Ok(match frame {
                    Frame::Text(text) => match Packet::decode(&text) {
                        Ok(packet) => packet.into(),
                        Err(err) => {
                            log::warn!("Drop malformed packet {:?}: {}", text, err);
                            Payload::default()
                        }
                    },
                    Frame::Binary(data) => Packet::decode_binary(data.into()).into(),
                    Frame::Close(close) => {
                        log::debug!("Websocket close frame received: {:?}", close);
                        return Err(lost(transport_error::Closed.build()));
                    }
                    // websocket level ping/pong, answered by tungstenite itself
                    _ => Payload::default(),
                })
            }
        }
    }

    /// Release the transport, errors are ignored
    pub async fn close(&self) {
        if let Self::Socket(s) = self {
            if let Err(err) = s.sink.lock().await.close().await {
                log::debug!("Close websocket failed: {}", err);
            }
        }
    }
}
