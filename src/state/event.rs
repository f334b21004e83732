//! Typed events produced by the dispatcher.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use snafu::prelude::*;

use crate::gateway::SessionError;

/// Error when turn an EVENT envelope into a typed event, the connection is
/// not affected by it.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum DispatchError {
    /// envelope data is not a `["name", args...]` array
    #[snafu(display("event envelope is not an array led by event name: {data:?}"))]
    InvalidEnvelope {
        /// received data
        data: Option<Value>,
    },

    /// event needs an argument but got none
    #[snafu(display("event {event} has no argument"))]
    MissingArgument {
        /// event name
        event: String,
    },

    /// event argument doesn't match the event schema
    #[snafu(display("event {event} has invalid argument: {source}"))]
    InvalidSchema {
        /// event name
        event: String,
        /// source error
        #[snafu(source(from(serde_json::Error, Arc::new)))]
        source: Arc<serde_json::Error>,
    },
}

/// Chat sender profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// sender nickname
    pub nickname: String,
    /// badges, schema not documented
    #[serde(default)]
    pub badges: Vec<Value>,
    /// verified mark
    #[serde(default)]
    pub verified_mark: bool,
}

/// A chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// channel id of sender
    pub sender_channel_id: String,
    /// sender profile
    pub profile: Profile,
    /// message content
    pub content: String,
    /// channel the message is sent to
    pub channel_id: String,
    /// unix timestamp in milliseconds
    pub message_time: i64,
}

impl ChatMessage {
    /// When the message was sent
    pub fn created_at(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.message_time.max(0) as u64)
    }
}

/// Kind of donation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DonationType {
    /// chat donation
    Chat,
    /// video donation
    Video,
}

fn number_or_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Amount {
        Number(u64),
        Text(String),
    }

    match Amount::deserialize(deserializer)? {
        Amount::Number(n) => Ok(n),
        Amount::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// A donation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    /// kind of donation
    pub donation_type: DonationType,
    /// channel receiving the donation
    pub channel_id: String,
    /// channel id of donator
    pub donator_channel_id: String,
    /// donator nickname
    pub donator_nickname: String,
    /// amount, sent as number or numeric string
    #[serde(deserialize_with = "number_or_string")]
    pub pay_amount: u64,
    /// donation message
    #[serde(default)]
    pub donation_text: String,
}

/// Subscription change notified by `system` events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    /// subscribed event type, like `CHAT`
    pub event_type: String,
    /// channel of the subscription
    pub channel_id: String,
}

/// Body of a `system` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum SystemMessage {
    /// session is ready
    Connected {
        /// key used to subscribe events for this session
        #[serde(rename = "sessionKey")]
        session_key: String,
    },
    /// an event subscription is added
    Subscribed(Permission),
    /// an event subscription is removed
    Unsubscribed(Permission),
    /// an event subscription is revoked by server
    Revoked(Permission),
}

/// An event the dispatcher doesn't know, only dispatched in debug mode
#[derive(Debug, Clone, PartialEq)]
pub struct SocketEvent {
    /// lower cased event name
    pub name: String,
    /// event arguments
    pub args: Vec<Value>,
}

/// Events dispatched to subscribers and waiters
#[derive(Debug, Clone, EnumAsInner)]
pub enum Event {
    /// server reported the session ready, carries the session key
    Connect(String),
    /// chat message
    Chat(ChatMessage),
    /// donation
    Donation(Donation),
    /// event subscription added
    Subscribed(Permission),
    /// event subscription removed
    Unsubscribed(Permission),
    /// event subscription revoked by server
    Revoked(Permission),
    /// engine session opened with this sid, debug mode only
    EngineConnect(String),
    /// namespace connected, debug mode only
    SocketConnect(Option<String>),
    /// namespace disconnected, debug mode only
    SocketDisconnect,
    /// any received event, debug mode only
    SocketEvent(SocketEvent),
    /// session ended, `None` when the disconnect is requested by caller
    Disconnected(Option<SessionError>),
    /// an event can't be decoded
    Error(DispatchError),
}

impl Event {
    /// name used to register subscribers and waiters for this event
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::Chat(_) => "chat",
            Self::Donation(_) => "donation",
            Self::Subscribed(_) => "subscribed",
            Self::Unsubscribed(_) => "unsubscribed",
            Self::Revoked(_) => "revoked",
            Self::EngineConnect(_) => "engine_connect",
            Self::SocketConnect(_) => "socket_connect",
            Self::SocketDisconnect => "socket_disconnect",
            Self::SocketEvent(_) => "socket_event",
            Self::Disconnected(_) => "disconnect",
            Self::Error(_) => "error",
        }
    }

    /// channel this event belongs to, if any
    pub fn channel_id(&self) -> Option<&str> {
        match self {
            Self::Chat(c) => Some(&c.channel_id),
            Self::Donation(d) => Some(&d.channel_id),
            Self::Subscribed(p) | Self::Unsubscribed(p) | Self::Revoked(p) => Some(&p.channel_id),
            _ => None,
        }
    }
}

impl From<SystemMessage> for Event {
    fn from(msg: SystemMessage) -> Self {
        match msg {
            SystemMessage::Connected { session_key } => Self::Connect(session_key),
            SystemMessage::Subscribed(p) => Self::Subscribed(p),
            SystemMessage::Unsubscribed(p) => Self::Unsubscribed(p),
            SystemMessage::Revoked(p) => Self::Revoked(p),
        }
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_donation_amount_number_or_string() {
        let mut body = json!({
            "donationType": "CHAT",
            "channelId": "c",
            "donatorChannelId": "d",
            "donatorNickname": "nick",
            "payAmount": "1000",
            "donationText": "hi",
        });

        let donation: Donation = serde_json::from_value(body.clone()).unwrap();
        assert_eq!(donation.pay_amount, 1000);
        assert_eq!(donation.donation_type, DonationType::Chat);

        body["payAmount"] = json!(2000);
        body["donationType"] = json!("VIDEO");
        let donation: Donation = serde_json::from_value(body.clone()).unwrap();
        assert_eq!(donation.pay_amount, 2000);
        assert_eq!(donation.donation_type, DonationType::Video);

        body["payAmount"] = json!("a lot");
        assert!(serde_json::from_value::<Donation>(body).is_err());
    }

    #[test]
    fn test_system_message() {
        let msg: SystemMessage =
            serde_json::from_str(r#"{"type":"connected","data":{"sessionKey":"key"}}"#).unwrap();
        assert_eq!(
            msg,
            SystemMessage::Connected {
                session_key: "key".to_string()
            }
        );

        let msg: SystemMessage = serde_json::from_str(
            r#"{"type":"revoked","data":{"eventType":"CHAT","channelId":"c"}}"#,
        )
        .unwrap();
        let event = Event::from(msg);
        assert_eq!(event.name(), "revoked");
        assert_eq!(event.channel_id(), Some("c"));
    }

    #[test]
    fn test_chat_created_at() {
        let chat: ChatMessage = serde_json::from_value(json!({
            "senderChannelId": "s",
            "profile": {"nickname": "nick", "badges": [], "verifiedMark": false},
            "content": "hello",
            "channelId": "c",
            "messageTime": 1_700_000_000_000_i64,
        }))
        .unwrap();

        assert_eq!(
            chat.created_at(),
            UNIX_EPOCH + Duration::from_secs(1_700_000_000)
        );
    }
}
