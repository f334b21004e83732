//! Static table of known event parsers.

use serde::de::DeserializeOwned;
use serde_json::Value;
use snafu::prelude::*;

use super::event::{error, ChatMessage, DispatchError, Donation, Event, SystemMessage};
use crate::gateway::packet::PacketData;

type Parser = fn(&str, Vec<Value>) -> Result<Event, DispatchError>;

static PARSERS: &[(&str, Parser)] = &[
    ("system", parse_system),
    ("chat", parse_chat),
    ("donation", parse_donation),
];

/// parser registered for a lower cased event name
pub(crate) fn find(name: &str) -> Option<Parser> {
    PARSERS
        .iter()
        .find(|(registered, _)| *registered == name)
        .map(|(_, parser)| *parser)
}

/// Split EVENT envelope data into lower cased name and arguments
pub(crate) fn split_envelope(
    data: Option<PacketData>,
) -> Result<(String, Vec<Value>), DispatchError> {
    let data = match data {
        Some(PacketData::Json(v)) => Some(v),
        Some(PacketData::Text(s)) => Some(Value::String(s)),
        _ => None,
    };

    match data {
        Some(Value::Array(mut items)) if matches!(items.first(), Some(Value::String(_))) => {
            let args = items.split_off(1);
            let name = items
                .pop()
                .and_then(|v| v.as_str().map(str::to_lowercase))
                .unwrap_or_default();
            Ok((name, args))
        }
        data => error::InvalidEnvelope { data }.fail(),
    }
}

/// Decode the first argument, which is either a json string or a json value
fn first_argument<T: DeserializeOwned>(event: &str, args: Vec<Value>) -> Result<T, DispatchError> {
    let arg = args
        .into_iter()
        .next()
        .context(error::MissingArgument { event })?;

    match arg {
        Value::String(s) => serde_json::from_str(&s),
        v => serde_json::from_value(v),
    }
    .context(error::InvalidSchema { event })
}

fn parse_system(event: &str, args: Vec<Value>) -> Result<Event, DispatchError> {
    first_argument::<SystemMessage>(event, args).map(Event::from)
}

fn parse_chat(event: &str, args: Vec<Value>) -> Result<Event, DispatchError> {
    first_argument::<ChatMessage>(event, args).map(Event::Chat)
}

fn parse_donation(event: &str, args: Vec<Value>) -> Result<Event, DispatchError> {
    first_argument::<Donation>(event, args).map(Event::Donation)
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_split_envelope() {
        let (name, args) =
            split_envelope(Some(PacketData::Json(json!(["CHAT", "{}", 1])))).unwrap();
        assert_eq!(name, "chat");
        assert_eq!(args, vec![json!("{}"), json!(1)]);

        assert!(matches!(
            split_envelope(Some(PacketData::Json(json!({"a": 1})))),
            Err(DispatchError::InvalidEnvelope { .. })
        ));
        assert!(matches!(
            split_envelope(Some(PacketData::Json(json!([1, 2])))),
            Err(DispatchError::InvalidEnvelope { .. })
        ));
        assert!(matches!(
            split_envelope(None),
            Err(DispatchError::InvalidEnvelope { data: None })
        ));
    }

    #[test]
    fn test_parse_string_and_value_argument() {
        let parser = find("system").unwrap();
        let body = json!({"type": "connected", "data": {"sessionKey": "key"}});

        let event = parser("system", vec![Value::String(body.to_string())]).unwrap();
        assert_eq!(event.as_connect().unwrap(), "key");

        let event = parser("system", vec![body]).unwrap();
        assert_eq!(event.as_connect().unwrap(), "key");
    }

    #[test]
    fn test_parse_errors_name_event() {
        let parser = find("donation").unwrap();

        let err = parser("donation", vec![]).unwrap_err();
        assert!(matches!(err, DispatchError::MissingArgument { ref event } if event == "donation"));

        let err = parser("donation", vec![json!({"payAmount": 1})]).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidSchema { ref event, .. } if event == "donation"));
    }

    #[test]
    fn test_unknown_event_has_no_parser() {
        assert!(find("unknown").is_none());
        assert!(find("CHAT").is_none());
    }
}
