//! Wire message types (spec.md §6, summarized there): JSON arrays whose
//! first element is a tag string, the rest positional. Hand-rolled
//! `Serialize`/`Deserialize` rather than `#[serde(tag = ...)]` since the
//! wire form is a heterogeneous array, not a tagged object.

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

use crate::event::Event;
use crate::store::Filter;

#[derive(Debug, Clone)]
pub enum ClientMessage {
    Event(Event),
    Req { sub_id: String, filters: Vec<Filter> },
    Close { sub_id: String },
}

impl Serialize for ClientMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ClientMessage::Event(event) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element("EVENT")?;
                seq.serialize_element(event)?;
                seq.end()
            }
            ClientMessage::Req { sub_id, filters } => {
                let mut seq = serializer.serialize_seq(Some(2 + filters.len()))?;
                seq.serialize_element("REQ")?;
                seq.serialize_element(sub_id)?;
                for f in filters {
                    seq.serialize_element(f)?;
                }
                seq.end()
            }
            ClientMessage::Close { sub_id } => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element("CLOSE")?;
                seq.serialize_element(sub_id)?;
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for ClientMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MsgVisitor;

        impl<'de> Visitor<'de> for MsgVisitor {
            type Value = ClientMessage;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a [\"EVENT\"|\"REQ\"|\"CLOSE\", ...] array")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let tag: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::custom("missing message tag"))?;
                match tag.as_str() {
                    "EVENT" => {
                        let event: Event = seq
                            .next_element()?
                            .ok_or_else(|| de::Error::custom("EVENT missing event body"))?;
                        Ok(ClientMessage::Event(event))
                    }
                    "REQ" => {
                        let sub_id: String = seq
                            .next_element()?
                            .ok_or_else(|| de::Error::custom("REQ missing subscription id"))?;
                        let mut filters = Vec::new();
                        while let Some(f) = seq.next_element::<Filter>()? {
                            filters.push(f);
                        }
                        Ok(ClientMessage::Req { sub_id, filters })
                    }
                    "CLOSE" => {
                        let sub_id: String = seq
                            .next_element()?
                            .ok_or_else(|| de::Error::custom("CLOSE missing subscription id"))?;
                        Ok(ClientMessage::Close { sub_id })
                    }
                    other => Err(de::Error::custom(format!("unknown client message tag {other}"))),
                }
            }
        }

        deserializer.deserialize_seq(MsgVisitor)
    }
}

/// Relay-to-client messages (spec.md §6). Every inbound `EVENT` yields
/// exactly one `Ok`; every `REQ` yields zero or more `Event` then one
/// `Eose`; every `CLOSE` yields one `Closed` (spec.md §7).
#[derive(Debug, Clone)]
pub enum RelayMessage {
    Event { sub_id: String, event: Event },
    Ok { event_id: String, accepted: bool, reason: String },
    Eose { sub_id: String },
    Notice { text: String },
    Closed { sub_id: String, reason: String },
}

impl Serialize for RelayMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RelayMessage::Event { sub_id, event } => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element("EVENT")?;
                seq.serialize_element(sub_id)?;
                seq.serialize_element(event)?;
                seq.end()
            }
            RelayMessage::Ok { event_id, accepted, reason } => {
                let mut seq = serializer.serialize_seq(Some(4))?;
                seq.serialize_element("OK")?;
                seq.serialize_element(event_id)?;
                seq.serialize_element(accepted)?;
                seq.serialize_element(reason)?;
                seq.end()
            }
            RelayMessage::Eose { sub_id } => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element("EOSE")?;
                seq.serialize_element(sub_id)?;
                seq.end()
            }
            RelayMessage::Notice { text } => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element("NOTICE")?;
                seq.serialize_element(text)?;
                seq.end()
            }
            RelayMessage::Closed { sub_id, reason } => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element("CLOSED")?;
                seq.serialize_element(sub_id)?;
                seq.serialize_element(reason)?;
                seq.end()
            }
        }
    }
}

impl RelayMessage {
    pub fn ok(event_id: impl Into<String>, accepted: bool, reason: impl Into<String>) -> Self {
        RelayMessage::Ok { event_id: event_id.into(), accepted, reason: reason.into() }
    }

    pub fn notice(text: impl Into<String>) -> Self {
        RelayMessage::Notice { text: text.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Tags;

    fn sample_event() -> Event {
        Event {
            id: "0".repeat(64),
            pubkey: "1".repeat(64),
            created_at: 100,
            kind: 30101,
            tags: Tags::from_raw(vec![]),
            content: String::new(),
            sig: "0".repeat(128),
        }
    }

    #[test]
    fn event_message_roundtrips_as_array() {
        let msg = ClientMessage::Event(sample_event());
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json[0], "EVENT");
        let parsed: ClientMessage = serde_json::from_value(json).unwrap();
        assert!(matches!(parsed, ClientMessage::Event(_)));
    }

    #[test]
    fn req_message_carries_subscription_and_filters() {
        let msg = ClientMessage::Req {
            sub_id: "sub1".to_string(),
            filters: vec![Filter { kinds: vec![30101], ..Default::default() }],
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json[0], "REQ");
        assert_eq!(json[1], "sub1");
        let parsed: ClientMessage = serde_json::from_value(json).unwrap();
        match parsed {
            ClientMessage::Req { sub_id, filters } => {
                assert_eq!(sub_id, "sub1");
                assert_eq!(filters.len(), 1);
            }
            other => panic!("expected Req, got {other:?}"),
        }
    }

    #[test]
    fn close_message_roundtrips() {
        let msg = ClientMessage::Close { sub_id: "sub1".to_string() };
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: ClientMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, ClientMessage::Close { sub_id } if sub_id == "sub1"));
    }

    #[test]
    fn ok_message_serializes_as_four_element_array() {
        let msg = RelayMessage::ok("abc", false, "invalid: bad signature");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!(["OK", "abc", false, "invalid: bad signature"]));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let json = serde_json::json!(["BOGUS", "x"]);
        let result: Result<ClientMessage, _> = serde_json::from_value(json);
        assert!(result.is_err());
    }
}
