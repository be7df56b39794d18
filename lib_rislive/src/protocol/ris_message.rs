//! # RIS Live Messages
//!
//! RIS Live speaks JSON text frames shaped `{"type": ..., "data": ...}`. The two
//! directions carry unrelated payloads, so each direction gets its own tagged
//! enum instead of one generic envelope.
//!
//! Only the parts of a `ris_message` needed to derive (origin AS, prefix) pairs
//! are modelled: the AS-PATH and the announcements. Every other field
//! (timestamp, peer, raw, community, origin, med, aggregator, ...) is ignored.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// Public RIS Live WebSocket endpoint.
pub const RIS_LIVE_ENDPOINT: &str = "wss://ris-live.ripe.net:443/v1/ws/";

/// Integer form of "no single origin": an empty path or an AS-SET terminus.
pub const NO_ORIGIN: i64 = -1;

/// Errors raised while decoding a server frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed RIS Live frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// Builds the subscription URL for a given client identifier.
///
/// The `client` query parameter only identifies the consumer to the RIS team;
/// it does not authenticate anything.
pub fn subscribe_url(client_id: &str) -> String {
    // The endpoint constant is a valid absolute URL, parsing cannot fail.
    let mut url = Url::parse(RIS_LIVE_ENDPOINT).unwrap_or_else(|_| unreachable!());
    url.query_pairs_mut().append_pair("client", client_id);
    url.into()
}

// Client -> server

/// BGP message types a subscription can be restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BgpType {
    Update,
    Open,
    Notification,
    Keepalive,
    RisPeerState,
}

/// Only deliver messages that contain the given key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Require {
    Announcements,
    Withdrawals,
}

/// Filter carried by `ris_subscribe` / `ris_unsubscribe`.
///
/// Every field is optional; an empty directive subscribes to everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDirective {
    /// Restrict to one route collector, e.g. `rrc00`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(rename = "type", alias = "bgpType", default, skip_serializing_if = "Option::is_none")]
    pub bgp_type: Option<BgpType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require: Option<Require>,
}

/// Messages sent by this client to RIS Live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    RisSubscribe(ClientDirective),
    RisUnsubscribe(ClientDirective),
    RequestRrcList,
    Ping,
}

impl ClientMessage {
    pub fn subscribe(filter: ClientDirective) -> Self {
        Self::RisSubscribe(filter)
    }

    pub fn unsubscribe(filter: ClientDirective) -> Self {
        Self::RisUnsubscribe(filter)
    }

    pub fn request_rrc_list() -> Self {
        Self::RequestRrcList
    }

    /// RIS Live answers a `ping` with a `pong`; used as an application heartbeat.
    pub fn ping() -> Self {
        Self::Ping
    }

    /// Serializes the message into the text payload of a WebSocket frame.
    pub fn to_json(&self) -> String {
        // Plain enums and optional strings always serialize.
        serde_json::to_string(self).unwrap_or_default()
    }
}

// Server -> client

/// One element of an AS-PATH.
///
/// RIS Live renders the path as a JSON array whose last element may itself be
/// an array (an AS-SET), e.g. `[1, 2, 3, [64496, 64497]]`. AS-SETs are not
/// expanded; they only mark "no single origin".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathHop {
    Asn(u32),
    AsSet,
}

impl PathHop {
    fn from_token(token: &Value) -> Self {
        let asn = match token {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.trim().parse::<u32>().ok(),
            _ => None,
        };
        asn.map_or(PathHop::AsSet, PathHop::Asn)
    }
}

impl From<PathHop> for i64 {
    fn from(hop: PathHop) -> i64 {
        match hop {
            PathHop::Asn(asn) => i64::from(asn),
            PathHop::AsSet => NO_ORIGIN,
        }
    }
}

impl<'de> Deserialize<'de> for PathHop {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Never fails on shape: anything that is not a plain ASN is an AS-SET.
        let token = Value::deserialize(deserializer)?;
        Ok(PathHop::from_token(&token))
    }
}

/// A BGP announcement inside a `ris_message`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Announcement {
    /// IPv4 or IPv6 CIDR prefixes.
    #[serde(default, deserialize_with = "null_as_default")]
    pub prefixes: Vec<String>,
}

/// The `data` of a `ris_message`, reduced to what origin validation needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServerEvent {
    #[serde(default, deserialize_with = "null_as_default")]
    pub path: Vec<PathHop>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub announcements: Vec<Announcement>,
}

impl ServerEvent {
    /// The originating AS: the last hop of the path.
    ///
    /// `None` when the path is empty or ends in an AS-SET.
    pub fn origin_as(&self) -> Option<u32> {
        match self.path.last() {
            Some(PathHop::Asn(asn)) => Some(*asn),
            _ => None,
        }
    }

    /// [`origin_as`](Self::origin_as) in its integer form, [`NO_ORIGIN`] for none.
    pub fn origin_as_raw(&self) -> i64 {
        self.path.last().copied().map_or(NO_ORIGIN, i64::from)
    }

    /// All announced prefixes, in announcement order.
    ///
    /// With `only_ipv4`, keeps the prefixes written in dotted-decimal notation.
    /// IPv6 text never contains a `.`, so the check is exact for valid CIDRs.
    pub fn prefixes(&self, only_ipv4: bool) -> Vec<String> {
        self.announcements
            .iter()
            .flat_map(|announcement| announcement.prefixes.iter())
            .filter(|prefix| !only_ipv4 || is_ipv4(prefix))
            .cloned()
            .collect()
    }
}

fn is_ipv4(prefix: &str) -> bool {
    prefix.contains('.')
}

/// Messages received from RIS Live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// `ris_message`: a BGP message seen by a collector.
    Event(ServerEvent),
    /// Reply to our `ping`.
    Pong,
    /// `ris_error`: the server rejected something we sent.
    Error { message: String },
    /// `ris_rrc_list`: reply to `request_rrc_list`.
    RrcList(Vec<String>),
    /// `ris_subscribe_ok`: subscription acknowledged.
    SubscribeOk,
    /// Any message type this client does not act on.
    Other(String),
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<Value>,
}

impl ServerMessage {
    /// Decodes one text frame.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let frame: RawFrame = serde_json::from_str(text)?;
        let data = frame.data.filter(|value| !value.is_null());

        let message = match frame.kind.as_str() {
            "ris_message" => {
                let event = data.map(serde_json::from_value).transpose()?.unwrap_or_default();
                ServerMessage::Event(event)
            }
            "pong" => ServerMessage::Pong,
            "ris_error" => {
                let message = data
                    .as_ref()
                    .and_then(|d| d.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                ServerMessage::Error { message }
            }
            "ris_rrc_list" => {
                let hosts = data.map(serde_json::from_value).transpose()?.unwrap_or_default();
                ServerMessage::RrcList(hosts)
            }
            "ris_subscribe_ok" => ServerMessage::SubscribeOk,
            _ => ServerMessage::Other(frame.kind),
        };
        Ok(message)
    }

    /// The wire `type` of this message.
    pub fn kind(&self) -> &str {
        match self {
            ServerMessage::Event(_) => "ris_message",
            ServerMessage::Pong => "pong",
            ServerMessage::Error { .. } => "ris_error",
            ServerMessage::RrcList(_) => "ris_rrc_list",
            ServerMessage::SubscribeOk => "ris_subscribe_ok",
            ServerMessage::Other(kind) => kind,
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(text: &str) -> ServerEvent {
        match ServerMessage::decode(text).unwrap() {
            ServerMessage::Event(event) => event,
            other => panic!("expected an event, got {:?}", other),
        }
    }

    #[test]
    fn test_origin_is_last_hop() {
        let ev = event(r#"{"type":"ris_message","data":{"path":[3356,1299,64511],"announcements":[]}}"#);
        assert_eq!(ev.origin_as(), Some(64511));
        assert_eq!(ev.origin_as_raw(), 64511);
    }

    #[test]
    fn test_as_set_terminus_has_no_origin() {
        let ev = event(r#"{"type":"ris_message","data":{"path":[3356,[64496,64497]]}}"#);
        assert_eq!(ev.path, vec![PathHop::Asn(3356), PathHop::AsSet]);
        assert_eq!(ev.origin_as(), None);
        assert_eq!(ev.origin_as_raw(), NO_ORIGIN);
    }

    #[test]
    fn test_empty_or_missing_path_has_no_origin() {
        assert_eq!(event(r#"{"type":"ris_message","data":{"path":[]}}"#).origin_as_raw(), -1);
        assert_eq!(event(r#"{"type":"ris_message","data":{}}"#).origin_as(), None);
        assert_eq!(event(r#"{"type":"ris_message","data":{"path":null}}"#).origin_as(), None);
        assert_eq!(event(r#"{"type":"ris_message"}"#), ServerEvent::default());
    }

    #[test]
    fn test_path_hop_tokens() {
        let hop: PathHop = serde_json::from_value(json!(64511)).unwrap();
        assert_eq!(hop, PathHop::Asn(64511));
        let hop: PathHop = serde_json::from_value(json!("64511")).unwrap();
        assert_eq!(hop, PathHop::Asn(64511));
        let hop: PathHop = serde_json::from_value(json!("{64496,64497}")).unwrap();
        assert_eq!(i64::from(hop), -1);
        let hop: PathHop = serde_json::from_value(json!([64496, 64497])).unwrap();
        assert_eq!(hop, PathHop::AsSet);
        // Larger than any 32-bit ASN.
        let hop: PathHop = serde_json::from_value(json!(4294967296u64)).unwrap();
        assert_eq!(hop, PathHop::AsSet);
    }

    #[test]
    fn test_prefix_extraction_keeps_order_and_filters_ipv6() {
        let ev = event(
            r#"{"type":"ris_message","data":{"path":[64496],"announcements":[
                {"next_hop":"192.0.2.1","prefixes":["10.0.0.0/24","2001:db8::/32"]},
                {"next_hop":"2001:db8::1","prefixes":["2001:db8:1::/48","192.0.2.0/24"]}
            ]}}"#,
        );
        assert_eq!(
            ev.prefixes(false),
            vec!["10.0.0.0/24", "2001:db8::/32", "2001:db8:1::/48", "192.0.2.0/24"]
        );
        assert_eq!(ev.prefixes(true), vec!["10.0.0.0/24", "192.0.2.0/24"]);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let ev = event(
            r#"{"type":"ris_message","data":{"timestamp":1700000000.12,"peer":"192.0.2.9",
                "peer_asn":"64500","id":"x-1","host":"rrc00","type":"UPDATE",
                "community":[[64496,1111]],"origin":"igp","med":10,"aggregator":"64496:192.0.2.1",
                "path":[64500,64496],"announcements":[{"prefixes":["198.51.100.0/24"]}],
                "withdrawals":["203.0.113.0/24"]}}"#,
        );
        assert_eq!(ev.origin_as(), Some(64496));
        assert_eq!(ev.prefixes(true), vec!["198.51.100.0/24"]);
    }

    #[test]
    fn test_control_messages() {
        assert_eq!(ServerMessage::decode(r#"{"type":"pong","data":null}"#).unwrap(), ServerMessage::Pong);
        assert_eq!(ServerMessage::decode(r#"{"type":"pong"}"#).unwrap().kind(), "pong");
        assert_eq!(
            ServerMessage::decode(r#"{"type":"ris_error","data":{"message":"bad filter"}}"#).unwrap(),
            ServerMessage::Error { message: "bad filter".into() }
        );
        assert_eq!(
            ServerMessage::decode(r#"{"type":"ris_rrc_list","data":["rrc00","rrc01"]}"#).unwrap(),
            ServerMessage::RrcList(vec!["rrc00".into(), "rrc01".into()])
        );
        assert_eq!(
            ServerMessage::decode(r#"{"type":"ris_subscribe_ok","data":{"subscription":{}}}"#).unwrap(),
            ServerMessage::SubscribeOk
        );
        assert_eq!(
            ServerMessage::decode(r#"{"type":"something_new","data":1}"#).unwrap(),
            ServerMessage::Other("something_new".into())
        );
    }

    #[test]
    fn test_malformed_frames_are_errors() {
        assert!(ServerMessage::decode("not json").is_err());
        assert!(ServerMessage::decode(r#"{"data":{}}"#).is_err());
        assert!(ServerMessage::decode(r#"{"type":"ris_message","data":{"path":"oops"}}"#).is_err());
    }

    #[test]
    fn test_client_message_encoding() {
        let filter = ClientDirective {
            host: Some("rrc00".into()),
            bgp_type: Some(BgpType::Update),
            require: Some(Require::Announcements),
        };
        let value: Value = serde_json::from_str(&ClientMessage::subscribe(filter.clone()).to_json()).unwrap();
        assert_eq!(
            value,
            json!({"type":"ris_subscribe","data":{"host":"rrc00","type":"UPDATE","require":"announcements"}})
        );

        let value: Value = serde_json::from_str(&ClientMessage::unsubscribe(ClientDirective::default()).to_json()).unwrap();
        assert_eq!(value, json!({"type":"ris_unsubscribe","data":{}}));

        let value: Value = serde_json::from_str(&ClientMessage::ping().to_json()).unwrap();
        assert_eq!(value, json!({"type":"ping"}));
        let value: Value = serde_json::from_str(&ClientMessage::request_rrc_list().to_json()).unwrap();
        assert_eq!(value, json!({"type":"request_rrc_list"}));
    }

    #[test]
    fn test_directive_from_config_json() {
        let filter: ClientDirective =
            serde_json::from_value(json!({"host":"rrc21","bgpType":"RIS_PEER_STATE"})).unwrap();
        assert_eq!(filter.bgp_type, Some(BgpType::RisPeerState));
        assert_eq!(filter.require, None);
    }

    #[test]
    fn test_subscribe_url() {
        let url = Url::parse(&subscribe_url("my client")).unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.host_str(), Some("ris-live.ripe.net"));
        assert_eq!(url.port_or_known_default(), Some(443));
        assert_eq!(url.path(), "/v1/ws/");
        assert_eq!(url.query_pairs().next().unwrap(), ("client".into(), "my client".into()));
    }
}
