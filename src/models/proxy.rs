//! Proxy model definitions
//!
//! Contains the canonical record produced by the node decoder and stored in
//! the Clash-style `proxies` list.

use std::collections::BTreeMap;
use std::fmt;

use linked_hash_map::LinkedHashMap;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use serde_yaml::Value;

/// Represents the type of a proxy.
///
/// Only vmess links are decoded from subscriptions; records of any other
/// type found in a stored set are carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyType {
    VMess,
}

impl ProxyType {
    /// Every scheme the decoder understands.
    pub const ALL: [ProxyType; 1] = [ProxyType::VMess];

    /// Link prefix, including the `://` separator.
    pub fn scheme(self) -> &'static str {
        match self {
            ProxyType::VMess => "vmess://",
        }
    }

    /// Value written to the record's `type` field.
    pub fn as_str(self) -> &'static str {
        match self {
            ProxyType::VMess => "vmess",
        }
    }

    /// Detect the scheme of a subscription entry.
    pub fn from_link(link: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|proxy_type| link.starts_with(proxy_type.scheme()))
    }
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_zero(port: &u16) -> bool {
    *port == 0
}

// `servername: null` and `servername: ''` mean the same thing, and hand-edited
// files sometimes carry bare numbers where strings belong
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringVisitor;

    impl<'de> Visitor<'de> for StringVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string, number, bool or null")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_bool<E>(self, value: bool) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(String::new())
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(String::new())
        }
    }

    deserializer.deserialize_any(StringVisitor)
}

// alterId shows up both as `0` and as `"0"` in the wild
fn deserialize_u32_lenient<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    struct U32Visitor;

    impl<'de> Visitor<'de> for U32Visitor {
        type Value = Option<u32>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an unsigned integer, a numeric string or null")
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            u32::try_from(value)
                .map(Some)
                .map_err(|_| E::custom(format!("{} out of range", value)))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            u32::try_from(value)
                .map(Some)
                .map_err(|_| E::custom(format!("{} out of range", value)))
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            value.trim().parse::<u32>().map(Some).map_err(E::custom)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(U32Visitor)
}

/// WebSocket transport options (`ws-opts`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WsOpts {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub path: String,
    #[serde(default)]
    pub headers: LinkedHashMap<String, String>,
}

impl WsOpts {
    pub fn new(path: &str, host: &str) -> Self {
        let mut headers = LinkedHashMap::new();
        headers.insert("Host".to_string(), host.to_string());
        WsOpts {
            path: path.to_string(),
            headers,
        }
    }

    /// The `Host` header, matched case-insensitively.
    pub fn host(&self) -> &str {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("host"))
            .map_or("", |(_, value)| value.as_str())
    }
}

/// One proxy endpoint in canonical form.
///
/// Field names on the wire follow the Clash proxy schema. Keys the model does
/// not know about are kept in `extra` so a stored set survives a round trip
/// through the curator unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub name: String,
    #[serde(
        rename = "type",
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "String::is_empty"
    )]
    pub proxy_type: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub server: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub port: u16,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "String::is_empty"
    )]
    pub uuid: String,
    #[serde(
        rename = "alterId",
        default,
        deserialize_with = "deserialize_u32_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub alter_id: Option<u32>,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "String::is_empty"
    )]
    pub cipher: String,
    // Flags missing from a stored record stay missing on save
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<bool>,
    #[serde(
        rename = "skip-cert-verify",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub skip_cert_verify: Option<bool>,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "String::is_empty"
    )]
    pub servername: String,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "String::is_empty"
    )]
    pub network: String,
    #[serde(rename = "ws-opts", default, skip_serializing_if = "Option::is_none")]
    pub ws_opts: Option<WsOpts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub udp: Option<bool>,
    #[serde(flatten)]
    pub extra: LinkedHashMap<String, Value>,
}

impl ProxyRecord {
    /// A bare record with only the identity and endpoint filled in.
    pub fn new(name: &str, server: &str, port: u16) -> Self {
        ProxyRecord {
            name: name.to_string(),
            proxy_type: String::new(),
            server: server.to_string(),
            port,
            uuid: String::new(),
            alter_id: None,
            cipher: String::new(),
            tls: None,
            skip_cert_verify: None,
            servername: String::new(),
            network: String::new(),
            ws_opts: None,
            udp: None,
            extra: LinkedHashMap::new(),
        }
    }

    pub fn ws_path(&self) -> &str {
        self.ws_opts.as_ref().map_or("", |opts| opts.path.as_str())
    }

    pub fn ws_host(&self) -> &str {
        self.ws_opts.as_ref().map_or("", WsOpts::host)
    }

    /// Stable serialization of every field with object keys sorted.
    ///
    /// Two records with the same canonical key are identical in content,
    /// regardless of the order their fields were read in.
    pub fn canonical_key(&self) -> Result<String, serde_json::Error> {
        let value = serde_json::to_value(self)?;
        serde_json::to_string(&sorted(value))
    }
}

fn sorted(value: JsonValue) -> SortedValue {
    match value {
        JsonValue::Object(map) => SortedValue::Object(
            map.into_iter()
                .map(|(key, value)| (key, sorted(value)))
                .collect(),
        ),
        JsonValue::Array(items) => SortedValue::Array(items.into_iter().map(sorted).collect()),
        other => SortedValue::Scalar(other),
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum SortedValue {
    Object(BTreeMap<String, SortedValue>),
    Array(Vec<SortedValue>),
    Scalar(JsonValue),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_detection() {
        assert_eq!(ProxyType::from_link("vmess://abc"), Some(ProxyType::VMess));
        assert_eq!(ProxyType::from_link("trojan://abc"), None);
        assert_eq!(ProxyType::from_link("VMESS://abc"), None);
    }

    #[test]
    fn test_deserialize_with_nulls_and_string_alter_id() {
        let yaml = r#"
name: HK-1
server: 1.2.3.4
port: 443
type: vmess
uuid: 1111
alterId: "2"
cipher: ~
servername: null
ws-opts:
  path: /ws
  headers:
    host: cdn.example.com
"#;
        let record: ProxyRecord = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(record.alter_id, Some(2));
        assert_eq!(record.uuid, "1111");
        assert_eq!(record.cipher, "");
        assert_eq!(record.servername, "");
        assert_eq!(record.skip_cert_verify, None);
        assert_eq!(record.ws_path(), "/ws");
        assert_eq!(record.ws_host(), "cdn.example.com");
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let yaml = "name: A\nserver: a.example.com\nport: 80\ntype: ss\npassword: secret\n";
        let record: ProxyRecord = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            record.extra.get("password"),
            Some(&Value::String("secret".to_string()))
        );
        let out = serde_yaml::to_string(&record).unwrap();
        assert!(out.contains("password: secret"));
        assert!(!out.contains("uuid"));
    }

    #[test]
    fn test_foreign_record_is_written_back_unchanged() {
        let yaml = "name: T\ntype: trojan\nserver: t.example.com\nport: 443\npassword: p\nsni: t.example.com\n";
        let record: ProxyRecord = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(record.tls, None);
        assert_eq!(record.skip_cert_verify, None);

        let out = serde_yaml::to_string(&record).unwrap();
        assert_eq!(out, yaml);
        for key in ["alterId", "tls:", "skip-cert-verify", "udp", "cipher"] {
            assert!(!out.contains(key), "{} was added", key);
        }
    }

    #[test]
    fn test_explicit_flags_are_kept() {
        let yaml = "name: S\ntype: ss\nserver: s.example.com\nport: 8388\nskip-cert-verify: false\nudp: true\n";
        let record: ProxyRecord = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(record.skip_cert_verify, Some(false));
        assert_eq!(record.udp, Some(true));
        assert_eq!(serde_yaml::to_string(&record).unwrap(), yaml);
    }

    #[test]
    fn test_canonical_key_ignores_field_order() {
        let a: ProxyRecord =
            serde_yaml::from_str("name: A\nserver: s.example.com\nport: 1\nfoo: 1\nbar: 2\n")
                .unwrap();
        let b: ProxyRecord =
            serde_yaml::from_str("bar: 2\nport: 1\nfoo: 1\nname: A\nserver: s.example.com\n")
                .unwrap();
        assert_eq!(a.canonical_key().unwrap(), b.canonical_key().unwrap());

        let mut c = a.clone();
        c.cipher = "aes-128-gcm".to_string();
        assert_ne!(a.canonical_key().unwrap(), c.canonical_key().unwrap());
    }
}
