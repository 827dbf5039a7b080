use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde_json::{json, Map, Value};

use super::DecodeError;
use crate::models::{ProxyRecord, ProxyType, WsOpts};
use crate::utils::base64::{base64_decode_bytes, base64_encode};
use crate::utils::string::{contains_letters, decode_text, snippet, TextEncoding};

lazy_static! {
    // "key": "value" or "key": 123 / true / false
    static ref JSON_PAIR: Regex = Regex::new(
        r#""([^"\\]+)"\s*:\s*(?:"((?:[^"\\]|\\.)*)"|(-?\d+(?:\.\d+)?|true|false)\b)"#
    )
    .unwrap();
}

const DEFAULT_PORT: u16 = 443;
const DEFAULT_SERVER: &str = "unknown";
const DEFAULT_NAME: &str = "Unnamed";

/// Parse a `vmess://` link into a record.
///
/// The part after the scheme is base64 wrapping a flat JSON object in the
/// v2rayN layout (`ps`, `add`, `port`, `id`, `aid`, `net`, `host`, `path`,
/// `tls`). Payloads that are not valid JSON get a salvage pass before the
/// entry is given up on.
pub fn explode_vmess(vmess: &str) -> Result<ProxyRecord, DecodeError> {
    let encoded = vmess
        .strip_prefix(ProxyType::VMess.scheme())
        .ok_or(DecodeError::UnsupportedScheme)?;

    let bytes = base64_decode_bytes(encoded).map_err(|_| DecodeError::InvalidBase64 {
        raw: snippet(vmess, 80),
    })?;

    let (text, encoding) = decode_text(&bytes);
    if encoding != TextEncoding::Utf8 {
        debug!("vmess payload is not UTF-8, read as {:?}", encoding);
    }

    let node = parse_node_object(&text).ok_or_else(|| DecodeError::InvalidJson {
        text: snippet(&text, 200),
    })?;

    node_to_record(&node)
}

/// Strict JSON first, then the salvage pass.
fn parse_node_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => {
            let salvaged = salvage_json(text);
            if salvaged.is_some() {
                debug!("Recovered node from malformed JSON: {}", snippet(text, 80));
            }
            salvaged
        }
    }
}

/// Rebuild a flat object from whatever `"key": value` pairs can be found.
///
/// Returns `None` when nothing recognisable is left.
pub fn salvage_json(text: &str) -> Option<Map<String, Value>> {
    let mut map = Map::new();

    for caps in JSON_PAIR.captures_iter(text) {
        let key = caps[1].to_string();
        let value = if let Some(quoted) = caps.get(2) {
            // reuse the JSON parser for escapes; keep the raw text if that fails
            serde_json::from_str::<String>(&format!("\"{}\"", quoted.as_str()))
                .map(Value::String)
                .unwrap_or_else(|_| Value::String(quoted.as_str().to_string()))
        } else if let Some(bare) = caps.get(3) {
            serde_json::from_str::<Value>(bare.as_str())
                .unwrap_or_else(|_| Value::String(bare.as_str().to_string()))
        } else {
            continue;
        };
        map.insert(key, value);
    }

    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

/// Field as text; numbers and bools are stringified, null counts as absent.
fn text_field(node: &Map<String, Value>, key: &str) -> Option<String> {
    match node.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn non_empty_field(node: &Map<String, Value>, key: &str) -> Option<String> {
    text_field(node, key).filter(|s| !s.is_empty())
}

fn bool_field(node: &Map<String, Value>, key: &str) -> Option<bool> {
    match node.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_u64().map(|v| v != 0),
        _ => None,
    }
}

fn parse_port(raw: &str) -> Option<u16> {
    let raw = raw.trim();
    let port = raw
        .parse::<u64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))?;
    u16::try_from(port).ok().filter(|p| *p != 0)
}

/// Apply the field derivation rules to a decoded node object.
pub fn node_to_record(node: &Map<String, Value>) -> Result<ProxyRecord, DecodeError> {
    let name = non_empty_field(node, "ps").unwrap_or_else(|| DEFAULT_NAME.to_string());
    let server = text_field(node, "add").unwrap_or_else(|| DEFAULT_SERVER.to_string());

    let port = match text_field(node, "port") {
        Some(raw) => parse_port(&raw).ok_or_else(|| DecodeError::InvalidPort {
            name: name.clone(),
            port: raw.clone(),
        })?,
        None => DEFAULT_PORT,
    };

    let mut host = text_field(node, "host").unwrap_or_default();
    if host.is_empty() && contains_letters(&server) {
        host = server.clone();
    }
    if !host.contains('.') {
        return Err(DecodeError::InvalidHost { name, host });
    }

    let alter_id = match text_field(node, "aid") {
        Some(raw) => raw.trim().parse::<u32>().unwrap_or_else(|_| {
            debug!("Node {} has non-numeric aid '{}', using 0", name, raw);
            0
        }),
        None => 0,
    };

    let network = non_empty_field(node, "net").unwrap_or_else(|| "tcp".to_string());
    let ws_opts = (network == "ws").then(|| {
        let path = text_field(node, "path").unwrap_or_else(|| "/".to_string());
        WsOpts::new(&path, &host)
    });

    let mut record = ProxyRecord::new(&name, &server, port);
    record.proxy_type = ProxyType::VMess.as_str().to_string();
    record.uuid = text_field(node, "id").unwrap_or_default();
    record.alter_id = Some(alter_id);
    record.cipher = non_empty_field(node, "cipher")
        .or_else(|| non_empty_field(node, "scy"))
        .unwrap_or_else(|| "auto".to_string());
    record.tls = Some(text_field(node, "tls").as_deref() == Some("tls"));
    record.skip_cert_verify = Some(bool_field(node, "skip-cert-verify").unwrap_or(true));
    record.servername = host;
    record.network = network;
    record.ws_opts = ws_opts;
    record.udp = Some(bool_field(node, "udp").unwrap_or(false));

    Ok(record)
}

/// Render a record back into a `vmess://` link.
pub fn implode_vmess(record: &ProxyRecord) -> String {
    let host = if record.ws_host().is_empty() {
        record.servername.as_str()
    } else {
        record.ws_host()
    };
    let node = json!({
        "v": "2",
        "ps": record.name,
        "add": record.server,
        "port": record.port,
        "id": record.uuid,
        "aid": record.alter_id.unwrap_or(0),
        "scy": record.cipher,
        "net": record.network,
        "host": host,
        "path": record.ws_path(),
        "tls": if record.tls == Some(true) { "tls" } else { "" },
    });
    format!("{}{}", ProxyType::VMess.scheme(), base64_encode(&node.to_string()))
}
