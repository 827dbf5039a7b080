use log::{info, warn};
use thiserror::Error;

use crate::models::{ProxyRecord, ProxySet};

/// A record dropped because no TLS server name could be established.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeRejection {
    #[error("proxy {name} has neither servername nor ws Host")]
    MissingHost { name: String },

    #[error("proxy {name} has a ws Host but no ws path to go with it")]
    MissingPath { name: String },
}

impl NormalizeRejection {
    pub fn name(&self) -> &str {
        match self {
            NormalizeRejection::MissingHost { name } | NormalizeRejection::MissingPath { name } => {
                name
            }
        }
    }
}

/// Fill in an empty `servername` from the WebSocket Host header.
///
/// Records that already carry a server name pass through unchanged.
pub fn normalize_servername(mut node: ProxyRecord) -> Result<ProxyRecord, NormalizeRejection> {
    if !node.servername.is_empty() {
        return Ok(node);
    }

    let host = node.ws_host().to_string();
    if host.is_empty() {
        return Err(NormalizeRejection::MissingHost { name: node.name });
    }
    if node.ws_path().is_empty() {
        return Err(NormalizeRejection::MissingPath { name: node.name });
    }

    node.servername = host;
    Ok(node)
}

/// Normalize every record of a set, dropping the ones that cannot be fixed.
pub fn normalize_nodes(nodes: ProxySet) -> (ProxySet, Vec<NormalizeRejection>) {
    let mut kept = ProxySet::new();
    let mut rejected = Vec::new();

    for node in nodes {
        match normalize_servername(node) {
            Ok(node) => {
                kept.insert(node);
            }
            Err(rejection) => {
                warn!("Removing proxy: {}", rejection);
                rejected.push(rejection);
            }
        }
    }

    if !rejected.is_empty() {
        info!("Dropped {} proxies without a usable servername", rejected.len());
    }

    (kept, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WsOpts;

    fn node(servername: &str, ws: Option<(&str, &str)>) -> ProxyRecord {
        let mut node = ProxyRecord::new("N", "1.2.3.4", 443);
        node.servername = servername.to_string();
        node.ws_opts = ws.map(|(path, host)| WsOpts::new(path, host));
        node
    }

    #[test]
    fn test_existing_servername_is_untouched() {
        let original = node("keep.example.com", Some(("/ws", "other.example.com")));
        assert_eq!(normalize_servername(original.clone()), Ok(original));
    }

    #[test]
    fn test_servername_filled_from_ws_host() {
        let fixed = normalize_servername(node("", Some(("/ws", "cdn.example.com")))).unwrap();
        assert_eq!(fixed.servername, "cdn.example.com");
    }

    #[test]
    fn test_missing_ws_host_is_dropped() {
        assert_eq!(
            normalize_servername(node("", Some(("/ws", "")))),
            Err(NormalizeRejection::MissingHost {
                name: "N".to_string()
            })
        );
        assert!(normalize_servername(node("", None)).is_err());
    }

    #[test]
    fn test_missing_ws_path_is_dropped() {
        let rejection = normalize_servername(node("", Some(("", "cdn.example.com")))).unwrap_err();
        assert!(matches!(rejection, NormalizeRejection::MissingPath { .. }));
        assert_eq!(rejection.name(), "N");
    }

    #[test]
    fn test_normalize_nodes_reports_rejections() {
        let mut bad = node("", None);
        bad.name = "bad".to_string();
        let mut good = node("", Some(("/", "g.example.com")));
        good.name = "good".to_string();

        let (kept, rejected) = normalize_nodes(vec![bad, good].into_iter().collect());
        assert_eq!(kept.names().collect::<Vec<_>>(), vec!["good"]);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].name(), "bad");
    }
}
