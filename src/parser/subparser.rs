use log::{info, warn};

use crate::models::ProxySet;
use crate::parser::explodes::{explode, DecodeError};
use crate::utils::base64::base64_decode;

/// Counters collected while parsing one subscription.
///
/// They are for reporting only; a failing line never changes how the
/// following lines are handled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseReport {
    /// Non-empty lines seen.
    pub lines: usize,
    /// Lines with a scheme we do not decode.
    pub skipped: usize,
    /// Nodes rejected because no usable host could be derived.
    pub invalid_hosts: usize,
    /// Nodes rejected for bad base64, JSON or port.
    pub invalid_nodes: usize,
    /// Decoded nodes whose name was already taken earlier in the same feed.
    pub duplicate_names: usize,
    /// Every rejection, in input order.
    pub failures: Vec<DecodeError>,
}

impl ParseReport {
    pub fn rejected(&self) -> usize {
        self.invalid_hosts + self.invalid_nodes
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParsedSubscription {
    pub proxies: ProxySet,
    pub report: ParseReport,
}

/// Unwrap a raw feed body.
///
/// Feeds are usually one base64 blob hiding the newline-separated links.
/// Bodies that already contain links, or that are not base64, are returned
/// as they are.
pub fn decode_subscription_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.contains("://") {
        return trimmed.to_string();
    }

    match base64_decode(trimmed) {
        Some(decoded) if decoded.contains("://") => decoded,
        _ => trimmed.to_string(),
    }
}

/// Parse decoded subscription text, one link per line.
///
/// Records with the same name collapse to the last one seen.
pub fn parse_subscription(text: &str) -> ParsedSubscription {
    let mut parsed = ParsedSubscription::default();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        parsed.report.lines += 1;

        match explode(line) {
            Ok(record) => {
                if parsed.proxies.insert(record).is_some() {
                    parsed.report.duplicate_names += 1;
                }
            }
            Err(DecodeError::UnsupportedScheme) => {
                parsed.report.skipped += 1;
            }
            Err(err) => {
                if err.is_invalid_host() {
                    parsed.report.invalid_hosts += 1;
                    info!("Skipping node: {}", err);
                } else {
                    parsed.report.invalid_nodes += 1;
                    warn!("Skipping node: {}", err);
                }
                parsed.report.failures.push(err);
            }
        }
    }

    info!(
        "Parsed {} proxies from {} lines ({} invalid host, {} invalid node, {} unsupported)",
        parsed.proxies.len(),
        parsed.report.lines,
        parsed.report.invalid_hosts,
        parsed.report.invalid_nodes,
        parsed.report.skipped
    );

    parsed
}

/// [`decode_subscription_body`] followed by [`parse_subscription`].
pub fn parse_subscription_body(body: &str) -> ParsedSubscription {
    parse_subscription(&decode_subscription_body(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::base64::base64_encode;

    fn vmess(json: &str) -> String {
        format!("vmess://{}", base64_encode(json))
    }

    #[test]
    fn test_bad_lines_do_not_stop_parsing() {
        let text = [
            vmess(r#"{"ps":"A","add":"a.example.com"}"#),
            "vmess://!!!".to_string(),
            vmess(r#"{"ps":"ip-only","add":"1.1.1.1"}"#),
            "trojan://secret@t.example.com:443".to_string(),
            String::new(),
            vmess("garbage"),
            vmess(r#"{"ps":"B","add":"b.example.com","port":8080}"#),
        ]
        .join("\n");

        let parsed = parse_subscription(&text);

        assert_eq!(parsed.proxies.names().collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(parsed.report.lines, 6);
        assert_eq!(parsed.report.skipped, 1);
        assert_eq!(parsed.report.invalid_hosts, 1);
        assert_eq!(parsed.report.invalid_nodes, 2);
        assert_eq!(parsed.report.rejected(), 3);
        assert_eq!(parsed.report.failures.len(), 3);
    }

    struct CaptureLogger;

    static CAPTURED: std::sync::Mutex<Vec<(log::Level, String)>> = std::sync::Mutex::new(Vec::new());

    impl log::Log for CaptureLogger {
        fn enabled(&self, _: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            CAPTURED
                .lock()
                .unwrap()
                .push((record.level(), record.args().to_string()));
        }

        fn flush(&self) {}
    }

    #[test]
    fn test_invalid_host_is_reported_at_info_with_name() {
        static LOGGER: CaptureLogger = CaptureLogger;
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Trace);

        let parsed = parse_subscription(&vmess(r#"{"ps":"bare-ip-node","add":"5.6.7.8"}"#));
        assert_eq!(parsed.report.invalid_hosts, 1);

        let captured = CAPTURED.lock().unwrap();
        let (level, _) = captured
            .iter()
            .find(|(_, message)| message.contains("bare-ip-node"))
            .expect("rejection was not logged");
        assert!(*level <= log::Level::Info);
    }

    #[test]
    fn test_duplicate_names_keep_last() {
        let text = format!(
            "{}\r\n{}\r\n",
            vmess(r#"{"ps":"A","add":"old.example.com"}"#),
            vmess(r#"{"ps":"A","add":"new.example.com"}"#)
        );
        let parsed = parse_subscription(&text);

        assert_eq!(parsed.proxies.len(), 1);
        assert_eq!(parsed.proxies.get("A").unwrap().server, "new.example.com");
        assert_eq!(parsed.report.duplicate_names, 1);
    }

    #[test]
    fn test_body_may_be_wrapped_in_base64() {
        let links = vmess(r#"{"ps":"A","add":"a.example.com"}"#);
        let wrapped = base64_encode(&links);

        assert_eq!(decode_subscription_body(&wrapped), links);
        assert_eq!(decode_subscription_body(&links), links);
        assert_eq!(parse_subscription_body(&wrapped).proxies.len(), 1);
    }
}
