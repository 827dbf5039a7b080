use std::io::Write;

use subcurator::liveness::{load_dead_names, DIRECT};
use subcurator::models::{ProxyRecord, ProxySet, WsOpts};
use subcurator::parser::normalize_nodes;

fn log_line(proxy: &str, alive: bool) -> String {
    format!(
        "time=\"2024-05-01T10:00:00Z\" level=debug msg=\"[TCP] uid: {{7}} proxy: {}, url: https://cp.cloudflare.com/generate_204, alive: {}\"",
        proxy, alive
    )
}

#[cfg(test)]
mod liveness_tests {
    use super::*;

    #[test]
    fn test_dead_set_from_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        let mut file = std::fs::File::create(&path).unwrap();
        for line in [
            log_line("A", false),
            "unrelated line".to_string(),
            log_line("B", false),
            log_line(DIRECT, false),
            log_line("A", true),
        ] {
            writeln!(file, "{}", line).unwrap();
        }
        drop(file);

        let dead = load_dead_names(Some(path.as_path()));
        assert_eq!(dead.iter().collect::<Vec<_>>(), vec!["B"]);
        assert!(!dead.contains("A"));
        assert!(!dead.contains(DIRECT));
    }

    #[test]
    fn test_missing_log_removes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_dead_names(Some(dir.path().join("absent.log").as_path())).is_empty());
        assert!(load_dead_names(None).is_empty());
    }

    #[test]
    fn test_clean_fills_servername_from_ws_host() {
        let mut with_host = ProxyRecord::new("with-host", "1.2.3.4", 443);
        with_host.network = "ws".to_string();
        with_host.ws_opts = Some(WsOpts::new("/ws", "cdn.example.com"));

        let bare = ProxyRecord::new("bare", "5.6.7.8", 443);

        let proxies: ProxySet = vec![with_host, bare].into_iter().collect();
        let (kept, rejected) = normalize_nodes(proxies);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept.get("with-host").unwrap().servername, "cdn.example.com");
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].name(), "bare");
    }
}
