//! Dead-proxy detection from historical test logs.
//!
//! The client logs one line per delay test, e.g.
//!
//! ```text
//! ... proxy: HK-01, url: http://www.gstatic.com/generate_204, uid: {a1b2}, delay: 0, alive: false
//! ```
//!
//! Only the newest result per proxy counts: a proxy that failed last week and
//! passed an hour ago is alive.

use std::collections::HashSet;
use std::path::Path;

use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;

use crate::utils::string::decode_text;

lazy_static! {
    static ref UID_PATTERN: Regex = Regex::new(r"uid: \{(.*?)\}").unwrap();
    static ref ALIVE_PATTERN: Regex = Regex::new(r"alive: (true|false)\b").unwrap();
}

/// Built-in passthrough outbound. Never a removable proxy.
pub const DIRECT: &str = "DIRECT";

const NAME_START: &str = "proxy: ";
const NAME_END: &str = ", url: ";

/// Names of proxies whose most recent logged test failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeadNameSet {
    // newest failure first
    names: Vec<String>,
    index: HashSet<String>,
}

impl DeadNameSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in the order their deciding log line was met, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    fn insert(&mut self, name: &str) {
        if self.index.insert(name.to_string()) {
            self.names.push(name.to_string());
        }
    }
}

/// One test result pulled out of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestResult<'a> {
    pub proxy: &'a str,
    pub alive: bool,
}

/// Parse a single log line, if it records a delay test.
///
/// The line needs an `alive:` verdict, a `uid: {...}` group and a name
/// between `proxy: ` and the next `, url: `.
pub fn parse_test_line(line: &str) -> Option<TestResult<'_>> {
    let alive = ALIVE_PATTERN.captures(line)?.get(1)?.as_str() == "true";
    UID_PATTERN.captures(line)?;

    let start = line.find(NAME_START)? + NAME_START.len();
    let end = start + line[start..].find(NAME_END)?;
    let proxy = line[start..end].trim();
    if proxy.is_empty() {
        return None;
    }

    Some(TestResult { proxy, alive })
}

/// Build the dead set from log lines given oldest first.
///
/// Lines are scanned newest to oldest and the first result met for a name
/// decides it; older lines for that name are ignored.
pub fn extract_dead_names<S: AsRef<str>>(lines: &[S]) -> DeadNameSet {
    let mut decided: HashSet<&str> = HashSet::new();
    let mut dead = DeadNameSet::new();

    for line in lines.iter().rev() {
        let Some(result) = parse_test_line(line.as_ref()) else {
            continue;
        };
        if !decided.insert(result.proxy) {
            continue;
        }
        if !result.alive && result.proxy != DIRECT {
            dead.insert(result.proxy);
        }
    }

    debug!("Found {} dead proxies in {} log lines", dead.len(), lines.len());
    dead
}

/// [`extract_dead_names`] over a whole log text.
pub fn extract_dead_names_from_str(content: &str) -> DeadNameSet {
    let lines: Vec<&str> = content.lines().collect();
    extract_dead_names(&lines)
}

/// Read a test log from disk.
///
/// No path, a missing file or an unreadable file all give an empty set, so a
/// run without logs simply removes nothing.
pub fn load_dead_names(path: Option<&Path>) -> DeadNameSet {
    let Some(path) = path else {
        return DeadNameSet::new();
    };

    match std::fs::read(path) {
        Ok(bytes) => {
            let (content, _) = decode_text(&bytes);
            let dead = extract_dead_names_from_str(&content);
            info!("Number of dead proxies in {}: {}", path.display(), dead.len());
            dead
        }
        Err(e) => {
            warn!("Cannot read test log {}: {}", path.display(), e);
            DeadNameSet::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(proxy: &str, alive: bool) -> String {
        format!(
            "time=\"2024-05-01T10:00:00Z\" level=debug msg=\"[Test] proxy: {}, url: https://cp.cloudflare.com, uid: {{7f3a}}, delay: 0, alive: {}\"",
            proxy, alive
        )
    }

    #[test]
    fn test_parse_test_line() {
        assert_eq!(
            parse_test_line(&line("HK 01", false)),
            Some(TestResult {
                proxy: "HK 01",
                alive: false
            })
        );
        assert_eq!(parse_test_line("alive: false uid: {1}"), None);
        assert_eq!(
            parse_test_line("proxy: X, url: http://a, alive: false"),
            None,
            "a result without uid is not a test line"
        );
        assert_eq!(parse_test_line("proxy: , url: u, uid: {1}, alive: false"), None);
    }

    #[test]
    fn test_most_recent_result_wins() {
        let lines = vec![line("X", false), line("Y", true), line("X", true), line("Y", false)];
        let dead = extract_dead_names(&lines);

        assert!(!dead.contains("X"));
        assert!(dead.contains("Y"));
        assert_eq!(dead.len(), 1);
    }

    #[test]
    fn test_direct_is_never_dead() {
        let lines = vec![line("DIRECT", false), line("DIRECT", false), line("A", false)];
        let dead = extract_dead_names(&lines);

        assert!(!dead.contains(DIRECT));
        assert_eq!(dead.iter().collect::<Vec<_>>(), vec!["A"]);
    }

    #[test]
    fn test_names_are_listed_newest_first_once() {
        let content = [line("A", false), line("B", false), line("A", false)].join("\n");
        let dead = extract_dead_names_from_str(&content);
        assert_eq!(dead.iter().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn test_empty_and_absent_sources() {
        let none: Vec<String> = Vec::new();
        assert!(extract_dead_names(&none).is_empty());
        assert!(load_dead_names(None).is_empty());
        assert!(load_dead_names(Some(Path::new("/nonexistent/dir/test.log"))).is_empty());
    }
}
