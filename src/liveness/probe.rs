//! TCP reachability checks for proxy endpoints.
//!
//! A probe only opens a TCP connection; it says nothing about whether the
//! proxy protocol on the other side works.

use std::time::Duration;

use log::{debug, info, warn};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio::time::{sleep, timeout};

use crate::error::{CuratorError, Result};
use crate::models::{ProxyRecord, ProxySet};

/// Outcome of probing one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Reachable,
    Unreachable,
}

impl Reachability {
    pub fn is_reachable(self) -> bool {
        self == Reachability::Reachable
    }
}

/// Which record field is dialed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeAddress {
    #[default]
    Server,
    Servername,
}

impl ProbeAddress {
    pub fn of<'a>(self, record: &'a ProxyRecord) -> &'a str {
        match self {
            ProbeAddress::Server => &record.server,
            ProbeAddress::Servername => &record.servername,
        }
    }
}

/// Probe configuration
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Timeout for each connection attempt, name resolution included
    pub timeout: Duration,
    /// Pause before the single retry after a network error
    pub retry_delay: Duration,
    /// Pause between two records when probing a set
    pub pacing: Duration,
    pub address: ProbeAddress,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            retry_delay: Duration::from_secs(5),
            pacing: Duration::ZERO,
            address: ProbeAddress::Server,
        }
    }
}

enum Attempt {
    Connected,
    TimedOut,
    Failed(std::io::Error),
}

async fn attempt(server: &str, port: u16, limit: Duration) -> Attempt {
    match timeout(limit, TcpStream::connect((server, port))).await {
        Ok(Ok(_stream)) => Attempt::Connected,
        Ok(Err(e)) => Attempt::Failed(e),
        Err(_) => Attempt::TimedOut,
    }
}

/// Probe one endpoint.
///
/// A timeout is final. Any other error is retried once after
/// `config.retry_delay`; if that fails too the endpoint is unreachable.
pub async fn probe_endpoint(server: &str, port: u16, config: &ProbeConfig) -> Reachability {
    match attempt(server, port, config.timeout).await {
        Attempt::Connected => Reachability::Reachable,
        Attempt::TimedOut => {
            debug!("{}:{} timed out", server, port);
            Reachability::Unreachable
        }
        Attempt::Failed(e) => {
            warn!(
                "Network error on {}:{} ({}). Retrying in {:?}",
                server, port, e, config.retry_delay
            );
            sleep(config.retry_delay).await;
            match attempt(server, port, config.timeout).await {
                Attempt::Connected => Reachability::Reachable,
                Attempt::TimedOut => Reachability::Unreachable,
                Attempt::Failed(e) => {
                    debug!("Retry on {}:{} failed: {}", server, port, e);
                    Reachability::Unreachable
                }
            }
        }
    }
}

/// Result for one record of a probed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub reachability: Reachability,
}

#[derive(Debug, Clone, Default)]
pub struct ProbeReport {
    pub reachable: ProxySet,
    pub unreachable: Vec<String>,
    /// Records without an address or port; never probed.
    pub invalid: Vec<String>,
    pub results: Vec<ProbeResult>,
}

/// Sequential prober owning a single-threaded runtime.
pub struct ActiveProbe {
    config: ProbeConfig,
    runtime: Runtime,
}

impl ActiveProbe {
    pub fn new(config: ProbeConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CuratorError::io("probe runtime", e))?;
        Ok(Self { config, runtime })
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Blocking probe of one endpoint.
    pub fn probe(&self, server: &str, port: u16) -> Reachability {
        self.runtime
            .block_on(probe_endpoint(server, port, &self.config))
    }

    /// Probe every record in order and keep the reachable ones.
    ///
    /// `on_result` is called after each record, invalid ones included, so a
    /// caller can drive a progress display.
    pub fn probe_set<F>(&self, proxies: &ProxySet, mut on_result: F) -> ProbeReport
    where
        F: FnMut(&ProxyRecord, Option<&ProbeResult>),
    {
        let mut report = ProbeReport::default();
        let total = proxies.len();

        for (i, record) in proxies.iter().enumerate() {
            let address = self.config.address.of(record);
            if address.is_empty() || record.port == 0 {
                warn!("Invalid proxy configuration: {}", record.name);
                report.invalid.push(record.name.clone());
                on_result(record, None);
                continue;
            }

            let reachability = self.probe(address, record.port);
            let result = ProbeResult {
                name: record.name.clone(),
                address: address.to_string(),
                port: record.port,
                reachability,
            };
            debug!("[{}/{}] {}: {:?}", i + 1, total, record.name, reachability);

            if reachability.is_reachable() {
                report.reachable.insert(record.clone());
            } else {
                report.unreachable.push(record.name.clone());
            }
            on_result(record, Some(&result));
            report.results.push(result);

            if !self.config.pacing.is_zero() && i + 1 < total {
                std::thread::sleep(self.config.pacing);
            }
        }

        info!(
            "Probe finished: {} reachable, {} unreachable, {} invalid",
            report.reachable.len(),
            report.unreachable.len(),
            report.invalid.len()
        );
        report
    }
}
