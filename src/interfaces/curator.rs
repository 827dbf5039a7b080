use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::error::Result;
use crate::liveness::{load_dead_names, ActiveProbe, DeadNameSet, ProbeConfig, ProbeReport, ProbeResult};
use crate::models::{content_diff, merge, ProxyRecord, ProxySet};
use crate::parser::{normalize_nodes, parse_subscription_body, NormalizeRejection, ParseReport};
use crate::utils::{FileStore, ProxyStore, SaveOutcome};

/// Configuration for one curation run
#[derive(Debug, Clone)]
pub struct CuratorConfig {
    /// Ports to split the curated set by, in output order
    pub ports: Vec<u16>,
    /// Server written into each per-port copy; no copies when unset
    pub rewrite_server: Option<String>,
    /// Active probe; skipped when unset
    pub probe: Option<ProbeConfig>,
    /// Client log with delay-test results
    pub test_log: Option<PathBuf>,
}

impl Default for CuratorConfig {
    fn default() -> Self {
        Self {
            ports: vec![80, 443],
            rewrite_server: None,
            probe: None,
            test_log: None,
        }
    }
}

/// Builder for CuratorConfig
#[derive(Debug, Clone, Default)]
pub struct CuratorConfigBuilder {
    config: CuratorConfig,
}

impl CuratorConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ports(mut self, ports: Vec<u16>) -> Self {
        self.config.ports = ports;
        self
    }

    pub fn rewrite_server(mut self, server: Option<String>) -> Self {
        self.config.rewrite_server = server.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn probe(mut self, probe: Option<ProbeConfig>) -> Self {
        self.config.probe = probe;
        self
    }

    pub fn test_log(mut self, path: Option<PathBuf>) -> Self {
        self.config.test_log = path;
        self
    }

    /// Build the final configuration
    pub fn build(mut self) -> CuratorConfig {
        let mut seen = Vec::with_capacity(self.config.ports.len());
        self.config.ports.retain(|port| {
            if *port == 0 || seen.contains(port) {
                return false;
            }
            seen.push(*port);
            true
        });
        self.config
    }
}

/// The records of the curated set that listen on one port.
#[derive(Debug, Clone)]
pub struct PortPartition {
    pub port: u16,
    pub proxies: ProxySet,
    /// Same records pointed at the rewrite server
    pub rewritten: Option<ProxySet>,
}

/// Result of a curation run
#[derive(Debug, Clone)]
pub struct CurationOutcome {
    /// The curated set
    pub proxies: ProxySet,
    /// What was loaded before the run, if anything
    pub loaded: Option<ProxySet>,
    /// Some subscription name was absent from the loaded set
    pub has_new_entries: bool,
    /// Names of subscription records whose content is not in the loaded set
    pub changed: Vec<String>,
    pub parse_report: ParseReport,
    pub rejections: Vec<NormalizeRejection>,
    /// Names removed because the test log reported them dead
    pub dead_removed: Vec<String>,
    pub probe_report: Option<ProbeReport>,
    pub partitions: Vec<PortPartition>,
}

impl CurationOutcome {
    /// True iff the curated set is non-empty and differs from the loaded one.
    pub fn should_write(&self) -> bool {
        if self.proxies.is_empty() {
            return false;
        }
        match &self.loaded {
            Some(loaded) => loaded != &self.proxies,
            None => true,
        }
    }
}

/// File names for a subscription's outputs, all under one directory.
///
/// For stem `owner_repo`: `owner_repo_proxies.yaml`,
/// `owner_repo_proxies_port_443.yaml` and `owner_repo_proxies_updated_443.yaml`.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    dir: PathBuf,
    stem: String,
}

impl OutputLayout {
    pub fn new(dir: impl Into<PathBuf>, stem: &str) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn proxies(&self) -> PathBuf {
        self.dir.join(format!("{}_proxies.yaml", self.stem))
    }

    pub fn port(&self, port: u16) -> PathBuf {
        self.dir.join(format!("{}_proxies_port_{}.yaml", self.stem, port))
    }

    pub fn rewritten(&self, port: u16) -> PathBuf {
        self.dir.join(format!("{}_proxies_updated_{}.yaml", self.stem, port))
    }
}

/// What [`Curator::persist`] wrote.
#[derive(Debug, Clone, Default)]
pub struct PersistReport {
    pub written: Vec<PathBuf>,
    pub backups: Vec<PathBuf>,
    /// Outputs left alone because their set was empty
    pub skipped: Vec<PathBuf>,
}

impl PersistReport {
    fn record(&mut self, path: PathBuf, outcome: SaveOutcome) {
        match outcome {
            SaveOutcome::Written { backup } => {
                self.backups.extend(backup);
                self.written.push(path);
            }
            SaveOutcome::NothingToSave => self.skipped.push(path),
        }
    }
}

/// Runs the curation pipeline for one subscription.
///
/// Load existing, parse, normalize, merge, drop log-dead records, optionally
/// probe, then partition by port and rewrite the copies.
#[derive(Debug, Clone, Default)]
pub struct Curator {
    config: CuratorConfig,
}

impl Curator {
    pub fn new(config: CuratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CuratorConfig {
        &self.config
    }

    /// Curate a raw subscription body against what `store` holds.
    ///
    /// An unreadable or unparseable stored set aborts the run.
    pub fn curate_store<S: ProxyStore>(&self, store: &S, body: &str) -> Result<CurationOutcome> {
        let existing = store.load()?;
        self.curate(existing, body)
    }

    /// Curate with the dead set read from the configured test log.
    pub fn curate(&self, existing: Option<ProxySet>, body: &str) -> Result<CurationOutcome> {
        let dead = load_dead_names(self.config.test_log.as_deref());
        self.curate_with(existing, body, &dead, |_, _| {})
    }

    /// Curate with an explicit dead set; `on_probe` sees every probed record.
    pub fn curate_with<F>(
        &self,
        existing: Option<ProxySet>,
        body: &str,
        dead: &DeadNameSet,
        on_probe: F,
    ) -> Result<CurationOutcome>
    where
        F: FnMut(&ProxyRecord, Option<&ProbeResult>),
    {
        let base = existing.clone().unwrap_or_default();
        debug!("Starting from {} existing proxies", base.len());

        let parsed = parse_subscription_body(body);
        let (incoming, rejections) = normalize_nodes(parsed.proxies);

        let changed: Vec<String> = content_diff(&incoming, &base)
            .into_iter()
            .map(|record| record.name.clone())
            .collect();
        if changed.is_empty() {
            info!("No changes detected in the proxies");
        } else {
            info!("{} proxies are new or changed", changed.len());
        }

        let outcome = merge(&incoming, &base);
        let mut proxies = outcome.merged;

        let dead_removed = remove_dead(&mut proxies, dead);

        let probe_report = match &self.config.probe {
            Some(config) => {
                let probe = ActiveProbe::new(config.clone())?;
                let report = probe.probe_set(&proxies, on_probe);
                proxies = report.reachable.clone();
                Some(report)
            }
            None => None,
        };

        let partitions = self.partition(&proxies);

        info!(
            "Curated {} proxies: {} parsed, {} rejected, {} unsupported, {} without servername, {} dead{}",
            proxies.len(),
            incoming.len() + rejections.len(),
            parsed.report.rejected(),
            parsed.report.skipped,
            rejections.len(),
            dead_removed.len(),
            probe_report
                .as_ref()
                .map(|r| format!(
                    ", {} unreachable, {} invalid",
                    r.unreachable.len(),
                    r.invalid.len()
                ))
                .unwrap_or_default()
        );

        Ok(CurationOutcome {
            proxies,
            loaded: existing,
            has_new_entries: outcome.has_new_entries,
            changed,
            parse_report: parsed.report,
            rejections,
            dead_removed,
            probe_report,
            partitions,
        })
    }

    /// Split a set by the configured ports.
    pub fn partition(&self, proxies: &ProxySet) -> Vec<PortPartition> {
        self.config
            .ports
            .iter()
            .map(|&port| {
                let subset = proxies.filter_by_port(port);
                let rewritten = self
                    .config
                    .rewrite_server
                    .as_deref()
                    .map(|server| subset.with_server(server));
                debug!("{} proxies on port {}", subset.len(), port);
                PortPartition {
                    port,
                    proxies: subset,
                    rewritten,
                }
            })
            .collect()
    }

    /// Write the curated set to `store` and the partitions per `layout`.
    ///
    /// Nothing is written unless [`CurationOutcome::should_write`] holds.
    pub fn persist<S: ProxyStore>(
        &self,
        outcome: &CurationOutcome,
        store: &S,
        store_path: &Path,
        layout: &OutputLayout,
    ) -> Result<PersistReport> {
        let mut report = PersistReport::default();
        if !outcome.should_write() {
            info!("Nothing to write");
            return Ok(report);
        }

        report.record(store_path.to_path_buf(), store.save(&outcome.proxies)?);

        for partition in &outcome.partitions {
            let path = layout.port(partition.port);
            let saved = FileStore::new(&path).save(&partition.proxies)?;
            report.record(path, saved);

            if let Some(rewritten) = &partition.rewritten {
                let path = layout.rewritten(partition.port);
                let saved = FileStore::new(&path).save(rewritten)?;
                report.record(path, saved);
            }
        }

        if !report.skipped.is_empty() {
            warn!("{} outputs had no proxies and were not written", report.skipped.len());
        }
        Ok(report)
    }
}

/// Drop every record named in `dead`, returning the removed names.
pub fn remove_dead(proxies: &mut ProxySet, dead: &DeadNameSet) -> Vec<String> {
    if dead.is_empty() {
        return Vec::new();
    }

    let removed: Vec<String> = proxies
        .names()
        .filter(|name| dead.contains(name))
        .map(str::to_string)
        .collect();
    for name in &removed {
        debug!("Removing dead proxy {}", name);
        proxies.remove(name);
    }

    info!("Removed {} dead proxies", removed.len());
    removed
}
