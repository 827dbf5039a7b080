use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};

use subcurator::interfaces::{
    remove_dead, CurationOutcome, Curator, CuratorConfigBuilder, OutputLayout,
};
use subcurator::liveness::{load_dead_names, ActiveProbe, ProbeAddress, ProbeConfig};
use subcurator::models::{content_diff, merge, ProxySet};
use subcurator::parser::normalize_nodes;
use subcurator::utils::string::decode_text;
use subcurator::utils::{subscription_file_stem, web_get, FileStore, HttpConfig, ProxyStore};
use subcurator::CuratorSettings;

/// Curate proxy sets from vmess subscriptions
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (TOML or YAML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a subscription and write its proxy files when they changed
    Convert {
        /// Subscription URL or local file
        source: String,

        /// Output directory
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Server written into the per-port copies
        #[arg(long, value_name = "ADDRESS")]
        rewrite_server: Option<String>,

        /// Client test log; proxies it reports dead are dropped
        #[arg(long, value_name = "FILE")]
        log: Option<PathBuf>,

        /// Probe every proxy and keep the reachable ones
        #[arg(long)]
        probe: bool,
    },

    /// Merge NEW into OLD by name, rewriting OLD only if new names appeared
    Merge {
        new: PathBuf,
        old: PathBuf,
    },

    /// Drop proxies reported dead in LOG and fill in missing server names
    Clean {
        proxies: PathBuf,
        log: Option<PathBuf>,
    },

    /// Keep only the proxies that accept a TCP connection
    Probe {
        proxies: PathBuf,

        /// Connect timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Dial `servername` instead of `server`
        #[arg(long)]
        servername: bool,
    },

    /// Curate every subscription listed in the configuration file
    Run,
}

fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::init_from_env(Env::default().default_filter_or(default_filter));

    if let Err(e) = run(args) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let settings = match &args.config {
        Some(path) => CuratorSettings::load_from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => CuratorSettings::default(),
    };

    match args.command {
        Command::Convert {
            source,
            output,
            rewrite_server,
            log,
            probe,
        } => {
            let mut settings = settings;
            if let Some(dir) = output {
                settings.output.dir = dir;
            }
            if rewrite_server.is_some() {
                settings.output.rewrite_server = rewrite_server;
            }
            if log.is_some() {
                settings.logs.test_log = log;
            }
            settings.probe.enabled |= probe;
            convert(&settings, &source)
        }
        Command::Merge { new, old } => merge_files(&new, &old),
        Command::Clean { proxies, log } => {
            let log = log.or(settings.logs.test_log);
            clean_file(&proxies, log.as_deref())
        }
        Command::Probe {
            proxies,
            timeout,
            servername,
        } => {
            let mut config = settings.probe.to_config();
            if let Some(secs) = timeout {
                config.timeout = Duration::from_secs(secs.max(1));
            }
            if servername {
                config.address = ProbeAddress::Servername;
            }
            probe_file(&proxies, config)
        }
        Command::Run => {
            if args.config.is_none() {
                bail!("run needs a configuration file, pass it with -c");
            }
            if settings.subscriptions.is_empty() {
                warn!("No subscriptions configured");
            }
            let mut failed = 0;
            for source in &settings.subscriptions {
                if let Err(e) = convert(&settings, source) {
                    error!("Failed to curate {}: {:#}", source, e);
                    failed += 1;
                }
            }
            if failed > 0 {
                bail!("{} of {} subscriptions failed", failed, settings.subscriptions.len());
            }
            Ok(())
        }
    }
}

/// Read a subscription body and the stem its outputs are named after.
fn read_source(source: &str, settings: &CuratorSettings) -> Result<(String, String)> {
    let path = Path::new(source);
    if path.is_file() {
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", source))?;
        let (body, encoding) = decode_text(&bytes);
        info!("Read {} as {:?}", source, encoding);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "subscription".to_string());
        return Ok((body, stem));
    }

    let stem = subscription_file_stem(source)?;
    let http = HttpConfig {
        proxy: settings.http.proxy.clone(),
        timeout: Duration::from_secs(settings.http.timeout_secs),
    };
    info!("Fetching subscription from {}", source);
    let body = web_get(source, &http)?;
    Ok((body, stem))
}

fn convert(settings: &CuratorSettings, source: &str) -> Result<()> {
    let (body, stem) = read_source(source, settings)?;
    let layout = OutputLayout::new(&settings.output.dir, &stem);
    let store = FileStore::new(layout.proxies());

    let curator = Curator::new(
        CuratorConfigBuilder::new()
            .ports(settings.output.ports.clone())
            .rewrite_server(settings.output.rewrite_server.clone())
            .probe(settings.probe.enabled.then(|| settings.probe.to_config()))
            .test_log(settings.logs.test_log.clone())
            .build(),
    );

    let existing = store
        .load()
        .with_context(|| format!("Failed to load {}", layout.proxies().display()))?;
    let dead = load_dead_names(curator.config().test_log.as_deref());

    // Set size is unknown until after the merge.
    let spinner = curator.config().probe.as_ref().map(|_| ProgressBar::new_spinner());
    let outcome = curator.curate_with(existing, &body, &dead, |record, _| {
        if let Some(spinner) = &spinner {
            spinner.set_message(record.name.clone());
            spinner.inc(1);
        }
    })?;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    print_summary(source, &outcome);

    let report = curator.persist(&outcome, &store, &layout.proxies(), &layout)?;
    for path in &report.written {
        println!("Wrote {}", path.display());
    }
    Ok(())
}

fn print_summary(source: &str, outcome: &CurationOutcome) {
    println!("{}", source);
    println!("  proxies:            {}", outcome.proxies.len());
    println!("  new or changed:     {}", outcome.changed.len());
    println!("  rejected:           {}", outcome.parse_report.rejected());
    println!("  unsupported:        {}", outcome.parse_report.skipped);
    println!("  no servername:      {}", outcome.rejections.len());
    println!("  dead in log:        {}", outcome.dead_removed.len());
    if let Some(probe) = &outcome.probe_report {
        println!("  unreachable:        {}", probe.unreachable.len());
    }
    for partition in &outcome.partitions {
        println!("  port {:<5}          {}", partition.port, partition.proxies.len());
    }
}

fn merge_files(new: &Path, old: &Path) -> Result<()> {
    let incoming = FileStore::new(new).load_required()?;
    let store = FileStore::new(old);
    let existing = store.load_required()?;

    let outcome = merge(&incoming, &existing);
    if !outcome.has_new_entries {
        println!("No new proxies to merge. The existing file remains unchanged.");
        return Ok(());
    }

    let added = content_diff(&incoming, &existing);
    store.save(&outcome.merged)?;
    println!("Total number of new proxies: {}", added.len());
    println!(
        "Proxies from {} have been merged into {} without duplicates.",
        new.display(),
        old.display()
    );
    Ok(())
}

fn clean_file(path: &Path, log: Option<&Path>) -> Result<()> {
    let store = FileStore::new(path);
    let mut proxies = store.load_required()?;
    let before = proxies.len();

    let dead = load_dead_names(log);
    let removed = remove_dead(&mut proxies, &dead);
    let (proxies, rejected) = normalize_nodes(proxies);

    println!(
        "Removed {} dead and {} unusable proxies, {} of {} left",
        removed.len(),
        rejected.len(),
        proxies.len(),
        before
    );
    store.save(&proxies)?;
    Ok(())
}

fn probe_file(path: &Path, config: ProbeConfig) -> Result<()> {
    let store = FileStore::new(path);
    let proxies = store.load_required()?;
    let probe = ActiveProbe::new(config)?;

    let bar = progress_bar(proxies.len() as u64);
    let report = probe.probe_set(&proxies, |record, _| {
        bar.set_message(record.name.clone());
        bar.inc(1);
    });
    bar.finish_and_clear();

    for result in &report.results {
        let status = if result.reachability.is_reachable() {
            "reachable"
        } else {
            "unreachable"
        };
        println!(
            "{:<40} {:>21}  {}",
            result.name,
            format!("{}:{}", result.address, result.port),
            status
        );
    }
    for name in &report.invalid {
        println!("{:<40} {:>21}  invalid", name, "-");
    }

    let reachable: ProxySet = report.reachable;
    println!(
        "{} of {} proxies reachable",
        reachable.len(),
        proxies.len()
    );
    store.save(&reachable)?;
    Ok(())
}

fn progress_bar(len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len);
    let style = ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    bar.set_style(style);
    bar
}
