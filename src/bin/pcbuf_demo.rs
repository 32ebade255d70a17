//! Producer/consumer demo over a bounded buffer.
//!
//! Usage: `pcbuf-demo [MODE] [PRODUCERS] [CONSUMERS] [-v]`, where `MODE` is
//! `channel` (alias `blocking`) or `monitor` (alias `wait`).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde_json::json;

use pcbuf::logging::init_logger;
use pcbuf::{HarnessConfig, NotificationBus, SnapshotStore, Strategy};

#[derive(Debug, Parser)]
#[command(name = "pcbuf-demo")]
#[command(about = "Run producers and consumers against a shared bounded buffer")]
struct Args {
    /// Buffer strategy: channel|blocking or monitor|wait.
    #[arg(value_parser = parse_strategy)]
    mode: Option<Strategy>,

    /// Number of producer threads.
    producers: Option<usize>,

    /// Number of consumer threads.
    consumers: Option<usize>,

    /// Buffer capacity.
    #[arg(long)]
    capacity: Option<usize>,

    /// Sentinel value that stops a consumer.
    #[arg(long, allow_hyphen_values = true)]
    sentinel: Option<i64>,

    /// Comma-separated source items.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    source: Option<Vec<i64>>,

    /// TOML file with a full harness configuration; flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Capture a snapshot after every consumed item.
    #[arg(long)]
    trace_snapshots: bool,

    /// Print the report, snapshots and event log as JSON.
    #[arg(long)]
    json: bool,

    /// Echo every change notification.
    #[arg(short, long)]
    verbose: bool,
}

fn parse_strategy(s: &str) -> Result<Strategy, String> {
    s.parse()
}

impl Args {
    fn into_config(self) -> Result<(HarnessConfig, bool), pcbuf::ConfigError> {
        let mut cfg = match &self.config {
            Some(path) => HarnessConfig::from_toml_file(path)?,
            None => HarnessConfig::default(),
        };
        if let Some(mode) = self.mode {
            cfg.buffer.strategy = mode;
        }
        if let Some(n) = self.producers {
            cfg.producers = n;
        }
        if let Some(n) = self.consumers {
            cfg.consumers = n;
        }
        if let Some(c) = self.capacity {
            cfg.buffer.capacity = c;
        }
        if let Some(s) = self.sentinel {
            cfg.sentinel = s;
        }
        if let Some(src) = self.source {
            cfg.source = src;
        }
        cfg.verbose |= self.verbose;
        cfg.trace_snapshots |= self.trace_snapshots;
        Ok((cfg, self.json))
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logger(args.verbose);

    let (cfg, as_json) = match args.into_config() {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(error = %e, "configuration rejected");
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    match cfg.buffer.strategy {
        Strategy::Channel => println!("Using channel (blocking queue) implementation"),
        Strategy::Monitor => println!("Using monitor (wait/notify) implementation"),
    }

    let bus = Arc::new(NotificationBus::new());
    let store = Arc::new(SnapshotStore::new());

    let report = match pcbuf::harness::run(&cfg, &bus, &store) {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if as_json {
        let doc = json!({
            "report": report,
            "snapshots": store.replay().iter().map(|s| s.as_ref()).collect::<Vec<_>>(),
            "event_log": bus.event_log(),
        });
        match serde_json::to_string_pretty(&doc) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("error: failed to encode report: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("Destination container: {:?}", report.destination);
        for snapshot in store.replay() {
            tracing::debug!("{snapshot}");
        }
    }

    ExitCode::SUCCESS
}
