//! bems-monitor entry point: CLI wiring, logging, and the refresh loop.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use bems_monitor::analytics::{Bucket, Reduction};
use bems_monitor::config::MonitorConfig;
use bems_monitor::ingest::Source;
use bems_monitor::io::export::export_csv;
use bems_monitor::monitor::{Monitor, Snapshot, ViewState};
use bems_monitor::reading::{Field, Node};

/// Parsed CLI arguments.
struct CliArgs {
    config_path: Option<String>,
    preset: Option<String>,
    csv_file: Option<PathBuf>,
    watch: bool,
    view: ViewState,
    show_series: bool,
    export: Option<PathBuf>,
    relay: Option<String>,
    relay_state: Option<bool>,
    #[cfg(feature = "api")]
    serve: bool,
    #[cfg(feature = "api")]
    port: u16,
}

fn print_help() {
    eprintln!("bems-monitor: building energy monitor and relay controller");
    eprintln!();
    eprintln!("Usage: bems-monitor [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>          Load configuration from a TOML file");
    eprintln!("  --preset <name>          Use a built-in preset (single_node, three_node)");
    eprintln!("  --csv-file <path>        Read readings from a local CSV instead of the sheet URL");
    eprintln!("  --watch                  Keep refreshing on the configured interval");
    eprintln!("  --bucket <name>          Series bucket: raw, hour, day, week, month");
    eprintln!("  --field <name>           Series field: voltage, current, power, energy, temperature");
    eprintln!("  --node <name>            Series node: main, essential, non_essential");
    eprintln!("  --reduction <name>       Series reduction: sum, mean, max, min");
    eprintln!("  --export <path>          Write the selected series to CSV");
    eprintln!("  --relay <id>             Switch a configured relay (requires --state)");
    eprintln!("  --state <on|off>         Desired relay state");
    #[cfg(feature = "api")]
    {
        eprintln!("  --serve                  Start the REST API and keep refreshing");
        eprintln!("  --port <u16>             API server port (default: 3000)");
    }
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("If no --config or --preset is given, the single_node preset is used.");
    eprintln!("Set RUST_LOG to adjust log verbosity (default: info).");
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("error: {msg}");
    process::exit(1);
}

/// Returns the value following flag `name`, exiting if it is missing.
fn value(args: &[String], i: &mut usize, name: &str, what: &str) -> String {
    *i += 1;
    match args.get(*i) {
        Some(v) => v.clone(),
        None => fail(format!("{name} requires {what}")),
    }
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        config_path: None,
        preset: None,
        csv_file: None,
        watch: false,
        view: ViewState::default(),
        show_series: false,
        export: None,
        relay: None,
        relay_state: None,
        #[cfg(feature = "api")]
        serve: false,
        #[cfg(feature = "api")]
        port: 3000,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--config" => cli.config_path = Some(value(&args, &mut i, "--config", "a path argument")),
            "--preset" => cli.preset = Some(value(&args, &mut i, "--preset", "a name argument")),
            "--csv-file" => {
                cli.csv_file = Some(PathBuf::from(value(&args, &mut i, "--csv-file", "a path argument")));
            }
            "--watch" => cli.watch = true,
            "--bucket" => {
                let v = value(&args, &mut i, "--bucket", "a bucket name");
                cli.view.bucket = v.parse::<Bucket>().unwrap_or_else(|e| fail(e));
                cli.show_series = true;
            }
            "--field" => {
                let v = value(&args, &mut i, "--field", "a field name");
                cli.view.field = v.parse::<Field>().unwrap_or_else(|e| fail(e));
                cli.show_series = true;
            }
            "--node" => {
                let v = value(&args, &mut i, "--node", "a node name");
                cli.view.node = v.parse::<Node>().unwrap_or_else(|e| fail(e));
                cli.show_series = true;
            }
            "--reduction" => {
                let v = value(&args, &mut i, "--reduction", "a reduction name");
                cli.view.reduction = Some(v.parse::<Reduction>().unwrap_or_else(|e| fail(e)));
                cli.show_series = true;
            }
            "--export" => {
                cli.export = Some(PathBuf::from(value(&args, &mut i, "--export", "a path argument")));
            }
            "--relay" => cli.relay = Some(value(&args, &mut i, "--relay", "a device id")),
            "--state" => {
                let v = value(&args, &mut i, "--state", "on or off");
                cli.relay_state = Some(match v.to_ascii_lowercase().as_str() {
                    "on" | "true" | "1" => true,
                    "off" | "false" | "0" => false,
                    _ => fail(format!("--state value \"{v}\" must be on or off")),
                });
            }
            #[cfg(feature = "api")]
            "--serve" => cli.serve = true,
            #[cfg(feature = "api")]
            "--port" => {
                let v = value(&args, &mut i, "--port", "a u16 argument");
                cli.port = v
                    .parse::<u16>()
                    .unwrap_or_else(|_| fail(format!("--port value \"{v}\" is not a valid u16")));
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    if cli.relay.is_some() != cli.relay_state.is_some() {
        fail("--relay and --state must be given together");
    }
    cli
}

fn load_config(cli: &CliArgs) -> MonitorConfig {
    let config = if let Some(ref path) = cli.config_path {
        MonitorConfig::from_toml_file(Path::new(path))
    } else if let Some(ref name) = cli.preset {
        MonitorConfig::from_preset(name)
    } else {
        Ok(MonitorConfig::single_node())
    };
    let config = config.unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }
    config
}

fn print_series(snapshot: &Snapshot, view: &ViewState, export: Option<&Path>) {
    let points = snapshot
        .table
        .as_ref()
        .map(|t| view.series(t))
        .unwrap_or_default();

    println!("--- {} ---", view.title());
    if points.is_empty() {
        println!("no data for this selection");
    }
    for p in &points {
        println!(
            "{}  {:>12.4} {}  ({} samples)",
            p.bucket_start,
            p.value,
            view.field.unit(),
            p.samples
        );
    }

    if let Some(path) = export {
        match export_csv(&points, view.field, path) {
            Ok(()) => info!(path = %path.display(), points = points.len(), "series exported"),
            Err(e) => error!(path = %path.display(), error = %e, "failed to write CSV"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() {
    let cli = parse_args();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let config = load_config(&cli);
    let source = match (&cli.csv_file, config.source.url.is_empty()) {
        (Some(path), _) => Source::File(path.clone()),
        (None, false) => Source::Url(config.source.url.clone()),
        (None, true) => fail("no data source: set source.url in the config or pass --csv-file"),
    };
    info!(?source, layout = ?config.source.layout, "starting monitor");

    let monitor = match Monitor::new(config, source) {
        Ok(m) => Arc::new(m),
        Err(e) => fail(e),
    };

    // One-shot relay command.
    if let (Some(id), Some(on)) = (&cli.relay, cli.relay_state) {
        match monitor.switch_relay(id, on).await {
            Ok(outcome) => {
                let verdict = match outcome.confirmed {
                    Some(true) => "confirmed by readings",
                    Some(false) => "NOT reflected in readings",
                    None => "could not be verified",
                };
                println!(
                    "Relay {id} switched {} after {} attempt(s); {verdict}",
                    if on { "on" } else { "off" },
                    outcome.receipt.attempts
                );
            }
            Err(e) => fail(e),
        }
        return;
    }

    let show_series = cli.show_series || cli.export.is_some();
    let report = |snapshot: &Snapshot| {
        println!("{snapshot}\n");
        if show_series {
            print_series(snapshot, &cli.view, cli.export.as_deref());
        }
    };

    #[cfg(feature = "api")]
    if cli.serve {
        use std::net::SocketAddr;

        let state = Arc::new(bems_monitor::api::AppState {
            monitor: Arc::clone(&monitor),
        });
        let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
        let server = tokio::spawn(bems_monitor::api::serve(state, addr, shutdown_signal()));
        monitor.run(shutdown_signal(), report).await;
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "API server failed"),
            Err(e) => error!(error = %e, "API server task panicked"),
        }
        return;
    }

    if cli.watch {
        monitor.run(shutdown_signal(), report).await;
    } else {
        let snapshot = monitor.run_cycle().await;
        report(&snapshot);
    }
}
