//! PLANit engine simulator binary.
//!
//! Accepts the engine launch signature (`<jvm options> -cp <classpath> <entry
//! class>`), starts a gateway server on a local port, prints the readiness line
//! on stdout and serves until it receives `gateway.shutdown` or Ctrl+C.

use anyhow::Result;
use clap::Parser;
use planit_core::gateway::GatewayServer;
use planit_core::GatewayConfig;
use planit_engine_sim::SimEngine;
use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "planit-engine-sim")]
#[command(about = "In-memory PLANit engine speaking the gateway protocol")]
struct Args {
    /// Entry point class requested by the launcher
    entry_class: Option<String>,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Delay before the readiness line is printed
    #[arg(long, default_value = "0")]
    ready_delay_ms: u64,

    /// Exit with this status before becoming ready
    #[arg(long)]
    exit_before_ready: Option<i32>,
}

/// Launch arguments split into JVM-style options, classpath and the rest.
#[derive(Debug, Default)]
struct LaunchLine {
    jvm_options: Vec<String>,
    classpath: Option<String>,
    rest: Vec<String>,
}

fn split_launch_line(argv: impl IntoIterator<Item = String>) -> LaunchLine {
    let mut line = LaunchLine::default();
    let mut argv = argv.into_iter();
    while let Some(arg) = argv.next() {
        if arg == "-cp" || arg == "-classpath" {
            line.classpath = argv.next();
        } else if arg.starts_with('-') && !arg.starts_with("--") && arg.len() > 2 {
            line.jvm_options.push(arg);
        } else {
            line.rest.push(arg);
        }
    }
    line
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut argv = std::env::args();
    let program = argv.next().unwrap_or_else(|| "planit-engine-sim".to_string());
    let line = split_launch_line(argv);
    let args = Args::parse_from(std::iter::once(program).chain(line.rest));

    // stdout carries the readiness line; logs go to stderr
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    info!(
        "Starting engine simulator (entry: {}, classpath: {}, jvm options: {:?})",
        args.entry_class.as_deref().unwrap_or("<none>"),
        line.classpath.as_deref().unwrap_or("<none>"),
        line.jvm_options
    );

    if let Some(status) = args.exit_before_ready {
        warn!("Exiting with status {} before becoming ready", status);
        std::process::exit(status);
    }
    if args.ready_delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(args.ready_delay_ms)).await;
    }

    let engine = Arc::new(SimEngine::new());
    let mut server = GatewayServer::start_on(SocketAddr::new(args.host, 0), engine.clone()).await?;

    // Readiness line read by the supervisor (intentional stdout)
    println!("{}{}", GatewayConfig::READY_LINE_PREFIX, server.port);
    std::io::stdout().flush()?;

    tokio::select! {
        _ = engine.wait_for_shutdown() => {
            info!("Shutdown request received, exiting");
            // let the shutdown response reach the client
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutdown signal received, exiting");
        }
    }

    server.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_split_launch_line() {
        let line = split_launch_line(owned(&[
            "-Xmx2g",
            "--ready-delay-ms",
            "10",
            "-cp",
            "a.jar:b.jar",
            "org.planit.python.PLANitJ2Py",
        ]));

        assert_eq!(line.jvm_options, vec!["-Xmx2g"]);
        assert_eq!(line.classpath.as_deref(), Some("a.jar:b.jar"));
        assert_eq!(
            line.rest,
            owned(&["--ready-delay-ms", "10", "org.planit.python.PLANitJ2Py"])
        );
    }

    #[test]
    fn test_short_flags_reach_clap() {
        let line = split_launch_line(owned(&["-d", "org.planit.python.PLANitJ2Py"]));
        let args = Args::parse_from(std::iter::once("sim".to_string()).chain(line.rest));

        assert!(args.debug);
        assert_eq!(args.entry_class.as_deref(), Some("org.planit.python.PLANitJ2Py"));
    }
}
