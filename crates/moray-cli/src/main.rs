//! moray-cli: one-shot command-line client for memcachedb clusters.
//!
//! Connects to the given servers as a single replication group, runs one
//! command, and prints the result. Intended for debugging and smoke
//! tests, not for scripting hot paths.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use moray_client::{Client, Endpoint, GroupConfig, Options, StoreReply};

/// One-shot client for a memcachedb replication group.
#[derive(Parser)]
#[command(name = "moray-cli", version, about)]
struct Args {
    /// Server endpoint (`host:port[:weight]`). Repeat for replicas.
    #[arg(short, long = "server", default_value = "127.0.0.1:11211")]
    servers: Vec<String>,

    /// Key namespace prefix.
    #[arg(short, long)]
    namespace: Option<String>,

    /// Per-I/O timeout in milliseconds (0 disables).
    #[arg(long, default_value_t = 500)]
    timeout_ms: u64,

    /// Log client internals (equivalent to RUST_LOG=debug).
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

/// The command to run.
#[derive(Subcommand)]
enum Cmd {
    /// Fetch a key.
    Get { key: String },

    /// Store a value.
    Set {
        key: String,
        value: String,

        /// Expiry in seconds (0 = never).
        #[arg(long, default_value_t = 0)]
        exptime: u32,
    },

    /// Remove a key.
    Delete { key: String },

    /// Increment a counter.
    Incr { key: String, amount: u64 },

    /// Decrement a counter.
    Decr { key: String, amount: u64 },

    /// Dump server statistics from every replica.
    Stats,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let parsed: Result<Vec<Endpoint>, _> = args.servers.iter().map(|s| s.parse()).collect();
    let endpoints = match parsed {
        Ok(endpoints) => endpoints,
        Err(e) => {
            eprintln!("{}", format!("error: {e}").red());
            return ExitCode::FAILURE;
        }
    };

    let options = Options {
        namespace: args.namespace.clone(),
        timeout: (args.timeout_ms > 0)
            .then(|| std::time::Duration::from_millis(args.timeout_ms)),
        ..Options::default()
    };

    let client = match Client::connect(vec![GroupConfig::from_endpoints(endpoints)], options)
    {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{}", format!("could not connect: {e}").red());
            return ExitCode::FAILURE;
        }
    };

    match run(&client, &args.cmd) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", format!("error: {e}").red());
            ExitCode::FAILURE
        }
    }
}

fn run(client: &Client, cmd: &Cmd) -> Result<(), moray_client::Error> {
    match cmd {
        Cmd::Get { key } => match client.get(key)? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("{}", "(nil)".dimmed()),
        },
        Cmd::Set {
            key,
            value,
            exptime,
        } => {
            let reply = client.set(key, value.as_bytes(), *exptime)?;
            print_store_reply(reply);
        }
        Cmd::Delete { key } => match client.delete(key)? {
            Some(true) => println!("{}", "DELETED".green()),
            Some(false) => println!("{}", "NOT_FOUND".yellow()),
            None => {}
        },
        Cmd::Incr { key, amount } => print_counter(client.incr(key, *amount)?),
        Cmd::Decr { key, amount } => print_counter(client.decr(key, *amount)?),
        Cmd::Stats => {
            let mut all = client.stats()?.into_iter().collect::<Vec<_>>();
            all.sort_by(|a, b| a.0.cmp(&b.0));
            for (addr, stats) in all {
                println!("{}", addr.bold());
                let mut stats = stats.into_iter().collect::<Vec<_>>();
                stats.sort_by(|a, b| a.0.cmp(&b.0));
                for (name, value) in stats {
                    println!("  {name} {value}");
                }
            }
        }
    }
    Ok(())
}

fn print_store_reply(reply: Option<StoreReply>) {
    match reply {
        Some(StoreReply::Stored) => println!("{}", "STORED".green()),
        Some(other) => println!("{}", other.as_str().yellow()),
        None => {}
    }
}

fn print_counter(value: Option<u64>) {
    match value {
        Some(n) => println!("{n}"),
        None => println!("{}", "NOT_FOUND".yellow()),
    }
}
