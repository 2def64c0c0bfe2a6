//! bloomd-cli - Command-line client for bloomd
//!
//! Connects to a bloomd server, runs a single command and prints the result.

use anyhow::{bail, Context};
use bloomd_client::{BloomdClient, CreateFilterArgs, Lookup};
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Client configuration
struct Config {
    /// Server host
    host: String,
    /// Server port
    port: u16,
    /// Connect timeout
    timeout: Duration,
    /// Command name followed by its arguments
    command: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: bloomd_client::DEFAULT_HOST.to_string(),
            port: bloomd_client::DEFAULT_PORT,
            timeout: Duration::from_millis(2000),
            command: Vec::new(),
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    config.host = option_value(&args, i, "--host").to_string();
                    i += 2;
                }
                "--port" | "-p" => {
                    config.port = option_value(&args, i, "--port").parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid port number");
                        std::process::exit(1);
                    });
                    i += 2;
                }
                "--timeout" | "-t" => {
                    let millis: u64 =
                        option_value(&args, i, "--timeout").parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid timeout, expected milliseconds");
                            std::process::exit(1);
                        });
                    config.timeout = Duration::from_millis(millis);
                    i += 2;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("bloomd-cli version {}", bloomd_client::VERSION);
                    std::process::exit(0);
                }
                arg if arg.starts_with('-') => {
                    eprintln!("Unknown argument: {}", arg);
                    print_help();
                    std::process::exit(1);
                }
                _ => {
                    config.command = args[i..].to_vec();
                    break;
                }
            }
        }

        if config.command.is_empty() {
            eprintln!("Error: no command given");
            print_help();
            std::process::exit(1);
        }

        config
    }

    /// Returns the server address as a string
    fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn option_value<'a>(args: &'a [String], i: usize, name: &str) -> &'a str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            eprintln!("Error: {} requires a value", name);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"
bloomd-cli - Command-line client for the bloomd bloom filter server

USAGE:
    bloomd-cli [OPTIONS] <COMMAND> [ARGS...]

OPTIONS:
    -h, --host <HOST>       Server host (default: 127.0.0.1)
    -p, --port <PORT>       Server port (default: 8673)
    -t, --timeout <MS>      Connect timeout in milliseconds (default: 2000)
    -v, --version           Print version information
        --help              Print this help message

COMMANDS:
    list [PREFIX]
    create <NAME> [capacity=N] [prob=F] [in_memory=0|1]
    drop <NAME>
    close <NAME>
    clear <NAME>
    flush <NAME>
    check <NAME> <KEY>
    set <NAME> <KEY>
    multi <NAME> <KEY>...
    bulk <NAME> <KEY>...
    info <NAME>

EXAMPLES:
    bloomd-cli create users capacity=1000000 prob=0.001
    bloomd-cli bulk users alice bob
    bloomd-cli --port 8674 multi users alice carol

LOGGING:
    Set RUST_LOG (for example RUST_LOG=debug) to see connection logs.
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Logs go to stderr so they never mix with command output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let addr = config.server_address();
    let client = BloomdClient::connect(&addr, config.timeout)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;
    debug!(conn = client.id(), peer = %client.peer(), "Running command");

    let result = run(&client, &config.command).await;
    client.disconnect();
    result
}

/// Runs one command and prints its result
async fn run(client: &BloomdClient, command: &[String]) -> anyhow::Result<()> {
    let name = command[0].as_str();
    let args: Vec<&str> = command[1..].iter().map(String::as_str).collect();

    match (name, args.as_slice()) {
        ("list", []) => print_filters(client.list(None)?.await?),
        ("list", [prefix]) => print_filters(client.list(Some(*prefix))?.await?),
        ("create", [filter, options @ ..]) => {
            let args = create_args(filter, options)?;
            println!("{}", client.create_with(args)?.await?);
        }
        ("drop", [filter]) => print_lookup(client.drop(filter)?.await?, |()| "Done".to_string()),
        ("close", [filter]) => print_lookup(client.close(filter)?.await?, |()| "Done".to_string()),
        ("flush", [filter]) => print_lookup(client.flush(filter)?.await?, |()| "Done".to_string()),
        ("clear", [filter]) => print_lookup(client.clear(filter)?.await?, |r| r.to_string()),
        ("info", [filter]) => print_lookup(client.info(filter)?.await?, |info| info.to_string()),
        ("check" | "c", [filter, key]) => println!("{}", client.check(filter, key)?.await?),
        ("set" | "s", [filter, key]) => println!("{}", client.set(filter, key)?.await?),
        ("multi" | "m", [filter, keys @ ..]) => {
            print_lookup(client.multi(filter, keys.iter().copied())?.await?, join_states)
        }
        ("bulk" | "b", [filter, keys @ ..]) => {
            print_lookup(client.bulk(filter, keys.iter().copied())?.await?, join_states)
        }
        _ => bail!(
            "unknown command or wrong number of arguments: {} (see --help)",
            command.join(" ")
        ),
    }

    Ok(())
}

/// Builds create arguments from `key=value` options
fn create_args(filter: &str, options: &[&str]) -> anyhow::Result<CreateFilterArgs> {
    let mut capacity = None;
    let mut probability = None;
    let mut in_memory = None;

    for option in options {
        let Some((key, value)) = option.split_once('=') else {
            bail!("expected key=value, got {}", option);
        };
        match key {
            "capacity" => capacity = Some(value.parse::<u64>().context("invalid capacity")?),
            "prob" => probability = Some(value.parse::<f64>().context("invalid prob")?),
            "in_memory" => in_memory = Some(value == "1" || value == "true"),
            _ => bail!("unknown create option: {}", key),
        }
    }

    Ok(CreateFilterArgs::new(filter, capacity, probability, in_memory)?)
}

fn print_filters(filters: Vec<bloomd_client::FilterSummary>) {
    for filter in filters {
        println!("{}", filter);
    }
}

fn print_lookup<T>(lookup: Lookup<T>, render: impl FnOnce(T) -> String) {
    match lookup {
        Lookup::Found(value) => println!("{}", render(value)),
        Lookup::FilterNotFound => println!("Filter does not exist"),
    }
}

fn join_states(states: Vec<bloomd_client::StateResult>) -> String {
    states
        .iter()
        .map(|state| state.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
