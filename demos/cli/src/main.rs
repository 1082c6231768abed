//! An interactive line-oriented shell over a [`mk_kernel::Kernel`]:
//! `list`, `reload <name>`, `emit <event> [k=v …]`, `exit`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use mk_kernel::{ConfigLoader, DylibLoader, Kernel};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

/// One line of interactive input, parsed the same way a shell would split
/// argv.
#[derive(Parser, Debug)]
#[command(no_binary_name = true)]
enum Command {
    /// Print every known plugin's name, version, and active state.
    List,
    /// Unload, rescan, and reload `name`, cascading to its dependents.
    Reload { name: String },
    /// Emit `event` with the given `key=value` pairs as its argument map.
    Emit {
        event: String,
        #[arg(value_parser = parse_kv)]
        args: Vec<(String, String)>,
    },
    /// Shut down every active plugin and leave the shell.
    Exit,
}

fn parse_kv(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) => Ok((k.to_string(), v.to_string())),
        None => Err(format!("expected key=value, got '{s}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    mk_kernel::logging::init();

    let config = ConfigLoader::new()
        .with_current_dir()
        .with_user_config_dir()
        .load()?;
    let kernel = Kernel::new(config, Arc::new(DylibLoader::new()));

    if let Err(e) = kernel.init().await {
        error!("fatal init error: {e}");
        std::process::exit(1);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let words = shell_words_lite(line);
        let command = match Command::try_parse_from(words) {
            Ok(c) => c,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match command {
            Command::List => {
                for status in kernel.list() {
                    let state = if status.active { "ACTIVE" } else { "STOPPED" };
                    println!("{} {} {}", status.name, status.version, state);
                }
            }
            Command::Reload { name } => match kernel.reload(&name).await {
                Ok(()) => info!("reloaded '{name}'"),
                Err(e) => println!("reload failed: {e}"),
            },
            Command::Emit { event, args } => {
                let map: serde_json::Map<String, Value> = args
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect();
                let results = kernel
                    .call(&event, Value::Object(map), Duration::from_secs(3))
                    .await;
                for (i, result) in results.into_iter().enumerate() {
                    println!("[{i}] {result:?}");
                }
            }
            Command::Exit => {
                kernel.shutdown().await;
                break;
            }
        }
    }

    Ok(())
}

/// Splits a line into words on whitespace. Good enough for `k=v` pairs and
/// bare identifiers; unlike a real shell it does not honor quoting.
fn shell_words_lite(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}
