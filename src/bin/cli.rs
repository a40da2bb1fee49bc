//! shardtree CLI
//!
//! Command-line inspector over a storage folder.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use shardtree::{Config, Engine, Entry, Facade, Map, Result, Value};

/// shardtree CLI
#[derive(Parser, Debug)]
#[command(name = "shardtree-cli")]
#[command(about = "Inspect and edit a shardtree storage folder")]
struct Args {
    /// Storage folder
    #[arg(short, long, default_value = "./data")]
    folder: String,

    /// Shard subdirectory depth for new files
    #[arg(short, long, default_value_t = 2)]
    depth: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the value at a path
    Get {
        /// Slash-separated key path
        path: String,
    },

    /// Store a value at a path, creating missing levels
    Set {
        /// Slash-separated key path
        path: String,

        /// null, true/false, a number, or a string
        value: String,
    },

    /// Delete the value at a path
    Del {
        /// Slash-separated key path
        path: String,
    },

    /// List keys at a path (root when omitted)
    Keys {
        /// Slash-separated key path
        path: Option<String>,
    },

    /// Print cache occupancy
    Stats,

    /// Remove empty shard directories
    Prune,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,shardtree=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = Config::builder()
        .folder(&args.folder)
        .depth(args.depth)
        .build();
    let engine = Engine::open(config)?;

    match args.command {
        Commands::Get { path } => {
            let (parent, key) = split(&path)?;
            match locate(&engine, &parent)? {
                Some(level) => match level.value(key)? {
                    Some(value) => println!("{}", value),
                    None => println!("(nil)"),
                },
                None => println!("(nil)"),
            }
        }
        Commands::Set { path, value } => {
            let (parent, key) = split(&path)?;
            let level = create_path(&engine, &parent)?;
            if level.set(key, parse_value(&value))? {
                println!("OK");
            } else {
                println!("(not stored)");
            }
        }
        Commands::Del { path } => {
            let (parent, key) = split(&path)?;
            let removed = match locate(&engine, &parent)? {
                Some(level) => level.delete(key)?,
                None => false,
            };
            println!("{}", if removed { "1" } else { "0" });
        }
        Commands::Keys { path } => {
            let segments = segments(path.as_deref().unwrap_or(""));
            if let Some(level) = locate(&engine, &segments)? {
                for key in level.keys()? {
                    println!("{}", key);
                }
            }
        }
        Commands::Stats => {
            let memory = engine.memory();
            for (name, stats) in [
                ("maps", memory.maps),
                ("nodes", memory.nodes),
                ("flows", memory.flows),
            ] {
                println!(
                    "{:<6} used={} limit={} count={} pinned={}",
                    name, stats.used, stats.limit, stats.count, stats.pinned
                );
            }
        }
        Commands::Prune => {
            println!("removed {} directories", engine.prune());
        }
    }

    engine.close();
    Ok(())
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn split(path: &str) -> Result<(Vec<&str>, &str)> {
    let mut parts = segments(path);
    let key = parts
        .pop()
        .ok_or_else(|| shardtree::TreeError::NotFound("empty path".to_string()))?;
    Ok((parts, key))
}

fn locate(engine: &Engine, path: &[&str]) -> Result<Option<Facade>> {
    engine.navigate(path)
}

/// Walk `path`, forging an empty map for every missing or literal step
fn create_path(engine: &Engine, path: &[&str]) -> Result<Facade> {
    let mut level = engine.root();
    for key in path {
        level = match level.get(key)? {
            Some(Entry::Node(child)) => child,
            _ => {
                level.set(key, Value::Map(Map::new()))?;
                level.child(key)?.ok_or_else(|| {
                    shardtree::TreeError::NotFound(format!("could not create '{}'", key))
                })?
            }
        };
    }
    Ok(level)
}

fn parse_value(raw: &str) -> Value {
    match raw {
        "null" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => raw
            .parse::<i64>()
            .map(Value::Int)
            .or_else(|_| raw.parse::<f64>().map(Value::Float))
            .unwrap_or_else(|_| Value::Str(raw.to_string())),
    }
}
