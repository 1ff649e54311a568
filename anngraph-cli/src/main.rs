use std::error::Error;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anngraph::{
    AnnError, DistanceType, Engine, Index, IndexConfig, ObjectType, SearchParams,
    DEFAULT_EPSILON, DEFAULT_NUM_THREADS, DEFAULT_SEARCH_SIZE,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "anngraph", about = "Build and query approximate nearest-neighbor indexes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an index from JSON-lines vectors and save it
    Create {
        #[arg(long, env = "ANNGRAPH_PATH")]
        path: PathBuf,
        /// One JSON array of numbers per line
        #[arg(long)]
        input: PathBuf,
        /// Inferred from the first vector when neither this nor --config is given
        #[arg(long, conflicts_with = "config")]
        dimensions: Option<u32>,
        /// camelCase JSON index configuration
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        edge_size_for_creation: Option<i16>,
        #[arg(long)]
        edge_size_for_search: Option<i16>,
        #[arg(long)]
        distance: Option<DistanceType>,
        #[arg(long)]
        object_type: Option<ObjectType>,
        #[arg(long, default_value_t = DEFAULT_NUM_THREADS)]
        threads: u32,
    },
    /// Print the nearest neighbors of a query vector
    Search {
        #[arg(long, env = "ANNGRAPH_PATH")]
        path: PathBuf,
        /// JSON array of numbers
        #[arg(long, allow_hyphen_values = true)]
        query: String,
        #[arg(long, default_value_t = DEFAULT_SEARCH_SIZE)]
        size: usize,
        #[arg(long, default_value_t = DEFAULT_EPSILON)]
        epsilon: f32,
        #[arg(long)]
        radius: Option<f32>,
    },
    /// Print the resolved index property
    Info {
        #[arg(long, env = "ANNGRAPH_PATH")]
        path: PathBuf,
    },
    /// Print a stored object
    Get {
        #[arg(long, env = "ANNGRAPH_PATH")]
        path: PathBuf,
        #[arg(long)]
        id: u32,
    },
    /// Remove an object and save the index
    Remove {
        #[arg(long, env = "ANNGRAPH_PATH")]
        path: PathBuf,
        #[arg(long)]
        id: u32,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Create {
            path,
            input,
            dimensions,
            config,
            edge_size_for_creation,
            edge_size_for_search,
            distance,
            object_type,
            threads,
        } => {
            let objects = read_objects(&input)?;
            let mut index_config = match (config, dimensions) {
                (Some(file), _) => IndexConfig::from_json_str(&std::fs::read_to_string(file)?)?,
                (None, Some(dimensions)) => IndexConfig::new(dimensions),
                (None, None) => {
                    let first = objects
                        .first()
                        .ok_or("cannot infer dimensions from empty input, pass --dimensions")?;
                    IndexConfig::new(u32::try_from(first.len())?)
                }
            };
            if let Some(edge_size) = edge_size_for_creation {
                index_config = index_config.edge_size_for_creation(edge_size);
            }
            if let Some(edge_size) = edge_size_for_search {
                index_config = index_config.edge_size_for_search(edge_size);
            }
            if let Some(distance) = distance {
                index_config = index_config.distance_type(distance);
            }
            if let Some(object_type) = object_type {
                index_config = index_config.object_type(object_type);
            }

            let mut index = Index::create_with_engine(engine(), index_config)?;
            let ids = index.batch_insert(&objects, threads)?;
            index.save(&path)?;
            println!("{}", serde_json::to_string(&ids)?);
        }
        Command::Search {
            path,
            query,
            size,
            epsilon,
            radius,
        } => {
            let query = parse_vector(&query)?;
            let mut params = SearchParams::new().size(size).epsilon(epsilon);
            if let Some(radius) = radius {
                params = params.radius(radius);
            }
            let index = Index::open_with_engine(engine(), &path)?;
            let results = index.search(&query, &params)?;
            println!("{}", serde_json::to_string(&results)?);
        }
        Command::Info { path } => {
            let index = Index::open_with_engine(engine(), &path)?;
            println!("{}", serde_json::to_string_pretty(index.property())?);
        }
        Command::Get { path, id } => {
            let index = Index::open_with_engine(engine(), &path)?;
            println!("{}", serde_json::to_string(&index.object(id)?)?);
        }
        Command::Remove { path, id } => {
            let mut index = Index::open_with_engine(engine(), &path)?;
            let removed = index.remove(id);
            if removed {
                index.save(&path)?;
            }
            println!("{removed}");
        }
    }
    Ok(())
}

fn engine() -> Arc<dyn Engine> {
    #[cfg(feature = "ngt")]
    {
        Arc::new(anngraph::NgtEngine::new())
    }
    #[cfg(not(feature = "ngt"))]
    {
        anngraph::default_engine()
    }
}

/// Reads one JSON array per non-blank line.
fn read_objects(input: &Path) -> anngraph::Result<Vec<Vec<f64>>> {
    let reader = BufReader::new(File::open(input)?);
    let mut objects = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let object = parse_vector(&line).map_err(|e| match e {
            AnnError::Json(message) => {
                AnnError::Json(format!("{}:{}: {message}", input.display(), n + 1))
            }
            other => other,
        })?;
        objects.push(object);
    }
    tracing::debug!(count = objects.len(), "read input objects");
    Ok(objects)
}

/// Parses a JSON array of numbers.
fn parse_vector(text: &str) -> anngraph::Result<Vec<f64>> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let arr = value.as_array().ok_or_else(|| {
        AnnError::Json(format!(
            "vector must be an array of numbers, got {}",
            value_type_name(&value)
        ))
    })?;

    arr.iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_f64()
                .ok_or_else(|| AnnError::Json(format!("vector element [{i}] is not a number")))
        })
        .collect()
}

fn value_type_name(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
