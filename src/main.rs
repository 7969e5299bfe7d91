//! FlowRunner CLI Entry Point
//!
//! Runs a workflow definition over a JSON input document against the
//! in-memory store.
//!
//! # Usage
//!
//! ```bash
//! # Run the built-in order fulfillment workflow over an input file
//! flowrunner --demo --input order.json
//!
//! # Run a definition from YAML or JSON
//! flowrunner fulfillment.yaml --input order.json
//!
//! # Seed the store from a stock file
//! flowrunner fulfillment.yaml --input order.json --stock stock.json
//!
//! # Cap Map fan-out concurrency
//! flowrunner fulfillment.yaml --input order.json --concurrency 8
//! ```

use std::env;
use std::fs;
use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info};
use serde_json::Value;

use flowrunner::execution::{Engine, EngineConfig, ExecutionStatus};
use flowrunner::fulfillment::order_workflow;
use flowrunner::invoker::InMemoryStore;
use flowrunner::workflow::parser::load_definition;
use flowrunner::{APP_NAME, VERSION};

/// Command-line configuration parsed from arguments.
#[derive(Debug, Default)]
struct Config {
    definition_path: Option<String>,
    input_path: Option<String>,
    stock_path: Option<String>,
    max_concurrency: Option<usize>,
    demo: bool,
    show_history: bool,
    verbose: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!("Workflow Orchestration Engine");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: flowrunner [OPTIONS] [DEFINITION_FILE]");
    println!();
    println!("Arguments:");
    println!("  [DEFINITION_FILE]   Path to a workflow definition (YAML or JSON)");
    println!();
    println!("Options:");
    println!("  --demo              Run the built-in order fulfillment workflow");
    println!("  --input PATH        JSON file with the input document (default: {{}})");
    println!("  --stock PATH        JSON object of sku -> quantity to seed the store");
    println!("  --concurrency N     Cap concurrent Map iterations");
    println!("  --history           Print the execution history as JSON");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  flowrunner --demo --input order.json --stock stock.json");
    println!("  flowrunner fulfillment.yaml --input order.json --history");
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--demo" => {
                config.demo = true;
            }
            "--history" => {
                config.show_history = true;
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--input" => {
                i += 1;
                if i >= args.len() {
                    return Err("--input requires a path argument".to_string());
                }
                config.input_path = Some(args[i].clone());
            }
            "--stock" => {
                i += 1;
                if i >= args.len() {
                    return Err("--stock requires a path argument".to_string());
                }
                config.stock_path = Some(args[i].clone());
            }
            "--concurrency" => {
                i += 1;
                if i >= args.len() {
                    return Err("--concurrency requires a number argument".to_string());
                }
                let cap = args[i]
                    .parse()
                    .map_err(|_| format!("Invalid concurrency value: {}", args[i]))?;
                config.max_concurrency = Some(cap);
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if config.definition_path.is_some() {
                    return Err(format!("Unexpected argument: {}", arg));
                }
                config.definition_path = Some(arg.clone());
            }
        }
        i += 1;
    }

    if config.definition_path.is_none() && !config.demo {
        return Err("Provide a definition file or --demo".to_string());
    }
    if config.definition_path.is_some() && config.demo {
        return Err("--demo cannot be combined with a definition file".to_string());
    }

    Ok(config)
}

/// Reads a JSON file into a value.
fn load_json(path: &str) -> Result<Value, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("Could not read '{}': {}", path, e))?;
    let value = serde_json::from_str(&text)
        .map_err(|e| format!("'{}' is not valid JSON: {}", path, e))?;
    Ok(value)
}

/// Seeds the store from a `{ "sku": quantity }` object.
async fn seed_store(store: &InMemoryStore, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let stock = load_json(path)?;
    let entries = stock
        .as_object()
        .ok_or_else(|| format!("'{}' must hold a JSON object of sku -> quantity", path))?;

    for (sku, quantity) in entries {
        let quantity = quantity
            .as_u64()
            .ok_or_else(|| format!("stock quantity for '{}' must be a non-negative integer", sku))?;
        store.seed(sku.clone(), quantity).await;
    }
    info!("Seeded store with {} items from {}", entries.len(), path);
    Ok(())
}

/// Main application entry point.
async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    // Setup logging
    setup_logging(config.verbose);

    // Print banner
    print_banner();

    // Load the definition
    let definition = match &config.definition_path {
        Some(path) => {
            info!("Loading definition: {}", path);
            load_definition(path).map_err(|e| {
                error!("Failed to load definition: {}", e);
                format!("Could not load definition from '{}': {}", path, e)
            })?
        }
        None => {
            info!("Using the built-in order fulfillment workflow");
            order_workflow()
        }
    };
    info!(
        "Definition '{}' loaded: {} states, root '{}'",
        definition.id,
        definition.len(),
        definition.root
    );

    // Load the input document
    let input = match &config.input_path {
        Some(path) => load_json(path)?,
        None => Value::Object(serde_json::Map::new()),
    };

    // Prepare the store and engine
    let store = Arc::new(InMemoryStore::new());
    if let Some(path) = &config.stock_path {
        seed_store(&store, path).await?;
    }
    let engine = Engine::with_config(
        store,
        EngineConfig {
            max_map_concurrency: config.max_concurrency,
        },
    );

    // Execute
    let result = engine.execute(definition, input).await?;
    println!();
    println!("Execution {} {}", result.execution_id, result.status);

    if config.show_history {
        println!("{}", serde_json::to_string_pretty(&result.history)?);
    }

    match result.status {
        ExecutionStatus::Succeeded => {
            if let Some(output) = result.output {
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            Ok(())
        }
        _ => {
            let failure = result
                .failure
                .map(|f| f.to_string())
                .unwrap_or_else(|| "unknown failure".to_string());
            Err(failure.into())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
