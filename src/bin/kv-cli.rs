use clap::{Parser, Subcommand};
use serde::Serialize;

use kv_gateway::client::{ClientError, KvClient};
use kv_gateway::config::ClientConfig;

#[derive(Parser)]
#[command(name = "kv-cli")]
#[command(about = "Command-line client for the key-value service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8000")]
    url: String,

    /// Attempts per operation, including the first.
    #[arg(long, default_value_t = 5)]
    max_attempts: u32,

    /// Bound on a whole operation in milliseconds, retries included.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Enable retry logging to stderr.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a new key
    Create { key: String, value: String },
    /// Fetch a key
    Get { key: String },
    /// Replace the value of an existing key
    Update { key: String, value: String },
    /// Remove a key
    Delete { key: String },
    /// Page through stored items
    List {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 10)]
        page_size: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter("kv_gateway=debug")
            .init();
    }

    let config = ClientConfig {
        base_url: cli.url,
        max_attempts: cli.max_attempts,
        operation_timeout_ms: cli.timeout_ms,
        ..ClientConfig::default()
    };
    let client = KvClient::new(&config)?;

    let outcome = match cli.command {
        Commands::Create { key, value } => render(client.create(&key, &value).await),
        Commands::Get { key } => render(client.get(&key).await),
        Commands::Update { key, value } => render(client.update(&key, &value).await),
        Commands::Delete { key } => render(
            client
                .delete(&key)
                .await
                .map(|_| serde_json::json!({ "message": "Deleted successfully" })),
        ),
        Commands::List { page, page_size } => render(client.list(page, page_size).await),
    };

    match outcome {
        Ok(json) => {
            println!("{}", json);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(exit_code(&e));
        }
    }
}

fn render<T: Serialize>(result: Result<T, ClientError>) -> Result<String, ClientError> {
    let value = result?;
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Distinct exit codes so scripts can tell "gave up" from "was refused".
fn exit_code(e: &ClientError) -> i32 {
    match e {
        ClientError::NotFound | ClientError::AlreadyExists { .. } | ClientError::Rejected { .. } => 2,
        ClientError::Exhausted { .. } => 3,
        ClientError::TimedOut { .. } | ClientError::Cancelled { .. } => 4,
        ClientError::Config(_) | ClientError::Decode(_) => 1,
    }
}
