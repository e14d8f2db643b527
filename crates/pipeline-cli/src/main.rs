//! Pipeline command line client.
//!
//! - `pipeline receive` - Consume a topic, printing messages as JSON lines
//! - `pipeline send` - Publish a message
//! - `pipeline sync` - Record a consumer group's read position

#![forbid(unsafe_code)]

mod logging;
mod receive;
mod send;
mod settings;
mod sync;

use clap::{Parser, Subcommand};

/// Pipeline API command line client.
#[derive(Parser)]
#[command(name = "pipeline")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: settings::GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume a topic.
    ///
    /// Prints every DATA message as one JSON line on stdout until interrupted.
    /// Connection failures are logged and the feed is re-opened.
    Receive(receive::ReceiveArgs),

    /// Publish a message to a topic.
    Send(send::SendArgs),

    /// Record the consumer group's read position.
    Sync(sync::SyncArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for messages.
    logging::init_logging(cli.global.json_logs)?;

    let client = settings::build_client(&cli.global)?;

    match cli.command {
        Commands::Receive(args) => receive::run(&client, &args).await,
        Commands::Send(args) => send::run(&client, &args).await,
        Commands::Sync(args) => sync::run(&client, &args).await,
    }
}
