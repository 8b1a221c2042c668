//! A2IA CLI: the main entry point.
//!
//! Commands:
//! - `chat`       interactive or single-message conversation
//! - `workspace`  create, attach or show the sandbox workspace
//! - `config`     show the effective configuration or write the default file

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "a2ia",
    about = "A2IA: an LLM tool-calling agent inside a sandboxed workspace",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Use the free-text ReAct protocol instead of native tool calls
        #[arg(long)]
        react: bool,

        /// Wait for complete responses instead of streaming
        #[arg(long)]
        no_stream: bool,

        /// Do not offer tools to the model
        #[arg(long)]
        no_tools: bool,

        /// Maximum model rounds per turn
        #[arg(long)]
        max_iterations: Option<usize>,
    },

    /// Show, create or attach the workspace
    Workspace {
        /// Create a named workspace under the workspaces directory
        #[arg(long, conflicts_with = "attach")]
        create: Option<String>,

        /// Use an existing directory as the workspace
        #[arg(long)]
        attach: Option<PathBuf>,

        /// Description stored in the workspace metadata
        #[arg(long)]
        description: Option<String>,
    },

    /// Show the effective configuration
    Config {
        /// Write the default configuration file
        #[arg(long)]
        init: bool,

        /// Overwrite an existing file with --init
        #[arg(long, requires = "init")]
        force: bool,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Chat {
            message,
            react,
            no_stream,
            no_tools,
            max_iterations,
        } => {
            commands::chat::run(commands::chat::ChatOptions {
                message,
                react,
                no_stream,
                no_tools,
                max_iterations,
            })
            .await?
        }
        Commands::Workspace {
            create,
            attach,
            description,
        } => commands::workspace::run(create, attach, description)?,
        Commands::Config { init, force } => commands::config::run(init, force)?,
    }

    Ok(())
}
