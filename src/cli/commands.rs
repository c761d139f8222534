use clap::{ArgAction, Parser, Subcommand};
use tracing::Level;

/// `guarded-relay` - guardrail-gated, context-augmented LLM relay.
#[derive(Parser, Debug)]
#[command(name = "guarded-relay")]
#[command(version)]
#[command(about = "Scan, enrich, generate, scan again: a guarded LLM relay.", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.guarded-relay/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP gateway (SSE + JSON chat endpoints)
    Serve {
        /// Port to listen on (use 0 for random available port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
    },

    /// Run one request through the pipeline and print its events as JSON lines
    Ask {
        /// The user message
        message: String,
    },

    /// Scan a piece of text with the guardrail and print the decision
    Scan {
        /// Text to classify
        text: String,
    },
}
