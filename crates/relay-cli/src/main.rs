//! chatrelay CLI: drive the relay engine from the command line.
//!
//! Commands: save, message, migrate, links, run

mod gateway;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use relay_core::{ChatId, RelayConfig, SaveRequest, TriggerPhrase};
use relay_engine::{
    Delivery, IgnoreReason, InboundEvent, IncomingMessage, Outcome, RelayDispatcher, RelayEngine,
    Sender,
};
use relay_store::{LinkStore, SqliteLinkStore};

use crate::gateway::DirectoryGateway;

#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(version)]
#[command(about = "Relay saved messages between linked chats")]
struct Cli {
    /// Link database
    #[arg(long, global = true, default_value = "chatrelay.db")]
    db: PathBuf,

    /// Configuration file (TOML)
    #[arg(long, global = true, default_value = "chatrelay.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct MessageArgs {
    /// Chat the message was sent in
    #[arg(long, allow_negative_numbers = true)]
    chat: ChatId,
    /// Sending user
    #[arg(long)]
    user: i64,
    #[arg(long, default_value = "User")]
    first_name: String,
    #[arg(long, default_value_t = 1)]
    message_id: i64,
    /// Message this one replies to
    #[arg(long)]
    reply_to: Option<i64>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Save a message or configure saving for this chat
    Save {
        #[command(flatten)]
        message: MessageArgs,
        /// Link this chat to save messages to another
        #[arg(long)]
        link: bool,
        /// Unlink this chat
        #[arg(long)]
        unlink: bool,
        /// Code
        code: Vec<String>,
    },
    /// Handle a plain message, relaying when it contains the trigger phrase
    Message {
        #[command(flatten)]
        message: MessageArgs,
        text: String,
    },
    /// Notify that a chat has been replaced by another
    Migrate {
        #[arg(long, allow_negative_numbers = true)]
        from: ChatId,
        #[arg(long, allow_negative_numbers = true)]
        to: ChatId,
    },
    /// List all links
    Links,
    /// Read JSON events from stdin, one per line, and print one report per line
    Run {
        #[arg(long, default_value_t = 64)]
        queue: usize,
    },
}

#[derive(Serialize)]
struct Report<'a> {
    #[serde(flatten)]
    outcome: &'a Outcome,
    deliveries: &'a [Delivery],
}

type Engine = RelayEngine<SqliteLinkStore, DirectoryGateway>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut engine = open_engine(&cli.db, &cli.config)?;

    match cli.command {
        Commands::Save {
            message,
            link,
            unlink,
            code,
        } => {
            let incoming = incoming(&engine, &message);
            let request = SaveRequest::from_args(incoming.is_reply(), link, unlink, code.as_slice());
            let outcome = engine.handle(InboundEvent::SaveCommand {
                message: incoming,
                request,
            });
            print_report(&mut engine, &outcome)?;
        }
        Commands::Message { message, text } => {
            let incoming = incoming(&engine, &message);
            let outcome = if TriggerPhrase::default().matches(&text) {
                engine.handle(InboundEvent::SaveTrigger { message: incoming })
            } else {
                Outcome::Ignored {
                    reason: IgnoreReason::NoTrigger,
                }
            };
            print_report(&mut engine, &outcome)?;
        }
        Commands::Migrate { from, to } => {
            let outcome = engine.handle(InboundEvent::ChatMigrated {
                from_chat_id: from,
                to_chat_id: to,
            });
            print_report(&mut engine, &outcome)?;
        }
        Commands::Links => {
            let links = engine.store().list_all().context("failed to list links")?;
            println!("{}", serde_json::to_string_pretty(&links)?);
        }
        Commands::Run { queue } => run(engine, queue).await?,
    }

    Ok(())
}

fn open_engine(db: &Path, config: &Path) -> Result<Engine> {
    let config = RelayConfig::load(config)
        .with_context(|| format!("failed to load config from {}", config.display()))?;
    let store = SqliteLinkStore::open(db)
        .with_context(|| format!("failed to open link database {}", db.display()))?;
    let gateway = DirectoryGateway::new(config.clone());
    Ok(RelayEngine::new(store, gateway, config))
}

fn incoming(engine: &Engine, args: &MessageArgs) -> IncomingMessage {
    IncomingMessage {
        chat: engine.gateway().describe(args.chat),
        message_id: args.message_id,
        from: Sender {
            user_id: args.user,
            first_name: args.first_name.clone(),
        },
        reply_to: args.reply_to,
    }
}

fn print_report(engine: &mut Engine, outcome: &Outcome) -> Result<()> {
    let deliveries = engine.gateway_mut().take_deliveries();
    let report = Report {
        outcome,
        deliveries: &deliveries,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run(engine: Engine, queue: usize) -> Result<()> {
    let dispatcher = RelayDispatcher::spawn(engine, queue);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let event: InboundEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                println!("{}", serde_json::json!({ "error": e.to_string() }));
                continue;
            }
        };
        let (outcome, deliveries) = dispatcher
            .dispatch_with(event, |engine, outcome| {
                (outcome, engine.gateway_mut().take_deliveries())
            })
            .await?;
        let report = Report {
            outcome: &outcome,
            deliveries: &deliveries,
        };
        println!("{}", serde_json::to_string(&report)?);
    }

    dispatcher.shutdown().await?;
    Ok(())
}
