use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

use chat_dispatch::commands::CommandDescriptor;
use chat_dispatch::config::normalize_store_path;
use chat_dispatch::transport::ReplayTransport;
use chat_dispatch::{Bot, BotEvent, Config, MessageContext, Middleware, Next, Transport};

/// Dispatch - message normalization and command routing for chat bots
#[derive(Parser)]
#[command(name = "dispatch", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/chat-dispatch/config.toml)
    #[arg(short, long, env = "DISPATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Command prefix; repeat for several (overrides config and env)
    #[arg(short, long)]
    prefix: Vec<String>,

    /// Store file (overrides config and env)
    #[arg(long)]
    store_path: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Feed recorded transport events through the bot
    Replay {
        /// JSON-lines file of transport events
        file: PathBuf,

        /// Account the replayed session is logged in as
        #[arg(long, default_value = "0@s.whatsapp.net")]
        user_id: String,
    },
    /// Print the resolved configuration
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,chat_dispatch=info",
        1 => "info,chat_dispatch=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Command::Replay { file, user_id } => replay(config, &file, user_id).await,
        Command::CheckConfig => {
            check_config(&config);
            Ok(())
        }
    }
}

/// Resolve configuration with precedence flags > env > toml > default
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if !cli.prefix.is_empty() {
        config.prefix.clone_from(&cli.prefix);
    }
    if let Some(path) = &cli.store_path {
        config.store_path = normalize_store_path(path.clone());
    }

    config.validate()?;
    Ok(config)
}

fn check_config(config: &Config) {
    let prefix = if config.prefix.is_empty() {
        "(none)".to_string()
    } else {
        config.prefix.join(" ")
    };

    println!("prefix:          {prefix}");
    println!("case sensitive:  {}", config.case_sensitive);
    println!("auth dir:        {}", config.auth_dir.display());
    println!("store path:      {}", config.store_path.display());
    println!("flush interval:  {}s", config.flush_interval.as_secs());
}

async fn replay(config: Config, file: &std::path::Path, user_id: String) -> anyhow::Result<()> {
    if config.prefix.is_empty() {
        tracing::info!("no prefix configured, only prefix-free commands will match");
    }

    let bot = Arc::new(
        Bot::builder(config)
            .use_middleware(LogMessages)
            .command(CommandDescriptor::new("ping").ignore_prefix(), ping)
            .command("echo", echo)
            .build(),
    );

    let transport = Arc::new(ReplayTransport::new(user_id));
    let mut events = bot.subscribe();
    let listener = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let BotEvent::Message(ctx) = event {
                tracing::info!(from = %ctx.from, text = %ctx.text, "message");
            }
        }
    });

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(Arc::clone(&bot).run(
        Arc::clone(&transport) as Arc<dyn Transport>,
        async move {
            let _ = stop_rx.await;
        },
    ));

    let replayed = transport.replay_file(file).await;
    // Stop the bot even if the replay failed part way
    let _ = stop_tx.send(());
    running.await??;
    listener.abort();

    let count = replayed?;
    tracing::info!(events = count, sent = transport.sent_count(), "replay complete");
    Ok(())
}

/// Logs every message that reaches the chain
struct LogMessages;

#[async_trait]
impl Middleware for LogMessages {
    async fn handle(
        &self,
        ctx: &mut MessageContext,
        next: Next<'_>,
    ) -> chat_dispatch::Result<()> {
        tracing::debug!(
            kind = %ctx.kind,
            sender = %ctx.sender,
            from = %ctx.from,
            quoted = ctx.quoted.is_some(),
            "inbound"
        );
        next.run(ctx).await
    }
}

async fn ping(ctx: MessageContext) -> chat_dispatch::Result<()> {
    ctx.reply_text("pong").await;
    Ok(())
}

async fn echo(ctx: MessageContext) -> chat_dispatch::Result<()> {
    if !ctx.text.is_empty() {
        ctx.reply_text(&ctx.text).await;
    }
    Ok(())
}
