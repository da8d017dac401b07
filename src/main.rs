use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use ybrix::{chat, web_server, Config, Outcome, Session};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start an interactive chat session with YBrix.
    Chat {
        #[command(flatten)]
        endpoints: Endpoints,
        #[arg(long, env = "YBRIX_VIEW_PORT", help = "Serve a live web view of the transcript on this port.")]
        view_port: Option<u16>,
    },
    /// Send a single message and print the reply.
    Ask {
        #[arg(help = "The message to send.")]
        message: String,
        #[command(flatten)]
        endpoints: Endpoints,
    },
}

#[derive(clap::Args, Debug)]
struct Endpoints {
    #[arg(long, help = "Chat endpoint URL [default: $YBRIX_CHAT_URL or http://127.0.0.1:8000/api/chat]")]
    chat_url: Option<String>,
    #[arg(long, help = "Image inference endpoint URL [default: $YBRIX_IMAGE_URL]")]
    image_url: Option<String>,
}

impl Endpoints {
    fn into_config(self) -> Config {
        let mut config = Config::default();
        if let Some(url) = self.chat_url {
            config.chat_url = url;
        }
        if let Some(url) = self.image_url {
            config.image_url = url;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (endpoint overrides)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG (e.g. RUST_LOG=ybrix=debug). Logs go to
    // stderr so they stay out of the transcript.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("YBrix starting with command: {:?}", cli.command);

    match cli.command {
        Commands::Chat { endpoints, view_port } => {
            let session = Arc::new(
                Session::new(endpoints.into_config()).context("Failed to initialize chat session")?,
            );

            let web_view_handle = view_port.map(|port| {
                let session = session.clone();
                println!("Web view: http://127.0.0.1:{}/", port);
                tokio::spawn(async move {
                    if let Err(e) = web_server::start_web_server(port, session).await {
                        error!("Web view failed: {:?}", e);
                    }
                })
            });

            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);

            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received, leaving chat...");
                }
                res = chat::run_chat(session.clone()) => {
                    res.context("Chat session failed")?;
                }
            }

            if let Some(handle) = web_view_handle {
                if !handle.is_finished() {
                    info!("Stopping web view...");
                    handle.abort();
                }
            }
            info!("Shutdown complete.");
        }
        Commands::Ask { message, endpoints } => {
            let session = Session::new(endpoints.into_config()).context("Failed to initialize chat session")?;
            match session.submit_text(&message).await? {
                Outcome::Completed => {
                    let reply = session
                        .transcript()
                        .exchanges()
                        .last()
                        .map(|exchange| exchange.assistant.clone())
                        .unwrap_or_default();
                    println!("{}", reply);
                }
                Outcome::Rejected(reason) => bail!("Chat endpoint rejected the message: {}", reason),
                Outcome::Failed => bail!("Could not reach {}", session.config().chat_url),
                Outcome::Skipped => bail!("Nothing to send: the message is empty"),
            }
        }
    }

    Ok(())
}
