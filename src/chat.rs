// Terminal front end: typed lines and slash commands drive a Session, and
// view events are printed as they arrive.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::ASSISTANT_LABEL;
use crate::events::ViewEvent;
use crate::modal::Modal;
use crate::notify::NotificationKind;
use crate::render::MessageEntry;
use crate::session::Session;

const HELP: &str = "Commands:
  <text>          send a message
  /upload <path>  send a file's contents
  /image          describe an image to generate
  /settings       show settings
  /close          close any open dialog
  /clear          clear the conversation
  /quit           leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Upload(PathBuf),
    Image,
    Settings,
    Close,
    Clear,
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Command::Send(line.to_string());
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        match name {
            "upload" if !arg.is_empty() => Command::Upload(PathBuf::from(arg)),
            "image" => Command::Image,
            "settings" => Command::Settings,
            "close" => Command::Close,
            "clear" => Command::Clear,
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            _ => Command::Unknown(trimmed.to_string()),
        }
    }
}

// What the next line means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Chat,
    ImagePrompt,
    ConfirmClear,
}

/// Terminal rendering of a view event; `None` for events with nothing to show.
pub fn format_event(event: &ViewEvent) -> Option<String> {
    match event {
        ViewEvent::EntryAppended(entry) => Some(format_entry(entry)),
        ViewEvent::Typing { visible: true } => Some(format!("{} is typing...", ASSISTANT_LABEL)),
        ViewEvent::Notified(note) => {
            let tag = match note.kind {
                NotificationKind::Info => "info",
                NotificationKind::Success => "ok",
                NotificationKind::Error => "error",
            };
            Some(format!("[{}] {}", tag, note.text))
        }
        ViewEvent::ModalChanged { modal: Modal::ImagePrompt, open: true } => {
            Some("Describe the image to generate (/close to cancel):".to_string())
        }
        _ => None,
    }
}

fn format_entry(entry: &MessageEntry) -> String {
    let body = entry
        .body
        .lines()
        .map(|line| {
            if line.trim_start().starts_with("<img ") {
                "[image: open the web view to see it]"
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("{} [{}]: {}", entry.sender, entry.timestamp, body)
}

fn settings_text(session: &Session) -> String {
    let config = session.config();
    format!(
        "Settings:\n  chat endpoint:  {}\n  image endpoint: {}\n  max tokens:     {}\n  temperature:    {}",
        config.chat_url, config.image_url, config.max_tokens, config.temperature
    )
}

pub async fn run_chat(session: Arc<Session>) -> Result<()> {
    info!("Starting interactive chat session...");

    let mut events = session.subscribe();
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let printer = tokio::spawn(async move {
        loop {
            // Buffered events win over the stop signal, so the tail is printed.
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Ok(event) => {
                        if let Some(text) = format_event(&event) {
                            println!("{}", text);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "terminal fell behind view events"),
                    Err(RecvError::Closed) => break,
                },
                _ = &mut stop_rx => break,
            }
        }
    });

    println!("{}\n", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut mode = Mode::Chat;
    let mut requests = JoinSet::new();

    while let Some(line) = lines.next_line().await? {
        mode = match mode {
            Mode::ImagePrompt => handle_image_prompt(&session, &mut requests, &line)?,
            Mode::ConfirmClear => {
                let answer = matches!(line.trim().to_lowercase().as_str(), "y" | "yes");
                session.clear(|_| answer);
                Mode::Chat
            }
            Mode::Chat => match Command::parse(&line) {
                Command::Quit => break,
                command => handle_command(&session, &mut requests, command),
            },
        };
    }

    if !requests.is_empty() {
        info!(pending = requests.len(), "waiting for requests in flight");
    }
    while let Some(joined) = requests.join_next().await {
        if let Err(e) = joined {
            error!("request task failed: {}", e);
        }
    }
    let _ = stop_tx.send(());
    if let Err(e) = printer.await {
        warn!("event printer stopped abnormally: {}", e);
    }
    info!("Chat session finished.");
    Ok(())
}

fn handle_command(session: &Arc<Session>, requests: &mut JoinSet<()>, command: Command) -> Mode {
    match command {
        Command::Send(text) => {
            session.set_input(text.clone());
            let session = session.clone();
            requests.spawn(async move {
                if let Err(e) = session.submit_text(&text).await {
                    error!("text send failed: {}", e);
                }
            });
            Mode::Chat
        }
        Command::Upload(path) => {
            let session = session.clone();
            requests.spawn(async move {
                if let Err(e) = session.submit_file_path(&path).await {
                    error!("upload failed: {}", e);
                }
            });
            Mode::Chat
        }
        Command::Image => {
            session.open_modal(Modal::ImagePrompt);
            Mode::ImagePrompt
        }
        Command::Settings => {
            session.open_modal(Modal::Settings);
            println!("{}\n(/close to dismiss)", settings_text(session));
            Mode::Chat
        }
        Command::Close => {
            session.close_all_modals();
            Mode::Chat
        }
        Command::Clear => {
            println!("{} [y/N]", crate::session::CLEAR_PROMPT);
            Mode::ConfirmClear
        }
        Command::Help => {
            println!("{}", HELP);
            Mode::Chat
        }
        Command::Unknown(text) => {
            println!("Unknown command {}. Try /help.", text);
            Mode::Chat
        }
        Command::Quit => Mode::Chat,
    }
}

fn handle_image_prompt(session: &Arc<Session>, requests: &mut JoinSet<()>, line: &str) -> Result<Mode> {
    if Command::parse(line) == Command::Close {
        session.close_all_modals();
        return Ok(Mode::Chat);
    }
    session.set_image_prompt(line);
    // A rejected prompt leaves the dialog open for another try.
    let Some(job) = session.begin_image(line)? else {
        return Ok(Mode::ImagePrompt);
    };
    let session = session.clone();
    requests.spawn(async move {
        if let Err(e) = session.finish_image(job).await {
            error!("image request failed: {}", e);
        }
    });
    Ok(Mode::Chat)
}
