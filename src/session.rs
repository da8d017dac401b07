use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::api::{ApiClient, ChatRequest};
use crate::config::Config;
use crate::error::Result;
use crate::events::{EventBus, Snapshot, ViewEvent};
use crate::modal::{Modal, ModalController};
use crate::notify::{Notification, NotificationSurface};
use crate::render::{MessageEntry, RenderSurface, Role};
use crate::transcript::{Exchange, Transcript};
use crate::upload::{display_name, excerpt, UploadedFile};

pub const CONNECTION_ERROR: &str = "Connection error. Please try again.";
pub const FILE_ERROR: &str = "Error processing file";
pub const IMAGE_ERROR: &str = "Image generation failed";
pub const EMPTY_PROMPT: &str = "Please enter a description";
pub const CLEAR_PROMPT: &str = "Clear all messages?";
pub const CLEARED: &str = "Chat cleared";

/// How a submission settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing was sent: empty input, or a text send was already in flight.
    Skipped,
    Completed,
    /// The endpoint answered `success: false` with this message.
    Rejected(String),
    /// Transport error, undecodable reply or unreadable file.
    Failed,
}

/// Holds the busy flag for one text exchange and releases it on drop, so
/// every exit path (including a dropped future) frees the next send.
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// An image request that passed validation and is waiting on the endpoint.
#[derive(Debug)]
pub struct ImageJob {
    prompt: String,
}

struct SessionState {
    transcript: Transcript,
    surface: RenderSurface,
    modals: ModalController,
    input: String,
    image_prompt: String,
    typing: bool,
}

/// One chat session: the transcript, the surfaces and the request
/// dispatcher. Shared as `Arc<Session>`; every submission is its own task.
pub struct Session {
    config: Config,
    api: ApiClient,
    state: Mutex<SessionState>,
    busy: AtomicBool,
    notifications: NotificationSurface,
    events: EventBus,
}

impl Session {
    pub fn new(config: Config) -> Result<Self> {
        let events = EventBus::new();
        let api = ApiClient::new(config.chat_url.clone(), config.image_url.clone());
        let state = SessionState {
            transcript: Transcript::new(),
            surface: RenderSurface::new(events.clone())?,
            modals: ModalController::new(events.clone()),
            input: String::new(),
            image_prompt: String::new(),
            typing: false,
        };
        info!(chat_url = %config.chat_url, image_url = %config.image_url, "session created");
        Ok(Self {
            notifications: NotificationSurface::new(config.notification_ttl, events.clone()),
            config,
            api,
            state: Mutex::new(state),
            busy: AtomicBool::new(false),
            events,
        })
    }

    /// Send a typed message. At most one runs at a time; a second call while
    /// one is in flight does nothing.
    pub async fn submit_text(&self, raw_input: &str) -> Result<Outcome> {
        let message = raw_input.trim();
        if message.is_empty() {
            return Ok(Outcome::Skipped);
        }
        let Some(_busy) = BusyGuard::acquire(&self.busy) else {
            debug!("text send ignored: request already in flight");
            return Ok(Outcome::Skipped);
        };

        let request = {
            let mut state = self.lock();
            state.surface.append(Role::User, message)?;
            state.input.clear();
            self.set_typing(&mut state, true);
            ChatRequest {
                message: message.to_string(),
                history: state.transcript.exchanges().to_vec(),
                max_tokens: Some(self.config.max_tokens),
                temperature: Some(self.config.temperature),
            }
        };

        let result = self.api.send_chat(&request).await;

        let mut state = self.lock();
        self.set_typing(&mut state, false);
        match result {
            Ok(reply) if reply.success => {
                state.surface.append(Role::Assistant, &reply.response)?;
                state.transcript.push(Exchange::new(message, reply.response));
                debug!(exchanges = state.transcript.len(), "exchange recorded");
                Ok(Outcome::Completed)
            }
            Ok(reply) => {
                drop(state);
                self.notifications.error(format!("Error: {}", reply.response));
                Ok(Outcome::Rejected(reply.response))
            }
            Err(e) => {
                drop(state);
                error!("chat request failed: {}", e);
                self.notifications.error(CONNECTION_ERROR);
                Ok(Outcome::Failed)
            }
        }
    }

    /// Send a file's contents as a message. Runs alongside text sends and
    /// leaves the transcript untouched.
    pub async fn submit_file(&self, file: UploadedFile) -> Result<Outcome> {
        let content = file.content();
        let message = format!(
            "I uploaded a file: {}\n\nContent:\n{}",
            file.name,
            excerpt(&content, self.config.file_excerpt_chars)
        );

        let request = {
            let mut state = self.lock();
            state.surface.append(Role::User, &format!("Uploaded: {}", file.name))?;
            state.input.clear();
            self.set_typing(&mut state, true);
            ChatRequest {
                message,
                history: state.transcript.exchanges().to_vec(),
                max_tokens: None,
                temperature: None,
            }
        };

        let result = self.api.send_chat(&request).await;

        let mut state = self.lock();
        self.set_typing(&mut state, false);
        match result {
            Ok(reply) if reply.success => {
                state.surface.append(Role::Assistant, &reply.response)?;
                Ok(Outcome::Completed)
            }
            Ok(reply) => {
                warn!(file = %file.name, "file message rejected: {}", reply.response);
                Ok(Outcome::Rejected(reply.response))
            }
            Err(e) => {
                drop(state);
                error!(file = %file.name, "file request failed: {}", e);
                self.notifications.error(FILE_ERROR);
                Ok(Outcome::Failed)
            }
        }
    }

    pub async fn submit_file_path(&self, path: &Path) -> Result<Outcome> {
        match UploadedFile::from_path(path).await {
            Ok(file) => self.submit_file(file).await,
            Err(e) => {
                warn!(path = %path.display(), "could not read upload: {}", e);
                self.notifications
                    .error(format!("Could not read file: {}", display_name(path)));
                Ok(Outcome::Failed)
            }
        }
    }

    /// Ask the image endpoint for a picture. Never part of the transcript.
    pub async fn submit_image(&self, prompt: &str) -> Result<Outcome> {
        match self.begin_image(prompt)? {
            Some(job) => self.finish_image(job).await,
            None => Ok(Outcome::Skipped),
        }
    }

    /// The synchronous half of `submit_image`: validates the prompt, closes
    /// the dialog and shows the request. `None` means the prompt was empty;
    /// the user has been told and the dialog stays open.
    pub fn begin_image(&self, prompt: &str) -> Result<Option<ImageJob>> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            self.notifications.error(EMPTY_PROMPT);
            return Ok(None);
        }

        let mut state = self.lock();
        state.modals.close(Modal::ImagePrompt);
        state.surface.append(Role::User, &format!("Generate image: {}", prompt))?;
        self.set_typing(&mut state, true);
        Ok(Some(ImageJob {
            prompt: prompt.to_string(),
        }))
    }

    pub async fn finish_image(&self, job: ImageJob) -> Result<Outcome> {
        let prompt = job.prompt.as_str();
        let result = self.api.generate_image(prompt).await;

        let mut state = self.lock();
        self.set_typing(&mut state, false);
        match result {
            Ok(image) => {
                // An HTML block has to stay on one line.
                let alt = prompt.replace(['\r', '\n'], " ");
                let tag = state.surface.image_tag(&image.to_data_url(), &alt)?;
                state
                    .surface
                    .append(Role::Assistant, &format!("Generated image: {}\n\n{}", prompt, tag))?;
                state.image_prompt.clear();
                Ok(Outcome::Completed)
            }
            Err(e) => {
                drop(state);
                error!("image request failed: {}", e);
                self.notifications.error(IMAGE_ERROR);
                Ok(Outcome::Failed)
            }
        }
    }

    /// Wipe the transcript and the rendered entries if `confirm` agrees.
    /// Must be called from within a tokio runtime.
    pub fn clear(&self, confirm: impl FnOnce(&str) -> bool) -> bool {
        if !confirm(CLEAR_PROMPT) {
            return false;
        }
        {
            let mut state = self.lock();
            state.transcript.clear();
            state.surface.clear();
        }
        info!("chat cleared");
        self.notifications.success(CLEARED);
        true
    }

    pub fn open_modal(&self, modal: Modal) {
        self.lock().modals.open(modal);
    }

    pub fn close_modal(&self, modal: Modal) {
        self.lock().modals.close(modal);
    }

    pub fn close_all_modals(&self) {
        self.lock().modals.close_all();
    }

    pub fn is_modal_open(&self, modal: Modal) -> bool {
        self.lock().modals.is_open(modal)
    }

    pub fn set_input(&self, text: impl Into<String>) {
        self.lock().input = text.into();
    }

    pub fn input(&self) -> String {
        self.lock().input.clone()
    }

    pub fn set_image_prompt(&self, text: impl Into<String>) {
        self.lock().image_prompt = text.into();
    }

    pub fn image_prompt(&self) -> String {
        self.lock().image_prompt.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn is_typing(&self) -> bool {
        self.lock().typing
    }

    pub fn transcript(&self) -> Transcript {
        self.lock().transcript.clone()
    }

    pub fn entries(&self) -> Vec<MessageEntry> {
        self.lock().surface.entries().to_vec()
    }

    pub fn is_scrolled_to_bottom(&self) -> bool {
        self.lock().surface.is_at_bottom()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.active()
    }

    pub fn notifier(&self) -> &NotificationSurface {
        &self.notifications
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.events.subscribe()
    }

    /// Subscribe and capture the surfaces in one step. Entries and typing
    /// change only under the state lock, so none is missed or repeated; a
    /// notification can show up in both the snapshot and the stream.
    pub fn attach(&self) -> (Snapshot, broadcast::Receiver<ViewEvent>) {
        let state = self.lock();
        let events = self.events.subscribe();
        let snapshot = Snapshot {
            entries: state.surface.entries().to_vec(),
            typing: state.typing,
            notifications: self.notifications.active(),
        };
        (snapshot, events)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn render_page(&self) -> Result<String> {
        let notifications = self.notifications.active();
        let state = self.lock();
        state.surface.render_page(state.typing, &notifications)
    }

    fn set_typing(&self, state: &mut SessionState, visible: bool) {
        state.typing = visible;
        if visible {
            state.surface.scroll_to_bottom();
        }
        self.events.emit(ViewEvent::Typing { visible });
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
