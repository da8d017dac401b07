pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod events;
pub mod modal;
pub mod notify;
pub mod render;
pub mod session;
pub mod transcript;
pub mod upload;
pub mod web_server;

pub use config::Config;
pub use error::{ClientError, Result};
pub use session::{Outcome, Session};
