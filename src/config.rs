// Endpoint defaults and client tuning, overridable from the environment or the CLI.

use std::env;
use std::time::Duration;

lazy_static::lazy_static! {
    pub static ref CHAT_URL: String = env::var("YBRIX_CHAT_URL").unwrap_or_else(|_| "http://127.0.0.1:8000/api/chat".to_string());
    pub static ref IMAGE_URL: String = env::var("YBRIX_IMAGE_URL").unwrap_or_else(|_| "https://api-inference.huggingface.co/models/black-forest-labs/FLUX.1-schnell".to_string());
}

pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
/// Characters of an uploaded file that are embedded in the synthesized message.
pub const FILE_EXCERPT_CHARS: usize = 3000;
pub const NOTIFICATION_TTL: Duration = Duration::from_millis(3000);

pub const USER_LABEL: &str = "You";
pub const ASSISTANT_LABEL: &str = "YBrix";

#[derive(Debug, Clone)]
pub struct Config {
    pub chat_url: String,
    pub image_url: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub file_excerpt_chars: usize,
    pub notification_ttl: Duration,
}

impl Config {
    pub fn with_endpoints(chat_url: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            chat_url: chat_url.into(),
            image_url: image_url.into(),
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chat_url: CHAT_URL.clone(),
            image_url: IMAGE_URL.clone(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            file_excerpt_chars: FILE_EXCERPT_CHARS,
            notification_ttl: NOTIFICATION_TTL,
        }
    }
}
