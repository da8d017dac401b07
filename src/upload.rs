use std::path::Path;

use crate::api::data_url;
use crate::error::Result;

/// A picked file: its name, declared MIME type and raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// The MIME type is guessed from the extension, as a browser file picker would declare it.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = display_name(path);
        let mime_type = mime_guess::from_path(path).first_or_octet_stream().essence_str().to_string();
        tracing::debug!(%name, %mime_type, size = bytes.len(), "read upload");
        Ok(Self::new(name, mime_type, bytes))
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// Images become a `data:` URL, everything else is read as text.
    pub fn content(&self) -> String {
        if self.is_image() {
            data_url(&self.mime_type, &self.bytes)
        } else {
            String::from_utf8_lossy(&self.bytes).into_owned()
        }
    }
}

pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// First `limit` characters, never splitting a character.
pub fn excerpt(content: &str, limit: usize) -> &str {
    match content.char_indices().nth(limit) {
        Some((index, _)) => &content[..index],
        None => content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_content() {
        let file = UploadedFile::new("notes.txt", "text/plain", b"hello".to_vec());
        assert!(!file.is_image());
        assert_eq!(file.content(), "hello");
    }

    #[test]
    fn test_image_content_is_data_url() {
        let file = UploadedFile::new("dot.png", "image/png", vec![1, 2, 3]);
        assert!(file.is_image());
        assert_eq!(file.content(), "data:image/png;base64,AQID");
    }

    #[test]
    fn test_excerpt_counts_characters() {
        assert_eq!(excerpt("héllo", 2), "hé");
        assert_eq!(excerpt("abc", 10), "abc");
        assert_eq!(excerpt("", 3), "");
    }

    #[tokio::test]
    async fn test_from_path_guesses_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        std::fs::write(&path, "# Report").unwrap();

        let file = UploadedFile::from_path(&path).await.unwrap();
        assert_eq!(file.name, "report.txt");
        assert_eq!(file.mime_type, "text/plain");
        assert_eq!(file.content(), "# Report");
    }

    #[tokio::test]
    async fn test_from_path_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(UploadedFile::from_path(&dir.path().join("gone.txt")).await.is_err());
    }
}
