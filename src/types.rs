use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::UploadError;

//---------------------------------------------------------------
// API id + API hash + bot token. Held in memory only, never logged
//---------------------------------------------------------------
#[derive(Clone)]
pub struct Credentials {
    api_id: String,
    api_hash: String,
    bot_token: String,
}

impl Credentials {
    pub fn new(
        api_id: impl Into<String>,
        api_hash: impl Into<String>,
        bot_token: impl Into<String>,
    ) -> Self {
        Self {
            api_id: api_id.into(),
            api_hash: api_hash.into(),
            bot_token: bot_token.into(),
        }
    }

    pub fn api_id(&self) -> &str {
        &self.api_id
    }

    pub fn api_hash(&self) -> &str {
        &self.api_hash
    }

    pub fn bot_token(&self) -> &str {
        &self.bot_token
    }

    // All three fields must be present before anything touches the network
    pub fn validate(&self) -> Result<(), UploadError> {
        for (name, value) in [
            ("api id", &self.api_id),
            ("api hash", &self.api_hash),
            ("bot token", &self.bot_token),
        ] {
            if value.trim().is_empty() {
                return Err(UploadError::InvalidCredentials(format!("{} is empty", name)));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_id", &self.api_id)
            .field("api_hash", &"<redacted>")
            .field("bot_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub destination: String,
    pub path: PathBuf,
    pub thread_id: Option<i64>,
}

impl TransferRequest {
    pub fn new(destination: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            path: path.into(),
            thread_id: None,
        }
    }

    pub fn with_thread(mut self, thread_id: Option<i64>) -> Self {
        self.thread_id = thread_id;
        self
    }

    /// Name sent alongside the upload, falls back to "file".
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string()
    }

    /// Checks the file is an existing, non-empty regular file and returns its size.
    pub async fn validate(&self) -> Result<u64, UploadError> {
        if self.destination.trim().is_empty() {
            return Err(UploadError::InvalidConfig(
                "destination chat id is empty".into(),
            ));
        }
        file_size(&self.path).await
    }
}

pub(crate) async fn file_size(path: &Path) -> Result<u64, UploadError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(UploadError::FileNotFound(path.to_path_buf()));
        }
        Err(e) => {
            return Err(UploadError::InvalidFile {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
        }
    };

    if !metadata.is_file() {
        return Err(UploadError::InvalidFile {
            path: path.to_path_buf(),
            reason: "not a regular file".into(),
        });
    }
    if metadata.len() == 0 {
        return Err(UploadError::InvalidFile {
            path: path.to_path_buf(),
            reason: "file is empty".into(),
        });
    }
    Ok(metadata.len())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub bytes_sent: u64,
    pub total_bytes: u64,
}

impl ProgressEvent {
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 100.0;
        }
        self.bytes_sent as f64 * 100.0 / self.total_bytes as f64
    }

    pub fn is_complete(&self) -> bool {
        self.bytes_sent == self.total_bytes
    }
}

#[derive(Debug, Clone)]
pub struct TransferResult {
    /// Identifier the server assigned to the posted message
    pub remote_id: String,
    pub destination: String,
    pub total_bytes: u64,
    pub parts: u32,
}
