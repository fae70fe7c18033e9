use std::time::Duration;

use crate::errors::UploadError;

pub const DEFAULT_CHUNK_SIZE: usize = 2 * 1024 * 1024; // 2MB
// Each chunk is held in memory while it is in flight
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

// Wait between caller-side retries that carry no retry-after hint
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub chunk_size: usize,
    pub api_url: String,
    pub timeout: Duration,
    /// Extra attempts `send_with_retries` makes after a retryable failure
    pub retries: u32,
    pub retry_delay: Duration,
}

impl ClientConfig {
    pub fn new(chunk_size: usize, api_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            chunk_size,
            api_url: api_url.into(),
            timeout,
            retries: 0,
            retry_delay: RETRY_DELAY,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_retries(mut self, retries: u32, retry_delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = retry_delay;
        self
    }

    /// Rejects values that would make the upload loop meaningless.
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(UploadError::InvalidConfig(format!(
                "chunk size must be between 1 and {} bytes, got {}",
                MAX_CHUNK_SIZE, self.chunk_size
            )));
        }
        if self.timeout.is_zero() {
            return Err(UploadError::InvalidConfig(
                "timeout must be greater than zero".into(),
            ));
        }
        let url = self.api_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(UploadError::InvalidConfig(format!(
                "api url must start with http:// or https://, got {}",
                self.api_url
            )));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_API_URL, DEFAULT_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size, 2 * 1024 * 1024);
        assert_eq!(config.retries, 0);
    }

    #[test]
    fn test_chunk_size_bounds() {
        let zero = ClientConfig::default().with_chunk_size(0);
        assert!(matches!(zero.validate(), Err(UploadError::InvalidConfig(_))));

        let huge = ClientConfig::default().with_chunk_size(usize::MAX);
        assert!(matches!(huge.validate(), Err(UploadError::InvalidConfig(_))));

        let over = ClientConfig::default().with_chunk_size(MAX_CHUNK_SIZE + 1);
        assert!(over.validate().is_err());

        let at_limit = ClientConfig::default().with_chunk_size(MAX_CHUNK_SIZE);
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn test_bad_scheme_rejected() {
        let config = ClientConfig::new(1024, "ftp://example.org", DEFAULT_TIMEOUT);
        assert!(config.validate().is_err());
    }
}
