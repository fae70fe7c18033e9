#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tgdrop::errors::UploadError;
use tgdrop::transport::{FilePart, Transport, UploadInfo};
use tgdrop::types::Credentials;
use tokio_util::sync::CancellationToken;

pub const MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub enum Fault {
    Network,
    RateLimited(u64),
    Rejected,
    Unauthorized,
}

impl Fault {
    fn into_error(self) -> UploadError {
        match self {
            Fault::Network => UploadError::Network("connection reset by peer".into()),
            Fault::RateLimited(secs) => UploadError::RateLimited {
                retry_after: Duration::from_secs(secs),
            },
            Fault::Rejected => UploadError::RemoteRejected("Bad Request: chat not found".into()),
            Fault::Unauthorized => UploadError::Authentication("Unauthorized".into()),
        }
    }
}

// What the mock saw, shared so tests can inspect it after the transport moved
#[derive(Debug, Default)]
pub struct Log {
    pub auth_calls: usize,
    pub part_attempts: Vec<u32>,
    pub acked: Vec<(u32, u32, usize)>,
    pub started: Vec<UploadInfo>,
    pub finalized: usize,
    pub close_calls: usize,
    pub transports_made: usize,
}

#[derive(Default, Clone)]
pub struct Script {
    pub auth_fault: Option<Fault>,
    pub part_fault: Option<(u32, Fault)>,
    pub finalize_fault: Option<Fault>,
    // Fires the token while part N is in flight, after it is acknowledged
    pub cancel_on_part: Option<(u32, CancellationToken)>,
    pub remote_id: Option<String>,
}

pub struct MockTransport {
    script: Script,
    log: Arc<Mutex<Log>>,
}

impl MockTransport {
    pub fn new(script: Script) -> (Self, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log::default()));
        (
            Self {
                script,
                log: log.clone(),
            },
            log,
        )
    }
}

impl Transport for MockTransport {
    async fn authenticate(&mut self, _credentials: &Credentials) -> Result<(), UploadError> {
        self.log.lock().unwrap().auth_calls += 1;
        match self.script.auth_fault {
            Some(fault) => Err(fault.into_error()),
            None => Ok(()),
        }
    }

    async fn begin(&mut self, upload: &UploadInfo) -> Result<(), UploadError> {
        self.log.lock().unwrap().started.push(upload.clone());
        Ok(())
    }

    async fn send_part(&mut self, part: FilePart) -> Result<(), UploadError> {
        self.log.lock().unwrap().part_attempts.push(part.index);

        if let Some((index, fault)) = self.script.part_fault {
            if part.index == index {
                return Err(fault.into_error());
            }
        }

        // yield like a real network round trip would
        tokio::task::yield_now().await;

        self.log
            .lock()
            .unwrap()
            .acked
            .push((part.index, part.total_parts, part.bytes.len()));

        if let Some((index, token)) = &self.script.cancel_on_part {
            if part.index == *index {
                token.cancel();
            }
        }
        Ok(())
    }

    async fn finalize(&mut self) -> Result<String, UploadError> {
        if let Some(fault) = self.script.finalize_fault {
            return Err(fault.into_error());
        }
        self.log.lock().unwrap().finalized += 1;
        Ok(self
            .script
            .remote_id
            .clone()
            .unwrap_or_else(|| "4242".to_string()))
    }

    async fn close(&mut self) {
        self.log.lock().unwrap().close_calls += 1;
    }
}

impl MockTransport {
    /// One transport per call, each following the next script in turn
    /// (the last one repeats), all writing to the same log.
    pub fn sequence(scripts: Vec<Script>) -> (impl FnMut() -> MockTransport, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log::default()));
        let shared = log.clone();
        let mut made = 0;
        let factory = move || {
            let script = scripts[made.min(scripts.len() - 1)].clone();
            made += 1;
            shared.lock().unwrap().transports_made = made;
            MockTransport {
                script,
                log: shared.clone(),
            }
        };
        (factory, log)
    }
}

pub fn credentials() -> Credentials {
    Credentials::new("12345", "0123456789abcdef", "123456:TEST-token")
}

// Helper to create test files
pub fn create_test_file(dir: &TempDir, name: &str, size: u64) -> PathBuf {
    let path = dir.path().join(name);
    let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, data).unwrap();
    path
}

pub fn assert_monotonic(events: &[tgdrop::types::ProgressEvent], file: &Path) {
    assert!(!events.is_empty(), "no progress for {}", file.display());
    for pair in events.windows(2) {
        assert!(pair[0].bytes_sent <= pair[1].bytes_sent);
    }
}
