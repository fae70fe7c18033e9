use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::errors::UploadError;
use crate::session::Session;
use crate::transfer::chunk::ChunkReader;
use crate::transfer::mime::mime_for_path;
use crate::transfer::progress::UploadObserver;
use crate::transport::{FilePart, Transport, UploadInfo};
use crate::types::{Credentials, ProgressEvent, TransferRequest, TransferResult};

/// Drives one file through a [`Transport`]: open, upload part by part, close.
///
/// Parts go out strictly in file order and each one is acknowledged before
/// the next is read. Only [`TransferClient::send_with_retries`] retries, and
/// only as many times as [`ClientConfig::retries`] allows.
#[derive(Debug, Clone)]
pub struct TransferClient {
    config: ClientConfig,
}

impl TransferClient {
    pub fn new(config: ClientConfig) -> Result<Self, UploadError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Authenticates over `transport`. Credentials are checked before any
    /// connection is made; a rejected handshake leaves nothing allocated.
    pub async fn open<T: Transport>(
        &self,
        transport: T,
        credentials: &Credentials,
    ) -> Result<Session<T>, UploadError> {
        credentials.validate()?;

        let mut session = Session::new(transport);
        session.open(credentials).await?;
        Ok(session)
    }

    /// Uploads `request.path` over an open session.
    ///
    /// `on_progress` runs inline after every acknowledged part and must not
    /// block. On any error the session is closed before the error is returned.
    pub async fn upload<T, F>(
        &self,
        session: &mut Session<T>,
        request: &TransferRequest,
        mut on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<TransferResult, UploadError>
    where
        T: Transport,
        F: FnMut(ProgressEvent),
    {
        if !session.is_open() {
            return Err(UploadError::SessionNotOpen);
        }

        let result = self
            .upload_parts(session, request, &mut on_progress, cancel)
            .await;

        if let Err(e) = &result {
            warn!(error = %e, file = %request.path.display(), "Upload failed, closing session");
            session.close().await;
        }
        result
    }

    pub async fn close<T: Transport>(&self, session: &mut Session<T>) {
        session.close().await;
    }

    /// Validate, open, upload, close. The session is closed on every path,
    /// and nothing is opened when validation fails.
    pub async fn send_file<T, F>(
        &self,
        transport: T,
        credentials: &Credentials,
        request: &TransferRequest,
        on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<TransferResult, UploadError>
    where
        T: Transport,
        F: FnMut(ProgressEvent),
    {
        credentials.validate()?;
        request.validate().await?;

        let mut session = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UploadError::Cancelled { bytes_sent: 0 }),
            session = self.open(transport, credentials) => session?,
        };

        let result = self.upload(&mut session, request, on_progress, cancel).await;
        session.close().await;
        result
    }

    /// [`send_file`](Self::send_file) with up to `config.retries` extra
    /// attempts after a retryable failure.
    ///
    /// Every attempt starts from byte 0 on a fresh transport from
    /// `make_transport`, under a new upload id. Flood control waits the
    /// server's `retry_after`; anything else waits `config.retry_delay`.
    /// Cancelling during the wait ends the loop with `Cancelled`.
    pub async fn send_with_retries<T, M, O>(
        &self,
        mut make_transport: M,
        credentials: &Credentials,
        request: &TransferRequest,
        observer: &mut O,
        cancel: &CancellationToken,
    ) -> Result<TransferResult, UploadError>
    where
        T: Transport,
        M: FnMut() -> T,
        O: UploadObserver,
    {
        let mut attempt: u32 = 0;
        loop {
            let err = match self
                .send_file(
                    make_transport(),
                    credentials,
                    request,
                    |event| observer.on_progress(event),
                    cancel,
                )
                .await
            {
                Ok(result) => return Ok(result),
                Err(e) => e,
            };

            if !err.is_retryable() || attempt >= self.config.retries {
                return Err(err);
            }
            attempt += 1;

            let wait = err.retry_after().unwrap_or(self.config.retry_delay);
            warn!(
                error = %err,
                attempt,
                retries = self.config.retries,
                wait_ms = wait.as_millis() as u64,
                "Upload failed, restarting from the beginning"
            );
            observer.on_retry(&err, attempt, wait);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UploadError::Cancelled { bytes_sent: 0 }),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    async fn upload_parts<T, O>(
        &self,
        session: &mut Session<T>,
        request: &TransferRequest,
        observer: &mut O,
        cancel: &CancellationToken,
    ) -> Result<TransferResult, UploadError>
    where
        T: Transport,
        O: UploadObserver,
    {
        let total_bytes = request.validate().await?;
        let mut reader =
            ChunkReader::open(&request.path, total_bytes, self.config.chunk_size).await?;
        let total_parts = reader.total_parts();
        let upload_id: i64 = rand::random();

        info!(
            upload_id,
            file = %request.path.display(),
            destination = %request.destination,
            total_bytes,
            total_parts,
            "Starting upload"
        );

        let upload = UploadInfo {
            upload_id,
            file_name: request.file_name(),
            mime_type: mime_for_path(&request.path),
            total_bytes,
            total_parts,
            destination: request.destination.clone(),
            thread_id: request.thread_id,
        };

        let transport = session.transport_mut()?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UploadError::Cancelled { bytes_sent: 0 }),
            begun = transport.begin(&upload) => begun.map_err(|e| mid_transfer(e, 0))?,
        }

        let mut bytes_sent: u64 = 0;
        let mut index: u32 = 0;

        while let Some(bytes) = reader.next_chunk().await? {
            if cancel.is_cancelled() {
                return Err(UploadError::Cancelled { bytes_sent });
            }

            let len = bytes.len() as u64;
            let part = FilePart {
                index,
                total_parts,
                bytes,
            };

            let transport = session.transport_mut()?;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UploadError::Cancelled { bytes_sent }),
                sent = transport.send_part(part) => sent.map_err(|e| mid_transfer(e, bytes_sent))?,
            }

            bytes_sent += len;
            index += 1;
            debug!(part = index, total_parts, bytes_sent, "Part acknowledged");

            observer.on_progress(ProgressEvent {
                bytes_sent,
                total_bytes,
            });
        }

        let transport = session.transport_mut()?;
        let remote_id = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UploadError::Cancelled { bytes_sent }),
            id = transport.finalize() => id.map_err(|e| mid_transfer(e, bytes_sent))?,
        };

        if remote_id.trim().is_empty() {
            return Err(UploadError::Transfer {
                reason: "server returned an empty message id".into(),
                bytes_sent,
            });
        }

        info!(remote_id = %remote_id, total_bytes, "Upload complete");

        Ok(TransferResult {
            remote_id,
            destination: request.destination.clone(),
            total_bytes,
            parts: total_parts,
        })
    }
}

// Transport-level failures once bytes are flowing carry how far we got;
// flood control and rejections pass through untouched
fn mid_transfer(err: UploadError, bytes_sent: u64) -> UploadError {
    match err {
        UploadError::Network(reason) => UploadError::Transfer { reason, bytes_sent },
        other => other,
    }
}
