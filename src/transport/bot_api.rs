use std::io;
use std::time::Duration;

use futures::stream::{self, Stream};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::errors::UploadError;
use crate::transport::{FilePart, Transport, UploadInfo};
use crate::types::Credentials;

// Flood-control replies occasionally omit the hint
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

const SEND_DOCUMENT: &str = "sendDocument";

/// Bot API reply: `{"ok": true, "result": ...}` or
/// `{"ok": false, "error_code": 429, "description": "...", "parameters": {"retry_after": 30}}`
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<u16>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct BotUser {
    id: i64,
    is_bot: bool,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug)]
enum BodyFrame {
    Chunk(Vec<u8>, oneshot::Sender<()>),
    Finish,
}

/// A `sendDocument` request in flight. The `document` field is fed from
/// `frames`, one part at a time.
struct PendingUpload {
    frames: mpsc::Sender<BodyFrame>,
    request: JoinHandle<Result<SentMessage, UploadError>>,
}

enum PartOutcome {
    Taken,
    BodyClosed,
    TimedOut,
    Replied(Result<Result<SentMessage, UploadError>, JoinError>),
}

/// Talks to the Telegram Bot API (or a self-hosted `telegram-bot-api`
/// server). The whole file goes out as the streamed `document` field of a
/// single `sendDocument` call.
pub struct BotApiTransport {
    api_url: String,
    timeout: Duration,
    client: Option<Client>,
    token: Option<String>,
    pending: Option<PendingUpload>,
}

impl BotApiTransport {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
            client: None,
            token: None,
            pending: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    fn method_url(&self, method: &str) -> Result<String, UploadError> {
        let token = self.token.as_deref().ok_or(UploadError::SessionNotOpen)?;
        Ok(format!("{}/bot{}/{}", self.api_url, token, method))
    }

    fn client(&self) -> Result<&Client, UploadError> {
        self.client.as_ref().ok_or(UploadError::SessionNotOpen)
    }

    fn abandon_upload(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.request.abort();
            debug!("Pending sendDocument aborted");
        }
    }
}

impl Transport for BotApiTransport {
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<(), UploadError> {
        // No client-wide timeout: a sendDocument body can take far longer
        // than any single part. Each wait is bounded separately instead.
        let client = Client::builder()
            .connect_timeout(self.timeout)
            .user_agent(concat!("tgdrop/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UploadError::Network(format!("failed to create HTTP client: {}", e)))?;

        self.token = Some(credentials.bot_token().to_string());
        let url = self.method_url("getMe")?;

        let response = client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| network_error("getMe", e))?;
        self.client = Some(client);

        let me: BotUser = decode("getMe", response).await?;
        if !me.is_bot {
            return Err(UploadError::Authentication(
                "token does not belong to a bot account".into(),
            ));
        }

        debug!(bot_id = me.id, username = ?me.username, "Authenticated");
        Ok(())
    }

    async fn begin(&mut self, upload: &UploadInfo) -> Result<(), UploadError> {
        let client = self.client()?.clone();
        let url = self.method_url(SEND_DOCUMENT)?;
        self.abandon_upload();

        let (frames, receiver) = mpsc::channel(1);
        let document = Part::stream_with_length(
            Body::wrap_stream(body_stream(receiver)),
            upload.total_bytes,
        )
        .file_name(upload.file_name.clone())
        .mime_str(upload.mime_type)
        .map_err(|e| UploadError::Network(format!("bad content type {}: {}", upload.mime_type, e)))?;

        // Text fields ahead of the file so the server knows the chat before
        // the first byte of the document arrives
        let mut form = Form::new().text("chat_id", upload.destination.clone());
        if let Some(thread_id) = upload.thread_id {
            form = form.text("message_thread_id", thread_id.to_string());
        }
        let form = form.part("document", document);

        let request = tokio::spawn(async move {
            let response = client
                .post(url)
                .multipart(form)
                .send()
                .await
                .map_err(|e| network_error(SEND_DOCUMENT, e))?;
            decode::<SentMessage>(SEND_DOCUMENT, response).await
        });

        debug!(
            upload_id = upload.upload_id,
            total_parts = upload.total_parts,
            "sendDocument started"
        );
        self.pending = Some(PendingUpload { frames, request });
        Ok(())
    }

    async fn send_part(&mut self, part: FilePart) -> Result<(), UploadError> {
        self.client()?;
        let timeout = self.timeout;
        let index = part.index;
        let pending = self.pending.as_mut().ok_or_else(no_upload)?;

        let outcome = tokio::select! {
            taken = tokio::time::timeout(timeout, deliver(&pending.frames, part.bytes)) => match taken {
                Ok(true) => PartOutcome::Taken,
                Ok(false) => PartOutcome::BodyClosed,
                Err(_) => PartOutcome::TimedOut,
            },
            finished = &mut pending.request => PartOutcome::Replied(finished),
        };

        let err = match outcome {
            PartOutcome::Taken => return Ok(()),
            // The request ended underneath us; its own result says why
            PartOutcome::BodyClosed => match request_outcome((&mut pending.request).await) {
                Ok(_) => early_reply(index),
                Err(e) => e,
            },
            PartOutcome::TimedOut => UploadError::Network(format!(
                "part {} not taken within {}s",
                index,
                timeout.as_secs()
            )),
            PartOutcome::Replied(finished) => match request_outcome(finished) {
                Ok(_) => early_reply(index),
                Err(e) => e,
            },
        };

        self.abandon_upload();
        Err(err)
    }

    async fn finalize(&mut self) -> Result<String, UploadError> {
        self.client()?;
        let PendingUpload {
            frames,
            mut request,
        } = self.pending.take().ok_or_else(no_upload)?;

        // A closed body means the request already ended; awaiting it below
        // surfaces the reason
        let _ = frames.send(BodyFrame::Finish).await;
        drop(frames);

        let message = match tokio::time::timeout(self.timeout, &mut request).await {
            Ok(finished) => request_outcome(finished)?,
            Err(_) => {
                request.abort();
                return Err(UploadError::Network(format!(
                    "{} got no reply within {}s",
                    SEND_DOCUMENT,
                    self.timeout.as_secs()
                )));
            }
        };

        Ok(message.message_id.to_string())
    }

    async fn close(&mut self) {
        self.abandon_upload();
        // Dropping the client tears down its pooled connections
        if self.client.take().is_some() {
            debug!("HTTP client released");
        }
        self.token = None;
    }
}

// Body of the `document` field. Each chunk is acknowledged as the
// connection pulls it; the stream ends on `Finish` and fails if the sender
// goes away first, so a partial file is never posted.
fn body_stream(
    frames: mpsc::Receiver<BodyFrame>,
) -> impl Stream<Item = io::Result<Vec<u8>>> + Send + 'static {
    stream::unfold(Some(frames), |frames| async move {
        let Some(mut frames) = frames else {
            return None;
        };
        match frames.recv().await {
            Some(BodyFrame::Chunk(bytes, ack)) => {
                let _ = ack.send(());
                Some((Ok(bytes), Some(frames)))
            }
            Some(BodyFrame::Finish) => None,
            None => Some((
                Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "upload abandoned before its last part",
                )),
                None,
            )),
        }
    })
}

async fn deliver(frames: &mpsc::Sender<BodyFrame>, bytes: Vec<u8>) -> bool {
    let (ack, taken) = oneshot::channel();
    if frames.send(BodyFrame::Chunk(bytes, ack)).await.is_err() {
        return false;
    }
    taken.await.is_ok()
}

fn request_outcome(
    finished: Result<Result<SentMessage, UploadError>, JoinError>,
) -> Result<SentMessage, UploadError> {
    finished.map_err(|e| UploadError::Network(format!("{} task failed: {}", SEND_DOCUMENT, e)))?
}

fn early_reply(index: u32) -> UploadError {
    UploadError::Network(format!(
        "server replied before part {} was sent",
        index
    ))
}

fn no_upload() -> UploadError {
    UploadError::Transfer {
        reason: "no upload in progress".into(),
        bytes_sent: 0,
    }
}

fn network_error(method: &str, err: reqwest::Error) -> UploadError {
    if err.is_timeout() {
        UploadError::Network(format!("{} timed out", method))
    } else if err.is_connect() {
        UploadError::Network(format!("cannot reach server: {}", err.without_url()))
    } else {
        UploadError::Network(format!("{} failed: {}", method, err.without_url()))
    }
}

async fn decode<T: DeserializeOwned>(
    method: &str,
    response: reqwest::Response,
) -> Result<T, UploadError> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| network_error(method, e))?;

    let envelope: ApiResponse<T> = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            // Proxies and load balancers answer with HTML on failure
            warn!(method, %status, "Unparseable response: {}", e);
            return Err(api_error(method, status.as_u16(), None, None));
        }
    };

    if envelope.ok {
        return envelope
            .result
            .ok_or_else(|| UploadError::Network(format!("{} returned no result", method)));
    }

    let code = envelope.error_code.unwrap_or(status.as_u16());
    let retry_after = envelope.parameters.and_then(|p| p.retry_after);
    Err(api_error(method, code, envelope.description, retry_after))
}

fn api_error(
    method: &str,
    code: u16,
    description: Option<String>,
    retry_after: Option<u64>,
) -> UploadError {
    let description = description.unwrap_or_else(|| format!("HTTP {}", code));
    match code {
        401 => UploadError::Authentication(description),
        // The server answers 404 for a token it does not know, but only
        // getMe can tell that apart from a method the server lacks
        404 if method == "getMe" => UploadError::Authentication(description),
        404 => UploadError::RemoteRejected(format!("{}: {}", method, description)),
        429 => UploadError::RateLimited {
            retry_after: retry_after
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RETRY_AFTER),
        },
        400 | 403 => UploadError::RemoteRejected(description),
        _ => UploadError::Network(description),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_api_error_mapping() {
        assert!(matches!(
            api_error("getMe", 401, Some("Unauthorized".into()), None),
            UploadError::Authentication(_)
        ));
        assert!(matches!(
            api_error(SEND_DOCUMENT, 400, Some("Bad Request: chat not found".into()), None),
            UploadError::RemoteRejected(msg) if msg.contains("chat not found")
        ));
        assert!(matches!(
            api_error(SEND_DOCUMENT, 502, None, None),
            UploadError::Network(msg) if msg == "HTTP 502"
        ));
    }

    #[test]
    fn test_not_found_means_bad_token_only_for_get_me() {
        assert!(matches!(
            api_error("getMe", 404, Some("Not Found".into()), None),
            UploadError::Authentication(_)
        ));
        match api_error(SEND_DOCUMENT, 404, Some("Not Found".into()), None) {
            UploadError::RemoteRejected(msg) => assert_eq!(msg, "sendDocument: Not Found"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_rate_limit_defaults_when_hint_missing() {
        match api_error(SEND_DOCUMENT, 429, None, None) {
            UploadError::RateLimited { retry_after } => {
                assert_eq!(retry_after, DEFAULT_RETRY_AFTER)
            }
            other => panic!("unexpected error: {:?}", other),
        }
        match api_error(SEND_DOCUMENT, 429, None, Some(30)) {
            UploadError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(30))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_envelope_parses_flood_control() {
        let raw = r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 30","parameters":{"retry_after":30}}"#;
        let envelope: ApiResponse<bool> = serde_json::from_str(raw).unwrap();
        assert!(!envelope.ok);
        assert_eq!(envelope.error_code, Some(429));
        assert_eq!(envelope.parameters.and_then(|p| p.retry_after), Some(30));
    }

    #[tokio::test]
    async fn test_body_stream_acks_each_chunk_and_ends_on_finish() {
        let (frames, receiver) = mpsc::channel(1);
        let mut body = Box::pin(body_stream(receiver));

        let (ack, taken) = oneshot::channel();
        frames.send(BodyFrame::Chunk(vec![1, 2], ack)).await.unwrap();
        assert_eq!(body.next().await.unwrap().unwrap(), vec![1, 2]);
        taken.await.unwrap();

        frames.send(BodyFrame::Finish).await.unwrap();
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn test_body_stream_fails_when_abandoned() {
        let (frames, receiver) = mpsc::channel(1);
        let mut body = Box::pin(body_stream(receiver));

        let (ack, _taken) = oneshot::channel();
        frames.send(BodyFrame::Chunk(vec![9], ack)).await.unwrap();
        assert!(body.next().await.unwrap().is_ok());

        drop(frames);
        assert!(body.next().await.unwrap().is_err());
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn test_calls_before_authenticate_fail() {
        let mut transport = BotApiTransport::new(&ClientConfig::default());
        assert!(!transport.is_connected());
        let result = transport
            .send_part(FilePart {
                index: 0,
                total_parts: 1,
                bytes: vec![1, 2, 3],
            })
            .await;
        assert!(matches!(result, Err(UploadError::SessionNotOpen)));
        assert!(matches!(
            transport.finalize().await,
            Err(UploadError::SessionNotOpen)
        ));

        // close on a never-opened transport is a no-op
        transport.close().await;
        transport.close().await;
    }
}
