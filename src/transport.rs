//! The chunked-send channel an upload is driven through.
//!
//! A transport authenticates once, then carries one upload at a time:
//! `begin` announces the file and where it goes, parts follow strictly in
//! order (each call returns only once the part has been taken by the
//! connection), and `finalize` waits for the server to post the message.

pub mod bot_api;

use std::future::Future;

use crate::errors::UploadError;
use crate::types::Credentials;

pub use bot_api::BotApiTransport;

/// Everything known about a file before its first byte is sent.
#[derive(Debug, Clone)]
pub struct UploadInfo {
    pub upload_id: i64,
    pub file_name: String,
    pub mime_type: &'static str,
    pub total_bytes: u64,
    pub total_parts: u32,
    pub destination: String,
    pub thread_id: Option<i64>,
}

/// One chunk of the file as it goes over the wire.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub index: u32,
    pub total_parts: u32,
    pub bytes: Vec<u8>,
}

pub trait Transport: Send {
    fn authenticate(
        &mut self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<(), UploadError>> + Send;

    /// Starts a new upload. Any upload still pending is abandoned.
    fn begin(&mut self, upload: &UploadInfo) -> impl Future<Output = Result<(), UploadError>> + Send;

    /// Sends the next part and waits until the connection has taken it.
    fn send_part(&mut self, part: FilePart) -> impl Future<Output = Result<(), UploadError>> + Send;

    /// Completes the current upload and returns the identifier the server
    /// assigned to the posted message.
    fn finalize(&mut self) -> impl Future<Output = Result<String, UploadError>> + Send;

    /// Releases the connection. Must tolerate repeated calls.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}
