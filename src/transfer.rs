pub mod chunk;
pub mod client;
pub mod mime;
pub mod progress;

pub use client::TransferClient;
pub use progress::UploadObserver;
