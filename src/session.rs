use tracing::{debug, warn};

use crate::errors::UploadError;
use crate::transport::Transport;
use crate::types::Credentials;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unopened,
    Open,
    Closed,
}

/// Authenticated channel owning its transport exclusively.
/// Lives for one process invocation and is never persisted.
pub struct Session<T: Transport> {
    transport: T,
    state: SessionState,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: SessionState::Unopened,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub(crate) fn transport_mut(&mut self) -> Result<&mut T, UploadError> {
        match self.state {
            SessionState::Open => Ok(&mut self.transport),
            _ => Err(UploadError::SessionNotOpen),
        }
    }

    // Unopened -> Open. A failed handshake still releases whatever
    // the transport allocated before returning the error
    pub(crate) async fn open(&mut self, credentials: &Credentials) -> Result<(), UploadError> {
        if self.state != SessionState::Unopened {
            return Err(UploadError::SessionReopened);
        }

        match self.transport.authenticate(credentials).await {
            Ok(()) => {
                self.state = SessionState::Open;
                debug!("Session opened");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Authentication failed, releasing connection");
                self.close().await;
                Err(e)
            }
        }
    }

    /// Any state -> Closed. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.transport.close().await;
        self.state = SessionState::Closed;
        debug!("Session closed");
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        // Can't await in drop; the transport's own drop frees the socket
        if self.state == SessionState::Open {
            warn!("Session dropped while still open");
        }
    }
}
