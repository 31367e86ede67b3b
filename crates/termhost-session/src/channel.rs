//! Channel selection and the direct-socket seam.

use std::sync::{Arc, Weak};

use tracing::{debug, warn};

use termhost_core::{ChannelMode, ConsoleHandle, Result};

use crate::process::ConsoleProcess;

/// Callbacks from the direct-socket server for one console process.
///
/// Invoked on the socket server's threads, never the process's own.
pub trait SocketCallbacks: Send + Sync {
    /// Input typed by the client.
    fn on_received_input(&self, input: &str);

    /// A client connected.
    fn on_connection_opened(&self);

    /// The client disconnected.
    fn on_connection_closed(&self);
}

/// The direct-socket server, as seen by console processes.
pub trait ChannelRegistry: Send + Sync {
    /// Start the server if it is not running yet.
    fn ensure_server_running(&self) -> Result<()>;

    /// Route connections for `handle` to `callbacks`, replacing any earlier registration.
    fn listen(&self, handle: &ConsoleHandle, callbacks: Arc<dyn SocketCallbacks>) -> Result<()>;

    /// Drop the registration for `handle`.
    fn stop_listening(&self, handle: &ConsoleHandle);

    /// Push output to the client connected for `handle`.
    fn send_text(&self, handle: &ConsoleHandle, text: &str);

    /// Port the server listens on.
    fn port(&self) -> u16;
}

/// Pick the channel for a (re)started process.
///
/// Prefers the direct socket when enabled. If the server cannot start, falls
/// back to request/response; the failure is logged and goes no further.
pub fn select_channel(registry: &dyn ChannelRegistry, enable_socket: bool) -> ChannelMode {
    if !enable_socket {
        return ChannelMode::RequestResponse;
    }

    match registry.ensure_server_running() {
        Ok(()) => ChannelMode::DirectSocket {
            port: registry.port(),
        },
        Err(e) => {
            warn!("Direct socket unavailable, using request/response: {}", e);
            ChannelMode::RequestResponse
        }
    }
}

/// Socket callbacks bound to a console process.
///
/// Holds the process weakly so a registration left behind in the socket
/// server does not keep it alive.
pub struct SocketConnection {
    process: Weak<ConsoleProcess>,
}

impl SocketConnection {
    /// Bind callbacks to `process`.
    pub fn new(process: &Arc<ConsoleProcess>) -> Self {
        Self {
            process: Arc::downgrade(process),
        }
    }
}

impl SocketCallbacks for SocketConnection {
    fn on_received_input(&self, input: &str) {
        if let Some(process) = self.process.upgrade() {
            process.receive_input(input);
        }
    }

    fn on_connection_opened(&self) {
        if let Some(process) = self.process.upgrade() {
            debug!("Socket connection opened: handle={}", process.handle());
        }
    }

    fn on_connection_closed(&self) {
        if let Some(process) = self.process.upgrade() {
            debug!("Socket connection closed: handle={}", process.handle());
            process.stop_listening();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingChannels;

    #[test]
    fn test_select_disabled() {
        let channels = RecordingChannels::new();
        assert_eq!(select_channel(&channels, false), ChannelMode::RequestResponse);
    }

    #[test]
    fn test_select_direct_socket() {
        let channels = RecordingChannels::new();
        assert_eq!(
            select_channel(&channels, true),
            ChannelMode::DirectSocket { port: 8765 }
        );
    }

    #[test]
    fn test_select_falls_back() {
        let channels = RecordingChannels::failing();
        assert_eq!(select_channel(&channels, true), ChannelMode::RequestResponse);
        assert_eq!(channels.listen_calls(), 0);
    }
}
