//! Direct-socket channel over TCP.
//!
//! A client connects, sends the console handle on the first line, and from
//! then on every byte it sends is console input. Output for the handle is
//! streamed back on the same connection as it is produced.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use termhost_core::{ConsoleHandle, Error, Result};
use termhost_pty::Utf8Decoder;
use termhost_session::{ChannelRegistry, SocketCallbacks};

const READ_BUFFER_SIZE: usize = 4096;

struct Binding {
    callbacks: Arc<dyn SocketCallbacks>,
    writer: Option<mpsc::UnboundedSender<String>>,
}

#[derive(Default)]
struct RegistryState {
    port: Option<u16>,
    bindings: HashMap<ConsoleHandle, Binding>,
}

/// TCP implementation of the direct-socket channel registry.
pub struct TcpChannelRegistry {
    bind_address: String,
    runtime: Handle,
    state: Arc<Mutex<RegistryState>>,
}

impl TcpChannelRegistry {
    /// Create a registry that serves on `bind_address` using `runtime`.
    ///
    /// Nothing is bound until the first `ensure_server_running`.
    pub fn new(bind_address: impl Into<String>, runtime: Handle) -> Self {
        Self {
            bind_address: bind_address.into(),
            runtime,
            state: Arc::new(Mutex::new(RegistryState::default())),
        }
    }

    /// Whether `handle` has a registration.
    pub fn is_listening(&self, handle: &ConsoleHandle) -> bool {
        self.state.lock().bindings.contains_key(handle)
    }
}

impl ChannelRegistry for TcpChannelRegistry {
    fn ensure_server_running(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.port.is_some() {
            return Ok(());
        }

        let listener = std::net::TcpListener::bind((self.bind_address.as_str(), 0))
            .map_err(|e| Error::ChannelError(format!("bind {}: {}", self.bind_address, e)))?;
        listener.set_nonblocking(true)?;
        let port = listener.local_addr()?.port();

        let listener = {
            let _guard = self.runtime.enter();
            TcpListener::from_std(listener)?
        };

        info!("Direct socket listening: address={}, port={}", self.bind_address, port);
        self.runtime
            .spawn(accept_loop(listener, Arc::clone(&self.state)));
        state.port = Some(port);
        Ok(())
    }

    fn listen(&self, handle: &ConsoleHandle, callbacks: Arc<dyn SocketCallbacks>) -> Result<()> {
        let mut state = self.state.lock();
        if state.port.is_none() {
            return Err(Error::ChannelError("socket server is not running".to_string()));
        }
        debug!("Listening for console: handle={}", handle);
        state.bindings.insert(
            handle.clone(),
            Binding {
                callbacks,
                writer: None,
            },
        );
        Ok(())
    }

    fn stop_listening(&self, handle: &ConsoleHandle) {
        if self.state.lock().bindings.remove(handle).is_some() {
            debug!("Stopped listening for console: handle={}", handle);
        }
    }

    fn send_text(&self, handle: &ConsoleHandle, text: &str) {
        let state = self.state.lock();
        let Some(writer) = state.bindings.get(handle).and_then(|b| b.writer.as_ref()) else {
            debug!("No socket client, dropping output: handle={}, bytes={}", handle, text.len());
            return;
        };
        if writer.send(text.to_string()).is_err() {
            debug!("Socket writer closed: handle={}", handle);
        }
    }

    fn port(&self) -> u16 {
        self.state.lock().port.unwrap_or(0)
    }
}

async fn accept_loop(listener: TcpListener, state: Arc<Mutex<RegistryState>>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("Socket client connected: peer={}", peer);
                tokio::spawn(serve_connection(stream, Arc::clone(&state)));
            }
            Err(e) => {
                warn!("Socket accept failed: {}", e);
            }
        }
    }
}

async fn serve_connection(stream: TcpStream, state: Arc<Mutex<RegistryState>>) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let mut handshake = String::new();
    match reader.read_line(&mut handshake).await {
        Ok(0) | Err(_) => return,
        Ok(_) => {}
    }
    let handle = ConsoleHandle::from(handshake.trim());

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let callbacks = {
        let mut state = state.lock();
        let Some(binding) = state.bindings.get_mut(&handle) else {
            warn!("Socket client named an unknown console: handle={}", handle);
            return;
        };
        binding.writer = Some(tx);
        Arc::clone(&binding.callbacks)
    };
    callbacks.on_connection_opened();

    tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if writer.write_all(text.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let mut decoder = Utf8Decoder::new();
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.decode(&buffer[..n]);
                if text.is_empty() {
                    continue;
                }
                // delivery takes process locks and writes to the pty
                let target = Arc::clone(&callbacks);
                let delivered =
                    tokio::task::spawn_blocking(move || target.on_received_input(&text)).await;
                if let Err(e) = delivered {
                    warn!("Socket input delivery failed: handle={}, error={}", handle, e);
                    break;
                }
            }
            Err(e) => {
                debug!("Socket read failed: handle={}, error={}", handle, e);
                break;
            }
        }
    }

    debug!("Socket client disconnected: handle={}", handle);
    callbacks.on_connection_closed();
}
