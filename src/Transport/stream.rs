// Socket-backed pull endpoint for tcp:// and ipc:// addresses

use super::endpoint::{Address, Endpoint, Message};
use super::framing::{self, ReadOutcome};
use crate::error::TransportError;
use std::fs;
use std::io::{self, Read};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// How often a blocked accept/receive looks at the stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub(crate) enum Listener {
    Tcp(TcpListener),
    Ipc(UnixListener, PathBuf),
}

pub(crate) enum Peer {
    Tcp(TcpStream),
    Ipc(UnixStream),
}

impl Listener {
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        match self {
            Listener::Tcp(l) => l.set_nonblocking(nonblocking),
            Listener::Ipc(l, _) => l.set_nonblocking(nonblocking),
        }
    }

    fn accept(&self) -> io::Result<Peer> {
        match self {
            Listener::Tcp(l) => l.accept().map(|(s, _)| Peer::Tcp(s)),
            Listener::Ipc(l, _) => l.accept().map(|(s, _)| Peer::Ipc(s)),
        }
    }
}

impl Peer {
    fn configure(&self, read_timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Peer::Tcp(s) => {
                s.set_nonblocking(false)?;
                s.set_nodelay(true)?;
                s.set_read_timeout(read_timeout)
            }
            Peer::Ipc(s) => {
                s.set_nonblocking(false)?;
                s.set_read_timeout(read_timeout)
            }
        }
    }
}

impl Read for Peer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Peer::Tcp(s) => s.read(buf),
            Peer::Ipc(s) => s.read(buf),
        }
    }
}

/// A bound pull socket.
///
/// One pushing peer is served at a time. When it hangs up between frames
/// the endpoint goes back to accepting, so a sender may reconnect.
pub struct StreamEndpoint {
    pub(crate) address: String,
    pub(crate) listener: Option<Listener>,
    pub(crate) peer: Option<Peer>,
    pub(crate) running: Option<Arc<AtomicBool>>,
    pub(crate) received: u64,
}

impl StreamEndpoint {
    pub fn bind(address: &str) -> Result<Self, TransportError> {
        let bind_err = |source| TransportError::Bind {
            address: address.to_string(),
            source,
        };

        let listener = match Address::parse(address)? {
            Address::Tcp(host) => Listener::Tcp(TcpListener::bind(&host).map_err(bind_err)?),
            Address::Ipc(path) => {
                // a previous run may have left its socket file behind
                if path.exists() {
                    fs::remove_file(&path).map_err(bind_err)?;
                }
                Listener::Ipc(UnixListener::bind(&path).map_err(bind_err)?, path)
            }
        };

        info!(address, "endpoint bound");
        Ok(Self {
            address: address.to_string(),
            listener: Some(listener),
            peer: None,
            running: None,
            received: 0,
        })
    }

    /// Make blocking calls give up with [`TransportError::Interrupted`]
    /// once `running` is cleared.
    pub fn with_interrupt(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = Some(running);
        self
    }

    /// The bound TCP address, useful after binding port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.listener {
            Some(Listener::Tcp(l)) => l.local_addr().ok(),
            _ => None,
        }
    }

    fn stopped(&self) -> bool {
        self.running
            .as_ref()
            .map(|flag| !flag.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Wait for the next pushing peer. `Ok(None)` means interrupted.
    fn accept(&mut self) -> Result<Option<Peer>, TransportError> {
        let listener = self.listener.as_ref().ok_or(TransportError::Closed)?;
        let polling = self.running.is_some();
        listener
            .set_nonblocking(polling)
            .map_err(TransportError::Accept)?;

        loop {
            match listener.accept() {
                Ok(peer) => {
                    peer.configure(polling.then_some(POLL_INTERVAL))
                        .map_err(TransportError::Accept)?;
                    debug!(address = %self.address, "peer connected");
                    return Ok(Some(peer));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if self.stopped() {
                        return Ok(None);
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::Accept(e)),
            }
        }
    }
}

impl Endpoint for StreamEndpoint {
    fn receive(&mut self) -> Result<Message, TransportError> {
        loop {
            if self.peer.is_none() {
                let peer = self.accept()?.ok_or(TransportError::Interrupted)?;
                self.peer = Some(peer);
            }

            let outcome = match self.peer.as_mut() {
                Some(peer) => framing::read_frame(peer, self.running.as_deref())?,
                None => continue,
            };

            match outcome {
                ReadOutcome::Frame(payload) => {
                    self.received += 1;
                    return Ok(Message::new(payload));
                }
                ReadOutcome::Closed => {
                    debug!(address = %self.address, received = self.received, "peer hung up");
                    self.peer = None;
                }
                ReadOutcome::Interrupted => return Err(TransportError::Interrupted),
            }
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.peer = None;
        if let Some(Listener::Ipc(listener, path)) = self.listener.take() {
            drop(listener);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(TransportError::Close(e)),
            }
        }
        Ok(())
    }
}

impl Drop for StreamEndpoint {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for StreamEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        crate::Debug::StructDebug::debug_stream_endpoint(self, f)
    }
}
