use super::endpoint::Address;
use super::framing;
use crate::error::TransportError;
use std::io::{BufWriter, Write};
use std::net::TcpStream;
use std::os::unix::net::UnixStream;

/// Sending side of the pull endpoint: connects to a bound address and
/// pushes length-delimited frames.
pub struct PushSocket {
    writer: BufWriter<Box<dyn Write + Send>>,
    sent: u64,
}

impl PushSocket {
    pub fn connect(address: &str) -> Result<Self, TransportError> {
        let connect_err = |source| TransportError::Connect {
            address: address.to_string(),
            source,
        };

        let stream: Box<dyn Write + Send> = match Address::parse(address)? {
            Address::Tcp(host) => {
                let stream = TcpStream::connect(&host).map_err(connect_err)?;
                stream.set_nodelay(true).map_err(connect_err)?;
                Box::new(stream)
            }
            Address::Ipc(path) => Box::new(UnixStream::connect(&path).map_err(connect_err)?),
        };

        Ok(Self {
            writer: BufWriter::with_capacity(256 * 1024, stream),
            sent: 0,
        })
    }

    /// Queue one message. Frames are buffered; call [`flush`](Self::flush)
    /// (or drop the socket) to push out the tail.
    pub fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        framing::write_frame(&mut self.writer, payload).map_err(TransportError::Send)?;
        self.sent += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), TransportError> {
        self.writer.flush().map_err(TransportError::Send)
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }
}
