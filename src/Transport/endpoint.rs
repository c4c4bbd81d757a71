// Pull-side endpoint abstraction and the message type it yields

use crate::error::TransportError;
use byteorder::{ByteOrder, LittleEndian};
use std::fmt;
use std::path::PathBuf;

/// Width of the sequence counter at the front of every payload.
pub const SEQUENCE_LEN: usize = 4;

/// One complete message as pulled off an endpoint.
///
/// The first [`SEQUENCE_LEN`] bytes carry a little-endian `u32` counter
/// that the sender increments by one per message. The buffer has a single
/// owner at a time; handing it to the writer pool moves it.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    payload: Vec<u8>,
}

impl Message {
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }

    /// Build a `size`-byte payload carrying `sequence` in its counter bytes.
    /// Payloads shorter than the counter get as many bytes of it as fit.
    pub fn with_sequence(sequence: u32, size: usize) -> Self {
        let mut payload = vec![0u8; size];
        if size >= SEQUENCE_LEN {
            LittleEndian::write_u32(&mut payload[..SEQUENCE_LEN], sequence);
        } else {
            payload.copy_from_slice(&sequence.to_le_bytes()[..size]);
        }
        Self { payload }
    }

    /// Decode the sequence counter, or `None` if the payload is too short.
    pub fn sequence(&self) -> Option<u32> {
        if self.payload.len() < SEQUENCE_LEN {
            return None;
        }
        Some(LittleEndian::read_u32(&self.payload[..SEQUENCE_LEN]))
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("len", &self.payload.len())
            .field("sequence", &self.sequence())
            .finish()
    }
}

/// A bound, pull-style source of messages.
///
/// `receive` blocks until one complete message is available and returns
/// messages in arrival order. Only the main loop reads from an endpoint.
pub trait Endpoint: Send {
    fn receive(&mut self) -> Result<Message, TransportError>;

    /// Release the underlying resources. Calling it twice is harmless.
    fn close(&mut self) -> Result<(), TransportError>;
}

impl<E: Endpoint + ?Sized> Endpoint for Box<E> {
    fn receive(&mut self) -> Result<Message, TransportError> {
        (**self).receive()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }
}

/// A parsed endpoint address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// `tcp://host:port`, with `*` standing for every interface.
    Tcp(String),
    /// `ipc://path` (Unix domain socket).
    Ipc(PathBuf),
}

impl Address {
    pub fn parse(address: &str) -> Result<Self, TransportError> {
        let unsupported = || TransportError::UnsupportedScheme(address.to_string());

        if let Some(rest) = address.strip_prefix("tcp://") {
            let (host, port) = rest.rsplit_once(':').ok_or_else(unsupported)?;
            if port.parse::<u16>().is_err() {
                return Err(unsupported());
            }
            let host = match host {
                "*" | "" => "0.0.0.0",
                other => other,
            };
            return Ok(Address::Tcp(format!("{host}:{port}")));
        }

        if let Some(path) = address.strip_prefix("ipc://") {
            if path.is_empty() {
                return Err(unsupported());
            }
            return Ok(Address::Ipc(PathBuf::from(path)));
        }

        Err(unsupported())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_little_endian() {
        let msg = Message::new(vec![0x01, 0x02, 0x00, 0x00, 0xff]);
        assert_eq!(msg.sequence(), Some(0x0201));

        let msg = Message::with_sequence(499, 1024);
        assert_eq!(msg.len(), 1024);
        assert_eq!(msg.sequence(), Some(499));
        assert!(msg.as_bytes()[SEQUENCE_LEN..].iter().all(|&b| b == 0));
    }

    #[test]
    fn short_payload_has_no_sequence() {
        assert_eq!(Message::new(vec![1, 2, 3]).sequence(), None);
        assert_eq!(Message::with_sequence(7, 2).as_bytes(), &[7, 0]);
        assert!(Message::with_sequence(7, 0).is_empty());
    }

    #[test]
    fn addresses() {
        assert_eq!(
            Address::parse("tcp://*:5555").unwrap(),
            Address::Tcp("0.0.0.0:5555".into())
        );
        assert_eq!(
            Address::parse("tcp://127.0.0.1:0").unwrap(),
            Address::Tcp("127.0.0.1:0".into())
        );
        assert_eq!(
            Address::parse("ipc:///tmp/thr.sock").unwrap(),
            Address::Ipc(PathBuf::from("/tmp/thr.sock"))
        );

        for bad in ["pgm://eth0;239.192.1.1:5555", "tcp://nohost", "tcp://h:port", "ipc://", "5555"] {
            assert!(
                matches!(Address::parse(bad), Err(TransportError::UnsupportedScheme(_))),
                "{bad} should be rejected"
            );
        }
    }
}
