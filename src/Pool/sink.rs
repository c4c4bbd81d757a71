// Destinations a writer task hands its payload to

use crate::config::{data_file, Sink};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

/// What happened to a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persisted {
    Written(usize),
    Discarded,
}

/// Something a writer task can persist a payload into.
///
/// Called from writer threads, one payload at a time per slot.
pub trait PayloadSink: Send + Sync {
    fn persist(&self, sequence_id: u64, payload: &[u8]) -> io::Result<Persisted>;
}

/// Network-only runs: payloads are dropped without any I/O.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

impl PayloadSink for DiscardSink {
    fn persist(&self, _sequence_id: u64, _payload: &[u8]) -> io::Result<Persisted> {
        Ok(Persisted::Discarded)
    }
}

/// One file per message at `<root>/data/test%06d.dat`, raw payload bytes.
#[derive(Debug, Clone)]
pub struct DiskSink {
    root: PathBuf,
}

impl DiskSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn file_path(&self, sequence_id: u64) -> PathBuf {
        data_file(&self.root, sequence_id)
    }

    /// Create `<root>/data` if it is missing.
    pub fn ensure_data_dir(&self) -> io::Result<()> {
        fs::create_dir_all(self.root.join("data"))
    }
}

impl PayloadSink for DiskSink {
    fn persist(&self, sequence_id: u64, payload: &[u8]) -> io::Result<Persisted> {
        let path = self.file_path(sequence_id);
        let mut file = File::create(&path).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("failed to open file {}: {e}", path.display()),
            )
        })?;
        file.write_all(payload).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("failed to write file {}: {e}", path.display()),
            )
        })?;
        Ok(Persisted::Written(payload.len()))
    }
}

impl Sink {
    pub fn into_payload_sink(self) -> Arc<dyn PayloadSink> {
        match self {
            Sink::Discard => Arc::new(DiscardSink),
            Sink::Directory(root) => Arc::new(DiskSink::new(root)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_sink_truncates_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiskSink::new(dir.path());
        sink.ensure_data_dir().unwrap();

        assert_eq!(sink.persist(7, &[9u8; 64]).unwrap(), Persisted::Written(64));
        assert_eq!(sink.persist(7, &[1u8; 8]).unwrap(), Persisted::Written(8));

        let written = fs::read(dir.path().join("data/test000007.dat")).unwrap();
        assert_eq!(written, vec![1u8; 8]);
    }

    #[test]
    fn missing_data_dir_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiskSink::new(dir.path());

        let err = sink.persist(3, b"abcd").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("test000003.dat"), "{err}");
    }

    #[test]
    fn discard_sink_touches_nothing() {
        let sink = Sink::Discard.into_payload_sink();
        assert_eq!(sink.persist(0, b"abcd").unwrap(), Persisted::Discarded);
    }
}
