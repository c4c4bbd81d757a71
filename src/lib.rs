// Module naming follows project convention (Transport = pull side, Pool = disk writers)
#[allow(non_snake_case)]
pub mod Transport {
    pub mod endpoint;
    pub mod framing;
    pub mod push;
    pub mod stream;
    pub use endpoint::{Address, Endpoint, Message}; // re-export for stable path
    pub use push::PushSocket;
    pub use stream::StreamEndpoint;
}
#[allow(non_snake_case)]
pub mod Pool {
    pub mod sink;
    pub mod writer;
    pub use sink::{DiscardSink, DiskSink, PayloadSink, Persisted}; // re-export for stable path
    pub use writer::{PoolStats, WriterPool};
}
#[allow(non_snake_case)]
pub mod Stats {
    pub mod sequence;
    pub mod throughput;
    pub use sequence::{check, SequenceValidator};
    pub use throughput::{Snapshot, Stopwatch, CHECKPOINT_INTERVAL};
}
#[allow(non_snake_case)]
pub mod Core {
    pub mod host;
}
#[allow(non_snake_case)]
pub(crate) mod Debug {
    pub mod StructDebug;
}

pub mod config;
pub mod error;
pub mod runner;

pub use config::{RunConfig, Sink};
pub use error::{Error, Result};
pub use runner::{Phase, RunSummary, Runner};
