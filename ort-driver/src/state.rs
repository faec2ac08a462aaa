//! Shared state for one driver run

use crate::config::DriverConfig;
use crate::sinks::{OutputRecord, Sink};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// State every session task holds a clone of
#[derive(Clone)]
pub struct RunState {
    pub config: Arc<DriverConfig>,

    /// Cancelled on Ctrl-C; sessions stop at their next frame
    pub cancel: CancellationToken,

    /// Fan-out to the sink writer tasks
    pub outputs: OutputHub,
}

impl RunState {
    pub fn new(config: DriverConfig, cancel: CancellationToken, outputs: OutputHub) -> Self {
        Self {
            config: Arc::new(config),
            cancel,
            outputs,
        }
    }
}

/// Delivers every record to every sink
///
/// Each sink has its own bounded channel, so a slow sink applies
/// backpressure to the sessions instead of dropping records.
#[derive(Clone, Default)]
pub struct OutputHub {
    senders: Vec<mpsc::Sender<Arc<OutputRecord>>>,
}

impl OutputHub {
    /// Start a writer task for `sink` and route records to it
    pub fn attach(&mut self, name: String, sink: Box<dyn Sink>, buffer: usize) -> JoinHandle<u64> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        self.senders.push(tx);
        tokio::spawn(write_records(name, sink, rx))
    }

    pub fn sink_count(&self) -> usize {
        self.senders.len()
    }

    /// Send a record to all sinks; false once no sink is accepting records
    pub async fn publish(&self, record: OutputRecord) -> bool {
        let record = Arc::new(record);
        let mut delivered = false;
        for tx in &self.senders {
            if tx.send(record.clone()).await.is_ok() {
                delivered = true;
            }
        }
        delivered
    }
}

/// Sink writer loop; returns the number of records written
async fn write_records(
    name: String,
    mut sink: Box<dyn Sink>,
    mut rx: mpsc::Receiver<Arc<OutputRecord>>,
) -> u64 {
    let mut written = 0;
    while let Some(record) = rx.recv().await {
        match sink.send(&record) {
            Ok(()) => written += 1,
            Err(e) => {
                error!("Sink {} failed, closing it: {:#}", name, e);
                return written;
            }
        }
    }
    if let Err(e) = sink.flush() {
        error!("Error flushing sink {}: {:#}", name, e);
    }
    info!("Sink {} closed after {} records", name, written);
    written
}
