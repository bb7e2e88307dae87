#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Buffered telemetry sink that batches state records into an append-only log.
//!
//! The sink keeps the per-step path free of I/O: [`TelemetrySink::record`]
//! only pushes into an in-memory buffer, and rows reach the [`RecordLog`] in a
//! single batched append once the buffer holds `capacity` records or when the
//! run calls [`TelemetrySink::finalize`].

mod csv_log;

use std::path::PathBuf;

use simtrace_core::StateRecord;
use thiserror::Error;
use tracing::{debug, warn};

pub use csv_log::{read_log, CsvLog};

/// Buffer capacity used when the run configuration does not override it.
pub const DEFAULT_BUFFER_CAPACITY: usize = 500;

/// Durable destination for flushed telemetry batches.
pub trait RecordLog {
    /// Appends every record in `records`, in order, as one batch.
    fn append(&mut self, records: &[StateRecord]) -> Result<(), TelemetryError>;
}

/// Failures raised by the telemetry sink or its log.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A sink cannot be built with room for zero records.
    #[error("telemetry buffer capacity must be positive")]
    ZeroCapacity,
    /// Records were submitted after the sink was finalized.
    #[error("telemetry sink was already finalized")]
    Finalized,
    /// A previous append failed; the log is not written again.
    #[error("telemetry log is unusable after an earlier write failure")]
    Poisoned,
    /// The log file could not be created or written.
    #[error("telemetry log '{}' could not be written: {source}", path.display())]
    Io {
        /// Location of the log.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: std::io::Error,
    },
    /// The CSV encoder or decoder rejected a row.
    #[error("telemetry log row could not be encoded: {0}")]
    Csv(#[from] csv::Error),
    /// A log read back from disk did not start with the expected header.
    #[error("telemetry log header mismatch: found '{found}'")]
    UnexpectedHeader {
        /// Header row that was found instead.
        found: String,
    },
}

/// Counters describing the work a sink has done so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Records accepted through [`TelemetrySink::record`].
    pub records_accepted: u64,
    /// Rows handed to the log.
    pub rows_flushed: u64,
    /// Number of non-empty batches handed to the log.
    pub flushes: u64,
}

/// Stateful sink owning the telemetry buffer and its log.
#[derive(Debug)]
pub struct TelemetrySink<L> {
    log: L,
    buffer: Vec<StateRecord>,
    capacity: usize,
    finalized: bool,
    poisoned: bool,
    stats: SinkStats,
}

impl<L> TelemetrySink<L>
where
    L: RecordLog,
{
    /// Creates a sink that flushes into `log` every `capacity` records.
    pub fn new(log: L, capacity: usize) -> Result<Self, TelemetryError> {
        if capacity == 0 {
            return Err(TelemetryError::ZeroCapacity);
        }

        Ok(Self {
            log,
            buffer: Vec::with_capacity(capacity),
            capacity,
            finalized: false,
            poisoned: false,
            stats: SinkStats::default(),
        })
    }

    /// Buffers a record, flushing the whole buffer once it reaches capacity.
    pub fn record(&mut self, entry: StateRecord) -> Result<(), TelemetryError> {
        if self.finalized {
            return Err(TelemetryError::Finalized);
        }

        self.buffer.push(entry);
        self.stats.records_accepted += 1;

        if self.buffer.len() >= self.capacity {
            let _ = self.flush()?;
        }
        Ok(())
    }

    /// Writes the buffered records to the log in one batch and clears the buffer.
    ///
    /// Returns the number of rows written. An empty buffer performs no I/O.
    pub fn flush(&mut self) -> Result<usize, TelemetryError> {
        if self.poisoned {
            return Err(TelemetryError::Poisoned);
        }
        if self.buffer.is_empty() {
            return Ok(0);
        }

        if let Err(error) = self.log.append(&self.buffer) {
            self.poisoned = true;
            warn!(
                pending = self.buffer.len(),
                %error,
                "telemetry batch could not be written"
            );
            return Err(error);
        }

        let written = self.buffer.len();
        self.buffer.clear();
        self.stats.rows_flushed += written as u64;
        self.stats.flushes += 1;
        debug!(rows = written, flushes = self.stats.flushes, "flushed telemetry batch");
        Ok(written)
    }

    /// Flushes whatever remains in the buffer. Only the first call does any work.
    pub fn finalize(&mut self) -> Result<usize, TelemetryError> {
        if self.finalized {
            return Ok(0);
        }
        self.finalized = true;
        self.flush()
    }

    /// Number of records waiting for the next flush.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Configured flush threshold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reports whether [`TelemetrySink::finalize`] has run.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Counters accumulated since the sink was created.
    #[must_use]
    pub fn stats(&self) -> SinkStats {
        self.stats
    }

    /// Read-only access to the underlying log.
    #[must_use]
    pub fn log(&self) -> &L {
        &self.log
    }
}
