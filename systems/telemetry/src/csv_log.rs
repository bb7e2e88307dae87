//! Comma-separated output log backing the telemetry sink.

use std::{
    fmt,
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
};

use simtrace_core::{EntityId, StateRecord, StepIndex, Vec3, LOG_HEADER};
use tracing::info;

use crate::{RecordLog, TelemetryError};

type Row = (u64, u32, f64, f64, f64, f64, f64, f64);

/// Append-only CSV log owned by a single run.
pub struct CsvLog {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl fmt::Debug for CsvLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsvLog").field("path", &self.path).finish()
    }
}

impl CsvLog {
    /// Removes any existing file at `path` and starts a fresh log with the header row.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, TelemetryError> {
        let path = path.as_ref().to_path_buf();

        match fs::remove_file(&path) {
            Ok(()) => info!(path = %path.display(), "removed previous telemetry log"),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => return Err(io_error(&path, error)),
        }

        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)
            .map_err(|error| io_error(&path, error))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(LOG_HEADER)?;
        writer.flush().map_err(|error| io_error(&path, error))?;

        Ok(Self { path, writer })
    }

    /// Location of the log on disk.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordLog for CsvLog {
    fn append(&mut self, records: &[StateRecord]) -> Result<(), TelemetryError> {
        for record in records {
            self.writer.serialize(to_row(record))?;
        }
        self.writer
            .flush()
            .map_err(|error| io_error(&self.path, error))
    }
}

/// Parses a log written by [`CsvLog`] back into records.
pub fn read_log(path: impl AsRef<Path>) -> Result<Vec<StateRecord>, TelemetryError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|error| io_error(path, error))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(file);

    let header = reader.headers()?;
    if !header.iter().eq(LOG_HEADER.iter().copied()) {
        return Err(TelemetryError::UnexpectedHeader {
            found: header.iter().collect::<Vec<_>>().join(","),
        });
    }

    reader
        .deserialize::<Row>()
        .map(|row| row.map(from_row).map_err(TelemetryError::from))
        .collect()
}

fn to_row(record: &StateRecord) -> Row {
    let position = record.position();
    let velocity = record.velocity();
    (
        record.step().get(),
        record.entity_id().get(),
        position.x,
        position.y,
        position.z,
        velocity.x,
        velocity.y,
        velocity.z,
    )
}

fn from_row((step, id, x, y, z, vx, vy, vz): Row) -> StateRecord {
    StateRecord::new(
        StepIndex::new(step),
        EntityId::new(id),
        Vec3::new(x, y, z),
        Vec3::new(vx, vy, vz),
    )
}

fn io_error(path: &Path, source: io::Error) -> TelemetryError {
    TelemetryError::Io {
        path: path.to_path_buf(),
        source,
    }
}
