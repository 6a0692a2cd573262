use crate::processing::csv_writer::write_cell_table;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

/// State written at one step: grid description, distance and any selected fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub nx: usize,
    pub ny: usize,
    pub dx: Vec<f64>,
    pub dy: Vec<f64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub distance: Vec<f64>,
    pub fields: BTreeMap<String, Vec<f64>>,
    pub total_current: f64,
}

/// Sink for snapshots. Writing the same step index twice replaces the first write.
pub trait SnapshotWriter {
    fn write(&mut self, elapsed: f64, step: usize, snapshot: &Snapshot) -> io::Result<()>;
}

/// Keeps snapshots in memory, keyed by step.
#[derive(Debug, Default, Clone)]
pub struct MemorySnapshotWriter {
    pub records: BTreeMap<usize, (f64, Snapshot)>,
}

impl SnapshotWriter for MemorySnapshotWriter {
    fn write(&mut self, elapsed: f64, step: usize, snapshot: &Snapshot) -> io::Result<()> {
        self.records.insert(step, (elapsed, snapshot.clone()));
        Ok(())
    }
}

#[derive(Serialize)]
struct SnapshotMeta<'a> {
    elapsed_time: f64,
    step: usize,
    nx: usize,
    ny: usize,
    dx: &'a [f64],
    dy: &'a [f64],
    total_current: f64,
    fields: Vec<&'a str>,
}

/// Writes `step_NNNNNN.csv` (one row per cell) and a `step_NNNNNN.json`
/// sidecar with the elapsed time and grid spacings.
#[derive(Debug, Clone)]
pub struct CsvSnapshotWriter {
    dir: PathBuf,
}

impl CsvSnapshotWriter {
    pub fn new(dir: impl AsRef<Path>) -> io::Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    pub fn csv_path(&self, step: usize) -> PathBuf {
        self.dir.join(format!("step_{step:06}.csv"))
    }

    pub fn meta_path(&self, step: usize) -> PathBuf {
        self.dir.join(format!("step_{step:06}.json"))
    }
}

impl SnapshotWriter for CsvSnapshotWriter {
    fn write(&mut self, elapsed: f64, step: usize, snapshot: &Snapshot) -> io::Result<()> {
        let mut columns: Vec<(&str, &[f64])> = vec![
            ("x", snapshot.x.as_slice()),
            ("y", snapshot.y.as_slice()),
            ("distance", snapshot.distance.as_slice()),
        ];
        columns.extend(snapshot.fields.iter().map(|(name, values)| (name.as_str(), values.as_slice())));
        write_cell_table(self.csv_path(step), &columns)?;

        let meta = SnapshotMeta {
            elapsed_time: elapsed,
            step,
            nx: snapshot.nx,
            ny: snapshot.ny,
            dx: &snapshot.dx,
            dy: &snapshot.dy,
            total_current: snapshot.total_current,
            fields: snapshot.fields.keys().map(String::as_str).collect(),
        };
        let file = BufWriter::new(File::create(self.meta_path(step))?);
        serde_json::to_writer_pretty(file, &meta).map_err(io::Error::other)?;
        log::debug!("snapshot {step} written to {}", self.dir.display());
        Ok(())
    }
}
