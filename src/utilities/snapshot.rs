//! Snapshot sinks for periodic wavefield output

use crate::engine::array::WaveArray;
use crate::error::{Result, SimulationError};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    /// ASCII MATLAB script, one value per line
    #[default]
    Matlab,
    /// Discard snapshots
    None,
}

/// Receives the wavefield at diagnostic steps
pub trait SnapshotSink {
    /// Persist `field` for `step`; returns the artifact path if one was written
    fn write(&mut self, field: &WaveArray<f64>, step: usize) -> Result<Option<PathBuf>>;
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSnapshotSink;

impl SnapshotSink for NullSnapshotSink {
    fn write(&mut self, _field: &WaveArray<f64>, _step: usize) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

/// Keeps copies in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotSink {
    pub snapshots: Vec<(usize, WaveArray<f64>)>,
}

impl MemorySnapshotSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> Vec<usize> {
        self.snapshots.iter().map(|(step, _)| *step).collect()
    }
}

impl SnapshotSink for MemorySnapshotSink {
    fn write(&mut self, field: &WaveArray<f64>, step: usize) -> Result<Option<PathBuf>> {
        self.snapshots.push((step, field.clone()));
        Ok(None)
    }
}

/// Writes `<directory>/<prefix><step>.m` in the ASCII MATLAB vector layout
#[derive(Debug, Clone)]
pub struct MatlabSnapshotSink {
    directory: PathBuf,
    prefix: String,
}

impl MatlabSnapshotSink {
    pub fn new(directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
        }
    }

    /// Artifact path for a step
    pub fn path_for(&self, step: usize) -> PathBuf {
        self.directory.join(format!("{}{}.m", self.prefix, step))
    }

    fn write_file(path: &Path, field: &WaveArray<f64>) -> std::io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "%Vec Object: Vec_0x0 1 MPI processes")?;
        writeln!(out, "%  type: seq")?;
        writeln!(out, "Vec_0x0 = [")?;
        for &value in field.as_slice() {
            writeln!(out, "{}", matlab_float(value))?;
        }
        writeln!(out, "];")?;
        out.flush()
    }
}

impl SnapshotSink for MatlabSnapshotSink {
    fn write(&mut self, field: &WaveArray<f64>, step: usize) -> Result<Option<PathBuf>> {
        let path = self.path_for(step);
        Self::write_file(&path, field).map_err(|source| SimulationError::SnapshotIo {
            step,
            path: path.clone(),
            source,
        })?;
        info!("File created: {}", path.display());
        Ok(Some(path))
    }
}

/// Build the sink selected by `format`
pub fn create_sink(
    format: SnapshotFormat,
    directory: impl Into<PathBuf>,
    prefix: impl Into<String>,
) -> Box<dyn SnapshotSink> {
    match format {
        SnapshotFormat::Matlab => Box::new(MatlabSnapshotSink::new(directory, prefix)),
        SnapshotFormat::None => Box::new(NullSnapshotSink),
    }
}

/// `%.16e` with a signed two-digit exponent, e.g. `-1.2500000000000000e-03`
fn matlab_float(value: f64) -> String {
    if !value.is_finite() {
        return if value.is_nan() {
            "NaN".to_string()
        } else if value > 0.0 {
            "Inf".to_string()
        } else {
            "-Inf".to_string()
        };
    }
    let formatted = format!("{:.16e}", value);
    match formatted.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => formatted,
    }
}
