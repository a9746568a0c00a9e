//! Persistence of run artifacts.
//!
//! The simulation loop hands everything it wants kept (the environment,
//! periodic model snapshots, the final histories) to a [`LogSink`]. The sink
//! decides where it goes; the loop never touches the filesystem itself.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::simulation::error::SimError;

/// Destination for run artifacts.
pub trait LogSink {
    /// Snapshot interval in steps.
    fn save_every(&self) -> u64;

    /// Persist one serializable object under `name`.
    fn save_snapshot<T: Serialize + ?Sized>(&mut self, name: &str, value: &T)
        -> Result<(), SimError>;

    /// Persist a key/value mapping under `name`.
    fn save_map<T: Serialize + ?Sized>(&mut self, name: &str, value: &T) -> Result<(), SimError>;

    /// Persist an ordered numeric sequence under `name`.
    fn save_sequence(&mut self, name: &str, values: &[f64]) -> Result<(), SimError>;

    /// Persist `value` as `<name>_<step>`, but only on steps divisible by
    /// [`save_every`](LogSink::save_every).
    fn save_snapshot_for_step<T: Serialize + ?Sized>(
        &mut self,
        name: &str,
        value: &T,
        step: u64,
    ) -> Result<(), SimError> {
        let every = self.save_every().max(1);
        if step % every == 0 {
            self.save_snapshot(&format!("{}_{}", name, step), value)?;
        }
        Ok(())
    }
}

impl<S: LogSink + ?Sized> LogSink for &mut S {
    fn save_every(&self) -> u64 {
        (**self).save_every()
    }

    fn save_snapshot<T: Serialize + ?Sized>(
        &mut self,
        name: &str,
        value: &T,
    ) -> Result<(), SimError> {
        (**self).save_snapshot(name, value)
    }

    fn save_map<T: Serialize + ?Sized>(&mut self, name: &str, value: &T) -> Result<(), SimError> {
        (**self).save_map(name, value)
    }

    fn save_sequence(&mut self, name: &str, values: &[f64]) -> Result<(), SimError> {
        (**self).save_sequence(name, values)
    }
}

/// Sink that writes one file per artifact under `<root>/<run_name>/`.
///
/// Snapshots and maps are pretty-printed JSON (`<name>.json`); sequences are
/// plain text with one value per line (`<name>.txt`). The run directory is
/// wiped when the sink is opened.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    path: PathBuf,
    save_every: u64,
}

impl DirectorySink {
    /// Create (or recreate) the run directory.
    ///
    /// # Errors
    /// `InvalidParameter` if `save_every` is zero, `Io` if the directory
    /// cannot be removed or created.
    pub fn open<P: AsRef<Path>>(root: P, run_name: &str, save_every: u64) -> Result<Self, SimError> {
        if save_every == 0 {
            return Err(SimError::InvalidParameter {
                name: "save_every",
                reason: "must be at least 1".to_string(),
            });
        }

        let path = root.as_ref().join(run_name);
        if path.exists() {
            fs::remove_dir_all(&path)?;
        }
        fs::create_dir_all(&path)?;
        tracing::debug!(path = %path.display(), save_every, "opened run directory");

        Ok(Self { path, save_every })
    }

    /// Directory artifacts are written to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<(), SimError> {
        let file_path = self.path.join(format!("{}.json", name));
        let json = serde_json::to_string_pretty(value)?;
        let mut file = File::create(&file_path)?;
        file.write_all(json.as_bytes())?;
        tracing::trace!(file = %file_path.display(), "saved artifact");
        Ok(())
    }
}

impl LogSink for DirectorySink {
    fn save_every(&self) -> u64 {
        self.save_every
    }

    fn save_snapshot<T: Serialize + ?Sized>(
        &mut self,
        name: &str,
        value: &T,
    ) -> Result<(), SimError> {
        self.write_json(name, value)
    }

    fn save_map<T: Serialize + ?Sized>(&mut self, name: &str, value: &T) -> Result<(), SimError> {
        self.write_json(name, value)
    }

    fn save_sequence(&mut self, name: &str, values: &[f64]) -> Result<(), SimError> {
        let file_path = self.path.join(format!("{}.txt", name));
        let mut writer = BufWriter::new(File::create(&file_path)?);
        for value in values {
            writeln!(writer, "{:.18e}", value)?;
        }
        writer.flush()?;
        tracing::trace!(file = %file_path.display(), len = values.len(), "saved sequence");
        Ok(())
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn save_every(&self) -> u64 {
        1
    }

    fn save_snapshot<T: Serialize + ?Sized>(&mut self, _: &str, _: &T) -> Result<(), SimError> {
        Ok(())
    }

    fn save_map<T: Serialize + ?Sized>(&mut self, _: &str, _: &T) -> Result<(), SimError> {
        Ok(())
    }

    fn save_sequence(&mut self, _: &str, _: &[f64]) -> Result<(), SimError> {
        Ok(())
    }
}
