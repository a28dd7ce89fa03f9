//! JSON file storage for sequences.
//!
//! Layout: `{"name": ..., "poses": [{"timestamp": ..., "joints": [{"label", "x", "y", "z"}]}]}`.
//! Correction annotations (`corrected`, `flagged_over_threshold`, `randomized`)
//! are written back and default to `false` when absent.

use anyhow::{Context, Result};
use log::debug;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::model::Sequence;
use crate::traits::{SequenceSink, SequenceSource};

/// A sequence stored as a single JSON document.
#[derive(Debug, Clone)]
pub struct JsonSequenceFile {
    path: PathBuf,
    pretty: bool,
}

impl JsonSequenceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonSequenceFile {
            path: path.into(),
            pretty: true,
        }
    }

    pub fn compact(mut self) -> Self {
        self.pretty = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SequenceSource for JsonSequenceFile {
    fn load(&self) -> Result<Sequence> {
        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        let sequence: Sequence = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Invalid sequence file {}", self.path.display()))?;
        debug!(
            "[Storage] Loaded {} poses x {} joints from {}",
            sequence.len(),
            sequence.joint_count(),
            self.path.display()
        );
        Ok(sequence)
    }
}

impl SequenceSink for JsonSequenceFile {
    fn save(&mut self, sequence: &Sequence) -> Result<()> {
        let file = File::create(&self.path)
            .with_context(|| format!("Failed to create {}", self.path.display()))?;
        let mut writer = BufWriter::new(file);
        if self.pretty {
            serde_json::to_writer_pretty(&mut writer, sequence)?;
        } else {
            serde_json::to_writer(&mut writer, sequence)?;
        }
        writer.flush()?;
        debug!("[Storage] Wrote {}", self.path.display());
        Ok(())
    }
}
