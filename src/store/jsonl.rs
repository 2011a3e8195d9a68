//! JSONL snapshots of the store, one cell per line.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use super::ReconciliationStore;
use crate::domain::{CellState, CellStatus};
use crate::error::Result;

impl ReconciliationStore {
    /// Write every cell to `path`, replacing any previous snapshot.
    pub fn save_jsonl(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let cells = self.cells()?;
        let mut writer = BufWriter::new(File::create(path)?);
        for cell in &cells {
            writeln!(writer, "{}", serde_json::to_string(cell)?)?;
        }
        writer.flush()?;

        log::info!("Saved {} cells to {}", cells.len(), path.display());
        Ok(())
    }

    /// Load a snapshot written by [`save_jsonl`](Self::save_jsonl).
    ///
    /// Cells caught mid-flight (`queued`/`processing`) by an interrupted run
    /// come back as `pending` so a new batch picks them up again.
    pub fn load_jsonl(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);

        let mut cells = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let mut cell: CellState = serde_json::from_str(&line)?;
            if matches!(cell.status, CellStatus::Queued | CellStatus::Processing) {
                log::debug!("{} was interrupted while {}, resetting", cell.key, cell.status);
                cell.status = CellStatus::Pending;
            }
            cells.push(cell);
        }

        log::info!("Loaded {} cells from {}", cells.len(), path.display());
        Ok(Self::from_cells(cells))
    }
}
