//! Output formatting for position snapshots.

use anyhow::Result;
use std::io::Write;
use tracing::debug;

use crate::model::BusPosition;

/// Writes positions as pretty-printed JSON followed by a newline.
pub fn write_json<W: Write>(mut writer: W, positions: &[BusPosition]) -> Result<()> {
    debug!(count = positions.len(), "Writing position snapshot");
    serde_json::to_writer_pretty(&mut writer, positions)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}
