use anyhow::{Context, Result};
use csv::Writer;
use std::path::Path;
use tracing::info;

use sift::region::Diagnostic;

/// Write diagnostics as CSV: kind, id, reason, detail
pub fn write_diagnostics(path: &Path, diagnostics: &[Diagnostic]) -> Result<()> {
    let mut writer = Writer::from_path(path).context("Failed to create diagnostics file")?;
    writer.write_record(["kind", "id", "reason", "detail"])?;

    for diagnostic in diagnostics {
        let id = diagnostic.entity.id.to_string();
        writer.write_record([
            diagnostic.entity.kind.as_str(),
            id.as_str(),
            diagnostic.kind.reason(),
            diagnostic.kind.detail(),
        ])?;
    }
    writer.flush()?;

    info!(
        "Wrote {} diagnostics to {}",
        diagnostics.len(),
        path.display()
    );
    Ok(())
}
