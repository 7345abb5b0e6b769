//! Shared helpers for the subcommands.

use anyhow::{Context, Result};
use gridips_algo::opf::{AcNetwork, OpfOptions};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Write `data` as JSON followed by a newline.
pub fn write_json<W: Write, T: Serialize>(
    data: &T,
    writer: &mut W,
    pretty: bool,
) -> io::Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut *writer, data).map_err(io::Error::other)?;
    } else {
        serde_json::to_writer(&mut *writer, data).map_err(io::Error::other)?;
    }
    writeln!(writer)?;
    Ok(())
}

/// Pretty-print `data` into a new file at `path`.
pub fn write_json_file<T: Serialize>(data: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write_json(data, &mut writer, true).with_context(|| format!("writing {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

pub fn load_network(path: &Path) -> Result<AcNetwork> {
    AcNetwork::from_json_file(path).with_context(|| format!("loading case {}", path.display()))
}

pub fn load_options(config: Option<&Path>) -> Result<OpfOptions> {
    match config {
        Some(path) => OpfOptions::from_toml_file(path)
            .with_context(|| format!("loading options {}", path.display())),
        None => Ok(OpfOptions::default()),
    }
}
