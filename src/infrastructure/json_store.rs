//! JSON persistence for practitioner lists
//!
//! One pretty-printed UTF-8 array per file. serde_json leaves non-ASCII text
//! unescaped, so Chinese names stay readable on disk.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::info;

use crate::domain::Practitioner;

pub async fn save_practitioners(practitioners: &[Practitioner], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
    }

    let content = serde_json::to_string_pretty(practitioners).context("Failed to serialize practitioners")?;
    fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write {:?}", path))?;

    info!("💾 Saved {} practitioners to {:?}", practitioners.len(), path);
    Ok(())
}

pub async fn load_practitioners(path: &Path) -> Result<Vec<Practitioner>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;
    let practitioners: Vec<Practitioner> =
        serde_json::from_str(&content).with_context(|| format!("Invalid practitioner JSON in {:?}", path))?;
    Ok(practitioners)
}

/// `dir/{offset}_{file_name}`
pub fn chunk_path(dir: &Path, offset: usize, file_name: &str) -> PathBuf {
    dir.join(format!("{offset}_{file_name}"))
}

/// Chunk files in `dir` written for `file_name`, ordered by offset
pub async fn chunk_files(dir: &Path, file_name: &str) -> Result<Vec<PathBuf>> {
    let suffix = format!("_{file_name}");
    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to list {:?}", dir))?;

    let mut chunks = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(offset) = name.strip_suffix(&suffix) else { continue };
        if let Ok(offset) = offset.parse::<usize>() {
            chunks.push((offset, entry.path()));
        }
    }

    chunks.sort_by_key(|(offset, _)| *offset);
    Ok(chunks.into_iter().map(|(_, path)| path).collect())
}
