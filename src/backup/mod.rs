//! Database backup engine.
//!
//! Dumps go through the external `sqlite3` CLI so the backup file is plain
//! SQL, portable across machines and inspectable by hand. The tool is always
//! invoked with parameterized arguments; no shell is involved.

use anyhow::{bail, Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

lazy_static! {
    /// Backup files are named by the server; anything else is refused on
    /// download and delete so a crafted name cannot escape the backup
    /// directory.
    static ref BACKUP_NAME: Regex =
        Regex::new(r"^backup_\d{4}-\d{2}-\d{2}_\d{2}-\d{2}-\d{2}\.sql$").unwrap();
}

/// Server-generated backup filename for the current instant
pub fn backup_filename(now: chrono::DateTime<chrono::Utc>) -> String {
    format!("backup_{}.sql", now.format("%Y-%m-%d_%H-%M-%S"))
}

/// True when `name` is a bare, server-shaped backup filename
pub fn is_valid_backup_name(name: &str) -> bool {
    BACKUP_NAME.is_match(name)
}

/// Dump the database to a new file under `backup_dir`. Returns the file
/// path and its size in bytes.
pub async fn create_backup(
    dump_tool: &str,
    db_path: &Path,
    backup_dir: &Path,
) -> Result<(PathBuf, i64)> {
    tokio::fs::create_dir_all(backup_dir)
        .await
        .with_context(|| format!("Failed to create backup directory {}", backup_dir.display()))?;

    let filename = backup_filename(chrono::Utc::now());
    let dest = backup_dir.join(&filename);

    let output = Command::new(dump_tool)
        .arg(db_path)
        .arg(".dump")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .with_context(|| format!("Failed to run dump tool '{}'", dump_tool))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("Dump tool exited with {}: {}", output.status, stderr.trim());
    }

    tokio::fs::write(&dest, &output.stdout)
        .await
        .with_context(|| format!("Failed to write backup file {}", dest.display()))?;

    let size = output.stdout.len() as i64;
    tracing::info!(file = %dest.display(), size, "Database backup created");
    Ok((dest, size))
}

/// Replay a SQL dump into the database. The dump is streamed over stdin so
/// the file path never appears inside a tool command string.
pub async fn restore_backup(dump_tool: &str, db_path: &Path, backup_file: &Path) -> Result<()> {
    let sql = tokio::fs::read(backup_file)
        .await
        .with_context(|| format!("Failed to read backup file {}", backup_file.display()))?;

    let mut child = Command::new(dump_tool)
        .arg(db_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to run dump tool '{}'", dump_tool))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(&sql).await?;
        stdin.shutdown().await?;
    }

    let output = child.wait_with_output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "Restore exited with {}: {}",
            output.status,
            stderr.trim()
        );
    }

    tracing::info!(file = %backup_file.display(), "Database restored from backup");
    Ok(())
}
