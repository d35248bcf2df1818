//! Enumerating files the engine wrote.

use std::path::{Path, PathBuf};

use crate::error::EngineError;

/// List regular files under each of `dirs`, recursively.
///
/// Directories are visited in the order given; within a directory,
/// entries are sorted by name and subdirectories are descended into in
/// that order. Entries whose name starts with `.` are skipped, as are
/// directories that do not exist.
pub async fn collect_files(dirs: &[PathBuf]) -> Result<Vec<PathBuf>, EngineError> {
    let mut files = Vec::new();
    for dir in dirs {
        walk(dir, &mut files).await?;
    }
    Ok(files)
}

async fn walk(root: &Path, files: &mut Vec<PathBuf>) -> Result<(), EngineError> {
    // Depth-first with an explicit stack; children pushed in reverse so
    // they pop in sorted order.
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(source) => return Err(EngineError::Io { path: dir, source }),
        };

        let mut entries = Vec::new();
        loop {
            let entry = reader.next_entry().await.map_err(|source| EngineError::Io {
                path: dir.clone(),
                source,
            })?;
            let Some(entry) = entry else { break };
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let file_type = entry.file_type().await.map_err(|source| EngineError::Io {
                path: entry.path(),
                source,
            })?;
            entries.push((entry.path(), file_type.is_dir()));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut subdirs = Vec::new();
        for (path, is_dir) in entries {
            if is_dir {
                subdirs.push(path);
            } else {
                files.push(path);
            }
        }
        stack.extend(subdirs.into_iter().rev());
    }

    Ok(())
}
