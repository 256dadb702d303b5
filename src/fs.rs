// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

// Atomic directory-file rewrite: write to `<path>.tmp`, fsync, rename
// over `<path>`.

use std::{fs::File, io::Write, path::Path};

/// Atomically rewrites the file at `path` with `content`.
///
/// Writes to the fixed sibling path `<path>.tmp`, fsyncs it, renames it
/// over `path`, then fsyncs the containing directory so the
/// rename itself is durable. Using the fixed name (rather than a
/// randomly-named `tempfile::NamedTempFile`) is what lets
/// [`resolve_on_open`] recognise and recover a leftover temp file from a
/// process that crashed between the write and the rename.
pub fn rewrite_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let folder = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = tmp_path(path);

    {
        let mut file = File::create(&tmp)?;
        file.write_all(content)?;
        file.flush()?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;

    #[cfg(not(target_os = "windows"))]
    {
        let file = File::open(path)?;
        file.sync_all()?;
        fsync_directory(folder)?;
    }

    Ok(())
}

#[cfg(not(target_os = "windows"))]
pub fn fsync_directory(path: &Path) -> std::io::Result<()> {
    let file = File::open(path)?;
    debug_assert!(file.metadata()?.is_dir());
    file.sync_all()
}

#[cfg(target_os = "windows")]
pub fn fsync_directory(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Resolves the directory-file path to read on open: prefer the committed
/// `<path>` over a leftover `<path>.tmp` from a crashed rewrite, but fall
/// back to `<path>.tmp` if `<path>` itself is missing (a rewrite that
/// persisted the temp file but crashed before this process could observe
/// the rename — `NamedTempFile::persist` is itself atomic on the
/// filesystems we support, so this case is a defensive fallback, not the
/// common path).
pub fn resolve_on_open(path: &Path) -> std::io::Result<std::path::PathBuf> {
    let tmp = tmp_path(path);

    if path.try_exists()? {
        if tmp.try_exists()? {
            let _ = std::fs::remove_file(&tmp);
        }
        Ok(path.to_path_buf())
    } else if tmp.try_exists()? {
        Ok(tmp)
    } else {
        Ok(path.to_path_buf())
    }
}

pub fn tmp_path(path: &Path) -> std::path::PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".tmp");
    std::path::PathBuf::from(s)
}
