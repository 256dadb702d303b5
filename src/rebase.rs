// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

// Library-only relocation operations supporting the external
// `blockfs-mv`/`blockfs-cp`/`blockfs-rebase` CLI contract. None of these
// start a Directory or touch its index content; they only rewrite the
// header's path table (and, for `relocate`/`duplicate`, move or copy the
// underlying files to match).

use crate::error::Error;
use crate::fs::{resolve_on_open, rewrite_atomic};
use crate::header::{read_directory_file, write_directory_file};
use std::path::{Path, PathBuf};

/// Rewrites `directory_path`'s BlockFile path table to point at files of
/// the same name inside `new_base_dir`, without opening or moving the
/// block data itself — this is what makes a plain filesystem `mv`
/// insufficient for relocating a volume, since the paths are embedded in
/// the directory file. Index entries are unchanged.
///
/// This is the `blockfs-rebase` CLI tool's entire contract: the caller is
/// responsible for having already relocated the BlockFiles to
/// `new_base_dir` themselves.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if `directory_path` cannot be read, or
/// [`Error::FormatError`] if it fails to parse or a path-table entry has
/// no filename component.
pub fn rebase(directory_path: &Path, new_base_dir: &Path) -> crate::Result<()> {
    let (mut header, index) = read_header_and_index(directory_path)?;

    header.paths = header
        .paths
        .iter()
        .map(|old| {
            let filename = Path::new(old).file_name().ok_or_else(|| {
                Error::FormatError(format!("block-file path has no filename component: {old}"))
            })?;
            path_to_string(&new_base_dir.join(filename))
        })
        .collect::<crate::Result<Vec<_>>>()?;

    let mut buf = Vec::new();
    write_directory_file(&mut buf, &header, &index)?;
    rewrite_atomic(directory_path, &buf).map_err(Error::DirectoryPersistFailure)?;
    log::info!(
        "rebased {} onto {}",
        directory_path.display(),
        new_base_dir.display()
    );
    Ok(())
}

/// Moves the directory file and every BlockFile it references to live
/// alongside `dest_directory_path`, rewriting the path table to match
/// (the `blockfs-mv` contract).
///
/// # Errors
///
/// See [`rebase`]; additionally returns the underlying I/O error if a
/// rename fails (e.g. `dest_directory_path` on a different filesystem).
pub fn relocate(src_directory_path: &Path, dest_directory_path: &Path) -> crate::Result<()> {
    transplant(src_directory_path, dest_directory_path, Transfer::Move)
}

/// Copies the directory file and every BlockFile it references to live
/// alongside `dest_directory_path`, rewriting the copy's path table to
/// match (the `blockfs-cp` contract). `src_directory_path` is left
/// untouched.
///
/// # Errors
///
/// See [`relocate`].
pub fn duplicate(src_directory_path: &Path, dest_directory_path: &Path) -> crate::Result<()> {
    transplant(src_directory_path, dest_directory_path, Transfer::Copy)
}

#[derive(Copy, Clone)]
enum Transfer {
    Move,
    Copy,
}

fn transplant(src: &Path, dest: &Path, mode: Transfer) -> crate::Result<()> {
    let (mut header, index) = read_header_and_index(src)?;

    let mut new_paths = Vec::with_capacity(header.paths.len());
    for (i, old_block_path) in header.paths.iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let worker_id = i as u16;
        let new_block_path = block_file_sibling(dest, worker_id);
        match mode {
            Transfer::Move => std::fs::rename(old_block_path, &new_block_path)?,
            Transfer::Copy => {
                std::fs::copy(old_block_path, &new_block_path)?;
            }
        }
        new_paths.push(path_to_string(&new_block_path)?);
    }
    header.paths = new_paths;

    let mut buf = Vec::new();
    write_directory_file(&mut buf, &header, &index)?;
    rewrite_atomic(dest, &buf).map_err(Error::DirectoryPersistFailure)?;

    if let Transfer::Move = mode {
        let _ = std::fs::remove_file(src);
        let _ = std::fs::remove_file(crate::fs::tmp_path(src));
    }

    log::info!(
        "{} {} to {}",
        match mode {
            Transfer::Move => "moved",
            Transfer::Copy => "copied",
        },
        src.display(),
        dest.display(),
    );
    Ok(())
}

fn read_header_and_index(
    directory_path: &Path,
) -> crate::Result<(crate::header::Header, crate::index::Index)> {
    let resolved =
        resolve_on_open(directory_path).map_err(|_| Error::NotFound(directory_path.to_path_buf()))?;
    let bytes =
        std::fs::read(&resolved).map_err(|_| Error::NotFound(directory_path.to_path_buf()))?;
    read_directory_file(&bytes).map_err(|e| Error::FormatError(e.to_string()))
}

fn block_file_sibling(directory_path: &Path, worker_id: u16) -> PathBuf {
    let mut s = directory_path.as_os_str().to_owned();
    s.push(format!(".{worker_id}"));
    PathBuf::from(s)
}

fn path_to_string(path: &Path) -> crate::Result<String> {
    path.to_str()
        .map(str::to_owned)
        .ok_or_else(|| Error::FormatError(format!("path is not valid UTF-8: {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{CreateOptions, Directory};
    use crate::dtype::DType;

    fn sample_directory(path: &Path) -> Vec<u8> {
        let directory = CreateOptions::new((4, 4, 4), (4, 4, 4), DType::U8)
            .worker_count(1)
            .create(path)
            .unwrap()
            .start_writer_processes();
        let raw = vec![5u8; 64];
        directory.write_block(&raw, 0, 0, 0).unwrap();
        directory.close().unwrap();
        raw
    }

    #[test]
    fn rebase_retargets_path_table_to_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vol.blockfs");
        let raw = sample_directory(&path);

        let new_base = tempfile::tempdir().unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let (header, _) = read_directory_file(&bytes).unwrap();
        for old in &header.paths {
            let filename = Path::new(old).file_name().unwrap();
            std::fs::rename(old, new_base.path().join(filename)).unwrap();
        }

        rebase(&path, new_base.path()).unwrap();

        let reopened = Directory::open(&path).unwrap();
        assert_eq!(reopened.read_block(0, 0, 0).unwrap(), Some(raw));
    }

    #[test]
    fn relocate_moves_directory_and_block_files() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("vol.blockfs");
        let raw = sample_directory(&src);

        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("vol2.blockfs");
        relocate(&src, &dest).unwrap();

        assert!(!src.exists());
        let reopened = Directory::open(&dest).unwrap();
        assert_eq!(reopened.read_block(0, 0, 0).unwrap(), Some(raw));
    }

    #[test]
    fn duplicate_copies_leaving_source_intact() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("vol.blockfs");
        let raw = sample_directory(&src);

        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("vol2.blockfs");
        duplicate(&src, &dest).unwrap();

        let original = Directory::open(&src).unwrap();
        assert_eq!(original.read_block(0, 0, 0).unwrap(), Some(raw.clone()));

        let copy = Directory::open(&dest).unwrap();
        assert_eq!(copy.read_block(0, 0, 0).unwrap(), Some(raw));
    }
}
