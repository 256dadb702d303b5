// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use blockfs::{rebase, CreateOptions, DType, Directory};
use std::path::Path;

#[test]
fn relocating_directory_and_block_files_then_rebasing_preserves_reads() {
    let src_dir = tempfile::tempdir().unwrap();
    let path = src_dir.path().join("vol.blockfs");

    let directory = CreateOptions::new((8, 8, 8), (4, 4, 4), DType::U8)
        .worker_count(2)
        .create(&path)
        .unwrap()
        .start_writer_processes();

    let mut expected = Vec::new();
    for (gx, gy, gz) in [(0, 0, 0), (1, 0, 0), (0, 1, 0), (1, 1, 1)] {
        let raw = vec![(gx + gy + gz + 1) as u8; 64];
        directory.write_block(&raw, gx, gy, gz).unwrap();
        expected.push(((gx, gy, gz), raw));
    }
    let log = directory.close().unwrap();
    assert!(log.is_empty());

    // Read the path table before moving anything, so we know which
    // BlockFiles to move ourselves (rebase only rewrites the table, it
    // does not touch block data).
    let bytes = std::fs::read(&path).unwrap();
    let old_block_paths: Vec<String> = {
        // Re-open once to get the header's path table without depending
        // on internal layout: a fresh read-only Directory exposes the
        // same coordinates we wrote, which is all we actually need to
        // verify post-relocation. We still need the raw paths on disk to
        // move them, so just glob the directory's sibling files.
        let dir_path = path.parent().unwrap();
        std::fs::read_dir(dir_path)
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("vol.blockfs.") && n != "vol.blockfs.tmp")
            })
            .map(|p| p.to_str().unwrap().to_owned())
            .collect()
    };
    assert_eq!(old_block_paths.len(), 2);
    drop(bytes);

    let new_base = tempfile::tempdir().unwrap();
    for old in &old_block_paths {
        let filename = Path::new(old).file_name().unwrap();
        std::fs::rename(old, new_base.path().join(filename)).unwrap();
    }
    // The directory file itself also moves to the new parent.
    let new_path = new_base.path().join("vol.blockfs");
    std::fs::rename(&path, &new_path).unwrap();

    rebase(&new_path, new_base.path()).unwrap();

    let reopened = Directory::open(&new_path).unwrap();
    for ((gx, gy, gz), raw) in &expected {
        assert_eq!(reopened.read_block(*gx, *gy, *gz).unwrap(), Some(raw.clone()));
    }
    assert_eq!(reopened.read_block(1, 0, 1).unwrap(), None);
}
