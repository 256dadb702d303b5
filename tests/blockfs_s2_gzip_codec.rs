// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use blockfs::{CreateOptions, DType, Directory};

#[test]
fn gzip_roundtrips_and_shrinks_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vol.blockfs");

    let directory = CreateOptions::new((8, 8, 8), (4, 4, 4), DType::U16)
        .worker_count(2)
        .codec("gzip", vec![6])
        .create(&path)
        .unwrap()
        .start_writer_processes();

    let zeros = vec![0x00u8; 4 * 4 * 4 * 2];
    let ones = vec![0xFFu8; 4 * 4 * 4 * 2];
    directory.write_block(&zeros, 0, 0, 0).unwrap();
    directory.write_block(&ones, 1, 1, 1).unwrap();

    let error_log = directory.close().unwrap();
    assert!(error_log.is_empty());

    let reopened = Directory::open(&path).unwrap();
    assert_eq!(reopened.read_block(0, 0, 0).unwrap(), Some(zeros));
    assert_eq!(reopened.read_block(1, 1, 1).unwrap(), Some(ones));

    let total_block_file_bytes: u64 = (0..2)
        .map(|i| {
            let block_file_path = format!("{}.{i}", path.display());
            std::fs::metadata(block_file_path).unwrap().len()
        })
        .sum();
    assert!(
        total_block_file_bytes < 2 * 128,
        "gzip-compressed all-zero/all-ones blocks should be far smaller than \
         their uncompressed 2*128 bytes, got {total_block_file_bytes}"
    );
}
