use std::fs;
use std::ops::ControlFlow;
use std::path::Path;
use std::time::Duration;

use rand::RngCore;
use sha1::{Digest, Sha1};

use piecework::hashing::HashOutcome;
use piecework::{FileEntry, FileList, PieceHash, PieceHasher, VirtualFileStream};

const PIECE_SIZE: u64 = 16 * 1024;

/// Writes files of the given sizes with random content and returns their
/// concatenation.
fn write_content(root: &Path, sizes: &[usize]) -> (FileList, Vec<u8>) {
    let mut rng = rand::rng();
    let mut all = Vec::new();
    let mut entries = Vec::new();
    for (i, &size) in sizes.iter().enumerate() {
        let mut data = vec![0u8; size];
        rng.fill_bytes(&mut data);
        let name = format!("file{:02}.bin", i);
        fs::write(root.join(&name), &data).unwrap();
        all.extend_from_slice(&data);
        entries.push(FileEntry::new([name], size as u64));
    }
    (FileList::multi(entries), all)
}

fn reference_hashes(data: &[u8], piece_size: usize) -> Vec<PieceHash> {
    data.chunks(piece_size)
        .map(|chunk| PieceHash(Sha1::digest(chunk).into()))
        .collect()
}

#[test]
fn test_worker_count_does_not_change_output() {
    let dir = tempfile::tempdir().unwrap();
    // Boundaries fall inside pieces, on piece edges, and around an empty file
    let sizes = [
        10_000,
        PIECE_SIZE as usize,
        0,
        70_001,
        3,
        PIECE_SIZE as usize * 2 - 3,
    ];
    let (files, data) = write_content(dir.path(), &sizes);
    let stream = VirtualFileStream::new(files, PIECE_SIZE, dir.path()).unwrap();
    let expected = reference_hashes(&data, PIECE_SIZE as usize);
    assert_eq!(stream.piece_count(), expected.len() as u64);

    for workers in [1, 2, 8] {
        let hashes = PieceHasher::new()
            .with_workers(workers)
            .hash(&stream)
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(hashes.as_slice(), expected.as_slice(), "workers = {}", workers);
    }
}

#[test]
fn test_progress_reports_first_and_last() {
    let dir = tempfile::tempdir().unwrap();
    let (files, _) = write_content(dir.path(), &[PIECE_SIZE as usize * 5 + 7]);
    let stream = VirtualFileStream::new(files, PIECE_SIZE, dir.path()).unwrap();

    let mut reports = Vec::new();
    let outcome = PieceHasher::new()
        .with_workers(4)
        .with_interval(Duration::from_secs(3600))
        .hash_with_progress(&stream, |progress| {
            reports.push((progress.pieces_done, progress.pieces_total));
            ControlFlow::Continue(())
        })
        .unwrap();

    assert!(outcome.is_complete());
    assert_eq!(reports, vec![(1, 6), (6, 6)]);
}

#[test]
fn test_zero_interval_reports_every_piece_with_file_counters() {
    let dir = tempfile::tempdir().unwrap();
    let sizes = [PIECE_SIZE as usize + 100, PIECE_SIZE as usize];
    let (files, _) = write_content(dir.path(), &sizes);
    let stream = VirtualFileStream::new(files, PIECE_SIZE, dir.path()).unwrap();

    let mut last_per_file = [0u64; 2];
    let mut calls = 0;
    PieceHasher::new()
        .with_workers(2)
        .with_interval(Duration::ZERO)
        .hash_with_progress(&stream, |progress| {
            calls += 1;
            assert!(progress.file_pieces_done <= progress.file_pieces_total);
            last_per_file[progress.file_index] =
                last_per_file[progress.file_index].max(progress.file_pieces_done);
            ControlFlow::Continue(())
        })
        .unwrap();

    assert_eq!(calls, stream.piece_count());
    // The last piece belongs to file 1, which spans pieces 0..3
    assert_eq!(last_per_file[1], 2);
}

#[test]
fn test_cancel_on_first_report() {
    let dir = tempfile::tempdir().unwrap();
    let (files, _) = write_content(dir.path(), &[PIECE_SIZE as usize * 64]);
    let stream = VirtualFileStream::new(files, PIECE_SIZE, dir.path()).unwrap();

    let outcome = PieceHasher::new()
        .with_workers(2)
        .hash_with_progress(&stream, |_| ControlFlow::Break(()))
        .unwrap();

    match outcome {
        HashOutcome::Cancelled { pieces_done } => assert_eq!(pieces_done, 1),
        other => panic!("expected cancellation, got {:?}", other),
    }
}

#[test]
fn test_missing_file_fails_without_stopping_other_pieces() {
    let dir = tempfile::tempdir().unwrap();
    let sizes = [PIECE_SIZE as usize * 2, PIECE_SIZE as usize * 2];
    let (files, _) = write_content(dir.path(), &sizes);
    fs::remove_file(dir.path().join("file01.bin")).unwrap();
    let stream = VirtualFileStream::new(files, PIECE_SIZE, dir.path()).unwrap();

    let mut reported = 0;
    let outcome = PieceHasher::new()
        .with_workers(3)
        .with_interval(Duration::ZERO)
        .hash_with_progress(&stream, |_| {
            reported += 1;
            ControlFlow::Continue(())
        })
        .unwrap();

    let HashOutcome::Failed(failure) = outcome else {
        panic!("expected failure");
    };
    assert_eq!(reported, 4);
    let failed: Vec<u64> = failure.errors.iter().map(|e| e.piece_index).collect();
    assert_eq!(failed, vec![2, 3]);
    assert!(failure.failed_files().contains(&1));
    assert_eq!(
        failure.failed_paths().into_iter().collect::<Vec<_>>(),
        vec![dir.path().join("file01.bin").as_path()]
    );
}

#[test]
fn test_every_unreadable_file_of_a_piece_is_named() {
    let dir = tempfile::tempdir().unwrap();
    // Both files live entirely inside piece 0, and neither exists
    let files = FileList::multi(vec![
        FileEntry::new(["a.bin"], 10),
        FileEntry::new(["b.bin"], 6),
    ]);
    let stream = VirtualFileStream::new(files, 16, dir.path()).unwrap();

    let outcome = PieceHasher::new().with_workers(1).hash(&stream).unwrap();

    let HashOutcome::Failed(failure) = outcome else {
        panic!("expected failure");
    };
    assert_eq!(failure.errors.len(), 1);
    assert_eq!(
        failure.failed_files().into_iter().collect::<Vec<_>>(),
        vec![0, 1]
    );
    assert_eq!(
        failure.failed_paths().into_iter().collect::<Vec<_>>(),
        vec![
            dir.path().join("a.bin").as_path(),
            dir.path().join("b.bin").as_path()
        ]
    );
}
