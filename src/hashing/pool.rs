use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tracing::{debug, trace, warn};

use crate::config::QUEUE_DEPTH_PER_WORKER;
use crate::error::PieceReadError;
use crate::piece::PieceHash;
use crate::stream::{PieceRange, PieceReader, VirtualFileStream};

/// Result of reading and digesting one piece
pub(crate) struct PieceDone {
    pub range: PieceRange,
    pub result: Result<PieceHash, PieceReadError>,
}

/// Read and hash one piece on the current thread
pub(crate) fn hash_piece(
    reader: &mut PieceReader<'_>,
    range: &PieceRange,
) -> Result<PieceHash, PieceReadError> {
    reader.read(range).map(|data| PieceHash::digest(&data))
}

pub(crate) fn log_read_error(err: &PieceReadError) {
    for failed in &err.files {
        warn!(
            piece = err.piece_index,
            file = failed.file_index,
            path = %failed.error.path.display(),
            error = %failed.error.kind,
            "piece read failed"
        );
    }
}

/// Hash the pieces listed in `indices` on a pool of `workers` threads.
///
/// Workers pull the next index from a shared cursor and push completions
/// into a bounded queue. `on_done` runs on the calling thread for every
/// completion; once it breaks, workers stop taking new pieces and the
/// remaining in-flight results are drained without being passed on.
///
/// Returns `true` when `on_done` cancelled the run.
pub(crate) fn run_pieces<F>(
    stream: &VirtualFileStream,
    indices: &[u64],
    workers: usize,
    mut on_done: F,
) -> Result<bool, rayon::ThreadPoolBuildError>
where
    F: FnMut(PieceDone) -> ControlFlow<()>,
{
    let workers = workers.clamp(1, indices.len().max(1));
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("piece-hasher-{}", i))
        .build()?;

    let cursor = AtomicUsize::new(0);
    let stop = AtomicBool::new(false);
    let (tx, rx) = crossbeam_channel::bounded(workers * QUEUE_DEPTH_PER_WORKER);
    let mut cancelled = false;

    debug!(workers, pieces = indices.len(), "starting hash workers");

    pool.in_place_scope(|scope| {
        for worker in 0..workers {
            let tx = tx.clone();
            let cursor = &cursor;
            let stop = &stop;
            scope.spawn(move |_| {
                let mut reader = PieceReader::new(stream);
                let mut hashed = 0u64;
                while !stop.load(Ordering::Acquire) {
                    let Some(&index) = indices.get(cursor.fetch_add(1, Ordering::Relaxed)) else {
                        break;
                    };
                    let range = stream.range_unchecked(index);
                    let result = hash_piece(&mut reader, &range);
                    if tx.send(PieceDone { range, result }).is_err() {
                        break;
                    }
                    hashed += 1;
                }
                trace!(worker, hashed, "hash worker finished");
            });
        }
        // Workers hold the remaining senders; the loop ends when all have exited.
        drop(tx);

        for done in rx.iter() {
            if cancelled {
                continue;
            }
            if on_done(done).is_break() {
                debug!("cancellation requested, draining in-flight pieces");
                cancelled = true;
                stop.store(true, Ordering::Release);
            }
        }
    });

    Ok(cancelled)
}
