mod hasher;
mod pool;
mod progress;

pub use hasher::{HashError, HashFailure, HashOutcome, PieceHasher};
pub use progress::Progress;

pub(crate) use pool::{hash_piece, log_read_error, run_pieces};
pub(crate) use progress::ProgressTracker;
