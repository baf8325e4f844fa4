//! Shared infrastructure utilities for Anvil.
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)
//! - **`diff`**: LCS line diffing, unified hunks, and change stats

pub mod atomic_write;
pub mod diff;

pub use atomic_write::atomic_write;
pub use diff::{
    DiffLine, DiffStats, NO_CHANGES, abbreviated_diff, compute_diff, compute_lcs, compute_stats,
    diff_texts, format_unified_diff, split_lines, stats_for,
};
