//! Chunking/Reduction Engine
//!
//! Pure text algorithm for fitting arbitrarily long page transcripts and
//! documents into a fixed-size completion context:
//! - `splitter`: recursive delimiter-priority splitting with overlap and a
//!   hard-cut fallback.
//! - `reducer`: multi-pass map-reduce over the chunks, with bounded
//!   concurrent fan-out per pass.

pub mod prompts;
pub mod reducer;
pub mod splitter;
pub mod transcript;

pub use reducer::{reduce, Operation, ReductionTask, MAX_CONCURRENT_CALLS};
pub use splitter::split_text;
