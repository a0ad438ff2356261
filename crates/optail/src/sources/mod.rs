//! Log source implementations
//!
//! - [`MemoryLogSource`] - In-process log, used for embedding and tests
//! - [`JsonlLogSource`] - Newline-delimited JSON oplog export (feature `jsonl`)

mod memory;
pub use memory::*;

#[cfg(feature = "jsonl")]
mod jsonl;
#[cfg(feature = "jsonl")]
pub use jsonl::*;
