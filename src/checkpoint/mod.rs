//! Checkpoint Module
//!
//! Full on-disk image of the embedded engine's partitions. A checkpoint plus
//! the WAL written after it is the complete committed state.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                       │
//! │   Magic: "PSDC" (4) | Version: u16 (2) | Buckets: u64 (8)│
//! ├─────────────────────────────────────────────────────────┤
//! │ Body (variable)                                         │
//! │   bincode-encoded partition table                       │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (16 bytes)                                       │
//! │   BodyLen: u64 (8) | BodyCRC: u32 (4) | Padding (4)     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Checkpoints are written to a temporary file and renamed into place, so a
//! crash mid-write leaves the previous checkpoint intact.

mod reader;
mod writer;

pub use reader::CheckpointReader;
pub use writer::CheckpointWriter;

/// Magic bytes at the start of every checkpoint
pub const MAGIC: &[u8; 4] = b"PSDC";

/// Current format version
pub const VERSION: u16 = 1;

/// Header: magic (4) + version (2) + bucket count (8)
pub const HEADER_SIZE: u64 = 14;

/// Footer: body length (8) + body CRC (4) + padding (4)
pub const FOOTER_SIZE: u64 = 16;
