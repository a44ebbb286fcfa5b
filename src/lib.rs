//! Content Pack Merge Library
//!
//! This library merges multiple independently-authored vehicle add-on
//! content packs into a single logically consistent pack.
//!
//! # Overview
//!
//! A source pack is an archive of binary assets plus XML metadata documents
//! describing interrelated vehicle entities. Merging them requires more
//! than copying files:
//!
//! 1. Nested packs are flattened into one uniform entry space (up to a
//!    depth cap)
//! 2. Entry paths are normalized into canonical, source-independent keys
//! 3. Path collisions resolve with first-source priority: files keep the
//!    first winner and record the conflict, directories merge silently
//! 4. The vehicle definition documents of every source drive a dependency
//!    analysis that gates which secondary documents are included
//! 5. Documents of the same type merge into a single document whose shape
//!    matches the runtime's fixed schema, de-duplicated by identity key
//! 6. The package-level index and order documents are synthesized fresh
//!    from the final file set
//!
//! # Usage
//!
//! ```ignore
//! use std::path::Path;
//! use dlc_merge::{MergeOptions, MergeSession};
//!
//! let mut session = MergeSession::new(MergeOptions::default());
//! session.add_source(Path::new("packs/sports.zip"));
//! session.add_source(Path::new("packs/muscle.zip"));
//!
//! let outcome = session.run(Path::new("merged.zip"))?;
//! println!("{} conflicts resolved", outcome.stats.file_conflicts);
//! ```
//!
//! The merge is a single sequential batch pass: all run-scoped state lives
//! in the session and is dropped when it completes.

pub mod analyze;
pub mod archive;
pub mod error;
pub mod loader;
pub mod manifest;
pub mod merge;
pub mod paths;
pub mod resolve;
pub mod schema;
pub mod session;
pub mod xml;

// Re-export main types for convenience
pub use crate::analyze::DependencySet;
pub use crate::error::MergeError;
pub use crate::loader::{Entry, EntryKind, SourcePack, DEFAULT_NESTED_DEPTH};
pub use crate::merge::{merge_documents, MergedDocument};
pub use crate::resolve::MergeMap;
pub use crate::session::{
    ConflictRecord, MergeOptions, MergeOutcome, MergeSession, MergeStats,
};
