//! Tree operations over a flat object store.
//!
//! Folders exist only as key prefixes plus zero-length marker objects, so every
//! folder-scoped operation re-derives its descendant set from a prefix listing.
//! Renames and moves are copy-then-delete: every copy must succeed before the
//! first delete is issued.

mod bulk;
pub mod export;
pub mod locks;
pub mod search;
pub mod tree;
pub mod upload;

pub use export::ExportSummary;
pub use locks::PathLocks;
pub use tree::{Relocation, TreeManager, TreeOptions};
pub use upload::FolderUpload;
