//! Storage layer: the document store (read side) and the spatial store.

pub mod firestore;
pub mod memory;
pub mod source;
pub mod spatial;

pub use firestore::FirestoreDb;
pub use memory::MemoryDocumentStore;
pub use source::{DocumentStore, TrailSource};
pub use spatial::GeospatialStore;

/// Collection names as constants.
pub mod collections {
    pub const TRAILS: &str = "trails";
    /// Uploaded GPX files (keyed by trail ID)
    pub const TRACKS: &str = "tracks";
    pub const RATINGS: &str = "ratings";
    pub const COMMENTS: &str = "comments";
}
