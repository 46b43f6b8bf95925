pub mod flat;
pub mod snapshot;

pub use flat::{cosine_similarity, FlatIndex};
pub use snapshot::{read_manifest, SnapshotLock, SnapshotManifest, SNAPSHOT_FORMAT_VERSION};
