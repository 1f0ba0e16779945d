//! Blob store for uploaded file contents.
//!
//! Blobs are opaque byte strings addressed by the file's storage key (a
//! UUID that is never exposed to clients). The lifecycle manager owns the
//! mapping between file records and blobs; this layer only stores bytes.
//!
//! Backends:
//! - [`FilesystemBlobBackend`] - one file per blob under a base directory
//! - [`MemoryBlobBackend`] - `DashMap`-backed, for tests and ephemeral setups
//!
//! Filesystem operations are blocking and run in `spawn_blocking`.

mod backend;
mod filesystem;
mod memory;
mod service;
mod validation;

pub use backend::BlobBackend;
pub use filesystem::FilesystemBlobBackend;
pub use memory::MemoryBlobBackend;
pub use service::BlobStore;
