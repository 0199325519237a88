//! In-memory implementations of the collector's data providers for tests and
//! local dry runs.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod blob;
mod hubs;
mod token;

pub use blob::{MemoryBlob, MemoryBlobStorage, MemoryCheckpointStore};
pub use hubs::MemoryHubDirectory;
pub use token::MemoryTokenProvider;
