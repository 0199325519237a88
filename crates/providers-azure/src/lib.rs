//! Azure REST implementations of the provider traits: the Event Hubs
//! management API, the Blob service and Azure AD token acquisition.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod blob;
mod eventhubs;
mod rest;
mod token;
mod xml;

pub use blob::{AzureBlobStorage, AzureCheckpointStore, STORAGE_SCOPE};
pub use eventhubs::{AzureHubDirectory, EVENTHUBS_API_VERSION};
pub use rest::STORAGE_API_VERSION;
pub use token::AzureTokenProvider;
