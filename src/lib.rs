//! Firestore adapters
//!
//! Mockable trait adapters over a thin gRPC Cloud Firestore client.
//!
//! Application code is written against the traits of [`adapters`]; production
//! wires in [`adapters::ClientAdapter`] over a [`firestore::Client`], tests
//! wire in [`mock::MockFirestoreClient`].
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use firestore_adapters::adapters::{ClientAdapter, FirestoreClient};
//! use firestore_adapters::firestore::{Client, Settings};
//!
//! let client = Client::connect_lazy(Settings::new("my-project"))?;
//! let db: Box<dyn FirestoreClient> = Box::new(ClientAdapter::new(client));
//!
//! let snapshot = db.doc("users/alice").get().await?;
//! println!("exists: {}", snapshot.exists());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;

// Concrete gRPC client
pub mod firestore;

// Trait seams and their production implementations
pub mod adapters;

// In-memory fakes
pub mod mock;

pub use error::{FirestoreError, Result};
