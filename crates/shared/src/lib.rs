#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Copyspark Shared
//!
//! Code shared between the API server and the billing crate:
//! configuration loading and the Firestore REST client.

pub mod config;
pub mod firestore;

pub use config::Config;
pub use firestore::{FirestoreClient, FirestoreError, FirestoreResult};
