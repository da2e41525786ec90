//! Object store client for video assets.
//!
//! This crate provides:
//! - The `ObjectStore` contract the upload coordinator is written against
//! - An aws-sdk-s3 implementation (works with S3 and R2 endpoints)
//! - Presigned URL generation
//! - Object listing and deletion

pub mod client;
pub mod error;
pub mod store;

pub use client::{S3Config, S3Store};
pub use error::{StorageError, StorageResult};
pub use store::{ObjectInfo, ObjectLocation, ObjectStore, PartToken};
