//! Content hashing and canonical encoding for calvault.
//!
//! Provides the domain-separated BLAKE3 hasher that names every content blob
//! and the canonical encoder that turns a field map into bytes that are
//! identical for identical content, whatever order the fields were built in.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod canonical;
pub mod hasher;

pub use canonical::{decode, encode, encode_value, CanonicalError};
pub use hasher::ContentHasher;
