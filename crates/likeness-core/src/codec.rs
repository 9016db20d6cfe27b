//! Descriptor serialization contract.
//!
//! A persisted descriptor is its backend tag plus the raw little-endian
//! IEEE-754 32-bit float array. The storage layer treats the bytes as
//! opaque; validation happens here on load.

use thiserror::Error;

use crate::types::{Backend, FaceDescriptor};

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("descriptor blob length {0} is not a multiple of 4")]
    TruncatedBlob(usize),
    #[error("unknown backend tag: {0}")]
    UnknownTag(String),
    #[error("backend {backend} expects {expected} values, blob holds {actual}")]
    WrongDimension {
        backend: Backend,
        expected: usize,
        actual: usize,
    },
}

/// Encode a float slice as little-endian bytes.
pub fn to_bytes(values: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian bytes back into floats.
pub fn from_bytes(bytes: &[u8]) -> Result<Vec<f32>, CodecError> {
    if bytes.len() % 4 != 0 {
        return Err(CodecError::TruncatedBlob(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

impl FaceDescriptor {
    /// Serialize to the persistence contract: `(tag, little-endian bytes)`.
    pub fn serialize(&self) -> (&'static str, Vec<u8>) {
        (self.backend().tag(), to_bytes(self.values()))
    }

    /// Reconstruct a descriptor from its persisted form, validating the tag
    /// and the backend's declared dimensionality.
    pub fn deserialize(tag: &str, bytes: &[u8]) -> Result<FaceDescriptor, CodecError> {
        let backend = Backend::from_tag(tag).ok_or_else(|| CodecError::UnknownTag(tag.to_string()))?;
        let values = from_bytes(bytes)?;
        if values.len() != backend.dimension() {
            return Err(CodecError::WrongDimension {
                backend,
                expected: backend.dimension(),
                actual: values.len(),
            });
        }
        Ok(FaceDescriptor::new(backend, values))
    }
}
