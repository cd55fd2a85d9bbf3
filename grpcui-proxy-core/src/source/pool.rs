//! # Source: Local Descriptor Pool
//!
//! Serves schemas from an in-memory `DescriptorPool`. No server is involved, which makes it
//! suitable for inspecting a `FileDescriptorSet` offline.
use super::{Descriptor, DescriptorSource, SourceError, sorted_files};
use prost_reflect::{DescriptorError, DescriptorPool, FileDescriptor};

#[derive(Debug, Clone)]
pub struct PoolSource {
    pool: DescriptorPool,
}

impl PoolSource {
    pub fn new(pool: DescriptorPool) -> Self {
        Self { pool }
    }

    /// Creates a source from the bytes of an encoded `FileDescriptorSet`.
    ///
    /// # Returns
    ///
    /// * `Ok(PoolSource)` - The source.
    /// * `Err(DescriptorError)` - If the bytes are not a valid descriptor set.
    pub fn decode(file_descriptor_set: &[u8]) -> Result<Self, DescriptorError> {
        let pool = DescriptorPool::decode(file_descriptor_set)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }
}

impl DescriptorSource for PoolSource {
    async fn list_services(&mut self) -> Result<Vec<String>, SourceError> {
        Ok(self
            .pool
            .services()
            .map(|s| s.full_name().to_string())
            .collect())
    }

    async fn find_symbol(&mut self, symbol: &str) -> Result<Descriptor, SourceError> {
        Descriptor::lookup(&self.pool, symbol)
            .ok_or_else(|| SourceError::NotFound(symbol.to_string()))
    }

    async fn all_files(&mut self) -> Result<Vec<FileDescriptor>, SourceError> {
        Ok(sorted_files(&self.pool))
    }
}
