//! # Descriptor Sources
//!
//! A [`DescriptorSource`] is where the method selector gets its schema from. It answers three
//! questions: which services exist, what a symbol resolves to, and which files describe all of
//! it.
//!
//! * **[`ReflectionSource`]**: asks a live server through the reflection protocol.
//! * **[`PoolSource`]**: answers from a local `DescriptorPool`, e.g. a `FileDescriptorSet`
//!   read from disk.
mod descriptor;
mod pool;
mod server;

pub use descriptor::Descriptor;
pub use pool::PoolSource;
pub use server::ReflectionSource;

use crate::reflection::ReflectionResolveError;
use prost_reflect::{DescriptorError, DescriptorPool, FileDescriptor};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Reflection resolution failed: '{0}'")]
    ReflectionResolve(#[from] ReflectionResolveError),
    #[error("Failed to build descriptors: '{0}'")]
    DescriptorError(#[from] DescriptorError),
    #[error("Symbol '{0}' not found")]
    NotFound(String),
}

/// A provider of service schemas.
#[allow(async_fn_in_trait)]
pub trait DescriptorSource {
    /// Fully qualified names of every service, in the order the source advertises them.
    async fn list_services(&mut self) -> Result<Vec<String>, SourceError>;

    /// Resolves a fully qualified symbol (service, message or enum).
    async fn find_symbol(&mut self, symbol: &str) -> Result<Descriptor, SourceError>;

    /// Every file needed to describe all advertised services, sorted by file name.
    async fn all_files(&mut self) -> Result<Vec<FileDescriptor>, SourceError>;
}

fn sorted_files(pool: &DescriptorPool) -> Vec<FileDescriptor> {
    let mut files: Vec<FileDescriptor> = pool.files().collect();
    files.sort_by(|a, b| a.name().cmp(b.name()));
    files
}
