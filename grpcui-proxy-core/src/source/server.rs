//! # Source: Server Reflection
//!
//! Serves schemas fetched from a live server. Every file received is accumulated into a single
//! `DescriptorPool`, so each symbol is only requested once and the pool ends up holding the
//! transitive closure of everything that was resolved.
use super::{Descriptor, DescriptorSource, SourceError, sorted_files};
use crate::{BoxError, reflection::ReflectionClient};
use http_body::Body as HttpBody;
use prost_reflect::{DescriptorPool, FileDescriptor};
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use std::collections::HashSet;
use tonic::{client::GrpcService, transport::Channel};
use tracing::{debug, warn};

pub struct ReflectionSource<S = Channel> {
    client: ReflectionClient<S>,
    pool: DescriptorPool,
    services: Option<Vec<String>>,
}

impl<S> ReflectionSource<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(client: ReflectionClient<S>) -> Self {
        Self {
            client,
            pool: DescriptorPool::new(),
            services: None,
        }
    }

    /// The descriptors resolved so far.
    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    fn add_files(&mut self, fd_set: FileDescriptorSet) -> Result<(), SourceError> {
        let mut files: Vec<FileDescriptorProto> = fd_set
            .file
            .into_iter()
            .filter(|file| {
                file.name
                    .as_deref()
                    .is_some_and(|name| self.pool.get_file_by_name(name).is_none())
            })
            .collect();

        fill_missing_dependencies(&self.pool, &mut files);

        self.pool.add_file_descriptor_protos(files)?;
        Ok(())
    }
}

impl<S> DescriptorSource for ReflectionSource<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    async fn list_services(&mut self) -> Result<Vec<String>, SourceError> {
        if let Some(services) = &self.services {
            return Ok(services.clone());
        }

        let services = self.client.list_services().await?;
        self.services = Some(services.clone());
        Ok(services)
    }

    async fn find_symbol(&mut self, symbol: &str) -> Result<Descriptor, SourceError> {
        if let Some(descriptor) = Descriptor::lookup(&self.pool, symbol) {
            return Ok(descriptor);
        }

        let fd_set = self
            .client
            .file_descriptor_set_by_symbol(symbol)
            .await
            .map_err(|err| {
                if err.is_not_found() {
                    SourceError::NotFound(symbol.to_string())
                } else {
                    SourceError::ReflectionResolve(err)
                }
            })?;

        self.add_files(fd_set)?;

        Descriptor::lookup(&self.pool, symbol)
            .ok_or_else(|| SourceError::NotFound(symbol.to_string()))
    }

    async fn all_files(&mut self) -> Result<Vec<FileDescriptor>, SourceError> {
        for service in self.list_services().await? {
            self.find_symbol(&service).await?;
        }

        Ok(sorted_files(&self.pool))
    }
}

/// Completes the imports of a batch that are neither in the pool nor in the batch itself.
///
/// Servers often omit the `google/protobuf/*` files their schemas import, those are taken from
/// `prost_reflect`'s global pool. Any other import that could not be fetched is replaced by an
/// empty file of the same name, so the files that were fetched can still be added to the pool.
fn fill_missing_dependencies(pool: &DescriptorPool, files: &mut Vec<FileDescriptorProto>) {
    let mut known: HashSet<String> = files.iter().filter_map(|f| f.name.clone()).collect();
    let mut pending: Vec<String> = files.iter().flat_map(|f| f.dependency.clone()).collect();

    if pending.is_empty() {
        return;
    }

    let global = DescriptorPool::global();

    while let Some(dependency) = pending.pop() {
        if known.contains(&dependency) || pool.get_file_by_name(&dependency).is_some() {
            continue;
        }

        if let Some(file) = global.get_file_by_name(&dependency) {
            debug!(file = dependency.as_str(), "using the bundled definition of a missing dependency");
            let proto = file.file_descriptor_proto().clone();
            pending.extend(proto.dependency.iter().cloned());
            files.push(proto);
        } else {
            warn!(file = dependency.as_str(), "dependency is unavailable, using an empty placeholder");
            files.push(FileDescriptorProto {
                name: Some(dependency.clone()),
                ..Default::default()
            });
        }

        known.insert(dependency);
    }
}
