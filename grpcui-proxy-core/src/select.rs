//! # Method Selection
//!
//! Decides which methods of a server are exposed, given what the server advertises and an
//! optional [`InclusionPolicy`].
//!
//! Selection walks the services in the order the source lists them and their methods in
//! declaration order, so the result is deterministic for a given server. Every name the policy
//! mentions must match something the server advertises; all the misses are reported at once.
pub mod policy;

pub use policy::{InclusionPolicy, PolicyError, ServiceRule};

use crate::{
    reflection::REFLECTION_SERVICES,
    source::{DescriptorSource, SourceError},
};
use prost_reflect::MethodDescriptor;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("{name} should be a service descriptor but instead is a {kind}")]
    NotAService { name: String, kind: &'static str },
    #[error("configured methods not found: {}", .0.join(", "))]
    MethodsNotFound(Vec<String>),
    #[error("configured services not found: {}", .0.join(", "))]
    ServicesNotFound(Vec<String>),
}

/// Returns the methods of `source` allowed by `policy`, in discovery order.
///
/// A missing or empty policy selects every method. Reflection services are never selected.
///
/// # Returns
///
/// * `Ok(Vec<MethodDescriptor>)` - The selected methods.
/// * `Err(SelectError::MethodsNotFound)` - If the policy lists methods a service does not have.
/// * `Err(SelectError::ServicesNotFound)` - If the policy lists services the server does not
///   advertise.
/// * `Err(SelectError::NotAService)` - If an advertised name resolves to a message or enum.
pub async fn select_methods<D>(
    source: &mut D,
    policy: Option<&InclusionPolicy>,
) -> Result<Vec<MethodDescriptor>, SelectError>
where
    D: DescriptorSource,
{
    // The caller's policy stays untouched; matched entries are removed from this copy.
    let mut remaining = policy.filter(|p| !p.is_empty()).cloned();

    let mut selected = Vec::new();
    let mut unmatched_methods = Vec::new();

    for name in source.list_services().await? {
        if REFLECTION_SERVICES.contains(&name.as_str()) {
            continue;
        }

        let service = source
            .find_symbol(&name)
            .await?
            .into_service()
            .map_err(|descriptor| SelectError::NotAService {
                name: name.clone(),
                kind: descriptor.kind(),
            })?;

        let mut rule = match remaining.as_mut() {
            None => None,
            Some(remaining) => match remaining.take_rule(&name) {
                Some(rule) => Some(rule),
                None => continue,
            },
        };

        for method in service.methods() {
            let Some(rule) = rule.as_mut() else {
                selected.push(method);
                continue;
            };

            let listed = rule.include_methods.remove(method.name());

            if listed && rule.include_service {
                warn!(
                    service = name.as_str(),
                    method = method.name(),
                    "method is listed explicitly but its whole service is already included"
                );
            }

            if listed || rule.include_service {
                selected.push(method);
            }
        }

        if let Some(rule) = rule {
            unmatched_methods.extend(
                rule.include_methods
                    .into_iter()
                    .map(|method| format!("{name}/{method}")),
            );
        }
    }

    if !unmatched_methods.is_empty() {
        unmatched_methods.sort();
        return Err(SelectError::MethodsNotFound(unmatched_methods));
    }

    if let Some(remaining) = remaining {
        let unmatched_services = remaining.into_service_names();
        if !unmatched_services.is_empty() {
            return Err(SelectError::ServicesNotFound(unmatched_services));
        }
    }

    Ok(selected)
}
