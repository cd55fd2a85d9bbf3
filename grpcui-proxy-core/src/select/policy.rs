//! # Inclusion Policy
//!
//! Restricts which services and methods a session exposes. A service can be included as a
//! whole, method by method, or both (the explicit methods are then redundant).
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Invalid method '{0}'. Expected 'package.Service/Method'")]
    InvalidMethod(String),
}

/// What to include of a single service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceRule {
    /// Every method of the service is included.
    pub include_service: bool,
    /// Methods included by name.
    pub include_methods: BTreeSet<String>,
}

/// A mapping from fully qualified service name to what should be exposed of it.
///
/// An empty policy includes everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InclusionPolicy {
    services: BTreeMap<String, ServiceRule>,
}

impl InclusionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Includes every method of `service`.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.include_service(service);
        self
    }

    /// Includes a single method of `service`.
    pub fn with_method(mut self, service: impl Into<String>, method: impl Into<String>) -> Self {
        self.include_method(service, method);
        self
    }

    pub fn include_service(&mut self, service: impl Into<String>) {
        self.services.entry(service.into()).or_default().include_service = true;
    }

    pub fn include_method(&mut self, service: impl Into<String>, method: impl Into<String>) {
        self.services
            .entry(service.into())
            .or_default()
            .include_methods
            .insert(method.into());
    }

    /// Includes a method given as `package.Service/Method` or `package.Service.Method`.
    pub fn include_method_path(&mut self, path: &str) -> Result<(), PolicyError> {
        let (service, method) = parse_method_path(path)?;
        self.include_method(service, method);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn rule(&self, service: &str) -> Option<&ServiceRule> {
        self.services.get(service)
    }

    pub fn services(&self) -> impl Iterator<Item = (&str, &ServiceRule)> {
        self.services
            .iter()
            .map(|(name, rule)| (name.as_str(), rule))
    }

    /// Removes and returns the rule of `service`.
    pub(crate) fn take_rule(&mut self, service: &str) -> Option<ServiceRule> {
        self.services.remove(service)
    }

    /// Names of the services that still have a rule, sorted.
    pub(crate) fn into_service_names(self) -> Vec<String> {
        self.services.into_keys().collect()
    }
}

/// Splits `package.Service/Method` (or `package.Service.Method`) into service and method.
pub fn parse_method_path(path: &str) -> Result<(String, String), PolicyError> {
    let invalid = || PolicyError::InvalidMethod(path.to_string());

    let (service, method) = path
        .split_once('/')
        .or_else(|| path.rsplit_once('.'))
        .ok_or_else(invalid)?;

    let (service, method) = (service.trim(), method.trim());

    if service.is_empty() || method.is_empty() || method.contains('/') {
        return Err(invalid());
    }

    Ok((service.to_string(), method.to_string()))
}
