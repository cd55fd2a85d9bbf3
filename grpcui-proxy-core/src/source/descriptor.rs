use prost_reflect::{DescriptorPool, EnumDescriptor, MessageDescriptor, ServiceDescriptor};

/// A generic wrapper for different types of Protobuf descriptors.
///
/// This enum allows a source to return a single type when resolving symbols,
/// regardless of whether the symbol points to a Service, a Message, or an Enum.
#[derive(Debug, Clone)]
pub enum Descriptor {
    MessageDescriptor(MessageDescriptor),
    ServiceDescriptor(ServiceDescriptor),
    EnumDescriptor(EnumDescriptor),
}

impl Descriptor {
    /// Looks up a symbol in a pool, services first.
    pub fn lookup(pool: &DescriptorPool, symbol: &str) -> Option<Self> {
        if let Some(descriptor) = pool.get_service_by_name(symbol) {
            return Some(Descriptor::ServiceDescriptor(descriptor));
        }
        if let Some(descriptor) = pool.get_message_by_name(symbol) {
            return Some(Descriptor::MessageDescriptor(descriptor));
        }
        if let Some(descriptor) = pool.get_enum_by_name(symbol) {
            return Some(Descriptor::EnumDescriptor(descriptor));
        }
        None
    }

    /// Returns the full_name (e.g.,`my.package.v1.MyMessage`) of the inner descriptor
    pub fn full_name(&self) -> &str {
        match self {
            Descriptor::MessageDescriptor(v) => v.full_name(),
            Descriptor::ServiceDescriptor(v) => v.full_name(),
            Descriptor::EnumDescriptor(v) => v.full_name(),
        }
    }

    /// A human readable name for the kind of descriptor (`service`, `message` or `enum`).
    pub fn kind(&self) -> &'static str {
        match self {
            Descriptor::MessageDescriptor(_) => "message",
            Descriptor::ServiceDescriptor(_) => "service",
            Descriptor::EnumDescriptor(_) => "enum",
        }
    }

    /// Consumes the wrapper, returning the inner [`ServiceDescriptor`] if this variant is one.
    pub fn into_service(self) -> Result<ServiceDescriptor, Self> {
        match self {
            Descriptor::ServiceDescriptor(d) => Ok(d),
            other => Err(other),
        }
    }
}
