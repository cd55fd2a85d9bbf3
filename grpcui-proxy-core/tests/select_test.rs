use grpcui_proxy_core::select::{InclusionPolicy, SelectError, select_methods};
use grpcui_proxy_core::source::{Descriptor, DescriptorSource, PoolSource, SourceError};
use prost_reflect::{DescriptorPool, FileDescriptor, MethodDescriptor};
use std::io;
use std::sync::{Arc, Mutex};


/// A source advertising an arbitrary list of names on top of the greeter schema.
struct ListedSource {
    pool: DescriptorPool,
    services: Vec<String>,
}

impl ListedSource {
    fn new(services: &[&str]) -> Self {
        Self {
            pool: greeter_fixture::descriptor_pool(),
            services: services.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl DescriptorSource for ListedSource {
    async fn list_services(&mut self) -> Result<Vec<String>, SourceError> {
        Ok(self.services.clone())
    }

    async fn find_symbol(&mut self, symbol: &str) -> Result<Descriptor, SourceError> {
        Descriptor::lookup(&self.pool, symbol)
            .ok_or_else(|| SourceError::NotFound(symbol.to_string()))
    }

    async fn all_files(&mut self) -> Result<Vec<FileDescriptor>, SourceError> {
        Ok(self.pool.files().collect())
    }
}

/// Log output collected by a test subscriber.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        let logs = self.clone();

        tracing_subscriber::fmt()
            .with_writer(move || logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish()
    }

    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn pool_source() -> PoolSource {
    PoolSource::new(greeter_fixture::descriptor_pool())
}

fn paths(methods: &[MethodDescriptor]) -> Vec<String> {
    methods
        .iter()
        .map(|m| format!("{}/{}", m.parent_service().full_name(), m.name()))
        .collect()
}

#[tokio::test]
async fn test_no_policy_selects_every_method_in_discovery_order() {
    let methods = select_methods(&mut pool_source(), None).await.unwrap();

    assert_eq!(
        paths(&methods),
        ["pkg.Greeter/SayHello", "pkg.Greeter/SayBye", "pkg.Admin/Reset"]
    );
}

#[tokio::test]
async fn test_empty_policy_selects_every_method() {
    let policy = InclusionPolicy::new();

    let methods = select_methods(&mut pool_source(), Some(&policy))
        .await
        .unwrap();

    assert_eq!(methods.len(), 3);
}

#[tokio::test]
async fn test_server_order_is_preserved() {
    let mut source = ListedSource::new(&["pkg.Admin", "pkg.Greeter"]);

    let methods = select_methods(&mut source, None).await.unwrap();

    assert_eq!(
        paths(&methods),
        ["pkg.Admin/Reset", "pkg.Greeter/SayHello", "pkg.Greeter/SayBye"]
    );
}

#[tokio::test]
async fn test_reflection_services_are_never_selected() {
    // The greeter pool does not describe the reflection services, resolving them would fail.
    let mut source = ListedSource::new(&[
        "grpc.reflection.v1alpha.ServerReflection",
        "pkg.Greeter",
        "grpc.reflection.v1.ServerReflection",
    ]);

    let methods = select_methods(&mut source, None).await.unwrap();

    assert_eq!(paths(&methods), ["pkg.Greeter/SayHello", "pkg.Greeter/SayBye"]);
}

#[tokio::test]
async fn test_whole_service_policy_selects_only_that_service() {
    let policy = InclusionPolicy::new().with_service("pkg.Greeter");

    let methods = select_methods(&mut pool_source(), Some(&policy))
        .await
        .unwrap();

    assert_eq!(paths(&methods), ["pkg.Greeter/SayHello", "pkg.Greeter/SayBye"]);
}

#[tokio::test]
async fn test_several_services_select_their_union() {
    let policy = InclusionPolicy::new()
        .with_service("pkg.Admin")
        .with_service("pkg.Greeter");

    let methods = select_methods(&mut pool_source(), Some(&policy))
        .await
        .unwrap();

    assert_eq!(
        paths(&methods),
        ["pkg.Greeter/SayHello", "pkg.Greeter/SayBye", "pkg.Admin/Reset"]
    );
}

#[tokio::test]
async fn test_explicit_methods_are_selected_in_declaration_order() {
    let policy = InclusionPolicy::new()
        .with_method("pkg.Greeter", "SayBye")
        .with_method("pkg.Greeter", "SayHello");

    let methods = select_methods(&mut pool_source(), Some(&policy))
        .await
        .unwrap();

    assert_eq!(paths(&methods), ["pkg.Greeter/SayHello", "pkg.Greeter/SayBye"]);
}

#[tokio::test]
async fn test_redundant_method_is_selected_once() {
    let policy = InclusionPolicy::new()
        .with_service("pkg.Greeter")
        .with_method("pkg.Greeter", "SayHello");

    let methods = select_methods(&mut pool_source(), Some(&policy))
        .await
        .unwrap();

    assert_eq!(paths(&methods), ["pkg.Greeter/SayHello", "pkg.Greeter/SayBye"]);
}

#[tokio::test]
async fn test_redundant_method_is_logged_as_a_warning() {
    let logs = CapturedLogs::default();
    let _guard = tracing::subscriber::set_default(logs.subscriber());

    let policy = InclusionPolicy::new()
        .with_service("pkg.Greeter")
        .with_method("pkg.Greeter", "SayHello");

    select_methods(&mut pool_source(), Some(&policy))
        .await
        .unwrap();

    let output = logs.contents();
    assert!(output.contains("WARN"), "Expected a warning, got: {output}");
    assert!(output.contains("already included"));
    assert!(output.contains("pkg.Greeter"));
    assert!(output.contains("SayHello"));
    assert!(!output.contains("SayBye"));
}

#[tokio::test]
async fn test_policy_without_redundancy_logs_nothing() {
    let logs = CapturedLogs::default();
    let _guard = tracing::subscriber::set_default(logs.subscriber());

    let policy = InclusionPolicy::new()
        .with_service("pkg.Admin")
        .with_method("pkg.Greeter", "SayHello");

    select_methods(&mut pool_source(), Some(&policy))
        .await
        .unwrap();

    assert_eq!(logs.contents(), "");
}

#[tokio::test]
async fn test_unknown_method_is_reported() {
    let policy = InclusionPolicy::new().with_method("pkg.Greeter", "Nope");

    let err = select_methods(&mut pool_source(), Some(&policy))
        .await
        .unwrap_err();

    assert!(matches!(err, SelectError::MethodsNotFound(ref missing) if missing == &["pkg.Greeter/Nope"]));
    assert!(err.to_string().contains("pkg.Greeter/Nope"));
}

#[tokio::test]
async fn test_all_unknown_methods_are_reported_sorted() {
    let policy = InclusionPolicy::new()
        .with_method("pkg.Greeter", "Zeta")
        .with_method("pkg.Greeter", "SayHello")
        .with_method("pkg.Admin", "Wipe")
        .with_method("pkg.Greeter", "Alpha");

    let err = select_methods(&mut pool_source(), Some(&policy))
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "configured methods not found: pkg.Admin/Wipe, pkg.Greeter/Alpha, pkg.Greeter/Zeta"
    );
}

#[tokio::test]
async fn test_unknown_service_is_reported() {
    let policy = InclusionPolicy::new().with_service("pkg.Missing");

    let err = select_methods(&mut pool_source(), Some(&policy))
        .await
        .unwrap_err();

    assert!(matches!(err, SelectError::ServicesNotFound(ref missing) if missing == &["pkg.Missing"]));
    assert_eq!(err.to_string(), "configured services not found: pkg.Missing");
}

#[tokio::test]
async fn test_all_unknown_services_are_reported_sorted() {
    let policy = InclusionPolicy::new()
        .with_service("pkg.Zoo")
        .with_service("pkg.Greeter")
        .with_method("pkg.Apiary", "Buzz");

    let err = select_methods(&mut pool_source(), Some(&policy))
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "configured services not found: pkg.Apiary, pkg.Zoo"
    );
}

#[tokio::test]
async fn test_unknown_methods_are_reported_before_unknown_services() {
    let policy = InclusionPolicy::new()
        .with_service("pkg.Missing")
        .with_method("pkg.Greeter", "Nope");

    let err = select_methods(&mut pool_source(), Some(&policy))
        .await
        .unwrap_err();

    assert!(matches!(err, SelectError::MethodsNotFound(_)));
}

#[tokio::test]
async fn test_symbol_that_is_not_a_service_is_a_protocol_error() {
    let mut source = ListedSource::new(&["pkg.Greeter", "pkg.HelloRequest"]);

    let err = select_methods(&mut source, None).await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "pkg.HelloRequest should be a service descriptor but instead is a message"
    );

    let mut source = ListedSource::new(&["pkg.Mood"]);
    let err = select_methods(&mut source, None).await.unwrap_err();

    assert!(matches!(err, SelectError::NotAService { kind: "enum", .. }));
}

#[tokio::test]
async fn test_unresolvable_service_fails() {
    let mut source = ListedSource::new(&["pkg.Ghost"]);

    let err = select_methods(&mut source, None).await.unwrap_err();

    assert!(matches!(
        err,
        SelectError::Source(SourceError::NotFound(ref symbol)) if symbol == "pkg.Ghost"
    ));
}

#[tokio::test]
async fn test_caller_policy_is_not_modified() {
    let policy = InclusionPolicy::new()
        .with_service("pkg.Greeter")
        .with_method("pkg.Greeter", "SayHello")
        .with_method("pkg.Admin", "Reset");
    let before = policy.clone();

    select_methods(&mut pool_source(), Some(&policy))
        .await
        .unwrap();

    assert_eq!(policy, before);

    // The same policy can be applied again with the same outcome.
    let methods = select_methods(&mut pool_source(), Some(&policy))
        .await
        .unwrap();

    assert_eq!(
        paths(&methods),
        ["pkg.Greeter/SayHello", "pkg.Greeter/SayBye", "pkg.Admin/Reset"]
    );
}

#[tokio::test]
async fn test_greeter_scenarios() {
    let mut source = ListedSource::new(&["pkg.Greeter", "pkg.Admin"]);

    let whole = InclusionPolicy::new().with_service("pkg.Greeter");
    let methods = select_methods(&mut source, Some(&whole)).await.unwrap();
    assert_eq!(paths(&methods), ["pkg.Greeter/SayHello", "pkg.Greeter/SayBye"]);

    let nope = InclusionPolicy::new().with_method("pkg.Greeter", "Nope");
    let err = select_methods(&mut source, Some(&nope)).await.unwrap_err();
    assert!(err.to_string().contains("pkg.Greeter/Nope"));

    let missing = InclusionPolicy::new().with_service("pkg.Missing");
    let err = select_methods(&mut source, Some(&missing)).await.unwrap_err();
    assert!(err.to_string().contains("pkg.Missing"));
}
