use grpcui_proxy_core::reflection::{ReflectionClient, ReflectionProtocol, ReflectionResolveError};
use grpcui_proxy_core::source::{DescriptorSource, ReflectionSource, SourceError};
use prost_reflect::DescriptorPool;
use tonic::Code;


#[tokio::test]
async fn test_reflection_client_lists_services_over_v1() {
    let mut client = ReflectionClient::new(greeter_fixture::reflection_v1());

    let services = client.list_services().await.unwrap();

    assert!(services.contains(&"pkg.Greeter".to_string()));
    assert!(services.contains(&"pkg.Admin".to_string()));
    assert_eq!(client.protocol(), Some(ReflectionProtocol::V1));
}

#[tokio::test]
async fn test_reflection_client_falls_back_to_v1alpha() {
    let mut client = ReflectionClient::new(greeter_fixture::reflection_v1alpha());

    let services = client.list_services().await.unwrap();

    assert!(services.contains(&"pkg.Greeter".to_string()));
    assert!(services.contains(&"grpc.reflection.v1alpha.ServerReflection".to_string()));
    assert_eq!(client.protocol(), Some(ReflectionProtocol::V1Alpha));

    // The chosen protocol is reused for symbol resolution.
    let fd_set = client
        .file_descriptor_set_by_symbol("pkg.Admin")
        .await
        .unwrap();

    let pool = DescriptorPool::from_file_descriptor_set(fd_set).unwrap();
    assert!(pool.get_service_by_name("pkg.Admin").is_some());
}

#[tokio::test]
async fn test_reflection_client_fetches_transitive_dependencies() {
    let mut client = ReflectionClient::new(greeter_fixture::reflection_v1());

    let fd_set = client
        .file_descriptor_set_by_symbol("pkg.Greeter")
        .await
        .expect("Failed to fetch file descriptor set by symbol");

    let mut names: Vec<_> = fd_set.file.iter().filter_map(|f| f.name.clone()).collect();
    names.sort();
    assert_eq!(names, ["pkg/common.proto", "pkg/greeter.proto"]);

    let pool =
        DescriptorPool::from_file_descriptor_set(fd_set).expect("Failed to build descriptor pool");

    let admin = pool.get_service_by_name("pkg.Admin").unwrap();
    let reset = admin.methods().next().unwrap();
    assert_eq!(reset.input().full_name(), "pkg.common.Empty");
}

#[tokio::test]
async fn test_reflection_service_not_found_error() {
    let mut client = ReflectionClient::new(greeter_fixture::reflection_v1());

    let result = client.file_descriptor_set_by_symbol("pkg.Ghost").await;

    match result {
        Err(err) => assert!(err.is_not_found(), "Expected a not found error, got: {err:?}"),
        Ok(_) => panic!("Expected error, but got a descriptor set"),
    }
}

#[tokio::test]
async fn test_pinned_protocol_not_served() {
    let mut client = ReflectionClient::new(greeter_fixture::reflection_v1alpha())
        .with_protocol(ReflectionProtocol::V1);

    let result = client.list_services().await;

    match result {
        Err(ReflectionResolveError::ServerStreamInitFailed(status)) => {
            assert_eq!(
                status.code(),
                Code::Unimplemented,
                "Expected UNIMPLEMENTED status (service not found), but got: {:?}",
                status
            );
        }
        Err(e) => panic!("Expected StreamInitFailed(Unimplemented), got: {:?}", e),
        Ok(_) => panic!("Expected error, but got a service list"),
    }
}

#[tokio::test]
async fn test_reflection_source_resolves_and_collects_files() {
    let client = ReflectionClient::new(greeter_fixture::reflection_v1());
    let mut source = ReflectionSource::new(client);

    let greeter = source.find_symbol("pkg.Greeter").await.unwrap();
    assert_eq!(greeter.kind(), "service");

    // Already in the pool, answered without another round trip.
    let request = source.find_symbol("pkg.HelloRequest").await.unwrap();
    assert_eq!(request.full_name(), "pkg.HelloRequest");

    let files = source.all_files().await.unwrap();
    let names: Vec<_> = files.iter().map(|f| f.name().to_string()).collect();

    assert!(names.contains(&"pkg/common.proto".to_string()));
    assert!(names.contains(&"pkg/greeter.proto".to_string()));
    assert!(names.is_sorted());
}

#[tokio::test]
async fn test_reflection_source_reports_unknown_symbols() {
    let client = ReflectionClient::new(greeter_fixture::reflection_v1());
    let mut source = ReflectionSource::new(client);

    let result = source.find_symbol("pkg.Ghost").await;

    assert!(matches!(result, Err(SourceError::NotFound(symbol)) if symbol == "pkg.Ghost"));
}

#[tokio::test]
async fn test_tolerant_client_skips_a_dependency_the_server_lacks() {
    let mut client = ReflectionClient::new(greeter_fixture::reflection_v1_with_missing_import())
        .allow_missing_file_descriptors();

    let fd_set = client
        .file_descriptor_set_by_symbol("pkg.Greeter")
        .await
        .expect("A missing import should not fail a tolerant client");

    let mut names: Vec<_> = fd_set.file.iter().filter_map(|f| f.name.clone()).collect();
    names.sort();
    assert_eq!(names, ["pkg/common.proto", "pkg/greeter.proto"]);
}

#[tokio::test]
async fn test_strict_client_names_the_missing_dependency() {
    let mut client = ReflectionClient::new(greeter_fixture::reflection_v1_with_missing_import());

    let result = client.file_descriptor_set_by_symbol("pkg.Greeter").await;

    match result {
        Err(ReflectionResolveError::MissingDependency { file, status }) => {
            assert_eq!(file, greeter_fixture::MISSING_IMPORT);
            assert_eq!(status.code(), Code::NotFound);
        }
        Err(e) => panic!("Expected MissingDependency, got: {:?}", e),
        Ok(_) => panic!("Expected error, but got a descriptor set"),
    }
}

#[tokio::test]
async fn test_missing_dependency_is_not_reported_as_an_unknown_symbol() {
    let client = ReflectionClient::new(greeter_fixture::reflection_v1_with_missing_import());
    let mut source = ReflectionSource::new(client);

    let result = source.find_symbol("pkg.Greeter").await;

    match result {
        Err(SourceError::ReflectionResolve(err)) => {
            assert!(!err.is_not_found());
            assert!(err.to_string().contains(greeter_fixture::MISSING_IMPORT));
        }
        Err(e) => panic!("Expected a reflection error, got: {:?}", e),
        Ok(_) => panic!("Expected error, but got a descriptor"),
    }
}

#[tokio::test]
async fn test_tolerant_source_builds_the_pool_around_a_missing_dependency() {
    let client = ReflectionClient::new(greeter_fixture::reflection_v1_with_missing_import())
        .allow_missing_file_descriptors();
    let mut source = ReflectionSource::new(client);

    let greeter = source.find_symbol("pkg.Greeter").await.unwrap();
    assert_eq!(greeter.kind(), "service");

    let pool = source.pool();
    assert!(pool.get_service_by_name("pkg.Admin").is_some());
    assert!(pool.get_file_by_name(greeter_fixture::MISSING_IMPORT).is_some());
}
