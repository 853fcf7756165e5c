//! 运行时组合的集成测试

use crate::builder::{LoggingConfig, RuntimeBuilder};
use config_impl::RuntimeSettings;
use di_abstractions::{
    BeanMetadata, BlueprintContainer, ClassBuilder, Metadata, ReferenceMetadata,
    ServiceMetadata, ServiceReferenceMetadata,
};
use di_impl::ServiceProxy;
use infrastructure_common::{InfrastructureError, LifecycleState};
use scope_admin::BundleDescriptor;
use std::sync::Arc;

trait Greeter: Send + Sync {
    fn greet(&self, name: &str) -> String;
}

struct English;

impl Greeter for English {
    fn greet(&self, name: &str) -> String {
        format!("Hello, {name}")
    }
}

fn english_class() -> di_abstractions::ClassDescriptor {
    ClassBuilder::<English>::new("demo.English")
        .view::<dyn Greeter>("demo.Greeter", |e| e)
        .constructor(&[], |_| Ok(English))
        .build()
}

fn settings_without_persistence() -> RuntimeSettings {
    let mut settings = RuntimeSettings::default();
    settings.blueprint.default_timeout_ms = 0;
    settings
}

/// 测试跨容器的服务导出与消费
#[tokio::test]
async fn test_service_flows_between_containers() {
    let runtime = RuntimeBuilder::new()
        .with_settings(settings_without_persistence())
        .register_class(english_class())
        .with_logging(LoggingConfig::development())
        .build()
        .await
        .unwrap();
    runtime.start().await.unwrap();

    runtime
        .create_container(
            "provider.bundle",
            vec![
                BeanMetadata::new("english").with_class("demo.English").into(),
                ServiceMetadata::new("english-service", Metadata::reference("english"))
                    .with_interface("demo.Greeter")
                    .into(),
            ],
        )
        .await
        .unwrap();
    let consumer = runtime
        .create_container(
            "consumer.bundle",
            vec![ReferenceMetadata::new(
                "greeter",
                ServiceReferenceMetadata::for_interface("demo.Greeter"),
            )
            .into()],
        )
        .await
        .unwrap();

    let value = consumer.get_component_instance("greeter").unwrap();
    let proxy = ServiceProxy::from_value(&value).unwrap();
    let greeter = proxy.service::<dyn Greeter>().unwrap();
    assert_eq!(greeter.greet("Aries"), "Hello, Aries");
    assert!(consumer.is_satisfied());

    assert_eq!(
        runtime.container_names().await,
        vec!["provider.bundle".to_string(), "consumer.bundle".to_string()]
    );
    runtime.stop().await.unwrap();
    assert!(runtime.registry().is_empty());
    assert_eq!(runtime.status().await, LifecycleState::Stopped);

    let metrics = runtime.metrics().await;
    assert_eq!(metrics.containers_created, 2);
    assert_eq!(metrics.containers_stopped, 2);
    assert!(metrics.uptime().is_some());
}

/// 测试运行时未启动或重名时拒绝创建容器
#[tokio::test]
async fn test_container_creation_guards() {
    let runtime = RuntimeBuilder::new()
        .with_settings(settings_without_persistence())
        .register_class(english_class())
        .build()
        .await
        .unwrap();

    let components = || vec![BeanMetadata::new("english").with_class("demo.English").into()];
    let early = runtime.create_container("app", components()).await;
    assert!(matches!(early, Err(InfrastructureError::BootstrapFailed { .. })));

    runtime.start().await.unwrap();
    runtime.create_container("app", components()).await.unwrap();
    let duplicate = runtime.create_container("app", components()).await;
    assert!(matches!(duplicate, Err(InfrastructureError::BootstrapFailed { .. })));

    assert!(runtime.destroy_container("app").await.unwrap());
    assert!(!runtime.destroy_container("app").await.unwrap());
    assert!(runtime.container("app").await.is_none());
    runtime.stop().await.unwrap();
}

/// 测试容器元数据错误映射为构建错误
#[tokio::test]
async fn test_invalid_metadata_is_construction_error() {
    let runtime = RuntimeBuilder::new()
        .with_settings(settings_without_persistence())
        .build()
        .await
        .unwrap();
    runtime.start().await.unwrap();

    let result = runtime
        .create_container(
            "broken",
            vec![BeanMetadata::new("bean").with_class("missing.Class").into()],
        )
        .await;
    assert!(matches!(
        result,
        Err(InfrastructureError::ConstructionError { .. })
    ));
    assert!(runtime.container("broken").await.is_none());
}

/// 测试作用域树跨运行时重启持久化并对账
#[tokio::test]
async fn test_scope_state_survives_runtime_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = settings_without_persistence();
    settings.scope.persistence_path = Some(dir.path().join("scopes.json"));

    {
        let runtime = RuntimeBuilder::new()
            .with_settings(settings.clone())
            .build()
            .await
            .unwrap();
        let mut update = runtime.scopes().new_scope_update().unwrap();
        update
            .new_child("tenant")
            .bundles_to_install_mut()
            .push(BundleDescriptor::new("tenant.core", "file:tenant.jar"));
        assert!(update.commit().unwrap());
    }

    let runtime = RuntimeBuilder::new()
        .with_settings(settings)
        .with_installed_bundles(vec![
            BundleDescriptor::new("tenant.core", "file:tenant.jar"),
            BundleDescriptor::new("late.arrival", "file:late.jar"),
        ])
        .build()
        .await
        .unwrap();
    let scopes = runtime.scopes();
    let tree = scopes.snapshot();
    let tenant = tree.find_by_name("tenant").map(|s| s.id());
    let core = tree.bundle_by_name("tenant.core").map(|b| b.id);
    assert_eq!(core.and_then(|b| tree.bundle_owner(b)), tenant);
    let late = tree.bundle_by_name("late.arrival").map(|b| b.id);
    assert_eq!(late.and_then(|b| tree.bundle_owner(b)), Some(0));
}

/// 测试设置文件缺失时构建失败
#[tokio::test]
async fn test_missing_config_file_error_handling() {
    let result = RuntimeBuilder::new()
        .without_env()
        .add_config_file("non_existent_config.toml")
        .unwrap()
        .build()
        .await;

    match result {
        Err(InfrastructureError::ConfigError { source }) => {
            assert!(source.to_string().contains("non_existent_config.toml"));
        }
        Err(other) => panic!("应该是 ConfigError 错误, 实际为 {other}"),
        Ok(_) => panic!("缺失的配置文件应该导致构建失败"),
    }
}

/// 测试设置文件中的默认值传递给容器
#[tokio::test]
async fn test_settings_file_drives_container_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("aries.toml");
    tokio::fs::write(
        &path,
        "[blueprint]\ndefault_timeout_ms = 25\ndefault_init_method = \"init\"\n",
    )
    .await
    .unwrap();

    let runtime = RuntimeBuilder::new()
        .without_env()
        .add_config_file(&path)
        .unwrap()
        .build()
        .await
        .unwrap();
    assert_eq!(runtime.defaults().timeout_ms, 25);
    assert_eq!(runtime.defaults().init_method.as_deref(), Some("init"));
    let _: &Arc<_> = runtime.classes();
}
