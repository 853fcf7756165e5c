//! 生成的服务代理的集成测试

use di_abstractions::{
    BlueprintContainer, ClassRegistry, ContainerDefaults, ReferenceListMetadata,
    ReferenceMetadata, ServiceReferenceMetadata, ServiceRegistry, Value,
};
use di_impl::{BlueprintContainerImpl, InMemoryServiceRegistry, ManagedCollection, ServiceProxy};
use infrastructure_common::{Properties, ServiceUnavailableError, SERVICE_RANKING};
use proxy_macros::service_proxy;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
enum GreetError {
    #[error(transparent)]
    Unavailable(#[from] ServiceUnavailableError),
    #[error("名字不能为空")]
    EmptyName,
}

#[service_proxy]
pub trait Greeter: Send + Sync {
    fn greet(&self, name: &str) -> Result<String, GreetError>;
    fn language(&self) -> Result<&'static str, ServiceUnavailableError>;
}

struct Fixed {
    language: &'static str,
    greeting: &'static str,
}

impl Greeter for Fixed {
    fn greet(&self, name: &str) -> Result<String, GreetError> {
        if name.is_empty() {
            return Err(GreetError::EmptyName);
        }
        Ok(format!("{}, {name}", self.greeting))
    }

    fn language(&self) -> Result<&'static str, ServiceUnavailableError> {
        Ok(self.language)
    }
}

fn greeter(language: &'static str, greeting: &'static str) -> Value {
    let service: Arc<dyn Greeter> = Arc::new(Fixed { language, greeting });
    Value::shared("demo.Fixed", service)
}

fn consumer(
    registry: &Arc<InMemoryServiceRegistry>,
    reference: impl Into<di_abstractions::ComponentMetadata>,
) -> Arc<BlueprintContainerImpl> {
    let container = BlueprintContainerImpl::new(
        "consumer.bundle",
        vec![reference.into()],
        Arc::new(ClassRegistry::new()),
        registry.clone(),
        ContainerDefaults::default(),
    )
    .unwrap();
    container.start().unwrap();
    container
}

#[test]
fn test_proxy_forwards_to_bound_service() {
    let registry = Arc::new(InMemoryServiceRegistry::new());
    registry
        .register(vec!["demo.Greeter".into()], greeter("en", "Hello"), Properties::new())
        .unwrap();
    let container = consumer(
        &registry,
        ReferenceMetadata::new("greeter", ServiceReferenceMetadata::for_interface("demo.Greeter"))
            .with_timeout(0),
    );

    let value = container.get_component_instance("greeter").unwrap();
    let proxy = GreeterProxy::from_value(&value).unwrap();
    assert_eq!(proxy.greet("Aries").unwrap(), "Hello, Aries");
    assert_eq!(proxy.language().unwrap(), "en");
    assert!(proxy.handle().is_bound());
    container.stop().unwrap();
}

#[test]
fn test_service_errors_pass_through_unchanged() {
    let registry = Arc::new(InMemoryServiceRegistry::new());
    registry
        .register(vec!["demo.Greeter".into()], greeter("en", "Hello"), Properties::new())
        .unwrap();
    let container = consumer(
        &registry,
        ReferenceMetadata::new("greeter", ServiceReferenceMetadata::for_interface("demo.Greeter"))
            .with_timeout(0),
    );

    let proxy = GreeterProxy::from_value(&container.get_component_instance("greeter").unwrap())
        .unwrap();
    assert!(matches!(proxy.greet(""), Err(GreetError::EmptyName)));
    container.stop().unwrap();
}

#[test]
fn test_proxy_follows_better_provider_and_reports_absence() {
    let registry = Arc::new(InMemoryServiceRegistry::new());
    let english = registry
        .register(vec!["demo.Greeter".into()], greeter("en", "Hello"), Properties::new())
        .unwrap();
    let container = consumer(
        &registry,
        ReferenceMetadata::new("greeter", ServiceReferenceMetadata::for_interface("demo.Greeter"))
            .with_timeout(0),
    );
    let proxy = GreeterProxy::from_value(&container.get_component_instance("greeter").unwrap())
        .unwrap();
    assert_eq!(proxy.language().unwrap(), "en");

    let french = registry
        .register(
            vec!["demo.Greeter".into()],
            greeter("fr", "Bonjour"),
            Properties::new().with(SERVICE_RANKING, 10i64),
        )
        .unwrap();
    assert_eq!(proxy.greet("Aries").unwrap(), "Bonjour, Aries");

    registry.unregister(&french);
    assert_eq!(proxy.language().unwrap(), "en");

    registry.unregister(&english);
    assert!(matches!(proxy.greet("Aries"), Err(GreetError::Unavailable(_))));
    assert!(proxy.language().is_err());
    container.stop().unwrap();
}

#[test]
fn test_collection_members_wrap_in_proxies() {
    let registry = Arc::new(InMemoryServiceRegistry::new());
    let container = consumer(
        &registry,
        ReferenceListMetadata::new("greeters", ServiceReferenceMetadata::for_interface("demo.Greeter")),
    );
    for (language, greeting) in [("en", "Hello"), ("de", "Hallo")] {
        registry
            .register(vec!["demo.Greeter".into()], greeter(language, greeting), Properties::new())
            .unwrap();
    }

    let greeters = container.get_component_instance("greeters").unwrap();
    let greeters = greeters.downcast::<ManagedCollection>().unwrap();
    let languages: Vec<_> = greeters
        .iter()
        .filter_map(|member| GreeterProxy::from_value(&member))
        .map(|proxy| proxy.language().unwrap())
        .collect();
    assert_eq!(languages.len(), 2);
    assert!(languages.contains(&"en"));
    assert!(languages.contains(&"de"));
    container.stop().unwrap();
}

#[test]
fn test_from_value_rejects_plain_values() {
    assert!(GreeterProxy::from_value(&Value::from("not a proxy")).is_none());
    assert!(ServiceProxy::from_value(&greeter("en", "Hello")).is_none());
}
