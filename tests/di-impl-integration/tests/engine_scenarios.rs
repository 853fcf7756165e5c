//! 配方引擎与作用域模型的端到端场景

use di_abstractions::{
    BeanMetadata, BlueprintContainer, ClassBuilder, ClassRegistry, ComponentMetadata,
    ContainerDefaults, Metadata, ReferenceListMetadata, ReferenceMetadata, ServiceMetadata,
    ServiceReferenceMetadata, ServiceRegistry, Value,
};
use di_impl::{BlueprintContainerImpl, InMemoryServiceRegistry, ManagedCollection, ServiceProxy};
use infrastructure_common::{Filter, Properties};
use parking_lot::Mutex;
use scope_admin::{service_properties, PolicyType, ScopeAdmin, SharePolicy};
use std::sync::Arc;
use std::time::{Duration, Instant};

type Log = Arc<Mutex<Vec<String>>>;

/// 记录生命周期事件的组件
struct Link {
    name: Mutex<String>,
    next: Mutex<Option<Value>>,
    log: Log,
}

fn classes(log: &Log) -> Arc<ClassRegistry> {
    let ctor_log = log.clone();
    Arc::new(
        ClassRegistry::new().with(
            ClassBuilder::<Link>::new("demo.Link")
                .implements("com.foo.Bar")
                .constructor(&[], move |_| {
                    Ok(Link {
                        name: Mutex::new(String::new()),
                        next: Mutex::new(None),
                        log: ctor_log.clone(),
                    })
                })
                .property("name", "string", |link, value| {
                    *link.name.lock() = value.to_string();
                    Ok(())
                })
                .property("next", "any", |link, value| {
                    *link.next.lock() = Some(value);
                    Ok(())
                })
                .method("close", |link| {
                    let name = link.name.lock().clone();
                    link.log.lock().push(format!("close:{name}"));
                    Ok(())
                })
                .method("shutdown", |link| {
                    let name = link.name.lock().clone();
                    link.log.lock().push(format!("shutdown:{name}"));
                    if name == "b" {
                        return Err("b 拒绝关闭".into());
                    }
                    Ok(())
                })
                .build(),
        ),
    )
}

fn link(id: &str, next: Option<&str>) -> ComponentMetadata {
    let bean = BeanMetadata::new(id)
        .with_class("demo.Link")
        .with_property("name", Metadata::value(id))
        .with_destroy_method("close");
    match next {
        Some(next) => bean.with_property("next", Metadata::reference(next)).into(),
        None => bean.into(),
    }
}

fn start(
    log: &Log,
    registry: &Arc<InMemoryServiceRegistry>,
    components: Vec<ComponentMetadata>,
) -> Arc<BlueprintContainerImpl> {
    let container = BlueprintContainerImpl::new(
        "scenario.bundle",
        components,
        classes(log),
        registry.clone(),
        ContainerDefaults::default(),
    )
    .unwrap();
    container.start().unwrap();
    container
}

#[test]
fn test_dependents_are_destroyed_before_dependencies() {
    let log: Log = Arc::default();
    let registry = Arc::new(InMemoryServiceRegistry::new());
    let container = start(
        &log,
        &registry,
        vec![link("a", Some("b")), link("b", Some("c")), link("c", None)],
    );

    container.stop().unwrap();
    assert_eq!(*log.lock(), vec!["close:a", "close:b", "close:c"]);
}

#[test]
fn test_failing_destroy_method_does_not_block_the_others() {
    let log: Log = Arc::default();
    let registry = Arc::new(InMemoryServiceRegistry::new());
    let shutdown = |id: &str, next: Option<&str>| -> ComponentMetadata {
        let bean = BeanMetadata::new(id)
            .with_class("demo.Link")
            .with_property("name", Metadata::value(id))
            .with_destroy_method("shutdown");
        match next {
            Some(next) => bean.with_property("next", Metadata::reference(next)).into(),
            None => bean.into(),
        }
    };
    let container = start(
        &log,
        &registry,
        vec![shutdown("a", Some("b")), shutdown("b", Some("c")), shutdown("c", None)],
    );

    container.stop().unwrap();
    assert_eq!(*log.lock(), vec!["shutdown:a", "shutdown:b", "shutdown:c"]);
}

#[test]
fn test_singleton_is_shared_between_dependents() {
    let log: Log = Arc::default();
    let registry = Arc::new(InMemoryServiceRegistry::new());
    let container = start(
        &log,
        &registry,
        vec![link("left", Some("shared")), link("right", Some("shared")), link("shared", None)],
    );

    let shared = container.get_component_instance("shared").unwrap();
    assert!(container
        .get_component_instance("shared")
        .unwrap()
        .same_instance(&shared));
    for id in ["left", "right"] {
        let dependent = container.get_component_instance(id).unwrap();
        let next = dependent.downcast::<Link>().unwrap().next.lock().clone().unwrap();
        assert!(next.same_instance(&shared));
    }
    container.stop().unwrap();
}

#[test]
fn test_zero_timeout_fails_immediately_without_provider() {
    let log: Log = Arc::default();
    let registry = Arc::new(InMemoryServiceRegistry::new());
    let container = start(
        &log,
        &registry,
        vec![ReferenceMetadata::new("bar", ServiceReferenceMetadata::for_interface("com.foo.Bar"))
            .with_timeout(0)
            .into()],
    );

    let proxy = ServiceProxy::from_value(&container.get_component_instance("bar").unwrap()).unwrap();
    let started = Instant::now();
    let error = proxy.service_value().unwrap_err();
    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(error.filter.contains("com.foo.Bar"));
    container.stop().unwrap();
}

#[test]
fn test_blocking_call_waits_for_late_provider() {
    let log: Log = Arc::default();
    let registry = Arc::new(InMemoryServiceRegistry::new());
    let container = start(
        &log,
        &registry,
        vec![ReferenceMetadata::new("bar", ServiceReferenceMetadata::for_interface("com.foo.Bar"))
            .with_timeout(5_000)
            .into()],
    );
    let proxy = ServiceProxy::from_value(&container.get_component_instance("bar").unwrap()).unwrap();

    let late = registry.clone();
    let provider = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        late.register(vec!["com.foo.Bar".into()], Value::from("late"), Properties::new())
            .unwrap()
    });

    let value = proxy.service_value().unwrap();
    assert_eq!(value.as_str(), Some("late"));
    provider.join().unwrap();
    container.stop().unwrap();
}

#[test]
fn test_blocking_call_times_out() {
    let log: Log = Arc::default();
    let registry = Arc::new(InMemoryServiceRegistry::new());
    let container = start(
        &log,
        &registry,
        vec![ReferenceMetadata::new("bar", ServiceReferenceMetadata::for_interface("com.foo.Bar"))
            .with_timeout(100)
            .into()],
    );
    let proxy = ServiceProxy::from_value(&container.get_component_instance("bar").unwrap()).unwrap();

    let started = Instant::now();
    assert!(proxy.service_value().is_err());
    assert!(started.elapsed() >= Duration::from_millis(100));
    container.stop().unwrap();
}

#[test]
fn test_collection_returns_to_original_size() {
    let log: Log = Arc::default();
    let registry = Arc::new(InMemoryServiceRegistry::new());
    registry
        .register(vec!["com.foo.Bar".into()], Value::from("resident"), Properties::new())
        .unwrap();
    let container = start(
        &log,
        &registry,
        vec![ReferenceListMetadata::new(
            "bars",
            ServiceReferenceMetadata::for_interface("com.foo.Bar"),
        )
        .into()],
    );
    let bars = container.get_component_instance("bars").unwrap();
    let bars = bars.downcast::<ManagedCollection>().unwrap();
    assert_eq!(bars.len(), 1);

    let transient: Vec<_> = (0..3)
        .map(|i| {
            registry
                .register(vec!["com.foo.Bar".into()], Value::Int(i), Properties::new())
                .unwrap()
        })
        .collect();
    assert_eq!(bars.len(), 4);
    for reference in &transient {
        assert!(registry.unregister(reference));
    }
    assert_eq!(bars.len(), 1);
    container.stop().unwrap();
}

#[test]
fn test_exported_service_matches_component_filter() {
    let log: Log = Arc::default();
    let registry = Arc::new(InMemoryServiceRegistry::new());
    let container = start(
        &log,
        &registry,
        vec![
            link("x", None),
            link("y", None),
            ServiceMetadata::new("x-service", Metadata::reference("x"))
                .with_interface("com.foo.Bar")
                .into(),
            ServiceMetadata::new("y-service", Metadata::reference("y"))
                .with_interface("com.foo.Bar")
                .into(),
        ],
    );

    let filter = Filter::parse("(&(objectClass=com.foo.Bar)(component.name=x))").unwrap();
    let references = registry.get_service_references(Some(&filter));
    assert_eq!(references.len(), 1);
    let service = registry.get_service(&references[0]).unwrap();
    assert!(service.same_instance(&container.get_component_instance("x").unwrap()));

    container.stop().unwrap();
    assert!(registry.get_service_references(Some(&filter)).is_empty());
}

#[test]
fn test_stale_scope_update_is_rejected_then_retried() -> anyhow::Result<()> {
    let admin = ScopeAdmin::new();
    let mut first = admin.new_scope_update()?;
    let mut second = admin.new_scope_update()?;
    first.new_child("first");
    second.new_child("second");

    assert!(first.commit()?);
    assert!(!second.commit()?);
    assert!(admin.find_by_name("second").is_none());

    let mut retry = admin.new_scope_update()?;
    retry.new_child("second");
    assert!(retry.commit()?);
    assert!(admin.find_by_name("first").is_some());
    assert!(admin.find_by_name("second").is_some());
    Ok(())
}

#[test]
fn test_child_export_reaches_parent_but_not_sibling() -> anyhow::Result<()> {
    let admin = ScopeAdmin::new();
    let mut update = admin.new_scope_update()?;
    update
        .new_child("provider")
        .policies_mut()
        .add(SharePolicy::service(PolicyType::Export, "(objectClass=com.foo.Bar)")?);
    update.new_child("consumer");
    assert!(update.commit()?);

    let tree = admin.snapshot();
    let provider = tree.find_by_name("provider").map(|s| s.id()).unwrap_or_default();
    let consumer = tree.find_by_name("consumer").map(|s| s.id()).unwrap_or_default();
    let bar = service_properties(&["com.foo.Bar"]);

    assert!(admin.can_see_service(0, provider, &bar)?);
    assert!(!admin.can_see_service(consumer, provider, &bar)?);
    assert!(!admin.can_see_service(0, provider, &service_properties(&["com.foo.Baz"]))?);
    Ok(())
}
