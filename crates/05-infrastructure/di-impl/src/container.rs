//! Blueprint 容器实现
//!
//! 一组组件元数据对应一个容器。创建时把元数据翻译为配方并校验引用，
//! `start()` 先创建所有服务引用，再按声明顺序创建急切组件；
//! `stop()` 先注销导出的服务，再逆序销毁仓库中的实例。

use crate::builder::RecipeBuilder;
use crate::recipes::{PassThroughRecipe, ServiceRegistration};
use crate::repository::BlueprintRepository;
use di_abstractions::{
    Activation, Availability, BeanScope, BlueprintContainer, ClassRegistry, ComponentMetadata,
    ContainerDefaults, ListenerId, Recipe, SatisfactionListener, ServiceEvent, ServiceEventKind,
    ServiceListener, ServiceRegistry, Value,
};
use infrastructure_common::{
    guard_callback, ConstructionError, ConstructionResult, Filter, LifecycleState,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

/// 环境组件：容器自身
pub const BLUEPRINT_CONTAINER: &str = "blueprintContainer";
/// 环境组件：所属 bundle 名称
pub const BLUEPRINT_BUNDLE: &str = "blueprintBundle";

/// 指向容器的弱引用句柄，作为 `blueprintContainer` 环境组件注入
#[derive(Debug, Clone)]
pub struct ContainerHandle {
    inner: Weak<BlueprintContainerImpl>,
}

impl ContainerHandle {
    /// 取得容器，容器已释放时返回 `None`
    pub fn upgrade(&self) -> Option<Arc<BlueprintContainerImpl>> {
        self.inner.upgrade()
    }
}

/// 必需引用的满足状态监视器
struct SatisfactionMonitor {
    registry: Arc<dyn ServiceRegistry>,
    mandatory: Vec<(String, Filter)>,
    satisfied: Mutex<bool>,
    listeners: Mutex<Vec<Arc<dyn SatisfactionListener>>>,
    listener_id: Mutex<Option<ListenerId>>,
}

impl SatisfactionMonitor {
    fn new(registry: Arc<dyn ServiceRegistry>, mandatory: Vec<(String, Filter)>) -> Self {
        Self {
            registry,
            mandatory,
            satisfied: Mutex::new(false),
            listeners: Mutex::new(Vec::new()),
            listener_id: Mutex::new(None),
        }
    }

    fn compute(&self, departing: Option<u64>) -> bool {
        self.mandatory.iter().all(|(_, filter)| {
            self.registry
                .get_service_references(Some(filter))
                .iter()
                .any(|r| Some(r.id()) != departing)
        })
    }

    fn start(self: &Arc<Self>) {
        *self.satisfied.lock() = self.compute(None);
        if self.mandatory.is_empty() {
            return;
        }
        let listener: Arc<dyn ServiceListener> = Arc::new(MonitorListener {
            monitor: Arc::downgrade(self),
        });
        *self.listener_id.lock() = Some(self.registry.add_listener(None, listener));
    }

    fn stop(&self) {
        if let Some(id) = self.listener_id.lock().take() {
            self.registry.remove_listener(id);
        }
    }

    fn is_satisfied(&self) -> bool {
        *self.satisfied.lock()
    }

    fn reevaluate(&self, departing: Option<u64>) {
        let now = self.compute(departing);
        {
            let mut satisfied = self.satisfied.lock();
            if *satisfied == now {
                return;
            }
            *satisfied = now;
        }
        if now {
            info!("容器的必需引用已全部满足");
        } else {
            let missing: Vec<&str> = self
                .mandatory
                .iter()
                .filter(|(_, filter)| {
                    !self
                        .registry
                        .get_service_references(Some(filter))
                        .iter()
                        .any(|r| Some(r.id()) != departing)
                })
                .map(|(name, _)| name.as_str())
                .collect();
            warn!("容器的必需引用不再满足: {:?}", missing);
        }
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            guard_callback("满足状态监听器", || {
                listener.satisfaction_changed(now);
                Ok(())
            });
        }
    }
}

struct MonitorListener {
    monitor: Weak<SatisfactionMonitor>,
}

impl ServiceListener for MonitorListener {
    fn service_changed(&self, event: &ServiceEvent) {
        let Some(monitor) = self.monitor.upgrade() else {
            return;
        };
        let departing = match event.kind {
            ServiceEventKind::Unregistering => Some(event.reference.id()),
            _ => None,
        };
        monitor.reevaluate(departing);
    }
}

/// Blueprint 容器
pub struct BlueprintContainerImpl {
    name: String,
    ids: Vec<String>,
    components: HashMap<String, ComponentMetadata>,
    recipes: Vec<Arc<dyn Recipe>>,
    environment: Vec<(String, Value)>,
    defaults: ContainerDefaults,
    repository: Mutex<BlueprintRepository>,
    state: RwLock<LifecycleState>,
    monitor: Arc<SatisfactionMonitor>,
}

impl BlueprintContainerImpl {
    /// 创建容器
    ///
    /// 组件 ID 重复、与环境组件重名、元数据无效或引用了不存在的组件时返回错误。
    pub fn new(
        name: impl Into<String>,
        metadata: Vec<ComponentMetadata>,
        classes: Arc<ClassRegistry>,
        registry: Arc<dyn ServiceRegistry>,
        defaults: ContainerDefaults,
    ) -> ConstructionResult<Arc<Self>> {
        let name = name.into();
        let builder = RecipeBuilder::new(classes, registry.clone(), defaults.clone());

        let mut seen: HashSet<&str> = [BLUEPRINT_CONTAINER, BLUEPRINT_BUNDLE].into_iter().collect();
        let mut recipes = Vec::with_capacity(metadata.len());
        let mut mandatory = Vec::new();
        for component in &metadata {
            if !seen.insert(component.id()) {
                return Err(ConstructionError::NameAlreadyBound {
                    name: component.id().to_string(),
                });
            }
            recipes.push(builder.build(component)?);

            let query = match component {
                ComponentMetadata::Reference(r) => Some(&r.query),
                ComponentMetadata::ReferenceList(r) => Some(&r.query),
                _ => None,
            };
            if let Some(query) = query {
                if query.availability.unwrap_or(defaults.availability) == Availability::Mandatory {
                    let filter = Filter::parse(&query.osgi_filter()?)?;
                    mandatory.push((component.id().to_string(), filter));
                }
            }
        }

        let mut ids = vec![BLUEPRINT_CONTAINER.to_string(), BLUEPRINT_BUNDLE.to_string()];
        ids.extend(metadata.iter().map(|c| c.id().to_string()));
        let components = metadata
            .into_iter()
            .map(|c| (c.id().to_string(), c))
            .collect();

        let environment = vec![(BLUEPRINT_BUNDLE.to_string(), Value::Str(name.clone()))];
        let repository = Self::populate(&recipes, &environment, &defaults)?;

        let container = Arc::new_cyclic(|weak| Self {
            environment: {
                let mut environment = environment;
                environment.push((
                    BLUEPRINT_CONTAINER.to_string(),
                    Value::object(
                        "BlueprintContainer",
                        ContainerHandle {
                            inner: weak.clone(),
                        },
                    ),
                ));
                environment
            },
            name,
            ids,
            components,
            recipes,
            defaults,
            repository: Mutex::new(repository),
            state: RwLock::new(LifecycleState::Uninitialized),
            monitor: Arc::new(SatisfactionMonitor::new(registry, mandatory)),
        });
        container.install_environment();
        container.repository.lock().validate()?;
        info!(
            "创建 Blueprint 容器: {} ({} 个组件)",
            container.name,
            container.components.len()
        );
        Ok(container)
    }

    fn populate(
        recipes: &[Arc<dyn Recipe>],
        environment: &[(String, Value)],
        defaults: &ContainerDefaults,
    ) -> ConstructionResult<BlueprintRepository> {
        let mut repository = BlueprintRepository::new(defaults.clone());
        for (name, value) in environment {
            repository.put_recipe(Arc::new(PassThroughRecipe::new(name.clone(), value.clone())))?;
        }
        for recipe in recipes {
            repository.put_recipe(recipe.clone())?;
        }
        Ok(repository)
    }

    fn install_environment(&self) {
        let mut repository = self.repository.lock();
        for (name, value) in &self.environment {
            if repository.contains(name) {
                continue;
            }
            let recipe = Arc::new(PassThroughRecipe::new(name.clone(), value.clone()));
            if let Err(e) = repository.put_recipe(recipe) {
                error!("登记环境组件 {} 失败: {}", name, e);
            }
        }
    }

    /// 容器名称（所属 bundle）
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 生命周期状态
    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    /// 容器默认设置
    pub fn defaults(&self) -> &ContainerDefaults {
        &self.defaults
    }

    /// 启动容器
    ///
    /// 服务引用先于其他组件创建，然后按声明顺序创建急切单例。
    /// 任何一步失败，本次创建的对象全部回滚，容器进入错误状态。
    pub fn start(&self) -> ConstructionResult<()> {
        {
            let mut state = self.state.write();
            if !state.can_start() {
                return Err(ConstructionError::illegal_state(format!(
                    "容器 {} 当前状态 {:?} 不能启动",
                    self.name, *state
                )));
            }
            *state = LifecycleState::Initializing;
        }
        info!("启动 Blueprint 容器: {}", self.name);
        self.monitor.start();

        let names = self.startup_order();
        debug!("容器 {} 的启动顺序: {:?}", self.name, names);
        let result = self.repository.lock().create_all(&names);
        match result {
            Ok(_) => {
                *self.state.write() = LifecycleState::Running;
                info!("Blueprint 容器已启动: {}", self.name);
                Ok(())
            }
            Err(e) => {
                error!("Blueprint 容器 {} 启动失败: {}", self.name, e);
                self.monitor.stop();
                *self.state.write() = LifecycleState::Error;
                Err(e)
            }
        }
    }

    fn startup_order(&self) -> Vec<String> {
        let declared = || self.ids.iter().filter_map(|id| self.components.get(id));
        let references = declared().filter(|c| {
            matches!(
                c,
                ComponentMetadata::Reference(_) | ComponentMetadata::ReferenceList(_)
            ) && c.activation() == Activation::Eager
        });
        let others = declared().filter(|c| {
            !matches!(
                c,
                ComponentMetadata::Reference(_) | ComponentMetadata::ReferenceList(_)
            ) && c.activation() == Activation::Eager
                && !matches!(c, ComponentMetadata::Bean(b) if b.scope == BeanScope::Prototype)
        });
        references
            .chain(others)
            .map(|c| c.id().to_string())
            .collect()
    }

    /// 停止容器
    ///
    /// 先注销导出的服务，再停止所有跟踪器并逆序销毁实例。停止后可以再次启动。
    pub fn stop(&self) -> ConstructionResult<()> {
        {
            let mut state = self.state.write();
            if !state.can_stop() {
                return Err(ConstructionError::illegal_state(format!(
                    "容器 {} 当前状态 {:?} 不能停止",
                    self.name, *state
                )));
            }
            *state = LifecycleState::Stopping;
        }
        info!("停止 Blueprint 容器: {}", self.name);
        self.monitor.stop();

        let mut repository = self.repository.lock();
        for id in &self.ids {
            if !matches!(self.components.get(id), Some(ComponentMetadata::Service(_))) {
                continue;
            }
            let registration = repository
                .get_instance(id)
                .and_then(|v| v.downcast::<ServiceRegistration>());
            if let Some(registration) = registration {
                registration.unregister();
            }
        }
        repository.destroy();

        let rebuilt = Self::populate(&self.recipes, &self.environment, &self.defaults);
        match rebuilt {
            Ok(fresh) => {
                *repository = fresh;
                drop(repository);
                *self.state.write() = LifecycleState::Stopped;
                info!("Blueprint 容器已停止: {}", self.name);
                Ok(())
            }
            Err(e) => {
                drop(repository);
                *self.state.write() = LifecycleState::Error;
                Err(e)
            }
        }
    }
}

impl BlueprintContainer for BlueprintContainerImpl {
    fn component_ids(&self) -> Vec<String> {
        self.ids.clone()
    }

    fn get_component_instance(&self, id: &str) -> ConstructionResult<Value> {
        if !self.ids.iter().any(|known| known == id) {
            return Err(ConstructionError::no_such_component(id));
        }
        self.repository.lock().create(id)
    }

    fn get_component_metadata(&self, id: &str) -> ConstructionResult<ComponentMetadata> {
        self.components
            .get(id)
            .cloned()
            .ok_or_else(|| ConstructionError::no_such_component(id))
    }

    fn is_satisfied(&self) -> bool {
        self.monitor.is_satisfied()
    }

    fn add_satisfaction_listener(&self, listener: Arc<dyn SatisfactionListener>) {
        self.monitor.listeners.lock().push(listener);
    }
}

impl std::fmt::Debug for BlueprintContainerImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlueprintContainerImpl")
            .field("name", &self.name)
            .field("components", &self.ids)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ServiceProxy;
    use crate::registry::InMemoryServiceRegistry;
    use di_abstractions::{
        BeanMetadata, ClassBuilder, Metadata, ReferenceMetadata, ServiceMetadata,
        ServiceReferenceMetadata,
    };
    use infrastructure_common::{Properties, COMPONENT_NAME};
    use std::sync::atomic::{AtomicBool, Ordering};

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    fn classes() -> Arc<ClassRegistry> {
        Arc::new(
            ClassRegistry::new().with(
                ClassBuilder::<English>::new("demo.English")
                    .view::<dyn Greeter>("demo.Greeter", |e| e)
                    .constructor(&[], |_| Ok(English))
                    .build(),
            ),
        )
    }

    #[derive(Default)]
    struct Recorder {
        changes: Mutex<Vec<bool>>,
    }

    impl SatisfactionListener for Recorder {
        fn satisfaction_changed(&self, satisfied: bool) {
            self.changes.lock().push(satisfied);
        }
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let result = BlueprintContainerImpl::new(
            "bundle",
            vec![
                BeanMetadata::new("a").with_class("demo.English").into(),
                BeanMetadata::new("a").with_class("demo.English").into(),
            ],
            classes(),
            Arc::new(InMemoryServiceRegistry::new()),
            ContainerDefaults::default(),
        );
        assert!(matches!(result, Err(ConstructionError::NameAlreadyBound { .. })));
    }

    #[test]
    fn test_unknown_reference_fails_validation() {
        let result = BlueprintContainerImpl::new(
            "bundle",
            vec![ServiceMetadata::new("s", Metadata::reference("missing"))
                .with_interface("demo.Greeter")
                .into()],
            classes(),
            Arc::new(InMemoryServiceRegistry::new()),
            ContainerDefaults::default(),
        );
        assert!(matches!(result, Err(ConstructionError::NoSuchComponent { .. })));
    }

    #[test]
    fn test_export_then_consume_through_reference() {
        let registry = Arc::new(InMemoryServiceRegistry::new());
        let container = BlueprintContainerImpl::new(
            "bundle",
            vec![
                BeanMetadata::new("english").with_class("demo.English").into(),
                ServiceMetadata::new("greeterService", Metadata::reference("english"))
                    .with_interface("demo.Greeter")
                    .into(),
                ReferenceMetadata::new(
                    "greeter",
                    ServiceReferenceMetadata::for_interface("demo.Greeter")
                        .with_component_name("english"),
                )
                .with_timeout(0)
                .into(),
            ],
            classes(),
            registry.clone(),
            ContainerDefaults::default(),
        )
        .unwrap();

        container.start().unwrap();
        assert_eq!(container.state(), LifecycleState::Running);
        assert!(container.is_satisfied());

        let refs = registry.get_service_references(None);
        assert_eq!(refs.len(), 1);
        assert_eq!(
            refs[0].properties().get(COMPONENT_NAME).and_then(|v| v.as_str()),
            Some("english")
        );

        let proxy = container.get_component_instance("greeter").unwrap();
        let proxy = ServiceProxy::from_value(&proxy).unwrap();
        assert_eq!(proxy.service::<dyn Greeter>().unwrap().greet(), "hello");

        container.stop().unwrap();
        assert!(registry.is_empty());
        assert_eq!(container.state(), LifecycleState::Stopped);
    }

    #[test]
    fn test_satisfaction_follows_registry() {
        let registry = Arc::new(InMemoryServiceRegistry::new());
        let container = BlueprintContainerImpl::new(
            "bundle",
            vec![ReferenceMetadata::new(
                "greeter",
                ServiceReferenceMetadata::for_interface("demo.Greeter"),
            )
            .with_timeout(0)
            .into()],
            classes(),
            registry.clone(),
            ContainerDefaults::default(),
        )
        .unwrap();
        let recorder = Arc::new(Recorder::default());
        container.add_satisfaction_listener(recorder.clone());

        container.start().unwrap();
        assert!(!container.is_satisfied());

        let reference = registry
            .register(
                vec!["demo.Greeter".into()],
                Value::object("demo.English", English),
                Properties::new(),
            )
            .unwrap();
        assert!(container.is_satisfied());

        registry.unregister(&reference);
        assert!(!container.is_satisfied());
        assert_eq!(*recorder.changes.lock(), vec![true, false]);
        container.stop().unwrap();
    }

    #[test]
    fn test_environment_components() {
        let container = BlueprintContainerImpl::new(
            "demo.bundle",
            Vec::new(),
            classes(),
            Arc::new(InMemoryServiceRegistry::new()),
            ContainerDefaults::default(),
        )
        .unwrap();
        let bundle = container.get_component_instance(BLUEPRINT_BUNDLE).unwrap();
        assert_eq!(bundle.as_str(), Some("demo.bundle"));

        let handle = container.get_component_instance(BLUEPRINT_CONTAINER).unwrap();
        let handle = handle.downcast::<ContainerHandle>().unwrap();
        assert!(Arc::ptr_eq(&handle.upgrade().unwrap(), &container));
    }

    #[test]
    fn test_failed_start_leaves_error_state() {
        static CREATED: AtomicBool = AtomicBool::new(false);
        let classes = Arc::new(
            ClassRegistry::new()
                .with(
                    ClassBuilder::<English>::new("demo.English")
                        .constructor(&[], |_| {
                            CREATED.store(true, Ordering::SeqCst);
                            Ok(English)
                        })
                        .build(),
                )
                .with(
                    ClassBuilder::<English>::new("demo.Broken")
                        .constructor(&[], |_| Err("boom".into()))
                        .build(),
                ),
        );
        let container = BlueprintContainerImpl::new(
            "bundle",
            vec![
                BeanMetadata::new("ok").with_class("demo.English").into(),
                BeanMetadata::new("broken").with_class("demo.Broken").into(),
            ],
            classes,
            Arc::new(InMemoryServiceRegistry::new()),
            ContainerDefaults::default(),
        )
        .unwrap();

        let result = container.start();
        assert!(matches!(result, Err(ConstructionError::InvocationFailed { .. })));
        assert!(CREATED.load(Ordering::SeqCst));
        assert_eq!(container.state(), LifecycleState::Error);
    }
}
