//! 服务导出配方

use di_abstractions::{
    AutoExport, ExecutionContext, ObjectRef, Recipe, RegistrationListener, ServiceReference,
    ServiceRegistry, Value,
};
use infrastructure_common::{
    guard_callback, ConstructionError, ConstructionResult, Properties, COMPONENT_NAME,
    SERVICE_RANKING,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// 已注册的服务
///
/// `unregister` 可以重复调用，只有第一次生效。
pub struct ServiceRegistration {
    registry: Arc<dyn ServiceRegistry>,
    reference: ServiceReference,
    service: Value,
    listeners: Vec<Arc<dyn RegistrationListener>>,
    unregistered: AtomicBool,
}

impl ServiceRegistration {
    /// 服务引用
    pub fn reference(&self) -> &ServiceReference {
        &self.reference
    }

    /// 被导出的服务对象
    pub fn service(&self) -> &Value {
        &self.service
    }

    /// 是否已注销
    pub fn is_unregistered(&self) -> bool {
        self.unregistered.load(Ordering::SeqCst)
    }

    /// 注销服务
    pub fn unregister(&self) -> bool {
        if self.unregistered.swap(true, Ordering::SeqCst) {
            return false;
        }
        let properties = self.reference.properties().clone();
        for listener in &self.listeners {
            guard_callback("注册监听器 unregistered", || {
                listener.unregistered(&self.service, &properties)
            });
        }
        let removed = self.registry.unregister(&self.reference);
        info!("注销服务: {} {:?}", self.reference.id(), self.reference.object_classes());
        removed
    }
}

impl std::fmt::Debug for ServiceRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("reference", &self.reference)
            .field("unregistered", &self.is_unregistered())
            .finish()
    }
}

/// 服务导出配方
pub struct ServiceRecipe {
    name: String,
    service: Arc<dyn Recipe>,
    component_name: Option<String>,
    interfaces: Vec<String>,
    auto_export: AutoExport,
    properties: Properties,
    ranking: i64,
    listeners: Vec<Arc<dyn RegistrationListener>>,
    depends_on: Vec<String>,
    registry: Arc<dyn ServiceRegistry>,
    registrations: Mutex<Vec<Arc<ServiceRegistration>>>,
}

impl ServiceRecipe {
    /// 创建服务导出配方
    pub fn new(
        name: impl Into<String>,
        service: Arc<dyn Recipe>,
        registry: Arc<dyn ServiceRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            service,
            component_name: None,
            interfaces: Vec::new(),
            auto_export: AutoExport::Disabled,
            properties: Properties::new(),
            ranking: 0,
            listeners: Vec::new(),
            depends_on: Vec::new(),
            registry,
            registrations: Mutex::new(Vec::new()),
        }
    }

    /// 设置被导出组件的名称，写入 `component.name` 属性
    pub fn with_component_name(mut self, name: impl Into<String>) -> Self {
        self.component_name = Some(name.into());
        self
    }

    /// 设置接口与自动导出方式
    pub fn with_interfaces(mut self, interfaces: Vec<String>, auto_export: AutoExport) -> Self {
        self.interfaces = interfaces;
        self.auto_export = auto_export;
        self
    }

    /// 设置服务属性与排名
    pub fn with_properties(mut self, properties: Properties, ranking: i64) -> Self {
        self.properties = properties;
        self.ranking = ranking;
        self
    }

    /// 设置注册监听器
    pub fn with_registration_listeners(mut self, listeners: Vec<Arc<dyn RegistrationListener>>) -> Self {
        self.listeners = listeners;
        self
    }

    /// 设置显式依赖
    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    /// 当前仍然有效的注册
    pub fn registrations(&self) -> Vec<Arc<ServiceRegistration>> {
        self.registrations
            .lock()
            .iter()
            .filter(|r| !r.is_unregistered())
            .cloned()
            .collect()
    }

    /// 注销由本配方注册的所有服务
    pub fn unregister_all(&self) {
        let registrations = std::mem::take(&mut *self.registrations.lock());
        for registration in registrations {
            registration.unregister();
        }
    }

    fn export_interfaces(&self, service: &Value) -> ConstructionResult<Vec<String>> {
        let mut interfaces = self.interfaces.clone();
        if let Some(object) = service.as_object() {
            let exported: Vec<String> = match self.auto_export {
                AutoExport::Disabled => Vec::new(),
                AutoExport::Interfaces => object.interfaces().to_vec(),
                AutoExport::ClassHierarchy => vec![object.class().to_string()],
                AutoExport::AllClasses => std::iter::once(object.class().to_string())
                    .chain(object.interfaces().iter().cloned())
                    .collect(),
            };
            for interface in exported {
                if !interfaces.contains(&interface) {
                    interfaces.push(interface);
                }
            }
        }
        if interfaces.is_empty() {
            return Err(ConstructionError::invalid_metadata(format!(
                "服务 {} 没有可导出的接口",
                self.name
            )));
        }
        Ok(interfaces)
    }

    fn export_properties(&self) -> Properties {
        let mut properties = self.properties.clone();
        if let Some(component) = &self.component_name {
            properties.insert(COMPONENT_NAME, component.as_str());
        }
        if self.ranking != 0 {
            properties.insert(SERVICE_RANKING, self.ranking);
        }
        properties
    }
}

impl std::fmt::Debug for ServiceRecipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRecipe")
            .field("name", &self.name)
            .field("service", &self.service)
            .field("interfaces", &self.interfaces)
            .field("auto_export", &self.auto_export)
            .field("ranking", &self.ranking)
            .finish()
    }
}

impl Recipe for ServiceRecipe {
    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn dependencies(&self) -> Vec<Arc<dyn Recipe>> {
        vec![self.service.clone()]
    }

    fn referenced_names(&self) -> Vec<String> {
        self.depends_on.clone()
    }

    fn create(&self, ctx: &mut dyn ExecutionContext) -> ConstructionResult<Value> {
        for dependency in &self.depends_on {
            ctx.create(dependency)?;
        }
        let service = ctx.create_nested(&self.service)?;
        let interfaces = self.export_interfaces(&service)?;
        let properties = self.export_properties();
        debug!("导出服务 {}: {:?}", self.name, interfaces);

        let reference = self
            .registry
            .register(interfaces, service.clone(), properties)?;
        let registration = Arc::new(ServiceRegistration {
            registry: self.registry.clone(),
            reference,
            service,
            listeners: self.listeners.clone(),
            unregistered: AtomicBool::new(false),
        });
        let registered_properties = registration.reference.properties().clone();
        for listener in &self.listeners {
            guard_callback("注册监听器 registered", || {
                listener.registered(&registration.service, &registered_properties)
            });
        }
        info!("注册服务: {} {}", self.name, registration.reference.id());

        self.registrations.lock().push(registration.clone());
        Ok(Value::Object(ObjectRef::new("ServiceRegistration", registration)))
    }

    fn has_destroy(&self) -> bool {
        true
    }

    fn destroy(&self, instance: &Value) {
        if let Some(registration) = instance.downcast::<ServiceRegistration>() {
            registration.unregister();
            self.registrations
                .lock()
                .retain(|r| !Arc::ptr_eq(r, &registration));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipes::PassThroughRecipe;
    use crate::registry::InMemoryServiceRegistry;
    use crate::repository::BlueprintRepository;

    #[test]
    fn test_destroy_unregisters_exported_service() {
        let registry = Arc::new(InMemoryServiceRegistry::new());
        let recipe = Arc::new(
            ServiceRecipe::new(
                "greeterService",
                Arc::new(PassThroughRecipe::anonymous(Value::from("hello"))),
                registry.clone(),
            )
            .with_interfaces(vec!["demo.Greeter".to_string()], AutoExport::Disabled),
        );
        let mut repository = BlueprintRepository::default();
        repository.put_recipe(recipe.clone()).unwrap();

        let registration = repository.create("greeterService").unwrap();
        let registration = registration.downcast::<ServiceRegistration>().unwrap();
        assert!(!registration.is_unregistered());
        assert_eq!(registry.len(), 1);

        repository.destroy();
        assert!(registration.is_unregistered());
        assert!(registry.is_empty());
        assert!(recipe.registrations().is_empty());
    }
}
