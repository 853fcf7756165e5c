//! 服务引用配方：单值引用返回代理，引用列表返回托管集合

use crate::collection::ManagedCollection;
use crate::listener::{BoundListener, ListenerBinding};
use crate::proxy::ServiceProxy;
use crate::tracker::{ListTracker, UnaryTracker};
use di_abstractions::{
    ClassRegistry, ExecutionContext, MemberType, ObjectRef, Recipe, ReferenceListener,
    ReferenceOrdering, ServiceRegistry, Value,
};
use infrastructure_common::{ConstructionError, ConstructionResult, Filter};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// 监听器配方
#[derive(Clone)]
pub enum ListenerRecipe {
    /// 直接提供的监听器
    Direct(Arc<dyn ReferenceListener>),
    /// 由组件回调充当的监听器
    Component {
        /// 监听器组件
        component: Arc<dyn Recipe>,
        /// 绑定回调名
        bind_method: Option<String>,
        /// 解绑回调名
        unbind_method: Option<String>,
    },
}

impl std::fmt::Debug for ListenerRecipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct(_) => f.write_str("Direct(<listener>)"),
            Self::Component {
                component,
                bind_method,
                unbind_method,
            } => f
                .debug_struct("Component")
                .field("component", component)
                .field("bind_method", bind_method)
                .field("unbind_method", unbind_method)
                .finish(),
        }
    }
}

fn resolve_listeners(
    ctx: &mut dyn ExecutionContext,
    classes: &ClassRegistry,
    listeners: &[ListenerRecipe],
) -> ConstructionResult<ListenerBinding> {
    let mut bound = Vec::with_capacity(listeners.len());
    for listener in listeners {
        match listener {
            ListenerRecipe::Direct(listener) => bound.push(BoundListener::Direct(listener.clone())),
            ListenerRecipe::Component {
                component,
                bind_method,
                unbind_method,
            } => {
                let target = ctx.create_nested(component)?;
                let class = classes.get(&target.type_name()).ok_or_else(|| {
                    ConstructionError::invalid_metadata(format!(
                        "监听器组件的类未注册: {}",
                        target.type_name()
                    ))
                })?;
                bound.push(BoundListener::component(
                    target,
                    class,
                    bind_method.clone(),
                    unbind_method.clone(),
                )?);
            }
        }
    }
    Ok(ListenerBinding::new(bound))
}

fn listener_dependencies(listeners: &[ListenerRecipe]) -> Vec<Arc<dyn Recipe>> {
    listeners
        .iter()
        .filter_map(|l| match l {
            ListenerRecipe::Component { component, .. } => Some(component.clone()),
            ListenerRecipe::Direct(_) => None,
        })
        .collect()
}

/// 服务查询的公共部分
#[derive(Debug, Clone)]
pub struct ServiceQuery {
    /// 接口名
    pub interfaces: Vec<String>,
    /// 过滤器文本
    pub filter_text: String,
    /// 解析后的过滤器
    pub filter: Filter,
}

impl ServiceQuery {
    fn type_name(&self) -> String {
        self.interfaces
            .first()
            .cloned()
            .unwrap_or_else(|| "ServiceProxy".to_string())
    }
}

/// 单值服务引用配方
pub struct ReferenceRecipe {
    name: String,
    query: ServiceQuery,
    timeout: Duration,
    listeners: Vec<ListenerRecipe>,
    depends_on: Vec<String>,
    registry: Arc<dyn ServiceRegistry>,
    classes: Arc<ClassRegistry>,
}

impl ReferenceRecipe {
    /// 创建单值服务引用配方
    pub fn new(
        name: impl Into<String>,
        query: ServiceQuery,
        timeout: Duration,
        registry: Arc<dyn ServiceRegistry>,
        classes: Arc<ClassRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            query,
            timeout,
            listeners: Vec::new(),
            depends_on: Vec::new(),
            registry,
            classes,
        }
    }

    /// 设置监听器
    pub fn with_listeners(mut self, listeners: Vec<ListenerRecipe>) -> Self {
        self.listeners = listeners;
        self
    }

    /// 设置显式依赖
    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }
}

impl std::fmt::Debug for ReferenceRecipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceRecipe")
            .field("name", &self.name)
            .field("filter", &self.query.filter_text)
            .field("timeout", &self.timeout)
            .field("listeners", &self.listeners)
            .finish()
    }
}

impl Recipe for ReferenceRecipe {
    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn dependencies(&self) -> Vec<Arc<dyn Recipe>> {
        listener_dependencies(&self.listeners)
    }

    fn referenced_names(&self) -> Vec<String> {
        self.depends_on.clone()
    }

    fn create(&self, ctx: &mut dyn ExecutionContext) -> ConstructionResult<Value> {
        for dependency in &self.depends_on {
            ctx.create(dependency)?;
        }

        // 监听器组件可能反过来引用本组件，先登记尚未启动的代理
        let type_name = self.query.type_name();
        let tracker = UnaryTracker::new(
            self.registry.clone(),
            self.query.filter.clone(),
            ListenerBinding::default(),
        );
        let proxy = ServiceProxy::unary(
            tracker.clone(),
            type_name.clone(),
            self.query.filter_text.clone(),
            self.timeout,
        );
        let value = Value::Object(
            ObjectRef::new(type_name, Arc::new(proxy))
                .with_interfaces(self.query.interfaces.clone()),
        );
        ctx.add_partial_object(&self.name, value.clone());
        tracker.set_listeners(resolve_listeners(ctx, &self.classes, &self.listeners)?);
        tracker.start();
        info!("创建服务引用: {} {}", self.name, self.query.filter_text);
        Ok(value)
    }

    fn has_destroy(&self) -> bool {
        true
    }

    fn destroy(&self, instance: &Value) {
        if let Some(proxy) = ServiceProxy::from_value(instance) {
            proxy.stop();
        }
    }
}

/// 引用列表配方
pub struct ReferenceListRecipe {
    name: String,
    query: ServiceQuery,
    member_type: MemberType,
    ordering: ReferenceOrdering,
    listeners: Vec<ListenerRecipe>,
    depends_on: Vec<String>,
    registry: Arc<dyn ServiceRegistry>,
    classes: Arc<ClassRegistry>,
    trackers: Mutex<Vec<ListTracker>>,
}

impl ReferenceListRecipe {
    /// 创建引用列表配方
    pub fn new(
        name: impl Into<String>,
        query: ServiceQuery,
        member_type: MemberType,
        ordering: ReferenceOrdering,
        registry: Arc<dyn ServiceRegistry>,
        classes: Arc<ClassRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            query,
            member_type,
            ordering,
            listeners: Vec::new(),
            depends_on: Vec::new(),
            registry,
            classes,
            trackers: Mutex::new(Vec::new()),
        }
    }

    /// 设置监听器
    pub fn with_listeners(mut self, listeners: Vec<ListenerRecipe>) -> Self {
        self.listeners = listeners;
        self
    }

    /// 设置显式依赖
    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }
}

impl std::fmt::Debug for ReferenceListRecipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceListRecipe")
            .field("name", &self.name)
            .field("filter", &self.query.filter_text)
            .field("member_type", &self.member_type)
            .field("ordering", &self.ordering)
            .finish()
    }
}

impl Recipe for ReferenceListRecipe {
    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn dependencies(&self) -> Vec<Arc<dyn Recipe>> {
        listener_dependencies(&self.listeners)
    }

    fn referenced_names(&self) -> Vec<String> {
        self.depends_on.clone()
    }

    fn create(&self, ctx: &mut dyn ExecutionContext) -> ConstructionResult<Value> {
        for dependency in &self.depends_on {
            ctx.create(dependency)?;
        }

        let collection = Arc::new(ManagedCollection::new(
            self.ordering.clone(),
            self.member_type,
            self.query.interfaces.clone(),
            self.query.filter_text.clone(),
        ));
        let value = Value::Object(
            ObjectRef::new("ManagedCollection", collection.clone())
                .with_interfaces(vec!["java.util.List".to_string()]),
        );
        ctx.add_partial_object(&self.name, value.clone());
        let listeners = resolve_listeners(ctx, &self.classes, &self.listeners)?;

        let tracker = ListTracker::new(
            self.registry.clone(),
            self.query.filter.clone(),
            listeners,
            collection,
        );
        tracker.start();
        self.trackers.lock().push(tracker);
        info!("创建服务引用列表: {} {}", self.name, self.query.filter_text);
        Ok(value)
    }

    fn has_destroy(&self) -> bool {
        true
    }

    fn destroy(&self, instance: &Value) {
        let Some(collection) = instance.downcast::<ManagedCollection>() else {
            return;
        };
        let mut trackers = self.trackers.lock();
        trackers.retain(|tracker| {
            if Arc::ptr_eq(tracker.collection(), &collection) {
                tracker.stop();
                false
            } else {
                true
            }
        });
    }
}
