//! 内存服务注册表
//!
//! 事件在注册表锁之外同步投递给匹配的监听器，
//! 注销时先投递 `Unregistering` 再移除服务。

use dashmap::DashMap;
use di_abstractions::{
    ListenerId, ServiceEvent, ServiceEventKind, ServiceListener, ServiceReference,
    ServiceRegistry, Value,
};
use infrastructure_common::{
    guard_callback, ConstructionError, ConstructionResult, Filter, Properties, OBJECT_CLASS,
    SERVICE_ID, SERVICE_RANKING,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

struct ServiceEntry {
    reference: ServiceReference,
    service: Value,
    use_count: usize,
}

struct ListenerEntry {
    filter: Option<Filter>,
    listener: Arc<dyn ServiceListener>,
}

/// 内存服务注册表
pub struct InMemoryServiceRegistry {
    services: RwLock<BTreeMap<u64, ServiceEntry>>,
    listeners: DashMap<u64, ListenerEntry>,
    next_service_id: AtomicU64,
    next_listener_id: AtomicU64,
}

impl InMemoryServiceRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self {
            services: RwLock::new(BTreeMap::new()),
            listeners: DashMap::new(),
            next_service_id: AtomicU64::new(1),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// 已注册的服务数量
    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    /// 是否没有任何服务
    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }

    fn deliver(&self, event: &ServiceEvent, previous: Option<&Properties>) {
        let targets: Vec<(Option<Filter>, Arc<dyn ServiceListener>)> = self
            .listeners
            .iter()
            .map(|entry| (entry.filter.clone(), entry.listener.clone()))
            .collect();

        for (filter, listener) in targets {
            let kind = match &filter {
                None => Some(event.kind),
                Some(filter) if event.reference.matches(filter) => Some(event.kind),
                Some(filter)
                    if event.kind == ServiceEventKind::Modified
                        && previous.is_some_and(|p| filter.matches(p)) =>
                {
                    Some(ServiceEventKind::ModifiedEndMatch)
                }
                Some(_) => None,
            };
            if let Some(kind) = kind {
                let delivered = ServiceEvent::new(kind, event.reference.clone());
                guard_callback("服务监听器", || {
                    listener.service_changed(&delivered);
                    Ok(())
                });
            }
        }
    }
}

impl Default for InMemoryServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry for InMemoryServiceRegistry {
    fn register(
        &self,
        interfaces: Vec<String>,
        service: Value,
        properties: Properties,
    ) -> ConstructionResult<ServiceReference> {
        if interfaces.is_empty() {
            return Err(ConstructionError::illegal_state("注册服务时必须指定至少一个接口"));
        }
        let id = self.next_service_id.fetch_add(1, Ordering::SeqCst);
        let mut properties = properties;
        properties.insert(OBJECT_CLASS, interfaces.clone());
        properties.insert(SERVICE_ID, id);
        if !properties.contains_key(SERVICE_RANKING) {
            properties.insert(SERVICE_RANKING, 0i64);
        }
        let reference = ServiceReference::new(id, properties);

        self.services.write().insert(
            id,
            ServiceEntry {
                reference: reference.clone(),
                service,
                use_count: 0,
            },
        );
        info!("注册服务: {} {:?}", id, interfaces);

        self.deliver(
            &ServiceEvent::new(ServiceEventKind::Registered, reference.clone()),
            None,
        );
        Ok(reference)
    }

    fn unregister(&self, reference: &ServiceReference) -> bool {
        let current = match self.services.read().get(&reference.id()) {
            Some(entry) => entry.reference.clone(),
            None => return false,
        };
        self.deliver(
            &ServiceEvent::new(ServiceEventKind::Unregistering, current),
            None,
        );
        let removed = self.services.write().remove(&reference.id()).is_some();
        if removed {
            info!("注销服务: {}", reference.id());
        }
        removed
    }

    fn set_properties(
        &self,
        reference: &ServiceReference,
        properties: Properties,
    ) -> ConstructionResult<ServiceReference> {
        let (updated, previous) = {
            let mut services = self.services.write();
            let entry = services.get_mut(&reference.id()).ok_or_else(|| {
                ConstructionError::illegal_state(format!("服务已注销: {}", reference.id()))
            })?;
            let previous = entry.reference.properties().clone();
            let mut properties = properties;
            properties.insert(OBJECT_CLASS, previous.object_classes());
            properties.insert(SERVICE_ID, reference.id());
            if !properties.contains_key(SERVICE_RANKING) {
                properties.insert(SERVICE_RANKING, 0i64);
            }
            entry.reference = ServiceReference::new(reference.id(), properties);
            (entry.reference.clone(), previous)
        };
        debug!("修改服务属性: {}", reference.id());
        self.deliver(
            &ServiceEvent::new(ServiceEventKind::Modified, updated.clone()),
            Some(&previous),
        );
        Ok(updated)
    }

    fn get_service_references(&self, filter: Option<&Filter>) -> Vec<ServiceReference> {
        let mut references: Vec<ServiceReference> = self
            .services
            .read()
            .values()
            .filter(|entry| filter.map_or(true, |f| entry.reference.matches(f)))
            .map(|entry| entry.reference.clone())
            .collect();
        references.sort_by(|a, b| b.cmp(a));
        references
    }

    fn get_service(&self, reference: &ServiceReference) -> Option<Value> {
        let mut services = self.services.write();
        let entry = services.get_mut(&reference.id())?;
        entry.use_count += 1;
        Some(entry.service.clone())
    }

    fn unget_service(&self, reference: &ServiceReference) -> bool {
        let mut services = self.services.write();
        match services.get_mut(&reference.id()) {
            Some(entry) if entry.use_count > 0 => {
                entry.use_count -= 1;
                true
            }
            _ => false,
        }
    }

    fn use_count(&self, reference: &ServiceReference) -> usize {
        self.services
            .read()
            .get(&reference.id())
            .map_or(0, |entry| entry.use_count)
    }

    fn add_listener(&self, filter: Option<Filter>, listener: Arc<dyn ServiceListener>) -> ListenerId {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.insert(id, ListenerEntry { filter, listener });
        ListenerId(id)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(&id.0).is_some()
    }
}
