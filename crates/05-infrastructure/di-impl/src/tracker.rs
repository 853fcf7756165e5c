//! 服务引用跟踪器
//!
//! [`UnaryTracker`] 始终绑定当前最优的提供者；绑定的提供者消失时，
//! 从注册表中重新查询全部候选，而不是假定次优者仍然可用。
//! [`ListTracker`] 把所有匹配的提供者维护在托管集合中。
//! 两者都在状态锁外通知监听器，但同一跟踪器的通知由通知锁串行化，
//! 监听器看到的绑定与解绑顺序与状态变化一致。通知锁可重入，
//! 监听器回调中再次触发同一跟踪器的事件不会死锁。
//! `stop()` 持有通知锁，保证每个分发器只销毁一次，停止后不再有绑定通知。

use crate::collection::{ManagedCollection, Member};
use crate::dispatcher::ServiceDispatcher;
use crate::listener::ListenerBinding;
use di_abstractions::{
    ListenerId, ServiceEvent, ServiceEventKind, ServiceListener, ServiceReference,
    ServiceRegistry, Value,
};
use infrastructure_common::Filter;
use parking_lot::{Condvar, Mutex, ReentrantMutex};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info};

struct Binding {
    current: Option<Arc<ServiceDispatcher>>,
    stopped: bool,
}

struct UnaryState {
    registry: Arc<dyn ServiceRegistry>,
    filter: Filter,
    listeners: Mutex<ListenerBinding>,
    binding: Mutex<Binding>,
    bound: Condvar,
    notify: ReentrantMutex<()>,
    listener_id: Mutex<Option<ListenerId>>,
}

/// 单值服务跟踪器
#[derive(Clone)]
pub struct UnaryTracker {
    state: Arc<UnaryState>,
}

impl UnaryTracker {
    /// 创建跟踪器，调用 [`start`](Self::start) 后开始跟踪
    pub fn new(registry: Arc<dyn ServiceRegistry>, filter: Filter, listeners: ListenerBinding) -> Self {
        Self {
            state: Arc::new(UnaryState {
                registry,
                filter,
                listeners: Mutex::new(listeners),
                binding: Mutex::new(Binding {
                    current: None,
                    stopped: false,
                }),
                bound: Condvar::new(),
                notify: ReentrantMutex::new(()),
                listener_id: Mutex::new(None),
            }),
        }
    }

    /// 替换监听器，必须在 [`start`](Self::start) 之前调用
    pub(crate) fn set_listeners(&self, listeners: ListenerBinding) {
        *self.state.listeners.lock() = listeners;
    }

    /// 开始跟踪
    pub fn start(&self) {
        let listener: Arc<dyn ServiceListener> = Arc::new(UnaryListener {
            state: Arc::downgrade(&self.state),
        });
        let id = self
            .state
            .registry
            .add_listener(Some(self.state.filter.clone()), listener);
        *self.state.listener_id.lock() = Some(id);
        info!("开始跟踪服务: {}", self.state.filter);
        self.state.reevaluate(None);
    }

    /// 当前绑定
    pub fn current(&self) -> Option<Arc<ServiceDispatcher>> {
        self.state.binding.lock().current.clone()
    }

    /// 等待绑定，超时为零时立即返回
    pub fn wait_for_binding(&self, timeout: Duration) -> Option<Arc<ServiceDispatcher>> {
        let deadline = Instant::now() + timeout;
        let mut binding = self.state.binding.lock();
        loop {
            if let Some(current) = &binding.current {
                return Some(current.clone());
            }
            if binding.stopped || timeout.is_zero() {
                return None;
            }
            if self.state.bound.wait_until(&mut binding, deadline).timed_out() {
                return binding.current.clone();
            }
        }
    }

    /// 停止跟踪并释放当前绑定
    pub fn stop(&self) {
        if let Some(id) = self.state.listener_id.lock().take() {
            self.state.registry.remove_listener(id);
        }
        let _notify = self.state.notify.lock();
        let previous = {
            let mut binding = self.state.binding.lock();
            if binding.stopped {
                return;
            }
            binding.stopped = true;
            self.state.bound.notify_all();
            binding.current.take()
        };
        if let Some(previous) = previous {
            self.state.release(&previous);
        }
        info!("停止跟踪服务: {}", self.state.filter);
    }
}

impl std::fmt::Debug for UnaryTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnaryTracker")
            .field("filter", &self.state.filter.to_string())
            .field("current", &self.current().map(|d| d.reference().id()))
            .finish()
    }
}

impl UnaryState {
    fn reevaluate(&self, departing: Option<u64>) {
        let _notify = self.notify.lock();
        let (previous, next) = {
            let mut binding = self.binding.lock();
            if binding.stopped {
                return;
            }
            let best = self
                .registry
                .get_service_references(Some(&self.filter))
                .into_iter()
                .filter(|r| Some(r.id()) != departing)
                .max();
            let current_id = binding.current.as_ref().map(|d| d.reference().id());
            if best.as_ref().map(ServiceReference::id) == current_id {
                return;
            }
            let next = best.map(|reference| {
                Arc::new(ServiceDispatcher::new(self.registry.clone(), reference))
            });
            let previous = std::mem::replace(&mut binding.current, next.clone());
            if next.is_some() {
                self.bound.notify_all();
            }
            (previous, next)
        };

        if let Some(previous) = previous {
            self.release(&previous);
        }
        if let Some(next) = next {
            debug!("绑定服务: {} -> {}", self.filter, next.reference().id());
            let listeners = self.listeners.lock().clone();
            if !listeners.is_empty() {
                let service = next.service().unwrap_or(Value::Null);
                listeners.bind(&service, next.reference().properties());
            }
        }
    }

    fn release(&self, dispatcher: &Arc<ServiceDispatcher>) {
        debug!("解绑服务: {} -> {}", self.filter, dispatcher.reference().id());
        let listeners = self.listeners.lock().clone();
        if !listeners.is_empty() {
            let service = dispatcher.service().unwrap_or(Value::Null);
            listeners.unbind(&service, dispatcher.reference().properties());
        }
        dispatcher.destroy();
    }
}

struct UnaryListener {
    state: Weak<UnaryState>,
}

impl ServiceListener for UnaryListener {
    fn service_changed(&self, event: &ServiceEvent) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let departing = match event.kind {
            ServiceEventKind::Unregistering => Some(event.reference.id()),
            ServiceEventKind::Registered
            | ServiceEventKind::Modified
            | ServiceEventKind::ModifiedEndMatch => None,
        };
        state.reevaluate(departing);
    }
}

struct ListState {
    registry: Arc<dyn ServiceRegistry>,
    filter: Filter,
    listeners: ListenerBinding,
    collection: Arc<ManagedCollection>,
    update_lock: Mutex<bool>,
    notify: ReentrantMutex<()>,
    listener_id: Mutex<Option<ListenerId>>,
}

/// 多值服务跟踪器
#[derive(Clone)]
pub struct ListTracker {
    state: Arc<ListState>,
}

impl ListTracker {
    /// 创建跟踪器
    pub fn new(
        registry: Arc<dyn ServiceRegistry>,
        filter: Filter,
        listeners: ListenerBinding,
        collection: Arc<ManagedCollection>,
    ) -> Self {
        Self {
            state: Arc::new(ListState {
                registry,
                filter,
                listeners,
                collection,
                update_lock: Mutex::new(false),
                notify: ReentrantMutex::new(()),
                listener_id: Mutex::new(None),
            }),
        }
    }

    /// 托管集合
    pub fn collection(&self) -> &Arc<ManagedCollection> {
        &self.state.collection
    }

    /// 开始跟踪，已存在的匹配服务立即加入集合
    pub fn start(&self) {
        let listener: Arc<dyn ServiceListener> = Arc::new(ListListener {
            state: Arc::downgrade(&self.state),
        });
        let id = self
            .state
            .registry
            .add_listener(Some(self.state.filter.clone()), listener);
        *self.state.listener_id.lock() = Some(id);
        info!("开始跟踪服务集合: {}", self.state.filter);
        for reference in self
            .state
            .registry
            .get_service_references(Some(&self.state.filter))
        {
            self.state.track(reference);
        }
    }

    /// 停止跟踪，解绑并销毁所有成员
    pub fn stop(&self) {
        if let Some(id) = self.state.listener_id.lock().take() {
            self.state.registry.remove_listener(id);
        }
        let _notify = self.state.notify.lock();
        let members = {
            let mut stopped = self.state.update_lock.lock();
            if *stopped {
                return;
            }
            *stopped = true;
            self.state.collection.drain()
        };
        for member in members {
            self.state.release(&member);
        }
        info!("停止跟踪服务集合: {}", self.state.filter);
    }
}

impl std::fmt::Debug for ListTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListTracker")
            .field("filter", &self.state.filter.to_string())
            .field("size", &self.state.collection.len())
            .finish()
    }
}

impl ListState {
    fn track(&self, reference: ServiceReference) {
        let _notify = self.notify.lock();
        let added = {
            let stopped = self.update_lock.lock();
            if *stopped {
                return;
            }
            if self.collection.contains(reference.id()) {
                self.collection.update(reference);
                None
            } else {
                let dispatcher = Arc::new(ServiceDispatcher::new(self.registry.clone(), reference));
                self.collection.insert(Member::new(dispatcher.clone()));
                Some(dispatcher)
            }
        };
        if let Some(dispatcher) = added {
            debug!("集合新增服务: {} -> {}", self.filter, dispatcher.reference().id());
            if !self.listeners.is_empty() {
                let service = dispatcher.service().unwrap_or(Value::Null);
                self.listeners
                    .bind(&service, dispatcher.reference().properties());
            }
        }
    }

    fn untrack(&self, service_id: u64) {
        let _notify = self.notify.lock();
        let removed = {
            let stopped = self.update_lock.lock();
            if *stopped {
                return;
            }
            self.collection.remove(service_id)
        };
        if let Some(member) = removed {
            debug!("集合移除服务: {} -> {}", self.filter, service_id);
            self.release(&member);
        }
    }

    fn release(&self, member: &Member) {
        if !self.listeners.is_empty() {
            let service = member.dispatcher().service().unwrap_or(Value::Null);
            self.listeners
                .unbind(&service, member.reference().properties());
        }
        member.dispatcher().destroy();
    }
}

struct ListListener {
    state: Weak<ListState>,
}

impl ServiceListener for ListListener {
    fn service_changed(&self, event: &ServiceEvent) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        match event.kind {
            ServiceEventKind::Registered | ServiceEventKind::Modified => {
                state.track(event.reference.clone());
            }
            ServiceEventKind::Unregistering | ServiceEventKind::ModifiedEndMatch => {
                state.untrack(event.reference.id());
            }
        }
    }
}
