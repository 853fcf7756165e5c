//! 服务分发器
//!
//! 把一个被跟踪的服务引用绑定到代理上，首次使用时才从注册表获取服务对象，
//! 销毁时释放服务对象。销毁只会发生一次。

use di_abstractions::{ServiceReference, ServiceRegistry, Value};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
struct DispatcherState {
    service: Option<Value>,
    fetched: bool,
    destroyed: bool,
}

/// 服务分发器
pub struct ServiceDispatcher {
    registry: Arc<dyn ServiceRegistry>,
    reference: ServiceReference,
    state: Mutex<DispatcherState>,
}

impl ServiceDispatcher {
    /// 创建分发器
    pub fn new(registry: Arc<dyn ServiceRegistry>, reference: ServiceReference) -> Self {
        Self {
            registry,
            reference,
            state: Mutex::new(DispatcherState::default()),
        }
    }

    /// 绑定的服务引用
    pub fn reference(&self) -> &ServiceReference {
        &self.reference
    }

    /// 获取服务对象，已销毁或服务已消失时返回 `None`
    pub fn service(&self) -> Option<Value> {
        let mut state = self.state.lock();
        if state.destroyed {
            return None;
        }
        if !state.fetched {
            state.service = self.registry.get_service(&self.reference);
            state.fetched = true;
        }
        state.service.clone()
    }

    /// 是否已销毁
    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    /// 销毁分发器，返回本次调用是否真正执行了销毁
    pub fn destroy(&self) -> bool {
        let held = {
            let mut state = self.state.lock();
            if state.destroyed {
                return false;
            }
            state.destroyed = true;
            state.service.take().is_some()
        };
        if held {
            self.registry.unget_service(&self.reference);
        }
        debug!("销毁服务分发器: {}", self.reference.id());
        true
    }
}

impl std::fmt::Debug for ServiceDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDispatcher")
            .field("reference", &self.reference)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
