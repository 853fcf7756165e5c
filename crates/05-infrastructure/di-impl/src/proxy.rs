//! 服务代理
//!
//! 代理本身不持有服务对象。每次调用都解析到当前绑定的提供者：
//! 单值引用在没有绑定时最多阻塞配置的超时时间，集合成员代理从不阻塞。

use crate::dispatcher::ServiceDispatcher;
use crate::tracker::UnaryTracker;
use di_abstractions::{ServiceReference, Value};
use infrastructure_common::ServiceUnavailableError;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
enum ProxyTarget {
    Unary(UnaryTracker),
    Member(Arc<ServiceDispatcher>),
}

/// 服务代理句柄
#[derive(Clone)]
pub struct ServiceProxy {
    target: ProxyTarget,
    type_name: Arc<str>,
    filter: Arc<str>,
    timeout: Duration,
}

impl ServiceProxy {
    pub(crate) fn unary(
        tracker: UnaryTracker,
        type_name: impl Into<String>,
        filter: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            target: ProxyTarget::Unary(tracker),
            type_name: Arc::from(type_name.into().as_str()),
            filter: Arc::from(filter.into().as_str()),
            timeout,
        }
    }

    pub(crate) fn member(
        dispatcher: Arc<ServiceDispatcher>,
        type_name: impl Into<String>,
        filter: impl Into<String>,
    ) -> Self {
        Self {
            target: ProxyTarget::Member(dispatcher),
            type_name: Arc::from(type_name.into().as_str()),
            filter: Arc::from(filter.into().as_str()),
            timeout: Duration::ZERO,
        }
    }

    /// 从组件值中取出代理
    pub fn from_value(value: &Value) -> Option<Arc<Self>> {
        value.downcast::<Self>()
    }

    /// 期望的服务类型
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// 服务查询过滤器
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// 等待超时
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 当前是否有绑定
    pub fn is_bound(&self) -> bool {
        match &self.target {
            ProxyTarget::Unary(tracker) => tracker.current().is_some(),
            ProxyTarget::Member(dispatcher) => !dispatcher.is_destroyed(),
        }
    }

    /// 当前绑定的服务引用
    pub fn reference(&self) -> Option<ServiceReference> {
        match &self.target {
            ProxyTarget::Unary(tracker) => tracker.current().map(|d| d.reference().clone()),
            ProxyTarget::Member(dispatcher) => {
                (!dispatcher.is_destroyed()).then(|| dispatcher.reference().clone())
            }
        }
    }

    /// 解析当前绑定的服务对象
    pub fn service_value(&self) -> Result<Value, ServiceUnavailableError> {
        let dispatcher = match &self.target {
            ProxyTarget::Unary(tracker) => tracker
                .wait_for_binding(self.timeout)
                .ok_or_else(|| self.unavailable(self.wait_reason()))?,
            ProxyTarget::Member(dispatcher) => dispatcher.clone(),
        };
        dispatcher
            .service()
            .ok_or_else(|| self.unavailable("绑定的服务已不可用".to_string()))
    }

    /// 解析当前绑定的服务对象并转换为 `Arc<T>`，`T` 通常是 trait 对象
    pub fn service<T>(&self) -> Result<Arc<T>, ServiceUnavailableError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let value = self.service_value()?;
        value.downcast_shared::<T>().ok_or_else(|| {
            self.unavailable(format!(
                "服务对象 {} 不能转换为 {}",
                value.type_name(),
                std::any::type_name::<T>()
            ))
        })
    }

    pub(crate) fn stop(&self) {
        if let ProxyTarget::Unary(tracker) = &self.target {
            tracker.stop();
        }
    }

    fn wait_reason(&self) -> String {
        if self.timeout.is_zero() {
            "没有绑定的服务提供者".to_string()
        } else {
            format!("等待 {} 毫秒后仍没有服务提供者", self.timeout.as_millis())
        }
    }

    fn unavailable(&self, reason: String) -> ServiceUnavailableError {
        ServiceUnavailableError::new(self.type_name.as_ref(), self.filter.as_ref(), reason)
    }
}

impl std::fmt::Debug for ServiceProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProxy")
            .field("type_name", &self.type_name)
            .field("filter", &self.filter)
            .field("timeout", &self.timeout)
            .field("bound", &self.is_bound())
            .finish()
    }
}
