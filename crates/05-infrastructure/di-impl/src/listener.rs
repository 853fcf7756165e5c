//! 引用监听器绑定
//!
//! 监听器可以是直接提供的 [`ReferenceListener`]，也可以是某个组件上按名称注册的回调。
//! 同名回调的所有重载都会被调用；回调抛出的错误或 panic 只记录日志。

use di_abstractions::{ClassDescriptor, ReferenceListener, Value};
use infrastructure_common::{guard_callback, ConstructionError, ConstructionResult, Properties};
use std::sync::Arc;

/// 已解析的监听器
#[derive(Clone)]
pub enum BoundListener {
    /// 直接提供的监听器
    Direct(Arc<dyn ReferenceListener>),
    /// 组件回调
    Component {
        /// 监听器组件实例
        target: Value,
        /// 组件的类描述符
        class: Arc<ClassDescriptor>,
        /// 绑定回调名
        bind_method: Option<String>,
        /// 解绑回调名
        unbind_method: Option<String>,
    },
}

impl BoundListener {
    /// 以组件回调创建监听器，声明的回调名必须存在
    pub fn component(
        target: Value,
        class: Arc<ClassDescriptor>,
        bind_method: Option<String>,
        unbind_method: Option<String>,
    ) -> ConstructionResult<Self> {
        for method in bind_method.iter().chain(unbind_method.iter()) {
            if class.callbacks(method).is_empty() {
                return Err(ConstructionError::NoMatchingExecutable {
                    target: format!("{}.{}", class.name(), method),
                    detail: "找不到监听器回调".to_string(),
                });
            }
        }
        Ok(Self::Component {
            target,
            class,
            bind_method,
            unbind_method,
        })
    }
}

/// 一组监听器
#[derive(Clone, Default)]
pub struct ListenerBinding {
    listeners: Vec<BoundListener>,
}

impl ListenerBinding {
    /// 创建监听器组
    pub fn new(listeners: Vec<BoundListener>) -> Self {
        Self { listeners }
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// 通知绑定
    pub fn bind(&self, service: &Value, properties: &Properties) {
        self.notify(true, service, properties);
    }

    /// 通知解绑
    pub fn unbind(&self, service: &Value, properties: &Properties) {
        self.notify(false, service, properties);
    }

    fn notify(&self, bind: bool, service: &Value, properties: &Properties) {
        for listener in &self.listeners {
            match listener {
                BoundListener::Direct(listener) => {
                    let what = if bind { "绑定监听器" } else { "解绑监听器" };
                    guard_callback(what, || {
                        if bind {
                            listener.bind(service, properties)
                        } else {
                            listener.unbind(service, properties)
                        }
                    });
                }
                BoundListener::Component {
                    target,
                    class,
                    bind_method,
                    unbind_method,
                } => {
                    let method = if bind { bind_method } else { unbind_method };
                    let Some(method) = method else {
                        continue;
                    };
                    let what = format!("监听器回调 {}.{}", class.name(), method);
                    for callback in class.callbacks(method) {
                        guard_callback(&what, || callback.invoke(target, service, properties));
                    }
                }
            }
        }
    }
}
