//! Blueprint 容器抽象接口

use crate::listener::SatisfactionListener;
use crate::metadata::{Availability, ComponentMetadata};
use crate::value::Value;
use infrastructure_common::ConstructionResult;
use std::sync::Arc;

/// Blueprint 容器 trait
///
/// 一组组件元数据对应一个容器实例。
pub trait BlueprintContainer: Send + Sync {
    /// 所有组件 ID，包括环境组件
    fn component_ids(&self) -> Vec<String>;

    /// 获取组件实例，惰性组件在此时创建
    fn get_component_instance(&self, id: &str) -> ConstructionResult<Value>;

    /// 获取组件元数据
    fn get_component_metadata(&self, id: &str) -> ConstructionResult<ComponentMetadata>;

    /// 所有必需的服务引用是否都已有提供者
    fn is_satisfied(&self) -> bool;

    /// 添加满足状态监听器
    fn add_satisfaction_listener(&self, listener: Arc<dyn SatisfactionListener>);
}

/// 容器默认设置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDefaults {
    /// 代理等待超时（毫秒）
    pub timeout_ms: u64,
    /// 服务引用默认可用性
    pub availability: Availability,
    /// 默认初始化方法
    pub init_method: Option<String>,
    /// 默认销毁方法
    pub destroy_method: Option<String>,
    /// 是否允许构造参数重排
    pub reorder_arguments: bool,
}

impl ContainerDefaults {
    /// 创建默认设置
    pub fn new() -> Self {
        Self {
            timeout_ms: 300_000,
            availability: Availability::Mandatory,
            init_method: None,
            destroy_method: None,
            reorder_arguments: false,
        }
    }

    /// 设置超时
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// 设置默认可用性
    pub fn with_availability(mut self, availability: Availability) -> Self {
        self.availability = availability;
        self
    }

    /// 设置默认初始化方法
    pub fn with_init_method(mut self, method: impl Into<String>) -> Self {
        self.init_method = Some(method.into());
        self
    }

    /// 设置默认销毁方法
    pub fn with_destroy_method(mut self, method: impl Into<String>) -> Self {
        self.destroy_method = Some(method.into());
        self
    }

    /// 设置参数重排
    pub fn with_reorder_arguments(mut self, reorder: bool) -> Self {
        self.reorder_arguments = reorder;
        self
    }
}

impl Default for ContainerDefaults {
    fn default() -> Self {
        Self::new()
    }
}
