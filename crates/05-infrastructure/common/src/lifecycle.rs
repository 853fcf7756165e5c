//! 组件生命周期状态

use serde::{Deserialize, Serialize};

/// 容器生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// 未初始化
    Uninitialized,
    /// 初始化中
    Initializing,
    /// 运行中
    Running,
    /// 停止中
    Stopping,
    /// 已停止
    Stopped,
    /// 错误状态
    Error,
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::Uninitialized
    }
}

impl LifecycleState {
    /// 是否可以启动
    pub fn can_start(self) -> bool {
        matches!(self, Self::Uninitialized | Self::Stopped | Self::Error)
    }

    /// 是否可以停止
    pub fn can_stop(self) -> bool {
        matches!(self, Self::Running | Self::Error)
    }
}
