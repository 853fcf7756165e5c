//! # Infrastructure Common
//!
//! 这个 crate 提供了 Lorn Aries 基础设施层的公共类型。
//!
//! ## 核心内容
//!
//! - [`ConstructionError`] / [`ServiceUnavailableError`] / [`ScopeError`] - 错误分类
//! - [`Filter`] - LDAP 风格过滤器解析与匹配
//! - [`Properties`] - 服务属性模型
//! - [`LifecycleState`] - 容器生命周期状态
//!
//! ## 设计原则
//!
//! - 构建路径上的错误同步返回给调用者
//! - 回调路径上的错误在回调边界被记录并吞掉
//! - 过滤器与属性是纯数据，不依赖任何运行时对象

pub mod errors;
pub mod filter;
pub mod lifecycle;
pub mod properties;

pub use errors::*;
pub use filter::*;
pub use lifecycle::*;
pub use properties::*;

/// 在回调边界执行用户代码
///
/// 用户代码返回的错误与 panic 都会被记录并吞掉，返回值表示是否成功。
pub fn guard_callback<F>(what: &str, callback: F) -> bool
where
    F: FnOnce() -> Result<(), BoxError>,
{
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback)) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::error!("{} 执行失败: {}", what, e);
            false
        }
        Err(_) => {
            tracing::error!("{} 执行时发生 panic", what);
            false
        }
    }
}
