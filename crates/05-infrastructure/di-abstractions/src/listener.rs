//! 绑定与注册监听器

use crate::value::Value;
use infrastructure_common::{BoxError, Properties};

/// 服务引用监听器
///
/// 服务绑定或解绑时调用。返回的错误只会被记录，不会影响其他监听器。
pub trait ReferenceListener: Send + Sync {
    /// 服务已绑定
    fn bind(&self, service: &Value, properties: &Properties) -> Result<(), BoxError>;

    /// 服务已解绑
    fn unbind(&self, service: &Value, properties: &Properties) -> Result<(), BoxError>;
}

/// 服务注册监听器
pub trait RegistrationListener: Send + Sync {
    /// 服务已注册
    fn registered(&self, service: &Value, properties: &Properties) -> Result<(), BoxError>;

    /// 服务即将注销
    fn unregistered(&self, service: &Value, properties: &Properties) -> Result<(), BoxError>;
}

/// 容器满足状态监听器
pub trait SatisfactionListener: Send + Sync {
    /// 满足状态变化
    fn satisfaction_changed(&self, satisfied: bool);
}
