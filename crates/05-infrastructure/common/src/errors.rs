//! 错误类型定义

use thiserror::Error;

/// 通用的装箱错误类型，用于承载用户代码返回的错误
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    #[error("配置文件读取失败: {source}")]
    FileReadError {
        #[from]
        source: std::io::Error,
    },

    #[error("配置解析失败: {source}")]
    ParseError { source: BoxError },

    #[error("配置键不存在: {key}")]
    KeyNotFound { key: String },

    #[error("配置类型转换失败: {message}")]
    TypeConversionError { message: String },

    #[error("配置验证失败: {errors:?}")]
    ValidationFailed { errors: Vec<String> },
}

/// 过滤器语法错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("过滤器语法错误: {filter}, 位置 {position}: {message}")]
    Syntax {
        filter: String,
        position: usize,
        message: String,
    },

    #[error("过滤器约束为空: {message}")]
    EmptyConstraints { message: String },
}

impl FilterError {
    /// 创建语法错误
    pub fn syntax(filter: impl Into<String>, position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            filter: filter.into(),
            position,
            message: message.into(),
        }
    }
}

/// 服务不可用错误
///
/// 单值服务引用在超时时间内没有绑定到任何服务提供者时返回。
/// 携带期望的类型与过滤器，便于诊断。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("服务不可用: 类型 {type_name}, 过滤器 {filter}, 原因: {reason}")]
pub struct ServiceUnavailableError {
    /// 期望的服务类型
    pub type_name: String,
    /// 服务引用使用的过滤器
    pub filter: String,
    /// 失败原因
    pub reason: String,
}

impl ServiceUnavailableError {
    /// 创建服务不可用错误
    pub fn new(
        type_name: impl Into<String>,
        filter: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            filter: filter.into(),
            reason: reason.into(),
        }
    }
}

/// 组件构建错误类型
///
/// 构建路径上的所有错误都会同步返回给顶层调用者。
#[derive(Error, Debug)]
pub enum ConstructionError {
    #[error("组件不存在: {name}")]
    NoSuchComponent { name: String },

    #[error("检测到循环依赖: {chain}")]
    CircularDependency { chain: String },

    #[error("没有匹配的构造方法: {target}, 原因: {detail}")]
    NoMatchingExecutable { target: String, detail: String },

    #[error("存在多个匹配的构造方法: {target}, 候选: {candidates:?}")]
    AmbiguousExecutable {
        target: String,
        candidates: Vec<String>,
    },

    #[error("类型转换失败: {value} -> {target_type}, 原因: {source}")]
    Conversion {
        value: String,
        target_type: String,
        source: BoxError,
    },

    #[error("调用失败: {member}, 原因: {source}")]
    InvocationFailed { member: String, source: BoxError },

    #[error("名称已绑定到实例: {name}")]
    NameAlreadyBound { name: String },

    #[error("组件元数据无效: {message}")]
    InvalidMetadata { message: String },

    #[error("非法状态: {message}")]
    IllegalState { message: String },

    #[error("服务不可用: {source}")]
    ServiceUnavailable {
        #[from]
        source: ServiceUnavailableError,
    },

    #[error("过滤器错误: {source}")]
    Filter {
        #[from]
        source: FilterError,
    },
}

impl ConstructionError {
    /// 创建组件不存在错误
    pub fn no_such_component(name: impl Into<String>) -> Self {
        Self::NoSuchComponent { name: name.into() }
    }

    /// 创建元数据无效错误
    pub fn invalid_metadata(message: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            message: message.into(),
        }
    }

    /// 创建非法状态错误
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// 创建调用失败错误
    pub fn invocation(member: impl Into<String>, source: BoxError) -> Self {
        Self::InvocationFailed {
            member: member.into(),
            source,
        }
    }
}

/// 作用域错误类型
#[derive(Error, Debug)]
pub enum ScopeError {
    #[error("作用域状态非法: {message}")]
    IllegalState { message: String },

    #[error("作用域不存在: {scope_id}")]
    NoSuchScope { scope_id: u64 },

    #[error("同级作用域名称重复: {name}")]
    DuplicateName { name: String },

    #[error("作用域持久化失败: {message}, 原因: {source}")]
    Persistence { message: String, source: BoxError },

    #[error("共享策略过滤器无效: {source}")]
    Filter {
        #[from]
        source: FilterError,
    },
}

impl ScopeError {
    /// 创建非法状态错误
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// 创建持久化错误
    pub fn persistence(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Persistence {
            message: message.into(),
            source: source.into(),
        }
    }
}

/// 基础设施错误类型
#[derive(Error, Debug)]
pub enum InfrastructureError {
    #[error("配置错误: {source}")]
    ConfigError {
        #[from]
        source: ConfigError,
    },

    #[error("组件构建错误: {source}")]
    ConstructionError {
        #[from]
        source: ConstructionError,
    },

    #[error("作用域错误: {source}")]
    ScopeError {
        #[from]
        source: ScopeError,
    },

    #[error("基础设施启动失败: {message}")]
    BootstrapFailed { message: String },

    #[error("基础设施关闭失败: {message}")]
    ShutdownFailed { message: String },
}

/// 结果类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type ConstructionResult<T> = Result<T, ConstructionError>;
pub type ScopeResult<T> = Result<T, ScopeError>;
pub type InfrastructureResult<T> = Result<T, InfrastructureError>;
