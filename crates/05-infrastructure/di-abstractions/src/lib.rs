//! # Dependency Injection Abstractions
//!
//! 依赖注入抽象层，定义 Blueprint 配方引擎的核心模型与接口。
//!
//! ## 核心内容
//!
//! - [`Value`] / [`ObjectRef`] - 运行时值模型
//! - [`ClassBuilder`] / [`ClassRegistry`] - 显式注册的类描述符
//! - [`ComponentMetadata`] - 声明式组件元数据
//! - [`Recipe`] / [`ExecutionContext`] - 配方与执行上下文
//! - [`ServiceRegistry`] / [`ServiceReference`] - 动态服务注册表
//! - [`BlueprintContainer`] - 容器接口

pub mod class;
pub mod container;
pub mod listener;
pub mod metadata;
pub mod recipe;
pub mod registry;
pub mod value;

pub use class::*;
pub use container::*;
pub use listener::*;
pub use metadata::*;
pub use recipe::*;
pub use registry::*;
pub use value::*;
