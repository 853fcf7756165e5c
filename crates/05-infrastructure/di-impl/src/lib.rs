//! # 依赖注入具体实现
//!
//! Blueprint 配方引擎：把组件元数据翻译为配方图，在对象仓库中按依赖顺序构建，
//! 并通过服务跟踪器、代理与托管集合跟随动态服务注册表的变化。
//!
//! ## 核心组件
//!
//! - [`BlueprintContainerImpl`] - 容器，负责启动、停止与满足状态
//! - [`BlueprintRepository`] - 以名称为键的对象仓库
//! - [`RecipeBuilder`] - 元数据到配方的翻译
//! - [`InMemoryServiceRegistry`] - 进程内服务注册表
//! - [`ServiceProxy`] / [`ManagedCollection`] - 服务引用的运行时视图

pub mod builder;
pub mod collection;
pub mod container;
pub mod converter;
pub mod dispatcher;
pub mod listener;
pub mod matcher;
pub mod proxy;
pub mod recipes;
pub mod registry;
pub mod repository;
pub mod tracker;

pub use builder::RecipeBuilder;
pub use collection::{Iter, ManagedCollection, Member};
pub use container::{BlueprintContainerImpl, ContainerHandle, BLUEPRINT_BUNDLE, BLUEPRINT_CONTAINER};
pub use converter::Converter;
pub use dispatcher::ServiceDispatcher;
pub use listener::{BoundListener, ListenerBinding};
pub use proxy::ServiceProxy;
pub use recipes::*;
pub use registry::InMemoryServiceRegistry;
pub use repository::{BlueprintRepository, ExecutionPass};
pub use tracker::{ListTracker, UnaryTracker};
