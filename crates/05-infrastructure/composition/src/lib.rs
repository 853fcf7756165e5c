//! # 基础设施组合层
//!
//! 这个 crate 是 Lorn Aries 的组合层，负责把设置、日志、服务注册表、
//! 作用域管理器与各 bundle 的 Blueprint 容器组合成一个可运行的运行时。
//!
//! ## 主要功能
//!
//! - **运行时构建器**: 使用构建者模式加载设置并组装运行时
//! - **日志初始化**: `tracing-subscriber` 的开发/生产预设
//! - **作用域持久化**: 启动时加载作用域快照并与实际安装的 bundle 对账
//! - **生命周期管理**: 按创建顺序的逆序停止所有容器
//!
//! ## 基本使用
//!
//! ```rust,no_run
//! use di_abstractions::BeanMetadata;
//! use infrastructure_composition::RuntimeBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = RuntimeBuilder::new()
//!         .add_optional_config_file("config/aries.toml")?
//!         .build()
//!         .await?;
//!
//!     runtime.start().await?;
//!     runtime
//!         .create_container("com.example.app", vec![BeanMetadata::new("app").with_class("demo.App").into()])
//!         .await?;
//!
//!     runtime.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod infrastructure;

#[cfg(test)]
mod tests;

// 重新导出主要类型
pub use builder::{initialize_logging, LoggingConfig, RuntimeBuilder};
pub use infrastructure::{AriesRuntime, RuntimeMetrics};

// 重新导出错误类型
pub use infrastructure_common::InfrastructureError;
