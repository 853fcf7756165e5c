//! # Configuration Implementation
//!
//! 运行时设置的加载与校验。
//!
//! ## 主要组件
//!
//! - [`RuntimeSettings`] - 蓝图默认值、作用域持久化与日志设置
//! - [`SettingsLoader`] - 基于 `config` crate 的分层加载（TOML/JSON/YAML 文件 + 环境变量）

pub mod loader;
pub mod settings;

pub use loader::*;
pub use settings::*;
