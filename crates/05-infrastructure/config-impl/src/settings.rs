//! 运行时设置模型

use di_abstractions::{Availability, ContainerDefaults};
use infrastructure_common::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 运行时设置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// 蓝图容器默认值
    pub blueprint: BlueprintSettings,
    /// 作用域管理
    pub scope: ScopeSettings,
    /// 日志
    pub logging: LoggingSettings,
}

impl RuntimeSettings {
    /// 校验设置，返回全部错误而不是第一个
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        for (field, method) in [
            ("blueprint.default_init_method", &self.blueprint.default_init_method),
            ("blueprint.default_destroy_method", &self.blueprint.default_destroy_method),
        ] {
            if method.as_deref().is_some_and(|m| m.trim().is_empty()) {
                errors.push(format!("{field} 不能为空字符串"));
            }
        }
        if let Some(path) = &self.scope.persistence_path {
            if path.as_os_str().is_empty() {
                errors.push("scope.persistence_path 不能为空".to_string());
            }
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            errors.push(format!(
                "logging.level 必须是 {} 之一, 实际为 {}",
                LOG_LEVELS.join("/"),
                self.logging.level
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationFailed { errors })
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// 蓝图容器设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlueprintSettings {
    /// 服务引用代理的默认等待超时（毫秒）
    pub default_timeout_ms: u64,
    /// 服务引用的默认可用性
    pub default_availability: Availability,
    /// 全局默认初始化方法
    pub default_init_method: Option<String>,
    /// 全局默认销毁方法
    pub default_destroy_method: Option<String>,
    /// 是否允许构造参数重排
    pub reorder_arguments: bool,
}

impl BlueprintSettings {
    /// 转换为容器默认值
    pub fn to_defaults(&self) -> ContainerDefaults {
        let mut defaults = ContainerDefaults::new()
            .with_timeout_ms(self.default_timeout_ms)
            .with_availability(self.default_availability)
            .with_reorder_arguments(self.reorder_arguments);
        if let Some(method) = &self.default_init_method {
            defaults = defaults.with_init_method(method.clone());
        }
        if let Some(method) = &self.default_destroy_method {
            defaults = defaults.with_destroy_method(method.clone());
        }
        defaults
    }
}

impl Default for BlueprintSettings {
    fn default() -> Self {
        let defaults = ContainerDefaults::default();
        Self {
            default_timeout_ms: defaults.timeout_ms,
            default_availability: defaults.availability,
            default_init_method: None,
            default_destroy_method: None,
            reorder_arguments: defaults.reorder_arguments,
        }
    }
}

/// 作用域设置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeSettings {
    /// 作用域快照文件，未设置时不持久化
    pub persistence_path: Option<PathBuf>,
}

/// 日志设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// 日志级别
    pub level: String,
    /// 是否输出 JSON
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_container_defaults() {
        let settings = RuntimeSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.blueprint.to_defaults(), ContainerDefaults::default());
        assert_eq!(settings.blueprint.default_timeout_ms, 300_000);
    }

    #[test]
    fn test_to_defaults_carries_lifecycle_methods() {
        let settings = BlueprintSettings {
            default_init_method: Some("init".into()),
            default_destroy_method: Some("close".into()),
            default_timeout_ms: 10,
            ..BlueprintSettings::default()
        };
        let defaults = settings.to_defaults();
        assert_eq!(defaults.init_method.as_deref(), Some("init"));
        assert_eq!(defaults.destroy_method.as_deref(), Some("close"));
        assert_eq!(defaults.timeout_ms, 10);
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut settings = RuntimeSettings::default();
        settings.blueprint.default_init_method = Some(" ".into());
        settings.logging.level = "loud".into();
        match settings.validate() {
            Err(ConfigError::ValidationFailed { errors }) => assert_eq!(errors.len(), 2),
            other => panic!("期望校验失败, 实际为 {other:?}"),
        }
    }
}
