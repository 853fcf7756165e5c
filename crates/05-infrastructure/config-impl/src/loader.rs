//! 分层设置加载器
//!
//! 按添加顺序叠加配置源，后添加的覆盖先添加的，最后叠加带前缀的环境变量。

use crate::settings::RuntimeSettings;
use config::{Config, Environment, File, FileFormat};
use infrastructure_common::{ConfigError, ConfigResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 默认环境变量前缀
pub const DEFAULT_ENV_PREFIX: &str = "ARIES";

#[derive(Debug, Clone)]
struct FileSource {
    path: PathBuf,
    format: FileFormat,
    required: bool,
}

/// 设置加载器
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    files: Vec<FileSource>,
    env_prefix: Option<String>,
}

impl SettingsLoader {
    /// 创建加载器，默认读取 `ARIES_` 前缀的环境变量
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            env_prefix: Some(DEFAULT_ENV_PREFIX.to_string()),
        }
    }

    /// 添加必需的配置文件，格式由扩展名决定
    pub fn with_file(self, path: impl AsRef<Path>) -> ConfigResult<Self> {
        self.push_file(path.as_ref(), true)
    }

    /// 添加可选的配置文件
    pub fn with_optional_file(self, path: impl AsRef<Path>) -> ConfigResult<Self> {
        self.push_file(path.as_ref(), false)
    }

    /// 设置环境变量前缀，例如 `ARIES` 对应 `ARIES_BLUEPRINT__DEFAULT_TIMEOUT_MS`
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// 不读取环境变量
    pub fn without_env(mut self) -> Self {
        self.env_prefix = None;
        self
    }

    /// 加载并校验设置
    pub fn load(&self) -> ConfigResult<RuntimeSettings> {
        let mut builder = Config::builder();
        for source in &self.files {
            if source.required && !source.path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: source.path.display().to_string(),
                });
            }
            debug!("添加配置文件: {}", source.path.display());
            builder = builder.add_source(
                File::from(source.path.as_path())
                    .format(source.format)
                    .required(source.required),
            );
        }
        if let Some(prefix) = &self.env_prefix {
            builder = builder.add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let settings: RuntimeSettings = builder
            .build()
            .and_then(Config::try_deserialize::<RuntimeSettings>)
            .map_err(|e| ConfigError::ParseError {
                source: Box::new(e),
            })?;
        settings.validate()?;
        info!(
            "运行时设置加载完成: {} 个文件, 环境变量前缀 {:?}",
            self.files.len(),
            self.env_prefix
        );
        Ok(settings)
    }

    fn push_file(mut self, path: &Path, required: bool) -> ConfigResult<Self> {
        let format = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("json") => FileFormat::Json,
            Some("yaml" | "yml") => FileFormat::Yaml,
            other => {
                return Err(ConfigError::TypeConversionError {
                    message: format!("不支持的配置文件格式: {other:?} ({})", path.display()),
                })
            }
        };
        self.files.push(FileSource {
            path: path.to_path_buf(),
            format,
            required,
        });
        Ok(self)
    }
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}
