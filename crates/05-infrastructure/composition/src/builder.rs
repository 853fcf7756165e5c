//! 运行时构建器

use crate::infrastructure::AriesRuntime;
use config_impl::{LoggingSettings, RuntimeSettings, SettingsLoader};
use di_abstractions::{ClassDescriptor, ClassRegistry};
use di_impl::InMemoryServiceRegistry;
use infrastructure_common::InfrastructureError;
use once_cell::sync::OnceCell;
use scope_admin::{BundleDescriptor, ScopeAdmin, ScopeSnapshot, ScopeStore, ScopeTree};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 进程内只安装一次全局日志订阅者
static LOGGING_INSTALLED: OnceCell<bool> = OnceCell::new();

/// 运行时构建器
///
/// 使用建造者模式组装设置、类注册表、服务注册表与作用域管理器
pub struct RuntimeBuilder {
    /// 设置加载器
    loader: SettingsLoader,
    /// 直接给定的设置，优先于加载器
    settings: Option<RuntimeSettings>,
    /// 类注册表
    classes: ClassRegistry,
    /// 启动时实际安装的 bundle，用于作用域对账
    installed_bundles: Option<Vec<BundleDescriptor>>,
    /// 是否启用日志初始化
    logging_enabled: bool,
    /// 日志配置，未设置时从设置推导
    logging_config: Option<LoggingConfig>,
}

impl RuntimeBuilder {
    /// 创建新的运行时构建器
    pub fn new() -> Self {
        Self {
            loader: SettingsLoader::new(),
            settings: None,
            classes: ClassRegistry::new(),
            installed_bundles: None,
            logging_enabled: false, // 默认不启用日志初始化
            logging_config: None,
        }
    }

    /// 添加必需的配置文件（TOML/JSON/YAML）
    pub fn add_config_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, InfrastructureError> {
        info!("添加配置文件: {}", path.as_ref().display());
        self.loader = self.loader.with_file(path)?;
        Ok(self)
    }

    /// 添加可选的配置文件
    pub fn add_optional_config_file<P: AsRef<Path>>(
        mut self,
        path: P,
    ) -> Result<Self, InfrastructureError> {
        self.loader = self.loader.with_optional_file(path)?;
        Ok(self)
    }

    /// 设置环境变量前缀
    pub fn with_env_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.loader = self.loader.with_env_prefix(prefix);
        self
    }

    /// 不读取环境变量
    pub fn without_env(mut self) -> Self {
        self.loader = self.loader.without_env();
        self
    }

    /// 直接使用给定设置，跳过加载
    pub fn with_settings(mut self, settings: RuntimeSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// 注册类描述
    pub fn register_class(mut self, descriptor: ClassDescriptor) -> Self {
        debug!("注册类: {}", descriptor.name());
        self.classes.register(descriptor);
        self
    }

    /// 启动时以实际安装的 bundle 对账作用域树
    pub fn with_installed_bundles(mut self, bundles: Vec<BundleDescriptor>) -> Self {
        self.installed_bundles = Some(bundles);
        self
    }

    /// 配置日志
    pub fn with_logging(mut self, config: LoggingConfig) -> Self {
        self.logging_config = Some(config);
        self.logging_enabled = true; // 启用日志初始化
        self
    }

    /// 按设置中的日志配置初始化日志
    pub fn enable_logging(mut self) -> Self {
        self.logging_enabled = true;
        self
    }

    /// 构建运行时实例
    pub async fn build(self) -> Result<AriesRuntime, InfrastructureError> {
        let settings = match self.settings {
            Some(settings) => {
                settings.validate()?;
                settings
            }
            None => self.loader.load()?,
        };

        // 只有在明确配置了日志时才初始化日志
        if self.logging_enabled {
            let config = self
                .logging_config
                .unwrap_or_else(|| LoggingConfig::from_settings(&settings.logging));
            initialize_logging(&config)?;
        }
        info!("开始构建运行时");

        let scopes = match &settings.scope.persistence_path {
            Some(path) => load_scope_admin(path.clone()).await?,
            None => ScopeAdmin::new(),
        };
        if let Some(installed) = &self.installed_bundles {
            let report = scopes.reconcile(installed)?;
            if report.has_drift() {
                warn!(
                    "作用域树与实际安装的 bundle 不一致: 移除 {:?}, 收养 {:?}",
                    report.dropped, report.adopted
                );
            }
        }

        let runtime = AriesRuntime::new(
            settings,
            Arc::new(self.classes),
            Arc::new(InMemoryServiceRegistry::new()),
            Arc::new(scopes),
        );
        info!("运行时构建完成");
        Ok(runtime)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn load_scope_admin(path: PathBuf) -> Result<ScopeAdmin, InfrastructureError> {
    let tree = match tokio::fs::read(&path).await {
        Ok(bytes) => ScopeSnapshot::decode(&bytes)?.tree,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("作用域快照不存在，使用新的作用域树: {}", path.display());
            ScopeTree::new()
        }
        Err(e) => {
            return Err(InfrastructureError::BootstrapFailed {
                message: format!("读取作用域快照失败: {}: {}", path.display(), e),
            })
        }
    };
    info!("作用域树已加载, 版本号 {}", tree.generation());
    Ok(ScopeAdmin::from_tree(tree, Some(ScopeStore::new(path))))
}

/// 初始化日志系统
///
/// 全局订阅者只能安装一次，重复调用直接返回。
pub fn initialize_logging(config: &LoggingConfig) -> Result<(), InfrastructureError> {
    if LOGGING_INSTALLED.get().is_some() {
        debug!("日志系统已初始化，跳过");
        return Ok(());
    }

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(config.level)
        .with_target(config.show_target)
        .with_thread_ids(config.show_thread_ids)
        .with_file(config.show_file)
        .with_line_number(config.show_line_number);

    let result = if config.json_format {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
    // 其他代码可能已经安装了订阅者，这里只记录一次结果
    let installed = *LOGGING_INSTALLED.get_or_init(|| result.is_ok());
    if installed {
        info!("日志系统初始化完成");
    } else {
        debug!("全局日志订阅者已存在，沿用现有订阅者");
    }
    Ok(())
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: tracing::Level,
    /// 是否显示目标
    pub show_target: bool,
    /// 是否显示线程ID
    pub show_thread_ids: bool,
    /// 是否显示文件名
    pub show_file: bool,
    /// 是否显示行号
    pub show_line_number: bool,
    /// 是否使用 JSON 格式
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: tracing::Level::INFO,
            show_target: true,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// 创建开发环境日志配置
    pub fn development() -> Self {
        Self {
            level: tracing::Level::DEBUG,
            show_target: true,
            show_thread_ids: true,
            show_file: true,
            show_line_number: true,
            json_format: false,
        }
    }

    /// 创建生产环境日志配置
    pub fn production() -> Self {
        Self {
            level: tracing::Level::INFO,
            show_target: false,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: true,
        }
    }

    /// 从运行时设置推导，级别无法识别时回退到 INFO
    pub fn from_settings(settings: &LoggingSettings) -> Self {
        Self {
            level: tracing::Level::from_str(&settings.level).unwrap_or(tracing::Level::INFO),
            json_format: settings.json,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_from_settings() {
        let config = LoggingConfig::from_settings(&LoggingSettings {
            level: "debug".into(),
            json: true,
        });
        assert_eq!(config.level, tracing::Level::DEBUG);
        assert!(config.json_format);

        let fallback = LoggingConfig::from_settings(&LoggingSettings {
            level: "loud".into(),
            json: false,
        });
        assert_eq!(fallback.level, tracing::Level::INFO);
    }

    #[test]
    fn test_initialize_logging_twice_is_ok() {
        assert!(initialize_logging(&LoggingConfig::development()).is_ok());
        assert!(initialize_logging(&LoggingConfig::production()).is_ok());
    }
}
