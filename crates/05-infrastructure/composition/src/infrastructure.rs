//! 运行时主入口

use crate::builder::RuntimeBuilder;
use config_impl::RuntimeSettings;
use di_abstractions::{ClassRegistry, ComponentMetadata, ContainerDefaults};
use di_impl::{BlueprintContainerImpl, InMemoryServiceRegistry};
use infrastructure_common::{InfrastructureError, LifecycleState};
use scope_admin::ScopeAdmin;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Aries 运行时
///
/// 持有共享的服务注册表与作用域管理器，每个 bundle 一个 Blueprint 容器
pub struct AriesRuntime {
    /// 运行时设置
    settings: RuntimeSettings,
    /// 由设置推导出的容器默认值
    defaults: ContainerDefaults,
    /// 类注册表
    classes: Arc<ClassRegistry>,
    /// 服务注册表
    registry: Arc<InMemoryServiceRegistry>,
    /// 作用域管理器
    scopes: Arc<ScopeAdmin>,
    /// 按创建顺序排列的容器
    containers: RwLock<Vec<(String, Arc<BlueprintContainerImpl>)>>,
    /// 运行状态
    status: RwLock<LifecycleState>,
    /// 统计信息
    metrics: RwLock<RuntimeMetrics>,
}

impl AriesRuntime {
    /// 创建运行时构建器
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// 内部构造函数
    pub(crate) fn new(
        settings: RuntimeSettings,
        classes: Arc<ClassRegistry>,
        registry: Arc<InMemoryServiceRegistry>,
        scopes: Arc<ScopeAdmin>,
    ) -> Self {
        let defaults = settings.blueprint.to_defaults();
        Self {
            settings,
            defaults,
            classes,
            registry,
            scopes,
            containers: RwLock::new(Vec::new()),
            status: RwLock::new(LifecycleState::Uninitialized),
            metrics: RwLock::new(RuntimeMetrics::default()),
        }
    }

    /// 启动运行时
    pub async fn start(&self) -> Result<(), InfrastructureError> {
        let mut status = self.status.write().await;
        if !status.can_start() {
            return Err(InfrastructureError::BootstrapFailed {
                message: format!("运行时当前状态 {:?} 不能启动", *status),
            });
        }
        *status = LifecycleState::Running;
        self.metrics.write().await.start_time = Some(chrono::Utc::now());
        info!("运行时已启动");
        Ok(())
    }

    /// 为 bundle 创建并启动 Blueprint 容器
    pub async fn create_container(
        &self,
        bundle: &str,
        components: Vec<ComponentMetadata>,
    ) -> Result<Arc<BlueprintContainerImpl>, InfrastructureError> {
        if *self.status.read().await != LifecycleState::Running {
            return Err(InfrastructureError::BootstrapFailed {
                message: format!("运行时未运行，不能为 {bundle} 创建容器"),
            });
        }
        let mut containers = self.containers.write().await;
        if containers.iter().any(|(name, _)| name == bundle) {
            return Err(InfrastructureError::BootstrapFailed {
                message: format!("bundle {bundle} 已经有容器"),
            });
        }

        let container = BlueprintContainerImpl::new(
            bundle,
            components,
            self.classes.clone(),
            self.registry.clone(),
            self.defaults.clone(),
        )?;
        let starting = container.clone();
        // 启动可能阻塞在服务等待上，放到阻塞线程池执行
        tokio::task::spawn_blocking(move || starting.start())
            .await
            .map_err(|e| InfrastructureError::BootstrapFailed {
                message: format!("容器 {bundle} 启动任务失败: {e}"),
            })??;

        containers.push((bundle.to_string(), container.clone()));
        self.metrics.write().await.containers_created += 1;
        info!("bundle {} 的容器已启动", bundle);
        Ok(container)
    }

    /// 按 bundle 名查找容器
    pub async fn container(&self, bundle: &str) -> Option<Arc<BlueprintContainerImpl>> {
        self.containers
            .read()
            .await
            .iter()
            .find(|(name, _)| name == bundle)
            .map(|(_, container)| container.clone())
    }

    /// 已创建容器的 bundle 名，按创建顺序
    pub async fn container_names(&self) -> Vec<String> {
        self.containers
            .read()
            .await
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// 停止并移除 bundle 的容器
    pub async fn destroy_container(&self, bundle: &str) -> Result<bool, InfrastructureError> {
        let removed = {
            let mut containers = self.containers.write().await;
            let index = containers.iter().position(|(name, _)| name == bundle);
            index.map(|i| containers.remove(i).1)
        };
        let Some(container) = removed else {
            return Ok(false);
        };
        stop_container(bundle.to_string(), container).await?;
        self.metrics.write().await.containers_stopped += 1;
        Ok(true)
    }

    /// 停止运行时，逆序停止所有容器
    pub async fn stop(&self) -> Result<(), InfrastructureError> {
        {
            let mut status = self.status.write().await;
            if !status.can_stop() {
                warn!("运行时当前状态 {:?}，无需停止", *status);
                return Ok(());
            }
            *status = LifecycleState::Stopping;
        }
        info!("停止运行时");

        let containers = std::mem::take(&mut *self.containers.write().await);
        let mut failures = Vec::new();
        for (name, container) in containers.into_iter().rev() {
            if let Err(e) = stop_container(name.clone(), container).await {
                error!("停止容器 {} 失败: {}", name, e);
                failures.push(format!("{name}: {e}"));
            } else {
                self.metrics.write().await.containers_stopped += 1;
            }
        }

        self.metrics.write().await.stop_time = Some(chrono::Utc::now());
        if failures.is_empty() {
            *self.status.write().await = LifecycleState::Stopped;
            info!("运行时停止完成");
            Ok(())
        } else {
            *self.status.write().await = LifecycleState::Error;
            Err(InfrastructureError::ShutdownFailed {
                message: failures.join(", "),
            })
        }
    }

    /// 获取运行状态
    pub async fn status(&self) -> LifecycleState {
        *self.status.read().await
    }

    /// 获取统计信息
    pub async fn metrics(&self) -> RuntimeMetrics {
        self.metrics.read().await.clone()
    }

    /// 运行时设置
    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    /// 容器默认值
    pub fn defaults(&self) -> &ContainerDefaults {
        &self.defaults
    }

    /// 服务注册表
    pub fn registry(&self) -> &Arc<InMemoryServiceRegistry> {
        &self.registry
    }

    /// 作用域管理器
    pub fn scopes(&self) -> &Arc<ScopeAdmin> {
        &self.scopes
    }

    /// 类注册表
    pub fn classes(&self) -> &Arc<ClassRegistry> {
        &self.classes
    }
}

async fn stop_container(
    name: String,
    container: Arc<BlueprintContainerImpl>,
) -> Result<(), InfrastructureError> {
    if !container.state().can_stop() {
        return Ok(());
    }
    tokio::task::spawn_blocking(move || container.stop())
        .await
        .map_err(|e| InfrastructureError::ShutdownFailed {
            message: format!("容器 {name} 停止任务失败: {e}"),
        })??;
    Ok(())
}

/// 运行时统计信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeMetrics {
    /// 启动时间
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    /// 停止时间
    pub stop_time: Option<chrono::DateTime<chrono::Utc>>,
    /// 已创建的容器数量
    pub containers_created: u64,
    /// 已停止的容器数量
    pub containers_stopped: u64,
}

impl RuntimeMetrics {
    /// 计算运行时间
    pub fn uptime(&self) -> Option<chrono::Duration> {
        match (self.start_time, self.stop_time) {
            (Some(start), Some(stop)) => Some(stop - start),
            (Some(start), None) => Some(chrono::Utc::now() - start),
            _ => None,
        }
    }
}
