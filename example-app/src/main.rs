//! # 示例应用程序
//!
//! 演示 Blueprint 容器之间的服务导出与引用，以及作用域隔离模型

use anyhow::Context;
use clap::Parser;
use config_impl::SettingsLoader;
use di_abstractions::{
    BeanMetadata, ClassBuilder, Metadata, ReferenceMetadata, ServiceMetadata,
    ServiceReferenceMetadata,
};
use infrastructure_common::ServiceUnavailableError;
use infrastructure_composition::{AriesRuntime, RuntimeBuilder};
use parking_lot::Mutex;
use proxy_macros::service_proxy;
use scope_admin::{service_properties, BundleDescriptor, PolicyType, ScopeAdmin, SharePolicy};
use std::path::PathBuf;
use tracing::{info, warn};

const PROVIDER_BUNDLE: &str = "greeter.bundle";
const CONSUMER_BUNDLE: &str = "reception.bundle";
const GREETER_INTERFACE: &str = "demo.Greeter";

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "example-app")]
#[command(about = "Aries Blueprint 示例应用")]
struct Args {
    /// 配置文件路径，未指定时尝试读取 config/aries.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 日志级别，覆盖配置文件
    #[arg(long)]
    log_level: Option<String>,

    /// 作用域快照文件，覆盖配置文件
    #[arg(long)]
    scope_state: Option<PathBuf>,
}

#[service_proxy]
pub trait Greeter: Send + Sync {
    fn greet(&self, name: &str) -> Result<String, ServiceUnavailableError>;
}

struct EnglishGreeter;

impl Greeter for EnglishGreeter {
    fn greet(&self, name: &str) -> Result<String, ServiceUnavailableError> {
        Ok(format!("Hello, {name}!"))
    }
}

/// 通过服务引用使用 Greeter 的前台组件
struct Reception {
    greeter: Mutex<Option<GreeterProxy>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let runtime = build_runtime(&args).await?;
    runtime.start().await?;

    arrange_scopes(runtime.scopes())?;
    start_containers(&runtime).await?;
    move_consumer(runtime.scopes())?;
    print_state(&runtime).await?;

    runtime.stop().await?;
    info!("应用已关闭");
    Ok(())
}

/// 加载设置、应用命令行覆盖并构建运行时
async fn build_runtime(args: &Args) -> anyhow::Result<AriesRuntime> {
    let loader = match &args.config {
        Some(path) => SettingsLoader::new().with_file(path)?,
        None => SettingsLoader::new().with_optional_file("config/aries.toml")?,
    };
    let mut settings = loader.load().context("加载运行时设置失败")?;
    if let Some(level) = &args.log_level {
        settings.logging.level = level.clone();
    }
    if let Some(path) = &args.scope_state {
        settings.scope.persistence_path = Some(path.clone());
    }

    let runtime = RuntimeBuilder::new()
        .with_settings(settings)
        .enable_logging()
        .register_class(
            ClassBuilder::<EnglishGreeter>::new("demo.EnglishGreeter")
                .view::<dyn Greeter>(GREETER_INTERFACE, |greeter| greeter)
                .constructor(&[], |_| Ok(EnglishGreeter))
                .build(),
        )
        .register_class(
            ClassBuilder::<Reception>::new("demo.Reception")
                .constructor(&[], |_| {
                    Ok(Reception {
                        greeter: Mutex::new(None),
                    })
                })
                .property("greeter", "any", |reception, value| {
                    let proxy = GreeterProxy::from_value(&value).ok_or("greeter 必须是服务引用")?;
                    *reception.greeter.lock() = Some(proxy);
                    Ok(())
                })
                .method("open", |reception| {
                    if let Some(greeter) = reception.greeter.lock().as_ref() {
                        info!("前台已开放: {}", greeter.greet("visitor")?);
                    }
                    Ok(())
                })
                .build(),
        )
        .build()
        .await?;
    Ok(runtime)
}

/// 首次运行时建立 providers/tenants 两个作用域并安装 bundle
fn arrange_scopes(scopes: &ScopeAdmin) -> anyhow::Result<()> {
    if scopes.find_by_name("providers").is_some() {
        info!("沿用已持久化的作用域树, 版本号 {}", scopes.generation());
        return Ok(());
    }

    let mut update = scopes.new_scope_update()?;
    let providers = update.new_child("providers");
    providers.policies_mut().add(SharePolicy::service(
        PolicyType::Export,
        &format!("(objectClass={GREETER_INTERFACE})"),
    )?);
    providers
        .bundles_to_install_mut()
        .push(BundleDescriptor::new(PROVIDER_BUNDLE, "file:bundles/greeter.jar"));

    let tenants = update.new_child("tenants");
    tenants.policies_mut().add(SharePolicy::service(
        PolicyType::Import,
        &format!("(objectClass={GREETER_INTERFACE})"),
    )?);
    tenants
        .bundles_to_install_mut()
        .push(BundleDescriptor::new(CONSUMER_BUNDLE, "file:bundles/reception.jar"));

    if !update.commit()? {
        warn!("作用域树已被并发修改，跳过初始布局");
    }
    Ok(())
}

async fn start_containers(runtime: &AriesRuntime) -> anyhow::Result<()> {
    runtime
        .create_container(
            PROVIDER_BUNDLE,
            vec![
                BeanMetadata::new("english")
                    .with_class("demo.EnglishGreeter")
                    .into(),
                ServiceMetadata::new("english-service", Metadata::reference("english"))
                    .with_interface(GREETER_INTERFACE)
                    .into(),
            ],
        )
        .await?;
    runtime
        .create_container(
            CONSUMER_BUNDLE,
            vec![
                ReferenceMetadata::new(
                    "greeter",
                    ServiceReferenceMetadata::for_interface(GREETER_INTERFACE),
                )
                .with_timeout(1_000)
                .into(),
                BeanMetadata::new("reception")
                    .with_class("demo.Reception")
                    .with_property("greeter", Metadata::reference("greeter"))
                    .with_init_method("open")
                    .into(),
            ],
        )
        .await?;
    Ok(())
}

/// 把消费者 bundle 从 tenants 移到 providers
fn move_consumer(scopes: &ScopeAdmin) -> anyhow::Result<()> {
    let tree = scopes.snapshot();
    let bundle = tree
        .bundle_by_name(CONSUMER_BUNDLE)
        .map(|b| b.id)
        .context("消费者 bundle 未安装")?;
    let owner = tree.bundle_owner(bundle).and_then(|id| tree.get(id));
    if owner.map(|scope| scope.name()) != Some("tenants") {
        info!("消费者 bundle 不在 tenants 中，跳过移动");
        return Ok(());
    }

    let mut update = scopes.new_scope_update()?;
    update
        .child_mut("tenants")
        .context("草稿中缺少 tenants")?
        .bundles_mut()
        .remove(&bundle);
    update
        .child_mut("providers")
        .context("草稿中缺少 providers")?
        .bundles_mut()
        .insert(bundle);
    if update.commit()? {
        info!("已把 {} 移到 providers", CONSUMER_BUNDLE);
    }
    Ok(())
}

async fn print_state(runtime: &AriesRuntime) -> anyhow::Result<()> {
    let tree = runtime.scopes().snapshot();
    println!("作用域树 (版本号 {}):", tree.generation());
    for scope in tree.scopes() {
        let bundles: Vec<_> = scope
            .bundles()
            .iter()
            .filter_map(|id| tree.bundle(*id))
            .map(|b| b.symbolic_name.as_str())
            .collect();
        println!("  [{}] {} -> {:?}", scope.id(), scope.name(), bundles);
    }

    if let (Some(providers), Some(tenants)) =
        (tree.find_by_name("providers"), tree.find_by_name("tenants"))
    {
        let greeter = service_properties(&[GREETER_INTERFACE]);
        println!(
            "tenants 可见 providers 的 {}: {}",
            GREETER_INTERFACE,
            tree.can_see_service(tenants.id(), providers.id(), &greeter)?
        );
    }

    println!("容器: {:?}", runtime.container_names().await);
    println!("已注册服务数: {}", runtime.registry().len());
    Ok(())
}
