//! # Proxy Macros
//!
//! 这个 crate 提供了为服务接口生成代理类型的过程宏。
//!
//! ## 核心宏
//!
//! - [`service_proxy`] - 服务接口代理宏
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use infrastructure_common::ServiceUnavailableError;
//! use proxy_macros::service_proxy;
//!
//! #[service_proxy]
//! pub trait Greeter: Send + Sync {
//!     fn greet(&self, name: &str) -> Result<String, ServiceUnavailableError>;
//! }
//!
//! // 生成 GreeterProxy，可以直接从引用组件的实例构造
//! let proxy = GreeterProxy::from_value(&container.get_component_instance("greeter")?)
//!     .expect("greeter 是服务引用");
//! proxy.greet("Aries")?;
//! ```

use proc_macro::TokenStream;
use syn::{parse_macro_input, ItemTrait};

mod proxy;

/// 服务接口代理宏
///
/// 保留原 trait 定义，并生成 `<Trait>Proxy` 结构体。代理每次调用时通过
/// `di_impl::ServiceProxy` 解析当前绑定的服务（按引用的超时等待），再转发调用。
///
/// # 约束
///
/// - trait 必须声明 `Send` 与 `Sync` 父 trait
/// - 每个方法的接收者必须是 `&self`，且不能带泛型参数或 `async`
/// - 每个方法必须返回 `Result<_, E>`，其中 `E: From<ServiceUnavailableError>`
///
/// 违反约束时给出编译错误。
///
/// # 生成的接口
///
/// ```rust,ignore
/// pub struct GreeterProxy { /* Arc<ServiceProxy> */ }
///
/// impl GreeterProxy {
///     pub fn new(handle: Arc<ServiceProxy>) -> Self;
///     pub fn from_value(value: &Value) -> Option<Self>;
///     pub fn handle(&self) -> &Arc<ServiceProxy>;
/// }
///
/// impl Greeter for GreeterProxy { /* 转发 */ }
/// ```
#[proc_macro_attribute]
pub fn service_proxy(args: TokenStream, input: TokenStream) -> TokenStream {
    if !args.is_empty() {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            "service_proxy 不接受参数",
        )
        .to_compile_error()
        .into();
    }
    let item = parse_macro_input!(input as ItemTrait);
    proxy::service_proxy_impl(item)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
