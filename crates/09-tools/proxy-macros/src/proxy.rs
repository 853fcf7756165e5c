//! 服务代理宏实现

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{
    spanned::Spanned, FnArg, GenericParam, Ident, ItemTrait, Pat, PatIdent, ReturnType, Signature,
    TraitItem, TraitItemFn, Type, TypeParamBound,
};

/// 生成代理结构体与 trait 实现，原 trait 定义原样保留
pub fn service_proxy_impl(item: ItemTrait) -> syn::Result<TokenStream> {
    check_trait(&item)?;

    let trait_ident = &item.ident;
    let vis = &item.vis;
    let proxy_ident = format_ident!("{}Proxy", trait_ident);

    let mut methods = Vec::new();
    for trait_item in &item.items {
        match trait_item {
            TraitItem::Fn(method) => methods.push(forward_method(trait_ident, method)?),
            other => {
                return Err(syn::Error::new(
                    other.span(),
                    "service_proxy 只支持方法，不支持关联类型或常量",
                ))
            }
        }
    }

    let proxy_doc = format!("`{trait_ident}` 的服务代理，每次调用都转发给当前绑定的服务");

    Ok(quote! {
        #item

        #[doc = #proxy_doc]
        #[derive(Clone)]
        #vis struct #proxy_ident {
            handle: ::std::sync::Arc<::di_impl::ServiceProxy>,
        }

        impl #proxy_ident {
            /// 包装服务代理句柄
            #vis fn new(handle: ::std::sync::Arc<::di_impl::ServiceProxy>) -> Self {
                Self { handle }
            }

            /// 从引用组件的实例构造，实例不是服务代理时返回 `None`
            #vis fn from_value(value: &::di_abstractions::Value) -> ::std::option::Option<Self> {
                ::di_impl::ServiceProxy::from_value(value).map(Self::new)
            }

            /// 底层服务代理句柄
            #vis fn handle(&self) -> &::std::sync::Arc<::di_impl::ServiceProxy> {
                &self.handle
            }
        }

        impl #trait_ident for #proxy_ident {
            #(#methods)*
        }
    })
}

fn check_trait(item: &ItemTrait) -> syn::Result<()> {
    if !item.generics.params.is_empty() || item.generics.where_clause.is_some() {
        return Err(syn::Error::new(
            item.generics.span(),
            "service_proxy 不支持带泛型参数的 trait",
        ));
    }
    if item.unsafety.is_some() {
        return Err(syn::Error::new(
            item.unsafety.span(),
            "service_proxy 不支持 unsafe trait",
        ));
    }
    for marker in ["Send", "Sync"] {
        if !has_supertrait(item, marker) {
            return Err(syn::Error::new(
                item.ident.span(),
                format!("服务接口 `{}` 必须声明 `{marker}` 父 trait", item.ident),
            ));
        }
    }
    Ok(())
}

fn has_supertrait(item: &ItemTrait, name: &str) -> bool {
    item.supertraits.iter().any(|bound| match bound {
        TypeParamBound::Trait(bound) => bound
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == name),
        _ => false,
    })
}

fn forward_method(trait_ident: &Ident, method: &TraitItemFn) -> syn::Result<TokenStream> {
    let sig = check_signature(&method.sig)?;
    let name = &sig.ident;
    let args = sig.inputs.iter().filter_map(|arg| match arg {
        FnArg::Typed(typed) => Some(&typed.pat),
        FnArg::Receiver(_) => None,
    });

    Ok(quote! {
        #sig {
            let target = self.handle.service::<dyn #trait_ident>()?;
            target.#name(#(#args),*)
        }
    })
}

/// 校验方法签名，并把参数模式统一重命名以便转发
fn check_signature(sig: &Signature) -> syn::Result<Signature> {
    if let Some(token) = &sig.asyncness {
        return Err(syn::Error::new(token.span(), "service_proxy 不支持 async 方法"));
    }
    if let Some(token) = &sig.unsafety {
        return Err(syn::Error::new(token.span(), "service_proxy 不支持 unsafe 方法"));
    }
    if sig
        .generics
        .params
        .iter()
        .any(|param| !matches!(param, GenericParam::Lifetime(_)))
        || sig.generics.where_clause.is_some()
    {
        return Err(syn::Error::new(
            sig.generics.span(),
            format!("方法 `{}` 不能带类型参数或 where 子句", sig.ident),
        ));
    }

    match sig.receiver() {
        Some(receiver)
            if receiver.reference.is_some()
                && receiver.mutability.is_none()
                && receiver.colon_token.is_none() => {}
        _ => {
            return Err(syn::Error::new(
                sig.span(),
                format!("方法 `{}` 的接收者必须是 `&self`", sig.ident),
            ))
        }
    }

    if !returns_result(&sig.output) {
        return Err(syn::Error::new(
            sig.output.span(),
            format!(
                "方法 `{}` 必须返回 `Result<_, E>`，且 `E: From<ServiceUnavailableError>`",
                sig.ident
            ),
        ));
    }

    let mut sig = sig.clone();
    for (index, arg) in sig.inputs.iter_mut().enumerate() {
        if let FnArg::Typed(typed) = arg {
            typed.pat = Box::new(Pat::Ident(PatIdent {
                attrs: Vec::new(),
                by_ref: None,
                mutability: None,
                ident: format_ident!("arg{}", index),
                subpat: None,
            }));
        }
    }
    Ok(sig)
}

fn returns_result(output: &ReturnType) -> bool {
    match output {
        ReturnType::Type(_, ty) => match ty.as_ref() {
            Type::Path(path) => path
                .path
                .segments
                .last()
                .is_some_and(|segment| segment.ident == "Result"),
            _ => false,
        },
        ReturnType::Default => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_generates_proxy_struct() {
        let item: ItemTrait = parse_quote! {
            pub trait Greeter: Send + Sync {
                fn greet(&self, name: &str) -> Result<String, Error>;
            }
        };
        let output = service_proxy_impl(item).unwrap().to_string();
        assert!(output.contains("struct GreeterProxy"));
        assert!(output.contains("impl Greeter for GreeterProxy"));
        assert!(output.contains("dyn Greeter"));
    }

    #[test]
    fn test_rejects_mutable_receiver() {
        let item: ItemTrait = parse_quote! {
            trait Counter: Send + Sync {
                fn bump(&mut self) -> Result<u32, Error>;
            }
        };
        let error = service_proxy_impl(item).unwrap_err();
        assert!(error.to_string().contains("&self"));
    }

    #[test]
    fn test_rejects_non_result_return() {
        let item: ItemTrait = parse_quote! {
            trait Clock: Send + Sync {
                fn now(&self) -> u64;
            }
        };
        assert!(service_proxy_impl(item).is_err());
    }

    #[test]
    fn test_requires_send_sync_supertraits() {
        let item: ItemTrait = parse_quote! {
            trait Clock: Send {
                fn now(&self) -> Result<u64, Error>;
            }
        };
        let error = service_proxy_impl(item).unwrap_err();
        assert!(error.to_string().contains("Sync"));
    }

    #[test]
    fn test_renames_pattern_arguments() {
        let item: ItemTrait = parse_quote! {
            trait Adder: Send + Sync {
                fn add(&self, (a, b): (u32, u32)) -> Result<u32, Error>;
            }
        };
        let output = service_proxy_impl(item).unwrap().to_string();
        assert!(output.contains("arg1"));
        assert!(!output.contains("arg0"));
    }
}
