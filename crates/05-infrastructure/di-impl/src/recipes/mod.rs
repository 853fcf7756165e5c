//! 配方实现

mod bean;
mod reference;
mod service;
mod values;

pub use bean::{BeanRecipe, LifecycleMethod};
pub use reference::{ListenerRecipe, ReferenceListRecipe, ReferenceRecipe, ServiceQuery};
pub use service::{ServiceRecipe, ServiceRegistration};
pub use values::{
    CollectionKind, CollectionRecipe, IdRefRecipe, MapRecipe, PassThroughRecipe, RefRecipe,
    ValueRecipe,
};
