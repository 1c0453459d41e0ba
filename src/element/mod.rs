//! Element System
//!
//! Data-typed game entities. Types declare a parent list and a data table;
//! the registry precomputes each type's model chain and property schema, and
//! the resolver builds instances from those tables at runtime.

pub mod instance;
pub mod kind;
pub mod registry;
pub mod resolver;
pub mod world;

pub use instance::{ConstData, ElementDetail, ElementInstance};
pub use kind::{ElementKind, TypeDeclaration};
pub use registry::{ElementType, ElementTypeRegistry, PropertyInfo, PropertySchema, TypeCatalog};
pub use resolver::ElementResolver;
pub use world::World;
