pub mod builder;
pub mod class_repr;

pub use builder::ClassReprBuilder;
pub use class_repr::{AttrLocation, AttributeRepr, ClassRepr, IndexRepr, IndexStatus, IndexType};
