//! # Builders
//!
//! Named, composable predicates over the query specification.

pub mod base;
pub mod collection;
pub mod post;

pub use base::{BaseBuilder, QueryBuilder};
pub use collection::CollectionBuilder;
pub use post::{PostBuilder, PostTypes};
