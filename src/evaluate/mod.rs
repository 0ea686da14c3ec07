//! Resolution of merged elements into property dictionaries.

mod context;
mod resolver;


pub use context::{EvaluationContext, EvaluationResult, NestedInfo};
pub use resolver::Resolver;
