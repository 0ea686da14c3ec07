//! Attribute value expressions: scanning and evaluation.

mod evaluator;
mod scanner;

pub use evaluator::{
    create_property_filter, evaluate_expression, PropertyLookup, Value, SERVICE_PID_ATTRIBUTE,
    UNBOUND_FILTER,
};
pub use scanner::{ExpressionScanner, NumericOverflow};
