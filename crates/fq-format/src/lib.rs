#![forbid(unsafe_code)]

mod convert;
mod value;

pub use convert::{
    convert_expression_to_filters, convert_expression_to_filters_with_policy,
    convert_filters_to_expression, pair_to_filter_item, render_item,
};
pub use value::{
    format_between, format_single_value, format_value, is_quoted, literal_to_value, unquote,
};
