mod ident;
pub use ident::{escape_ident, json_prop, quote_expr};

mod lower;
pub use lower::lower;

mod params;
pub use params::{question_to_positional, replace_identifiers};

mod part;
pub use part::SqlPart;

mod planner;
pub use planner::{
    field_transform, formula_transform, partition_columns, physical_table, plan_delete,
    plan_insert, plan_select, plan_update_parts, redirect, PlannedQuery,
};
