mod attr_selection;
pub use attr_selection::AttrSelection;

mod formula;
pub use formula::{nest_ands, nest_ors, restrictions, Formula};

mod formula_and;
pub use formula_and::FormulaAnd;

mod formula_not;
pub use formula_not::FormulaNot;

mod formula_or;
pub use formula_or::FormulaOr;

mod op;
pub use op::{valid_op, VALID_OPS};

mod query;
pub use query::{DeleteQuery, InsertQuery, SelectQuery, UpdateQuery};

mod value;
pub use value::Value;

mod value_selection;
pub use value_selection::ValueSelection;

mod wire;
