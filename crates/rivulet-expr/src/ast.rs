//! The expression tree the compiler consumes (spec.md §4.3).
//!
//! This is not a surface grammar: the Non-goals explicitly exclude a query
//! parser. Callers build `ScalarExpr` trees directly (or a thin adapter of
//! their own construction does), and the engine consumes them pre-validated.

use rivulet_repr::Value;

use crate::accumulator::AccumulatorKind;

/// A system variable a leaf expression can reference in place of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SystemVar {
    /// The record currently being evaluated (possibly a nested-iteration
    /// element, inside `map`/`filter` array operators).
    Current,
    /// The root record of the pipeline stage, unaffected by nested
    /// iteration — lets array-operator lambdas reach outer fields.
    Root,
}

/// A named binary/n-ary operator from the vocabulary enumerated in
/// spec.md §6. Kept as a closed enumeration with compile-time dispatch
/// (spec.md §9 "Dynamic operator registry" redesign note) rather than the
/// source's name-indexed function map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarOp {
    // Comparison
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    // Logical
    And,
    Or,
    Nor,
    Not,
    Exists,
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Mod,
    Abs,
    Ceil,
    Floor,
    Round,
    Sqrt,
    Pow,
    // String
    Concat,
    Substring,
    ToUpper,
    ToLower,
    Split,
    Length,
    Trim,
    RegexMatch,
    // Array
    Size,
    ElementAt,
    ArrayFilter,
    ArrayMap,
    Slice,
    ArrayConcat,
    IndexOf,
    Reverse,
    Contains,
    // Date
    Year,
    Month,
    DayOfMonth,
    DayOfWeek,
    DayOfYear,
    Week,
    Hour,
    Minute,
    Second,
    Millisecond,
    // Conditional
    Cond,
    IfNull,
    // Set
    SetEquals,
    SetIntersect,
    SetUnion,
    SetDifference,
    IsSubset,
    AnyTrue,
    AllTrue,
}

/// An expression tree node (spec.md §4.3: "leaves are literals, field
/// references, or system variables ... interior nodes are named operators").
#[derive(Clone, Debug, PartialEq)]
pub enum ScalarExpr {
    Literal(Value),
    Field(String),
    Var(SystemVar),
    Call(ScalarOp, Vec<ScalarExpr>),
    /// An array-valued lambda parameter reference, bound by `ArrayFilter`/
    /// `ArrayMap`'s element-iteration context (the "scratch context for
    /// nested-iteration variables" of spec.md §4.3).
    LambdaVar,
    /// Accumulator-as-expression (spec.md §6): folds `expr`, evaluated over
    /// each element of the array it is rooted at, with `kind`.
    Accumulate(AccumulatorKind, Box<ScalarExpr>),
}

impl ScalarExpr {
    pub fn field(path: impl Into<String>) -> ScalarExpr {
        ScalarExpr::Field(path.into())
    }

    pub fn lit(value: impl Into<Value>) -> ScalarExpr {
        ScalarExpr::Literal(value.into())
    }

    pub fn call(op: ScalarOp, args: Vec<ScalarExpr>) -> ScalarExpr {
        ScalarExpr::Call(op, args)
    }

    /// True if the subtree has no dependency on a field, system variable,
    /// or lambda variable — the condition under which the compiler's
    /// constant-folding pass replaces it with its evaluated value
    /// (spec.md §4.3 "Constant folding").
    pub fn is_constant(&self) -> bool {
        match self {
            ScalarExpr::Literal(_) => true,
            ScalarExpr::Field(_) | ScalarExpr::Var(_) | ScalarExpr::LambdaVar => false,
            ScalarExpr::Call(_, args) => args.iter().all(ScalarExpr::is_constant),
            ScalarExpr::Accumulate(_, expr) => expr.is_constant(),
        }
    }

    /// The set of top-level field paths this expression reads, used by the
    /// planner's predicate-pushdown rule (spec.md §4.4) to check whether a
    /// filter depends only on fields a reshape stage leaves unchanged.
    pub fn field_dependencies(&self, out: &mut std::collections::BTreeSet<String>) {
        match self {
            ScalarExpr::Literal(_) | ScalarExpr::Var(_) | ScalarExpr::LambdaVar => {}
            ScalarExpr::Field(path) => {
                out.insert(path.clone());
            }
            ScalarExpr::Call(_, args) => {
                for a in args {
                    a.field_dependencies(out);
                }
            }
            ScalarExpr::Accumulate(_, expr) => expr.field_dependencies(out),
        }
    }
}
