use super::node::Number;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// An entry in a code object's constant pool.
///
/// Constants are interned, so they must be `Eq + Hash`; floats are wrapped in
/// `OrderedFloat` for that. Integers and floats never compare equal to each
/// other, so `2` and `2.0` occupy separate pool slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Constant {
    /// The "no value" sentinel returned by a unit that has nothing else to
    /// return.
    None,

    /// 64-bit signed integer.
    Int(i64),

    /// 64-bit floating-point number.
    Float(OrderedFloat<f64>),
}

impl From<Number> for Constant {
    fn from(n: Number) -> Self {
        match n {
            Number::Int(v) => Constant::Int(v),
            Number::Float(v) => Constant::Float(OrderedFloat(v)),
        }
    }
}

impl std::fmt::Display for Constant {
    /// Format a constant using source syntax.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::None => write!(f, "None"),
            Constant::Int(n) => write!(f, "{}", n),
            Constant::Float(n) => write!(f, "{:?}", n.0),
        }
    }
}
