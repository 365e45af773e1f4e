#![forbid(unsafe_code)]

use std::fmt;
use std::ops;

use crate::error::{Result, TraceError};

/// The closed set of host values a compile-time constant can hold.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConstVal {
    Int(i128),
    Float(f64),
    Bool(bool),
}

impl ConstVal {
    fn kind(self) -> &'static str {
        match self {
            ConstVal::Int(_) => "int",
            ConstVal::Float(_) => "float",
            ConstVal::Bool(_) => "bool",
        }
    }
}

/// A value known entirely at trace time. Arithmetic on constants is pure
/// host computation and never reaches the builder.
///
/// Construction goes through `ConstVal`, so a constexpr can never wrap
/// another constexpr.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstExpr(pub ConstVal);

/// Promote both operands for mixed-kind arithmetic: bools behave as
/// integers, and any float operand makes the operation floating.
fn numeric_pair(lhs: ConstVal, rhs: ConstVal) -> (ConstVal, ConstVal) {
    fn widen(v: ConstVal) -> ConstVal {
        match v {
            ConstVal::Bool(b) => ConstVal::Int(b as i128),
            other => other,
        }
    }
    let (l, r) = (widen(lhs), widen(rhs));
    match (l, r) {
        (ConstVal::Int(a), ConstVal::Float(_)) => (ConstVal::Float(a as f64), r),
        (ConstVal::Float(_), ConstVal::Int(b)) => (l, ConstVal::Float(b as f64)),
        _ => (l, r),
    }
}

/// Floor division, rounding toward negative infinity like the host
/// language's `//`.
fn floor_div_i128(a: i128, b: i128) -> i128 {
    let q = a / b;
    if a % b != 0 && (a < 0) != (b < 0) { q - 1 } else { q }
}

/// Modulo with the sign of the divisor, matching floor division.
fn floor_rem_i128(a: i128, b: i128) -> i128 {
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) { r + b } else { r }
}

impl ConstExpr {
    pub fn new(value: ConstVal) -> ConstExpr {
        ConstExpr(value)
    }

    pub fn value(self) -> ConstVal {
        self.0
    }

    /// Truthiness of the underlying value.
    pub fn is_truthy(self) -> bool {
        match self.0 {
            ConstVal::Int(v) => v != 0,
            ConstVal::Float(v) => v != 0.0,
            ConstVal::Bool(v) => v,
        }
    }

    /// Reduce to a plain integer; the validation path for compile-time
    /// integer arguments (shape elements, reduction axes).
    pub fn as_int(self) -> Result<i128> {
        match self.0 {
            ConstVal::Int(v) => Ok(v),
            other => Err(TraceError::InvalidType(format!(
                "expected constexpr[int], got constexpr[{}]",
                other.kind()
            ))),
        }
    }

    pub fn as_bool(self) -> Result<bool> {
        match self.0 {
            ConstVal::Bool(v) => Ok(v),
            other => Err(TraceError::InvalidType(format!(
                "expected constexpr[bool], got constexpr[{}]",
                other.kind()
            ))),
        }
    }

    /// True division: always floating, regardless of operand kinds.
    pub fn truediv(self, rhs: ConstExpr) -> ConstExpr {
        let (l, r) = numeric_pair(self.0, rhs.0);
        let (a, b) = match (l, r) {
            (ConstVal::Int(a), ConstVal::Int(b)) => (a as f64, b as f64),
            (ConstVal::Float(a), ConstVal::Float(b)) => (a, b),
            _ => panic!("constexpr truediv on {} and {}", self.0.kind(), rhs.0.kind()),
        };
        ConstExpr(ConstVal::Float(a / b))
    }

    /// Floor division, a distinct operator from true division.
    pub fn floordiv(self, rhs: ConstExpr) -> ConstExpr {
        match numeric_pair(self.0, rhs.0) {
            (ConstVal::Int(a), ConstVal::Int(b)) => ConstExpr(ConstVal::Int(floor_div_i128(a, b))),
            (ConstVal::Float(a), ConstVal::Float(b)) => ConstExpr(ConstVal::Float((a / b).floor())),
            _ => panic!(
                "constexpr floordiv on {} and {}",
                self.0.kind(),
                rhs.0.kind()
            ),
        }
    }

    fn compare(
        self,
        rhs: ConstExpr,
        int_cmp: impl Fn(i128, i128) -> bool,
        float_cmp: impl Fn(f64, f64) -> bool,
    ) -> ConstExpr {
        let truth = match numeric_pair(self.0, rhs.0) {
            (ConstVal::Int(a), ConstVal::Int(b)) => int_cmp(a, b),
            (ConstVal::Float(a), ConstVal::Float(b)) => float_cmp(a, b),
            _ => panic!(
                "constexpr comparison on {} and {}",
                self.0.kind(),
                rhs.0.kind()
            ),
        };
        ConstExpr(ConstVal::Bool(truth))
    }

    pub fn lt(self, rhs: ConstExpr) -> ConstExpr {
        self.compare(rhs, |a, b| a < b, |a, b| a < b)
    }

    pub fn le(self, rhs: ConstExpr) -> ConstExpr {
        self.compare(rhs, |a, b| a <= b, |a, b| a <= b)
    }

    pub fn gt(self, rhs: ConstExpr) -> ConstExpr {
        self.compare(rhs, |a, b| a > b, |a, b| a > b)
    }

    pub fn ge(self, rhs: ConstExpr) -> ConstExpr {
        self.compare(rhs, |a, b| a >= b, |a, b| a >= b)
    }

    /// Comparison producing a constexpr bool, like every other operator.
    /// Plain structural equality stays available through `PartialEq`.
    pub fn eq_ct(self, rhs: ConstExpr) -> ConstExpr {
        self.compare(rhs, |a, b| a == b, |a, b| a == b)
    }

    pub fn ne_ct(self, rhs: ConstExpr) -> ConstExpr {
        self.compare(rhs, |a, b| a != b, |a, b| a != b)
    }
}

impl fmt::Display for ConstExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            ConstVal::Int(v) => write!(f, "constexpr[{v}]"),
            ConstVal::Float(v) => write!(f, "constexpr[{v}]"),
            ConstVal::Bool(v) => write!(f, "constexpr[{v}]"),
        }
    }
}

impl From<ConstVal> for ConstExpr {
    fn from(v: ConstVal) -> ConstExpr {
        ConstExpr(v)
    }
}

impl From<i64> for ConstExpr {
    fn from(v: i64) -> ConstExpr {
        ConstExpr(ConstVal::Int(v as i128))
    }
}

impl From<i32> for ConstExpr {
    fn from(v: i32) -> ConstExpr {
        ConstExpr(ConstVal::Int(v as i128))
    }
}

impl From<u64> for ConstExpr {
    fn from(v: u64) -> ConstExpr {
        ConstExpr(ConstVal::Int(v as i128))
    }
}

impl From<usize> for ConstExpr {
    fn from(v: usize) -> ConstExpr {
        ConstExpr(ConstVal::Int(v as i128))
    }
}

impl From<f64> for ConstExpr {
    fn from(v: f64) -> ConstExpr {
        ConstExpr(ConstVal::Float(v))
    }
}

impl From<bool> for ConstExpr {
    fn from(v: bool) -> ConstExpr {
        ConstExpr(ConstVal::Bool(v))
    }
}

macro_rules! arith_op {
    ($trait:ident, $method:ident, $int:expr, $float:expr) => {
        impl ops::$trait for ConstExpr {
            type Output = ConstExpr;

            fn $method(self, rhs: ConstExpr) -> ConstExpr {
                match numeric_pair(self.0, rhs.0) {
                    (ConstVal::Int(a), ConstVal::Int(b)) => ConstExpr(ConstVal::Int($int(a, b))),
                    (ConstVal::Float(a), ConstVal::Float(b)) => {
                        ConstExpr(ConstVal::Float($float(a, b)))
                    }
                    _ => panic!(
                        concat!("constexpr ", stringify!($method), " on {} and {}"),
                        self.0.kind(),
                        rhs.0.kind()
                    ),
                }
            }
        }
    };
}

arith_op!(Add, add, |a: i128, b: i128| a + b, |a: f64, b: f64| a + b);
arith_op!(Sub, sub, |a: i128, b: i128| a - b, |a: f64, b: f64| a - b);
arith_op!(Mul, mul, |a: i128, b: i128| a * b, |a: f64, b: f64| a * b);
arith_op!(Rem, rem, floor_rem_i128, |a: f64, b: f64| a - b * (a / b).floor());

/// `/` is host true division; floor division is the `floordiv` method.
impl ops::Div for ConstExpr {
    type Output = ConstExpr;

    fn div(self, rhs: ConstExpr) -> ConstExpr {
        self.truediv(rhs)
    }
}

macro_rules! bit_op {
    ($trait:ident, $method:ident, $f:expr) => {
        impl ops::$trait for ConstExpr {
            type Output = ConstExpr;

            fn $method(self, rhs: ConstExpr) -> ConstExpr {
                match (self.0, rhs.0) {
                    (ConstVal::Int(a), ConstVal::Int(b)) => ConstExpr(ConstVal::Int($f(a, b))),
                    (ConstVal::Bool(a), ConstVal::Bool(b)) => {
                        ConstExpr(ConstVal::Int($f(a as i128, b as i128)))
                    }
                    _ => panic!(
                        concat!("constexpr ", stringify!($method), " on {} and {}"),
                        self.0.kind(),
                        rhs.0.kind()
                    ),
                }
            }
        }
    };
}

bit_op!(BitAnd, bitand, |a: i128, b: i128| a & b);
bit_op!(BitOr, bitor, |a: i128, b: i128| a | b);
bit_op!(BitXor, bitxor, |a: i128, b: i128| a ^ b);
bit_op!(Shl, shl, |a: i128, b: i128| a << b);
bit_op!(Shr, shr, |a: i128, b: i128| a >> b);

impl ops::Neg for ConstExpr {
    type Output = ConstExpr;

    fn neg(self) -> ConstExpr {
        match self.0 {
            ConstVal::Int(v) => ConstExpr(ConstVal::Int(-v)),
            ConstVal::Float(v) => ConstExpr(ConstVal::Float(-v)),
            ConstVal::Bool(v) => ConstExpr(ConstVal::Int(-(v as i128))),
        }
    }
}

impl ops::Not for ConstExpr {
    type Output = ConstExpr;

    fn not(self) -> ConstExpr {
        match self.0 {
            ConstVal::Int(v) => ConstExpr(ConstVal::Int(!v)),
            ConstVal::Bool(v) => ConstExpr(ConstVal::Int(!(v as i128))),
            ConstVal::Float(_) => panic!("constexpr not on float"),
        }
    }
}
