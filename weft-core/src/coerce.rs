#![forbid(unsafe_code)]

use weft_ir::Builder;

use crate::constexpr::{ConstExpr, ConstVal};
use crate::error::{Result, TraceError};
use crate::tensor::Tensor;
use crate::types::DType;

/// Everything a builtin accepts where "tensor or literal" is allowed: a
/// closed union, so coercion is an exhaustive match.
#[derive(Clone, Debug)]
pub enum Arg {
    Bool(bool),
    Int(i128),
    Float(f64),
    Const(ConstExpr),
    Tensor(Tensor),
}

impl From<bool> for Arg {
    fn from(v: bool) -> Arg {
        Arg::Bool(v)
    }
}

impl From<i32> for Arg {
    fn from(v: i32) -> Arg {
        Arg::Int(v as i128)
    }
}

impl From<i64> for Arg {
    fn from(v: i64) -> Arg {
        Arg::Int(v as i128)
    }
}

impl From<u32> for Arg {
    fn from(v: u32) -> Arg {
        Arg::Int(v as i128)
    }
}

impl From<u64> for Arg {
    fn from(v: u64) -> Arg {
        Arg::Int(v as i128)
    }
}

impl From<i128> for Arg {
    fn from(v: i128) -> Arg {
        Arg::Int(v)
    }
}

impl From<f32> for Arg {
    fn from(v: f32) -> Arg {
        Arg::Float(v as f64)
    }
}

impl From<f64> for Arg {
    fn from(v: f64) -> Arg {
        Arg::Float(v)
    }
}

impl From<ConstExpr> for Arg {
    fn from(v: ConstExpr) -> Arg {
        Arg::Const(v)
    }
}

impl From<Tensor> for Arg {
    fn from(v: Tensor) -> Arg {
        Arg::Tensor(v)
    }
}

impl From<&Tensor> for Arg {
    fn from(v: &Tensor) -> Arg {
        Arg::Tensor(v.clone())
    }
}

const I32_MIN: i128 = -(1 << 31);
const I32_END: i128 = 1 << 31;
const U32_END: i128 = 1 << 32;
const I64_MIN: i128 = -(1 << 63);
const I64_END: i128 = 1 << 63;
const U64_END: i128 = 1 << 64;

/// The single choke point turning host constants into typed tensors.
///
/// Integers pick the narrowest representable width, preferring signed
/// 32-bit; unsigned-range values are emitted through the signed constant
/// constructor of the same width, bit-for-bit. Floats are single
/// precision. Already-traced tensors pass through unchanged.
pub fn to_tensor(arg: impl Into<Arg>, b: &mut dyn Builder) -> Result<Tensor> {
    match arg.into() {
        Arg::Bool(v) => Ok(Tensor::new(b.get_int1(v), DType::INT1)),
        Arg::Int(v) => {
            if (I32_MIN..I32_END).contains(&v) {
                Ok(Tensor::new(b.get_int32(v as i32), DType::INT32))
            } else if (I32_END..U32_END).contains(&v) {
                Ok(Tensor::new(b.get_int32(v as u32 as i32), DType::UINT32))
            } else if (I64_MIN..I64_END).contains(&v) {
                Ok(Tensor::new(b.get_int64(v as i64), DType::INT64))
            } else if (I64_END..U64_END).contains(&v) {
                Ok(Tensor::new(b.get_int64(v as u64 as i64), DType::UINT64))
            } else {
                Err(TraceError::NonrepresentableInteger(v))
            }
        }
        Arg::Float(v) => Ok(Tensor::new(b.get_fp32(v as f32), DType::FP32)),
        Arg::Const(c) => match c.value() {
            ConstVal::Int(v) => to_tensor(v, b),
            ConstVal::Float(v) => to_tensor(v, b),
            ConstVal::Bool(v) => to_tensor(v, b),
        },
        Arg::Tensor(t) => Ok(t),
    }
}
