#![forbid(unsafe_code)]

use std::fmt;

use weft_ir::{BinaryOp, CompareOp, LogicalOp, UnaryOp, ValueId};

use crate::builtins;
use crate::coerce::Arg;
use crate::constexpr::{ConstExpr, ConstVal};
use crate::error::{Result, TraceError};
use crate::semantic::Semantic;
use crate::types::DType;

/// One entry of an indexing expression. Only a new-axis marker and the
/// full slice have defined semantics; everything else is rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SliceArg {
    /// Insert a new length-1 axis at this position (`None` in the host
    /// syntax).
    NewAxis,
    /// Keep the axis as-is (`:` in the host syntax).
    Full,
    /// A partial slice; always unsupported.
    Range {
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    },
    /// A single-element subscript; always unsupported.
    At(i64),
}

/// A traced runtime value: a handle into the builder-owned IR graph plus
/// its compile-time type. `shape` and `numel` are derived from the type
/// at construction and never set independently; operations return fresh
/// tensors instead of mutating.
#[derive(Clone, Debug)]
pub struct Tensor {
    pub handle: ValueId,
    /// Full type, possibly a block.
    pub ty: DType,
    /// Scalar type: the block's element type, or `ty` itself.
    pub dtype: DType,
    pub shape: Vec<ConstExpr>,
    pub numel: ConstExpr,
}

impl Tensor {
    pub fn new(handle: ValueId, ty: DType) -> Tensor {
        let dims = ty.dims();
        let numel: u64 = dims.iter().product();
        Tensor {
            handle,
            dtype: ty.scalar().clone(),
            shape: dims
                .into_iter()
                .map(|d| ConstExpr(ConstVal::Int(d as i128)))
                .collect(),
            numel: ConstExpr(ConstVal::Int(numel as i128)),
            ty,
        }
    }

    pub fn add(&self, other: impl Into<Arg>, ex: &mut dyn Semantic) -> Result<Tensor> {
        builtins::binary(ex, BinaryOp::Add, self, other)
    }

    pub fn sub(&self, other: impl Into<Arg>, ex: &mut dyn Semantic) -> Result<Tensor> {
        builtins::binary(ex, BinaryOp::Sub, self, other)
    }

    pub fn rsub(&self, other: impl Into<Arg>, ex: &mut dyn Semantic) -> Result<Tensor> {
        builtins::binary(ex, BinaryOp::Sub, other, self)
    }

    pub fn mul(&self, other: impl Into<Arg>, ex: &mut dyn Semantic) -> Result<Tensor> {
        builtins::binary(ex, BinaryOp::Mul, self, other)
    }

    pub fn truediv(&self, other: impl Into<Arg>, ex: &mut dyn Semantic) -> Result<Tensor> {
        builtins::binary(ex, BinaryOp::TrueDiv, self, other)
    }

    pub fn rtruediv(&self, other: impl Into<Arg>, ex: &mut dyn Semantic) -> Result<Tensor> {
        builtins::binary(ex, BinaryOp::TrueDiv, other, self)
    }

    pub fn floordiv(&self, other: impl Into<Arg>, ex: &mut dyn Semantic) -> Result<Tensor> {
        builtins::binary(ex, BinaryOp::FloorDiv, self, other)
    }

    pub fn rfloordiv(&self, other: impl Into<Arg>, ex: &mut dyn Semantic) -> Result<Tensor> {
        builtins::binary(ex, BinaryOp::FloorDiv, other, self)
    }

    pub fn rem(&self, other: impl Into<Arg>, ex: &mut dyn Semantic) -> Result<Tensor> {
        builtins::binary(ex, BinaryOp::Rem, self, other)
    }

    pub fn rrem(&self, other: impl Into<Arg>, ex: &mut dyn Semantic) -> Result<Tensor> {
        builtins::binary(ex, BinaryOp::Rem, other, self)
    }

    pub fn neg(&self, ex: &mut dyn Semantic) -> Result<Tensor> {
        builtins::unary(ex, UnaryOp::Neg, self)
    }

    pub fn not(&self, ex: &mut dyn Semantic) -> Result<Tensor> {
        builtins::unary(ex, UnaryOp::Not, self)
    }

    pub fn bitand(&self, other: impl Into<Arg>, ex: &mut dyn Semantic) -> Result<Tensor> {
        builtins::binary(ex, BinaryOp::And, self, other)
    }

    pub fn bitor(&self, other: impl Into<Arg>, ex: &mut dyn Semantic) -> Result<Tensor> {
        builtins::binary(ex, BinaryOp::Or, self, other)
    }

    pub fn bitxor(&self, other: impl Into<Arg>, ex: &mut dyn Semantic) -> Result<Tensor> {
        builtins::binary(ex, BinaryOp::Xor, self, other)
    }

    pub fn shl(&self, other: impl Into<Arg>, ex: &mut dyn Semantic) -> Result<Tensor> {
        builtins::binary(ex, BinaryOp::Shl, self, other)
    }

    pub fn shr(&self, other: impl Into<Arg>, ex: &mut dyn Semantic) -> Result<Tensor> {
        builtins::binary(ex, BinaryOp::Shr, self, other)
    }

    pub fn gt(&self, other: impl Into<Arg>, ex: &mut dyn Semantic) -> Result<Tensor> {
        builtins::compare(ex, CompareOp::Gt, self, other)
    }

    pub fn ge(&self, other: impl Into<Arg>, ex: &mut dyn Semantic) -> Result<Tensor> {
        builtins::compare(ex, CompareOp::Ge, self, other)
    }

    pub fn lt(&self, other: impl Into<Arg>, ex: &mut dyn Semantic) -> Result<Tensor> {
        builtins::compare(ex, CompareOp::Lt, self, other)
    }

    pub fn le(&self, other: impl Into<Arg>, ex: &mut dyn Semantic) -> Result<Tensor> {
        builtins::compare(ex, CompareOp::Le, self, other)
    }

    pub fn equal(&self, other: impl Into<Arg>, ex: &mut dyn Semantic) -> Result<Tensor> {
        builtins::compare(ex, CompareOp::Eq, self, other)
    }

    pub fn not_equal(&self, other: impl Into<Arg>, ex: &mut dyn Semantic) -> Result<Tensor> {
        builtins::compare(ex, CompareOp::Ne, self, other)
    }

    pub fn logical_and(&self, other: impl Into<Arg>, ex: &mut dyn Semantic) -> Result<Tensor> {
        builtins::logical(ex, LogicalOp::And, self, other)
    }

    pub fn logical_or(&self, other: impl Into<Arg>, ex: &mut dyn Semantic) -> Result<Tensor> {
        builtins::logical(ex, LogicalOp::Or, self, other)
    }

    /// Subscripting. `NewAxis` entries insert unit axes at their
    /// position; `Full` entries leave the corresponding axis alone. Any
    /// other slice has no defined semantics.
    pub fn index(&self, slices: &[SliceArg], ex: &mut dyn Semantic) -> Result<Tensor> {
        let mut ret = self.clone();
        for (dim, sl) in slices.iter().enumerate() {
            match sl {
                SliceArg::NewAxis => {
                    ret = ex.expand_dims(&ret, dim as u32)?;
                }
                SliceArg::Full => {}
                other => {
                    return Err(TraceError::Unsupported(format!(
                        "slice expression {other:?} in subscript"
                    )));
                }
            }
        }
        Ok(ret)
    }

    /// `.to(dtype)`: value cast, or reinterpretation when `bitcast`.
    pub fn cast_to(&self, dtype: &DType, ex: &mut dyn Semantic) -> Result<Tensor> {
        ex.cast(self, dtype)
    }

    pub fn bitcast_to(&self, dtype: &DType, ex: &mut dyn Semantic) -> Result<Tensor> {
        ex.bitcast(self, dtype)
    }
}

impl fmt::Display for Tensor {
    // ex. "fp32[3,4]"
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims = self
            .shape
            .iter()
            .map(|d| match d.value() {
                ConstVal::Int(v) => v.to_string(),
                other => format!("{other:?}"),
            })
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "{}[{dims}]", self.dtype)
    }
}
