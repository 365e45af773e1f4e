#![forbid(unsafe_code)]

//! Derived builtins: compositions of the primitive library with no
//! direct builder access, so coercion, broadcasting, and error behavior
//! are inherited from the primitives they call.

use weft_ir::{BinaryOp, CompareOp, UnaryOp};

use crate::builtins;
use crate::coerce::{Arg, to_tensor};
use crate::constexpr::ConstExpr;
use crate::error::Result;
use crate::semantic::Semantic;
use crate::tensor::Tensor;
use crate::types::DType;

/// Elementwise absolute value.
pub fn abs(ex: &mut dyn Semantic, x: &Tensor) -> Result<Tensor> {
    let non_negative = builtins::compare(ex, CompareOp::Ge, x, 0i64)?;
    let negated = builtins::unary(ex, UnaryOp::Neg, x)?;
    builtins::where_(ex, &non_negative, x, &negated)
}

/// Ceiling division of `x` by `div`.
pub fn cdiv(ex: &mut dyn Semantic, x: impl Into<Arg>, div: impl Into<Arg>) -> Result<Tensor> {
    let x = to_tensor(x, ex.builder())?;
    let div = to_tensor(div, ex.builder())?;
    let shifted = builtins::binary(ex, BinaryOp::Add, &x, &div)?;
    let biased = builtins::binary(ex, BinaryOp::Sub, &shifted, 1i64)?;
    builtins::binary(ex, BinaryOp::FloorDiv, &biased, &div)
}

/// Elementwise minimum of `x` and `y`.
pub fn minimum(ex: &mut dyn Semantic, x: impl Into<Arg>, y: impl Into<Arg>) -> Result<Tensor> {
    let x = to_tensor(x, ex.builder())?;
    let y = to_tensor(y, ex.builder())?;
    let less = builtins::compare(ex, CompareOp::Lt, &x, &y)?;
    builtins::where_(ex, &less, &x, &y)
}

/// Elementwise maximum of `x` and `y`.
pub fn maximum(ex: &mut dyn Semantic, x: impl Into<Arg>, y: impl Into<Arg>) -> Result<Tensor> {
    let x = to_tensor(x, ex.builder())?;
    let y = to_tensor(y, ex.builder())?;
    let greater = builtins::compare(ex, CompareOp::Gt, &x, &y)?;
    builtins::where_(ex, &greater, &x, &y)
}

/// Elementwise logistic sigmoid.
pub fn sigmoid(ex: &mut dyn Semantic, x: &Tensor) -> Result<Tensor> {
    let negated = builtins::unary(ex, UnaryOp::Neg, x)?;
    let exponential = builtins::exp(ex, &negated)?;
    let denominator = builtins::binary(ex, BinaryOp::Add, 1i64, &exponential)?;
    builtins::binary(ex, BinaryOp::TrueDiv, 1i64, &denominator)
}

/// Softmax over the leading axis, shifted by the maximum for stability.
pub fn softmax(
    ex: &mut dyn Semantic,
    x: &Tensor,
    ieee_rounding: impl Into<ConstExpr>,
) -> Result<Tensor> {
    let peak = builtins::max(ex, x, 0i64)?;
    let shifted = builtins::binary(ex, BinaryOp::Sub, x, &peak)?;
    let numerator = builtins::exp(ex, &shifted)?;
    let denominator = builtins::sum(ex, &numerator, 0i64)?;
    builtins::fdiv(ex, &numerator, &denominator, ieee_rounding)
}

/// A contiguous flattened view of `x`.
pub fn ravel(ex: &mut dyn Semantic, x: &Tensor) -> Result<Tensor> {
    builtins::view(ex, x, &[x.numel])
}

/// A tensor filled with the scalar value 0.
pub fn zeros(ex: &mut dyn Semantic, shape: &[ConstExpr], dtype: &DType) -> Result<Tensor> {
    builtins::full(ex, shape, 0i64, dtype)
}

/// A zero tensor with the shape and dtype of `input`.
pub fn zeros_like(ex: &mut dyn Semantic, input: &Tensor) -> Result<Tensor> {
    zeros(ex, &input.shape, &input.dtype)
}

/// Transform indices of a row-major `size_i * size_j` matrix into those
/// of one where indices are row-major within each group of `size_g`
/// rows. For `size_i = size_j = 4` and `size_g = 2`:
///
/// ```text
/// [[0 , 1 , 2 , 3 ],      [[0, 2,  4 , 6 ],
///  [4 , 5 , 6 , 7 ],  ->   [1, 3,  5 , 7 ],
///  [8 , 9 , 10, 11],       [8, 10, 12, 14],
///  [12, 13, 14, 15]]       [9, 11, 13, 15]]
/// ```
pub fn swizzle2d(
    ex: &mut dyn Semantic,
    i: &Tensor,
    j: &Tensor,
    size_i: impl Into<Arg>,
    size_j: impl Into<Arg>,
    size_g: impl Into<Arg>,
) -> Result<(Tensor, Tensor)> {
    let size_i = to_tensor(size_i, ex.builder())?;
    let size_j = to_tensor(size_j, ex.builder())?;
    let size_g = to_tensor(size_g, ex.builder())?;
    // unrolled index in the array
    let ij = {
        let scaled = builtins::binary(ex, BinaryOp::Mul, i, &size_j)?;
        builtins::binary(ex, BinaryOp::Add, &scaled, j)?
    };
    // number of elements in `size_g` groups of `size_j` columns
    let size_gj = builtins::binary(ex, BinaryOp::Mul, &size_g, &size_j)?;
    // index of the group holding (i, j)
    let group_id = builtins::binary(ex, BinaryOp::FloorDiv, &ij, &size_gj)?;
    // row index of the first element of this group
    let off_i = builtins::binary(ex, BinaryOp::Mul, &group_id, &size_g)?;
    // the last group may have fewer rows
    let remaining = builtins::binary(ex, BinaryOp::Sub, &size_i, &off_i)?;
    let size_g = minimum(ex, &remaining, &size_g)?;
    // new row and column indices
    let new_i = {
        let within = builtins::binary(ex, BinaryOp::Rem, &ij, &size_g)?;
        builtins::binary(ex, BinaryOp::Add, &off_i, &within)?
    };
    let new_j = {
        let within = builtins::binary(ex, BinaryOp::Rem, &ij, &size_gj)?;
        builtins::binary(ex, BinaryOp::FloorDiv, &within, &size_g)?
    };
    Ok((new_i, new_j))
}
