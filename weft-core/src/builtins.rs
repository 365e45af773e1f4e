#![forbid(unsafe_code)]

//! The builtin library: one entry per primitive operation. Each entry
//! validates its compile-time-only arguments, coerces its tensor-valued
//! arguments, and forwards to the semantic collaborator with the builder
//! context. No argument is coerced universally; every operation decides
//! for itself.

use weft_ir::{AtomicOp, BinaryOp, CompareOp, LogicalOp, MathFn, ReduceOp, UnaryOp};

use crate::coerce::{Arg, to_tensor};
use crate::constexpr::ConstExpr;
use crate::error::{Result, TraceError};
use crate::semantic::Semantic;
use crate::tensor::Tensor;
use crate::types::DType;

/// Validate a shape argument: every element must be a constexpr integer,
/// and every dimension must be positive. Single validation point for
/// `full`, `ones`, `broadcast_to`, `view`, and `reshape`.
pub fn check_shape(shape: &[ConstExpr]) -> Result<Vec<u64>> {
    check_int_list(shape, "shape")
}

fn check_int_list(values: &[ConstExpr], what: &str) -> Result<Vec<u64>> {
    values
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let d = d.as_int().map_err(|_| {
                TraceError::InvalidType(format!(
                    "{what} element {i} must have type constexpr[int], got {d}"
                ))
            })?;
            if d <= 0 {
                return Err(TraceError::InvalidType(format!(
                    "{what} element {i} must be positive, got {d}"
                )));
            }
            Ok(d as u64)
        })
        .collect()
}

/// Reduce a compile-time axis argument to a plain non-negative integer.
fn check_axis(axis: impl Into<ConstExpr>) -> Result<u32> {
    let axis = axis.into();
    let v = axis.as_int()?;
    u32::try_from(v).map_err(|_| TraceError::InvalidType(format!("axis must be non-negative, got {v}")))
}

// -----------------------
// Operator entry points
// -----------------------

/// The single binary-operation entry point. Both operands are coerced,
/// which is a no-op for operands that are already tensors.
pub fn binary(
    ex: &mut dyn Semantic,
    op: BinaryOp,
    lhs: impl Into<Arg>,
    rhs: impl Into<Arg>,
) -> Result<Tensor> {
    let lhs = to_tensor(lhs, ex.builder())?;
    let rhs = to_tensor(rhs, ex.builder())?;
    ex.binary(op, &lhs, &rhs)
}

pub fn compare(
    ex: &mut dyn Semantic,
    op: CompareOp,
    lhs: impl Into<Arg>,
    rhs: impl Into<Arg>,
) -> Result<Tensor> {
    let lhs = to_tensor(lhs, ex.builder())?;
    let rhs = to_tensor(rhs, ex.builder())?;
    ex.compare(op, &lhs, &rhs)
}

pub fn logical(
    ex: &mut dyn Semantic,
    op: LogicalOp,
    lhs: impl Into<Arg>,
    rhs: impl Into<Arg>,
) -> Result<Tensor> {
    let lhs = to_tensor(lhs, ex.builder())?;
    let rhs = to_tensor(rhs, ex.builder())?;
    ex.logical(op, &lhs, &rhs)
}

pub fn unary(ex: &mut dyn Semantic, op: UnaryOp, operand: &Tensor) -> Result<Tensor> {
    ex.unary(op, operand)
}

// -----------------------
// SPMD programming model
// -----------------------

/// Id of the current program instance along `axis` of the 3D launch
/// grid.
pub fn program_id(ex: &mut dyn Semantic, axis: impl Into<ConstExpr>) -> Result<Tensor> {
    let axis = check_axis(axis)?;
    ex.program_id(axis)
}

/// Number of program instances launched along `axis`.
pub fn num_programs(ex: &mut dyn Semantic, axis: impl Into<ConstExpr>) -> Result<Tensor> {
    let axis = check_axis(axis)?;
    ex.num_programs(axis)
}

// -----------------------
// Block initialization
// -----------------------

/// Contiguous values in the half-open interval `[start, end)`.
pub fn arange(
    ex: &mut dyn Semantic,
    start: impl Into<ConstExpr>,
    end: impl Into<ConstExpr>,
) -> Result<Tensor> {
    let start = start.into().as_int()?;
    let end = end.into().as_int()?;
    let (start, end) = (
        i64::try_from(start).map_err(|_| TraceError::NonrepresentableInteger(start))?,
        i64::try_from(end).map_err(|_| TraceError::NonrepresentableInteger(end))?,
    );
    ex.arange(start, end)
}

/// A tensor of the given shape and dtype filled with `value`.
pub fn full(
    ex: &mut dyn Semantic,
    shape: &[ConstExpr],
    value: impl Into<ConstExpr>,
    dtype: &DType,
) -> Result<Tensor> {
    let shape = check_shape(shape)?;
    let value = value.into().value();
    ex.full(&shape, value, dtype)
}

/// A tensor filled with the scalar value 1.
pub fn ones(ex: &mut dyn Semantic, shape: &[ConstExpr], dtype: &DType) -> Result<Tensor> {
    full(ex, shape, 1i64, dtype)
}

// -----------------------
// Shape manipulation
// -----------------------

/// Broadcast two tensors to a common compatible shape.
pub fn broadcast(ex: &mut dyn Semantic, lhs: &Tensor, rhs: &Tensor) -> Result<(Tensor, Tensor)> {
    ex.broadcast_values(lhs, rhs)
}

/// Broadcast a tensor to the given shape.
pub fn broadcast_to(ex: &mut dyn Semantic, src: &Tensor, shape: &[ConstExpr]) -> Result<Tensor> {
    let shape = check_shape(shape)?;
    ex.broadcast_to(src, &shape)
}

pub fn trans(ex: &mut dyn Semantic, src: &Tensor) -> Result<Tensor> {
    ex.trans(src)
}

/// Concatenate two blocks. `can_reorder` permits the semantic layer to
/// interleave elements when downstream consumers do not care about
/// order.
pub fn cat(
    ex: &mut dyn Semantic,
    lhs: &Tensor,
    rhs: &Tensor,
    can_reorder: impl Into<ConstExpr>,
) -> Result<Tensor> {
    let can_reorder = can_reorder.into().as_bool()?;
    ex.cat(lhs, rhs, can_reorder)
}

/// Same elements, different shape. Element count is conserved; element
/// order is not guaranteed.
pub fn view(ex: &mut dyn Semantic, src: &Tensor, shape: &[ConstExpr]) -> Result<Tensor> {
    let shape = check_shape(shape)?;
    ex.view(src, &shape)
}

pub fn reshape(ex: &mut dyn Semantic, src: &Tensor, shape: &[ConstExpr]) -> Result<Tensor> {
    view(ex, src, shape)
}

pub fn expand_dims(
    ex: &mut dyn Semantic,
    src: &Tensor,
    axis: impl Into<ConstExpr>,
) -> Result<Tensor> {
    let axis = check_axis(axis)?;
    ex.expand_dims(src, axis)
}

// -----------------------
// Linear algebra
// -----------------------

/// Matrix product of two two-dimensional blocks.
pub fn dot(
    ex: &mut dyn Semantic,
    lhs: &Tensor,
    rhs: &Tensor,
    allow_tf32: impl Into<ConstExpr>,
) -> Result<Tensor> {
    let allow_tf32 = allow_tf32.into().as_bool()?;
    ex.dot(lhs, rhs, allow_tf32)
}

// -----------------------
// Memory operations
// -----------------------

/// Elementwise load through `ptr`. `mask` and `other` are broadcast to
/// the pointer's shape; `other` is implicitly cast to the pointee
/// element type.
pub fn load(
    ex: &mut dyn Semantic,
    ptr: &Tensor,
    mask: Option<Arg>,
    other: Option<Arg>,
    cache_modifier: &str,
    eviction_policy: &str,
    volatile: bool,
) -> Result<Tensor> {
    let mask = mask.map(|m| to_tensor(m, ex.builder())).transpose()?;
    let other = other.map(|o| to_tensor(o, ex.builder())).transpose()?;
    ex.load(
        ptr,
        mask.as_ref(),
        other.as_ref(),
        cache_modifier,
        eviction_policy,
        volatile,
    )
}

/// Elementwise store of `value` through `ptr`.
pub fn store(
    ex: &mut dyn Semantic,
    ptr: &Tensor,
    value: impl Into<Arg>,
    mask: Option<Arg>,
) -> Result<Tensor> {
    let value = to_tensor(value, ex.builder())?;
    let mask = mask.map(|m| to_tensor(m, ex.builder())).transpose()?;
    ex.store(ptr, &value, mask.as_ref())
}

// -----------------------
// Atomics
// -----------------------

/// Atomic compare-and-swap; returns the pre-operation value.
pub fn atomic_cas(
    ex: &mut dyn Semantic,
    ptr: &Tensor,
    cmp: impl Into<Arg>,
    val: impl Into<Arg>,
) -> Result<Tensor> {
    let cmp = to_tensor(cmp, ex.builder())?;
    let val = to_tensor(val, ex.builder())?;
    ex.atomic_cas(ptr, &cmp, &val)
}

fn atomic_rmw(
    ex: &mut dyn Semantic,
    op: AtomicOp,
    ptr: &Tensor,
    val: impl Into<Arg>,
    mask: Option<Arg>,
) -> Result<Tensor> {
    let val = to_tensor(val, ex.builder())?;
    let mask = mask.map(|m| to_tensor(m, ex.builder())).transpose()?;
    ex.atomic_rmw(op, ptr, &val, mask.as_ref())
}

macro_rules! atomic_builtin {
    ($(#[$doc:meta])* $name:ident, $op:ident) => {
        $(#[$doc])*
        pub fn $name(
            ex: &mut dyn Semantic,
            ptr: &Tensor,
            val: impl Into<Arg>,
            mask: Option<Arg>,
        ) -> Result<Tensor> {
            atomic_rmw(ex, AtomicOp::$op, ptr, val, mask)
        }
    };
}

atomic_builtin!(
    /// Atomic exchange; returns the pre-operation value.
    atomic_xchg, Xchg
);
atomic_builtin!(
    /// Atomic add; returns the pre-operation value.
    atomic_add, Add
);
atomic_builtin!(
    /// Atomic max; returns the pre-operation value.
    atomic_max, Max
);
atomic_builtin!(
    /// Atomic min; returns the pre-operation value.
    atomic_min, Min
);
atomic_builtin!(
    /// Atomic and; returns the pre-operation value.
    atomic_and, And
);
atomic_builtin!(
    /// Atomic or; returns the pre-operation value.
    atomic_or, Or
);
atomic_builtin!(
    /// Atomic xor; returns the pre-operation value.
    atomic_xor, Xor
);

// -----------------------
// Conditioning
// -----------------------

/// Elementwise select. Both branches are always evaluated; shapes of
/// `lhs` and `rhs` are broadcast to the shape of `cond`.
pub fn where_(
    ex: &mut dyn Semantic,
    cond: impl Into<Arg>,
    lhs: impl Into<Arg>,
    rhs: impl Into<Arg>,
) -> Result<Tensor> {
    let cond = to_tensor(cond, ex.builder())?;
    let lhs = to_tensor(lhs, ex.builder())?;
    let rhs = to_tensor(rhs, ex.builder())?;
    ex.where_(&cond, &lhs, &rhs)
}

// -----------------------
// Math
// -----------------------

/// High 32 bits of the widened integer product.
pub fn umulhi(ex: &mut dyn Semantic, lhs: impl Into<Arg>, rhs: impl Into<Arg>) -> Result<Tensor> {
    let lhs = to_tensor(lhs, ex.builder())?;
    let rhs = to_tensor(rhs, ex.builder())?;
    ex.umulhi(&lhs, &rhs)
}

/// Floating-point division with an IEEE-rounding opt-in.
pub fn fdiv(
    ex: &mut dyn Semantic,
    lhs: &Tensor,
    rhs: &Tensor,
    ieee_rounding: impl Into<ConstExpr>,
) -> Result<Tensor> {
    let ieee_rounding = ieee_rounding.into().as_bool()?;
    ex.fdiv(lhs, rhs, ieee_rounding)
}

macro_rules! math_builtin {
    ($(#[$doc:meta])* $name:ident, $f:ident) => {
        $(#[$doc])*
        pub fn $name(ex: &mut dyn Semantic, operand: &Tensor) -> Result<Tensor> {
            ex.math(MathFn::$f, operand)
        }
    };
}

math_builtin!(
    /// Elementwise exponential.
    exp, Exp
);
math_builtin!(
    /// Elementwise natural logarithm.
    log, Log
);
math_builtin!(
    /// Elementwise cosine.
    cos, Cos
);
math_builtin!(
    /// Elementwise sine.
    sin, Sin
);
math_builtin!(
    /// Elementwise square root.
    sqrt, Sqrt
);

// -----------------------
// Reductions
// -----------------------

macro_rules! reduce_builtin {
    ($(#[$doc:meta])* $name:ident, $op:ident) => {
        $(#[$doc])*
        pub fn $name(
            ex: &mut dyn Semantic,
            input: &Tensor,
            axis: impl Into<ConstExpr>,
        ) -> Result<Tensor> {
            let axis = check_axis(axis)?;
            ex.reduce(ReduceOp::$op, input, axis)
        }
    };
}

reduce_builtin!(
    /// Maximum along `axis`; the reduced dimension is removed.
    max, Max
);
reduce_builtin!(
    /// Minimum along `axis`; the reduced dimension is removed.
    min, Min
);
reduce_builtin!(
    /// Sum along `axis`; the reduced dimension is removed.
    sum, Sum
);
reduce_builtin!(
    /// Xor-sum along `axis`; the reduced dimension is removed.
    xor_sum, XorSum
);
reduce_builtin!(
    /// Index of the maximum along `axis`.
    argmax, ArgMax
);
reduce_builtin!(
    /// Index of the minimum along `axis`.
    argmin, ArgMin
);

// -----------------------
// Casts
// -----------------------

pub fn cast(ex: &mut dyn Semantic, src: &Tensor, dtype: &DType) -> Result<Tensor> {
    ex.cast(src, dtype)
}

pub fn bitcast(ex: &mut dyn Semantic, src: &Tensor, dtype: &DType) -> Result<Tensor> {
    ex.bitcast(src, dtype)
}

// -----------------------
// Barriers and hints
// -----------------------

/// Print `prefix` followed by the formatted arguments from the device.
/// The prefix is compile-time-only and must be printable ascii.
pub fn printf(ex: &mut dyn Semantic, prefix: &str, args: &[Arg]) -> Result<Tensor> {
    if let Some(ch) = prefix
        .chars()
        .find(|c| !c.is_ascii_graphic() && !c.is_ascii_whitespace())
    {
        return Err(TraceError::InvalidType(format!(
            "printf prefix must be printable ascii, got {ch:?}"
        )));
    }
    let args = args
        .iter()
        .map(|a| to_tensor(a.clone(), ex.builder()))
        .collect::<Result<Vec<_>>>()?;
    ex.printf(prefix, &args)
}

pub fn debug_barrier(ex: &mut dyn Semantic) -> Result<()> {
    ex.debug_barrier()
}

/// Tell the compiler the values of `input` are all multiples of the
/// given values.
pub fn multiple_of(
    ex: &mut dyn Semantic,
    input: &Tensor,
    values: &[ConstExpr],
) -> Result<Tensor> {
    let values = check_int_list(values, "values")?;
    ex.multiple_of(input, &values)
}

/// Tell the compiler the first `values` elements of `input` are
/// contiguous.
pub fn max_contiguous(
    ex: &mut dyn Semantic,
    input: &Tensor,
    values: &[ConstExpr],
) -> Result<Tensor> {
    let values = check_int_list(values, "values")?;
    ex.max_contiguous(input, &values)
}
