#![forbid(unsafe_code)]

use weft_ir::{AtomicOp, BinaryOp, Builder, CompareOp, LogicalOp, MathFn, ReduceOp, UnaryOp};

use crate::constexpr::ConstVal;
use crate::error::Result;
use crate::tensor::Tensor;
use crate::types::DType;

/// The semantic collaborator: type/shape checking and IR emission for
/// every builtin primitive. The builtin library hands it already-coerced
/// tensors and already-reduced compile-time scalars and trusts the
/// results.
///
/// Implementations own the builder; `builder` exposes it so coercion and
/// dtype conversion can mint constants and types against the same trace.
pub trait Semantic {
    fn builder(&mut self) -> &mut dyn Builder;

    // Elementwise operators. Operand shapes must be broadcast-compatible;
    // comparisons and logical operators produce int1 elements.
    fn binary(&mut self, op: BinaryOp, lhs: &Tensor, rhs: &Tensor) -> Result<Tensor>;
    fn compare(&mut self, op: CompareOp, lhs: &Tensor, rhs: &Tensor) -> Result<Tensor>;
    fn logical(&mut self, op: LogicalOp, lhs: &Tensor, rhs: &Tensor) -> Result<Tensor>;
    fn unary(&mut self, op: UnaryOp, operand: &Tensor) -> Result<Tensor>;

    // SPMD grid.
    fn program_id(&mut self, axis: u32) -> Result<Tensor>;
    fn num_programs(&mut self, axis: u32) -> Result<Tensor>;

    // Block initialization.
    fn arange(&mut self, start: i64, end: i64) -> Result<Tensor>;
    fn full(&mut self, shape: &[u64], value: ConstVal, dtype: &DType) -> Result<Tensor>;

    // Shape manipulation. `view` conserves element count but not element
    // order; `cat` with `can_reorder` may interleave inputs.
    fn broadcast_values(&mut self, lhs: &Tensor, rhs: &Tensor) -> Result<(Tensor, Tensor)>;
    fn broadcast_to(&mut self, src: &Tensor, shape: &[u64]) -> Result<Tensor>;
    fn trans(&mut self, src: &Tensor) -> Result<Tensor>;
    fn cat(&mut self, lhs: &Tensor, rhs: &Tensor, can_reorder: bool) -> Result<Tensor>;
    fn view(&mut self, src: &Tensor, shape: &[u64]) -> Result<Tensor>;
    fn expand_dims(&mut self, src: &Tensor, axis: u32) -> Result<Tensor>;

    // Linear algebra.
    fn dot(&mut self, lhs: &Tensor, rhs: &Tensor, allow_tf32: bool) -> Result<Tensor>;

    // Memory. `mask` and `other`/`value` are broadcast to the pointer's
    // shape; `other`/`value` are implicitly cast to the pointee type.
    #[allow(clippy::too_many_arguments)]
    fn load(
        &mut self,
        ptr: &Tensor,
        mask: Option<&Tensor>,
        other: Option<&Tensor>,
        cache_modifier: &str,
        eviction_policy: &str,
        volatile: bool,
    ) -> Result<Tensor>;
    fn store(&mut self, ptr: &Tensor, value: &Tensor, mask: Option<&Tensor>) -> Result<Tensor>;

    // Atomics return the pre-operation value at the location.
    fn atomic_cas(&mut self, ptr: &Tensor, cmp: &Tensor, val: &Tensor) -> Result<Tensor>;
    fn atomic_rmw(
        &mut self,
        op: AtomicOp,
        ptr: &Tensor,
        val: &Tensor,
        mask: Option<&Tensor>,
    ) -> Result<Tensor>;

    // Conditioning.
    fn where_(&mut self, cond: &Tensor, lhs: &Tensor, rhs: &Tensor) -> Result<Tensor>;

    // Math.
    fn umulhi(&mut self, lhs: &Tensor, rhs: &Tensor) -> Result<Tensor>;
    fn fdiv(&mut self, lhs: &Tensor, rhs: &Tensor, ieee_rounding: bool) -> Result<Tensor>;
    fn math(&mut self, f: MathFn, operand: &Tensor) -> Result<Tensor>;

    // Reductions remove the reduced dimension.
    fn reduce(&mut self, op: ReduceOp, src: &Tensor, axis: u32) -> Result<Tensor>;

    // Casts.
    fn cast(&mut self, src: &Tensor, dtype: &DType) -> Result<Tensor>;
    fn bitcast(&mut self, src: &Tensor, dtype: &DType) -> Result<Tensor>;

    // Debugging. `printf` takes an already-validated ascii prefix and
    // already-coerced arguments.
    fn printf(&mut self, prefix: &str, args: &[Tensor]) -> Result<Tensor>;

    // Scheduling hints and barriers.
    fn debug_barrier(&mut self) -> Result<()>;
    fn multiple_of(&mut self, src: &Tensor, values: &[u64]) -> Result<Tensor>;
    fn max_contiguous(&mut self, src: &Tensor, values: &[u64]) -> Result<Tensor>;
}
