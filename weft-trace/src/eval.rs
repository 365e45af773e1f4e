#![forbid(unsafe_code)]

use std::collections::HashMap;

use weft_core::{
    AtomicOp, BinaryOp, Builder, CompareOp, ConstVal, DType, LogicalOp, MathFn, ReduceOp, Result,
    ScalarKind, Semantic, Tensor, TraceError, UnaryOp, ValueId,
};
use weft_ir::{Const, GraphBuilder, InstKind};

/// A semantic layer that both records IR and folds element values, so a
/// traced program can be checked end to end. Types are checked and
/// result shapes computed here; instructions land in the owned
/// `GraphBuilder` in host call order.
///
/// Element values are carried as flattened `f64` vectors; memory is a
/// flat map from element-granular addresses. Pointer arithmetic is
/// element-indexed, matching what address computations lower to.
#[derive(Default, Debug)]
pub struct EvalTrace {
    builder: GraphBuilder,
    vals: HashMap<ValueId, Vec<f64>>,
    mem: HashMap<i64, f64>,
    pid: [i64; 3],
    nprog: [i64; 3],
}

// -----------------------
// Shape and dtype helpers
// -----------------------

fn dims_of(t: &Tensor) -> Vec<u64> {
    t.ty.dims()
}

fn numel_of(dims: &[u64]) -> usize {
    dims.iter().product::<u64>() as usize
}

/// Left-padded broadcast: trailing dimensions must match or be 1.
fn broadcast_dims(a: &[u64], b: &[u64]) -> Result<Vec<u64>> {
    let rank = a.len().max(b.len());
    let mut out = vec![0u64; rank];
    for k in 0..rank {
        let da = if k < rank - a.len() { 1 } else { a[k - (rank - a.len())] };
        let db = if k < rank - b.len() { 1 } else { b[k - (rank - b.len())] };
        out[k] = if da == db || db == 1 {
            da
        } else if da == 1 {
            db
        } else {
            return Err(TraceError::InvalidType(format!(
                "cannot broadcast shapes {a:?} and {b:?}"
            )));
        };
    }
    Ok(out)
}

/// Expand a flattened value vector from shape `from` to shape `to`;
/// `to` must be a broadcast of `from`.
fn expand(vals: &[f64], from: &[u64], to: &[u64]) -> Vec<f64> {
    if from == to {
        return vals.to_vec();
    }
    let pad = to.len() - from.len();
    let mut padded = vec![1u64; pad];
    padded.extend_from_slice(from);

    let mut src_strides = vec![0usize; padded.len()];
    let mut acc = 1;
    for k in (0..padded.len()).rev() {
        src_strides[k] = if padded[k] == 1 { 0 } else { acc };
        acc *= padded[k] as usize;
    }
    let mut to_strides = vec![0usize; to.len()];
    let mut acc = 1;
    for k in (0..to.len()).rev() {
        to_strides[k] = acc;
        acc *= to[k] as usize;
    }

    let total = numel_of(to);
    let mut out = Vec::with_capacity(total);
    for lin in 0..total {
        let mut src = 0;
        for k in 0..to.len() {
            let idx = (lin / to_strides[k]) % to[k] as usize;
            src += idx.min(padded[k] as usize - 1) * src_strides[k];
        }
        out.push(vals[src]);
    }
    out
}

fn int_rank(k: ScalarKind) -> u32 {
    k.primitive_bitwidth()
}

fn promote_ints(a: ScalarKind, b: ScalarKind) -> ScalarKind {
    if int_rank(a) != int_rank(b) {
        return if int_rank(a) > int_rank(b) { a } else { b };
    }
    // Same width: unsigned wins.
    if a.is_int_unsigned() { a } else { b }
}

fn promote_floats(a: ScalarKind, b: ScalarKind) -> ScalarKind {
    if a == b {
        return a;
    }
    if a.primitive_bitwidth() != b.primitive_bitwidth() {
        return if a.primitive_bitwidth() > b.primitive_bitwidth() { a } else { b };
    }
    // fp16 vs bf16: no common half type, widen.
    ScalarKind::Fp32
}

fn promote(a: ScalarKind, b: ScalarKind) -> Result<ScalarKind> {
    match (a.is_int(), b.is_int(), a.is_floating(), b.is_floating()) {
        (true, true, _, _) => Ok(promote_ints(a, b)),
        (_, _, true, true) => Ok(promote_floats(a, b)),
        (true, _, _, true) => Ok(b),
        (_, true, true, _) => Ok(a),
        _ => Err(TraceError::InvalidType(format!(
            "no common type for {} and {}",
            a.name(),
            b.name()
        ))),
    }
}

fn scalar_kind(dtype: &DType) -> Result<ScalarKind> {
    dtype
        .scalar_kind()
        .ok_or_else(|| TraceError::InvalidType(format!("expected a scalar dtype, got {dtype}")))
}

/// Result dtype from an element dtype and broadcast dims; a block unless
/// every operand was scalar.
fn mk_type(elem: DType, dims: &[u64], block: bool) -> Result<DType> {
    if block {
        DType::block(elem, dims.to_vec())
    } else {
        Ok(elem)
    }
}

fn as_i128(v: f64) -> i128 {
    v as i128
}

fn floor_div(a: f64, b: f64) -> f64 {
    (a / b).floor()
}

fn floor_rem(a: f64, b: f64) -> f64 {
    a - b * (a / b).floor()
}

impl EvalTrace {
    pub fn new() -> Self {
        Self {
            nprog: [1, 1, 1],
            ..Self::default()
        }
    }

    /// Place this trace at a grid coordinate.
    pub fn set_grid(&mut self, pid: [i64; 3], nprog: [i64; 3]) {
        self.pid = pid;
        self.nprog = nprog;
    }

    pub fn graph(&self) -> &GraphBuilder {
        &self.builder
    }

    /// Mint a pointer-typed kernel parameter over a base address.
    pub fn param_ptr(&mut self, element: DType, base: i64) -> Result<Tensor> {
        let ty = DType::pointer(element)?;
        let handle = self.builder.fresh_value();
        self.vals.insert(handle, vec![base as f64]);
        Ok(Tensor::new(handle, ty))
    }

    pub fn write_mem(&mut self, addr: i64, value: f64) {
        self.mem.insert(addr, value);
    }

    pub fn read_mem(&self, addr: i64) -> Option<f64> {
        self.mem.get(&addr).copied()
    }

    /// Flattened element values behind a tensor.
    pub fn values(&self, t: &Tensor) -> Result<Vec<f64>> {
        if let Some(v) = self.vals.get(&t.handle) {
            return Ok(v.clone());
        }
        let c = self.builder.const_of(t.handle).ok_or_else(|| {
            TraceError::InvalidType(format!("no value recorded for {t}"))
        })?;
        let v = match c {
            Const::Int1(b) => b as i64 as f64,
            Const::Int32(v) => {
                if t.dtype == DType::UINT32 {
                    (v as u32) as f64
                } else {
                    v as f64
                }
            }
            Const::Int64(v) => {
                if t.dtype == DType::UINT64 {
                    (v as u64) as f64
                } else {
                    v as f64
                }
            }
            Const::Fp32(v) => v as f64,
        };
        Ok(vec![v])
    }

    fn record(&mut self, kind: InstKind, ty: DType, elems: Vec<f64>) -> Tensor {
        let dest = self.builder.emit(kind);
        self.vals.insert(dest, elems);
        Tensor::new(dest, ty)
    }

    /// Broadcast-and-fetch both operand value vectors.
    fn operands(&self, lhs: &Tensor, rhs: &Tensor) -> Result<(Vec<u64>, Vec<f64>, Vec<f64>)> {
        let (ld, rd) = (dims_of(lhs), dims_of(rhs));
        let dims = broadcast_dims(&ld, &rd)?;
        let lv = expand(&self.values(lhs)?, &ld, &dims);
        let rv = expand(&self.values(rhs)?, &rd, &dims);
        Ok((dims, lv, rv))
    }

    /// Pointee dtype of a pointer or block-of-pointer tensor.
    fn pointee(ptr: &Tensor) -> Result<DType> {
        match ptr.dtype {
            DType::Pointer(ref p) => Ok((*p.element).clone()),
            _ => Err(TraceError::InvalidType(format!(
                "expected a pointer or block of pointers, got {}",
                ptr.ty
            ))),
        }
    }

    /// Convert values for storage in `elem`: integers truncate, int1
    /// collapses to 0/1.
    fn convert(vals: Vec<f64>, elem: &DType) -> Vec<f64> {
        match elem.scalar_kind() {
            Some(k) if k.is_bool() => vals.into_iter().map(|v| (v != 0.0) as i64 as f64).collect(),
            Some(k) if k.is_int() => vals.into_iter().map(f64::trunc).collect(),
            _ => vals,
        }
    }

    /// Fetch a tensor's values broadcast to exactly `dims`. Fails when
    /// `dims` is not a broadcast of the tensor's own shape.
    fn fit(&self, t: &Tensor, dims: &[u64]) -> Result<Vec<f64>> {
        let td = dims_of(t);
        if broadcast_dims(&td, dims)? != dims {
            return Err(TraceError::InvalidType(format!(
                "cannot broadcast {} to shape {dims:?}",
                t.ty
            )));
        }
        Ok(expand(&self.values(t)?, &td, dims))
    }

    /// Broadcast an optional mask to `dims`, checking its element type.
    fn mask_values(&self, mask: Option<&Tensor>, dims: &[u64]) -> Result<Vec<f64>> {
        match mask {
            Some(m) => {
                if !m.dtype.is_bool() {
                    return Err(TraceError::InvalidType(format!(
                        "mask must have type int1, got {}",
                        m.dtype
                    )));
                }
                self.fit(m, dims)
            }
            None => Ok(vec![1.0; numel_of(dims)]),
        }
    }
}

impl Semantic for EvalTrace {
    fn builder(&mut self) -> &mut dyn Builder {
        &mut self.builder
    }

    fn binary(&mut self, op: BinaryOp, lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
        let block = lhs.ty.is_block() || rhs.ty.is_block();
        let kind = InstKind::Binary {
            op,
            lhs: lhs.handle,
            rhs: rhs.handle,
        };

        // Pointer arithmetic: pointer +/- integer offset.
        if lhs.dtype.is_ptr() || rhs.dtype.is_ptr() {
            let (ptr, off) = if lhs.dtype.is_ptr() { (lhs, rhs) } else { (rhs, lhs) };
            let valid = match op {
                BinaryOp::Add => !off.dtype.is_ptr(),
                BinaryOp::Sub => lhs.dtype.is_ptr() && !rhs.dtype.is_ptr(),
                _ => false,
            };
            if !valid || !off.dtype.is_int() {
                return Err(TraceError::InvalidType(format!(
                    "cannot apply {op:?} to {} and {}",
                    lhs.ty, rhs.ty
                )));
            }
            let (dims, lv, rv) = self.operands(lhs, rhs)?;
            let sign = if op == BinaryOp::Sub { -1.0 } else { 1.0 };
            let (pv, ov) = if lhs.dtype.is_ptr() { (lv, rv) } else { (rv, lv) };
            let out = pv.iter().zip(&ov).map(|(p, o)| p + sign * o).collect();
            let ty = mk_type(ptr.dtype.clone(), &dims, block)?;
            return Ok(self.record(kind, ty, out));
        }

        let (lk, rk) = (scalar_kind(&lhs.dtype)?, scalar_kind(&rhs.dtype)?);
        let elem = match op {
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor | BinaryOp::Shl | BinaryOp::Shr
            | BinaryOp::FloorDiv => {
                if !lk.is_int() || !rk.is_int() {
                    return Err(TraceError::InvalidType(format!(
                        "{op:?} requires integer operands, got {} and {}",
                        lk.name(),
                        rk.name()
                    )));
                }
                promote_ints(lk, rk)
            }
            BinaryOp::TrueDiv => {
                let k = promote(lk, rk)?;
                if k.is_int() { ScalarKind::Fp32 } else { k }
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Rem => promote(lk, rk)?,
        };

        let (dims, lv, rv) = self.operands(lhs, rhs)?;
        let out: Vec<f64> = lv
            .iter()
            .zip(&rv)
            .map(|(&a, &b)| match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::TrueDiv => a / b,
                BinaryOp::FloorDiv => floor_div(a, b),
                BinaryOp::Rem => floor_rem(a, b),
                BinaryOp::And => (as_i128(a) & as_i128(b)) as f64,
                BinaryOp::Or => (as_i128(a) | as_i128(b)) as f64,
                BinaryOp::Xor => (as_i128(a) ^ as_i128(b)) as f64,
                BinaryOp::Shl => (as_i128(a) << as_i128(b)) as f64,
                BinaryOp::Shr => (as_i128(a) >> as_i128(b)) as f64,
            })
            .collect();
        let ty = mk_type(DType::Scalar(elem), &dims, block)?;
        Ok(self.record(kind, ty, out))
    }

    fn compare(&mut self, op: CompareOp, lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
        let block = lhs.ty.is_block() || rhs.ty.is_block();
        // Promotion is only a compatibility check here; the result is
        // always int1. Two pointers compare directly, a pointer never
        // compares against a plain scalar.
        match (lhs.dtype.is_ptr(), rhs.dtype.is_ptr()) {
            (true, true) => {}
            (false, false) => {
                promote(scalar_kind(&lhs.dtype)?, scalar_kind(&rhs.dtype)?)?;
            }
            _ => {
                return Err(TraceError::InvalidType(format!(
                    "cannot compare {} with {}",
                    lhs.dtype, rhs.dtype
                )));
            }
        }
        let (dims, lv, rv) = self.operands(lhs, rhs)?;
        let out = lv
            .iter()
            .zip(&rv)
            .map(|(&a, &b)| {
                let truth = match op {
                    CompareOp::Lt => a < b,
                    CompareOp::Le => a <= b,
                    CompareOp::Gt => a > b,
                    CompareOp::Ge => a >= b,
                    CompareOp::Eq => a == b,
                    CompareOp::Ne => a != b,
                };
                truth as i64 as f64
            })
            .collect();
        let ty = mk_type(DType::INT1, &dims, block)?;
        Ok(self.record(
            InstKind::Compare {
                op,
                lhs: lhs.handle,
                rhs: rhs.handle,
            },
            ty,
            out,
        ))
    }

    fn logical(&mut self, op: LogicalOp, lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
        if !lhs.dtype.is_int() || !rhs.dtype.is_int() {
            return Err(TraceError::InvalidType(format!(
                "logical {op:?} requires integer operands, got {} and {}",
                lhs.dtype, rhs.dtype
            )));
        }
        let block = lhs.ty.is_block() || rhs.ty.is_block();
        let (dims, lv, rv) = self.operands(lhs, rhs)?;
        let out = lv
            .iter()
            .zip(&rv)
            .map(|(&a, &b)| {
                let truth = match op {
                    LogicalOp::And => a != 0.0 && b != 0.0,
                    LogicalOp::Or => a != 0.0 || b != 0.0,
                };
                truth as i64 as f64
            })
            .collect();
        let ty = mk_type(DType::INT1, &dims, block)?;
        Ok(self.record(
            InstKind::Logical {
                op,
                lhs: lhs.handle,
                rhs: rhs.handle,
            },
            ty,
            out,
        ))
    }

    fn unary(&mut self, op: UnaryOp, operand: &Tensor) -> Result<Tensor> {
        let k = scalar_kind(&operand.dtype)?;
        let vals = self.values(operand)?;
        let out: Vec<f64> = match op {
            UnaryOp::Neg => {
                if !k.is_int() && !k.is_floating() {
                    return Err(TraceError::InvalidType(format!(
                        "cannot negate {}",
                        operand.dtype
                    )));
                }
                vals.into_iter().map(|v| -v).collect()
            }
            UnaryOp::Not => {
                if !k.is_int() {
                    return Err(TraceError::InvalidType(format!(
                        "cannot invert {}",
                        operand.dtype
                    )));
                }
                if k.is_bool() {
                    vals.into_iter().map(|v| (v == 0.0) as i64 as f64).collect()
                } else {
                    vals.into_iter().map(|v| !as_i128(v) as f64).collect()
                }
            }
        };
        Ok(self.record(
            InstKind::Unary {
                op,
                operand: operand.handle,
            },
            operand.ty.clone(),
            out,
        ))
    }

    fn program_id(&mut self, axis: u32) -> Result<Tensor> {
        if axis >= 3 {
            return Err(TraceError::InvalidType(format!(
                "launch grid axis must be 0, 1, or 2, got {axis}"
            )));
        }
        let v = self.pid[axis as usize] as f64;
        Ok(self.record(InstKind::ProgramId { axis }, DType::INT32, vec![v]))
    }

    fn num_programs(&mut self, axis: u32) -> Result<Tensor> {
        if axis >= 3 {
            return Err(TraceError::InvalidType(format!(
                "launch grid axis must be 0, 1, or 2, got {axis}"
            )));
        }
        let v = self.nprog[axis as usize] as f64;
        Ok(self.record(InstKind::NumPrograms { axis }, DType::INT32, vec![v]))
    }

    fn arange(&mut self, start: i64, end: i64) -> Result<Tensor> {
        if end <= start {
            return Err(TraceError::InvalidType(format!(
                "arange requires start < end, got [{start}, {end})"
            )));
        }
        let ty = DType::block(DType::INT32, vec![(end - start) as u64])?;
        let out = (start..end).map(|v| v as f64).collect();
        Ok(self.record(InstKind::Arange { start, end }, ty, out))
    }

    fn full(&mut self, shape: &[u64], value: ConstVal, dtype: &DType) -> Result<Tensor> {
        let k = scalar_kind(dtype)?;
        let raw = match value {
            ConstVal::Int(v) => v as f64,
            ConstVal::Float(v) => v,
            ConstVal::Bool(v) => v as i64 as f64,
        };
        let ty = DType::block(dtype.clone(), shape.to_vec())?;
        let payload = if k.is_bool() {
            Const::Int1(raw != 0.0)
        } else if k.is_int() {
            if k.primitive_bitwidth() <= 32 {
                Const::Int32(raw as i32)
            } else {
                Const::Int64(raw as i64)
            }
        } else {
            Const::Fp32(raw as f32)
        };
        let ir_ty = ty.to_ir(&mut self.builder)?;
        let out = Self::convert(vec![raw; numel_of(shape)], dtype);
        Ok(self.record(
            InstKind::Full {
                shape: shape.to_vec(),
                value: payload,
                ty: ir_ty,
            },
            ty,
            out,
        ))
    }

    fn broadcast_values(&mut self, lhs: &Tensor, rhs: &Tensor) -> Result<(Tensor, Tensor)> {
        let dims = broadcast_dims(&dims_of(lhs), &dims_of(rhs))?;
        let l = if dims_of(lhs) == dims { lhs.clone() } else { self.broadcast_to(lhs, &dims)? };
        let r = if dims_of(rhs) == dims { rhs.clone() } else { self.broadcast_to(rhs, &dims)? };
        Ok((l, r))
    }

    fn broadcast_to(&mut self, src: &Tensor, shape: &[u64]) -> Result<Tensor> {
        let sd = dims_of(src);
        let target = broadcast_dims(&sd, shape)?;
        if target != shape {
            return Err(TraceError::InvalidType(format!(
                "cannot broadcast {} to shape {shape:?}",
                src.ty
            )));
        }
        let elem = src.dtype.clone();
        let out = expand(&self.values(src)?, &sd, shape);
        let ty = DType::block(elem, shape.to_vec())?;
        Ok(self.record(
            InstKind::Broadcast {
                src: src.handle,
                shape: shape.to_vec(),
            },
            ty,
            out,
        ))
    }

    fn trans(&mut self, src: &Tensor) -> Result<Tensor> {
        let d = dims_of(src);
        if !src.ty.is_block() || d.len() != 2 {
            return Err(TraceError::InvalidType(format!(
                "trans requires a two-dimensional block, got {}",
                src.ty
            )));
        }
        let (rows, cols) = (d[0] as usize, d[1] as usize);
        let vals = self.values(src)?;
        let mut out = vec![0.0; vals.len()];
        for r in 0..rows {
            for c in 0..cols {
                out[c * rows + r] = vals[r * cols + c];
            }
        }
        let ty = DType::block(src.dtype.clone(), vec![d[1], d[0]])?;
        Ok(self.record(InstKind::Trans { src: src.handle }, ty, out))
    }

    fn cat(&mut self, lhs: &Tensor, rhs: &Tensor, can_reorder: bool) -> Result<Tensor> {
        let (ld, rd) = (dims_of(lhs), dims_of(rhs));
        if !lhs.ty.is_block() || !rhs.ty.is_block() || ld.len() != rd.len() || ld[1..] != rd[1..] {
            return Err(TraceError::InvalidType(format!(
                "cat requires blocks matching past the leading dimension, got {} and {}",
                lhs.ty, rhs.ty
            )));
        }
        if lhs.dtype != rhs.dtype {
            return Err(TraceError::InvalidType(format!(
                "cat requires matching element types, got {} and {}",
                lhs.dtype, rhs.dtype
            )));
        }
        let mut dims = ld.clone();
        dims[0] += rd[0];
        let mut out = self.values(lhs)?;
        out.extend(self.values(rhs)?);
        let ty = DType::block(lhs.dtype.clone(), dims)?;
        Ok(self.record(
            InstKind::Cat {
                lhs: lhs.handle,
                rhs: rhs.handle,
                can_reorder,
            },
            ty,
            out,
        ))
    }

    fn view(&mut self, src: &Tensor, shape: &[u64]) -> Result<Tensor> {
        let ty = DType::block(src.dtype.clone(), shape.to_vec())?;
        let src_numel = numel_of(&dims_of(src));
        if numel_of(shape) != src_numel {
            return Err(TraceError::InvalidType(format!(
                "view cannot change element count: {} has {src_numel} elements, shape {shape:?} wants {}",
                src.ty,
                numel_of(shape)
            )));
        }
        // Element order is not part of the contract; this implementation
        // happens to keep it.
        let out = self.values(src)?;
        Ok(self.record(
            InstKind::View {
                src: src.handle,
                shape: shape.to_vec(),
            },
            ty,
            out,
        ))
    }

    fn expand_dims(&mut self, src: &Tensor, axis: u32) -> Result<Tensor> {
        let mut dims = dims_of(src);
        if axis as usize > dims.len() {
            return Err(TraceError::InvalidType(format!(
                "cannot insert axis {axis} into shape {dims:?}"
            )));
        }
        dims.insert(axis as usize, 1);
        let out = self.values(src)?;
        let ty = DType::block(src.dtype.clone(), dims)?;
        Ok(self.record(
            InstKind::ExpandDims {
                src: src.handle,
                axis,
            },
            ty,
            out,
        ))
    }

    fn dot(&mut self, lhs: &Tensor, rhs: &Tensor, allow_tf32: bool) -> Result<Tensor> {
        let (ld, rd) = (dims_of(lhs), dims_of(rhs));
        if !lhs.ty.is_block() || !rhs.ty.is_block() || ld.len() != 2 || rd.len() != 2 {
            return Err(TraceError::InvalidType(
                "dot requires two-dimensional blocks".into(),
            ));
        }
        if ld[1] != rd[0] {
            return Err(TraceError::InvalidType(format!(
                "dot inner dimensions do not match: {ld:?} and {rd:?}"
            )));
        }
        if !lhs.dtype.is_standard_floating() || !rhs.dtype.is_standard_floating() {
            return Err(TraceError::InvalidType(format!(
                "dot requires floating operands, got {} and {}",
                lhs.dtype, rhs.dtype
            )));
        }
        let (m, k, n) = (ld[0] as usize, ld[1] as usize, rd[1] as usize);
        let (lv, rv) = (self.values(lhs)?, self.values(rhs)?);
        let mut out = vec![0.0; m * n];
        for r in 0..m {
            for c in 0..n {
                out[r * n + c] = (0..k).map(|x| lv[r * k + x] * rv[x * n + c]).sum();
            }
        }
        // Accumulation is single precision.
        let ty = DType::block(DType::FP32, vec![ld[0], rd[1]])?;
        Ok(self.record(
            InstKind::Dot {
                lhs: lhs.handle,
                rhs: rhs.handle,
                allow_tf32,
            },
            ty,
            out,
        ))
    }

    fn load(
        &mut self,
        ptr: &Tensor,
        mask: Option<&Tensor>,
        other: Option<&Tensor>,
        cache_modifier: &str,
        eviction_policy: &str,
        volatile: bool,
    ) -> Result<Tensor> {
        let elem = Self::pointee(ptr)?;
        let dims = dims_of(ptr);
        let addrs = self.values(ptr)?;
        let mask_v = self.mask_values(mask, &dims)?;
        let other_v = match other {
            Some(o) => Self::convert(self.fit(o, &dims)?, &elem),
            None => vec![0.0; numel_of(&dims)],
        };
        let out = addrs
            .iter()
            .zip(mask_v.iter().zip(&other_v))
            .map(|(&a, (&m, &o))| {
                if m != 0.0 {
                    self.mem.get(&(a as i64)).copied().unwrap_or(0.0)
                } else {
                    o
                }
            })
            .collect();
        let ty = mk_type(elem, &dims, ptr.ty.is_block())?;
        Ok(self.record(
            InstKind::Load {
                ptr: ptr.handle,
                mask: mask.map(|m| m.handle),
                other: other.map(|o| o.handle),
                cache_modifier: cache_modifier.to_string(),
                eviction_policy: eviction_policy.to_string(),
                volatile,
            },
            ty,
            out,
        ))
    }

    fn store(&mut self, ptr: &Tensor, value: &Tensor, mask: Option<&Tensor>) -> Result<Tensor> {
        let elem = Self::pointee(ptr)?;
        let dims = dims_of(ptr);
        let addrs = self.values(ptr)?;
        let vals = Self::convert(self.fit(value, &dims)?, &elem);
        let mask_v = self.mask_values(mask, &dims)?;
        for ((&a, &v), &m) in addrs.iter().zip(&vals).zip(&mask_v) {
            if m != 0.0 {
                self.mem.insert(a as i64, v);
            }
        }
        let kind = InstKind::Store {
            ptr: ptr.handle,
            value: value.handle,
            mask: mask.map(|m| m.handle),
        };
        Ok(self.record(kind, DType::VOID, vec![]))
    }

    fn atomic_cas(&mut self, ptr: &Tensor, cmp: &Tensor, val: &Tensor) -> Result<Tensor> {
        let elem = Self::pointee(ptr)?;
        let dims = dims_of(ptr);
        let addrs = self.values(ptr)?;
        let cmp_v = Self::convert(self.fit(cmp, &dims)?, &elem);
        let val_v = Self::convert(self.fit(val, &dims)?, &elem);
        let mut out = Vec::with_capacity(addrs.len());
        for ((&a, &c), &v) in addrs.iter().zip(&cmp_v).zip(&val_v) {
            let old = self.mem.get(&(a as i64)).copied().unwrap_or(0.0);
            if old == c {
                self.mem.insert(a as i64, v);
            }
            out.push(old);
        }
        let ty = mk_type(elem, &dims, ptr.ty.is_block())?;
        Ok(self.record(
            InstKind::AtomicCas {
                ptr: ptr.handle,
                cmp: cmp.handle,
                val: val.handle,
            },
            ty,
            out,
        ))
    }

    fn atomic_rmw(
        &mut self,
        op: AtomicOp,
        ptr: &Tensor,
        val: &Tensor,
        mask: Option<&Tensor>,
    ) -> Result<Tensor> {
        let elem = Self::pointee(ptr)?;
        let dims = dims_of(ptr);
        let addrs = self.values(ptr)?;
        let val_v = Self::convert(self.fit(val, &dims)?, &elem);
        let mask_v = self.mask_values(mask, &dims)?;
        let mut out = Vec::with_capacity(addrs.len());
        for ((&a, &v), &m) in addrs.iter().zip(&val_v).zip(&mask_v) {
            let old = self.mem.get(&(a as i64)).copied().unwrap_or(0.0);
            out.push(old);
            if m == 0.0 {
                continue;
            }
            let new = match op {
                AtomicOp::Xchg => v,
                AtomicOp::Add => old + v,
                AtomicOp::Max => old.max(v),
                AtomicOp::Min => old.min(v),
                AtomicOp::And => (as_i128(old) & as_i128(v)) as f64,
                AtomicOp::Or => (as_i128(old) | as_i128(v)) as f64,
                AtomicOp::Xor => (as_i128(old) ^ as_i128(v)) as f64,
            };
            self.mem.insert(a as i64, new);
        }
        let ty = mk_type(elem, &dims, ptr.ty.is_block())?;
        Ok(self.record(
            InstKind::AtomicRmw {
                op,
                ptr: ptr.handle,
                val: val.handle,
                mask: mask.map(|m| m.handle),
            },
            ty,
            out,
        ))
    }

    fn where_(&mut self, cond: &Tensor, lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
        if !cond.dtype.is_bool() {
            return Err(TraceError::InvalidType(format!(
                "where condition must have type int1, got {}",
                cond.dtype
            )));
        }
        let elem = if lhs.dtype.is_ptr() || rhs.dtype.is_ptr() {
            if lhs.dtype != rhs.dtype {
                return Err(TraceError::InvalidType(format!(
                    "where branches disagree: {} and {}",
                    lhs.ty, rhs.ty
                )));
            }
            lhs.dtype.clone()
        } else {
            DType::Scalar(promote(scalar_kind(&lhs.dtype)?, scalar_kind(&rhs.dtype)?)?)
        };
        let block = cond.ty.is_block() || lhs.ty.is_block() || rhs.ty.is_block();
        let (cd, ld, rd) = (dims_of(cond), dims_of(lhs), dims_of(rhs));
        let dims = broadcast_dims(&broadcast_dims(&cd, &ld)?, &rd)?;
        let cv = expand(&self.values(cond)?, &cd, &dims);
        let lv = expand(&self.values(lhs)?, &ld, &dims);
        let rv = expand(&self.values(rhs)?, &rd, &dims);
        let out = cv
            .iter()
            .zip(lv.iter().zip(&rv))
            .map(|(&c, (&l, &r))| if c != 0.0 { l } else { r })
            .collect();
        let ty = mk_type(elem, &dims, block)?;
        Ok(self.record(
            InstKind::Select {
                cond: cond.handle,
                lhs: lhs.handle,
                rhs: rhs.handle,
            },
            ty,
            out,
        ))
    }

    fn umulhi(&mut self, lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
        let (lk, rk) = (scalar_kind(&lhs.dtype)?, scalar_kind(&rhs.dtype)?);
        if !lk.is_int() || !rk.is_int() {
            return Err(TraceError::InvalidType(format!(
                "umulhi requires integer operands, got {} and {}",
                lhs.dtype, rhs.dtype
            )));
        }
        let elem = promote_ints(lk, rk);
        let bits = elem.primitive_bitwidth();
        let block = lhs.ty.is_block() || rhs.ty.is_block();
        let (dims, lv, rv) = self.operands(lhs, rhs)?;
        let out = lv
            .iter()
            .zip(&rv)
            .map(|(&a, &b)| ((as_i128(a) * as_i128(b)) >> bits) as f64)
            .collect();
        let ty = mk_type(DType::Scalar(elem), &dims, block)?;
        Ok(self.record(
            InstKind::Umulhi {
                lhs: lhs.handle,
                rhs: rhs.handle,
            },
            ty,
            out,
        ))
    }

    fn fdiv(&mut self, lhs: &Tensor, rhs: &Tensor, ieee_rounding: bool) -> Result<Tensor> {
        if !lhs.dtype.is_floating() || !rhs.dtype.is_floating() {
            return Err(TraceError::InvalidType(format!(
                "fdiv requires floating operands, got {} and {}",
                lhs.dtype, rhs.dtype
            )));
        }
        let elem = promote_floats(
            scalar_kind(&lhs.dtype)?,
            scalar_kind(&rhs.dtype)?,
        );
        let block = lhs.ty.is_block() || rhs.ty.is_block();
        let (dims, lv, rv) = self.operands(lhs, rhs)?;
        let out = lv.iter().zip(&rv).map(|(&a, &b)| a / b).collect();
        let ty = mk_type(DType::Scalar(elem), &dims, block)?;
        Ok(self.record(
            InstKind::Fdiv {
                lhs: lhs.handle,
                rhs: rhs.handle,
                ieee_rounding,
            },
            ty,
            out,
        ))
    }

    fn math(&mut self, f: MathFn, operand: &Tensor) -> Result<Tensor> {
        let k = scalar_kind(&operand.dtype)?;
        // Integer operands are promoted to single precision.
        let elem = if k.is_int() { ScalarKind::Fp32 } else if k.is_floating() { k } else {
            return Err(TraceError::InvalidType(format!(
                "math function on {}",
                operand.dtype
            )));
        };
        let out = self
            .values(operand)?
            .into_iter()
            .map(|v| match f {
                MathFn::Exp => v.exp(),
                MathFn::Log => v.ln(),
                MathFn::Cos => v.cos(),
                MathFn::Sin => v.sin(),
                MathFn::Sqrt => v.sqrt(),
            })
            .collect();
        let dims = dims_of(operand);
        let ty = mk_type(DType::Scalar(elem), &dims, operand.ty.is_block())?;
        Ok(self.record(
            InstKind::Math {
                f,
                operand: operand.handle,
            },
            ty,
            out,
        ))
    }

    fn reduce(&mut self, op: ReduceOp, src: &Tensor, axis: u32) -> Result<Tensor> {
        let dims = dims_of(src);
        if !src.ty.is_block() {
            return Err(TraceError::InvalidType(format!(
                "reduction over a non-block value {}",
                src.ty
            )));
        }
        if axis as usize >= dims.len() {
            return Err(TraceError::InvalidType(format!(
                "reduction axis {axis} out of range for shape {dims:?}"
            )));
        }
        let k = scalar_kind(&src.dtype)?;
        if op == ReduceOp::XorSum && !k.is_int() {
            return Err(TraceError::InvalidType(format!(
                "xor_sum requires an integer element type, got {}",
                src.dtype
            )));
        }

        let axis = axis as usize;
        let outer: usize = dims[..axis].iter().product::<u64>() as usize;
        let len = dims[axis] as usize;
        let inner: usize = dims[axis + 1..].iter().product::<u64>() as usize;
        let vals = self.values(src)?;
        let mut out = Vec::with_capacity(outer * inner);
        for o in 0..outer {
            for i in 0..inner {
                let lane = |j: usize| vals[(o * len + j) * inner + i];
                let folded = match op {
                    ReduceOp::Sum => (0..len).map(lane).sum(),
                    ReduceOp::Max => (0..len).map(lane).fold(f64::NEG_INFINITY, f64::max),
                    ReduceOp::Min => (0..len).map(lane).fold(f64::INFINITY, f64::min),
                    ReduceOp::XorSum => {
                        (0..len).map(lane).fold(0i128, |acc, v| acc ^ as_i128(v)) as f64
                    }
                    ReduceOp::ArgMax => {
                        let mut best = 0;
                        for j in 1..len {
                            if lane(j) > lane(best) {
                                best = j;
                            }
                        }
                        best as f64
                    }
                    ReduceOp::ArgMin => {
                        let mut best = 0;
                        for j in 1..len {
                            if lane(j) < lane(best) {
                                best = j;
                            }
                        }
                        best as f64
                    }
                };
                out.push(folded);
            }
        }

        let elem = match op {
            ReduceOp::ArgMax | ReduceOp::ArgMin => DType::INT32,
            _ => src.dtype.clone(),
        };
        let mut kept: Vec<u64> = dims.clone();
        kept.remove(axis);
        let ty = if kept.is_empty() { elem } else { DType::block(elem, kept)? };
        Ok(self.record(
            InstKind::Reduce {
                op,
                src: src.handle,
                axis: axis as u32,
            },
            ty,
            out,
        ))
    }

    fn cast(&mut self, src: &Tensor, dtype: &DType) -> Result<Tensor> {
        if dtype.is_block() {
            return Err(TraceError::InvalidType(
                "cast target must be a scalar or pointer dtype".into(),
            ));
        }
        let dims = dims_of(src);
        let ty = mk_type(dtype.clone(), &dims, src.ty.is_block())?;
        let ir_ty = ty.to_ir(&mut self.builder)?;
        let out = Self::convert(self.values(src)?, dtype);
        Ok(self.record(
            InstKind::Cast {
                src: src.handle,
                ty: ir_ty,
            },
            ty,
            out,
        ))
    }

    fn bitcast(&mut self, src: &Tensor, dtype: &DType) -> Result<Tensor> {
        if dtype.is_block() {
            return Err(TraceError::InvalidType(
                "bitcast target must be a scalar or pointer dtype".into(),
            ));
        }
        let src_bits = src.dtype.primitive_bitwidth();
        let dst_bits = dtype.primitive_bitwidth();
        match (src_bits, dst_bits) {
            (Some(a), Some(b)) if a == b => {}
            _ => {
                return Err(TraceError::Unsupported(format!(
                    "cannot bitcast {} to {dtype}",
                    src.dtype
                )));
            }
        }
        let dims = dims_of(src);
        let ty = mk_type(dtype.clone(), &dims, src.ty.is_block())?;
        let ir_ty = ty.to_ir(&mut self.builder)?;
        // Reinterpretation of the payload is not modeled; values carry
        // over unchanged.
        let out = self.values(src)?;
        Ok(self.record(
            InstKind::Bitcast {
                src: src.handle,
                ty: ir_ty,
            },
            ty,
            out,
        ))
    }

    fn printf(&mut self, prefix: &str, args: &[Tensor]) -> Result<Tensor> {
        let kind = InstKind::Printf {
            prefix: prefix.to_string(),
            args: args.iter().map(|a| a.handle).collect(),
        };
        Ok(self.record(kind, DType::VOID, vec![]))
    }

    fn debug_barrier(&mut self) -> Result<()> {
        self.builder.emit(InstKind::Barrier);
        Ok(())
    }

    fn multiple_of(&mut self, src: &Tensor, values: &[u64]) -> Result<Tensor> {
        let out = self.values(src)?;
        Ok(self.record(
            InstKind::MultipleOf {
                src: src.handle,
                values: values.to_vec(),
            },
            src.ty.clone(),
            out,
        ))
    }

    fn max_contiguous(&mut self, src: &Tensor, values: &[u64]) -> Result<Tensor> {
        let out = self.values(src)?;
        Ok(self.record(
            InstKind::MaxContiguous {
                src: src.handle,
                values: values.to_vec(),
            },
            src.ty.clone(),
            out,
        ))
    }
}
