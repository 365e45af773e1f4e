#![forbid(unsafe_code)]

use std::fmt;

use weft_ir::{Builder, TypeId};

use crate::error::{Result, TraceError};

/// The fixed set of scalar kinds. Identity is the kind itself, so two
/// dtypes with the same name are always interchangeable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Void,
    Int1,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Fp8,
    Fp16,
    Bf16,
    Fp32,
    Fp64,
}

impl ScalarKind {
    pub const ALL: [ScalarKind; 15] = [
        ScalarKind::Void,
        ScalarKind::Int1,
        ScalarKind::Int8,
        ScalarKind::Int16,
        ScalarKind::Int32,
        ScalarKind::Int64,
        ScalarKind::Uint8,
        ScalarKind::Uint16,
        ScalarKind::Uint32,
        ScalarKind::Uint64,
        ScalarKind::Fp8,
        ScalarKind::Fp16,
        ScalarKind::Bf16,
        ScalarKind::Fp32,
        ScalarKind::Fp64,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Void => "void",
            ScalarKind::Int1 => "int1",
            ScalarKind::Int8 => "int8",
            ScalarKind::Int16 => "int16",
            ScalarKind::Int32 => "int32",
            ScalarKind::Int64 => "int64",
            ScalarKind::Uint8 => "uint8",
            ScalarKind::Uint16 => "uint16",
            ScalarKind::Uint32 => "uint32",
            ScalarKind::Uint64 => "uint64",
            ScalarKind::Fp8 => "fp8",
            ScalarKind::Fp16 => "fp16",
            ScalarKind::Bf16 => "bf16",
            ScalarKind::Fp32 => "fp32",
            ScalarKind::Fp64 => "fp64",
        }
    }

    /// Resolve a dtype name. Names outside the fixed set are rejected
    /// here, which is the only entry for externally supplied names.
    pub fn parse(name: &str) -> Result<ScalarKind> {
        ScalarKind::ALL
            .into_iter()
            .find(|k| k.name() == name)
            .ok_or_else(|| TraceError::Unsupported(format!("unknown dtype name `{name}`")))
    }

    pub fn primitive_bitwidth(self) -> u32 {
        match self {
            ScalarKind::Void => 0,
            ScalarKind::Int1 => 1,
            ScalarKind::Int8 | ScalarKind::Uint8 | ScalarKind::Fp8 => 8,
            ScalarKind::Int16 | ScalarKind::Uint16 | ScalarKind::Fp16 | ScalarKind::Bf16 => 16,
            ScalarKind::Int32 | ScalarKind::Uint32 | ScalarKind::Fp32 => 32,
            ScalarKind::Int64 | ScalarKind::Uint64 | ScalarKind::Fp64 => 64,
        }
    }

    pub fn int_bitwidth(self) -> Option<u32> {
        self.is_int().then(|| self.primitive_bitwidth())
    }

    pub fn fp_mantissa_width(self) -> Option<u32> {
        match self {
            ScalarKind::Fp8 => Some(3),
            ScalarKind::Fp16 => Some(10),
            ScalarKind::Bf16 => Some(7),
            ScalarKind::Fp32 => Some(23),
            ScalarKind::Fp64 => Some(53),
            ScalarKind::Void
            | ScalarKind::Int1
            | ScalarKind::Int8
            | ScalarKind::Int16
            | ScalarKind::Int32
            | ScalarKind::Int64
            | ScalarKind::Uint8
            | ScalarKind::Uint16
            | ScalarKind::Uint32
            | ScalarKind::Uint64 => None,
        }
    }

    pub fn is_floating(self) -> bool {
        matches!(
            self,
            ScalarKind::Fp8 | ScalarKind::Fp16 | ScalarKind::Bf16 | ScalarKind::Fp32 | ScalarKind::Fp64
        )
    }

    pub fn is_customized_floating(self) -> bool {
        matches!(self, ScalarKind::Fp8)
    }

    pub fn is_standard_floating(self) -> bool {
        matches!(
            self,
            ScalarKind::Fp16 | ScalarKind::Bf16 | ScalarKind::Fp32 | ScalarKind::Fp64
        )
    }

    pub fn is_int_signed(self) -> bool {
        matches!(
            self,
            ScalarKind::Int1
                | ScalarKind::Int8
                | ScalarKind::Int16
                | ScalarKind::Int32
                | ScalarKind::Int64
        )
    }

    pub fn is_int_unsigned(self) -> bool {
        matches!(
            self,
            ScalarKind::Uint8 | ScalarKind::Uint16 | ScalarKind::Uint32 | ScalarKind::Uint64
        )
    }

    pub fn is_int(self) -> bool {
        self.is_int_signed() || self.is_int_unsigned()
    }

    pub fn is_bool(self) -> bool {
        matches!(self, ScalarKind::Int1)
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A pointer to a scalar element type, tagged with an address space.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PointerType {
    pub element: Box<DType>,
    pub address_space: u32,
}

impl PointerType {
    pub fn new(element: DType, address_space: u32) -> Result<PointerType> {
        if element == DType::VOID {
            return Err(TraceError::InvalidType(
                "pointer element type must not be void".into(),
            ));
        }
        Ok(PointerType {
            element: Box::new(element),
            address_space,
        })
    }
}

/// A fixed-shape multi-element type. The shape is non-empty and every
/// dimension is positive.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockType {
    pub element: Box<DType>,
    pub shape: Vec<u64>,
}

impl BlockType {
    pub fn new(element: DType, shape: Vec<u64>) -> Result<BlockType> {
        if shape.is_empty() {
            return Err(TraceError::InvalidType("0d block type is forbidden".into()));
        }
        if let Some(d) = shape.iter().find(|d| **d == 0) {
            return Err(TraceError::InvalidType(format!(
                "block dimensions must be positive, got {d}"
            )));
        }
        Ok(BlockType {
            element: Box::new(element),
            shape,
        })
    }

    pub fn numel(&self) -> u64 {
        self.shape.iter().product()
    }
}

/// A callable signature: no value shape, only described to the native IR.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub params: Vec<DType>,
    pub rets: Vec<DType>,
}

/// Compile-time type of a traced value: a closed set of variants rather
/// than a hierarchy.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    Scalar(ScalarKind),
    Pointer(PointerType),
    Block(BlockType),
    Function(FunctionType),
}

impl DType {
    pub const VOID: DType = DType::Scalar(ScalarKind::Void);
    pub const INT1: DType = DType::Scalar(ScalarKind::Int1);
    pub const INT8: DType = DType::Scalar(ScalarKind::Int8);
    pub const INT16: DType = DType::Scalar(ScalarKind::Int16);
    pub const INT32: DType = DType::Scalar(ScalarKind::Int32);
    pub const INT64: DType = DType::Scalar(ScalarKind::Int64);
    pub const UINT8: DType = DType::Scalar(ScalarKind::Uint8);
    pub const UINT16: DType = DType::Scalar(ScalarKind::Uint16);
    pub const UINT32: DType = DType::Scalar(ScalarKind::Uint32);
    pub const UINT64: DType = DType::Scalar(ScalarKind::Uint64);
    pub const FP8: DType = DType::Scalar(ScalarKind::Fp8);
    pub const FP16: DType = DType::Scalar(ScalarKind::Fp16);
    pub const BF16: DType = DType::Scalar(ScalarKind::Bf16);
    pub const FP32: DType = DType::Scalar(ScalarKind::Fp32);
    pub const FP64: DType = DType::Scalar(ScalarKind::Fp64);

    pub fn pointer(element: DType) -> Result<DType> {
        Ok(DType::Pointer(PointerType::new(element, 1)?))
    }

    pub fn pointer_in(element: DType, address_space: u32) -> Result<DType> {
        Ok(DType::Pointer(PointerType::new(element, address_space)?))
    }

    pub fn block(element: DType, shape: Vec<u64>) -> Result<DType> {
        Ok(DType::Block(BlockType::new(element, shape)?))
    }

    pub fn function(params: Vec<DType>, rets: Vec<DType>) -> DType {
        DType::Function(FunctionType { params, rets })
    }

    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            DType::Scalar(k) => Some(*k),
            _ => None,
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self, DType::Block(_))
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, DType::Pointer(_))
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, DType::Scalar(k) if k.is_floating())
    }

    pub fn is_standard_floating(&self) -> bool {
        matches!(self, DType::Scalar(k) if k.is_standard_floating())
    }

    pub fn is_customized_floating(&self) -> bool {
        matches!(self, DType::Scalar(k) if k.is_customized_floating())
    }

    pub fn is_int(&self) -> bool {
        matches!(self, DType::Scalar(k) if k.is_int())
    }

    pub fn is_int_signed(&self) -> bool {
        matches!(self, DType::Scalar(k) if k.is_int_signed())
    }

    pub fn is_int_unsigned(&self) -> bool {
        matches!(self, DType::Scalar(k) if k.is_int_unsigned())
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, DType::Scalar(k) if k.is_bool())
    }

    /// Void-ness is a scalar question; asking it of a pointer, block, or
    /// function type has no defined answer.
    pub fn is_void(&self) -> Result<bool> {
        match self {
            DType::Scalar(k) => Ok(*k == ScalarKind::Void),
            other => Err(TraceError::NotImplemented(format!(
                "is_void is not defined for {other}"
            ))),
        }
    }

    pub fn primitive_bitwidth(&self) -> Option<u32> {
        self.scalar_kind().map(ScalarKind::primitive_bitwidth)
    }

    /// Scalar projection: identity for scalars and pointers, element type
    /// for blocks.
    pub fn scalar(&self) -> &DType {
        match self {
            DType::Block(b) => &b.element,
            other => other,
        }
    }

    /// Block shape, or `[1]` for a non-block type.
    pub fn dims(&self) -> Vec<u64> {
        match self {
            DType::Block(b) => b.shape.clone(),
            _ => vec![1],
        }
    }

    /// Map to the native IR type. This is the single conversion point
    /// between front-end dtypes and builder types.
    pub fn to_ir(&self, b: &mut dyn Builder) -> Result<TypeId> {
        match self {
            DType::Scalar(k) => Ok(match k {
                ScalarKind::Void => b.void_ty(),
                ScalarKind::Int1 => b.int1_ty(),
                ScalarKind::Int8 | ScalarKind::Uint8 => b.int8_ty(),
                ScalarKind::Int16 | ScalarKind::Uint16 => b.int16_ty(),
                ScalarKind::Int32 | ScalarKind::Uint32 => b.int32_ty(),
                ScalarKind::Int64 | ScalarKind::Uint64 => b.int64_ty(),
                ScalarKind::Fp8 => b.fp8_ty(),
                ScalarKind::Fp16 => b.half_ty(),
                ScalarKind::Bf16 => b.bf16_ty(),
                ScalarKind::Fp32 => b.float_ty(),
                ScalarKind::Fp64 => b.double_ty(),
            }),
            DType::Pointer(p) => {
                let element = p.element.to_ir(b)?;
                Ok(b.ptr_ty(element, p.address_space))
            }
            DType::Block(blk) => {
                let element = blk.element.to_ir(b)?;
                Ok(b.block_ty(element, &blk.shape))
            }
            DType::Function(f) => {
                let params = f
                    .params
                    .iter()
                    .map(|t| t.to_ir(b))
                    .collect::<Result<Vec<_>>>()?;
                let rets = f
                    .rets
                    .iter()
                    .map(|t| t.to_ir(b))
                    .collect::<Result<Vec<_>>>()?;
                Ok(b.function_ty(&params, &rets))
            }
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::Scalar(k) => write!(f, "{k}"),
            DType::Pointer(p) => write!(f, "pointer<{}>", p.element),
            DType::Block(b) => {
                let dims = b
                    .shape
                    .iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "<[{dims}], {}>", b.element)
            }
            DType::Function(func) => {
                let params = func
                    .params
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                let rets = func
                    .rets
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "fn ({params}) -> ({rets})")
            }
        }
    }
}
