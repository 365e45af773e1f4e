#![forbid(unsafe_code)]

mod coerce;
mod constexpr;
mod error;
mod semantic;
mod tensor;
mod types;

pub mod builtins;
pub mod stdlib;

pub use coerce::{Arg, to_tensor};
pub use constexpr::{ConstExpr, ConstVal};
pub use error::{Result, TraceError};
pub use semantic::Semantic;
pub use tensor::{SliceArg, Tensor};
pub use types::{BlockType, DType, FunctionType, PointerType, ScalarKind};

pub use weft_ir::{
    AtomicOp, BinaryOp, Builder, CompareOp, LogicalOp, MathFn, ReduceOp, UnaryOp, ValueId,
};
