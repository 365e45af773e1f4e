#![forbid(unsafe_code)]

mod eval;

pub use eval::EvalTrace;
