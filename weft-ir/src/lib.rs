#![forbid(unsafe_code)]

pub mod ir;

pub use ir::*;
