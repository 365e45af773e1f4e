#![forbid(unsafe_code)]

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(pub u32);

/// Native IR types, interned by the builder.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum IrType {
    Void,
    Int { bits: u32 },
    Fp8,
    Half,
    Bf16,
    Float,
    Double,
    Ptr { element: TypeId, address_space: u32 },
    Block { element: TypeId, shape: Vec<u64> },
    Fn { params: Vec<TypeId>, rets: Vec<TypeId> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    TrueDiv,
    FloorDiv,
    Rem,

    And,
    Or,
    Xor,
    Shl,
    Shr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    Max,
    Min,
    Sum,
    XorSum,
    ArgMax,
    ArgMin,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AtomicOp {
    Xchg,
    Add,
    Max,
    Min,
    And,
    Or,
    Xor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MathFn {
    Exp,
    Log,
    Cos,
    Sin,
    Sqrt,
}

/// Scalar constant payloads. Unsigned constants are carried bit-for-bit
/// in the signed payload of the same width.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Const {
    Int1(bool),
    Int32(i32),
    Int64(i64),
    Fp32(f32),
}

#[derive(Clone, Debug, PartialEq)]
pub enum InstKind {
    Const(Const),

    Binary {
        op: BinaryOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    Compare {
        op: CompareOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    Logical {
        op: LogicalOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    Unary {
        op: UnaryOp,
        operand: ValueId,
    },

    ProgramId {
        axis: u32,
    },
    NumPrograms {
        axis: u32,
    },

    Arange {
        start: i64,
        end: i64,
    },
    Full {
        shape: Vec<u64>,
        value: Const,
        ty: TypeId,
    },

    Broadcast {
        src: ValueId,
        shape: Vec<u64>,
    },
    Trans {
        src: ValueId,
    },
    Cat {
        lhs: ValueId,
        rhs: ValueId,
        can_reorder: bool,
    },
    View {
        src: ValueId,
        shape: Vec<u64>,
    },
    ExpandDims {
        src: ValueId,
        axis: u32,
    },

    Dot {
        lhs: ValueId,
        rhs: ValueId,
        allow_tf32: bool,
    },

    Load {
        ptr: ValueId,
        mask: Option<ValueId>,
        other: Option<ValueId>,
        cache_modifier: String,
        eviction_policy: String,
        volatile: bool,
    },
    Store {
        ptr: ValueId,
        value: ValueId,
        mask: Option<ValueId>,
    },

    AtomicCas {
        ptr: ValueId,
        cmp: ValueId,
        val: ValueId,
    },
    AtomicRmw {
        op: AtomicOp,
        ptr: ValueId,
        val: ValueId,
        mask: Option<ValueId>,
    },

    Select {
        cond: ValueId,
        lhs: ValueId,
        rhs: ValueId,
    },

    Umulhi {
        lhs: ValueId,
        rhs: ValueId,
    },
    Fdiv {
        lhs: ValueId,
        rhs: ValueId,
        ieee_rounding: bool,
    },
    Math {
        f: MathFn,
        operand: ValueId,
    },

    Reduce {
        op: ReduceOp,
        src: ValueId,
        axis: u32,
    },

    Cast {
        src: ValueId,
        ty: TypeId,
    },
    Bitcast {
        src: ValueId,
        ty: TypeId,
    },

    Barrier,
    Printf {
        prefix: String,
        args: Vec<ValueId>,
    },
    MultipleOf {
        src: ValueId,
        values: Vec<u64>,
    },
    MaxContiguous {
        src: ValueId,
        values: Vec<u64>,
    },
}

#[derive(Clone, Debug)]
pub struct Inst {
    pub dest: ValueId,
    pub kind: InstKind,
}

/// The builder surface the front-end core depends on: type constructors
/// for every scalar kind plus the four scalar constant constructors.
/// Instruction emission is the semantic layer's business and goes through
/// the concrete builder, not this trait.
pub trait Builder {
    fn void_ty(&mut self) -> TypeId;
    fn int1_ty(&mut self) -> TypeId;
    fn int8_ty(&mut self) -> TypeId;
    fn int16_ty(&mut self) -> TypeId;
    fn int32_ty(&mut self) -> TypeId;
    fn int64_ty(&mut self) -> TypeId;
    fn fp8_ty(&mut self) -> TypeId;
    fn half_ty(&mut self) -> TypeId;
    fn bf16_ty(&mut self) -> TypeId;
    fn float_ty(&mut self) -> TypeId;
    fn double_ty(&mut self) -> TypeId;

    fn ptr_ty(&mut self, element: TypeId, address_space: u32) -> TypeId;
    fn block_ty(&mut self, element: TypeId, shape: &[u64]) -> TypeId;
    fn function_ty(&mut self, params: &[TypeId], rets: &[TypeId]) -> TypeId;

    fn get_int1(&mut self, v: bool) -> ValueId;
    fn get_int32(&mut self, v: i32) -> ValueId;
    fn get_int64(&mut self, v: i64) -> ValueId;
    fn get_fp32(&mut self, v: f32) -> ValueId;
}

/// In-memory instruction graph. Types are interned; instructions are kept
/// in emission order, which later passes rely on.
#[derive(Default, Debug)]
pub struct GraphBuilder {
    types: Vec<IrType>,
    insts: Vec<Inst>,
    next_value: u32,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, ty: IrType) -> TypeId {
        if let Some(pos) = self.types.iter().position(|t| *t == ty) {
            return TypeId(pos as u32);
        }
        self.types.push(ty);
        TypeId((self.types.len() - 1) as u32)
    }

    pub fn ty(&self, id: TypeId) -> &IrType {
        &self.types[id.0 as usize]
    }

    pub fn fresh_value(&mut self) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }

    pub fn emit(&mut self, kind: InstKind) -> ValueId {
        let dest = self.fresh_value();
        self.insts.push(Inst { dest, kind });
        dest
    }

    pub fn insts(&self) -> &[Inst] {
        &self.insts
    }

    /// The constant payload behind a value, if it was produced by a
    /// constant constructor.
    pub fn const_of(&self, v: ValueId) -> Option<Const> {
        self.insts.iter().find_map(|inst| match inst.kind {
            InstKind::Const(c) if inst.dest == v => Some(c),
            _ => None,
        })
    }
}

impl Builder for GraphBuilder {
    fn void_ty(&mut self) -> TypeId {
        self.intern(IrType::Void)
    }

    fn int1_ty(&mut self) -> TypeId {
        self.intern(IrType::Int { bits: 1 })
    }

    fn int8_ty(&mut self) -> TypeId {
        self.intern(IrType::Int { bits: 8 })
    }

    fn int16_ty(&mut self) -> TypeId {
        self.intern(IrType::Int { bits: 16 })
    }

    fn int32_ty(&mut self) -> TypeId {
        self.intern(IrType::Int { bits: 32 })
    }

    fn int64_ty(&mut self) -> TypeId {
        self.intern(IrType::Int { bits: 64 })
    }

    fn fp8_ty(&mut self) -> TypeId {
        self.intern(IrType::Fp8)
    }

    fn half_ty(&mut self) -> TypeId {
        self.intern(IrType::Half)
    }

    fn bf16_ty(&mut self) -> TypeId {
        self.intern(IrType::Bf16)
    }

    fn float_ty(&mut self) -> TypeId {
        self.intern(IrType::Float)
    }

    fn double_ty(&mut self) -> TypeId {
        self.intern(IrType::Double)
    }

    fn ptr_ty(&mut self, element: TypeId, address_space: u32) -> TypeId {
        self.intern(IrType::Ptr {
            element,
            address_space,
        })
    }

    fn block_ty(&mut self, element: TypeId, shape: &[u64]) -> TypeId {
        self.intern(IrType::Block {
            element,
            shape: shape.to_vec(),
        })
    }

    fn function_ty(&mut self, params: &[TypeId], rets: &[TypeId]) -> TypeId {
        self.intern(IrType::Fn {
            params: params.to_vec(),
            rets: rets.to_vec(),
        })
    }

    fn get_int1(&mut self, v: bool) -> ValueId {
        self.emit(InstKind::Const(Const::Int1(v)))
    }

    fn get_int32(&mut self, v: i32) -> ValueId {
        self.emit(InstKind::Const(Const::Int32(v)))
    }

    fn get_int64(&mut self, v: i64) -> ValueId {
        self.emit(InstKind::Const(Const::Int64(v)))
    }

    fn get_fp32(&mut self, v: f32) -> ValueId {
        self.emit(InstKind::Const(Const::Fp32(v)))
    }
}
