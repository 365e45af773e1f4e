use weft_core::builtins;
use weft_core::{BinaryOp, DType};
use weft_ir::InstKind;
use weft_trace::EvalTrace;

#[test]
fn instructions_land_in_call_order() {
    let mut ex = EvalTrace::new();
    let a = builtins::arange(&mut ex, 0i64, 4i64).expect("arange");
    a.add(10i64, &mut ex).expect("add");

    let kinds: Vec<_> = ex.graph().insts().iter().map(|i| &i.kind).collect();
    assert_eq!(kinds.len(), 3);
    assert!(matches!(kinds[0], InstKind::Arange { start: 0, end: 4 }));
    assert!(matches!(kinds[1], InstKind::Const(_)));
    assert!(matches!(
        kinds[2],
        InstKind::Binary {
            op: BinaryOp::Add,
            ..
        }
    ));
}

#[test]
fn operands_are_recorded_untransformed() {
    // The select consumes the original handles; broadcasting is the
    // semantic layer's private business.
    let mut ex = EvalTrace::new();
    let a = builtins::arange(&mut ex, 0i64, 4i64).expect("arange");
    let cond = a.lt(2i64, &mut ex).expect("lt");
    let sel = builtins::where_(&mut ex, &cond, &a, 0i64).expect("where");
    let last = ex.graph().insts().last().expect("inst");
    assert_eq!(last.dest, sel.handle);
    match last.kind {
        InstKind::Select { cond: c, lhs, .. } => {
            assert_eq!(c, cond.handle);
            assert_eq!(lhs, a.handle);
        }
        ref other => panic!("expected a select, got {other:?}"),
    }
}

#[test]
fn printf_coerces_its_arguments_and_yields_void() {
    let mut ex = EvalTrace::new();
    let a = builtins::arange(&mut ex, 0i64, 4i64).expect("arange");
    let t = builtins::printf(&mut ex, "pid %d: %d\n", &[7i64.into(), (&a).into()])
        .expect("printf");
    assert_eq!(t.ty, DType::VOID);

    let last = ex.graph().insts().last().expect("inst");
    match &last.kind {
        InstKind::Printf { prefix, args } => {
            assert_eq!(prefix, "pid %d: %d\n");
            // The literal got its own constant; the tensor passed through.
            assert_eq!(args.len(), 2);
            assert_eq!(args[1], a.handle);
        }
        other => panic!("expected a printf, got {other:?}"),
    }
}

#[test]
fn printf_prefix_must_be_printable_ascii() {
    let mut ex = EvalTrace::new();
    let err = builtins::printf(&mut ex, "temp: 25\u{b0}C", &[]).expect_err("expected error");
    assert!(
        err.to_string().contains("printable ascii"),
        "unexpected message: {err}"
    );
    let err = builtins::printf(&mut ex, "bell\u{7}", &[]).expect_err("expected error");
    assert!(
        err.to_string().contains("printable ascii"),
        "unexpected message: {err}"
    );
}

#[test]
fn debug_barrier_emits_a_barrier() {
    let mut ex = EvalTrace::new();
    builtins::debug_barrier(&mut ex).expect("barrier");
    let last = ex.graph().insts().last().expect("inst");
    assert!(matches!(last.kind, InstKind::Barrier));
}

#[test]
fn stores_are_not_reordered_past_loads() {
    let mut ex = EvalTrace::new();
    let p = ex.param_ptr(DType::FP32, 100).expect("param");
    builtins::store(&mut ex, &p, 1.0f64, None).expect("store");
    builtins::load(&mut ex, &p, None, None, "", "", false).expect("load");

    let kinds: Vec<_> = ex.graph().insts().iter().map(|i| &i.kind).collect();
    let store_at = kinds
        .iter()
        .position(|k| matches!(k, InstKind::Store { .. }))
        .expect("store inst");
    let load_at = kinds
        .iter()
        .position(|k| matches!(k, InstKind::Load { .. }))
        .expect("load inst");
    assert!(store_at < load_at);
}

#[test]
fn load_flags_are_carried_verbatim() {
    let mut ex = EvalTrace::new();
    let p = ex.param_ptr(DType::FP32, 100).expect("param");
    builtins::load(&mut ex, &p, None, None, ".ca", "evict_last", true).expect("load");
    let last = ex.graph().insts().last().expect("inst");
    match &last.kind {
        InstKind::Load {
            cache_modifier,
            eviction_policy,
            volatile,
            mask,
            other,
            ..
        } => {
            assert_eq!(cache_modifier, ".ca");
            assert_eq!(eviction_policy, "evict_last");
            assert!(*volatile);
            assert!(mask.is_none() && other.is_none());
        }
        other => panic!("expected a load, got {other:?}"),
    }
}
