use weft_core::builtins;
use weft_core::{Arg, DType};
use weft_trace::EvalTrace;

/// A block of pointers covering `len` consecutive elements from `base`.
fn ptr_block(ex: &mut EvalTrace, elem: DType, base: i64, len: i64) -> weft_core::Tensor {
    let p = ex.param_ptr(elem, base).expect("param");
    let offs = builtins::arange(ex, 0i64, len).expect("arange");
    p.add(&offs, ex).expect("ptr add")
}

#[test]
fn pointer_arithmetic_is_element_indexed() {
    let mut ex = EvalTrace::new();
    let ptrs = ptr_block(&mut ex, DType::FP32, 100, 4);
    assert_eq!(
        ptrs.ty,
        DType::block(DType::pointer(DType::FP32).expect("ptr"), vec![4]).expect("block")
    );
    assert_eq!(
        ex.values(&ptrs).expect("values"),
        vec![100.0, 101.0, 102.0, 103.0]
    );

    let back = ptrs.sub(2i64, &mut ex).expect("ptr sub");
    assert_eq!(ex.values(&back).expect("values")[0], 98.0);
}

#[test]
fn pointers_do_not_multiply() {
    let mut ex = EvalTrace::new();
    let p = ex.param_ptr(DType::FP32, 100).expect("param");
    let err = p.mul(2i64, &mut ex).expect_err("expected error");
    assert!(
        err.to_string().contains("cannot apply"),
        "unexpected message: {err}"
    );
}

#[test]
fn load_reads_written_memory() {
    let mut ex = EvalTrace::new();
    for k in 0..4 {
        ex.write_mem(100 + k, k as f64 + 0.5);
    }
    let ptrs = ptr_block(&mut ex, DType::FP32, 100, 4);
    let t = builtins::load(&mut ex, &ptrs, None, None, "", "", false).expect("load");
    assert_eq!(t.dtype, DType::FP32);
    assert_eq!(ex.values(&t).expect("values"), vec![0.5, 1.5, 2.5, 3.5]);
}

#[test]
fn masked_load_substitutes_other() {
    let mut ex = EvalTrace::new();
    for k in 0..4 {
        ex.write_mem(100 + k, k as f64);
    }
    let ptrs = ptr_block(&mut ex, DType::FP32, 100, 4);
    let offs = builtins::arange(&mut ex, 0i64, 4i64).expect("arange");
    let mask = offs.lt(2i64, &mut ex).expect("lt");
    let t = builtins::load(
        &mut ex,
        &ptrs,
        Some(Arg::from(&mask)),
        Some(Arg::from(9.0f64)),
        "",
        "",
        false,
    )
    .expect("load");
    assert_eq!(ex.values(&t).expect("values"), vec![0.0, 1.0, 9.0, 9.0]);
}

#[test]
fn load_other_is_cast_to_the_pointee() {
    let mut ex = EvalTrace::new();
    let ptrs = ptr_block(&mut ex, DType::INT32, 100, 2);
    let offs = builtins::arange(&mut ex, 0i64, 2i64).expect("arange");
    let mask = offs.lt(0i64, &mut ex).expect("lt");
    let t = builtins::load(
        &mut ex,
        &ptrs,
        Some(Arg::from(&mask)),
        Some(Arg::from(1.7f64)),
        "",
        "",
        false,
    )
    .expect("load");
    assert_eq!(t.dtype, DType::INT32);
    assert_eq!(ex.values(&t).expect("values"), vec![1.0, 1.0]);
}

#[test]
fn load_requires_a_pointer() {
    let mut ex = EvalTrace::new();
    let a = builtins::arange(&mut ex, 0i64, 4i64).expect("arange");
    let err = builtins::load(&mut ex, &a, None, None, "", "", false).expect_err("expected error");
    assert!(
        err.to_string().contains("expected a pointer"),
        "unexpected message: {err}"
    );
}

#[test]
fn mask_must_be_int1() {
    let mut ex = EvalTrace::new();
    let ptrs = ptr_block(&mut ex, DType::FP32, 100, 4);
    let bad = builtins::arange(&mut ex, 0i64, 4i64).expect("arange");
    let err = builtins::load(&mut ex, &ptrs, Some(Arg::from(&bad)), None, "", "", false)
        .expect_err("expected error");
    assert!(
        err.to_string().contains("mask must have type int1"),
        "unexpected message: {err}"
    );
}

#[test]
fn store_writes_through_every_pointer() {
    let mut ex = EvalTrace::new();
    let ptrs = ptr_block(&mut ex, DType::FP32, 200, 3);
    let st = builtins::store(&mut ex, &ptrs, 7.5f64, None).expect("store");
    assert_eq!(st.ty, DType::VOID);
    for k in 0..3 {
        assert_eq!(ex.read_mem(200 + k), Some(7.5));
    }
}

#[test]
fn masked_store_skips_unselected_lanes() {
    let mut ex = EvalTrace::new();
    let ptrs = ptr_block(&mut ex, DType::FP32, 200, 4);
    let offs = builtins::arange(&mut ex, 0i64, 4i64).expect("arange");
    let mask = offs.ge(2i64, &mut ex).expect("ge");
    builtins::store(&mut ex, &ptrs, 1.0f64, Some(Arg::from(&mask))).expect("store");
    assert_eq!(ex.read_mem(200), None);
    assert_eq!(ex.read_mem(201), None);
    assert_eq!(ex.read_mem(202), Some(1.0));
    assert_eq!(ex.read_mem(203), Some(1.0));
}

#[test]
fn store_value_must_broadcast_onto_the_pointer_shape() {
    let mut ex = EvalTrace::new();
    let ptrs = ptr_block(&mut ex, DType::INT32, 200, 4);
    let wide = builtins::arange(&mut ex, 0i64, 8i64).expect("arange");
    let err = builtins::store(&mut ex, &ptrs, &wide, None).expect_err("expected error");
    assert!(
        err.to_string().contains("cannot broadcast"),
        "unexpected message: {err}"
    );
}

#[test]
fn cas_returns_the_old_value_and_swaps_on_match() {
    let mut ex = EvalTrace::new();
    ex.write_mem(100, 5.0);
    let p = ex.param_ptr(DType::INT32, 100).expect("param");
    let old = builtins::atomic_cas(&mut ex, &p, 5i64, 9i64).expect("cas");
    assert_eq!(ex.values(&old).expect("values"), vec![5.0]);
    assert_eq!(ex.read_mem(100), Some(9.0));

    // Mismatched compare leaves memory alone.
    let old = builtins::atomic_cas(&mut ex, &p, 5i64, 1i64).expect("cas");
    assert_eq!(ex.values(&old).expect("values"), vec![9.0]);
    assert_eq!(ex.read_mem(100), Some(9.0));
}

#[test]
fn atomic_add_accumulates_and_returns_preop() {
    let mut ex = EvalTrace::new();
    for k in 0..4 {
        ex.write_mem(300 + k, 10.0 * k as f64);
    }
    let ptrs = ptr_block(&mut ex, DType::INT32, 300, 4);
    let old = builtins::atomic_add(&mut ex, &ptrs, 1i64, None).expect("atomic_add");
    assert_eq!(
        ex.values(&old).expect("values"),
        vec![0.0, 10.0, 20.0, 30.0]
    );
    for k in 0..4 {
        assert_eq!(ex.read_mem(300 + k), Some(10.0 * k as f64 + 1.0));
    }
}

#[test]
fn masked_atomics_touch_only_selected_lanes() {
    let mut ex = EvalTrace::new();
    for k in 0..4 {
        ex.write_mem(300 + k, 1.0);
    }
    let ptrs = ptr_block(&mut ex, DType::INT32, 300, 4);
    let offs = builtins::arange(&mut ex, 0i64, 4i64).expect("arange");
    let mask = offs.lt(2i64, &mut ex).expect("lt");
    builtins::atomic_xchg(&mut ex, &ptrs, 8i64, Some(Arg::from(&mask))).expect("atomic_xchg");
    assert_eq!(ex.read_mem(300), Some(8.0));
    assert_eq!(ex.read_mem(301), Some(8.0));
    assert_eq!(ex.read_mem(302), Some(1.0));
    assert_eq!(ex.read_mem(303), Some(1.0));
}

#[test]
fn atomic_max_and_min() {
    let mut ex = EvalTrace::new();
    ex.write_mem(400, 3.0);
    let p = ex.param_ptr(DType::INT32, 400).expect("param");
    builtins::atomic_max(&mut ex, &p, 7i64, None).expect("atomic_max");
    assert_eq!(ex.read_mem(400), Some(7.0));
    builtins::atomic_min(&mut ex, &p, 2i64, None).expect("atomic_min");
    assert_eq!(ex.read_mem(400), Some(2.0));
}

#[test]
fn atomic_bitwise_ops() {
    let mut ex = EvalTrace::new();
    ex.write_mem(500, 0b1100 as f64);
    let p = ex.param_ptr(DType::INT32, 500).expect("param");
    builtins::atomic_and(&mut ex, &p, 0b1010i64, None).expect("atomic_and");
    assert_eq!(ex.read_mem(500), Some(0b1000 as f64));
    builtins::atomic_or(&mut ex, &p, 0b0001i64, None).expect("atomic_or");
    assert_eq!(ex.read_mem(500), Some(0b1001 as f64));
    builtins::atomic_xor(&mut ex, &p, 0b1111i64, None).expect("atomic_xor");
    assert_eq!(ex.read_mem(500), Some(0b0110 as f64));
}

#[test]
fn unwritten_memory_reads_as_zero() {
    let mut ex = EvalTrace::new();
    let ptrs = ptr_block(&mut ex, DType::FP32, 900, 2);
    let t = builtins::load(&mut ex, &ptrs, None, None, "", "", false).expect("load");
    assert_eq!(ex.values(&t).expect("values"), vec![0.0, 0.0]);
}
