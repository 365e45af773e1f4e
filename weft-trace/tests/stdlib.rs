use weft_core::{ConstExpr, DType, builtins, stdlib};
use weft_trace::EvalTrace;

fn sh(dims: &[i64]) -> Vec<ConstExpr> {
    dims.iter().map(|&d| ConstExpr::from(d)).collect()
}

#[test]
fn abs_mirrors_negative_values() {
    let mut ex = EvalTrace::new();
    let a = builtins::arange(&mut ex, -2i64, 3i64).expect("arange");
    let t = stdlib::abs(&mut ex, &a).expect("abs");
    assert_eq!(
        ex.values(&t).expect("values"),
        vec![2.0, 1.0, 0.0, 1.0, 2.0]
    );
}

#[test]
fn cdiv_rounds_up() {
    let mut ex = EvalTrace::new();
    let t = stdlib::cdiv(&mut ex, 10i64, 3i64).expect("cdiv");
    assert_eq!(ex.values(&t).expect("values"), vec![4.0]);
    let t = stdlib::cdiv(&mut ex, 9i64, 3i64).expect("cdiv");
    assert_eq!(ex.values(&t).expect("values"), vec![3.0]);
}

#[test]
fn minimum_and_maximum_are_elementwise() {
    let mut ex = EvalTrace::new();
    let a = builtins::arange(&mut ex, 0i64, 4i64).expect("arange");
    let b = a.rsub(3i64, &mut ex).expect("rsub"); // [3, 2, 1, 0]
    let t = stdlib::minimum(&mut ex, &a, &b).expect("minimum");
    assert_eq!(ex.values(&t).expect("values"), vec![0.0, 1.0, 1.0, 0.0]);
    let t = stdlib::maximum(&mut ex, &a, &b).expect("maximum");
    assert_eq!(ex.values(&t).expect("values"), vec![3.0, 2.0, 2.0, 3.0]);
}

#[test]
fn sigmoid_of_zero_is_one_half() {
    let mut ex = EvalTrace::new();
    let z = stdlib::zeros(&mut ex, &sh(&[4]), &DType::FP32).expect("zeros");
    let t = stdlib::sigmoid(&mut ex, &z).expect("sigmoid");
    assert_eq!(t.dtype, DType::FP32);
    for v in ex.values(&t).expect("values") {
        assert!((v - 0.5).abs() < 1e-12);
    }
}

#[test]
fn sigmoid_saturates_monotonically() {
    let mut ex = EvalTrace::new();
    let a = builtins::arange(&mut ex, -3i64, 4i64).expect("arange");
    let a = a.cast_to(&DType::FP32, &mut ex).expect("cast");
    let vals = {
        let t = stdlib::sigmoid(&mut ex, &a).expect("sigmoid");
        ex.values(&t).expect("values")
    };
    for w in vals.windows(2) {
        assert!(w[0] < w[1]);
    }
    assert!(vals[0] > 0.0 && vals[6] < 1.0);
}

#[test]
fn softmax_sums_to_one() {
    let mut ex = EvalTrace::new();
    let a = builtins::arange(&mut ex, 0i64, 5i64).expect("arange");
    let t = stdlib::softmax(&mut ex, &a, false).expect("softmax");
    let vals = ex.values(&t).expect("values");
    let total: f64 = vals.iter().sum();
    assert!((total - 1.0).abs() < 1e-9);
    for w in vals.windows(2) {
        assert!(w[0] < w[1]);
    }
}

#[test]
fn softmax_is_shift_invariant() {
    let mut ex = EvalTrace::new();
    let a = builtins::arange(&mut ex, 0i64, 4i64).expect("arange");
    let shifted = a.add(100i64, &mut ex).expect("add");
    let base = {
        let t = stdlib::softmax(&mut ex, &a, false).expect("softmax");
        ex.values(&t).expect("values")
    };
    let moved = {
        let t = stdlib::softmax(&mut ex, &shifted, false).expect("softmax");
        ex.values(&t).expect("values")
    };
    for (x, y) in base.iter().zip(&moved) {
        assert!((x - y).abs() < 1e-9);
    }
}

#[test]
fn ravel_flattens() {
    let mut ex = EvalTrace::new();
    let a = builtins::arange(&mut ex, 0i64, 6i64).expect("arange");
    let a = builtins::view(&mut ex, &a, &sh(&[2, 3])).expect("view");
    let t = stdlib::ravel(&mut ex, &a).expect("ravel");
    assert_eq!(t.ty, DType::block(DType::INT32, vec![6]).expect("block"));
}

#[test]
fn zeros_like_copies_shape_and_dtype() {
    let mut ex = EvalTrace::new();
    let a = builtins::full(&mut ex, &sh(&[2, 2]), 9.0f64, &DType::FP32).expect("full");
    let t = stdlib::zeros_like(&mut ex, &a).expect("zeros_like");
    assert_eq!(t.ty, a.ty);
    assert_eq!(ex.values(&t).expect("values"), vec![0.0; 4]);
}

#[test]
fn swizzle2d_groups_rows() {
    let mut ex = EvalTrace::new();
    // Full 4x4 index grid.
    let i = builtins::arange(&mut ex, 0i64, 4i64).expect("arange");
    let i = builtins::expand_dims(&mut ex, &i, 1i64).expect("expand_dims");
    let i = builtins::broadcast_to(&mut ex, &i, &sh(&[4, 4])).expect("broadcast_to");
    let j = builtins::arange(&mut ex, 0i64, 4i64).expect("arange");
    let j = builtins::expand_dims(&mut ex, &j, 0i64).expect("expand_dims");
    let j = builtins::broadcast_to(&mut ex, &j, &sh(&[4, 4])).expect("broadcast_to");

    let (ni, nj) = stdlib::swizzle2d(&mut ex, &i, &j, 4i64, 4i64, 2i64).expect("swizzle2d");
    let ni = ex.values(&ni).expect("values");
    let nj = ex.values(&nj).expect("values");

    // Scatter each row-major index to its swizzled position.
    let mut got = [[0i64; 4]; 4];
    for k in 0..16 {
        got[ni[k] as usize][nj[k] as usize] = k as i64;
    }
    let expected = [
        [0, 2, 4, 6],
        [1, 3, 5, 7],
        [8, 10, 12, 14],
        [9, 11, 13, 15],
    ];
    assert_eq!(got, expected);
}
