use proptest::prelude::*;
use weft_core::{ConstExpr, DType, Tensor, TraceError, to_tensor};
use weft_ir::{Const, GraphBuilder};

fn coerce(v: impl Into<weft_core::Arg>) -> (Tensor, GraphBuilder) {
    let mut b = GraphBuilder::new();
    let t = to_tensor(v, &mut b).expect("coerce");
    (t, b)
}

#[test]
fn small_integers_become_int32() {
    let (t, b) = coerce(0i64);
    assert_eq!(t.dtype, DType::INT32);
    assert_eq!(b.const_of(t.handle), Some(Const::Int32(0)));

    let (t, b) = coerce(i32::MAX as i64);
    assert_eq!(t.dtype, DType::INT32);
    assert_eq!(b.const_of(t.handle), Some(Const::Int32(i32::MAX)));

    let (t, _) = coerce(i32::MIN as i64);
    assert_eq!(t.dtype, DType::INT32);
}

#[test]
fn above_int32_range_becomes_uint32_bit_for_bit() {
    let (t, b) = coerce(1i64 << 31);
    assert_eq!(t.dtype, DType::UINT32);
    // The payload reinterprets the unsigned value in a signed slot.
    assert_eq!(b.const_of(t.handle), Some(Const::Int32(i32::MIN)));

    let (t, b) = coerce(u32::MAX);
    assert_eq!(t.dtype, DType::UINT32);
    assert_eq!(b.const_of(t.handle), Some(Const::Int32(-1)));
}

#[test]
fn wide_integers_become_int64() {
    let (t, b) = coerce(1i64 << 32);
    assert_eq!(t.dtype, DType::INT64);
    assert_eq!(b.const_of(t.handle), Some(Const::Int64(1 << 32)));

    let (t, _) = coerce(i64::MIN);
    assert_eq!(t.dtype, DType::INT64);
}

#[test]
fn above_int64_range_becomes_uint64_bit_for_bit() {
    let (t, b) = coerce(1i128 << 63);
    assert_eq!(t.dtype, DType::UINT64);
    assert_eq!(b.const_of(t.handle), Some(Const::Int64(i64::MIN)));

    let (t, b) = coerce(u64::MAX);
    assert_eq!(t.dtype, DType::UINT64);
    assert_eq!(b.const_of(t.handle), Some(Const::Int64(-1)));
}

#[test]
fn out_of_range_integers_are_rejected() {
    let mut b = GraphBuilder::new();
    let err = to_tensor(1i128 << 64, &mut b).expect_err("expected range error");
    assert!(matches!(err, TraceError::NonrepresentableInteger(_)));

    let err = to_tensor(-(1i128 << 63) - 1, &mut b).expect_err("expected range error");
    assert!(
        err.to_string().contains("nonrepresentable integer"),
        "unexpected message: {err}"
    );
}

#[test]
fn floats_become_single_precision() {
    let (t, b) = coerce(1.5f64);
    assert_eq!(t.dtype, DType::FP32);
    assert_eq!(b.const_of(t.handle), Some(Const::Fp32(1.5)));
}

#[test]
fn bools_become_int1() {
    let (t, b) = coerce(true);
    assert_eq!(t.dtype, DType::INT1);
    assert_eq!(b.const_of(t.handle), Some(Const::Int1(true)));
}

#[test]
fn constexprs_coerce_through_their_value() {
    let (t, _) = coerce(ConstExpr::from(7i64));
    assert_eq!(t.dtype, DType::INT32);
    let (t, _) = coerce(ConstExpr::from(2.0f64));
    assert_eq!(t.dtype, DType::FP32);
    let (t, _) = coerce(ConstExpr::from(false));
    assert_eq!(t.dtype, DType::INT1);
}

#[test]
fn tensors_pass_through_unchanged() {
    let mut b = GraphBuilder::new();
    let t = to_tensor(3i64, &mut b).expect("coerce");
    let before = b.insts().len();
    let again = to_tensor(&t, &mut b).expect("coerce");
    assert_eq!(again.handle, t.handle);
    assert_eq!(b.insts().len(), before);
}

proptest! {
    #[test]
    fn int32_range_always_lands_in_int32(v in i32::MIN as i128..=i32::MAX as i128) {
        let mut b = GraphBuilder::new();
        let t = to_tensor(v, &mut b).unwrap();
        prop_assert_eq!(&t.dtype, &DType::INT32);
        prop_assert_eq!(b.const_of(t.handle), Some(Const::Int32(v as i32)));
    }

    #[test]
    fn width_tracks_the_value_range(v in any::<i128>()) {
        let mut b = GraphBuilder::new();
        let got = to_tensor(v, &mut b);
        let expected = if (i32::MIN as i128..=i32::MAX as i128).contains(&v) {
            Some(DType::INT32)
        } else if (i32::MAX as i128 + 1..=u32::MAX as i128).contains(&v) {
            Some(DType::UINT32)
        } else if (i64::MIN as i128..=i64::MAX as i128).contains(&v) {
            Some(DType::INT64)
        } else if (i64::MAX as i128 + 1..=u64::MAX as i128).contains(&v) {
            Some(DType::UINT64)
        } else {
            None
        };
        match expected {
            Some(dtype) => prop_assert_eq!(&got.unwrap().dtype, &dtype),
            None => prop_assert!(got.is_err()),
        }
    }
}
