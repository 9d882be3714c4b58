//! Randomized checks of the soft-float entry points.
//!
//! In round-to-nearest with NI clear, double and single results must agree
//! bit for bit with an IEEE host whenever the result is not a NaN.

use od_ppc::fp_temp::{convert_to_double, convert_to_single, SIGN_BIT};
use od_ppc::fp_utils::*;
use od_ppc::Fpscr;
use proptest::prelude::*;

fn finite_double() -> impl Strategy<Value = f64> {
    prop_oneof![
        any::<f64>().prop_filter("finite", |v| v.is_finite()),
        Just(0.0),
        Just(-0.0),
        Just(f64::MIN_POSITIVE),
        Just(5e-324),
        (-1.0e6f64..1.0e6f64),
    ]
}

fn single_value() -> impl Strategy<Value = f32> {
    prop_oneof![
        any::<f32>().prop_filter("finite", |v| v.is_finite()),
        Just(f32::MAX),
        Just(f32::MIN_POSITIVE),
        Just(1.0e-45f32),
        (-1000.0f32..1000.0f32),
    ]
}

proptest! {
    #[test]
    fn add_matches_host(a in finite_double(), b in finite_double()) {
        let host = a + b;
        prop_assume!(!host.is_nan());
        let soft = add_double_precision(a.to_bits(), b.to_bits(), Fpscr::default());
        prop_assert_eq!(soft.value, host.to_bits());
    }

    #[test]
    fn mul_matches_host(a in finite_double(), c in finite_double()) {
        let host = a * c;
        let soft = multiply_double_precision(a.to_bits(), c.to_bits(), Fpscr::default());
        prop_assert_eq!(soft.value, host.to_bits());
    }

    #[test]
    fn div_matches_host(a in finite_double(), b in finite_double()) {
        let host = a / b;
        prop_assume!(!host.is_nan());
        let soft = divide_double_precision(a.to_bits(), b.to_bits(), Fpscr::default());
        prop_assert_eq!(soft.value, host.to_bits());
    }

    #[test]
    fn madd_matches_host_fma(a in finite_double(), b in finite_double(), c in finite_double()) {
        let host = a.mul_add(c, b);
        prop_assume!(!host.is_nan());
        let soft = madd_double_precision(a.to_bits(), c.to_bits(), b.to_bits(), false, false, Fpscr::default());
        prop_assert_eq!(soft.value, host.to_bits());
    }

    #[test]
    fn nmsub_is_negated_msub(a in finite_double(), b in finite_double(), c in finite_double()) {
        let fpscr = Fpscr::default();
        let msub = madd_double_precision(a.to_bits(), c.to_bits(), b.to_bits(), false, true, fpscr);
        let nmsub = madd_double_precision(a.to_bits(), c.to_bits(), b.to_bits(), true, true, fpscr);
        prop_assume!(!is_nan(msub.value));
        prop_assert_eq!(msub.value ^ SIGN_BIT, nmsub.value);
        prop_assert_eq!(msub.flags, nmsub.flags);
    }

    #[test]
    fn single_add_matches_host(a in single_value(), b in single_value()) {
        let host = ((a as f64 + b as f64) as f32) as f64;
        prop_assume!(!host.is_nan());
        let soft = add_single_precision((a as f64).to_bits(), (b as f64).to_bits(), Fpscr::default());
        prop_assert_eq!(soft.value, host.to_bits());
    }

    #[test]
    fn single_mul_matches_host(a in single_value(), c in single_value()) {
        let host = ((a as f64 * c as f64) as f32) as f64;
        prop_assume!(!host.is_nan());
        let soft = multiply_single_precision((a as f64).to_bits(), (c as f64).to_bits(), Fpscr::default());
        prop_assert_eq!(soft.value, host.to_bits());
    }

    #[test]
    fn frsp_matches_host(a in finite_double()) {
        let host = (a as f32) as f64;
        let soft = round_to_single(a.to_bits(), Fpscr::default());
        prop_assert_eq!(soft.value, host.to_bits());
    }

    #[test]
    fn single_results_survive_store_and_load(a in finite_double(), b in finite_double()) {
        let soft = add_single_precision(a.to_bits(), b.to_bits(), Fpscr::default());
        prop_assume!(!is_nan(soft.value));
        prop_assert_eq!(convert_to_double(convert_to_single(soft.value)), soft.value);
    }

    #[test]
    fn compare_matches_host_ordering(a in finite_double(), b in finite_double()) {
        let expected = match a.partial_cmp(&b) {
            Some(std::cmp::Ordering::Less) => FPCC_LT,
            Some(std::cmp::Ordering::Greater) => FPCC_GT,
            _ => FPCC_EQ,
        };
        let result = compare(a.to_bits(), b.to_bits(), false, Fpscr::default());
        prop_assert_eq!(result.fpcc, expected);
        prop_assert!(result.flags.is_empty());
    }
}
