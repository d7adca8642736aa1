//! Helpers for table-driven tests.

use std::fmt::Debug;
use std::panic::AssertUnwindSafe;

/// Utility for creating parametrized (aka. table-driven) tests.
///
/// Create a `Debug` struct, conventionally named `Case`, holding the data for
/// one test case, collect the cases into an array or `Vec` and call
/// `cases.test_each` with the test function.
///
/// Every case is run, even if an earlier one fails. If any case panics,
/// `test_each` panics afterwards with the number and debug representations
/// of the failing cases.
///
/// Dimensions and shapes hold reference-counted expression nodes which are
/// not unwind safe, so cases and captured values are asserted to be unwind
/// safe. A failing case aborts the test, so state observed after a caught
/// panic is never used.
pub trait TestCases {
    /// The data for a single test case.
    type Case;

    /// Call `test` with each test case in `self`, catching any panics.
    fn test_each(self, test: impl Fn(&Self::Case))
    where
        Self::Case: Debug;
}

impl<I: IntoIterator> TestCases for I {
    type Case = I::Item;

    fn test_each(self, test: impl Fn(&I::Item))
    where
        Self::Case: Debug,
    {
        let mut failures = Vec::new();
        for case in self {
            if std::panic::catch_unwind(AssertUnwindSafe(|| test(&case))).is_err() {
                failures.push(case);
            }
        }
        assert_eq!(
            failures.len(),
            0,
            "{} test cases failed: {:?}",
            failures.len(),
            failures
        );
    }
}

#[cfg(test)]
mod tests {
    use super::TestCases;
    use crate::var::VarScope;

    #[test]
    fn test_test_cases_success() {
        #[derive(Debug)]
        struct Case {
            x: i32,
        }

        let cases = [Case { x: 1 }, Case { x: 2 }];
        cases.test_each(|case| assert!(case.x > 0));
    }

    #[test]
    fn test_cases_with_dimensions() {
        let scope = VarScope::new();
        let cases = [scope.dim_var("a"), scope.dim_var("b")];
        cases.test_each(|dim| assert!(dim.is_dynamic()));
    }

    #[test]
    #[should_panic(expected = "2 test cases failed")]
    fn test_test_each_failure() {
        #[derive(Debug)]
        struct Case {
            x: i32,
        }

        let cases = [Case { x: 1 }, Case { x: 2 }, Case { x: -1 }];
        cases.test_each(|case| {
            assert!(case.x < 0, "oh no");
        })
    }
}
