//! Operator forwarding for the uncertain number types.
//!
//! Arithmetic is implemented once on references; these macros derive the owned and mixed
//! owned/borrowed forms from it.

/// Forward `lhs op rhs` for owned and mixed operands onto the `&lhs op &rhs` implementation.
macro_rules! forward_ref_binop {
    ($imp:ident, $method:ident, $lhs:ty, $rhs:ty, $out:ty) => {
        impl ::std::ops::$imp<$rhs> for $lhs {
            type Output = $out;

            #[inline]
            fn $method(self, rhs: $rhs) -> $out {
                ::std::ops::$imp::$method(&self, &rhs)
            }
        }

        impl<'a> ::std::ops::$imp<&'a $rhs> for $lhs {
            type Output = $out;

            #[inline]
            fn $method(self, rhs: &'a $rhs) -> $out {
                ::std::ops::$imp::$method(&self, rhs)
            }
        }

        impl<'a> ::std::ops::$imp<$rhs> for &'a $lhs {
            type Output = $out;

            #[inline]
            fn $method(self, rhs: $rhs) -> $out {
                ::std::ops::$imp::$method(self, &rhs)
            }
        }
    };
}

/// Forward `owned op constant` onto the `&lhs op constant` implementation, where the constant is
/// a `Copy` type such as `f64` or `Complex64`.
macro_rules! forward_const_binop {
    ($imp:ident, $method:ident, $lhs:ty, $rhs:ty, $out:ty) => {
        impl ::std::ops::$imp<$rhs> for $lhs {
            type Output = $out;

            #[inline]
            fn $method(self, rhs: $rhs) -> $out {
                ::std::ops::$imp::$method(&self, rhs)
            }
        }
    };
}

/// Forward `constant op owned` onto the `constant op &rhs` implementation.
macro_rules! forward_const_lhs_binop {
    ($imp:ident, $method:ident, $lhs:ty, $rhs:ty, $out:ty) => {
        impl ::std::ops::$imp<$rhs> for $lhs {
            type Output = $out;

            #[inline]
            fn $method(self, rhs: $rhs) -> $out {
                ::std::ops::$imp::$method(self, &rhs)
            }
        }
    };
}
