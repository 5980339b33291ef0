//! Arbitrary-precision magnitudes for integer literal parsing. Little-endian limb array of 64-bit limbs; only the operations
//! Ada literal parsing actually needs are implemented: construct-from-
//! decimal, multiply-by-small-add-small (used digit by digit, including for
//! based literals up to base 16), normalize, and fits-in-i64 extraction.
//! No subtraction, general multiplication or division — the reference
//! doesn't need them either.

/// Little-endian limb magnitude; always non-negative in storage — the sign
/// is tracked by the caller (the lexer attaches it from an optional leading
/// `-` and stores signed literals as `Token::Integer`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigUInt {
    limbs: Vec<u64>,
}

impl BigUInt {
    pub fn zero() -> Self {
        BigUInt { limbs: vec![0] }
    }

    /// Parse a run of decimal digits (ASCII `'0'..='9'`), ignoring embedded
    /// underscores the lexer has already stripped.
    pub fn from_decimal_digits(digits: &[u8]) -> Self {
        let mut value = BigUInt::zero();
        for &d in digits {
            debug_assert!(d.is_ascii_digit());
            value = value.mul_small_add_small(10, (d - b'0') as u64);
        }
        value
    }

    /// Parse digits in an arbitrary base 2..=16 (for based literals);
    /// `digit_value` maps `'0'..='9'`/`'A'..='F'`/`'a'..='f'`.
    pub fn from_based_digits(digits: &[u8], base: u32) -> Option<Self> {
        debug_assert!((2..=16).contains(&base));
        let mut value = BigUInt::zero();
        for &d in digits {
            let dv = digit_value(d)?;
            if dv >= base {
                return None;
            }
            value = value.mul_small_add_small(base as u64, dv as u64);
        }
        Some(value)
    }

    /// `self = self * small + add`, the one arithmetic primitive every
    /// digit of every literal goes through.
    pub fn mul_small_add_small(&self, small: u64, add: u64) -> BigUInt {
        let mut result = Vec::with_capacity(self.limbs.len() + 1);
        let mut carry: u128 = add as u128;
        for &limb in &self.limbs {
            let product = limb as u128 * small as u128 + carry;
            result.push(product as u64);
            carry = product >> 64;
        }
        while carry > 0 {
            result.push(carry as u64);
            carry >>= 64;
        }
        let mut value = BigUInt { limbs: result };
        value.normalize();
        value
    }

    /// Drop leading (most-significant) zero limbs; zero itself normalizes
    /// to a single `0` limb and is never negative.
    pub fn normalize(&mut self) {
        while self.limbs.len() > 1 && *self.limbs.last().unwrap() == 0 {
            self.limbs.pop();
        }
        if self.limbs.is_empty() {
            self.limbs.push(0);
        }
    }

    pub fn is_zero(&self) -> bool {
        self.limbs.len() == 1 && self.limbs[0] == 0
    }

    /// Extract the value as a signed 64-bit integer if it fits, honoring
    /// `negative` (the literal's sign, attached by the lexer/parser, never
    /// by this type itself). Returns `None` on overflow.
    pub fn fits_in_i64(&self, negative: bool) -> Option<i64> {
        if self.limbs.len() > 1 {
            return None;
        }
        let magnitude = self.limbs[0];
        if negative {
            if magnitude > (i64::MAX as u64) + 1 {
                None
            } else if magnitude == (i64::MAX as u64) + 1 {
                Some(i64::MIN)
            } else {
                Some(-(magnitude as i64))
            }
        } else if magnitude > i64::MAX as u64 {
            None
        } else {
            Some(magnitude as i64)
        }
    }

    /// Decimal rendering, used when a literal is too wide for `i64` and must
    /// be carried through to codegen as text (e.g. a named `Universal_Integer`
    /// constant whose value only needs to round-trip to IR as a decimal).
    pub fn to_decimal_string(&self) -> String {
        if self.is_zero() {
            return "0".to_string();
        }
        let mut digits = Vec::new();
        let mut limbs = self.limbs.clone();
        while !(limbs.len() == 1 && limbs[0] == 0) {
            let mut remainder: u128 = 0;
            for limb in limbs.iter_mut().rev() {
                let cur = (remainder << 64) | *limb as u128;
                *limb = (cur / 10) as u64;
                remainder = cur % 10;
            }
            digits.push((b'0' + remainder as u8) as char);
            while limbs.len() > 1 && *limbs.last().unwrap() == 0 {
                limbs.pop();
            }
        }
        digits.iter().rev().collect()
    }
}

fn digit_value(b: u8) -> Option<u32> {
    match b {
        b'0'..=b'9' => Some((b - b'0') as u32),
        b'a'..=b'f' => Some((b - b'a') as u32 + 10),
        b'A'..=b'F' => Some((b - b'A') as u32 + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_round_trips_small_values() {
        let v = BigUInt::from_decimal_digits(b"12345");
        assert_eq!(v.fits_in_i64(false), Some(12345));
        assert_eq!(v.to_decimal_string(), "12345");
    }

    #[test]
    fn based_literal_hex() {
        // 16#FF# = 255
        let v = BigUInt::from_based_digits(b"FF", 16).unwrap();
        assert_eq!(v.fits_in_i64(false), Some(255));
    }

    #[test]
    fn negative_min_i64_fits() {
        let v = BigUInt::from_decimal_digits(b"9223372036854775808");
        assert_eq!(v.fits_in_i64(true), Some(i64::MIN));
    }

    #[test]
    fn overflow_does_not_fit() {
        let v = BigUInt::from_decimal_digits(b"99999999999999999999999999");
        assert_eq!(v.fits_in_i64(false), None);
        assert_eq!(v.to_decimal_string(), "99999999999999999999999999");
    }

    #[test]
    fn zero_normalizes_and_is_not_negative() {
        let v = BigUInt::zero();
        assert!(v.is_zero());
        assert_eq!(v.fits_in_i64(true), Some(0));
    }
}
