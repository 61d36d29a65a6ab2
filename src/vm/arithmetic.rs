//! Arithmetic, comparison, and `typeof` (§4.2 "Numeric and comparison
//! operators").
//!
//! `BinaryPlus`/`BinaryMinus`/`BinaryMultiply` each first try the
//! `Int32`/`Int32` fast path this module's `try_add_i32`/`try_sub_i32`/
//! `try_mul_i32` implement (checked, so overflow falls back rather than
//! wrapping), before falling back to the `Numeric` (`f64`/`BigInt`) slow
//! path this module also implements for every binary arithmetic opcode -
//! the usual two-tier dispatch a register-based interpreter uses for an
//! `int`/`float`/bignum ladder. The branch between the two tiers itself
//! lives in `vm::mod`'s dispatch loop, which owns the register file the
//! fast path needs to type-check.

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use crate::{
    exception::{EngineError, ThrowResult},
    heap::{Heap, HeapData},
    value::{Numeric, Value},
};

/// ToNumeric's primitive half: object-to-primitive coercion is a property
/// access (`Symbol.toPrimitive`/`valueOf`/`toString`) out of this module's
/// scope, so this only classifies values that are already primitive,
/// returning `None` for a `Pointer` the caller must coerce first via
/// `vm::property`.
#[must_use]
pub fn to_numeric_primitive(v: Value, heap: &Heap) -> Option<Numeric> {
    match v {
        Value::Int32(i) => Some(Numeric::Number(f64::from(i))),
        Value::Double(d) => Some(Numeric::Number(d)),
        Value::Bool(b) => Some(Numeric::Number(if b { 1.0 } else { 0.0 })),
        Value::Null => Some(Numeric::Number(0.0)),
        Value::Undefined | Value::Empty => Some(Numeric::Number(f64::NAN)),
        Value::Pointer(id) => match heap.get(id) {
            HeapData::BigInt(b) => Some(Numeric::BigInt(b.clone())),
            HeapData::Str(s) => s.trim().parse::<f64>().ok().map(Numeric::Number).or(Some(Numeric::Number(
                if s.trim().is_empty() { 0.0 } else { f64::NAN },
            ))),
            _ => None,
        },
    }
}

fn mixed_bigint_error() -> EngineError {
    EngineError::type_error("Cannot mix BigInt and other types, use explicit conversions")
}

/// §4.2 "BinaryPlus fast path": `Int32 + Int32` with overflow detection,
/// otherwise the full numeric-or-string-concatenation template. String
/// concatenation itself is a property/heap concern handled by the caller
/// (`vm::dispatch`) since it needs `Heap::allocate`; this only covers the
/// pure-numeric case.
/// §4.2 int32 fast path: `Int32 + Int32`, `None` on overflow (the caller
/// falls back to [`add_numeric`]'s `f64` template).
#[must_use]
pub fn try_add_i32(a: i32, b: i32) -> Option<i32> {
    a.checked_add(b)
}

/// `Int32 - Int32` fast path, `None` on overflow.
#[must_use]
pub fn try_sub_i32(a: i32, b: i32) -> Option<i32> {
    a.checked_sub(b)
}

/// `Int32 * Int32` fast path. Bails to the `f64` template whenever either
/// operand is zero, not just on overflow: `0 * -1` must produce `-0`, which
/// an `i32` result can never represent (§4.2 "BinaryMultiply sign-of-zero
/// edge case").
#[must_use]
pub fn try_mul_i32(a: i32, b: i32) -> Option<i32> {
    if a == 0 || b == 0 {
        return None;
    }
    a.checked_mul(b)
}

pub fn add_numeric(lhs: Numeric, rhs: Numeric) -> ThrowResult<Numeric> {
    match (lhs, rhs) {
        (Numeric::Number(a), Numeric::Number(b)) => Ok(Numeric::Number(a + b)),
        (Numeric::BigInt(a), Numeric::BigInt(b)) => Ok(Numeric::BigInt(a + b)),
        _ => Err(mixed_bigint_error()),
    }
}

pub fn sub_numeric(lhs: Numeric, rhs: Numeric) -> ThrowResult<Numeric> {
    match (lhs, rhs) {
        (Numeric::Number(a), Numeric::Number(b)) => Ok(Numeric::Number(a - b)),
        (Numeric::BigInt(a), Numeric::BigInt(b)) => Ok(Numeric::BigInt(a - b)),
        _ => Err(mixed_bigint_error()),
    }
}

/// §4.2 "BinaryMultiply sign-of-zero edge case": `f64` multiplication
/// already produces signed zero correctly (`-0.0 * 1.0 == -0.0` per IEEE
/// 754), so the only thing this function needs to get right is *not*
/// routing through an integer fast path that would normalize `-0` to `0`
/// before the double multiply runs.
pub fn mul_numeric(lhs: Numeric, rhs: Numeric) -> ThrowResult<Numeric> {
    match (lhs, rhs) {
        (Numeric::Number(a), Numeric::Number(b)) => Ok(Numeric::Number(a * b)),
        (Numeric::BigInt(a), Numeric::BigInt(b)) => Ok(Numeric::BigInt(a * b)),
        _ => Err(mixed_bigint_error()),
    }
}

pub fn div_numeric(lhs: Numeric, rhs: Numeric) -> ThrowResult<Numeric> {
    match (lhs, rhs) {
        (Numeric::Number(a), Numeric::Number(b)) => Ok(Numeric::Number(a / b)),
        (Numeric::BigInt(a), Numeric::BigInt(b)) => {
            if b.is_zero() {
                return Err(EngineError::range_error("Division by zero"));
            }
            Ok(Numeric::BigInt(a / b))
        }
        _ => Err(mixed_bigint_error()),
    }
}

/// `%`. BigInt `% 0` is a `RangeError`, not `NaN` like the `f64` case
/// (§4.2).
pub fn mod_numeric(lhs: Numeric, rhs: Numeric) -> ThrowResult<Numeric> {
    match (lhs, rhs) {
        (Numeric::Number(a), Numeric::Number(b)) => Ok(Numeric::Number(a % b)),
        (Numeric::BigInt(a), Numeric::BigInt(b)) => {
            if b.is_zero() {
                return Err(EngineError::range_error("Division by zero"));
            }
            Ok(Numeric::BigInt(a % b))
        }
        _ => Err(mixed_bigint_error()),
    }
}

/// `**`. §4.2 "legacy `±1 ** ±Infinity` = NaN exception": `f64::powf`
/// returns `1.0` for `1.0f64.powf(f64::INFINITY)` per IEEE 754-2008, but the
/// ECMAScript spec carves out exactly this case to still produce `NaN`
/// (a deliberate divergence from the IEEE default kept for Math.pow
/// compatibility with pre-ES2016 engines), so it is special-cased here
/// rather than delegated to `powf`.
pub fn pow_numeric(lhs: Numeric, rhs: Numeric) -> ThrowResult<Numeric> {
    match (lhs, rhs) {
        (Numeric::Number(a), Numeric::Number(b)) => {
            if a.abs() == 1.0 && b.is_infinite() {
                return Ok(Numeric::Number(f64::NAN));
            }
            Ok(Numeric::Number(a.powf(b)))
        }
        (Numeric::BigInt(a), Numeric::BigInt(b)) => {
            if b.sign() == num_bigint::Sign::Minus {
                return Err(EngineError::range_error("Exponent must be non-negative"));
            }
            let exp = b.to_u32().ok_or_else(|| EngineError::range_error("Exponent too large"))?;
            Ok(Numeric::BigInt(a.pow(exp)))
        }
        _ => Err(mixed_bigint_error()),
    }
}

pub fn bitand_numeric(lhs: Numeric, rhs: Numeric) -> ThrowResult<Numeric> {
    match (lhs, rhs) {
        (Numeric::Number(a), Numeric::Number(b)) => Ok(Numeric::Number(f64::from(to_int32(a) & to_int32(b)))),
        (Numeric::BigInt(a), Numeric::BigInt(b)) => Ok(Numeric::BigInt(a & b)),
        _ => Err(mixed_bigint_error()),
    }
}

pub fn bitor_numeric(lhs: Numeric, rhs: Numeric) -> ThrowResult<Numeric> {
    match (lhs, rhs) {
        (Numeric::Number(a), Numeric::Number(b)) => Ok(Numeric::Number(f64::from(to_int32(a) | to_int32(b)))),
        (Numeric::BigInt(a), Numeric::BigInt(b)) => Ok(Numeric::BigInt(a | b)),
        _ => Err(mixed_bigint_error()),
    }
}

pub fn bitxor_numeric(lhs: Numeric, rhs: Numeric) -> ThrowResult<Numeric> {
    match (lhs, rhs) {
        (Numeric::Number(a), Numeric::Number(b)) => Ok(Numeric::Number(f64::from(to_int32(a) ^ to_int32(b)))),
        (Numeric::BigInt(a), Numeric::BigInt(b)) => Ok(Numeric::BigInt(a ^ b)),
        _ => Err(mixed_bigint_error()),
    }
}

pub fn shl_numeric(lhs: Numeric, rhs: Numeric) -> ThrowResult<Numeric> {
    match (lhs, rhs) {
        (Numeric::Number(a), Numeric::Number(b)) => {
            Ok(Numeric::Number(f64::from(to_int32(a).wrapping_shl(to_uint32(b) & 31))))
        }
        (Numeric::BigInt(a), Numeric::BigInt(b)) => {
            let shift = b.to_u32().ok_or_else(|| EngineError::range_error("shift amount too large"))?;
            Ok(Numeric::BigInt(a << shift))
        }
        _ => Err(mixed_bigint_error()),
    }
}

pub fn sar_numeric(lhs: Numeric, rhs: Numeric) -> ThrowResult<Numeric> {
    match (lhs, rhs) {
        (Numeric::Number(a), Numeric::Number(b)) => {
            Ok(Numeric::Number(f64::from(to_int32(a).wrapping_shr(to_uint32(b) & 31))))
        }
        (Numeric::BigInt(a), Numeric::BigInt(b)) => {
            let shift = b.to_u32().ok_or_else(|| EngineError::range_error("shift amount too large"))?;
            Ok(Numeric::BigInt(a >> shift))
        }
        _ => Err(mixed_bigint_error()),
    }
}

/// `>>>`: BigInt has no unsigned-shift form (it is an error in the language
/// itself, independent of this implementation).
pub fn shr_unsigned_numeric(lhs: Numeric, rhs: Numeric) -> ThrowResult<Numeric> {
    match (lhs, rhs) {
        (Numeric::Number(a), Numeric::Number(b)) => {
            Ok(Numeric::Number(f64::from(to_uint32(a).wrapping_shr(to_uint32(b) & 31))))
        }
        (Numeric::BigInt(_), _) | (_, Numeric::BigInt(_)) => {
            Err(EngineError::type_error("BigInts have no unsigned right shift, use >> instead"))
        }
    }
}

#[must_use]
pub fn to_int32(d: f64) -> i32 {
    if !d.is_finite() {
        return 0;
    }
    let modulo = d.trunc().rem_euclid(4_294_967_296.0);
    if modulo >= 2_147_483_648.0 {
        (modulo - 4_294_967_296.0) as i32
    } else {
        modulo as i32
    }
}

#[must_use]
pub fn to_uint32(d: f64) -> u32 {
    if !d.is_finite() {
        return 0;
    }
    d.trunc().rem_euclid(4_294_967_296.0) as u32
}

pub fn unary_minus(v: Numeric) -> Numeric {
    match v {
        Numeric::Number(n) => Numeric::Number(-n),
        Numeric::BigInt(n) => Numeric::BigInt(-n),
    }
}

pub fn bitwise_not(v: Numeric) -> ThrowResult<Numeric> {
    match v {
        Numeric::Number(n) => Ok(Numeric::Number(f64::from(!to_int32(n)))),
        Numeric::BigInt(n) => Ok(Numeric::BigInt(!n)),
    }
}

/// `typeof` (§4.2). Never throws; the one value with genuinely
/// implementation-defined behavior (an HTMLDDA-marked exotic object
/// reporting `"undefined"`) is explicitly not supported (§9 Open
/// Questions), so every `Pointer` reports by its heap tag instead.
#[must_use]
pub fn type_of(v: Value, heap: &Heap) -> &'static str {
    match v {
        Value::Int32(_) | Value::Double(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Null => "object",
        Value::Undefined | Value::Empty => "undefined",
        Value::Pointer(id) => match heap.get(id) {
            HeapData::Function(_) => "function",
            HeapData::Symbol(_) => "symbol",
            HeapData::BigInt(_) => "bigint",
            HeapData::Str(_) => "string",
            HeapData::Object(_)
            | HeapData::IteratorRecord(_)
            | HeapData::EnumerateObject(_)
            | HeapData::RegExp(_)
            | HeapData::Generator(_) => "object",
        },
    }
}

#[must_use]
pub fn strict_equals(a: Value, b: Value, heap: &Heap) -> bool {
    match (a, b) {
        (Value::Int32(x), Value::Int32(y)) => x == y,
        (Value::Int32(x), Value::Double(y)) | (Value::Double(y), Value::Int32(x)) => f64::from(x) == y,
        (Value::Double(x), Value::Double(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Null, Value::Null) | (Value::Undefined, Value::Undefined) => true,
        (Value::Pointer(x), Value::Pointer(y)) => {
            if x == y {
                return true;
            }
            matches!((heap.get(x), heap.get(y)), (HeapData::Str(a), HeapData::Str(b)) if a == b)
        }
        _ => false,
    }
}

/// Abstract (`==`) equality, restricted to the primitive ladder; an
/// object-to-primitive coercion step is the caller's responsibility since it
/// can invoke user code (§4.2 "slow-path arithmetic template").
#[must_use]
pub fn loose_equals_primitive(a: Value, b: Value, heap: &Heap) -> Option<bool> {
    if std::mem::discriminant(&numeric_tag(a)) == std::mem::discriminant(&numeric_tag(b)) {
        return Some(strict_equals(a, b, heap));
    }
    match (a, b) {
        (Value::Null, Value::Undefined) | (Value::Undefined, Value::Null) => Some(true),
        (Value::Int32(_) | Value::Double(_), Value::Bool(_)) | (Value::Bool(_), Value::Int32(_) | Value::Double(_)) => {
            let an = to_numeric_primitive(a, heap)?;
            let bn = to_numeric_primitive(b, heap)?;
            Some(numeric_eq(&an, &bn))
        }
        _ => None,
    }
}

#[derive(PartialEq)]
enum Tag {
    Num,
    Bool,
    Null,
    Undef,
    Ptr,
}

fn numeric_tag(v: Value) -> Tag {
    match v {
        Value::Int32(_) | Value::Double(_) => Tag::Num,
        Value::Bool(_) => Tag::Bool,
        Value::Null => Tag::Null,
        Value::Undefined | Value::Empty => Tag::Undef,
        Value::Pointer(_) => Tag::Ptr,
    }
}

fn numeric_eq(a: &Numeric, b: &Numeric) -> bool {
    match (a, b) {
        (Numeric::Number(x), Numeric::Number(y)) => x == y,
        (Numeric::BigInt(x), Numeric::BigInt(y)) => x == y,
        (Numeric::Number(x), Numeric::BigInt(y)) | (Numeric::BigInt(y), Numeric::Number(x)) => {
            y.to_f64().is_some_and(|y64| y64 == *x)
        }
    }
}

/// `<`/`<=`/`>`/`>=` on already-coerced numerics. String comparison is the
/// caller's job (it never needs numeric coercion at all).
#[must_use]
pub fn numeric_less_than(a: &Numeric, b: &Numeric) -> Option<bool> {
    match (a, b) {
        (Numeric::Number(x), Numeric::Number(y)) => {
            if x.is_nan() || y.is_nan() {
                None
            } else {
                Some(x < y)
            }
        }
        (Numeric::BigInt(x), Numeric::BigInt(y)) => Some(x < y),
        (Numeric::Number(x), Numeric::BigInt(y)) => {
            if x.is_nan() {
                None
            } else {
                Some(BigInt::from(x.floor() as i64) < *y || (x.fract() != 0.0 && BigInt::from(*x as i64) <= *y))
            }
        }
        (Numeric::BigInt(x), Numeric::Number(y)) => {
            if y.is_nan() {
                None
            } else {
                y.to_f64().map(|y64| (x.to_f64().unwrap_or(f64::NAN)) < y64)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int32_fast_path_add_overflows_to_none() {
        assert_eq!(try_add_i32(1, 2), Some(3));
        assert_eq!(try_add_i32(i32::MAX, 1), None);
    }

    #[test]
    fn int32_fast_path_multiply_bails_on_either_operand_zero() {
        assert_eq!(try_mul_i32(3, 4), Some(12));
        assert_eq!(try_mul_i32(0, -1), None);
        assert_eq!(try_mul_i32(-1, 0), None);
    }

    #[test]
    fn int32_overflow_promotes_to_double_via_caller() {
        // Demonstrates the boundary this module expects the dispatch loop to
        // use: i32::MAX + 1 must be detected as overflow before calling
        // add_numeric, which itself always computes in f64/BigInt.
        let sum = add_numeric(Numeric::Number(f64::from(i32::MAX)), Numeric::Number(1.0)).unwrap();
        assert!(matches!(sum, Numeric::Number(n) if n == 2_147_483_648.0));
    }

    #[test]
    fn mixing_bigint_and_number_is_a_type_error() {
        assert!(add_numeric(Numeric::BigInt(BigInt::from(1)), Numeric::Number(1.0)).is_err());
    }

    #[test]
    fn legacy_pow_infinity_edge_case_is_nan() {
        let r = pow_numeric(Numeric::Number(-1.0), Numeric::Number(f64::INFINITY)).unwrap();
        assert!(matches!(r, Numeric::Number(n) if n.is_nan()));
    }

    #[test]
    fn bigint_mod_zero_is_range_error() {
        assert!(mod_numeric(Numeric::BigInt(BigInt::from(1)), Numeric::BigInt(BigInt::zero())).is_err());
    }
}
