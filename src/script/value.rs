use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Divisor magnitudes below this limit are treated as zero.
const ZERO_LIMIT: f64 = 1e-20;

/// Numeric failures raised while coercing or combining scalars.
#[derive(Debug, Error, PartialEq)]
pub enum ValueError {
    #[error("cannot parse `{0}` as an integer or a double")]
    BadNumber(String),
    #[error("division by zero")]
    DivByZero,
}

/// The storage of a [`NumValue`]: an integer, a double, or a string that
/// is parsed lazily when the value takes part in arithmetic. `Null` reads
/// as integer zero.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Scalar {
    #[default]
    Null,
    Int(i64),
    Double(f64),
    Text(String),
}

/// Resolved form of a scalar: its double image plus whether the original
/// carried a double tag. Any double operand promotes the result.
#[derive(Debug, Clone, Copy)]
struct Resolved {
    double: bool,
    value: f64,
}

impl Scalar {
    fn resolve(&self) -> Result<Resolved, ValueError> {
        match self {
            Scalar::Null => Ok(Resolved { double: false, value: 0.0 }),
            Scalar::Int(i) => Ok(Resolved { double: false, value: *i as f64 }),
            Scalar::Double(d) => Ok(Resolved { double: true, value: *d }),
            Scalar::Text(s) => {
                if let Ok(i) = s.parse::<i64>() {
                    Ok(Resolved { double: false, value: i as f64 })
                } else if let Ok(d) = s.parse::<f64>() {
                    Ok(Resolved { double: true, value: d })
                } else {
                    Err(ValueError::BadNumber(s.clone()))
                }
            }
        }
    }

    /// The double image of this scalar, parsing strings on demand.
    pub fn to_f64(&self) -> Result<f64, ValueError> {
        Ok(self.resolve()?.value)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("0"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Double(d) => f.write_str(&fmt_double(*d)),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

/// Formats a double so that whole values keep a visible decimal point
/// (`3.0`, not `3`), preserving the integer/double distinction in output.
pub(crate) fn fmt_double(d: f64) -> String {
    if d.is_finite() && d.fract() == 0.0 && d.abs() < 1e15 {
        format!("{d:.1}")
    } else {
        format!("{d}")
    }
}

/// A dynamically typed numeric wrapper with in-place arithmetic.
///
/// Both operands are coerced to doubles; the result is truncated back to
/// an integer unless either side carried a double tag. Strings are parsed
/// integer-first, double-second; unparseable strings fail with
/// [`ValueError::BadNumber`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NumValue {
    value: Scalar,
}

impl NumValue {
    pub fn new(value: Scalar) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &Scalar {
        &self.value
    }

    pub fn set_value(&mut self, value: Scalar) {
        self.value = value;
    }

    pub fn into_scalar(self) -> Scalar {
        self.value
    }

    /// Adds `other` to the wrapped value.
    pub fn increment(&mut self, other: &Scalar) -> Result<(), ValueError> {
        self.apply(other, |a, b| a + b)
    }

    /// Subtracts `other` from the wrapped value.
    pub fn decrement(&mut self, other: &Scalar) -> Result<(), ValueError> {
        self.apply(other, |a, b| a - b)
    }

    /// Multiplies the wrapped value by `other`.
    pub fn multiply(&mut self, other: &Scalar) -> Result<(), ValueError> {
        self.apply(other, |a, b| a * b)
    }

    /// Divides the wrapped value by `other`.
    ///
    /// # Errors
    ///
    /// Fails with [`ValueError::DivByZero`] if the divisor magnitude is
    /// below `1e-20`, and with [`ValueError::BadNumber`] if either side is
    /// an unparseable string.
    pub fn divide(&mut self, other: &Scalar) -> Result<(), ValueError> {
        if other.resolve()?.value.abs() < ZERO_LIMIT {
            return Err(ValueError::DivByZero);
        }
        self.apply(other, |a, b| a / b)
    }

    /// Compares the wrapped value with `other` on their double images.
    pub fn compare(&self, other: &Scalar) -> Result<Ordering, ValueError> {
        let a = self.value.resolve()?;
        let b = other.resolve()?;
        Ok(a.value.total_cmp(&b.value))
    }

    fn apply(&mut self, other: &Scalar, op: fn(f64, f64) -> f64) -> Result<(), ValueError> {
        let a = self.value.resolve()?;
        let b = other.resolve()?;
        let result = op(a.value, b.value);
        self.value = if a.double || b.double {
            Scalar::Double(result)
        } else {
            // Integer arithmetic truncates toward zero, matching whole
            // number division of the double images.
            Scalar::Int(result as i64)
        };
        Ok(())
    }
}

impl fmt::Display for NumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

impl From<i64> for NumValue {
    fn from(i: i64) -> Self {
        NumValue::new(Scalar::Int(i))
    }
}

impl From<f64> for NumValue {
    fn from(d: f64) -> Self {
        NumValue::new(Scalar::Double(d))
    }
}
