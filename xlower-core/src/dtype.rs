use std::fmt::{self, Debug, Display};

#[cfg(feature = "bfloat")]
use half::bf16;
#[cfg(feature = "half")]
use half::f16;

/// A single element as held by the reference backend.
///
/// Predicate and integral types are kept as exact `i64` values, floating
/// types as `f64`.
#[derive(Clone, Copy, Debug)]
pub enum Scalar {
    Int(i64),
    Float(f64),
}

impl Scalar {
    pub fn from_bool(b: bool) -> Self {
        Self::Int(i64::from(b))
    }

    pub fn to_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(x) => x,
        }
    }

    /// Truncates toward zero and saturates for floating values.
    pub fn to_i64(self) -> i64 {
        match self {
            Self::Int(v) => v,
            Self::Float(x) => x as i64,
        }
    }

    pub fn is_truthy(self) -> bool {
        match self {
            Self::Int(v) => v != 0,
            Self::Float(x) => x != 0.0,
        }
    }

    pub fn is_nan(self) -> bool {
        matches!(self, Self::Float(x) if x.is_nan())
    }

    /// Apply `int` when both operands are integral and `float` otherwise.
    pub fn zip_with(
        self,
        other: Scalar,
        int: impl Fn(i64, i64) -> i64,
        float: impl Fn(f64, f64) -> f64,
    ) -> Scalar {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Self::Int(int(a, b)),
            _ => Self::Float(float(self.to_f64(), other.to_f64())),
        }
    }

    pub fn map(self, int: impl Fn(i64) -> i64, float: impl Fn(f64) -> f64) -> Scalar {
        match self {
            Self::Int(v) => Self::Int(int(v)),
            Self::Float(x) => Self::Float(float(x)),
        }
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            _ => self.to_f64() == other.to_f64(),
        }
    }
}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.partial_cmp(b),
            _ => self.to_f64().partial_cmp(&other.to_f64()),
        }
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(x) => write!(f, "{x:?}"),
        }
    }
}

/// Element type of a graph node.
///
/// The reference backend stores values as [`Scalar`]s and rounds them into the
/// element type's domain with [`ElemType::round`] after each primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElemType {
    Pred,
    U8,
    I32,
    I64,
    F32,
    F64,
    #[cfg(feature = "half")]
    F16,
    #[cfg(feature = "bfloat")]
    BF16,
}

impl ElemType {
    pub fn is_floating(&self) -> bool {
        match self {
            Self::F32 | Self::F64 => true,
            #[cfg(feature = "half")]
            Self::F16 => true,
            #[cfg(feature = "bfloat")]
            Self::BF16 => true,
            Self::Pred | Self::U8 | Self::I32 | Self::I64 => false,
        }
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, Self::U8 | Self::I32 | Self::I64)
    }

    /// Smallest representable value. Floating types use negative infinity so
    /// that it is an identity for `max`.
    pub fn min_value(&self) -> Scalar {
        match self {
            Self::Pred | Self::U8 => Scalar::Int(0),
            Self::I32 => Scalar::Int(i32::MIN.into()),
            Self::I64 => Scalar::Int(i64::MIN),
            _ => Scalar::Float(f64::NEG_INFINITY),
        }
    }

    /// Largest representable value. Floating types use positive infinity so
    /// that it is an identity for `min`.
    pub fn max_value(&self) -> Scalar {
        match self {
            Self::Pred => Scalar::Int(1),
            Self::U8 => Scalar::Int(u8::MAX.into()),
            Self::I32 => Scalar::Int(i32::MAX.into()),
            Self::I64 => Scalar::Int(i64::MAX),
            _ => Scalar::Float(f64::INFINITY),
        }
    }

    /// Round a value into this type's domain.
    ///
    /// Integral values wrap like two's complement; floating values truncate
    /// toward zero and saturate when converted to an integral type.
    pub fn round(&self, x: Scalar) -> Scalar {
        match self {
            Self::Pred => Scalar::from_bool(x.is_truthy()),
            Self::U8 => Scalar::Int(match x {
                Scalar::Int(v) => (v as u8).into(),
                Scalar::Float(f) => (f as u8).into(),
            }),
            Self::I32 => Scalar::Int(match x {
                Scalar::Int(v) => (v as i32).into(),
                Scalar::Float(f) => (f as i32).into(),
            }),
            Self::I64 => Scalar::Int(x.to_i64()),
            Self::F32 => Scalar::Float(x.to_f64() as f32 as f64),
            Self::F64 => Scalar::Float(x.to_f64()),
            #[cfg(feature = "half")]
            Self::F16 => Scalar::Float(f16::from_f64(x.to_f64()).to_f64()),
            #[cfg(feature = "bfloat")]
            Self::BF16 => Scalar::Float(bf16::from_f64(x.to_f64()).to_f64()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Pred => "pred",
            Self::U8 => "u8",
            Self::I32 => "s32",
            Self::I64 => "s64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            #[cfg(feature = "half")]
            Self::F16 => "f16",
            #[cfg(feature = "bfloat")]
            Self::BF16 => "bf16",
        }
    }
}

impl Display for ElemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Host scalar types which can be moved in and out of a [`crate::Tensor`].
pub trait DType: Debug + Copy + Send + Sync + 'static {
    const ZERO: Self;
    const ONE: Self;
    const ELEM: ElemType;

    fn to_scalar(&self) -> Scalar;
    fn from_scalar(x: Scalar) -> Self;
}

macro_rules! int_dtype {
    ($rt:ident, $elem:ident) => {
        impl DType for $rt {
            const ZERO: $rt = 0;
            const ONE: $rt = 1;
            const ELEM: ElemType = ElemType::$elem;

            fn to_scalar(&self) -> Scalar {
                Scalar::Int(*self as i64)
            }
            fn from_scalar(x: Scalar) -> Self {
                match x {
                    Scalar::Int(v) => v as $rt,
                    Scalar::Float(f) => f as $rt,
                }
            }
        }
    };
}

macro_rules! float_dtype {
    ($rt:ident, $elem:ident) => {
        impl DType for $rt {
            const ZERO: $rt = 0.0;
            const ONE: $rt = 1.0;
            const ELEM: ElemType = ElemType::$elem;

            fn to_scalar(&self) -> Scalar {
                Scalar::Float(*self as f64)
            }
            fn from_scalar(x: Scalar) -> Self {
                x.to_f64() as $rt
            }
        }
    };
}

int_dtype!(u8, U8);
int_dtype!(i32, I32);
int_dtype!(i64, I64);
float_dtype!(f32, F32);
float_dtype!(f64, F64);

impl DType for bool {
    const ZERO: bool = false;
    const ONE: bool = true;
    const ELEM: ElemType = ElemType::Pred;

    fn to_scalar(&self) -> Scalar {
        Scalar::from_bool(*self)
    }
    fn from_scalar(x: Scalar) -> Self {
        x.is_truthy()
    }
}

#[cfg(feature = "half")]
impl DType for f16 {
    const ZERO: f16 = f16::from_f64_const(0.0);
    const ONE: f16 = f16::from_f64_const(1.0);
    const ELEM: ElemType = ElemType::F16;

    fn to_scalar(&self) -> Scalar {
        Scalar::Float(self.to_f64_const())
    }
    fn from_scalar(x: Scalar) -> Self {
        Self::from_f64_const(x.to_f64())
    }
}

#[cfg(feature = "bfloat")]
impl DType for bf16 {
    const ZERO: bf16 = bf16::from_f64_const(0.0);
    const ONE: bf16 = bf16::from_f64_const(1.0);
    const ELEM: ElemType = ElemType::BF16;

    fn to_scalar(&self) -> Scalar {
        Scalar::Float(self.to_f64_const())
    }
    fn from_scalar(x: Scalar) -> Self {
        Self::from_f64_const(x.to_f64())
    }
}
