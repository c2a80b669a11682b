#![forbid(unsafe_code)]

use std::fmt;

use ms_layout::LayoutError;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Rows and columns must stay below this bound on every target.
pub const ABSOLUTE_MAX_DIMENSION: u128 = 1 << 63;

/// Rows and columns must stay below this bound on the current target.
#[cfg(target_pointer_width = "64")]
pub const MAX_DIMENSION: u128 = 1 << 63;
#[cfg(not(target_pointer_width = "64"))]
pub const MAX_DIMENSION: u128 = 1 << 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Rows,
    Cols,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows => write!(f, "nrows"),
            Self::Cols => write!(f, "ncols"),
        }
    }
}

/// Validates a requested row or column count and narrows it to `usize`.
pub fn checked_dimension(axis: Axis, value: i128) -> Result<usize, MatrixSpaceError> {
    if value < 0 {
        return Err(RangeError::NegativeDimension { axis, value }.into());
    }
    let unsigned = value.unsigned_abs();
    if unsigned >= ABSOLUTE_MAX_DIMENSION {
        return Err(RangeError::DimensionTooLarge {
            axis,
            value,
            limit: ABSOLUTE_MAX_DIMENSION,
        }
        .into());
    }
    if unsigned >= MAX_DIMENSION {
        return Err(RangeError::DimensionTooLarge {
            axis,
            value,
            limit: MAX_DIMENSION,
        }
        .into());
    }
    usize::try_from(unsigned).map_err(|_| {
        RangeError::DimensionTooLarge {
            axis,
            value,
            limit: MAX_DIMENSION,
        }
        .into()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    num: i64,
    den: i64,
}

impl Rational {
    /// Reduced fraction `num / den`; `None` when `den == 0` or the reduced
    /// form does not fit in `i64`.
    #[must_use]
    pub fn new(num: i64, den: i64) -> Option<Self> {
        if den == 0 {
            return None;
        }
        let (mut n, mut d) = (i128::from(num), i128::from(den));
        if d < 0 {
            n = -n;
            d = -d;
        }
        let g = gcd_i128(n.abs(), d);
        let (n, d) = (n / g, d / g);
        Some(Self {
            num: i64::try_from(n).ok()?,
            den: i64::try_from(d).ok()?,
        })
    }

    #[must_use]
    pub const fn integer(value: i64) -> Self {
        Self { num: value, den: 1 }
    }

    #[must_use]
    pub const fn num(self) -> i64 {
        self.num
    }

    #[must_use]
    pub const fn den(self) -> i64 {
        self.den
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.num == 0
    }

    #[must_use]
    pub const fn is_integer(self) -> bool {
        self.den == 1
    }

    #[must_use]
    pub fn recip(self) -> Option<Self> {
        Self::new(self.den, self.num)
    }

    #[must_use]
    pub fn to_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }

    #[must_use]
    pub fn neg(self) -> Option<Self> {
        Some(Self {
            num: self.num.checked_neg()?,
            den: self.den,
        })
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

fn gcd_i128(mut a: i128, mut b: i128) -> i128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    if a == 0 { 1 } else { a }
}

/// A ring element in the canonical form of the ring that owns it.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Integer(i64),
    Rational(Rational),
    Residue { value: u64, modulus: u64 },
    Real(f64),
    Complex { re: f64, im: f64 },
    Symbol(String),
    Indexed(u64),
}

impl Element {
    #[must_use]
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Integer(value) => *value == 0,
            Self::Rational(value) => value.is_zero(),
            Self::Residue { value, .. } => *value == 0,
            Self::Real(value) => *value == 0.0,
            Self::Complex { re, im } => *re == 0.0 && *im == 0.0,
            Self::Symbol(_) => false,
            Self::Indexed(index) => *index == 0,
        }
    }
}

impl From<i64> for Element {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Element {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<Rational> for Element {
    fn from(value: Rational) -> Self {
        Self::Rational(value)
    }
}

impl From<f64> for Element {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Rational(value) => write!(f, "{value}"),
            Self::Residue { value, .. } => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value:?}"),
            Self::Complex { re, im } => write!(f, "{re:?} + {im:?}*I"),
            Self::Symbol(name) => write!(f, "{name}"),
            Self::Indexed(index) => match index {
                0 | 1 => write!(f, "{index}"),
                _ => write!(f, "e{index}"),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    Finite(u64),
    Infinite,
}

/// Coefficient domain of a matrix space.
///
/// The variants form the closed set of ring families the representation
/// selector distinguishes; anything else is described by `Generic`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Ring {
    Integers,
    Rationals,
    Cyclotomic { conductor: u32 },
    RealDouble,
    ComplexDouble,
    IntegerMod { modulus: u64 },
    MPolynomial { base: Box<Ring>, variables: u32 },
    Symbolic,
    Generic { name: String, order: Option<u64> },
}

impl Ring {
    pub fn integer_mod(modulus: u64) -> Result<Self, MatrixSpaceError> {
        let ring = Self::IntegerMod { modulus };
        ring.validate()?;
        Ok(ring)
    }

    pub fn cyclotomic(conductor: u32) -> Result<Self, MatrixSpaceError> {
        let ring = Self::Cyclotomic { conductor };
        ring.validate()?;
        Ok(ring)
    }

    pub fn mpolynomial(base: Ring, variables: u32) -> Result<Self, MatrixSpaceError> {
        let ring = Self::MPolynomial {
            base: Box::new(base),
            variables,
        };
        ring.validate()?;
        Ok(ring)
    }

    pub fn generic(name: impl Into<String>, order: Option<u64>) -> Result<Self, MatrixSpaceError> {
        let ring = Self::Generic {
            name: name.into(),
            order,
        };
        ring.validate()?;
        Ok(ring)
    }

    /// Checks that the descriptor names an actual ring.
    pub fn validate(&self) -> Result<(), MatrixSpaceError> {
        let reason = match self {
            Self::IntegerMod { modulus: 0 } => "integer-mod ring needs a positive modulus",
            Self::Cyclotomic { conductor: 0 } => "cyclotomic field needs a positive conductor",
            Self::MPolynomial { variables: 0, .. } => "polynomial ring needs at least one variable",
            Self::MPolynomial { base, .. } => return base.validate(),
            Self::Generic { name, .. } if name.trim().is_empty() => "generic ring needs a name",
            Self::Generic { order: Some(0), .. } => "a ring has at least one element",
            _ => return Ok(()),
        };
        Err(ConfigError::InvalidRing {
            reason: reason.to_string(),
        }
        .into())
    }

    #[must_use]
    pub fn zero(&self) -> Element {
        match self {
            Self::Integers => Element::Integer(0),
            Self::Rationals | Self::Cyclotomic { .. } | Self::Symbolic => {
                Element::Rational(Rational::integer(0))
            }
            Self::RealDouble => Element::Real(0.0),
            Self::ComplexDouble => Element::Complex { re: 0.0, im: 0.0 },
            Self::IntegerMod { modulus } => Element::Residue {
                value: 0,
                modulus: *modulus,
            },
            Self::MPolynomial { base, .. } => base.zero(),
            Self::Generic { .. } => Element::Indexed(0),
        }
    }

    #[must_use]
    pub fn one(&self) -> Element {
        match self {
            Self::Integers => Element::Integer(1),
            Self::Rationals | Self::Cyclotomic { .. } | Self::Symbolic => {
                Element::Rational(Rational::integer(1))
            }
            Self::RealDouble => Element::Real(1.0),
            Self::ComplexDouble => Element::Complex { re: 1.0, im: 0.0 },
            Self::IntegerMod { modulus } => Element::Residue {
                value: u64::from(*modulus > 1),
                modulus: *modulus,
            },
            Self::MPolynomial { base, .. } => base.one(),
            Self::Generic { order, .. } => Element::Indexed(u64::from(*order != Some(1))),
        }
    }

    #[must_use]
    pub fn order(&self) -> Cardinality {
        match self {
            Self::IntegerMod { modulus } => Cardinality::Finite(*modulus),
            Self::Generic {
                order: Some(order), ..
            } => Cardinality::Finite(*order),
            _ => Cardinality::Infinite,
        }
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        matches!(self.order(), Cardinality::Finite(_))
    }

    #[must_use]
    pub fn is_field(&self) -> bool {
        match self {
            Self::Rationals
            | Self::Cyclotomic { .. }
            | Self::RealDouble
            | Self::ComplexDouble
            | Self::Symbolic => true,
            Self::IntegerMod { modulus } => is_prime(*modulus),
            Self::Integers | Self::MPolynomial { .. } | Self::Generic { .. } => false,
        }
    }

    /// Whether [`Ring::elements`] can list this ring.
    #[must_use]
    pub fn is_enumerable(&self) -> bool {
        matches!(
            self,
            Self::Integers | Self::Rationals | Self::IntegerMod { .. } | Self::Generic { .. }
        )
    }

    /// Fresh iteration over the ring, starting with zero and then one.
    pub fn elements(&self) -> Result<RingElements, MatrixSpaceError> {
        let source = match self {
            Self::Integers => ElementSource::Integers,
            Self::Rationals => ElementSource::Rationals {
                current: Rational::integer(1),
                negate_next: false,
            },
            Self::IntegerMod { modulus } => ElementSource::Residues { modulus: *modulus },
            Self::Generic { order, .. } => ElementSource::Indexed { order: *order },
            _ => {
                return Err(UnsupportedError::IterationUnsupported {
                    ring: self.to_string(),
                }
                .into());
            }
        };
        Ok(RingElements {
            source,
            index: 0,
            done: false,
        })
    }

    /// Maps `element` into this ring's canonical element form.
    pub fn coerce(&self, element: &Element) -> Result<Element, MatrixSpaceError> {
        let coerced = match (self, element) {
            (Self::Integers, Element::Integer(value)) => Some(Element::Integer(*value)),
            (Self::Integers, Element::Rational(value)) if value.is_integer() => {
                Some(Element::Integer(value.num()))
            }
            (
                Self::Rationals | Self::Cyclotomic { .. } | Self::Symbolic,
                Element::Integer(value),
            ) => Some(Element::Rational(Rational::integer(*value))),
            (
                Self::Rationals | Self::Cyclotomic { .. } | Self::Symbolic,
                Element::Rational(value),
            ) => Some(Element::Rational(*value)),
            (Self::IntegerMod { modulus }, Element::Integer(value)) => Some(Element::Residue {
                value: reduce_mod(i128::from(*value), *modulus),
                modulus: *modulus,
            }),
            (Self::IntegerMod { modulus }, Element::Rational(value)) => {
                let num = reduce_mod(i128::from(value.num()), *modulus);
                let den = reduce_mod(i128::from(value.den()), *modulus);
                inverse_mod(den, *modulus).map(|inv| Element::Residue {
                    value: mul_mod(num, inv, *modulus),
                    modulus: *modulus,
                })
            }
            (
                Self::IntegerMod { modulus },
                Element::Residue {
                    value,
                    modulus: source,
                },
            ) if source % modulus == 0 => Some(Element::Residue {
                value: value % modulus,
                modulus: *modulus,
            }),
            (Self::RealDouble, Element::Integer(value)) => Some(Element::Real(*value as f64)),
            (Self::RealDouble, Element::Rational(value)) => Some(Element::Real(value.to_f64())),
            (Self::RealDouble, Element::Real(value)) => Some(Element::Real(*value)),
            (Self::ComplexDouble, Element::Integer(value)) => Some(Element::Complex {
                re: *value as f64,
                im: 0.0,
            }),
            (Self::ComplexDouble, Element::Rational(value)) => Some(Element::Complex {
                re: value.to_f64(),
                im: 0.0,
            }),
            (Self::ComplexDouble, Element::Real(value)) => Some(Element::Complex {
                re: *value,
                im: 0.0,
            }),
            (Self::ComplexDouble, Element::Complex { re, im }) => {
                Some(Element::Complex { re: *re, im: *im })
            }
            (Self::Symbolic, Element::Real(_) | Element::Complex { .. }) => Some(element.clone()),
            (
                Self::Cyclotomic { .. } | Self::MPolynomial { .. } | Self::Symbolic,
                Element::Symbol(name),
            ) => Some(Element::Symbol(name.clone())),
            (Self::MPolynomial { base, .. }, _) => base.coerce(element).ok(),
            (Self::Generic { order, .. }, Element::Indexed(index))
                if order.is_none_or(|order| *index < order) =>
            {
                Some(Element::Indexed(*index))
            }
            (Self::Generic { .. }, Element::Integer(0)) => Some(self.zero()),
            (Self::Generic { .. }, Element::Integer(1)) => Some(self.one()),
            _ => None,
        };
        coerced.ok_or_else(|| {
            ConfigError::ElementNotInRing {
                element: element.to_string(),
                ring: self.to_string(),
            }
            .into()
        })
    }

    /// Whether elements of `from` embed into this ring, value preserving.
    #[must_use]
    pub fn has_coerce_map_from(&self, from: &Ring) -> bool {
        if self == from {
            return true;
        }
        match (self, from) {
            (_, Self::Integers) => true,
            (
                Self::Rationals
                | Self::Cyclotomic { .. }
                | Self::RealDouble
                | Self::ComplexDouble
                | Self::Symbolic,
                Self::Rationals,
            ) => true,
            (Self::ComplexDouble | Self::Symbolic, Self::RealDouble) => true,
            (Self::Symbolic, Self::ComplexDouble) => true,
            (Self::Cyclotomic { conductor: to }, Self::Cyclotomic { conductor: from }) => {
                to % from == 0
            }
            (Self::ComplexDouble | Self::Symbolic, Self::Cyclotomic { .. }) => true,
            (Self::IntegerMod { modulus: to }, Self::IntegerMod { modulus: from }) => {
                from % to == 0
            }
            (
                Self::MPolynomial {
                    base: to_base,
                    variables: to_vars,
                },
                Self::MPolynomial {
                    base: from_base,
                    variables: from_vars,
                },
            ) => from_vars <= to_vars && to_base.has_coerce_map_from(from_base),
            (Self::MPolynomial { base, .. }, _) => base.has_coerce_map_from(from),
            (Self::Symbolic, Self::MPolynomial { base, .. }) => self.has_coerce_map_from(base),
            _ => false,
        }
    }

    /// A random element; `bound` limits the magnitude of integer parts and
    /// the index range of infinite generic rings.
    pub fn random_element<R>(&self, rng: &mut R, bound: u64) -> Element
    where
        R: Rng + ?Sized,
    {
        let bound = i64::try_from(bound.max(1)).unwrap_or(i64::MAX);
        match self {
            Self::Integers => Element::Integer(rng.gen_range(-bound..=bound)),
            Self::Rationals | Self::Cyclotomic { .. } | Self::Symbolic => {
                let num = rng.gen_range(-bound..=bound);
                let den = rng.gen_range(1..=bound);
                Element::Rational(Rational::new(num, den).unwrap_or(Rational::integer(num)))
            }
            Self::RealDouble => Element::Real(rng.gen_range(-1.0..=1.0)),
            Self::ComplexDouble => Element::Complex {
                re: rng.gen_range(-1.0..=1.0),
                im: rng.gen_range(-1.0..=1.0),
            },
            Self::IntegerMod { modulus } => Element::Residue {
                value: rng.gen_range(0..*modulus),
                modulus: *modulus,
            },
            Self::MPolynomial { base, .. } => base.random_element(rng, bound.unsigned_abs()),
            Self::Generic {
                order: Some(order), ..
            } => Element::Indexed(rng.gen_range(0..*order)),
            Self::Generic { order: None, .. } => {
                Element::Indexed(rng.gen_range(0..=bound.unsigned_abs()))
            }
        }
    }

    /// Multiplicative inverse of `element` when it is a unit.
    #[must_use]
    pub fn unit_inverse(&self, element: &Element) -> Option<Element> {
        if *element == self.one() {
            return Some(element.clone());
        }
        match element {
            Element::Integer(-1) => Some(Element::Integer(-1)),
            Element::Integer(_) => None,
            Element::Rational(value) if self.is_field() => value.recip().map(Element::Rational),
            Element::Rational(_) => None,
            Element::Residue { value, modulus } => {
                inverse_mod(*value, *modulus).map(|inv| Element::Residue {
                    value: inv,
                    modulus: *modulus,
                })
            }
            Element::Real(value) if *value != 0.0 => Some(Element::Real(1.0 / value)),
            Element::Complex { re, im } if *re != 0.0 || *im != 0.0 => {
                let norm = re * re + im * im;
                Some(Element::Complex {
                    re: re / norm,
                    im: -im / norm,
                })
            }
            Element::Real(_)
            | Element::Complex { .. }
            | Element::Symbol(_)
            | Element::Indexed(_) => None,
        }
    }
}

impl fmt::Display for Ring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integers => write!(f, "Integer Ring"),
            Self::Rationals => write!(f, "Rational Field"),
            Self::Cyclotomic { conductor } => write!(f, "Cyclotomic Field of order {conductor}"),
            Self::RealDouble => write!(f, "Real Double Field"),
            Self::ComplexDouble => write!(f, "Complex Double Field"),
            Self::IntegerMod { modulus } if is_prime(*modulus) => {
                write!(f, "Finite Field of size {modulus}")
            }
            Self::IntegerMod { modulus } => write!(f, "Ring of integers modulo {modulus}"),
            Self::MPolynomial { base, variables } => {
                let names = (0..*variables)
                    .map(|idx| format!("x{idx}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "Multivariate Polynomial Ring in {names} over {base}")
            }
            Self::Symbolic => write!(f, "Symbolic Ring"),
            Self::Generic { name, .. } => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone)]
enum ElementSource {
    Integers,
    Rationals {
        current: Rational,
        negate_next: bool,
    },
    Residues {
        modulus: u64,
    },
    Indexed {
        order: Option<u64>,
    },
}

/// Iteration over the elements of an enumerable ring.
#[derive(Debug, Clone)]
pub struct RingElements {
    source: ElementSource,
    index: u64,
    done: bool,
}

impl Iterator for RingElements {
    type Item = Element;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let index = self.index;
        let produced = match &mut self.source {
            ElementSource::Integers => integer_at(index).map(Element::Integer),
            ElementSource::Rationals {
                current,
                negate_next,
            } => {
                if index == 0 {
                    Some(Element::Rational(Rational::integer(0)))
                } else if *negate_next {
                    let value = current.neg();
                    *negate_next = false;
                    let emitted = value.map(Element::Rational);
                    match calkin_wilf_next(*current) {
                        Some(next) => *current = next,
                        None => self.done = true,
                    }
                    emitted
                } else {
                    *negate_next = true;
                    Some(Element::Rational(*current))
                }
            }
            ElementSource::Residues { modulus } => (index < *modulus).then_some(Element::Residue {
                value: index,
                modulus: *modulus,
            }),
            ElementSource::Indexed { order } => order
                .is_none_or(|order| index < order)
                .then_some(Element::Indexed(index)),
        };
        match produced {
            Some(element) => {
                match self.index.checked_add(1) {
                    Some(next) => self.index = next,
                    None => self.done = true,
                }
                Some(element)
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

fn integer_at(index: u64) -> Option<i64> {
    if index == 0 {
        return Some(0);
    }
    let magnitude = i64::try_from(index.div_ceil(2)).ok()?;
    if index % 2 == 1 {
        Some(magnitude)
    } else {
        Some(-magnitude)
    }
}

fn calkin_wilf_next(current: Rational) -> Option<Rational> {
    let floor = current.num() / current.den();
    let den = floor
        .checked_mul(2)?
        .checked_add(1)?
        .checked_mul(current.den())?
        .checked_sub(current.num())?;
    Rational::new(current.den(), den)
}

fn reduce_mod(value: i128, modulus: u64) -> u64 {
    let reduced = value.rem_euclid(i128::from(modulus));
    u64::try_from(reduced).unwrap_or(0)
}

fn mul_mod(lhs: u64, rhs: u64, modulus: u64) -> u64 {
    let product = u128::from(lhs) * u128::from(rhs) % u128::from(modulus);
    u64::try_from(product).unwrap_or(0)
}

fn inverse_mod(value: u64, modulus: u64) -> Option<u64> {
    if modulus == 1 {
        return Some(0);
    }
    let (mut old_r, mut r) = (i128::from(value % modulus), i128::from(modulus));
    let (mut old_s, mut s) = (1i128, 0i128);
    while r != 0 {
        let quotient = old_r / r;
        (old_r, r) = (r, old_r - quotient * r);
        (old_s, s) = (s, old_s - quotient * s);
    }
    if old_r != 1 {
        return None;
    }
    Some(reduce_mod(old_s, modulus))
}

fn pow_mod(mut base: u64, mut exp: u64, modulus: u64) -> u64 {
    let mut acc = 1u64 % modulus;
    base %= modulus;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = mul_mod(acc, base, modulus);
        }
        base = mul_mod(base, base, modulus);
        exp >>= 1;
    }
    acc
}

/// Deterministic Miller-Rabin, exact for every `u64`.
#[must_use]
pub fn is_prime(n: u64) -> bool {
    const WITNESSES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];
    if n < 2 {
        return false;
    }
    for p in WITNESSES {
        if n % p == 0 {
            return n == p;
        }
    }
    let mut d = n - 1;
    let mut s = 0u32;
    while d % 2 == 0 {
        d /= 2;
        s += 1;
    }
    'witness: for a in WITNESSES {
        let mut x = pow_mod(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..s {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Range,
    Shape,
    UnsupportedOperation,
    State,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    InvalidRing { reason: String },
    ElementNotInRing { element: String, ring: String },
    InvalidDensity { density: f64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRing { reason } => write!(f, "base ring must be a ring: {reason}"),
            Self::ElementNotInRing { element, ring } => {
                write!(f, "cannot coerce {element} into {ring}")
            }
            Self::InvalidDensity { density } => {
                write!(f, "density must lie in [0, 1], got {density}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    NegativeDimension {
        axis: Axis,
        value: i128,
    },
    DimensionTooLarge {
        axis: Axis,
        value: i128,
        limit: u128,
    },
    TooManyEntries {
        rows: usize,
        cols: usize,
    },
    CountOverflow {
        order: u64,
        exponent: u128,
    },
}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NegativeDimension { axis, value } => {
                write!(f, "{axis} must be nonnegative, got {value}")
            }
            Self::DimensionTooLarge { axis, value, limit } => {
                let bits = limit.trailing_zeros();
                write!(
                    f,
                    "number of rows and columns must be less than 2^{bits}, {axis}={value}"
                )
            }
            Self::TooManyEntries { rows, cols } => {
                write!(
                    f,
                    "a {rows}x{cols} matrix has too many entries to store densely"
                )
            }
            Self::CountOverflow { order, exponent } => {
                write!(
                    f,
                    "{order}^{exponent} elements do not fit in a machine word"
                )
            }
        }
    }
}

impl std::error::Error for RangeError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeError {
    NotSquare {
        rows: usize,
        cols: usize,
    },
    VectorLength {
        rows: usize,
        cols: usize,
        actual: usize,
    },
    VectorCount {
        expected: usize,
        actual: usize,
    },
    FlatLength {
        expected: usize,
        actual: usize,
    },
    CoordinateOutOfRange {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },
    GeneratorOutOfRange {
        index: u128,
        count: u128,
    },
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSquare { rows, cols } => {
                write!(
                    f,
                    "self must be a space of square matrices, got {rows}x{cols}"
                )
            }
            Self::VectorLength { rows, cols, actual } => write!(
                f,
                "incorrect dimensions: vector of length {actual} fits neither {rows} rows nor {cols} columns"
            ),
            Self::VectorCount { expected, actual } => {
                write!(f, "expected {expected} vectors, got {actual}")
            }
            Self::FlatLength { expected, actual } => {
                write!(
                    f,
                    "entries has the wrong length: expected={expected}, actual={actual}"
                )
            }
            Self::CoordinateOutOfRange {
                row,
                col,
                rows,
                cols,
            } => write!(f, "index ({row}, {col}) is outside a {rows}x{cols} matrix"),
            Self::GeneratorOutOfRange { index, count } => {
                write!(
                    f,
                    "generator index {index} out of range for {count} generators"
                )
            }
        }
    }
}

impl std::error::Error for ShapeError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsupportedError {
    NoBaseExtension {
        from: String,
        to: String,
    },
    NoCoercion {
        from: String,
        to: String,
    },
    IterationUnsupported {
        ring: String,
    },
    InfiniteLength {
        ring: String,
    },
    NoNonzeroElements {
        ring: String,
    },
    NotInvertible {
        rows: usize,
        cols: usize,
    },
    Arithmetic {
        operation: &'static str,
        rows: usize,
        cols: usize,
    },
}

impl fmt::Display for UnsupportedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoBaseExtension { from, to } => {
                write!(f, "no base extension defined from {from} to {to}")
            }
            Self::NoCoercion { from, to } => write!(f, "no canonical coercion from {from} to {to}"),
            Self::IterationUnsupported { ring } => {
                write!(f, "object does not support iteration: {ring}")
            }
            Self::InfiniteLength { ring } => {
                write!(f, "len() of unsized object: matrices over {ring}")
            }
            Self::NoNonzeroElements { ring } => {
                write!(f, "{ring} has no nonzero elements to sample")
            }
            Self::NotInvertible { rows, cols } => {
                write!(f, "{rows}x{cols} matrix is not invertible")
            }
            Self::Arithmetic {
                operation,
                rows,
                cols,
            } => write!(
                f,
                "{operation} of a {rows}x{cols} matrix belongs to the matrix arithmetic backend"
            ),
        }
    }
}

impl std::error::Error for UnsupportedError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    Immutable,
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immutable => write!(
                f,
                "matrix is immutable; please change a copy instead (i.e., use copy(M) to change a copy of M)"
            ),
        }
    }
}

impl std::error::Error for StateError {}

#[derive(Debug, Clone, PartialEq)]
pub enum MatrixSpaceError {
    Config(ConfigError),
    Range(RangeError),
    Shape(ShapeError),
    Unsupported(UnsupportedError),
    State(StateError),
}

impl MatrixSpaceError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Range(_) => ErrorKind::Range,
            Self::Shape(_) => ErrorKind::Shape,
            Self::Unsupported(_) => ErrorKind::UnsupportedOperation,
            Self::State(_) => ErrorKind::State,
        }
    }
}

impl fmt::Display for MatrixSpaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(error) => write!(f, "config error: {error}"),
            Self::Range(error) => write!(f, "range error: {error}"),
            Self::Shape(error) => write!(f, "shape error: {error}"),
            Self::Unsupported(error) => write!(f, "unsupported operation: {error}"),
            Self::State(error) => write!(f, "state error: {error}"),
        }
    }
}

impl std::error::Error for MatrixSpaceError {}

impl From<ConfigError> for MatrixSpaceError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<RangeError> for MatrixSpaceError {
    fn from(value: RangeError) -> Self {
        Self::Range(value)
    }
}

impl From<ShapeError> for MatrixSpaceError {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}

impl From<UnsupportedError> for MatrixSpaceError {
    fn from(value: UnsupportedError) -> Self {
        Self::Unsupported(value)
    }
}

impl From<StateError> for MatrixSpaceError {
    fn from(value: StateError) -> Self {
        Self::State(value)
    }
}

impl From<LayoutError> for MatrixSpaceError {
    fn from(value: LayoutError) -> Self {
        match value {
            LayoutError::FlatLengthMismatch { expected, actual } => {
                ShapeError::FlatLength { expected, actual }.into()
            }
            LayoutError::CoordinateOutOfRange {
                row,
                col,
                rows,
                cols,
            } => ShapeError::CoordinateOutOfRange {
                row,
                col,
                rows,
                cols,
            }
            .into(),
            LayoutError::SizeOverflow { rows, cols } => {
                RangeError::TooManyEntries { rows, cols }.into()
            }
        }
    }
}
