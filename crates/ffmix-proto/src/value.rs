//! Typed parameter values and signatures.
//!
//! A parameter value is a homogeneous list of scalars: integers, floats, or
//! strings. Scalar parameters are one-element lists; vector parameters carry
//! a fixed length declared up front. The GUI wire format is always the flat
//! list form.

use serde::{Deserialize, Serialize};

use crate::ProtoError;

/// Scalar kind of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kind {
    Int,
    Float,
    Str,
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Kind::Int => write!(f, "int"),
            Kind::Float => write!(f, "float"),
            Kind::Str => write!(f, "str"),
        }
    }
}

/// Type signature of a parameter: scalar kind plus fixed length.
///
/// A length of 1 is a scalar; anything else is a fixed-length vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub kind: Kind,
    pub len: usize,
}

impl Signature {
    pub const fn int() -> Self {
        Self { kind: Kind::Int, len: 1 }
    }

    pub const fn float() -> Self {
        Self { kind: Kind::Float, len: 1 }
    }

    pub const fn text() -> Self {
        Self { kind: Kind::Str, len: 1 }
    }

    pub const fn int_vec(len: usize) -> Self {
        Self { kind: Kind::Int, len }
    }

    pub const fn float_vec(len: usize) -> Self {
        Self { kind: Kind::Float, len }
    }

    pub fn is_scalar(&self) -> bool {
        self.len == 1
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.len == 1 {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}[{}]", self.kind, self.len)
        }
    }
}

/// A parameter value: a homogeneous flat list of scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Str(Vec<String>),
}

impl Value {
    pub fn int(v: i64) -> Self {
        Value::Int(vec![v])
    }

    pub fn float(v: f64) -> Self {
        Value::Float(vec![v])
    }

    pub fn text(v: impl Into<String>) -> Self {
        Value::Str(vec![v.into()])
    }

    pub fn ints(v: Vec<i64>) -> Self {
        Value::Int(v)
    }

    pub fn floats(v: Vec<f64>) -> Self {
        Value::Float(v)
    }

    pub fn kind(&self) -> Kind {
        match self {
            Value::Int(_) => Kind::Int,
            Value::Float(_) => Kind::Float,
            Value::Str(_) => Kind::Str,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Value::Int(v) => v.len(),
            Value::Float(v) => v.len(),
            Value::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn signature(&self) -> Signature {
        Signature { kind: self.kind(), len: self.len() }
    }

    /// First element as an integer (Int values only).
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => v.first().copied(),
            _ => None,
        }
    }

    /// First element as a float (Int and Float values).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => v.first().map(|x| *x as f64),
            Value::Float(v) => v.first().copied(),
            Value::Str(_) => None,
        }
    }

    /// First element as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => v.first().map(|s| s.as_str()),
            _ => None,
        }
    }

    /// Truthiness of the first scalar: nonzero number or non-empty string.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(v) => v.first().is_some_and(|x| *x != 0),
            Value::Float(v) => v.first().is_some_and(|x| *x != 0.0),
            Value::Str(v) => v.first().is_some_and(|s| !s.is_empty()),
        }
    }

    /// Coerce this value to a target signature where lossless.
    ///
    /// Int widens to Float freely; Float narrows to Int only when every
    /// element has no fractional part. Lengths must match exactly.
    pub fn coerce_to(&self, sig: &Signature) -> Option<Value> {
        if self.len() != sig.len {
            return None;
        }
        match (self, sig.kind) {
            (Value::Int(_), Kind::Int) | (Value::Float(_), Kind::Float) | (Value::Str(_), Kind::Str) => {
                Some(self.clone())
            }
            (Value::Int(v), Kind::Float) => Some(Value::Float(v.iter().map(|x| *x as f64).collect())),
            (Value::Float(v), Kind::Int) => {
                if v.iter().all(|x| x.fract() == 0.0) {
                    Some(Value::Int(v.iter().map(|x| *x as i64).collect()))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Render for the hardware protocol: comma-joined scalars.
    pub fn to_cset_arg(&self) -> String {
        match self {
            Value::Int(v) => v.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(","),
            Value::Float(v) => v.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(","),
            Value::Str(v) => v.join(","),
        }
    }

    /// Convert to OSC argument list.
    pub fn to_osc_args(&self) -> Vec<rosc::OscType> {
        match self {
            Value::Int(v) => v.iter().map(|x| rosc::OscType::Long(*x)).collect(),
            Value::Float(v) => v.iter().map(|x| rosc::OscType::Double(*x)).collect(),
            Value::Str(v) => v.iter().map(|s| rosc::OscType::String(s.clone())).collect(),
        }
    }

    /// Build a value from OSC arguments.
    ///
    /// Integer and float argument widths are normalized; a mix of ints and
    /// floats becomes Float (GUI sliders send whichever is convenient).
    pub fn from_osc_args(args: &[rosc::OscType]) -> Result<Value, ProtoError> {
        use rosc::OscType;

        if args.is_empty() {
            return Err(ProtoError::EmptyArgs);
        }

        let mut ints: Vec<i64> = Vec::new();
        let mut floats: Vec<f64> = Vec::new();
        let mut strings: Vec<String> = Vec::new();
        let mut saw_float = false;

        for arg in args {
            match arg {
                OscType::Int(v) => {
                    ints.push(*v as i64);
                    floats.push(*v as f64);
                }
                OscType::Long(v) => {
                    ints.push(*v);
                    floats.push(*v as f64);
                }
                OscType::Float(v) => {
                    saw_float = true;
                    floats.push(*v as f64);
                }
                OscType::Double(v) => {
                    saw_float = true;
                    floats.push(*v);
                }
                OscType::String(s) => strings.push(s.clone()),
                OscType::Bool(b) => {
                    ints.push(*b as i64);
                    floats.push(*b as i64 as f64);
                }
                _ => return Err(ProtoError::UnsupportedType(osc_type_name(arg))),
            }
        }

        if !strings.is_empty() {
            if strings.len() != args.len() {
                return Err(ProtoError::MixedTypes);
            }
            return Ok(Value::Str(strings));
        }
        if saw_float {
            if floats.len() != args.len() {
                return Err(ProtoError::MixedTypes);
            }
            return Ok(Value::Float(floats));
        }
        Ok(Value::Int(ints))
    }
}

fn osc_type_name(t: &rosc::OscType) -> &'static str {
    use rosc::OscType;
    match t {
        OscType::Blob(_) => "blob",
        OscType::Time(_) => "time",
        OscType::Char(_) => "char",
        OscType::Midi(_) => "midi",
        OscType::Color(_) => "color",
        OscType::Array(_) => "array",
        OscType::Nil => "nil",
        OscType::Inf => "inf",
        _ => "other",
    }
}
