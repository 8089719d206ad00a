//! The runtime value representation and the curated type descriptor used to
//! check it against a port's declared type.
//!
//! The tensor library itself is out of scope; [`Tensor`] is a minimal stand-in
//! shaped only enough to exercise the wiring and rendezvous machinery.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A stand-in for whatever tensor type a real pipeline would carry. Shape plus
/// a flat row-major data buffer, nothing more.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Arc<[f32]>,
}

impl Tensor {
    pub fn new(shape: impl Into<Vec<usize>>, data: impl Into<Arc<[f32]>>) -> Self {
        Self {
            shape: shape.into(),
            data: data.into(),
        }
    }

    pub fn scalar(x: f32) -> Self {
        Self::new(vec![], vec![x])
    }
}

/// The sequence flavor a list-typed descriptor carries: it controls how an
/// aggregator's ordered elements get wrapped back into a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceKind {
    List,
    Tuple,
}

/// A scalar (non-sequence) leaf type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Unit,
    Bool,
    Int,
    Float,
    String,
    Tensor,
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::Unit => "unit",
            ScalarType::Bool => "bool",
            ScalarType::Int => "int",
            ScalarType::Float => "float",
            ScalarType::String => "string",
            ScalarType::Tensor => "tensor",
        };
        f.write_str(name)
    }
}

/// A declared port type. Deliberately a small, closed surface rather than an
/// open extension point: the core only ever needs to tell "does this value
/// satisfy this declared type", not express arbitrary user types.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDescriptor {
    Scalar(ScalarType),
    /// A variable-length homogeneous sequence. Subscriptable iff `element == Tensor`.
    Sequence(ScalarType, SequenceKind),
    /// A fixed-arity tuple. Never subscriptable, regardless of element types.
    FixedTuple(Vec<ScalarType>),
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Scalar(s) => write!(f, "{s}"),
            TypeDescriptor::Sequence(s, SequenceKind::List) => write!(f, "List[{s}]"),
            TypeDescriptor::Sequence(s, SequenceKind::Tuple) => write!(f, "Tuple[{s}, ...]"),
            TypeDescriptor::FixedTuple(items) => {
                write!(f, "Tuple[")?;
                for (i, s) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{s}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl TypeDescriptor {
    /// Whether a port of this declared type supports `select(i)`.
    pub fn is_subscriptable(&self) -> bool {
        matches!(
            self,
            TypeDescriptor::Sequence(ScalarType::Tensor, _)
        )
    }

    /// The element type seen by an individual indexed connection, if this
    /// descriptor is subscriptable.
    pub fn element_type(&self) -> Option<TypeDescriptor> {
        match self {
            TypeDescriptor::Sequence(s, _) if *s == ScalarType::Tensor => {
                Some(TypeDescriptor::Scalar(*s))
            }
            _ => None,
        }
    }

    /// Wraps an aggregator's ordered element values back into the declared
    /// sequence shape (list or tuple).
    pub fn wrap_sequence(&self, items: Vec<Value>) -> Value {
        match self {
            TypeDescriptor::Sequence(_, SequenceKind::List) => Value::List(Arc::new(items)),
            TypeDescriptor::Sequence(_, SequenceKind::Tuple) => Value::Tuple(Arc::new(items)),
            _ => Value::List(Arc::new(items)),
        }
    }
}

/// A runtime value flowing through a port. Closed by design: there is no
/// variant that itself carries a cell or a port, which is what keeps
/// [`crate::error::CoreError::IllegalValue`] statically unreachable through
/// the public API (see DESIGN.md).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Arc<str>),
    Tensor(Tensor),
    List(Arc<Vec<Value>>),
    Tuple(Arc<Vec<Value>>),
}

impl Value {
    /// The `i`-th element of a list/tuple value, used to resolve indexed cells.
    pub fn element(&self, i: usize) -> Option<Value> {
        match self {
            Value::List(items) | Value::Tuple(items) => items.get(i).cloned(),
            _ => None,
        }
    }

    fn scalar_type(&self) -> Option<ScalarType> {
        match self {
            Value::Unit => Some(ScalarType::Unit),
            Value::Bool(_) => Some(ScalarType::Bool),
            Value::Int(_) => Some(ScalarType::Int),
            Value::Float(_) => Some(ScalarType::Float),
            Value::String(_) => Some(ScalarType::String),
            Value::Tensor(_) => Some(ScalarType::Tensor),
            Value::List(_) | Value::Tuple(_) => None,
        }
    }

    /// Whether this value satisfies `ty`, recursing into sequence elements.
    pub fn matches(&self, ty: &TypeDescriptor) -> bool {
        match ty {
            TypeDescriptor::Scalar(s) => self.scalar_type() == Some(*s),
            TypeDescriptor::Sequence(s, kind) => {
                let items: &Vec<Value> = match (self, kind) {
                    (Value::List(items), SequenceKind::List) => items,
                    (Value::Tuple(items), SequenceKind::Tuple) => items,
                    _ => return false,
                };
                items.iter().all(|v| v.scalar_type() == Some(*s))
            }
            TypeDescriptor::FixedTuple(tys) => {
                let Value::Tuple(items) = self else {
                    return false;
                };
                items.len() == tys.len()
                    && items
                        .iter()
                        .zip(tys.iter())
                        .all(|(v, s)| v.scalar_type() == Some(*s))
            }
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("value of type {found} does not satisfy declared type {expected} for '{name}'")]
pub struct TypeMismatch {
    pub name: String,
    pub expected: TypeDescriptor,
    pub found: String,
}

fn value_kind(v: &Value) -> &'static str {
    match v {
        Value::Unit => "unit",
        Value::Bool(_) => "bool",
        Value::Int(_) => "int",
        Value::Float(_) => "float",
        Value::String(_) => "string",
        Value::Tensor(_) => "tensor",
        Value::List(_) => "list",
        Value::Tuple(_) => "tuple",
    }
}

/// Runtime type-check predicate, the concrete realization of the `check_type`
/// collaborator the core relies on.
pub fn check_type(name: &str, value: &Value, ty: &TypeDescriptor) -> Result<(), TypeMismatch> {
    if value.matches(ty) {
        Ok(())
    } else {
        Err(TypeMismatch {
            name: name.to_string(),
            expected: ty.clone(),
            found: value_kind(value).to_string(),
        })
    }
}
