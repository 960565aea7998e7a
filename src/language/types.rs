use crate::language::ast::{BinaryOp, UnaryOp};
use std::fmt;
use thiserror::Error;

/// Static type carried alongside every generated value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Integer64,
    Float64,
    Pointer(Box<TypeTag>),
    Struct(String),
    Void,
}

impl TypeTag {
    pub fn pointer_to(element: TypeTag) -> Self {
        TypeTag::Pointer(Box::new(element))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, TypeTag::Pointer(_))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeTag::Void)
    }

    /// Name of the struct this tag refers to, directly or through one pointer.
    pub fn struct_name(&self) -> Option<&str> {
        match self {
            TypeTag::Struct(name) => Some(name),
            TypeTag::Pointer(inner) => match inner.as_ref() {
                TypeTag::Struct(name) => Some(name),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Integer64 => write!(f, "int"),
            TypeTag::Float64 => write!(f, "float"),
            TypeTag::Pointer(inner) => write!(f, "{inner}*"),
            TypeTag::Struct(name) => write!(f, "{name}"),
            TypeTag::Void => write!(f, "void"),
        }
    }
}

/// A type keyword split into its base name and pointer depth, e.g. `Node*`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypeKeyword<'a> {
    pub base: &'a str,
    pub pointer_depth: usize,
}

impl<'a> TypeKeyword<'a> {
    pub fn parse(keyword: &'a str) -> Self {
        let trimmed = keyword.trim();
        let base = trimmed.trim_end_matches('*').trim_end();
        let pointer_depth = trimmed.len() - trimmed.trim_end_matches('*').len();
        Self {
            base,
            pointer_depth,
        }
    }

    pub fn builtin(&self) -> Option<TypeTag> {
        match self.base {
            "int" => Some(TypeTag::Integer64),
            "float" => Some(TypeTag::Float64),
            "void" => Some(TypeTag::Void),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CoercionError {
    #[error("void values cannot be used as operands")]
    VoidOperand,
    #[error("struct `{0}` cannot be used as an operand")]
    StructOperand(String),
    #[error("cannot mix pointer types `{lhs}` and `{rhs}`")]
    MixedPointers { lhs: TypeTag, rhs: TypeTag },
    #[error("cannot combine pointer `{pointer}` with a float")]
    PointerWithFloat { pointer: TypeTag },
    #[error("expected `{expected}`, found `{found}`")]
    Mismatch { expected: TypeTag, found: TypeTag },
    #[error("`{0}` cannot be used as a condition")]
    NotACondition(TypeTag),
}

/// Conversion applied to one operand before an instruction is emitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Coercion {
    None,
    WidenToFloat,
    PointerToInt,
}

/// Arithmetic domain an operation is computed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Domain {
    Int,
    Float,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryPlan {
    pub domain: Domain,
    pub lhs: Coercion,
    pub rhs: Coercion,
    /// A pointer result means the integer result is cast back to a pointer.
    pub result: TypeTag,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnaryPlan {
    pub domain: Domain,
    pub operand: Coercion,
    pub result: TypeTag,
}

/// How a value is reduced to a branch condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConditionTest {
    IntNonZero,
    FloatNotEqualZero,
    PointerNonZero,
}

fn reject_non_scalar(tag: &TypeTag) -> Result<(), CoercionError> {
    match tag {
        TypeTag::Void => Err(CoercionError::VoidOperand),
        TypeTag::Struct(name) => Err(CoercionError::StructOperand(name.clone())),
        TypeTag::Pointer(inner) => match inner.as_ref() {
            TypeTag::Integer64 | TypeTag::Float64 | TypeTag::Struct(_) => Ok(()),
            _ => Err(CoercionError::VoidOperand),
        },
        TypeTag::Integer64 | TypeTag::Float64 => Ok(()),
    }
}

pub fn plan_binary(op: BinaryOp, lhs: &TypeTag, rhs: &TypeTag) -> Result<BinaryPlan, CoercionError> {
    reject_non_scalar(lhs)?;
    reject_non_scalar(rhs)?;

    let pointer_result = match (lhs, rhs) {
        (TypeTag::Pointer(_), TypeTag::Pointer(_)) if lhs != rhs => {
            return Err(CoercionError::MixedPointers {
                lhs: lhs.clone(),
                rhs: rhs.clone(),
            });
        }
        (TypeTag::Pointer(_), TypeTag::Float64) => {
            return Err(CoercionError::PointerWithFloat {
                pointer: lhs.clone(),
            });
        }
        (TypeTag::Float64, TypeTag::Pointer(_)) => {
            return Err(CoercionError::PointerWithFloat {
                pointer: rhs.clone(),
            });
        }
        (TypeTag::Pointer(_), _) => Some(lhs.clone()),
        (_, TypeTag::Pointer(_)) => Some(rhs.clone()),
        _ => None,
    };

    if let Some(pointer) = pointer_result {
        let coerce = |tag: &TypeTag| {
            if tag.is_pointer() {
                Coercion::PointerToInt
            } else {
                Coercion::None
            }
        };
        // Equality keeps the pointer shape like arithmetic; ordering does not.
        let result = match op {
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => TypeTag::Integer64,
            _ => pointer,
        };
        return Ok(BinaryPlan {
            domain: Domain::Int,
            lhs: coerce(lhs),
            rhs: coerce(rhs),
            result,
        });
    }

    let (domain, lhs_coercion, rhs_coercion) = match (lhs, rhs) {
        (TypeTag::Integer64, TypeTag::Integer64) => (Domain::Int, Coercion::None, Coercion::None),
        (TypeTag::Float64, TypeTag::Float64) => (Domain::Float, Coercion::None, Coercion::None),
        (TypeTag::Integer64, TypeTag::Float64) => {
            (Domain::Float, Coercion::WidenToFloat, Coercion::None)
        }
        (TypeTag::Float64, TypeTag::Integer64) => {
            (Domain::Float, Coercion::None, Coercion::WidenToFloat)
        }
        _ => {
            return Err(CoercionError::Mismatch {
                expected: lhs.clone(),
                found: rhs.clone(),
            });
        }
    };
    let result = if op.is_comparison() {
        TypeTag::Integer64
    } else {
        match domain {
            Domain::Int => TypeTag::Integer64,
            Domain::Float => TypeTag::Float64,
        }
    };
    Ok(BinaryPlan {
        domain,
        lhs: lhs_coercion,
        rhs: rhs_coercion,
        result,
    })
}

pub fn plan_unary(op: UnaryOp, operand: &TypeTag) -> Result<UnaryPlan, CoercionError> {
    reject_non_scalar(operand)?;
    let plan = match (op, operand) {
        (UnaryOp::Neg, TypeTag::Integer64) | (UnaryOp::Not, TypeTag::Integer64) => UnaryPlan {
            domain: Domain::Int,
            operand: Coercion::None,
            result: TypeTag::Integer64,
        },
        (UnaryOp::Neg, TypeTag::Float64) => UnaryPlan {
            domain: Domain::Float,
            operand: Coercion::None,
            result: TypeTag::Float64,
        },
        (UnaryOp::Not, TypeTag::Float64) => UnaryPlan {
            domain: Domain::Float,
            operand: Coercion::None,
            result: TypeTag::Integer64,
        },
        (_, TypeTag::Pointer(_)) => UnaryPlan {
            domain: Domain::Int,
            operand: Coercion::PointerToInt,
            result: operand.clone(),
        },
        _ => return Err(CoercionError::VoidOperand),
    };
    Ok(plan)
}

pub fn plan_condition(tag: &TypeTag) -> Result<ConditionTest, CoercionError> {
    match tag {
        TypeTag::Integer64 => Ok(ConditionTest::IntNonZero),
        TypeTag::Float64 => Ok(ConditionTest::FloatNotEqualZero),
        TypeTag::Pointer(_) => Ok(ConditionTest::PointerNonZero),
        TypeTag::Void | TypeTag::Struct(_) => Err(CoercionError::NotACondition(tag.clone())),
    }
}

/// Coercion needed to store a `value` into a slot of type `target`.
pub fn plan_store(target: &TypeTag, value: &TypeTag) -> Result<Coercion, CoercionError> {
    if target == value && !target.is_void() {
        return Ok(Coercion::None);
    }
    match (target, value) {
        (TypeTag::Float64, TypeTag::Integer64) => Ok(Coercion::WidenToFloat),
        _ => Err(CoercionError::Mismatch {
            expected: target.clone(),
            found: value.clone(),
        }),
    }
}
