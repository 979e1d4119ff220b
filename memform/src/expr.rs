//! Typed C expressions, as handed over by the control-flow front end.
//!
//! Every node carries its (unsimplified) C type. Implicit conversions are expected to have been
//! made explicit by the front end, except for the usual arithmetic conversions on binary
//! operands, which the evaluator performs itself.

use crate::types::{BuiltIn, CType};

#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone, Copy)]
pub enum UnaryOperator {
    Minus,
    BitwiseNot,
    LogicalNot,
}

#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone, Copy)]
pub enum BinaryOperator {
    Multiply,
    Divide,
    Modulo,
    Plus,
    Minus,
    ShiftLeft,
    ShiftRight,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,
    Equals,
    NotEquals,
    BitwiseAnd,
    BitwiseXor,
    BitwiseOr,
    LogicalAnd,
    LogicalOr,
}

impl BinaryOperator {
    pub fn is_comparison(&self) -> bool {
        use BinaryOperator::*;
        matches!(
            self,
            LessThan | GreaterThan | LessEqual | GreaterEqual | Equals | NotEquals
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOperator::LogicalAnd | BinaryOperator::LogicalOr)
    }
}

/// A typed C expression
#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone)]
pub enum Expression {
    IntLiteral {
        value: i128,
        ty: CType,
    },
    /// A floating point literal, stored as the bits of an `f64` so that expressions remain
    /// hashable and totally ordered.
    FloatLiteral {
        bits: u64,
        ty: CType,
    },
    /// A variable or function, by fully qualified name (e.g. `main::x` or a global `g`)
    Id {
        name: String,
        ty: CType,
    },
    /// `owner.field`, or `owner->field` if `is_pointer_dereference`
    FieldRef {
        owner: Box<Expression>,
        field: String,
        is_pointer_dereference: bool,
        ty: CType,
    },
    Subscript {
        array: Box<Expression>,
        index: Box<Expression>,
        ty: CType,
    },
    Dereference {
        operand: Box<Expression>,
        ty: CType,
    },
    AddressOf {
        operand: Box<Expression>,
        ty: CType,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expression>,
        ty: CType,
    },
    Binary {
        op: BinaryOperator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
        ty: CType,
    },
    Cast {
        operand: Box<Expression>,
        ty: CType,
    },
}

impl Expression {
    pub fn expression_type(&self) -> &CType {
        use Expression::*;
        match self {
            IntLiteral { ty, .. }
            | FloatLiteral { ty, .. }
            | Id { ty, .. }
            | FieldRef { ty, .. }
            | Subscript { ty, .. }
            | Dereference { ty, .. }
            | AddressOf { ty, .. }
            | Unary { ty, .. }
            | Binary { ty, .. }
            | Cast { ty, .. } => ty,
        }
    }

    pub fn int(value: i128, ty: CType) -> Self {
        Expression::IntLiteral { value, ty }
    }

    /// An `int`-typed literal
    pub fn int_literal(value: i128) -> Self {
        Self::int(value, CType::BuiltIn(BuiltIn::Int))
    }

    pub fn float(value: f64, ty: CType) -> Self {
        Expression::FloatLiteral {
            bits: value.to_bits(),
            ty,
        }
    }

    pub fn id(name: impl Into<String>, ty: CType) -> Self {
        Expression::Id {
            name: name.into(),
            ty,
        }
    }

    pub fn field(owner: Expression, field: impl Into<String>, ty: CType) -> Self {
        Expression::FieldRef {
            owner: Box::new(owner),
            field: field.into(),
            is_pointer_dereference: false,
            ty,
        }
    }

    pub fn arrow(owner: Expression, field: impl Into<String>, ty: CType) -> Self {
        Expression::FieldRef {
            owner: Box::new(owner),
            field: field.into(),
            is_pointer_dereference: true,
            ty,
        }
    }

    pub fn subscript(array: Expression, index: Expression, ty: CType) -> Self {
        Expression::Subscript {
            array: Box::new(array),
            index: Box::new(index),
            ty,
        }
    }

    pub fn deref(operand: Expression, ty: CType) -> Self {
        Expression::Dereference {
            operand: Box::new(operand),
            ty,
        }
    }

    pub fn address_of(operand: Expression) -> Self {
        let ty = CType::Pointer(Box::new(operand.expression_type().clone()));
        Expression::AddressOf {
            operand: Box::new(operand),
            ty,
        }
    }

    pub fn cast(operand: Expression, ty: CType) -> Self {
        Expression::Cast {
            operand: Box::new(operand),
            ty,
        }
    }

    pub fn unary(op: UnaryOperator, operand: Expression, ty: CType) -> Self {
        Expression::Unary {
            op,
            operand: Box::new(operand),
            ty,
        }
    }

    pub fn binary(op: BinaryOperator, lhs: Expression, rhs: Expression, ty: CType) -> Self {
        Expression::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            ty,
        }
    }

    /// The value of an integer constant expression built from literals, casts and arithmetic.
    /// Used to decide whether an array length is a literal.
    pub fn constant_value(&self) -> Option<i128> {
        use BinaryOperator::*;
        match self {
            Expression::IntLiteral { value, .. } => Some(*value),
            Expression::Cast { operand, .. } => operand.constant_value(),
            Expression::Unary {
                op: UnaryOperator::Minus,
                operand,
                ..
            } => operand.constant_value().map(|v| -v),
            Expression::Binary { op, lhs, rhs, .. } => {
                let (l, r) = (lhs.constant_value()?, rhs.constant_value()?);
                match op {
                    Plus => l.checked_add(r),
                    Minus => l.checked_sub(r),
                    Multiply => l.checked_mul(r),
                    Divide => l.checked_div(r),
                    Modulo => l.checked_rem(r),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// The variable this expression denotes, if it is a plain identifier (possibly under casts)
    pub fn as_variable_name(&self) -> Option<&str> {
        match self {
            Expression::Id { name, .. } => Some(name),
            Expression::Cast { operand, .. } => operand.as_variable_name(),
            _ => None,
        }
    }
}

/// A call `function(arguments...)` returning `ty`
#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone)]
pub struct FunctionCallExpression {
    pub function: String,
    pub arguments: Vec<Expression>,
    pub ty: CType,
}

/// The initializer of a declaration: either an expression, or a (possibly nested) brace list
/// assigning members/elements in order.
#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone)]
pub enum Initializer {
    Expression(Expression),
    List(Vec<Initializer>),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn constant_lengths_fold_through_casts() {
        let ulong = CType::BuiltIn(BuiltIn::UnsignedLong);
        let e = Expression::cast(
            Expression::binary(
                BinaryOperator::Multiply,
                Expression::int_literal(4),
                Expression::int_literal(5),
                CType::BuiltIn(BuiltIn::Int),
            ),
            ulong.clone(),
        );
        assert_eq!(e.constant_value(), Some(20));
        assert_eq!(Expression::id("n", ulong).constant_value(), None);
    }
}
