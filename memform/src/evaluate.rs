//! Translation of typed expressions into locations and values.
//!
//! An expression either denotes a location (a variable kept as SSA variables, or an address in
//! memory) or a plain value. Values are bit-vectors for integers, pointers and `_Bool`, and
//! floating point terms for floating types.

use crate::converter::EdgeEncoder;
use crate::error::{EncodingError, Result};
use crate::expr::{BinaryOperator, Expression, UnaryOperator};
use crate::formula::{
    unique_name, BvBinaryOp, BvUnaryOp, Formula, FpBinaryOp, FpCompareOp, Sort,
};
use crate::log::*;
use crate::pointer_target_set::base_address;
use crate::slice::{SliceBase, SliceExpression, SliceModifier};
use crate::types::{CType, FloatKind, ScalarKind, ScalarType, SimplifiedType};

/// The result of evaluating an expression
#[derive(PartialEq, Eq, Debug, Clone)]
pub enum Evaluated {
    /// A location in memory; `field` is the composite member the location was reached through,
    /// which selects the memory region if regions are field based
    AliasedLocation {
        address: Formula,
        field: Option<(SimplifiedType, String)>,
    },
    /// A variable (or variable part, `s$f`) kept as SSA variables
    UnaliasedLocation { name: String },
    Value(Formula),
    /// A location or value that is not modelled precisely (bit-fields in memory)
    Nondet,
}

/// How a type is treated in arithmetic
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
enum Arith {
    Integer { width: u32, signed: bool },
    Float(FloatKind),
    Other,
}

fn arith(t: &SimplifiedType, pointer_bits: u32) -> Arith {
    match t {
        SimplifiedType::Scalar(ScalarType {
            kind: ScalarKind::Float(k),
            ..
        }) => Arith::Float(*k),
        SimplifiedType::Scalar(s) => Arith::Integer {
            width: s.bit_width,
            signed: s.signed && s.kind == ScalarKind::Integer,
        },
        SimplifiedType::Pointer(_) | SimplifiedType::Array(..) | SimplifiedType::Function(_) => {
            Arith::Integer {
                width: pointer_bits,
                signed: false,
            }
        }
        SimplifiedType::Void | SimplifiedType::Composite(..) => Arith::Other,
    }
}

fn integer(bit_width: u32, signed: bool) -> SimplifiedType {
    SimplifiedType::Scalar(ScalarType {
        kind: ScalarKind::Integer,
        bit_width,
        signed,
    })
}

impl<'a> EdgeEncoder<'a> {
    fn pointer_bits(&self) -> u32 {
        self.conv.types.machine_model().pointer_bits()
    }

    /// The signed integer type as wide as a pointer
    fn ptrdiff_type(&self) -> SimplifiedType {
        integer(self.pointer_bits(), true)
    }

    /// Whether the object an expression denotes is kept in memory
    pub(crate) fn expression_lives_in_memory(&self, e: &Expression) -> Result<bool> {
        match e {
            Expression::Id { name, ty } => {
                self.lives_in_memory(name, &self.conv.types.simplify(ty))
            }
            Expression::FieldRef {
                owner,
                is_pointer_dereference: false,
                ..
            } => self.expression_lives_in_memory(owner),
            Expression::Cast { operand, .. } => self.expression_lives_in_memory(operand),
            Expression::FieldRef { .. }
            | Expression::Subscript { .. }
            | Expression::Dereference { .. } => Ok(true),
            _ => Ok(false),
        }
    }

    pub(crate) fn slice_lives_in_memory(&self, slice: &SliceExpression) -> Result<bool> {
        match &slice.base {
            SliceBase::Value { .. } => Ok(false),
            SliceBase::Expression(e) => Ok(slice
                .modifiers
                .iter()
                .any(|m| matches!(m, SliceModifier::Index(_)))
                || self.expression_lives_in_memory(e)?),
        }
    }

    pub(crate) fn make_nondet(&self, sort: Sort) -> Formula {
        self.conv
            .fmgr
            .make_variable_without_ssa_index(sort, &unique_name("__nondet_value_"))
    }

    /// Evaluate `e` to a location if it denotes one, and to a value otherwise
    pub fn evaluate(&mut self, e: &Expression) -> Result<Evaluated> {
        let conv = self.conv;
        let fmgr = &conv.fmgr;
        match e {
            Expression::Id { name, ty } => {
                let ty = self.conv.types.simplify(ty);
                if let SimplifiedType::Function(_) = ty {
                    Ok(Evaluated::Value(base_address(self.conv, name)))
                } else if self.lives_in_memory(name, &ty)? {
                    // Globals and parameters may be used before their declaration is seen
                    self.pts.add_base(conv, name, &ty, &mut self.constraints)?;
                    Ok(Evaluated::AliasedLocation {
                        address: base_address(self.conv, name),
                        field: None,
                    })
                } else {
                    Ok(Evaluated::UnaliasedLocation { name: name.clone() })
                }
            }
            Expression::FieldRef {
                owner,
                field,
                is_pointer_dereference,
                ..
            } => {
                let (composite, owner) = if *is_pointer_dereference {
                    let pointer = self.conv.types.simplify_operand(owner.expression_type());
                    let composite = pointer.element_type().cloned().ok_or_else(|| {
                        EncodingError::unrecognized(format!(
                            "-> applied to non-pointer type {}",
                            pointer
                        ))
                    })?;
                    let address = self.evaluate_value(owner)?;
                    (
                        composite,
                        Evaluated::AliasedLocation {
                            address,
                            field: None,
                        },
                    )
                } else {
                    (
                        self.conv.types.simplify(owner.expression_type()),
                        self.evaluate(owner)?,
                    )
                };
                let member = self.conv.types.member(&composite, field)?;
                match owner {
                    Evaluated::AliasedLocation { address, .. } => {
                        self.pts.add_tracked_field(&composite, field);
                        match member.byte_offset() {
                            Some(offset) => Ok(Evaluated::AliasedLocation {
                                address: fmgr.make_plus(
                                    address,
                                    fmgr.make_bv(self.pointer_bits(), offset as i128),
                                ),
                                field: Some((composite, field.clone())),
                            }),
                            None => {
                                self.conv.log_once.warn_once(format!(
                                    "Bit-field {} of {} in memory is not tracked",
                                    field, composite
                                ));
                                Ok(Evaluated::Nondet)
                            }
                        }
                    }
                    Evaluated::UnaliasedLocation { name } => Ok(Evaluated::UnaliasedLocation {
                        name: format!("{}${}", name, field),
                    }),
                    Evaluated::Nondet => Ok(Evaluated::Nondet),
                    Evaluated::Value(_) => Err(EncodingError::unrecognized(format!(
                        "field {} of a value of type {}",
                        field, composite
                    ))),
                }
            }
            Expression::Subscript { array, index, .. } => {
                let array_type = self.conv.types.simplify(array.expression_type());
                let (base, field, element) = match &array_type {
                    SimplifiedType::Array(element, _) => match self.evaluate(array)? {
                        Evaluated::AliasedLocation { address, field } => {
                            (address, field, (**element).clone())
                        }
                        Evaluated::Nondet => return Ok(Evaluated::Nondet),
                        other => {
                            return Err(EncodingError::unrecognized(format!(
                                "array {:?} is not kept in memory",
                                other
                            )))
                        }
                    },
                    SimplifiedType::Pointer(element) => {
                        (self.evaluate_value(array)?, None, (**element).clone())
                    }
                    t => {
                        return Err(EncodingError::unrecognized(format!(
                            "subscript of type {}",
                            t
                        )))
                    }
                };
                let index_type = self.conv.types.simplify_operand(index.expression_type());
                let index = self.evaluate_value(index)?;
                let index = self.make_cast(index, &index_type, &self.ptrdiff_type());
                let element_size = self.conv.types.size_of(&element)?;
                Ok(Evaluated::AliasedLocation {
                    address: fmgr.make_plus(
                        base,
                        fmgr.make_multiply(
                            index,
                            fmgr.make_bv(self.pointer_bits(), element_size as i128),
                        ),
                    ),
                    field,
                })
            }
            Expression::Dereference { operand, ty } => {
                let address = self.evaluate_value(operand)?;
                if let SimplifiedType::Function(_) = self.conv.types.simplify(ty) {
                    Ok(Evaluated::Value(address))
                } else {
                    Ok(Evaluated::AliasedLocation {
                        address,
                        field: None,
                    })
                }
            }
            Expression::AddressOf { operand, .. } => match self.evaluate(operand)? {
                Evaluated::AliasedLocation { address, .. } => Ok(Evaluated::Value(address)),
                Evaluated::Value(v) => Ok(Evaluated::Value(v)),
                Evaluated::UnaliasedLocation { name } => Err(EncodingError::unrecognized(
                    format!("address of {} is taken, but it is not kept in memory", name),
                )),
                Evaluated::Nondet => Err(EncodingError::unsupported(
                    "address of a bit-field".to_owned(),
                )),
            },
            _ => Ok(Evaluated::Value(self.evaluate_rvalue(e)?)),
        }
    }

    /// Read the contents of an evaluated expression of type `ty`. Arrays and functions decay to
    /// their address. `None` for nondeterministic contents.
    pub(crate) fn read_evaluated(
        &mut self,
        evaluated: Evaluated,
        ty: &SimplifiedType,
    ) -> Result<Option<Formula>> {
        match evaluated {
            Evaluated::Value(v) => Ok(Some(v)),
            Evaluated::Nondet => Ok(None),
            Evaluated::UnaliasedLocation { name } => {
                let sort = self.conv.types.sort_of(ty)?;
                let index = self.ssa.get_index(&name, ty);
                Ok(Some(self.conv.fmgr.make_variable(sort, &name, index)))
            }
            Evaluated::AliasedLocation { address, field } => match ty {
                SimplifiedType::Array(..) | SimplifiedType::Function(_) => Ok(Some(address)),
                SimplifiedType::Scalar(_) | SimplifiedType::Pointer(_) => {
                    let region = self.conv.regions.region_for(ty, field.as_ref());
                    let name = region.heap_name();
                    let sort = self.conv.types.sort_of(ty)?;
                    let index = self.ssa.get_index(&name, region.cell_type());
                    Ok(Some(self.conv.heap.make_pointer_dereference(
                        &self.conv.fmgr,
                        &name,
                        &sort,
                        index,
                        address,
                    )))
                }
                SimplifiedType::Void | SimplifiedType::Composite(..) => Err(
                    EncodingError::unrecognized(format!("value of type {} used as operand", ty)),
                ),
            },
        }
    }

    /// The value of a scalar expression; unmodelled contents become a fresh variable
    pub fn evaluate_value(&mut self, e: &Expression) -> Result<Formula> {
        let ty = self.conv.types.simplify(e.expression_type());
        let evaluated = self.evaluate(e)?;
        match self.read_evaluated(evaluated, &ty)? {
            Some(v) => Ok(v),
            None => Ok(self.make_nondet(self.conv.types.sort_of(&ty.decayed())?)),
        }
    }

    /// The truth value of a scalar expression
    pub fn evaluate_condition(&mut self, e: &Expression) -> Result<Formula> {
        let conv = self.conv;
        let fmgr = &conv.fmgr;
        match e {
            Expression::Binary { op, lhs, rhs, .. } if op.is_comparison() => {
                self.make_comparison(*op, lhs, rhs)
            }
            Expression::Binary {
                op: BinaryOperator::LogicalAnd,
                lhs,
                rhs,
                ..
            } => Ok(fmgr.make_and(self.evaluate_condition(lhs)?, self.evaluate_condition(rhs)?)),
            Expression::Binary {
                op: BinaryOperator::LogicalOr,
                lhs,
                rhs,
                ..
            } => Ok(fmgr.make_or(self.evaluate_condition(lhs)?, self.evaluate_condition(rhs)?)),
            Expression::Unary {
                op: UnaryOperator::LogicalNot,
                operand,
                ..
            } => Ok(fmgr.make_not(self.evaluate_condition(operand)?)),
            _ => {
                let ty = self.conv.types.simplify_operand(e.expression_type());
                let v = self.evaluate_value(e)?;
                Ok(self.to_bool(v, &ty))
            }
        }
    }

    fn evaluate_rvalue(&mut self, e: &Expression) -> Result<Formula> {
        let conv = self.conv;
        let fmgr = &conv.fmgr;
        let result_type = self.conv.types.simplify(e.expression_type());
        match e {
            Expression::IntLiteral { value, .. } => match arith(&result_type, self.pointer_bits()) {
                Arith::Float(_) => Ok(fmgr.make_float(
                    self.conv.types.sort_of(&result_type)?,
                    *value as f64,
                )),
                Arith::Integer { width, .. } => Ok(fmgr.make_bv(width, *value)),
                Arith::Other => Err(EncodingError::unrecognized(format!(
                    "literal {} of type {}",
                    value, result_type
                ))),
            },
            Expression::FloatLiteral { bits, .. } => {
                let value = f64::from_bits(*bits);
                match arith(&result_type, self.pointer_bits()) {
                    Arith::Float(_) => {
                        Ok(fmgr.make_float(self.conv.types.sort_of(&result_type)?, value))
                    }
                    Arith::Integer { width, .. } => Ok(fmgr.make_bv(width, value as i128)),
                    Arith::Other => Err(EncodingError::unrecognized(format!(
                        "literal {} of type {}",
                        value, result_type
                    ))),
                }
            }
            Expression::Cast { operand, .. } => {
                if let Some(pointer) = operand.as_variable_name() {
                    self.resolve_deferred_pointer(pointer, &result_type)?;
                }
                let from = self.conv.types.simplify_operand(operand.expression_type());
                let v = self.evaluate_value(operand)?;
                Ok(self.make_cast(v, &from, &result_type))
            }
            Expression::Unary { op, operand, .. } => {
                if *op == UnaryOperator::LogicalNot {
                    let c = self.evaluate_condition(e)?;
                    return Ok(self.from_bool(c, &result_type));
                }
                let from = self.conv.types.simplify_operand(operand.expression_type());
                let v = self.evaluate_value(operand)?;
                let v = self.make_cast(v, &from, &result_type);
                match (op, arith(&result_type, self.pointer_bits())) {
                    (UnaryOperator::Minus, Arith::Float(_)) => Ok(fmgr.make_fp_neg(v)),
                    (UnaryOperator::Minus, _) => Ok(fmgr.make_negate(v)),
                    (_, Arith::Float(_)) => Err(EncodingError::unrecognized(
                        "bitwise complement of a floating point value",
                    )),
                    _ => Ok(fmgr.make_bv_unary(BvUnaryOp::Not, v)),
                }
            }
            Expression::Binary { op, lhs, rhs, .. } => {
                if op.is_comparison() || op.is_logical() {
                    let c = self.evaluate_condition(e)?;
                    return Ok(self.from_bool(c, &result_type));
                }
                self.evaluate_arithmetic(*op, lhs, rhs, &result_type)
            }
            _ => Err(EncodingError::unrecognized(format!(
                "expression {:?} has no value",
                e
            ))),
        }
    }

    fn evaluate_arithmetic(
        &mut self,
        op: BinaryOperator,
        lhs: &Expression,
        rhs: &Expression,
        result_type: &SimplifiedType,
    ) -> Result<Formula> {
        use BinaryOperator::*;
        let lt = self.conv.types.simplify_operand(lhs.expression_type());
        let rt = self.conv.types.simplify_operand(rhs.expression_type());
        let l = self.evaluate_value(lhs)?;
        let r = self.evaluate_value(rhs)?;
        let conv = self.conv;
        let fmgr = &conv.fmgr;
        let bits = self.pointer_bits();

        // Pointer arithmetic, scaled by the pointee size
        match (&lt, &rt, op) {
            (SimplifiedType::Pointer(pointee), SimplifiedType::Pointer(_), Minus) => {
                let size = self.conv.types.size_of(pointee)?.max(1);
                let difference = fmgr.make_bv_binary(
                    BvBinaryOp::SDiv,
                    fmgr.make_minus(l, r),
                    fmgr.make_bv(bits, size as i128),
                );
                return Ok(self.make_cast(difference, &self.ptrdiff_type(), result_type));
            }
            (SimplifiedType::Pointer(pointee), _, Plus | Minus) => {
                let size = self.conv.types.size_of(pointee)?.max(1);
                let offset = fmgr.make_multiply(
                    self.make_cast(r, &rt, &self.ptrdiff_type()),
                    fmgr.make_bv(bits, size as i128),
                );
                return Ok(if op == Plus {
                    fmgr.make_plus(l, offset)
                } else {
                    fmgr.make_minus(l, offset)
                });
            }
            (_, SimplifiedType::Pointer(pointee), Plus) => {
                let size = self.conv.types.size_of(pointee)?.max(1);
                let offset = fmgr.make_multiply(
                    self.make_cast(l, &lt, &self.ptrdiff_type()),
                    fmgr.make_bv(bits, size as i128),
                );
                return Ok(fmgr.make_plus(r, offset));
            }
            _ => {}
        }

        let common = if matches!(op, ShiftLeft | ShiftRight) {
            self.promote(&lt)
        } else {
            self.usual_arithmetic_type(&lt, &rt)
        };
        let l = self.make_cast(l, &lt, &common);
        let r = self.make_cast(r, &rt, &common);
        let v = match arith(&common, bits) {
            Arith::Float(_) => {
                let fop = match op {
                    Plus => FpBinaryOp::Add,
                    Minus => FpBinaryOp::Sub,
                    Multiply => FpBinaryOp::Mul,
                    Divide => FpBinaryOp::Div,
                    Modulo => FpBinaryOp::Rem,
                    _ => {
                        return Err(EncodingError::unrecognized(format!(
                            "operator {:?} on floating point operands",
                            op
                        )))
                    }
                };
                fmgr.make_fp_binary(fop, l, r)
            }
            Arith::Integer { signed, .. } => {
                let bop = match op {
                    Plus => BvBinaryOp::Add,
                    Minus => BvBinaryOp::Sub,
                    Multiply => BvBinaryOp::Mul,
                    Divide if signed => BvBinaryOp::SDiv,
                    Divide => BvBinaryOp::UDiv,
                    Modulo if signed => BvBinaryOp::SRem,
                    Modulo => BvBinaryOp::URem,
                    ShiftLeft => BvBinaryOp::Shl,
                    ShiftRight if signed => BvBinaryOp::AShr,
                    ShiftRight => BvBinaryOp::LShr,
                    BitwiseAnd => BvBinaryOp::And,
                    BitwiseXor => BvBinaryOp::Xor,
                    BitwiseOr => BvBinaryOp::Or,
                    _ => {
                        return Err(EncodingError::unrecognized(format!(
                            "operator {:?} in arithmetic",
                            op
                        )))
                    }
                };
                fmgr.make_bv_binary(bop, l, r)
            }
            Arith::Other => {
                return Err(EncodingError::unrecognized(format!(
                    "arithmetic on type {}",
                    common
                )))
            }
        };
        Ok(self.make_cast(v, &common, result_type))
    }

    fn make_comparison(
        &mut self,
        op: BinaryOperator,
        lhs: &Expression,
        rhs: &Expression,
    ) -> Result<Formula> {
        use BinaryOperator::*;
        let lt = self.conv.types.simplify_operand(lhs.expression_type());
        let rt = self.conv.types.simplify_operand(rhs.expression_type());
        let l = self.evaluate_value(lhs)?;
        let r = self.evaluate_value(rhs)?;
        let common = if matches!(lt, SimplifiedType::Pointer(_))
            || matches!(rt, SimplifiedType::Pointer(_))
        {
            integer(self.pointer_bits(), false)
        } else {
            self.usual_arithmetic_type(&lt, &rt)
        };
        let l = self.make_cast(l, &lt, &common);
        let r = self.make_cast(r, &rt, &common);
        let conv = self.conv;
        let fmgr = &conv.fmgr;
        Ok(match arith(&common, self.pointer_bits()) {
            Arith::Float(_) => match op {
                LessThan => fmgr.make_fp_compare(FpCompareOp::Lt, l, r),
                LessEqual => fmgr.make_fp_compare(FpCompareOp::Leq, l, r),
                GreaterThan => fmgr.make_fp_compare(FpCompareOp::Lt, r, l),
                GreaterEqual => fmgr.make_fp_compare(FpCompareOp::Leq, r, l),
                Equals => fmgr.make_fp_compare(FpCompareOp::Eq, l, r),
                _ => fmgr.make_not(fmgr.make_fp_compare(FpCompareOp::Eq, l, r)),
            },
            Arith::Integer { signed, .. } => match op {
                LessThan => fmgr.make_less_than(l, r, signed),
                LessEqual => fmgr.make_less_or_equal(l, r, signed),
                GreaterThan => fmgr.make_less_than(r, l, signed),
                GreaterEqual => fmgr.make_less_or_equal(r, l, signed),
                Equals => fmgr.make_equal(l, r),
                _ => fmgr.make_not(fmgr.make_equal(l, r)),
            },
            Arith::Other => {
                return Err(EncodingError::unrecognized(format!(
                    "comparison of values of type {}",
                    common
                )))
            }
        })
    }

    /// Integer promotion
    fn promote(&self, t: &SimplifiedType) -> SimplifiedType {
        let int = self.conv.types.simplify(&CType::int());
        match arith(t, self.pointer_bits()) {
            Arith::Integer { width, .. } if (width as u64) < self.conv.types.bit_size_of(&int).unwrap_or(32) => int,
            Arith::Integer { width, signed } => integer(width, signed),
            _ => t.clone(),
        }
    }

    /// The common type of the operands of an arithmetic operator
    fn usual_arithmetic_type(&self, a: &SimplifiedType, b: &SimplifiedType) -> SimplifiedType {
        let (a, b) = (self.promote(a), self.promote(b));
        match (arith(&a, self.pointer_bits()), arith(&b, self.pointer_bits())) {
            (Arith::Float(x), Arith::Float(y)) => {
                if x >= y {
                    a
                } else {
                    b
                }
            }
            (Arith::Float(_), _) => a,
            (_, Arith::Float(_)) => b,
            (
                Arith::Integer {
                    width: wa,
                    signed: sa,
                },
                Arith::Integer {
                    width: wb,
                    signed: sb,
                },
            ) => {
                if wa != wb {
                    integer(wa.max(wb), if wa > wb { sa } else { sb })
                } else {
                    integer(wa, sa && sb)
                }
            }
            _ => a,
        }
    }

    /// Convert `v` from type `from` to type `to`, following C conversion rules
    pub fn make_cast(&self, v: Formula, from: &SimplifiedType, to: &SimplifiedType) -> Formula {
        if from == to {
            return v;
        }
        let conv = self.conv;
        let fmgr = &conv.fmgr;
        if let SimplifiedType::Scalar(ScalarType {
            kind: ScalarKind::Bool,
            ..
        }) = to
        {
            let b = self.to_bool(v, from);
            return self.from_bool(b, to);
        }
        let bits = self.pointer_bits();
        match (arith(from, bits), arith(to, bits)) {
            (Arith::Float(_), Arith::Float(k)) => {
                let (exponent, mantissa) = k.exponent_and_mantissa();
                fmgr.make_fp_cast(v, Sort::Float { exponent, mantissa })
            }
            (Arith::Float(_), Arith::Integer { width, signed }) => {
                fmgr.make_fp_to_bv(v, signed, width)
            }
            (Arith::Integer { signed, .. }, Arith::Float(k)) => {
                let (exponent, mantissa) = k.exponent_and_mantissa();
                fmgr.make_fp_from_bv(v, signed, Sort::Float { exponent, mantissa })
            }
            (
                Arith::Integer {
                    width: from_width,
                    signed,
                },
                Arith::Integer {
                    width: to_width, ..
                },
            ) => {
                if to_width > from_width {
                    fmgr.make_extend(v, to_width - from_width, signed)
                } else if to_width < from_width {
                    fmgr.make_extract(v, to_width - 1, 0)
                } else {
                    v
                }
            }
            _ => {
                trace!("Ignoring conversion"; "from" => %from, "to" => %to);
                v
            }
        }
    }

    /// Reinterpret the bits of `v` as a value of type `to`. `None` if the sizes differ.
    pub fn make_value_reinterpretation(
        &self,
        v: Formula,
        from: &SimplifiedType,
        to: &SimplifiedType,
    ) -> Result<Option<Formula>> {
        if from == to {
            return Ok(Some(v));
        }
        if self.conv.types.bit_size_of(from)? != self.conv.types.bit_size_of(to)? {
            return Ok(None);
        }
        Ok(Some(self.from_bits(self.to_bits(v, from), to)))
    }

    /// The raw bits of a scalar value
    pub(crate) fn to_bits(&self, v: Formula, ty: &SimplifiedType) -> Formula {
        match arith(ty, self.pointer_bits()) {
            Arith::Float(_) => self.conv.fmgr.make_fp_to_ieee_bits(v),
            _ => v,
        }
    }

    pub(crate) fn from_bits(&self, bits: Formula, ty: &SimplifiedType) -> Formula {
        match arith(ty, self.pointer_bits()) {
            Arith::Float(k) => {
                let (exponent, mantissa) = k.exponent_and_mantissa();
                self.conv
                    .fmgr
                    .make_fp_from_ieee_bits(bits, Sort::Float { exponent, mantissa })
            }
            _ => bits,
        }
    }

    /// C truth: non-zero
    pub fn to_bool(&self, v: Formula, ty: &SimplifiedType) -> Formula {
        let conv = self.conv;
        let fmgr = &conv.fmgr;
        match arith(ty, self.pointer_bits()) {
            Arith::Float(k) => {
                let (exponent, mantissa) = k.exponent_and_mantissa();
                let zero = fmgr.make_float(Sort::Float { exponent, mantissa }, 0.0);
                fmgr.make_not(fmgr.make_fp_compare(FpCompareOp::Eq, v, zero))
            }
            Arith::Integer { width, .. } => {
                fmgr.make_not(fmgr.make_equal(v, fmgr.make_bv(width, 0)))
            }
            Arith::Other => fmgr.make_true(),
        }
    }

    /// `1` or `0` of type `ty`
    fn from_bool(&self, b: Formula, ty: &SimplifiedType) -> Formula {
        let conv = self.conv;
        let fmgr = &conv.fmgr;
        match arith(ty, self.pointer_bits()) {
            Arith::Float(k) => {
                let (exponent, mantissa) = k.exponent_and_mantissa();
                let sort = Sort::Float { exponent, mantissa };
                fmgr.make_ite(
                    b,
                    fmgr.make_float(sort.clone(), 1.0),
                    fmgr.make_float(sort, 0.0),
                )
            }
            Arith::Integer { width, .. } => {
                fmgr.make_ite(b, fmgr.make_bv(width, 1), fmgr.make_bv(width, 0))
            }
            Arith::Other => b,
        }
    }
}
