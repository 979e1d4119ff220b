//! C types, their canonical simplified form, and platform layout.
//!
//! References to composite types are done through naming, thus recursiveness in types (e.g. a
//! `struct node` holding a `struct node *`) is factored out of [`CType`] and [`SimplifiedType`],
//! and instead handled by the [`TypeRegistry`] mapping names to definitions.

use crate::containers::unordered::UnorderedMap;
use crate::error::{EncodingError, Result};
use crate::expr::Expression;
use crate::formula::Sort;
use crate::machine_model::MachineModel;
use std::sync::{Arc, Mutex};

/// C built-in scalar types (and `void`)
#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone, Copy)]
pub enum BuiltIn {
    Void,
    Bool,
    Char,
    SignedChar,
    UnsignedChar,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Long,
    UnsignedLong,
    LongLong,
    UnsignedLongLong,
    Int128,
    UnsignedInt128,
    Float,
    Double,
    LongDouble,
}

impl BuiltIn {
    /// Integer built-ins in increasing size, signed variant first
    const INTEGERS: [BuiltIn; 12] = [
        BuiltIn::SignedChar,
        BuiltIn::UnsignedChar,
        BuiltIn::Short,
        BuiltIn::UnsignedShort,
        BuiltIn::Int,
        BuiltIn::UnsignedInt,
        BuiltIn::Long,
        BuiltIn::UnsignedLong,
        BuiltIn::LongLong,
        BuiltIn::UnsignedLongLong,
        BuiltIn::Int128,
        BuiltIn::UnsignedInt128,
    ];

    /// Convert to a printable C name
    pub fn to_printable(&self) -> &str {
        use BuiltIn::*;
        match self {
            Void => "void",
            Bool => "_Bool",
            Char => "char",
            SignedChar => "signed char",
            UnsignedChar => "unsigned char",
            Short => "short",
            UnsignedShort => "unsigned short",
            Int => "int",
            UnsignedInt => "unsigned int",
            Long => "long",
            UnsignedLong => "unsigned long",
            LongLong => "long long",
            UnsignedLongLong => "unsigned long long",
            Int128 => "__int128",
            UnsignedInt128 => "unsigned __int128",
            Float => "float",
            Double => "double",
            LongDouble => "long double",
        }
    }
}

#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone, Copy)]
pub enum CompositeKind {
    Struct,
    Union,
}

impl std::fmt::Display for CompositeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CompositeKind::Struct => write!(f, "struct"),
            CompositeKind::Union => write!(f, "union"),
        }
    }
}

/// A C type as written in the program
#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone)]
pub enum CType {
    BuiltIn(BuiltIn),
    /// An enumeration, by tag name. Enumerations are `int`-sized.
    Enum(String),
    Pointer(Box<CType>),
    /// An array with its length expression; `None` for incomplete arrays (`int a[]`)
    Array(Box<CType>, Option<Box<Expression>>),
    /// A struct or union, by tag name; the definition lives in the [`TypeRegistry`]
    Composite(CompositeKind, String),
    Function(FunctionType),
    /// A typedef name together with the type it stands for
    TypeDef(String, Box<CType>),
    Qualified {
        is_const: bool,
        is_volatile: bool,
        inner: Box<CType>,
    },
}

#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone)]
pub struct FunctionType {
    pub return_type: Box<CType>,
    pub parameters: Vec<CType>,
    pub variadic: bool,
}

impl CType {
    pub fn int() -> Self {
        CType::BuiltIn(BuiltIn::Int)
    }

    pub fn pointer_to(inner: CType) -> Self {
        CType::Pointer(Box::new(inner))
    }

    /// An array of literal length `length`
    pub fn array_of(element: CType, length: u64) -> Self {
        CType::Array(
            Box::new(element),
            Some(Box::new(Expression::int(
                length as i128,
                CType::BuiltIn(BuiltIn::UnsignedLong),
            ))),
        )
    }

    pub fn struct_named(name: impl Into<String>) -> Self {
        CType::Composite(CompositeKind::Struct, name.into())
    }

    pub fn union_named(name: impl Into<String>) -> Self {
        CType::Composite(CompositeKind::Union, name.into())
    }
}

/// One member of a composite definition
#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone)]
pub struct CompositeMember {
    /// Empty for unnamed bit-fields
    pub name: String,
    pub ty: CType,
    pub bit_field_width: Option<u32>,
}

impl CompositeMember {
    pub fn new(name: impl Into<String>, ty: CType) -> Self {
        Self {
            name: name.into(),
            ty,
            bit_field_width: None,
        }
    }

    pub fn bit_field(name: impl Into<String>, ty: CType, width: u32) -> Self {
        Self {
            name: name.into(),
            ty,
            bit_field_width: Some(width),
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct CompositeDefinition {
    pub kind: CompositeKind,
    pub name: String,
    pub members: Vec<CompositeMember>,
}

/// Definitions of all composite types of the program, by tag name
#[derive(Default, Debug, Clone)]
pub struct TypeRegistry {
    composites: UnorderedMap<String, CompositeDefinition>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn define(&mut self, kind: CompositeKind, name: &str, members: Vec<CompositeMember>) {
        self.composites.insert(
            name.to_owned(),
            CompositeDefinition {
                kind,
                name: name.to_owned(),
                members,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&CompositeDefinition> {
        self.composites.get(name)
    }
}

#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone, Copy)]
pub enum FloatKind {
    Single,
    Double,
    /// `long double`, modelled as IEEE binary128
    Quad,
}

impl FloatKind {
    /// Exponent and significand widths (the latter including the hidden bit)
    pub fn exponent_and_mantissa(&self) -> (u32, u32) {
        match self {
            FloatKind::Single => (8, 24),
            FloatKind::Double => (11, 53),
            FloatKind::Quad => (15, 113),
        }
    }
}

#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone, Copy)]
pub enum ScalarKind {
    Bool,
    Integer,
    Float(FloatKind),
}

#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone, Copy)]
pub struct ScalarType {
    pub kind: ScalarKind,
    /// Width in bits; for bit-field members, the declared bit-field width
    pub bit_width: u32,
    pub signed: bool,
}

impl ScalarType {
    pub fn is_float(&self) -> bool {
        matches!(self.kind, ScalarKind::Float(_))
    }
}

#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone)]
pub enum ArrayLength {
    Literal(u64),
    /// A length only known at run time (variable length arrays, allocations of symbolic size)
    Symbolic(Arc<Expression>),
    /// Incomplete arrays and flexible array members
    Unknown,
}

#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone)]
pub struct FunctionSignature {
    pub return_type: SimplifiedType,
    pub parameters: Vec<SimplifiedType>,
    pub variadic: bool,
}

/// The canonical form of a [`CType`]: no typedefs, no qualifiers, enumerations as integers and
/// scalar built-ins reduced to their width, signedness and float format on the target platform.
/// Composites are referenced by kind and tag; see [`TypeHandler::layout`] for their members.
#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone)]
pub enum SimplifiedType {
    Void,
    Scalar(ScalarType),
    Pointer(Arc<SimplifiedType>),
    Array(Arc<SimplifiedType>, ArrayLength),
    Composite(CompositeKind, String),
    Function(Arc<FunctionSignature>),
}

impl SimplifiedType {
    pub fn is_scalar_or_pointer(&self) -> bool {
        matches!(self, SimplifiedType::Scalar(_) | SimplifiedType::Pointer(_))
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            SimplifiedType::Array(..) | SimplifiedType::Composite(..)
        )
    }

    pub fn is_union(&self) -> bool {
        matches!(self, SimplifiedType::Composite(CompositeKind::Union, _))
    }

    /// The element type of an array or the pointee of a pointer
    pub fn element_type(&self) -> Option<&SimplifiedType> {
        match self {
            SimplifiedType::Array(e, _) | SimplifiedType::Pointer(e) => Some(e),
            _ => None,
        }
    }

    /// Array-to-pointer and function-to-pointer decay
    pub fn decayed(&self) -> SimplifiedType {
        match self {
            SimplifiedType::Array(e, _) => SimplifiedType::Pointer(e.clone()),
            SimplifiedType::Function(_) => SimplifiedType::Pointer(Arc::new(self.clone())),
            t => t.clone(),
        }
    }
}

impl std::fmt::Display for SimplifiedType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SimplifiedType::Void => write!(f, "void"),
            SimplifiedType::Scalar(s) => match s.kind {
                ScalarKind::Bool => write!(f, "_Bool"),
                ScalarKind::Integer => {
                    write!(f, "{}int{}_t", if s.signed { "" } else { "u" }, s.bit_width)
                }
                ScalarKind::Float(FloatKind::Single) => write!(f, "float"),
                ScalarKind::Float(FloatKind::Double) => write!(f, "double"),
                ScalarKind::Float(FloatKind::Quad) => write!(f, "long double"),
            },
            SimplifiedType::Pointer(inner) => write!(f, "{}*", inner),
            SimplifiedType::Array(inner, ArrayLength::Literal(n)) => write!(f, "{}[{}]", inner, n),
            SimplifiedType::Array(inner, ArrayLength::Symbolic(_)) => write!(f, "{}[*]", inner),
            SimplifiedType::Array(inner, ArrayLength::Unknown) => write!(f, "{}[]", inner),
            SimplifiedType::Composite(kind, name) => write!(f, "{} {}", kind, name),
            SimplifiedType::Function(sig) => write!(f, "{}()", sig.return_type),
        }
    }
}

/// A member of a laid out composite
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct MemberLayout {
    pub name: String,
    pub ty: SimplifiedType,
    pub c_type: CType,
    pub bit_offset: u64,
    pub bit_field_width: Option<u32>,
}

impl MemberLayout {
    /// Byte offset of the member, `None` for bit-fields (which are not byte addressable)
    pub fn byte_offset(&self) -> Option<u64> {
        if self.bit_field_width.is_some() || self.bit_offset % 8 != 0 {
            None
        } else {
            Some(self.bit_offset / 8)
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct CompositeLayout {
    pub kind: CompositeKind,
    pub name: String,
    /// Named members in declaration order
    pub members: Vec<MemberLayout>,
    pub bit_size: u64,
    /// Alignment in bytes
    pub alignment: u64,
}

impl CompositeLayout {
    pub fn member(&self, name: &str) -> Option<&MemberLayout> {
        self.members.iter().find(|m| m.name == name)
    }
}

fn round_up(v: u64, to: u64) -> u64 {
    if to == 0 {
        v
    } else {
        (v + to - 1) / to * to
    }
}

/// Simplification, sizes and offsets of types on one [`MachineModel`]. Results are cached; the
/// handler is safe to share between threads.
pub struct TypeHandler {
    machine: MachineModel,
    registry: TypeRegistry,
    simplified: Mutex<UnorderedMap<CType, SimplifiedType>>,
    layouts: Mutex<UnorderedMap<String, Arc<CompositeLayout>>>,
}

impl TypeHandler {
    pub fn new(machine: MachineModel, registry: TypeRegistry) -> Self {
        Self {
            machine,
            registry,
            simplified: Default::default(),
            layouts: Default::default(),
        }
    }

    pub fn machine_model(&self) -> &MachineModel {
        &self.machine
    }

    /// The canonical form of `t`. Pure and idempotent (modulo [`Self::lower`]).
    pub fn simplify(&self, t: &CType) -> SimplifiedType {
        if let Some(s) = self
            .simplified
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(t)
        {
            return s.clone();
        }
        let s = self.simplify_uncached(t);
        self.simplified
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(t.clone(), s.clone());
        s
    }

    fn simplify_uncached(&self, t: &CType) -> SimplifiedType {
        match t {
            CType::BuiltIn(BuiltIn::Void) => SimplifiedType::Void,
            CType::BuiltIn(b) => SimplifiedType::Scalar(self.scalar(b)),
            CType::Enum(_) => SimplifiedType::Scalar(self.scalar(&BuiltIn::Int)),
            CType::Pointer(inner) => SimplifiedType::Pointer(Arc::new(self.simplify(inner))),
            CType::Array(element, length) => SimplifiedType::Array(
                Arc::new(self.simplify(element)),
                match length {
                    None => ArrayLength::Unknown,
                    Some(e) => match e.constant_value() {
                        Some(v) if v >= 0 => ArrayLength::Literal(v as u64),
                        _ => ArrayLength::Symbolic(Arc::new((**e).clone())),
                    },
                },
            ),
            CType::Composite(kind, name) => SimplifiedType::Composite(*kind, name.clone()),
            CType::Function(f) => SimplifiedType::Function(Arc::new(FunctionSignature {
                return_type: self.simplify(&f.return_type),
                parameters: f
                    .parameters
                    .iter()
                    .map(|p| self.simplify_operand(p))
                    .collect(),
                variadic: f.variadic,
            })),
            CType::TypeDef(_, inner) => self.simplify(inner),
            CType::Qualified { inner, .. } => self.simplify(inner),
        }
    }

    fn scalar(&self, b: &BuiltIn) -> ScalarType {
        let kind = match b {
            BuiltIn::Bool => ScalarKind::Bool,
            BuiltIn::Float => ScalarKind::Float(FloatKind::Single),
            BuiltIn::Double => ScalarKind::Float(FloatKind::Double),
            BuiltIn::LongDouble => ScalarKind::Float(FloatKind::Quad),
            _ => ScalarKind::Integer,
        };
        ScalarType {
            kind,
            bit_width: (self.machine.size_of(b) * 8) as u32,
            signed: self.machine.is_signed(b),
        }
    }

    /// The simplified type of `t` when used as an operand, i.e. after array and function decay
    pub fn simplify_operand(&self, t: &CType) -> SimplifiedType {
        self.simplify(t).decayed()
    }

    /// Map a simplified type back to a C type that simplifies to it again
    pub fn lower(&self, t: &SimplifiedType) -> CType {
        match t {
            SimplifiedType::Void => CType::BuiltIn(BuiltIn::Void),
            SimplifiedType::Scalar(s) => CType::BuiltIn(self.built_in_for(s)),
            SimplifiedType::Pointer(inner) => CType::Pointer(Box::new(self.lower(inner))),
            SimplifiedType::Array(element, length) => CType::Array(
                Box::new(self.lower(element)),
                match length {
                    ArrayLength::Literal(n) => Some(Box::new(Expression::int(
                        *n as i128,
                        CType::BuiltIn(BuiltIn::UnsignedLong),
                    ))),
                    ArrayLength::Symbolic(e) => Some(Box::new((**e).clone())),
                    ArrayLength::Unknown => None,
                },
            ),
            SimplifiedType::Composite(kind, name) => CType::Composite(*kind, name.clone()),
            SimplifiedType::Function(sig) => CType::Function(FunctionType {
                return_type: Box::new(self.lower(&sig.return_type)),
                parameters: sig.parameters.iter().map(|p| self.lower(p)).collect(),
                variadic: sig.variadic,
            }),
        }
    }

    fn built_in_for(&self, s: &ScalarType) -> BuiltIn {
        match s.kind {
            ScalarKind::Bool => BuiltIn::Bool,
            ScalarKind::Float(FloatKind::Single) => BuiltIn::Float,
            ScalarKind::Float(FloatKind::Double) => BuiltIn::Double,
            ScalarKind::Float(FloatKind::Quad) => BuiltIn::LongDouble,
            ScalarKind::Integer => {
                let width = s.bit_width as u64;
                let candidates = BuiltIn::INTEGERS
                    .iter()
                    .filter(|b| self.machine.is_signed(b) == s.signed);
                candidates
                    .clone()
                    .find(|b| self.machine.size_of(b) * 8 == width)
                    .or_else(|| candidates.clone().find(|b| self.machine.size_of(b) * 8 >= width))
                    .copied()
                    .unwrap_or(if s.signed {
                        BuiltIn::Int128
                    } else {
                        BuiltIn::UnsignedInt128
                    })
            }
        }
    }

    /// The layout of a composite type. Fails for composites that are declared but never defined.
    pub fn layout(&self, kind: CompositeKind, name: &str) -> Result<Arc<CompositeLayout>> {
        if let Some(l) = self
            .layouts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
        {
            return Ok(l.clone());
        }
        let def = self.registry.get(name).ok_or_else(|| {
            EncodingError::unrecognized(format!("incomplete type {} {}", kind, name))
        })?;
        let layout = Arc::new(self.compute_layout(def)?);
        self.layouts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_owned(), layout.clone());
        Ok(layout)
    }

    fn compute_layout(&self, def: &CompositeDefinition) -> Result<CompositeLayout> {
        let mut offset = 0u64;
        let mut end = 0u64;
        let mut alignment = 1u64;
        let mut members = vec![];
        for m in def.members.iter() {
            let ty = self.simplify(&m.ty);
            let align = self.alignment_of(&ty)?;
            if def.kind == CompositeKind::Union {
                offset = 0;
            }
            let (member_offset, member_ty, size) = match m.bit_field_width {
                Some(width) => {
                    let storage = self.bit_size_of(&ty)?;
                    if width == 0 {
                        offset = round_up(offset, storage);
                        continue;
                    }
                    let width = width as u64;
                    if offset / storage != (offset + width - 1) / storage {
                        offset = round_up(offset, storage);
                    }
                    let member_ty = match ty {
                        SimplifiedType::Scalar(s) => SimplifiedType::Scalar(ScalarType {
                            bit_width: width as u32,
                            ..s
                        }),
                        _ => {
                            return Err(EncodingError::unrecognized(format!(
                                "bit-field {} of non-scalar type {}",
                                m.name, ty
                            )))
                        }
                    };
                    (offset, member_ty, width)
                }
                None => {
                    offset = round_up(offset, align * 8);
                    let size = self.bit_size_of(&ty)?;
                    (offset, ty, size)
                }
            };
            alignment = alignment.max(align);
            offset = member_offset + size;
            end = end.max(offset);
            if !m.name.is_empty() {
                members.push(MemberLayout {
                    name: m.name.clone(),
                    ty: member_ty,
                    c_type: m.ty.clone(),
                    bit_offset: member_offset,
                    bit_field_width: m.bit_field_width,
                });
            }
        }
        Ok(CompositeLayout {
            kind: def.kind,
            name: def.name.clone(),
            members,
            bit_size: round_up(end, alignment * 8),
            alignment,
        })
    }

    /// Size in bits
    pub fn bit_size_of(&self, t: &SimplifiedType) -> Result<u64> {
        match t {
            SimplifiedType::Void | SimplifiedType::Function(_) => Ok(8),
            SimplifiedType::Scalar(s) => Ok(s.bit_width as u64),
            SimplifiedType::Pointer(_) => Ok(self.machine.size_of_pointer * 8),
            SimplifiedType::Array(e, ArrayLength::Literal(n)) => Ok(n * self.bit_size_of(e)?),
            SimplifiedType::Array(_, ArrayLength::Unknown) => Ok(0),
            SimplifiedType::Array(_, ArrayLength::Symbolic(_)) => Err(EncodingError::unsupported(
                format!("size of variable length array {} is not a constant", t),
            )),
            SimplifiedType::Composite(kind, name) => Ok(self.layout(*kind, name)?.bit_size),
        }
    }

    /// Size in bytes, rounded up
    pub fn size_of(&self, t: &SimplifiedType) -> Result<u64> {
        Ok(round_up(self.bit_size_of(t)?, 8) / 8)
    }

    /// Alignment in bytes
    pub fn alignment_of(&self, t: &SimplifiedType) -> Result<u64> {
        match t {
            SimplifiedType::Void | SimplifiedType::Function(_) => Ok(1),
            SimplifiedType::Scalar(s) => Ok(match s.kind {
                ScalarKind::Float(FloatKind::Double) => self.machine.alignment_of_double,
                ScalarKind::Float(FloatKind::Quad) => self.machine.alignment_of_long_double,
                ScalarKind::Integer if s.bit_width == 64 => self.machine.alignment_of_long_long,
                _ => (s.bit_width as u64 / 8).max(1),
            }),
            SimplifiedType::Pointer(_) => Ok(self.machine.size_of_pointer),
            SimplifiedType::Array(e, _) => self.alignment_of(e),
            SimplifiedType::Composite(kind, name) => Ok(self.layout(*kind, name)?.alignment),
        }
    }

    /// The layout of member `member` of the composite `composite`
    pub fn member(&self, composite: &SimplifiedType, member: &str) -> Result<MemberLayout> {
        match composite {
            SimplifiedType::Composite(kind, name) => self
                .layout(*kind, name)?
                .member(member)
                .cloned()
                .ok_or_else(|| {
                    EncodingError::unrecognized(format!("{} has no member {}", composite, member))
                }),
            _ => Err(EncodingError::unrecognized(format!(
                "field access {} on non-composite type {}",
                member, composite
            ))),
        }
    }

    pub fn bit_offset_of(&self, composite: &SimplifiedType, member: &str) -> Result<u64> {
        Ok(self.member(composite, member)?.bit_offset)
    }

    /// Byte offset of a member; `None` for bit-fields
    pub fn byte_offset_of(&self, composite: &SimplifiedType, member: &str) -> Result<Option<u64>> {
        Ok(self.member(composite, member)?.byte_offset())
    }

    /// Whether an object of type `t` contains an array anywhere. Such objects always live in
    /// memory, since their elements are addressed by computed offsets.
    pub fn contains_array(&self, t: &SimplifiedType) -> Result<bool> {
        match t {
            SimplifiedType::Array(..) => Ok(true),
            SimplifiedType::Composite(kind, name) => {
                for m in self.layout(*kind, name)?.members.iter() {
                    if self.contains_array(&m.ty)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    /// The solver sort holding values of the scalar (or decayed) type `t`
    pub fn sort_of(&self, t: &SimplifiedType) -> Result<Sort> {
        match t {
            SimplifiedType::Scalar(ScalarType {
                kind: ScalarKind::Float(k),
                ..
            }) => {
                let (exponent, mantissa) = k.exponent_and_mantissa();
                Ok(Sort::Float { exponent, mantissa })
            }
            SimplifiedType::Scalar(s) => Ok(Sort::BitVec(s.bit_width)),
            SimplifiedType::Pointer(_) | SimplifiedType::Array(..) | SimplifiedType::Function(_) => {
                Ok(self.pointer_sort())
            }
            SimplifiedType::Void | SimplifiedType::Composite(..) => Err(
                EncodingError::unrecognized(format!("no value of type {} can be formed", t)),
            ),
        }
    }

    /// Sort of addresses (and of `size_t`)
    pub fn pointer_sort(&self) -> Sort {
        Sort::BitVec(self.machine.pointer_bits())
    }

    /// The simplified `size_t` of the platform
    pub fn size_type(&self) -> SimplifiedType {
        SimplifiedType::Scalar(ScalarType {
            kind: ScalarKind::Integer,
            bit_width: self.machine.pointer_bits(),
            signed: false,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::machine_model::{LINUX32, LINUX64};

    fn handler() -> TypeHandler {
        let mut registry = TypeRegistry::new();
        registry.define(
            CompositeKind::Struct,
            "s",
            vec![
                CompositeMember::new("c", CType::BuiltIn(BuiltIn::Char)),
                CompositeMember::new("d", CType::BuiltIn(BuiltIn::Double)),
                CompositeMember::new("i", CType::int()),
            ],
        );
        registry.define(
            CompositeKind::Union,
            "u",
            vec![
                CompositeMember::new("i", CType::int()),
                CompositeMember::new("f", CType::BuiltIn(BuiltIn::Float)),
                CompositeMember::new("bytes", CType::array_of(CType::BuiltIn(BuiltIn::Char), 5)),
            ],
        );
        registry.define(
            CompositeKind::Struct,
            "flags",
            vec![
                CompositeMember::bit_field("a", CType::BuiltIn(BuiltIn::UnsignedInt), 3),
                CompositeMember::bit_field("b", CType::BuiltIn(BuiltIn::UnsignedInt), 30),
                CompositeMember::new("next", CType::pointer_to(CType::struct_named("flags"))),
            ],
        );
        TypeHandler::new(LINUX64.clone(), registry)
    }

    fn constructible_types() -> Vec<CType> {
        let int = CType::int();
        vec![
            int.clone(),
            CType::BuiltIn(BuiltIn::Char),
            CType::BuiltIn(BuiltIn::UnsignedLongLong),
            CType::BuiltIn(BuiltIn::LongDouble),
            CType::Enum("color".into()),
            CType::TypeDef(
                "myint".into(),
                Box::new(CType::Qualified {
                    is_const: true,
                    is_volatile: false,
                    inner: Box::new(int.clone()),
                }),
            ),
            CType::pointer_to(CType::struct_named("s")),
            CType::array_of(CType::union_named("u"), 4),
            CType::Array(
                Box::new(int.clone()),
                Some(Box::new(Expression::id("main::n", int.clone()))),
            ),
            CType::Array(Box::new(int.clone()), None),
            CType::Function(FunctionType {
                return_type: Box::new(CType::BuiltIn(BuiltIn::Void)),
                parameters: vec![CType::array_of(int, 2)],
                variadic: true,
            }),
        ]
    }

    #[test]
    fn simplification_is_idempotent() {
        let h = handler();
        for t in constructible_types() {
            let s = h.simplify(&t);
            assert_eq!(h.simplify(&h.lower(&s)), s, "for {:?}", t);
        }
    }

    #[test]
    fn typedefs_and_qualifiers_vanish() {
        let h = handler();
        let wrapped = CType::TypeDef(
            "T".into(),
            Box::new(CType::Qualified {
                is_const: false,
                is_volatile: true,
                inner: Box::new(CType::int()),
            }),
        );
        assert_eq!(h.simplify(&wrapped), h.simplify(&CType::int()));
    }

    #[test]
    fn struct_layout_follows_alignment() {
        let h = handler();
        let s = SimplifiedType::Composite(CompositeKind::Struct, "s".into());
        assert_eq!(h.bit_offset_of(&s, "c").unwrap(), 0);
        assert_eq!(h.bit_offset_of(&s, "d").unwrap(), 64);
        assert_eq!(h.bit_offset_of(&s, "i").unwrap(), 128);
        assert_eq!(h.size_of(&s).unwrap(), 24);

        let h32 = TypeHandler::new(LINUX32.clone(), handler().registry.clone());
        assert_eq!(h32.bit_offset_of(&s, "d").unwrap(), 32);
        assert_eq!(h32.size_of(&s).unwrap(), 16);
    }

    #[test]
    fn union_layout_is_largest_member() {
        let h = handler();
        let u = SimplifiedType::Composite(CompositeKind::Union, "u".into());
        assert_eq!(h.bit_offset_of(&u, "f").unwrap(), 0);
        assert_eq!(h.size_of(&u).unwrap(), 8);
    }

    #[test]
    fn bit_fields_share_storage_units() {
        let h = handler();
        let flags = SimplifiedType::Composite(CompositeKind::Struct, "flags".into());
        assert_eq!(h.bit_offset_of(&flags, "a").unwrap(), 0);
        assert_eq!(h.bit_offset_of(&flags, "b").unwrap(), 32);
        assert_eq!(h.byte_offset_of(&flags, "b").unwrap(), None);
        assert_eq!(h.byte_offset_of(&flags, "next").unwrap(), Some(8));
        assert_eq!(h.size_of(&flags).unwrap(), 16);
    }

    #[test]
    fn incomplete_and_variable_sizes_are_reported() {
        let h = handler();
        let missing = SimplifiedType::Composite(CompositeKind::Struct, "missing".into());
        assert!(matches!(
            h.bit_size_of(&missing),
            Err(EncodingError::UnrecognizedCode { .. })
        ));
        let vla = h.simplify(&CType::Array(
            Box::new(CType::int()),
            Some(Box::new(Expression::id("main::n", CType::int()))),
        ));
        assert!(matches!(
            h.bit_size_of(&vla),
            Err(EncodingError::UnsupportedCode { .. })
        ));
    }
}
