//! A small, solver-independent algebra of first-order formulas.
//!
//! Formulas are immutable, reference counted trees that compare and hash structurally. The
//! [`FormulaManager`] is the only way to build them; it performs light constant folding, so two
//! formulas built through the same sequence of manager calls are always structurally equal.

use itertools::Itertools;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A global counter for fresh names. Converters on different threads draw from the same counter,
/// so names of quantified and placeholder variables never collide across formulas.
static UNIQUE_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// A number never handed out before in this process
pub fn next_unique_id() -> usize {
    UNIQUE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// `prefix` followed by a fresh number, e.g. `__quantifier_12`
pub fn unique_name(prefix: &str) -> String {
    format!("{}{}", prefix, next_unique_id())
}

#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone)]
pub enum Sort {
    Bool,
    BitVec(u32),
    /// IEEE floating point; `mantissa` includes the hidden bit
    Float {
        exponent: u32,
        mantissa: u32,
    },
    Array(Box<Sort>, Box<Sort>),
}

impl Sort {
    /// Width in bits of bit-vector and floating point sorts
    pub fn bit_width(&self) -> Option<u32> {
        match self {
            Sort::BitVec(w) => Some(*w),
            Sort::Float { exponent, mantissa } => Some(exponent + mantissa),
            _ => None,
        }
    }
}

impl std::fmt::Display for Sort {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Sort::Bool => write!(f, "Bool"),
            Sort::BitVec(w) => write!(f, "(_ BitVec {})", w),
            Sort::Float { exponent, mantissa } => {
                write!(f, "(_ FloatingPoint {} {})", exponent, mantissa)
            }
            Sort::Array(i, e) => write!(f, "(Array {} {})", i, e),
        }
    }
}

#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone, Copy)]
pub enum BvUnaryOp {
    Neg,
    Not,
}

#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone, Copy)]
pub enum BvBinaryOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
    URem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
}

#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone, Copy)]
pub enum BvCompareOp {
    Slt,
    Sle,
    Ult,
    Ule,
}

#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone, Copy)]
pub enum FpBinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone, Copy)]
pub enum FpCompareOp {
    Lt,
    Leq,
    Eq,
}

#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone)]
pub enum Term {
    True,
    False,
    /// A bit-vector constant; `value` is always reduced modulo `2^width`
    BitVecConst {
        width: u32,
        value: u128,
    },
    /// A floating point constant given by the bits of an `f64`, rounded into `sort`
    FloatConst {
        sort: Sort,
        f64_bits: u64,
    },
    Variable {
        name: String,
        sort: Sort,
    },
    Not(Formula),
    And(Vec<Formula>),
    Or(Vec<Formula>),
    Ite(Formula, Formula, Formula),
    Equal(Formula, Formula),
    BvUnary(BvUnaryOp, Formula),
    BvBinary(BvBinaryOp, Formula, Formula),
    BvCompare(BvCompareOp, Formula, Formula),
    Extract {
        high: u32,
        low: u32,
        operand: Formula,
    },
    Extend {
        signed: bool,
        bits: u32,
        operand: Formula,
    },
    Concat(Formula, Formula),
    FpNeg(Formula),
    FpBinary(FpBinaryOp, Formula, Formula),
    FpCompare(FpCompareOp, Formula, Formula),
    /// Conversion of a (signed or unsigned) bit-vector value into the float `sort`
    FpFromBv {
        signed: bool,
        sort: Sort,
        operand: Formula,
    },
    /// Conversion (rounding towards zero) of a float into a bit-vector of `width` bits
    FpToBv {
        signed: bool,
        width: u32,
        operand: Formula,
    },
    FpToFp {
        sort: Sort,
        operand: Formula,
    },
    /// Reinterpret IEEE bits as a float of `sort`
    FpFromIeeeBits {
        sort: Sort,
        operand: Formula,
    },
    /// The IEEE bits of a float
    FpToIeeeBits(Formula),
    Select(Formula, Formula),
    Store(Formula, Formula, Formula),
    /// Application of an uninterpreted function
    Apply {
        function: String,
        sort: Sort,
        arguments: Vec<Formula>,
    },
    Forall(Vec<Formula>, Formula),
}

/// An immutable formula. Cheap to clone.
#[derive(PartialEq, Eq, Hash, PartialOrd, Ord, Clone)]
pub struct Formula(Arc<Term>);

impl Formula {
    fn new(t: Term) -> Self {
        Formula(Arc::new(t))
    }

    pub fn term(&self) -> &Term {
        &self.0
    }

    pub fn is_true(&self) -> bool {
        matches!(self.term(), Term::True)
    }

    pub fn is_false(&self) -> bool {
        matches!(self.term(), Term::False)
    }

    /// The value and width of a bit-vector constant
    pub fn as_bv_const(&self) -> Option<(u128, u32)> {
        match self.term() {
            Term::BitVecConst { width, value } => Some((*value, *width)),
            _ => None,
        }
    }

    /// The top-level conjuncts of this formula
    pub fn conjuncts(&self) -> Vec<Formula> {
        match self.term() {
            Term::And(fs) => fs.clone(),
            Term::True => vec![],
            _ => vec![self.clone()],
        }
    }

    pub fn sort(&self) -> Sort {
        use Term::*;
        match self.term() {
            True | False | Not(_) | And(_) | Or(_) | Equal(..) | BvCompare(..) | FpCompare(..)
            | Forall(..) => Sort::Bool,
            BitVecConst { width, .. } => Sort::BitVec(*width),
            FloatConst { sort, .. }
            | Variable { sort, .. }
            | FpFromBv { sort, .. }
            | FpToFp { sort, .. }
            | FpFromIeeeBits { sort, .. }
            | Apply { sort, .. } => sort.clone(),
            Ite(_, t, _) => t.sort(),
            BvUnary(_, a) | BvBinary(_, a, _) | FpNeg(a) | FpBinary(_, a, _) => a.sort(),
            Extract { high, low, .. } => Sort::BitVec(high - low + 1),
            Extend { bits, operand, .. } => Sort::BitVec(bv_width(operand) + bits),
            Concat(a, b) => Sort::BitVec(bv_width(a) + bv_width(b)),
            FpToBv { width, .. } => Sort::BitVec(*width),
            FpToIeeeBits(a) => Sort::BitVec(a.sort().bit_width().unwrap_or(0)),
            Select(a, _) => match a.sort() {
                Sort::Array(_, e) => *e,
                s => s,
            },
            Store(a, _, _) => a.sort(),
        }
    }

    /// Whether the variable named `name` occurs anywhere in this formula
    pub fn mentions_variable(&self, name: &str) -> bool {
        use Term::*;
        match self.term() {
            True | False | BitVecConst { .. } | FloatConst { .. } => false,
            Variable { name: n, .. } => n == name,
            Not(a) | BvUnary(_, a) | FpNeg(a) | FpToIeeeBits(a) => a.mentions_variable(name),
            Extract { operand, .. }
            | Extend { operand, .. }
            | FpFromBv { operand, .. }
            | FpToBv { operand, .. }
            | FpToFp { operand, .. }
            | FpFromIeeeBits { operand, .. } => operand.mentions_variable(name),
            And(fs) | Or(fs) | Apply { arguments: fs, .. } => {
                fs.iter().any(|f| f.mentions_variable(name))
            }
            Equal(a, b)
            | BvBinary(_, a, b)
            | BvCompare(_, a, b)
            | Concat(a, b)
            | FpBinary(_, a, b)
            | FpCompare(_, a, b)
            | Select(a, b) => a.mentions_variable(name) || b.mentions_variable(name),
            Ite(a, b, c) | Store(a, b, c) => {
                a.mentions_variable(name) || b.mentions_variable(name) || c.mentions_variable(name)
            }
            Forall(vs, body) => {
                vs.iter().any(|v| v.mentions_variable(name)) || body.mentions_variable(name)
            }
        }
    }
}

fn bv_width(f: &Formula) -> u32 {
    f.sort().bit_width().unwrap_or(0)
}

fn mask(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

fn to_signed(value: u128, width: u32) -> i128 {
    if width == 0 {
        0
    } else if width >= 128 {
        value as i128
    } else if value >> (width - 1) & 1 == 1 {
        (value | !mask(width)) as i128
    } else {
        value as i128
    }
}

impl std::fmt::Debug for Formula {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl std::fmt::Display for Formula {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use Term::*;
        match self.term() {
            True => write!(f, "true"),
            False => write!(f, "false"),
            BitVecConst { width, value } => write!(f, "(_ bv{} {})", value, width),
            FloatConst { sort, f64_bits } => {
                write!(f, "((_ to_fp {}) {})", sort, f64::from_bits(*f64_bits))
            }
            Variable { name, .. } => write!(f, "|{}|", name),
            Not(a) => write!(f, "(not {})", a),
            And(fs) => write!(f, "(and {})", fs.iter().join(" ")),
            Or(fs) => write!(f, "(or {})", fs.iter().join(" ")),
            Ite(c, t, e) => write!(f, "(ite {} {} {})", c, t, e),
            Equal(a, b) => write!(f, "(= {} {})", a, b),
            BvUnary(op, a) => write!(f, "({} {})", format!("{:?}", op).to_lowercase(), a),
            BvBinary(op, a, b) => {
                write!(f, "(bv{} {} {})", format!("{:?}", op).to_lowercase(), a, b)
            }
            BvCompare(op, a, b) => {
                write!(f, "(bv{} {} {})", format!("{:?}", op).to_lowercase(), a, b)
            }
            Extract { high, low, operand } => {
                write!(f, "((_ extract {} {}) {})", high, low, operand)
            }
            Extend {
                signed,
                bits,
                operand,
            } => write!(
                f,
                "((_ {}_extend {}) {})",
                if *signed { "sign" } else { "zero" },
                bits,
                operand
            ),
            Concat(a, b) => write!(f, "(concat {} {})", a, b),
            FpNeg(a) => write!(f, "(fp.neg {})", a),
            FpBinary(op, a, b) => {
                write!(f, "(fp.{} {} {})", format!("{:?}", op).to_lowercase(), a, b)
            }
            FpCompare(op, a, b) => {
                write!(f, "(fp.{} {} {})", format!("{:?}", op).to_lowercase(), a, b)
            }
            FpFromBv {
                signed,
                sort,
                operand,
            } => write!(
                f,
                "((_ {} {}) {})",
                if *signed { "to_fp" } else { "to_fp_unsigned" },
                sort,
                operand
            ),
            FpToBv {
                signed,
                width,
                operand,
            } => write!(
                f,
                "((_ {} {}) {})",
                if *signed { "fp.to_sbv" } else { "fp.to_ubv" },
                width,
                operand
            ),
            FpToFp { sort, operand } => write!(f, "((_ to_fp {}) {})", sort, operand),
            FpFromIeeeBits { sort, operand } => {
                write!(f, "((_ to_fp {}) {})", sort, operand)
            }
            FpToIeeeBits(a) => write!(f, "(fp.to_ieee_bv {})", a),
            Select(a, i) => write!(f, "(select {} {})", a, i),
            Store(a, i, v) => write!(f, "(store {} {} {})", a, i, v),
            Apply {
                function,
                arguments,
                ..
            } => write!(f, "(|{}| {})", function, arguments.iter().join(" ")),
            Forall(vs, body) => write!(
                f,
                "(forall ({}) {})",
                vs.iter()
                    .map(|v| format!("({} {})", v, v.sort()))
                    .join(" "),
                body
            ),
        }
    }
}

/// Builds formulas. Stateless; all instances are interchangeable.
#[derive(Default, Debug, Clone, Copy)]
pub struct FormulaManager;

impl FormulaManager {
    pub fn new() -> Self {
        FormulaManager
    }

    pub fn make_true(&self) -> Formula {
        Formula::new(Term::True)
    }

    pub fn make_false(&self) -> Formula {
        Formula::new(Term::False)
    }

    pub fn make_bool(&self, b: bool) -> Formula {
        if b {
            self.make_true()
        } else {
            self.make_false()
        }
    }

    /// The SSA-versioned variable `name@index`
    pub fn make_variable(&self, sort: Sort, name: &str, index: u32) -> Formula {
        self.make_variable_without_ssa_index(sort, &format!("{}@{}", name, index))
    }

    pub fn make_variable_without_ssa_index(&self, sort: Sort, name: &str) -> Formula {
        Formula::new(Term::Variable {
            name: name.to_owned(),
            sort,
        })
    }

    pub fn make_bv(&self, width: u32, value: i128) -> Formula {
        Formula::new(Term::BitVecConst {
            width,
            value: (value as u128) & mask(width),
        })
    }

    pub fn make_float(&self, sort: Sort, value: f64) -> Formula {
        Formula::new(Term::FloatConst {
            sort,
            f64_bits: value.to_bits(),
        })
    }

    pub fn make_not(&self, a: Formula) -> Formula {
        match a.term() {
            Term::True => self.make_false(),
            Term::False => self.make_true(),
            Term::Not(inner) => inner.clone(),
            _ => Formula::new(Term::Not(a)),
        }
    }

    pub fn make_and(&self, a: Formula, b: Formula) -> Formula {
        self.make_and_all([a, b])
    }

    /// Conjunction, flattening nested conjunctions and dropping `true`
    pub fn make_and_all(&self, fs: impl IntoIterator<Item = Formula>) -> Formula {
        let mut parts = vec![];
        for f in fs {
            match f.term() {
                Term::True => {}
                Term::False => return self.make_false(),
                Term::And(inner) => parts.extend(inner.iter().cloned()),
                _ => parts.push(f),
            }
        }
        match parts.len() {
            0 => self.make_true(),
            1 => parts.pop().unwrap_or_else(|| self.make_true()),
            _ => Formula::new(Term::And(parts)),
        }
    }

    pub fn make_or(&self, a: Formula, b: Formula) -> Formula {
        self.make_or_all([a, b])
    }

    /// Disjunction, flattening nested disjunctions and dropping `false`
    pub fn make_or_all(&self, fs: impl IntoIterator<Item = Formula>) -> Formula {
        let mut parts = vec![];
        for f in fs {
            match f.term() {
                Term::False => {}
                Term::True => return self.make_true(),
                Term::Or(inner) => parts.extend(inner.iter().cloned()),
                _ => parts.push(f),
            }
        }
        match parts.len() {
            0 => self.make_false(),
            1 => parts.pop().unwrap_or_else(|| self.make_false()),
            _ => Formula::new(Term::Or(parts)),
        }
    }

    pub fn make_implies(&self, a: Formula, b: Formula) -> Formula {
        self.make_or(self.make_not(a), b)
    }

    pub fn make_ite(&self, c: Formula, t: Formula, e: Formula) -> Formula {
        match c.term() {
            Term::True => t,
            Term::False => e,
            _ if t == e => t,
            _ => Formula::new(Term::Ite(c, t, e)),
        }
    }

    pub fn make_equal(&self, a: Formula, b: Formula) -> Formula {
        if a == b {
            return self.make_true();
        }
        match (a.term(), b.term()) {
            (Term::BitVecConst { .. }, Term::BitVecConst { .. })
            | (Term::True | Term::False, Term::True | Term::False) => self.make_false(),
            _ => Formula::new(Term::Equal(a, b)),
        }
    }

    pub fn make_bv_unary(&self, op: BvUnaryOp, a: Formula) -> Formula {
        if let Some((v, w)) = a.as_bv_const() {
            let r = match op {
                BvUnaryOp::Neg => (v as i128).wrapping_neg(),
                BvUnaryOp::Not => !v as i128,
            };
            return self.make_bv(w, r);
        }
        Formula::new(Term::BvUnary(op, a))
    }

    pub fn make_negate(&self, a: Formula) -> Formula {
        self.make_bv_unary(BvUnaryOp::Neg, a)
    }

    pub fn make_bv_binary(&self, op: BvBinaryOp, a: Formula, b: Formula) -> Formula {
        use BvBinaryOp::*;
        if let (Some((x, w)), Some((y, _))) = (a.as_bv_const(), b.as_bv_const()) {
            let (sx, sy) = (to_signed(x, w), to_signed(y, w));
            let r = match op {
                Add => Some(x.wrapping_add(y) as i128),
                Sub => Some(x.wrapping_sub(y) as i128),
                Mul => Some(x.wrapping_mul(y) as i128),
                UDiv => x.checked_div(y).map(|r| r as i128),
                URem => x.checked_rem(y).map(|r| r as i128),
                SDiv => sx.checked_div(sy),
                SRem => sx.checked_rem(sy),
                And => Some((x & y) as i128),
                Or => Some((x | y) as i128),
                Xor => Some((x ^ y) as i128),
                Shl if y < w as u128 => Some((x << y) as i128),
                LShr if y < w as u128 => Some((x >> y) as i128),
                AShr if y < w as u128 => Some(sx >> y),
                Shl | LShr | AShr => None,
            };
            if let Some(r) = r {
                return self.make_bv(w, r);
            }
        }
        let is_zero = |f: &Formula| matches!(f.as_bv_const(), Some((0, _)));
        let is_one = |f: &Formula| matches!(f.as_bv_const(), Some((1, _)));
        match op {
            Add | Or | Xor if is_zero(&b) => a,
            Add | Or | Xor if is_zero(&a) => b,
            Sub | Shl | LShr | AShr if is_zero(&b) => a,
            Mul if is_one(&b) => a,
            Mul if is_one(&a) => b,
            Mul if is_zero(&a) => a,
            Mul if is_zero(&b) => b,
            _ => Formula::new(Term::BvBinary(op, a, b)),
        }
    }

    pub fn make_plus(&self, a: Formula, b: Formula) -> Formula {
        self.make_bv_binary(BvBinaryOp::Add, a, b)
    }

    pub fn make_minus(&self, a: Formula, b: Formula) -> Formula {
        self.make_bv_binary(BvBinaryOp::Sub, a, b)
    }

    pub fn make_multiply(&self, a: Formula, b: Formula) -> Formula {
        self.make_bv_binary(BvBinaryOp::Mul, a, b)
    }

    pub fn make_bv_compare(&self, op: BvCompareOp, a: Formula, b: Formula) -> Formula {
        if let (Some((x, w)), Some((y, _))) = (a.as_bv_const(), b.as_bv_const()) {
            let (sx, sy) = (to_signed(x, w), to_signed(y, w));
            return self.make_bool(match op {
                BvCompareOp::Slt => sx < sy,
                BvCompareOp::Sle => sx <= sy,
                BvCompareOp::Ult => x < y,
                BvCompareOp::Ule => x <= y,
            });
        }
        if op == BvCompareOp::Ule && matches!(a.as_bv_const(), Some((0, _))) {
            return self.make_true();
        }
        Formula::new(Term::BvCompare(op, a, b))
    }

    pub fn make_less_than(&self, a: Formula, b: Formula, signed: bool) -> Formula {
        let op = if signed {
            BvCompareOp::Slt
        } else {
            BvCompareOp::Ult
        };
        self.make_bv_compare(op, a, b)
    }

    pub fn make_less_or_equal(&self, a: Formula, b: Formula, signed: bool) -> Formula {
        let op = if signed {
            BvCompareOp::Sle
        } else {
            BvCompareOp::Ule
        };
        self.make_bv_compare(op, a, b)
    }

    /// Bits `high` down to `low` (inclusive)
    pub fn make_extract(&self, a: Formula, high: u32, low: u32) -> Formula {
        if low == 0 && high + 1 == bv_width(&a) {
            return a;
        }
        if let Some((v, _)) = a.as_bv_const() {
            return self.make_bv(high - low + 1, (v >> low) as i128);
        }
        Formula::new(Term::Extract {
            high,
            low,
            operand: a,
        })
    }

    /// Widen by `bits` bits
    pub fn make_extend(&self, a: Formula, bits: u32, signed: bool) -> Formula {
        if bits == 0 {
            return a;
        }
        if let Some((v, w)) = a.as_bv_const() {
            let v = if signed { to_signed(v, w) } else { v as i128 };
            return self.make_bv(w + bits, v);
        }
        Formula::new(Term::Extend {
            signed,
            bits,
            operand: a,
        })
    }

    /// `a` in the high bits, `b` in the low bits
    pub fn make_concat(&self, a: Formula, b: Formula) -> Formula {
        Formula::new(Term::Concat(a, b))
    }

    pub fn make_fp_neg(&self, a: Formula) -> Formula {
        Formula::new(Term::FpNeg(a))
    }

    pub fn make_fp_binary(&self, op: FpBinaryOp, a: Formula, b: Formula) -> Formula {
        Formula::new(Term::FpBinary(op, a, b))
    }

    pub fn make_fp_compare(&self, op: FpCompareOp, a: Formula, b: Formula) -> Formula {
        Formula::new(Term::FpCompare(op, a, b))
    }

    pub fn make_fp_from_bv(&self, a: Formula, signed: bool, sort: Sort) -> Formula {
        Formula::new(Term::FpFromBv {
            signed,
            sort,
            operand: a,
        })
    }

    pub fn make_fp_to_bv(&self, a: Formula, signed: bool, width: u32) -> Formula {
        Formula::new(Term::FpToBv {
            signed,
            width,
            operand: a,
        })
    }

    pub fn make_fp_cast(&self, a: Formula, sort: Sort) -> Formula {
        if a.sort() == sort {
            return a;
        }
        Formula::new(Term::FpToFp { sort, operand: a })
    }

    pub fn make_fp_from_ieee_bits(&self, a: Formula, sort: Sort) -> Formula {
        if let Term::FpToIeeeBits(inner) = a.term() {
            if inner.sort() == sort {
                return inner.clone();
            }
        }
        Formula::new(Term::FpFromIeeeBits { sort, operand: a })
    }

    pub fn make_fp_to_ieee_bits(&self, a: Formula) -> Formula {
        if let Term::FpFromIeeeBits { operand, .. } = a.term() {
            return operand.clone();
        }
        Formula::new(Term::FpToIeeeBits(a))
    }

    /// The array `name@index`
    pub fn make_array(&self, name: &str, index: u32, index_sort: Sort, element: Sort) -> Formula {
        self.make_variable(
            Sort::Array(Box::new(index_sort), Box::new(element)),
            name,
            index,
        )
    }

    pub fn make_select(&self, array: Formula, index: Formula) -> Formula {
        Formula::new(Term::Select(array, index))
    }

    pub fn make_store(&self, array: Formula, index: Formula, value: Formula) -> Formula {
        Formula::new(Term::Store(array, index, value))
    }

    /// Application of the uninterpreted function `name@index`
    pub fn make_uf_application(
        &self,
        name: &str,
        index: u32,
        sort: Sort,
        arguments: Vec<Formula>,
    ) -> Formula {
        Formula::new(Term::Apply {
            function: format!("{}@{}", name, index),
            sort,
            arguments,
        })
    }

    /// `forall vars. body`; variables not occurring in `body` are dropped
    pub fn make_forall(&self, vars: Vec<Formula>, body: Formula) -> Formula {
        let vars: Vec<Formula> = vars
            .into_iter()
            .filter(|v| match v.term() {
                Term::Variable { name, .. } => body.mentions_variable(name),
                _ => false,
            })
            .collect();
        if vars.is_empty() {
            body
        } else {
            Formula::new(Term::Forall(vars, body))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn conjunctions_flatten_and_fold() {
        let m = FormulaManager::new();
        let x = m.make_variable(Sort::Bool, "x", 1);
        let y = m.make_variable(Sort::Bool, "y", 1);
        let z = m.make_variable(Sort::Bool, "z", 1);
        let nested = m.make_and(m.make_and(x.clone(), m.make_true()), m.make_and(y.clone(), z.clone()));
        assert_eq!(nested, m.make_and_all([x.clone(), y.clone(), z]));
        assert_eq!(nested.conjuncts().len(), 3);
        assert!(m.make_and(x.clone(), m.make_false()).is_false());
        assert!(m.make_or(y, m.make_true()).is_true());
        assert_eq!(m.make_not(m.make_not(x.clone())), x);
    }

    #[test]
    fn bit_vector_constants_fold() {
        let m = FormulaManager::new();
        let a = m.make_variable(Sort::BitVec(64), "__ADDRESS_OF_a", 0);
        let zero = m.make_bv(64, 0);
        assert_eq!(m.make_plus(a.clone(), m.make_multiply(zero.clone(), m.make_bv(64, 4))), a);
        assert!(m
            .make_less_than(m.make_bv(64, 2), m.make_bv(64, 3), false)
            .is_true());
        assert!(m
            .make_less_than(m.make_bv(8, -1), m.make_bv(8, 0), true)
            .is_true());
        assert!(m
            .make_less_than(m.make_bv(8, -1), m.make_bv(8, 0), false)
            .is_false());
        assert_eq!(m.make_extend(m.make_bv(8, -1), 8, true), m.make_bv(16, -1));
        assert_eq!(m.make_extract(m.make_bv(16, 0x1234), 15, 8), m.make_bv(8, 0x12));
        assert!(m.make_less_or_equal(zero, a, false).is_true());
    }

    #[test]
    fn forall_drops_unused_variables() {
        let m = FormulaManager::new();
        let q = m.make_variable_without_ssa_index(Sort::BitVec(32), "__quantifier_0");
        let other = m.make_variable(Sort::BitVec(32), "x", 1);
        let body = m.make_equal(other.clone(), m.make_bv(32, 1));
        assert_eq!(m.make_forall(vec![q.clone()], body.clone()), body);
        let body = m.make_equal(other, q.clone());
        assert!(matches!(
            m.make_forall(vec![q], body).term(),
            Term::Forall(..)
        ));
    }

    #[test]
    fn display_is_smtlib_like() {
        let m = FormulaManager::new();
        let f = m.make_uf_application(
            "*int32_t",
            2,
            Sort::BitVec(32),
            vec![m.make_variable_without_ssa_index(Sort::BitVec(64), "__ADDRESS_OF_s")],
        );
        assert_eq!(f.to_string(), "(|*int32_t@2| |__ADDRESS_OF_s|)");
    }
}
