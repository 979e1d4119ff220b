//! Target platform layout parameters

use crate::types::BuiltIn;

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum Endianness {
    Little,
    Big,
}

/// Sizes and alignments (in bytes) of the C scalar types on some target platform, together with
/// the signedness of plain `char` and the byte order.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct MachineModel {
    pub name: &'static str,
    pub size_of_pointer: u64,
    pub size_of_bool: u64,
    pub size_of_short: u64,
    pub size_of_int: u64,
    pub size_of_long: u64,
    pub size_of_long_long: u64,
    pub size_of_float: u64,
    pub size_of_double: u64,
    pub size_of_long_double: u64,
    pub alignment_of_long_long: u64,
    pub alignment_of_double: u64,
    pub alignment_of_long_double: u64,
    pub char_is_signed: bool,
    pub endianness: Endianness,
}

lazy_static::lazy_static! {
    /// 32-bit Linux (ILP32, i386 System V alignment rules)
    pub static ref LINUX32: MachineModel = MachineModel {
        name: "LINUX32",
        size_of_pointer: 4,
        size_of_bool: 1,
        size_of_short: 2,
        size_of_int: 4,
        size_of_long: 4,
        size_of_long_long: 8,
        size_of_float: 4,
        size_of_double: 8,
        size_of_long_double: 16,
        alignment_of_long_long: 4,
        alignment_of_double: 4,
        alignment_of_long_double: 4,
        char_is_signed: true,
        endianness: Endianness::Little,
    };

    /// 64-bit Linux (LP64, x86-64 System V)
    pub static ref LINUX64: MachineModel = MachineModel {
        name: "LINUX64",
        size_of_pointer: 8,
        size_of_bool: 1,
        size_of_short: 2,
        size_of_int: 4,
        size_of_long: 8,
        size_of_long_long: 8,
        size_of_float: 4,
        size_of_double: 8,
        size_of_long_double: 16,
        alignment_of_long_long: 8,
        alignment_of_double: 8,
        alignment_of_long_double: 16,
        char_is_signed: true,
        endianness: Endianness::Little,
    };
}

impl MachineModel {
    /// Size in bytes of a built-in type. `void` has size 1, following GCC's pointer arithmetic.
    pub fn size_of(&self, b: &BuiltIn) -> u64 {
        use BuiltIn::*;
        match b {
            Void | Char | SignedChar | UnsignedChar => 1,
            Bool => self.size_of_bool,
            Short | UnsignedShort => self.size_of_short,
            Int | UnsignedInt => self.size_of_int,
            Long | UnsignedLong => self.size_of_long,
            LongLong | UnsignedLongLong => self.size_of_long_long,
            Int128 | UnsignedInt128 => 16,
            Float => self.size_of_float,
            Double => self.size_of_double,
            LongDouble => self.size_of_long_double,
        }
    }

    /// Alignment in bytes of a built-in type
    pub fn alignment_of(&self, b: &BuiltIn) -> u64 {
        use BuiltIn::*;
        match b {
            LongLong | UnsignedLongLong => self.alignment_of_long_long,
            Double => self.alignment_of_double,
            LongDouble => self.alignment_of_long_double,
            _ => self.size_of(b),
        }
    }

    pub fn pointer_bits(&self) -> u32 {
        (self.size_of_pointer * 8) as u32
    }

    /// Is `b` a signed type on this platform?
    pub fn is_signed(&self, b: &BuiltIn) -> bool {
        use BuiltIn::*;
        match b {
            Char => self.char_is_signed,
            SignedChar | Short | Int | Long | LongLong | Int128 => true,
            Float | Double | LongDouble => true,
            Void | Bool | UnsignedChar | UnsignedShort | UnsignedInt | UnsignedLong
            | UnsignedLongLong | UnsignedInt128 => false,
        }
    }
}
