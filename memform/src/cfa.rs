//! The control-flow edges handed to the encoder, and what is known about the program's variables

use crate::containers::unordered::UnorderedSet;
use crate::expr::{Expression, FunctionCallExpression, Initializer};
use crate::types::CType;

/// Position of an edge in the source program, for diagnostics
#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone)]
pub struct FileLocation {
    pub file: String,
    pub line: u32,
}

impl FileLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl std::fmt::Display for FileLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct VariableDeclaration {
    /// Fully qualified name, `function::name` for locals
    pub name: String,
    pub ty: CType,
    pub is_global: bool,
    pub initializer: Option<Initializer>,
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub enum Declaration {
    Variable(VariableDeclaration),
    /// A struct, union, enum or typedef declaration; has no effect on memory
    Type(CType),
    /// A function prototype or definition
    Function(String),
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub enum Statement {
    Assignment {
        lhs: Expression,
        rhs: Expression,
    },
    /// `lhs = f(...)` for a function without a body in the control-flow automaton
    CallAssignment {
        lhs: Expression,
        call: FunctionCallExpression,
    },
    /// `f(...)`, result discarded, again for a function without a body
    Call(FunctionCallExpression),
    Expression(Expression),
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub enum EdgeKind {
    Blank,
    Declaration(Declaration),
    Statement(Statement),
    Assume {
        condition: Expression,
        truth_assumption: bool,
    },
    /// Entering a function with a body; `parameters` are the qualified names and types of the
    /// callee's formal parameters
    FunctionCall {
        call: FunctionCallExpression,
        parameters: Vec<(String, CType)>,
    },
    /// `return value;` inside the edge's function
    Return {
        value: Option<Expression>,
        return_type: CType,
    },
    /// Back in the caller after `callee` returned, assigning its result to `lhs` if present
    FunctionReturn {
        callee: String,
        lhs: Option<Expression>,
        return_type: CType,
    },
}

/// One edge of the control-flow automaton
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct CfaEdge {
    pub kind: EdgeKind,
    /// The function the edge belongs to
    pub function: String,
    pub location: FileLocation,
}

impl CfaEdge {
    pub fn new(kind: EdgeKind, function: impl Into<String>, location: FileLocation) -> Self {
        Self {
            kind,
            function: function.into(),
            location,
        }
    }
}

/// The variable holding the result of `function`
pub fn return_variable(function: &str) -> String {
    format!("{}::__retval__", function)
}

/// Variables whose address is taken somewhere in the program. Only these (and variables whose
/// type contains an array) are kept in memory; all others are plain SSA variables.
#[derive(Default, Debug, Clone)]
pub struct VariableClassification {
    addressed: UnorderedSet<String>,
}

impl VariableClassification {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add_addressed_variable(&mut self, name: impl Into<String>) {
        self.addressed.insert(name.into());
    }

    pub fn is_addressed(&self, name: &str) -> bool {
        self.addressed.contains(name)
    }
}

impl FromIterator<String> for VariableClassification {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            addressed: iter.into_iter().collect(),
        }
    }
}
