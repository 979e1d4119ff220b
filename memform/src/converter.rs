//! Encoding of control-flow edges into path formulas.
//!
//! A [`FormulaConverter`] holds everything that is fixed for an analysis: options, the type
//! handler of the target platform, the heap backend and the classification of variables. It is
//! immutable after construction and can be shared between threads. Every edge is encoded by a
//! short-lived [`EdgeEncoder`], which owns the path-local builders seeded from the prior path
//! formula and is consumed when the successor path formula is produced.

use crate::cfa::{
    return_variable, CfaEdge, Declaration, EdgeKind, FileLocation, Statement,
    VariableClassification, VariableDeclaration,
};
use crate::constraints::Constraints;
use crate::error::{EncodingError, Result};
use crate::expr::{BinaryOperator, Expression, FunctionCallExpression, Initializer};
use crate::formula::{Formula, FormulaManager};
use crate::heap::{ArrayHeap, SmtHeap, UfHeap};
use crate::log::*;
use crate::machine_model::MachineModel;
use crate::options::EncodingOptions;
use crate::path_formula::PathFormula;
use crate::pointer_target_set::{
    allocation_type, base_address, bounded_length, DeferredAllocation, PointerTargetSetBuilder,
};
use crate::quantifier::QuantifierPolicy;
use crate::region::MemoryRegionManager;
use crate::shutdown::ShutdownNotifier;
use crate::slice::{SliceAssignment, SliceExpression};
use crate::ssa::SsaMapBuilder;
use crate::types::{ArrayLength, CType, SimplifiedType, TypeHandler, TypeRegistry};
use std::sync::Arc;

/// Library functions whose effect cannot be expressed by this encoding
const UNSUPPORTED_FUNCTIONS: &[&str] = &[
    "pthread_create",
    "setjmp",
    "longjmp",
    "sigsetjmp",
    "siglongjmp",
    "fesetround",
];

const ALLOCATION_FUNCTIONS: &[&str] = &["malloc", "alloca", "__builtin_alloca"];

pub struct FormulaConverter {
    pub(crate) options: EncodingOptions,
    pub(crate) types: TypeHandler,
    pub(crate) fmgr: FormulaManager,
    pub(crate) heap: Box<dyn SmtHeap>,
    pub(crate) regions: MemoryRegionManager,
    pub(crate) variables: VariableClassification,
    pub(crate) shutdown: ShutdownNotifier,
    pub(crate) log_once: LogOnce,
}

impl FormulaConverter {
    pub fn new(
        options: EncodingOptions,
        machine: MachineModel,
        registry: TypeRegistry,
        variables: VariableClassification,
        shutdown: ShutdownNotifier,
    ) -> Self {
        let types = TypeHandler::new(machine, registry);
        let heap: Box<dyn SmtHeap> = if options.use_arrays_for_heap {
            Box::new(ArrayHeap::new(types.pointer_sort()))
        } else {
            Box::new(UfHeap::new())
        };
        info!("Created formula converter";
            "machine" => types.machine_model().name,
            "heap" => ?heap,
            "quantifiers" => options.use_quantifiers_on_arrays,
            "field_regions" => options.use_memory_regions);
        Self {
            regions: MemoryRegionManager::new(options.use_memory_regions),
            options,
            types,
            fmgr: FormulaManager::new(),
            heap,
            variables,
            shutdown,
            log_once: LogOnce::new(),
        }
    }

    pub fn options(&self) -> &EncodingOptions {
        &self.options
    }

    pub fn types(&self) -> &TypeHandler {
        &self.types
    }

    pub fn formula_manager(&self) -> &FormulaManager {
        &self.fmgr
    }

    /// Every soundness-affecting decision made so far, each once, in the order first made
    pub fn soundness_warnings(&self) -> Vec<String> {
        self.log_once.messages()
    }

    /// Whether a variable is kept in memory: its address is taken, or it contains an array
    pub fn is_aliased(&self, name: &str, ty: &SimplifiedType) -> Result<bool> {
        Ok(self.variables.is_addressed(name) || self.types.contains_array(ty)?)
    }

    /// A fresh encoder extending `prior` with an edge of `function` at `location`
    pub fn edge_encoder<'a>(
        &'a self,
        prior: &'a PathFormula,
        function: &str,
        location: FileLocation,
    ) -> EdgeEncoder<'a> {
        EdgeEncoder {
            conv: self,
            prior,
            ssa: prior.ssa().builder(),
            pts: prior.pointer_target_set().builder(),
            constraints: Constraints::new(),
            location,
            function: function.to_owned(),
        }
    }

    /// The path formula of `prior` followed by `edge`
    pub fn encode_edge(&self, prior: &PathFormula, edge: &CfaEdge) -> Result<PathFormula> {
        trace!("Encoding edge"; "edge" => %edge.location, "function" => edge.function.as_str());
        if let EdgeKind::Blank = edge.kind {
            return Ok(prior.clone());
        }
        let mut encoder = self.edge_encoder(prior, &edge.function, edge.location.clone());
        let formula = encoder
            .encode_edge_kind(&edge.kind)
            .map_err(|e| e.at(&edge.location))?;
        Ok(encoder.finish(formula))
    }
}

/// Path-local state while encoding one edge
pub struct EdgeEncoder<'a> {
    pub(crate) conv: &'a FormulaConverter,
    prior: &'a PathFormula,
    pub(crate) ssa: SsaMapBuilder,
    pub(crate) pts: PointerTargetSetBuilder,
    pub(crate) constraints: Constraints,
    location: FileLocation,
    function: String,
}

impl<'a> EdgeEncoder<'a> {
    pub fn location(&self) -> &FileLocation {
        &self.location
    }

    /// Conjoin `formula` and the collected constraints to the prior path formula
    pub fn finish(mut self, formula: Formula) -> PathFormula {
        let conv = self.conv;
        let fmgr = &conv.fmgr;
        let formula = fmgr.make_and(formula, self.constraints.take(fmgr));
        if formula.is_true() && self.ssa.is_unchanged() && self.pts.is_unchanged() {
            return self.prior.clone();
        }
        PathFormula::new(
            fmgr.make_and(self.prior.formula().clone(), formula),
            self.ssa.freeze(),
            self.pts.freeze(),
            self.prior.length() + 1,
        )
    }

    /// Whether variable `name` is kept in memory on this path
    pub(crate) fn lives_in_memory(&self, name: &str, ty: &SimplifiedType) -> Result<bool> {
        Ok(self.pts.snapshot().is_base(name) || self.conv.is_aliased(name, ty)?)
    }

    /// Bring a variable into existence. Returns whether its memory is new, in which case it may
    /// be initialized in the current versions of its regions.
    fn declare(&mut self, name: &str, ty: &SimplifiedType) -> Result<bool> {
        let conv = self.conv;
        if self.lives_in_memory(name, ty)? {
            self.pts.add_base(conv, name, ty, &mut self.constraints)
        } else {
            Ok(false)
        }
    }

    fn encode_edge_kind(&mut self, kind: &EdgeKind) -> Result<Formula> {
        let conv = self.conv;
        let fmgr = &conv.fmgr;
        match kind {
            EdgeKind::Blank => Ok(fmgr.make_true()),
            EdgeKind::Declaration(Declaration::Variable(d)) => self.encode_declaration(d),
            EdgeKind::Declaration(_) => Ok(fmgr.make_true()),
            EdgeKind::Statement(s) => self.encode_statement(s),
            EdgeKind::Assume {
                condition,
                truth_assumption,
            } => {
                let c = self.evaluate_condition(condition)?;
                Ok(if *truth_assumption { c } else { fmgr.make_not(c) })
            }
            EdgeKind::FunctionCall { call, parameters } => {
                if call.arguments.len() < parameters.len() {
                    return Err(EncodingError::unrecognized(format!(
                        "{} called with {} arguments, but takes {}",
                        call.function,
                        call.arguments.len(),
                        parameters.len()
                    )));
                }
                let mut result = vec![];
                for ((name, ty), argument) in parameters.iter().zip(call.arguments.iter()) {
                    let newly_allocated = self.declare(name, &conv.types.simplify(ty))?;
                    let parameter = Expression::id(name.clone(), ty.clone());
                    self.resolve_deferred_allocation(&parameter, argument)?;
                    result.push(self.assign(
                        &parameter,
                        Some(SliceExpression::of(argument.clone())),
                        newly_allocated,
                    )?);
                }
                Ok(fmgr.make_and_all(result))
            }
            EdgeKind::Return { value, return_type } => match value {
                None => Ok(fmgr.make_true()),
                Some(value) => {
                    let retval =
                        Expression::id(return_variable(&self.function), return_type.clone());
                    self.assign_expression(&retval, value)
                }
            },
            EdgeKind::FunctionReturn {
                callee,
                lhs,
                return_type,
            } => match lhs {
                None => Ok(fmgr.make_true()),
                Some(lhs) => {
                    let retval = Expression::id(return_variable(callee), return_type.clone());
                    self.assign_expression(lhs, &retval)
                }
            },
        }
    }

    fn encode_declaration(&mut self, d: &VariableDeclaration) -> Result<Formula> {
        let conv = self.conv;
        let fmgr = &conv.fmgr;
        // `int a[] = {...}` takes its length from the initializer
        let declared = match (&d.ty, &d.initializer) {
            (CType::Array(element, None), Some(Initializer::List(items))) => {
                CType::array_of((**element).clone(), items.len() as u64)
            }
            (t, _) => t.clone(),
        };
        let ty = conv.types.simplify(&declared);
        if let SimplifiedType::Function(_) = ty {
            return Ok(fmgr.make_true());
        }
        debug!("Declaring variable"; "name" => d.name.as_str(), "type" => %ty, "global" => d.is_global);
        let variable = Expression::id(d.name.clone(), declared.clone());
        match &d.initializer {
            Some(Initializer::List(items)) => {
                let assignments = self.expand_initializer(&variable, &ty, items)?;
                self.encode_initializer_list(&variable, &declared, assignments)
            }
            Some(Initializer::Expression(e)) => {
                let newly_allocated = self.declare(&d.name, &ty)?;
                self.resolve_deferred_allocation(&variable, e)?;
                self.assign(
                    &variable,
                    Some(SliceExpression::of(e.clone())),
                    newly_allocated,
                )
            }
            None if d.is_global => {
                let newly_allocated = self.declare(&d.name, &ty)?;
                self.zero_initialize(&variable, newly_allocated)
            }
            None => {
                if self.declare(&d.name, &ty)? || self.lives_in_memory(&d.name, &ty)? {
                    // Fresh memory holds whatever its region holds
                    Ok(fmgr.make_true())
                } else {
                    self.assign(&variable, None, false)
                }
            }
        }
    }

    /// Initialize a freshly declared aggregate from `(part, value)` pairs, as produced from an
    /// initializer list. If quantifiers are enabled and every element of an array gets the same
    /// value, a single quantified assignment is produced instead of one per element.
    pub fn encode_initializer_list(
        &mut self,
        variable: &Expression,
        declared_type: &CType,
        assignments: Vec<(Expression, Expression)>,
    ) -> Result<Formula> {
        let conv = self.conv;
        let ty = conv.types.simplify(declared_type);
        let newly_allocated = match variable.as_variable_name() {
            Some(name) => self.declare(name, &ty)?,
            None => false,
        };
        if conv.options.use_quantifiers_on_arrays && self.expression_lives_in_memory(variable)? {
            if let SimplifiedType::Array(element, ArrayLength::Literal(n)) = &ty {
                let uniform = assignments.len() as u64 == *n
                    && element.is_scalar_or_pointer()
                    && assignments.windows(2).all(|w| w[0].1 == w[1].1);
                if let (true, Some((_, value))) = (uniform, assignments.first()) {
                    debug!("Initializing array uniformly"; "variable" => ?variable.as_variable_name());
                    return self.handle_slice_assignments(
                        &[SliceAssignment::new(
                            SliceExpression::of(variable.clone()),
                            Some(SliceExpression::of(value.clone())),
                        )],
                        QuantifierPolicy::Encode,
                        newly_allocated,
                    );
                }
            }
        }
        let assignments: Vec<SliceAssignment> = assignments
            .into_iter()
            .map(|(lhs, rhs)| {
                SliceAssignment::new(
                    SliceExpression::of_lvalue(lhs),
                    Some(SliceExpression::of(rhs)),
                )
            })
            .collect();
        self.handle_slice_assignments(&assignments, QuantifierPolicy::FromOptions, newly_allocated)
    }

    /// Flatten a brace initializer for the object `lhs` of type `ty` into `(part, value)` pairs.
    /// Parts without an initializer are set to zero.
    fn expand_initializer(
        &self,
        lhs: &Expression,
        ty: &SimplifiedType,
        items: &[Initializer],
    ) -> Result<Vec<(Expression, Expression)>> {
        let conv = self.conv;
        let mut parts = vec![];
        match ty {
            SimplifiedType::Composite(kind, name) => {
                let layout = conv.types.layout(*kind, name)?;
                let members = if ty.is_union() {
                    &layout.members[..layout.members.len().min(1)]
                } else {
                    &layout.members[..]
                };
                for (i, m) in members.iter().enumerate() {
                    let part = Expression::field(lhs.clone(), m.name.clone(), m.c_type.clone());
                    self.expand_item(part, &m.ty, items.get(i), &mut parts)?;
                }
            }
            SimplifiedType::Array(element, length) => {
                let element_type = conv.types.lower(element);
                let n = match length {
                    ArrayLength::Literal(n) => *n,
                    _ => items.len() as u64,
                };
                let what = format!("initializer of {:?}", lhs.as_variable_name());
                let bound = items.len() as u64
                    + bounded_length(
                        conv,
                        &what,
                        &ArrayLength::Literal(n.saturating_sub(items.len() as u64)),
                    );
                for i in 0..n.min(bound) {
                    conv.shutdown.shutdown_if_necessary()?;
                    let part = Expression::subscript(
                        lhs.clone(),
                        Expression::int(i as i128, conv.types.lower(&conv.types.size_type())),
                        element_type.clone(),
                    );
                    self.expand_item(part, element, items.get(i as usize), &mut parts)?;
                }
            }
            _ => match items.first() {
                Some(item) => self.expand_item(lhs.clone(), ty, Some(item), &mut parts)?,
                None => parts.push((lhs.clone(), Expression::int_literal(0))),
            },
        }
        Ok(parts)
    }

    fn expand_item(
        &self,
        part: Expression,
        ty: &SimplifiedType,
        item: Option<&Initializer>,
        parts: &mut Vec<(Expression, Expression)>,
    ) -> Result<()> {
        match item {
            Some(Initializer::List(items)) => parts.extend(self.expand_initializer(&part, ty, items)?),
            Some(Initializer::Expression(e)) => parts.push((part, e.clone())),
            // A scalar zero assigned to an aggregate reaches every leaf
            None => parts.push((part, Expression::int_literal(0))),
        }
        Ok(())
    }

    fn zero_initialize(&mut self, object: &Expression, newly_allocated: bool) -> Result<Formula> {
        self.handle_slice_assignments(
            &[SliceAssignment::new(
                SliceExpression::of(object.clone()),
                Some(SliceExpression::of(Expression::int_literal(0))),
            )],
            QuantifierPolicy::FromOptions,
            newly_allocated,
        )
    }

    /// `lhs = rhs` for an expression `rhs`
    fn assign_expression(&mut self, lhs: &Expression, rhs: &Expression) -> Result<Formula> {
        self.resolve_deferred_allocation(lhs, rhs)?;
        self.assign(lhs, Some(SliceExpression::of(rhs.clone())), false)
    }

    fn encode_statement(&mut self, s: &Statement) -> Result<Formula> {
        match s {
            Statement::Assignment { lhs, rhs } => self.assign_expression(lhs, rhs),
            Statement::CallAssignment { lhs, call } => self.encode_call(Some(lhs), call),
            Statement::Call(call) => self.encode_call(None, call),
            // Expressions have no side effects
            Statement::Expression(_) => Ok(self.conv.fmgr.make_true()),
        }
    }

    /// A call of a function without a body
    fn encode_call(
        &mut self,
        lhs: Option<&Expression>,
        call: &FunctionCallExpression,
    ) -> Result<Formula> {
        let conv = self.conv;
        let name = call.function.as_str();
        if UNSUPPORTED_FUNCTIONS.contains(&name) {
            return Err(EncodingError::unsupported(format!("call to {}", name)));
        }
        let size_type = conv.types.lower(&conv.types.size_type());
        if ALLOCATION_FUNCTIONS.contains(&name) {
            let size = call.arguments.first().ok_or_else(|| {
                EncodingError::unrecognized(format!("{} without a size", name))
            })?;
            return self.encode_allocation(lhs, allocation_size(size), false);
        }
        match name {
            "calloc" => {
                let (count, size) = match call.arguments.as_slice() {
                    [count, size] => (count, size),
                    _ => {
                        return Err(EncodingError::unrecognized(
                            "calloc takes two arguments",
                        ))
                    }
                };
                let total = Expression::binary(
                    BinaryOperator::Multiply,
                    count.clone(),
                    size.clone(),
                    size_type,
                );
                self.encode_allocation(lhs, allocation_size(&total), true)
            }
            "free" => Ok(conv.fmgr.make_true()),
            _ => {
                if !name.starts_with("__VERIFIER_nondet_") {
                    debug!("Treating result of call as nondeterministic"; "function" => name);
                }
                match lhs {
                    Some(lhs) => self.assign(lhs, None, false),
                    None => Ok(conv.fmgr.make_true()),
                }
            }
        }
    }

    /// A fresh heap object of `size` bytes, its address assigned to `lhs`
    fn encode_allocation(
        &mut self,
        lhs: Option<&Expression>,
        size: ArrayLength,
        zeroed: bool,
    ) -> Result<Formula> {
        let conv = self.conv;
        let fmgr = &conv.fmgr;
        let lhs = match lhs {
            Some(lhs) => lhs,
            None => return Ok(fmgr.make_true()),
        };
        let lhs_type = conv.types.simplify(lhs.expression_type());
        let pointee = match &lhs_type {
            SimplifiedType::Pointer(p) => (**p).clone(),
            t => {
                return Err(EncodingError::unrecognized(format!(
                    "allocation assigned to non-pointer of type {}",
                    t
                )))
            }
        };
        let base = format!("__malloc_{}", self.pts.next_allocation_id());
        let mut result = vec![];
        match (&pointee, lhs.as_variable_name()) {
            (SimplifiedType::Void, Some(pointer)) if conv.options.defer_untyped_allocations => {
                debug!("Deferring allocation"; "base" => base.as_str(), "pointer" => pointer);
                self.pts.add_deferred_allocation(
                    pointer,
                    DeferredAllocation {
                        base: base.clone(),
                        size,
                        zeroed,
                    },
                );
            }
            _ => {
                let ty = allocation_type(conv, &pointee, &size)?;
                self.pts.add_base(conv, &base, &ty, &mut self.constraints)?;
                if zeroed {
                    let object = Expression::id(base.clone(), conv.types.lower(&ty));
                    result.push(self.zero_initialize(&object, true)?);
                }
            }
        }
        result.push(self.assign(
            lhs,
            Some(SliceExpression::value(base_address(conv, &base), lhs_type)),
            false,
        )?);
        Ok(fmgr.make_and_all(result))
    }

    /// When the pointer holding an untyped allocation is assigned to `lhs`, either pass the
    /// deferral on (to another `void *` variable) or type the allocation by `lhs`'s pointee
    pub(crate) fn resolve_deferred_allocation(
        &mut self,
        lhs: &Expression,
        rhs: &Expression,
    ) -> Result<()> {
        let pointer = match rhs.as_variable_name() {
            Some(p) => p,
            None => return Ok(()),
        };
        let allocation = match self.pts.snapshot().deferred_allocation(pointer) {
            Some(a) => a.clone(),
            None => return Ok(()),
        };
        let target = self.conv.types.simplify(lhs.expression_type());
        match (&target, lhs.as_variable_name()) {
            (SimplifiedType::Pointer(p), Some(name)) if **p == SimplifiedType::Void => {
                self.pts.add_deferred_allocation(name, allocation);
                Ok(())
            }
            _ => self.resolve_deferred_pointer(pointer, &target),
        }
    }

    /// Type the allocation deferred on `pointer` by the pointer type it is converted to
    pub(crate) fn resolve_deferred_pointer(
        &mut self,
        pointer: &str,
        target: &SimplifiedType,
    ) -> Result<()> {
        let conv = self.conv;
        let pointee = match target {
            SimplifiedType::Pointer(p) if **p != SimplifiedType::Void => p.clone(),
            _ => return Ok(()),
        };
        let allocation = match self.pts.take_deferred_allocation(pointer) {
            Some(a) => a,
            None => return Ok(()),
        };
        let ty = allocation_type(conv, &pointee, &allocation.size)?;
        debug!("Typing deferred allocation"; "base" => allocation.base.as_str(), "type" => %ty);
        if self
            .pts
            .add_base(conv, &allocation.base, &ty, &mut self.constraints)?
            && allocation.zeroed
        {
            let object = Expression::id(allocation.base.clone(), conv.types.lower(&ty));
            let zero = self.zero_initialize(&object, true)?;
            self.constraints.add_constraint(zero);
        }
        Ok(())
    }
}

fn allocation_size(size: &Expression) -> ArrayLength {
    match size.constant_value() {
        Some(n) if n >= 0 => ArrayLength::Literal(n as u64),
        _ => ArrayLength::Symbolic(Arc::new(size.clone())),
    }
}
