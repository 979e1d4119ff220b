//! Flags that shape the produced encoding.
//!
//! Unlike a process-wide store, every [`FormulaConverter`](crate::converter::FormulaConverter)
//! owns its own [`EncodingOptions`], so differently configured analyses can run side by side in
//! one process.

/// Options affecting how memory is encoded. The heap backend and the quantifier strategy are fixed
/// for the lifetime of a converter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodingOptions {
    /// Encode each memory region as an SMT array rather than as a family of uninterpreted
    /// functions. The UF encoding needs explicit retention constraints instead of relying on
    /// array extensionality.
    pub use_arrays_for_heap: bool,
    /// Eliminate array index variables with universally quantified solver variables rather than
    /// by unrolling.
    pub use_quantifiers_on_arrays: bool,
    /// The maximum number of elements an array assignment is unrolled to. Longer arrays are
    /// truncated, which is logged as a soundness warning. A negative value disables the bound.
    pub max_array_length: i64,
    /// The number of elements assumed for arrays whose length is not a literal (variable length
    /// arrays, flexible array members) when unrolling.
    pub default_array_length: u64,
    /// Give every field of every composite type its own memory region, instead of sharing one
    /// region between all cells of the same type.
    pub use_memory_regions: bool,
    /// When copying one composite into another in memory, skip fields whose address was never
    /// taken through a pointer.
    pub ignore_irrelevant_fields: bool,
    /// Postpone the typing of `void *` allocations until the pointer is first converted to a
    /// typed pointer.
    pub defer_untyped_allocations: bool,
}

impl Default for EncodingOptions {
    fn default() -> Self {
        EncodingOptions {
            use_arrays_for_heap: true,
            use_quantifiers_on_arrays: false,
            max_array_length: 20,
            default_array_length: 20,
            use_memory_regions: false,
            ignore_irrelevant_fields: false,
            defer_untyped_allocations: true,
        }
    }
}

impl EncodingOptions {
    pub fn with_max_array_length(mut self, max_array_length: i64) -> Self {
        self.max_array_length = max_array_length;
        self
    }

    pub fn with_default_array_length(mut self, default_array_length: u64) -> Self {
        self.default_array_length = default_array_length;
        self
    }

    /// The unrolling bound for an array of literal length `length`, and whether that bound
    /// truncates the array.
    pub fn unroll_bound(&self, length: u64) -> (u64, bool) {
        if self.max_array_length >= 0 && length > self.max_array_length as u64 {
            (self.max_array_length as u64, true)
        } else {
            (length, false)
        }
    }
}

#[derive(clap::ArgEnum, Clone, Debug, PartialEq, Eq)]
/// Encoding toggles, in the form embedding command lines accept them
pub enum CommandLineEncodingOption {
    EnableUninterpretedFunctionHeap,
    EnableQuantifiersOnArrays,
    EnableFieldMemoryRegions,
    EnableIgnoreIrrelevantFields,
    DisableDeferUntypedAllocations,
    DisableArrayLengthBound,
}

impl From<Vec<CommandLineEncodingOption>> for EncodingOptions {
    fn from(v: Vec<CommandLineEncodingOption>) -> Self {
        use CommandLineEncodingOption::*;
        let mut r = EncodingOptions::default();
        for v in v {
            match v {
                EnableUninterpretedFunctionHeap => {
                    r.use_arrays_for_heap = false;
                }
                EnableQuantifiersOnArrays => {
                    r.use_quantifiers_on_arrays = true;
                }
                EnableFieldMemoryRegions => {
                    r.use_memory_regions = true;
                }
                EnableIgnoreIrrelevantFields => {
                    r.ignore_irrelevant_fields = true;
                }
                DisableDeferUntypedAllocations => {
                    r.defer_untyped_allocations = false;
                }
                DisableArrayLengthBound => {
                    r.max_array_length = -1;
                }
            }
        }
        r
    }
}

/// Parse option names as given on a command line (e.g. `enable-quantifiers-on-arrays`), case
/// insensitively.
pub fn parse_command_line_options(names: &[&str]) -> Result<Vec<CommandLineEncodingOption>, String> {
    names
        .iter()
        .map(|n| <CommandLineEncodingOption as clap::ArgEnum>::from_str(n, true))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn command_line_names_toggle_fields() {
        let parsed = parse_command_line_options(&[
            "enable-uninterpreted-function-heap",
            "ENABLE-QUANTIFIERS-ON-ARRAYS",
        ])
        .unwrap();
        let options = EncodingOptions::from(parsed);
        assert!(!options.use_arrays_for_heap);
        assert!(options.use_quantifiers_on_arrays);
        assert_eq!(options.max_array_length, 20);

        assert!(parse_command_line_options(&["no-such-option"]).is_err());
    }

    #[test]
    fn unroll_bound_respects_negative_limit() {
        let options = EncodingOptions::default().with_max_array_length(100);
        assert_eq!(options.unroll_bound(10_000), (100, true));
        assert_eq!(options.unroll_bound(3), (3, false));
        let unbounded = options.with_max_array_length(-1);
        assert_eq!(unbounded.unroll_bound(10_000), (10_000, false));
    }
}
