//! Symbolic encoding of C program memory into first-order formulas.
//!
//! Given one control-flow edge and the path formula of its predecessor, the
//! [`FormulaConverter`](converter::FormulaConverter) produces the successor path formula: the
//! edge's effect on program variables and memory, expressed over SSA-indexed logic variables and
//! a heap modelled either with array theory or with uninterpreted functions.

pub mod assignment;
pub mod cfa;
pub mod constraints;
pub mod containers;
pub mod converter;
pub mod error;
pub mod evaluate;
pub mod expr;
pub mod formula;
pub mod heap;
pub mod machine_model;
pub mod options;
pub mod path_formula;
pub mod pointer_target_set;
pub mod quantifier;
pub mod region;
pub mod retention;
pub mod shutdown;
pub mod slice;
pub mod ssa;
pub mod tests;
pub mod types;

pub mod log {
    pub use slog_scope::{crit, debug, error, info, trace, warn};

    use crate::containers::InsertionOrderedSet;

    pub struct OptionalKV<V: slog::Value>(pub &'static str, pub Option<V>);
    impl<V: slog::Value> slog::KV for OptionalKV<V> {
        fn serialize(
            &self,
            record: &slog::Record,
            serializer: &mut dyn slog::Serializer,
        ) -> slog::Result {
            if let Some(v) = &self.1 {
                v.serialize(record, self.0, serializer)
            } else {
                Ok(())
            }
        }
    }

    /// A registry of messages that must be logged at most once each. Used for decisions that
    /// weaken soundness (unrolling bounds, defaulted lengths), where a large encoding would
    /// otherwise repeat the same warning once per element.
    #[derive(Default)]
    pub struct LogOnce {
        seen: std::sync::Mutex<InsertionOrderedSet<String>>,
    }

    impl LogOnce {
        pub fn new() -> Self {
            Default::default()
        }

        /// Emit `message` as a warning, unless it has already been emitted through `self`.
        /// Returns whether the message was new.
        pub fn warn_once(&self, message: String) -> bool {
            let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
            if seen.get_index(&message).is_some() {
                return false;
            }
            warn!("{}", message; "soundness" => true);
            seen.insert(message);
            true
        }

        /// All distinct messages emitted so far, in emission order
        pub fn messages(&self) -> Vec<String> {
            let seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
            seen.iter().cloned().collect()
        }

        pub fn len(&self) -> usize {
            self.messages().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    pub struct FileAndTermDrain {
        file_drain: Option<slog::Logger>,
        term_drain: slog::Logger,
    }
    impl FileAndTermDrain {
        /// Build a root logger writing compact records to stderr and, if `path` is given, JSON
        /// records to that file. Embedding applications install it with
        /// `slog_scope::set_global_logger`.
        pub fn new(
            debug_level: usize,
            disable_terminal_logging: bool,
            force_block: bool,
            path: Option<std::path::PathBuf>,
        ) -> Result<slog::Logger, sloggers::Error> {
            use sloggers::Build;

            let debug_level = match debug_level {
                0 => sloggers::types::Severity::Warning,
                1 => sloggers::types::Severity::Info,
                2 => sloggers::types::Severity::Debug,
                _ => sloggers::types::Severity::Trace,
            };

            let term_drain = if disable_terminal_logging {
                sloggers::null::NullLoggerBuilder.build()?
            } else {
                sloggers::terminal::TerminalLoggerBuilder::new()
                    .destination(sloggers::terminal::Destination::Stderr)
                    .level(if path.is_none() {
                        debug_level
                    } else {
                        sloggers::types::Severity::Error
                    })
                    .overflow_strategy(if force_block || path.is_none() {
                        sloggers::types::OverflowStrategy::Block
                    } else {
                        sloggers::types::OverflowStrategy::DropAndReport
                    })
                    .format(sloggers::types::Format::Compact)
                    .build()?
            };

            let file_drain = match path {
                Some(path) => Some(
                    sloggers::file::FileLoggerBuilder::new(path)
                        .truncate()
                        .level(debug_level)
                        .overflow_strategy(sloggers::types::OverflowStrategy::Block)
                        .format(sloggers::types::Format::Json)
                        .build()?,
                ),
                None => None,
            };

            Ok(slog::Logger::root(
                Self {
                    file_drain,
                    term_drain,
                },
                slog::o!(),
            ))
        }
    }
    impl slog::Drain for FileAndTermDrain {
        type Ok = ();
        type Err = slog::Never;
        fn log(
            &self,
            r: &slog::Record<'_>,
            kv: &slog::OwnedKVList,
        ) -> Result<<Self as slog::Drain>::Ok, <Self as slog::Drain>::Err> {
            if let Some(f) = &self.file_drain {
                <slog::Logger as slog::Drain>::log(f, r, kv)?;
            }
            <slog::Logger as slog::Drain>::log(&self.term_drain, r, kv)?;
            Ok(())
        }
    }
}
