//! Parser configuration.

use crate::chars::Edition;
use crate::entity::UnknownEntityMode;
use crate::namespace::NamespaceMode;
use crate::validate::Policy;

/// Configuration shared by the tokenizer and the standard transforms.
///
/// Built with chained setters:
///
/// ```
/// use xmlpipe::{Edition, ParserConfig};
///
/// let config = ParserConfig::new()
///     .edition(Edition::Fourth)
///     .track_whitespace(false)
///     .max_expansion_depth(4);
/// # let _ = config;
/// ```
#[derive(Clone, Debug)]
pub struct ParserConfig {
    pub(crate) edition: Edition,
    pub(crate) track_whitespace: bool,
    pub(crate) namespaces: NamespaceMode,
    pub(crate) on_error: Policy,
    pub(crate) on_unknown_entity: UnknownEntityMode,
    pub(crate) max_expansion_depth: usize,
    pub(crate) max_total_expansion: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserConfig {
    /// The default configuration: Fifth Edition names, whitespace tracked,
    /// namespaces off, validator errors emitted into the stream, unknown
    /// entities reported, expansion capped at depth 10 / 1 MiB.
    pub fn new() -> Self {
        ParserConfig {
            edition: Edition::Fifth,
            track_whitespace: true,
            namespaces: NamespaceMode::Off,
            on_error: Policy::Emit,
            on_unknown_entity: UnknownEntityMode::Emit,
            max_expansion_depth: 10,
            max_total_expansion: 1024 * 1024,
        }
    }

    /// Selects the Name character ranges (Fifth Edition by default).
    pub fn edition(mut self, val: Edition) -> Self {
        self.edition = val;
        self
    }

    /// Changes whether whitespace-only text is emitted as `Space` events.
    ///
    /// When set to `false`, whitespace folds into `Characters` events.
    ///
    /// (`true` by default)
    pub fn track_whitespace(mut self, val: bool) -> Self {
        self.track_whitespace = val;
        self
    }

    /// Selects what the namespace stage of [`pipeline`](crate::pipeline)
    /// does: validate prefixes, rewrite names, both, or nothing.
    ///
    /// ([`NamespaceMode::Off`] by default)
    pub fn namespaces(mut self, val: NamespaceMode) -> Self {
        self.namespaces = val;
        self
    }

    /// Default `on_error` policy handed to validators.
    ///
    /// ([`Policy::Emit`] by default)
    pub fn on_error(mut self, val: Policy) -> Self {
        self.on_error = val;
        self
    }

    /// What the entity resolver does with an unresolved named reference.
    ///
    /// ([`UnknownEntityMode::Emit`] by default)
    pub fn on_unknown_entity(mut self, val: UnknownEntityMode) -> Self {
        self.on_unknown_entity = val;
        self
    }

    /// Maximum nesting of named-entity references before expansion stops
    /// with a fatal error.
    ///
    /// (10 by default)
    pub fn max_expansion_depth(mut self, val: usize) -> Self {
        self.max_expansion_depth = val;
        self
    }

    /// Cumulative budget, in bytes, for expanded entity text across the
    /// whole stream.
    ///
    /// (1 MiB by default)
    pub fn max_total_expansion(mut self, val: usize) -> Self {
        self.max_total_expansion = val;
        self
    }
}
