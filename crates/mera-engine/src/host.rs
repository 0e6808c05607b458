//! Host collaborator interface: specifier normalization, fetch, parse.
//!
//! The engine defines the error vocabulary; hosts instantiate it. How source
//! text is located and how it is turned into [`Declarations`] is entirely the
//! host's concern.

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::decl::Declarations;
use crate::record::Identity;

/// Fetched module source, opaque to the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceText {
    /// The raw text.
    pub text: String,
}

impl From<&str> for SourceText {
    fn from(text: &str) -> Self {
        Self { text: text.into() }
    }
}

impl From<String> for SourceText {
    fn from(text: String) -> Self {
        Self { text }
    }
}

/// Specifier normalization failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The specifier is malformed.
    #[error("invalid specifier: {0}")]
    InvalidSpecifier(String),
    /// The specifier form is not supported by this host.
    #[error("unsupported specifier: {0}")]
    Unsupported(String),
}

/// Source retrieval failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// No source exists for the identity.
    #[error("module not found: {0}")]
    NotFound(String),
    /// The source exists but could not be read.
    #[error("failed to read {path}: {message}")]
    Io {
        /// Location that failed to read.
        path: String,
        /// Underlying failure description.
        message: String,
    },
}

/// Parse failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The source is not a well-formed module.
    #[error("syntax error in {module}: {message}")]
    Syntax {
        /// The module being parsed.
        module: String,
        /// Parser diagnostic.
        message: String,
    },
}

/// The collaborators the engine consumes.
pub trait ModuleHost {
    /// Normalize a specifier against the referrer's identity. `base` is
    /// `None` for the root specifier.
    fn normalize(&self, base: Option<&Identity>, specifier: &str)
        -> Result<Identity, ResolveError>;

    /// Retrieve the source for an identity.
    fn fetch(&self, identity: &Identity) -> Result<SourceText, FetchError>;

    /// Parse fetched source into a declaration list.
    fn parse(&self, identity: &Identity, source: &SourceText)
        -> Result<Declarations, ParseError>;
}

/// An in-process host keyed by identity, with a specifier alias table.
///
/// Serves as the crate's test fixture and as the embedding shape for hosts
/// that pre-register parsed modules instead of fetching text.
#[derive(Debug, Default)]
pub struct MemoryHost {
    modules: FxHashMap<String, Declarations>,
    invalid: FxHashMap<String, String>,
    aliases: FxHashMap<String, String>,
}

impl MemoryHost {
    /// Create an empty host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module under its identity.
    pub fn insert(&mut self, identity: impl Into<String>, declarations: Declarations) {
        self.modules.insert(identity.into(), declarations);
    }

    /// Register a module whose parse always fails with the given diagnostic.
    pub fn insert_invalid(&mut self, identity: impl Into<String>, message: impl Into<String>) {
        self.invalid.insert(identity.into(), message.into());
    }

    /// Map a specifier spelling onto an existing identity.
    pub fn alias(&mut self, specifier: impl Into<String>, identity: impl Into<String>) {
        self.aliases.insert(specifier.into(), identity.into());
    }
}

impl ModuleHost for MemoryHost {
    fn normalize(
        &self,
        _base: Option<&Identity>,
        specifier: &str,
    ) -> Result<Identity, ResolveError> {
        if specifier.is_empty() {
            return Err(ResolveError::InvalidSpecifier(specifier.to_string()));
        }
        match self.aliases.get(specifier) {
            Some(identity) => Ok(Identity::new(identity.clone())),
            None => Ok(Identity::new(specifier)),
        }
    }

    fn fetch(&self, identity: &Identity) -> Result<SourceText, FetchError> {
        let key = identity.as_str();
        if self.modules.contains_key(key) || self.invalid.contains_key(key) {
            Ok(SourceText::default())
        } else {
            Err(FetchError::NotFound(key.to_string()))
        }
    }

    fn parse(
        &self,
        identity: &Identity,
        _source: &SourceText,
    ) -> Result<Declarations, ParseError> {
        let key = identity.as_str();
        if let Some(message) = self.invalid.get(key) {
            return Err(ParseError::Syntax {
                module: key.to_string(),
                message: message.clone(),
            });
        }
        self.modules
            .get(key)
            .cloned()
            .ok_or_else(|| ParseError::Syntax {
                module: key.to_string(),
                message: "module was not registered".to_string(),
            })
    }
}
