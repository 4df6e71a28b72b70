//! Error types for switch configuration and module loading.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when reading the switch configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error reading the configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// A non-fatal problem found while parsing one configuration line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {kind}")]
pub struct ConfigWarning {
	/// 1-based line number where the logical line starts.
	pub line: usize,
	/// What went wrong.
	pub kind: WarningKind,
}

/// Kinds of configuration warnings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WarningKind {
	/// The line has no `database:` prefix.
	#[error("expected `database:`, found {0:?}")]
	MissingColon(String),
	/// The database name is empty.
	#[error("empty database name")]
	EmptyDatabase,
	/// The database lists no sources.
	#[error("database '{0}' has no sources")]
	NoSources(String),
	/// A source appears twice in one database.
	#[error("duplicate source '{name}' in database '{database}'")]
	DuplicateSource {
		/// Database being parsed.
		database: String,
		/// Repeated source name.
		name: String,
	},
	/// A criterion names a status that does not exist.
	#[error("unknown status '{0}'")]
	UnknownStatus(String),
	/// A criterion names an action that does not exist.
	#[error("unknown action '{0}'")]
	UnknownAction(String),
	/// A criterion is not of the form `STATUS=ACTION`.
	#[error("malformed criterion {0:?}")]
	MalformedCriterion(String),
	/// A `[` has no matching `]`.
	#[error("unterminated criteria list")]
	UnterminatedCriteria,
	/// Criteria appear before any source.
	#[error("criteria without a preceding source")]
	DanglingCriteria,
}

/// Reasons a source module could not be registered.
///
/// These never reach dispatch callers; the source just contributes nothing.
#[derive(Debug, Error)]
pub enum ModuleError {
	/// No module file exists for the source.
	#[error("module file not found: {0}")]
	NotFound(PathBuf),
	/// The dynamic loader rejected the file.
	#[error("failed to load {path}: {reason}")]
	Load {
		/// Module file path.
		path: PathBuf,
		/// Loader error text.
		reason: String,
	},
	/// A required symbol is missing.
	#[error("{path} does not export `{symbol}`")]
	MissingSymbol {
		/// Module file path.
		path: PathBuf,
		/// Symbol name.
		symbol: &'static str,
	},
	/// The module reports a different interface version.
	#[error("module '{module}' ABI mismatch: expected {expected}, got {actual}")]
	AbiMismatch {
		/// Source name.
		module: String,
		/// Host interface version.
		expected: u32,
		/// Module interface version.
		actual: u32,
	},
	/// Registration returned no methods.
	#[error("module '{0}' registered no methods")]
	EmptyTable(String),
	/// A method table entry has a null or non-UTF-8 name.
	#[error("module '{0}' returned a malformed method table")]
	MalformedTable(String),
}
