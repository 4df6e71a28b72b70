//! Errors reported by the reentrant lookup adapters.

use std::io;

use thiserror::Error;

/// A lookup failed for a reason other than the entry not existing.
#[derive(Debug, Error)]
#[error("{database} lookup failed: {error}")]
pub struct NssError {
	/// Database that was searched.
	pub database: &'static str,
	/// Underlying OS error.
	#[source]
	pub error: io::Error,
}

impl NssError {
	/// Wraps a nonzero errno reported by a source.
	pub fn from_errno(database: &'static str, errno: i32) -> Self {
		Self {
			database,
			error: io::Error::from_raw_os_error(errno),
		}
	}

	/// The errno as an `_r` function would return it.
	pub fn errno(&self) -> i32 {
		self.error.raw_os_error().unwrap_or(libc::EIO)
	}
}

/// Result alias for lookups.
pub type Result<T> = std::result::Result<T, NssError>;
