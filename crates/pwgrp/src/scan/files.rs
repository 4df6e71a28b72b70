//! The `files` source: plain records, directive lines ignored.

use std::io;
use std::path::PathBuf;

use nss_switch::NsStatus;

use super::{LineScanner, ScanEnv, ScanState, scan_plain, unavailable};
use crate::args::Lookup;
use crate::entry::Entry;

/// Scan state of the `files` source.
#[derive(Debug)]
pub struct FilesState {
	scanner: LineScanner,
	stayopen: bool,
}

impl FilesState {
	/// Creates a closed state for `path`.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			scanner: LineScanner::new(path),
			stayopen: false,
		}
	}

	/// Rewinds and records whether keyed lookups keep the file open.
	pub fn set(&mut self, stayopen: bool) -> io::Result<()> {
		self.stayopen = stayopen;
		self.scanner.start().map(|_| ())
	}

	/// Closes the file and forgets stay-open.
	pub fn close(&mut self) {
		self.stayopen = false;
		self.scanner.end();
	}
}

impl<E: Entry> ScanState<E> for FilesState {
	fn start(&mut self, _env: &ScanEnv<'_>) -> io::Result<()> {
		self.scanner.start().map(|_| ())
	}

	fn scan(&mut self, _env: &ScanEnv<'_>, lookup: &mut Lookup<E>) -> NsStatus {
		if !self.scanner.is_open() {
			if let Err(err) = self.scanner.start() {
				return unavailable(lookup, &err);
			}
		}
		scan_plain(&mut self.scanner, lookup)
	}

	fn end(&mut self) {
		self.scanner.end();
	}

	fn stayopen(&self) -> bool {
		self.stayopen
	}
}
