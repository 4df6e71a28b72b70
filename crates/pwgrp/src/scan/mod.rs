//! Backend scan state machines for the `files` and `compat` sources.
//!
//! Both read the same flat file line by line through a [`LineScanner`]. The
//! `compat` machine additionally expands `+`/`-` directives through nested
//! dispatch.

pub mod compat;
pub mod files;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use nss_switch::{NsContext, NsStatus};
use tracing::trace;

pub use compat::CompatState;
pub use files::FilesState;

use crate::args::Lookup;
use crate::entry::Entry;
use crate::netgroup::NetgroupSource;

/// How a method uses its scan state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
	/// Continue the shared enumeration (`get*ent`, `get*ent_r`).
	Enumerate,
	/// Rewind, search, and close unless stay-open was requested
	/// (`get*nam`, `get*id`).
	Rewind,
	/// Search a state created for this call only, then close it
	/// (`get*nam_r`, `get*id_r`).
	OneShot,
}

/// Collaborators a scan may need besides its own state.
#[derive(Clone, Copy)]
pub struct ScanEnv<'a> {
	/// Context of the dispatch invoking the scan.
	pub cx: &'a NsContext<'a>,
	/// Netgroup membership for `+@`/`-@` directives.
	pub netgroups: &'a dyn NetgroupSource,
	/// Set once a `_compat` database misconfiguration has been logged.
	pub warned: &'a AtomicBool,
}

/// File cursor with an exhausted sentinel.
///
/// Lines that are not UTF-8 are skipped. Once the end of the file has been
/// reached every further read returns `None` until the scanner is rewound.
#[derive(Debug)]
pub struct LineScanner {
	path: PathBuf,
	reader: Option<BufReader<File>>,
	exhausted: bool,
}

impl LineScanner {
	/// Creates a closed scanner for `path`.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			reader: None,
			exhausted: false,
		}
	}

	/// Backing file path.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Returns true while the file is open.
	pub fn is_open(&self) -> bool {
		self.reader.is_some()
	}

	/// Opens the file, or rewinds it if already open.
	///
	/// Returns `true` if the file was newly opened.
	pub fn start(&mut self) -> io::Result<bool> {
		self.exhausted = false;
		match self.reader.as_mut() {
			Some(reader) => {
				reader.rewind()?;
				Ok(false)
			}
			None => {
				self.reader = Some(BufReader::new(File::open(&self.path)?));
				trace!(path = %self.path.display(), "opened");
				Ok(true)
			}
		}
	}

	/// Reads the next line without its terminator.
	pub fn next_line(&mut self) -> io::Result<Option<String>> {
		if self.exhausted {
			return Ok(None);
		}
		let Some(reader) = self.reader.as_mut() else {
			return Ok(None);
		};
		let mut buf = Vec::new();
		loop {
			buf.clear();
			if reader.read_until(b'\n', &mut buf)? == 0 {
				self.exhausted = true;
				return Ok(None);
			}
			while buf.last().is_some_and(|b| matches!(b, b'\n' | b'\r')) {
				buf.pop();
			}
			match String::from_utf8(std::mem::take(&mut buf)) {
				Ok(line) => return Ok(Some(line)),
				Err(_) => trace!(path = %self.path.display(), "skipping non-UTF-8 line"),
			}
		}
	}

	/// Closes the file.
	pub fn end(&mut self) {
		self.reader = None;
		self.exhausted = false;
	}
}

/// A source's scan state for one database.
pub trait ScanState<E: Entry> {
	/// Opens or rewinds the backing file.
	fn start(&mut self, env: &ScanEnv<'_>) -> io::Result<()>;

	/// Searches for the next entry satisfying `lookup.key`.
	fn scan(&mut self, env: &ScanEnv<'_>, lookup: &mut Lookup<E>) -> NsStatus;

	/// Closes the backing file and resets the machine.
	fn end(&mut self);

	/// Whether keyed lookups leave the file open.
	fn stayopen(&self) -> bool;

	/// Runs one lookup method against this state.
	fn run(&mut self, env: &ScanEnv<'_>, lookup: &mut Lookup<E>, usage: Usage) -> NsStatus {
		match usage {
			Usage::Enumerate => self.scan(env, lookup),
			Usage::Rewind => {
				if let Err(err) = self.start(env) {
					return unavailable(lookup, &err);
				}
				let status = self.scan(env, lookup);
				if !self.stayopen() {
					self.end();
				}
				status
			}
			Usage::OneShot => {
				let status = self.scan(env, lookup);
				self.end();
				status
			}
		}
	}
}

/// Reads the next ordinary line that parses and satisfies `lookup.key`.
///
/// Directive lines (`+...`, `-...`) and malformed lines are skipped.
pub(crate) fn scan_plain<E: Entry>(scanner: &mut LineScanner, lookup: &mut Lookup<E>) -> NsStatus {
	loop {
		let line = match scanner.next_line() {
			Ok(Some(line)) => line,
			Ok(None) => return NsStatus::NOTFOUND,
			Err(err) => return unavailable(lookup, &err),
		};
		if line.starts_with(['+', '-']) {
			continue;
		}
		let Some(entry) = E::parse(&line) else {
			continue;
		};
		if lookup.key.matches(&entry) {
			lookup.result = Some(entry);
			return NsStatus::SUCCESS;
		}
	}
}

/// Records `err` in the lookup and reports `UNAVAIL`.
pub(crate) fn unavailable<E>(lookup: &mut Lookup<E>, err: &io::Error) -> NsStatus {
	lookup.errno = err.raw_os_error().unwrap_or(libc::EIO);
	NsStatus::UNAVAIL
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	#[test]
	fn scanner_reports_exhaustion_until_rewound() {
		let mut file = tempfile::NamedTempFile::new().expect("temp file should be creatable");
		file.write_all(b"one\r\n\xff\xfe\ntwo").expect("temp file should be writable");

		let mut scanner = LineScanner::new(file.path());
		assert!(scanner.start().expect("file should open"));
		assert_eq!(scanner.next_line().expect("read").as_deref(), Some("one"));
		assert_eq!(scanner.next_line().expect("read").as_deref(), Some("two"));
		assert_eq!(scanner.next_line().expect("read"), None);
		assert_eq!(scanner.next_line().expect("read"), None);

		assert!(!scanner.start().expect("rewind"));
		assert_eq!(scanner.next_line().expect("read").as_deref(), Some("one"));
		scanner.end();
		assert!(!scanner.is_open());
	}

	#[test]
	fn missing_file_fails_to_start() {
		let dir = tempfile::tempdir().expect("temp dir should be creatable");
		let mut scanner = LineScanner::new(dir.path().join("passwd"));
		assert!(scanner.start().is_err());
		assert_eq!(scanner.next_line().expect("closed scanner reads nothing"), None);
	}
}
