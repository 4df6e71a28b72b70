//! The `compat` source: flat-file records plus `+`/`-` directives.
//!
//! | line | effect |
//! |---|---|
//! | `+` or `+:...` | every entry of the `_compat` database |
//! | `+name:...` | that one entry |
//! | `+@netgroup:...` | the entry of every user in the netgroup |
//! | `-name...` | `name` never comes out of an expansion |
//! | `-@netgroup...` | no user of the netgroup comes out of an expansion |
//!
//! The remaining fields of a `+` line override the fetched entry's fields
//! where they are not empty. Exclusions are collected from the whole file
//! when it is opened, so their position relative to `+` lines is irrelevant.
//!
//! A file without any `+` line (or `__YP!` marker) behaves exactly like the
//! `files` source.

use std::any::Any;
use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use nss_switch::{DEFAULT_NIS, DtabEntry, NsContext, NsRequest, NsStatus, SOURCE_COMPAT, SOURCE_FILES};
use tracing::{debug, error, trace};

use super::{LineScanner, ScanEnv, ScanState, scan_plain, unavailable};
use crate::args::{Key, Lookup};
use crate::entry::{Entry, Exclusions};

/// Marker line announcing directives, as installed by NIS-aware tools.
pub const YP_TOKEN: &str = "__YP!";

/// What the machine does on its next step.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
	/// Reading ordinary lines.
	Normal,
	/// Pulling every entry of the `_compat` database.
	Full,
	/// Fetching one named entry.
	User(String),
	/// Fetching the remaining users of a netgroup.
	Netgroup(VecDeque<String>),
}

/// Scan state of the `compat` source.
#[derive(Debug)]
pub struct CompatState<E: Entry> {
	scanner: LineScanner,
	stayopen: bool,
	tokens: bool,
	mode: Mode,
	proto: Option<E::Proto>,
	exclusions: Exclusions,
}

impl<E: Entry> CompatState<E> {
	/// Creates a closed state for `path`.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			scanner: LineScanner::new(path),
			stayopen: false,
			tokens: false,
			mode: Mode::Normal,
			proto: None,
			exclusions: Exclusions::default(),
		}
	}

	/// Names excluded by the open file.
	pub fn exclusions(&self) -> &Exclusions {
		&self.exclusions
	}

	/// Whether the open file contains directives.
	pub fn has_tokens(&self) -> bool {
		self.tokens
	}

	/// Forwards `method` to every `_compat` source, then rewinds.
	pub fn set(&mut self, env: &ScanEnv<'_>, method: &str, args: &mut dyn Any, stayopen: bool) -> io::Result<()> {
		forward::<E>(env, method, args);
		self.stayopen = stayopen;
		self.open(env)
	}

	/// Forwards `method` to every `_compat` source, then closes.
	pub fn close(&mut self, env: &ScanEnv<'_>, method: &str) {
		forward::<E>(env, method, &mut ());
		self.stayopen = false;
		ScanState::<E>::end(self);
	}

	/// Opens or rewinds the file and collects tokens and exclusions.
	fn open(&mut self, env: &ScanEnv<'_>) -> io::Result<()> {
		self.scanner.start()?;
		self.mode = Mode::Normal;
		self.proto = None;
		self.tokens = false;
		self.exclusions.clear();

		while let Some(line) = self.scanner.next_line()? {
			if line.starts_with('+') || line.starts_with(YP_TOKEN) {
				self.tokens = true;
			} else if let Some(rest) = line.strip_prefix('-') {
				let name = field(rest);
				match name.strip_prefix('@') {
					Some(netgroup) => self.exclusions.extend(env.netgroups.users(netgroup)),
					None if !name.is_empty() => self.exclusions.insert(name),
					None => {}
				}
			}
		}
		self.scanner.start()?;
		trace!(
			path = %self.scanner.path().display(),
			tokens = self.tokens,
			excluded = self.exclusions.len(),
			"compat file opened"
		);
		Ok(())
	}

	/// Switches mode for a `+` line.
	fn enter(&mut self, env: &ScanEnv<'_>, line: &str, key: &Key) {
		let rest = &line[1..];
		self.proto = Some(E::parse_proto(line));
		self.mode = if let Some(netgroup) = rest.strip_prefix('@') {
			Mode::Netgroup(env.netgroups.users(field(netgroup)).into())
		} else if rest.is_empty() || rest.starts_with(':') {
			Mode::Full
		} else if rest.contains(':') {
			Mode::User(field(rest).to_string())
		} else {
			debug!(path = %self.scanner.path().display(), line, "directive without ':', expanding everything");
			Mode::Full
		};

		if self.mode == Mode::Full && !key.is_search() {
			forward::<E>(env, E::METHODS.setent, &mut ());
		}
	}

	/// Applies the prototype and exclusions to a fetched entry.
	fn admit(&self, mut entry: E, key: &Key) -> Option<E> {
		if let Some(proto) = &self.proto {
			entry.apply_proto(proto);
		}
		if self.exclusions.contains(entry.name()) {
			trace!(name = entry.name(), "excluded");
			return None;
		}
		entry.exclude_members(&self.exclusions);
		key.matches(&entry).then_some(entry)
	}
}

impl<E: Entry> ScanState<E> for CompatState<E> {
	fn start(&mut self, env: &ScanEnv<'_>) -> io::Result<()> {
		self.open(env)
	}

	fn scan(&mut self, env: &ScanEnv<'_>, lookup: &mut Lookup<E>) -> NsStatus {
		if !self.scanner.is_open() {
			if let Err(err) = self.open(env) {
				return unavailable(lookup, &err);
			}
		}
		if !self.tokens {
			return scan_plain(&mut self.scanner, lookup);
		}

		loop {
			let fetched = match std::mem::replace(&mut self.mode, Mode::Normal) {
				Mode::Normal => {
					let line = match self.scanner.next_line() {
						Ok(Some(line)) => line,
						Ok(None) => return NsStatus::NOTFOUND,
						Err(err) => return unavailable(lookup, &err),
					};
					if line.starts_with('+') {
						self.enter(env, &line, &lookup.key);
						continue;
					}
					if line.starts_with('-') || line.starts_with(YP_TOKEN) {
						continue;
					}
					self.proto = None;
					let Some(entry) = E::parse(&line) else {
						continue;
					};
					if lookup.key.matches(&entry) {
						lookup.result = Some(entry);
						return NsStatus::SUCCESS;
					}
					continue;
				}
				Mode::Full => {
					let found = fetch::<E>(env, lookup.key.clone());
					// A keyed search asks the _compat database once.
					if found.is_some() && !lookup.key.is_search() {
						self.mode = Mode::Full;
					}
					found
				}
				Mode::User(name) => fetch::<E>(env, Key::Name(name)),
				Mode::Netgroup(mut users) => match users.pop_front() {
					Some(user) => {
						self.mode = Mode::Netgroup(users);
						fetch::<E>(env, Key::Name(user))
					}
					None => None,
				},
			};

			if let Some(entry) = fetched.and_then(|entry| self.admit(entry, &lookup.key)) {
				lookup.result = Some(entry);
				return NsStatus::SUCCESS;
			}
		}
	}

	fn end(&mut self) {
		self.scanner.end();
		self.tokens = false;
		self.mode = Mode::Normal;
		self.proto = None;
		self.exclusions.clear();
	}

	fn stayopen(&self) -> bool {
		self.stayopen
	}
}

/// First `:`-separated field.
fn field(s: &str) -> &str {
	s.split(':').next().unwrap_or_default()
}

/// Looks `key` up in the `_compat` database.
///
/// Any status but `SUCCESS` contributes nothing.
fn fetch<E: Entry>(env: &ScanEnv<'_>, key: Key) -> Option<E> {
	let methods = E::METHODS;
	let method = match key {
		Key::Next => methods.getent_r,
		Key::Name(_) => methods.getnam_r,
		Key::Id(_) => methods.getid_r,
	};
	let mut nested = Lookup::<E>::new(key);
	let status = with_compat_dtab(env, |dtab| {
		let req = NsRequest::new(E::COMPAT_DATABASE, method).dtab(dtab).defaults(DEFAULT_NIS);
		env.cx.dispatch(&req, &mut nested)
	});
	if status != NsStatus::SUCCESS {
		trace!(database = E::COMPAT_DATABASE, method, ?status, "compat lookup contributed nothing");
		return None;
	}
	nested.result
}

/// Invokes `method` on every `_compat` source.
fn forward<E: Entry>(env: &ScanEnv<'_>, method: &str, args: &mut dyn Any) {
	with_compat_dtab(env, |dtab| {
		let req = NsRequest::new(E::COMPAT_DATABASE, method)
			.dtab(dtab)
			.defaults(DEFAULT_NIS)
			.force_all();
		env.cx.dispatch(&req, args)
	});
}

/// Runs `f` with an override table that refuses `files` and `compat` in a
/// `_compat` database.
fn with_compat_dtab(env: &ScanEnv<'_>, f: impl FnOnce(&[DtabEntry<'_>]) -> NsStatus) -> NsStatus {
	let refuse = |cx: &NsContext<'_>, _: &mut dyn Any| -> NsStatus { refuse_source(cx, env.warned) };
	let dtab = [DtabEntry::new(SOURCE_FILES, &refuse), DtabEntry::new(SOURCE_COMPAT, &refuse)];
	f(&dtab)
}

fn refuse_source(cx: &NsContext<'_>, warned: &AtomicBool) -> NsStatus {
	if !warned.swap(true, Ordering::Relaxed) {
		error!(database = cx.database(), source = cx.source(), "compat database cannot use this source");
	}
	NsStatus::UNAVAIL
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn first_field() {
		assert_eq!(field("alice:x:1"), "alice");
		assert_eq!(field("@staff"), "@staff");
		assert_eq!(field(""), "");
	}
}
