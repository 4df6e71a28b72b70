//! Netgroup membership for `+@`/`-@` directives.
//!
//! A netgroup file line is a group name followed by members. A member is
//! either a `(host,user,domain)` triple or the name of another netgroup:
//!
//! ```text
//! staff   (-,alice,) (-,bob,) admins
//! admins  (server1,root,example.com)
//! ```
//!
//! An empty field matches anything; `-` matches no given value.

use std::fmt;
use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

/// Answers netgroup membership questions.
pub trait NetgroupSource: Send + Sync {
	/// Users named by `netgroup` and its nested groups, in file order without
	/// duplicates. Wildcard and `-` users are left out.
	fn users(&self, netgroup: &str) -> Vec<String>;

	/// Returns true if some triple of `netgroup` matches every given field.
	///
	/// A `None` argument matches any value.
	fn innetgr(&self, netgroup: &str, host: Option<&str>, user: Option<&str>, domain: Option<&str>) -> bool;
}

/// A source knowing no netgroups.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNetgroups;

impl NetgroupSource for NoNetgroups {
	fn users(&self, _netgroup: &str) -> Vec<String> {
		Vec::new()
	}

	fn innetgr(&self, _: &str, _: Option<&str>, _: Option<&str>, _: Option<&str>) -> bool {
		false
	}
}

/// One `(host,user,domain)` triple. `None` is a wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Triple {
	/// Host field.
	pub host: Option<String>,
	/// User field.
	pub user: Option<String>,
	/// Domain field.
	pub domain: Option<String>,
}

impl Triple {
	fn parse(s: &str) -> Option<Self> {
		let inner = s.strip_prefix('(')?.strip_suffix(')')?;
		let mut fields = inner.split(',').map(str::trim);
		let (host, user, domain) = (fields.next()?, fields.next()?, fields.next()?);
		if fields.next().is_some() {
			return None;
		}
		let opt = |f: &str| (!f.is_empty()).then(|| f.to_string());
		Some(Self {
			host: opt(host),
			user: opt(user),
			domain: opt(domain),
		})
	}
}

impl fmt::Display for Triple {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let field = |v: &Option<String>| v.as_deref().unwrap_or_default().to_string();
		write!(f, "({},{},{})", field(&self.host), field(&self.user), field(&self.domain))
	}
}

fn field_matches(field: &Option<String>, want: Option<&str>) -> bool {
	match (field.as_deref(), want) {
		(_, None) | (None, _) => true,
		(Some("-"), _) => false,
		(Some(have), Some(want)) => have == want,
	}
}

/// Member of a netgroup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Member {
	/// A literal triple.
	Triple(Triple),
	/// Another netgroup.
	Group(String),
}

/// Parsed netgroup table.
#[derive(Debug, Clone, Default)]
pub struct NetgroupTable {
	groups: FxHashMap<String, Vec<Member>>,
}

impl NetgroupTable {
	/// Parses netgroup file text. `#` starts a comment and a trailing `\`
	/// joins the next line.
	pub fn parse(text: &str) -> Self {
		let mut groups = FxHashMap::default();
		for line in logical_lines(text) {
			let mut tokens = tokenize(&line).into_iter();
			let Some(name) = tokens.next() else {
				continue;
			};
			let members = tokens
				.filter_map(|tok| {
					if tok.starts_with('(') {
						let triple = Triple::parse(&tok);
						if triple.is_none() {
							debug!(netgroup = %name, member = %tok, "malformed netgroup triple");
						}
						triple.map(Member::Triple)
					} else {
						Some(Member::Group(tok))
					}
				})
				.collect();
			groups.insert(name, members);
		}
		Self { groups }
	}

	/// Members listed directly under `netgroup`.
	pub fn members(&self, netgroup: &str) -> Option<&[Member]> {
		self.groups.get(netgroup).map(Vec::as_slice)
	}

	/// Every triple reachable from `netgroup`, depth first. Cycles are cut.
	pub fn triples(&self, netgroup: &str) -> Vec<&Triple> {
		let mut out = Vec::new();
		let mut seen = FxHashSet::default();
		self.expand(netgroup, &mut seen, &mut out);
		out
	}

	fn expand<'a>(&'a self, netgroup: &str, seen: &mut FxHashSet<String>, out: &mut Vec<&'a Triple>) {
		if !seen.insert(netgroup.to_string()) {
			return;
		}
		let Some(members) = self.groups.get(netgroup) else {
			debug!(netgroup, "unknown netgroup");
			return;
		};
		for member in members {
			match member {
				Member::Triple(t) => out.push(t),
				Member::Group(name) => self.expand(name, seen, out),
			}
		}
	}

	/// See [`NetgroupSource::users`].
	pub fn users(&self, netgroup: &str) -> Vec<String> {
		let mut seen = FxHashSet::default();
		self.triples(netgroup)
			.into_iter()
			.filter_map(|t| t.user.as_deref())
			.filter(|u| *u != "-")
			.filter(|u| seen.insert(*u))
			.map(str::to_string)
			.collect()
	}

	/// See [`NetgroupSource::innetgr`].
	pub fn innetgr(&self, netgroup: &str, host: Option<&str>, user: Option<&str>, domain: Option<&str>) -> bool {
		self.triples(netgroup).into_iter().any(|t| {
			field_matches(&t.host, host) && field_matches(&t.user, user) && field_matches(&t.domain, domain)
		})
	}
}

/// Joins `\` continuations and strips comments and blank lines.
fn logical_lines(text: &str) -> Vec<String> {
	let mut out = Vec::new();
	let mut pending = String::new();
	for raw in text.lines() {
		let line = raw.split('#').next().unwrap_or_default();
		match line.trim_end().strip_suffix('\\') {
			Some(head) => {
				pending.push_str(head);
				pending.push(' ');
			}
			None => {
				pending.push_str(line);
				if !pending.trim().is_empty() {
					out.push(std::mem::take(&mut pending));
				}
				pending.clear();
			}
		}
	}
	if !pending.trim().is_empty() {
		out.push(pending);
	}
	out
}

/// Splits on whitespace, keeping parenthesized triples whole.
fn tokenize(line: &str) -> Vec<String> {
	let mut tokens = Vec::new();
	let mut current = String::new();
	let mut depth = 0usize;
	for c in line.chars() {
		match c {
			'(' => {
				depth += 1;
				current.push(c);
			}
			')' => {
				depth = depth.saturating_sub(1);
				current.push(c);
			}
			c if c.is_whitespace() && depth == 0 => {
				if !current.is_empty() {
					tokens.push(std::mem::take(&mut current));
				}
			}
			c if c.is_whitespace() => {}
			c => current.push(c),
		}
	}
	if !current.is_empty() {
		tokens.push(current);
	}
	tokens
}

/// Netgroups read from a file on every query.
#[derive(Debug, Clone)]
pub struct FileNetgroups {
	path: PathBuf,
}

impl FileNetgroups {
	/// Creates a source backed by `path`.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// Backing file path.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Reads and parses the file. A missing file is an empty table.
	pub fn load(&self) -> NetgroupTable {
		match std::fs::read_to_string(&self.path) {
			Ok(text) => NetgroupTable::parse(&text),
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
				debug!(path = %self.path.display(), "no netgroup file");
				NetgroupTable::default()
			}
			Err(err) => {
				warn!(path = %self.path.display(), %err, "netgroup file unreadable");
				NetgroupTable::default()
			}
		}
	}
}

impl NetgroupSource for FileNetgroups {
	fn users(&self, netgroup: &str) -> Vec<String> {
		self.load().users(netgroup)
	}

	fn innetgr(&self, netgroup: &str, host: Option<&str>, user: Option<&str>, domain: Option<&str>) -> bool {
		self.load().innetgr(netgroup, host, user, domain)
	}
}
