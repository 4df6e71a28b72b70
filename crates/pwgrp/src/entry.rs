//! What the scan state machines need to know about a record type.

use std::fmt;

use nss_switch::{DB_GROUP, DB_GROUP_COMPAT, DB_PASSWD, DB_PASSWD_COMPAT};
use rustc_hash::FxHashSet;

use crate::group::{Group, GroupProto};
use crate::passwd::{Passwd, PasswdProto};

/// Method names a database dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Methods {
	/// Next entry, shared cursor.
	pub getent: &'static str,
	/// Next entry, shared cursor, reentrant form.
	pub getent_r: &'static str,
	/// By name.
	pub getnam: &'static str,
	/// By name, reentrant form.
	pub getnam_r: &'static str,
	/// By numeric id.
	pub getid: &'static str,
	/// By numeric id, reentrant form.
	pub getid_r: &'static str,
	/// Rewind.
	pub setent: &'static str,
	/// Rewind and choose whether keyed lookups keep the file open.
	pub set_stayopen: &'static str,
	/// Close.
	pub endent: &'static str,
}

/// passwd method names.
pub const PASSWD_METHODS: Methods = Methods {
	getent: "getpwent",
	getent_r: "getpwent_r",
	getnam: "getpwnam",
	getnam_r: "getpwnam_r",
	getid: "getpwuid",
	getid_r: "getpwuid_r",
	setent: "setpwent",
	set_stayopen: "setpassent",
	endent: "endpwent",
};

/// group method names.
pub const GROUP_METHODS: Methods = Methods {
	getent: "getgrent",
	getent_r: "getgrent_r",
	getnam: "getgrnam",
	getnam_r: "getgrnam_r",
	getid: "getgrgid",
	getid_r: "getgrgid_r",
	setent: "setgrent",
	set_stayopen: "setgroupent",
	endent: "endgrent",
};

/// A record served by a flat-file database.
pub trait Entry: Clone + fmt::Debug + fmt::Display + Send + Sync + 'static {
	/// Database name in the switch configuration.
	const DATABASE: &'static str;
	/// Database consulted for `+`/`-` expansions.
	const COMPAT_DATABASE: &'static str;
	/// Method names.
	const METHODS: Methods;

	/// Field overrides read from a directive line.
	type Proto: Clone + fmt::Debug + Send;

	/// Parses an ordinary line, `None` if malformed.
	fn parse(line: &str) -> Option<Self>;

	/// Parses the overrides of a `+` directive line.
	fn parse_proto(line: &str) -> Self::Proto;

	/// Lookup name.
	fn name(&self) -> &str;

	/// Lookup id.
	fn id(&self) -> u32;

	/// Applies directive overrides.
	fn apply_proto(&mut self, proto: &Self::Proto);

	/// Removes excluded names from any name list the record carries.
	fn exclude_members(&mut self, _excluded: &Exclusions) {}
}

impl Entry for Passwd {
	const DATABASE: &'static str = DB_PASSWD;
	const COMPAT_DATABASE: &'static str = DB_PASSWD_COMPAT;
	const METHODS: Methods = PASSWD_METHODS;

	type Proto = PasswdProto;

	fn parse(line: &str) -> Option<Self> {
		Passwd::parse(line)
	}

	fn parse_proto(line: &str) -> PasswdProto {
		PasswdProto::parse(line)
	}

	fn name(&self) -> &str {
		&self.name
	}

	fn id(&self) -> u32 {
		self.uid
	}

	fn apply_proto(&mut self, proto: &PasswdProto) {
		proto.apply(self);
	}
}

impl Entry for Group {
	const DATABASE: &'static str = DB_GROUP;
	const COMPAT_DATABASE: &'static str = DB_GROUP_COMPAT;
	const METHODS: Methods = GROUP_METHODS;

	type Proto = GroupProto;

	fn parse(line: &str) -> Option<Self> {
		Group::parse(line)
	}

	fn parse_proto(line: &str) -> GroupProto {
		GroupProto::parse(line)
	}

	fn name(&self) -> &str {
		&self.name
	}

	fn id(&self) -> u32 {
		self.gid
	}

	fn apply_proto(&mut self, proto: &GroupProto) {
		proto.apply(self);
	}

	fn exclude_members(&mut self, excluded: &Exclusions) {
		self.members.retain(|m| !excluded.contains(m));
	}
}

/// Names removed from every compat expansion of one file.
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
	names: FxHashSet<String>,
}

impl Exclusions {
	/// Adds a name.
	pub fn insert(&mut self, name: impl Into<String>) {
		self.names.insert(name.into());
	}

	/// Returns true if `name` is excluded.
	pub fn contains(&self, name: &str) -> bool {
		self.names.contains(name)
	}

	/// Number of excluded names.
	pub fn len(&self) -> usize {
		self.names.len()
	}

	/// Returns true if nothing is excluded.
	pub fn is_empty(&self) -> bool {
		self.names.is_empty()
	}

	/// Forgets every name.
	pub fn clear(&mut self) {
		self.names.clear();
	}
}

impl<S: Into<String>> Extend<S> for Exclusions {
	fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
		self.names.extend(iter.into_iter().map(Into::into));
	}
}
