//! Source registry: database name to ordered source list.
//!
//! # Invariants
//!
//! - [`SourceTable`] stays sorted by case-folded database name after every
//!   [`SourceTable::put`], so lookups are a binary search.
//! - Source order inside an [`NsDbt`] is priority order and is never changed.

use std::borrow::Cow;
use std::cmp::Ordering;

use smallvec::SmallVec;

use crate::status::NsStatus;

/// Source name of the flat-file backend.
pub const SOURCE_FILES: &str = "files";
/// Source name of the DNS/Hesiod backend.
pub const SOURCE_DNS: &str = "dns";
/// Source name of the NIS backend.
pub const SOURCE_NIS: &str = "nis";
/// Source name of the `+`/`-` directive backend.
pub const SOURCE_COMPAT: &str = "compat";

/// The passwd database.
pub const DB_PASSWD: &str = "passwd";
/// Database consulted for passwd `+`/`-` expansions.
pub const DB_PASSWD_COMPAT: &str = "passwd_compat";
/// The group database.
pub const DB_GROUP: &str = "group";
/// Database consulted for group `+`/`-` expansions.
pub const DB_GROUP_COMPAT: &str = "group_compat";
/// The netgroup database.
pub const DB_NETGROUP: &str = "netgroup";

/// `files`, stop on success.
pub const DEFAULT_FILES: &[NsSrc] = &[NsSrc::new(SOURCE_FILES, NsStatus::SUCCESS)];
/// `compat`, stop on success.
pub const DEFAULT_COMPAT: &[NsSrc] = &[NsSrc::new(SOURCE_COMPAT, NsStatus::SUCCESS)];
/// `nis`, stop on success.
pub const DEFAULT_NIS: &[NsSrc] = &[NsSrc::new(SOURCE_NIS, NsStatus::SUCCESS)];

/// One source in a database's priority list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsSrc {
	name: Cow<'static, str>,
	flags: NsStatus,
}

impl NsSrc {
	/// Creates a source with a static name, usable in `const` default lists.
	pub const fn new(name: &'static str, flags: NsStatus) -> Self {
		Self {
			name: Cow::Borrowed(name),
			flags,
		}
	}

	/// Creates a source with the default stop set (`SUCCESS`).
	pub fn named(name: impl Into<String>) -> Self {
		Self {
			name: Cow::Owned(name.into()),
			flags: NsStatus::SUCCESS,
		}
	}

	/// Source name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Statuses that stop the walk at this source.
	pub fn flags(&self) -> NsStatus {
		self.flags
	}

	/// Adds or removes a status from the stop set.
	pub fn set_stop(&mut self, status: NsStatus, stop: bool) {
		self.flags.set(status, stop);
	}
}

/// A database and its configured sources in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsDbt {
	name: String,
	srclist: SmallVec<[NsSrc; 4]>,
}

impl NsDbt {
	/// Creates an entry with no sources.
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			srclist: SmallVec::new(),
		}
	}

	/// Database name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Sources in priority order.
	pub fn sources(&self) -> &[NsSrc] {
		&self.srclist
	}

	/// Appends a source at lowest priority.
	///
	/// Returns `false` (and leaves the list untouched) if a source with the
	/// same case-folded name is already present.
	pub fn add_source(&mut self, src: NsSrc) -> bool {
		if self.srclist.iter().any(|s| s.name.eq_ignore_ascii_case(&src.name)) {
			return false;
		}
		self.srclist.push(src);
		true
	}
}

/// Sorted table of configured databases.
#[derive(Debug, Clone, Default)]
pub struct SourceTable {
	dbt: Vec<NsDbt>,
}

impl SourceTable {
	/// Creates an empty table.
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a database entry, replacing any entry with the same name.
	pub fn put(&mut self, dbt: NsDbt) {
		match self.search(&dbt.name) {
			Ok(idx) => self.dbt[idx] = dbt,
			Err(_) => {
				self.dbt.push(dbt);
				self.dbt.sort_by(|a, b| cmp_ignore_case(&a.name, &b.name));
			}
		}
	}

	/// Looks up a configured database.
	pub fn get(&self, database: &str) -> Option<&NsDbt> {
		self.search(database).ok().map(|idx| &self.dbt[idx])
	}

	/// Returns the configured sources for `database`, or `defaults` if the
	/// database has no entry.
	pub fn resolve<'a>(&'a self, database: &str, defaults: &'a [NsSrc]) -> &'a [NsSrc] {
		self.get(database).map_or(defaults, NsDbt::sources)
	}

	/// Number of configured databases.
	pub fn len(&self) -> usize {
		self.dbt.len()
	}

	/// Returns true if no database is configured.
	pub fn is_empty(&self) -> bool {
		self.dbt.is_empty()
	}

	/// Iterates databases in sorted order.
	pub fn iter(&self) -> impl Iterator<Item = &NsDbt> {
		self.dbt.iter()
	}

	fn search(&self, database: &str) -> Result<usize, usize> {
		self.dbt.binary_search_by(|dbt| cmp_ignore_case(&dbt.name, database))
	}
}

/// ASCII case-insensitive ordering, consistent with `eq_ignore_ascii_case`.
pub(crate) fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
	a.bytes()
		.map(|c| c.to_ascii_lowercase())
		.cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
}
