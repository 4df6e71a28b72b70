//! Locations of the flat files backing the databases.

use std::ffi::OsString;
use std::path::PathBuf;

/// Default passwd file.
pub const DEFAULT_PASSWD_PATH: &str = "/etc/passwd";
/// Default group file.
pub const DEFAULT_GROUP_PATH: &str = "/etc/group";
/// Default netgroup file.
pub const DEFAULT_NETGROUP_PATH: &str = "/etc/netgroup";

/// Flat file locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbPaths {
	/// passwd file read by the `files` and `compat` sources.
	pub passwd: PathBuf,
	/// group file read by the `files` and `compat` sources.
	pub group: PathBuf,
	/// netgroup file consulted for `+@`/`-@` directives.
	pub netgroup: PathBuf,
}

impl Default for DbPaths {
	fn default() -> Self {
		Self {
			passwd: DEFAULT_PASSWD_PATH.into(),
			group: DEFAULT_GROUP_PATH.into(),
			netgroup: DEFAULT_NETGROUP_PATH.into(),
		}
	}
}

impl DbPaths {
	/// Reads `NSS_PASSWD`, `NSS_GROUP` and `NSS_NETGROUP`.
	pub fn from_env() -> Self {
		let var = |name| std::env::var_os(name);
		Self::from_vars(var("NSS_PASSWD"), var("NSS_GROUP"), var("NSS_NETGROUP"))
	}

	/// Builds paths from optional overrides; unset or empty values keep the
	/// default.
	pub fn from_vars(passwd: Option<OsString>, group: Option<OsString>, netgroup: Option<OsString>) -> Self {
		let pick = |value: Option<OsString>, default: &str| {
			value.filter(|v| !v.is_empty()).map_or_else(|| PathBuf::from(default), PathBuf::from)
		};
		Self {
			passwd: pick(passwd, DEFAULT_PASSWD_PATH),
			group: pick(group, DEFAULT_GROUP_PATH),
			netgroup: pick(netgroup, DEFAULT_NETGROUP_PATH),
		}
	}

	/// All three files inside `dir`, named as under `/etc`.
	pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
		let dir = dir.into();
		Self {
			passwd: dir.join("passwd"),
			group: dir.join("group"),
			netgroup: dir.join("netgroup"),
		}
	}
}
