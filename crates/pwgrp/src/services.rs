//! A switch bundled with its passwd and group databases, and the
//! process-wide instance behind the free functions.

use std::sync::{Arc, OnceLock};

use libc::{gid_t, uid_t};
use nss_switch::{NsSwitch, SwitchConfig};

use crate::database::{GroupDb, PasswdDb};
use crate::group::Group;
use crate::netgroup::{FileNetgroups, NetgroupSource};
use crate::passwd::Passwd;
use crate::paths::DbPaths;

/// One switch and the databases dispatching through it.
#[derive(Debug)]
pub struct NameServices {
	/// The switch.
	pub switch: Arc<NsSwitch>,
	/// passwd adapters.
	pub passwd: PasswdDb,
	/// group adapters.
	pub group: GroupDb,
	netgroups: Arc<FileNetgroups>,
}

impl NameServices {
	/// Builds a new switch from `config` and databases over `paths`.
	pub fn new(config: SwitchConfig, paths: DbPaths) -> Self {
		Self::with_switch(Arc::new(NsSwitch::new(config)), paths)
	}

	/// Builds databases over `paths` dispatching through `switch`.
	pub fn with_switch(switch: Arc<NsSwitch>, paths: DbPaths) -> Self {
		let netgroups = Arc::new(FileNetgroups::new(paths.netgroup));
		let shared: Arc<dyn NetgroupSource> = netgroups.clone();
		Self {
			passwd: PasswdDb::new(Arc::clone(&switch), paths.passwd, Arc::clone(&shared)),
			group: GroupDb::new(Arc::clone(&switch), paths.group, shared),
			switch,
			netgroups,
		}
	}

	/// The process-wide instance, configured from the environment on first
	/// use.
	pub fn global() -> &'static NameServices {
		static GLOBAL: OnceLock<NameServices> = OnceLock::new();
		GLOBAL.get_or_init(|| NameServices::new(SwitchConfig::from_env(), DbPaths::from_env()))
	}

	/// Netgroup database consulted by `+@`/`-@` directives.
	pub fn netgroups(&self) -> &FileNetgroups {
		&self.netgroups
	}

	/// Users of `netgroup`.
	pub fn netgroup_users(&self, netgroup: &str) -> Vec<String> {
		self.netgroups.users(netgroup)
	}

	/// See [`NetgroupSource::innetgr`].
	pub fn innetgr(&self, netgroup: &str, host: Option<&str>, user: Option<&str>, domain: Option<&str>) -> bool {
		self.netgroups.innetgr(netgroup, host, user, domain)
	}
}

/// Looks up a user by name.
pub fn getpwnam(name: &str) -> Option<Passwd> {
	NameServices::global().passwd.getpwnam(name)
}

/// Looks up a user by uid.
pub fn getpwuid(uid: uid_t) -> Option<Passwd> {
	NameServices::global().passwd.getpwuid(uid)
}

/// Looks up a group by name.
pub fn getgrnam(name: &str) -> Option<Group> {
	NameServices::global().group.getgrnam(name)
}

/// Looks up a group by gid.
pub fn getgrgid(gid: gid_t) -> Option<Group> {
	NameServices::global().group.getgrgid(gid)
}

/// Next user of the process-wide enumeration.
pub fn getpwent() -> Option<Passwd> {
	NameServices::global().passwd.getpwent()
}

/// Next group of the process-wide enumeration.
pub fn getgrent() -> Option<Group> {
	NameServices::global().group.getgrent()
}

/// Rewinds the process-wide user enumeration.
pub fn setpwent() {
	NameServices::global().passwd.setpwent();
}

/// Closes the process-wide user enumeration.
pub fn endpwent() {
	NameServices::global().passwd.endpwent();
}

/// Rewinds the process-wide group enumeration.
pub fn setgrent() {
	NameServices::global().group.setgrent();
}

/// Closes the process-wide group enumeration.
pub fn endgrent() {
	NameServices::global().group.endgrent();
}
