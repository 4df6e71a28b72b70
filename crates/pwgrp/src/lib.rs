//! passwd and group databases over the name-service switch.
//!
//! [`Database`] implements the `get*ent`/`get*nam`/`get*id` families and
//! their `_r` forms by dispatching through an [`nss_switch::NsSwitch`]. The
//! `files` and `compat` sources are implemented here as scan state machines
//! over the flat files ([`scan`]); every other source comes from the
//! switch's module registry, for instance a [`MemorySource`].

pub mod args;
pub mod database;
pub mod entry;
pub mod error;
pub mod group;
pub mod memory;
pub mod netgroup;
pub mod passwd;
pub mod paths;
pub mod scan;
pub mod services;

pub use args::{Key, Lookup, Setent};
pub use database::{Database, GroupDb, PasswdDb};
pub use entry::{Entry, Exclusions, GROUP_METHODS, Methods, PASSWD_METHODS};
pub use error::{NssError, Result};
pub use group::{Group, GroupProto};
pub use memory::MemorySource;
pub use netgroup::{FileNetgroups, NetgroupSource, NetgroupTable, NoNetgroups};
pub use passwd::{Passwd, PasswdProto};
pub use paths::DbPaths;
pub use services::{
	NameServices, endgrent, endpwent, getgrent, getgrgid, getgrnam, getpwent, getpwnam, getpwuid, setgrent, setpwent,
};

#[cfg(test)]
use tracing_subscriber as _;
