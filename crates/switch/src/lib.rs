//! Name-service switch: configured, prioritized dispatch of lookup methods
//! across pluggable sources.
//!
//! A database (`passwd`, `group`, `hosts`, ...) names an ordered list of
//! sources in the switch configuration. [`NsSwitch::dispatch`] invokes each
//! source's implementation of a method in that order and stops at the first
//! source whose returned [`NsStatus`] is in that source's stop set.
//!
//! Implementations come from three places, in lookup order:
//!
//! 1. the call site's override table ([`DtabEntry`]),
//! 2. built-in modules installed with [`NsSwitch::register_builtin`],
//! 3. shared objects loaded from the module directory (see [`module::abi`]).

pub mod config;
pub mod dispatch;
pub mod error;
pub mod guard;
pub mod module;
pub mod source;
pub mod status;

pub use dispatch::{DtabEntry, DtabFn, NsContext, NsRequest, NsSwitch, Snapshot, SwitchConfig};
pub use error::{ConfigError, ConfigWarning, ModuleError, WarningKind};
pub use guard::{set_errno, take_errno};
pub use module::{Callback, MethodEntry, MethodFn, ModuleTable, NsMod, RegisterFn};
pub use source::{
	DB_GROUP, DB_GROUP_COMPAT, DB_NETGROUP, DB_PASSWD, DB_PASSWD_COMPAT, DEFAULT_COMPAT, DEFAULT_FILES, DEFAULT_NIS, NsDbt, NsSrc,
	SOURCE_COMPAT, SOURCE_DNS, SOURCE_FILES, SOURCE_NIS, SourceTable,
};
pub use status::{NsStatus, STATUS_MASK, Walk};

#[cfg(test)]
use tempfile as _;
#[cfg(test)]
use tracing_subscriber as _;
