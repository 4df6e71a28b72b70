//! The dispatch engine.
//!
//! # Role
//!
//! [`NsSwitch`] owns the current [`Snapshot`] of the source and module
//! registries and walks a database's sources in priority order for every
//! [`NsSwitch::dispatch`] call.
//!
//! # Invariants
//!
//! - A top-level dispatch holds the gate's read side for its whole duration,
//!   nested calls included. Rebuilds take the write side.
//! - A snapshot is never mutated after publication; rebuilds publish a new
//!   one with a higher generation.
//! - Nested dispatch (through [`NsContext::dispatch`] or from any callback on
//!   the same thread) never reconfigures and sees the outer call's snapshot.
//! - A builtin registered from inside a dispatch is published by the next
//!   top-level call on any thread.

use std::any::Any;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, trace, warn};

use crate::config;
use crate::error::{ModuleError, Result};
use crate::guard::{self, DispatchScope};
use crate::module::{ModuleTable, RegisterFn};
use crate::source::{DEFAULT_FILES, NsSrc, SOURCE_COMPAT, SOURCE_FILES, SourceTable};
use crate::status::{NsStatus, Walk};

/// Default switch configuration path.
pub const DEFAULT_CONF_PATH: &str = "/etc/nsswitch.conf";
/// Default directory searched for dynamic source modules.
pub const DEFAULT_MODULE_DIR: &str = "/usr/lib";

/// Where the switch reads its configuration and modules from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchConfig {
	/// Switch configuration file.
	pub conf_path: PathBuf,
	/// Directory holding `nss_<source>.so.<version>` objects; `None` disables
	/// dynamic loading.
	pub module_dir: Option<PathBuf>,
}

impl Default for SwitchConfig {
	fn default() -> Self {
		Self {
			conf_path: PathBuf::from(DEFAULT_CONF_PATH),
			module_dir: Some(PathBuf::from(DEFAULT_MODULE_DIR)),
		}
	}
}

impl SwitchConfig {
	/// Reads `NSS_SWITCH_CONF` and `NSS_MODULE_DIR`, falling back to defaults.
	pub fn from_env() -> Self {
		Self::from_vars(std::env::var_os("NSS_SWITCH_CONF"), std::env::var_os("NSS_MODULE_DIR"))
	}

	/// Builds a config from raw variable values. An empty module directory
	/// disables dynamic loading.
	pub fn from_vars(conf_path: Option<OsString>, module_dir: Option<OsString>) -> Self {
		let defaults = Self::default();
		Self {
			conf_path: conf_path.filter(|v| !v.is_empty()).map_or(defaults.conf_path, PathBuf::from),
			module_dir: match module_dir {
				Some(dir) if dir.is_empty() => None,
				Some(dir) => Some(PathBuf::from(dir)),
				None => defaults.module_dir,
			},
		}
	}
}

/// Immutable registry state observed by one top-level dispatch.
#[derive(Debug, Default)]
pub struct Snapshot {
	sources: SourceTable,
	modules: ModuleTable,
	generation: u64,
}

impl Snapshot {
	/// Configured databases.
	pub fn sources(&self) -> &SourceTable {
		&self.sources
	}

	/// Registered modules.
	pub fn modules(&self) -> &ModuleTable {
		&self.modules
	}

	/// Rebuild counter; starts at zero and increases with every rebuild.
	pub fn generation(&self) -> u64 {
		self.generation
	}
}

/// Call-site override callback.
pub type DtabFn<'a> = dyn Fn(&NsContext<'_>, &mut dyn Any) -> NsStatus + 'a;

/// One call-site override: used instead of the module registry when the
/// walk reaches a source with this name.
#[derive(Clone, Copy)]
pub struct DtabEntry<'a> {
	source: &'a str,
	method: &'a DtabFn<'a>,
}

impl<'a> DtabEntry<'a> {
	/// Creates an override for `source`.
	pub fn new(source: &'a str, method: &'a DtabFn<'a>) -> Self {
		Self { source, method }
	}

	/// Source this entry overrides.
	pub fn source(&self) -> &'a str {
		self.source
	}
}

impl fmt::Debug for DtabEntry<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DtabEntry").field("source", &self.source).finish_non_exhaustive()
	}
}

/// Everything a call site supplies besides the method arguments.
#[derive(Debug, Clone, Copy)]
pub struct NsRequest<'a> {
	database: &'a str,
	method: &'a str,
	dtab: &'a [DtabEntry<'a>],
	defaults: &'a [NsSrc],
	walk: Walk,
}

impl<'a> NsRequest<'a> {
	/// Starts a request with no overrides, `files` as the default source and
	/// first-match walking.
	pub fn new(database: &'a str, method: &'a str) -> Self {
		Self {
			database,
			method,
			dtab: &[],
			defaults: DEFAULT_FILES,
			walk: Walk::FirstMatch,
		}
	}

	/// Sets the call-site override table.
	pub fn dtab(mut self, dtab: &'a [DtabEntry<'a>]) -> Self {
		self.dtab = dtab;
		self
	}

	/// Sets the source list used when the database is not configured.
	pub fn defaults(mut self, defaults: &'a [NsSrc]) -> Self {
		self.defaults = defaults;
		self
	}

	/// Sets the walk mode.
	pub fn walk(mut self, walk: Walk) -> Self {
		self.walk = walk;
		self
	}

	/// Invokes every source regardless of stop sets.
	pub fn force_all(self) -> Self {
		self.walk(Walk::ForceAll)
	}

	/// Database name.
	pub fn database(&self) -> &'a str {
		self.database
	}

	/// Method name.
	pub fn method(&self) -> &'a str {
		self.method
	}

	fn is_valid(&self) -> bool {
		!self.database.is_empty() && !self.method.is_empty()
	}
}

/// What a method callback knows about the call it is serving.
pub struct NsContext<'a> {
	switch: &'a NsSwitch,
	snapshot: &'a Arc<Snapshot>,
	depth: usize,
	database: &'a str,
	method: &'a str,
	source: &'a str,
}

impl NsContext<'_> {
	/// Dispatches a nested request against the same snapshot.
	///
	/// Never reconfigures and never touches the dispatch gate.
	pub fn dispatch(&self, req: &NsRequest<'_>, args: &mut dyn Any) -> NsStatus {
		if !req.is_valid() {
			error!(database = req.database, method = req.method, "dispatch without database or method");
			return NsStatus::UNAVAIL;
		}
		let _scope = DispatchScope::enter();
		self.switch.walk(self.snapshot, self.depth + 1, req, args)
	}

	/// The switch serving this call.
	pub fn switch(&self) -> &NsSwitch {
		self.switch
	}

	/// Generation of the snapshot this call runs against.
	pub fn generation(&self) -> u64 {
		self.snapshot.generation
	}

	/// Nesting depth; zero for a top-level call.
	pub fn depth(&self) -> usize {
		self.depth
	}

	/// Database being dispatched.
	pub fn database(&self) -> &str {
		self.database
	}

	/// Method being dispatched.
	pub fn method(&self) -> &str {
		self.method
	}

	/// Source being invoked.
	pub fn source(&self) -> &str {
		self.source
	}
}

impl fmt::Debug for NsContext<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("NsContext")
			.field("generation", &self.snapshot.generation)
			.field("depth", &self.depth)
			.field("database", &self.database)
			.field("method", &self.method)
			.field("source", &self.source)
			.finish()
	}
}

/// The name-service switch.
pub struct NsSwitch {
	config: SwitchConfig,
	gate: RwLock<()>,
	current: ArcSwap<Snapshot>,
	/// Modification time of the configuration last read, loaded or not.
	stamp: Mutex<Option<SystemTime>>,
	builtins: Mutex<Vec<(String, RegisterFn)>>,
	/// A builtin changed while its registrar was inside a dispatch.
	pending: AtomicBool,
}

impl NsSwitch {
	/// Creates a switch. The configuration is read lazily on first dispatch.
	pub fn new(config: SwitchConfig) -> Self {
		Self {
			config,
			gate: RwLock::new(()),
			current: ArcSwap::from_pointee(Snapshot::default()),
			stamp: Mutex::new(None),
			builtins: Mutex::new(Vec::new()),
			pending: AtomicBool::new(false),
		}
	}

	/// Switch configuration.
	pub fn config(&self) -> &SwitchConfig {
		&self.config
	}

	/// Current snapshot.
	pub fn snapshot(&self) -> Arc<Snapshot> {
		self.current.load_full()
	}

	/// Installs a built-in module for `name`, replacing any earlier one.
	///
	/// The register function runs now and again on every rebuild. Called
	/// from inside a dispatch, only the registration is recorded; the next
	/// top-level dispatch publishes it.
	pub fn register_builtin(&self, name: impl Into<String>, register: RegisterFn) {
		let name = name.into();
		{
			let mut builtins = self.builtins.lock();
			match builtins.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
				Some(slot) => slot.1 = register,
				None => builtins.push((name.clone(), register)),
			}
		}
		if guard::in_dispatch() {
			self.pending.store(true, Ordering::Release);
			debug!(module = %name, "registered builtin module; publishing after the dispatch");
			return;
		}
		debug!(module = %name, "registered builtin module");

		let _write = self.gate.write();
		let sources = self.current.load().sources.clone();
		self.rebuild(sources);
	}

	/// Publishes builtins registered from inside a dispatch.
	fn publish_pending(&self) {
		if !self.pending.load(Ordering::Acquire) {
			return;
		}
		let _write = self.gate.write();
		if self.pending.load(Ordering::Acquire) {
			let sources = self.current.load().sources.clone();
			self.rebuild(sources);
		}
	}

	/// Re-reads the configuration if its modification time changed.
	///
	/// Returns `true` if a new snapshot was published. Does nothing while the
	/// calling thread is inside a dispatch, or when the file is absent. A file
	/// that cannot be read keeps the previous tables and is not read again
	/// until its modification time changes.
	pub fn reconfigure(&self) -> bool {
		if guard::in_dispatch() {
			return false;
		}
		let Some(mtime) = self.config_mtime() else {
			return false;
		};
		if *self.stamp.lock() == Some(mtime) {
			return false;
		}

		let _write = self.gate.write();
		let mut stamp = self.stamp.lock();
		if *stamp == Some(mtime) {
			return false;
		}
		match config::load(&self.config.conf_path) {
			Ok(parsed) => {
				*stamp = Some(mtime);
				drop(stamp);
				debug!(path = %self.config.conf_path.display(), databases = parsed.sources.len(), "switch configuration reloaded");
				self.rebuild(parsed.sources);
				true
			}
			Err(err) => {
				*stamp = Some(mtime);
				warn!(%err, "keeping previous switch configuration");
				false
			}
		}
	}

	/// Re-reads the configuration unconditionally.
	///
	/// Unlike [`reconfigure`](Self::reconfigure) this reports I/O errors.
	/// Inside a dispatch it returns `Ok(false)` without doing anything.
	pub fn reload(&self) -> Result<bool> {
		if guard::in_dispatch() {
			return Ok(false);
		}
		let _write = self.gate.write();
		let parsed = config::load(&self.config.conf_path)?;
		*self.stamp.lock() = self.config_mtime();
		self.rebuild(parsed.sources);
		Ok(true)
	}

	/// Walks the sources for `req`, invoking each one's implementation of
	/// the method until a status intersects that source's stop set.
	///
	/// The same `args` value is handed to every source. Returns `NOTFOUND`
	/// if no source stopped the walk, and `UNAVAIL` without invoking anything
	/// if the request names no database or method.
	pub fn dispatch(&self, req: &NsRequest<'_>, args: &mut dyn Any) -> NsStatus {
		if !req.is_valid() {
			error!(database = req.database, method = req.method, "dispatch without database or method");
			return NsStatus::UNAVAIL;
		}

		let nested = guard::in_dispatch();
		if !nested {
			self.reconfigure();
			self.publish_pending();
		}
		let _read = (!nested).then(|| self.gate.read());
		let depth = guard::depth();
		let _scope = DispatchScope::enter();
		let snapshot = self.current.load_full();
		self.walk(&snapshot, depth, req, args)
	}

	fn walk(&self, snapshot: &Arc<Snapshot>, depth: usize, req: &NsRequest<'_>, args: &mut dyn Any) -> NsStatus {
		let srclist = snapshot.sources.resolve(req.database, req.defaults);
		let mut result = NsStatus::empty();

		for src in srclist {
			result = NsStatus::empty();
			let cx = NsContext {
				switch: self,
				snapshot,
				depth,
				database: req.database,
				method: req.method,
				source: src.name(),
			};

			if let Some(entry) = req.dtab.iter().find(|e| e.source.eq_ignore_ascii_case(src.name())) {
				result = (entry.method)(&cx, &mut *args);
			} else if let Some(callback) = snapshot.modules.find(src.name(), req.database, req.method) {
				result = callback.invoke(&cx, &mut *args);
			} else {
				trace!(database = req.database, method = req.method, source = src.name(), "no implementation");
				continue;
			}
			trace!(database = req.database, method = req.method, source = src.name(), status = ?result, depth, "source returned");

			if req.walk == Walk::ForceAll {
				continue;
			}
			if result.intersects(src.flags()) {
				break;
			}
		}

		let result = result.public();
		if result.is_empty() { NsStatus::NOTFOUND } else { result }
	}

	fn config_mtime(&self) -> Option<SystemTime> {
		std::fs::metadata(&self.config.conf_path).and_then(|m| m.modified()).ok()
	}

	/// Publishes a snapshot for `sources`, reloading every module. Callers
	/// hold the gate's write side.
	///
	/// Dynamic modules still named by the configuration are carried over
	/// from the previous snapshot instead of being opened again.
	fn rebuild(&self, sources: SourceTable) {
		self.pending.store(false, Ordering::Release);
		let previous = self.current.load_full();
		let mut modules = ModuleTable::new();

		for (name, register) in self.builtins.lock().iter() {
			if let Err(err) = modules.load(name, Some(register), None) {
				warn!(module = %name, %err, "builtin module not registered");
			}
		}

		for src in sources.iter().flat_map(|dbt| dbt.sources()) {
			let name = src.name();
			if is_call_site_source(name) || modules.get(name).is_some() {
				continue;
			}
			if let Some(kept) = previous.modules.get(name).filter(|m| m.is_dynamic()) {
				modules.insert(kept.clone());
				continue;
			}
			match modules.load(name, None, self.config.module_dir.as_deref()) {
				Ok(()) => debug!(module = name, "loaded source module"),
				Err(err @ ModuleError::NotFound(_)) => debug!(module = name, %err, "source module unavailable"),
				Err(err) => warn!(module = name, %err, "source module rejected"),
			}
		}

		let generation = previous.generation + 1;
		self.current.store(Arc::new(Snapshot {
			sources,
			modules,
			generation,
		}));
		debug!(generation, "switch snapshot published");
	}
}

impl fmt::Debug for NsSwitch {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("NsSwitch")
			.field("config", &self.config)
			.field("generation", &self.current.load().generation)
			.finish_non_exhaustive()
	}
}

/// Sources every call site implements itself; never loaded as modules.
fn is_call_site_source(name: &str) -> bool {
	name.eq_ignore_ascii_case(SOURCE_FILES) || name.eq_ignore_ascii_case(SOURCE_COMPAT)
}
