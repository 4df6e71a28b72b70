//! Module registry: source name to method implementations.
//!
//! A module is either built in (registered in-process through a
//! [`RegisterFn`]) or loaded from a shared object (see [`dynamic`]). Either
//! way it contributes a table of `(database, method) -> callback` entries.
//!
//! # Invariants
//!
//! - [`ModuleTable`] is sorted by case-folded module name.
//! - Each module's method table is sorted by `(method, case-folded database)`
//!   and holds at most one entry per key.

pub mod abi;
pub mod dynamic;

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub use dynamic::DynamicModule;

use crate::dispatch::NsContext;
use crate::error::ModuleError;
use crate::source::cmp_ignore_case;
use crate::status::NsStatus;

/// Plain function implementing a method.
pub type MethodFn = fn(&NsContext<'_>, &mut dyn Any) -> NsStatus;

/// Shared closure implementing a method.
pub type SharedMethod = Arc<dyn Fn(&NsContext<'_>, &mut dyn Any) -> NsStatus + Send + Sync>;

/// Builds a built-in module's method table; receives the source name.
pub type RegisterFn = Arc<dyn Fn(&str) -> Vec<MethodEntry> + Send + Sync>;

/// A callable method implementation.
#[derive(Clone)]
pub enum Callback {
	/// A free function.
	Fn(MethodFn),
	/// A closure, possibly carrying state.
	Shared(SharedMethod),
}

impl Callback {
	/// Invokes the method.
	pub fn invoke(&self, cx: &NsContext<'_>, args: &mut dyn Any) -> NsStatus {
		match self {
			Callback::Fn(f) => f(cx, args),
			Callback::Shared(f) => f(cx, args),
		}
	}
}

impl fmt::Debug for Callback {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Callback::Fn(func) => f.debug_tuple("Fn").field(&(*func as *const ())).finish(),
			Callback::Shared(_) => f.write_str("Shared(..)"),
		}
	}
}

/// One `(database, method)` implementation exported by a module.
#[derive(Debug, Clone)]
pub struct MethodEntry {
	database: String,
	method: String,
	callback: Callback,
}

impl MethodEntry {
	/// Creates an entry from a callback.
	pub fn new(database: impl Into<String>, method: impl Into<String>, callback: Callback) -> Self {
		Self {
			database: database.into(),
			method: method.into(),
			callback,
		}
	}

	/// Creates an entry backed by a free function.
	pub fn func(database: impl Into<String>, method: impl Into<String>, f: MethodFn) -> Self {
		Self::new(database, method, Callback::Fn(f))
	}

	/// Creates an entry backed by a closure.
	pub fn shared<F>(database: impl Into<String>, method: impl Into<String>, f: F) -> Self
	where
		F: Fn(&NsContext<'_>, &mut dyn Any) -> NsStatus + Send + Sync + 'static,
	{
		Self::new(database, method, Callback::Shared(Arc::new(f)))
	}

	/// Database this entry serves.
	pub fn database(&self) -> &str {
		&self.database
	}

	/// Method name.
	pub fn method(&self) -> &str {
		&self.method
	}

	fn key_cmp(&self, method: &str, database: &str) -> Ordering {
		self.method
			.as_str()
			.cmp(method)
			.then_with(|| cmp_ignore_case(&self.database, database))
	}
}

/// Keeps a module's backing object alive.
#[derive(Debug, Clone)]
pub enum ModuleHandle {
	/// Registered in-process; nothing to unload.
	Builtin,
	/// Loaded from a shared object.
	Dynamic(Arc<DynamicModule>),
}

/// A registered module.
#[derive(Debug, Clone)]
pub struct NsMod {
	name: String,
	handle: ModuleHandle,
	methods: Vec<MethodEntry>,
}

impl NsMod {
	/// Creates a module, sorting its method table.
	pub fn new(name: impl Into<String>, handle: ModuleHandle, mut methods: Vec<MethodEntry>) -> Self {
		methods.sort_by(|a, b| a.key_cmp(&b.method, &b.database));
		methods.dedup_by(|later, first| first.key_cmp(&later.method, &later.database) == Ordering::Equal);
		Self {
			name: name.into(),
			handle,
			methods,
		}
	}

	/// Module (source) name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Whether the module was loaded from a shared object.
	pub fn is_dynamic(&self) -> bool {
		matches!(self.handle, ModuleHandle::Dynamic(_))
	}

	/// Method table in sorted order.
	pub fn methods(&self) -> &[MethodEntry] {
		&self.methods
	}

	/// Finds the implementation of `method` for `database`.
	pub fn find(&self, database: &str, method: &str) -> Option<&Callback> {
		self.methods
			.binary_search_by(|entry| entry.key_cmp(method, database))
			.ok()
			.map(|idx| &self.methods[idx].callback)
	}
}

/// Sorted table of registered modules.
#[derive(Debug, Clone, Default)]
pub struct ModuleTable {
	mods: Vec<NsMod>,
}

impl ModuleTable {
	/// Creates an empty table.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a module for `source`.
	///
	/// With a register function the module is built in; otherwise a shared
	/// object is looked for in `module_dir`. A source that is already
	/// registered is left alone.
	pub fn load(&mut self, source: &str, register: Option<&RegisterFn>, module_dir: Option<&Path>) -> Result<(), ModuleError> {
		if self.get(source).is_some() {
			return Ok(());
		}

		let module = match register {
			Some(register) => {
				let methods = register(source);
				if methods.is_empty() {
					return Err(ModuleError::EmptyTable(source.to_string()));
				}
				NsMod::new(source, ModuleHandle::Builtin, methods)
			}
			None => {
				let Some(dir) = module_dir else {
					return Err(ModuleError::NotFound(Path::new(&abi::module_file_name(source)).to_path_buf()));
				};
				let dynamic = DynamicModule::open(dir, source)?;
				let methods = dynamic.methods()?;
				NsMod::new(source, ModuleHandle::Dynamic(dynamic), methods)
			}
		};

		self.insert(module);
		Ok(())
	}

	/// Inserts a module, replacing any with the same name.
	pub fn insert(&mut self, module: NsMod) {
		match self.search(&module.name) {
			Ok(idx) => self.mods[idx] = module,
			Err(idx) => self.mods.insert(idx, module),
		}
	}

	/// Looks up a module by source name.
	pub fn get(&self, source: &str) -> Option<&NsMod> {
		self.search(source).ok().map(|idx| &self.mods[idx])
	}

	/// Finds the callback a source provides for `(database, method)`.
	pub fn find(&self, source: &str, database: &str, method: &str) -> Option<&Callback> {
		self.get(source)?.find(database, method)
	}

	/// Number of registered modules.
	pub fn len(&self) -> usize {
		self.mods.len()
	}

	/// Returns true if no module is registered.
	pub fn is_empty(&self) -> bool {
		self.mods.is_empty()
	}

	/// Iterates modules in sorted order.
	pub fn iter(&self) -> impl Iterator<Item = &NsMod> {
		self.mods.iter()
	}

	fn search(&self, source: &str) -> Result<usize, usize> {
		self.mods.binary_search_by(|m| cmp_ignore_case(&m.name, source))
	}
}
