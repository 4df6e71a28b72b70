//! Shared-object source modules.
//!
//! Loading checks the interface version symbol before calling the
//! registration entry point. A module whose table is empty, null or malformed
//! is never registered. The library stays open for as long as any snapshot
//! or callback holds the [`DynamicModule`].

use std::any::Any;
use std::ffi::{CStr, CString, c_int, c_uint, c_void};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use tracing::{debug, trace};

use super::MethodEntry;
use super::abi::{
	NSS_MODULE_INTERFACE_VERSION, NsMtab, NssMethod, NssModuleRegister, NssModuleUnregister, REGISTER_SYMBOL, VERSION_SYMBOL,
	args_to_raw, module_file_name,
};
use crate::error::ModuleError;
use crate::guard;
use crate::status::NsStatus;

/// A loaded module object and the method table it registered.
pub struct DynamicModule {
	name: String,
	path: PathBuf,
	mtab: *mut NsMtab,
	nelems: c_uint,
	unregister: Option<NssModuleUnregister>,
	// Dropped after `Drop::drop` has run the unregister hook.
	_library: Library,
}

// SAFETY: the method table is owned by the module and only read after
// registration; calls into it are serialized by the module's own contract.
unsafe impl Send for DynamicModule {}
// SAFETY: see above.
unsafe impl Sync for DynamicModule {}

/// Opaque per-entry data carried into callbacks.
#[derive(Clone, Copy)]
struct EntryData(*mut c_void);

// SAFETY: the pointer is only handed back to the module that produced it.
unsafe impl Send for EntryData {}
// SAFETY: see above.
unsafe impl Sync for EntryData {}

impl EntryData {
	fn get(self) -> *mut c_void {
		self.0
	}
}

impl DynamicModule {
	/// Opens `<dir>/nss_<source>.so.<version>` and runs its registration.
	pub fn open(dir: &Path, source: &str) -> Result<Arc<Self>, ModuleError> {
		let path = dir.join(module_file_name(source));
		if !path.exists() {
			return Err(ModuleError::NotFound(path));
		}

		debug!(path = %path.display(), "loading source module");
		// SAFETY: loading runs the object's initializers; module files are
		// trusted the same way the configuration naming them is.
		let library = unsafe { Library::new(&path) }.map_err(|e| ModuleError::Load {
			path: path.clone(),
			reason: e.to_string(),
		})?;

		let actual = {
			// SAFETY: the symbol is declared as a `u32` data object.
			let symbol = unsafe { library.get::<*const c_uint>(VERSION_SYMBOL.as_bytes()) }.map_err(|_| ModuleError::MissingSymbol {
				path: path.clone(),
				symbol: VERSION_SYMBOL,
			})?;
			let ptr: *const c_uint = *symbol;
			if ptr.is_null() {
				return Err(ModuleError::MissingSymbol {
					path,
					symbol: VERSION_SYMBOL,
				});
			}
			// SAFETY: non-null pointer to the module's static version word.
			unsafe { *ptr }
		};
		if actual != NSS_MODULE_INTERFACE_VERSION {
			return Err(ModuleError::AbiMismatch {
				module: source.to_string(),
				expected: NSS_MODULE_INTERFACE_VERSION,
				actual,
			});
		}

		let register: NssModuleRegister = {
			// SAFETY: the symbol is declared with the registration signature.
			let symbol = unsafe { library.get::<NssModuleRegister>(REGISTER_SYMBOL.as_bytes()) }.map_err(|_| ModuleError::MissingSymbol {
				path: path.clone(),
				symbol: REGISTER_SYMBOL,
			})?;
			*symbol
		};

		let name = CString::new(source).map_err(|_| ModuleError::MalformedTable(source.to_string()))?;
		let mut nelems: c_uint = 0;
		let mut unregister: Option<NssModuleUnregister> = None;
		// SAFETY: all out-pointers are valid for the duration of the call.
		let mtab = unsafe { register(name.as_ptr(), &mut nelems, &mut unregister) };

		if mtab.is_null() || nelems == 0 {
			if let (false, Some(unregister)) = (mtab.is_null(), unregister) {
				// SAFETY: hands back exactly what registration returned.
				unsafe { unregister(mtab, nelems) };
			}
			return Err(ModuleError::EmptyTable(source.to_string()));
		}

		Ok(Arc::new(Self {
			name: source.to_string(),
			path,
			mtab,
			nelems,
			unregister,
			_library: library,
		}))
	}

	/// Source name the module registered under.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Path the module was loaded from.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Converts the registered table into method entries.
	///
	/// Each callback keeps the module alive.
	pub fn methods(self: &Arc<Self>) -> Result<Vec<MethodEntry>, ModuleError> {
		// SAFETY: registration reported `nelems` contiguous entries at `mtab`.
		let entries = unsafe { std::slice::from_raw_parts(self.mtab, self.nelems as usize) };
		let malformed = || ModuleError::MalformedTable(self.name.clone());

		let mut out = Vec::with_capacity(entries.len());
		for entry in entries {
			let Some(method) = entry.method else {
				return Err(malformed());
			};
			if entry.database.is_null() || entry.name.is_null() {
				return Err(malformed());
			}
			// SAFETY: non-null NUL-terminated strings owned by the module.
			let database = unsafe { CStr::from_ptr(entry.database) }.to_str().map_err(|_| malformed())?;
			// SAFETY: as above.
			let name = unsafe { CStr::from_ptr(entry.name) }.to_str().map_err(|_| malformed())?;

			let module = Arc::clone(self);
			let data = EntryData(entry.mdata);
			out.push(MethodEntry::shared(database, name, move |_cx, args| module.call(method, data.get(), args)));
		}
		Ok(out)
	}

	fn call(&self, method: NssMethod, mdata: *mut c_void, args: &mut dyn Any) -> NsStatus {
		let mut retval: c_int = 0;
		let mut slot: &mut dyn Any = args;
		// SAFETY: every pointer is valid for the duration of the call.
		let rv = unsafe { method((&mut retval as *mut c_int).cast(), mdata, args_to_raw(&mut slot)) };
		if retval != 0 {
			trace!(module = %self.name, retval, "module method reported errno");
			guard::set_errno(retval);
		}
		NsStatus::from_bits_retain(rv as u32)
	}
}

impl Drop for DynamicModule {
	fn drop(&mut self) {
		if let Some(unregister) = self.unregister {
			debug!(module = %self.name, "unregistering source module");
			// SAFETY: hands back exactly what registration returned, once.
			unsafe { unregister(self.mtab, self.nelems) };
		}
	}
}

impl fmt::Debug for DynamicModule {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DynamicModule")
			.field("name", &self.name)
			.field("path", &self.path)
			.field("nelems", &self.nelems)
			.finish_non_exhaustive()
	}
}
