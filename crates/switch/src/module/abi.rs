//! C ABI shared between the host and dynamically loaded source modules.
//!
//! A module object named `nss_<source>.so.<version>` must export:
//!
//! - a `u32` data symbol `nss_module_interface_version` equal to
//!   [`NSS_MODULE_INTERFACE_VERSION`];
//! - a function `nss_module_register` of type [`NssModuleRegister`].
//!
//! Registration returns an array of [`NsMtab`] entries and optionally an
//! unregister hook, which the host calls once when the module is discarded.
//!
//! Method arguments cross the boundary as a pointer to the host's
//! `&mut dyn Any`, so modules are expected to be built from the same crate
//! graph as the host. The interface version gates that assumption.

use std::any::Any;
use std::ffi::{c_char, c_int, c_uint, c_void};

/// Interface version the host understands.
pub const NSS_MODULE_INTERFACE_VERSION: u32 = 0;

/// Name of the exported interface version symbol.
pub const VERSION_SYMBOL: &str = "nss_module_interface_version";

/// Name of the exported registration function.
pub const REGISTER_SYMBOL: &str = "nss_module_register";

/// A method exported by a module.
///
/// `retval` points to a `c_int` errno slot, handed to callers through
/// [`take_errno`](crate::guard::take_errno) when nonzero; `mdata` is the entry's opaque
/// data; `args` is the value produced by [`args_to_raw`]. The return value is
/// an `NsStatus` bit pattern.
pub type NssMethod = unsafe extern "C" fn(retval: *mut c_void, mdata: *mut c_void, args: *mut c_void) -> c_int;

/// Releases a method table previously returned by registration.
pub type NssModuleUnregister = unsafe extern "C" fn(mtab: *mut NsMtab, nelems: c_uint);

/// Registers a module under `name`, filling `nelems` and `unregister`.
pub type NssModuleRegister =
	unsafe extern "C" fn(name: *const c_char, nelems: *mut c_uint, unregister: *mut Option<NssModuleUnregister>) -> *mut NsMtab;

/// One method table entry as laid out by a module.
#[repr(C)]
#[derive(Debug)]
pub struct NsMtab {
	/// NUL-terminated database name.
	pub database: *const c_char,
	/// NUL-terminated method name.
	pub name: *const c_char,
	/// Method implementation.
	pub method: Option<NssMethod>,
	/// Opaque per-entry data passed back on every call.
	pub mdata: *mut c_void,
}

/// File name a module for `source` is expected under.
pub fn module_file_name(source: &str) -> String {
	format!("nss_{source}.so.{NSS_MODULE_INTERFACE_VERSION}")
}

/// Erases a method argument into the pointer handed to a module.
///
/// The pointer borrows `slot` and must not outlive it.
pub fn args_to_raw(slot: &mut &mut dyn Any) -> *mut c_void {
	(slot as *mut &mut dyn Any).cast()
}

/// Recovers the method argument inside a module.
///
/// # Safety
///
/// `args` must be exactly the pointer the host passed to the method, and the
/// returned reference must not escape the call.
pub unsafe fn args_from_raw<'a>(args: *mut c_void) -> &'a mut dyn Any {
	unsafe { &mut **args.cast::<&mut dyn Any>() }
}
