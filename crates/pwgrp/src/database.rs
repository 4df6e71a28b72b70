//! Public lookup adapters for one database.
//!
//! Every call dispatches through the switch with the `files` and `compat`
//! sources implemented here and `compat` as the default source list. The
//! non-reentrant family shares one set of scan states, guarded by a mutex;
//! the keyed `_r` lookups scan with states created for the call.

use std::any::Any;
use std::cell::RefCell;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use libc::gid_t;
use nss_switch::{DEFAULT_COMPAT, DtabEntry, NsContext, NsRequest, NsStatus, NsSwitch, SOURCE_COMPAT, SOURCE_FILES, Walk};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::args::{Key, Lookup, Setent, with_lookup};
use crate::entry::Entry;
use crate::error::{NssError, Result};
use crate::group::Group;
use crate::netgroup::NetgroupSource;
use crate::passwd::Passwd;
use crate::scan::{CompatState, FilesState, ScanEnv, ScanState, Usage};

/// passwd adapters.
pub type PasswdDb = Database<Passwd>;
/// group adapters.
pub type GroupDb = Database<Group>;

/// Scan states of both call-site sources.
struct Backends<E: Entry> {
	files: RefCell<FilesState>,
	compat: RefCell<CompatState<E>>,
}

impl<E: Entry> Backends<E> {
	fn new(path: &Path) -> Self {
		Self {
			files: RefCell::new(FilesState::new(path)),
			compat: RefCell::new(CompatState::new(path)),
		}
	}
}

/// What a source does with its state for one method.
#[derive(Debug, Clone, Copy)]
enum Op {
	Lookup(Usage),
	Set,
	End,
}

/// Lookup adapters for one flat-file database.
pub struct Database<E: Entry> {
	switch: Arc<NsSwitch>,
	path: PathBuf,
	netgroups: Arc<dyn NetgroupSource>,
	state: Mutex<Backends<E>>,
	warned: AtomicBool,
}

impl<E: Entry> Database<E> {
	/// Creates adapters reading `path` for the `files` and `compat` sources.
	pub fn new(switch: Arc<NsSwitch>, path: impl Into<PathBuf>, netgroups: Arc<dyn NetgroupSource>) -> Self {
		let path = path.into();
		Self {
			switch,
			state: Mutex::new(Backends::new(&path)),
			path,
			netgroups,
			warned: AtomicBool::new(false),
		}
	}

	/// Backing file path.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// The switch this database dispatches through.
	pub fn switch(&self) -> &Arc<NsSwitch> {
		&self.switch
	}

	/// Next entry of the shared enumeration.
	pub fn getent(&self) -> Option<E> {
		let (status, lookup) = self.locked(E::METHODS.getent, Key::Next, Usage::Enumerate);
		found(status, lookup)
	}

	/// Next entry of the shared enumeration, reporting errors.
	pub fn getent_r(&self) -> Result<Option<E>> {
		let (status, lookup) = self.locked(E::METHODS.getent_r, Key::Next, Usage::Enumerate);
		reentrant(status, lookup)
	}

	/// Entry named `name`.
	pub fn by_name(&self, name: &str) -> Option<E> {
		let (status, lookup) = self.locked(E::METHODS.getnam, Key::Name(name.to_string()), Usage::Rewind);
		found(status, lookup)
	}

	/// Entry named `name`, searched with a private scan state.
	pub fn by_name_r(&self, name: &str) -> Result<Option<E>> {
		let (status, lookup) = self.fresh(E::METHODS.getnam_r, Key::Name(name.to_string()));
		reentrant(status, lookup)
	}

	/// Entry with id `id`.
	pub fn by_id(&self, id: u32) -> Option<E> {
		let (status, lookup) = self.locked(E::METHODS.getid, Key::Id(id), Usage::Rewind);
		found(status, lookup)
	}

	/// Entry with id `id`, searched with a private scan state.
	pub fn by_id_r(&self, id: u32) -> Result<Option<E>> {
		let (status, lookup) = self.fresh(E::METHODS.getid_r, Key::Id(id));
		reentrant(status, lookup)
	}

	/// Rewinds the shared enumeration in every source.
	pub fn setent(&self) {
		let backends = self.state.lock();
		self.invoke(&backends, E::METHODS.setent, Walk::ForceAll, Op::Set, &mut ());
	}

	/// Rewinds every source and chooses whether keyed lookups keep files
	/// open. Returns whether the last source could start.
	pub fn set_stayopen(&self, stayopen: bool) -> bool {
		let backends = self.state.lock();
		let mut args = Setent { stayopen, ok: false };
		let status = self.invoke(&backends, E::METHODS.set_stayopen, Walk::ForceAll, Op::Set, &mut args);
		status == NsStatus::SUCCESS && args.ok
	}

	/// Closes the shared enumeration in every source.
	pub fn endent(&self) {
		let backends = self.state.lock();
		self.invoke(&backends, E::METHODS.endent, Walk::ForceAll, Op::End, &mut ());
	}

	/// Every entry, from a rewound enumeration that is closed afterwards.
	pub fn entries(&self) -> Vec<E> {
		let backends = self.state.lock();
		self.collect(&backends)
	}

	fn collect(&self, backends: &Backends<E>) -> Vec<E> {
		self.invoke(backends, E::METHODS.setent, Walk::ForceAll, Op::Set, &mut ());
		let mut out = Vec::new();
		loop {
			let mut lookup = Lookup::new(Key::Next);
			let status = self.invoke(backends, E::METHODS.getent, Walk::FirstMatch, Op::Lookup(Usage::Enumerate), &mut lookup);
			match found(status, lookup) {
				Some(entry) => out.push(entry),
				None => break,
			}
		}
		self.invoke(backends, E::METHODS.endent, Walk::ForceAll, Op::End, &mut ());
		out
	}

	fn locked(&self, method: &str, key: Key, usage: Usage) -> (NsStatus, Lookup<E>) {
		let backends = self.state.lock();
		self.lookup(&backends, method, key, usage)
	}

	fn fresh(&self, method: &str, key: Key) -> (NsStatus, Lookup<E>) {
		self.lookup(&Backends::new(&self.path), method, key, Usage::OneShot)
	}

	/// One lookup walk. An error number recorded on the thread by a source
	/// that could not write it into the slot fills an empty `errno`.
	fn lookup(&self, backends: &Backends<E>, method: &str, key: Key, usage: Usage) -> (NsStatus, Lookup<E>) {
		nss_switch::take_errno();
		let mut lookup = Lookup::new(key);
		let status = self.invoke(backends, method, Walk::FirstMatch, Op::Lookup(usage), &mut lookup);
		let recorded = nss_switch::take_errno();
		if lookup.errno == 0 {
			lookup.errno = recorded;
		}
		(status, lookup)
	}

	fn env<'a>(&'a self, cx: &'a NsContext<'a>) -> ScanEnv<'a> {
		ScanEnv {
			cx,
			netgroups: &*self.netgroups,
			warned: &self.warned,
		}
	}

	fn invoke(&self, backends: &Backends<E>, method: &str, walk: Walk, op: Op, args: &mut dyn Any) -> NsStatus {
		let files = |cx: &NsContext<'_>, args: &mut dyn Any| -> NsStatus {
			let Ok(mut state) = backends.files.try_borrow_mut() else {
				return busy(cx);
			};
			let env = self.env(cx);
			match op {
				Op::Lookup(usage) => with_lookup::<E>(args, |lookup| ScanState::<E>::run(&mut *state, &env, lookup, usage)),
				Op::Set => {
					let started = state.set(stayopen_arg(args));
					set_result(cx, args, started)
				}
				Op::End => {
					state.close();
					NsStatus::SUCCESS
				}
			}
		};
		let compat = |cx: &NsContext<'_>, args: &mut dyn Any| -> NsStatus {
			let Ok(mut state) = backends.compat.try_borrow_mut() else {
				return busy(cx);
			};
			let env = self.env(cx);
			match op {
				Op::Lookup(usage) => with_lookup::<E>(args, |lookup| state.run(&env, lookup, usage)),
				Op::Set => {
					let stayopen = stayopen_arg(args);
					let started = state.set(&env, cx.method(), args, stayopen);
					set_result(cx, args, started)
				}
				Op::End => {
					state.close(&env, cx.method());
					NsStatus::SUCCESS
				}
			}
		};

		let dtab = [DtabEntry::new(SOURCE_FILES, &files), DtabEntry::new(SOURCE_COMPAT, &compat)];
		let req = NsRequest::new(E::DATABASE, method)
			.dtab(&dtab)
			.defaults(DEFAULT_COMPAT)
			.walk(walk);
		self.switch.dispatch(&req, args)
	}
}

impl<E: Entry> std::fmt::Debug for Database<E> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Database")
			.field("database", &E::DATABASE)
			.field("path", &self.path)
			.finish_non_exhaustive()
	}
}

impl Database<Passwd> {
	/// `getpwent`.
	pub fn getpwent(&self) -> Option<Passwd> {
		self.getent()
	}

	/// `getpwent_r`.
	pub fn getpwent_r(&self) -> Result<Option<Passwd>> {
		self.getent_r()
	}

	/// `getpwnam`.
	pub fn getpwnam(&self, name: &str) -> Option<Passwd> {
		self.by_name(name)
	}

	/// `getpwnam_r`.
	pub fn getpwnam_r(&self, name: &str) -> Result<Option<Passwd>> {
		self.by_name_r(name)
	}

	/// `getpwuid`.
	pub fn getpwuid(&self, uid: libc::uid_t) -> Option<Passwd> {
		self.by_id(uid)
	}

	/// `getpwuid_r`.
	pub fn getpwuid_r(&self, uid: libc::uid_t) -> Result<Option<Passwd>> {
		self.by_id_r(uid)
	}

	/// `setpwent`.
	pub fn setpwent(&self) {
		self.setent();
	}

	/// `setpassent`.
	pub fn setpassent(&self, stayopen: bool) -> bool {
		self.set_stayopen(stayopen)
	}

	/// `endpwent`.
	pub fn endpwent(&self) {
		self.endent();
	}
}

impl Database<Group> {
	/// `getgrent`.
	pub fn getgrent(&self) -> Option<Group> {
		self.getent()
	}

	/// `getgrent_r`.
	pub fn getgrent_r(&self) -> Result<Option<Group>> {
		self.getent_r()
	}

	/// `getgrnam`.
	pub fn getgrnam(&self, name: &str) -> Option<Group> {
		self.by_name(name)
	}

	/// `getgrnam_r`.
	pub fn getgrnam_r(&self, name: &str) -> Result<Option<Group>> {
		self.by_name_r(name)
	}

	/// `getgrgid`.
	pub fn getgrgid(&self, gid: gid_t) -> Option<Group> {
		self.by_id(gid)
	}

	/// `getgrgid_r`.
	pub fn getgrgid_r(&self, gid: gid_t) -> Result<Option<Group>> {
		self.by_id_r(gid)
	}

	/// `setgrent`.
	pub fn setgrent(&self) {
		self.setent();
	}

	/// `setgroupent`.
	pub fn setgroupent(&self, stayopen: bool) -> bool {
		self.set_stayopen(stayopen)
	}

	/// `endgrent`.
	pub fn endgrent(&self) {
		self.endent();
	}

	/// Groups `user` belongs to: `base_gid` first, then every group listing
	/// `user` as a member, without duplicates.
	///
	/// Scans with private states, so a `getgrent` enumeration in progress
	/// keeps its position.
	pub fn getgrouplist(&self, user: &str, base_gid: gid_t) -> Vec<gid_t> {
		let mut gids = vec![base_gid];
		for group in self.collect(&Backends::new(&self.path)) {
			if group.has_member(user) && !gids.contains(&group.gid) {
				gids.push(group.gid);
			}
		}
		gids
	}
}

/// Non-reentrant result: the entry on `SUCCESS`, nothing otherwise.
fn found<E: Entry>(status: NsStatus, lookup: Lookup<E>) -> Option<E> {
	if status == NsStatus::SUCCESS {
		return lookup.result;
	}
	if lookup.errno != 0 {
		debug!(database = E::DATABASE, ?status, errno = lookup.errno, "lookup failed");
	}
	None
}

/// Reentrant result: `NOTFOUND` and an unavailable source without an errno
/// are both `Ok(None)`.
fn reentrant<E: Entry>(status: NsStatus, lookup: Lookup<E>) -> Result<Option<E>> {
	if status == NsStatus::SUCCESS {
		return Ok(lookup.result);
	}
	if status == NsStatus::NOTFOUND || lookup.errno == 0 {
		return Ok(None);
	}
	Err(NssError::from_errno(E::DATABASE, lookup.errno))
}

fn stayopen_arg(args: &dyn Any) -> bool {
	args.downcast_ref::<Setent>().is_some_and(|s| s.stayopen)
}

fn set_result(cx: &NsContext<'_>, args: &mut dyn Any, started: io::Result<()>) -> NsStatus {
	let ok = match started {
		Ok(()) => true,
		Err(err) => {
			debug!(database = cx.database(), source = cx.source(), %err, "cannot start scan");
			false
		}
	};
	if let Some(setent) = args.downcast_mut::<Setent>() {
		setent.ok = ok;
	}
	if ok { NsStatus::SUCCESS } else { NsStatus::UNAVAIL }
}

fn busy(cx: &NsContext<'_>) -> NsStatus {
	trace!(database = cx.database(), source = cx.source(), "scan state already in use");
	NsStatus::UNAVAIL
}
