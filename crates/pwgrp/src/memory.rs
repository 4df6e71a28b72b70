//! Built-in source serving records held in memory.
//!
//! Registered under any source name (typically `nis` or `dns`), it answers
//! every passwd and group method for `passwd`, `passwd_compat`, `group` and
//! `group_compat`. Each database keeps its own enumeration cursor, rewound by
//! the `set*ent` and `end*ent` methods.

use std::any::Any;
use std::sync::Arc;

use nss_switch::{DB_GROUP, DB_GROUP_COMPAT, DB_PASSWD, DB_PASSWD_COMPAT, MethodEntry, NsStatus, NsSwitch, RegisterFn};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::args::{Setent, with_lookup};
use crate::entry::Entry;
use crate::group::Group;
use crate::passwd::Passwd;

/// Records and per-database cursors.
#[derive(Debug, Default)]
pub struct MemorySource {
	passwd: Vec<Passwd>,
	group: Vec<Group>,
	cursors: Mutex<FxHashMap<&'static str, usize>>,
}

/// Record types a [`MemorySource`] stores.
trait Stored: Entry {
	fn stored(src: &MemorySource) -> &[Self];
}

impl Stored for Passwd {
	fn stored(src: &MemorySource) -> &[Self] {
		&src.passwd
	}
}

impl Stored for Group {
	fn stored(src: &MemorySource) -> &[Self] {
		&src.group
	}
}

impl MemorySource {
	/// Creates a source serving `passwd` and `group` in the given order.
	pub fn new(passwd: Vec<Passwd>, group: Vec<Group>) -> Self {
		Self {
			passwd,
			group,
			cursors: Mutex::default(),
		}
	}

	/// Registration closure for [`NsSwitch::register_builtin`].
	pub fn register_fn(self: &Arc<Self>) -> RegisterFn {
		let this = Arc::clone(self);
		Arc::new(move |name: &str| {
			trace!(source = name, "registering memory source");
			this.methods()
		})
	}

	/// Installs this source in `switch` under `name`.
	pub fn install(self: &Arc<Self>, switch: &NsSwitch, name: &str) {
		switch.register_builtin(name, self.register_fn());
	}

	fn methods(self: &Arc<Self>) -> Vec<MethodEntry> {
		let mut out = Vec::new();
		for database in [DB_PASSWD, DB_PASSWD_COMPAT] {
			self.push_methods::<Passwd>(&mut out, database);
		}
		for database in [DB_GROUP, DB_GROUP_COMPAT] {
			self.push_methods::<Group>(&mut out, database);
		}
		out
	}

	fn push_methods<E: Stored>(self: &Arc<Self>, out: &mut Vec<MethodEntry>, database: &'static str) {
		let m = E::METHODS;
		for method in [m.getent, m.getent_r] {
			let this = Arc::clone(self);
			out.push(MethodEntry::shared(database, method, move |_, args| this.next::<E>(database, args)));
		}
		for method in [m.getnam, m.getnam_r, m.getid, m.getid_r] {
			let this = Arc::clone(self);
			out.push(MethodEntry::shared(database, method, move |_, args| this.search::<E>(args)));
		}
		for method in [m.setent, m.set_stayopen, m.endent] {
			let this = Arc::clone(self);
			out.push(MethodEntry::shared(database, method, move |_, args| this.rewind(database, args)));
		}
	}

	fn next<E: Stored>(&self, database: &'static str, args: &mut dyn Any) -> NsStatus {
		with_lookup::<E>(args, |lookup| {
			let records = E::stored(self);
			let mut cursors = self.cursors.lock();
			let pos = cursors.entry(database).or_default();
			while let Some(record) = records.get(*pos) {
				*pos += 1;
				if lookup.key.matches(record) {
					lookup.result = Some(record.clone());
					return NsStatus::SUCCESS;
				}
			}
			NsStatus::NOTFOUND
		})
	}

	fn search<E: Stored>(&self, args: &mut dyn Any) -> NsStatus {
		with_lookup::<E>(args, |lookup| match E::stored(self).iter().find(|r| lookup.key.matches(*r)) {
			Some(record) => {
				lookup.result = Some(record.clone());
				NsStatus::SUCCESS
			}
			None => NsStatus::NOTFOUND,
		})
	}

	fn rewind(&self, database: &'static str, args: &mut dyn Any) -> NsStatus {
		self.cursors.lock().insert(database, 0);
		if let Some(setent) = args.downcast_mut::<Setent>() {
			setent.ok = true;
		}
		NsStatus::SUCCESS
	}
}
