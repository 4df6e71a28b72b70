//! Method argument values passed through the switch.
//!
//! Every source invoked for one call receives the same value as
//! `&mut dyn Any`:
//!
//! | methods | argument |
//! |---|---|
//! | `get*ent`, `get*nam`, `get*id` and their `_r` forms | [`Lookup<E>`] |
//! | `setpassent`, `setgroupent` | [`Setent`] |
//! | `set*ent`, `end*ent` | `()` |

use std::any::Any;

use nss_switch::NsStatus;

use crate::entry::Entry;

/// What a lookup is searching for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
	/// The next entry in enumeration order.
	Next,
	/// The entry with this name.
	Name(String),
	/// The entry with this numeric id.
	Id(u32),
}

impl Key {
	/// Returns true if `entry` satisfies this key.
	pub fn matches<E: Entry>(&self, entry: &E) -> bool {
		match self {
			Key::Next => true,
			Key::Name(name) => entry.name() == name,
			Key::Id(id) => entry.id() == *id,
		}
	}

	/// Returns true for keyed (non-enumerating) searches.
	pub fn is_search(&self) -> bool {
		!matches!(self, Key::Next)
	}
}

/// Argument and result slot for lookup methods.
#[derive(Debug, Clone)]
pub struct Lookup<E> {
	/// Search key.
	pub key: Key,
	/// Entry found by the source that returned `SUCCESS`.
	pub result: Option<E>,
	/// OS error number reported with a status other than `SUCCESS` or
	/// `NOTFOUND`; zero if none.
	pub errno: i32,
}

impl<E> Lookup<E> {
	/// Creates an empty slot for `key`.
	pub fn new(key: Key) -> Self {
		Self {
			key,
			result: None,
			errno: 0,
		}
	}
}

/// Argument for `setpassent` / `setgroupent`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Setent {
	/// Keep the backing file open across keyed lookups.
	pub stayopen: bool,
	/// Set by each source to whether it could start.
	pub ok: bool,
}

/// Runs `f` on the lookup slot if `args` holds one for `E`.
///
/// A mismatched argument type is a call-site bug and reports `UNAVAIL`.
pub fn with_lookup<E: Entry>(args: &mut dyn Any, f: impl FnOnce(&mut Lookup<E>) -> NsStatus) -> NsStatus {
	match args.downcast_mut::<Lookup<E>>() {
		Some(lookup) => f(lookup),
		None => NsStatus::UNAVAIL,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::Passwd;

	#[test]
	fn keys_match_by_name_or_id() {
		let pw = Passwd {
			name: "alice".into(),
			uid: 1000,
			..Passwd::default()
		};
		assert!(Key::Next.matches(&pw));
		assert!(Key::Name("alice".into()).matches(&pw));
		assert!(!Key::Name("bob".into()).matches(&pw));
		assert!(Key::Id(1000).matches(&pw));
		assert!(!Key::Id(0).matches(&pw));
	}

	#[test]
	fn wrong_argument_type_is_unavailable() {
		let mut args = Setent::default();
		let status = with_lookup::<Passwd>(&mut args, |_| NsStatus::SUCCESS);
		assert_eq!(status, NsStatus::UNAVAIL);
	}
}
