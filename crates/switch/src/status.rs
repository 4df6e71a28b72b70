//! Dispatch status codes and source stop sets.

use bitflags::bitflags;

/// Bits of an [`NsStatus`] that belong to the public status space.
///
/// Anything above this mask is a private continuation bit a method may use to
/// talk to itself across calls; the engine strips those before returning.
pub const STATUS_MASK: u32 = 0xff;

bitflags! {
	/// Result of a single source method, and the per-source stop set.
	///
	/// A method returns exactly one public status (optionally OR'd with
	/// private bits). A configured source carries a set of statuses; when the
	/// returned status intersects that set the walk stops at that source.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct NsStatus: u32 {
		/// The source answered the query.
		const SUCCESS = 1 << 0;
		/// The source could not be consulted at all.
		const UNAVAIL = 1 << 1;
		/// The source was consulted and has no answer.
		const NOTFOUND = 1 << 2;
		/// The source is temporarily busy.
		const TRYAGAIN = 1 << 3;
	}
}

impl NsStatus {
	/// Builds a private continuation bit, numbered from zero.
	pub const fn private(bit: u32) -> Self {
		Self::from_bits_retain(1 << (8 + bit))
	}

	/// Drops private continuation bits.
	pub const fn public(self) -> Self {
		Self::from_bits_retain(self.bits() & STATUS_MASK)
	}

	/// Parses a status keyword as written in the switch configuration.
	pub fn from_keyword(word: &str) -> Option<Self> {
		const KEYWORDS: [(&str, NsStatus); 4] = [
			("success", NsStatus::SUCCESS),
			("notfound", NsStatus::NOTFOUND),
			("unavail", NsStatus::UNAVAIL),
			("tryagain", NsStatus::TRYAGAIN),
		];
		KEYWORDS
			.iter()
			.find(|(kw, _)| kw.eq_ignore_ascii_case(word))
			.map(|(_, status)| *status)
	}

	/// Returns the configuration keyword for a single public status.
	pub fn keyword(self) -> Option<&'static str> {
		match self.public() {
			s if s == Self::SUCCESS => Some("success"),
			s if s == Self::NOTFOUND => Some("notfound"),
			s if s == Self::UNAVAIL => Some("unavail"),
			s if s == Self::TRYAGAIN => Some("tryagain"),
			_ => None,
		}
	}
}

/// How the engine treats per-source stop sets during one walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Walk {
	/// Stop at the first source whose status intersects its stop set.
	#[default]
	FirstMatch,
	/// Invoke every configured source regardless of status.
	///
	/// Used by `set*ent`/`end*ent` style methods where every backend must
	/// reset or release its state.
	ForceAll,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn private_bits_are_stripped() {
		let status = NsStatus::NOTFOUND | NsStatus::private(3);
		assert_ne!(status, NsStatus::NOTFOUND);
		assert_eq!(status.public(), NsStatus::NOTFOUND);
	}

	#[test]
	fn keywords_are_case_insensitive() {
		assert_eq!(NsStatus::from_keyword("NotFound"), Some(NsStatus::NOTFOUND));
		assert_eq!(NsStatus::from_keyword("TRYAGAIN"), Some(NsStatus::TRYAGAIN));
		assert_eq!(NsStatus::from_keyword("maybe"), None);
		assert_eq!(NsStatus::UNAVAIL.keyword(), Some("unavail"));
		assert_eq!((NsStatus::UNAVAIL | NsStatus::SUCCESS).keyword(), None);
	}
}
