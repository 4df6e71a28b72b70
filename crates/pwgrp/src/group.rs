//! `group(5)` records.

use std::fmt;

use libc::gid_t;

/// One group.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Group {
	/// Group name.
	pub name: String,
	/// Group password or placeholder.
	pub passwd: String,
	/// Group id.
	pub gid: gid_t,
	/// Member login names.
	pub members: Vec<String>,
}

impl Group {
	/// Parses a `name:passwd:gid[:member,...]` line.
	pub fn parse(line: &str) -> Option<Self> {
		let mut fields = line.split(':');
		let name = fields.next().filter(|n| !n.is_empty() && !n.starts_with(['+', '-']))?;
		let passwd = fields.next()?;
		let gid = fields.next()?.parse().ok()?;
		let members = fields.next().map(split_members).unwrap_or_default();
		if fields.next().is_some() {
			return None;
		}
		Some(Group {
			name: name.to_string(),
			passwd: passwd.to_string(),
			gid,
			members,
		})
	}

	/// Returns true if `user` is listed as a member.
	pub fn has_member(&self, user: &str) -> bool {
		self.members.iter().any(|m| m == user)
	}
}

fn split_members(field: &str) -> Vec<String> {
	field
		.split(',')
		.map(str::trim)
		.filter(|m| !m.is_empty())
		.map(String::from)
		.collect()
}

impl fmt::Display for Group {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}:{}:{}", self.name, self.passwd, self.gid, self.members.join(","))
	}
}

/// Field overrides carried by a `+` or `-` group line.
///
/// Only the password and gid can be overridden; members always come from
/// the fetched record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupProto {
	/// Replacement password.
	pub passwd: Option<String>,
	/// Replacement gid.
	pub gid: Option<gid_t>,
}

impl GroupProto {
	/// Reads overrides from a directive line.
	pub fn parse(line: &str) -> Self {
		let mut fields = line.split(':').skip(1);
		Self {
			passwd: fields.next().filter(|p| !p.is_empty()).map(String::from),
			gid: fields.next().and_then(|g| g.parse().ok()),
		}
	}

	/// Overwrites every field of `grp` this prototype sets.
	pub fn apply(&self, grp: &mut Group) {
		if let Some(passwd) = &self.passwd {
			grp.passwd.clone_from(passwd);
		}
		if let Some(gid) = self.gid {
			grp.gid = gid;
		}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn parses_members() {
		let grp = Group::parse("wheel:*:0:root, alice,,bob").expect("line should parse");
		assert_eq!(grp.members, ["root", "alice", "bob"]);
		assert!(grp.has_member("alice"));
		assert_eq!(grp.to_string(), "wheel:*:0:root,alice,bob");

		let empty = Group::parse("nogroup:*:65533:").expect("line should parse");
		assert!(empty.members.is_empty());
		assert_eq!(Group::parse("staff:*:20").map(|g| g.gid), Some(20));
	}

	#[test]
	fn rejects_malformed_lines() {
		for line in ["", "wheel", "wheel:*", "wheel:*:zero:root", ":*:0:", "wheel:*:0:root:extra", "+admins:*:10:"] {
			assert_eq!(Group::parse(line), None, "{line:?}");
		}
	}

	#[test]
	fn proto_overrides_password_and_gid() {
		let proto = GroupProto::parse("+admins:x:500:ignored");
		let mut grp = Group::parse("admins:*:80:root").expect("line should parse");
		proto.apply(&mut grp);
		assert_eq!(grp.to_string(), "admins:x:500:root");
		assert_eq!(GroupProto::parse("+admins:"), GroupProto::default());
	}
}
