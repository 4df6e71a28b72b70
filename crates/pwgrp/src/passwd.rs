//! `passwd(5)` records.

use std::fmt;

use libc::{gid_t, uid_t};

/// One user account.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Passwd {
	/// Login name.
	pub name: String,
	/// Encrypted password or placeholder.
	pub passwd: String,
	/// User id.
	pub uid: uid_t,
	/// Primary group id.
	pub gid: gid_t,
	/// Login class (`master.passwd` layout only).
	pub class: String,
	/// Password change time (`master.passwd` layout only).
	pub change: i64,
	/// Account expiry time (`master.passwd` layout only).
	pub expire: i64,
	/// Full name and contact details.
	pub gecos: String,
	/// Home directory.
	pub dir: String,
	/// Login shell.
	pub shell: String,
}

impl Passwd {
	/// Parses a `passwd` line.
	///
	/// Accepts the 7-field `passwd(5)` layout and the 10-field
	/// `master.passwd(5)` layout. Returns `None` for anything else,
	/// including lines with an empty name or non-numeric ids.
	pub fn parse(line: &str) -> Option<Self> {
		let fields: Vec<&str> = line.split(':').collect();
		let (name, passwd, uid, gid) = (fields.first()?, fields.get(1)?, fields.get(2)?, fields.get(3)?);
		if name.is_empty() || name.starts_with(['+', '-']) {
			return None;
		}
		let mut pw = Passwd {
			name: name.to_string(),
			passwd: passwd.to_string(),
			uid: uid.parse().ok()?,
			gid: gid.parse().ok()?,
			..Passwd::default()
		};
		match fields.len() {
			7 => {
				pw.gecos = fields[4].to_string();
				pw.dir = fields[5].to_string();
				pw.shell = fields[6].to_string();
			}
			10 => {
				pw.class = fields[4].to_string();
				pw.change = parse_time(fields[5])?;
				pw.expire = parse_time(fields[6])?;
				pw.gecos = fields[7].to_string();
				pw.dir = fields[8].to_string();
				pw.shell = fields[9].to_string();
			}
			_ => return None,
		}
		Some(pw)
	}
}

fn parse_time(field: &str) -> Option<i64> {
	if field.is_empty() { Some(0) } else { field.parse().ok() }
}

impl fmt::Display for Passwd {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{}:{}:{}:{}:{}:{}:{}",
			self.name, self.passwd, self.uid, self.gid, self.gecos, self.dir, self.shell
		)
	}
}

/// Field overrides carried by a `+` or `-` passwd line.
///
/// Empty fields are wildcards and leave the fetched value alone.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PasswdProto {
	/// Replacement password.
	pub passwd: Option<String>,
	/// Replacement uid.
	pub uid: Option<uid_t>,
	/// Replacement gid.
	pub gid: Option<gid_t>,
	/// Replacement gecos.
	pub gecos: Option<String>,
	/// Replacement home directory.
	pub dir: Option<String>,
	/// Replacement shell.
	pub shell: Option<String>,
}

impl PasswdProto {
	/// Reads overrides from a directive line. Missing trailing fields are
	/// wildcards, so `+name` alone overrides nothing.
	pub fn parse(line: &str) -> Self {
		let fields: Vec<&str> = line.split(':').collect();
		let text = |idx: usize| fields.get(idx).filter(|f| !f.is_empty()).map(|f| f.to_string());
		let id = |idx: usize| fields.get(idx).and_then(|f| f.parse().ok());
		let (gecos, dir, shell) = if fields.len() == 10 { (7, 8, 9) } else { (4, 5, 6) };
		Self {
			passwd: text(1),
			uid: id(2),
			gid: id(3),
			gecos: text(gecos),
			dir: text(dir),
			shell: text(shell),
		}
	}

	/// Overwrites every field of `pw` this prototype sets.
	pub fn apply(&self, pw: &mut Passwd) {
		if let Some(passwd) = &self.passwd {
			pw.passwd.clone_from(passwd);
		}
		if let Some(uid) = self.uid {
			pw.uid = uid;
		}
		if let Some(gid) = self.gid {
			pw.gid = gid;
		}
		if let Some(gecos) = &self.gecos {
			pw.gecos.clone_from(gecos);
		}
		if let Some(dir) = &self.dir {
			pw.dir.clone_from(dir);
		}
		if let Some(shell) = &self.shell {
			pw.shell.clone_from(shell);
		}
	}
}
