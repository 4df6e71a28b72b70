//! `files` source and adapter behaviour over plain flat files.

use std::fs;
use std::sync::Arc;
use std::thread;

use nss_pwgrp::{DbPaths, NameServices};
use nss_switch::{DB_PASSWD, MethodEntry, NsStatus, SwitchConfig};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const PASSWD: &str = "\
root:*:0:0:Charlie &:/root:/bin/sh
+alice::::::
this line is not a record
bob:*:1001:100:Bob:/home/bob:/bin/sh
-carol
daemon:*:1:1:0:0:0:The devil himself:/:/sbin/nologin
";

const GROUP: &str = "\
wheel:*:0:root,alice
staff:*:50: alice , bob
users:*:100:bob,alice
";

fn services(conf: &str, files: &[(&str, &str)]) -> (TempDir, NameServices) {
	let _ = tracing_subscriber::fmt::try_init();
	let dir = tempfile::tempdir().expect("temp dir should be creatable");
	let conf_path = dir.path().join("nsswitch.conf");
	fs::write(&conf_path, conf).expect("config should be writable");
	for (name, contents) in files {
		fs::write(dir.path().join(name), contents).expect("fixture file should be writable");
	}
	let services = NameServices::new(
		SwitchConfig {
			conf_path,
			module_dir: None,
		},
		DbPaths::in_dir(dir.path()),
	);
	(dir, services)
}

fn user_names(services: &NameServices) -> Vec<String> {
	services.passwd.entries().into_iter().map(|pw| pw.name).collect()
}

#[test]
fn files_skips_directives_and_malformed_lines() {
	let (_dir, ns) = services("passwd: files\n", &[("passwd", PASSWD)]);

	assert_eq!(user_names(&ns), vec!["root", "bob", "daemon"]);
	assert_eq!(ns.passwd.getpwnam("alice"), None);
	assert_eq!(ns.passwd.getpwuid(1001).map(|pw| pw.dir).as_deref(), Some("/home/bob"));

	let daemon = ns.passwd.getpwnam("daemon").expect("master.passwd layout should parse");
	assert_eq!(daemon.gecos, "The devil himself");
	assert_eq!(daemon.to_string(), "daemon:*:1:1:The devil himself:/:/sbin/nologin");
}

#[test]
fn compat_without_directives_matches_files() {
	let plain = PASSWD.lines().filter(|l| !l.starts_with(['+', '-'])).collect::<Vec<_>>().join("\n");
	let (_dir, ns) = services("group: files\n", &[("passwd", &plain)]);

	// passwd is unconfigured, so the compat default serves it.
	assert_eq!(user_names(&ns), vec!["root", "bob", "daemon"]);
	assert_eq!(ns.passwd.getpwuid(0).map(|pw| pw.name).as_deref(), Some("root"));
}

#[test]
fn getent_and_getent_r_share_one_cursor() {
	let (_dir, ns) = services("passwd: files\n", &[("passwd", PASSWD)]);
	let db = &ns.passwd;

	assert_eq!(db.getpwent().map(|pw| pw.name).as_deref(), Some("root"));
	let next = db.getpwent_r().expect("enumeration should not fail");
	assert_eq!(next.map(|pw| pw.name).as_deref(), Some("bob"));
	assert_eq!(db.getpwent().map(|pw| pw.name).as_deref(), Some("daemon"));
	assert_eq!(db.getpwent(), None);
	assert_eq!(db.getpwent(), None);

	db.setpwent();
	assert_eq!(db.getpwent().map(|pw| pw.name).as_deref(), Some("root"));
	db.endpwent();
	assert_eq!(db.getpwent().map(|pw| pw.name).as_deref(), Some("root"));
}

#[test]
fn missing_file_is_an_error_only_for_reentrant_lookups() {
	let (_dir, ns) = services("passwd: files\ngroup: files\n", &[]);

	assert_eq!(ns.passwd.getpwnam("root"), None);
	assert!(!ns.passwd.setpassent(true));

	let err = ns.passwd.getpwnam_r("root").expect_err("missing file should surface");
	assert_eq!(err.errno(), libc::ENOENT);
	assert_eq!(err.database, "passwd");
	assert!(ns.group.getgrgid_r(0).is_err());
}

#[test]
fn stay_open_lookups_keep_working() {
	let (_dir, ns) = services("passwd: files\n", &[("passwd", PASSWD)]);

	assert!(ns.passwd.setpassent(true));
	assert_eq!(ns.passwd.getpwnam("bob").map(|pw| pw.uid), Some(1001));
	assert_eq!(ns.passwd.getpwuid(0).map(|pw| pw.name).as_deref(), Some("root"));
	assert!(ns.passwd.setpassent(false));
	assert_eq!(ns.passwd.getpwnam("nobody"), None);
}

#[test]
fn group_lookups_and_grouplist() {
	let (_dir, ns) = services("group: files\n", &[("group", GROUP)]);

	let staff = ns.group.getgrnam("staff").expect("staff should exist");
	assert_eq!(staff.members, vec!["alice", "bob"]);
	assert_eq!(ns.group.getgrgid(100).map(|g| g.name).as_deref(), Some("users"));
	assert_eq!(ns.group.getgrnam_r("nogroup").expect("lookup should not fail"), None);

	assert_eq!(ns.group.getgrouplist("alice", 100), vec![100, 0, 50]);
	assert_eq!(ns.group.getgrouplist("nobody", 65534), vec![65534]);
	assert!(ns.group.setgroupent(false));
	assert_eq!(ns.group.getgrent().map(|g| g.name).as_deref(), Some("wheel"));
	ns.group.endgrent();
}

#[test]
fn grouplist_keeps_enumeration_position() {
	let (_dir, ns) = services("group: files\n", &[("group", GROUP)]);

	assert_eq!(ns.group.getgrent().map(|g| g.name).as_deref(), Some("wheel"));
	assert_eq!(ns.group.getgrouplist("bob", 100), vec![100, 50]);
	assert_eq!(ns.group.getgrent().map(|g| g.name).as_deref(), Some("staff"));
	assert_eq!(ns.group.getgrent().map(|g| g.name).as_deref(), Some("users"));
	assert_eq!(ns.group.getgrent(), None);
}

#[test]
fn concurrent_enumeration_returns_each_entry_once() {
	let passwd: String = (0..200).map(|i| format!("user{i}:*:{}:100:User {i}:/home/user{i}:/bin/sh\n", 2000 + i)).collect();
	let (_dir, ns) = services("passwd: files\n", &[("passwd", &passwd)]);

	let mut seen: Vec<String> = thread::scope(|scope| {
		let workers: Vec<_> = (0..4)
			.map(|_| {
				scope.spawn(|| {
					let mut names = Vec::new();
					while let Some(pw) = ns.passwd.getpwent() {
						names.push(pw.name);
					}
					names
				})
			})
			.collect();
		workers
			.into_iter()
			.flat_map(|w| w.join().expect("worker should not panic"))
			.collect()
	});
	seen.sort();

	let mut expected: Vec<String> = (0..200).map(|i| format!("user{i}")).collect();
	expected.sort();
	assert_eq!(seen, expected);
}

#[test]
fn errno_recorded_by_a_source_reaches_reentrant_lookups() {
	let (_dir, ns) = services("passwd: nis\n", &[]);
	ns.switch.register_builtin(
		"nis",
		Arc::new(|_: &str| {
			vec![MethodEntry::shared(DB_PASSWD, "getpwnam_r", |_, _| {
				nss_switch::set_errno(libc::EIO);
				NsStatus::UNAVAIL
			})]
		}),
	);

	let err = ns.passwd.getpwnam_r("root").expect_err("recorded errno should surface");
	assert_eq!(err.errno(), libc::EIO);
	assert_eq!(nss_switch::take_errno(), 0);
	assert_eq!(ns.passwd.getpwnam_r("root").expect_err("every call reports").errno(), libc::EIO);
}
