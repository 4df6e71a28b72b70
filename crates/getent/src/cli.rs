use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use nss_pwgrp::DbPaths;
use nss_switch::SwitchConfig;

#[derive(Parser, Debug)]
#[command(name = "nss-getent")]
#[command(about = "Query passwd, group and netgroup through the name-service switch")]
#[command(version)]
/// Command-line arguments.
pub struct Cli {
	/// Database to query
	#[arg(value_enum)]
	pub database: Database,

	/// Names or numeric ids to look up (enumerates the database if omitted)
	pub keys: Vec<String>,

	/// Switch configuration file
	#[arg(long, value_name = "PATH")]
	pub config: Option<PathBuf>,

	/// passwd file for the files and compat sources
	#[arg(long, value_name = "PATH")]
	pub passwd: Option<PathBuf>,

	/// group file for the files and compat sources
	#[arg(long, value_name = "PATH")]
	pub group: Option<PathBuf>,

	/// netgroup file
	#[arg(long, value_name = "PATH")]
	pub netgroup: Option<PathBuf>,

	/// Directory holding source modules (empty disables loading)
	#[arg(long, value_name = "PATH")]
	pub module_dir: Option<OsString>,

	/// Verbose logging
	#[arg(short, long)]
	pub verbose: bool,
}

/// Queryable databases.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Database {
	/// User accounts
	Passwd,
	/// Groups
	Group,
	/// Netgroups
	Netgroup,
}

impl Cli {
	/// Switch settings from the environment, overridden by flags.
	pub fn switch_config(&self) -> SwitchConfig {
		let mut config = SwitchConfig::from_env();
		if let Some(path) = &self.config {
			config.conf_path.clone_from(path);
		}
		if let Some(dir) = &self.module_dir {
			config.module_dir = (!dir.is_empty()).then(|| PathBuf::from(dir));
		}
		config
	}

	/// File locations from the environment, overridden by flags.
	pub fn db_paths(&self) -> DbPaths {
		let mut paths = DbPaths::from_env();
		for (flag, slot) in [
			(&self.passwd, &mut paths.passwd),
			(&self.group, &mut paths.group),
			(&self.netgroup, &mut paths.netgroup),
		] {
			if let Some(path) = flag {
				slot.clone_from(path);
			}
		}
		paths
	}
}
