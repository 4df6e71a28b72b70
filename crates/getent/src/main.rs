//! `getent`-style front end.
//!
//! Prints entries in their file format, one per line. Exits 0 when every
//! key was found, 1 on a usage error and 2 when some key was not found.

mod cli;

use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use cli::{Cli, Database};
use nss_pwgrp::{Entry, NameServices};
use tracing::debug;

/// How a query ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
	Found,
	Usage,
	NotFound,
}

impl From<Outcome> for ExitCode {
	fn from(outcome: Outcome) -> Self {
		match outcome {
			Outcome::Found => ExitCode::SUCCESS,
			Outcome::Usage => ExitCode::from(1),
			Outcome::NotFound => ExitCode::from(2),
		}
	}
}

fn main() -> ExitCode {
	let cli = match Cli::try_parse() {
		Ok(cli) => cli,
		Err(err) => {
			let _ = err.print();
			return if err.use_stderr() { Outcome::Usage.into() } else { ExitCode::SUCCESS };
		}
	};

	setup_tracing(cli.verbose);

	let services = NameServices::new(cli.switch_config(), cli.db_paths());
	let mut out = io::stdout().lock();
	match run(&services, cli.database, &cli.keys, &mut out) {
		Ok(Outcome::Usage) => {
			eprintln!("nss-getent: netgroup needs at least one key");
			Outcome::Usage.into()
		}
		Ok(outcome) => outcome.into(),
		Err(err) if err.kind() == io::ErrorKind::BrokenPipe => ExitCode::SUCCESS,
		Err(err) => {
			eprintln!("nss-getent: {err}");
			Outcome::Usage.into()
		}
	}
}

fn run(services: &NameServices, database: Database, keys: &[String], out: &mut impl Write) -> io::Result<Outcome> {
	match database {
		Database::Passwd => query(&services.passwd, keys, out),
		Database::Group => query(&services.group, keys, out),
		Database::Netgroup => netgroups(services, keys, out),
	}
}

/// Enumerates `db`, or looks up each key by id if numeric and by name
/// otherwise.
fn query<E: Entry>(db: &nss_pwgrp::Database<E>, keys: &[String], out: &mut impl Write) -> io::Result<Outcome> {
	if keys.is_empty() {
		for entry in db.entries() {
			writeln!(out, "{entry}")?;
		}
		return Ok(Outcome::Found);
	}

	let mut outcome = Outcome::Found;
	for key in keys {
		let entry = match key.parse::<u32>() {
			Ok(id) => db.by_id(id),
			Err(_) => db.by_name(key),
		};
		match entry {
			Some(entry) => writeln!(out, "{entry}")?,
			None => {
				debug!(database = E::DATABASE, key = %key, "not found");
				outcome = Outcome::NotFound;
			}
		}
	}
	Ok(outcome)
}

/// Prints each netgroup with its expanded triples.
fn netgroups(services: &NameServices, keys: &[String], out: &mut impl Write) -> io::Result<Outcome> {
	if keys.is_empty() {
		return Ok(Outcome::Usage);
	}

	let table = services.netgroups().load();
	let mut outcome = Outcome::Found;
	for key in keys {
		if table.members(key).is_none() {
			debug!(netgroup = %key, "not found");
			outcome = Outcome::NotFound;
			continue;
		}
		write!(out, "{key}")?;
		for triple in table.triples(key) {
			write!(out, " {triple}")?;
		}
		writeln!(out)?;
	}
	Ok(outcome)
}

fn setup_tracing(verbose: bool) {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
		if verbose {
			EnvFilter::new("nss_switch=debug,nss_pwgrp=debug,nss_getent=debug")
		} else {
			EnvFilter::new("warn")
		}
	});

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(io::stderr)
		.init();
}
