//! Switch configuration parsing.
//!
//! One logical line per database:
//!
//! ```text
//! # comment
//! passwd: compat
//! passwd_compat: nis
//! hosts: files dns [NOTFOUND=return] nis
//! group: files \
//!        nis
//! ```
//!
//! Each source stops the walk on `success` unless its criteria say
//! otherwise. `STATUS=return` adds a status to the source's stop set and
//! `STATUS=continue` removes it. Problems are collected as
//! [`ConfigWarning`]s; parsing itself never fails.

use std::path::Path;

use tracing::warn;

use crate::error::{ConfigError, ConfigWarning, Result, WarningKind};
use crate::source::{NsDbt, NsSrc, SourceTable};
use crate::status::NsStatus;

/// Parsed switch configuration.
#[derive(Debug, Clone, Default)]
pub struct ParsedConfig {
	/// Configured databases.
	pub sources: SourceTable,
	/// Non-fatal problems, in line order.
	pub warnings: Vec<ConfigWarning>,
}

/// Reads and parses a configuration file.
pub fn load(path: &Path) -> Result<ParsedConfig> {
	let content = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
		path: path.to_path_buf(),
		error,
	})?;
	let parsed = parse_str(&content);
	for warning in &parsed.warnings {
		warn!(path = %path.display(), %warning, "switch configuration");
	}
	Ok(parsed)
}

/// Parses configuration text.
pub fn parse_str(input: &str) -> ParsedConfig {
	let mut parsed = ParsedConfig::default();
	for (line, text) in logical_lines(input) {
		if let Err(kind) = parse_line(&text, &mut parsed, line) {
			parsed.warnings.push(ConfigWarning { line, kind });
		}
	}
	parsed
}

/// Joins `\`-continued lines and strips comments.
///
/// Yields the starting line number and the text of each non-blank logical line.
fn logical_lines(input: &str) -> Vec<(usize, String)> {
	let mut out = Vec::new();
	let mut pending: Option<(usize, String)> = None;

	for (idx, raw) in input.lines().enumerate() {
		let text = raw.split('#').next().unwrap_or_default().trim_end();
		let (text, continued) = match text.strip_suffix('\\') {
			Some(head) => (head, true),
			None => (text, false),
		};

		let (start, mut acc) = pending.take().unwrap_or_else(|| (idx + 1, String::new()));
		acc.push(' ');
		acc.push_str(text);

		if continued {
			pending = Some((start, acc));
		} else if !acc.trim().is_empty() {
			out.push((start, acc));
		}
	}
	if let Some((start, acc)) = pending.filter(|(_, acc)| !acc.trim().is_empty()) {
		out.push((start, acc));
	}
	out
}

fn parse_line(text: &str, parsed: &mut ParsedConfig, line: usize) -> std::result::Result<(), WarningKind> {
	let Some((name, rest)) = text.split_once(':') else {
		return Err(WarningKind::MissingColon(text.trim().to_string()));
	};
	let name = name.trim();
	if name.is_empty() {
		return Err(WarningKind::EmptyDatabase);
	}

	let mut dbt = NsDbt::new(name);
	let mut current: Option<NsSrc> = None;
	let mut chars = rest.char_indices().peekable();

	while let Some(&(start, ch)) = chars.peek() {
		if ch.is_whitespace() {
			chars.next();
			continue;
		}

		if ch == '[' {
			let body_start = start + 1;
			let close = rest[body_start..].find(']').map(|off| body_start + off);
			let Some(close) = close else {
				flush(&mut dbt, current.take(), parsed, line);
				return finish(dbt, parsed, Some(WarningKind::UnterminatedCriteria));
			};
			match current.as_mut() {
				Some(src) => apply_criteria(src, &rest[body_start..close], parsed, line),
				None => parsed.warnings.push(ConfigWarning {
					line,
					kind: WarningKind::DanglingCriteria,
				}),
			}
			while chars.next_if(|&(idx, _)| idx <= close).is_some() {}
			continue;
		}

		let mut end = rest.len();
		while let Some(&(idx, c)) = chars.peek() {
			if c.is_whitespace() || c == '[' {
				end = idx;
				break;
			}
			chars.next();
		}
		flush(&mut dbt, current.take(), parsed, line);
		current = Some(NsSrc::named(&rest[start..end]));
	}

	flush(&mut dbt, current.take(), parsed, line);
	finish(dbt, parsed, None)
}

fn flush(dbt: &mut NsDbt, src: Option<NsSrc>, parsed: &mut ParsedConfig, line: usize) {
	let Some(src) = src else {
		return;
	};
	let name = src.name().to_string();
	if !dbt.add_source(src) {
		parsed.warnings.push(ConfigWarning {
			line,
			kind: WarningKind::DuplicateSource {
				database: dbt.name().to_string(),
				name,
			},
		});
	}
}

fn finish(dbt: NsDbt, parsed: &mut ParsedConfig, trailing: Option<WarningKind>) -> std::result::Result<(), WarningKind> {
	if dbt.sources().is_empty() {
		return Err(trailing.unwrap_or_else(|| WarningKind::NoSources(dbt.name().to_string())));
	}
	parsed.sources.put(dbt);
	trailing.map_or(Ok(()), Err)
}

fn apply_criteria(src: &mut NsSrc, body: &str, parsed: &mut ParsedConfig, line: usize) {
	let spaced = body.replace('=', " = ");
	let mut tokens = spaced.split_whitespace();

	while let Some(status) = tokens.next() {
		let (Some("="), Some(action)) = (tokens.next(), tokens.next()) else {
			parsed.warnings.push(ConfigWarning {
				line,
				kind: WarningKind::MalformedCriterion(body.trim().to_string()),
			});
			return;
		};
		let Some(status) = NsStatus::from_keyword(status) else {
			parsed.warnings.push(ConfigWarning {
				line,
				kind: WarningKind::UnknownStatus(status.to_string()),
			});
			continue;
		};
		if action.eq_ignore_ascii_case("return") {
			src.set_stop(status, true);
		} else if action.eq_ignore_ascii_case("continue") {
			src.set_stop(status, false);
		} else {
			parsed.warnings.push(ConfigWarning {
				line,
				kind: WarningKind::UnknownAction(action.to_string()),
			});
		}
	}
}
