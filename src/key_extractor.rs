//! Key extraction: which argument of a command tuple decides slot routing.
//!
//! Implemented as a small static lookup table keyed by lowercased verb,
//! rather than a long branching `match`, per the core's dispatch-table
//! design note.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::command::Command;
use crate::error::DispatchError;

#[derive(Clone, Copy)]
enum ExtractRule {
    /// `info`, `config`, `shutdown`, `slaveof`: cannot be routed to a single
    /// slot at all, in a pipeline or standalone.
    Forbidden,
    /// Key is `args[n]`, i.e. `command[1 + n]`.
    ArgIndex(usize),
    /// Key is the argument immediately following the literal `streams`
    /// token (case-insensitive search), as used by `XREAD`/`XREADGROUP`.
    StreamsToken,
    /// `MEMORY USAGE <key>`; any other `MEMORY` subcommand has no key.
    MemoryUsage,
}

fn rule_table() -> &'static HashMap<&'static str, ExtractRule> {
    static TABLE: OnceLock<HashMap<&'static str, ExtractRule>> = OnceLock::new();
    TABLE.get_or_init(|| {
        use ExtractRule::*;
        let mut table = HashMap::new();
        for verb in ["info", "config", "shutdown", "slaveof"] {
            table.insert(verb, Forbidden);
        }
        for verb in [
            "bitop", "object", "xgroup", "xinfo", "zdiff", "zinter", "zunion",
        ] {
            table.insert(verb, ArgIndex(1));
        }
        for verb in ["eval", "evalsha"] {
            table.insert(verb, ArgIndex(2));
        }
        for verb in ["xread", "xreadgroup"] {
            table.insert(verb, StreamsToken);
        }
        table.insert("memory", MemoryUsage);
        table
    })
}

fn lower_ascii(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).to_ascii_lowercase()
}

/// Extract the routing key from a single command.
///
/// Returns `Ok(None)` for commands that carry no key (e.g. `PING`, or
/// `MEMORY` subcommands other than `USAGE`), and `Err(InvalidClusterCommand)`
/// for verbs that can never be routed to a single slot.
pub fn extract(command: &Command) -> Result<Option<Vec<u8>>, DispatchError> {
    let Some(verb) = command.first() else {
        return Ok(None);
    };
    let verb = lower_ascii(verb);

    match rule_table().get(verb.as_str()).copied() {
        Some(ExtractRule::Forbidden) => Err(DispatchError::InvalidClusterCommand),
        Some(ExtractRule::ArgIndex(n)) => Ok(command.get(1 + n).cloned()),
        Some(ExtractRule::StreamsToken) => Ok(key_after_streams_token(command)),
        Some(ExtractRule::MemoryUsage) => Ok(memory_usage_key(command)),
        None => Ok(command.get(1).cloned()),
    }
}

fn key_after_streams_token(command: &Command) -> Option<Vec<u8>> {
    let pos = command
        .iter()
        .position(|arg| arg.eq_ignore_ascii_case(b"streams"))?;
    command.get(pos + 1).cloned()
}

fn memory_usage_key(command: &Command) -> Option<Vec<u8>> {
    let subcommand = command.get(1)?;
    if subcommand.eq_ignore_ascii_case(b"usage") {
        command.get(2).cloned()
    } else {
        None
    }
}

/// Extract the single slot shared by every command of a pipeline (or
/// transaction body), failing if the commands disagree or the pipeline is a
/// caller-submitted `MULTI`.
///
/// Returns `Ok(None)` when no command in the pipeline carries a key — the
/// caller then routes to an arbitrary connected pool.
pub fn extract_all(pipeline: &[Command]) -> Result<Option<u16>, DispatchError> {
    if let Some(first) = pipeline.first() {
        if first
            .first()
            .map(|verb| verb.eq_ignore_ascii_case(b"multi"))
            .unwrap_or(false)
        {
            return Err(DispatchError::NoSupportTransaction);
        }
    }

    let mut slot = None;
    for command in pipeline {
        if command.len() < 2 {
            continue;
        }
        if let Some(key) = extract(command)? {
            let this_slot = crate::hash::slot_of(&key);
            match slot {
                None => slot = Some(this_slot),
                Some(existing) if existing != this_slot => {
                    return Err(DispatchError::KeyMustSameSlot)
                }
                _ => {}
            }
        }
    }
    Ok(slot)
}
