//! The opaque command shape the rest of the crate routes by: an ordered
//! sequence of byte strings, with no interpretation beyond the verb and the
//! argument positions `KeyExtractor` cares about.

/// `[verb, arg1, arg2, ...]`.
pub type Command = Vec<Vec<u8>>;

/// Build a [`Command`] from string arguments. A small convenience for callers
/// (and tests) who don't already have byte strings on hand.
pub fn command(args: &[&str]) -> Command {
    args.iter().map(|a| a.as_bytes().to_vec()).collect()
}
