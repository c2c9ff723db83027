//! Report line codec and the `reportar` command grammar.
//!
//! The report channel carries only integers, so its framing is simpler than
//! the chat envelope: one bare decimal target id per line.

use crate::{DecodeError, PeerId};

/// Command prefix a peer uses to report another peer, space included.
const REPORT_PREFIX: &str = "reportar ";

/// Encodes a report line for the moderator channel: `<targetId>\n`.
pub fn encode_report(target: PeerId) -> String {
    format!("{target}\n")
}

/// Decodes one report line into a target peer id.
///
/// The line must be a bare positive decimal integer, surrounding whitespace
/// tolerated. Anything else is rejected.
pub fn decode_report(line: &str) -> Result<PeerId, DecodeError> {
    let field = line.trim();
    let reject = || DecodeError::InvalidReportTarget(field.to_string());

    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(reject());
    }
    let raw: u32 = field.parse().map_err(|_| reject())?;
    if raw == 0 {
        return Err(reject());
    }
    Ok(PeerId::new(raw))
}

/// Outcome of matching a chat body against the report command grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportCommand {
    /// `reportar <positive-integer>` — forward this target to the moderator.
    Target(PeerId),
    /// The `reportar ` prefix matched but the target is unusable. The
    /// command is still consumed: it is never rebroadcast as chat.
    Invalid,
}

/// Matches a message body against the `reportar <pid>` grammar.
///
/// Returns `None` for ordinary chat text. Bodies with the prefix are always
/// commands; whether they carry a usable target is the variant.
pub fn parse_report_command(body: &str) -> Option<ReportCommand> {
    let rest = body.strip_prefix(REPORT_PREFIX)?;
    match rest.trim().parse::<u32>() {
        Ok(raw) if raw > 0 => Some(ReportCommand::Target(PeerId::new(raw))),
        _ => Some(ReportCommand::Invalid),
    }
}
