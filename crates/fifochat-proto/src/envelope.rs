//! The `[pid]-text` chat envelope codec.

use crate::{DecodeError, PeerId};

/// One decoded chat line: who sent it and what they said.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// The sending peer.
    pub sender: PeerId,
    /// Message text. May not contain a line break on the wire; a body
    /// containing one truncates at the first break on the consumer side.
    pub body: String,
}

impl Envelope {
    /// Creates an envelope from a sender and message body.
    pub fn new(sender: PeerId, body: impl Into<String>) -> Self {
        Self {
            sender,
            body: body.into(),
        }
    }

    /// Encodes the envelope as a single wire line: `[<pid>]-<body>\n`.
    ///
    /// No escaping is applied to the body.
    pub fn encode(&self) -> String {
        format!("[{}]-{}\n", self.sender, self.body)
    }

    /// Decodes a single wire line.
    ///
    /// The sender field is the first `[...]` group; its interior must be
    /// ASCII digits only and parse to an integer greater than zero. A `-`
    /// must follow the closing bracket; everything after that first `-` (up
    /// to but excluding the line break) is the body.
    pub fn decode(line: &str) -> Result<Self, DecodeError> {
        let line = line.strip_suffix('\n').unwrap_or(line);

        let open = line.find('[').ok_or(DecodeError::MissingFrame)?;
        let close = line[open + 1..]
            .find(']')
            .map(|i| open + 1 + i)
            .ok_or(DecodeError::MissingFrame)?;
        if close == open + 1 {
            return Err(DecodeError::EmptySender);
        }

        let field = &line[open + 1..close];
        if !field.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DecodeError::InvalidSender(field.to_string()));
        }
        let raw: u32 = field
            .parse()
            .map_err(|_| DecodeError::InvalidSender(field.to_string()))?;
        if raw == 0 {
            return Err(DecodeError::InvalidSender(field.to_string()));
        }

        let dash = line[close + 1..]
            .find('-')
            .map(|i| close + 1 + i)
            .ok_or(DecodeError::MissingSeparator)?;

        Ok(Self {
            sender: PeerId::new(raw),
            body: line[dash + 1..].to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_produces_framed_line() {
        let env = Envelope::new(PeerId::new(4242), "hola");
        assert_eq!(env.encode(), "[4242]-hola\n");
    }

    #[test]
    fn test_decode_round_trips_encode() {
        let env = Envelope::new(PeerId::new(17), "some chat text with [brackets]");
        assert_eq!(Envelope::decode(&env.encode()).unwrap(), env);
    }

    #[test]
    fn test_decode_accepts_line_without_trailing_newline() {
        let env = Envelope::decode("[8]-hi").unwrap();
        assert_eq!(env.sender, PeerId::new(8));
        assert_eq!(env.body, "hi");
    }

    #[test]
    fn test_decode_allows_empty_body() {
        let env = Envelope::decode("[8]-\n").unwrap();
        assert_eq!(env.body, "");
    }

    #[test]
    fn test_decode_body_may_contain_dashes_and_brackets() {
        let env = Envelope::decode("[99]-a-b-[c]\n").unwrap();
        assert_eq!(env.body, "a-b-[c]");
    }

    #[test]
    fn test_decode_rejects_missing_brackets() {
        assert_eq!(Envelope::decode("no frame here"), Err(DecodeError::MissingFrame));
        assert_eq!(Envelope::decode("[12-unclosed"), Err(DecodeError::MissingFrame));
    }

    #[test]
    fn test_decode_rejects_empty_sender() {
        assert_eq!(Envelope::decode("[]-text"), Err(DecodeError::EmptySender));
    }

    #[test]
    fn test_decode_rejects_non_digit_sender() {
        assert!(matches!(
            Envelope::decode("[12a]-text"),
            Err(DecodeError::InvalidSender(_))
        ));
        assert!(matches!(
            Envelope::decode("[-3]-text"),
            Err(DecodeError::InvalidSender(_))
        ));
    }

    #[test]
    fn test_decode_rejects_zero_sender() {
        assert!(matches!(
            Envelope::decode("[0]-text"),
            Err(DecodeError::InvalidSender(_))
        ));
    }

    #[test]
    fn test_decode_rejects_missing_separator() {
        assert_eq!(Envelope::decode("[12]text"), Err(DecodeError::MissingSeparator));
    }

    #[test]
    fn test_decode_separator_need_not_be_adjacent() {
        // The first `-` after `]` starts the body, matching line-oriented
        // consumers that scan rather than index.
        let env = Envelope::decode("[12]xx-body").unwrap();
        assert_eq!(env.body, "body");
    }
}
