use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A connected player
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerRosterEntry {
    pub name: String,
    pub identifier: String,
}

impl PlayerRosterEntry {
    pub fn new(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
        }
    }
}

const LISTING_MARKER: &str = "online:";

/// Leading player count of a `list` response, if present.
pub fn parse_player_count(response: &str) -> Option<usize> {
    response
        .trim_start()
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .and_then(|digits| digits.parse().ok())
}

/// Parses `<count> players online: name1 (id1) name2 (id2) ...`.
///
/// An empty listing yields an empty roster. Entries are split on `(` and
/// `)`, so a player name that itself contains a parenthesis is mis-split;
/// that case is not handled.
pub fn parse_roster(response: &str) -> Result<Vec<PlayerRosterEntry>> {
    let (_, mut rest) = response.split_once(LISTING_MARKER).ok_or_else(|| {
        Error::Protocol(format!("unrecognised list response: {:?}", response))
    })?;

    let mut entries = Vec::new();
    while let Some(open) = rest.find('(') {
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find(')') else {
            break;
        };

        let name = rest[..open].trim().trim_start_matches(',').trim();
        let identifier = after_open[..close].trim();
        if !name.is_empty() {
            entries.push(PlayerRosterEntry::new(name, identifier));
        }
        rest = &after_open[close + 1..];
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_players() {
        let roster = parse_roster("2 players online: Alice (id1) Bob (id2)").unwrap();
        assert_eq!(
            roster,
            vec![
                PlayerRosterEntry::new("Alice", "id1"),
                PlayerRosterEntry::new("Bob", "id2"),
            ]
        );
    }

    #[test]
    fn empty_listing_is_empty_roster() {
        assert!(parse_roster("0 players online: ").unwrap().is_empty());
        assert!(parse_roster("0 players online:").unwrap().is_empty());
    }

    #[test]
    fn tolerates_comma_separators() {
        let roster =
            parse_roster("2 players online: Alice (0a1b-2c), Bob (3d4e-5f)").unwrap();
        assert_eq!(roster[1], PlayerRosterEntry::new("Bob", "3d4e-5f"));
    }

    #[test]
    fn unrecognised_response_is_protocol_error() {
        assert!(matches!(
            parse_roster("Unknown command"),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn reads_player_count() {
        assert_eq!(parse_player_count("2 players online: Alice (id1)"), Some(2));
        assert_eq!(parse_player_count("players online:"), None);
    }
}
