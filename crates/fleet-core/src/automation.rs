//! Automation addon status types and the chat text rules it relies on.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Addon Mode
// ============================================================================

/// Primary mode of a session's automation addon.
///
/// Team-join replies and the command loop run independently of this mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddonMode {
    #[default]
    Idle,
    Scraping,
    Messaging,
}

impl AddonMode {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scraping => "scraping",
            Self::Messaging => "messaging",
        }
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl fmt::Display for AddonMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ============================================================================
// Addon Status Snapshot
// ============================================================================

/// The active command loop of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLoopStatus {
    pub command: String,
    pub interval_secs: u64,
}

/// Read-only view of an addon, safe to hand to any reporting consumer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AddonStatus {
    pub mode: AddonMode,
    pub discovered: usize,
    pub processed: usize,
    pub team_join_enabled: bool,
    pub team_join_messages: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_loop: Option<CommandLoopStatus>,
}

impl AddonStatus {
    #[must_use]
    pub fn command_loop_active(&self) -> bool {
        self.command_loop.is_some()
    }
}

// ============================================================================
// Chat Rules
// ============================================================================

/// Text that marks a team-join announcement.
pub const TEAM_JOIN_MARKER: &str = " joined the team";

/// Markers (lowercase) of a kick caused by the account being online elsewhere.
pub const DUPLICATE_LOGIN_MARKERS: &[&str] = &[
    "already connected",
    "already online",
    "already logged in",
    "logged in from another location",
    "duplicate_login",
    "duplicate login",
];

/// Extracts the player name from a `<name> joined the team` line.
///
/// The name is the run of word characters (ASCII letters, digits and `_`)
/// immediately before the marker. Returns the first such match in the line.
pub fn parse_team_join(message: &str) -> Option<&str> {
    for (idx, _) in message.match_indices(TEAM_JOIN_MARKER) {
        let head = message.get(..idx)?;
        let start = head
            .char_indices()
            .rev()
            .take_while(|(_, c)| is_word_char(*c))
            .last()
            .map(|(i, _)| i);

        if let Some(start) = start {
            return head.get(start..);
        }
    }
    None
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Returns true when a kick reason says the account is already online elsewhere.
pub fn is_duplicate_login(reason: &str) -> bool {
    let lowered = reason.to_lowercase();
    DUPLICATE_LOGIN_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Fills a mass-message template and strips one leading slash.
///
/// `{player}` and `{message}` are each substituted once (first occurrence).
pub fn format_command(template: &str, player: &str, message: &str) -> String {
    let filled = template
        .replacen("{player}", player, 1)
        .replacen("{message}", message, 1);

    match filled.strip_prefix('/') {
        Some(rest) => rest.to_string(),
        None => filled,
    }
}

/// Key under which a player is tracked as processed.
#[must_use]
pub fn player_key(name: &str) -> String {
    name.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_team_join() {
        assert_eq!(parse_team_join("Steve_2 joined the team"), Some("Steve_2"));
        assert_eq!(
            parse_team_join("[Team] alex1 joined the team!"),
            Some("alex1")
        );
        assert_eq!(parse_team_join("alex left the team"), None);
        assert_eq!(parse_team_join(" joined the team"), None);
        assert_eq!(parse_team_join("hello"), None);
    }

    #[test]
    fn test_parse_team_join_ascii_names_only() {
        assert_eq!(parse_team_join("Zoë joined the team"), None);
        assert_eq!(parse_team_join("Žalex1 joined the team"), Some("alex1"));
        assert_eq!(parse_team_join("名前 joined the team"), None);
    }

    #[test]
    fn test_parse_team_join_skips_non_word_prefix() {
        // First marker has no name before it; the second one does.
        assert_eq!(
            parse_team_join("* joined the team, then bob joined the team"),
            Some("bob")
        );
    }

    #[test]
    fn test_duplicate_login_detection() {
        assert!(is_duplicate_login(
            "{\"text\":\"You are already connected to this proxy!\"}"
        ));
        assert!(is_duplicate_login("You logged in from another location"));
        assert!(is_duplicate_login("ALREADY ONLINE"));
        assert!(!is_duplicate_login("You have been banned"));
    }

    #[test]
    fn test_format_command_strips_slash() {
        assert_eq!(
            format_command("/msg {player} {message}", "alex1", "hi"),
            "msg alex1 hi"
        );
        assert_eq!(
            format_command("tell {player} {message}", "steve2", "yo"),
            "tell steve2 yo"
        );
    }

    #[test]
    fn test_format_command_substitutes_first_occurrence_only() {
        assert_eq!(
            format_command("/w {player} {message} {player}", "a", "b"),
            "w a b {player}"
        );
    }

    #[test]
    fn test_addon_status_defaults() {
        let status = AddonStatus::default();
        assert!(status.mode.is_idle());
        assert!(!status.command_loop_active());
        assert_eq!(AddonMode::Messaging.to_string(), "messaging");
    }
}
