//! Sender-identity equivalence — the `id|handle` allowlist matching rules
//! shared by every channel adapter and by the routing resolver's mapping
//! allowlist (§3.1 of the data model).
//!
//! Lives in `picoclaw-core` rather than `picoclaw-channels` because the
//! routing resolver (core) needs the exact same comparison the channel
//! adapters (which depend on core) use — core cannot depend on channels, so
//! this is the only shared ancestor. `picoclaw-channels` re-exports it.

/// A single identity token split into its numeric-id and handle parts.
///
/// `"123|alice"` yields `id = Some("123")`, `handle = Some("alice")`.
/// `"123"` yields `id = Some("123")`, `handle = None`.
/// `"@alice"` or `"alice"` yields `id = None`, `handle = Some("alice")`.
struct Token {
    id: Option<String>,
    handle: Option<String>,
}

fn parse_token(raw: &str) -> Token {
    let mut id = None;
    let mut handle = None;

    for part in raw.split('|') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if part.chars().all(|c| c.is_ascii_digit()) {
            id = Some(part.to_string());
        } else {
            handle = Some(part.trim_start_matches('@').to_lowercase());
        }
    }

    Token { id, handle }
}

/// Whether `sender` matches any entry in `allowlist`, treating `id|handle`
/// compound forms, bare numeric IDs, and bare (optionally `@`-prefixed,
/// case-folded) handles as equivalent in either position.
///
/// An empty `allowlist` allows everyone (the channel-adapter convention
/// carried over unchanged from the teacher's per-adapter `is_allowed`).
pub fn is_allowed(sender: &str, allowlist: &[String]) -> bool {
    if allowlist.is_empty() {
        return true;
    }

    let sender_token = parse_token(sender);

    for entry in allowlist {
        let entry_token = parse_token(entry);

        if let (Some(a), Some(b)) = (&sender_token.id, &entry_token.id) {
            if a == b {
                return true;
            }
        }
        if let (Some(a), Some(b)) = (&sender_token.handle, &entry_token.handle) {
            if a == b {
                return true;
            }
        }
    }

    false
}

/// Normalize a bot token read from config: trim whitespace and wrapping
/// quotes, strip an optional case-insensitive `Bot ` prefix.
pub fn normalize_token(raw: &str) -> String {
    let mut s = raw.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        s = &s[1..s.len() - 1];
    }
    let s = s.trim();
    if s.len() > 4 && s[..4].eq_ignore_ascii_case("bot ") {
        s[4..].trim().to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_allowlist_allows_everyone() {
        assert!(is_allowed("anyone", &[]));
    }

    #[test]
    fn test_compound_sender_matches_bare_id() {
        assert!(is_allowed("123|alice", &["123".to_string()]));
    }

    #[test]
    fn test_compound_sender_matches_bare_handle() {
        assert!(is_allowed("123|alice", &["@alice".to_string()]));
    }

    #[test]
    fn test_bare_id_matches_compound_allowlist_entry() {
        assert!(is_allowed("123", &["123|alice".to_string()]));
    }

    #[test]
    fn test_handle_case_folds() {
        assert!(is_allowed("123|Alice", &["@ALICE".to_string()]));
    }

    #[test]
    fn test_numeric_id_does_not_case_fold_spuriously() {
        assert!(!is_allowed("999", &["123".to_string()]));
    }

    #[test]
    fn test_denied_sender() {
        assert!(!is_allowed("999|stranger", &["123".to_string(), "@alice".to_string()]));
    }

    #[test]
    fn test_symmetric_equivalence_property() {
        let a = is_allowed("123|alice", &["123".to_string()]);
        let b = is_allowed("123|alice", &["@alice".to_string()]);
        let c = is_allowed("123", &["123|alice".to_string()]);
        assert!(a && b && c);
    }

    #[test]
    fn test_normalize_token_strips_bot_prefix() {
        assert_eq!(normalize_token("Bot abc123"), "abc123");
        assert_eq!(normalize_token("bot abc123"), "abc123");
    }

    #[test]
    fn test_normalize_token_strips_quotes_and_whitespace() {
        assert_eq!(normalize_token("  \"abc123\"  "), "abc123");
    }

    #[test]
    fn test_normalize_token_passthrough() {
        assert_eq!(normalize_token("plain-token"), "plain-token");
    }
}
