//! Shell quoting for generated scripts.

/// Quote a string for safe use as a single shell word.
///
/// Returns the string unchanged if it contains only safe characters
/// (alphanumeric, `-`, `_`, `.`, `/`, `:`, `@`, `=`). Otherwise wraps it in
/// single quotes with internal single quotes escaped. Empty strings return `''`.
pub fn quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars().all(|c| {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '@' | '=')
    }) {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

/// Join words into one command line, quoting each.
pub fn join<'a>(words: impl IntoIterator<Item = &'a str>) -> String {
    words.into_iter().map(quote).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_safe_passthrough() {
        assert_eq!(quote("claude"), "claude");
        assert_eq!(quote("/workspace"), "/workspace");
        assert_eq!(quote("agentbox:claude"), "agentbox:claude");
    }

    #[test]
    fn quote_wraps_unsafe() {
        assert_eq!(quote("claude --resume"), "'claude --resume'");
        assert_eq!(quote("$HOME"), "'$HOME'");
    }

    #[test]
    fn quote_escapes_single_quotes() {
        assert_eq!(quote("O'Brien"), "'O'\\''Brien'");
    }

    #[test]
    fn quote_empty_string() {
        assert_eq!(quote(""), "''");
    }

    #[test]
    fn join_quotes_each_word() {
        assert_eq!(
            join(["git", "config", "user.name", "Ada Lovelace"]),
            "git config user.name 'Ada Lovelace'"
        );
    }
}
