//! Quoting helpers for the Nix expression language.

/// Quote `s` as a double-quoted Nix string literal.
pub fn string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Escape text for the body of an indented (`''`) Nix string.
pub fn indented(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('\'', Some('\'')) => {
                chars.next();
                out.push_str("'''");
            }
            // A lone quote right before an escaped `${` would fuse with it.
            ('\'', Some('$')) => out.push_str(r"''\'"),
            ('$', Some('{')) => out.push_str("''$"),
            (c, _) => out.push(c),
        }
    }
    out
}

/// Escape `s` for an indented string and indent every non-empty line by
/// `width` spaces. The trailing newline, if any, is dropped.
pub fn block(s: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    indented(s.trim_end_matches('\n'))
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{pad}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_plain() {
        assert_eq!(string("/home/agent"), "\"/home/agent\"");
    }

    #[test]
    fn string_escapes_quotes_and_backslashes() {
        assert_eq!(string(r#"a"b\c"#), r#""a\"b\\c""#);
    }

    #[test]
    fn string_escapes_interpolation_only() {
        assert_eq!(string("${HOME}"), "\"\\${HOME}\"");
        assert_eq!(string("$HOME"), "\"$HOME\"");
    }

    #[test]
    fn string_escapes_newlines() {
        assert_eq!(string("a\nb"), "\"a\\nb\"");
    }

    #[test]
    fn indented_escapes_terminator_and_interpolation() {
        assert_eq!(indented("it''s ${x}"), "it'''s ''${x}");
        assert_eq!(indented("it's $x"), "it's $x");
        assert_eq!(indented("'${x}"), r"''\'''${x}");
    }

    #[test]
    fn block_indents_non_empty_lines() {
        assert_eq!(block("a\n\nb\n", 4), "    a\n\n    b");
    }
}
