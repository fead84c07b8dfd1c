//! Helper functions for wrapping text and padding strings

const ELLIPSIS: &str = "...";

/// Wrap each line of `s` to `width` columns. At most `max_line_wrap`
/// physical lines are produced per input line (0 = unlimited); truncated
/// content ends with an ellipsis. Wrapped continuation lines are indented
/// with `wrap_prefix`.
pub fn wrap_lines(s: &str, width: usize, max_line_wrap: usize, wrap_prefix: &str) -> String {
    if width == 0 {
        let mut out = String::with_capacity(s.len() + 1);
        for line in s.lines() {
            out.push_str(line);
            out.push('\n');
        }
        return out;
    }

    let mut out = String::with_capacity(s.len() + 16);
    for line in s.lines() {
        write_line_wrapped(&mut out, line, width, max_line_wrap, wrap_prefix);
    }
    out
}

fn write_line_wrapped(
    out: &mut String,
    line: &str,
    width: usize,
    max_line_wrap: usize,
    wrap_prefix: &str,
) {
    if line.chars().count() <= width {
        out.push_str(line);
        out.push('\n');
        return;
    }

    // Continuation lines lose the prefix width.
    let cont_width = width.saturating_sub(wrap_prefix.chars().count()).max(1);

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in line.split_whitespace() {
        let mut word = word;
        loop {
            let budget = if chunks.is_empty() { width } else { cont_width };
            let word_len = word.chars().count();
            let cur_len = current.chars().count();

            if current.is_empty() {
                if word_len <= budget {
                    current.push_str(word);
                    break;
                }
                // Force a break if the word is longer than the width.
                let split = word
                    .char_indices()
                    .nth(budget)
                    .map(|(i, _)| i)
                    .unwrap_or(word.len());
                chunks.push(word[..split].to_string());
                word = &word[split..];
                continue;
            }

            if cur_len + 1 + word_len <= budget {
                current.push(' ');
                current.push_str(word);
                break;
            }
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    for (i, chunk) in chunks.iter().enumerate() {
        let prefix = if i == 0 { "" } else { wrap_prefix };
        let capped = max_line_wrap > 0 && i == max_line_wrap - 1;

        if capped && i < chunks.len() - 1 {
            // Not done with the string; make room for the ellipsis.
            let budget = if i == 0 { width } else { cont_width };
            let keep = budget.saturating_sub(ELLIPSIS.len());
            let truncated: String = chunk.chars().take(keep).collect();
            out.push_str(prefix);
            out.push_str(&truncated);
            out.push_str(ELLIPSIS);
            out.push('\n');
            return;
        }

        out.push_str(prefix);
        out.push_str(chunk);
        out.push('\n');
        if capped {
            return;
        }
    }
}

/// Pad the string to the given visible length, keeping ANSI escape
/// sequences intact. Visible content beyond the length is dropped.
pub(crate) fn pad_visible(s: &str, length: usize) -> String {
    let mut out = String::with_capacity(length + s.len());
    let mut visible = 0;

    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            out.push(c);
            for e in chars.by_ref() {
                out.push(e);
                if e == 'm' {
                    break;
                }
            }
            continue;
        }
        if visible < length {
            out.push(c);
            visible += 1;
        }
    }

    for _ in visible..length {
        out.push(' ');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Visible length of a string, ignoring ANSI escape sequences.
    fn visible_len(s: &str) -> usize {
        let mut len = 0;
        let mut in_escape = false;
        for c in s.chars() {
            if c == '\x1b' {
                in_escape = true;
            } else if in_escape {
                if c == 'm' {
                    in_escape = false;
                }
            } else {
                len += 1;
            }
        }
        len
    }

    #[test]
    fn test_wrap_short_line_unchanged() {
        assert_eq!(wrap_lines("hello", 10, 3, "  "), "hello\n");
    }

    #[test]
    fn test_wrap_breaks_on_words() {
        let wrapped = wrap_lines("one two three four", 9, 0, "");
        assert_eq!(wrapped, "one two\nthree\nfour\n");
    }

    #[test]
    fn test_wrap_prefix_on_continuation_lines() {
        let wrapped = wrap_lines("alpha beta gamma", 11, 0, "  ");
        assert_eq!(wrapped, "alpha beta\n  gamma\n");
    }

    #[test]
    fn test_wrap_caps_lines_with_ellipsis() {
        let wrapped = wrap_lines("aa bb cc dd ee ff gg hh", 5, 3, "");
        let lines: Vec<&str> = wrapped.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].ends_with("..."));
    }

    #[test]
    fn test_wrap_force_breaks_long_words() {
        let wrapped = wrap_lines("abcdefghij", 4, 0, "");
        assert_eq!(wrapped, "abcd\nefgh\nij\n");
    }

    #[test]
    fn test_wrap_zero_width_disables_wrapping() {
        assert_eq!(wrap_lines("a very long line indeed", 0, 3, ""), "a very long line indeed\n");
    }

    #[test]
    fn test_pad_visible_plain() {
        assert_eq!(pad_visible("ab", 5), "ab   ");
        assert_eq!(pad_visible("abcdef", 4), "abcd");
    }

    #[test]
    fn test_pad_visible_keeps_ansi() {
        let colored = "\x1b[32mok\x1b[0m";
        let padded = pad_visible(colored, 4);
        assert!(padded.starts_with("\x1b[32mok\x1b[0m"));
        assert_eq!(visible_len(&padded), 4);
    }

    #[test]
    fn test_visible_len_ignores_escapes() {
        assert_eq!(visible_len("\x1b[31mError\x1b[0m"), 5);
    }
}
