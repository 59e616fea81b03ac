use std::borrow::Cow;

/// Removes control characters from feed-supplied metadata.
///
/// Feed titles and descriptions come from arbitrary XML and end up in
/// terminals and log lines. Strips C0 controls (except tab, newline and
/// carriage return), DEL, and whole ANSI CSI/OSC escape sequences.
///
/// Returns `Cow::Borrowed` when nothing needs stripping.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let needs_strip = s.bytes().any(is_stripped_byte);
    if !needs_strip {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\x1b' => match chars.peek() {
                Some('[') => {
                    chars.next();
                    // CSI: parameters until a final byte in @..~
                    for c in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&c) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    chars.next();
                    // OSC: until BEL or ST (ESC \)
                    while let Some(c) = chars.next() {
                        if c == '\x07' {
                            break;
                        }
                        if c == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            },
            c if (c as u32) < 0x80 && is_stripped_byte(c as u8) => {}
            c => out.push(c),
        }
    }

    Cow::Owned(out)
}

fn is_stripped_byte(b: u8) -> bool {
    b == 0x1b || b == 0x7f || (b < 0x20 && b != b'\t' && b != b'\n' && b != b'\r')
}

/// Collapses runs of whitespace into single spaces and trims the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_input_is_borrowed() {
        let input = "Plain title\twith tab";
        assert!(matches!(strip_control_chars(input), Cow::Borrowed(_)));
    }

    #[test]
    fn test_strips_escape_sequences() {
        assert_eq!(strip_control_chars("\x1b[31mRed\x1b[0m Feed"), "Red Feed");
        assert_eq!(strip_control_chars("\x1b]0;title\x07Feed"), "Feed");
        assert_eq!(strip_control_chars("\x1b]8;;x\x1b\\Link"), "Link");
    }

    #[test]
    fn test_strips_c0_and_del_but_keeps_newlines() {
        assert_eq!(strip_control_chars("a\x00b\x7fc\nd"), "abc\nd");
    }

    #[test]
    fn test_keeps_non_ascii() {
        assert_eq!(strip_control_chars("日本語\x01ニュース"), "日本語ニュース");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Hello \n\t World  "), "Hello World");
        assert_eq!(collapse_whitespace("   "), "");
    }
}
