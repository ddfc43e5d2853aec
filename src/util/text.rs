use std::borrow::Cow;

/// Removes control characters from a display name.
///
/// Feed and category titles come from untrusted feed documents and user
/// input; a title carrying an ANSI escape sequence would otherwise be
/// rendered verbatim by terminal frontends. ESC-led CSI sequences are
/// dropped wholly (the introducer plus its parameter bytes), other
/// controls are dropped individually.
pub(crate) fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(char::is_control) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            // CSI sequence: ESC '[' params... final byte in @..=~
            if chars.peek() == Some(&'[') {
                chars.next();
                for seq in chars.by_ref() {
                    if ('\u{40}'..='\u{7e}').contains(&seq) {
                        break;
                    }
                }
            }
            continue;
        }
        if !c.is_control() {
            out.push(c);
        }
    }

    Cow::Owned(out)
}
