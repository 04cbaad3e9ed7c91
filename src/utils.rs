/// Characters allowed verbatim in free-text shown in tooltips. Anything
/// else arrives from uploaded files and is not trusted as markup.
fn is_allowed(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, ' ' | '.' | ',' | ';' | ':' | '(' | ')' | '-' | '_' | '/')
}

/// Collapse every run of disallowed characters in a motivation string to
/// a single line break.
pub fn sanitize_motivation(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_disallowed_run = false;
    for c in raw.chars() {
        if is_allowed(c) {
            out.push(c);
            in_disallowed_run = false;
        } else if !in_disallowed_run {
            out.push('\n');
            in_disallowed_run = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(
            sanitize_motivation("Put niet gevonden, deksel vast."),
            "Put niet gevonden, deksel vast."
        );
    }

    #[test]
    fn test_markup_collapses_to_line_breaks() {
        assert_eq!(
            sanitize_motivation("<script>alert(1)</script>"),
            "\nscript\nalert(1)\n/script\n"
        );
    }

    #[test]
    fn test_run_of_disallowed_becomes_single_break() {
        assert_eq!(sanitize_motivation("a=>&\"b"), "a\nb");
    }

    #[test]
    fn test_unicode_letters_are_kept() {
        assert_eq!(sanitize_motivation("rioolput één"), "rioolput één");
    }
}
