/// Turns user input into a filesystem-safe token: path separators and
/// whitespace become `_`, anything outside `[A-Za-z0-9._-]` is dropped, and
/// leading/trailing dots or underscores are stripped.
pub fn sanitize_name(raw: &str) -> Option<String> {
    let spaced: String = raw
        .chars()
        .filter(char::is_ascii)
        .map(|ch| if matches!(ch, '/' | '\\') { ' ' } else { ch })
        .collect();

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-'))
        .collect();

    let trimmed = kept.trim_matches(|ch| ch == '.' || ch == '_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::sanitize_name;
    use resume_search_core::is_valid_collection_name;

    #[test]
    fn produces_core_safe_names() -> Result<(), Box<dyn std::error::Error>> {
        let cases = [
            ("Q3 Backend Hires", "Q3_Backend_Hires"),
            ("../../etc/passwd", "etc_passwd"),
            ("café crème", "caf_crme"),
            ("  .hidden.v2  ", "hidden.v2"),
        ];

        for (raw, expected) in cases {
            let name = sanitize_name(raw).ok_or("name sanitized to nothing")?;
            assert_eq!(name, expected);
            assert!(is_valid_collection_name(&name));
        }
        Ok(())
    }

    #[test]
    fn rejects_names_with_nothing_left() {
        assert_eq!(sanitize_name(""), None);
        assert_eq!(sanitize_name("..."), None);
        assert_eq!(sanitize_name("日本語"), None);
    }
}
