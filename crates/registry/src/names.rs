pub const MAX_NAME_CHARS: usize = 30;

/// Keeps ASCII alphanumerics, apostrophes, hyphens and underscores with single
/// interior spaces, limited to `MAX_NAME_CHARS`.
pub fn sanitize(name: &str) -> String {
    let filtered: String = name
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '\'' | '-' | '_' | ' '))
        .collect();
    let squished = filtered.split_whitespace().collect::<Vec<_>>().join(" ");
    squished
        .chars()
        .take(MAX_NAME_CHARS)
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Uniqueness key: the sanitized name, lower-cased.
pub fn name_key(name: &str) -> String {
    sanitize(name).to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_apostrophes_and_collapses_spaces() {
        assert_eq!(sanitize("D'Arcy"), "D'Arcy");
        assert_eq!(sanitize("    a    b    c   "), "a b c");
        assert_eq!(sanitize("tab\tand\nnewline"), "tab and newline");
    }

    #[test]
    fn strips_markup_and_punctuation() {
        assert_eq!(sanitize("<img src='picture.jpg' />"), "img src'picturejpg'");
        assert_eq!(sanitize("'); comment--;"), "' comment--");
        assert_eq!(sanitize("a < b"), "a b");
    }

    #[test]
    fn truncates_to_thirty_characters() {
        let long = sanitize("loooooooooooooooooooooong    naaaaaaaaaaaaaaaaame");
        assert_eq!(long.chars().count(), MAX_NAME_CHARS);
        assert!(!long.ends_with(' '));
    }

    #[test]
    fn truncation_never_leaves_a_trailing_space() {
        let name = format!("{} tail", "a".repeat(29));
        assert_eq!(sanitize(&name), "a".repeat(29));
    }

    #[test]
    fn keys_ignore_case_and_surrounding_whitespace() {
        assert_eq!(name_key("Alice"), name_key("alice "));
        assert_eq!(name_key("  ALICE\t"), "alice");
        assert_eq!(name_key("D'Arcy"), "d'arcy");
    }

    #[test]
    fn non_ascii_letters_are_dropped() {
        assert_eq!(sanitize("Pokémon"), "Pokmon");
        assert_eq!(sanitize("🎲🎲"), "");
    }
}
