/// Derive a filesystem/cache-safe graph name from arbitrary wiki text.
///
/// Every character outside `[A-Za-z0-9_]` is replaced with `_`. The result is
/// used as the common basename of a graph's source, map and image files, so
/// identical inputs must always map to the identical name.
pub fn friendly_name(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_non_word_characters() {
        assert_eq!(friendly_name("Main Page_digraph G"), "Main_Page_digraph_G");
        assert_eq!(friendly_name("a/b\\c:d*e"), "a_b_c_d_e");
        assert_eq!(friendly_name("Ünïcøde"), "_n_c_de");
    }

    #[test]
    fn keeps_word_characters() {
        assert_eq!(friendly_name("Already_safe_123"), "Already_safe_123");
    }

    #[test]
    fn idempotent() {
        for s in ["", "Main Page", "x y/z", "__a__", "Тест"] {
            assert_eq!(friendly_name(&friendly_name(s)), friendly_name(s));
        }
    }
}
