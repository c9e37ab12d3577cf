/// Escape text for HTML rendering (attribute-safe).
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    out
}

/// Render an error message as an inline HTML error element.
pub fn error_html(text: &str) -> String {
    format!("<p class=\"error\">{}</p>", escape_html(text))
}

/// Render a multi-line diagnostic (e.g. renderer syntax errors) as one
/// error element, escaped line by line. The diagnostic may echo
/// user-supplied graph text, so escaping is mandatory.
pub fn multiline_error_html(text: &str) -> String {
    let mut rows = String::new();
    for line in text.lines() {
        rows.push_str(&escape_html(line));
        rows.push_str("<br>");
    }
    format!("<p class=\"error\">{rows}</p>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#039;&amp;&#039;&lt;/a&gt;"
        );
    }

    #[test]
    fn error_element_is_escaped() {
        assert_eq!(
            error_html("bad <input>"),
            "<p class=\"error\">bad &lt;input&gt;</p>"
        );
    }

    #[test]
    fn multiline_diagnostics_break_per_line() {
        let html = multiline_error_html("line one\nline <two>");
        assert_eq!(
            html,
            "<p class=\"error\">line one<br>line &lt;two&gt;<br></p>"
        );
    }
}
