use anyhow::Context as _;

use crate::{
    error::{WikigraphError, WikigraphResult},
    params::GraphLanguage,
};

/// Normalize heterogeneous renderer map output into one canonical format.
///
/// Canonical line: `<shape> <coordinates> <link>` where the link is one of
/// `[URL]`, `[URL description]`, `[[PageTitle]]` or
/// `[[PageTitle|description]]` — the syntax the image-map rendering
/// collaborator accepts.
///
/// `fallback_title` supplies the link target for DOT tooltip-only entries
/// (a `title` without an `href`), which the collaborator would otherwise
/// reject.
pub fn normalize_map(raw: &str, kind: GraphLanguage, fallback_title: &str) -> String {
    let mut out = String::new();
    for line in raw.lines() {
        let normalized = match kind {
            GraphLanguage::Mscgen => normalize_mscgen_line(line),
            GraphLanguage::Dot => normalize_dot_line(line, fallback_title),
        };
        if let Some(line) = normalized {
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

/// Normalize the map file in place. An absent or empty file is left alone.
pub fn normalize_map_file(
    path: &std::path::Path,
    kind: GraphLanguage,
    fallback_title: &str,
) -> WikigraphResult<()> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) if !raw.trim().is_empty() => raw,
        Ok(_) => return Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(WikigraphError::Other(
                anyhow::Error::new(e).context(format!("read map '{}'", path.display())),
            ));
        }
    };

    let normalized = normalize_map(&raw, kind, fallback_title);
    std::fs::write(path, normalized).map_err(|e| {
        tracing::debug!(path = %path.display(), error = %e, "map write failed");
        WikigraphError::MapWriteFailed
    })
}

/// Read the normalized map contents for embedding. Missing map is an empty
/// map (graphs without links produce none).
pub fn read_map_contents(path: &std::path::Path) -> WikigraphResult<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "map file missing, using empty map");
            Ok(String::new())
        }
        Err(e) => Err(WikigraphError::Other(
            anyhow::Error::new(e).context(format!("read map '{}'", path.display())),
        )),
    }
}

/// Mscgen `ismap` lines arrive as `shape URL coords...` (commas inside the
/// coordinate pairs). Reorder to canonical `shape coords URL`, wrapping a
/// bare URL in brackets. Lines with fewer than four fields are partial or
/// malformed output and are dropped.
fn normalize_mscgen_line(line: &str) -> Option<String> {
    let despaced = line.replace(',', " ");
    let tokens: Vec<&str> = despaced.split_whitespace().collect();
    if tokens.len() < 4 {
        return None;
    }

    let shape = tokens[0];
    let url = tokens[1];
    let coords = tokens[2..].join(" ");
    let link = if url.starts_with('[') {
        url.to_string()
    } else {
        format!("[{url}]")
    };

    Some(format!("{shape} {coords} {link}"))
}

/// DOT `cmapx` output is an HTML `<map>` wrapper around `<area>` entries
/// carrying `shape`, `coords`, and optionally `href` and `title`
/// attributes. The wrapper tags are dropped; each entry is tokenized into
/// key="value" pairs and reassembled canonically.
fn normalize_dot_line(line: &str, fallback_title: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lowered = trimmed.to_ascii_lowercase();
    if lowered.starts_with("<map") || lowered.starts_with("</map") {
        return None;
    }

    let attrs = parse_quoted_attrs(trimmed);
    let shape = attr(&attrs, "shape")?;
    let coords = attr(&attrs, "coords")?.replace(',', " ");
    let coords = coords.split_whitespace().collect::<Vec<_>>().join(" ");

    let href = attr(&attrs, "href");
    let title = attr(&attrs, "title");

    let link = match (href, title) {
        // Tooltip without a URL: link back to the embedding page, keeping
        // the tooltip text as the description.
        (None, Some(title)) => format!("[[{fallback_title}|{title}]]"),
        (None, None) => return None,
        (Some(href), title) => {
            if href.starts_with('[') {
                href
            } else {
                match title {
                    Some(title) => format!("[{href} {title}]"),
                    None => format!("[{href}]"),
                }
            }
        }
    };

    Some(format!("{shape} {coords} {link}"))
}

/// Tokenize `key="value"` pairs from an `<area>`-style entry. Keys are
/// lowercased; values are taken verbatim between the quotes.
fn parse_quoted_attrs(entry: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let bytes = entry.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        // scan a key: alphabetic run directly before `="`
        if !bytes[i].is_ascii_alphabetic() {
            i += 1;
            continue;
        }
        let key_start = i;
        while i < bytes.len() && bytes[i].is_ascii_alphanumeric() {
            i += 1;
        }
        let key_end = i;
        while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] != b'=' {
            continue;
        }
        i += 1;
        while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] != b'"' {
            continue;
        }
        i += 1;
        let value_start = i;
        while i < bytes.len() && bytes[i] != b'"' {
            i += 1;
        }
        if i >= bytes.len() {
            break; // unterminated value
        }
        attrs.push((
            entry[key_start..key_end].to_ascii_lowercase(),
            entry[value_start..i].to_string(),
        ));
        i += 1;
    }

    attrs
}

fn attr(attrs: &[(String, String)], key: &str) -> Option<String> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mscgen_line_is_reordered_and_bracketed() {
        let out = normalize_map(
            "Box0 http://example.com 10,20 30,40",
            GraphLanguage::Mscgen,
            "Main Page",
        );
        assert_eq!(out, "Box0 10 20 30 40 [http://example.com]\n");
    }

    #[test]
    fn mscgen_short_lines_are_dropped() {
        let out = normalize_map("Box0 http://example.com\n\n", GraphLanguage::Mscgen, "T");
        assert_eq!(out, "");
    }

    #[test]
    fn mscgen_bracketed_url_is_left_alone() {
        let out = normalize_map(
            "rect [[Other_Page]] 1,2 3,4",
            GraphLanguage::Mscgen,
            "T",
        );
        assert_eq!(out, "rect 1 2 3 4 [[Other_Page]]\n");
    }

    #[test]
    fn dot_map_wrapper_tags_are_stripped() {
        let raw = concat!(
            "<map id=\"G\" name=\"G\">\n",
            "<area shape=\"poly\" id=\"node1\" href=\"[[Target]]\" title=\"go\" alt=\"\" coords=\"5,6,7,8\"/>\n",
            "</map>\n",
        );
        let out = normalize_map(raw, GraphLanguage::Dot, "Main Page");
        assert_eq!(out, "poly 5 6 7 8 [[Target]]\n");
    }

    #[test]
    fn dot_bare_href_and_title_combine_into_one_link() {
        let raw = "<area shape=\"rect\" href=\"http://example.com\" title=\"Example\" coords=\"1,2,3,4\"/>";
        let out = normalize_map(raw, GraphLanguage::Dot, "Main Page");
        assert_eq!(out, "rect 1 2 3 4 [http://example.com Example]\n");
    }

    #[test]
    fn dot_bare_href_without_title_is_bracketed() {
        let raw = "<area shape=\"rect\" href=\"http://example.com\" coords=\"1,2,3,4\"/>";
        let out = normalize_map(raw, GraphLanguage::Dot, "Main Page");
        assert_eq!(out, "rect 1 2 3 4 [http://example.com]\n");
    }

    #[test]
    fn dot_tooltip_without_href_links_to_the_page() {
        let raw = "<area shape=\"rect\" id=\"node2\" title=\"just a tooltip\" coords=\"9,9,20,20\"/>";
        let out = normalize_map(raw, GraphLanguage::Dot, "Main Page");
        assert_eq!(out, "rect 9 9 20 20 [[Main Page|just a tooltip]]\n");
    }

    #[test]
    fn dot_entry_without_coords_is_dropped() {
        let raw = "<area shape=\"rect\" href=\"http://example.com\"/>";
        let out = normalize_map(raw, GraphLanguage::Dot, "T");
        assert_eq!(out, "");
    }

    #[test]
    fn blank_lines_are_eliminated() {
        let raw = "\n   \n<area shape=\"rect\" href=\"[x]\" coords=\"1,2\"/>\n\t\n";
        let out = normalize_map(raw, GraphLanguage::Dot, "T");
        assert_eq!(out, "rect 1 2 [x]\n");
    }

    #[test]
    fn map_file_round_trip() {
        let dir = std::env::temp_dir().join(format!(
            "wikigraph_map_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("g.map");

        std::fs::write(&path, "Box0 http://example.com 10,20 30,40\n").unwrap();
        normalize_map_file(&path, GraphLanguage::Mscgen, "T").unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Box0 10 20 30 40 [http://example.com]\n"
        );

        // absent file is fine
        normalize_map_file(&dir.join("absent.map"), GraphLanguage::Dot, "T").unwrap();

        std::fs::remove_dir_all(&dir).ok();
    }
}
