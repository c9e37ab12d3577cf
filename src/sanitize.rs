use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::{
    error::{WikigraphError, WikigraphResult},
    upload::UploadStore,
};

/// DOT attributes that reference the server filesystem and are therefore
/// never accepted as user input.
pub const FORBIDDEN_DOT_ATTRIBUTES: &[&str] = &["imagepath", "shapefile", "fontpath"];

/// Matches `image=<value>` where value is one of the DOT ID forms: a bare
/// identifier, a numeral, a double-quoted string (possibly a `"a" + "b"`
/// concatenation), or an HTML-like `<...>` string.
fn image_attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)image\s*=\s*("(?:\\.|[^"\\])*"(?:\s*\+\s*"(?:\\.|[^"\\])*")*|<[^<>]*(?:<[^<>]*>[^<>]*)*>|-?(?:\.[0-9]+|[0-9]+(?:\.[0-9]*)?)|[A-Za-z\x{80}-\x{FF}_][A-Za-z\x{80}-\x{FF}_0-9]*)"#,
        )
        .expect("image attribute pattern")
    })
}

/// Matches an `IMG SRC` attribute inside an HTML-like label.
fn img_src_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)(<img[^>]*?src\s*=\s*)"([^"]*)""#).expect("img src pattern")
    })
}

/// Matches quoted-string concatenation and escaped-newline artifacts inside
/// a DOT quoted value, e.g. `"part1" + "part2"` or a trailing `\n`.
fn quote_artifact_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""\s*\+\s*"|\\n"#).expect("quote artifact pattern"))
}

/// Sanitize DOT-language input before it reaches the renderer.
///
/// Forbidden attributes are rejected by raw case-insensitive substring
/// match anywhere in the text. This is deliberately coarse (it fires even
/// inside unrelated identifiers): the check is a filesystem-traversal
/// guard, not a DOT parser, and over-rejection is the safe direction.
///
/// `image=` values and `IMG SRC` values are rewritten to the absolute local
/// path of the named uploaded file. A reference that resolves to no
/// uploaded file fails the whole sanitization rather than silently handing
/// the renderer an empty path.
///
/// Mscgen input has no filesystem attributes and is never passed here.
pub fn sanitize_dot_input(input: &str, uploads: &dyn UploadStore) -> WikigraphResult<String> {
    let lowered = input.to_lowercase();
    for attribute in FORBIDDEN_DOT_ATTRIBUTES {
        if lowered.contains(attribute) {
            return Err(WikigraphError::forbidden(*attribute));
        }
    }

    let mut unresolved_image = false;
    let rewritten = image_attr_re().replace_all(input, |caps: &Captures<'_>| {
        match resolve_image_value(&caps[1], uploads) {
            Some(path) => format!("image=\"{path}\""),
            None => {
                tracing::debug!(value = &caps[1], "removing unresolved image attribute");
                unresolved_image = true;
                "image=\"\"".to_string()
            }
        }
    });
    if unresolved_image {
        return Err(WikigraphError::InvalidImageReference("image".to_string()));
    }

    let mut unresolved_src = false;
    let rewritten = img_src_re().replace_all(&rewritten, |caps: &Captures<'_>| {
        match uploads.uploaded_file(&caps[2]) {
            Some(file) => format!("{}\"{}\"", &caps[1], file.local_path.display()),
            None => {
                tracing::debug!(value = &caps[2], "removing unresolved IMG SRC attribute");
                unresolved_src = true;
                format!("{}\"\"", &caps[1])
            }
        }
    });
    if unresolved_src {
        return Err(WikigraphError::InvalidImageReference("IMG SRC".to_string()));
    }

    Ok(rewritten.into_owned())
}

/// Reduce a raw `image=` value to an uploaded-file name and resolve it to a
/// local path. Quoted values lose their quotes plus any concatenation and
/// escaped-newline artifacts; a quoted value missing its closing quote is
/// unresolvable.
fn resolve_image_value(raw: &str, uploads: &dyn UploadStore) -> Option<String> {
    let mut name = raw.trim().to_string();

    if name.starts_with('"') {
        if name.len() >= 2 && name.ends_with('"') {
            name = name[1..name.len() - 1].to_string();
        } else {
            return None;
        }
        name = quote_artifact_re().replace_all(&name, "").into_owned();
    }

    uploads
        .uploaded_file(&name)
        .map(|file| file.local_path.display().to_string())
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::*;
    use crate::upload::{PlaceholderStatus, UploadedFile};

    /// Upload store exposing a fixed set of file names.
    struct FixedFiles(Vec<&'static str>);

    impl UploadStore for FixedFiles {
        fn check_upload_allowed(&self, _user: &str) -> WikigraphResult<()> {
            Ok(())
        }
        fn check_title_allowed(
            &self,
            _user: &str,
            _dest_name: &str,
            _local_path: &Path,
        ) -> WikigraphResult<()> {
            Ok(())
        }
        fn upload_isolated(
            &self,
            _dest_name: &str,
            _local_path: &Path,
            _user: &str,
            _comment: &str,
            _page_text: &str,
        ) -> WikigraphResult<()> {
            Ok(())
        }
        fn upload_onto_placeholder(
            &self,
            _image_type: &str,
            _local_path: &Path,
            _user: &str,
            _comment: &str,
        ) -> WikigraphResult<String> {
            Err(WikigraphError::RetryRequired)
        }
        fn uploaded_file(&self, name: &str) -> Option<UploadedFile> {
            self.0.contains(&name).then(|| UploadedFile {
                name: name.to_string(),
                local_path: PathBuf::from(format!("/store/{name}")),
            })
        }
        fn delete_uploaded(&self, _name: &str) {}
        fn placeholder(&self, _image_type: &str) -> PlaceholderStatus {
            PlaceholderStatus::Missing
        }
        fn install_placeholder(
            &self,
            _image_type: &str,
            _local_path: &Path,
        ) -> WikigraphResult<()> {
            Ok(())
        }
        fn image_type_allowed(&self, _image_type: &str) -> bool {
            true
        }
    }

    #[test]
    fn forbidden_attributes_are_rejected_any_case() {
        let store = FixedFiles(vec![]);
        for input in [
            r#"digraph G { node [imagepath="../"]; }"#,
            r#"digraph G { node [SHAPEFILE="x"]; }"#,
            r#"digraph G { node [FontPath="y"]; }"#,
        ] {
            assert!(matches!(
                sanitize_dot_input(input, &store),
                Err(WikigraphError::ForbiddenAttribute(_))
            ));
        }
    }

    #[test]
    fn forbidden_match_is_a_raw_substring() {
        // Even inside an unrelated identifier. Intentional over-approximation.
        let store = FixedFiles(vec![]);
        let input = "digraph my_imagepath_graph { a -> b }";
        assert!(matches!(
            sanitize_dot_input(input, &store),
            Err(WikigraphError::ForbiddenAttribute(_))
        ));
    }

    #[test]
    fn known_image_reference_is_rewritten_to_local_path() {
        let store = FixedFiles(vec!["known.png"]);
        let out = sanitize_dot_input(r#"digraph G { a [image="known.png"]; }"#, &store).unwrap();
        assert_eq!(out, r#"digraph G { a [image="/store/known.png"]; }"#);
    }

    #[test]
    fn unknown_image_reference_fails() {
        let store = FixedFiles(vec![]);
        let err = sanitize_dot_input(r#"digraph G { a [image="unknown_file.png"]; }"#, &store)
            .unwrap_err();
        assert!(matches!(err, WikigraphError::InvalidImageReference(k) if k == "image"));
    }

    #[test]
    fn bare_identifier_image_value_is_resolved() {
        let store = FixedFiles(vec!["logo"]);
        let out = sanitize_dot_input("digraph G { a [image=logo]; }", &store).unwrap();
        assert!(out.contains(r#"image="/store/logo""#));
    }

    #[test]
    fn concatenated_quoted_value_is_joined_before_lookup() {
        let store = FixedFiles(vec!["known.png"]);
        let out =
            sanitize_dot_input(r#"digraph G { a [image="known" + ".png"]; }"#, &store).unwrap();
        assert!(out.contains(r#"image="/store/known.png""#));
    }

    #[test]
    fn img_src_in_html_label_is_rewritten() {
        let store = FixedFiles(vec!["icon.png"]);
        let input = r#"digraph G { a [label=<<TABLE><TR><TD><IMG SRC="icon.png"/></TD></TR></TABLE>>]; }"#;
        let out = sanitize_dot_input(input, &store).unwrap();
        assert!(out.contains(r#"SRC="/store/icon.png""#));
    }

    #[test]
    fn unknown_img_src_fails() {
        let store = FixedFiles(vec![]);
        let input = r#"digraph G { a [label=<<IMG SRC="nope.png"/>>]; }"#;
        let err = sanitize_dot_input(input, &store).unwrap_err();
        assert!(matches!(err, WikigraphError::InvalidImageReference(k) if k == "IMG SRC"));
    }

    #[test]
    fn input_without_image_attributes_passes_through() {
        let store = FixedFiles(vec![]);
        let input = "digraph G { a -> b; b -> c }";
        assert_eq!(sanitize_dot_input(input, &store).unwrap(), input);
    }
}
