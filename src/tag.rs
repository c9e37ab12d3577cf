use crate::params::Renderer;

/// The two block tags this engine serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphTag {
    /// Content is DOT language; `renderer` may select any dot-family engine.
    Graphviz,
    /// Content is message-sequence-chart language.
    Mscgen,
}

/// Display modifiers forwarded verbatim to the image-map rendering
/// collaborator.
pub const DISPLAY_MODIFIERS: &[&str] = &[
    "type", "border", "location", "alignment", "size", "link", "alt", "caption",
];

/// Attributes recognized on a graph tag. Anything in `display` is passed
/// through untouched; the rest steer rendering and caching.
#[derive(Clone, Debug, Default)]
pub struct TagAttrs {
    pub renderer: Option<String>,
    pub format: Option<String>,
    pub uniquifier: Option<String>,
    pub preparse: Option<String>,
    /// Recognized display modifiers, in first-seen order.
    pub display: Vec<(String, String)>,
}

impl TagAttrs {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut attrs = TagAttrs::default();
        for (key, value) in pairs {
            match key {
                "renderer" => attrs.renderer = Some(value.to_string()),
                "format" => attrs.format = Some(value.to_string()),
                "uniquifier" => attrs.uniquifier = Some(value.to_string()),
                "preparse" => attrs.preparse = Some(value.to_string()),
                key if DISPLAY_MODIFIERS.contains(&key) || key == "desc" || key == "default" => {
                    attrs.display.push((key.to_string(), value.to_string()));
                }
                other => {
                    tracing::debug!(attribute = other, "ignoring unrecognized tag attribute");
                }
            }
        }
        attrs
    }

    pub fn display_value(&self, key: &str) -> Option<&str> {
        self.display
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Resolve the renderer for a tag. The graphviz tag accepts only the
/// dot-family engine names and silently falls back to `dot` for anything
/// else; the mscgen tag has exactly one renderer.
pub fn resolve_renderer(tag: GraphTag, attrs: &TagAttrs) -> Renderer {
    match tag {
        GraphTag::Mscgen => Renderer::Mscgen,
        GraphTag::Graphviz => attrs
            .renderer
            .as_deref()
            .and_then(Renderer::from_name)
            .filter(|r| Renderer::DOT_FAMILY.contains(r))
            .unwrap_or(Renderer::Dot),
    }
}

/// Assemble the input text for the image-map rendering collaborator: an
/// image line with modifiers, the normalized map body, and optional
/// `desc`/`default` trailers.
///
/// `force_desc_none` suppresses the image-description link when the upload
/// went onto a placeholder page (the link would point at the placeholder,
/// not the graph).
pub fn image_map_input(
    attrs: &TagAttrs,
    image_file_name: &str,
    map: &str,
    force_desc_none: bool,
) -> String {
    let mut image_line = format!("Image:{image_file_name}");
    let mut has_alt = false;

    for modifier in DISPLAY_MODIFIERS {
        let Some(value) = attrs.display_value(modifier) else {
            continue;
        };
        match *modifier {
            "link" | "alt" => {
                if *modifier == "alt" {
                    has_alt = true;
                }
                image_line.push_str(&format!("|{modifier}={value}"));
            }
            _ => image_line.push_str(&format!("|{value}")),
        }
    }

    // The collaborator requires at least one modifier; fall back to an alt
    // derived from the caption or a stock string.
    if !has_alt {
        let alt = attrs.display_value("caption").unwrap_or("graph");
        image_line.push_str(&format!("|alt={alt}"));
    }

    let mut out = format!("{image_line}\n{map}");

    if force_desc_none {
        out.push_str("\ndesc none");
    } else if let Some(desc) = attrs.display_value("desc") {
        out.push_str(&format!("\ndesc {desc}"));
    }

    if let Some(default) = attrs.display_value("default") {
        out.push_str(&format!("\ndefault {default}"));
    }

    out
}

/// Category-page tags appended to uploaded image page text when the
/// category toggle is enabled.
pub const ROOT_CATEGORY: &str = "GraphViz";

pub fn category_tags(renderer: Renderer) -> String {
    format!(
        "[[Category:{ROOT_CATEGORY}]][[Category:{ROOT_CATEGORY} {}]]",
        renderer.name()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_attributes_are_split_from_display_modifiers() {
        let attrs = TagAttrs::from_pairs([
            ("renderer", "neato"),
            ("format", "svg"),
            ("uniquifier", "2"),
            ("caption", "My graph"),
            ("size", "400px"),
            ("bogus", "x"),
        ]);
        assert_eq!(attrs.renderer.as_deref(), Some("neato"));
        assert_eq!(attrs.format.as_deref(), Some("svg"));
        assert_eq!(attrs.uniquifier.as_deref(), Some("2"));
        assert_eq!(attrs.display.len(), 2);
        assert_eq!(attrs.display_value("caption"), Some("My graph"));
    }

    #[test]
    fn graphviz_tag_constrains_renderer_to_the_dot_family() {
        let neato = TagAttrs::from_pairs([("renderer", "neato")]);
        assert_eq!(resolve_renderer(GraphTag::Graphviz, &neato), Renderer::Neato);

        let bogus = TagAttrs::from_pairs([("renderer", "paint")]);
        assert_eq!(resolve_renderer(GraphTag::Graphviz, &bogus), Renderer::Dot);

        // mscgen is not in the dot family even though it parses as a renderer
        let msc = TagAttrs::from_pairs([("renderer", "mscgen")]);
        assert_eq!(resolve_renderer(GraphTag::Graphviz, &msc), Renderer::Dot);
        assert_eq!(resolve_renderer(GraphTag::Mscgen, &msc), Renderer::Mscgen);
    }

    #[test]
    fn image_map_input_carries_modifiers_and_map() {
        let attrs = TagAttrs::from_pairs([("size", "400px"), ("alt", "alt text")]);
        let out = image_map_input(&attrs, "G_dot.png", "rect 1 2 3 4 [x]\n", false);
        assert!(out.starts_with("Image:G_dot.png|400px|alt=alt text\n"));
        assert!(out.contains("rect 1 2 3 4 [x]"));
    }

    #[test]
    fn alt_falls_back_to_caption_then_stock_text() {
        let attrs = TagAttrs::from_pairs([("caption", "the caption")]);
        let out = image_map_input(&attrs, "g.png", "", false);
        assert!(out.contains("|the caption|alt=the caption"));

        let out = image_map_input(&TagAttrs::default(), "g.png", "", false);
        assert!(out.contains("|alt=graph"));
    }

    #[test]
    fn placeholder_upload_forces_desc_none() {
        let attrs = TagAttrs::from_pairs([("desc", "bottom-right")]);
        let out = image_map_input(&attrs, "g.png", "", true);
        assert!(out.ends_with("\ndesc none"));

        let out = image_map_input(&attrs, "g.png", "", false);
        assert!(out.ends_with("\ndesc bottom-right"));
    }

    #[test]
    fn default_trailer_uses_its_own_value() {
        let attrs = TagAttrs::from_pairs([("default", "[[Main Page]]")]);
        let out = image_map_input(&attrs, "g.png", "", false);
        assert!(out.ends_with("\ndefault [[Main Page]]"));
    }

    #[test]
    fn category_tags_name_the_renderer() {
        assert_eq!(
            category_tags(Renderer::Neato),
            "[[Category:GraphViz]][[Category:GraphViz neato]]"
        );
    }
}
