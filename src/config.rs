use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::{
    error::WikigraphResult,
    params::{GraphLanguage, Renderer},
};

/// Subdirectory of the upload area holding graph source and map files.
pub const SOURCE_AND_MAP_SUBDIR: &str = "graphviz";

/// Subdirectory of [`SOURCE_AND_MAP_SUBDIR`] holding graph image files.
/// Files here are removed after they are uploaded.
pub const IMAGE_SUBDIR: &str = "images";

/// Host-provided configuration for graph rendering and caching.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root of the host's managed upload area. The two cache directories
    /// live underneath it.
    pub upload_dir: PathBuf,

    /// Directory containing the dot-family executables.
    pub exec_path: PathBuf,

    /// Directory containing the mscgen executable. Defaults to `exec_path`.
    pub mscgen_path: Option<PathBuf>,

    /// Image type produced when a tag carries no `format` attribute.
    pub default_image_type: String,

    /// Whether to tag uploaded images with auto-created category pages.
    pub create_category_pages: bool,

    /// Upper bound on one renderer invocation, in seconds.
    pub render_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("."),
            exec_path: default_exec_path(),
            mscgen_path: None,
            default_image_type: "png".to_string(),
            create_category_pages: false,
            render_timeout_secs: 30,
        }
    }
}

#[cfg(windows)]
fn default_exec_path() -> PathBuf {
    PathBuf::from("C:\\Program Files\\Graphviz\\bin\\")
}

#[cfg(not(windows))]
fn default_exec_path() -> PathBuf {
    PathBuf::from("/usr/bin/")
}

impl Settings {
    pub fn from_json_file(path: &Path) -> WikigraphResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read settings '{}'", path.display()))?;
        let settings: Settings =
            serde_json::from_str(&text).with_context(|| "parse settings JSON")?;
        Ok(settings)
    }

    /// Directory containing graph source and map files.
    pub fn source_and_map_dir(&self) -> PathBuf {
        self.upload_dir.join(SOURCE_AND_MAP_SUBDIR)
    }

    /// Directory containing graph image files prior to upload.
    pub fn image_dir(&self) -> PathBuf {
        self.upload_dir.join(SOURCE_AND_MAP_SUBDIR).join(IMAGE_SUBDIR)
    }

    /// Executable directory for the given renderer.
    pub fn renderer_dir(&self, renderer: Renderer) -> PathBuf {
        match renderer.language() {
            GraphLanguage::Mscgen => self
                .mscgen_path
                .clone()
                .unwrap_or_else(|| self.exec_path.clone()),
            GraphLanguage::Dot => self.exec_path.clone(),
        }
    }

    pub fn render_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.render_timeout_secs)
    }
}
