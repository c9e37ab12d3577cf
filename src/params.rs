use std::{
    fmt,
    path::{Path, PathBuf},
};

/// External layout engine invoked as a subprocess.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Renderer {
    Dot,
    Neato,
    Fdp,
    Sfdp,
    Circo,
    Twopi,
    Mscgen,
}

/// The markup language a renderer consumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphLanguage {
    Dot,
    Mscgen,
}

/// Image types the dot-family renderers may produce here.
pub const SUPPORTED_DOT_IMAGE_TYPES: &[&str] = &["png", "gif", "jpg", "jpeg", "svg"];

/// Image types the mscgen renderer may produce here.
pub const SUPPORTED_MSCGEN_IMAGE_TYPES: &[&str] = &["png", "svg"];

impl Renderer {
    pub const DOT_FAMILY: &[Renderer] = &[
        Renderer::Dot,
        Renderer::Neato,
        Renderer::Fdp,
        Renderer::Sfdp,
        Renderer::Circo,
        Renderer::Twopi,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Renderer::Dot => "dot",
            Renderer::Neato => "neato",
            Renderer::Fdp => "fdp",
            Renderer::Sfdp => "sfdp",
            Renderer::Circo => "circo",
            Renderer::Twopi => "twopi",
            Renderer::Mscgen => "mscgen",
        }
    }

    pub fn from_name(name: &str) -> Option<Renderer> {
        match name {
            "dot" => Some(Renderer::Dot),
            "neato" => Some(Renderer::Neato),
            "fdp" => Some(Renderer::Fdp),
            "sfdp" => Some(Renderer::Sfdp),
            "circo" => Some(Renderer::Circo),
            "twopi" => Some(Renderer::Twopi),
            "mscgen" => Some(Renderer::Mscgen),
            _ => None,
        }
    }

    pub fn language(self) -> GraphLanguage {
        match self {
            Renderer::Mscgen => GraphLanguage::Mscgen,
            _ => GraphLanguage::Dot,
        }
    }
}

impl GraphLanguage {
    /// File extension of stored graph source files.
    pub fn source_ext(self) -> &'static str {
        match self {
            GraphLanguage::Dot => "dot",
            GraphLanguage::Mscgen => "mscgen",
        }
    }

    /// Renderer output format used for the map pass.
    pub fn map_format(self) -> &'static str {
        match self {
            GraphLanguage::Dot => "cmapx",
            GraphLanguage::Mscgen => "ismap",
        }
    }

    pub fn supported_image_types(self) -> &'static [&'static str] {
        match self {
            GraphLanguage::Dot => SUPPORTED_DOT_IMAGE_TYPES,
            GraphLanguage::Mscgen => SUPPORTED_MSCGEN_IMAGE_TYPES,
        }
    }

    pub fn supports_image_type(self, image_type: &str) -> bool {
        self.supported_image_types()
            .contains(&image_type.to_ascii_lowercase().as_str())
    }
}

/// One renderer invocation as program + argv. Built by [`RenderParms`],
/// executed by a [`crate::exec::CommandRunner`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl fmt::Display for RenderCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Pure value object computing every derived path and command line for one
/// graph identity. Constructed fresh per render request; never persisted
/// itself, only the paths it derives are.
#[derive(Clone, Debug)]
pub struct RenderParms {
    renderer: Renderer,
    graph_name: String,
    user_name: String,
    image_type: String,
    exec_dir: PathBuf,
    source_map_dir: PathBuf,
    image_dir: PathBuf,
}

impl RenderParms {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        renderer: Renderer,
        graph_name: impl Into<String>,
        user_name: impl Into<String>,
        image_type: impl Into<String>,
        exec_dir: impl Into<PathBuf>,
        source_map_dir: impl Into<PathBuf>,
        image_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            renderer,
            graph_name: graph_name.into(),
            user_name: user_name.into(),
            image_type: image_type.into(),
            exec_dir: exec_dir.into(),
            source_map_dir: source_map_dir.into(),
            image_dir: image_dir.into(),
        }
    }

    pub fn renderer(&self) -> Renderer {
        self.renderer
    }

    pub fn image_type(&self) -> &str {
        &self.image_type
    }

    /// Common basename of the artifact triple. Preview files additionally
    /// embed the user name so an uncommitted edit never collides with the
    /// saved version of the page.
    fn base_name(&self, preview: bool) -> String {
        if preview {
            format!("{}_{}", self.graph_name, self.user_name)
        } else {
            self.graph_name.clone()
        }
    }

    pub fn source_file_name(&self, preview: bool) -> String {
        format!(
            "{}.{}",
            self.base_name(preview),
            self.renderer.language().source_ext()
        )
    }

    pub fn source_path(&self, preview: bool) -> PathBuf {
        self.source_map_dir.join(self.source_file_name(preview))
    }

    pub fn map_path(&self, preview: bool) -> PathBuf {
        self.source_map_dir
            .join(format!("{}.map", self.base_name(preview)))
    }

    pub fn image_file_name(&self, preview: bool) -> String {
        format!(
            "{}_{}.{}",
            self.base_name(preview),
            self.renderer.name(),
            self.image_type
        )
    }

    pub fn image_path(&self, preview: bool) -> PathBuf {
        self.image_dir.join(self.image_file_name(preview))
    }

    pub fn image_command(&self, preview: bool) -> RenderCommand {
        self.command(&self.image_type, &self.image_path(preview), preview)
    }

    pub fn map_command(&self, preview: bool) -> RenderCommand {
        self.command(
            self.renderer.language().map_format(),
            &self.map_path(preview),
            preview,
        )
    }

    fn command(&self, format: &str, out_path: &Path, preview: bool) -> RenderCommand {
        RenderCommand {
            program: self.exec_dir.join(executable_name(self.renderer)),
            args: vec![
                format!("-T{format}"),
                "-o".to_string(),
                out_path.display().to_string(),
                self.source_path(preview).display().to_string(),
            ],
        }
    }

    /// Remove the artifact triple from disk. Missing files are not an error.
    pub fn delete_files(&self, preview: bool) {
        for path in [
            self.source_path(preview),
            self.map_path(preview),
            self.image_path(preview),
        ] {
            if std::fs::remove_file(&path).is_ok() {
                tracing::debug!(path = %path.display(), "deleted graph file");
            }
        }
    }
}

#[cfg(windows)]
fn executable_name(renderer: Renderer) -> String {
    format!("{}.exe", renderer.name())
}

#[cfg(not(windows))]
fn executable_name(renderer: Renderer) -> String {
    renderer.name().to_string()
}
