use std::path::{Component, Path};

use crate::{
    config::Settings,
    error::{WikigraphError, WikigraphResult},
    exec::CommandRunner,
    map,
    name::friendly_name,
    params::{GraphLanguage, RenderParms, Renderer, SUPPORTED_DOT_IMAGE_TYPES},
    registry::ActiveFileRegistry,
    sanitize::sanitize_dot_input,
    tag::{self, GraphTag, TagAttrs},
    upload::{PlaceholderStatus, UploadStore},
};

/// Source of the trivial graph rendered to provision placeholder pages.
const PLACEHOLDER_SOURCE: &str = "graph placeholder { wikigraph }";

/// Graph name used for placeholder render scratch files.
const PLACEHOLDER_GRAPH_NAME: &str = "Graph_placeholder";

/// Host collaborator performing recursive tag expansion for `preparse`
/// content. Hosts without such a pipeline use [`NoExpansion`].
pub trait ContentExpander: Send + Sync {
    fn expand(&self, input: &str) -> String;
}

pub struct NoExpansion;

impl ContentExpander for NoExpansion {
    fn expand(&self, input: &str) -> String {
        input.to_string()
    }
}

/// One graph tag occurrence to render.
#[derive(Clone, Debug)]
pub struct RenderRequest<'a> {
    pub tag: GraphTag,
    pub input: &'a str,
    pub attrs: TagAttrs,
    /// Full text of the embedding page title.
    pub title: &'a str,
    /// Acting user; embedded in preview file names.
    pub user: &'a str,
    pub is_preview: bool,
}

/// Finished artifacts handed back to the host for HTML assembly.
#[derive(Clone, Debug)]
pub struct RenderOutput {
    /// Uploaded image name to embed (the placeholder name when the upload
    /// went onto a placeholder page).
    pub image_file_name: String,
    /// Normalized map text.
    pub map: String,
    /// Assembled input for the image-map rendering collaborator.
    pub image_map_input: String,
    /// Whether the renderer was invoked (false = pure cache hit).
    pub regenerated: bool,
    pub used_placeholder: bool,
    /// `preparse="dynamic"`: the host must not cache the surrounding page.
    pub cache_disabled: bool,
}

/// The render-cache and regeneration-consistency engine.
///
/// Decides, per graph, whether the cached artifact triple (source, map,
/// image) is still valid, regenerates it via the external renderer when
/// not, and manages the active/inactive file lifecycle across the
/// edit/preview/save flow. Single-request, synchronous; the host owns any
/// request-level concurrency.
pub struct Orchestrator {
    settings: Settings,
    registry: ActiveFileRegistry,
    runner: Box<dyn CommandRunner>,
    uploads: Box<dyn UploadStore>,
    expander: Box<dyn ContentExpander>,
}

impl Orchestrator {
    pub fn new(
        settings: Settings,
        runner: Box<dyn CommandRunner>,
        uploads: Box<dyn UploadStore>,
    ) -> Self {
        Self {
            settings,
            registry: ActiveFileRegistry::new(),
            runner,
            uploads,
            expander: Box::new(NoExpansion),
        }
    }

    pub fn with_expander(mut self, expander: Box<dyn ContentExpander>) -> Self {
        self.expander = expander;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Render one graph tag, serving cached artifacts when the stored
    /// source matches the submitted text byte for byte.
    pub fn render(&self, req: &RenderRequest<'_>) -> WikigraphResult<RenderOutput> {
        let input = req.input.trim();
        if input.is_empty() {
            return Err(WikigraphError::EmptyInput);
        }

        let renderer = tag::resolve_renderer(req.tag, &req.attrs);
        let language = renderer.language();
        let graph_name = graph_identity(req.title, input, req.attrs.uniquifier.as_deref());

        let source_map_dir = self.settings.source_and_map_dir();
        let image_dir = self.settings.image_dir();
        ensure_cache_dir(&source_map_dir)?;
        ensure_cache_dir(&image_dir)?;

        let image_type = self.resolve_image_type(language, &req.attrs);
        let parms = RenderParms::new(
            renderer,
            &graph_name,
            req.user,
            &image_type,
            self.settings.renderer_dir(renderer),
            &source_map_dir,
            &image_dir,
        );

        let preview = req.is_preview;
        let saving = !preview && self.registry.is_saving(req.title);
        if saving {
            // the edit is being committed: any preview of it is now stale
            parms.delete_files(true);
            self.uploads.delete_uploaded(&parms.image_file_name(true));
        }
        tracing::debug!(graph = %graph_name, preview, saving, "render request");

        let mut cache_disabled = false;
        let mut expanded = false;
        let input = match req.attrs.preparse.as_deref() {
            None => input.to_string(),
            Some("dynamic") => {
                cache_disabled = true;
                expanded = true;
                self.expander.expand(input)
            }
            Some("static") => {
                if saving || preview {
                    expanded = true;
                    self.expander.expand(input)
                } else {
                    input.to_string()
                }
            }
            Some(other) => {
                return Err(WikigraphError::UnrecognizedPreparseMode(other.to_string()));
            }
        };

        let input = match language {
            GraphLanguage::Dot => sanitize_dot_input(&input, self.uploads.as_ref())?,
            GraphLanguage::Mscgen => input,
        };

        let image_exists = self
            .uploads
            .uploaded_file(&parms.image_file_name(preview))
            .is_some();
        let map_exists = parms.map_path(preview).is_file();

        // The staleness check touches disk, so it runs only when something
        // could actually have changed; untouched pages skip it entirely.
        let mut source_changed = false;
        if saving || preview || !image_exists || !map_exists || expanded {
            source_changed = is_source_changed(&parms.source_path(preview), &input)?;
        }
        tracing::debug!(source_changed, image_exists, map_exists, "staleness check");

        let regenerate = source_changed || !image_exists || !map_exists;
        let mut image_file_name = parms.image_file_name(preview);
        let mut used_placeholder = false;
        if regenerate {
            self.regenerate(&parms, preview, &input, source_changed, req)?;
            let (name, placeholder) = self.upload_finished_image(&parms, preview, req)?;
            image_file_name = name;
            used_placeholder = placeholder;
        }

        if saving {
            self.registry.record(req.title, &parms.source_path(preview));
            self.registry.record(req.title, &parms.map_path(preview));
        }

        let map_contents = map::read_map_contents(&parms.map_path(preview))?;
        let image_map_input = tag::image_map_input(
            &req.attrs,
            &image_file_name,
            &map_contents,
            regenerate && used_placeholder,
        );

        Ok(RenderOutput {
            image_file_name,
            map: map_contents,
            image_map_input,
            regenerated: regenerate,
            used_placeholder,
            cache_disabled,
        })
    }

    /// Persist the new source and run both renderer passes. Any failure
    /// deletes the partial triple so a retry starts from nothing cached.
    fn regenerate(
        &self,
        parms: &RenderParms,
        preview: bool,
        input: &str,
        source_changed: bool,
        req: &RenderRequest<'_>,
    ) -> WikigraphResult<()> {
        self.uploads.check_upload_allowed(req.user)?;

        if source_changed {
            if let Err(e) = std::fs::write(parms.source_path(preview), input) {
                tracing::debug!(error = %e, "source write failed");
                parms.delete_files(preview);
                return Err(WikigraphError::SourceWriteFailed);
            }
        }

        let timeout = self.settings.render_timeout();
        if let Err(e) = self.runner.run(&parms.image_command(preview), timeout) {
            parms.delete_files(preview);
            return Err(self.strip_cache_paths(e));
        }

        if let Err(e) = self.uploads.check_title_allowed(
            req.user,
            &parms.image_file_name(preview),
            &parms.image_path(preview),
        ) {
            parms.delete_files(preview);
            return Err(e);
        }

        if let Err(e) = self.runner.run(&parms.map_command(preview), timeout) {
            parms.delete_files(preview);
            return Err(self.strip_cache_paths(e));
        }

        // tooltip-only entries link back to the page embedding the graph
        if let Err(e) = map::normalize_map_file(
            &parms.map_path(preview),
            parms.renderer().language(),
            req.title,
        ) {
            parms.delete_files(preview);
            return Err(e);
        }

        Ok(())
    }

    /// Hand the finished image to the upload collaborator.
    ///
    /// A destination page that does not exist yet can only be created
    /// through a fresh placeholder page (creating it directly would
    /// trigger recursive content parsing inside the host). The local image
    /// file is kept in that case so the deferred sweep can upload it under
    /// its real name once parsing has finished.
    fn upload_finished_image(
        &self,
        parms: &RenderParms,
        preview: bool,
        req: &RenderRequest<'_>,
    ) -> WikigraphResult<(String, bool)> {
        let image_file_name = parms.image_file_name(preview);
        let image_path = parms.image_path(preview);
        let comment = upload_comment(req.title);
        let page_text = self.upload_page_text(parms.renderer());

        if self.uploads.uploaded_file(&image_file_name).is_none() {
            match self.uploads.placeholder(parms.image_type()) {
                PlaceholderStatus::Available => {
                    let dest = self
                        .uploads
                        .upload_onto_placeholder(
                            parms.image_type(),
                            &image_path,
                            req.user,
                            &comment,
                        )
                        .inspect_err(|e| {
                            tracing::debug!(error = %e, "placeholder upload failed");
                        })?;
                    tracing::debug!(dest = %dest, "uploaded onto placeholder");
                    Ok((dest, true))
                }
                status => {
                    tracing::debug!(?status, "placeholder unavailable, asking for retry");
                    Err(WikigraphError::RetryRequired)
                }
            }
        } else {
            if let Err(e) = self.uploads.upload_isolated(
                &image_file_name,
                &image_path,
                req.user,
                &comment,
                &page_text,
            ) {
                tracing::debug!(error = %e, name = %image_file_name, "upload failed");
                let _ = std::fs::remove_file(&image_path);
                parms.delete_files(preview);
                return Err(WikigraphError::RetryRequired);
            }
            // image files are removed as soon as they are uploaded
            let _ = std::fs::remove_file(&image_path);
            Ok((image_file_name, false))
        }
    }

    fn upload_page_text(&self, renderer: Renderer) -> String {
        if self.settings.create_category_pages {
            tag::category_tags(renderer)
        } else {
            String::new()
        }
    }

    /// Strip internal directory prefixes out of renderer diagnostics before
    /// they reach the user.
    fn strip_cache_paths(&self, err: WikigraphError) -> WikigraphError {
        match err {
            WikigraphError::RendererInvocationFailed(diag) => {
                let mut diag = diag;
                for dir in [self.settings.image_dir(), self.settings.source_and_map_dir()] {
                    let shown = dir.display().to_string();
                    diag = diag.replace(&format!("{shown}{}", std::path::MAIN_SEPARATOR), "");
                    diag = diag.replace(&shown, "");
                }
                WikigraphError::RendererInvocationFailed(diag)
            }
            other => other,
        }
    }

    fn resolve_image_type(&self, language: GraphLanguage, attrs: &TagAttrs) -> String {
        match attrs.format.as_deref() {
            Some(format) if language.supports_image_type(format) => format.to_ascii_lowercase(),
            Some(format) => {
                tracing::debug!(format, "unsupported image type, using default");
                self.settings.default_image_type.clone()
            }
            None => self.settings.default_image_type.clone(),
        }
    }

    /// A save of `title` is starting: begin tracking active files and make
    /// sure every allowed image type has a fresh placeholder page.
    pub fn on_before_save(&self, title: &str, user: &str) -> WikigraphResult<()> {
        tracing::debug!(title, "save starting");
        self.registry.begin_save(title);
        self.ensure_placeholders(user)?;
        Ok(())
    }

    /// An edit preview is about to parse: placeholders must exist first.
    pub fn on_edit_preview(&self, user: &str) -> WikigraphResult<usize> {
        self.ensure_placeholders(user)
    }

    /// Parsing finished for a page view: upload any graph images still
    /// sitting in the image directory under their real names. Returns the
    /// number uploaded.
    pub fn on_page_rendered(&self, title: &str, user: &str) -> usize {
        self.sweep_pending_uploads(title, user)
    }

    /// A save of `title` finished: run the deferred-upload sweep, delete
    /// every cached source/map file for the title that no rendered graph
    /// claimed as active, and drop the per-save state.
    pub fn on_save_complete(&self, title: &str, user: &str) -> usize {
        let uploaded = self.sweep_pending_uploads(title, user);
        self.delete_inactive_files(title);
        self.registry.finish_save(title);
        tracing::debug!(title, uploaded, "save complete");
        uploaded
    }

    /// The article was deleted: remove every cached file for its graphs.
    /// Uploaded images are the host's own to delete.
    pub fn on_article_deleted(&self, title: &str) -> usize {
        let prefix = friendly_name(title);
        delete_matching(&self.settings.source_and_map_dir(), &prefix)
            + delete_matching(&self.settings.image_dir(), &prefix)
    }

    /// Provision a placeholder page for every supported and allowed image
    /// type that lacks a fresh one, by rendering a trivial built-in graph.
    /// Per-type failures are logged and skipped; a type whose placeholder
    /// cannot be provisioned will surface as `RetryRequired` at render
    /// time. Returns the number provisioned.
    pub fn ensure_placeholders(&self, user: &str) -> WikigraphResult<usize> {
        let source_map_dir = self.settings.source_and_map_dir();
        let image_dir = self.settings.image_dir();
        ensure_cache_dir(&source_map_dir)?;
        ensure_cache_dir(&image_dir)?;

        let mut provisioned = 0;
        for image_type in SUPPORTED_DOT_IMAGE_TYPES {
            if !self.uploads.image_type_allowed(image_type) {
                continue;
            }
            if self.uploads.placeholder(image_type) == PlaceholderStatus::Available {
                continue;
            }

            let parms = RenderParms::new(
                Renderer::Dot,
                PLACEHOLDER_GRAPH_NAME,
                user,
                *image_type,
                self.settings.renderer_dir(Renderer::Dot),
                &source_map_dir,
                &image_dir,
            );

            let result = self.render_placeholder(&parms);
            parms.delete_files(false);
            match result {
                Ok(()) => provisioned += 1,
                Err(e) => {
                    tracing::warn!(image_type, error = %e, "placeholder provisioning failed");
                }
            }
        }
        Ok(provisioned)
    }

    fn render_placeholder(&self, parms: &RenderParms) -> WikigraphResult<()> {
        std::fs::write(parms.source_path(false), PLACEHOLDER_SOURCE)
            .map_err(|_| WikigraphError::SourceWriteFailed)?;
        self.runner
            .run(&parms.image_command(false), self.settings.render_timeout())?;
        self.uploads
            .install_placeholder(parms.image_type(), &parms.image_path(false))
    }

    /// Upload every image file in the image directory belonging to the
    /// title. Successful uploads remove the local file; failed ones remove
    /// the graph's whole triple so the next render starts clean.
    fn sweep_pending_uploads(&self, title: &str, user: &str) -> usize {
        let prefix = friendly_name(title);
        if prefix.is_empty() {
            return 0;
        }
        let image_dir = self.settings.image_dir();
        let Ok(entries) = std::fs::read_dir(&image_dir) else {
            return 0;
        };

        let comment = upload_comment(title);
        let mut uploaded = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(&prefix) || !name.contains('.') || !path.is_file() {
                continue;
            }

            let renderer = renderer_from_image_name(name);
            let page_text = self.upload_page_text(renderer);

            match self
                .uploads
                .upload_isolated(name, &path, user, &comment, &page_text)
            {
                Ok(()) => {
                    let _ = std::fs::remove_file(&path);
                    uploaded += 1;
                    tracing::debug!(name, "deferred upload done");
                }
                Err(e) => {
                    tracing::warn!(name, error = %e, "deferred upload failed");
                    let _ = std::fs::remove_file(&path);
                    // image stems carry a trailing `_{renderer}` segment
                    // that the source and map names do not
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        let base = stem.rsplit_once('_').map_or(stem, |(base, _)| base);
                        let dir = self.settings.source_and_map_dir();
                        for ext in ["dot", "mscgen", "map"] {
                            let _ = std::fs::remove_file(dir.join(format!("{base}.{ext}")));
                        }
                    }
                }
            }
        }
        uploaded
    }

    fn delete_inactive_files(&self, title: &str) {
        let prefix = friendly_name(title);
        if prefix.is_empty() {
            return;
        }
        let dir = self.settings.source_and_map_dir();
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(&prefix) || !name.contains('.') {
                continue;
            }
            if !self.registry.is_active(title, &path) {
                tracing::debug!(path = %path.display(), "deleting inactive file");
                let _ = std::fs::remove_file(&path);
            }
        }
    }
}

/// Graph identity: page title + graph-source title (text before the first
/// `{`) + optional uniquifier, sanitized into one cache-safe name.
pub fn graph_identity(page_title: &str, input: &str, uniquifier: Option<&str>) -> String {
    let source_title = match input.find('{') {
        Some(i) => input[..i].trim(),
        None => "",
    };
    let mut raw = format!("{page_title}_{source_title}");
    if let Some(uniquifier) = uniquifier {
        raw.push('_');
        raw.push_str(uniquifier);
    }
    friendly_name(&raw)
}

fn ensure_cache_dir(dir: &Path) -> WikigraphResult<()> {
    // A parent-dir component in a derived cache path can only mean a bug or
    // an attack; refuse to run rather than create directories outside the
    // upload area.
    for component in dir.components() {
        if component == Component::ParentDir {
            panic!("directory traversal detected in cache path '{}'", dir.display());
        }
    }
    std::fs::create_dir_all(dir)
        .map_err(|_| WikigraphError::DirectoryCreateFailed(dir.display().to_string()))
}

fn is_source_changed(source_path: &Path, input: &str) -> WikigraphResult<bool> {
    match std::fs::read_to_string(source_path) {
        Ok(stored) => Ok(stored != input),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(e) => {
            tracing::debug!(path = %source_path.display(), error = %e, "source read failed");
            Err(WikigraphError::SourceReadFailed)
        }
    }
}

/// Delete every file in `dir` whose name starts with `prefix` and has an
/// extension. Prefix matching mirrors the cache's `{identity}*.*` naming;
/// it is deliberately coarse, as the identity embeds the full page title.
fn delete_matching(dir: &Path, prefix: &str) -> usize {
    if prefix.is_empty() {
        return 0;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    let mut deleted = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with(prefix) && name.contains('.') && std::fs::remove_file(&path).is_ok() {
            tracing::debug!(path = %path.display(), "deleted cached file");
            deleted += 1;
        }
    }
    deleted
}

fn upload_comment(title: &str) -> String {
    format!("Graph generated for page {title}")
}

/// The renderer name is the final `_`-separated segment of an image file
/// stem (`{identity}_{renderer}.{type}`).
fn renderer_from_image_name(file_name: &str) -> Renderer {
    let stem = file_name.rsplit_once('.').map(|(s, _)| s).unwrap_or(file_name);
    stem.rsplit('_')
        .next()
        .and_then(Renderer::from_name)
        .unwrap_or(Renderer::Dot)
}
