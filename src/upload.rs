use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::Context as _;

use crate::error::{WikigraphError, WikigraphResult};

/// A file the host already stores under a public name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    pub local_path: PathBuf,
}

/// State of the pre-provisioned placeholder page for one image type.
///
/// Uploading onto a fresh placeholder page is the only way to create a new
/// image destination without triggering the host's recursive content
/// parsing; a consumed or missing placeholder means the render must be
/// retried after re-provisioning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaceholderStatus {
    Available,
    Consumed,
    Missing,
}

/// Host collaborator owning binary file storage and upload policy.
///
/// `upload_isolated` must suppress any host-side re-parsing triggered by the
/// upload (the "upload in isolated mode" capability); implementations that
/// have no such reentrancy concern may treat it as a plain store.
pub trait UploadStore: Send + Sync {
    /// System- and user-level upload capability check.
    fn check_upload_allowed(&self, user: &str) -> WikigraphResult<()>;

    /// Title-level check; the local file must exist before this is called.
    fn check_title_allowed(
        &self,
        user: &str,
        dest_name: &str,
        local_path: &Path,
    ) -> WikigraphResult<()>;

    /// Store `local_path` under `dest_name`, suppressing host re-parsing.
    fn upload_isolated(
        &self,
        dest_name: &str,
        local_path: &Path,
        user: &str,
        comment: &str,
        page_text: &str,
    ) -> WikigraphResult<()>;

    /// Store `local_path` over the fresh placeholder page for `image_type`,
    /// consuming it. Returns the destination name actually used. The local
    /// file is left in place for the deferred real-name upload sweep.
    fn upload_onto_placeholder(
        &self,
        image_type: &str,
        local_path: &Path,
        user: &str,
        comment: &str,
    ) -> WikigraphResult<String>;

    fn uploaded_file(&self, name: &str) -> Option<UploadedFile>;

    fn delete_uploaded(&self, name: &str);

    fn placeholder(&self, image_type: &str) -> PlaceholderStatus;

    /// (Re-)provision the placeholder page for `image_type` from a rendered
    /// trivial graph image, making it Available again.
    fn install_placeholder(&self, image_type: &str, local_path: &Path) -> WikigraphResult<()>;

    /// Whether the host accepts files of this type at all.
    fn image_type_allowed(&self, image_type: &str) -> bool;
}

/// Basename prefix used for placeholder image pages.
pub const PLACEHOLDER_BASENAME: &str = "File_graph_placeholder";

pub fn placeholder_file_name(image_type: &str) -> String {
    format!("{PLACEHOLDER_BASENAME}.{image_type}")
}

/// Directory-backed [`UploadStore`] used by the CLI and integration tests.
/// Files are copied into a flat store directory; placeholder state is kept
/// in memory (a fresh process starts with every placeholder Missing, the
/// same as a fresh wiki).
pub struct DirUploadStore {
    root: PathBuf,
    allowed_types: Vec<String>,
    placeholders: Mutex<HashMap<String, PlaceholderStatus>>,
}

impl DirUploadStore {
    pub fn new(root: impl Into<PathBuf>) -> WikigraphResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("create upload store '{}'", root.display()))?;
        Ok(Self {
            root,
            allowed_types: ["png", "gif", "jpg", "jpeg", "svg"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            placeholders: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn stored_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn copy_in(&self, dest_name: &str, local_path: &Path) -> WikigraphResult<()> {
        let dest = self.stored_path(dest_name);
        std::fs::copy(local_path, &dest).map_err(|e| {
            WikigraphError::UploadVerificationFailed(format!(
                "failed to store '{dest_name}': {e}"
            ))
        })?;
        tracing::debug!(name = dest_name, "stored uploaded file");
        Ok(())
    }
}

impl UploadStore for DirUploadStore {
    fn check_upload_allowed(&self, _user: &str) -> WikigraphResult<()> {
        Ok(())
    }

    fn check_title_allowed(
        &self,
        _user: &str,
        dest_name: &str,
        local_path: &Path,
    ) -> WikigraphResult<()> {
        if !local_path.is_file() {
            return Err(WikigraphError::UploadVerificationFailed(format!(
                "local file '{}' does not exist",
                local_path.display()
            )));
        }
        let ext = Path::new(dest_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !self.allowed_types.contains(&ext) {
            return Err(WikigraphError::UploadVerificationFailed(format!(
                "file type '{ext}' is not permitted"
            )));
        }
        Ok(())
    }

    fn upload_isolated(
        &self,
        dest_name: &str,
        local_path: &Path,
        _user: &str,
        _comment: &str,
        _page_text: &str,
    ) -> WikigraphResult<()> {
        self.copy_in(dest_name, local_path)
    }

    fn upload_onto_placeholder(
        &self,
        image_type: &str,
        local_path: &Path,
        _user: &str,
        _comment: &str,
    ) -> WikigraphResult<String> {
        let mut placeholders = self.placeholders.lock().expect("placeholder lock");
        match placeholders
            .get(image_type)
            .copied()
            .unwrap_or(PlaceholderStatus::Missing)
        {
            PlaceholderStatus::Available => {}
            _ => return Err(WikigraphError::RetryRequired),
        }
        let dest_name = placeholder_file_name(image_type);
        self.copy_in(&dest_name, local_path)?;
        placeholders.insert(image_type.to_string(), PlaceholderStatus::Consumed);
        Ok(dest_name)
    }

    fn uploaded_file(&self, name: &str) -> Option<UploadedFile> {
        let path = self.stored_path(name);
        path.is_file().then(|| UploadedFile {
            name: name.to_string(),
            local_path: path,
        })
    }

    fn delete_uploaded(&self, name: &str) {
        let _ = std::fs::remove_file(self.stored_path(name));
    }

    fn placeholder(&self, image_type: &str) -> PlaceholderStatus {
        self.placeholders
            .lock()
            .expect("placeholder lock")
            .get(image_type)
            .copied()
            .unwrap_or(PlaceholderStatus::Missing)
    }

    fn install_placeholder(&self, image_type: &str, local_path: &Path) -> WikigraphResult<()> {
        self.copy_in(&placeholder_file_name(image_type), local_path)?;
        self.placeholders
            .lock()
            .expect("placeholder lock")
            .insert(image_type.to_string(), PlaceholderStatus::Available);
        Ok(())
    }

    fn image_type_allowed(&self, image_type: &str) -> bool {
        self.allowed_types
            .contains(&image_type.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "wikigraph_{name}_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    #[test]
    fn placeholder_is_single_use() {
        let tmp = temp_dir("upload_placeholder");
        std::fs::create_dir_all(&tmp).unwrap();
        let src = tmp.join("g.png");
        std::fs::write(&src, b"fake png").unwrap();

        let store = DirUploadStore::new(tmp.join("store")).unwrap();
        assert_eq!(store.placeholder("png"), PlaceholderStatus::Missing);
        assert!(matches!(
            store.upload_onto_placeholder("png", &src, "Alice", "c"),
            Err(WikigraphError::RetryRequired)
        ));

        store.install_placeholder("png", &src).unwrap();
        assert_eq!(store.placeholder("png"), PlaceholderStatus::Available);

        let dest = store
            .upload_onto_placeholder("png", &src, "Alice", "c")
            .unwrap();
        assert_eq!(dest, placeholder_file_name("png"));
        assert_eq!(store.placeholder("png"), PlaceholderStatus::Consumed);
        assert!(matches!(
            store.upload_onto_placeholder("png", &src, "Alice", "c"),
            Err(WikigraphError::RetryRequired)
        ));

        std::fs::remove_dir_all(&tmp).ok();
    }

    #[test]
    fn title_check_rejects_unknown_extension_and_missing_file() {
        let tmp = temp_dir("upload_title_check");
        std::fs::create_dir_all(&tmp).unwrap();
        let src = tmp.join("g.png");
        std::fs::write(&src, b"fake png").unwrap();

        let store = DirUploadStore::new(tmp.join("store")).unwrap();
        assert!(store.check_title_allowed("Alice", "g.png", &src).is_ok());
        assert!(store.check_title_allowed("Alice", "g.exe", &src).is_err());
        assert!(
            store
                .check_title_allowed("Alice", "g.png", &tmp.join("absent.png"))
                .is_err()
        );

        std::fs::remove_dir_all(&tmp).ok();
    }

    #[test]
    fn uploaded_file_round_trip() {
        let tmp = temp_dir("upload_round_trip");
        std::fs::create_dir_all(&tmp).unwrap();
        let src = tmp.join("g.png");
        std::fs::write(&src, b"fake png").unwrap();

        let store = DirUploadStore::new(tmp.join("store")).unwrap();
        assert!(store.uploaded_file("g.png").is_none());
        store
            .upload_isolated("g.png", &src, "Alice", "comment", "")
            .unwrap();
        let stored = store.uploaded_file("g.png").unwrap();
        assert_eq!(std::fs::read(&stored.local_path).unwrap(), b"fake png");

        store.delete_uploaded("g.png");
        assert!(store.uploaded_file("g.png").is_none());

        std::fs::remove_dir_all(&tmp).ok();
    }
}
