#![forbid(unsafe_code)]

pub mod cache;
pub mod config;
pub mod error;
pub mod exec;
pub mod html;
pub mod map;
pub mod name;
pub mod params;
pub mod registry;
pub mod sanitize;
pub mod tag;
pub mod upload;

pub use cache::{ContentExpander, NoExpansion, Orchestrator, RenderOutput, RenderRequest};
pub use config::Settings;
pub use error::{WikigraphError, WikigraphResult};
pub use exec::{CommandRunner, SystemRunner};
pub use params::{GraphLanguage, RenderParms, Renderer};
pub use tag::{GraphTag, TagAttrs};
pub use upload::{DirUploadStore, PlaceholderStatus, UploadStore};
