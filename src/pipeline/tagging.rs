use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use super::catalog::TrackMeta;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("tagging failed: {0}")]
pub struct TagError(pub String);

/// Embeds track metadata into an audio file in place.
#[async_trait]
pub trait Tagger: Send + Sync + 'static {
    async fn tag(&self, path: &Path, meta: &TrackMeta, cover: Option<&[u8]>) -> Result<(), TagError>;
}
