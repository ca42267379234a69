//! PackageResolver - パッケージを実際に持つ上流タグの特定
//!
//! まず設定されたタグを見て、なければ直接の継承親に 1 回だけフォールバックする。
//! 祖父母タグは見ない。

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::RemoteError;
use crate::domain::seek::{first_str, has_rows};
use crate::ports::BuildSystem;

pub struct PackageResolver {
    upstream: Arc<dyn BuildSystem>,
    tag: String,
}

impl PackageResolver {
    pub fn new(upstream: Arc<dyn BuildSystem>, tag: impl Into<String>) -> Self {
        Self {
            upstream,
            tag: tag.into(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The tag under which `package` has builds, or `None`.
    ///
    /// When the parent tag is returned, every later query for this package
    /// must use it instead of the configured tag.
    pub async fn resolve_tag(&self, package: &str) -> Result<Option<String>, RemoteError> {
        let builds = self.upstream.latest_rpms(&self.tag, package).await?;
        if has_rows(&builds) {
            return Ok(Some(self.tag.clone()));
        }

        let inheritance = self.upstream.inheritance(&self.tag).await?;
        let Some(parent) = first_str(&inheritance, "name") else {
            debug!(package, tag = %self.tag, "tag has no parent to fall back to");
            return Ok(None);
        };

        let builds = self.upstream.latest_rpms(parent, package).await?;
        if !has_rows(&builds) {
            return Ok(None);
        }

        info!(
            package,
            tag = %self.tag,
            parent,
            "package is available under parent tag, switching to it"
        );
        Ok(Some(parent.to_string()))
    }
}
