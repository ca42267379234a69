//! DuplicateDetector - 上流ビルドが既に下流にあるか

use std::sync::Arc;

use tracing::debug;

use crate::domain::seek::{first_i64, source_nvr};
use crate::domain::{BuildState, RemoteError};
use crate::ports::{BuildRef, BuildSystem};

pub struct DuplicateDetector {
    upstream: Arc<dyn BuildSystem>,
    downstream: Arc<dyn BuildSystem>,
}

impl DuplicateDetector {
    pub fn new(upstream: Arc<dyn BuildSystem>, downstream: Arc<dyn BuildSystem>) -> Self {
        Self {
            upstream,
            downstream,
        }
    }

    /// True when downstream already has the upstream source NVR.
    ///
    /// Either the latest downstream build under `down_tag` has the same NVR, or
    /// a build with that NVR exists downstream in the complete state (built but
    /// not yet visible under the tag). A missing record on either side means
    /// "not a duplicate".
    pub async fn already_built(
        &self,
        package: &str,
        up_tag: &str,
        down_tag: &str,
    ) -> Result<bool, RemoteError> {
        let upstream_rows = self.upstream.latest_rpms(up_tag, package).await?;
        let Some(nvr) = source_nvr(&upstream_rows) else {
            debug!(package, tag = up_tag, "no upstream source rpm to compare");
            return Ok(false);
        };

        let downstream_rows = self.downstream.latest_rpms(down_tag, package).await?;
        if source_nvr(&downstream_rows).as_deref() == Some(nvr.as_str()) {
            return Ok(true);
        }

        let Some(build) = self.downstream.get_build(BuildRef::Nvr(&nvr)).await? else {
            return Ok(false);
        };
        let state = first_i64(&build, "state").and_then(BuildState::from_code);
        Ok(state == Some(BuildState::Complete))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryBuildSystem, RpmBuild};

    fn hubs() -> (Arc<InMemoryBuildSystem>, Arc<InMemoryBuildSystem>) {
        (Arc::new(InMemoryBuildSystem::new()), Arc::new(InMemoryBuildSystem::new()))
    }

    #[tokio::test]
    async fn same_nvr_under_downstream_tag_is_duplicate() {
        let (up, down) = hubs();
        up.add_build("f40", RpmBuild::new("q", "1.0", "1").arches(["src", "noarch"]));
        down.add_build("mirror", RpmBuild::new("q", "1.0", "1").arches(["src", "noarch"]));
        let detector = DuplicateDetector::new(up, down);

        assert!(detector.already_built("q", "f40", "mirror").await.unwrap());
    }

    #[tokio::test]
    async fn complete_build_outside_tag_is_duplicate() {
        let (up, down) = hubs();
        up.add_build("f40", RpmBuild::new("q", "1.0", "1"));
        down.add_build_record("q-1.0-1", BuildState::Complete);
        let detector = DuplicateDetector::new(up, down);

        assert!(detector.already_built("q", "f40", "mirror").await.unwrap());
    }

    #[tokio::test]
    async fn failed_build_is_not_duplicate() {
        let (up, down) = hubs();
        up.add_build("f40", RpmBuild::new("q", "1.0", "1"));
        down.add_build_record("q-1.0-1", BuildState::Failed);
        let detector = DuplicateDetector::new(up, down);

        assert!(!detector.already_built("q", "f40", "mirror").await.unwrap());
    }

    #[tokio::test]
    async fn older_downstream_release_is_not_duplicate() {
        let (up, down) = hubs();
        up.add_build("f40", RpmBuild::new("q", "1.0", "2"));
        down.add_build("mirror", RpmBuild::new("q", "1.0", "1"));
        let detector = DuplicateDetector::new(up, down);

        assert!(!detector.already_built("q", "f40", "mirror").await.unwrap());
    }

    #[tokio::test]
    async fn absent_records_are_not_duplicates() {
        let (up, down) = hubs();
        let detector = DuplicateDetector::new(up, down);
        assert!(!detector.already_built("q", "f40", "mirror").await.unwrap());
    }
}
