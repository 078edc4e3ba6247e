//! Version picker view over a partitioned catalog.

use super::catalog::VersionPartition;
use super::VersionId;

const STEP: usize = 5;
const INITIAL_PRODUCTION_SHOWN: usize = 30;
const INITIAL_PREVIEW_SHOWN: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VersionsType {
    Preview,
    #[default]
    Production,
}

/// Which list is selected and how much of each list is visible.
#[derive(Debug, Clone)]
pub struct VersionsView {
    partition: VersionPartition,
    versions_type: VersionsType,
    production_shown: usize,
    preview_shown: usize,
}

impl VersionsView {
    pub fn new(partition: VersionPartition) -> Self {
        Self {
            partition,
            versions_type: VersionsType::Production,
            production_shown: INITIAL_PRODUCTION_SHOWN,
            preview_shown: INITIAL_PREVIEW_SHOWN,
        }
    }

    pub fn versions_type(&self) -> VersionsType {
        self.versions_type
    }

    pub fn select(&mut self, versions_type: VersionsType) {
        self.versions_type = versions_type;
    }

    pub fn partition(&self) -> &VersionPartition {
        &self.partition
    }

    /// Replace the underlying listing, keeping selection and counters.
    pub fn update(&mut self, partition: VersionPartition) {
        self.partition = partition;
    }

    /// Visible slice of the selected list.
    pub fn visible(&self) -> &[VersionId] {
        let (list, shown) = self.selected();
        &list[..shown.min(list.len())]
    }

    pub fn has_more(&self) -> bool {
        let (list, shown) = self.selected();
        shown < list.len()
    }

    /// Show `STEP` more entries of the selected list.
    pub fn show_more(&mut self) {
        match self.versions_type {
            VersionsType::Production => self.production_shown += STEP,
            VersionsType::Preview => self.preview_shown += STEP,
        }
    }

    /// Select the list containing `version` and grow it until the version is visible.
    ///
    /// Returns false if the version is not in the catalog.
    pub fn reveal(&mut self, version: &VersionId) -> bool {
        let versions_type = if version.is_preview() {
            VersionsType::Preview
        } else {
            VersionsType::Production
        };
        self.versions_type = versions_type;

        let position = match versions_type {
            VersionsType::Production => self.partition.production_versions.iter().position(|v| v == version),
            VersionsType::Preview => self.partition.preview_versions.iter().position(|v| v == version),
        };
        let Some(position) = position else {
            return false;
        };

        let shown = match versions_type {
            VersionsType::Production => &mut self.production_shown,
            VersionsType::Preview => &mut self.preview_shown,
        };
        while *shown <= position {
            *shown += STEP;
        }
        true
    }

    /// Newest production build, used as the last-resort fallback target.
    pub fn newest_production(&self) -> Option<&VersionId> {
        self.partition.production_versions.first()
    }

    fn selected(&self) -> (&[VersionId], usize) {
        match self.versions_type {
            VersionsType::Production => (&self.partition.production_versions, self.production_shown),
            VersionsType::Preview => (&self.partition.preview_versions, self.preview_shown),
        }
    }
}
