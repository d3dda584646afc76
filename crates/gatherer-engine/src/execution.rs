//! Run invocation types.

use gatherer_types::DatasetId;

/// What to run: read `src_dataset_id`, keep records passing every filter,
/// append results to `dest_dataset_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub src_dataset_id: DatasetId,
    pub dest_dataset_id: DatasetId,
    pub filters: Vec<String>,
}

impl RunRequest {
    pub fn new(src: impl Into<DatasetId>, dest: impl Into<DatasetId>) -> Self {
        Self {
            src_dataset_id: src.into(),
            dest_dataset_id: dest.into(),
            filters: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }
}

/// Runtime execution options (not part of the configuration file).
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Fetch and batch, but skip destination writes.
    pub dry_run: bool,
    /// Maximum number of selected records to process.
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_options_default_is_normal_mode() {
        let opts = ExecutionOptions::default();
        assert!(!opts.dry_run);
        assert!(opts.limit.is_none());
    }

    #[test]
    fn request_builder_collects_filters() {
        let request = RunRequest::new("Sources-1", "Results-1")
            .with_filter("selected")
            .with_filter("!archived");
        assert_eq!(request.src_dataset_id.as_str(), "Sources-1");
        assert_eq!(request.filters, vec!["selected", "!archived"]);
    }
}
