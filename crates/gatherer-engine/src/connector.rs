//! Primary connector contract and the tabular connector.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gatherer_state::{TabularStore, TriggerScheduler};
use gatherer_types::{DatasetConfig, DatasetId, FetchError, FetchRequest, FetchResponse, Grid, Record};

use crate::config::types::HelperSettings;
use crate::errors::PipelineError;
use crate::ledger::TriggerLedger;
use crate::result::InitReport;
use crate::schema::{self, Header, SchemaMapper};

/// Fetch capability. Transport is entirely up to the implementation.
#[async_trait]
pub trait ApiHandler: Send + Sync {
    /// Perform one request. Non-2xx responses may be returned as `Ok`; the
    /// pipeline classifies them.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] for transport-level failures.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// A source dataset as read by the connector.
#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub dataset: DatasetId,
    pub header: Header,
    pub records: Vec<Record>,
}

/// Write cursor for one run's destination. Tracks a local copy of the
/// destination so consecutive batches append after each other.
#[derive(Debug)]
pub struct Destination {
    pub dataset: DatasetId,
    config: DatasetConfig,
    header: Arc<Header>,
    snapshot: Grid,
}

/// The primary connector selected by `helper`.
#[async_trait]
pub trait Connector: Send + Sync {
    fn id(&self) -> &str;

    /// Idempotent environment setup: ensure triggers, record the init time.
    async fn init(&self) -> Result<InitReport, PipelineError>;

    /// Read every record of a source dataset.
    async fn load(&self, dataset: &DatasetId) -> Result<LoadedDataset, PipelineError>;

    /// Read the destination header (cached) and its current extent.
    async fn open_destination(&self, dataset: &DatasetId) -> Result<Destination, PipelineError>;

    /// Append `records` with one store write.
    ///
    /// A rejected write is returned as [`PipelineError::Store`]; a batch
    /// that does not fit the header fails before anything is written.
    async fn write_batch(
        &self,
        destination: &mut Destination,
        records: &[Record],
    ) -> Result<(), PipelineError>;

    /// Values from the environment-variables dataset, if one is configured.
    async fn env_vars(&self) -> Result<BTreeMap<String, String>, PipelineError>;

    /// Fetch through [`Connector::api_handler`], applying the connector's
    /// timeout.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;

    fn api_handler(&self) -> &dyn ApiHandler;
}

/// Connector over a [`TabularStore`].
pub struct TabularConnector {
    settings: HelperSettings,
    store: Arc<dyn TabularStore>,
    api: Arc<dyn ApiHandler>,
    ledger: TriggerLedger,
    mapper: SchemaMapper,
    fetch_timeout: Option<Duration>,
}

impl TabularConnector {
    pub const ID: &'static str = "tabular";

    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the system dataset has no tab
    /// configuration.
    pub fn new(
        settings: HelperSettings,
        store: Arc<dyn TabularStore>,
        scheduler: Arc<dyn TriggerScheduler>,
        api: Arc<dyn ApiHandler>,
        fetch_timeout: Option<Duration>,
    ) -> Result<Self, PipelineError> {
        let system_config = settings
            .tab(&settings.system_tab_id)
            .cloned()
            .ok_or_else(|| {
                PipelineError::config(format!(
                    "system dataset '{}' has no tab configuration",
                    settings.system_tab_id
                ))
            })?;
        let ledger = TriggerLedger::new(
            Arc::clone(&store),
            scheduler,
            settings.system_tab_id.clone(),
            system_config,
        );
        Ok(Self {
            settings,
            store,
            api,
            ledger,
            mapper: SchemaMapper::new(),
            fetch_timeout,
        })
    }

    fn tab(&self, dataset: &DatasetId) -> Result<&DatasetConfig, PipelineError> {
        self.settings.tab(dataset).ok_or_else(|| {
            PipelineError::config(format!("dataset '{dataset}' has no tab configuration"))
        })
    }
}

#[async_trait]
impl Connector for TabularConnector {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn init(&self) -> Result<InitReport, PipelineError> {
        let triggers = self.ledger.ensure_triggers().await?;
        let init_timestamp = self
            .ledger
            .record_init(chrono::Utc::now().timestamp_millis())
            .await?;
        tracing::info!(
            store = %self.store.store_id(),
            triggers = triggers.len(),
            created = triggers.iter().filter(|t| t.created).count(),
            init_timestamp,
            "Connector initialized"
        );
        Ok(InitReport {
            triggers,
            init_timestamp,
        })
    }

    async fn load(&self, dataset: &DatasetId) -> Result<LoadedDataset, PipelineError> {
        let config = self.tab(dataset)?;
        let grid = self.store.read_range(dataset).await?;
        let header = Header::read(dataset, &grid, config)?;
        let records = schema::records_with_header(&header, &grid, config);
        tracing::debug!(dataset = %dataset, records = records.len(), "Loaded dataset");
        Ok(LoadedDataset {
            dataset: dataset.clone(),
            header,
            records,
        })
    }

    async fn open_destination(&self, dataset: &DatasetId) -> Result<Destination, PipelineError> {
        let config = self.tab(dataset)?.clone();
        let snapshot = self.store.read_range(dataset).await?;
        let header = self.mapper.destination_header(dataset, &snapshot, &config)?;
        Ok(Destination {
            dataset: dataset.clone(),
            config,
            header,
            snapshot,
        })
    }

    async fn write_batch(
        &self,
        destination: &mut Destination,
        records: &[Record],
    ) -> Result<(), PipelineError> {
        if records.is_empty() {
            return Ok(());
        }
        let patch = schema::to_patch(
            &destination.dataset,
            records,
            &destination.header,
            &destination.config,
            &destination.snapshot,
        )?;
        self.store
            .write_range(
                &destination.dataset,
                patch.start_row,
                patch.start_col,
                patch.values.clone(),
            )
            .await?;
        patch.apply(&mut destination.snapshot);
        Ok(())
    }

    async fn env_vars(&self) -> Result<BTreeMap<String, String>, PipelineError> {
        let Some(ref dataset) = self.settings.env_vars_tab_id else {
            return Ok(BTreeMap::new());
        };
        let loaded = self.load(dataset).await?;
        Ok(loaded
            .records
            .first()
            .map(|record| {
                record
                    .iter()
                    .filter(|(_, value)| !value.is_blank())
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let Some(limit) = self.fetch_timeout else {
            return self.api.fetch(request).await;
        };
        match tokio::time::timeout(limit, self.api.fetch(request)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::timeout(
                "FETCH_TIMEOUT",
                format!("no response from {} within {}ms", request.url, limit.as_millis()),
            )),
        }
    }

    fn api_handler(&self) -> &dyn ApiHandler {
        self.api.as_ref()
    }
}
