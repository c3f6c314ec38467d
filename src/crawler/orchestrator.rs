//! Per-provider crawl: dataflows, then either whole catalogs (bulk) or only
//! what the dataflows reference (targeted), then categories.

use crate::data::load;
use crate::data::providers::Provider;
use crate::data::records::LoadCounts;
use crate::data::store::MetadataStore;
use crate::sdmx::fetch::{FailedReference, FanOut, StructureFetcher};
use crate::sdmx::models::Dataflow;
use crate::sdmx::refs::{extract_codelist_refs, extract_concept_refs, extract_data_structure_refs};
use crate::sdmx::SdmxError;
use crate::utils::fmt_duration;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Bulk,
    Targeted,
}

/// A secondary catalog that was absent or could not be fetched.
#[derive(Debug, Clone, Serialize)]
pub struct Omission {
    pub catalog: &'static str,
    pub kind: &'static str,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub strategy: Strategy,
    pub categories: bool,
    pub counts: LoadCounts,
    pub failures: Vec<FailedReference>,
    pub skipped_unsupported: usize,
    pub omissions: Vec<Omission>,
}

impl CrawlReport {
    fn new(strategy: Strategy, categories: bool) -> Self {
        Self {
            strategy,
            categories,
            counts: LoadCounts::default(),
            failures: Vec::new(),
            skipped_unsupported: 0,
            omissions: Vec::new(),
        }
    }

    /// True when some reference failed or a secondary catalog was omitted.
    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty() || !self.omissions.is_empty()
    }

    fn absorb<T>(&mut self, fan_out: &mut FanOut<T>) {
        self.failures.append(&mut fan_out.failures);
        self.skipped_unsupported += fan_out.skipped_unsupported;
    }

    fn record(&mut self, stage: Result<LoadCounts, Omission>) {
        match stage {
            Ok(counts) => self.counts.merge(counts),
            Err(omission) => self.omissions.push(omission),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("Failed to fetch the dataflow catalog")]
    Dataflows(#[source] SdmxError),
    #[error("Failed to persist {entity}")]
    Storage {
        entity: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

fn storage(entity: &'static str) -> impl FnOnce(anyhow::Error) -> CrawlError {
    move |source| CrawlError::Storage { entity, source }
}

fn omit(catalog: &'static str, error: SdmxError) -> Omission {
    warn!(catalog, kind = error.kind(), error = %error, "Catalog omitted from crawl");
    Omission {
        catalog,
        kind: error.kind(),
        reason: error.to_string(),
    }
}

/// Runs crawls against one registry and writes into one store.
pub struct Crawler {
    fetcher: StructureFetcher,
    store: Arc<dyn MetadataStore>,
    label_language: String,
}

impl Crawler {
    pub fn new(
        fetcher: StructureFetcher,
        store: Arc<dyn MetadataStore>,
        label_language: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            store,
            label_language: label_language.into(),
        }
    }

    /// Crawl one provider end to end.
    ///
    /// Only a failure on the dataflow catalog (or in storage) fails the run.
    /// Everything else is recorded in the report.
    #[tracing::instrument(skip_all, fields(provider_id = provider.id, agency = provider.agency_id.as_str()))]
    pub async fn collect(&self, provider: &Provider) -> Result<CrawlReport, CrawlError> {
        let start = Instant::now();
        let strategy = if provider.bulk_download {
            Strategy::Bulk
        } else {
            Strategy::Targeted
        };
        let mut report = CrawlReport::new(strategy, !provider.skip_categories);
        let agency = provider.agency_filter();
        let store = self.store.as_ref();
        let lang = self.label_language.as_str();

        let dataflows = self
            .fetcher
            .fetch_all_dataflows(agency)
            .await
            .map_err(CrawlError::Dataflows)?;
        report.counts.merge(
            load::load_dataflows(store, lang, &dataflows)
                .await
                .map_err(storage("dataflows"))?,
        );
        debug!(count = dataflows.len(), "Dataflows loaded");

        match strategy {
            Strategy::Bulk => self.collect_bulk(agency, &mut report).await?,
            Strategy::Targeted => self.collect_targeted(&dataflows, &mut report).await?,
        }

        if provider.skip_categories {
            debug!("Skipping categories");
        } else {
            self.collect_categories(agency, &mut report).await?;
        }

        info!(
            strategy = ?report.strategy,
            rows = report.counts.total(),
            failures = report.failures.len(),
            omissions = report.omissions.len(),
            skipped_unsupported = report.skipped_unsupported,
            duration = fmt_duration(start.elapsed()),
            "Crawl finished{}",
            if report.is_degraded() { " with omissions" } else { "" }
        );
        Ok(report)
    }

    /// Fetch the agency's whole data structure, codelist and concept scheme
    /// catalogs concurrently, loading each as it arrives.
    async fn collect_bulk(
        &self,
        agency: Option<&str>,
        report: &mut CrawlReport,
    ) -> Result<(), CrawlError> {
        let store = self.store.as_ref();
        let lang = self.label_language.as_str();

        let data_structures = async {
            match self.fetcher.fetch_all_data_structures(agency).await {
                Ok(items) => load::load_data_structures(store, lang, &items)
                    .await
                    .map(Ok)
                    .map_err(storage("data structures")),
                Err(e) => Ok(Err(omit("data structures", e))),
            }
        };
        let codelists = async {
            match self.fetcher.fetch_all_codelists(agency).await {
                Ok(items) => load::load_codelists(store, lang, &items)
                    .await
                    .map(Ok)
                    .map_err(storage("codelists")),
                Err(e) => Ok(Err(omit("codelists", e))),
            }
        };
        let concept_schemes = async {
            match self.fetcher.fetch_all_concept_schemes(agency).await {
                Ok(items) => load::load_concept_schemes(store, lang, &items)
                    .await
                    .map(Ok)
                    .map_err(storage("concept schemes")),
                Err(e) => Ok(Err(omit("concept schemes", e))),
            }
        };

        let (data_structures, codelists, concept_schemes) =
            tokio::join!(data_structures, codelists, concept_schemes);

        report.record(data_structures?);
        report.record(codelists?);
        report.record(concept_schemes?);
        Ok(())
    }

    /// Fetch only the data structures the dataflows point at, then exactly
    /// the codelists and concept schemes those structures reference.
    async fn collect_targeted(
        &self,
        dataflows: &[Dataflow],
        report: &mut CrawlReport,
    ) -> Result<(), CrawlError> {
        let store = self.store.as_ref();
        let lang = self.label_language.as_str();

        let structure_refs = extract_data_structure_refs(dataflows);
        let mut data_structures = self.fetcher.fetch_data_structures(&structure_refs).await;
        report.absorb(&mut data_structures);

        // Structures go in before anything resolved from them
        report.counts.merge(
            load::load_data_structures(store, lang, &data_structures.items)
                .await
                .map_err(storage("data structures"))?,
        );

        let codelist_refs = extract_codelist_refs(&data_structures.items);
        let concept_refs = extract_concept_refs(&data_structures.items);
        debug!(
            data_structures = data_structures.items.len(),
            codelist_refs = codelist_refs.len(),
            concept_refs = concept_refs.len(),
            "Resolved component references"
        );

        let (mut codelists, mut concept_schemes) = tokio::join!(
            self.fetcher.fetch_codelists(&codelist_refs),
            self.fetcher.fetch_concept_schemes(&concept_refs),
        );
        report.absorb(&mut codelists);
        report.absorb(&mut concept_schemes);

        let (codelist_counts, concept_counts) = tokio::join!(
            load::load_codelists(store, lang, &codelists.items),
            load::load_concept_schemes(store, lang, &concept_schemes.items),
        );
        report
            .counts
            .merge(codelist_counts.map_err(storage("codelists"))?);
        report
            .counts
            .merge(concept_counts.map_err(storage("concept schemes"))?);
        Ok(())
    }

    async fn collect_categories(
        &self,
        agency: Option<&str>,
        report: &mut CrawlReport,
    ) -> Result<(), CrawlError> {
        let store = self.store.as_ref();
        let lang = self.label_language.as_str();

        let (categorisations, category_schemes) = tokio::join!(
            self.fetcher.fetch_all_categorisations(agency),
            self.fetcher.fetch_all_category_schemes(agency),
        );

        match category_schemes {
            Ok(schemes) => {
                let (counts, malformed) = load::load_category_schemes(store, lang, &schemes)
                    .await
                    .map_err(storage("category schemes"))?;
                report.counts.merge(counts);
                for e in malformed {
                    let scheme = match &e {
                        SdmxError::MalformedHierarchy { scheme, .. } => scheme.clone(),
                        _ => "category scheme".to_string(),
                    };
                    report.failures.push(FailedReference::new(scheme, None, &e));
                }
            }
            Err(e) => report.omissions.push(omit("category schemes", e)),
        }

        match categorisations {
            Ok(items) => report.counts.merge(
                load::load_categorisations(store, lang, &items)
                    .await
                    .map_err(storage("categorisations"))?,
            ),
            Err(e) => report.omissions.push(omit("categorisations", e)),
        }
        Ok(())
    }
}
