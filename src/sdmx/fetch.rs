//! Single-structure fetching, catalog fetchers and bounded reference fan-out.

use crate::sdmx::client::{RegistryTransport, StructureRequest, StructureType};
use crate::sdmx::decode::StructureDecoder;
use crate::sdmx::errors::SdmxError;
use crate::sdmx::models::{
    Categorisation, CategoryScheme, Codelist, ConceptScheme, DataStructure, Dataflow, Message,
    StructureRef, Structures,
};
use crate::sdmx::resolve::resolve;
use futures::{StreamExt, stream};
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// A reference that could not be fetched, kept for the crawl report.
#[derive(Debug, Clone, Serialize)]
pub struct FailedReference {
    pub reference: String,
    pub request: Option<String>,
    pub kind: &'static str,
    pub error: String,
}

impl FailedReference {
    pub fn new(
        reference: impl ToString,
        request: Option<&StructureRequest>,
        error: &SdmxError,
    ) -> Self {
        Self {
            reference: reference.to_string(),
            request: request.map(StructureRequest::path),
            kind: error.kind(),
            error: error.to_string(),
        }
    }
}

/// Outcome of fetching a set of references concurrently.
#[derive(Debug)]
pub struct FanOut<T> {
    pub items: Vec<T>,
    pub failures: Vec<FailedReference>,
    pub skipped_unsupported: usize,
}

impl<T> Default for FanOut<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            failures: Vec::new(),
            skipped_unsupported: 0,
        }
    }
}

/// Fetches and decodes structures from one registry.
#[derive(Clone)]
pub struct StructureFetcher {
    transport: Arc<dyn RegistryTransport>,
    decoder: Arc<dyn StructureDecoder>,
    max_in_flight: usize,
}

impl StructureFetcher {
    pub fn new(
        transport: Arc<dyn RegistryTransport>,
        decoder: Arc<dyn StructureDecoder>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            transport,
            decoder,
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Issue one request and classify the outcome.
    ///
    /// No retries are attempted here.
    pub async fn fetch_structure(&self, req: &StructureRequest) -> Result<Structures, SdmxError> {
        let response = self.transport.get_structure(req).await?;

        if !response.is_success() {
            // Registries usually send their error envelope with a 4xx/5xx status
            return match self.decoder.decode(&response.body) {
                Ok(Message::Error(messages)) if !messages.is_empty() => {
                    Err(SdmxError::Registry { messages })
                }
                _ => Err(SdmxError::Transport {
                    url: response.url,
                    status: Some(response.status),
                    source: anyhow::anyhow!("registry returned HTTP {}", response.status),
                }),
            };
        }

        match self.decoder.decode(&response.body)? {
            Message::Structure(structures) => Ok(structures),
            Message::Error(messages) => Err(SdmxError::Registry { messages }),
        }
    }

    async fn fetch_all<T>(
        &self,
        resource: StructureType,
        agency_id: Option<&str>,
        pick: fn(Structures) -> Option<Vec<T>>,
        what: &'static str,
    ) -> Result<Vec<T>, SdmxError> {
        let structures = self
            .fetch_structure(&StructureRequest::all(resource, agency_id))
            .await?;
        match pick(structures) {
            Some(items) if !items.is_empty() => Ok(items),
            _ => Err(SdmxError::MissingData(what)),
        }
    }

    pub async fn fetch_all_dataflows(&self, agency_id: Option<&str>) -> Result<Vec<Dataflow>, SdmxError> {
        self.fetch_all(StructureType::Dataflow, agency_id, |s| s.dataflows, "dataflow")
            .await
    }

    pub async fn fetch_all_data_structures(
        &self,
        agency_id: Option<&str>,
    ) -> Result<Vec<DataStructure>, SdmxError> {
        self.fetch_all(
            StructureType::DataStructure,
            agency_id,
            |s| s.data_structures,
            "data structure",
        )
        .await
    }

    pub async fn fetch_all_codelists(&self, agency_id: Option<&str>) -> Result<Vec<Codelist>, SdmxError> {
        self.fetch_all(StructureType::Codelist, agency_id, |s| s.codelists, "codelist")
            .await
    }

    pub async fn fetch_all_concept_schemes(
        &self,
        agency_id: Option<&str>,
    ) -> Result<Vec<ConceptScheme>, SdmxError> {
        self.fetch_all(
            StructureType::ConceptScheme,
            agency_id,
            |s| s.concept_schemes,
            "concept scheme",
        )
        .await
    }

    pub async fn fetch_all_categorisations(
        &self,
        agency_id: Option<&str>,
    ) -> Result<Vec<Categorisation>, SdmxError> {
        self.fetch_all(
            StructureType::Categorisation,
            agency_id,
            |s| s.categorisations,
            "categorisation",
        )
        .await
    }

    pub async fn fetch_all_category_schemes(
        &self,
        agency_id: Option<&str>,
    ) -> Result<Vec<CategoryScheme>, SdmxError> {
        self.fetch_all(
            StructureType::CategoryScheme,
            agency_id,
            |s| s.category_schemes,
            "category scheme",
        )
        .await
    }

    pub async fn fetch_data_structures(&self, refs: &[StructureRef]) -> FanOut<DataStructure> {
        self.fetch_from_refs(refs, |s| s.data_structures, "data structure")
            .await
    }

    pub async fn fetch_codelists(&self, refs: &[StructureRef]) -> FanOut<Codelist> {
        self.fetch_from_refs(refs, |s| s.codelists, "codelist").await
    }

    pub async fn fetch_concept_schemes(&self, refs: &[StructureRef]) -> FanOut<ConceptScheme> {
        self.fetch_from_refs(refs, |s| s.concept_schemes, "concept scheme")
            .await
    }

    /// Resolve every reference, collapse identical requests, then fetch them
    /// with at most `max_in_flight` requests outstanding.
    ///
    /// A failing reference is recorded and never cancels its siblings.
    async fn fetch_from_refs<T>(
        &self,
        refs: &[StructureRef],
        pick: fn(Structures) -> Option<Vec<T>>,
        what: &'static str,
    ) -> FanOut<T> {
        let mut out = FanOut::default();
        let mut requests: IndexMap<StructureRequest, &StructureRef> = IndexMap::new();

        for r in refs {
            match resolve(r).map_err(SdmxError::from) {
                Ok(req) => {
                    requests.entry(req).or_insert(r);
                }
                Err(e) if e.is_unsupported() => {
                    debug!(reference = %r, "skipped: unsupported");
                    out.skipped_unsupported += 1;
                }
                Err(e) => {
                    warn!(reference = %r, error = %e, "Failed to resolve reference");
                    out.failures.push(FailedReference::new(r, None, &e));
                }
            }
        }

        debug!(
            references = refs.len(),
            requests = requests.len(),
            max_in_flight = self.max_in_flight,
            "Fetching {what} references"
        );

        let fetches: Vec<_> = requests
            .into_iter()
            .map(|(req, r)| async move {
                let result = self.fetch_structure(&req).await.and_then(|s| match pick(s) {
                    Some(items) if !items.is_empty() => Ok(items),
                    _ => Err(SdmxError::MissingData(what)),
                });
                (req, r, result)
            })
            .collect();
        let results: Vec<_> = stream::iter(fetches)
            .buffer_unordered(self.max_in_flight)
            .collect()
            .await;

        for (req, r, result) in results {
            match result {
                Ok(items) => out.items.extend(items),
                Err(e) => {
                    warn!(
                        reference = %r,
                        request = %req,
                        kind = e.kind(),
                        error = %e,
                        "Failed to fetch referenced {what}"
                    );
                    out.failures.push(FailedReference::new(r, Some(&req), &e));
                }
            }
        }

        out
    }
}
