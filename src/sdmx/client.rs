//! SDMX 2.1 REST structure queries and the HTTP transport that issues them.

use crate::sdmx::errors::SdmxError;
use crate::sdmx::middleware::TransparentMiddleware;
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use http::header::ACCEPT;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Content type announced in the `Accept` header of every structure query.
pub const STRUCTURE_CONTENT_TYPE: &str = "application/vnd.sdmx.structure+xml;version=2.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructureType {
    DataStructure,
    CategoryScheme,
    ConceptScheme,
    Codelist,
    AgencyScheme,
    Dataflow,
    Categorisation,
    ContentConstraint,
}

impl StructureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StructureType::DataStructure => "datastructure",
            StructureType::CategoryScheme => "categoryscheme",
            StructureType::ConceptScheme => "conceptscheme",
            StructureType::Codelist => "codelist",
            StructureType::AgencyScheme => "agencyscheme",
            StructureType::Dataflow => "dataflow",
            StructureType::Categorisation => "categorisation",
            StructureType::ContentConstraint => "contentconstraint",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetailType {
    AllStubs,
    ReferenceStubs,
    AllCompleteStubs,
    ReferenceCompleteStubs,
    ReferencePartial,
    Full,
}

impl DetailType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetailType::AllStubs => "allstubs",
            DetailType::ReferenceStubs => "referencestubs",
            DetailType::AllCompleteStubs => "allcompletestubs",
            DetailType::ReferenceCompleteStubs => "referencecompletestubs",
            DetailType::ReferencePartial => "referencepartial",
            DetailType::Full => "full",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferencesType {
    None,
    Parents,
    ParentsAndSiblings,
    Children,
    Descendants,
    All,
}

impl ReferencesType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferencesType::None => "none",
            ReferencesType::Parents => "parents",
            ReferencesType::ParentsAndSiblings => "parentsandsiblings",
            ReferencesType::Children => "children",
            ReferencesType::Descendants => "descendants",
            ReferencesType::All => "all",
        }
    }
}

/// A fetchable structure query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructureRequest {
    pub resource: StructureType,
    pub agency_id: Option<String>,
    pub resource_id: Option<String>,
    pub version: Option<String>,
    pub item_id: Option<String>,
    pub detail: Option<DetailType>,
    pub references: Option<ReferencesType>,
}

impl StructureRequest {
    /// Query for a whole catalog of `resource`, optionally restricted to one agency.
    pub fn all(resource: StructureType, agency_id: Option<&str>) -> Self {
        Self {
            resource,
            agency_id: agency_id.map(str::to_string),
            resource_id: None,
            version: None,
            item_id: None,
            detail: None,
            references: None,
        }
    }

    /// Relative path `{resource}[/{agency}[/{id}[/{version}[/{item}]]]]`.
    ///
    /// Segments stop at the first absent one.
    pub fn path(&self) -> String {
        let mut path = self.resource.as_str().to_string();
        let segments = [
            &self.agency_id,
            &self.resource_id,
            &self.version,
            &self.item_id,
        ];
        for segment in segments {
            match segment.as_deref() {
                Some(s) if !s.is_empty() => {
                    path.push('/');
                    path.push_str(s);
                }
                _ => break,
            }
        }
        path
    }

    pub fn query(&self) -> Vec<(&'static str, &'static str)> {
        let mut params = Vec::new();
        if let Some(detail) = self.detail {
            params.push(("detail", detail.as_str()));
        }
        if let Some(references) = self.references {
            params.push(("references", references.as_str()));
        }
        params
    }
}

impl fmt::Display for StructureRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Raw registry answer: status code and body bytes.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub url: String,
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues one structure query against a registry endpoint.
#[async_trait]
pub trait RegistryTransport: Send + Sync {
    async fn get_structure(&self, req: &StructureRequest) -> Result<RawResponse, SdmxError>;
}

/// HTTP transport for one provider's root endpoint.
pub struct SdmxClient {
    http: ClientWithMiddleware,
    root_url: Url,
    timeout: Duration,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl SdmxClient {
    pub fn new(root_url: &str, timeout: Duration, rate_limit_per_second: u32) -> anyhow::Result<Self> {
        // A root without a trailing slash would lose its last path segment on join
        let normalised = if root_url.ends_with('/') {
            root_url.to_string()
        } else {
            format!("{root_url}/")
        };
        let root_url = Url::parse(&normalised)
            .map_err(|e| anyhow::anyhow!("Invalid registry root URL {root_url:?}: {e}"))?;

        let http = ClientBuilder::new(
            reqwest::Client::builder()
                .user_agent(concat!("sdmx-catalog/", env!("CARGO_PKG_VERSION")))
                .build()?,
        )
        .with(TransparentMiddleware)
        .build();

        let limiter = NonZeroU32::new(rate_limit_per_second)
            .map(|rate| RateLimiter::direct(Quota::per_second(rate).allow_burst(rate)));

        Ok(Self {
            http,
            root_url,
            timeout,
            limiter,
        })
    }

    pub fn url_for(&self, req: &StructureRequest) -> Result<Url, url::ParseError> {
        self.root_url.join(&req.path())
    }
}

#[async_trait]
impl RegistryTransport for SdmxClient {
    async fn get_structure(&self, req: &StructureRequest) -> Result<RawResponse, SdmxError> {
        let url = self.url_for(req).map_err(|e| SdmxError::Transport {
            url: format!("{}{}", self.root_url, req.path()),
            status: None,
            source: e.into(),
        })?;

        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let transport_err = |status: Option<u16>, source: anyhow::Error| SdmxError::Transport {
            url: url.to_string(),
            status,
            source,
        };

        let response = self
            .http
            .get(url.clone())
            .query(&req.query())
            .header(ACCEPT, STRUCTURE_CONTENT_TYPE)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_err(None, e.into()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_err(Some(status), e.into()))?;

        debug!(url = %url, status, bytes = body.len(), "Structure response received");

        Ok(RawResponse {
            url: url.to_string(),
            status,
            body: body.to_vec(),
        })
    }
}
