//! Shared fixtures: a registry serving SDMX-ML files and an in-memory store.
#![allow(dead_code)]

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use sdmx_catalog::crawler::Crawler;
use sdmx_catalog::data::MetadataStore;
use sdmx_catalog::data::batch::dedup_rows;
use sdmx_catalog::data::providers::Provider;
use sdmx_catalog::data::records::{CATEGORY, Row, SqlValue, Table};
use sdmx_catalog::sdmx::client::RawResponse;
use sdmx_catalog::sdmx::{RegistryTransport, SdmxError, StructureFetcher, StructureRequest, XmlDecoder};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub const ROOT_URL: &str = "https://bdm.insee.fr/series/sdmx";

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/sdmxml21")
        .join(name)
}

/// Read a fixture file as text.
pub fn fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name))
        .unwrap_or_else(|e| panic!("failed to read fixture {name}: {e}"))
}

/// SDMX-ML structure message holding the given codelists, each `(id, name, codes)`.
pub fn codelists_xml(codelists: &[(&str, &str, &[(&str, &str)])]) -> String {
    let mut body = String::new();
    for (id, name, codes) in codelists {
        body.push_str(&format!(
            r#"<str:Codelist id="{id}" agencyID="FR1" version="1.0"><com:Name xml:lang="en">{name}</com:Name>"#
        ));
        for (code, label) in *codes {
            body.push_str(&format!(
                r#"<str:Code id="{code}"><com:Name xml:lang="en">{label}</com:Name></str:Code>"#
            ));
        }
        body.push_str("</str:Codelist>");
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<mes:Structure xmlns:mes="http://www.sdmx.org/resources/sdmxml/schemas/v2_1/message" xmlns:str="http://www.sdmx.org/resources/sdmxml/schemas/v2_1/structure" xmlns:com="http://www.sdmx.org/resources/sdmxml/schemas/v2_1/common">
<mes:Structures><str:Codelists>{body}</str:Codelists></mes:Structures>
</mes:Structure>"#
    )
}

pub const CL_PERIODICITE: (&str, &str, &[(&str, &str)]) = (
    "CL_PERIODICITE",
    "Frequency",
    &[("A", "Annual"), ("M", "Monthly"), ("T", "Quarterly")],
);
pub const CL_INDICATEUR: (&str, &str, &[(&str, &str)]) = (
    "CL_INDICATEUR",
    "Indicator",
    &[("CA", "Current account"), ("FA", "Financial account")],
);
pub const CL_OBS_STATUS: (&str, &str, &[(&str, &str)]) = (
    "CL_OBS_STATUS",
    "Observation status",
    &[("A", "Normal value"), ("P", "Provisional value")],
);
pub const CL_UNIT: (&str, &str, &[(&str, &str)]) = ("CL_UNIT", "Unit", &[("EUR", "Euro")]);

#[derive(Clone)]
enum Route {
    Body { status: u16, body: String },
    Refused,
}

/// Registry double routing request paths to canned payloads.
///
/// Unrouted paths fail at the transport level, like a refused connection.
#[derive(Default)]
pub struct FixtureTransport {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<String>>,
}

impl FixtureTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every route a targeted FR1 crawl with categories needs.
    pub fn fr1_targeted() -> Self {
        Self::new()
            .serve_file("dataflow/FR1", "dataflow.xml")
            .serve_file("datastructure/FR1/BALANCE-PAIEMENTS/1.0", "datastructure.xml")
            .serve_file("conceptscheme/FR1/CONCEPTS_INSEE/1.0", "conceptscheme.xml")
            .serve("codelist/FR1/CL_PERIODICITE/1.0", codelists_xml(&[CL_PERIODICITE]))
            .serve("codelist/FR1/CL_INDICATEUR/1.0", codelists_xml(&[CL_INDICATEUR]))
            .serve("codelist/FR1/CL_OBS_STATUS/1.0", codelists_xml(&[CL_OBS_STATUS]))
            .serve("codelist/FR1/CL_UNIT/1.0", codelists_xml(&[CL_UNIT]))
            .serve_file("categoryscheme/FR1", "categoryscheme.xml")
            .serve_file("categorisation/FR1", "categorisation.xml")
    }

    /// Every route a bulk FR1 crawl with categories needs.
    pub fn fr1_bulk() -> Self {
        Self::new()
            .serve_file("dataflow/FR1", "dataflow.xml")
            .serve_file("datastructure/FR1", "datastructure.xml")
            .serve_file("conceptscheme/FR1", "conceptscheme.xml")
            .serve(
                "codelist/FR1",
                codelists_xml(&[CL_PERIODICITE, CL_INDICATEUR, CL_OBS_STATUS, CL_UNIT]),
            )
            .serve_file("categoryscheme/FR1", "categoryscheme.xml")
            .serve_file("categorisation/FR1", "categorisation.xml")
    }

    pub fn serve(self, path: &str, body: impl Into<String>) -> Self {
        self.serve_status(path, 200, body)
    }

    pub fn serve_status(self, path: &str, status: u16, body: impl Into<String>) -> Self {
        self.routes.lock().unwrap().insert(
            path.to_string(),
            Route::Body {
                status,
                body: body.into(),
            },
        );
        self
    }

    pub fn serve_file(self, path: &str, name: &str) -> Self {
        self.serve(path, fixture(name))
    }

    /// Make `path` fail at the transport level.
    pub fn refuse(self, path: &str) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), Route::Refused);
        self
    }

    /// Paths requested so far, in request order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn was_called(&self, path: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| c == path)
    }
}

#[async_trait]
impl RegistryTransport for FixtureTransport {
    async fn get_structure(&self, req: &StructureRequest) -> Result<RawResponse, SdmxError> {
        let path = req.path();
        self.calls.lock().unwrap().push(path.clone());
        let route = self.routes.lock().unwrap().get(&path).cloned();

        match route {
            Some(Route::Body { status, body }) => Ok(RawResponse {
                url: format!("{ROOT_URL}/{path}"),
                status,
                body: body.into_bytes(),
            }),
            Some(Route::Refused) | None => Err(SdmxError::Transport {
                url: format!("{ROOT_URL}/{path}"),
                status: None,
                source: anyhow::anyhow!("connection refused"),
            }),
        }
    }
}

type TableRows = IndexMap<Vec<SqlValue>, Vec<SqlValue>>;

/// Store keeping rows by natural key, with upsert-replace semantics.
///
/// Category rows must reference a parent already stored, as the Postgres
/// self-referencing foreign key requires.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<&'static str, TableRows>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, table: &Table) -> usize {
        self.tables
            .lock()
            .unwrap()
            .get(table.name)
            .map_or(0, IndexMap::len)
    }

    /// Look a row up by its natural key, all key columns being text.
    pub fn row(&self, table: &Table, key: &[&str]) -> Option<Row> {
        let key: Vec<SqlValue> = key
            .iter()
            .map(|k| SqlValue::Text(Some(k.to_string())))
            .collect();
        let tables = self.tables.lock().unwrap();
        let values = tables.get(table.name)?.get(&key)?.clone();
        Some(Row { key, values })
    }

    /// Text value of `column` in the row keyed by `key`.
    pub fn text(&self, table: &Table, key: &[&str], column: &str) -> Option<String> {
        self.row(table, key)?
            .get(table, column)?
            .as_text()
            .map(str::to_string)
    }

    pub fn int(&self, table: &Table, key: &[&str], column: &str) -> Option<i32> {
        self.row(table, key)?.get(table, column)?.as_int()
    }

    /// First key column of every stored row, in insertion order.
    pub fn ids(&self, table: &Table) -> Vec<String> {
        self.tables
            .lock()
            .unwrap()
            .get(table.name)
            .map(|rows| {
                rows.keys()
                    .filter_map(|k| k.first()?.as_text().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn check_category_parent(rows: &TableRows, row: &Row) -> Result<()> {
    let parent_id = row.get(&CATEGORY, "parent_id").and_then(SqlValue::as_text);
    let Some(parent_id) = parent_id else {
        return Ok(());
    };
    let mut parent_key = vec![SqlValue::Text(Some(parent_id.to_string()))];
    for column in ["parent_scheme_id", "parent_scheme_agency_id", "parent_scheme_version"] {
        parent_key.push(row.get(&CATEGORY, column).cloned().unwrap_or(SqlValue::Text(None)));
    }
    if !rows.contains_key(&parent_key) {
        bail!("category {:?} stored before its parent {parent_id}", row.key);
    }
    Ok(())
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn upsert(&self, table: &'static Table, rows: Vec<Row>) -> Result<usize> {
        let rows = dedup_rows(rows);
        let written = rows.len();
        let mut tables = self.tables.lock().unwrap();
        let stored = tables.entry(table.name).or_default();
        for row in rows {
            if table.name == CATEGORY.name {
                check_category_parent(stored, &row)?;
            }
            stored.insert(row.key, row.values);
        }
        Ok(written)
    }
}

pub fn provider(bulk_download: bool, skip_categories: bool) -> Provider {
    Provider {
        id: 1,
        agency_id: "FR1".to_string(),
        root_url: ROOT_URL.to_string(),
        bulk_download,
        skip_categories,
        process_all_agencies: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn crawler(
    transport: Arc<FixtureTransport>,
    store: Arc<MemoryStore>,
    label_language: &str,
) -> Crawler {
    let fetcher = StructureFetcher::new(transport, Arc::new(XmlDecoder), 4);
    Crawler::new(fetcher, store, label_language)
}
