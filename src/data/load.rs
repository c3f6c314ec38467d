//! Loaders turning decoded structures into upserted rows.
//!
//! Parents are always written before their children within one call
//! (structures before components, schemes before items).

use crate::data::records::{
    self, ATTRIBUTE, CATEGORISATION, CATEGORY, CATEGORY_SCHEME, CODE, CODELIST, CONCEPT,
    CONCEPT_SCHEME, ComponentKind, DATA_STRUCTURE, DATAFLOW, DIMENSION, LoadCounts,
    PRIMARY_MEASURE, Row, TIME_DIMENSION, Table,
};
use crate::data::store::MetadataStore;
use crate::sdmx::categories::flatten_categories;
use crate::sdmx::errors::SdmxError;
use crate::sdmx::models::{
    Categorisation, CategoryScheme, Codelist, ConceptScheme, DataStructure, Dataflow,
};
use anyhow::{Context, Result};
use tracing::{debug, warn};

async fn write(
    store: &dyn MetadataStore,
    counts: &mut LoadCounts,
    table: &'static Table,
    rows: Vec<Row>,
) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let written = store
        .upsert(table, rows)
        .await
        .with_context(|| format!("Failed to load {}", table.name))?;
    counts.add(table, written);
    Ok(())
}

/// Dataflows without a structure reference are stored with null structure columns.
pub async fn load_dataflows(
    store: &dyn MetadataStore,
    lang: &str,
    dataflows: &[Dataflow],
) -> Result<LoadCounts> {
    let mut counts = LoadCounts::default();
    let rows = dataflows.iter().map(|df| records::dataflow_row(df, lang)).collect();
    write(store, &mut counts, &DATAFLOW, rows).await?;
    Ok(counts)
}

pub async fn load_data_structures(
    store: &dyn MetadataStore,
    lang: &str,
    data_structures: &[DataStructure],
) -> Result<LoadCounts> {
    let mut counts = LoadCounts::default();
    let rows = data_structures
        .iter()
        .map(|dsd| records::data_structure_row(dsd, lang))
        .collect();
    write(store, &mut counts, &DATA_STRUCTURE, rows).await?;

    let mut time_dimensions = Vec::new();
    let mut dimensions = Vec::new();
    let mut attributes = Vec::new();
    let mut measures = Vec::new();

    for dsd in data_structures {
        let c = &dsd.components;
        if let Some(td) = &c.time_dimension {
            let kind = ComponentKind::TimeDimension { position: td.position };
            time_dimensions.push(records::component_row(&dsd.meta, &td.component, kind, None));
        }
        for d in &c.dimensions {
            let kind = ComponentKind::Dimension { position: d.position };
            dimensions.push(records::component_row(&dsd.meta, &d.component, kind, None));
        }
        for a in &c.attributes {
            attributes.push(records::component_row(
                &dsd.meta,
                &a.component,
                ComponentKind::Attribute,
                a.assignment_status.as_deref(),
            ));
        }
        if let Some(m) = &c.primary_measure {
            measures.push(records::component_row(
                &dsd.meta,
                m,
                ComponentKind::PrimaryMeasure,
                None,
            ));
        }
    }

    write(store, &mut counts, &TIME_DIMENSION, time_dimensions).await?;
    write(store, &mut counts, &DIMENSION, dimensions).await?;
    write(store, &mut counts, &ATTRIBUTE, attributes).await?;
    write(store, &mut counts, &PRIMARY_MEASURE, measures).await?;
    Ok(counts)
}

pub async fn load_codelists(
    store: &dyn MetadataStore,
    lang: &str,
    codelists: &[Codelist],
) -> Result<LoadCounts> {
    let mut counts = LoadCounts::default();
    let schemes = codelists.iter().map(|cl| records::scheme_row(&cl.meta, lang)).collect();
    write(store, &mut counts, &CODELIST, schemes).await?;

    let codes = codelists
        .iter()
        .flat_map(|cl| cl.codes.iter().map(|code| records::scheme_item_row(code, &cl.meta, lang)))
        .collect();
    write(store, &mut counts, &CODE, codes).await?;
    Ok(counts)
}

pub async fn load_concept_schemes(
    store: &dyn MetadataStore,
    lang: &str,
    schemes: &[ConceptScheme],
) -> Result<LoadCounts> {
    let mut counts = LoadCounts::default();
    let rows = schemes.iter().map(|cs| records::scheme_row(&cs.meta, lang)).collect();
    write(store, &mut counts, &CONCEPT_SCHEME, rows).await?;

    let concepts = schemes
        .iter()
        .flat_map(|cs| cs.concepts.iter().map(|c| records::scheme_item_row(c, &cs.meta, lang)))
        .collect();
    write(store, &mut counts, &CONCEPT, concepts).await?;
    Ok(counts)
}

/// Schemes whose category tree repeats a category are left out entirely and
/// returned alongside the counts.
pub async fn load_category_schemes(
    store: &dyn MetadataStore,
    lang: &str,
    schemes: &[CategoryScheme],
) -> Result<(LoadCounts, Vec<SdmxError>)> {
    let mut counts = LoadCounts::default();
    let mut malformed = Vec::new();
    let mut scheme_rows = Vec::new();
    let mut category_rows = Vec::new();

    for scheme in schemes {
        match flatten_categories(scheme) {
            Ok(flat) => {
                scheme_rows.push(records::scheme_row(&scheme.meta, lang));
                category_rows.extend(flat.iter().map(|f| records::category_row(f, lang)));
            }
            Err(e) => {
                warn!(scheme = scheme.meta.id.as_str(), error = %e, "Skipping malformed category scheme");
                malformed.push(e);
            }
        }
    }

    write(store, &mut counts, &CATEGORY_SCHEME, scheme_rows).await?;
    write(store, &mut counts, &CATEGORY, category_rows).await?;
    Ok((counts, malformed))
}

/// Categorisations missing either end of the link are skipped.
pub async fn load_categorisations(
    store: &dyn MetadataStore,
    lang: &str,
    categorisations: &[Categorisation],
) -> Result<LoadCounts> {
    let mut counts = LoadCounts::default();
    let rows: Vec<_> = categorisations
        .iter()
        .filter_map(|c| {
            let row = records::categorisation_row(c, lang);
            if row.is_none() {
                debug!(categorisation = c.meta.id.as_str(), "Skipping categorisation without source or target");
            }
            row
        })
        .collect();
    write(store, &mut counts, &CATEGORISATION, rows).await?;
    Ok(counts)
}
