//! Flat storage rows for every persisted SDMX entity.
//!
//! Each entity is described by a [`Table`] (natural key columns plus the
//! columns rewritten on conflict) and converted into a [`Row`] whose values
//! follow that column order.

use crate::sdmx::categories::FlatCategory;
use crate::sdmx::models::{
    Categorisation, Component, DataStructure, Dataflow, ItemMeta, LocalisedText,
    MaintainableMeta, Representation, StructureRef, label_in,
};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct Table {
    pub name: &'static str,
    pub key_columns: &'static [&'static str],
    pub value_columns: &'static [&'static str],
}

impl Table {
    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.key_columns
            .iter()
            .chain(self.value_columns.iter())
            .copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Text(Option<String>),
    Int(Option<i32>),
}

impl SqlValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => s.as_deref(),
            SqlValue::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            SqlValue::Int(i) => *i,
            SqlValue::Text(_) => None,
        }
    }
}

fn text(s: impl Into<String>) -> SqlValue {
    SqlValue::Text(Some(s.into()))
}

fn opt_text(s: Option<&str>) -> SqlValue {
    SqlValue::Text(s.map(str::to_string))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub key: Vec<SqlValue>,
    pub values: Vec<SqlValue>,
}

impl Row {
    pub fn get(&self, table: &Table, column: &str) -> Option<&SqlValue> {
        if let Some(i) = table.key_columns.iter().position(|c| *c == column) {
            return self.key.get(i);
        }
        table
            .value_columns
            .iter()
            .position(|c| *c == column)
            .and_then(|i| self.values.get(i))
    }
}

/// Rows written per table during one load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LoadCounts(BTreeMap<&'static str, usize>);

impl LoadCounts {
    pub fn add(&mut self, table: &Table, count: usize) {
        *self.0.entry(table.name).or_default() += count;
    }

    pub fn merge(&mut self, other: LoadCounts) {
        for (table, count) in other.0 {
            *self.0.entry(table).or_default() += count;
        }
    }

    pub fn get(&self, table: &str) -> usize {
        self.0.get(table).copied().unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }
}

const MAINTAINABLE_KEY: &[&str] = &["id", "agency_id", "version"];
const LABEL_COLUMNS: &[&str] = &["urn", "name", "description"];

const COMPONENT_KEY: &[&str] = &[
    "id",
    "data_structure_id",
    "data_structure_agency_id",
    "data_structure_version",
];

pub static DATAFLOW: Table = Table {
    name: "sdmx_dataflow",
    key_columns: MAINTAINABLE_KEY,
    value_columns: &[
        "urn",
        "name",
        "description",
        "structure_id",
        "structure_agency_id",
        "structure_version",
        "structure_package",
        "structure_class",
    ],
};

pub static DATA_STRUCTURE: Table = Table {
    name: "sdmx_datastructure",
    key_columns: MAINTAINABLE_KEY,
    value_columns: LABEL_COLUMNS,
};

const DIMENSION_COLUMNS: &[&str] = &[
    "urn",
    "concept_id",
    "concept_maintainable_parent_id",
    "concept_maintainable_parent_version",
    "concept_agency_id",
    "concept_package",
    "concept_class",
    "format_type",
    "codelist_id",
    "codelist_agency_id",
    "codelist_version",
    "codelist_package",
    "codelist_class",
    "position",
];

pub static TIME_DIMENSION: Table = Table {
    name: "sdmx_time_dimension",
    key_columns: COMPONENT_KEY,
    value_columns: DIMENSION_COLUMNS,
};

pub static DIMENSION: Table = Table {
    name: "sdmx_dimension",
    key_columns: COMPONENT_KEY,
    value_columns: DIMENSION_COLUMNS,
};

pub static ATTRIBUTE: Table = Table {
    name: "sdmx_attribute",
    key_columns: COMPONENT_KEY,
    value_columns: &[
        "urn",
        "concept_id",
        "concept_maintainable_parent_id",
        "concept_maintainable_parent_version",
        "concept_agency_id",
        "concept_package",
        "concept_class",
        "format_type",
        "codelist_id",
        "codelist_agency_id",
        "codelist_version",
        "codelist_package",
        "codelist_class",
        "assignment_status",
    ],
};

pub static PRIMARY_MEASURE: Table = Table {
    name: "sdmx_primary_measure",
    key_columns: COMPONENT_KEY,
    value_columns: &[
        "urn",
        "concept_id",
        "concept_maintainable_parent_id",
        "concept_maintainable_parent_version",
        "concept_agency_id",
        "concept_package",
        "concept_class",
    ],
};

pub static CODELIST: Table = Table {
    name: "sdmx_codelist",
    key_columns: MAINTAINABLE_KEY,
    value_columns: LABEL_COLUMNS,
};

pub static CODE: Table = Table {
    name: "sdmx_code",
    key_columns: &["id", "codelist_id", "codelist_agency_id", "codelist_version"],
    value_columns: LABEL_COLUMNS,
};

pub static CONCEPT_SCHEME: Table = Table {
    name: "sdmx_conceptscheme",
    key_columns: MAINTAINABLE_KEY,
    value_columns: LABEL_COLUMNS,
};

pub static CONCEPT: Table = Table {
    name: "sdmx_concept",
    key_columns: &[
        "id",
        "concept_scheme_id",
        "concept_scheme_agency_id",
        "concept_scheme_version",
    ],
    value_columns: LABEL_COLUMNS,
};

pub static CATEGORY_SCHEME: Table = Table {
    name: "sdmx_categoryscheme",
    key_columns: MAINTAINABLE_KEY,
    value_columns: LABEL_COLUMNS,
};

pub static CATEGORY: Table = Table {
    name: "sdmx_category",
    key_columns: &[
        "id",
        "category_scheme_id",
        "category_scheme_agency_id",
        "category_scheme_version",
    ],
    value_columns: &[
        "urn",
        "name",
        "description",
        "parent_id",
        "parent_scheme_id",
        "parent_scheme_agency_id",
        "parent_scheme_version",
    ],
};

pub static CATEGORISATION: Table = Table {
    name: "sdmx_categorisation",
    key_columns: MAINTAINABLE_KEY,
    value_columns: &[
        "urn",
        "name",
        "description",
        "source_id",
        "source_agency_id",
        "source_version",
        "source_package",
        "source_class",
        "target_id",
        "target_maintainable_parent_id",
        "target_maintainable_parent_version",
        "target_agency_id",
        "target_package",
        "target_class",
    ],
};

fn maintainable_key(meta: &MaintainableMeta) -> Vec<SqlValue> {
    vec![
        text(&meta.id),
        text(&meta.agency_id),
        text(&meta.version),
    ]
}

fn labels(
    urn: Option<&str>,
    names: &[LocalisedText],
    descriptions: &[LocalisedText],
    lang: &str,
) -> Vec<SqlValue> {
    vec![
        opt_text(urn),
        opt_text(label_in(names, lang)),
        opt_text(label_in(descriptions, lang)),
    ]
}

fn maintainable_labels(meta: &MaintainableMeta, lang: &str) -> Vec<SqlValue> {
    labels(meta.urn.as_deref(), &meta.names, &meta.descriptions, lang)
}

fn item_row(item: &ItemMeta, parent: &MaintainableMeta, lang: &str) -> Row {
    let mut key = vec![text(&item.id)];
    key.extend(maintainable_key(parent));
    Row {
        key,
        values: labels(item.urn.as_deref(), &item.names, &item.descriptions, lang),
    }
}

/// `id, agency_id, version, package, class` of a reference, all null when absent.
fn ref_columns(r: Option<&StructureRef>) -> Vec<SqlValue> {
    vec![
        opt_text(r.map(|r| r.id.as_str())),
        opt_text(r.and_then(|r| r.agency_id.as_deref())),
        opt_text(r.and_then(|r| r.version.as_deref())),
        opt_text(r.map(|r| r.package.as_str())),
        opt_text(r.map(|r| r.class.as_str())),
    ]
}

pub fn dataflow_row(df: &Dataflow, lang: &str) -> Row {
    let mut values = maintainable_labels(&df.meta, lang);
    values.extend(ref_columns(df.structure.as_ref()));
    Row {
        key: maintainable_key(&df.meta),
        values,
    }
}

pub fn data_structure_row(dsd: &DataStructure, lang: &str) -> Row {
    Row {
        key: maintainable_key(&dsd.meta),
        values: maintainable_labels(&dsd.meta, lang),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    TimeDimension { position: i32 },
    Dimension { position: i32 },
    Attribute,
    PrimaryMeasure,
}

/// Component row. `extra` carries the assignment status for attributes.
pub fn component_row(
    dsd: &MaintainableMeta,
    component: &Component,
    kind: ComponentKind,
    extra: Option<&str>,
) -> Row {
    let mut key = vec![text(&component.id)];
    key.extend(maintainable_key(dsd));

    let concept = component.concept.as_ref();
    let mut values = vec![
        opt_text(component.urn.as_deref()),
        opt_text(concept.map(|c| c.id.as_str())),
        opt_text(concept.and_then(|c| c.maintainable_parent_id.as_deref())),
        opt_text(concept.and_then(|c| c.maintainable_parent_version.as_deref())),
        opt_text(concept.and_then(|c| c.agency_id.as_deref())),
        opt_text(concept.map(|c| c.package.as_str())),
        opt_text(concept.map(|c| c.class.as_str())),
    ];

    if kind != ComponentKind::PrimaryMeasure {
        let format = match &component.representation {
            Some(Representation::Format(f)) => Some(f.as_str()),
            _ => None,
        };
        values.push(opt_text(format));
        values.extend(ref_columns(component.codelist_ref()));
    }

    match kind {
        ComponentKind::TimeDimension { position } | ComponentKind::Dimension { position } => {
            values.push(SqlValue::Int(Some(position)));
        }
        ComponentKind::Attribute => values.push(opt_text(extra)),
        ComponentKind::PrimaryMeasure => {}
    }

    Row { key, values }
}

pub fn scheme_row(meta: &MaintainableMeta, lang: &str) -> Row {
    Row {
        key: maintainable_key(meta),
        values: maintainable_labels(meta, lang),
    }
}

pub fn scheme_item_row(item: &ItemMeta, scheme: &MaintainableMeta, lang: &str) -> Row {
    item_row(item, scheme, lang)
}

pub fn category_row(flat: &FlatCategory<'_>, lang: &str) -> Row {
    let item = &flat.category.meta;
    let mut values = labels(item.urn.as_deref(), &item.names, &item.descriptions, lang);

    let parent_scheme = flat.parent_id.map(|_| flat);
    values.push(opt_text(flat.parent_id));
    values.push(opt_text(parent_scheme.map(|f| f.scheme_id)));
    values.push(opt_text(parent_scheme.map(|f| f.scheme_agency_id)));
    values.push(opt_text(parent_scheme.map(|f| f.scheme_version)));

    Row {
        key: vec![
            text(&item.id),
            text(flat.scheme_id),
            text(flat.scheme_agency_id),
            text(flat.scheme_version),
        ],
        values,
    }
}

/// `None` when either end of the link is missing.
pub fn categorisation_row(c: &Categorisation, lang: &str) -> Option<Row> {
    let source = c.source.as_ref()?;
    let target = c.target.as_ref()?;

    let mut values = maintainable_labels(&c.meta, lang);
    values.extend(ref_columns(Some(source)));
    values.extend([
        text(&target.id),
        opt_text(target.maintainable_parent_id.as_deref()),
        opt_text(target.maintainable_parent_version.as_deref()),
        opt_text(target.agency_id.as_deref()),
        text(target.package.as_str()),
        text(target.class.as_str()),
    ]);

    Some(Row {
        key: maintainable_key(&c.meta),
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdmx::categories::flatten_categories;
    use crate::sdmx::models::{Category, CategoryScheme, ObjectClass, Package};

    fn meta(id: &str) -> MaintainableMeta {
        MaintainableMeta {
            id: id.into(),
            agency_id: "FR1".into(),
            version: "1.0".into(),
            urn: Some(format!("urn:{id}")),
            names: vec![
                LocalisedText {
                    lang: Some("fr".into()),
                    value: format!("{id} fr"),
                },
                LocalisedText {
                    lang: Some("en".into()),
                    value: format!("{id} en"),
                },
            ],
            descriptions: vec![],
        }
    }

    fn all_tables() -> [&'static Table; 13] {
        [
            &DATAFLOW,
            &DATA_STRUCTURE,
            &TIME_DIMENSION,
            &DIMENSION,
            &ATTRIBUTE,
            &PRIMARY_MEASURE,
            &CODELIST,
            &CODE,
            &CONCEPT_SCHEME,
            &CONCEPT,
            &CATEGORY_SCHEME,
            &CATEGORY,
            &CATEGORISATION,
        ]
    }

    #[test]
    fn test_key_and_value_columns_are_disjoint() {
        for table in all_tables() {
            for key in table.key_columns {
                assert!(!table.value_columns.contains(key), "{}: {key}", table.name);
            }
        }
    }

    #[test]
    fn test_dataflow_row_with_and_without_structure() {
        let df = Dataflow {
            meta: meta("BALANCE-PAIEMENTS"),
            structure: Some(StructureRef {
                id: "BALANCE-PAIEMENTS".into(),
                agency_id: Some("FR1".into()),
                version: Some("1.0".into()),
                maintainable_parent_id: None,
                maintainable_parent_version: None,
                package: Package::DataStructure,
                class: ObjectClass::DataStructure,
            }),
        };
        let row = dataflow_row(&df, "en");
        assert_eq!(row.values.len(), DATAFLOW.value_columns.len());
        assert_eq!(row.get(&DATAFLOW, "name").unwrap().as_text(), Some("BALANCE-PAIEMENTS en"));
        assert_eq!(row.get(&DATAFLOW, "structure_package").unwrap().as_text(), Some("datastructure"));

        let bare = dataflow_row(&Dataflow { meta: meta("X"), structure: None }, "fr");
        assert_eq!(bare.get(&DATAFLOW, "name").unwrap().as_text(), Some("X fr"));
        assert_eq!(bare.get(&DATAFLOW, "structure_id"), Some(&SqlValue::Text(None)));
    }

    #[test]
    fn test_component_rows_match_table_shapes() {
        let component = Component {
            id: "FREQ".into(),
            urn: None,
            concept: None,
            representation: Some(Representation::Format("String".into())),
        };
        let dsd = meta("DSD");
        let cases = [
            (ComponentKind::TimeDimension { position: 10 }, &TIME_DIMENSION),
            (ComponentKind::Dimension { position: 1 }, &DIMENSION),
            (ComponentKind::Attribute, &ATTRIBUTE),
            (ComponentKind::PrimaryMeasure, &PRIMARY_MEASURE),
        ];
        for (kind, table) in cases {
            let row = component_row(&dsd, &component, kind, Some("Mandatory"));
            assert_eq!(row.key.len(), table.key_columns.len(), "{}", table.name);
            assert_eq!(row.values.len(), table.value_columns.len(), "{}", table.name);
        }
        let dim = component_row(&dsd, &component, ComponentKind::Dimension { position: 1 }, None);
        assert_eq!(dim.get(&DIMENSION, "format_type").unwrap().as_text(), Some("String"));
        assert_eq!(dim.get(&DIMENSION, "position").unwrap().as_int(), Some(1));
    }

    #[test]
    fn test_category_rows_carry_parent_scheme_only_for_children() {
        let leaf = |id: &str| Category {
            meta: ItemMeta {
                id: id.into(),
                urn: None,
                names: vec![],
                descriptions: vec![],
            },
            children: vec![],
        };
        let mut root = leaf("ECO");
        root.children.push(leaf("COMMERCE_EXT"));
        let scheme = CategoryScheme {
            meta: meta("CLASSEMENT_DATAFLOWS"),
            categories: vec![root],
        };
        let flat = flatten_categories(&scheme).unwrap();
        let rows: Vec<_> = flat.iter().map(|f| category_row(f, "en")).collect();

        assert_eq!(rows[0].get(&CATEGORY, "parent_scheme_id"), Some(&SqlValue::Text(None)));
        assert_eq!(rows[1].get(&CATEGORY, "parent_id").unwrap().as_text(), Some("ECO"));
        assert_eq!(
            rows[1].get(&CATEGORY, "parent_scheme_id").unwrap().as_text(),
            Some("CLASSEMENT_DATAFLOWS")
        );
        assert_eq!(rows[1].values.len(), CATEGORY.value_columns.len());
    }

    #[test]
    fn test_categorisation_without_target_is_skipped() {
        let c = Categorisation {
            meta: meta("CAT"),
            source: None,
            target: None,
        };
        assert!(categorisation_row(&c, "en").is_none());
    }

    #[test]
    fn test_load_counts_merge() {
        let mut a = LoadCounts::default();
        a.add(&CODE, 3);
        let mut b = LoadCounts::default();
        b.add(&CODE, 2);
        b.add(&CODELIST, 1);
        a.merge(b);
        assert_eq!(a.get("sdmx_code"), 5);
        assert_eq!(a.total(), 6);
        assert_eq!(a.get("sdmx_concept"), 0);
    }
}
