//! Typed SDMX 2.1 structure tree as produced by the decoder.

use serde::Serialize;
use std::fmt;

/// SDMX package a referenced artefact lives in (`package` attribute of a `Ref`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Package {
    DataStructure,
    Codelist,
    ConceptScheme,
    CategoryScheme,
    Categorisation,
    Registry,
    Other(String),
}

impl Package {
    pub fn as_str(&self) -> &str {
        match self {
            Package::DataStructure => "datastructure",
            Package::Codelist => "codelist",
            Package::ConceptScheme => "conceptscheme",
            Package::CategoryScheme => "categoryscheme",
            Package::Categorisation => "categorisation",
            Package::Registry => "registry",
            Package::Other(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "datastructure" => Package::DataStructure,
            "codelist" => Package::Codelist,
            "conceptscheme" => Package::ConceptScheme,
            "categoryscheme" => Package::CategoryScheme,
            "categorisation" => Package::Categorisation,
            "registry" => Package::Registry,
            other => Package::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SDMX object class of a referenced artefact (`class` attribute of a `Ref`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ObjectClass {
    DataStructure,
    Dataflow,
    Codelist,
    Code,
    ConceptScheme,
    Concept,
    CategoryScheme,
    Category,
    Categorisation,
    ContentConstraint,
    Other(String),
}

impl ObjectClass {
    pub fn as_str(&self) -> &str {
        match self {
            ObjectClass::DataStructure => "DataStructure",
            ObjectClass::Dataflow => "Dataflow",
            ObjectClass::Codelist => "Codelist",
            ObjectClass::Code => "Code",
            ObjectClass::ConceptScheme => "ConceptScheme",
            ObjectClass::Concept => "Concept",
            ObjectClass::CategoryScheme => "CategoryScheme",
            ObjectClass::Category => "Category",
            ObjectClass::Categorisation => "Categorisation",
            ObjectClass::ContentConstraint => "ContentConstraint",
            ObjectClass::Other(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "DataStructure" => ObjectClass::DataStructure,
            "Dataflow" => ObjectClass::Dataflow,
            "Codelist" => ObjectClass::Codelist,
            "Code" => ObjectClass::Code,
            "ConceptScheme" => ObjectClass::ConceptScheme,
            "Concept" => ObjectClass::Concept,
            "CategoryScheme" => ObjectClass::CategoryScheme,
            "Category" => ObjectClass::Category,
            "Categorisation" => ObjectClass::Categorisation,
            "ContentConstraint" => ObjectClass::ContentConstraint,
            other => ObjectClass::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pointer to another artefact by kind, agency, id and version.
///
/// For child artefacts (concepts, categories) `maintainable_parent_*` names
/// the owning scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructureRef {
    pub id: String,
    pub agency_id: Option<String>,
    pub version: Option<String>,
    pub maintainable_parent_id: Option<String>,
    pub maintainable_parent_version: Option<String>,
    pub package: Package,
    pub class: ObjectClass,
}

impl fmt::Display for StructureRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}:",
            self.class,
            self.agency_id.as_deref().unwrap_or("*")
        )?;
        if let Some(parent) = &self.maintainable_parent_id {
            write!(
                f,
                "{parent}({}).",
                self.maintainable_parent_version.as_deref().unwrap_or("*")
            )?;
        }
        write!(f, "{}", self.id)?;
        if let Some(version) = &self.version {
            write!(f, "({version})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalisedText {
    pub lang: Option<String>,
    pub value: String,
}

/// Pick the text for `lang`, if any.
pub fn label_in<'a>(texts: &'a [LocalisedText], lang: &str) -> Option<&'a str> {
    texts
        .iter()
        .find(|t| t.lang.as_deref() == Some(lang))
        .map(|t| t.value.as_str())
}

/// Identity and labels shared by every maintainable artefact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintainableMeta {
    pub id: String,
    pub agency_id: String,
    pub version: String,
    pub urn: Option<String>,
    pub names: Vec<LocalisedText>,
    pub descriptions: Vec<LocalisedText>,
}

/// Identity and labels of an item inside a scheme (code, concept, category).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemMeta {
    pub id: String,
    pub urn: Option<String>,
    pub names: Vec<LocalisedText>,
    pub descriptions: Vec<LocalisedText>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataflow {
    pub meta: MaintainableMeta,
    pub structure: Option<StructureRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Representation {
    /// Free-form text format, e.g. `String` or `ObservationalTimePeriod`.
    Format(String),
    Enumeration(StructureRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub id: String,
    pub urn: Option<String>,
    pub concept: Option<StructureRef>,
    pub representation: Option<Representation>,
}

impl Component {
    pub fn codelist_ref(&self) -> Option<&StructureRef> {
        match &self.representation {
            Some(Representation::Enumeration(r)) => Some(r),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub component: Component,
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub component: Component,
    pub assignment_status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataStructureComponents {
    pub time_dimension: Option<Dimension>,
    pub dimensions: Vec<Dimension>,
    pub attributes: Vec<Attribute>,
    pub primary_measure: Option<Component>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataStructure {
    pub meta: MaintainableMeta,
    pub components: DataStructureComponents,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Codelist {
    pub meta: MaintainableMeta,
    pub codes: Vec<ItemMeta>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConceptScheme {
    pub meta: MaintainableMeta,
    pub concepts: Vec<ItemMeta>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub meta: ItemMeta,
    pub children: Vec<Category>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryScheme {
    pub meta: MaintainableMeta,
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Categorisation {
    pub meta: MaintainableMeta,
    pub source: Option<StructureRef>,
    pub target: Option<StructureRef>,
}

/// The `Structures` container. Each list is `None` when absent from the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Structures {
    pub dataflows: Option<Vec<Dataflow>>,
    pub data_structures: Option<Vec<DataStructure>>,
    pub codelists: Option<Vec<Codelist>>,
    pub concept_schemes: Option<Vec<ConceptScheme>>,
    pub category_schemes: Option<Vec<CategoryScheme>>,
    pub categorisations: Option<Vec<Categorisation>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    pub code: String,
    pub texts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Structure(Structures),
    Error(Vec<StatusMessage>),
}
