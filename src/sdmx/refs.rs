//! Reference extraction and first-seen deduplication.

use crate::sdmx::models::{Component, DataStructure, Dataflow, StructureRef};
use indexmap::IndexMap;

/// Natural identity of a reference for deduplication purposes.
type RefKey<'a> = (
    &'a str,
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
);

fn ref_key(r: &StructureRef) -> RefKey<'_> {
    (
        r.id.as_str(),
        r.agency_id.as_deref(),
        r.version.as_deref(),
        r.maintainable_parent_id.as_deref(),
        r.maintainable_parent_version.as_deref(),
    )
}

/// Keep the first occurrence of each reference, in input order.
///
/// References without an id are dropped.
pub fn unique_by_ref<'a>(refs: impl IntoIterator<Item = &'a StructureRef>) -> Vec<StructureRef> {
    let mut seen: IndexMap<RefKey<'a>, &'a StructureRef> = IndexMap::new();
    for r in refs {
        if r.id.is_empty() {
            continue;
        }
        seen.entry(ref_key(r)).or_insert(r);
    }
    seen.into_values().cloned().collect()
}

pub fn extract_data_structure_refs(dataflows: &[Dataflow]) -> Vec<StructureRef> {
    unique_by_ref(dataflows.iter().filter_map(|df| df.structure.as_ref()))
}

/// Components in traversal order: time dimension, dimensions, attributes, then
/// the primary measure. The flag marks the primary measure.
fn components(dsd: &DataStructure) -> impl Iterator<Item = (&Component, bool)> {
    let c = &dsd.components;
    c.time_dimension
        .iter()
        .map(|d| &d.component)
        .chain(c.dimensions.iter().map(|d| &d.component))
        .chain(c.attributes.iter().map(|a| &a.component))
        .map(|component| (component, false))
        .chain(c.primary_measure.iter().map(|m| (m, true)))
}

/// Codelists enumerating any component except the primary measure.
pub fn extract_codelist_refs(data_structures: &[DataStructure]) -> Vec<StructureRef> {
    unique_by_ref(
        data_structures
            .iter()
            .flat_map(components)
            .filter(|(_, is_measure)| !is_measure)
            .filter_map(|(c, _)| c.codelist_ref()),
    )
}

pub fn extract_concept_refs(data_structures: &[DataStructure]) -> Vec<StructureRef> {
    unique_by_ref(
        data_structures
            .iter()
            .flat_map(components)
            .filter_map(|(c, _)| c.concept.as_ref()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdmx::models::{
        Attribute, DataStructureComponents, Dimension, MaintainableMeta, ObjectClass, Package,
        Representation,
    };

    fn meta(id: &str) -> MaintainableMeta {
        MaintainableMeta {
            id: id.into(),
            agency_id: "FR1".into(),
            version: "1.0".into(),
            urn: None,
            names: vec![],
            descriptions: vec![],
        }
    }

    fn dsd_ref(id: &str) -> StructureRef {
        StructureRef {
            id: id.into(),
            agency_id: Some("FR1".into()),
            version: Some("1.0".into()),
            maintainable_parent_id: None,
            maintainable_parent_version: None,
            package: Package::DataStructure,
            class: ObjectClass::DataStructure,
        }
    }

    fn concept(id: &str) -> StructureRef {
        StructureRef {
            id: id.into(),
            agency_id: Some("FR1".into()),
            version: None,
            maintainable_parent_id: Some("CONCEPTS_INSEE".into()),
            maintainable_parent_version: Some("1.0".into()),
            package: Package::ConceptScheme,
            class: ObjectClass::Concept,
        }
    }

    fn codelist(id: &str) -> StructureRef {
        StructureRef {
            id: id.into(),
            agency_id: Some("FR1".into()),
            version: Some("1.0".into()),
            maintainable_parent_id: None,
            maintainable_parent_version: None,
            package: Package::Codelist,
            class: ObjectClass::Codelist,
        }
    }

    fn component(id: &str, representation: Option<Representation>) -> Component {
        Component {
            id: id.into(),
            urn: None,
            concept: Some(concept(id)),
            representation,
        }
    }

    fn dataflow(id: &str, structure: Option<StructureRef>) -> Dataflow {
        Dataflow {
            meta: meta(id),
            structure,
        }
    }

    // --- unique_by_ref ---

    #[test]
    fn test_first_occurrence_wins_and_order_is_kept() {
        let refs = [codelist("B"), codelist("A"), codelist("B"), codelist("C")];
        let ids: Vec<_> = unique_by_ref(&refs).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_empty_ids_are_dropped() {
        let refs = [codelist(""), codelist("A")];
        assert_eq!(unique_by_ref(&refs).len(), 1);
    }

    #[test]
    fn test_parent_scheme_is_part_of_identity() {
        let mut other_scheme = concept("FREQ");
        other_scheme.maintainable_parent_id = Some("OTHER".into());
        let refs = [concept("FREQ"), other_scheme, concept("FREQ")];
        assert_eq!(unique_by_ref(&refs).len(), 2);
    }

    // --- dataflows ---

    #[test]
    fn test_two_dataflows_sharing_a_structure_yield_one_ref() {
        let flows = vec![
            dataflow("DF1", Some(dsd_ref("DSD"))),
            dataflow("DF2", Some(dsd_ref("DSD"))),
            dataflow("DF3", None),
        ];
        let refs = extract_data_structure_refs(&flows);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].id, "DSD");
    }

    // --- components ---

    fn sample_dsd() -> DataStructure {
        DataStructure {
            meta: meta("DSD"),
            components: DataStructureComponents {
                time_dimension: Some(Dimension {
                    component: component(
                        "TIME_PERIOD",
                        Some(Representation::Format("ObservationalTimePeriod".into())),
                    ),
                    position: 3,
                }),
                dimensions: vec![
                    Dimension {
                        component: component(
                            "FREQ",
                            Some(Representation::Enumeration(codelist("CL_FREQ"))),
                        ),
                        position: 1,
                    },
                    Dimension {
                        component: component("GEO", None),
                        position: 2,
                    },
                ],
                attributes: vec![Attribute {
                    component: component(
                        "OBS_STATUS",
                        Some(Representation::Enumeration(codelist("CL_OBS_STATUS"))),
                    ),
                    assignment_status: Some("Conditional".into()),
                }],
                primary_measure: Some(component(
                    "OBS_VALUE",
                    Some(Representation::Enumeration(codelist("CL_MEASURE"))),
                )),
            },
        }
    }

    #[test]
    fn test_concepts_follow_traversal_order() {
        let ids: Vec<_> = extract_concept_refs(&[sample_dsd()])
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(
            ids,
            vec!["TIME_PERIOD", "FREQ", "GEO", "OBS_STATUS", "OBS_VALUE"]
        );
    }

    #[test]
    fn test_codelists_skip_free_form_and_primary_measure() {
        let ids: Vec<_> = extract_codelist_refs(&[sample_dsd(), sample_dsd()])
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["CL_FREQ", "CL_OBS_STATUS"]);
    }
}
