//! Maps structural references onto REST structure queries.

use crate::sdmx::client::{StructureRequest, StructureType};
use crate::sdmx::errors::ResolutionError;
use crate::sdmx::models::{ObjectClass, Package, StructureRef};

/// Translate a reference into the query that retrieves it.
///
/// Only five `(package, class)` pairs have a retrieval shape. Concepts and
/// category schemes are fetched through their maintainable parent.
pub fn resolve(r: &StructureRef) -> Result<StructureRequest, ResolutionError> {
    let (resource, resource_id, version) = match (&r.package, &r.class) {
        (Package::DataStructure, ObjectClass::DataStructure) => {
            (StructureType::DataStructure, Some(r.id.clone()), r.version.clone())
        }
        (Package::DataStructure, ObjectClass::Dataflow) => {
            (StructureType::Dataflow, Some(r.id.clone()), r.version.clone())
        }
        (Package::Codelist, ObjectClass::Codelist) => {
            (StructureType::Codelist, Some(r.id.clone()), r.version.clone())
        }
        (Package::ConceptScheme, ObjectClass::Concept) => (
            StructureType::ConceptScheme,
            Some(parent_id(r)?),
            r.maintainable_parent_version.clone(),
        ),
        (Package::CategoryScheme, ObjectClass::CategoryScheme) => (
            StructureType::CategoryScheme,
            Some(parent_id(r)?),
            r.maintainable_parent_version.clone(),
        ),
        (package, class) => {
            return Err(ResolutionError::Unsupported {
                package: package.clone(),
                class: class.clone(),
                id: r.id.clone(),
            });
        }
    };

    Ok(StructureRequest {
        agency_id: r.agency_id.clone(),
        resource_id,
        version,
        ..StructureRequest::all(resource, None)
    })
}

fn parent_id(r: &StructureRef) -> Result<String, ResolutionError> {
    r.maintainable_parent_id
        .clone()
        .ok_or_else(|| ResolutionError::MissingParent {
            class: r.class.clone(),
            id: r.id.clone(),
        })
}
