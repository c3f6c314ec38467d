//! Flattening of category trees into parent-linked rows.

use crate::sdmx::errors::SdmxError;
use crate::sdmx::models::{Category, CategoryScheme};
use std::collections::HashSet;

/// One category with its owning scheme and parent link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatCategory<'a> {
    pub scheme_id: &'a str,
    pub scheme_agency_id: &'a str,
    pub scheme_version: &'a str,
    pub parent_id: Option<&'a str>,
    pub category: &'a Category,
}

/// Depth-first pre-order walk of a scheme's category tree.
///
/// Roots come first with no parent, each followed by its descendants. A
/// category id seen twice in the same scheme is reported as a malformed
/// hierarchy instead of being walked again.
pub fn flatten_categories(scheme: &CategoryScheme) -> Result<Vec<FlatCategory<'_>>, SdmxError> {
    let meta = &scheme.meta;
    let mut out = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();

    // Children are pushed in reverse so they pop in declaration order
    let mut stack: Vec<(Option<&str>, &Category)> =
        scheme.categories.iter().rev().map(|c| (None, c)).collect();

    while let Some((parent_id, category)) = stack.pop() {
        let id = category.meta.id.as_str();
        if !visited.insert(id) {
            return Err(SdmxError::MalformedHierarchy {
                scheme: format!("{}:{}({})", meta.agency_id, meta.id, meta.version),
                category: id.to_string(),
            });
        }

        out.push(FlatCategory {
            scheme_id: &meta.id,
            scheme_agency_id: &meta.agency_id,
            scheme_version: &meta.version,
            parent_id,
            category,
        });
        stack.extend(category.children.iter().rev().map(|c| (Some(id), c)));
    }

    Ok(out)
}
