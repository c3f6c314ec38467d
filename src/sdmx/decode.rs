//! SDMX-ML 2.1 structure message decoder.
//!
//! The payload is first read into a small element tree keyed by local names
//! (namespace prefixes vary between registries), then mapped onto the typed
//! structure model. Absent lists decode as `None`, never as an error.

use crate::sdmx::errors::DecodeError;
use crate::sdmx::models::{
    Attribute, Categorisation, Category, CategoryScheme, Codelist, Component, ConceptScheme,
    DataStructure, DataStructureComponents, Dataflow, Dimension, ItemMeta, LocalisedText,
    MaintainableMeta, Message, ObjectClass, Package, Representation, StatusMessage,
    StructureRef, Structures,
};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// Turns a raw registry payload into a structure message or an error envelope.
pub trait StructureDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Message, DecodeError>;
}

/// Decoder for `application/vnd.sdmx.structure+xml;version=2.1`.
#[derive(Debug, Default, Clone, Copy)]
pub struct XmlDecoder;

impl StructureDecoder for XmlDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Message, DecodeError> {
        let root = parse_tree(bytes)?;
        match root.name.as_str() {
            "Structure" => Ok(Message::Structure(
                root.child("Structures")
                    .map(decode_structures)
                    .transpose()?
                    .unwrap_or_default(),
            )),
            "Error" => Ok(Message::Error(decode_error_messages(&root))),
            other => Err(DecodeError::UnknownRoot(other.to_string())),
        }
    }
}

#[derive(Debug, Default)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn from_start(start: &BytesStart<'_>, position: u64) -> Result<Self, DecodeError> {
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            if attr.key.as_ref().starts_with(b"xmlns") {
                continue;
            }
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|source| DecodeError::Xml { position, source })?
                .into_owned();
            attrs.push((key, value));
        }
        Ok(Self {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            attrs,
            children: Vec::new(),
            text: String::new(),
        })
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn require(&self, key: &'static str) -> Result<&str, DecodeError> {
        self.attr(key).ok_or_else(|| DecodeError::MissingAttribute {
            element: self.name.clone(),
            attribute: key,
        })
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }
}

fn parse_tree(bytes: &[u8]) -> Result<Element, DecodeError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(source) => {
                return Err(DecodeError::Xml {
                    position: reader.error_position() as u64,
                    source,
                });
            }
        };
        let position = reader.buffer_position() as u64;

        match event {
            Event::Start(start) => stack.push(Element::from_start(&start, position)?),
            Event::Empty(start) => {
                let element = Element::from_start(&start, position)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    let value = text
                        .unescape()
                        .map_err(|source| DecodeError::Xml { position, source })?;
                    top.text.push_str(&value);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(DecodeError::Unclosed(open.name.clone()));
    }
    root.ok_or(DecodeError::Empty)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn decode_error_messages(root: &Element) -> Vec<StatusMessage> {
    root.children_named("ErrorMessage")
        .map(|m| StatusMessage {
            code: m.attr("code").unwrap_or_default().to_string(),
            texts: m.children_named("Text").map(|t| t.text.clone()).collect(),
        })
        .collect()
}

fn decode_structures(el: &Element) -> Result<Structures, DecodeError> {
    Ok(Structures {
        dataflows: decode_list(el, "Dataflows", "Dataflow", decode_dataflow)?,
        data_structures: decode_list(el, "DataStructures", "DataStructure", decode_data_structure)?,
        codelists: decode_list(el, "Codelists", "Codelist", decode_codelist)?,
        concept_schemes: decode_list(el, "Concepts", "ConceptScheme", decode_concept_scheme)?,
        category_schemes: decode_list(el, "CategorySchemes", "CategoryScheme", decode_category_scheme)?,
        categorisations: decode_list(el, "Categorisations", "Categorisation", decode_categorisation)?,
    })
}

fn decode_list<T>(
    parent: &Element,
    container: &str,
    item: &str,
    decode: impl Fn(&Element) -> Result<T, DecodeError>,
) -> Result<Option<Vec<T>>, DecodeError> {
    parent
        .child(container)
        .map(|c| c.children_named(item).map(&decode).collect())
        .transpose()
}

fn texts(el: &Element, name: &str) -> Vec<LocalisedText> {
    el.children_named(name)
        .map(|t| LocalisedText {
            lang: t.attr("lang").map(str::to_string),
            value: t.text.clone(),
        })
        .collect()
}

fn maintainable(el: &Element) -> Result<MaintainableMeta, DecodeError> {
    Ok(MaintainableMeta {
        id: el.require("id")?.to_string(),
        agency_id: el.require("agencyID")?.to_string(),
        version: el.attr("version").unwrap_or("1.0").to_string(),
        urn: el.attr("urn").map(str::to_string),
        names: texts(el, "Name"),
        descriptions: texts(el, "Description"),
    })
}

fn item(el: &Element) -> Result<ItemMeta, DecodeError> {
    Ok(ItemMeta {
        id: el.require("id")?.to_string(),
        urn: el.attr("urn").map(str::to_string),
        names: texts(el, "Name"),
        descriptions: texts(el, "Description"),
    })
}

/// Reads the `<Ref>` child of a reference wrapper element.
///
/// `package`/`class` fall back to the defaults the schema assigns to the
/// wrapper when the registry omits them. URN-only references yield `None`.
fn reference(
    wrapper: Option<&Element>,
    package: Package,
    class: ObjectClass,
) -> Option<StructureRef> {
    let r = wrapper?.child("Ref")?;
    let owned = |key: &str| r.attr(key).map(str::to_string);
    Some(StructureRef {
        id: owned("id")?,
        agency_id: owned("agencyID"),
        version: owned("version"),
        maintainable_parent_id: owned("maintainableParentID"),
        maintainable_parent_version: owned("maintainableParentVersion"),
        package: r.attr("package").map(Package::parse).unwrap_or(package),
        class: r.attr("class").map(ObjectClass::parse).unwrap_or(class),
    })
}

fn decode_dataflow(el: &Element) -> Result<Dataflow, DecodeError> {
    Ok(Dataflow {
        meta: maintainable(el)?,
        structure: reference(
            el.child("Structure"),
            Package::DataStructure,
            ObjectClass::DataStructure,
        ),
    })
}

fn component(el: &Element) -> Result<Component, DecodeError> {
    let representation = el.child("LocalRepresentation").and_then(|repr| {
        if let Some(format) = repr.child("TextFormat") {
            return Some(Representation::Format(
                format.attr("textType").unwrap_or("String").to_string(),
            ));
        }
        reference(
            repr.child("Enumeration"),
            Package::Codelist,
            ObjectClass::Codelist,
        )
        .map(Representation::Enumeration)
    });

    Ok(Component {
        id: el.require("id")?.to_string(),
        urn: el.attr("urn").map(str::to_string),
        concept: reference(
            el.child("ConceptIdentity"),
            Package::ConceptScheme,
            ObjectClass::Concept,
        ),
        representation,
    })
}

fn dimension(el: &Element, ordinal: usize) -> Result<Dimension, DecodeError> {
    let position = match el.attr("position") {
        Some(raw) => raw.parse().map_err(|_| DecodeError::InvalidValue {
            element: el.name.clone(),
            attribute: "position",
            value: raw.to_string(),
        })?,
        None => i32::try_from(ordinal).unwrap_or(i32::MAX),
    };
    Ok(Dimension {
        component: component(el)?,
        position,
    })
}

fn decode_data_structure(el: &Element) -> Result<DataStructure, DecodeError> {
    let mut components = DataStructureComponents::default();

    if let Some(list) = el.child("DataStructureComponents") {
        if let Some(dims) = list.child("DimensionList") {
            let declared = dims
                .children
                .iter()
                .filter(|c| c.name == "Dimension" || c.name == "TimeDimension");
            for (idx, d) in declared.enumerate() {
                let dim = dimension(d, idx + 1)?;
                if d.name == "TimeDimension" {
                    components.time_dimension = Some(dim);
                } else {
                    components.dimensions.push(dim);
                }
            }
        }
        if let Some(attrs) = list.child("AttributeList") {
            for a in attrs.children_named("Attribute") {
                components.attributes.push(Attribute {
                    component: component(a)?,
                    assignment_status: a.attr("assignmentStatus").map(str::to_string),
                });
            }
        }
        if let Some(measure) = list
            .child("MeasureList")
            .and_then(|m| m.child("PrimaryMeasure"))
        {
            components.primary_measure = Some(component(measure)?);
        }
    }

    Ok(DataStructure {
        meta: maintainable(el)?,
        components,
    })
}

fn decode_codelist(el: &Element) -> Result<Codelist, DecodeError> {
    Ok(Codelist {
        meta: maintainable(el)?,
        codes: el.children_named("Code").map(item).collect::<Result<_, _>>()?,
    })
}

fn decode_concept_scheme(el: &Element) -> Result<ConceptScheme, DecodeError> {
    Ok(ConceptScheme {
        meta: maintainable(el)?,
        concepts: el
            .children_named("Concept")
            .map(item)
            .collect::<Result<_, _>>()?,
    })
}

fn decode_category(el: &Element) -> Result<Category, DecodeError> {
    Ok(Category {
        meta: item(el)?,
        children: el
            .children_named("Category")
            .map(decode_category)
            .collect::<Result<_, _>>()?,
    })
}

fn decode_category_scheme(el: &Element) -> Result<CategoryScheme, DecodeError> {
    Ok(CategoryScheme {
        meta: maintainable(el)?,
        categories: el
            .children_named("Category")
            .map(decode_category)
            .collect::<Result<_, _>>()?,
    })
}

fn decode_categorisation(el: &Element) -> Result<Categorisation, DecodeError> {
    Ok(Categorisation {
        meta: maintainable(el)?,
        source: reference(
            el.child("Source"),
            Package::DataStructure,
            ObjectClass::Dataflow,
        ),
        target: reference(
            el.child("Target"),
            Package::CategoryScheme,
            ObjectClass::Category,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(xml: &str) -> Result<Message, DecodeError> {
        XmlDecoder.decode(xml.as_bytes())
    }

    fn structures(xml: &str) -> Structures {
        match decode(xml).unwrap() {
            Message::Structure(s) => s,
            Message::Error(e) => panic!("unexpected error envelope: {e:?}"),
        }
    }

    const HEADER: &str = r#"<mes:Header><mes:ID>IREF1</mes:ID><mes:Prepared>2024-01-01T00:00:00</mes:Prepared></mes:Header>"#;

    #[test]
    fn test_error_envelope() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <mes:Error xmlns:mes="http://www.sdmx.org/resources/sdmxml/schemas/v2_1/message"
                       xmlns:com="http://www.sdmx.org/resources/sdmxml/schemas/v2_1/common">
              <mes:ErrorMessage code="100">
                <com:Text xml:lang="en">No Results Found</com:Text>
              </mes:ErrorMessage>
            </mes:Error>"#;
        assert_eq!(
            decode(xml).unwrap(),
            Message::Error(vec![StatusMessage {
                code: "100".into(),
                texts: vec!["No Results Found".into()],
            }])
        );
    }

    #[test]
    fn test_unknown_root_is_rejected() {
        assert!(matches!(
            decode("<html><body/></html>"),
            Err(DecodeError::UnknownRoot(name)) if name == "html"
        ));
    }

    #[test]
    fn test_malformed_xml_is_rejected() {
        assert!(matches!(
            decode("<Structure><Structures></Dataflows></Structure>"),
            Err(DecodeError::Xml { .. })
        ));
        assert!(matches!(decode(""), Err(DecodeError::Empty)));
    }

    #[test]
    fn test_absent_lists_are_none() {
        let s = structures(&format!(
            "<mes:Structure xmlns:mes=\"m\">{HEADER}<mes:Structures/></mes:Structure>"
        ));
        assert_eq!(s, Structures::default());

        let s = structures("<Structure/>");
        assert!(s.dataflows.is_none());
    }

    #[test]
    fn test_dataflow_with_default_ref_kind() {
        let s = structures(
            r#"<Structure><Structures><Dataflows>
                <Dataflow id="DF" agencyID="A" version="2.0" urn="urn:df">
                  <Name xml:lang="fr">Flux</Name>
                  <Name xml:lang="en">Flow &amp; more</Name>
                  <Structure><Ref id="DSD" agencyID="A" version="1.0"/></Structure>
                </Dataflow>
                <Dataflow id="NO_STRUCT" agencyID="A"/>
            </Dataflows></Structures></Structure>"#,
        );
        let flows = s.dataflows.unwrap();
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0].meta.names[1].value, "Flow & more");
        let r = flows[0].structure.as_ref().unwrap();
        assert_eq!(r.package, Package::DataStructure);
        assert_eq!(r.class, ObjectClass::DataStructure);
        assert!(flows[1].structure.is_none());
        assert_eq!(flows[1].meta.version, "1.0");
    }

    #[test]
    fn test_dimension_position_falls_back_to_declaration_order() {
        let s = structures(
            r#"<Structure><Structures><DataStructures>
                <DataStructure id="DSD" agencyID="A" version="1.0">
                  <DataStructureComponents>
                    <DimensionList>
                      <Dimension id="FREQ" position="1">
                        <LocalRepresentation><Enumeration>
                          <Ref id="CL_FREQ" agencyID="A" version="1.0" package="codelist" class="Codelist"/>
                        </Enumeration></LocalRepresentation>
                      </Dimension>
                      <Dimension id="GEO"/>
                      <TimeDimension id="TIME_PERIOD">
                        <LocalRepresentation><TextFormat textType="ObservationalTimePeriod"/></LocalRepresentation>
                      </TimeDimension>
                    </DimensionList>
                    <MeasureList><PrimaryMeasure id="OBS_VALUE"/></MeasureList>
                  </DataStructureComponents>
                </DataStructure>
            </DataStructures></Structures></Structure>"#,
        );
        let dsd = &s.data_structures.unwrap()[0];
        let c = &dsd.components;
        assert_eq!(c.dimensions[0].position, 1);
        assert_eq!(c.dimensions[1].position, 2);
        assert_eq!(c.time_dimension.as_ref().unwrap().position, 3);
        assert_eq!(
            c.dimensions[0].component.codelist_ref().unwrap().id,
            "CL_FREQ"
        );
        assert_eq!(
            c.time_dimension.as_ref().unwrap().component.representation,
            Some(Representation::Format("ObservationalTimePeriod".into()))
        );
        assert_eq!(c.primary_measure.as_ref().unwrap().id, "OBS_VALUE");
        assert!(c.attributes.is_empty());
    }

    #[test]
    fn test_invalid_position_is_a_decode_error() {
        let result = decode(
            r#"<Structure><Structures><DataStructures>
                <DataStructure id="DSD" agencyID="A"><DataStructureComponents><DimensionList>
                  <Dimension id="FREQ" position="first"/>
                </DimensionList></DataStructureComponents></DataStructure>
            </DataStructures></Structures></Structure>"#,
        );
        assert!(matches!(result, Err(DecodeError::InvalidValue { attribute: "position", .. })));
    }

    #[test]
    fn test_nested_categories() {
        let s = structures(
            r#"<Structure><Structures><CategorySchemes>
                <CategoryScheme id="CS" agencyID="A" version="1.0">
                  <Category id="ROOT"><Name xml:lang="en">Root</Name>
                    <Category id="CHILD"><Name xml:lang="en">Child</Name></Category>
                  </Category>
                </CategoryScheme>
            </CategorySchemes></Structures></Structure>"#,
        );
        let scheme = &s.category_schemes.unwrap()[0];
        assert_eq!(scheme.categories.len(), 1);
        assert_eq!(scheme.categories[0].children[0].meta.id, "CHILD");
    }

    #[test]
    fn test_missing_agency_is_a_decode_error() {
        let result = decode(
            r#"<Structure><Structures><Codelists><Codelist id="CL"/></Codelists></Structures></Structure>"#,
        );
        assert!(matches!(
            result,
            Err(DecodeError::MissingAttribute { attribute: "agencyID", .. })
        ));
    }
}
