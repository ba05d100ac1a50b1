//! Path-based, order-preserving edits.

use super::document::{Attribute, NodeId, XmlDocument};
use super::order::{insertion_index, Sibling, SiblingOrder};
use super::path::XmlPath;
use super::{XmlError, XmlResult};

/// Resolves `container_path` from `parent` and returns the child matching
/// `element_step`, creating it when absent.
///
/// `element_step` is a single step such as `form` or `entry[@id='x']`;
/// attribute predicates become attributes of a newly created element. With a
/// `namespace` prefix the element name becomes `prefix:name`.
///
/// # Errors
/// - `InvalidPath` when either expression is malformed or `element_step` is
///   not a single named step.
/// - `PathNotFound` when `container_path` selects nothing. Intermediate
///   containers are never created.
/// - `NotAnElement` when the container is not an element.
pub fn find_or_create_child(
    doc: &mut XmlDocument,
    parent: NodeId,
    container_path: &str,
    element_step: &str,
    namespace: Option<&str>,
    order: Option<&dyn SiblingOrder>,
) -> XmlResult<NodeId> {
    let container_expr = XmlPath::parse(container_path)?;
    let container = doc
        .select_single(parent, &container_expr)
        .ok_or_else(|| XmlError::PathNotFound(container_expr.to_string()))?;

    let qualified = match namespace {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}:{element_step}"),
        _ => element_step.to_string(),
    };
    let step_expr = XmlPath::parse(&qualified)?;
    if let Some(existing) = doc.select_single(container, &step_expr) {
        return Ok(existing);
    }

    let Some((name, step)) = step_expr.creatable_step() else {
        return Err(XmlError::InvalidPath {
            path: qualified,
            reason: "a created element needs a single named step".to_string(),
        });
    };
    if !doc.is_element(container) {
        return Err(XmlError::NotAnElement(container));
    }

    let created = doc.create_element(name);
    let attributes = doc.attributes_mut(created)?;
    for (attribute, value) in step.attribute_predicates() {
        attributes.push(Attribute::new(attribute, value));
    }

    match order {
        Some(order) => insert_using_order(doc, container, created, order)?,
        None => doc.append_child(container, created)?,
    }
    Ok(created)
}

/// Sets attribute `name` on `node`.
///
/// An existing attribute is updated in place. A new one is appended, or
/// placed by `order` among the node's attributes. Returns whether the
/// document changed.
pub fn set_attribute(
    doc: &mut XmlDocument,
    node: NodeId,
    name: &str,
    value: &str,
    order: Option<&dyn SiblingOrder>,
) -> XmlResult<bool> {
    let attributes = doc.attributes_mut(node)?;
    if let Some(existing) = attributes.iter_mut().find(|attribute| attribute.name == name) {
        if existing.value == value {
            return Ok(false);
        }
        existing.value = value.to_string();
        return Ok(true);
    }

    let attribute = Attribute::new(name, value);
    let index = match order {
        Some(order) => insertion_index(
            attributes
                .iter()
                .enumerate()
                .map(|(index, existing)| (index, Sibling::Attribute(existing))),
            &Sibling::Attribute(&attribute),
            order,
        ),
        None => attributes.len(),
    };
    attributes.insert(index, attribute);
    Ok(true)
}

/// Removes the first node selected by `path` from `root`.
///
/// Returns `false` when nothing matches.
pub fn remove_node(doc: &mut XmlDocument, root: NodeId, path: &str) -> XmlResult<bool> {
    let expr = XmlPath::parse(path)?;
    match doc.select_single(root, &expr) {
        Some(found) if found != doc.root() => Ok(doc.detach(found)),
        _ => Ok(false),
    }
}

/// Inserts element `child` under `parent` after the last element sibling
/// that does not sort after it. Non-element siblings are skipped.
pub fn insert_using_order(
    doc: &mut XmlDocument,
    parent: NodeId,
    child: NodeId,
    order: &dyn SiblingOrder,
) -> XmlResult<()> {
    let index = {
        let candidate = doc.element(child).ok_or(XmlError::NotAnElement(child))?;
        let candidate = Sibling::Element {
            name: &candidate.name,
            attributes: &candidate.attributes,
        };
        let siblings = doc
            .children(parent)
            .iter()
            .enumerate()
            .filter(|(_, sibling)| **sibling != child)
            .filter_map(|(index, sibling)| {
                doc.element(*sibling).map(|element| {
                    (
                        index,
                        Sibling::Element {
                            name: &element.name,
                            attributes: &element.attributes,
                        },
                    )
                })
            });
        insertion_index(siblings, &candidate, order)
    };
    doc.insert_child(parent, index, child)
}

/// Reads an optional attribute, falling back to `default`.
pub fn optional_attribute(
    doc: &XmlDocument,
    node: NodeId,
    name: &str,
    default: Option<&str>,
) -> Option<String> {
    doc.attribute(node, name)
        .or(default)
        .map(str::to_string)
}

/// `true` when the attribute reads `true` or `yes` (any case).
pub fn boolean_attribute(doc: &XmlDocument, node: NodeId, name: &str, default: bool) -> bool {
    match doc.attribute(node, name) {
        Some(value) => {
            value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes")
        }
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        boolean_attribute, find_or_create_child, optional_attribute, remove_node, set_attribute,
    };
    use crate::xml::{NameOrder, XmlDocument, XmlError};

    const ENTRY_ORDER: NameOrder = NameOrder::new(&["lexical-unit", "sense"]);
    const ATTRIBUTE_ORDER: NameOrder = NameOrder::new(&["id", "dateCreated", "dateModified"]);

    #[test]
    fn find_or_create_returns_existing_child_unchanged() {
        let mut doc = XmlDocument::parse("<lift><entry id='a'><sense/></entry></lift>").unwrap();
        let lift = doc.document_element().unwrap();
        let before = doc.to_xml_string();

        let found = find_or_create_child(&mut doc, lift, ".", "entry[@id='a']", None, None).unwrap();
        assert_eq!(doc.attribute(found, "id"), Some("a"));
        assert_eq!(doc.to_xml_string(), before);
    }

    #[test]
    fn find_or_create_appends_without_order() {
        let mut doc = XmlDocument::parse("<entry><sense/></entry>").unwrap();
        let entry = doc.document_element().unwrap();

        find_or_create_child(&mut doc, entry, ".", "lexical-unit", None, None).unwrap();
        assert_eq!(doc.to_xml_string(), "<entry><sense /><lexical-unit /></entry>");
    }

    #[test]
    fn find_or_create_respects_order_and_skips_text_nodes() {
        let mut doc = XmlDocument::parse("<entry>\n  <sense />\n</entry>").unwrap();
        let entry = doc.document_element().unwrap();

        find_or_create_child(&mut doc, entry, ".", "lexical-unit", None, Some(&ENTRY_ORDER))
            .unwrap();
        assert_eq!(
            doc.to_xml_string(),
            "<entry><lexical-unit />\n  <sense />\n</entry>"
        );
    }

    #[test]
    fn find_or_create_places_equal_keys_after_last_equal() {
        let mut doc = XmlDocument::parse("<e><sense id='1'/><note/></e>").unwrap();
        let entry = doc.document_element().unwrap();

        find_or_create_child(&mut doc, entry, ".", "sense[@id='2']", None, Some(&ENTRY_ORDER))
            .unwrap();
        assert_eq!(
            doc.to_xml_string(),
            "<e><sense id=\"1\" /><sense id=\"2\" /><note /></e>"
        );
    }

    #[test]
    fn find_or_create_fails_on_missing_intermediate_path() {
        let mut doc = XmlDocument::parse("<lift/>").unwrap();
        let lift = doc.document_element().unwrap();

        let err = find_or_create_child(&mut doc, lift, "entry/sense", "trait", None, None)
            .unwrap_err();
        assert_eq!(err, XmlError::PathNotFound("entry/sense".to_string()));
        assert_eq!(doc.to_xml_string(), "<lift />");

        let err = find_or_create_child(&mut doc, lift, ".", "a/b", None, None).unwrap_err();
        assert!(matches!(err, XmlError::InvalidPath { .. }));
        let err = find_or_create_child(&mut doc, lift, "[", "a", None, None).unwrap_err();
        assert!(matches!(err, XmlError::InvalidPath { .. }));
    }

    #[test]
    fn find_or_create_uses_namespace_prefix() {
        let mut doc = XmlDocument::parse("<r xmlns:x='urn:x'/>").unwrap();
        let root = doc.document_element().unwrap();

        let created = find_or_create_child(&mut doc, root, ".", "meta", Some("x"), None).unwrap();
        assert_eq!(doc.name(created), Some("x:meta"));
        let again = find_or_create_child(&mut doc, root, ".", "meta", Some("x"), None).unwrap();
        assert_eq!(created, again);
    }

    #[test]
    fn ordered_inserts_are_independent_of_call_order() {
        let mut forward = XmlDocument::parse("<e/>").unwrap();
        let mut reverse = forward.clone();
        let e = forward.document_element().unwrap();

        set_attribute(&mut forward, e, "id", "1", Some(&ATTRIBUTE_ORDER)).unwrap();
        set_attribute(&mut forward, e, "dateModified", "2", Some(&ATTRIBUTE_ORDER)).unwrap();
        find_or_create_child(&mut forward, e, ".", "lexical-unit", None, Some(&ENTRY_ORDER)).unwrap();
        find_or_create_child(&mut forward, e, ".", "sense", None, Some(&ENTRY_ORDER)).unwrap();

        set_attribute(&mut reverse, e, "dateModified", "2", Some(&ATTRIBUTE_ORDER)).unwrap();
        set_attribute(&mut reverse, e, "id", "1", Some(&ATTRIBUTE_ORDER)).unwrap();
        find_or_create_child(&mut reverse, e, ".", "sense", None, Some(&ENTRY_ORDER)).unwrap();
        find_or_create_child(&mut reverse, e, ".", "lexical-unit", None, Some(&ENTRY_ORDER)).unwrap();

        assert_eq!(forward.to_xml_string(), reverse.to_xml_string());
        assert_eq!(
            forward.to_xml_string(),
            "<e id=\"1\" dateModified=\"2\"><lexical-unit /><sense /></e>"
        );
    }

    #[test]
    fn set_attribute_updates_in_place_and_reports_change() {
        let mut doc = XmlDocument::parse("<e b='1' a='2'/>").unwrap();
        let e = doc.document_element().unwrap();

        assert!(!set_attribute(&mut doc, e, "b", "1", None).unwrap());
        assert!(set_attribute(&mut doc, e, "b", "3", Some(&ATTRIBUTE_ORDER)).unwrap());
        assert!(set_attribute(&mut doc, e, "c", "4", None).unwrap());
        assert_eq!(doc.to_xml_string(), "<e b=\"3\" a=\"2\" c=\"4\" />");
    }

    #[test]
    fn set_attribute_rejects_non_elements() {
        let mut doc = XmlDocument::parse("<e>text</e>").unwrap();
        let e = doc.document_element().unwrap();
        let text = doc.children(e)[0];
        assert_eq!(
            set_attribute(&mut doc, text, "a", "b", None).unwrap_err(),
            XmlError::NotAnElement(text)
        );
    }

    #[test]
    fn remove_node_removes_first_match_and_ignores_misses() {
        let mut doc = XmlDocument::parse("<r><s id='1'/><s id='2'/></r>").unwrap();
        let r = doc.document_element().unwrap();

        assert!(remove_node(&mut doc, r, "s").unwrap());
        assert_eq!(doc.to_xml_string(), "<r><s id=\"2\" /></r>");
        assert!(!remove_node(&mut doc, r, "s[@id='9']").unwrap());
        assert!(remove_node(&mut doc, r, "x[").is_err());
    }

    #[test]
    fn attribute_accessors_apply_defaults() {
        let doc = XmlDocument::parse("<e flag='YES' other='no' name='n'/>").unwrap();
        let e = doc.document_element().unwrap();

        assert_eq!(optional_attribute(&doc, e, "name", None).as_deref(), Some("n"));
        assert_eq!(optional_attribute(&doc, e, "missing", None), None);
        assert_eq!(
            optional_attribute(&doc, e, "missing", Some("d")).as_deref(),
            Some("d")
        );
        assert!(boolean_attribute(&doc, e, "flag", false));
        assert!(!boolean_attribute(&doc, e, "other", true));
        assert!(boolean_attribute(&doc, e, "missing", true));
    }
}
