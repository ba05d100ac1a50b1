//! Mapping between `LexEntry` and LIFT `<entry>` elements.
//!
//! # Responsibility
//! - Read entries out of a parsed document.
//! - Write entries back with order-preserving, idempotent tree edits.
//!
//! # Invariants
//! - Writing an unchanged entry leaves the document unchanged.
//! - New attributes and children land in LIFT schema order.
//! - Elements and attributes this model does not know are left in place.
//! - A sense is written back to the element it was read from, even when that
//!   element had no `id`.

use super::{RepoError, RepoResult};
use crate::model::entry::{LexEntry, Sense, Trait};
use crate::model::multitext::MultiText;
use crate::xml::{
    find_or_create_child, insert_using_order, optional_attribute, quote_literal, set_attribute,
    NameOrder, NodeId, XmlDocument,
};
use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use log::warn;
use std::collections::HashMap;
use uuid::Uuid;

pub const LIFT: &str = "lift";
pub const ENTRY: &str = "entry";
pub const LEXICAL_UNIT: &str = "lexical-unit";
pub const FORM: &str = "form";
pub const TEXT: &str = "text";
pub const SENSE: &str = "sense";
pub const TRAIT: &str = "trait";

pub const LIFT_CHILD_ORDER: NameOrder = NameOrder::new(&["header", ENTRY]);
pub const ENTRY_ATTRIBUTE_ORDER: NameOrder =
    NameOrder::new(&["id", "order", "dateCreated", "dateModified", "dateDeleted", "guid"]);
pub const ENTRY_CHILD_ORDER: NameOrder = NameOrder::new(&[
    LEXICAL_UNIT,
    "citation",
    "pronunciation",
    "variant",
    SENSE,
    "note",
    "relation",
    "etymology",
    "annotation",
    "field",
    TRAIT,
]);
pub const SENSE_CHILD_ORDER: NameOrder = NameOrder::new(&[
    "grammatical-info",
    "gloss",
    "definition",
    "relation",
    "note",
    "example",
    "reversal",
    "illustration",
    "subsense",
    TRAIT,
    "field",
]);
pub const SENSE_ATTRIBUTE_ORDER: NameOrder = NameOrder::new(&["id", "order"]);
pub const TRAIT_ATTRIBUTE_ORDER: NameOrder = NameOrder::new(&["name", "value"]);

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Parses RFC 3339 or date-only (`YYYY-MM-DD`) values, truncated to seconds.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc).trunc_subsecs(0));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

/// Elements an entry was read from or written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryNodes {
    pub entry: NodeId,
    /// Sense element per sense id.
    pub senses: HashMap<String, NodeId>,
}

/// Builds a clean `LexEntry` from an `<entry>` element, along with the
/// elements its senses came from.
///
/// `position` is the entry's index among its siblings, used to name entries
/// that carry no identity at all.
///
/// # Errors
/// - `Corrupt` for an entry with neither `id` nor `guid`, an unparsable
///   timestamp, or duplicate sense ids.
pub fn read_entry(
    doc: &XmlDocument,
    node: NodeId,
    position: usize,
) -> RepoResult<(LexEntry, EntryNodes)> {
    let guid = doc.attribute(node, "guid").filter(|value| !value.trim().is_empty());
    let id = match doc
        .attribute(node, "id")
        .filter(|value| !value.trim().is_empty())
        .or(guid)
    {
        Some(id) => id.to_string(),
        None => {
            return Err(RepoError::Corrupt {
                entry: format!("#{position}"),
                message: "entry has neither id nor guid".to_string(),
            })
        }
    };
    let guid = guid
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let created = read_timestamp(doc, node, "dateCreated", &id)?;
    let modified = read_timestamp(doc, node, "dateModified", &id)?;
    let date_created = created.or(modified).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let date_modified = modified.or(created).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    if date_modified < date_created {
        warn!(
            "event=entry_read module=repo status=clamped entry_id={} reason=modified_before_created",
            id
        );
    }

    let lexical_form = match doc.child_elements_named(node, LEXICAL_UNIT).next() {
        Some(unit) => read_multitext(doc, unit, &id),
        None => MultiText::new(),
    };

    let mut senses: Vec<Sense> = Vec::new();
    let mut sense_nodes = HashMap::new();
    for sense_node in doc.child_elements_named(node, SENSE) {
        let sense = read_sense(doc, sense_node);
        if sense_nodes.contains_key(&sense.id) {
            return Err(RepoError::Corrupt {
                entry: id,
                message: format!("duplicate sense id `{}`", sense.id),
            });
        }
        sense_nodes.insert(sense.id.clone(), sense_node);
        senses.push(sense);
    }

    let entry = LexEntry::restore(
        id,
        guid,
        date_created,
        date_modified,
        lexical_form,
        senses,
    );
    Ok((
        entry,
        EntryNodes {
            entry: node,
            senses: sense_nodes,
        },
    ))
}

fn read_timestamp(
    doc: &XmlDocument,
    node: NodeId,
    attribute: &str,
    entry_id: &str,
) -> RepoResult<Option<DateTime<Utc>>> {
    match doc.attribute(node, attribute) {
        None => Ok(None),
        Some(raw) => parse_timestamp(raw).map(Some).ok_or_else(|| RepoError::Corrupt {
            entry: entry_id.to_string(),
            message: format!("unparsable {attribute} `{raw}`"),
        }),
    }
}

fn read_multitext(doc: &XmlDocument, container: NodeId, entry_id: &str) -> MultiText {
    let mut text = MultiText::new();
    for form in doc.child_elements_named(container, FORM) {
        let Some(lang) = doc.attribute(form, "lang") else {
            warn!(
                "event=entry_read module=repo status=skipped entry_id={} reason=form_without_lang",
                entry_id
            );
            continue;
        };
        let value = doc
            .child_elements_named(form, TEXT)
            .next()
            .map(|node| doc.text(node))
            .unwrap_or_default();
        text.set(lang, &value);
    }
    text
}

fn read_sense(doc: &XmlDocument, node: NodeId) -> Sense {
    let id = optional_attribute(doc, node, "id", None)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let traits = doc
        .child_elements_named(node, TRAIT)
        .filter_map(|trait_node| {
            let name = optional_attribute(doc, trait_node, "name", None)?;
            let value = optional_attribute(doc, trait_node, "value", Some(""))?;
            Some(Trait { name, value })
        })
        .collect();
    Sense { id, traits }
}

/// Writes `entry` into the document under `lift`.
///
/// `known` holds the elements the entry was loaded from or last saved to.
/// Without it the entry is looked up by id and created when absent.
///
/// # Errors
/// - `NotFound` when the known entry element is no longer attached under
///   `lift`.
/// - `Path` when a tree edit fails.
pub fn write_entry(
    doc: &mut XmlDocument,
    lift: NodeId,
    entry: &LexEntry,
    known: Option<&EntryNodes>,
) -> RepoResult<EntryNodes> {
    let node = match known {
        Some(known) if doc.parent(known.entry) == Some(lift) => known.entry,
        Some(_) => return Err(RepoError::NotFound(entry.id().to_string())),
        None => find_or_create_child(
            doc,
            lift,
            ".",
            &format!("{ENTRY}[@id={}]", quote_literal(entry.id())),
            None,
            Some(&LIFT_CHILD_ORDER),
        )?,
    };

    set_attribute(doc, node, "id", entry.id(), Some(&ENTRY_ATTRIBUTE_ORDER))?;
    write_timestamp(doc, node, "dateCreated", entry.date_created())?;
    write_timestamp(doc, node, "dateModified", entry.date_modified())?;
    set_attribute(doc, node, "guid", entry.guid(), Some(&ENTRY_ATTRIBUTE_ORDER))?;

    let unit = doc.child_elements_named(node, LEXICAL_UNIT).next();
    match unit {
        Some(unit) => write_multitext(doc, unit, entry.lexical_form())?,
        None if !entry.lexical_form().is_empty() => {
            let unit = find_or_create_child(
                doc,
                node,
                ".",
                LEXICAL_UNIT,
                None,
                Some(&ENTRY_CHILD_ORDER),
            )?;
            write_multitext(doc, unit, entry.lexical_form())?;
        }
        None => {}
    }

    let senses = write_senses(doc, node, entry.senses(), known.map(|known| &known.senses))?;
    Ok(EntryNodes {
        entry: node,
        senses,
    })
}

fn write_timestamp(
    doc: &mut XmlDocument,
    node: NodeId,
    attribute: &str,
    value: DateTime<Utc>,
) -> RepoResult<()> {
    let current = doc.attribute(node, attribute).and_then(parse_timestamp);
    if current != Some(value) {
        set_attribute(
            doc,
            node,
            attribute,
            &format_timestamp(value),
            Some(&ENTRY_ATTRIBUTE_ORDER),
        )?;
    }
    Ok(())
}

fn write_multitext(doc: &mut XmlDocument, container: NodeId, text: &MultiText) -> RepoResult<()> {
    for (lang, value) in text.iter() {
        let form = find_or_create_child(
            doc,
            container,
            ".",
            &format!("{FORM}[@lang={}]", quote_literal(lang)),
            None,
            None,
        )?;
        let text_node = find_or_create_child(doc, form, ".", TEXT, None, None)?;
        if doc.text(text_node) != value {
            doc.set_text(text_node, value)?;
        }
    }

    let stale: Vec<NodeId> = doc
        .child_elements_named(container, FORM)
        .filter(|form| {
            doc.attribute(*form, "lang")
                .is_some_and(|lang| !text.contains(lang))
        })
        .collect();
    for form in stale {
        doc.detach(form);
    }
    Ok(())
}

fn write_senses(
    doc: &mut XmlDocument,
    entry_node: NodeId,
    senses: &[Sense],
    known: Option<&HashMap<String, NodeId>>,
) -> RepoResult<HashMap<String, NodeId>> {
    let mut written = Vec::with_capacity(senses.len());
    for sense in senses {
        let known_node = known
            .and_then(|known| known.get(&sense.id))
            .copied()
            .filter(|node| doc.parent(*node) == Some(entry_node));
        let sense_node = match known_node {
            Some(node) => node,
            None => find_or_create_child(
                doc,
                entry_node,
                ".",
                &format!("{SENSE}[@id={}]", quote_literal(&sense.id)),
                None,
                Some(&ENTRY_CHILD_ORDER),
            )?,
        };
        set_attribute(doc, sense_node, "id", &sense.id, Some(&SENSE_ATTRIBUTE_ORDER))?;
        write_traits(doc, sense_node, &sense.traits)?;
        written.push(sense_node);
    }

    let stale: Vec<NodeId> = doc
        .child_elements_named(entry_node, SENSE)
        .filter(|node| !written.contains(node))
        .collect();
    for node in stale {
        doc.detach(node);
    }

    let current: Vec<NodeId> = doc.child_elements_named(entry_node, SENSE).collect();
    if current != written {
        for node in &written {
            doc.detach(*node);
        }
        for node in &written {
            insert_using_order(doc, entry_node, *node, &ENTRY_CHILD_ORDER)?;
        }
    }
    Ok(senses
        .iter()
        .map(|sense| sense.id.clone())
        .zip(written)
        .collect())
}

fn write_traits(doc: &mut XmlDocument, sense_node: NodeId, traits: &[Trait]) -> RepoResult<()> {
    let existing: Vec<NodeId> = doc
        .child_elements_named(sense_node, TRAIT)
        .filter(|node| doc.attribute(*node, "name").is_some())
        .collect();
    for (index, item) in traits.iter().enumerate() {
        let node = match existing.get(index) {
            Some(node) => *node,
            None => {
                let node = doc.create_element(TRAIT);
                insert_using_order(doc, sense_node, node, &SENSE_CHILD_ORDER)?;
                node
            }
        };
        set_attribute(doc, node, "name", &item.name, Some(&TRAIT_ATTRIBUTE_ORDER))?;
        if !(item.value.is_empty() && doc.attribute(node, "value").is_none()) {
            set_attribute(doc, node, "value", &item.value, Some(&TRAIT_ATTRIBUTE_ORDER))?;
        }
    }
    for node in existing.into_iter().skip(traits.len()) {
        doc.detach(node);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{format_timestamp, parse_timestamp, read_entry, write_entry, ENTRY};
    use crate::model::entry::{LexEntry, Sense};
    use crate::repo::RepoError;
    use crate::xml::XmlDocument;
    use chrono::{TimeZone, Utc};

    const ONE_ENTRY: &str = "<lift version=\"0.13\">\n  <entry id=\"Sonne_1\" dateCreated=\"2008-07-01T06:29:23Z\" dateModified=\"2008-07-01T06:29:57Z\" guid=\"g-1\">\n    <lexical-unit>\n      <form lang=\"v\">\n        <text>Sonne</text>\n      </form>\n    </lexical-unit>\n    <sense id=\"s-1\">\n      <trait name=\"SemanticDomainDdp4\" value=\"1 Universe, creation\" />\n    </sense>\n  </entry>\n</lift>";

    fn first_entry(doc: &XmlDocument) -> (crate::xml::NodeId, crate::xml::NodeId) {
        let lift = doc.document_element().unwrap();
        let node = doc.child_elements_named(lift, ENTRY).next().unwrap();
        (lift, node)
    }

    #[test]
    fn timestamps_parse_rfc3339_and_date_only() {
        let expected = Utc.with_ymd_and_hms(2008, 7, 1, 6, 29, 57).unwrap();
        assert_eq!(parse_timestamp("2008-07-01T06:29:57Z"), Some(expected));
        assert_eq!(parse_timestamp("2008-07-01T08:29:57.250+02:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2008-07-01"),
            Some(Utc.with_ymd_and_hms(2008, 7, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(format_timestamp(expected), "2008-07-01T06:29:57Z");
    }

    #[test]
    fn read_entry_maps_all_fields() {
        let doc = XmlDocument::parse(ONE_ENTRY).unwrap();
        let (_, node) = first_entry(&doc);
        let (entry, nodes) = read_entry(&doc, node, 0).unwrap();

        assert_eq!(nodes.entry, node);
        assert_eq!(nodes.senses.len(), 1);
        assert_eq!(entry.id(), "Sonne_1");
        assert_eq!(entry.guid(), "g-1");
        assert_eq!(
            entry.date_modified(),
            Utc.with_ymd_and_hms(2008, 7, 1, 6, 29, 57).unwrap()
        );
        assert_eq!(entry.lexical_form().get("v"), Some("Sonne"));
        assert_eq!(
            entry.senses()[0].trait_value("SemanticDomainDdp4"),
            Some("1 Universe, creation")
        );
        assert!(!entry.is_dirty());
    }

    #[test]
    fn read_entry_applies_fallbacks() {
        let doc = XmlDocument::parse(
            "<lift><entry guid='g' dateCreated='2009-01-01'><sense><trait name='a'/></sense></entry></lift>",
        )
        .unwrap();
        let (_, node) = first_entry(&doc);
        let (entry, _) = read_entry(&doc, node, 0).unwrap();

        assert_eq!(entry.id(), "g");
        assert_eq!(entry.date_created(), entry.date_modified());
        assert!(!entry.senses()[0].id.is_empty());
        assert_eq!(entry.senses()[0].trait_value("a"), Some(""));
    }

    #[test]
    fn read_entry_reports_corruption_with_entry_id() {
        let doc = XmlDocument::parse("<lift><entry id='x' dateModified='soon'/></lift>").unwrap();
        let (_, node) = first_entry(&doc);
        match read_entry(&doc, node, 0).unwrap_err() {
            RepoError::Corrupt { entry, message } => {
                assert_eq!(entry, "x");
                assert!(message.contains("dateModified"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let doc = XmlDocument::parse("<lift><entry/></lift>").unwrap();
        let (_, node) = first_entry(&doc);
        assert!(matches!(
            read_entry(&doc, node, 3).unwrap_err(),
            RepoError::Corrupt { entry, .. } if entry == "#3"
        ));
    }

    #[test]
    fn writing_unchanged_entry_is_idempotent() {
        let mut doc = XmlDocument::parse(ONE_ENTRY).unwrap();
        let (lift, node) = first_entry(&doc);
        let (entry, nodes) = read_entry(&doc, node, 0).unwrap();

        write_entry(&mut doc, lift, &entry, Some(&nodes)).unwrap();
        assert_eq!(doc.to_xml_string(), ONE_ENTRY);
    }

    #[test]
    fn writing_changes_touches_only_affected_nodes() {
        let mut doc = XmlDocument::parse(ONE_ENTRY).unwrap();
        let (lift, node) = first_entry(&doc);
        let (mut entry, nodes) = read_entry(&doc, node, 0).unwrap();
        entry.set_lexical_form("de", "Sonne");
        entry
            .set_trait("s-1", "SemanticDomainDdp4", "1.1 Sky")
            .unwrap();

        write_entry(&mut doc, lift, &entry, Some(&nodes)).unwrap();
        let (reread, _) = read_entry(&doc, node, 0).unwrap();
        assert_eq!(reread.lexical_form(), entry.lexical_form());
        assert_eq!(reread.senses(), entry.senses());
        assert_eq!(reread.date_modified(), entry.date_modified());

        let xml = doc.to_xml_string();
        assert!(xml.contains("<form lang=\"de\"><text>Sonne</text></form>"));
        assert!(xml.contains("<trait name=\"SemanticDomainDdp4\" value=\"1.1 Sky\" />"));
    }

    #[test]
    fn new_entry_gets_canonical_attribute_and_child_order() {
        let mut doc = XmlDocument::parse("<lift></lift>").unwrap();
        let lift = doc.document_element().unwrap();
        let mut entry = LexEntry::with_id("e1");
        entry.put_sense(Sense::new("s1").with_trait("t", "v"));
        entry.set_lexical_form("en", "sun");

        let nodes = write_entry(&mut doc, lift, &entry, None).unwrap();
        let node = nodes.entry;
        assert_eq!(nodes.senses.len(), 1);
        let attribute_names: Vec<_> = doc
            .attributes(node)
            .iter()
            .map(|attribute| attribute.name.as_str())
            .collect();
        assert_eq!(attribute_names, vec!["id", "dateCreated", "dateModified", "guid"]);
        let children: Vec<_> = doc
            .child_elements(node)
            .filter_map(|child| doc.name(child))
            .collect();
        assert_eq!(children, vec!["lexical-unit", "sense"]);
    }

    #[test]
    fn removed_and_reordered_senses_follow_memory() {
        let mut doc = XmlDocument::parse(
            "<lift><entry id='e'><sense id='a'/><sense id='b'/><sense id='c'/><note/></entry></lift>",
        )
        .unwrap();
        let (lift, node) = first_entry(&doc);
        let (mut entry, nodes) = read_entry(&doc, node, 0).unwrap();
        entry.remove_sense("a");
        entry.remove_sense("c");
        entry.put_sense(Sense::new("c"));
        entry.put_sense(Sense::new("a"));

        write_entry(&mut doc, lift, &entry, Some(&nodes)).unwrap();
        let ids: Vec<_> = doc
            .child_elements_named(node, "sense")
            .filter_map(|sense| doc.attribute(sense, "id"))
            .collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        let last = doc.child_elements(node).last().unwrap();
        assert_eq!(doc.name(last), Some("note"));
    }

    #[test]
    fn detached_known_node_is_not_found() {
        let mut doc = XmlDocument::parse(ONE_ENTRY).unwrap();
        let (lift, node) = first_entry(&doc);
        let (entry, nodes) = read_entry(&doc, node, 0).unwrap();
        doc.detach(node);

        assert!(matches!(
            write_entry(&mut doc, lift, &entry, Some(&nodes)).unwrap_err(),
            RepoError::NotFound(id) if id == "Sonne_1"
        ));
    }

    #[test]
    fn sense_without_id_is_written_back_in_place() {
        let mut doc = XmlDocument::parse(
            "<lift><entry id='e' dateCreated='2010-01-01T00:00:00Z' dateModified='2010-01-01T00:00:00Z' guid='g'><sense><gloss lang='en'><text>sun</text></gloss><trait name='a' value='b' /></sense></entry></lift>",
        )
        .unwrap();
        let (lift, node) = first_entry(&doc);
        let (entry, nodes) = read_entry(&doc, node, 0).unwrap();
        let sense_id = entry.senses()[0].id.clone();

        let written = write_entry(&mut doc, lift, &entry, Some(&nodes)).unwrap();
        assert_eq!(written, nodes);
        assert_eq!(
            doc.to_xml_string(),
            format!(
                "<lift><entry id=\"e\" dateCreated=\"2010-01-01T00:00:00Z\" dateModified=\"2010-01-01T00:00:00Z\" guid=\"g\"><sense id=\"{sense_id}\"><gloss lang=\"en\"><text>sun</text></gloss><trait name=\"a\" value=\"b\" /></sense></entry></lift>"
            )
        );

        let (reread, _) = read_entry(&doc, node, 0).unwrap();
        assert_eq!(reread.senses(), entry.senses());
    }

    #[test]
    fn traits_without_name_are_left_alone() {
        let mut doc = XmlDocument::parse(
            "<lift><entry id='e' dateCreated='2010-01-01T00:00:00Z' dateModified='2010-01-01T00:00:00Z' guid='g'><sense id='s'><trait value='orphan' /><trait name='a' value='1' /><trait name='b' value='2' /></sense></entry></lift>",
        )
        .unwrap();
        let before = doc.to_xml_string();
        let (lift, node) = first_entry(&doc);
        let (mut entry, nodes) = read_entry(&doc, node, 0).unwrap();
        assert_eq!(entry.senses()[0].traits.len(), 2);

        write_entry(&mut doc, lift, &entry, Some(&nodes)).unwrap();
        assert_eq!(doc.to_xml_string(), before);

        entry.set_trait("s", "b", "3").unwrap();
        write_entry(&mut doc, lift, &entry, Some(&nodes)).unwrap();
        let xml = doc.to_xml_string();
        assert!(xml.contains("<trait value=\"orphan\" /><trait name=\"a\" value=\"1\" /><trait name=\"b\" value=\"3\" />"));
    }
}
