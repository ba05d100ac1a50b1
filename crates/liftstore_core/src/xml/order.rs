//! Sibling ordering rules used when inserting new nodes.

use super::document::Attribute;
use std::cmp::Ordering;

/// A sibling as seen by an ordering rule.
#[derive(Debug, Clone, Copy)]
pub enum Sibling<'a> {
    Element {
        name: &'a str,
        attributes: &'a [Attribute],
    },
    Attribute(&'a Attribute),
}

impl<'a> Sibling<'a> {
    pub fn name(&self) -> &'a str {
        match *self {
            Self::Element { name, .. } => name,
            Self::Attribute(attribute) => attribute.name.as_str(),
        }
    }
}

/// Total order over siblings of one kind.
///
/// A new node is inserted right after the last sibling that does not compare
/// greater than it, so equal keys keep insertion order.
pub trait SiblingOrder {
    fn compare(&self, candidate: &Sibling<'_>, existing: &Sibling<'_>) -> Ordering;
}

impl<F> SiblingOrder for F
where
    F: Fn(&Sibling<'_>, &Sibling<'_>) -> Ordering,
{
    fn compare(&self, candidate: &Sibling<'_>, existing: &Sibling<'_>) -> Ordering {
        self(candidate, existing)
    }
}

/// Schema order given as a list of names.
///
/// Names not in the list rank after every listed name and tie with each other.
#[derive(Debug, Clone, Copy)]
pub struct NameOrder {
    names: &'static [&'static str],
}

impl NameOrder {
    pub const fn new(names: &'static [&'static str]) -> Self {
        Self { names }
    }

    fn rank(&self, name: &str) -> usize {
        self.names
            .iter()
            .position(|known| *known == name)
            .unwrap_or(self.names.len())
    }
}

impl SiblingOrder for NameOrder {
    fn compare(&self, candidate: &Sibling<'_>, existing: &Sibling<'_>) -> Ordering {
        self.rank(candidate.name()).cmp(&self.rank(existing.name()))
    }
}

/// Index at which `candidate` goes among `siblings` (given with their
/// positions). Siblings that are not offered are skipped, not compared.
pub(crate) fn insertion_index<'a>(
    siblings: impl IntoIterator<Item = (usize, Sibling<'a>)>,
    candidate: &Sibling<'_>,
    order: &dyn SiblingOrder,
) -> usize {
    let mut insert_at = 0;
    for (index, sibling) in siblings {
        if order.compare(candidate, &sibling) == Ordering::Less {
            break;
        }
        insert_at = index + 1;
    }
    insert_at
}

#[cfg(test)]
mod tests {
    use super::{insertion_index, NameOrder, Sibling};
    use crate::xml::Attribute;
    use std::cmp::Ordering;

    const ORDER: NameOrder = NameOrder::new(&["id", "dateCreated", "dateModified", "guid"]);

    fn attrs(names: &[&str]) -> Vec<Attribute> {
        names.iter().map(|name| Attribute::new(*name, "")).collect()
    }

    fn index_for(existing: &[Attribute], name: &str) -> usize {
        let candidate = Attribute::new(name, "");
        insertion_index(
            existing
                .iter()
                .enumerate()
                .map(|(index, attribute)| (index, Sibling::Attribute(attribute))),
            &Sibling::Attribute(&candidate),
            &ORDER,
        )
    }

    #[test]
    fn inserts_after_last_smaller_sibling() {
        let existing = attrs(&["id", "guid"]);
        assert_eq!(index_for(&existing, "dateModified"), 1);
        assert_eq!(index_for(&existing, "id"), 1);
    }

    #[test]
    fn unknown_names_go_last_and_keep_insertion_order() {
        let existing = attrs(&["id", "custom", "guid"]);
        assert_eq!(index_for(&existing, "other"), 3);
    }

    #[test]
    fn smallest_candidate_goes_first() {
        let existing = attrs(&["dateModified", "guid"]);
        assert_eq!(index_for(&existing, "id"), 0);
    }

    fn by_len(a: &Sibling<'_>, b: &Sibling<'_>) -> Ordering {
        a.name().len().cmp(&b.name().len())
    }

    #[test]
    fn functions_act_as_orders() {
        let existing = attrs(&["a", "ccc"]);
        let candidate = Attribute::new("bb", "");
        let index = insertion_index(
            existing
                .iter()
                .enumerate()
                .map(|(index, attribute)| (index, Sibling::Attribute(attribute))),
            &Sibling::Attribute(&candidate),
            &by_len,
        );
        assert_eq!(index, 1);
    }
}
