//! Language-tagged text alternatives.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Language tag to text, kept in insertion order so forms round-trip in
/// document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MultiText {
    forms: IndexMap<String, String>,
}

impl MultiText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, lang: &str) -> Option<&str> {
        self.forms.get(lang).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }

    pub fn contains(&self, lang: &str) -> bool {
        self.forms.contains_key(lang)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.forms
            .iter()
            .map(|(lang, text)| (lang.as_str(), text.as_str()))
    }

    /// Sets the text for `lang`; returns whether the value changed.
    pub(crate) fn set(&mut self, lang: &str, text: &str) -> bool {
        match self.forms.get_mut(lang) {
            Some(current) if current == text => false,
            Some(current) => {
                *current = text.to_string();
                true
            }
            None => {
                self.forms.insert(lang.to_string(), text.to_string());
                true
            }
        }
    }

    /// Removes `lang`, keeping the order of the remaining forms.
    pub(crate) fn remove(&mut self, lang: &str) -> bool {
        self.forms.shift_remove(lang).is_some()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for MultiText {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut text = Self::new();
        for (lang, value) in iter {
            text.set(lang, value);
        }
        text
    }
}
