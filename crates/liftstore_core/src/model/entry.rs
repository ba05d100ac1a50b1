//! Lexical entry record.
//!
//! # Responsibility
//! - Hold identity, timestamps, lexical forms and senses of one entry.
//! - Track unsaved changes through explicit setters.
//!
//! # Invariants
//! - `id` and `guid` never change after construction.
//! - Timestamps have whole-second precision, matching the persisted format.
//! - A freshly constructed or freshly loaded entry is clean.

use super::multitext::MultiText;
use super::ModelError;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form `name=value` annotation on a sense. Names may repeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trait {
    pub name: String,
    pub value: String,
}

impl Trait {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One sense of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sense {
    pub id: String,
    pub traits: Vec<Trait>,
}

impl Sense {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            traits: Vec::new(),
        }
    }

    /// Creates a sense with a generated id.
    pub fn with_generated_id() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn with_trait(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.traits.push(Trait::new(name, value));
        self
    }

    /// First value of the trait called `name`.
    pub fn trait_value(&self, name: &str) -> Option<&str> {
        self.traits
            .iter()
            .find(|item| item.name == name)
            .map(|item| item.value.as_str())
    }
}

/// One persisted dictionary entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexEntry {
    id: String,
    guid: String,
    date_created: DateTime<Utc>,
    date_modified: DateTime<Utc>,
    lexical_form: MultiText,
    senses: Vec<Sense>,
    #[serde(skip)]
    is_dirty: bool,
}

impl Default for LexEntry {
    fn default() -> Self {
        Self::new()
    }
}

impl LexEntry {
    /// Creates a clean entry whose id is a fresh guid.
    pub fn new() -> Self {
        let guid = Uuid::new_v4().to_string();
        Self::with_ids(guid.clone(), guid)
    }

    /// Creates a clean entry with a caller-chosen id and a fresh guid.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self::with_ids(id.into(), Uuid::new_v4().to_string())
    }

    fn with_ids(id: String, guid: String) -> Self {
        let now = now_seconds();
        Self {
            id,
            guid,
            date_created: now,
            date_modified: now,
            lexical_form: MultiText::new(),
            senses: Vec::new(),
            is_dirty: false,
        }
    }

    /// Rebuilds an entry from persisted fields. The result is clean.
    pub(crate) fn restore(
        id: String,
        guid: String,
        date_created: DateTime<Utc>,
        date_modified: DateTime<Utc>,
        lexical_form: MultiText,
        senses: Vec<Sense>,
    ) -> Self {
        Self {
            id,
            guid,
            date_created,
            date_modified: date_modified.max(date_created),
            lexical_form,
            senses,
            is_dirty: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn guid(&self) -> &str {
        &self.guid
    }

    pub fn date_created(&self) -> DateTime<Utc> {
        self.date_created
    }

    pub fn date_modified(&self) -> DateTime<Utc> {
        self.date_modified
    }

    pub fn lexical_form(&self) -> &MultiText {
        &self.lexical_form
    }

    pub fn senses(&self) -> &[Sense] {
        &self.senses
    }

    pub fn sense(&self, id: &str) -> Option<&Sense> {
        self.senses.iter().find(|sense| sense.id == id)
    }

    /// Whether the entry has changes not yet saved.
    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    /// Sets the lexical form for `lang`.
    pub fn set_lexical_form(&mut self, lang: &str, text: &str) -> bool {
        let changed = self.lexical_form.set(lang, text);
        self.record_change(changed)
    }

    pub fn remove_lexical_form(&mut self, lang: &str) -> bool {
        let changed = self.lexical_form.remove(lang);
        self.record_change(changed)
    }

    /// Adds `sense`, or replaces the sense with the same id in place.
    pub fn put_sense(&mut self, sense: Sense) -> bool {
        let changed = match self.senses.iter_mut().find(|current| current.id == sense.id) {
            Some(current) if *current == sense => false,
            Some(current) => {
                *current = sense;
                true
            }
            None => {
                self.senses.push(sense);
                true
            }
        };
        self.record_change(changed)
    }

    pub fn remove_sense(&mut self, id: &str) -> bool {
        let before = self.senses.len();
        self.senses.retain(|sense| sense.id != id);
        let changed = self.senses.len() != before;
        self.record_change(changed)
    }

    /// Sets the first trait called `name` on a sense, adding it if missing.
    pub fn set_trait(&mut self, sense_id: &str, name: &str, value: &str) -> Result<bool, ModelError> {
        let sense = self.sense_mut(sense_id)?;
        let changed = match sense.traits.iter_mut().find(|item| item.name == name) {
            Some(item) if item.value == value => false,
            Some(item) => {
                item.value = value.to_string();
                true
            }
            None => {
                sense.traits.push(Trait::new(name, value));
                true
            }
        };
        Ok(self.record_change(changed))
    }

    /// Appends a trait even when one with the same name exists.
    pub fn add_trait(&mut self, sense_id: &str, name: &str, value: &str) -> Result<bool, ModelError> {
        self.sense_mut(sense_id)?.traits.push(Trait::new(name, value));
        Ok(self.record_change(true))
    }

    /// Removes every trait called `name` from a sense.
    pub fn remove_traits(&mut self, sense_id: &str, name: &str) -> Result<bool, ModelError> {
        let sense = self.sense_mut(sense_id)?;
        let before = sense.traits.len();
        sense.traits.retain(|item| item.name != name);
        let changed = sense.traits.len() != before;
        Ok(self.record_change(changed))
    }

    pub(crate) fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    /// Takes over the persisted creation time of `stored` and never lets
    /// `date_modified` fall behind it.
    pub(crate) fn align_with_stored(&mut self, stored: &LexEntry) {
        self.date_created = stored.date_created;
        self.date_modified = self
            .date_modified
            .max(stored.date_modified)
            .max(self.date_created);
    }

    fn sense_mut(&mut self, sense_id: &str) -> Result<&mut Sense, ModelError> {
        self.senses
            .iter_mut()
            .find(|sense| sense.id == sense_id)
            .ok_or_else(|| ModelError::SenseNotFound(sense_id.to_string()))
    }

    fn record_change(&mut self, changed: bool) -> bool {
        if changed {
            self.is_dirty = true;
            let now = now_seconds();
            if now > self.date_modified {
                self.date_modified = now;
            }
        }
        changed
    }
}

/// Current time truncated to the precision the format stores.
pub(crate) fn now_seconds() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}
