use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::ecg::EcgImage;

/// Stable patient identifier, assigned once at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(Uuid);

impl PatientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex digits, enough to tell patients apart on screen
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PatientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PatientId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// The six editable identity fields, as submitted by the add/edit form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientFields {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub age: String,
    pub gender: String,
    pub address: String,
}

impl PatientFields {
    /// Copy of the fields with surrounding whitespace removed
    pub fn trimmed(&self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
            age: self.age.trim().to_string(),
            gender: self.gender.trim().to_string(),
            address: self.address.trim().to_string(),
        }
    }

    /// Names of the fields that are empty after trimming, in form order
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("name", &self.name),
            ("email", &self.email),
            ("phone", &self.phone),
            ("age", &self.age),
            ("gender", &self.gender),
            ("address", &self.address),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect()
    }
}

/// One patient in the roster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: PatientId,
    pub name: String,
    pub email: String,
    pub phone: String,
    /// Kept as entered; only displayed and searched, never parsed
    pub age: String,
    pub gender: String,
    pub address: String,
    pub ecg_image: Option<EcgImage>,
    pub result_notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PatientRecord {
    /// Build a record from already validated, trimmed fields
    pub(crate) fn new(fields: PatientFields) -> Self {
        let now = Utc::now();
        Self {
            id: PatientId::new(),
            name: fields.name,
            email: fields.email,
            phone: fields.phone,
            age: fields.age,
            gender: fields.gender,
            address: fields.address,
            ecg_image: None,
            result_notes: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite the identity fields; ECG and notes are left alone
    pub(crate) fn merge(&mut self, fields: PatientFields) {
        self.name = fields.name;
        self.email = fields.email;
        self.phone = fields.phone;
        self.age = fields.age;
        self.gender = fields.gender;
        self.address = fields.address;
        self.touch();
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn fields(&self) -> PatientFields {
        PatientFields {
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            age: self.age.clone(),
            gender: self.gender.clone(),
            address: self.address.clone(),
        }
    }

    pub fn has_ecg(&self) -> bool {
        self.ecg_image.is_some()
    }

    /// Case-insensitive substring match over the searchable fields.
    /// `needle` must already be lowercase.
    pub(crate) fn matches(&self, needle: &str) -> bool {
        [
            &self.name,
            &self.email,
            &self.phone,
            &self.address,
            &self.gender,
            &self.age,
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jane() -> PatientFields {
        PatientFields {
            name: "Jane Doe".to_string(),
            email: "jane@x.com".to_string(),
            phone: "555-1111".to_string(),
            age: "34".to_string(),
            gender: "F".to_string(),
            address: "1 Main St".to_string(),
        }
    }

    #[test]
    fn test_missing_fields_reports_blank_values() {
        let mut fields = jane();
        fields.age = "   ".to_string();
        fields.email = String::new();
        assert_eq!(fields.missing_fields(), vec!["email", "age"]);
        assert!(jane().missing_fields().is_empty());
    }

    #[test]
    fn test_trimmed() {
        let mut fields = jane();
        fields.name = "  Jane Doe\t".to_string();
        assert_eq!(fields.trimmed().name, "Jane Doe");
    }

    #[test]
    fn test_new_record_defaults() {
        let record = PatientRecord::new(jane());
        assert!(record.ecg_image.is_none());
        assert!(record.result_notes.is_empty());
        assert!(!record.has_ecg());
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn test_matches_is_case_insensitive() {
        let record = PatientRecord::new(jane());
        assert!(record.matches("jane"));
        assert!(record.matches("main st"));
        assert!(record.matches("34"));
        assert!(!record.matches("99"));
    }

    #[test]
    fn test_patient_id_parse_and_short() {
        let id = PatientId::new();
        let parsed: PatientId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(id.short().len(), 8);
        assert!("not-an-id".parse::<PatientId>().is_err());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = PatientRecord::new(jane());
        let b = PatientRecord::new(jane());
        assert_ne!(a.id, b.id);
    }
}
