//! Render functions for the dashboard screens
//!
//! Every function takes the registry as it is now and produces a complete view;
//! nothing is diffed or cached here.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::patient::{PatientId, PatientRecord};
use crate::registry::PatientRegistry;

pub const NO_PATIENTS_FOUND: &str = "No patients found.";
pub const NO_MEDICAL_RECORDS: &str = "No patient medical records yet.";
pub const NO_ECG_UPLOADED: &str = "No ECG uploaded.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowAction {
    View,
    Edit,
    UploadEcg,
    DeleteEcg,
    ViewResult,
}

impl fmt::Display for RowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::View => "view",
            Self::Edit => "edit",
            Self::UploadEcg => "upload-ecg",
            Self::DeleteEcg => "delete-ecg",
            Self::ViewResult => "result",
        };
        f.write_str(label)
    }
}

/// A search over the roster, remembered so the list can be re-rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientFilter {
    pub query: String,
    pub ids: Vec<PatientId>,
}

impl PatientFilter {
    /// `None` for blank input, meaning the unfiltered list
    pub fn from_query(registry: &PatientRegistry, raw: &str) -> Option<Self> {
        let query = raw.trim();
        if query.is_empty() {
            return None;
        }
        Some(Self {
            query: query.to_string(),
            ids: registry.search(query),
        })
    }

    /// Same query, evaluated against the registry's current contents
    pub fn refreshed(&self, registry: &PatientRegistry) -> Self {
        Self {
            query: self.query.clone(),
            ids: registry.search(&self.query),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatientRow {
    pub id: PatientId,
    pub position: usize,
    pub name: String,
    pub age: String,
    pub gender: String,
}

impl PatientRow {
    pub const ACTIONS: [RowAction; 2] = [RowAction::View, RowAction::Edit];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatientListView {
    pub query: Option<String>,
    pub rows: Vec<PatientRow>,
}

impl PatientListView {
    pub fn empty_message(&self) -> Option<&'static str> {
        self.rows.is_empty().then_some(NO_PATIENTS_FOUND)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MedicalRecordRow {
    pub id: PatientId,
    pub position: usize,
    pub name: String,
    pub age: String,
    pub gender: String,
    pub phone: String,
    pub has_ecg: bool,
}

impl MedicalRecordRow {
    pub const ACTIONS: [RowAction; 3] = [
        RowAction::UploadEcg,
        RowAction::DeleteEcg,
        RowAction::ViewResult,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MedicalRecordsView {
    pub rows: Vec<MedicalRecordRow>,
}

impl MedicalRecordsView {
    pub fn empty_message(&self) -> Option<&'static str> {
        self.rows.is_empty().then_some(NO_MEDICAL_RECORDS)
    }
}

/// The "view patient" details
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatientDetailView {
    pub id: PatientId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub age: String,
    pub gender: String,
    pub address: String,
    pub created_at: String,
    pub updated_at: String,
}

/// ECG review screen for one patient
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EcgResultPanel {
    pub id: PatientId,
    pub name: String,
    pub phone: String,
    pub age: String,
    /// Embedded image as a data URL
    pub ecg_data_url: Option<String>,
    pub ecg_bytes: usize,
    pub notes: String,
}

fn patient_row(position: usize, record: &PatientRecord) -> PatientRow {
    PatientRow {
        id: record.id,
        position,
        name: record.name.clone(),
        age: record.age.clone(),
        gender: record.gender.clone(),
    }
}

/// Patient list, optionally restricted to a filter's matches (roster order kept)
pub fn render_patient_list(registry: &PatientRegistry, filter: Option<&PatientFilter>) -> PatientListView {
    let rows = registry
        .iter()
        .enumerate()
        .filter(|(_, record)| filter.map_or(true, |f| f.ids.contains(&record.id)))
        .map(|(position, record)| patient_row(position, record))
        .collect();

    PatientListView {
        query: filter.map(|f| f.query.clone()),
        rows,
    }
}

pub fn render_medical_records(registry: &PatientRegistry) -> MedicalRecordsView {
    let rows = registry
        .iter()
        .enumerate()
        .map(|(position, record)| MedicalRecordRow {
            id: record.id,
            position,
            name: record.name.clone(),
            age: record.age.clone(),
            gender: record.gender.clone(),
            phone: record.phone.clone(),
            has_ecg: record.has_ecg(),
        })
        .collect();

    MedicalRecordsView { rows }
}

pub fn render_patient_detail(registry: &PatientRegistry, id: PatientId) -> Option<PatientDetailView> {
    let record = registry.get(id)?;
    Some(PatientDetailView {
        id: record.id,
        name: record.name.clone(),
        email: record.email.clone(),
        phone: record.phone.clone(),
        age: record.age.clone(),
        gender: record.gender.clone(),
        address: record.address.clone(),
        created_at: record.created_at.format("%Y-%m-%d %H:%M").to_string(),
        updated_at: record.updated_at.format("%Y-%m-%d %H:%M").to_string(),
    })
}

pub fn render_ecg_result(registry: &PatientRegistry, id: PatientId) -> Option<EcgResultPanel> {
    let record = registry.get(id)?;
    Some(EcgResultPanel {
        id: record.id,
        name: record.name.clone(),
        phone: record.phone.clone(),
        age: record.age.clone(),
        ecg_data_url: record.ecg_image.as_ref().map(|image| image.to_data_url()),
        ecg_bytes: record.ecg_image.as_ref().map_or(0, |image| image.decoded_len()),
        notes: record.result_notes.clone(),
    })
}

fn actions_line(actions: &[RowAction]) -> String {
    actions
        .iter()
        .map(|a| format!("[{}]", a))
        .collect::<Vec<_>>()
        .join(" ")
}

impl fmt::Display for PatientListView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref query) = self.query {
            writeln!(f, "Search: \"{}\" ({} match(es))", query, self.rows.len())?;
        }
        if let Some(message) = self.empty_message() {
            return writeln!(f, "{}", message);
        }
        for row in &self.rows {
            writeln!(
                f,
                "#{} {}  {}, Age: {}, Gender: {}  {}",
                row.position + 1,
                row.id.short(),
                row.name,
                row.age,
                row.gender,
                actions_line(&PatientRow::ACTIONS)
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for MedicalRecordsView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(message) = self.empty_message() {
            return writeln!(f, "{}", message);
        }
        for row in &self.rows {
            let ecg = if row.has_ecg { "ECG on file" } else { NO_ECG_UPLOADED };
            writeln!(
                f,
                "#{} {}  {}, Age: {}, Gender: {}, Phone: {}  ({})  {}",
                row.position + 1,
                row.id.short(),
                row.name,
                row.age,
                row.gender,
                row.phone,
                ecg,
                actions_line(&MedicalRecordRow::ACTIONS)
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for PatientDetailView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Name:    {}", self.name)?;
        writeln!(f, "Email:   {}", self.email)?;
        writeln!(f, "Phone:   {}", self.phone)?;
        writeln!(f, "Age:     {}", self.age)?;
        writeln!(f, "Gender:  {}", self.gender)?;
        writeln!(f, "Address: {}", self.address)?;
        writeln!(f, "Added:   {}  Updated: {}", self.created_at, self.updated_at)
    }
}

impl fmt::Display for EcgResultPanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ECG result for {}", self.name)?;
        writeln!(f, "Phone: {}  Age: {}", self.phone, self.age)?;
        match self.ecg_data_url {
            Some(ref url) => {
                // The full payload is unreadable on a terminal
                let preview: String = url.chars().take(48).collect();
                writeln!(f, "ECG: {} bytes ({}...)", self.ecg_bytes, preview)?;
            }
            None => writeln!(f, "ECG: {}", NO_ECG_UPLOADED)?,
        }
        if self.notes.is_empty() {
            writeln!(f, "Notes: (none)")
        } else {
            writeln!(f, "Notes:\n{}", self.notes)
        }
    }
}
