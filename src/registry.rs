//! In-memory patient roster
//!
//! Records keep insertion order. Every mutator bumps the revision counter and
//! notifies subscribers, so views can never miss a change.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::ecg::EcgImage;
use crate::patient::{PatientFields, PatientId, PatientRecord};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Please fill in all fields (missing: {})", .0.join(", "))]
    Validation(Vec<&'static str>),

    #[error("Patient not found: {0}")]
    NotFound(PatientId),
}

/// Change notification emitted by every registry mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RegistryChange {
    Added(PatientId),
    Updated(PatientId),
    EcgChanged(PatientId),
    NotesChanged(PatientId),
}

impl RegistryChange {
    pub fn patient_id(&self) -> PatientId {
        match self {
            Self::Added(id) | Self::Updated(id) | Self::EcgChanged(id) | Self::NotesChanged(id) => {
                *id
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct PatientRegistry {
    records: Vec<PatientRecord>,
    revision: u64,
    subscribers: Vec<mpsc::UnboundedSender<RegistryChange>>,
}

impl PatientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive a notification for every subsequent mutation
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<RegistryChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Validate and append a new patient
    pub fn add(&mut self, fields: PatientFields) -> Result<PatientId, RegistryError> {
        let fields = validated(fields)?;
        let record = PatientRecord::new(fields);
        let id = record.id;
        self.records.push(record);
        info!("Patient added: {} (roster size {})", id, self.records.len());
        self.notify(RegistryChange::Added(id));
        Ok(id)
    }

    /// Replace the six identity fields of an existing patient
    pub fn update(&mut self, id: PatientId, fields: PatientFields) -> Result<(), RegistryError> {
        let record = self.record_mut(id)?;
        record.merge(validated(fields)?);
        info!("Patient updated: {}", id);
        self.notify(RegistryChange::Updated(id));
        Ok(())
    }

    /// Attach an ECG image. The caller has already checked its type.
    pub fn set_ecg(&mut self, id: PatientId, image: EcgImage) -> Result<(), RegistryError> {
        let record = self.record_mut(id)?;
        record.ecg_image = Some(image);
        record.touch();
        info!("ECG attached to patient {}", id);
        self.notify(RegistryChange::EcgChanged(id));
        Ok(())
    }

    pub fn clear_ecg(&mut self, id: PatientId) -> Result<(), RegistryError> {
        let record = self.record_mut(id)?;
        record.ecg_image = None;
        record.touch();
        info!("ECG removed from patient {}", id);
        self.notify(RegistryChange::EcgChanged(id));
        Ok(())
    }

    pub fn set_notes(&mut self, id: PatientId, text: impl Into<String>) -> Result<(), RegistryError> {
        let record = self.record_mut(id)?;
        record.result_notes = text.into();
        record.touch();
        debug!("Result notes saved for patient {} ({} chars)", id, record.result_notes.len());
        self.notify(RegistryChange::NotesChanged(id));
        Ok(())
    }

    /// Ids of patients whose name, email, phone, address, gender or age
    /// contains `query` (case-insensitive), in roster order.
    ///
    /// A blank query applies no filter and yields every id; the dashboard
    /// shows the unfiltered list instead of calling this with one.
    pub fn search(&self, query: &str) -> Vec<PatientId> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            debug!("Empty search query, returning unfiltered roster");
            return self.ids();
        }
        self.records
            .iter()
            .filter(|record| record.matches(&needle))
            .map(|record| record.id)
            .collect()
    }

    pub fn get(&self, id: PatientId) -> Option<&PatientRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    /// Current roster position of a patient
    pub fn position_of(&self, id: PatientId) -> Option<usize> {
        self.records.iter().position(|record| record.id == id)
    }

    pub fn id_at(&self, position: usize) -> Option<PatientId> {
        self.records.get(position).map(|record| record.id)
    }

    pub fn ids(&self) -> Vec<PatientId> {
        self.records.iter().map(|record| record.id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PatientRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of mutations applied so far
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn record_mut(&mut self, id: PatientId) -> Result<&mut PatientRecord, RegistryError> {
        self.records
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or(RegistryError::NotFound(id))
    }

    fn notify(&mut self, change: RegistryChange) {
        self.revision += 1;
        self.subscribers.retain(|tx| tx.send(change.clone()).is_ok());
    }
}

fn validated(fields: PatientFields) -> Result<PatientFields, RegistryError> {
    let missing = fields.missing_fields();
    if missing.is_empty() {
        Ok(fields.trimmed())
    } else {
        Err(RegistryError::Validation(missing))
    }
}
