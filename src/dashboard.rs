//! Dashboard controller
//!
//! Owns the patient registry and the session for one dashboard instance and
//! applies user actions to them. Rendered views are rebuilt whenever the
//! registry reports a change.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::auth::{AuthError, Authenticator, HttpAuthBackend};
use crate::config::Config;
use crate::ecg::{load_ecg_upload, UploadError};
use crate::patient::{PatientFields, PatientId};
use crate::registry::{PatientRegistry, RegistryChange, RegistryError};
use crate::session::{SessionError, SessionManager, SessionState};
use crate::views::{
    render_ecg_result, render_medical_records, render_patient_detail, render_patient_list,
    EcgResultPanel, MedicalRecordsView, PatientDetailView, PatientFilter, PatientListView,
};

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("Please log in first")]
    NotLoggedIn,

    #[error("Session has ended. Restart the dashboard to log in again.")]
    SessionEnded,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("No patient matches '{0}'")]
    UnknownPatient(String),

    #[error("'{0}' matches more than one patient")]
    AmbiguousPatient(String),

    #[error("No ECG result is open")]
    NoResultOpen,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Main navigation tabs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tab {
    Welcome,
    Patients,
    MedicalRecords,
}

impl std::str::FromStr for Tab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "welcome" | "home" => Ok(Self::Welcome),
            "patients" | "doctor" => Ok(Self::Patients),
            "records" | "medical" | "medical-records" => Ok(Self::MedicalRecords),
            _ => Err(format!("Unknown tab: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "screen", content = "patient", rename_all = "snake_case")]
pub enum Screen {
    Login,
    Tab(Tab),
    EcgResult(PatientId),
    SessionTerminated,
}

pub struct Dashboard {
    registry: PatientRegistry,
    changes: mpsc::UnboundedReceiver<RegistryChange>,
    session: SessionManager,
    authenticator: Authenticator,
    max_ecg_bytes: u64,

    screen: Screen,
    filter: Option<PatientFilter>,
    editing: Option<PatientId>,
    result_target: Option<PatientId>,

    patient_list: PatientListView,
    medical_records: MedicalRecordsView,
    ecg_result: Option<EcgResultPanel>,
}

impl Dashboard {
    pub fn new(authenticator: Authenticator, max_ecg_bytes: u64) -> Self {
        let mut registry = PatientRegistry::new();
        let changes = registry.subscribe();
        let patient_list = render_patient_list(&registry, None);
        let medical_records = render_medical_records(&registry);

        Self {
            registry,
            changes,
            session: SessionManager::new(),
            authenticator,
            max_ecg_bytes,
            screen: Screen::Login,
            filter: None,
            editing: None,
            result_target: None,
            patient_list,
            medical_records,
            ecg_result: None,
        }
    }

    /// Dashboard talking to the configured HTTP auth service
    pub fn from_config(config: &Config) -> Result<Self, DashboardError> {
        let base_url = config
            .validated_base_url()
            .map_err(|e| DashboardError::Config(e.to_string()))?;
        let backend = HttpAuthBackend::new(&base_url, config.request_timeout())?;
        let authenticator = Authenticator::new(Box::new(backend), config.demo_fallback);
        Ok(Self::new(authenticator, config.max_ecg_bytes))
    }

    // =====================
    // Session
    // =====================

    /// Log in and switch to the welcome tab. Returns the display name.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<String, DashboardError> {
        if self.session.state() == SessionState::Terminated {
            return Err(DashboardError::SessionEnded);
        }
        self.session.begin_login()?;
        debug!("Login request started for {}", email.trim());

        match self.authenticator.login(email, password).await {
            Ok(outcome) => {
                self.session.establish(&outcome)?;
                self.screen = Screen::Tab(Tab::Welcome);
                Ok(self.session.display_name())
            }
            Err(e) => {
                self.session.abort_login();
                warn!("Login failed: {}", e);
                Err(e.into())
            }
        }
    }

    pub fn logout(&mut self) -> Result<(), DashboardError> {
        self.session.logout()?;
        self.screen = Screen::SessionTerminated;
        self.filter = None;
        self.editing = None;
        self.result_target = None;
        self.ecg_result = None;
        Ok(())
    }

    pub fn welcome_message(&self) -> String {
        format!("Welcome, {}", self.session.display_name())
    }

    // =====================
    // Navigation
    // =====================

    pub fn show_tab(&mut self, tab: Tab) -> Result<(), DashboardError> {
        self.require_login()?;
        self.screen = Screen::Tab(tab);
        self.result_target = None;
        self.ecg_result = None;
        Ok(())
    }

    // =====================
    // Patient list
    // =====================

    /// Start editing a patient; returns the current values to prefill the form
    pub fn begin_edit(&mut self, id: PatientId) -> Result<PatientFields, DashboardError> {
        self.require_login()?;
        let record = self.registry.get(id).ok_or(RegistryError::NotFound(id))?;
        self.editing = Some(id);
        Ok(record.fields())
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
    }

    pub fn editing(&self) -> Option<PatientId> {
        self.editing
    }

    /// Submit the add/edit form: updates the patient being edited, or adds a new one.
    /// Clears any search so the change is visible.
    pub fn submit_patient_form(&mut self, fields: PatientFields) -> Result<PatientId, DashboardError> {
        self.require_login()?;
        let id = match self.editing {
            Some(id) => {
                self.registry.update(id, fields)?;
                id
            }
            None => self.registry.add(fields)?,
        };
        self.editing = None;
        self.filter = None;
        self.sync();
        Ok(id)
    }

    /// Filter the patient list. Blank input shows everyone.
    pub fn search(&mut self, raw_query: &str) -> Result<&PatientListView, DashboardError> {
        self.require_login()?;
        self.filter = PatientFilter::from_query(&self.registry, raw_query);
        debug!("Search {:?}", self.filter.as_ref().map(|f| &f.query));
        self.rerender();
        Ok(&self.patient_list)
    }

    pub fn clear_search(&mut self) -> Result<(), DashboardError> {
        self.search("").map(|_| ())
    }

    pub fn view_patient(&self, id: PatientId) -> Result<PatientDetailView, DashboardError> {
        self.require_login()?;
        render_patient_detail(&self.registry, id).ok_or_else(|| RegistryError::NotFound(id).into())
    }

    // =====================
    // Medical records
    // =====================

    /// Embed a PNG file as the patient's ECG. Rejected files leave the record as it was.
    pub async fn upload_ecg(&mut self, id: PatientId, path: &Path) -> Result<(), DashboardError> {
        self.require_login()?;
        if self.registry.get(id).is_none() {
            return Err(RegistryError::NotFound(id).into());
        }
        let image = load_ecg_upload(path, self.max_ecg_bytes).await?;
        self.registry.set_ecg(id, image)?;
        self.sync();
        Ok(())
    }

    pub fn delete_ecg(&mut self, id: PatientId) -> Result<(), DashboardError> {
        self.require_login()?;
        self.registry.clear_ecg(id)?;
        self.sync();
        Ok(())
    }

    pub fn open_result(&mut self, id: PatientId) -> Result<&EcgResultPanel, DashboardError> {
        self.require_login()?;
        let panel = render_ecg_result(&self.registry, id).ok_or(RegistryError::NotFound(id))?;
        self.result_target = Some(id);
        self.screen = Screen::EcgResult(id);
        Ok(&*self.ecg_result.insert(panel))
    }

    /// Save notes for the patient whose ECG result is open
    pub fn save_result_notes(&mut self, text: &str) -> Result<(), DashboardError> {
        self.require_login()?;
        let id = self.result_target.ok_or(DashboardError::NoResultOpen)?;
        self.registry.set_notes(id, text)?;
        self.sync();
        Ok(())
    }

    pub fn close_result(&mut self) -> Result<(), DashboardError> {
        self.show_tab(Tab::MedicalRecords)
    }

    // =====================
    // Lookup
    // =====================

    /// Resolve a patient reference typed by the user: a 1-based list
    /// position (`3` or `#3`), a full id, or a unique id prefix.
    /// Bare numbers of eight or more digits are read as id prefixes.
    pub fn resolve(&self, reference: &str) -> Result<PatientId, DashboardError> {
        let reference = reference.trim();
        let unknown = || DashboardError::UnknownPatient(reference.to_string());

        let position = match reference.strip_prefix('#') {
            Some(numeric) => Some(numeric),
            None if reference.len() < 8 => Some(reference),
            None => None,
        }
        .and_then(|numeric| numeric.parse::<usize>().ok());
        if let Some(position) = position {
            return position
                .checked_sub(1)
                .and_then(|p| self.registry.id_at(p))
                .ok_or_else(unknown);
        }

        if let Ok(id) = reference.parse::<PatientId>() {
            return self.registry.get(id).map(|r| r.id).ok_or_else(unknown);
        }

        let prefix = reference.to_lowercase().replace('-', "");
        if prefix.is_empty() {
            return Err(unknown());
        }
        let mut matches = self
            .registry
            .iter()
            .filter(|r| r.id.as_uuid().simple().to_string().starts_with(&prefix));
        match (matches.next(), matches.next()) {
            (Some(record), None) => Ok(record.id),
            (Some(_), Some(_)) => Err(DashboardError::AmbiguousPatient(reference.to_string())),
            _ => Err(unknown()),
        }
    }

    // =====================
    // Rendering
    // =====================

    /// Apply pending registry notifications; returns what changed
    pub fn sync(&mut self) -> Vec<RegistryChange> {
        let mut changes = Vec::new();
        while let Ok(change) = self.changes.try_recv() {
            changes.push(change);
        }
        if changes.is_empty() {
            return changes;
        }

        debug!("Re-rendering after {} registry change(s)", changes.len());
        self.render_lists();
        let result_changed = self
            .result_target
            .is_some_and(|id| changes.iter().any(|c| c.patient_id() == id));
        if result_changed {
            self.render_result();
        }
        changes
    }

    fn rerender(&mut self) {
        self.render_lists();
        self.render_result();
    }

    fn render_lists(&mut self) {
        self.filter = self.filter.as_ref().map(|f| f.refreshed(&self.registry));
        self.patient_list = render_patient_list(&self.registry, self.filter.as_ref());
        self.medical_records = render_medical_records(&self.registry);
    }

    fn render_result(&mut self) {
        self.ecg_result = self
            .result_target
            .and_then(|id| render_ecg_result(&self.registry, id));
    }

    fn require_login(&self) -> Result<(), DashboardError> {
        match self.session.state() {
            SessionState::LoggedIn => Ok(()),
            SessionState::LoggedOut => Err(DashboardError::NotLoggedIn),
            SessionState::Terminated => Err(DashboardError::SessionEnded),
        }
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn registry(&self) -> &PatientRegistry {
        &self.registry
    }

    pub fn patient_list(&self) -> &PatientListView {
        &self.patient_list
    }

    pub fn medical_records(&self) -> &MedicalRecordsView {
        &self.medical_records
    }

    pub fn ecg_result(&self) -> Option<&EcgResultPanel> {
        self.ecg_result.as_ref()
    }

    pub fn demo_fallback(&self) -> bool {
        self.authenticator.demo_fallback()
    }
}
