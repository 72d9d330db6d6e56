//! Clinic dashboard core: an in-memory patient roster with ECG images and
//! review notes, the views rendered from it, and doctor login.

pub mod auth;
pub mod config;
pub mod dashboard;
pub mod ecg;
pub mod patient;
pub mod registry;
pub mod session;
pub mod shell;
pub mod views;

pub use dashboard::{Dashboard, DashboardError, Screen, Tab};
pub use patient::{PatientFields, PatientId, PatientRecord};
pub use registry::{PatientRegistry, RegistryChange, RegistryError};
