//! Interactive terminal front end for the dashboard
//!
//! Each input line is split shell-style (quotes group words) and parsed with
//! clap into a [`ShellCommand`], which is applied to the owned [`Dashboard`].

use clap::{Parser, Subcommand};
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::debug;

use crate::dashboard::{Dashboard, DashboardError, Screen, Tab};
use crate::patient::PatientFields;
use crate::session::SessionState;

#[derive(Parser, Debug)]
#[command(name = "ecg-clinic", no_binary_name = true, disable_version_flag = true)]
struct ShellLine {
    #[command(subcommand)]
    command: ShellCommand,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ShellCommand {
    /// Log in as a doctor
    Login { email: String, password: String },

    /// End the session (final)
    Logout,

    /// Switch tab: welcome, patients or records
    Tab { tab: Tab },

    /// Add a patient; every field is required
    Add {
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, default_value = "")]
        phone: String,
        #[arg(long, default_value = "")]
        age: String,
        #[arg(long, default_value = "")]
        gender: String,
        #[arg(long, default_value = "")]
        address: String,
    },

    /// Edit a patient; omitted fields keep their current value
    Edit {
        patient: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        age: Option<String>,
        #[arg(long)]
        gender: Option<String>,
        #[arg(long)]
        address: Option<String>,
    },

    /// Show a patient's details
    View { patient: String },

    /// Filter the patient list
    Search {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        query: Vec<String>,
    },

    /// Show the whole patient list again
    ClearSearch,

    /// Show the patient list
    List,

    /// Show the medical records
    Records,

    /// Attach a PNG ECG image to a patient
    UploadEcg { patient: String, path: PathBuf },

    /// Remove a patient's ECG image
    DeleteEcg { patient: String },

    /// Open the ECG result for a patient
    Result { patient: String },

    /// Save notes on the open ECG result
    Notes {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },

    /// Leave the ECG result and go back to the records
    Back,

    /// Exit the dashboard
    #[command(alias = "exit")]
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Result of one input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    pub flow: Flow,
    pub text: String,
    /// The line moved the session to a new state (logged in or out)
    pub session_changed: bool,
}

impl ShellOutput {
    fn show(text: impl Into<String>) -> Self {
        Self {
            flow: Flow::Continue,
            text: text.into(),
            session_changed: false,
        }
    }
}

/// Receives progress notices shown while a command is still running
pub type ProgressSink = Box<dyn Fn(&str) + Send + Sync>;

/// Notice shown while the login request is in flight
pub const LOGIN_PROGRESS: &str = "Logging in...";

/// Split a line into words; single or double quotes group words,
/// a backslash escapes the next character outside single quotes.
pub fn tokenize(line: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('\''), c) => current.push(c),
            (_, '\\') => match chars.next() {
                Some(escaped) => {
                    current.push(escaped);
                    in_word = true;
                }
                None => return Err("Trailing backslash".to_string()),
            },
            (Some(_), c) => current.push(c),
            (None, '"') | (None, '\'') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        return Err("Unterminated quote".to_string());
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// Parse one input line. `Ok(None)` for a blank line; `Err` carries clap's
/// rendered message (including help output).
pub fn parse_line(line: &str) -> Result<Option<ShellCommand>, String> {
    let words = tokenize(line)?;
    if words.is_empty() {
        return Ok(None);
    }
    ShellLine::try_parse_from(words)
        .map(|parsed| Some(parsed.command))
        .map_err(|e| e.render().to_string())
}

pub struct Shell {
    dashboard: Dashboard,
    progress: ProgressSink,
}

impl Shell {
    pub fn new(dashboard: Dashboard) -> Self {
        Self {
            dashboard,
            progress: Box::new(|_| {}),
        }
    }

    /// Route progress notices (such as the login busy indicator) to `sink`
    pub fn with_progress(mut self, sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.progress = Box::new(sink);
        self
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    pub fn prompt(&self) -> String {
        match self.dashboard.screen() {
            Screen::Login => "login> ".to_string(),
            Screen::Tab(Tab::Welcome) => "welcome> ".to_string(),
            Screen::Tab(Tab::Patients) => "patients> ".to_string(),
            Screen::Tab(Tab::MedicalRecords) => "records> ".to_string(),
            Screen::EcgResult(id) => format!("result {}> ", id.short()),
            Screen::SessionTerminated => "ended> ".to_string(),
        }
    }

    pub fn banner(&self) -> String {
        let mut text = String::from("ECG clinic dashboard. Type 'help' for commands.\n");
        if self.dashboard.demo_fallback() {
            text.push_str("Demo login fallback is enabled.\n");
        }
        text
    }

    /// Run one input line against the dashboard
    pub async fn execute(&mut self, line: &str) -> ShellOutput {
        let command = match parse_line(line) {
            Ok(Some(command)) => command,
            Ok(None) => return ShellOutput::show(""),
            Err(message) => return ShellOutput::show(message),
        };
        debug!("Shell command: {:?}", command_name(&command));

        if command == ShellCommand::Quit {
            return ShellOutput {
                flow: Flow::Quit,
                text: "Goodbye.".to_string(),
                session_changed: false,
            };
        }

        let state_before = self.dashboard.session().state();
        let mut output = match self.apply(command).await {
            Ok(text) => ShellOutput::show(text),
            Err(e) => ShellOutput::show(format!("Error: {}", e)),
        };
        output.session_changed = self.dashboard.session().state() != state_before;
        output
    }

    async fn apply(&mut self, command: ShellCommand) -> Result<String, DashboardError> {
        let dash = &mut self.dashboard;
        match command {
            ShellCommand::Login { email, password } => {
                (self.progress)(LOGIN_PROGRESS);
                let name = dash.login(&email, &password).await?;
                Ok(format!("Login successful! Welcome, {}", name))
            }
            ShellCommand::Logout => {
                dash.logout()?;
                Ok("Session terminated. You have been logged out.".to_string())
            }
            ShellCommand::Tab { tab } => {
                dash.show_tab(tab)?;
                Ok(match tab {
                    Tab::Welcome => dash.welcome_message(),
                    Tab::Patients => dash.patient_list().to_string(),
                    Tab::MedicalRecords => dash.medical_records().to_string(),
                })
            }
            ShellCommand::Add {
                name,
                email,
                phone,
                age,
                gender,
                address,
            } => {
                dash.cancel_edit();
                let id = dash.submit_patient_form(PatientFields {
                    name,
                    email,
                    phone,
                    age,
                    gender,
                    address,
                })?;
                Ok(format!("Patient saved ({}).\n{}", id.short(), dash.patient_list()))
            }
            ShellCommand::Edit {
                patient,
                name,
                email,
                phone,
                age,
                gender,
                address,
            } => {
                let id = dash.resolve(&patient)?;
                let mut fields = dash.begin_edit(id)?;
                let overrides = [
                    (&mut fields.name, name),
                    (&mut fields.email, email),
                    (&mut fields.phone, phone),
                    (&mut fields.age, age),
                    (&mut fields.gender, gender),
                    (&mut fields.address, address),
                ];
                for (field, value) in overrides {
                    if let Some(value) = value {
                        *field = value;
                    }
                }
                let result = dash.submit_patient_form(fields);
                if result.is_err() {
                    dash.cancel_edit();
                }
                result?;
                Ok(format!("Changes saved.\n{}", dash.patient_list()))
            }
            ShellCommand::View { patient } => {
                let id = dash.resolve(&patient)?;
                Ok(dash.view_patient(id)?.to_string())
            }
            ShellCommand::Search { query } => {
                let view = dash.search(&query.join(" "))?;
                Ok(view.to_string())
            }
            ShellCommand::ClearSearch => {
                dash.clear_search()?;
                dash.show_tab(Tab::Patients)?;
                Ok(dash.patient_list().to_string())
            }
            ShellCommand::List => {
                dash.show_tab(Tab::Patients)?;
                Ok(dash.patient_list().to_string())
            }
            ShellCommand::Records => {
                dash.show_tab(Tab::MedicalRecords)?;
                Ok(dash.medical_records().to_string())
            }
            ShellCommand::UploadEcg { patient, path } => {
                let id = dash.resolve(&patient)?;
                dash.upload_ecg(id, &path).await?;
                Ok(format!("ECG uploaded.\n{}", dash.medical_records()))
            }
            ShellCommand::DeleteEcg { patient } => {
                let id = dash.resolve(&patient)?;
                dash.delete_ecg(id)?;
                Ok(format!("ECG deleted.\n{}", dash.medical_records()))
            }
            ShellCommand::Result { patient } => {
                let id = dash.resolve(&patient)?;
                Ok(dash.open_result(id)?.to_string())
            }
            ShellCommand::Notes { text } => {
                dash.save_result_notes(&text.join(" "))?;
                Ok("Saved!".to_string())
            }
            ShellCommand::Back => {
                dash.close_result()?;
                Ok(dash.medical_records().to_string())
            }
            ShellCommand::Quit => Ok(String::new()),
        }
    }

    /// One-line status for the header: who is logged in and where
    pub fn status_line(&self) -> String {
        let session = self.dashboard.session();
        let mut line = String::new();
        match session.state() {
            SessionState::LoggedOut => line.push_str("Not logged in"),
            SessionState::LoggedIn => {
                let _ = write!(line, "{} | {} patient(s)", session.display_name(), self.dashboard.registry().len());
            }
            SessionState::Terminated => line.push_str("Session terminated"),
        }
        line
    }
}

fn command_name(command: &ShellCommand) -> &'static str {
    match command {
        ShellCommand::Login { .. } => "login",
        ShellCommand::Logout => "logout",
        ShellCommand::Tab { .. } => "tab",
        ShellCommand::Add { .. } => "add",
        ShellCommand::Edit { .. } => "edit",
        ShellCommand::View { .. } => "view",
        ShellCommand::Search { .. } => "search",
        ShellCommand::ClearSearch => "clear-search",
        ShellCommand::List => "list",
        ShellCommand::Records => "records",
        ShellCommand::UploadEcg { .. } => "upload-ecg",
        ShellCommand::DeleteEcg { .. } => "delete-ecg",
        ShellCommand::Result { .. } => "result",
        ShellCommand::Notes { .. } => "notes",
        ShellCommand::Back => "back",
        ShellCommand::Quit => "quit",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize(r#"add --name "Jane Doe" --address '1 Main St'"#).unwrap(),
            vec!["add", "--name", "Jane Doe", "--address", "1 Main St"]
        );
        assert_eq!(tokenize("  list  ").unwrap(), vec!["list"]);
        assert_eq!(tokenize(r#"notes say \"hi\""#).unwrap(), vec!["notes", "say", "\"hi\""]);
        assert_eq!(tokenize(r#"search """#).unwrap(), vec!["search", ""]);
        assert!(tokenize("").unwrap().is_empty());
        assert!(tokenize(r#"add --name "Jane"#).is_err());
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_line("login doctor1@example.com pass123").unwrap(),
            Some(ShellCommand::Login {
                email: "doctor1@example.com".to_string(),
                password: "pass123".to_string(),
            })
        );
        assert_eq!(parse_line("   ").unwrap(), None);
        assert_eq!(parse_line("exit").unwrap(), Some(ShellCommand::Quit));
        assert_eq!(
            parse_line("tab records").unwrap(),
            Some(ShellCommand::Tab {
                tab: Tab::MedicalRecords
            })
        );
        assert!(parse_line("tab settings").is_err());
        assert_eq!(
            parse_line("search main st").unwrap(),
            Some(ShellCommand::Search {
                query: vec!["main".to_string(), "st".to_string()],
            })
        );
        assert_eq!(
            parse_line("upload-ecg 1 /tmp/ecg.png").unwrap(),
            Some(ShellCommand::UploadEcg {
                patient: "1".to_string(),
                path: PathBuf::from("/tmp/ecg.png"),
            })
        );
    }

    #[test]
    fn test_add_defaults_missing_fields_to_empty() {
        match parse_line("add --name Jane").unwrap() {
            Some(ShellCommand::Add { name, age, .. }) => {
                assert_eq!(name, "Jane");
                assert_eq!(age, "");
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_command() {
        assert!(parse_line("frobnicate").is_err());
        assert!(parse_line("login only-email").is_err());
    }
}
