pub mod cli;
pub mod toml_config;

pub use toml_config::AppConfig;

#[cfg(feature = "cli")]
pub use args::{Cli, Command, InputArgs, SessionCommand};

#[cfg(feature = "cli")]
mod args {
    use super::AppConfig;
    use crate::core::enrollment::load_families;
    use crate::core::fee_schedule::{read_fee_schedule, FeeSchedule};
    use crate::core::session::Session;
    use crate::domain::model::{CcMode, DispatchMode, FeeEntry};
    use crate::utils::error::{InvoiceError, Result};
    use clap::{Args, Parser, Subcommand};
    use std::path::PathBuf;

    #[derive(Debug, Clone, Parser)]
    #[command(name = "class-invoices")]
    #[command(about = "Build class enrollment invoices and email them to families")]
    pub struct Cli {
        #[arg(long, global = true, help = "Enable verbose output")]
        pub verbose: bool,

        #[arg(long, global = true, help = "Log as JSON lines")]
        pub json_log: bool,

        #[arg(long, global = true, help = "Path to class-invoices.toml")]
        pub config: Option<PathBuf>,

        #[command(subcommand)]
        pub command: Command,
    }

    /// Where the roster and fees come from.
    #[derive(Debug, Clone, Default, Args)]
    pub struct InputArgs {
        #[arg(long, short = 'e', help = "Enrollment CSV export")]
        pub enrollment: Option<PathBuf>,

        #[arg(long, short = 'f', help = "Fee schedule CSV (class, teacher, fee)")]
        pub fees: Option<PathBuf>,

        #[arg(long, short = 's', help = "Saved .classinvoice session")]
        pub session: Option<PathBuf>,
    }

    #[derive(Debug, Clone, Subcommand)]
    pub enum Command {
        /// Show enrollment statistics and the student list
        Families {
            #[command(flatten)]
            input: InputArgs,
        },
        /// Show the fee schedule and classes still missing a teacher or fee
        Classes {
            #[command(flatten)]
            input: InputArgs,
        },
        /// Write the fee schedule as CSV, ready to fill in
        FeesTemplate {
            #[command(flatten)]
            input: InputArgs,
            #[arg(long, short = 'o')]
            output: PathBuf,
        },
        /// Write the loaded families back out as an enrollment CSV
        ExportEnrollment {
            #[command(flatten)]
            input: InputArgs,
            #[arg(long, short = 'o')]
            output: PathBuf,
        },
        /// Render one PDF invoice per family
        Invoices {
            #[command(flatten)]
            input: InputArgs,
            #[arg(long, help = "Output directory (overrides paths.output_dir)")]
            output_dir: Option<PathBuf>,
            #[arg(long, help = "Also write plain-text invoices")]
            text: bool,
            #[arg(long, help = "Bundle every PDF into invoices.zip")]
            zip: bool,
            #[arg(long, value_delimiter = ',', help = "Family ids to leave out, e.g. from an interrupted run")]
            skip_families: Vec<String>,
        },
        /// Email each family its invoice through Gmail
        Email {
            #[command(flatten)]
            input: InputArgs,
            #[arg(long, value_enum)]
            mode: Option<DispatchMode>,
            #[arg(long, value_enum)]
            cc_mode: Option<CcMode>,
            #[arg(long)]
            subject: Option<String>,
            #[arg(long, help = "File holding the message body")]
            body_file: Option<PathBuf>,
            #[arg(long, value_delimiter = ',', help = "Family ids already emailed by an interrupted run")]
            skip_families: Vec<String>,
        },
        /// Authorize access to Gmail and store the token
        Auth {
            #[arg(long, help = "Discard the stored token and authorize again")]
            force: bool,
        },
        /// Save or inspect a working session
        #[command(subcommand)]
        Session(SessionCommand),
    }

    #[derive(Debug, Clone, Subcommand)]
    pub enum SessionCommand {
        /// Save roster, fee schedule and email text to a .classinvoice file
        Save {
            #[command(flatten)]
            input: InputArgs,
            path: PathBuf,
        },
        /// Summarize a saved session
        Show { path: PathBuf },
    }

    impl InputArgs {
        /// Starts from the saved session (if any), replaces the roster with the
        /// enrollment CSV and applies the fee CSV on top.
        pub fn load(&self, config: &AppConfig) -> Result<Session> {
            let mut session = match &self.session {
                Some(path) => Session::load(path)?,
                None => {
                    let mut session = Session::default();
                    session.email = config.email_settings()?;
                    session
                }
            };

            let enrollment = match (&self.enrollment, &self.session) {
                (Some(path), _) => Some(path.clone()),
                (None, None) => config.paths.enrollment.as_ref().map(PathBuf::from),
                (None, Some(_)) => None,
            };
            if let Some(path) = enrollment {
                session.families = load_families(&path)?;
                let mut schedule = FeeSchedule::populate(&session.families);
                let previous = session
                    .fee_schedule
                    .rows
                    .iter()
                    .filter_map(|row| {
                        row.fee.map(|fee| FeeEntry {
                            class_name: row.class_name.clone(),
                            teacher: row.teacher.clone(),
                            fee,
                        })
                    })
                    .collect::<Vec<_>>();
                schedule.merge(&previous);
                session.fee_schedule = schedule;
            }

            if session.families.is_empty() {
                return Err(InvoiceError::MissingConfigError {
                    field: "enrollment (--enrollment, --session or paths.enrollment)".to_string(),
                });
            }

            let fees = self
                .fees
                .clone()
                .or_else(|| config.paths.fee_schedule.clone().map(PathBuf::from));
            if let Some(path) = fees {
                let entries = read_fee_schedule(&path)?;
                let applied = session.fee_schedule.merge(&entries);
                tracing::info!(
                    "📥 Applied {} of {} fee entries from {}",
                    applied,
                    entries.len(),
                    path.display()
                );
            }

            Ok(session)
        }
    }
}
