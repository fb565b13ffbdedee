pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::Cli;
pub use config::{cli::LocalStorage, AppConfig};

pub use adapters::{gmail::GmailClient, oauth::OAuthClient};
pub use core::{
    engine::{Cancellation, GenerateOptions, InvoiceEngine, RunReport},
    fee_schedule::FeeSchedule,
    session::Session,
};
pub use utils::error::{InvoiceError, Result};
