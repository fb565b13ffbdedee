pub mod engine;
pub mod enrollment;
pub mod fee_schedule;
pub mod invoice;
pub mod mime;
pub mod parse;
pub mod pdf;
pub mod session;

pub use crate::domain::model::{ClassMap, Families, Family, Invoice, Person};
pub use crate::domain::ports::{Mailer, Storage};
pub use crate::utils::error::Result;
