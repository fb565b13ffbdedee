use crate::core::fee_schedule::validate_fee_schedule;
use crate::core::invoice::{build_invoice, render_text};
use crate::core::mime::{build_message, encode_raw, ATTACHMENT_NAME};
use crate::core::pdf::render_pdf;
use crate::domain::model::{
    CcMode, ClassMap, DispatchMode, EmailSettings, Families, Family, OutgoingEmail,
};
use crate::domain::ports::{Mailer, Storage};
use crate::utils::error::{InvoiceError, Result};
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashSet};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use zip::write::{FileOptions, ZipWriter};

pub const BUNDLE_NAME: &str = "invoices.zip";

/// Shared stop flag, checked before each family.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GenerateOptions {
    pub write_text: bool,
    pub zip_bundle: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunReport {
    /// Family ids handled, in order.
    pub processed: Vec<String>,
    /// (family id, reason)
    pub skipped: Vec<(String, String)>,
    /// Storage paths or Gmail ids produced.
    pub outputs: Vec<String>,
}

/// `Smith-Jones` -> `Smith-Jones`, `O'Neil` -> `O_Neil`.
fn file_stem(family: &Family) -> String {
    let clean: String = family
        .last_name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let id: String = family
        .id
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    if clean.is_empty() {
        format!("family_{}", id)
    } else {
        format!("{}_{}", clean, id)
    }
}

/// Appends `-2`, `-3`, ... when two families clean up to the same file name.
fn unique_stem(stem: String, used: &mut HashSet<String>) -> String {
    if used.insert(stem.clone()) {
        return stem;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", stem, n);
        if used.insert(candidate.clone()) {
            tracing::warn!("⚠️ File name {} already used, writing {}", stem, candidate);
            return candidate;
        }
        n += 1;
    }
}

pub struct InvoiceEngine {
    families: Families,
    class_map: ClassMap,
    options: GenerateOptions,
    generated_on: NaiveDate,
    skip: BTreeSet<String>,
}

impl InvoiceEngine {
    pub fn new(families: Families, class_map: ClassMap) -> Self {
        Self {
            families,
            class_map,
            options: GenerateOptions::default(),
            generated_on: chrono::Local::now().date_naive(),
            skip: BTreeSet::new(),
        }
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_generated_on(mut self, date: NaiveDate) -> Self {
        self.generated_on = date;
        self
    }

    /// Family ids handled by an earlier, interrupted run.
    pub fn with_skip_families<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn families(&self) -> &Families {
        &self.families
    }

    /// Families that owe anything; families made only of parents get no invoice.
    fn billable(&self) -> Vec<&Family> {
        self.families
            .values()
            .filter(|f| !f.students.is_empty() && !self.skip.contains(&f.id))
            .collect()
    }

    fn start_report(&self) -> RunReport {
        let mut report = RunReport::default();
        for id in &self.skip {
            if self.families.contains_key(id) {
                report
                    .skipped
                    .push((id.clone(), "already handled".to_string()));
            } else {
                tracing::warn!("⚠️ Family {} given to skip is not in the roster", id);
            }
        }
        report
    }

    /// Ids a rerun should skip: the ones skipped this time plus the ones just handled.
    fn handled(&self, report: &RunReport) -> Vec<String> {
        self.skip
            .iter()
            .filter(|id| self.families.contains_key(*id))
            .chain(report.processed.iter())
            .cloned()
            .collect()
    }

    fn check_cancelled(
        &self,
        cancel: &Cancellation,
        report: &RunReport,
        completed: usize,
        total: usize,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            tracing::warn!("⏹️ Cancelled after {} of {} families", completed, total);
            return Err(InvoiceError::Cancelled {
                completed,
                total,
                processed: self.handled(report),
            });
        }
        Ok(())
    }

    pub async fn generate_invoices<S: Storage>(
        &self,
        storage: &S,
        cancel: &Cancellation,
    ) -> Result<RunReport> {
        validate_fee_schedule(&self.class_map, &self.families)?;

        let billable = self.billable();
        let total = billable.len();
        let mut report = self.start_report();
        let mut bundle: Vec<(String, Vec<u8>)> = Vec::new();
        let mut used_stems = HashSet::new();

        tracing::info!("🧾 Generating invoices for {} families", total);
        for (n, family) in billable.into_iter().enumerate() {
            self.check_cancelled(cancel, &report, n, total)?;
            tracing::info!(
                "[{}/{}] Generating invoice for family: {}",
                n + 1,
                total,
                family.last_name
            );

            let invoice = build_invoice(family, &self.class_map)?;
            let stem = unique_stem(file_stem(family), &mut used_stems);

            let pdf = render_pdf(&invoice, self.generated_on)?;
            let pdf_name = format!("{}.pdf", stem);
            storage.write_file(&pdf_name, &pdf).await?;
            report.outputs.push(pdf_name.clone());

            if self.options.write_text {
                let text_name = format!("{}.txt", stem);
                let mut text = render_text(&invoice).join("\n");
                text.push('\n');
                storage.write_file(&text_name, text.as_bytes()).await?;
                report.outputs.push(text_name);
            }

            if self.options.zip_bundle {
                bundle.push((pdf_name, pdf));
            }
            report.processed.push(family.id.clone());
        }

        for family in self
            .families
            .values()
            .filter(|f| f.students.is_empty() && !self.skip.contains(&f.id))
        {
            report
                .skipped
                .push((family.id.clone(), "no students".to_string()));
        }

        if self.options.zip_bundle && !bundle.is_empty() {
            let zip_data = {
                let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
                for (name, data) in &bundle {
                    zip.start_file::<_, ()>(name.as_str(), FileOptions::default())?;
                    zip.write_all(data)?;
                }
                let cursor = zip.finish()?;
                cursor.into_inner()
            };
            tracing::debug!("Writing ZIP bundle ({} bytes)", zip_data.len());
            storage.write_file(BUNDLE_NAME, &zip_data).await?;
            report.outputs.push(BUNDLE_NAME.to_string());
        }

        Ok(report)
    }

    pub async fn email_invoices<M: Mailer + ?Sized>(
        &self,
        mailer: &M,
        settings: &EmailSettings,
        mode: DispatchMode,
        cancel: &Cancellation,
    ) -> Result<RunReport> {
        if settings.subject.trim().is_empty() {
            return Err(InvoiceError::email("Email subject may not be empty."));
        }
        if settings.body.trim().is_empty() {
            return Err(InvoiceError::email(
                "Enter a message body before sending email.",
            ));
        }
        validate_fee_schedule(&self.class_map, &self.families)?;

        let sender = mailer.sender_address().await?;
        tracing::info!("📧 Sending as {}", sender);

        let billable = self.billable();
        let total = billable.len();
        let mut report = self.start_report();

        for (n, family) in billable.into_iter().enumerate() {
            self.check_cancelled(cancel, &report, n, total)?;
            tracing::info!(
                "[{}/{}] Emailing invoice for family: {}",
                n + 1,
                total,
                family.last_name
            );

            let recipients = family.parent_emails();
            if recipients.is_empty() {
                tracing::warn!("⚠️ Family {} ({}) has no parent email", family.id, family.last_name);
                report
                    .skipped
                    .push((family.id.clone(), "no parent email".to_string()));
                continue;
            }

            let id = self
                .email_family(mailer, family, recipients, &sender, settings, mode)
                .await
                .map_err(|e| InvoiceError::interrupted(self.handled(&report), e))?;
            tracing::debug!("Gmail returned id {} for family {}", id, family.id);
            report.outputs.push(id);
            report.processed.push(family.id.clone());
        }

        tracing::info!(
            "✅ {} {} invoice emails, skipped {}",
            match mode {
                DispatchMode::Draft => "Drafted",
                DispatchMode::Send => "Sent",
            },
            report.processed.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    async fn email_family<M: Mailer + ?Sized>(
        &self,
        mailer: &M,
        family: &Family,
        recipients: Vec<String>,
        sender: &str,
        settings: &EmailSettings,
        mode: DispatchMode,
    ) -> Result<String> {
        let invoice = build_invoice(family, &self.class_map)?;
        let pdf = render_pdf(&invoice, self.generated_on)?;
        let (cc, bcc) = match settings.cc_mode {
            CcMode::None => (vec![], vec![]),
            CcMode::Cc => (vec![sender.to_string()], vec![]),
            CcMode::Bcc => (vec![], vec![sender.to_string()]),
        };
        let email = OutgoingEmail {
            sender: sender.to_string(),
            recipients,
            cc,
            bcc,
            subject: settings.subject.clone(),
            body: settings.body.clone(),
            attachment_name: ATTACHMENT_NAME.to_string(),
            attachment: pdf,
        };
        let raw = encode_raw(&build_message(&email)?);

        match mode {
            DispatchMode::Draft => mailer.create_draft(&raw).await,
            DispatchMode::Send => mailer.send(&raw).await,
        }
    }
}
