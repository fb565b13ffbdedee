use clap::Parser;
use class_invoices::config::{Command, SessionCommand};
use class_invoices::core::enrollment::{export_families, stats, student_rows};
use class_invoices::core::fee_schedule::missing_classes;
use class_invoices::domain::model::DispatchMode;
use class_invoices::utils::error::ErrorSeverity;
use class_invoices::utils::{logger, validation::Validate};
use class_invoices::{
    AppConfig, Cancellation, Cli, GenerateOptions, GmailClient, InvoiceEngine, LocalStorage,
    OAuthClient, Result, RunReport, Session,
};
use std::path::PathBuf;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // 初始化日誌
    if cli.json_log {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }
    tracing::debug!("CLI arguments: {:?}", cli);

    if let Err(e) = run(cli).await {
        tracing::error!(
            "❌ {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());
        if !e.processed_families().is_empty() {
            eprintln!("   --skip-families {}", e.processed_families().join(","));
        }

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    config.validate()?;

    match cli.command {
        Command::Families { input } => show_families(&input.load(&config)?),
        Command::Classes { input } => show_classes(&input.load(&config)?),
        Command::FeesTemplate { input, output } => {
            input.load(&config)?.fee_schedule.export(&output)?;
            println!("📁 Fee schedule written to {}", output.display());
            Ok(())
        }
        Command::ExportEnrollment { input, output } => {
            export_families(&output, &input.load(&config)?.families)?;
            println!("📁 Enrollment written to {}", output.display());
            Ok(())
        }
        Command::Invoices {
            input,
            output_dir,
            text,
            zip,
            skip_families,
        } => {
            let session = input.load(&config)?;
            let output_dir =
                output_dir.unwrap_or_else(|| PathBuf::from(&config.paths.output_dir));
            let options = GenerateOptions {
                write_text: text || config.invoice.write_text,
                zip_bundle: zip || config.invoice.zip_bundle,
            };
            let engine = InvoiceEngine::new(session.families, session.fee_schedule.class_map())
                .with_options(options)
                .with_skip_families(skip_families);
            let storage = LocalStorage::new(&output_dir);
            let report = engine
                .generate_invoices(&storage, &cancel_on_ctrl_c())
                .await?;
            print_report("Generated invoices", &report);
            println!("📁 Output saved to: {}", output_dir.display());
            Ok(())
        }
        Command::Email {
            input,
            mode,
            cc_mode,
            subject,
            body_file,
            skip_families,
        } => {
            let session = input.load(&config)?;
            let mut settings = session.email.clone();
            if let Some(subject) = subject {
                settings.subject = subject;
            }
            if let Some(body_file) = body_file {
                settings.body = std::fs::read_to_string(body_file)?;
            }
            if let Some(cc_mode) = cc_mode {
                settings.cc_mode = cc_mode;
            }
            let mode = mode.unwrap_or(config.email.mode);

            let oauth = OAuthClient::from_config(&config.gmail, &config.token_file())?;
            let token = oauth.access_token(false).await?;
            let mailer = GmailClient::new(&config.gmail.api_base, token);

            let engine = InvoiceEngine::new(session.families, session.fee_schedule.class_map())
                .with_skip_families(skip_families);
            let report = engine
                .email_invoices(&mailer, &settings, mode, &cancel_on_ctrl_c())
                .await?;
            print_report(
                match mode {
                    DispatchMode::Draft => "Created drafts",
                    DispatchMode::Send => "Sent emails",
                },
                &report,
            );
            Ok(())
        }
        Command::Auth { force } => {
            let oauth = OAuthClient::from_config(&config.gmail, &config.token_file())?;
            oauth.access_token(force).await?;
            println!("✅ Gmail access stored in {}", oauth.token_file().display());
            Ok(())
        }
        Command::Session(SessionCommand::Save { input, path }) => {
            let saved = input.load(&config)?.save(&path)?;
            println!("💾 Session saved to {}", saved.display());
            Ok(())
        }
        Command::Session(SessionCommand::Show { path }) => {
            let session = Session::load(&path)?;
            show_families(&session)?;
            show_classes(&session)?;
            println!("Email subject: {}", session.email.subject);
            Ok(())
        }
    }
}

/// First Ctrl-C stops the run before the next family.
fn cancel_on_ctrl_c() -> Cancellation {
    let cancel = Cancellation::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("⏹️ Cancel requested, finishing the current family");
            flag.cancel();
        }
    });
    cancel
}

fn show_families(session: &Session) -> Result<()> {
    let stats = stats(&session.families);
    println!(
        "{} families, {} parents, {} students",
        stats.families, stats.parents, stats.students
    );
    println!();
    println!("{:<8} {:<16} {:<16} Classes", "Family", "Last", "First");
    for [family_id, last_name, first_name, classes] in student_rows(&session.families) {
        println!("{:<8} {:<16} {:<16} {}", family_id, last_name, first_name, classes);
    }
    Ok(())
}

fn show_classes(session: &Session) -> Result<()> {
    println!("{:<24} {:<20} Fee", "Class", "Teacher");
    for row in &session.fee_schedule.rows {
        let fee = row.fee.map(|f| format!("${:.2}", f)).unwrap_or_default();
        println!("{:<24} {:<20} {}", row.class_name, row.teacher, fee);
    }

    let missing = missing_classes(&session.fee_schedule.class_map(), &session.families);
    if missing.is_empty() {
        println!("\n✅ Every class has a teacher and fee");
    } else {
        println!("\n⚠️ Missing teacher or fee for {} classes:", missing.len());
        for class in missing {
            println!("  {}", class);
        }
    }
    Ok(())
}

fn print_report(action: &str, report: &RunReport) {
    println!("✅ {} for {} families", action, report.processed.len());
    for (family_id, reason) in &report.skipped {
        println!("⚠️ Skipped family {}: {}", family_id, reason);
    }
}

