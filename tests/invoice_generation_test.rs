use anyhow::Result;
use chrono::NaiveDate;
use class_invoices::config::InputArgs;
use class_invoices::core::fee_schedule::missing_classes;
use class_invoices::{
    AppConfig, Cancellation, GenerateOptions, InvoiceEngine, InvoiceError, LocalStorage,
};
use std::io::Read;
use tempfile::TempDir;

const ENROLLMENT: &str = "\
family_id,last_name,first_name,classes,member_type,email,registered_at,is_new_student
17,Smith,Jane,,parent,jane@example.com,08/14/2019 09:30,
17,Smith,Bob,,parent,bob@example.com,08/14/2019 09:30,
17,Smith,Tom,\"Piano, Art\",student,,08/14/2019 09:31,yes
17,Smith,Amy,Art,student,,08/14/2019 09:31,no
21,O'Neil,Eve,Chess,student,,08/15/2019 18:02,
30,Parker,Pat,,parent,pat@example.com,08/16/2019 10:00,
";

const FEES: &str = "\
Class,Teacher,Fee
Piano,Ms. Keys,$120.00
Art,Mr. Brush,45
Chess,Mr. Rook,30.50
";

fn write_inputs(dir: &TempDir, fees: &str) -> Result<InputArgs> {
    let enrollment = dir.path().join("enrollment.csv");
    let fee_file = dir.path().join("fees.csv");
    std::fs::write(&enrollment, ENROLLMENT)?;
    std::fs::write(&fee_file, fees)?;
    Ok(InputArgs {
        enrollment: Some(enrollment),
        fees: Some(fee_file),
        session: None,
    })
}

/// 測試從 CSV 到 PDF 的完整流程
#[tokio::test]
async fn test_generate_invoices_from_csv_files() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let input = write_inputs(&temp_dir, FEES)?;
    let session = input.load(&AppConfig::default())?;

    assert_eq!(session.families.len(), 3);
    assert!(missing_classes(&session.fee_schedule.class_map(), &session.families).is_empty());

    let output_dir = temp_dir.path().join("out");
    let storage = LocalStorage::new(&output_dir);
    let engine = InvoiceEngine::new(session.families, session.fee_schedule.class_map())
        .with_options(GenerateOptions {
            write_text: true,
            zip_bundle: true,
        })
        .with_generated_on(NaiveDate::from_ymd_opt(2019, 9, 1).unwrap());

    let report = engine
        .generate_invoices(&storage, &Cancellation::new())
        .await?;

    assert_eq!(report.processed, vec!["17", "21"]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, "30");

    let pdf = std::fs::read(output_dir.join("Smith_17.pdf"))?;
    assert!(pdf.starts_with(b"%PDF-"));
    assert!(output_dir.join("O_Neil_21.pdf").exists());
    assert!(!output_dir.join("Parker_30.pdf").exists());

    let text = std::fs::read_to_string(output_dir.join("Smith_17.txt"))?;
    assert!(text.contains("Smith, Jane"));
    assert!(text.contains("Tom Smith"));
    assert!(text.contains("Ms. Keys"));
    assert!(text.contains("90.00"));
    assert!(text.contains("Make checks payable to:"));

    let mut archive = zip::ZipArchive::new(std::fs::File::open(output_dir.join("invoices.zip"))?)?;
    assert_eq!(archive.len(), 2);
    let mut first = Vec::new();
    archive.by_name("Smith_17.pdf")?.read_to_end(&mut first)?;
    assert_eq!(first, pdf);

    Ok(())
}

/// 費用表缺少課程時不應產生任何檔案
#[tokio::test]
async fn test_missing_fee_blocks_generation() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let input = write_inputs(&temp_dir, "Piano,Ms. Keys,120\nArt,Mr. Brush,45\n")?;
    let session = input.load(&AppConfig::default())?;

    let output_dir = temp_dir.path().join("out");
    let storage = LocalStorage::new(&output_dir);
    let engine = InvoiceEngine::new(session.families, session.fee_schedule.class_map());

    let err = engine
        .generate_invoices(&storage, &Cancellation::new())
        .await
        .unwrap_err();
    assert!(matches!(err, InvoiceError::FeeScheduleError { .. }));
    assert!(err.to_string().contains("Chess"));
    assert!(!output_dir.exists());

    Ok(())
}

/// 取消後不再處理任何家庭
#[tokio::test]
async fn test_cancelled_run_stops_before_first_family() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let session = write_inputs(&temp_dir, FEES)?.load(&AppConfig::default())?;

    let cancel = Cancellation::new();
    cancel.cancel();

    let storage = LocalStorage::new(temp_dir.path().join("out"));
    let err = InvoiceEngine::new(session.families, session.fee_schedule.class_map())
        .generate_invoices(&storage, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        InvoiceError::Cancelled {
            completed: 0,
            total: 2,
            ..
        }
    ));
    Ok(())
}

#[test]
fn test_bad_enrollment_reports_line() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let enrollment = temp_dir.path().join("enrollment.csv");
    std::fs::write(
        &enrollment,
        "family_id,last_name,first_name,classes,member_type\n1,Smith,Jane,,parent\n1,Smith,Tom,Art,teacher\n",
    )?;

    let input = InputArgs {
        enrollment: Some(enrollment),
        ..InputArgs::default()
    };
    let err = input.load(&AppConfig::default()).unwrap_err();
    assert!(matches!(err, InvoiceError::ValidationError { .. }));
    assert!(err.to_string().contains("line 3"));
    Ok(())
}
