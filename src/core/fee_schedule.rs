use crate::core::enrollment;
use crate::core::parse::validate_currency;
use crate::domain::model::{ClassMap, Families, FeeEntry};
use crate::utils::error::{InvoiceError, Result};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::path::Path;

const MAX_MISSING_LISTED: usize = 10;

fn validate_fee_schedule_row(r: usize, row: &StringRecord) -> Result<FeeEntry> {
    if row.len() < 3 {
        return Err(InvoiceError::fee_schedule(format!(
            "Too few columns in fee schedule on row {}: {}",
            r + 1,
            row.iter().collect::<Vec<_>>().join(", ")
        )));
    }
    let teacher = row[1].trim();
    if teacher.is_empty() {
        return Err(InvoiceError::fee_schedule(format!(
            "Empty teacher in row {}, column 2 of fee schedule",
            r + 1
        )));
    }
    let fee = validate_currency(Some(&row[2])).ok_or_else(|| {
        InvoiceError::fee_schedule(format!(
            "Invalid currency in row {}, column 3 of fee schedule: {}",
            r + 1,
            &row[2]
        ))
    })?;
    Ok(FeeEntry {
        class_name: row[0].trim().to_string(),
        teacher: teacher.to_string(),
        fee,
    })
}

pub fn read_fee_schedule<P: AsRef<Path>>(path: P) -> Result<Vec<FeeEntry>> {
    tracing::debug!("Loading fee schedule {}", path.as_ref().display());
    let file = std::fs::File::open(path.as_ref())?;
    parse_fee_schedule(file)
}

/// Rows of (class, teacher, fee). A bad first row is taken to be a header and skipped.
pub fn parse_fee_schedule<R: Read>(reader: R) -> Result<Vec<FeeEntry>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut entries = Vec::new();
    for (r, row) in reader.records().enumerate() {
        let row = row?;
        match validate_fee_schedule_row(r, &row) {
            Ok(entry) => entries.push(entry),
            Err(e) if r == 0 => tracing::debug!("Skipping fee schedule header row: {}", e),
            Err(e) => return Err(e),
        }
    }
    Ok(entries)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRow {
    pub class_name: String,
    pub teacher: String,
    pub fee: Option<Decimal>,
}

/// The working fee schedule: one row per class the roster needs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub rows: Vec<FeeRow>,
}

impl FeeSchedule {
    /// Blank row for every class referenced in the roster, sorted by class name.
    pub fn populate(families: &Families) -> Self {
        let rows = enrollment::classes(families)
            .into_iter()
            .map(|class_name| FeeRow {
                class_name,
                teacher: String::new(),
                fee: None,
            })
            .collect();
        Self { rows }
    }

    pub fn from_entries(entries: &[FeeEntry]) -> Self {
        let mut rows: Vec<FeeRow> = entries
            .iter()
            .map(|e| FeeRow {
                class_name: e.class_name.clone(),
                teacher: e.teacher.clone(),
                fee: Some(e.fee),
            })
            .collect();
        rows.sort_by(|a, b| a.class_name.cmp(&b.class_name));
        rows.dedup_by(|a, b| a.class_name == b.class_name);
        Self { rows }
    }

    /// Applies imported entries to matching rows. Returns the number of rows updated.
    pub fn merge(&mut self, imported: &[FeeEntry]) -> usize {
        let mut applied = 0;
        for entry in imported {
            match self.rows.iter_mut().find(|r| r.class_name == entry.class_name) {
                Some(row) => {
                    row.teacher = entry.teacher.clone();
                    row.fee = Some(entry.fee);
                    applied += 1;
                }
                // 沒有學生報名的課程直接忽略
                None => tracing::debug!("Ignoring fee for unused class '{}'", entry.class_name),
            }
        }
        applied
    }

    /// Classes ready to bill. A zero fee counts as missing, like a blank one.
    pub fn class_map(&self) -> ClassMap {
        self.rows
            .iter()
            .filter(|r| !r.teacher.trim().is_empty())
            .filter_map(|r| {
                r.fee.filter(|fee| !fee.is_zero()).map(|fee| {
                    (
                        r.class_name.trim().to_string(),
                        (r.teacher.trim().to_string(), fee),
                    )
                })
            })
            .collect()
    }

    pub fn write<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = WriterBuilder::new().from_writer(writer);
        writer.write_record(["Class", "Teacher", "Fee"])?;
        for row in &self.rows {
            let fee = row.fee.map(|f| f.to_string()).unwrap_or_default();
            writer.write_record([row.class_name.as_str(), row.teacher.as_str(), fee.as_str()])?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn export<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())?;
        self.write(file)?;
        tracing::info!("💾 Exported fee schedule to {}", path.as_ref().display());
        Ok(())
    }
}

/// Classes a student is enrolled in that have no teacher or fee.
pub fn missing_classes(class_map: &ClassMap, families: &Families) -> BTreeSet<String> {
    families
        .values()
        .flat_map(|f| f.students.iter())
        .flat_map(|s| s.classes.iter())
        .filter(|c| !class_map.contains_key(c.as_str()))
        .cloned()
        .collect()
}

pub fn validate_fee_schedule(class_map: &ClassMap, families: &Families) -> Result<()> {
    let missing = missing_classes(class_map, families);
    if missing.is_empty() {
        return Ok(());
    }
    let mut listed: Vec<String> = missing.iter().take(MAX_MISSING_LISTED).cloned().collect();
    if missing.len() > MAX_MISSING_LISTED {
        listed.push("...".to_string());
    }
    Err(InvoiceError::fee_schedule(format!(
        "missing teacher or fee for classes:\n    {}",
        listed.join("\n    ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::enrollment::parse_families;

    const FEES: &str = "\
Class,Teacher,Fee
Piano,Ms. Keys,$120.00
Art,Mr. Brush,45
Pottery,Mr. Clay,30.00
";

    fn families() -> Families {
        let csv = "\
family_id,last_name,first_name,classes,member_type
1,Smith,Tom,\"Piano, Art\",student
2,Jones,Eve,Chess,student
";
        parse_families(csv.as_bytes()).unwrap()
    }

    #[test]
    fn test_parse_fee_schedule_skips_header() {
        let entries = parse_fee_schedule(FEES.as_bytes()).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].class_name, "Piano");
        assert_eq!(entries[0].fee, Decimal::new(12000, 2));
        assert_eq!(entries[1].fee.to_string(), "45.00");
    }

    #[test]
    fn test_parse_fee_schedule_errors_after_first_row() {
        let bad_teacher = "Piano,Ms. Keys,10\nArt,,45\n";
        let err = parse_fee_schedule(bad_teacher.as_bytes()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Fee schedule error: Empty teacher in row 2, column 2 of fee schedule"
        );

        let bad_fee = "Piano,Ms. Keys,10\nArt,Mr. Brush,cheap\n";
        let err = parse_fee_schedule(bad_fee.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("Invalid currency in row 2, column 3"));

        let short = "Piano,Ms. Keys,10\nArt\n";
        let err = parse_fee_schedule(short.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("Too few columns in fee schedule on row 2"));
    }

    #[test]
    fn test_populate_and_merge() {
        let families = families();
        let mut schedule = FeeSchedule::populate(&families);
        let names: Vec<&str> = schedule.rows.iter().map(|r| r.class_name.as_str()).collect();
        assert_eq!(names, vec!["Art", "Chess", "Piano"]);
        assert!(schedule.class_map().is_empty());

        let applied = schedule.merge(&parse_fee_schedule(FEES.as_bytes()).unwrap());
        assert_eq!(applied, 2); // Pottery 沒有人報名

        let map = schedule.class_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map["Art"], ("Mr. Brush".to_string(), Decimal::new(4500, 2)));
        assert!(!map.contains_key("Chess"));
    }

    #[test]
    fn test_validate_fee_schedule_lists_missing_classes() {
        let families = families();
        let mut schedule = FeeSchedule::populate(&families);
        schedule.merge(&parse_fee_schedule(FEES.as_bytes()).unwrap());

        let err = validate_fee_schedule(&schedule.class_map(), &families).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Fee schedule error: missing teacher or fee for classes:\n    Chess"
        );
    }

    #[test]
    fn test_zero_fee_counts_as_missing() {
        let families = families();
        let mut schedule = FeeSchedule::populate(&families);
        schedule.merge(&parse_fee_schedule("Piano,Ms. Keys,$0\nArt,Mr. Brush,45\nChess,Mr. Rook,0.00\n".as_bytes()).unwrap());

        let map = schedule.class_map();
        assert!(!map.contains_key("Piano"));
        assert!(!map.contains_key("Chess"));
        let err = validate_fee_schedule(&map, &families).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Fee schedule error: missing teacher or fee for classes:\n    Chess\n    Piano"
        );
    }

    #[test]
    fn test_validate_fee_schedule_truncates_long_lists() {
        let mut csv = String::from("family_id,last_name,first_name,classes\n");
        for n in 0..12 {
            csv.push_str(&format!("{},Kid,K{},Class{:02}\n", n, n, n));
        }
        let families = parse_families(csv.as_bytes()).unwrap();
        let err = validate_fee_schedule(&ClassMap::new(), &families).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Class09"));
        assert!(!message.contains("Class10"));
        assert!(message.ends_with("\n    ..."));
    }

    #[test]
    fn test_written_schedule_reads_back() {
        let schedule = FeeSchedule::from_entries(&parse_fee_schedule(FEES.as_bytes()).unwrap());
        let mut buffer = Vec::new();
        schedule.write(&mut buffer).unwrap();
        let reread = FeeSchedule::from_entries(&parse_fee_schedule(buffer.as_slice()).unwrap());
        assert_eq!(reread, schedule);
    }
}
