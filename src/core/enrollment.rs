use crate::core::parse::{parse_bool, parse_date, parse_list, parse_phone};
use crate::domain::model::{
    Column, EnrollmentStats, Enumerated, Families, Family, Gender, MemberType, ParentType, Person,
};
use crate::utils::error::{InvoiceError, Result};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::collections::{BTreeSet, HashMap};
use std::io::{Read, Write};
use std::path::Path;

/// Header position of every known column present in the file.
#[derive(Debug, Clone)]
struct HeaderMap {
    positions: HashMap<Column, usize>,
}

impl HeaderMap {
    fn from_record(headers: &StringRecord) -> Result<Self> {
        let mut positions = HashMap::new();
        for (n, header) in headers.iter().enumerate() {
            match Column::from_key(header) {
                Some(column) => {
                    positions.entry(column).or_insert(n);
                }
                None => tracing::debug!("Ignoring unknown enrollment column '{}'", header),
            }
        }

        let missing: Vec<&str> = Column::REQUIRED
            .iter()
            .filter(|c| !positions.contains_key(*c))
            .map(|c| c.key())
            .collect();
        if !missing.is_empty() {
            return Err(InvoiceError::validation(format!(
                "Missing required columns: {}",
                missing.join(", ")
            )));
        }

        Ok(Self { positions })
    }

    fn cell<'r>(&self, record: &'r StringRecord, column: Column) -> &'r str {
        self.positions
            .get(&column)
            .and_then(|&i| record.get(i))
            .unwrap_or("")
    }
}

pub fn load_families<P: AsRef<Path>>(path: P) -> Result<Families> {
    let path = path.as_ref();
    tracing::debug!("Loading enrollment file {}", path.display());
    let file = std::fs::File::open(path)?;
    parse_families(file)
}

pub fn parse_families<R: Read>(reader: R) -> Result<Families> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers = HeaderMap::from_record(reader.headers()?)?;
    let mut families = Families::new();

    for record in reader.records() {
        let record = record?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let person = create_person(&record, &headers)
            .map_err(|msg| InvoiceError::validation(format!("Invalid person on line {}: {}", line, msg)))?;
        add_to_family(person, &mut families);
    }

    let stats = stats(&families);
    tracing::info!(
        "📋 Loaded {} families ({} parents, {} students)",
        stats.families,
        stats.parents,
        stats.students
    );
    Ok(families)
}

fn create_person(record: &StringRecord, headers: &HeaderMap) -> std::result::Result<Person, String> {
    let text = |column: Column| headers.cell(record, column).trim().to_string();

    let family_id = text(Column::FamilyId);
    if family_id.is_empty() {
        return Err(format!("empty {} column", Column::FamilyId.key()));
    }

    let phone = text(Column::Phone);
    Ok(Person {
        family_id,
        last_name: text(Column::LastName),
        first_name: text(Column::FirstName),
        classes: parse_list(headers.cell(record, Column::Classes)),
        registered: parse_date(headers.cell(record, Column::Registered).trim()),
        member_type: MemberType::parse_cell(headers.cell(record, Column::MemberType))?,
        email: text(Column::Email),
        parent_type: ParentType::parse_cell(headers.cell(record, Column::ParentType))?,
        phone: if phone.is_empty() { phone } else { parse_phone(&phone) },
        birthday: parse_date(headers.cell(record, Column::Birthday).trim()),
        gender: Gender::parse_cell(headers.cell(record, Column::Gender))?,
        grade: text(Column::Grade),
        notes: text(Column::Notes),
        is_new_student: parse_bool(Some(headers.cell(record, Column::NewStudent))),
        is_nonconsecutive: parse_bool(Some(headers.cell(record, Column::Nonconsecutive))),
    })
}

/// Parents go to `parents`; anyone else (student or no member type) is billed as a student.
pub fn add_to_family(person: Person, families: &mut Families) {
    let family = families
        .entry(person.family_id.clone())
        .or_insert_with(|| Family::new(person.family_id.clone(), person.last_name.clone()));
    if person.is_parent() {
        family.parents.push(person);
    } else {
        family.students.push(person);
    }
}

/// Every class referenced by anyone in the roster, sorted and de-duplicated.
pub fn classes(families: &Families) -> BTreeSet<String> {
    families
        .values()
        .flat_map(|f| f.parents.iter().chain(f.students.iter()))
        .flat_map(|p| p.classes.iter().cloned())
        .collect()
}

pub fn stats(families: &Families) -> EnrollmentStats {
    EnrollmentStats {
        families: families.len(),
        parents: families.values().map(|f| f.parents.len()).sum(),
        students: families.values().map(|f| f.students.len()).sum(),
    }
}

/// Display rows for the student listing: family id, last name, first name, classes.
pub fn student_rows(families: &Families) -> Vec<[String; 4]> {
    let mut students: Vec<&Person> = families.values().flat_map(|f| f.students.iter()).collect();
    students.sort_by(|a, b| {
        a.last_name
            .cmp(&b.last_name)
            .then_with(|| a.first_name.cmp(&b.first_name))
    });
    students
        .into_iter()
        .map(|p| {
            [
                p.family_id.clone(),
                p.last_name.clone(),
                p.first_name.clone(),
                p.classes.join(", "),
            ]
        })
        .collect()
}

fn format_cell(person: &Person, column: Column) -> String {
    let flag = |b: bool| if b { "yes" } else { "no" }.to_string();
    match column {
        Column::FamilyId => person.family_id.clone(),
        Column::LastName => person.last_name.clone(),
        Column::FirstName => person.first_name.clone(),
        Column::Classes => person.classes.join(", "),
        Column::Registered => person.registered.to_string(),
        Column::MemberType => person.member_type.map(|m| m.as_str()).unwrap_or("").to_string(),
        Column::Email => person.email.clone(),
        Column::ParentType => person.parent_type.map(|p| p.as_str()).unwrap_or("").to_string(),
        Column::Phone => person.phone.clone(),
        Column::Birthday => person.birthday.to_string(),
        Column::Gender => person.gender.map(|g| g.as_str()).unwrap_or("").to_string(),
        Column::Grade => person.grade.clone(),
        Column::Notes => person.notes.clone(),
        Column::NewStudent => flag(person.is_new_student),
        Column::Nonconsecutive => flag(person.is_nonconsecutive),
    }
}

/// Row order for one family. The family name is taken from its first row on
/// reload, so that row must carry the same last name.
fn export_order(family: &Family) -> Vec<&Person> {
    let named = |p: Option<&Person>| p.is_some_and(|p| p.last_name == family.last_name);
    let students_first = named(family.students.first()) && !named(family.parents.first());
    if students_first {
        family.students.iter().chain(family.parents.iter()).collect()
    } else {
        family.parents.iter().chain(family.students.iter()).collect()
    }
}

pub fn write_families<W: Write>(writer: W, families: &Families) -> Result<()> {
    let mut writer = WriterBuilder::new().from_writer(writer);
    writer.write_record(Column::ALL.iter().map(|c| c.key()))?;
    for family in families.values() {
        for person in export_order(family) {
            writer.write_record(Column::ALL.iter().map(|&c| format_cell(person, c)))?;
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn export_families<P: AsRef<Path>>(path: P, families: &Families) -> Result<()> {
    let file = std::fs::File::create(path.as_ref())?;
    write_families(file, families)?;
    tracing::info!("💾 Exported enrollment to {}", path.as_ref().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROSTER: &str = "\
family_id,last_name,first_name,classes,member_type,email,parent_type,phone,registered_at,is_new_student
17,Smith,Jane,,parent,jane@example.com,mother,(555)123.4567,08/14/2019 09:30,
17,Smith,Tom,\"Piano, Art\",student,,,,,yes
17,Smith,Ann,Art,student,,,,,
21,Jones,Bob,,parent,bob@example.com,father,,,
21,Jones,Eve,Chess,,,,,,no
";

    #[test]
    fn test_parse_families_groups_by_family_id() {
        let families = parse_families(ROSTER.as_bytes()).unwrap();
        assert_eq!(families.len(), 2);

        let smith = &families["17"];
        assert_eq!(smith.last_name, "Smith");
        assert_eq!(smith.parents.len(), 1);
        assert_eq!(smith.students.len(), 2);
        assert_eq!(smith.students[0].classes, vec!["Piano", "Art"]);
        assert!(smith.students[0].is_new_student);
        assert_eq!(smith.parents[0].phone, "555-123-4567");

        // 沒有 member_type 的人一律當作學生
        let jones = &families["21"];
        assert_eq!(jones.students.len(), 1);
        assert_eq!(jones.students[0].first_name, "Eve");
    }

    #[test]
    fn test_missing_required_columns() {
        let csv = "family_id,first_name,notes\n1,A,\n";
        let err = parse_families(csv.as_bytes()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid enrollment data: Missing required columns: last_name, classes"
        );
    }

    #[test]
    fn test_invalid_member_type_reports_line() {
        let csv = "family_id,last_name,first_name,classes,member_type\n1,A,B,,teacher\n";
        let err = parse_families(csv.as_bytes()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("line 2"), "{}", message);
        assert!(message.contains("Got 'teacher'"), "{}", message);
    }

    #[test]
    fn test_blank_rows_are_skipped() {
        let csv = "family_id,last_name,first_name,classes\n1,A,B,Art\n,,,\n";
        let families = parse_families(csv.as_bytes()).unwrap();
        assert_eq!(families.len(), 1);
    }

    #[test]
    fn test_classes_and_stats() {
        let families = parse_families(ROSTER.as_bytes()).unwrap();
        let classes: Vec<String> = classes(&families).into_iter().collect();
        assert_eq!(classes, vec!["Art", "Chess", "Piano"]);

        let stats = stats(&families);
        assert_eq!(
            stats,
            EnrollmentStats {
                families: 2,
                parents: 2,
                students: 3
            }
        );
    }

    #[test]
    fn test_student_rows_sorted_by_name() {
        let families = parse_families(ROSTER.as_bytes()).unwrap();
        let rows = student_rows(&families);
        let names: Vec<&str> = rows.iter().map(|r| r[2].as_str()).collect();
        assert_eq!(names, vec!["Eve", "Ann", "Tom"]);
        assert_eq!(rows[2][3], "Piano, Art");
    }

    #[test]
    fn test_export_reloads_to_same_families() {
        let families = parse_families(ROSTER.as_bytes()).unwrap();
        let mut buffer = Vec::new();
        write_families(&mut buffer, &families).unwrap();
        let reloaded = parse_families(buffer.as_slice()).unwrap();
        assert_eq!(reloaded, families);
    }

    #[test]
    fn test_export_keeps_family_name_from_first_row() {
        let parent_first = "\
family_id,last_name,first_name,classes,member_type
5,Garcia,Maria,,parent
5,Lopez,Ana,Art,student
";
        let student_first = "\
family_id,last_name,first_name,classes,member_type
8,Lopez,Ana,Art,student
8,Garcia,Maria,,parent
";
        for csv in [parent_first, student_first] {
            let families = parse_families(csv.as_bytes()).unwrap();
            let mut buffer = Vec::new();
            write_families(&mut buffer, &families).unwrap();
            let reloaded = parse_families(buffer.as_slice()).unwrap();
            assert_eq!(reloaded, families);
        }

        let families = parse_families(parent_first.as_bytes()).unwrap();
        assert_eq!(families["5"].last_name, "Garcia");
    }
}
