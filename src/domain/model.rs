use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Date format used by the registration system for `registered_at` and `birth_date`.
pub const DATE_FORMAT: &str = "%m/%d/%Y %H:%M";

/// Columns of the enrollment CSV, in export order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Column {
    FamilyId,
    LastName,
    FirstName,
    Classes,
    Registered,
    MemberType,
    Email,
    ParentType,
    Phone,
    Birthday,
    Gender,
    Grade,
    Notes,
    NewStudent,
    Nonconsecutive,
}

impl Column {
    pub const ALL: [Column; 15] = [
        Column::FamilyId,
        Column::LastName,
        Column::FirstName,
        Column::Classes,
        Column::Registered,
        Column::MemberType,
        Column::Email,
        Column::ParentType,
        Column::Phone,
        Column::Birthday,
        Column::Gender,
        Column::Grade,
        Column::Notes,
        Column::NewStudent,
        Column::Nonconsecutive,
    ];

    /// Columns an enrollment file must carry to be usable at all.
    pub const REQUIRED: [Column; 4] = [
        Column::FamilyId,
        Column::LastName,
        Column::FirstName,
        Column::Classes,
    ];

    /// Header key as it appears in the CSV.
    pub fn key(self) -> &'static str {
        match self {
            Column::FamilyId => "family_id",
            Column::LastName => "last_name",
            Column::FirstName => "first_name",
            Column::Classes => "classes",
            Column::Registered => "registered_at",
            Column::MemberType => "member_type",
            Column::Email => "email",
            Column::ParentType => "parent_type",
            Column::Phone => "phone",
            Column::Birthday => "birth_date",
            Column::Gender => "gender",
            Column::Grade => "grade",
            Column::Notes => "notes",
            Column::NewStudent => "is_new_student",
            Column::Nonconsecutive => "is_nonconsecutive",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Column::FamilyId => "Family ID",
            Column::LastName => "Last Name",
            Column::FirstName => "First Name",
            Column::Classes => "Classes",
            Column::Registered => "Register Date",
            Column::MemberType => "Parent/Student",
            Column::Email => "E-mail Address",
            Column::ParentType => "Mother/Father",
            Column::Phone => "Phone",
            Column::Birthday => "Birthday",
            Column::Gender => "Gender",
            Column::Grade => "Grade",
            Column::Notes => "Notes",
            Column::NewStudent => "New?",
            Column::Nonconsecutive => "Nonconsecutive?",
        }
    }

    pub fn from_key(key: &str) -> Option<Column> {
        Column::ALL.iter().copied().find(|c| c.key() == key.trim())
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Enumerated cell values (member type, parent type, gender).
pub trait Enumerated: Sized + Copy {
    const VALID: &'static [&'static str];
    const COLUMN: Column;

    fn from_index(index: usize) -> Self;
    fn as_str(self) -> &'static str;

    /// Empty cells are allowed; anything else must be one of `VALID`.
    fn parse_cell(value: &str) -> Result<Option<Self>, String> {
        let normalized = value.trim().to_lowercase();
        if normalized.is_empty() {
            return Ok(None);
        }
        match Self::VALID.iter().position(|v| *v == normalized) {
            Some(index) => Ok(Some(Self::from_index(index))),
            None => Err(format!(
                "bad {} column. Got '{}'. Valid values: {}",
                Self::COLUMN.key(),
                value.trim(),
                Self::VALID.join(", ")
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberType {
    Parent,
    Student,
}

impl Enumerated for MemberType {
    const VALID: &'static [&'static str] = &["parent", "student"];
    const COLUMN: Column = Column::MemberType;

    fn from_index(index: usize) -> Self {
        if index == 0 {
            MemberType::Parent
        } else {
            MemberType::Student
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            MemberType::Parent => "parent",
            MemberType::Student => "student",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParentType {
    Mother,
    Father,
}

impl Enumerated for ParentType {
    const VALID: &'static [&'static str] = &["mother", "father"];
    const COLUMN: Column = Column::ParentType;

    fn from_index(index: usize) -> Self {
        if index == 0 {
            ParentType::Mother
        } else {
            ParentType::Father
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ParentType::Mother => "mother",
            ParentType::Father => "father",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Enumerated for Gender {
    const VALID: &'static [&'static str] = &["male", "female"];
    const COLUMN: Column = Column::Gender;

    fn from_index(index: usize) -> Self {
        if index == 0 {
            Gender::Male
        } else {
            Gender::Female
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

/// A date cell: parsed when it matches [`DATE_FORMAT`], kept verbatim otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateValue {
    Parsed(NaiveDateTime),
    Raw(String),
}

impl Default for DateValue {
    fn default() -> Self {
        DateValue::Raw(String::new())
    }
}

impl fmt::Display for DateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateValue::Parsed(dt) => write!(f, "{}", dt.format(DATE_FORMAT)),
            DateValue::Raw(s) => f.write_str(s),
        }
    }
}

/// One row of the enrollment CSV. Never mutated after load.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Person {
    pub family_id: String,
    pub last_name: String,
    pub first_name: String,
    pub classes: Vec<String>,
    pub registered: DateValue,
    pub member_type: Option<MemberType>,
    pub email: String,
    pub parent_type: Option<ParentType>,
    pub phone: String,
    pub birthday: DateValue,
    pub gender: Option<Gender>,
    pub grade: String,
    pub notes: String,
    pub is_new_student: bool,
    pub is_nonconsecutive: bool,
}

impl Person {
    pub fn is_parent(&self) -> bool {
        self.member_type == Some(MemberType::Parent)
    }

    /// "Last, First", as printed in the parents table.
    pub fn sort_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }

    /// "First Last", as printed in the students table.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Family {
    pub id: String,
    pub last_name: String,
    pub parents: Vec<Person>,
    pub students: Vec<Person>,
}

impl Family {
    pub fn new(id: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            last_name: last_name.into(),
            parents: Vec::new(),
            students: Vec::new(),
        }
    }

    /// Non-empty parent email addresses, in CSV order.
    pub fn parent_emails(&self) -> Vec<String> {
        self.parents
            .iter()
            .map(|p| p.email.trim())
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Families keyed by family id, ordered so every listing is deterministic.
pub type Families = BTreeMap<String, Family>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnrollmentStats {
    pub families: usize,
    pub parents: usize,
    pub students: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEntry {
    pub class_name: String,
    pub teacher: String,
    pub fee: Decimal,
}

/// Class name to (teacher, fee).
pub type ClassMap = HashMap<String, (String, Decimal)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceLine {
    pub class_name: String,
    pub teacher: String,
    pub fee: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentCharges {
    pub name: String,
    pub lines: Vec<InvoiceLine>,
}

/// Per-family invoice. Built on demand from a [`Family`] and a [`ClassMap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    pub family_id: String,
    pub family_name: String,
    /// (display name, email)
    pub parents: Vec<(String, String)>,
    pub students: Vec<StudentCharges>,
    pub total: Decimal,
    /// Teacher to amount owed; ordered by teacher.
    pub payable: BTreeMap<String, Decimal>,
    pub max_class_width: usize,
    pub max_teacher_width: usize,
}

impl Invoice {
    pub fn line_count(&self) -> usize {
        self.students.iter().map(|s| s.lines.len()).sum()
    }
}

/// Whether generated emails are left as drafts for review or sent right away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum DispatchMode {
    #[default]
    Draft,
    Send,
}

/// Copy the sender on every invoice email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum CcMode {
    #[default]
    None,
    Cc,
    Bcc,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmailSettings {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub cc_mode: CcMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub sender: String,
    pub recipients: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachment_name: String,
    pub attachment: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_key_round_trip() {
        for column in Column::ALL {
            assert_eq!(Column::from_key(column.key()), Some(column));
        }
        assert_eq!(Column::from_key(" classes "), Some(Column::Classes));
        assert_eq!(Column::from_key("shoe_size"), None);
    }

    #[test]
    fn test_enumerated_parse_cell() {
        assert_eq!(MemberType::parse_cell("Parent"), Ok(Some(MemberType::Parent)));
        assert_eq!(MemberType::parse_cell(""), Ok(None));
        assert_eq!(ParentType::parse_cell(" father "), Ok(Some(ParentType::Father)));
        assert_eq!(Gender::parse_cell("FEMALE"), Ok(Some(Gender::Female)));

        let err = MemberType::parse_cell("teacher").unwrap_err();
        assert_eq!(
            err,
            "bad member_type column. Got 'teacher'. Valid values: parent, student"
        );
    }

    #[test]
    fn test_parent_emails_skips_blank() {
        let mut family = Family::new("1", "Smith");
        family.parents.push(Person {
            email: "a@example.com".to_string(),
            member_type: Some(MemberType::Parent),
            ..Default::default()
        });
        family.parents.push(Person {
            email: "  ".to_string(),
            member_type: Some(MemberType::Parent),
            ..Default::default()
        });
        assert_eq!(family.parent_emails(), vec!["a@example.com".to_string()]);
    }
}
