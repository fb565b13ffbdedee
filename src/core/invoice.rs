use crate::domain::model::{ClassMap, Family, Invoice, InvoiceLine, StudentCharges};
use crate::utils::error::{InvoiceError, Result};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

const SEPARATOR_WIDTH: usize = 68;

/// Builds the invoice for one family. Every class a student takes must be in `class_map`.
pub fn build_invoice(family: &Family, class_map: &ClassMap) -> Result<Invoice> {
    let parents = family
        .parents
        .iter()
        .map(|p| (p.sort_name(), p.email.clone()))
        .collect();

    let mut students = Vec::new();
    let mut total = Decimal::ZERO;
    let mut payable: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut max_class_width: usize = 0;
    let mut max_teacher_width: usize = 0;

    for student in &family.students {
        let mut lines = Vec::with_capacity(student.classes.len());
        for class_name in &student.classes {
            let (teacher, fee) = class_map.get(class_name).ok_or_else(|| {
                InvoiceError::fee_schedule(format!(
                    "Missing teacher or fee for class '{}' (family {})",
                    class_name, family.id
                ))
            })?;
            total += *fee;
            *payable.entry(teacher.clone()).or_insert(Decimal::ZERO) += *fee;
            max_class_width = max_class_width.max(class_name.chars().count());
            max_teacher_width = max_teacher_width.max(teacher.chars().count());
            lines.push(InvoiceLine {
                class_name: class_name.clone(),
                teacher: teacher.clone(),
                fee: *fee,
            });
        }
        if lines.is_empty() {
            tracing::debug!("Student {} has no classes", student.display_name());
            continue;
        }
        students.push(StudentCharges {
            name: student.display_name(),
            lines,
        });
    }

    Ok(Invoice {
        family_id: family.id.clone(),
        family_name: family.last_name.clone(),
        parents,
        students,
        total,
        payable,
        max_class_width,
        max_teacher_width,
    })
}

/// `s`, one space, then underscores out to `width`.
fn pad_str(s: &str, width: usize) -> String {
    let mut padded = format!("{} ", s);
    let fill = width.saturating_sub(padded.chars().count());
    padded.push_str(&"_".repeat(fill));
    padded
}

fn money(fee: Decimal, width: usize) -> String {
    format!("${:>width$}", format!("{:.2}", fee), width = width)
}

pub fn render_text(invoice: &Invoice) -> Vec<String> {
    let mut s = vec!["=".repeat(SEPARATOR_WIDTH)];
    for (name, email) in &invoice.parents {
        s.push(format!("{:30}  {}", name, email));
    }
    s.push(" ".to_string());

    for student in &invoice.students {
        s.push(format!("{:28}", student.name));
        for line in &student.lines {
            s.push(format!(
                "  {} {} {}",
                pad_str(&line.class_name, invoice.max_class_width),
                pad_str(&line.teacher, invoice.max_teacher_width),
                money(line.fee, 6)
            ));
        }
    }

    s.push(" ".to_string());
    s.push("Make checks payable to:".to_string());
    for (teacher, fee) in &invoice.payable {
        s.push(format!(
            "{} {}",
            pad_str(teacher, invoice.max_teacher_width),
            money(*fee, 7)
        ));
    }
    s
}
