use crate::domain::model::Invoice;
use crate::utils::error::{InvoiceError, Result};
use chrono::NaiveDate;
use printpdf::{BuiltinFont, IndirectFontRef, Line, Mm, PdfDocument, Point, Pt};
use rust_decimal::Decimal;

// US letter, in points.
const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const LEFT: f32 = 35.0;
const RIGHT: f32 = 560.0;
const TOP: f32 = 720.0;
const BOTTOM: f32 = 45.0;

const TITLE_SIZE: f32 = 16.0;
const HEADER_SIZE: f32 = 12.0;
const BODY_SIZE: f32 = 10.0;
const ROW_HEIGHT: f32 = 14.0;

const STUDENT_COLUMNS: [f32; 3] = [LEFT, 185.0, 345.0];
const EMAIL_COLUMN: f32 = 260.0;
const PAYABLE_FEE_RIGHT: f32 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Regular,
    Bold,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Text {
        x: f32,
        y: f32,
        size: f32,
        face: Face,
        text: String,
    },
    Rule {
        x1: f32,
        x2: f32,
        y: f32,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Item>,
}

impl Page {
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|i| match i {
            Item::Text { text, .. } => Some(text.as_str()),
            Item::Rule { .. } => None,
        })
    }
}

/// Width of a money string in Times; digits and `$` are half an em, `.` and `,` a quarter.
fn money_width(text: &str, size: f32) -> f32 {
    text.chars()
        .map(|c| match c {
            '.' | ',' => 0.25,
            '-' => 0.333,
            _ => 0.5,
        })
        .sum::<f32>()
        * size
}

fn money(fee: Decimal) -> String {
    format!("${:.2}", fee)
}

struct Layout {
    pages: Vec<Page>,
    y: f32,
    generated_on: String,
}

impl Layout {
    fn new(generated_on: NaiveDate) -> Self {
        let mut layout = Self {
            pages: Vec::new(),
            y: TOP,
            generated_on: generated_on.format("%a %b %d, %Y").to_string(),
        };
        layout.new_page();
        layout
    }

    fn new_page(&mut self) {
        let mut page = Page::default();
        page.items.push(Item::Text {
            x: LEFT,
            y: 760.0,
            size: 24.0,
            face: Face::Regular,
            text: "Class Enrollment Invoice".to_string(),
        });
        page.items.push(Item::Text {
            x: LEFT,
            y: 740.0,
            size: HEADER_SIZE,
            face: Face::Regular,
            text: format!("Generated on {}", self.generated_on),
        });
        self.pages.push(page);
        self.y = TOP;
    }

    fn reserve(&mut self, height: f32) {
        if self.y - height < BOTTOM {
            self.new_page();
        }
    }

    fn push(&mut self, item: Item) {
        if let Some(page) = self.pages.last_mut() {
            page.items.push(item);
        }
    }

    fn text(&mut self, x: f32, size: f32, face: Face, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        let y = self.y;
        self.push(Item::Text {
            x,
            y,
            size,
            face,
            text,
        });
    }

    fn money_right(&mut self, right: f32, size: f32, face: Face, fee: Decimal) {
        let text = money(fee);
        let x = right - money_width(&text, size);
        self.text(x, size, face, text);
    }

    fn rule(&mut self, y: f32) {
        self.push(Item::Rule {
            x1: LEFT,
            x2: RIGHT,
            y,
        });
    }

    fn title(&mut self, text: &str) {
        self.reserve(TITLE_SIZE + 2.0 * ROW_HEIGHT);
        self.y -= 12.0;
        self.text(LEFT, TITLE_SIZE, Face::Bold, text);
        self.y -= TITLE_SIZE + 8.0;
    }

    fn row(&mut self) {
        self.y -= ROW_HEIGHT;
    }
}

/// Positions every piece of text on the invoice; long invoices spill onto extra pages.
pub fn layout(invoice: &Invoice, generated_on: NaiveDate) -> Vec<Page> {
    let mut l = Layout::new(generated_on);

    l.title("Parents");
    for (name, email) in &invoice.parents {
        l.reserve(ROW_HEIGHT);
        l.text(LEFT, BODY_SIZE, Face::Regular, name.as_str());
        l.text(EMAIL_COLUMN, BODY_SIZE, Face::Regular, email.as_str());
        l.row();
    }

    l.title("Students");
    l.reserve(2.0 * ROW_HEIGHT);
    for (x, header) in STUDENT_COLUMNS.iter().zip(["Student", "Class", "Instructor"]) {
        l.text(*x, HEADER_SIZE, Face::Bold, header);
    }
    l.text(RIGHT - money_width("Fee", HEADER_SIZE) - 4.0, HEADER_SIZE, Face::Bold, "Fee");
    let header_rule = l.y - 4.0;
    l.rule(header_rule);
    l.row();

    for student in &invoice.students {
        for (n, line) in student.lines.iter().enumerate() {
            l.reserve(ROW_HEIGHT);
            // 學生姓名只印在第一列
            if n == 0 {
                l.text(STUDENT_COLUMNS[0], BODY_SIZE, Face::Regular, student.name.as_str());
            }
            l.text(STUDENT_COLUMNS[1], BODY_SIZE, Face::Regular, line.class_name.as_str());
            l.text(STUDENT_COLUMNS[2], BODY_SIZE, Face::Regular, line.teacher.as_str());
            l.money_right(RIGHT, BODY_SIZE, Face::Regular, line.fee);
            l.row();
        }
    }

    l.reserve(ROW_HEIGHT);
    let total_rule = l.y + BODY_SIZE + 2.0;
    l.rule(total_rule);
    l.text(LEFT, BODY_SIZE, Face::Bold, "Total");
    l.money_right(RIGHT, BODY_SIZE, Face::Bold, invoice.total);
    l.row();

    l.title("Make checks payable to:");
    for (teacher, fee) in &invoice.payable {
        l.reserve(ROW_HEIGHT);
        l.text(LEFT, BODY_SIZE, Face::Regular, teacher.as_str());
        l.money_right(PAYABLE_FEE_RIGHT, BODY_SIZE, Face::Regular, *fee);
        l.row();
    }

    l.pages
}

fn mm(pt: f32) -> Mm {
    Mm::from(Pt(pt))
}

fn pdf_error(e: impl std::fmt::Display) -> InvoiceError {
    InvoiceError::PdfError {
        message: e.to_string(),
    }
}

pub fn render_pdf(invoice: &Invoice, generated_on: NaiveDate) -> Result<Vec<u8>> {
    let pages = layout(invoice, generated_on);
    let title = format!("Class Enrollment Invoice - {}", invoice.family_name);
    let (doc, first_page, first_layer) =
        PdfDocument::new(title, mm(PAGE_WIDTH), mm(PAGE_HEIGHT), "Invoice");
    let regular: IndirectFontRef = doc.add_builtin_font(BuiltinFont::TimesRoman).map_err(pdf_error)?;
    let bold: IndirectFontRef = doc.add_builtin_font(BuiltinFont::TimesBold).map_err(pdf_error)?;

    for (n, page) in pages.iter().enumerate() {
        let layer = if n == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (page_index, layer_index) = doc.add_page(mm(PAGE_WIDTH), mm(PAGE_HEIGHT), "Invoice");
            doc.get_page(page_index).get_layer(layer_index)
        };
        layer.set_outline_thickness(0.5);

        for item in &page.items {
            match item {
                Item::Text {
                    x,
                    y,
                    size,
                    face,
                    text,
                } => {
                    let font = match face {
                        Face::Regular => &regular,
                        Face::Bold => &bold,
                    };
                    layer.use_text(text.as_str(), *size, mm(*x), mm(*y), font);
                }
                Item::Rule { x1, x2, y } => {
                    layer.add_line(Line {
                        points: vec![
                            (Point::new(mm(*x1), mm(*y)), false),
                            (Point::new(mm(*x2), mm(*y)), false),
                        ],
                        is_closed: false,
                    });
                }
            }
        }
    }

    let bytes = doc.save_to_bytes().map_err(pdf_error)?;
    tracing::debug!(
        "Rendered {} page PDF ({} bytes) for family {}",
        pages.len(),
        bytes.len(),
        invoice.family_id
    );
    Ok(bytes)
}
