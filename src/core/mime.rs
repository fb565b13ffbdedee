use crate::domain::model::OutgoingEmail;
use crate::utils::error::{InvoiceError, Result};
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;

pub const ATTACHMENT_NAME: &str = "class_invoice.pdf";
const LINE_LENGTH: usize = 76;
const BOUNDARY_PREFIX: &str = "class-invoices-boundary";

fn wrap_base64(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    encoded
        .as_bytes()
        .chunks(LINE_LENGTH)
        // base64 輸出只有 ASCII
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("\r\n")
}

/// Longest UTF-8 run per encoded-word; 45 bytes is 60 base64 characters,
/// which keeps `=?utf-8?b?...?=` within the 75 character limit.
const ENCODED_WORD_BYTES: usize = 45;

/// RFC 2047 encoded-words for non-ASCII header values, folded one word per line.
fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        return value.to_string();
    }
    let mut words = Vec::new();
    let mut chunk = String::new();
    for c in value.chars() {
        if chunk.len() + c.len_utf8() > ENCODED_WORD_BYTES {
            words.push(std::mem::take(&mut chunk));
        }
        chunk.push(c);
    }
    if !chunk.is_empty() {
        words.push(chunk);
    }
    words
        .iter()
        .map(|w| format!("=?utf-8?b?{}?=", STANDARD.encode(w.as_bytes())))
        .collect::<Vec<_>>()
        .join("\r\n ")
}

/// Header values may not carry line breaks; one would start a new header.
fn header_value<'a>(name: &str, value: &'a str) -> Result<&'a str> {
    if value.contains(['\r', '\n']) {
        return Err(InvoiceError::email(format!(
            "{} header may not contain a line break: {:?}",
            name, value
        )));
    }
    Ok(value)
}

fn address_list(name: &str, addresses: &[String]) -> Result<String> {
    for address in addresses {
        header_value(name, address)?;
    }
    Ok(addresses.join(", "))
}

/// Boundary that cannot collide with the body text.
fn boundary_for(email: &OutgoingEmail) -> String {
    let mut boundary = BOUNDARY_PREFIX.to_string();
    let mut n = 0;
    while email.body.contains(&boundary) {
        n += 1;
        boundary = format!("{}-{}", BOUNDARY_PREFIX, n);
    }
    boundary
}

/// multipart/mixed message: a plain-text body and the PDF invoice.
pub fn build_message(email: &OutgoingEmail) -> Result<String> {
    let boundary = boundary_for(email);
    let mut headers = vec![
        format!("To: {}", address_list("To", &email.recipients)?),
        format!("From: {}", header_value("From", &email.sender)?),
    ];
    if !email.cc.is_empty() {
        headers.push(format!("Cc: {}", address_list("Cc", &email.cc)?));
    }
    if !email.bcc.is_empty() {
        headers.push(format!("Bcc: {}", address_list("Bcc", &email.bcc)?));
    }
    let subject = header_value("Subject", &email.subject)?;
    headers.push(format!("Subject: {}", encode_header(subject)));
    headers.push("MIME-Version: 1.0".to_string());
    headers.push(format!(
        "Content-Type: multipart/mixed; boundary=\"{}\"",
        boundary
    ));

    let mut message = headers.join("\r\n");
    message.push_str("\r\n\r\n");

    message.push_str(&format!("--{}\r\n", boundary));
    message.push_str("Content-Type: text/plain; charset=\"utf-8\"\r\n");
    message.push_str("MIME-Version: 1.0\r\n");
    message.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
    message.push_str(&wrap_base64(email.body.as_bytes()));
    message.push_str("\r\n");

    // Apple Mail 需要 X-Attachment-Id 才能正確顯示 PDF
    message.push_str(&format!("--{}\r\n", boundary));
    message.push_str("Content-Type: application/pdf\r\n");
    message.push_str("MIME-Version: 1.0\r\n");
    message.push_str("Content-Transfer-Encoding: base64\r\n");
    message.push_str(&format!("X-Attachment-Id: {}\r\n", email.attachment_name));
    message.push_str(&format!(
        "Content-Disposition: attachment; filename=\"{}\"\r\n\r\n",
        email.attachment_name
    ));
    message.push_str(&wrap_base64(&email.attachment));
    message.push_str("\r\n");
    message.push_str(&format!("--{}--\r\n", boundary));
    Ok(message)
}

/// Gmail `raw` field: URL-safe base64 of the whole message.
pub fn encode_raw(message: &str) -> String {
    URL_SAFE.encode(message.as_bytes())
}
