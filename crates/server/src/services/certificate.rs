//! Completion certificates rendered as a single-page PDF.
//!
//! The document only needs the two standard Helvetica faces and a handful of
//! filled/stroked rectangles, so it is written directly as PDF 1.4 objects.

use chrono::NaiveDate;

const PAGE_WIDTH: f32 = 842.0;
const PAGE_HEIGHT: f32 = 595.0;

type Rgb = (u8, u8, u8);

const BACKGROUND: Rgb = (0xf8, 0xfa, 0xfc);
const ACCENT: Rgb = (0x25, 0x63, 0xeb);
const HEADING: Rgb = (0x1e, 0x29, 0x3b);
const MUTED: Rgb = (0x64, 0x74, 0x8b);
const FAINT: Rgb = (0x94, 0xa3, 0xb8);

#[derive(Debug, Clone)]
pub struct Certificate<'a> {
    pub academy: &'a str,
    pub student_name: &'a str,
    pub course_title: &'a str,
    pub certificate_id: &'a str,
    pub issued_on: NaiveDate,
}

#[derive(Clone, Copy)]
enum Face {
    Regular,
    Bold,
}

impl Face {
    fn resource(self) -> &'static str {
        match self {
            Face::Regular => "F1",
            Face::Bold => "F2",
        }
    }
}

pub fn certificate_id(enrollment_id: &str, issued_on: NaiveDate) -> String {
    let short: String = enrollment_id
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(8)
        .collect::<String>()
        .to_ascii_uppercase();
    format!("CERT-{}-{short}", issued_on.format("%Y"))
}

/// `Certificate-<title>.pdf`, restricted to characters safe in a header value.
pub fn filename(course_title: &str) -> String {
    let title: String = course_title
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() => Some(c),
            ' ' | '-' | '_' => Some('-'),
            _ => None,
        })
        .collect();
    let title = title.trim_matches('-');
    if title.is_empty() {
        "Certificate.pdf".to_string()
    } else {
        format!("Certificate-{title}.pdf")
    }
}

pub fn render(cert: &Certificate<'_>) -> Vec<u8> {
    let mut content = String::new();

    // Background and border
    content.push_str(&format!(
        "q {} 0 0 {PAGE_WIDTH} {PAGE_HEIGHT} re f Q\n",
        fill(BACKGROUND)
    ));
    content.push_str(&format!(
        "q 20 w {} 10 10 {} {} re S Q\n",
        stroke(ACCENT),
        PAGE_WIDTH - 20.0,
        PAGE_HEIGHT - 20.0
    ));

    let lines: [(Face, f32, Rgb, f32, String); 8] = [
        (Face::Bold, 14.0, MUTED, 510.0, cert.academy.to_uppercase()),
        (Face::Bold, 30.0, HEADING, 455.0, "CERTIFICATE OF COMPLETION".to_string()),
        (Face::Regular, 15.0, MUTED, 400.0, "This is to certify that".to_string()),
        (Face::Bold, 40.0, ACCENT, 340.0, cert.student_name.to_string()),
        (Face::Regular, 15.0, MUTED, 290.0, "has successfully completed the course".to_string()),
        (Face::Bold, 25.0, HEADING, 240.0, cert.course_title.to_string()),
        (
            Face::Regular,
            12.0,
            FAINT,
            130.0,
            format!("Date Issued: {}", cert.issued_on.format("%B %-d, %Y")),
        ),
        (
            Face::Regular,
            12.0,
            FAINT,
            112.0,
            format!("Certificate ID: {}", cert.certificate_id),
        ),
    ];

    for (face, size, color, y, text) in &lines {
        let x = ((PAGE_WIDTH - text_width(text, *face, *size)) / 2.0).max(30.0);
        content.push_str(&format!(
            "BT /{} {size} Tf {} {x:.1} {y:.1} Td ({}) Tj ET\n",
            face.resource(),
            fill(*color),
            encode_text(text)
        ));
    }

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
             /Resources << /Font << /F1 4 0 R /F2 5 0 R >> >> /Contents 6 0 R >>"
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>"
            .to_string(),
        format!(
            "<< /Length {} >>\nstream\n{content}endstream",
            content.len()
        ),
    ];

    write_document(&objects)
}

fn write_document(objects: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");

    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }

    let xref_at = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );
    out
}

fn fill((r, g, b): Rgb) -> String {
    format!("{} {} {} rg", unit(r), unit(g), unit(b))
}

fn stroke((r, g, b): Rgb) -> String {
    format!("{} {} {} RG", unit(r), unit(g), unit(b))
}

fn unit(channel: u8) -> String {
    format!("{:.3}", f32::from(channel) / 255.0)
}

/// Approximate advance width using average Helvetica glyph widths per class.
fn text_width(text: &str, face: Face, size: f32) -> f32 {
    let em: f32 = text
        .chars()
        .map(|c| match c {
            ' ' => 0.278,
            'i' | 'j' | 'l' | '.' | ',' | ':' | '\'' | '|' => 0.25,
            'm' | 'w' => 0.8,
            'M' | 'W' => 0.9,
            c if c.is_ascii_uppercase() => 0.68,
            c if c.is_ascii_digit() => 0.556,
            _ => 0.52,
        })
        .sum();
    let weight = match face {
        Face::Regular => 1.0,
        Face::Bold => 1.06,
    };
    em * size * weight
}

/// Escapes a string for a PDF literal. Latin-1 characters map onto
/// WinAnsiEncoding directly; anything else becomes `?`.
fn encode_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            ' '..='~' => out.push(c),
            c if (0xA0..=0xFF).contains(&(c as u32)) => {
                out.push_str(&format!("\\{:03o}", c as u32));
            }
            _ => out.push('?'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        render(&Certificate {
            academy: "Courseware Academy",
            student_name: "Zoë (Ada) Smith",
            course_title: "SPSS for Data Analysis",
            certificate_id: "CERT-2026-ABCDEF12",
            issued_on: NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(),
        })
    }

    #[test]
    fn produces_a_well_formed_envelope() {
        let pdf = sample();
        assert!(pdf.starts_with(b"%PDF-1.4"));
        assert!(pdf.ends_with(b"%%EOF\n"));
        let text = String::from_utf8_lossy(&pdf);
        assert!(text.contains("/BaseFont /Helvetica-Bold"));
        assert!(text.contains("CERTIFICATE OF COMPLETION"));
        assert!(text.contains("Date Issued: March 9, 2026"));
    }

    #[test]
    fn xref_points_at_objects() {
        let pdf = sample();
        let text = String::from_utf8_lossy(&pdf).into_owned();
        let startxref = text.rfind("startxref\n").unwrap() + "startxref\n".len();
        let xref_at: usize = text[startxref..].lines().next().unwrap().parse().unwrap();
        assert!(pdf[xref_at..].starts_with(b"xref"));

        let table = String::from_utf8_lossy(&pdf[xref_at..]).into_owned();
        let first_entry = table.lines().nth(3).unwrap();
        let offset: usize = first_entry[..10].parse().unwrap();
        assert!(pdf[offset..].starts_with(b"1 0 obj"));
    }

    #[test]
    fn literal_strings_are_escaped() {
        assert_eq!(encode_text("Zoë (Ada)"), "Zo\\353 \\(Ada\\)");
        assert_eq!(encode_text("日本"), "??");
    }

    #[test]
    fn filename_is_header_safe() {
        assert_eq!(filename("R & Python: Basics"), "Certificate-R--Python-Basics.pdf");
        assert_eq!(filename("***"), "Certificate.pdf");
    }

    #[test]
    fn id_is_derived_from_enrollment() {
        let issued = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        assert_eq!(
            certificate_id("3f2a9c1e-aaaa-bbbb", issued),
            "CERT-2026-3F2A9C1E"
        );
    }
}
