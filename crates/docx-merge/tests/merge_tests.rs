//! End-to-end merge tests over generated DOCX packages

use std::io::{Cursor, Read, Write};
use std::path::Path;

use docx_merge::{merge, merge_bytes, ErrorCode, MergeError, MergeOptions, Replacements};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use quick_xml::events::Event;
use quick_xml::Reader;
use shared_types::audit::hash_document;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

// ============================================================
// Fixtures
// ============================================================

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 13, 1, 2, 3, 4];

fn body(paragraphs: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
            "<w:body>{}<w:sectPr/></w:body></w:document>"
        ),
        paragraphs
    )
}

fn part(root: &str, paragraphs: &str) -> String {
    format!(
        r#"<w:{root} xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">{paragraphs}</w:{root}>"#
    )
}

fn para(text: &str) -> String {
    format!("<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>", text)
}

/// Build a package from `(name, bytes, compression)` triples
fn package_with(parts: &[(&str, &[u8], CompressionMethod)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes, method) in parts {
        zip.start_file(*name, SimpleFileOptions::default().compression_method(*method))
            .unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn package(document: &str, extra: &[(&str, &str)]) -> Vec<u8> {
    let mut parts: Vec<(&str, &[u8], CompressionMethod)> = vec![
        ("[Content_Types].xml", CONTENT_TYPES.as_bytes(), CompressionMethod::Deflated),
        ("word/document.xml", document.as_bytes(), CompressionMethod::Deflated),
    ];
    for &(name, xml) in extra {
        parts.push((name, xml.as_bytes(), CompressionMethod::Deflated));
    }
    parts.push(("word/media/image1.png", PNG_BYTES, CompressionMethod::Stored));
    package_with(&parts)
}

fn write_template(dir: &Path, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.join("template.docx");
    std::fs::write(&path, bytes).unwrap();
    path
}

fn read_part(docx: &[u8], name: &str) -> Vec<u8> {
    let mut archive = ZipArchive::new(Cursor::new(docx)).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut out = Vec::new();
    file.read_to_end(&mut out).unwrap();
    out
}

/// Concatenated `w:t` text of every top-level paragraph
fn paragraphs(xml: &[u8]) -> Vec<String> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut out = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event().unwrap() {
            Event::Start(e) if e.name().as_ref() == b"w:p" => out.push(String::new()),
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_text = true,
            Event::End(e) if e.name().as_ref() == b"w:t" => in_text = false,
            Event::Text(t) if in_text => {
                if let Some(last) = out.last_mut() {
                    last.push_str(&t.unescape().unwrap());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    out
}

fn scenario() -> Replacements {
    let mut r = Replacements::new();
    r.insert_scalar("ClientName", "Jane Roe")
        .insert_scalar("CaseID", "12345")
        .insert_list("Requests", ["Item A", "Item B"]);
    r
}

fn leftover_temp_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with(".docx-merge-"))
        .count()
}

// ============================================================
// Scenarios
// ============================================================

#[test]
fn renders_scalars_and_bullets() {
    let dir = tempfile::tempdir().unwrap();
    let document = body(&format!(
        "{}{}",
        para("Hello {{ClientName}}, your case {{CaseID}} is open."),
        para("{{Requests}}")
    ));
    let template = write_template(dir.path(), &package(&document, &[]));
    let output = dir.path().join("out.docx");

    let rendered = merge(&template, &scenario(), &output, &MergeOptions::default()).unwrap();

    let bytes = std::fs::read(&output).unwrap();
    assert_eq!(rendered.content_hash, hash_document(&bytes));
    assert_eq!(rendered.stats.parts_rewritten, 1);
    assert_eq!(rendered.stats.lists_expanded, 1);
    assert_eq!(rendered.stats.output_size_bytes, bytes.len() as u64);

    let xml = read_part(&bytes, "word/document.xml");
    assert_eq!(
        paragraphs(&xml),
        vec!["Hello Jane Roe, your case 12345 is open.", "Item A", "Item B", ""]
    );
    let xml = String::from_utf8(xml).unwrap();
    assert_eq!(xml.matches(r#"<w:pStyle w:val="ListBullet"/>"#).count(), 2);
}

#[test]
fn split_run_token_is_rendered() {
    let document = body(concat!(
        "<w:p><w:r><w:t>Dear {{Client</w:t></w:r>",
        "<w:r><w:rPr><w:b/></w:rPr><w:t>Name}},</w:t></w:r></w:p>"
    ));
    let out = merge_bytes("t.docx", &package(&document, &[]), &scenario(), &MergeOptions::default())
        .unwrap();

    assert_eq!(paragraphs(&read_part(&out.bytes, "word/document.xml")), vec!["Dear Jane Roe,"]);
}

#[test]
fn headers_footers_and_comments_are_rendered() {
    let header = part("hdr", &para("Re: {{ClientName}}"));
    let footer = part("ftr", &para("Case {{CaseID}}"));
    let comments = part(
        "comments",
        r#"<w:comment w:id="0"><w:p><w:r><w:t>Check {{ClientName}}</w:t></w:r></w:p></w:comment>"#,
    );
    let bytes = package(
        &body(&para("{{ClientName}}")),
        &[
            ("word/header1.xml", header.as_str()),
            ("word/footer2.xml", footer.as_str()),
            ("word/comments.xml", comments.as_str()),
        ],
    );

    let out = merge_bytes("t.docx", &bytes, &scenario(), &MergeOptions::default()).unwrap();
    assert_eq!(out.stats.parts_rewritten, 4);

    for name in ["word/document.xml", "word/header1.xml", "word/footer2.xml", "word/comments.xml"] {
        let xml = String::from_utf8(read_part(&out.bytes, name)).unwrap();
        assert!(!xml.contains("{{"), "{} still holds a token", name);
    }
    assert_eq!(paragraphs(&read_part(&out.bytes, "word/footer2.xml")), vec!["Case 12345"]);
}

#[test]
fn unknown_placeholders_are_removed() {
    let bytes = package(&body(&para("Ref {{Unknown}} for {{ClientName}}")), &[]);
    let out = merge_bytes("t.docx", &bytes, &scenario(), &MergeOptions::default()).unwrap();

    assert_eq!(
        paragraphs(&read_part(&out.bytes, "word/document.xml")),
        vec!["Ref  for Jane Roe"]
    );
}

#[test]
fn untouched_entries_pass_through() {
    let bytes = package(&body(&para("{{ClientName}}")), &[]);
    let out = merge_bytes("t.docx", &bytes, &scenario(), &MergeOptions::default()).unwrap();

    assert_eq!(read_part(&out.bytes, "word/media/image1.png"), PNG_BYTES);
    assert_eq!(read_part(&out.bytes, "[Content_Types].xml"), CONTENT_TYPES.as_bytes());

    let mut archive = ZipArchive::new(Cursor::new(&out.bytes)).unwrap();
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    assert_eq!(names.len(), 3);
    let image = archive.by_name("word/media/image1.png").unwrap();
    assert_eq!(image.compression(), CompressionMethod::Stored);
}

#[test]
fn merging_twice_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = package(&body(&format!("{}{}", para("{{ClientName}}"), para("{{Requests}}"))), &[]);
    let template = write_template(dir.path(), &bytes);

    let first = merge(&template, &scenario(), &dir.path().join("a.docx"), &MergeOptions::default())
        .unwrap();
    let second = merge(&template, &scenario(), &dir.path().join("b.docx"), &MergeOptions::default())
        .unwrap();

    assert_eq!(first.content_hash, second.content_hash);
    assert_eq!(
        std::fs::read(dir.path().join("a.docx")).unwrap(),
        std::fs::read(dir.path().join("b.docx")).unwrap()
    );
}

#[test]
fn merge_bytes_matches_file_merge() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = package(&body(&para("{{ClientName}}")), &[]);
    let template = write_template(dir.path(), &bytes);
    let output = dir.path().join("out.docx");

    let on_disk = merge(&template, &scenario(), &output, &MergeOptions::default()).unwrap();
    let in_memory = merge_bytes("t.docx", &bytes, &scenario(), &MergeOptions::default()).unwrap();

    assert_eq!(on_disk.content_hash, in_memory.content_hash);
    assert_eq!(in_memory.content_hash, hash_document(&in_memory.bytes));
}

// ============================================================
// Failures
// ============================================================

#[test]
fn macro_template_is_rejected_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = package_with(&[
        ("word/document.xml", body(&para("{{ClientName}}")).as_bytes(), CompressionMethod::Deflated),
        ("word/vbaProject.bin", &b"\xd0\xcf\x11\xe0"[..], CompressionMethod::Stored),
    ]);
    let template = write_template(dir.path(), &bytes);
    let output = dir.path().join("out.docx");

    let err = merge(&template, &scenario(), &output, &MergeOptions::default()).unwrap_err();

    assert_eq!(err.code(), ErrorCode::MacroDetected);
    assert_eq!(err.part(), Some("word/vbaProject.bin"));
    assert!(!output.exists());
    assert_eq!(leftover_temp_files(dir.path()), 0);
}

#[test]
fn empty_replacements_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let template = write_template(dir.path(), &package(&body(&para("x")), &[]));
    let output = dir.path().join("out.docx");

    let err = merge(&template, &Replacements::new(), &output, &MergeOptions::default()).unwrap_err();

    assert!(matches!(err, MergeError::EmptyReplacements));
    assert!(!output.exists());
}

#[test]
fn missing_template_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.docx");

    let err = merge(
        &dir.path().join("missing.docx"),
        &scenario(),
        &output,
        &MergeOptions::default(),
    )
    .unwrap_err();

    assert_eq!(err.code(), ErrorCode::TemplateNotFound);
    assert!(!output.exists());
}

#[test]
fn oversized_template_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let template = write_template(dir.path(), &package(&body(&para("{{ClientName}}")), &[]));
    let options = MergeOptions {
        max_template_bytes: 64,
        ..MergeOptions::default()
    };

    let err = merge(&template, &scenario(), &dir.path().join("out.docx"), &options).unwrap_err();
    assert_eq!(err.code(), ErrorCode::TemplateTooLarge);
}

#[test]
fn oversized_part_is_rejected() {
    let options = MergeOptions {
        max_part_bytes: 32,
        ..MergeOptions::default()
    };
    let bytes = package(&body(&para("{{ClientName}}")), &[]);

    let err = merge_bytes("t.docx", &bytes, &scenario(), &options).unwrap_err();
    assert_eq!(err.code(), ErrorCode::TemplateTooLarge);
}

#[test]
fn malformed_part_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = package("<w:document><w:body><w:p>{{ClientName}}</w:r></w:body>", &[]);
    let template = write_template(dir.path(), &bytes);
    let output = dir.path().join("out.docx");

    let err = merge(&template, &scenario(), &output, &MergeOptions::default()).unwrap_err();

    assert_eq!(err.code(), ErrorCode::ParseFailure);
    assert_eq!(err.part(), Some("word/document.xml"));
    assert!(!output.exists());
    assert_eq!(leftover_temp_files(dir.path()), 0);
}

#[test]
fn malformed_part_without_placeholders_fails() {
    let bytes = package("<w:document><w:body><w:p>plain</w:r></w:body>", &[]);

    let err = merge_bytes("t.docx", &bytes, &scenario(), &MergeOptions::default()).unwrap_err();

    assert_eq!(err.code(), ErrorCode::ParseFailure);
    assert_eq!(err.part(), Some("word/document.xml"));
}

#[test]
fn malformed_header_fails_even_when_body_is_clean() {
    let header = part("hdr", "<w:p><w:r><w:t>Letterhead</w:t></w:p>");
    let bytes = package(&body(&para("{{ClientName}}")), &[("word/header1.xml", header.as_str())]);

    let err = merge_bytes("t.docx", &bytes, &scenario(), &MergeOptions::default()).unwrap_err();

    assert_eq!(err.code(), ErrorCode::ParseFailure);
    assert_eq!(err.part(), Some("word/header1.xml"));
}

#[test]
fn values_that_look_like_list_tokens_stay_literal() {
    let mut replacements = scenario();
    replacements.insert_scalar("Note", "{{Requests}}");
    let bytes = package(&body(&para("{{Note}}")), &[]);

    let out = merge_bytes("t.docx", &bytes, &replacements, &MergeOptions::default()).unwrap();

    assert_eq!(
        paragraphs(&read_part(&out.bytes, "word/document.xml")),
        vec!["{{Requests}}"]
    );
    assert_eq!(out.stats.lists_expanded, 0);
}

// ============================================================
// Properties
// ============================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn scalar_values_render_literally(
        value in prop_oneof![
            "[A-Za-z0-9 {}&<>'\"._-]{0,40}",
            Just("{{Requests}}".to_string()),
            Just(" {{ClientName}} ".to_string()),
        ]
    ) {
        let mut replacements = scenario();
        replacements.insert_scalar("Field", &value);
        let bytes = package(&body(&format!("{}{}", para("[{{Field}}]"), para("{{Field}}"))), &[]);

        let out = merge_bytes("t.docx", &bytes, &replacements, &MergeOptions::default()).unwrap();

        let texts = paragraphs(&read_part(&out.bytes, "word/document.xml"));
        prop_assert_eq!(texts, vec![format!("[{}]", value), value.clone()]);
        prop_assert_eq!(out.stats.lists_expanded, 0);
    }
}
