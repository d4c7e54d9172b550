//! OOXML package inspection: which parts we rewrite, which parts we refuse

use std::io::{Read, Seek};

use tracing::warn;
use zip::ZipArchive;

use crate::error::MergeError;

/// Parts whose text runs are rendered. Everything else is copied through raw.
pub const TARGET_PARTS: [&str; 8] = [
    "word/document.xml",
    "word/header1.xml",
    "word/header2.xml",
    "word/header3.xml",
    "word/footer1.xml",
    "word/footer2.xml",
    "word/footer3.xml",
    "word/comments.xml",
];

const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// Canonical part name: no leading slash, forward separators
pub fn canonical_part_name(name: &str) -> String {
    name.trim_start_matches(|c| c == '/' || c == '\\').replace('\\', "/")
}

pub fn is_target_part(name: &str) -> bool {
    let name = canonical_part_name(name);
    TARGET_PARTS
        .iter()
        .any(|target| target.eq_ignore_ascii_case(&name))
}

/// Macro payloads (VBA project and its data) must never reach a rendered document
pub fn is_macro_part(name: &str) -> bool {
    let name = canonical_part_name(name).to_ascii_lowercase();
    let file = name.rsplit('/').next().unwrap_or(&name);
    file == "vbaproject.bin"
        || file == "vbadata.xml"
        || (file.starts_with("vba") && file.ends_with(".bin"))
}

/// A `.docm`/`.dotm` main part declared in `[Content_Types].xml`
fn declares_macro_content(content_types: &[u8]) -> bool {
    let text = String::from_utf8_lossy(content_types).to_ascii_lowercase();
    text.contains("macroenabled") || text.contains("vbaproject")
}

/// Validate a package before any text processing.
///
/// Rejects macro parts and entries whose uncompressed size exceeds
/// `max_part_bytes`. A macro hit is also reported on the `security_audit`
/// target, since it usually means a hostile upload rather than a user mistake.
pub(crate) fn scan_archive<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    template: &str,
    max_part_bytes: u64,
) -> Result<(), MergeError> {
    let mut content_types_index = None;

    for i in 0..archive.len() {
        let file = archive
            .by_index_raw(i)
            .map_err(|e| MergeError::parse(template, &format!("entry #{}", i), e))?;
        let name = file.name().to_string();

        if is_macro_part(&name) {
            return Err(macro_detected(template, &name));
        }
        if file.size() > max_part_bytes {
            return Err(MergeError::TemplateTooLarge {
                template: template.to_string(),
                part: name,
                size: file.size(),
                max: max_part_bytes,
            });
        }
        if canonical_part_name(&name) == CONTENT_TYPES_PART {
            content_types_index = Some(i);
        }
    }

    if let Some(i) = content_types_index {
        let mut file = archive
            .by_index(i)
            .map_err(|e| MergeError::parse(template, CONTENT_TYPES_PART, e))?;
        let content_types =
            read_limited(&mut file, template, CONTENT_TYPES_PART, max_part_bytes)?;
        if declares_macro_content(&content_types) {
            return Err(macro_detected(template, CONTENT_TYPES_PART));
        }
    }

    Ok(())
}

fn macro_detected(template: &str, part: &str) -> MergeError {
    warn!(
        target: "security_audit",
        template = %template,
        part = %part,
        "Macro-bearing template rejected"
    );
    MergeError::MacroDetected {
        template: template.to_string(),
        part: part.to_string(),
    }
}

/// Read an entry fully, refusing to inflate more than `max_bytes`.
///
/// The declared size in the central directory is not trusted.
pub(crate) fn read_limited<F: Read>(
    file: F,
    template: &str,
    part: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, MergeError> {
    let mut bytes = Vec::new();
    file.take(max_bytes.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|e| MergeError::parse(template, part, e))?;

    if bytes.len() as u64 > max_bytes {
        return Err(MergeError::TemplateTooLarge {
            template: template.to_string(),
            part: part.to_string(),
            size: bytes.len() as u64,
            max: max_bytes,
        });
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parts() {
        assert!(is_target_part("word/document.xml"));
        assert!(is_target_part("/word/header2.xml"));
        assert!(is_target_part("word\\footer3.xml"));
        assert!(is_target_part("word/comments.xml"));
        assert!(!is_target_part("word/header4.xml"));
        assert!(!is_target_part("word/styles.xml"));
        assert!(!is_target_part("word/media/image1.png"));
    }

    #[test]
    fn test_macro_parts() {
        assert!(is_macro_part("word/vbaProject.bin"));
        assert!(is_macro_part("word/vbaData.xml"));
        assert!(is_macro_part("/WORD/VBAPROJECTSIGNATURE.BIN"));
        assert!(!is_macro_part("word/media/image1.png"));
        assert!(!is_macro_part("word/embeddings/oleObject1.bin"));
    }

    #[test]
    fn test_macro_content_type() {
        let docm = br#"<Override PartName="/word/document.xml" ContentType="application/vnd.ms-word.document.macroEnabled.main+xml"/>"#;
        let docx = br#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#;
        assert!(declares_macro_content(docm));
        assert!(!declares_macro_content(docx));
    }

    #[test]
    fn test_read_limited_enforces_cap() {
        let data = vec![b'x'; 32];
        assert_eq!(read_limited(&data[..], "t", "p", 32).unwrap().len(), 32);

        let err = read_limited(&data[..], "t", "p", 31).unwrap_err();
        assert!(matches!(err, MergeError::TemplateTooLarge { size: 32, .. }));
    }
}
