//! DOCX template merge engine
//!
//! Renders `{{Name}}` placeholders inside a Word package's body, headers,
//! footers and comments:
//! - `merge`: template file in, merged file out (atomic write)
//! - `merge_bytes`: same pipeline over in-memory bytes
//! - `template_placeholders`: discover the fields a template expects
//!
//! Macro-bearing packages are refused before any text is touched.

pub mod error;
mod lists;
pub mod merge;
pub mod package;
pub mod placeholder;
mod substitute;
pub mod value;
mod xml;

use std::collections::BTreeSet;
use std::io::Cursor;

use zip::ZipArchive;

pub use error::{ErrorCode, MergeError};
pub use merge::{merge, merge_bytes, MergeOptions, RenderStats, RenderedBytes, RenderedDocument};
pub use placeholder::{find_placeholders, Placeholder};
pub use value::{sanitize_text, ReplacementValue, Replacements};

/// Every distinct placeholder name used in the target parts of a template
pub fn template_placeholders(
    template_name: &str,
    template: &[u8],
    options: &MergeOptions,
) -> Result<BTreeSet<String>, MergeError> {
    if template.len() as u64 > options.max_template_bytes {
        return Err(MergeError::TemplateTooLarge {
            template: template_name.to_string(),
            part: "(archive)".to_string(),
            size: template.len() as u64,
            max: options.max_template_bytes,
        });
    }

    let mut archive =
        ZipArchive::new(Cursor::new(template)).map_err(|e| MergeError::TemplateNotFound {
            template: template_name.to_string(),
            reason: format!("not a readable DOCX package: {}", e),
        })?;
    package::scan_archive(&mut archive, template_name, options.max_part_bytes)?;

    let mut names = BTreeSet::new();
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| MergeError::parse(template_name, &format!("entry #{}", i), e))?;
        let part = file.name().to_string();
        if file.is_dir() || !package::is_target_part(&part) {
            continue;
        }

        let bytes = package::read_limited(&mut file, template_name, &part, options.max_part_bytes)?;
        let parsed =
            xml::PartXml::parse(&bytes).map_err(|e| MergeError::parse(template_name, &part, e))?;

        let texts = (0..parsed.paragraphs.len())
            .map(|p| parsed.paragraph_text(p))
            .chain(parsed.orphan_nodes.iter().map(|&n| parsed.nodes[n].text.clone()));
        for text in texts {
            names.extend(find_placeholders(&text).into_iter().map(|p| p.name));
        }
    }

    Ok(names)
}
