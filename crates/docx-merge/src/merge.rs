//! Template merge
//!
//! Renders a DOCX template against a replacement map.
//!
//! The algorithm:
//! 1. Reject empty replacement maps and oversized or unreadable templates
//! 2. Scan every entry name for macro payloads before touching any text
//! 3. For each entry, in order:
//!    a. Target parts are parsed once; pass 1 substitutes text nodes and
//!       notes list placeholders, pass 2 expands those on the same model
//!    b. Unchanged entries are raw-copied, compressed bytes untouched
//! 4. Hash the finished archive for the audit trail
//!
//! File merges write to a temporary file next to the destination and only
//! rename it into place once every part has been processed.

use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::audit::{hash_document, hash_reader};
use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::MergeError;
use crate::lists::expand_lists;
use crate::package::{is_target_part, read_limited, scan_archive};
use crate::substitute::substitute_part;
use crate::value::Replacements;
use crate::xml::PartXml;

/// Default cap on the template archive size (25 MiB)
pub const DEFAULT_MAX_TEMPLATE_BYTES: u64 = 25 * 1024 * 1024;

/// Default cap on a single inflated part (64 MiB)
pub const DEFAULT_MAX_PART_BYTES: u64 = 64 * 1024 * 1024;

/// Merge limits and rendering choices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    /// Maximum size of the template archive on disk
    pub max_template_bytes: u64,
    /// Maximum uncompressed size of any entry
    pub max_part_bytes: u64,
    /// Paragraph style id given to expanded list items
    pub bullet_style: String,
    /// Separator for list values used inline inside a sentence
    pub inline_list_separator: String,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            max_template_bytes: DEFAULT_MAX_TEMPLATE_BYTES,
            max_part_bytes: DEFAULT_MAX_PART_BYTES,
            bullet_style: "ListBullet".to_string(),
            inline_list_separator: ", ".to_string(),
        }
    }
}

/// Counters for one merge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenderStats {
    pub entries: usize,
    pub parts_rewritten: usize,
    pub placeholders_replaced: usize,
    pub lists_expanded: usize,
    pub input_size_bytes: u64,
    pub output_size_bytes: u64,
    pub processing_time_ms: u64,
}

/// A merged document written to disk
#[derive(Debug, Clone, Serialize)]
pub struct RenderedDocument {
    pub path: PathBuf,
    /// Lowercase hex SHA-256 of the output file
    pub content_hash: String,
    pub rendered_at: DateTime<Utc>,
    pub stats: RenderStats,
}

/// A merged document kept in memory
#[derive(Debug, Clone)]
pub struct RenderedBytes {
    pub bytes: Vec<u8>,
    pub content_hash: String,
    pub rendered_at: DateTime<Utc>,
    pub stats: RenderStats,
}

/// Merge a template file into a new document at `output`.
///
/// Creates exactly one file on success and none on failure.
pub fn merge(
    template: &Path,
    replacements: &Replacements,
    output: &Path,
    options: &MergeOptions,
) -> Result<RenderedDocument, MergeError> {
    if replacements.is_empty() {
        return Err(MergeError::EmptyReplacements);
    }

    let started = Instant::now();
    let template_name = template.display().to_string();
    let output_name = output.display().to_string();

    let file = File::open(template).map_err(|e| MergeError::TemplateNotFound {
        template: template_name.clone(),
        reason: e.to_string(),
    })?;
    let input_size = file
        .metadata()
        .map_err(|e| MergeError::TemplateNotFound {
            template: template_name.clone(),
            reason: e.to_string(),
        })?
        .len();
    check_template_size(&template_name, input_size, options)?;

    let directory = match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut staged = tempfile::Builder::new()
        .prefix(".docx-merge-")
        .suffix(".tmp")
        .tempfile_in(&directory)
        .map_err(|e| MergeError::write(&output_name, e))?;

    let mut stats = {
        let writer = BufWriter::new(staged.as_file_mut());
        let (writer, stats) = render_archive(
            &template_name,
            BufReader::new(file),
            writer,
            replacements,
            options,
            &output_name,
        )?;
        writer
            .into_inner()
            .map_err(|e| MergeError::write(&output_name, e.error()))?;
        stats
    };

    staged
        .as_file()
        .sync_all()
        .map_err(|e| MergeError::write(&output_name, e))?;

    let mut reader = staged
        .reopen()
        .map_err(|e| MergeError::write(&output_name, e))?;
    let output_size = reader
        .metadata()
        .map_err(|e| MergeError::write(&output_name, e))?
        .len();
    let content_hash = hash_reader(&mut reader).map_err(|e| MergeError::write(&output_name, e))?;
    drop(reader);

    staged
        .persist(output)
        .map_err(|e| MergeError::write(&output_name, e.error))?;

    stats.input_size_bytes = input_size;
    stats.output_size_bytes = output_size;
    stats.processing_time_ms = started.elapsed().as_millis() as u64;

    let rendered = RenderedDocument {
        path: output.to_path_buf(),
        content_hash,
        rendered_at: Utc::now(),
        stats,
    };
    log_merged(&template_name, &rendered.content_hash, &rendered.rendered_at, &rendered.stats);
    Ok(rendered)
}

/// Merge a template held in memory (e.g. downloaded from storage)
pub fn merge_bytes(
    template_name: &str,
    template: &[u8],
    replacements: &Replacements,
    options: &MergeOptions,
) -> Result<RenderedBytes, MergeError> {
    if replacements.is_empty() {
        return Err(MergeError::EmptyReplacements);
    }

    let started = Instant::now();
    check_template_size(template_name, template.len() as u64, options)?;

    let output = Cursor::new(Vec::with_capacity(template.len()));
    let (output, mut stats) = render_archive(
        template_name,
        Cursor::new(template),
        output,
        replacements,
        options,
        "<memory>",
    )?;
    let bytes = output.into_inner();

    stats.input_size_bytes = template.len() as u64;
    stats.output_size_bytes = bytes.len() as u64;
    stats.processing_time_ms = started.elapsed().as_millis() as u64;

    let content_hash = hash_document(&bytes);
    let rendered_at = Utc::now();
    log_merged(template_name, &content_hash, &rendered_at, &stats);

    Ok(RenderedBytes {
        bytes,
        content_hash,
        rendered_at,
        stats,
    })
}

fn check_template_size(template: &str, size: u64, options: &MergeOptions) -> Result<(), MergeError> {
    if size > options.max_template_bytes {
        return Err(MergeError::TemplateTooLarge {
            template: template.to_string(),
            part: "(archive)".to_string(),
            size,
            max: options.max_template_bytes,
        });
    }
    Ok(())
}

/// One audit record per successful merge
fn log_merged(template: &str, content_hash: &str, rendered_at: &DateTime<Utc>, stats: &RenderStats) {
    info!(
        target: "audit",
        template = %template,
        content_hash = %content_hash,
        rendered_at = %rendered_at.to_rfc3339(),
        parts_rewritten = stats.parts_rewritten,
        lists_expanded = stats.lists_expanded,
        "Template merged"
    );
}

/// Stream every entry of `reader` into `writer`, rendering target parts
fn render_archive<R, W>(
    template: &str,
    reader: R,
    writer: W,
    replacements: &Replacements,
    options: &MergeOptions,
    output_name: &str,
) -> Result<(W, RenderStats), MergeError>
where
    R: Read + Seek,
    W: Write + Seek,
{
    let mut archive = ZipArchive::new(reader).map_err(|e| MergeError::TemplateNotFound {
        template: template.to_string(),
        reason: format!("not a readable DOCX package: {}", e),
    })?;

    scan_archive(&mut archive, template, options.max_part_bytes)?;

    let mut stats = RenderStats {
        entries: archive.len(),
        ..RenderStats::default()
    };
    let mut zip = ZipWriter::new(writer);

    for i in 0..archive.len() {
        let (name, compression, target) = {
            let file = archive
                .by_index_raw(i)
                .map_err(|e| MergeError::parse(template, &format!("entry #{}", i), e))?;
            let name = file.name().to_string();
            let target = !file.is_dir() && is_target_part(&name);
            (name, file.compression(), target)
        };

        if target {
            let original = {
                let mut file = archive
                    .by_index(i)
                    .map_err(|e| MergeError::parse(template, &name, e))?;
                read_limited(&mut file, template, &name, options.max_part_bytes)?
            };

            if let Some(rendered) =
                render_part(template, &name, &original, replacements, options, &mut stats)?
            {
                debug!(part = %name, "Rewrote part");
                zip.start_file(name.as_str(), rewritten_entry_options(compression))
                    .map_err(|e| MergeError::write(output_name, e))?;
                zip.write_all(&rendered)
                    .map_err(|e| MergeError::write(output_name, e))?;
                stats.parts_rewritten += 1;
                continue;
            }
        }

        let raw = archive
            .by_index_raw(i)
            .map_err(|e| MergeError::parse(template, &name, e))?;
        zip.raw_copy_file(raw)
            .map_err(|e| MergeError::write(output_name, e))?;
    }

    let writer = zip
        .finish()
        .map_err(|e| MergeError::write(output_name, e))?;
    Ok((writer, stats))
}

/// Run both passes over one part; `None` when the part is unchanged.
///
/// Every target part is parsed, so a malformed part fails the merge even when
/// it holds no placeholder.
fn render_part(
    template: &str,
    part: &str,
    original: &[u8],
    replacements: &Replacements,
    options: &MergeOptions,
    stats: &mut RenderStats,
) -> Result<Option<Vec<u8>>, MergeError> {
    let mut xml = PartXml::parse(original).map_err(|e| MergeError::parse(template, part, e))?;

    // Every token needs a brace somewhere in the part
    if !original.contains(&b'{') {
        return Ok(None);
    }

    let substitution = substitute_part(&mut xml, replacements, &options.inline_list_separator);
    stats.placeholders_replaced += substitution.replaced;

    stats.lists_expanded += expand_lists(
        &mut xml,
        &substitution.list_paragraphs,
        replacements,
        &options.bullet_style,
    )
    .map_err(|e| MergeError::parse(template, part, e))?;

    if !xml.is_modified() {
        return Ok(None);
    }
    let rendered = xml
        .write()
        .map_err(|e| MergeError::parse(template, part, e))?;
    Ok(Some(rendered))
}

/// Rewritten entries keep their compression method and get a fixed timestamp,
/// so merging the same inputs twice yields identical bytes
fn rewritten_entry_options(compression: CompressionMethod) -> FileOptions<'static, ()> {
    let method = match compression {
        CompressionMethod::Stored => CompressionMethod::Stored,
        _ => CompressionMethod::Deflated,
    };
    FileOptions::<()>::default()
        .compression_method(method)
        .last_modified_time(zip::DateTime::default())
}
