use crate::error::{AppError, Result};
use crate::policy::has_accepted_extension;
use std::io::{Cursor, Read};
use zip::ZipArchive;

pub const REPORT_SEPARATOR: &str = "-------------------------------------------";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub content: String,
}

/// Flat, ordered view of an archive's text entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArchiveReport {
    pub entries: Vec<ArchiveEntry>,
}

impl ArchiveReport {
    pub fn from_bytes(archive_bytes: &[u8], extensions: &[&str]) -> Result<Self> {
        Ok(Self {
            entries: extract_archive(archive_bytes, extensions)?,
        })
    }

    pub fn render(&self) -> String {
        render_archive_report(&self.entries)
    }
}

/// Reads every entry whose name ends with one of `extensions`, in archive order.
///
/// Bytes that are not a zip archive fail the whole extraction. A single entry
/// that cannot be read or is not UTF-8 is logged and skipped.
pub fn extract_archive(archive_bytes: &[u8], extensions: &[&str]) -> Result<Vec<ArchiveEntry>> {
    let mut archive = ZipArchive::new(Cursor::new(archive_bytes))?;
    log::info!("Opened archive with {} entries.", archive.len());

    let mut entries = Vec::new();
    for index in 0..archive.len() {
        let mut zip_entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable archive entry #{}: {}", index, e);
                continue;
            }
        };
        if zip_entry.is_dir() {
            continue;
        }
        let name = zip_entry.name().to_string();
        if !has_accepted_extension(&name, extensions) {
            log::trace!("Skipping entry with unaccepted extension: {}", name);
            continue;
        }

        let mut bytes = Vec::new();
        if let Err(e) = zip_entry.read_to_end(&mut bytes) {
            log::warn!("Skipping archive entry '{}': {}", name, e);
            continue;
        }
        match decode_entry(&name, bytes) {
            Ok(content) => {
                log::trace!("Extracted entry: {}", name);
                entries.push(ArchiveEntry { name, content });
            }
            Err(e) => log::warn!("{}", e),
        }
    }
    log::info!("Extracted {} matching entries.", entries.len());
    Ok(entries)
}

fn decode_entry(name: &str, bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|_| AppError::Decode {
        path: name.to_string(),
        reason: "is not valid UTF-8 text".to_string(),
    })
}

pub fn render_archive_report(entries: &[ArchiveEntry]) -> String {
    let mut output = String::new();
    for entry in entries {
        output.push_str(REPORT_SEPARATOR);
        output.push('\n');
        output.push_str(&format!("Content of {}:\n", entry.name));
        output.push_str(REPORT_SEPARATOR);
        output.push('\n');
        output.push_str(&entry.content);
        output.push('\n');
    }
    output
}
