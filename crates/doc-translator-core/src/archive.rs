//! Packaging of several translated outputs into one zip download.

use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::io::{Cursor, Write};
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

use crate::error::Result;
use crate::util::split_filename;

/// `translated_files_{YYYYmmdd_HHMMSS}.zip`
pub fn archive_filename(at: DateTime<Local>) -> String {
    format!("translated_files_{}.zip", at.format("%Y%m%d_%H%M%S"))
}

/// Build an in-memory zip with one Deflated entry per `(name, bytes)` pair.
///
/// Entry names are reduced to their final path component; a name already
/// used in the archive gets a numeric suffix before its extension.
pub fn build_zip<'a, I>(entries: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut buffer = Vec::new();
    {
        let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);

        let mut used = HashSet::new();
        for (name, data) in entries {
            let entry = unique_name(safe_name(name), &mut used);
            zip.start_file(entry, options)?;
            zip.write_all(data)?;
        }

        zip.finish()?;
    }

    Ok(buffer)
}

fn safe_name(name: &str) -> &str {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name);
    if last.is_empty() || last == "." || last == ".." {
        "unnamed"
    } else {
        last
    }
}

fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, ext) = split_filename(name);
    let mut n = 2;
    loop {
        let candidate = format!("{stem}_{n}{ext}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Read;

    fn entries(zip_bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut archive = zip::ZipArchive::new(Cursor::new(zip_bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).unwrap();
                let mut data = Vec::new();
                file.read_to_end(&mut data).unwrap();
                (file.name().to_string(), data)
            })
            .collect()
    }

    #[test]
    fn test_archive_filename() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(archive_filename(at), "translated_files_20240309_140507.zip");
    }

    #[test]
    fn test_entries_keep_order_and_bytes() {
        let zip = build_zip([
            ("report_FR.pdf", &b"french"[..]),
            ("report_CN.pdf", &b"chinese"[..]),
        ])
        .unwrap();

        assert_eq!(
            entries(&zip),
            vec![
                ("report_FR.pdf".to_string(), b"french".to_vec()),
                ("report_CN.pdf".to_string(), b"chinese".to_vec()),
            ]
        );
    }

    #[test]
    fn test_duplicate_and_unsafe_names() {
        let zip = build_zip([
            ("../etc/a_FR.pdf", &b"1"[..]),
            ("a_FR.pdf", &b"2"[..]),
            ("a_FR.pdf", &b"3"[..]),
        ])
        .unwrap();

        let names: Vec<_> = entries(&zip).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a_FR.pdf", "a_FR_2.pdf", "a_FR_3.pdf"]);
    }

    #[test]
    fn test_empty_archive_is_valid() {
        let zip = build_zip(std::iter::empty()).unwrap();
        assert!(entries(&zip).is_empty());
    }
}
