//! Utility functions shared across the crate.

use std::path::PathBuf;

/// Get the user's config directory following XDG conventions.
///
/// Returns `$XDG_CONFIG_HOME` if set, otherwise `$HOME/.config`.
pub fn config_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
}

/// Split a filename into stem and extension (extension keeps its leading dot).
///
/// Leading dots belong to the stem, so `.env` has no extension.
pub fn split_filename(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if name[..idx].chars().any(|c| c != '.') => name.split_at(idx),
        _ => (name, ""),
    }
}

/// Lower-cased extension without the dot, empty when there is none.
pub fn extension_of(name: &str) -> String {
    split_filename(name)
        .1
        .trim_start_matches('.')
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_filename() {
        assert_eq!(split_filename("report.pdf"), ("report", ".pdf"));
        assert_eq!(split_filename("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_filename("README"), ("README", ""));
        assert_eq!(split_filename(".env"), (".env", ""));
        assert_eq!(split_filename("..hidden.docx"), ("..hidden", ".docx"));
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("Slides.PPTX"), "pptx");
        assert_eq!(extension_of("notes"), "");
    }
}
