use crate::index::bundle::MANIFEST_FILE;
use crate::index::reader::BundleReader;
use anyhow::{Context, Result};
use std::path::Path;

/// Display statistics for a written bundle
pub fn show_stats(bundle_dir: &Path) -> Result<()> {
    let reader = BundleReader::open(bundle_dir)
        .with_context(|| format!("Failed to open bundle at {}", bundle_dir.display()))?;
    let manifest = reader.manifest();

    println!("Bundle Statistics");
    println!("=================");
    println!();
    println!("Location:         {}", bundle_dir.display());
    println!("Manifest:         {}", MANIFEST_FILE);
    println!("Format version:   {}", manifest.format_version);
    println!("Generator:        {}", manifest.generator);
    println!("Languages:        {}", manifest.languages.len());

    for language in reader.languages() {
        println!();
        println!("[{}]", language);
        println!("  Pages:          {}", reader.page_count(language));
        println!("  Words:          {}", reader.word_count(language));
        println!("  Index chunks:   {}", reader.chunks(language).len());

        let filters = reader.filter_values(language);
        if !filters.is_empty() {
            println!("  Filters:");
            for (name, values) in filters.iter().take(15) {
                println!("    {:15} {} values", name, values.len());
            }
            if filters.len() > 15 {
                println!("    ... and {} more", filters.len() - 15);
            }
        }

        let sort_keys: Vec<_> = reader.sort_keys(language).collect();
        if !sort_keys.is_empty() {
            println!("  Sort keys:      {}", sort_keys.join(", "));
        }
    }

    if let Ok(size) = dir_size(bundle_dir) {
        println!();
        println!("Bundle size:      {}", format_size(size));
    }

    Ok(())
}

/// Calculate directory size recursively
pub fn dir_size(path: &Path) -> std::io::Result<u64> {
    let mut size = 0;
    if path.is_dir() {
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() {
                size += entry.metadata()?.len();
            } else if path.is_dir() {
                size += dir_size(&path)?;
            }
        }
    }
    Ok(size)
}

/// Format byte size to human readable
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_dir_size_recurses() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("meta")).unwrap();
        std::fs::write(dir.path().join("a"), [0u8; 10]).unwrap();
        std::fs::write(dir.path().join("meta/b"), [0u8; 5]).unwrap();
        assert_eq!(dir_size(dir.path()).unwrap(), 15);
    }

    #[test]
    fn test_missing_bundle_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(show_stats(dir.path()).is_err());
    }
}
