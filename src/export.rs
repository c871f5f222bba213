use anyhow::Context;
use std::path::Path;

/// `Grade 5  B` -> `Grade_5_B.csv`
pub fn csv_file_name(class_name: &str) -> String {
    let stem = class_name.split_whitespace().collect::<Vec<_>>().join("_");
    format!("{}.csv", stem)
}

pub fn write_csv(out_path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    std::fs::write(out_path, bytes)
        .with_context(|| format!("failed to write {}", out_path.to_string_lossy()))?;
    Ok(())
}
