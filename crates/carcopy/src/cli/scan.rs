//! `carcopy scan`: dry run of the discovery step.

use anyhow::{Context, Result};
use carcopy_ids::ContentId;
use carcopy_worker::{scan_car_files, CarFileInfo};
use serde::Serialize;
use std::path::Path;

use super::output::{format_time, format_time_rfc3339, print_table};

#[derive(Debug, Serialize)]
struct ScanOutput<'a> {
    root_car_dir: String,
    files: Vec<ScanFile<'a>>,
    summary: ScanSummary,
}

#[derive(Debug, Serialize)]
struct ScanFile<'a> {
    name: &'a str,
    path: String,
    content_id: ContentId,
    mod_time: String,
}

#[derive(Debug, Serialize)]
struct ScanSummary {
    total: usize,
}

pub fn run(root_car_dir: &Path, json: bool) -> Result<()> {
    let files = scan_car_files(root_car_dir)
        .with_context(|| format!("Failed to scan {}", root_car_dir.display()))?;

    if json {
        let output = build_output(root_car_dir, &files);
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if files.is_empty() {
        println!("No CAR files found under {}", root_car_dir.display());
        return Ok(());
    }

    let rows = files
        .iter()
        .enumerate()
        .map(|(i, f)| {
            vec![
                (i + 1).to_string(),
                f.content_id.to_string(),
                format_time(f.mod_time),
                f.path.display().to_string(),
            ]
        })
        .collect();
    print_table(&["#", "CONTENT ID", "MODIFIED", "PATH"], rows);
    println!("{} CAR file(s), in dispatch order", files.len());
    Ok(())
}

fn build_output<'a>(root_car_dir: &Path, files: &'a [CarFileInfo]) -> ScanOutput<'a> {
    ScanOutput {
        root_car_dir: root_car_dir.display().to_string(),
        files: files
            .iter()
            .map(|f| ScanFile {
                name: &f.name,
                path: f.path.display().to_string(),
                content_id: f.content_id,
                mod_time: format_time_rfc3339(f.mod_time),
            })
            .collect(),
        summary: ScanSummary { total: files.len() },
    }
}
