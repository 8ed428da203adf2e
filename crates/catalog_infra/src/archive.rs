//! Bulk archive import.
//!
//! A one-time companion to the Backfill Engine: Space-Track's cloud-stored
//! history ships as a zip of yearly zips of `GP_HISTORY`-shaped JSON files,
//! covering years the live API no longer serves cheaply. This streams one
//! yearly member at a time rather than extracting the whole archive to disk.

use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;

use catalog_core::error::IngestError;
use catalog_core::normalize::{normalize_gp_record, RawRecord};
use log::{info, warn};

use crate::store::CatalogWriter;

/// Records committed per transaction while importing (distinct from the live
/// Backfill Engine's smaller sub-batches: this path has no upstream rate
/// limit to respect).
pub const IMPORT_BATCH_SIZE: usize = 10_000;

/// Tally returned once the archive has been walked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub yearly_archives_processed: usize,
    pub json_files_processed: usize,
    pub records_parsed: u64,
    pub records_imported: u64,
    pub records_skipped_unknown_satellite: u64,
    pub records_failed_to_parse: u64,
}

/// Import `zip_path` (an outer zip of yearly zips, or an outer zip of plain
/// JSON files) into `writer`. `years`, when non-empty, restricts processing
/// to members whose name contains one of the given years. `dry_run` parses
/// and tallies without calling into the Writer.
pub async fn import_archive(
    writer: &CatalogWriter,
    zip_path: &Path,
    years: &[i32],
    dry_run: bool,
) -> Result<ImportSummary, IngestError> {
    let file = File::open(zip_path).map_err(|e| IngestError::ConfigurationError {
        detail: format!("cannot open archive {}: {e}", zip_path.display()),
    })?;
    let mut outer = zip::ZipArchive::new(BufReader::new(file)).map_err(|e| IngestError::ConfigurationError {
        detail: format!("not a valid zip archive: {e}"),
    })?;

    let mut summary = ImportSummary::default();
    let member_names: Vec<String> = outer.file_names().map(str::to_string).collect();

    let yearly_members: Vec<&String> = member_names
        .iter()
        .filter(|name| name.ends_with(".zip") && matches_year_filter(name, years))
        .collect();

    if !yearly_members.is_empty() {
        for name in yearly_members {
            let mut buf = Vec::new();
            outer
                .by_name(name)
                .map_err(|e| IngestError::ConfigurationError {
                    detail: format!("cannot open member {name}: {e}"),
                })?
                .read_to_end(&mut buf)
                .map_err(|e| IngestError::ConfigurationError {
                    detail: format!("cannot read member {name}: {e}"),
                })?;

            info!(target: "catalog_infra::archive", "processing yearly archive {name}");
            import_inner_zip(writer, &buf, dry_run, &mut summary).await?;
            summary.yearly_archives_processed += 1;
        }
        return Ok(summary);
    }

    // No yearly zips: maybe the outer archive holds JSON files directly.
    let json_members: Vec<String> = member_names
        .iter()
        .filter(|name| name.ends_with(".json"))
        .cloned()
        .collect();
    for name in json_members {
        let mut content = String::new();
        outer
            .by_name(&name)
            .map_err(|e| IngestError::ConfigurationError {
                detail: format!("cannot open member {name}: {e}"),
            })?
            .read_to_string(&mut content)
            .map_err(|e| IngestError::ConfigurationError {
                detail: format!("cannot read member {name}: {e}"),
            })?;
        import_json_text(writer, &content, dry_run, &mut summary).await?;
    }

    if summary.json_files_processed == 0 {
        warn!(target: "catalog_infra::archive", "no yearly zips or json files found in {}", zip_path.display());
    }

    Ok(summary)
}

async fn import_inner_zip(
    writer: &CatalogWriter,
    bytes: &[u8],
    dry_run: bool,
    summary: &mut ImportSummary,
) -> Result<(), IngestError> {
    let mut inner = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| IngestError::ConfigurationError {
        detail: format!("yearly member is not a valid zip: {e}"),
    })?;
    let json_names: Vec<String> = inner
        .file_names()
        .filter(|n| n.ends_with(".json"))
        .map(str::to_string)
        .collect();

    for name in json_names {
        let mut content = String::new();
        inner
            .by_name(&name)
            .map_err(|e| IngestError::ConfigurationError {
                detail: format!("cannot open {name}: {e}"),
            })?
            .read_to_string(&mut content)
            .map_err(|e| IngestError::ConfigurationError {
                detail: format!("cannot read {name}: {e}"),
            })?;
        import_json_text(writer, &content, dry_run, summary).await?;
    }
    Ok(())
}

async fn import_json_text(
    writer: &CatalogWriter,
    content: &str,
    dry_run: bool,
    summary: &mut ImportSummary,
) -> Result<(), IngestError> {
    summary.json_files_processed += 1;

    // Space-Track cloud exports are sometimes a bare object instead of a
    // one-element array.
    let raw_records: Vec<RawRecord> = match serde_json::from_str::<Vec<RawRecord>>(content) {
        Ok(list) => list,
        Err(_) => match serde_json::from_str::<RawRecord>(content) {
            Ok(single) => vec![single],
            Err(e) => {
                warn!(target: "catalog_infra::archive", "unparseable json member, skipping: {e}");
                return Ok(());
            }
        },
    };

    let mut batch: Vec<(i32, catalog_core::normalize::NormalizedGpRecord)> = Vec::with_capacity(IMPORT_BATCH_SIZE);
    for raw in &raw_records {
        summary.records_parsed += 1;
        match normalize_gp_record(raw) {
            Ok(normalized) => batch.push((normalized.catalog_number, normalized)),
            Err(_) => {
                summary.records_failed_to_parse += 1;
                continue;
            }
        }
        if batch.len() >= IMPORT_BATCH_SIZE {
            flush_batch(writer, &mut batch, dry_run, summary).await?;
        }
    }
    flush_batch(writer, &mut batch, dry_run, summary).await
}

async fn flush_batch(
    writer: &CatalogWriter,
    batch: &mut Vec<(i32, catalog_core::normalize::NormalizedGpRecord)>,
    dry_run: bool,
    summary: &mut ImportSummary,
) -> Result<(), IngestError> {
    if batch.is_empty() {
        return Ok(());
    }
    if dry_run {
        summary.records_imported += batch.len() as u64;
        batch.clear();
        return Ok(());
    }
    let inserted = writer.persist_history_batch(batch.as_slice()).await?;
    summary.records_imported += inserted;
    summary.records_skipped_unknown_satellite += batch.len() as u64 - inserted;
    batch.clear();
    Ok(())
}

fn matches_year_filter(name: &str, years: &[i32]) -> bool {
    if years.is_empty() {
        return true;
    }
    years.iter().any(|y| name.contains(&y.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_filter_empty_matches_everything() {
        assert!(matches_year_filter("2024.zip", &[]));
    }

    #[test]
    fn year_filter_matches_only_listed_years() {
        assert!(matches_year_filter("gp_history_2024.json.zip", &[2024]));
        assert!(!matches_year_filter("gp_history_2023.json.zip", &[2024]));
    }

    fn write_outer_zip(path: &std::path::Path) {
        let json = r#"[{"NORAD_CAT_ID":"44713","OBJECT_NAME":"STARLINK-1007","EPOCH":"2024-01-15T06:30:00","TLE_LINE1":"1 44713U 19074A   24015.27083333  .00002182  00000-0  16538-3 0  9996","TLE_LINE2":"2 44713  53.0544 157.6345 0001420  90.5711 269.5524 15.06414814237473"}]"#;

        let mut inner_buf = Vec::new();
        {
            let mut inner_writer = zip::ZipWriter::new(std::io::Cursor::new(&mut inner_buf));
            let options = zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
            inner_writer.start_file("gp_history_2024.json", options).unwrap();
            std::io::Write::write_all(&mut inner_writer, json.as_bytes()).unwrap();
            inner_writer.finish().unwrap();
        }

        let outer_file = std::fs::File::create(path).unwrap();
        let mut outer_writer = zip::ZipWriter::new(outer_file);
        let options = zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        outer_writer.start_file("2024.zip", options).unwrap();
        std::io::Write::write_all(&mut outer_writer, &inner_buf).unwrap();
        outer_writer.finish().unwrap();
    }

    #[tokio::test]
    async fn dry_run_parses_a_nested_zip_without_touching_the_writer() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("TLEs.zip");
        write_outer_zip(&zip_path);

        let writer = CatalogWriter::connect("sqlite::memory:").await.unwrap();
        writer.init_schema().await.unwrap();

        let summary = import_archive(&writer, &zip_path, &[], true).await.unwrap();
        assert_eq!(summary.yearly_archives_processed, 1);
        assert_eq!(summary.records_parsed, 1);
        assert_eq!(summary.records_imported, 1);
    }

    #[tokio::test]
    async fn real_run_skips_records_for_unregistered_satellites() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("TLEs.zip");
        write_outer_zip(&zip_path);

        let writer = CatalogWriter::connect("sqlite::memory:").await.unwrap();
        writer.init_schema().await.unwrap();
        writer.seed_registry().await.unwrap();

        let summary = import_archive(&writer, &zip_path, &[], false).await.unwrap();
        assert_eq!(summary.records_parsed, 1);
        assert_eq!(summary.records_imported, 0);
        assert_eq!(summary.records_skipped_unknown_satellite, 1);
    }
}
