//! Batch export: renders many cards against one template on a bounded
//! worker pool and commits each artifact atomically.
//!
//! The render phase is pure (bytes in memory, nothing on disk); the
//! commit phase writes a temporary sibling and renames it over the final
//! name, so readers only ever see the previous artifact or the complete
//! new one. One card's failure lands in its manifest entry and never
//! halts the rest of the batch.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::Serialize;

use crate::CardEngine;
use crate::compose::ComposeOptions;
use crate::error::CardPressError;
use crate::template::{CardRecord, CardStatus, CardTemplate};
use crate::{pdf, raster};

/// Cooperative stop flag. Cloning hands out another handle to the same
/// flag, so a caller can keep one and pass the other into the batch.
/// Cards already rendering finish; cards not yet started are skipped and
/// reported as cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub output_dir: PathBuf,
    /// Explicit card selection, preserved in request order. `None`
    /// exports every card with status `active`.
    pub ids: Option<Vec<String>>,
    /// Also write the PNG preview next to each PDF.
    pub write_png: bool,
    pub png_dpi: u32,
    pub crop_marks: bool,
    pub print_contrast: bool,
    /// Write `manifest.json` into the output directory when done.
    pub write_manifest: bool,
    pub cancel: CancelToken,
}

impl BatchOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ids: None,
            write_png: false,
            png_dpi: 300,
            crop_marks: false,
            print_contrast: false,
            write_manifest: true,
            cancel: CancelToken::new(),
        }
    }

    fn compose_options(&self) -> ComposeOptions {
        ComposeOptions {
            print_contrast: self.print_contrast,
            crop_marks: self.crop_marks,
            ..ComposeOptions::default()
        }
    }
}

/// One attempted card: either the artifact paths or the error that
/// stopped it. Exactly one entry per requested card, in request order.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestEntry {
    pub card_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub png_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ManifestEntry {
    fn new(card_id: &str) -> Self {
        Self {
            card_id: card_id.to_string(),
            pdf_path: None,
            png_path: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Completed,
    Cancelled,
}

#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub status: BatchStatus,
    /// Cards selected for export, attempted or not.
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub entries: Vec<ManifestEntry>,
}

enum Selection<'a> {
    Card(&'a CardRecord),
    Missing(&'a str),
}

enum Outcome {
    Entry(ManifestEntry),
    Cancelled,
}

/// Renders the selected cards and commits their artifacts under
/// `options.output_dir`. Per-card failures are recorded in the report;
/// only batch-level problems (the output directory cannot be created,
/// the manifest cannot be written) return `Err`.
pub fn export_batch(
    engine: &CardEngine,
    template: &CardTemplate,
    cards: &[CardRecord],
    options: &BatchOptions,
) -> Result<BatchReport, CardPressError> {
    fs::create_dir_all(&options.output_dir).map_err(|err| {
        CardPressError::ArtifactWrite(format!(
            "create {}: {err}",
            options.output_dir.display()
        ))
    })?;

    let selected = select_cards(cards, options);
    let total = selected.len();
    let compose_options = options.compose_options();

    let outcomes: Vec<Outcome> = selected
        .par_iter()
        .map(|selection| {
            if options.cancel.is_cancelled() {
                return Outcome::Cancelled;
            }
            match selection {
                Selection::Missing(id) => {
                    engine.log().warn(id, "export", "unknown card id");
                    let mut entry = ManifestEntry::new(id);
                    entry.error = Some("unknown card id".to_string());
                    Outcome::Entry(entry)
                }
                Selection::Card(card) => {
                    Outcome::Entry(export_card(engine, template, card, options, &compose_options))
                }
            }
        })
        .collect();

    let mut entries = Vec::with_capacity(outcomes.len());
    let mut cancelled = 0usize;
    for outcome in outcomes {
        match outcome {
            Outcome::Entry(entry) => entries.push(entry),
            Outcome::Cancelled => cancelled += 1,
        }
    }
    let succeeded = entries.iter().filter(|entry| entry.error.is_none()).count();
    let failed = entries.len() - succeeded;
    let status = if cancelled > 0 {
        BatchStatus::Cancelled
    } else {
        BatchStatus::Completed
    };
    let report = BatchReport {
        status,
        total,
        succeeded,
        failed,
        cancelled,
        entries,
    };
    if succeeded > 0 {
        engine.log().increment("batch.succeeded", succeeded as u64);
    }
    if failed > 0 {
        engine.log().increment("batch.failed", failed as u64);
    }
    if cancelled > 0 {
        engine.log().increment("batch.cancelled", cancelled as u64);
    }

    if options.write_manifest {
        let json = serde_json::to_vec_pretty(&report)
            .map_err(|err| CardPressError::ArtifactWrite(format!("manifest: {err}")))?;
        commit_artifact(&options.output_dir, "manifest.json", &json)?;
    }
    Ok(report)
}

fn select_cards<'a>(cards: &'a [CardRecord], options: &'a BatchOptions) -> Vec<Selection<'a>> {
    match &options.ids {
        Some(ids) => ids
            .iter()
            .map(|id| {
                cards
                    .iter()
                    .find(|card| card.id == *id)
                    .map(Selection::Card)
                    .unwrap_or(Selection::Missing(id))
            })
            .collect(),
        None => cards
            .iter()
            .filter(|card| card.status == CardStatus::Active)
            .map(Selection::Card)
            .collect(),
    }
}

fn export_card(
    engine: &CardEngine,
    template: &CardTemplate,
    card: &CardRecord,
    options: &BatchOptions,
    compose_options: &ComposeOptions,
) -> ManifestEntry {
    let mut entry = ManifestEntry::new(&card.id);

    // Render phase. Nothing touches the output directory until every
    // requested artifact has its bytes.
    let scene = match engine.compose(template, card, compose_options) {
        Ok(scene) => scene,
        Err(err) => {
            let cause = err.to_string();
            engine.log().warn(&card.id, "export", &cause);
            entry.error = Some(cause);
            return entry;
        }
    };
    let pdf_bytes = pdf::scene_to_pdf(&scene, engine.log());
    let png_bytes = if options.write_png {
        match raster::render_scene_png(&scene, options.png_dpi, engine.fonts(), engine.log()) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                let cause = err.to_string();
                engine.log().warn(&card.id, "export", &cause);
                entry.error = Some(cause);
                return entry;
            }
        }
    } else {
        None
    };

    // Commit phase.
    match commit_artifact(&options.output_dir, &artifact_name(&card.id, "pdf"), &pdf_bytes) {
        Ok(path) => entry.pdf_path = Some(path),
        Err(err) => {
            let cause = err.to_string();
            engine.log().warn(&card.id, "export", &cause);
            entry.error = Some(cause);
            return entry;
        }
    }
    match png_bytes {
        Some(bytes) => {
            match commit_artifact(&options.output_dir, &artifact_name(&card.id, "png"), &bytes) {
                Ok(path) => entry.png_path = Some(path),
                Err(err) => {
                    let cause = err.to_string();
                    engine.log().warn(&card.id, "export", &cause);
                    entry.error = Some(cause);
                }
            }
        }
        None => {
            // A preview from an earlier run would now be stale next to
            // the fresh PDF.
            let _ = fs::remove_file(options.output_dir.join(artifact_name(&card.id, "png")));
        }
    }
    entry
}

/// `card_<id>.<ext>` with the identifier reduced to filename-safe
/// characters.
fn artifact_name(id: &str, extension: &str) -> String {
    let mut cleaned: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        cleaned.push_str("card");
    }
    format!("card_{cleaned}.{extension}")
}

struct TempGuard {
    path: PathBuf,
    committed: bool,
}

impl TempGuard {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Writes bytes to a hidden sibling, then renames it over the final name.
/// The rename is the swap: a previous artifact stays readable until the
/// new one fully replaces it, and a failed write leaves it untouched.
fn commit_artifact(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf, CardPressError> {
    let final_path = dir.join(name);
    let tmp_path = dir.join(format!(".{name}.tmp"));
    let guard = TempGuard::new(tmp_path.clone());
    fs::write(&tmp_path, bytes).map_err(|err| {
        CardPressError::ArtifactWrite(format!("write {}: {err}", tmp_path.display()))
    })?;
    fs::rename(&tmp_path, &final_path).map_err(|err| {
        CardPressError::ArtifactWrite(format!("rename {}: {err}", final_path.display()))
    })?;
    guard.commit();
    Ok(final_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "cardpress-batch-{tag}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn sample_cards() -> Vec<CardRecord> {
        let mut active = CardRecord::new("emp-a");
        active.person_name = "JUAN PÉREZ".to_string();
        active.id_number = "EMP-001".to_string();
        let mut draft = CardRecord::new("emp-b");
        draft.person_name = "ROSA LIMA".to_string();
        draft.status = CardStatus::Draft;
        let mut second = CardRecord::new("emp-c");
        second.person_name = "ANA DÍAZ".to_string();
        second.id_number = "EMP-003".to_string();
        vec![active, draft, second]
    }

    #[test]
    fn active_cards_export_by_default() {
        let dir = scratch_dir("active");
        let engine = CardEngine::new();
        let template = CardTemplate::cr80("Employee");
        let report = export_batch(
            &engine,
            &template,
            &sample_cards(),
            &BatchOptions::new(&dir),
        )
        .unwrap();

        assert_eq!(report.status, BatchStatus::Completed);
        assert_eq!(report.total, 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 0);
        let ids: Vec<&str> = report
            .entries
            .iter()
            .map(|entry| entry.card_id.as_str())
            .collect();
        assert_eq!(ids, ["emp-a", "emp-c"]);
        assert!(dir.join("card_emp-a.pdf").is_file());
        assert!(dir.join("card_emp-c.pdf").is_file());
        assert!(!dir.join("card_emp-b.pdf").exists());

        let manifest: serde_json::Value =
            serde_json::from_slice(&fs::read(dir.join("manifest.json")).unwrap()).unwrap();
        assert_eq!(manifest["status"], "completed");
        assert_eq!(manifest["entries"].as_array().unwrap().len(), 2);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn explicit_ids_keep_request_order_and_surface_unknowns() {
        let dir = scratch_dir("explicit");
        let engine = CardEngine::new();
        let template = CardTemplate::cr80("Employee");
        let mut options = BatchOptions::new(&dir);
        options.ids = Some(vec![
            "emp-c".to_string(),
            "ghost".to_string(),
            "emp-a".to_string(),
        ]);
        let report = export_batch(&engine, &template, &sample_cards(), &options).unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        let ids: Vec<&str> = report
            .entries
            .iter()
            .map(|entry| entry.card_id.as_str())
            .collect();
        assert_eq!(ids, ["emp-c", "ghost", "emp-a"]);
        assert!(report.entries[1].error.as_deref().unwrap().contains("unknown"));
        assert!(report.entries[0].error.is_none());
        assert!(dir.join("card_emp-a.pdf").is_file());
        assert!(!dir.join("card_ghost.pdf").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn unreadable_photo_still_produces_an_artifact() {
        let dir = scratch_dir("photo");
        let engine = CardEngine::new();
        let template = CardTemplate::cr80("Employee");
        let mut card = CardRecord::new("emp-a");
        card.person_name = "JUAN PÉREZ".to_string();
        card.photo = Some("/nonexistent/photo.png".to_string());
        let report =
            export_batch(&engine, &template, &[card], &BatchOptions::new(&dir)).unwrap();

        assert_eq!(report.succeeded, 1);
        assert!(report.entries[0].error.is_none());
        assert!(dir.join("card_emp-a.pdf").is_file());
        assert_eq!(engine.log().count("warn.photo"), 1);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn cancelled_batch_schedules_no_renders() {
        let dir = scratch_dir("cancel");
        let engine = CardEngine::new();
        let template = CardTemplate::cr80("Employee");
        let options = BatchOptions::new(&dir);
        options.cancel.cancel();
        let report = export_batch(&engine, &template, &sample_cards(), &options).unwrap();

        assert_eq!(report.status, BatchStatus::Cancelled);
        assert_eq!(report.total, 2);
        assert_eq!(report.cancelled, 2);
        assert!(report.entries.is_empty());
        assert!(!dir.join("card_emp-a.pdf").exists());
        assert!(!dir.join("card_emp-c.pdf").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn failed_swap_cleans_up_and_keeps_going() {
        let dir = scratch_dir("swap");
        // A directory squatting on the final name makes the rename fail.
        fs::create_dir_all(dir.join("card_emp-a.pdf")).unwrap();
        let engine = CardEngine::new();
        let template = CardTemplate::cr80("Employee");
        let mut options = BatchOptions::new(&dir);
        options.ids = Some(vec!["emp-a".to_string(), "emp-c".to_string()]);
        let report = export_batch(&engine, &template, &sample_cards(), &options).unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded, 1);
        assert!(report.entries[0].error.is_some());
        assert!(!dir.join(".card_emp-a.pdf.tmp").exists());
        assert!(dir.join("card_emp-c.pdf").is_file());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn png_preview_written_beside_the_pdf() {
        let dir = scratch_dir("preview");
        let engine = CardEngine::new();
        let template = CardTemplate::cr80("Employee");
        let mut options = BatchOptions::new(&dir);
        options.ids = Some(vec!["emp-a".to_string()]);
        options.write_png = true;
        options.png_dpi = 150;
        let report = export_batch(&engine, &template, &sample_cards(), &options).unwrap();

        let entry = &report.entries[0];
        assert!(entry.pdf_path.as_ref().unwrap().is_file());
        assert!(entry.png_path.as_ref().unwrap().is_file());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn stale_preview_removed_when_png_disabled() {
        let dir = scratch_dir("stale");
        let engine = CardEngine::new();
        let template = CardTemplate::cr80("Employee");
        let mut options = BatchOptions::new(&dir);
        options.ids = Some(vec!["emp-a".to_string()]);
        options.write_png = true;
        options.png_dpi = 150;
        export_batch(&engine, &template, &sample_cards(), &options).unwrap();
        assert!(dir.join("card_emp-a.png").is_file());

        options.write_png = false;
        export_batch(&engine, &template, &sample_cards(), &options).unwrap();
        assert!(dir.join("card_emp-a.pdf").is_file());
        assert!(!dir.join("card_emp-a.png").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn unusable_output_directory_fails_the_whole_batch() {
        let dir = scratch_dir("blocked");
        fs::create_dir_all(dir.parent().unwrap()).unwrap();
        fs::write(&dir, b"not a directory").unwrap();
        let engine = CardEngine::new();
        let template = CardTemplate::cr80("Employee");
        let result = export_batch(
            &engine,
            &template,
            &sample_cards(),
            &BatchOptions::new(&dir),
        );
        assert!(matches!(result, Err(CardPressError::ArtifactWrite(_))));

        let _ = fs::remove_file(&dir);
    }

    #[test]
    fn artifact_names_are_filename_safe() {
        assert_eq!(artifact_name("emp-a", "pdf"), "card_emp-a.pdf");
        assert_eq!(artifact_name("a/b c", "png"), "card_a-b-c.png");
        assert_eq!(artifact_name("", "pdf"), "card_card.pdf");
    }
}
