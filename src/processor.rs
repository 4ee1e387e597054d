//! Extraction pipeline orchestrator.
//!
//! Walks a list of image references strictly sequentially: pull, inspect,
//! run the inventory payload, parse and reconcile the captured sections,
//! and write one XML document per image. Failures are isolated per image;
//! a bad image is logged and skipped, never aborting the batch.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::collections::parse_collections_merged;
use crate::container::ContainerEngine;
use crate::document::InventoryDocument;
use crate::naming;
use crate::parsers::{parse_python_packages, parse_rpm_lines};
use crate::script::{split_sections, INVENTORY_SCRIPT};

/// Outcome counts for one batch run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
}

pub struct InventoryProcessor<E: ContainerEngine> {
    engine: E,
    keep_images: bool,
}

impl<E: ContainerEngine> InventoryProcessor<E> {
    pub fn new(engine: E, keep_images: bool) -> Self {
        Self { engine, keep_images }
    }

    /// Process every image in order, writing one XML file per image into
    /// `out_dir`. Per-image failures are logged and counted as skipped.
    pub fn process_all(
        &self,
        images: &[String],
        out_dir: &Path,
        beautiful_progress: bool,
    ) -> Result<BatchSummary> {
        fs::create_dir_all(out_dir)
            .with_context(|| format!("Failed to create output directory {}", out_dir.display()))?;
        debug!(
            "Processing {} image(s) with the {} engine",
            images.len(),
            self.engine.name()
        );

        let progress = if beautiful_progress {
            let style = ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}/{len:3} {msg}",
                )
                .unwrap()
                .progress_chars("=> ");
            let bar = ProgressBar::new(images.len() as u64);
            bar.set_style(style);
            Some(bar)
        } else {
            None
        };

        let mut summary = BatchSummary::default();
        for image in images {
            if let Some(bar) = &progress {
                bar.set_message(image.clone());
            } else {
                info!("Processing {}", image);
            }

            match self.process_image(image, out_dir) {
                Ok(path) => {
                    summary.processed += 1;
                    if progress.is_none() {
                        info!("Wrote {}", path.display());
                    }
                }
                Err(err) => {
                    summary.skipped += 1;
                    warn!("Skipping {}: {:#}", image, err);
                }
            }

            if let Some(bar) = &progress {
                bar.inc(1);
            }
        }

        if let Some(bar) = &progress {
            bar.finish_with_message(format!(
                "{} processed, {} skipped",
                summary.processed, summary.skipped
            ));
        } else {
            info!(
                "All done: {} processed, {} skipped",
                summary.processed, summary.skipped
            );
        }
        Ok(summary)
    }

    /// Run the full extraction for one image, returning the written path.
    fn process_image(&self, image: &str, out_dir: &Path) -> Result<PathBuf> {
        self.engine.pull(image)?;

        // Inspect trouble degrades to empty metadata; the inventory itself
        // is still worth writing.
        let meta = self.engine.inspect(image).unwrap_or_default();

        let raw = match self.engine.run_inventory(image, INVENTORY_SCRIPT) {
            Ok(raw) => raw,
            Err(err) => {
                if !self.keep_images {
                    self.engine.remove(image);
                }
                return Err(err);
            }
        };

        let sections = split_sections(&raw);
        if sections.rpms.is_missing() {
            debug!("No RPM section captured from {}", image);
        }

        let rpms = parse_rpm_lines(sections.rpms.text());
        let (python, pip_format) = parse_python_packages(sections.python.text());
        debug!(
            "{}: {} rpms, {} python packages ({:?} listing)",
            image,
            rpms.len(),
            python.len(),
            pip_format
        );
        let collections = parse_collections_merged(sections.collections.text());

        let document = InventoryDocument::build(image, &meta, rpms, python, collections);

        let stem = naming::file_stem_for_image(image);
        let path = out_dir.join(format!("{}.xml", naming::sanitize_filename(&stem)));
        document.save(&path)?;

        if !self.keep_images {
            self.engine.remove(image);
        }
        Ok(path)
    }
}
