//! Merging trees produced by independent shards.
//!
//! Sources are folded in order. The first source to introduce a suite or
//! browser owns its metadata; results of later sources are appended after
//! the attempts already merged, with the attempt suffix of their screenshot
//! paths rewritten to match. A result whose content is identical to one
//! already merged for the same browser is a collision: it is skipped and
//! logged, never overwritten.

use crate::error::Result;
use crate::model::{ImageFile, ImageInfo, ResultNode, Tree, UNKNOWN_BROWSER_VERSION};
use crate::util::{hash_parts, id, replace_attempt_in_path};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Kind of entity involved in a merge collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionKind {
    Result,
    BrowserVersion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeCollision {
    pub kind: CollisionKind,
    pub id: String,
    pub source_index: usize,
}

/// A screenshot that must be moved because its attempt changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathRename {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    pub sources: usize,
    pub merged_results: usize,
    pub collisions: Vec<MergeCollision>,
    pub renamed_paths: Vec<PathRename>,
}

/// Content fingerprint of a result: everything except its position.
fn fingerprint(source: &Tree, result: &ResultNode) -> Result<String> {
    let content = ResultNode {
        id: String::new(),
        parent_id: String::new(),
        image_ids: Vec::new(),
        attempt: 0,
        ..result.clone()
    };
    let images: Vec<&ImageInfo> = result
        .image_ids
        .iter()
        .filter_map(|image_id| source.images.get(image_id))
        .map(|image| &image.info)
        .collect();

    Ok(hash_parts(&[
        serde_json::to_string(&content)?,
        serde_json::to_string(&images)?,
    ]))
}

fn renumber(file: &mut Option<ImageFile>, attempt: u32, renames: &mut Vec<PathRename>) {
    if let Some(file) = file {
        let renamed = replace_attempt_in_path(&file.path, attempt);
        if renamed != file.path {
            renames.push(PathRename {
                from: file.path.clone(),
                to: renamed.clone(),
            });
            file.path = renamed;
        }
    }
}

/// Merge `sources` into one tree, sorted and with statuses aggregated.
///
/// # Errors
///
/// Returns an error only if a source is internally inconsistent in a way
/// that prevents inserting its nodes.
pub fn merge_trees(sources: &[Tree]) -> Result<(Tree, MergeReport)> {
    let mut merged = Tree::new();
    let mut report = MergeReport {
        sources: sources.len(),
        ..MergeReport::default()
    };
    let mut fingerprints: HashMap<String, HashSet<String>> = HashMap::new();

    for (source_index, source) in sources.iter().enumerate() {
        for browser in source.browsers.iter() {
            let Some(suite) = source.suites.get(&browser.parent_id) else {
                warn!(
                    browser_id = %browser.id,
                    source_index,
                    "Browser has no suite in source, skipping"
                );
                continue;
            };

            let suite_id = merged.upsert_suite_path(suite.suite_path.as_slice())?;
            let existing_version = merged
                .browsers
                .get(&browser.id)
                .map(|existing| existing.version.clone());
            let browser_id = match existing_version {
                Some(version) if version != UNKNOWN_BROWSER_VERSION => {
                    if browser.version != UNKNOWN_BROWSER_VERSION && browser.version != version {
                        warn!(
                            browser_id = %browser.id,
                            kept = %version,
                            ignored = %browser.version,
                            source_index,
                            "Browser version differs between sources, keeping first"
                        );
                        report.collisions.push(MergeCollision {
                            kind: CollisionKind::BrowserVersion,
                            id: browser.id.clone(),
                            source_index,
                        });
                    }
                    browser.id.clone()
                }
                _ => merged.upsert_browser(&suite_id, &browser.name, &browser.version)?,
            };

            for result_id in &browser.result_ids {
                let Some(result) = source.results.get(result_id) else {
                    continue;
                };

                let print = fingerprint(source, result)?;
                let seen = fingerprints.entry(browser_id.clone()).or_default();
                if !seen.insert(print) {
                    warn!(
                        result_id = %result_id,
                        source_index,
                        "Result already merged from an earlier source, keeping first"
                    );
                    report.collisions.push(MergeCollision {
                        kind: CollisionKind::Result,
                        id: result_id.clone(),
                        source_index,
                    });
                    continue;
                }

                let attempt = match merged.latest_result(&browser_id) {
                    Some(last) => result
                        .attempt
                        .max(id::next_attempt(&browser_id, last.attempt)?),
                    None => result.attempt,
                };
                let new_result_id = id::result_id(&browser_id, attempt);

                merged.upsert_result(ResultNode {
                    id: new_result_id.clone(),
                    parent_id: browser_id.clone(),
                    image_ids: Vec::new(),
                    attempt,
                    ..result.clone()
                })?;

                let key_prefix = format!("{result_id}{}", id::ID_DELIMITER);
                for image_id in &result.image_ids {
                    let Some(image) = source.images.get(image_id) else {
                        continue;
                    };
                    let key = image_id.strip_prefix(&key_prefix).unwrap_or(image_id);
                    let mut info = image.info.clone();
                    if attempt != result.attempt {
                        renumber(&mut info.expected_img, attempt, &mut report.renamed_paths);
                        renumber(&mut info.actual_img, attempt, &mut report.renamed_paths);
                        renumber(&mut info.diff_img, attempt, &mut report.renamed_paths);
                    }
                    merged.upsert_image(&new_result_id, key, info)?;
                }

                debug!(
                    from = %result_id,
                    to = %new_result_id,
                    source_index,
                    "Merged result"
                );
                report.merged_results += 1;
            }
        }
    }

    merged.recompute_all();
    merged.sort_tree();

    info!(
        sources = report.sources,
        results = report.merged_results,
        collisions = report.collisions.len(),
        "Merged report trees"
    );

    Ok((merged, report))
}
