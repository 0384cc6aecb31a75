//! Finding failed screenshots that differ from their references in the
//! same way as a selected one.
//!
//! The pixel comparison itself is delegated to an [`ImageComparator`].
//! Candidates are first narrowed to images whose diff clusters have the
//! same dimensions as the selected image's; each cluster is then compared
//! on both the expected and the actual screenshot.

use crate::error::Result;
use crate::model::{CoordBounds, ImageInfo};
use crate::tree::builder::{BrowserImage, TestsTreeBuilder};
use tracing::debug;

/// Comparison tolerances passed through to the comparator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompareOptions {
    pub tolerance: f64,
    pub antialiasing_tolerance: f64,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            tolerance: 2.3,
            antialiasing_tolerance: 4.0,
        }
    }
}

/// A rectangle of a screenshot file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRegion<'a> {
    pub path: &'a str,
    pub bounds: CoordBounds,
}

/// Near-equality oracle for two screenshot regions.
pub trait ImageComparator {
    /// # Errors
    ///
    /// Returns an error if either image cannot be read.
    fn compare(
        &self,
        left: &ImageRegion<'_>,
        right: &ImageRegion<'_>,
        options: &CompareOptions,
    ) -> Result<bool>;
}

impl<F> ImageComparator for F
where
    F: Fn(&ImageRegion<'_>, &ImageRegion<'_>, &CompareOptions) -> Result<bool>,
{
    fn compare(
        &self,
        left: &ImageRegion<'_>,
        right: &ImageRegion<'_>,
        options: &CompareOptions,
    ) -> Result<bool> {
        self(left, right, options)
    }
}

/// Same number of clusters with pairwise equal dimensions.
#[must_use]
pub fn same_cluster_sizes(left: &[CoordBounds], right: &[CoordBounds]) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .zip(right)
            .all(|(a, b)| a.width() == b.width() && a.height() == b.height())
}

fn paths(info: &ImageInfo) -> Option<(&str, &str)> {
    Some((
        info.expected_img.as_ref()?.path.as_str(),
        info.actual_img.as_ref()?.path.as_str(),
    ))
}

fn regions_equal<C: ImageComparator + ?Sized>(
    selected: &ImageInfo,
    candidate: &ImageInfo,
    comparator: &C,
    options: &CompareOptions,
) -> Result<bool> {
    let (Some((sel_expected, sel_actual)), Some((cand_expected, cand_actual))) =
        (paths(selected), paths(candidate))
    else {
        return Ok(false);
    };

    for (sel_bounds, cand_bounds) in selected.diff_clusters.iter().zip(&candidate.diff_clusters) {
        for (sel_path, cand_path) in [(sel_expected, cand_expected), (sel_actual, cand_actual)] {
            let left = ImageRegion {
                path: sel_path,
                bounds: *sel_bounds,
            };
            let right = ImageRegion {
                path: cand_path,
                bounds: *cand_bounds,
            };
            if !comparator.compare(&left, &right, options)? {
                return Ok(false);
            }
        }
    }

    Ok(true)
}

/// Ids of `candidates` whose diffs match `selected`'s.
///
/// # Errors
///
/// Propagates comparator errors.
pub fn find_equal_diffs<C: ImageComparator + ?Sized>(
    selected: &BrowserImage,
    candidates: &[BrowserImage],
    comparator: &C,
    options: &CompareOptions,
) -> Result<Vec<String>> {
    let mut equal = Vec::new();

    for candidate in candidates {
        if candidate.image.id == selected.image.id {
            continue;
        }
        if !same_cluster_sizes(
            &selected.image.info.diff_clusters,
            &candidate.image.info.diff_clusters,
        ) {
            continue;
        }
        if regions_equal(&selected.image.info, &candidate.image.info, comparator, options)? {
            equal.push(candidate.image.id.clone());
        }
    }

    debug!(
        selected = %selected.image.id,
        candidates = candidates.len(),
        equal = equal.len(),
        "Searched for equal diffs"
    );

    Ok(equal)
}

impl TestsTreeBuilder {
    /// Equal-diff search over tree images; the first id is the selected one.
    ///
    /// # Errors
    ///
    /// Returns not-found errors for unknown ids and propagates comparator errors.
    pub fn find_equal_diffs<S, C>(
        &self,
        image_ids: &[S],
        comparator: &C,
        options: &CompareOptions,
    ) -> Result<Vec<String>>
    where
        S: AsRef<str>,
        C: ImageComparator + ?Sized,
    {
        let images = self.get_image_data_to_find_equal_diffs(image_ids)?;
        let Some((selected, candidates)) = images.split_first() else {
            return Ok(Vec::new());
        };
        find_equal_diffs(selected, candidates, comparator, options)
    }
}
