//! Anchor selection policy.
//!
//! Anchors are runs whose zero-point we trust enough to hold fixed while the
//! network adjustment distributes everyone else around them. The policy is
//! band-dependent:
//!
//! - `r`/`i` (reference survey available): a run anchors when it is not
//!   denylisted, its night-to-night stability diffs sit inside the tolerance
//!   band around the expected systematic medians, and at least one positive
//!   trust signal applies (legacy anchor flag, extra-anchor list, trusted
//!   night, or tight two-band agreement with the reference survey).
//! - `ha` (no reference survey): stability alone decides; trust arrives
//!   transitively through the already-calibrated r band seed.
//!
//! Selection is a pure function of the metadata: no hidden state, fully
//! deterministic.

use log::info;

use crate::data::lists::StaticLists;
use crate::domain::{Band, Run, Thresholds};

/// Anchor flags parallel to `runs`.
pub fn select_anchors(
    band: Band,
    runs: &[Run],
    lists: &StaticLists,
    thresholds: &Thresholds,
) -> Vec<bool> {
    let flags: Vec<bool> = runs
        .iter()
        .map(|run| match band {
            Band::R | Band::I => reference_band_anchor(run, lists, thresholds),
            Band::Ha => run.stability.within(thresholds),
        })
        .collect();

    let count = flags.iter().filter(|&&a| a).count();
    info!("found {count} anchors among {} {band}-band runs", runs.len());
    flags
}

fn reference_band_anchor(run: &Run, lists: &StaticLists, thresholds: &Thresholds) -> bool {
    if lists.denylist.contains(&run.id) {
        return false;
    }
    if !run.stability.within(thresholds) {
        return false;
    }

    let trusted_night = run
        .night
        .map(|n| lists.trusted_nights.contains(&n))
        .unwrap_or(false);

    run.legacy_anchor
        || lists.extra_anchors.contains(&run.id)
        || trusted_night
        || reference_agreement(run, thresholds)
}

/// Tight agreement with the reference survey in both r and i at once:
/// enough matched stars, small shifts, and the two bands consistent with
/// each other.
fn reference_agreement(run: &Run, thresholds: &Thresholds) -> bool {
    let (Some(rshift), Some(ishift)) = (
        run.ref_r.usable(thresholds.min_matches),
        run.ref_i.usable(thresholds.min_matches),
    ) else {
        return false;
    };
    rshift.abs() <= thresholds.tolerance
        && ishift.abs() <= thresholds.tolerance
        && (rshift - ishift).abs() <= thresholds.tolerance
}
