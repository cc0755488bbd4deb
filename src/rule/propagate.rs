//! Fixed-point application of rules on one board.

use super::{MatchState, PatternRule};
use crate::board::{BoardRegistry, PatternBoard};
use crate::feature::{FeatureSet, IncompatibleFeature};
use std::sync::Arc;

/// Every non-trivial image of `rules` on `target`, in rule order then
/// embedding order.
pub fn embedded_rules<'a>(
    registry: &BoardRegistry,
    rules: impl IntoIterator<Item = &'a PatternRule>,
    target: &Arc<PatternBoard>,
) -> Vec<PatternRule> {
    let mut result = Vec::new();
    for rule in rules {
        for embedding in registry.embeddings(rule.board(), target).iter() {
            match rule.embedded(target, embedding) {
                Some(image) if !image.is_trivial() => result.push(image),
                Some(_) => {}
                None => tracing::trace!("embedding cannot carry rule"),
            }
        }
    }
    result
}

/// Applies `rules` (all on one board) until none is actionable or `stop`
/// holds.
///
/// Each pass scans the rules in order and applies every actionable one.
/// Returns the contradiction if the state becomes unsatisfiable.
pub fn apply_to_fixed_point(
    rules: &[PatternRule],
    initial: FeatureSet,
    stop: impl Fn(&FeatureSet) -> bool,
) -> Result<FeatureSet, IncompatibleFeature> {
    let mut state = initial;
    loop {
        if stop(&state) {
            return Ok(state);
        }
        let mut applied = false;
        for rule in rules {
            if rule.get_match_state(&state) == MatchState::Actionable {
                rule.apply(&mut state)?;
                applied = true;
                if stop(&state) {
                    return Ok(state);
                }
            }
        }
        if !applied {
            return Ok(state);
        }
    }
}
