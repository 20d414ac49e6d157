//! Position-based split of a batch into dummy and data frames.
//!
//! The exposure sequence is a block of warm-up shots followed by alternating
//! shots; only specific positions carry measurements, one per tube channel in
//! channel order. The rule is stored as an explicit list of kept positions so
//! it can be checked independently of the iteration loop.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::IntakeError;

/// Which positions of a batch are data frames.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRule {
    /// Number of files consumed per batch.
    pub total: usize,
    /// Strictly increasing positions (< `total`) that hold data frames.
    pub keep: Vec<usize>,
}

impl ClassificationRule {
    /// `leading` warm-up frames, then alternating data/dummy.
    ///
    /// Past the leading block, odd positions are kept and even positions are
    /// discarded, so with 25 files and 11 leading dummies the kept positions
    /// are 11, 13, ..., 23.
    pub fn leading_then_alternating(total: usize, leading: usize) -> Self {
        let keep = (leading..total).filter(|i| i % 2 == 1).collect();
        Self { total, keep }
    }

    /// Explicit keep list.
    pub fn from_keep_positions(total: usize, keep: Vec<usize>) -> Result<Self, IntakeError> {
        let rule = Self { total, keep };
        rule.validate()?;
        Ok(rule)
    }

    pub fn validate(&self) -> Result<(), IntakeError> {
        if let Some(&last) = self.keep.last() {
            if last >= self.total {
                return Err(IntakeError::InvalidRule(format!(
                    "keep position {last} is outside a batch of {} files",
                    self.total
                )));
            }
        }
        if self.keep.windows(2).any(|w| w[0] >= w[1]) {
            return Err(IntakeError::InvalidRule(
                "keep positions must be strictly increasing".to_string(),
            ));
        }
        Ok(())
    }

    pub fn data_count(&self) -> usize {
        self.keep.len()
    }

    pub fn is_kept(&self, position: usize) -> bool {
        self.keep.binary_search(&position).is_ok()
    }
}

/// One classified batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// One frame per tube channel, in channel order.
    pub data: Vec<PathBuf>,
    /// Warm-up and interleaved dummy frames.
    pub discard: Vec<PathBuf>,
}

impl Batch {
    /// Every file the batch consumed: discarded files first, then data files.
    pub fn consumed(&self) -> impl Iterator<Item = &PathBuf> {
        self.discard.iter().chain(self.data.iter())
    }

    pub fn len(&self) -> usize {
        self.data.len() + self.discard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Apply `rule` to the first `rule.total` files.
///
/// Files past `rule.total` are not part of the batch and are left alone.
pub fn classify(
    files: &[PathBuf],
    rule: &ClassificationRule,
    tube_count: usize,
) -> Result<Batch, IntakeError> {
    rule.validate()?;
    if files.len() < rule.total {
        return Err(IntakeError::BatchShapeError {
            reason: format!(
                "batch needs {} files, only {} available",
                rule.total,
                files.len()
            ),
        });
    }
    if files.len() > rule.total {
        log::warn!(
            "{} extra file(s) beyond the expected {} are left in place",
            files.len() - rule.total,
            rule.total
        );
    }

    let mut batch = Batch::default();
    for (i, path) in files.iter().take(rule.total).enumerate() {
        if rule.is_kept(i) {
            batch.data.push(path.clone());
        } else {
            batch.discard.push(path.clone());
        }
    }

    if batch.data.len() != tube_count {
        return Err(IntakeError::BatchShapeError {
            reason: format!(
                "classification kept {} data files for {} tubes",
                batch.data.len(),
                tube_count
            ),
        });
    }

    log::debug!(
        "classified batch: {} data, {} discarded",
        batch.data.len(),
        batch.discard.len()
    );
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("{i}.raw"))).collect()
    }

    #[test]
    fn default_rule_keeps_seven_of_twenty_five() {
        let rule = ClassificationRule::leading_then_alternating(25, 11);
        assert_eq!(rule.keep, vec![11, 13, 15, 17, 19, 21, 23]);

        let batch = classify(&numbered(25), &rule, 7).expect("classify");
        let kept: Vec<_> = batch
            .data
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            kept,
            vec!["11.raw", "13.raw", "15.raw", "17.raw", "19.raw", "21.raw", "23.raw"]
        );
        assert_eq!(batch.discard.len(), 18);
        assert!(batch.discard[..11]
            .iter()
            .zip(numbered(11))
            .all(|(a, b)| *a == b));
        assert_eq!(batch.len(), 25);
    }

    #[test]
    fn wrong_tube_count_is_a_shape_error() {
        let rule = ClassificationRule::leading_then_alternating(25, 11);
        let err = classify(&numbered(25), &rule, 6).unwrap_err();
        assert!(matches!(err, IntakeError::BatchShapeError { .. }));
    }

    #[test]
    fn short_batch_is_a_shape_error() {
        let rule = ClassificationRule::leading_then_alternating(25, 11);
        let err = classify(&numbered(24), &rule, 7).unwrap_err();
        assert!(matches!(err, IntakeError::BatchShapeError { .. }));
    }

    #[test]
    fn extra_files_are_not_consumed() {
        let rule = ClassificationRule::leading_then_alternating(25, 11);
        let files = numbered(27);
        let batch = classify(&files, &rule, 7).expect("classify");
        assert!(!batch.consumed().any(|p| *p == files[25] || *p == files[26]));
    }

    #[test]
    fn explicit_keep_list_is_validated() {
        assert!(ClassificationRule::from_keep_positions(5, vec![1, 3]).is_ok());
        assert!(ClassificationRule::from_keep_positions(5, vec![3, 1]).is_err());
        assert!(ClassificationRule::from_keep_positions(5, vec![1, 5]).is_err());
    }
}
