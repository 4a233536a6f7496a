//! Binary classification metrics and the F1 threshold sweep.

use serde::{Deserialize, Serialize};

pub const THRESHOLD_MIN: f64 = 0.05;
pub const THRESHOLD_MAX: f64 = 0.95;
pub const THRESHOLD_CANDIDATES: usize = 181;
pub const DEFAULT_THRESHOLD: f64 = 0.5;

const LOG_LOSS_EPS: f64 = 1e-15;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionCounts {
    pub tn: u64,
    pub fp: u64,
    pub fn_: u64,
    pub tp: u64,
}

impl ConfusionCounts {
    pub fn from_predictions(labels: &[bool], predicted: impl IntoIterator<Item = bool>) -> Self {
        let mut counts = Self::default();
        for (&actual, guess) in labels.iter().zip(predicted) {
            match (actual, guess) {
                (false, false) => counts.tn += 1,
                (false, true) => counts.fp += 1,
                (true, false) => counts.fn_ += 1,
                (true, true) => counts.tp += 1,
            }
        }
        counts
    }

    pub fn at_threshold(labels: &[bool], probabilities: &[f64], threshold: f64) -> Self {
        Self::from_predictions(labels, probabilities.iter().map(|p| *p >= threshold))
    }

    pub fn total(&self) -> u64 {
        self.tn + self.fp + self.fn_ + self.tp
    }

    /// Rows are the actual class (fail, pass), columns the predicted class.
    pub fn as_matrix(&self) -> [[u64; 2]; 2] {
        [[self.tn, self.fp], [self.fn_, self.tp]]
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn f1(&self) -> f64 {
        ratio(2 * self.tp, 2 * self.tp + self.fp + self.fn_)
    }

    /// Mean per-class recall over the classes present in the labels.
    pub fn balanced_accuracy(&self) -> f64 {
        let positives = self.tp + self.fn_;
        let negatives = self.tn + self.fp;
        let mut recalls = Vec::with_capacity(2);
        if positives > 0 {
            recalls.push(ratio(self.tp, positives));
        }
        if negatives > 0 {
            recalls.push(ratio(self.tn, negatives));
        }
        if recalls.is_empty() {
            return 0.0;
        }
        recalls.iter().sum::<f64>() / recalls.len() as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdChoice {
    pub threshold: f64,
    pub f1: f64,
}

/// The evenly spaced cutoffs `0.05, 0.055, ..., 0.95`.
pub fn threshold_candidates() -> impl Iterator<Item = f64> {
    let step = (THRESHOLD_MAX - THRESHOLD_MIN) / (THRESHOLD_CANDIDATES - 1) as f64;
    (0..THRESHOLD_CANDIDATES).map(move |idx| THRESHOLD_MIN + idx as f64 * step)
}

/// Linear sweep for the cutoff with the highest F1.
///
/// Only a strictly better F1 replaces the incumbent, so ties keep the lowest
/// cutoff, and a sweep where every candidate scores zero keeps 0.5.
pub fn best_f1_threshold(labels: &[bool], probabilities: &[f64]) -> ThresholdChoice {
    let mut best = ThresholdChoice {
        threshold: DEFAULT_THRESHOLD,
        f1: 0.0,
    };
    for threshold in threshold_candidates() {
        let f1 = ConfusionCounts::at_threshold(labels, probabilities, threshold).f1();
        if f1 > best.f1 {
            best = ThresholdChoice { threshold, f1 };
        }
    }
    best
}

/// Area under the ROC curve via the rank-sum statistic, averaging tied ranks.
///
/// Returns `None` when the labels hold a single class.
pub fn roc_auc(labels: &[bool], scores: &[f64]) -> Option<f64> {
    let positives = labels.iter().filter(|l| **l).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len().min(labels.len())).collect();
    order.sort_by(|a, b| scores[*a].total_cmp(&scores[*b]));

    let mut positive_rank_sum = 0.0;
    let mut idx = 0;
    while idx < order.len() {
        let mut end = idx + 1;
        while end < order.len() && scores[order[end]] == scores[order[idx]] {
            end += 1;
        }
        // ranks are 1-based; the tie group spans ranks idx+1..=end
        let avg_rank = (idx + 1 + end) as f64 / 2.0;
        for &row in &order[idx..end] {
            if labels[row] {
                positive_rank_sum += avg_rank;
            }
        }
        idx = end;
    }

    let p = positives as f64;
    let n = negatives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}

/// Weighted binary cross-entropy with probabilities clipped away from 0 and 1.
pub fn log_loss(labels: &[bool], probabilities: &[f64], weights: &[f64]) -> f64 {
    let mut total = 0.0;
    let mut weight_sum = 0.0;
    for ((label, p), w) in labels.iter().zip(probabilities).zip(weights) {
        let p = p.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS);
        let loss = if *label { -p.ln() } else { -(1.0 - p).ln() };
        total += w * loss;
        weight_sum += w;
    }
    if weight_sum == 0.0 {
        0.0
    } else {
        total / weight_sum
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn candidates_span_the_closed_interval() {
        let all: Vec<f64> = threshold_candidates().collect();
        assert_eq!(all.len(), 181);
        assert_close(all[0], 0.05);
        assert_close(all[1], 0.055);
        assert_close(all[90], 0.5);
        assert_close(all[180], 0.95);
    }

    #[test]
    fn confusion_counts_and_derived_scores() {
        let labels = [true, true, true, false, false, false];
        let probs = [0.9, 0.8, 0.3, 0.6, 0.2, 0.1];
        let counts = ConfusionCounts::at_threshold(&labels, &probs, 0.5);

        assert_eq!(counts.as_matrix(), [[2, 1], [1, 2]]);
        assert_close(counts.accuracy(), 4.0 / 6.0);
        assert_close(counts.precision(), 2.0 / 3.0);
        assert_close(counts.recall(), 2.0 / 3.0);
        assert_close(counts.f1(), 2.0 / 3.0);
        assert_close(counts.balanced_accuracy(), 2.0 / 3.0);
    }

    #[test]
    fn zero_division_scores_are_zero() {
        let labels = [false, false];
        let counts = ConfusionCounts::at_threshold(&labels, &[0.1, 0.2], 0.5);
        assert_eq!(counts.precision(), 0.0);
        assert_eq!(counts.recall(), 0.0);
        assert_eq!(counts.f1(), 0.0);
        assert_eq!(counts.balanced_accuracy(), 1.0);
    }

    #[test]
    fn sweep_picks_lowest_cutoff_reaching_the_best_f1() {
        let labels = [true, true, false, false];
        let probs = [0.72, 0.64, 0.312, 0.12];
        let choice = best_f1_threshold(&labels, &probs);

        assert_close(choice.f1, 1.0);
        // first candidate above 0.312 is 0.315
        assert_close(choice.threshold, 0.315);
    }

    #[test]
    fn sweep_keeps_default_when_nothing_scores() {
        let labels = [false, false, false];
        let probs = [0.9, 0.8, 0.7];
        let choice = best_f1_threshold(&labels, &probs);
        assert_close(choice.threshold, 0.5);
        assert_eq!(choice.f1, 0.0);
    }

    #[test]
    fn roc_auc_handles_ties_and_single_class() {
        let labels = [true, false, true, false];
        assert_close(roc_auc(&labels, &[0.9, 0.1, 0.8, 0.2]).unwrap(), 1.0);
        assert_close(roc_auc(&labels, &[0.5, 0.5, 0.5, 0.5]).unwrap(), 0.5);
        assert_close(roc_auc(&labels, &[0.9, 0.85, 0.3, 0.1]).unwrap(), 0.75);
        assert!(roc_auc(&[true, true], &[0.1, 0.2]).is_none());
    }

    #[test]
    fn log_loss_respects_weights() {
        let labels = [true, false];
        let probs = [0.8, 0.4];
        let unweighted = log_loss(&labels, &probs, &[1.0, 1.0]);
        let expected = (-(0.8f64).ln() - (0.6f64).ln()) / 2.0;
        assert_close(unweighted, expected);

        let weighted = log_loss(&labels, &probs, &[3.0, 1.0]);
        let expected_weighted = (3.0 * -(0.8f64).ln() - (0.6f64).ln()) / 4.0;
        assert_close(weighted, expected_weighted);
    }
}
