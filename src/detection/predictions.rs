use std::collections::HashMap;

use crate::models::{ObjectCount, Prediction};

/// Predictions scoring at or above `threshold`, in input order.
///
/// The iterator is lazy and `Clone`, so it can be walked more than once.
pub fn filter_by_threshold(
    predictions: &[Prediction],
    threshold: f32,
) -> impl Iterator<Item = &Prediction> + Clone {
    predictions
        .iter()
        .filter(move |prediction| prediction.score >= threshold)
}

/// Group predictions by class name and count each group.
///
/// Classes come out in order of first appearance. Classes without any
/// prediction never appear, so every count is at least one.
pub fn aggregate<'a, I>(predictions: I) -> Vec<ObjectCount>
where
    I: IntoIterator<Item = &'a Prediction>,
{
    let mut counts: Vec<ObjectCount> = Vec::new();
    let mut index: HashMap<&'a str, usize> = HashMap::new();

    for prediction in predictions {
        match index.get(prediction.class_name.as_str()) {
            Some(&i) => counts[i].count += 1,
            None => {
                index.insert(prediction.class_name.as_str(), counts.len());
                counts.push(ObjectCount::new(prediction.class_name.clone(), 1));
            }
        }
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingBox;

    fn prediction(class_name: &str, score: f32) -> Prediction {
        Prediction {
            class_name: class_name.to_string(),
            score,
            bbox: BoundingBox {
                xmin: 0.0,
                ymin: 0.0,
                xmax: 1.0,
                ymax: 1.0,
            },
        }
    }

    #[test]
    fn test_threshold_is_inclusive_and_keeps_order() {
        let predictions = vec![
            prediction("dog", 0.7),
            prediction("cat", 0.5),
            prediction("cat", 0.49),
            prediction("bird", 0.9),
        ];
        let kept: Vec<_> = filter_by_threshold(&predictions, 0.5)
            .map(|p| (p.class_name.as_str(), p.score))
            .collect();
        assert_eq!(kept, vec![("dog", 0.7), ("cat", 0.5), ("bird", 0.9)]);
    }

    #[test]
    fn test_filter_can_be_restarted() {
        let predictions = vec![prediction("cat", 0.9), prediction("dog", 0.1)];
        let valid = filter_by_threshold(&predictions, 0.5);
        assert_eq!(valid.clone().count(), 1);
        assert_eq!(valid.count(), 1);
    }

    #[test]
    fn test_nan_scores_never_pass() {
        let predictions = vec![prediction("cat", f32::NAN)];
        assert_eq!(filter_by_threshold(&predictions, 0.0).count(), 0);
    }

    #[test]
    fn test_aggregate_counts_each_class_once() {
        let predictions = vec![
            prediction("cat", 0.9),
            prediction("dog", 0.8),
            prediction("cat", 0.7),
            prediction("cat", 0.6),
            prediction("bird", 0.5),
        ];
        let counts = aggregate(&predictions);
        assert_eq!(
            counts,
            vec![
                ObjectCount::new("cat", 3),
                ObjectCount::new("dog", 1),
                ObjectCount::new("bird", 1),
            ]
        );
        let total: u64 = counts.iter().map(|c| c.count).sum();
        assert_eq!(total, predictions.len() as u64);
    }

    #[test]
    fn test_aggregate_is_deterministic() {
        let predictions: Vec<_> = ["b", "a", "c", "a", "b", "d"]
            .iter()
            .map(|name| prediction(name, 1.0))
            .collect();
        assert_eq!(aggregate(&predictions), aggregate(&predictions));
    }

    #[test]
    fn test_aggregate_of_nothing_is_empty() {
        let predictions = vec![prediction("cat", 0.1)];
        assert!(aggregate(filter_by_threshold(&predictions, 0.5)).is_empty());
    }
}
