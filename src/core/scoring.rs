use crate::models::{Feature, FeatureVector, Weights};

/// Calculate a compatibility score (0-1) for a feature vector
///
/// Scoring formula:
/// score = Σ weight[f] * feature[f]
///
/// over the seven features. Weights are expected to be normalized, the
/// result is clamped regardless.
pub fn calculate_score(features: &FeatureVector, weights: &Weights) -> f64 {
    let total: f64 = Feature::ALL
        .iter()
        .map(|f| contribution(features, weights, *f))
        .sum();

    if total.is_finite() {
        total.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Weighted contribution of a single feature to the score
#[inline]
pub fn contribution(features: &FeatureVector, weights: &Weights, feature: Feature) -> f64 {
    weights.get(feature) * features.get(feature)
}

/// Human-readable explanations for every feature whose weighted contribution
/// exceeds `threshold`, strongest first
pub fn explain(features: &FeatureVector, weights: &Weights, threshold: f64) -> Vec<String> {
    let mut significant: Vec<(Feature, f64)> = Feature::ALL
        .iter()
        .map(|f| (*f, contribution(features, weights, *f)))
        .filter(|(_, c)| *c > threshold)
        .collect();

    significant.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    significant
        .into_iter()
        .map(|(feature, _)| describe(feature, features))
        .collect()
}

fn describe(feature: Feature, features: &FeatureVector) -> String {
    let value = features.get(feature);
    match feature {
        Feature::CategoryMatch if value >= 1.0 => "Same category".to_string(),
        Feature::CategoryMatch => "Related category".to_string(),
        Feature::LocationProximity => match features.distance_km {
            Some(d) if d < 1.0 => "Less than 1 km away".to_string(),
            Some(d) => format!("Within {} km", d.ceil() as u64),
            None => "Location flexible".to_string(),
        },
        Feature::EnvironmentalImpact => "High environmental impact".to_string(),
        Feature::ConditionCompatibility => "Condition meets expectations".to_string(),
        Feature::ValueRangeOverlap => "Similar value range".to_string(),
        Feature::Urgency => "Urgent exchange".to_string(),
        Feature::UserCompatibility => "Reliable exchange partner".to_string(),
    }
}
