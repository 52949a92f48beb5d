//! Score rules the prompts ask the model to follow.
//!
//! The model self-reports `compliance_score`. Nothing recomputes it; these checks only
//! detect where the reported numbers contradict the stated rules and, when configured
//! to, clamp them.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Highest score allowed for a product with a blocking issue or a missed mandatory
/// requirement.
pub const BLOCKING_SCORE_CAP: f64 = 70.0;

/// Lowest score allowed for a product the model says exists in the catalog.
pub const CATALOG_MATCH_FLOOR: f64 = 60.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScorePolicy {
    /// Pass the model's numbers through; violations are only logged.
    #[default]
    Trust,
    /// Clamp scores into the range the rules allow.
    Enforce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreRule {
    OutOfRange,
    BlockedAboveCap,
    CatalogMatchBelowFloor,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreViolation {
    pub product_id: String,
    pub reported: f64,
    pub rule: ScoreRule,
}

/// A per-product result carrying a self-reported score.
pub trait ScoredProduct {
    fn product_id(&self) -> &str;
    fn score(&self) -> f64;
    fn set_score(&mut self, score: f64);
    fn blocking_issues(&self) -> &[String];

    /// `Some(true)` when the model claims the product is in the catalog.
    fn found_in_catalog(&self) -> Option<bool> {
        None
    }
}

/// List the rule violations in `products`. `mandatory_gap` tells whether a product
/// missed a mandatory requirement in the per-requirement breakdown.
pub fn find_violations<P, G>(products: &[P], mandatory_gap: G) -> Vec<ScoreViolation>
where
    P: ScoredProduct,
    G: Fn(&P) -> bool,
{
    let mut violations = Vec::new();
    for product in products {
        let score = product.score();
        let mut flag = |rule| {
            violations.push(ScoreViolation {
                product_id: product.product_id().to_string(),
                reported: score,
                rule,
            })
        };

        if !(0.0..=100.0).contains(&score) {
            flag(ScoreRule::OutOfRange);
        }
        let blocked = !product.blocking_issues().is_empty() || mandatory_gap(product);
        if blocked && score > BLOCKING_SCORE_CAP {
            flag(ScoreRule::BlockedAboveCap);
        }
        if product.found_in_catalog() == Some(true) && score < CATALOG_MATCH_FLOOR {
            flag(ScoreRule::CatalogMatchBelowFloor);
        }
    }
    violations
}

/// Check `products` against the rules, log what is wrong and, under
/// [`ScorePolicy::Enforce`], clamp the offending scores in place.
pub fn review_scores<P, G>(
    policy: ScorePolicy,
    products: &mut [P],
    mandatory_gap: G,
) -> Vec<ScoreViolation>
where
    P: ScoredProduct,
    G: Fn(&P) -> bool,
{
    let violations = find_violations(products, &mandatory_gap);

    for violation in &violations {
        warn!(
            product_id = %violation.product_id,
            reported = violation.reported,
            rule = ?violation.rule,
            ?policy,
            "Model score contradicts scoring rules"
        );
    }

    if policy == ScorePolicy::Enforce && !violations.is_empty() {
        for product in products.iter_mut() {
            let mut score = product.score().clamp(0.0, 100.0);
            if !product.blocking_issues().is_empty() || mandatory_gap(&*product) {
                score = score.min(BLOCKING_SCORE_CAP);
            }
            if product.found_in_catalog() == Some(true) {
                score = score.max(CATALOG_MATCH_FLOOR);
            }
            product.set_score(score);
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Item {
        id: &'static str,
        score: f64,
        issues: Vec<String>,
        in_catalog: Option<bool>,
    }

    impl ScoredProduct for Item {
        fn product_id(&self) -> &str {
            self.id
        }
        fn score(&self) -> f64 {
            self.score
        }
        fn set_score(&mut self, score: f64) {
            self.score = score;
        }
        fn blocking_issues(&self) -> &[String] {
            &self.issues
        }
        fn found_in_catalog(&self) -> Option<bool> {
            self.in_catalog
        }
    }

    fn item(id: &'static str, score: f64, issues: &[&str], in_catalog: Option<bool>) -> Item {
        Item {
            id,
            score,
            issues: issues.iter().map(|s| s.to_string()).collect(),
            in_catalog,
        }
    }

    #[test]
    fn clean_scores_have_no_violations() {
        let items = [
            item("a", 95.0, &[], Some(true)),
            item("b", 65.0, &["220V only"], Some(true)),
            item("c", 0.0, &[], Some(false)),
        ];
        assert!(find_violations(&items, |_| false).is_empty());
    }

    #[test]
    fn detects_each_rule() {
        let items = [
            item("blocked", 100.0, &["no neonatal mode"], None),
            item("floor", 0.0, &[], Some(true)),
            item("range", 140.0, &[], None),
        ];
        let rules: Vec<_> = find_violations(&items, |_| false)
            .into_iter()
            .map(|v| (v.product_id, v.rule))
            .collect();
        assert_eq!(
            rules,
            vec![
                ("blocked".to_string(), ScoreRule::BlockedAboveCap),
                ("floor".to_string(), ScoreRule::CatalogMatchBelowFloor),
                ("range".to_string(), ScoreRule::OutOfRange),
            ]
        );
    }

    #[test]
    fn mandatory_gap_counts_as_blocked() {
        let items = [item("gap", 90.0, &[], None)];
        let violations = find_violations(&items, |p| p.id == "gap");
        assert_eq!(violations[0].rule, ScoreRule::BlockedAboveCap);
    }

    #[test]
    fn trust_leaves_scores_untouched() {
        let mut items = [item("a", 100.0, &["missing battery"], None)];
        let violations = review_scores(ScorePolicy::Trust, &mut items, |_| false);
        assert_eq!(violations.len(), 1);
        assert_eq!(items[0].score, 100.0);
    }

    #[test]
    fn enforce_clamps_into_allowed_range() {
        let mut items = [
            item("capped", 100.0, &["missing battery"], None),
            item("floored", 10.0, &[], Some(true)),
            item("both", 95.0, &["voltage"], Some(true)),
            item("ok", 88.0, &[], None),
        ];
        review_scores(ScorePolicy::Enforce, &mut items, |_| false);
        let scores: Vec<f64> = items.iter().map(|i| i.score).collect();
        assert_eq!(scores, vec![70.0, 60.0, 70.0, 88.0]);
    }
}
