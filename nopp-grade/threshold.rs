use nopp_core::PillingGrade;

/// One row of the fixed severity table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradeRule {
    pub min_norm: f64,
    pub min_std: f64,
    pub grade: PillingGrade,
    pub confidence: f64,
}

/// Checked in order, first match wins
pub const GRADE_RULES: [GradeRule; 4] = [
    GradeRule { min_norm: 15.0, min_std: 2.0, grade: PillingGrade::VERY_SEVERE, confidence: 0.85 },
    GradeRule { min_norm: 10.0, min_std: 1.5, grade: PillingGrade::SEVERE, confidence: 0.80 },
    GradeRule { min_norm: 7.0, min_std: 1.0, grade: PillingGrade::MODERATE, confidence: 0.75 },
    GradeRule { min_norm: 5.0, min_std: 0.5, grade: PillingGrade::SLIGHT, confidence: 0.70 },
];

/// Grade assigned when no rule matches
pub const NO_PILLING_CONFIDENCE: f64 = 0.90;

/// Euclidean norm and population standard deviation of a descriptor
pub fn descriptor_norm_std(descriptor: &[f64]) -> (f64, f64) {
    if descriptor.is_empty() {
        return (0.0, 0.0);
    }
    let norm = descriptor.iter().map(|v| v * v).sum::<f64>().sqrt();
    let n = descriptor.len() as f64;
    let mean = descriptor.iter().sum::<f64>() / n;
    let var = descriptor.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (norm, var.sqrt())
}

/// Grade from descriptor magnitude and spread, both thresholds strict
pub fn classify_by_threshold(descriptor: &[f64]) -> (PillingGrade, f64) {
    let (norm, std) = descriptor_norm_std(descriptor);
    grade_for(norm, std)
}

pub fn grade_for(norm: f64, std: f64) -> (PillingGrade, f64) {
    GRADE_RULES
        .iter()
        .find(|rule| norm > rule.min_norm && std > rule.min_std)
        .map(|rule| (rule.grade, rule.confidence))
        .unwrap_or((PillingGrade::NONE, NO_PILLING_CONFIDENCE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_table_rows() {
        assert_eq!(grade_for(20.0, 3.0), (PillingGrade::VERY_SEVERE, 0.85));
        assert_eq!(grade_for(12.0, 1.6), (PillingGrade::SEVERE, 0.80));
        assert_eq!(grade_for(8.0, 1.1), (PillingGrade::MODERATE, 0.75));
        assert_eq!(grade_for(6.0, 0.6), (PillingGrade::SLIGHT, 0.70));
        assert_eq!(grade_for(1.0, 0.1), (PillingGrade::NONE, 0.90));
        // large norm but flat descriptor falls through
        assert_eq!(grade_for(100.0, 0.4), (PillingGrade::NONE, 0.90));
        // bounds are strict
        assert_eq!(grade_for(15.0, 3.0).0, PillingGrade::SEVERE);
    }

    #[test]
    fn test_norm_and_std() {
        let (norm, std) = descriptor_norm_std(&[3.0, 4.0]);
        assert!((norm - 5.0).abs() < 1e-12);
        assert!((std - 0.5).abs() < 1e-12);
        assert_eq!(descriptor_norm_std(&[]), (0.0, 0.0));
        assert_eq!(classify_by_threshold(&[0.0; 32]), (PillingGrade::NONE, 0.90));
    }

    proptest! {
        #[test]
        fn prop_grade_monotone_in_norm_and_std(
            norm in 0.0f64..40.0,
            std in 0.0f64..5.0,
            dn in 0.0f64..10.0,
            ds in 0.0f64..2.0,
        ) {
            // more energy never yields a milder grade
            let (low, _) = grade_for(norm, std);
            let (high, _) = grade_for(norm + dn, std + ds);
            prop_assert!(high <= low);
        }
    }
}
