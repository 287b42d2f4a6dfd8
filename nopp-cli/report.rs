use std::collections::BTreeMap;
use std::fmt::Write as _;

use nopp_core::{Detection, Method, NoppError, NoppResult, Stats};
use serde::Serialize;

/// Result of running several methods on one image
#[derive(Debug, Clone, Default)]
pub struct ComparisonReport {
    pub results: BTreeMap<Method, Detection>,
    pub failures: BTreeMap<Method, NoppError>,
}

/// Serializable view: statistics per method key, failure messages
#[derive(Debug, Serialize)]
struct ReportView<'a> {
    results: BTreeMap<&'static str, &'a Stats>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    failures: BTreeMap<&'static str, String>,
}

impl ComparisonReport {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty() && self.failures.is_empty()
    }

    /// Method that found the most pills
    pub fn most_pills(&self) -> Option<Method> {
        self.results.iter().max_by_key(|(_, d)| d.stats.num_pills).map(|(m, _)| *m)
    }

    /// Fixed-width table followed by per-method details
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<20} {:>8} {:>8} {:>10} {:>11} {:>12}",
            "Method", "Pills", "Area%", "Density", "Mean area", "Circularity"
        );
        let _ = writeln!(out, "{}", "-".repeat(80));
        for (method, det) in &self.results {
            let s = &det.stats;
            let _ = writeln!(
                out,
                "{:<20} {:>8} {:>8.2} {:>10.2} {:>11.1} {:>12.3}",
                method.name(),
                s.num_pills,
                s.nop_percentage,
                s.pill_density,
                s.avg_pill_area,
                s.avg_circularity
            );
        }

        if !self.results.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Details");
        }
        for (method, det) in &self.results {
            let _ = writeln!(out);
            out.push_str(&render_stats(*method, &det.stats));
        }

        if !self.failures.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Failed");
            for (method, err) in &self.failures {
                let _ = writeln!(out, "  {}: {}", method.name(), err);
            }
        }
        out
    }

    pub fn to_json(&self) -> NoppResult<String> {
        let view = ReportView {
            results: self.results.iter().map(|(m, d)| (m.key(), &d.stats)).collect(),
            failures: self.failures.iter().map(|(m, e)| (m.key(), e.to_string())).collect(),
        };
        serde_json::to_string_pretty(&view).map_err(|e| NoppError::computation(format!("JSON encoding failed: {}", e)))
    }
}

/// Multi-line summary of one method's statistics
pub fn render_stats(method: Method, s: &Stats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", method.name());
    let _ = writeln!(out, "  pill pixels:     {} of {} ({:.2}%)", s.nop_pixels, s.total_pixels, s.nop_percentage);
    let _ = writeln!(out, "  pills:           {} ({:.2} per 10k px)", s.num_pills, s.pill_density);
    if s.num_pills > 0 {
        let _ = writeln!(
            out,
            "  pill area:       mean {:.1}, min {:.0}, max {:.0}, std {:.1}",
            s.avg_pill_area, s.min_pill_area, s.max_pill_area, s.std_pill_area
        );
        let _ = writeln!(out, "  circularity:     {:.3}", s.avg_circularity);
    }
    let _ = writeln!(out, "  feature map:     mean {:.3}, max {:.3}, std {:.3}", s.feature_mean, s.feature_max, s.feature_std);
    if let Some(votes) = &s.votes {
        let members: Vec<String> =
            votes.members.iter().map(|m| format!("{}={}", m.method.key(), m.pixels)).collect();
        let _ = writeln!(
            out,
            "  votes:           {} of {} needed ({})",
            votes.vote_threshold,
            votes.member_count,
            members.join(", ")
        );
    }
    if let Some(g) = &s.grading {
        let _ = writeln!(
            out,
            "  grade:           {} ({}), confidence {:.2}, {} classifier",
            g.grade,
            g.description,
            g.confidence,
            g.classifier.name()
        );
        if let Some(acc) = g.cv_accuracy {
            let _ = writeln!(out, "  cv accuracy:     {:.3}", acc);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use nopp_core::{ClassifierKind, FeatureMap, GradeSummary, Mask, PillingGrade};

    fn detection(pills: usize) -> Detection {
        let stats = Stats { total_pixels: 100, nop_pixels: 10, nop_percentage: 10.0, num_pills: pills, ..Stats::default() };
        Detection { mask: Mask::new(10, 10), feature_map: FeatureMap::new(10, 10), stats }
    }

    fn report() -> ComparisonReport {
        let mut report = ComparisonReport::default();
        report.results.insert(Method::Fourier, detection(4));
        let mut graded = detection(2);
        graded.stats.grading = Some(GradeSummary {
            grade: PillingGrade::MODERATE,
            confidence: 0.75,
            description: PillingGrade::MODERATE.description().to_string(),
            classifier: ClassifierKind::Threshold,
            cv_accuracy: None,
            descriptor_len: 32,
        });
        report.results.insert(Method::Dpca, graded);
        report.failures.insert(Method::Wavelet, NoppError::MissingCapability(nopp_core::Capability::Wavelet));
        report
    }

    #[test]
    fn test_render_table_and_details() {
        let text = report().render();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("Method"));
        assert_eq!(lines[1], "-".repeat(80));
        // BTreeMap order follows the method declaration order
        assert!(lines[2].starts_with("Fourier + Gauss"));
        assert!(lines[3].starts_with("DPCA + ML"));
        assert!(text.contains("Moderate pilling"));
        assert!(text.contains("Failed"));
        assert!(text.contains("Wavelet Transform"));
    }

    #[test]
    fn test_json_keys_by_method() {
        let json = report().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["results"]["fourier"]["num_pills"], 4);
        assert_eq!(value["results"]["dpca"]["grading"]["grade"], 3);
        assert!(value["failures"]["wavelet"].as_str().unwrap().contains("wavelet"));
    }

    #[test]
    fn test_most_pills() {
        assert_eq!(report().most_pills(), Some(Method::Fourier));
        assert_eq!(ComparisonReport::default().most_pills(), None);
        assert!(ComparisonReport::default().is_empty());
    }
}
