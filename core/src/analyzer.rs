//! Seam for the external content analyzers.

use std::future::Future;
use std::pin::Pin;

use entityx_fetch::Payload;
use entityx_types::RiskLevel;

pub type AnalyzerFut<'a> = Pin<Box<dyn Future<Output = Analysis> + Send + 'a>>;

/// Analyzer verdict for one item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Analysis {
    /// Likelihood the content is synthetic, in `[0, 1]`.
    pub probability: f64,
    pub risk_level: RiskLevel,
}

impl Analysis {
    /// Verdict with the risk level bucketed from `probability`.
    #[must_use]
    pub fn from_probability(probability: f64) -> Self {
        Self {
            probability,
            risk_level: RiskLevel::from_probability(probability),
        }
    }
}

/// Image analyzer.
///
/// `payload` is `None` when the fetch failed in a degradable way; the analyzer
/// must still produce a verdict, skipping the content-dependent signals.
pub trait Analyzer: Send + Sync {
    fn analyze<'a>(&'a self, payload: Option<&'a Payload>, url: &'a str) -> AnalyzerFut<'a>;
}

/// Verdict of an external text analyzer, applied via
/// [`Monitor::record_text_assessment`](crate::Monitor::record_text_assessment).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextAssessment {
    pub ai_generated_probability: f64,
    pub misinformation_risk: RiskLevel,
}
