//! Request-level composition of fetcher, analyzer, ledger and history.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use entityx_fetch::{ErrorCode, FetchConfigError, FetchError, Fetcher};
use entityx_ledger::{
    HistoryPage, HistoryQuery, HistoryRecorder, HistoryStore, RecorderError, TrustLedger,
    round_to,
};
use entityx_types::{EntityId, HistoryRecord, RecordType, RiskLevel, SessionId};
use serde::Serialize;

use crate::analyzer::{Analyzer, TextAssessment};
use crate::config::{EntityxConfig, LedgerConfig};

/// Outcome of [`Monitor::monitor_image`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageReport {
    pub probability: f64,
    pub risk_level: RiskLevel,
    /// Session score after this item.
    pub trust_score: f64,
    /// Change applied to the session score (never positive).
    pub trust_delta: f64,
    pub session_id: SessionId,
    /// Degradable fetch failure the analysis ran without content for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_failure: Option<ErrorCode>,
}

/// Outcome of [`Monitor::record_text_assessment`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextReport {
    pub trust_score: f64,
    pub trust_delta: f64,
    pub session_id: SessionId,
}

/// Owns the per-process trust and history state.
///
/// Must be created inside a Tokio runtime (the history writer is a task).
/// Call [`Monitor::shutdown`] to drain pending history writes.
pub struct Monitor {
    fetcher: Fetcher,
    analyzer: Arc<dyn Analyzer>,
    ledger: TrustLedger,
    recorder: HistoryRecorder,
}

impl Monitor {
    pub fn new(
        config: &EntityxConfig,
        analyzer: Arc<dyn Analyzer>,
    ) -> Result<Self, FetchConfigError> {
        let fetcher = Fetcher::new(&config.fetch)?;
        Ok(Self::from_parts(fetcher, analyzer, &config.ledger))
    }

    #[must_use]
    pub fn from_parts(
        fetcher: Fetcher,
        analyzer: Arc<dyn Analyzer>,
        ledger: &LedgerConfig,
    ) -> Self {
        let history = Arc::new(HistoryStore::new(ledger.history_capacity()));
        let recorder = HistoryRecorder::spawn(history, ledger.recorder_queue_capacity());
        tracing::info!(
            history_capacity = ledger.history_capacity(),
            initial_score = ledger.initial_score(),
            "monitor started"
        );
        Self {
            fetcher,
            analyzer,
            ledger: TrustLedger::new(ledger.initial_score()),
            recorder,
        }
    }

    /// Fetch and analyze an image, then charge the session and log the event.
    ///
    /// URL validator and host guard failures are returned untouched and leave
    /// the ledger and history alone. Any other fetch failure degrades to an
    /// analysis without content.
    pub async fn monitor_image(
        &self,
        url: &str,
        session: Option<&str>,
    ) -> Result<ImageReport, FetchError> {
        let url = url.trim();
        let session_id = SessionId::from_optional(session);

        let (payload, fetch_failure) = match self.fetcher.fetch(url).await {
            Ok(payload) => (Some(payload), None),
            Err(e) if e.code.is_request_terminal() => {
                tracing::warn!(url, code = e.code.as_str(), "image request rejected: {e}");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(
                    url,
                    code = e.code.as_str(),
                    "fetch failed, analyzing without content: {e}"
                );
                (None, Some(e.code))
            }
        };

        let analysis = self.analyzer.analyze(payload.as_ref(), url).await;
        let update = self.ledger.update(&session_id, analysis.probability);

        self.record(HistoryRecord {
            entity_id: EntityId::for_image(url),
            record_type: RecordType::Image,
            source_url: url.to_string(),
            title: None,
            risk_level: analysis.risk_level,
            probability: round_to(analysis.probability, 4),
            trust_score_after: update.score,
            timestamp_ms: Utc::now().timestamp_millis(),
        })
        .await;

        Ok(ImageReport {
            probability: analysis.probability,
            risk_level: analysis.risk_level,
            trust_score: update.score,
            trust_delta: update.delta(),
            session_id,
            fetch_failure,
        })
    }

    /// Charge the session for an externally analyzed article and log it.
    pub async fn record_text_assessment(
        &self,
        session: Option<&str>,
        url: &str,
        title: &str,
        assessment: TextAssessment,
    ) -> TextReport {
        let session_id = SessionId::from_optional(session);
        let penalty = assessment.misinformation_risk.text_penalty();
        let update = self.ledger.update(&session_id, penalty);

        self.record(HistoryRecord {
            entity_id: EntityId::for_text(url, title),
            record_type: RecordType::Text,
            source_url: url.to_string(),
            title: Some(title.to_string()),
            risk_level: assessment.misinformation_risk,
            probability: round_to(assessment.ai_generated_probability, 4),
            trust_score_after: update.score,
            timestamp_ms: Utc::now().timestamp_millis(),
        })
        .await;

        TextReport {
            trust_score: update.score,
            trust_delta: update.delta(),
            session_id,
        }
    }

    #[must_use]
    pub fn history(&self, query: &HistoryQuery) -> HistoryPage {
        self.recorder.store().query(query)
    }

    #[must_use]
    pub fn trust_score(&self, session: Option<&str>) -> f64 {
        self.ledger.get(&SessionId::from_optional(session))
    }

    pub fn reset_trust(&self, session: Option<&str>) {
        self.ledger.reset(&SessionId::from_optional(session));
    }

    /// Wait until every history record queued so far is visible to queries.
    pub async fn flush(&self) -> Result<(), RecorderError> {
        self.recorder.flush().await
    }

    #[must_use]
    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub async fn shutdown(self) {
        self.recorder.shutdown().await;
        tracing::info!("monitor stopped");
    }

    // A lost history entry must not fail the request.
    async fn record(&self, record: HistoryRecord) {
        if let Err(e) = self.recorder.record(record).await {
            tracing::warn!("history record dropped: {e}");
        }
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("fetcher", &self.fetcher)
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}
