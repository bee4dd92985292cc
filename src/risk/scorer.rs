//! External risk scorers
//!
//! The preferred classification path: hand `{amount, recipientAddress,
//! extraFeatures}` to a model service and adopt its answer. The answer is
//! untrusted; `parse_response` rejects anything incomplete so the caller can
//! fall back.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::process::Command;

use crate::models::{AnalysisMetrics, RiskLevel, RiskResult, RiskSource};

#[derive(Debug, Error)]
pub enum ScorerError {
    #[error("scorer transport error: {0}")]
    Transport(String),

    #[error("scorer timed out after {0:?}")]
    Timeout(Duration),

    #[error("scorer process failed: {0}")]
    Process(String),

    #[error("malformed scorer response: {0}")]
    Malformed(String),
}

/// Body sent to the scorer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRequest {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub recipient_address: String,
    pub extra_features: Value,
}

#[async_trait]
pub trait RiskScorer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Raw JSON answer; validation happens in `parse_response`
    async fn score(&self, request: &ScoreRequest) -> Result<Value, ScorerError>;
}

// ============================================================================
// HTTP SCORER
// ============================================================================

pub struct HttpScorer {
    url: String,
    http_client: reqwest::Client,
}

impl HttpScorer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ScorerError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScorerError::Transport(e.to_string()))?;

        Ok(Self { url: url.into(), http_client })
    }
}

#[async_trait]
impl RiskScorer for HttpScorer {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn score(&self, request: &ScoreRequest) -> Result<Value, ScorerError> {
        let response = self.http_client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| ScorerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScorerError::Transport(format!("scorer returned HTTP {}", status)));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ScorerError::Malformed(e.to_string()))
    }
}

// ============================================================================
// SUBPROCESS SCORER
// ============================================================================

/// Runs `<program> <args..> --amount A --recipient R --features JSON` and
/// reads one JSON document from stdout.
pub struct SubprocessScorer {
    program: String,
    args: Vec<String>,
}

impl SubprocessScorer {
    /// Split a command line on whitespace; no shell quoting
    pub fn from_command_line(command: &str) -> Result<Self, ScorerError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| ScorerError::Process("empty scorer command".to_string()))?;

        Ok(Self { program, args: parts.collect() })
    }
}

#[async_trait]
impl RiskScorer for SubprocessScorer {
    fn name(&self) -> &'static str {
        "subprocess"
    }

    async fn score(&self, request: &ScoreRequest) -> Result<Value, ScorerError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg("--amount")
            .arg(request.amount.to_string())
            .arg("--recipient")
            .arg(&request.recipient_address)
            .arg("--features")
            .arg(request.extra_features.to_string())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ScorerError::Process(format!("failed to spawn {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScorerError::Process(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| ScorerError::Malformed(e.to_string()))
    }
}

// ============================================================================
// RESPONSE VALIDATION
// ============================================================================

/// Accepts `0.85`, `85`, `"85%"`, `"0.85"`. Percent strings are always
/// divided by 100. Plain numbers up to 1 are fractions and from 2 upward
/// are percentages; anything in between is ambiguous and rejected.
fn parse_confidence(value: &Value) -> Option<f64> {
    let plain = |raw: f64| match raw {
        r if r <= 1.0 => Some(r),
        r if r >= 2.0 => Some(r / 100.0),
        _ => None,
    };

    let fraction = match value {
        Value::Number(n) => plain(n.as_f64()?)?,
        Value::String(s) => {
            let s = s.trim();
            match s.strip_suffix('%') {
                Some(pct) => pct.trim().parse::<f64>().ok()? / 100.0,
                None => plain(s.parse::<f64>().ok()?)?,
            }
        }
        _ => return None,
    };

    (fraction.is_finite() && (0.0..=1.0).contains(&fraction)).then_some(fraction)
}

fn string_list(value: Option<&Value>, field: &str) -> Result<Vec<String>, ScorerError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ScorerError::Malformed(format!("{} must contain strings", field)))
            })
            .collect(),
        Some(_) => Err(ScorerError::Malformed(format!("{} must be a list", field))),
    }
}

/// Validate a scorer answer. `riskLevel`, `confidence` and an
/// `analysisMetrics` object are required.
pub fn parse_response(value: Value) -> Result<RiskResult, ScorerError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ScorerError::Malformed("expected a JSON object".to_string()))?;

    let risk_level: RiskLevel = obj
        .get("riskLevel")
        .and_then(Value::as_str)
        .ok_or_else(|| ScorerError::Malformed("missing riskLevel".to_string()))?
        .parse()
        .map_err(|e| ScorerError::Malformed(format!("{}", e)))?;

    let confidence = obj
        .get("confidence")
        .ok_or_else(|| ScorerError::Malformed("missing confidence".to_string()))
        .and_then(|v| {
            parse_confidence(v)
                .ok_or_else(|| ScorerError::Malformed(format!("invalid confidence {}", v)))
        })?;

    let analysis_metrics: AnalysisMetrics = match obj.get("analysisMetrics") {
        Some(metrics @ Value::Object(_)) => serde_json::from_value(metrics.clone())
            .map_err(|e| ScorerError::Malformed(format!("analysisMetrics: {}", e)))?,
        Some(_) => return Err(ScorerError::Malformed("analysisMetrics must be an object".to_string())),
        None => return Err(ScorerError::Malformed("missing analysisMetrics".to_string())),
    };

    let details = obj
        .get("details")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} risk reported by model", risk_level));

    let transaction_category = obj
        .get("transactionCategory")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| risk_level.category());

    Ok(RiskResult {
        risk_level,
        confidence,
        details,
        risk_factors: string_list(obj.get("riskFactors"), "riskFactors")?,
        security_suggestions: string_list(obj.get("securitySuggestions"), "securitySuggestions")?,
        analysis_metrics,
        transaction_category,
        source: RiskSource::Model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn model_answer() -> Value {
        json!({
            "riskLevel": "Medium",
            "confidence": "85%",
            "details": "Risk score: 0.45",
            "riskFactors": ["Amount significantly higher than usual"],
            "securitySuggestions": ["Verify recipient identity"],
            "analysisMetrics": {
                "velocityScore": 2,
                "frequencyScore": 0.08,
                "amountDeviation": 3.4,
                "historicalRiskScore": 0.45,
                "patternMatch": "Normal",
                "timeBasedRisk": 0.2
            },
            "transactionCategory": "Medium-Risk"
        })
    }

    #[test]
    fn test_parse_complete_response() {
        let result = parse_response(model_answer()).unwrap();

        assert_eq!(result.risk_level, RiskLevel::Medium);
        assert!((result.confidence - 0.85).abs() < 1e-9);
        assert_eq!(result.source, RiskSource::Model);
        assert_eq!(result.risk_factors, vec!["Amount significantly higher than usual"]);
        assert_eq!(result.analysis_metrics.amount_deviation, Some(3.4));
    }

    #[test]
    fn test_missing_risk_level_is_malformed() {
        let mut answer = model_answer();
        answer.as_object_mut().unwrap().remove("riskLevel");

        let err = parse_response(answer).unwrap_err();
        assert!(matches!(err, ScorerError::Malformed(_)));
    }

    #[test]
    fn test_missing_metrics_is_malformed() {
        let mut answer = model_answer();
        answer.as_object_mut().unwrap().remove("analysisMetrics");
        assert!(parse_response(answer).is_err());

        let mut answer = model_answer();
        answer["analysisMetrics"] = json!("n/a");
        assert!(parse_response(answer).is_err());
    }

    #[test]
    fn test_unknown_level_is_malformed() {
        let mut answer = model_answer();
        answer["riskLevel"] = json!("Apocalyptic");
        assert!(parse_response(answer).is_err());
    }

    #[test]
    fn test_critical_maps_to_high() {
        let mut answer = model_answer();
        answer["riskLevel"] = json!("Critical");
        assert_eq!(parse_response(answer).unwrap().risk_level, RiskLevel::High);
    }

    #[test]
    fn test_optional_fields_default() {
        let answer = json!({
            "riskLevel": "low",
            "confidence": 0.9,
            "analysisMetrics": {}
        });
        let result = parse_response(answer).unwrap();

        assert!(result.risk_factors.is_empty());
        assert!(result.security_suggestions.is_empty());
        assert_eq!(result.transaction_category, "Low-Risk");
    }

    #[test]
    fn test_parse_confidence_forms() {
        assert_eq!(parse_confidence(&json!(0.5)), Some(0.5));
        assert_eq!(parse_confidence(&json!(90)), Some(0.9));
        assert_eq!(parse_confidence(&json!("0.25")), Some(0.25));
        assert_eq!(parse_confidence(&json!("80%")), Some(0.8));
        assert_eq!(parse_confidence(&json!("150%")), None);
        assert_eq!(parse_confidence(&json!(-0.1)), None);
        assert_eq!(parse_confidence(&json!("high")), None);
        assert_eq!(parse_confidence(&json!(null)), None);
    }

    #[test]
    fn test_parse_confidence_rejects_ambiguous_numbers() {
        assert_eq!(parse_confidence(&json!(1)), Some(1.0));
        assert_eq!(parse_confidence(&json!(1.5)), None);
        assert_eq!(parse_confidence(&json!("1.5")), None);
        assert_eq!(parse_confidence(&json!(2)), Some(0.02));
        assert_eq!(parse_confidence(&json!("1.5%")), Some(0.015));

        let mut answer = model_answer();
        answer["confidence"] = json!(1.5);
        assert!(matches!(parse_response(answer), Err(ScorerError::Malformed(_))));
    }

    fn score_request() -> ScoreRequest {
        ScoreRequest {
            amount: rust_decimal_macros::dec!(10),
            recipient_address: "0xabc".to_string(),
            extra_features: json!({}),
        }
    }

    /// Serve `app` on an ephemeral local port and return the scorer url
    async fn spawn_model_service(app: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/predict", addr)
    }

    #[tokio::test]
    async fn test_http_scorer_returns_answer() {
        use axum::{routing::post, Json};

        let app = axum::Router::new().route(
            "/predict",
            post(|Json(body): Json<Value>| async move {
                Json(json!({
                    "riskLevel": "Low",
                    "confidence": 0.8,
                    "analysisMetrics": {},
                    "details": format!("scored {}", body["recipientAddress"].as_str().unwrap_or("?"))
                }))
            }),
        );
        let scorer = HttpScorer::new(spawn_model_service(app).await, Duration::from_secs(5)).unwrap();

        let answer = scorer.score(&score_request()).await.unwrap();
        let result = parse_response(answer).unwrap();
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert_eq!(result.details, "scored 0xabc");
    }

    #[tokio::test]
    async fn test_http_scorer_error_status_is_transport() {
        use axum::{http::StatusCode, routing::post};

        let app = axum::Router::new().route(
            "/predict",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model crashed") }),
        );
        let scorer = HttpScorer::new(spawn_model_service(app).await, Duration::from_secs(5)).unwrap();

        let err = scorer.score(&score_request()).await.unwrap_err();
        assert!(matches!(err, ScorerError::Transport(_)));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_http_scorer_non_json_body_is_malformed() {
        use axum::routing::post;

        let app = axum::Router::new().route("/predict", post(|| async { "definitely not json" }));
        let scorer = HttpScorer::new(spawn_model_service(app).await, Duration::from_secs(5)).unwrap();

        let err = scorer.score(&score_request()).await.unwrap_err();
        assert!(matches!(err, ScorerError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_subprocess_nonzero_exit_is_process_error() {
        let scorer = SubprocessScorer::from_command_line("false").unwrap();

        let err = scorer.score(&score_request()).await.unwrap_err();
        assert!(matches!(err, ScorerError::Process(_)));
    }

    #[tokio::test]
    async fn test_subprocess_non_json_stdout_is_malformed() {
        // echo prints its arguments back, which is not JSON
        let scorer = SubprocessScorer::from_command_line("echo").unwrap();

        let err = scorer.score(&score_request()).await.unwrap_err();
        assert!(matches!(err, ScorerError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_subprocess_missing_program_is_process_error() {
        let scorer = SubprocessScorer::from_command_line("txguard-no-such-scorer --flag").unwrap();

        let err = scorer.score(&score_request()).await.unwrap_err();
        assert!(matches!(err, ScorerError::Process(_)));
    }

    #[test]
    fn test_command_line_split() {
        let scorer = SubprocessScorer::from_command_line("python3 python/model_predictor.py").unwrap();
        assert_eq!(scorer.program, "python3");
        assert_eq!(scorer.args, vec!["python/model_predictor.py"]);

        assert!(SubprocessScorer::from_command_line("   ").is_err());
    }

    #[test]
    fn test_score_request_amount_is_numeric() {
        let request = ScoreRequest {
            amount: rust_decimal_macros::dec!(2500.5),
            recipient_address: "0xabc".to_string(),
            extra_features: json!({}),
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["amount"], json!(2500.5));
        assert_eq!(body["recipientAddress"], json!("0xabc"));
    }
}
