use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: HealthStatus,
    pub timestamp: String,
    pub checks: HashMap<String, ServiceHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceHealth {
    pub fn healthy(response_time_ms: u64) -> Self {
        Self {
            status: HealthStatus::Healthy,
            response_time_ms: Some(response_time_ms),
            error: None,
        }
    }

    pub fn unhealthy(error: String) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            response_time_ms: None,
            error: Some(error),
        }
    }
}

impl HealthCheckResponse {
    pub fn overall(checks: &HashMap<String, ServiceHealth>) -> HealthStatus {
        if checks
            .values()
            .any(|health| health.status == HealthStatus::Unhealthy)
        {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Healthy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checks(entries: Vec<(&str, ServiceHealth)>) -> HashMap<String, ServiceHealth> {
        entries
            .into_iter()
            .map(|(name, health)| (name.to_string(), health))
            .collect()
    }

    #[test]
    fn all_healthy_is_healthy() {
        let checks = checks(vec![
            ("database", ServiceHealth::healthy(3)),
            ("message_broker", ServiceHealth::healthy(1)),
        ]);

        assert_eq!(HealthCheckResponse::overall(&checks), HealthStatus::Healthy);
    }

    #[test]
    fn any_unhealthy_is_unhealthy() {
        let checks = checks(vec![
            ("database", ServiceHealth::healthy(3)),
            ("message_broker", ServiceHealth::unhealthy("channel closed".to_string())),
        ]);

        assert_eq!(HealthCheckResponse::overall(&checks), HealthStatus::Unhealthy);
    }

    #[test]
    fn no_checks_is_healthy() {
        assert_eq!(
            HealthCheckResponse::overall(&HashMap::new()),
            HealthStatus::Healthy
        );
    }

    #[test]
    fn unhealthy_check_serializes_its_error() {
        let json = serde_json::to_value(ServiceHealth::unhealthy("down".to_string()))
            .expect("serializable");

        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["error"], "down");
        assert!(json.get("response_time_ms").is_none());
    }
}
