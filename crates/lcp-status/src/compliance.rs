//! Compliance test log.
//!
//! When the server runs in compliance mode, a test harness brackets each test
//! with `start`/`end` calls and every lifecycle request in between is logged
//! against the current test number.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use lcp_types::api::ComplianceParams;

use crate::StatusError;

/// Request kind a compliance entry is recorded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    End,
    Status,
    Register,
    Renew,
    Return,
    CancelRevoke,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::End => "end",
            Stage::Status => "status",
            Stage::Register => "register",
            Stage::Renew => "renew",
            Stage::Return => "return",
            Stage::CancelRevoke => "cancel_revoke",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplianceEntry {
    pub stage: Stage,
    pub test_number: Option<String>,
    /// HTTP status of the outcome; 0 for bracket entries.
    pub status_code: u16,
    pub message: String,
}

impl fmt::Display for ComplianceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}",
            self.test_number.as_deref().unwrap_or("-"),
            self.stage.as_str(),
            self.status_code,
            self.message
        )
    }
}

pub trait ComplianceLogger: Send + Sync {
    fn log(&self, entry: ComplianceEntry);
}

/// Writes entries to the `lcp::compliance` tracing target.
pub struct TracingCompliance;

impl ComplianceLogger for TracingCompliance {
    fn log(&self, entry: ComplianceEntry) {
        tracing::info!(
            target: "lcp::compliance",
            stage = entry.stage.as_str(),
            code = entry.status_code,
            "{}",
            entry
        );
    }
}

pub struct NullCompliance;

impl ComplianceLogger for NullCompliance {
    fn log(&self, _entry: ComplianceEntry) {}
}

/// Current test number plus the sink, owned by the status service.
pub struct Compliance {
    enabled: bool,
    test_number: RwLock<Option<String>>,
    logger: Arc<dyn ComplianceLogger>,
}

impl Compliance {
    pub fn new(enabled: bool, logger: Arc<dyn ComplianceLogger>) -> Self {
        Self {
            enabled,
            test_number: RwLock::new(None),
            logger,
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, Arc::new(NullCompliance))
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn current_test(&self) -> Option<String> {
        self.test_number.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Log the outcome of one request. No-op outside compliance mode.
    pub fn record(&self, stage: Stage, status_code: u16, message: impl Into<String>) {
        if !self.enabled {
            return;
        }
        self.logger.log(ComplianceEntry {
            stage,
            test_number: self.current_test(),
            status_code,
            message: message.into(),
        });
    }

    /// Handle a `start`/`end` bracket from the test harness.
    pub fn bracket(&self, params: &ComplianceParams) -> Result<(), StatusError> {
        let stage = params.test_stage.as_deref().unwrap_or_default();
        match stage {
            "start" => {
                let number = params
                    .test_number
                    .as_deref()
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| StatusError::Validation("the compliance test number cannot be empty".into()))?;

                *self.test_number.write().unwrap_or_else(PoisonError::into_inner) = Some(number.to_string());
                self.record(Stage::Start, 0, "-");
                Ok(())
            }
            "end" => {
                let result = match params.test_result.as_deref() {
                    Some("s") => "success",
                    Some("e") => "error",
                    _ => {
                        return Err(StatusError::Validation(
                            "the compliance test result must be either 'e' or 's'".into(),
                        ));
                    }
                };
                self.record(Stage::End, 0, result);
                *self.test_number.write().unwrap_or_else(PoisonError::into_inner) = None;
                Ok(())
            }
            _ => Err(StatusError::Validation(
                "the compliance test stage must be either 'start' or 'end'".into(),
            )),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct Recorder(pub Mutex<Vec<ComplianceEntry>>);

    impl ComplianceLogger for Recorder {
        fn log(&self, entry: ComplianceEntry) {
            self.0.lock().unwrap().push(entry);
        }
    }

    fn params(stage: &str, number: Option<&str>, result: Option<&str>) -> ComplianceParams {
        ComplianceParams {
            test_stage: Some(stage.into()),
            test_number: number.map(str::to_string),
            test_result: result.map(str::to_string),
        }
    }

    #[test]
    fn entries_carry_the_current_test_number() {
        let recorder = Arc::new(Recorder::default());
        let compliance = Compliance::new(true, recorder.clone());

        compliance.bracket(&params("start", Some("2.3.2.2.1"), None)).unwrap();
        compliance.record(Stage::Register, 200, "ok");
        compliance.bracket(&params("end", None, Some("s"))).unwrap();
        compliance.record(Stage::Status, 200, "ok");

        let entries = recorder.0.lock().unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[1].test_number.as_deref(), Some("2.3.2.2.1"));
        assert_eq!(entries[2].message, "success");
        assert_eq!(entries[3].test_number, None);
    }

    #[test]
    fn bad_brackets_are_rejected() {
        let compliance = Compliance::new(true, Arc::new(NullCompliance));
        assert!(compliance.bracket(&params("middle", None, None)).is_err());
        assert!(compliance.bracket(&params("start", None, None)).is_err());
        assert!(compliance.bracket(&params("end", None, Some("x"))).is_err());
    }

    #[test]
    fn disabled_mode_logs_nothing() {
        let recorder = Arc::new(Recorder::default());
        let compliance = Compliance::new(false, recorder.clone());
        compliance.record(Stage::Return, 200, "ok");
        assert!(recorder.0.lock().unwrap().is_empty());
    }
}
