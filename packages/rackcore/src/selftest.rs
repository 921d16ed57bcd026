//! Power-on self-test outcome and its stable error code.

/// Error codes carried in the boot contract `err` field. The wire strings
/// are part of the fleet's monitoring contract and never change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    SelfTestFail,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SelfTestFail => "SELFTEST_FAIL",
        }
    }
}

/// Raw outcome of a board's check battery. `failed_check` names the first
/// failing check for diagnostics; it never reaches the contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CheckOutcome {
    pub passed: bool,
    pub failed_check: Option<&'static str>,
}

impl CheckOutcome {
    pub const fn pass() -> Self {
        Self {
            passed: true,
            failed_check: None,
        }
    }

    pub const fn fail(check: &'static str) -> Self {
        Self {
            passed: false,
            failed_check: Some(check),
        }
    }
}

/// Self-test result as it appears in the boot contract: a pass flag plus
/// the error code set exactly when the test failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelfTestReport {
    pub passed: bool,
    pub error: Option<ErrorCode>,
}

impl SelfTestReport {
    pub const fn pass() -> Self {
        Self {
            passed: true,
            error: None,
        }
    }

    pub const fn fail() -> Self {
        Self {
            passed: false,
            error: Some(ErrorCode::SelfTestFail),
        }
    }

    pub fn from_outcome(outcome: &CheckOutcome) -> Self {
        if outcome.passed {
            Self::pass()
        } else {
            Self::fail()
        }
    }
}
