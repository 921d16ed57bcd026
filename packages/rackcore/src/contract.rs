//! Boot contract rendering.
//!
//! The contract is a single JSON object with a fixed key order and no
//! whitespace, so host-side tooling can match it byte-for-byte:
//!
//! `{"device":...,"fw":...,"target":...,"selftest":...[,"err":...][,"ts":...]}`
//!
//! The serial form omits `ts`; the broker form carries it. `err` appears
//! exactly when the self-test failed.

use core::fmt::Write as _;

use crate::selftest::SelfTestReport;

/// Device id, version, target name, and the error code all stay short;
/// 192 bytes holds the longest contract with room to spare.
pub const CONTRACT_MAX: usize = 192;

pub type ContractLine = heapless::String<CONTRACT_MAX>;

/// Everything the renderer needs. Field values must not contain `"` or
/// `\`; identities, versions, and target names never do.
#[derive(Clone, Copy, Debug)]
pub struct ContractInputs<'a> {
    pub device: &'a str,
    pub fw_version: &'a str,
    pub target: &'a str,
    pub selftest: &'a SelfTestReport,
}

/// Renders the serial variant, without a timestamp.
pub fn render_serial(inputs: &ContractInputs<'_>) -> ContractLine {
    render(inputs, None)
}

/// Renders the broker variant with the given timestamp in seconds.
pub fn render_with_timestamp(inputs: &ContractInputs<'_>, ts_seconds: u64) -> ContractLine {
    render(inputs, Some(ts_seconds))
}

fn render(inputs: &ContractInputs<'_>, ts_seconds: Option<u64>) -> ContractLine {
    let mut line = ContractLine::new();
    let selftest = if inputs.selftest.passed { "pass" } else { "fail" };
    let _ = write!(
        line,
        "{{\"device\":\"{}\",\"fw\":\"{}\",\"target\":\"{}\",\"selftest\":\"{}\"",
        inputs.device, inputs.fw_version, inputs.target, selftest
    );
    if !inputs.selftest.passed {
        if let Some(code) = inputs.selftest.error {
            let _ = write!(line, ",\"err\":\"{}\"", code.as_str());
        }
    }
    if let Some(ts) = ts_seconds {
        let _ = write!(line, ",\"ts\":{ts}");
    }
    let _ = line.push('}');
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs<'a>(report: &'a SelfTestReport) -> ContractInputs<'a> {
        ContractInputs {
            device: "esp32-aabbccddeeff",
            fw_version: "1.0.0",
            target: "s3",
            selftest: report,
        }
    }

    #[test]
    fn serial_failure_contract_is_exact() {
        let report = SelfTestReport::fail();
        let line = render_serial(&inputs(&report));
        assert_eq!(
            line.as_str(),
            "{\"device\":\"esp32-aabbccddeeff\",\"fw\":\"1.0.0\",\"target\":\"s3\",\"selftest\":\"fail\",\"err\":\"SELFTEST_FAIL\"}"
        );
    }

    #[test]
    fn serial_pass_contract_omits_err_and_ts() {
        let report = SelfTestReport::pass();
        let line = render_serial(&inputs(&report));
        assert_eq!(
            line.as_str(),
            "{\"device\":\"esp32-aabbccddeeff\",\"fw\":\"1.0.0\",\"target\":\"s3\",\"selftest\":\"pass\"}"
        );
    }

    #[test]
    fn broker_contract_appends_ts_last() {
        let report = SelfTestReport::pass();
        let line = render_with_timestamp(&inputs(&report), 42);
        assert_eq!(
            line.as_str(),
            "{\"device\":\"esp32-aabbccddeeff\",\"fw\":\"1.0.0\",\"target\":\"s3\",\"selftest\":\"pass\",\"ts\":42}"
        );
    }

    #[test]
    fn broker_failure_contract_keeps_err_before_ts() {
        let report = SelfTestReport::fail();
        let line = render_with_timestamp(&inputs(&report), 7);
        assert_eq!(
            line.as_str(),
            "{\"device\":\"esp32-aabbccddeeff\",\"fw\":\"1.0.0\",\"target\":\"s3\",\"selftest\":\"fail\",\"err\":\"SELFTEST_FAIL\",\"ts\":7}"
        );
    }

    #[test]
    fn key_order_is_stable_for_placeholder_identity() {
        let report = SelfTestReport::pass();
        let line = render_serial(&ContractInputs {
            device: "p4-placeholder",
            fw_version: "unknown",
            target: "p4",
            selftest: &report,
        });
        assert_eq!(
            line.as_str(),
            "{\"device\":\"p4-placeholder\",\"fw\":\"unknown\",\"target\":\"p4\",\"selftest\":\"pass\"}"
        );
    }
}
