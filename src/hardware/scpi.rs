//! SCPI transport helpers for instrument implementors.
//!
//! The crate does not implement any wire protocol; concrete links (VISA,
//! TCP socket, serial) live outside it. What lives here is the small amount
//! of protocol-agnostic plumbing every SCPI-flavored instrument needs:
//!
//! - [`ScpiTransport`] - the query/command seam a link has to provide
//! - [`query_scalar`] - scalar readout with command-variant fallback
//! - [`wait_operation_complete`] - `*OPC?` handshake with timeout
//!
//! Instrument responses routinely carry units ("1.23E-3 W") or stray
//! whitespace, so parsing extracts the first numeric token rather than
//! feeding the raw response to `f64::parse`.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{SweepError, SweepResult};

/// Readout command variants for optical power meters, in priority order.
///
/// Different firmware revisions answer different subsets of these; the first
/// variant that yields a finite float wins.
pub const POWER_QUERY_VARIANTS: &[&str] =
    &["READ?", "MEAS:POW?", "POW:READ?", "READ:POWER?", "READ:POW?"];

#[allow(clippy::unwrap_used)] // pattern is a compile-time constant
static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-+]?\d*\.?\d+(?:[eE][-+]?\d+)?").unwrap());

/// Query/command seam over an SCPI link.
///
/// Abstracts the underlying communication mechanism so the helpers here work
/// against any transport. Implementations apply their own per-operation
/// timeouts and surface link loss as `SweepError::ConnectionLost`.
#[async_trait]
pub trait ScpiTransport: Send + Sync {
    /// Send a query and return the raw response line.
    async fn query(&self, command: &str) -> SweepResult<String>;

    /// Send a command without expecting a response.
    async fn command(&self, command: &str) -> SweepResult<()>;
}

/// Extract the first numeric token from an instrument response.
///
/// Returns `None` for responses with no parseable finite number.
pub fn parse_scalar(response: &str) -> Option<f64> {
    let m = NUMBER_RE.find(response)?;
    m.as_str().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Query a scalar value, trying `variants` in order.
///
/// Returns the first response that parses as a finite float. A variant that
/// errors or parses to garbage falls through to the next; only when every
/// variant has failed does this return `SweepError::Readout`.
pub async fn query_scalar<T: ScpiTransport + ?Sized>(
    transport: &T,
    variants: &[&str],
) -> SweepResult<f64> {
    for variant in variants {
        match transport.query(variant).await {
            Ok(response) => {
                if let Some(value) = parse_scalar(&response) {
                    debug!(command = variant, value, "scalar readout");
                    return Ok(value);
                }
                warn!(command = variant, response, "unparseable scalar response");
            }
            Err(err) => {
                if err.aborts_session() {
                    return Err(err);
                }
                debug!(command = variant, %err, "scalar variant failed, trying next");
            }
        }
    }
    Err(SweepError::Readout(format!(
        "no scalar readout variant succeeded (tried {})",
        variants.join(", ")
    )))
}

/// Block until the instrument answers `*OPC?` with "1" or `timeout` elapses.
///
/// This is the operation-complete handshake used after triggering a single
/// acquisition; on timeout the caller maps it to `AcquisitionTimeout`.
pub async fn wait_operation_complete<T: ScpiTransport + ?Sized>(
    transport: &T,
    timeout: Duration,
) -> SweepResult<()> {
    match tokio::time::timeout(timeout, transport.query("*OPC?")).await {
        Ok(Ok(response)) if response.trim() == "1" => Ok(()),
        Ok(Ok(response)) => Err(SweepError::Readout(format!(
            "unexpected *OPC? response: {response:?}"
        ))),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(SweepError::AcquisitionTimeout { waited: timeout }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// Transport answering from a fixed command -> response table.
    struct TableTransport {
        responses: HashMap<&'static str, &'static str>,
        queries: Mutex<Vec<String>>,
    }

    impl TableTransport {
        fn new(table: &[(&'static str, &'static str)]) -> Self {
            Self {
                responses: table.iter().copied().collect(),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ScpiTransport for TableTransport {
        async fn query(&self, command: &str) -> SweepResult<String> {
            self.queries.lock().await.push(command.to_string());
            self.responses
                .get(command)
                .map(|r| (*r).to_string())
                .ok_or_else(|| SweepError::Readout(format!("unknown command {command}")))
        }

        async fn command(&self, _command: &str) -> SweepResult<()> {
            Ok(())
        }
    }

    #[test]
    fn parses_numbers_with_units_and_exponents() {
        assert_eq!(parse_scalar("1.23"), Some(1.23));
        assert_eq!(parse_scalar("  -4.2E-3 W\n"), Some(-0.0042));
        assert_eq!(parse_scalar("RBW 100e3Hz"), Some(100e3));
        assert_eq!(parse_scalar("ERROR"), None);
        assert_eq!(parse_scalar(""), None);
    }

    #[tokio::test]
    async fn falls_through_variants_in_priority_order() {
        // First two variants are unsupported; third answers with units.
        let transport = TableTransport::new(&[("POW:READ?", "0.00123 W")]);
        let value = query_scalar(&transport, POWER_QUERY_VARIANTS).await.unwrap();
        assert_eq!(value, 0.00123);
        let queries = transport.queries.lock().await;
        assert_eq!(queries.as_slice(), &["READ?", "MEAS:POW?", "POW:READ?"]);
    }

    #[tokio::test]
    async fn unparseable_responses_count_as_failures() {
        let transport = TableTransport::new(&[("READ?", "OVERRANGE"), ("MEAS:POW?", "nan")]);
        let err = query_scalar(&transport, &["READ?", "MEAS:POW?"]).await;
        assert!(matches!(err, Err(SweepError::Readout(_))));
    }

    #[tokio::test]
    async fn opc_handshake_accepts_one() {
        let transport = TableTransport::new(&[("*OPC?", "1")]);
        assert!(
            wait_operation_complete(&transport, Duration::from_millis(100))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn opc_handshake_rejects_other_answers() {
        let transport = TableTransport::new(&[("*OPC?", "0")]);
        assert!(matches!(
            wait_operation_complete(&transport, Duration::from_millis(100)).await,
            Err(SweepError::Readout(_))
        ));
    }
}
