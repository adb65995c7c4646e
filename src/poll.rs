//! Issuance polling.
//!
//! After validation material is in place, the request sits in
//! `pending_validation` until the authority's checker comes around. The only
//! exits are issuance, a terminal failure from the authority, or cancellation;
//! transient fetch errors merely skip a tick. There is deliberately no
//! attempt cap — the renewal loop's cadence is the retry policy.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{
    api,
    client::Authority,
    error::{Error, Result},
};

/// How waiting for issuance ended, short of an error.
#[derive(Debug)]
pub enum PollOutcome {
    /// The authority issued the certificate; the final request object is
    /// carried along for download and key retrieval.
    Issued(api::Certificate),

    /// Shutdown was requested; no further polling happened.
    Cancelled,
}

/// Polls request status every `interval` until a terminal state or
/// cancellation.
///
/// Cancellation races every sleep and wins over an in-flight tick, so
/// shutdown latency is bounded by a fraction of `interval`, not by the time
/// to issuance.
pub(crate) async fn wait_for_issuance(
    authority: &Authority,
    id: &str,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<PollOutcome> {
    log::info!("waiting for issuance of request {id}");

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                log::info!("cancelled while waiting for issuance of {id}");
                return Ok(PollOutcome::Cancelled);
            }

            _ = tokio::time::sleep(interval) => {}
        }

        let request = match authority.fetch_status(id).await {
            Ok(request) => request,
            Err(err) => {
                log::error!("status fetch for {id} failed: {err}");
                continue;
            }
        };

        log::info!("request {id} status: {}", request.status);

        if request.is_issued() {
            return Ok(PollOutcome::Issued(request));
        }

        if request.is_terminal_failure() {
            return Err(Error::IssuanceFailed {
                id: id.to_owned(),
                status: request.status,
            });
        }

        if !request.is_pending() {
            log::warn!(
                "unexpected status {:?} for request {id}, continuing to wait",
                request.status
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::client::Authority;

    fn authority_for(url: &str) -> Authority {
        Authority::new("test-key").unwrap().with_api_url(url)
    }

    #[tokio::test]
    async fn resolves_on_third_tick() {
        let server = crate::test::with_authority_server();
        server
            .state
            .script_statuses(["draft", "pending_validation", "issued"]);

        let authority = authority_for(&server.api_url);
        let cancel = CancellationToken::new();

        let outcome =
            wait_for_issuance(&authority, "abc123", Duration::from_millis(10), &cancel)
                .await
                .unwrap();

        match outcome {
            PollOutcome::Issued(request) => assert!(request.is_issued()),
            other => panic!("expected issued, got {other:?}"),
        }
        assert_eq!(server.state.status_fetches(), 3);
    }

    #[tokio::test]
    async fn terminal_failure_stops_polling() {
        let server = crate::test::with_authority_server();
        server.state.script_statuses(["draft", "cancelled"]);

        let authority = authority_for(&server.api_url);
        let cancel = CancellationToken::new();

        let err = wait_for_issuance(&authority, "abc123", Duration::from_millis(10), &cancel)
            .await
            .unwrap_err();

        match err {
            Error::IssuanceFailed { id, status } => {
                assert_eq!(id, "abc123");
                assert_eq!(status, "cancelled");
            }
            other => panic!("expected IssuanceFailed, got {other:?}"),
        }
        assert_eq!(server.state.status_fetches(), 2);
    }

    #[tokio::test]
    async fn unknown_statuses_are_transient() {
        let server = crate::test::with_authority_server();
        server
            .state
            .script_statuses(["revoked_or_something", "issued"]);

        let authority = authority_for(&server.api_url);
        let cancel = CancellationToken::new();

        let outcome =
            wait_for_issuance(&authority, "abc123", Duration::from_millis(10), &cancel)
                .await
                .unwrap();
        assert!(matches!(outcome, PollOutcome::Issued(_)));
    }

    #[tokio::test]
    async fn cancellation_beats_the_tick() {
        let server = crate::test::with_authority_server();
        server.state.script_statuses(["pending_validation"]);

        let authority = authority_for(&server.api_url);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        // the poll interval is far longer than the cancellation delay; a
        // prompt return proves cancellation does not wait out the tick
        let started = Instant::now();
        let outcome = wait_for_issuance(&authority, "abc123", Duration::from_secs(30), &cancel)
            .await
            .unwrap();

        assert!(matches!(outcome, PollOutcome::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
