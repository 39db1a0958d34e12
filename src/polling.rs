//! Waiting for asynchronous jobs and batches to finish.
//!
//! The server drives every state change, we only observe: fetch the status, stop on
//! `done` or `error`, give up once the deadline has passed, otherwise sleep for the
//! configured interval and try again. A job that ends in `error` is a normal return
//! value here. Only failing to talk to the server (or running out of time) is an `Err`.

use std::future::Future;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::client::Client;
use crate::error::{Error, Result};
use crate::models::{BatchStatus, CreatedJob, JobResult, JobState};
use crate::submission::Submission;

/// Anything carrying a server-side processing state
pub trait Pollable {
    fn state(&self) -> &JobState;
}

impl Pollable for JobResult {
    fn state(&self) -> &JobState {
        &self.status
    }
}

impl Pollable for BatchStatus {
    fn state(&self) -> &JobState {
        &self.status
    }
}

impl Client {
    pub async fn wait_for_job_done(&self, batch_ksuid: &str, job_ksuid: &str) -> Result<JobResult> {
        self.poll_until_terminal(None, || self.get_job_result(batch_ksuid, job_ksuid))
            .await
    }

    /// Same as [`Client::wait_for_job_done`], but stops early with `Error::Cancelled`
    /// once `cancel` fires
    pub async fn wait_for_job_done_cancellable(
        &self,
        batch_ksuid: &str,
        job_ksuid: &str,
        cancel: &CancellationToken,
    ) -> Result<JobResult> {
        self.poll_until_terminal(Some(cancel), || {
            self.get_job_result(batch_ksuid, job_ksuid)
        })
        .await
    }

    /// Waits for the batch itself and, with `wait_jobs`, then for every job in it, one
    /// after another in the order the server lists them. The first job that fails to
    /// finish aborts the whole wait.
    pub async fn wait_for_batch_done(
        &self,
        batch_ksuid: &str,
        wait_jobs: bool,
    ) -> Result<BatchStatus> {
        self.wait_batch(batch_ksuid, wait_jobs, None).await
    }

    pub async fn wait_for_batch_done_cancellable(
        &self,
        batch_ksuid: &str,
        wait_jobs: bool,
        cancel: &CancellationToken,
    ) -> Result<BatchStatus> {
        self.wait_batch(batch_ksuid, wait_jobs, Some(cancel)).await
    }

    /// `send_job` then wait on the returned id, which is both batch and job key
    pub async fn create_and_wait_job(
        &self,
        service: &str,
        submission: &Submission,
    ) -> Result<JobResult> {
        let CreatedJob { id, .. } = self.send_job(service, submission).await?;
        self.wait_for_job_done(&id, &id).await
    }

    pub async fn create_and_wait_batch(
        &self,
        service: &str,
        submission: &Submission,
        wait_jobs: bool,
    ) -> Result<BatchStatus> {
        let created = self.send_batch(service, submission).await?;
        self.wait_for_batch_done(&created.id, wait_jobs).await
    }

    async fn wait_batch(
        &self,
        batch_ksuid: &str,
        wait_jobs: bool,
        cancel: Option<&CancellationToken>,
    ) -> Result<BatchStatus> {
        let batch = self
            .poll_until_terminal(cancel, || self.get_batch_status(batch_ksuid))
            .await?;

        if wait_jobs {
            for job in batch.jobs.iter().flatten() {
                tracing::debug!("Waiting for job {} of batch {}", job.job_ksuid, batch_ksuid);
                self.poll_until_terminal(cancel, || {
                    self.get_job_result(batch_ksuid, &job.job_ksuid)
                })
                .await?;
            }
        }

        Ok(batch)
    }

    /// One fetch, one deadline check, one sleep, repeat. Unbounded in iterations, the
    /// wall-clock deadline is the only limit.
    async fn poll_until_terminal<T, F, Fut>(
        &self,
        cancel: Option<&CancellationToken>,
        mut fetch: F,
    ) -> Result<T>
    where
        T: Pollable,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let timeout = self.config().timeout;
        let interval = self.config().interval;
        let deadline = Instant::now() + timeout;

        loop {
            let current = fetch().await?;
            let state = current.state();

            if state.is_terminal() {
                tracing::info!("Reached terminal status {}", state);
                return Ok(current);
            }

            // strictly past the deadline, a zero timeout never sleeps
            if timeout.is_zero() || Instant::now() > deadline {
                tracing::warn!("Gave up after {} seconds (last status {})", timeout.as_secs(), state);
                return Err(Error::JobTimeout(timeout.as_secs()));
            }

            tracing::debug!("Status {}, checking again in {:?}", state, interval);
            match cancel {
                Some(cancel) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(interval) => {}
                    }
                }
                None => tokio::time::sleep(interval).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::HttpResponse;
    use crate::transport::mock::MockTransport;
    use reqwest::Method;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn client(mock: &Arc<MockTransport>, timeout: u64, interval: u64) -> Client {
        let mut client = Client::with_transport(mock.clone());
        client.set_base_url("http://api.local/v2");
        client.set_timeout(timeout);
        client.set_interval(interval);
        client
    }

    fn job(id: &str, status: &str) -> HttpResponse {
        HttpResponse::new(
            200,
            json!({
                "job_ksuid": id,
                "created_at": "2024-01-01T00:00:00Z",
                "service": "rg",
                "status": status,
            })
            .to_string(),
        )
    }

    fn batch(status: &str, jobs: &[&str]) -> HttpResponse {
        let jobs: Vec<_> = jobs
            .iter()
            .map(|id| {
                json!({
                    "job_ksuid": id,
                    "created_at": "2024-01-01T00:00:00Z",
                    "result_url": format!("http://api.local/v2/ocr/job/result/B/{}", id),
                    "status": "processing",
                })
            })
            .collect();
        HttpResponse::new(
            200,
            json!({
                "batch_ksuid": "B",
                "created_at": "2024-01-01T00:00:00Z",
                "service": "rg",
                "status": status,
                "jobs": jobs,
            })
            .to_string(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_fails_on_first_poll() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(Method::GET, "/ocr/job/result/", vec![job("J", "processing")]);
        let client = client(&mock, 0, 1);

        let err = client.wait_for_job_done("B", "J").await.unwrap_err();
        assert!(matches!(err, Error::JobTimeout(0)));
        assert_eq!(mock.count(Method::GET, "/ocr/job/result/"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_status_is_returned_not_raised() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(Method::GET, "/ocr/job/result/", vec![job("J", "error")]);
        let client = client(&mock, 0, 1);

        let result = client.wait_for_job_done("B", "J").await.unwrap();
        assert_eq!(result.status, JobState::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_done_sleeping_between_checks() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(
            Method::GET,
            "/ocr/job/result/B/J",
            vec![job("J", "waiting"), job("J", "processing"), job("J", "done")],
        );
        let client = client(&mock, 30, 2);

        let start = Instant::now();
        let result = client.wait_for_job_done("B", "J").await.unwrap();

        assert_eq!(result.status, JobState::Done);
        assert_eq!(mock.count(Method::GET, "/ocr/job/result/B/J"), 3);
        // two sleeps of two seconds each
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_deadline() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(Method::GET, "/ocr/job/result/", vec![job("J", "processing")]);
        let client = client(&mock, 3, 1);

        let err = client.wait_for_job_done("B", "J").await.unwrap_err();
        assert!(matches!(err, Error::JobTimeout(3)));
        // checks at t=0,1,2,3 still fit, the one at 4 is past the deadline
        assert_eq!(mock.count(Method::GET, "/ocr/job/result/"), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_exactly_at_deadline_keeps_polling() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(
            Method::GET,
            "/ocr/job/result/",
            vec![job("J", "processing"), job("J", "processing"), job("J", "done")],
        );
        let client = client(&mock, 2, 1);

        // third check lands on t=2, the deadline itself
        let result = client.wait_for_job_done("B", "J").await.unwrap();
        assert_eq!(result.status, JobState::Done);
        assert_eq!(mock.count(Method::GET, "/ocr/job/result/"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_freeform_status_keeps_polling() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(
            Method::GET,
            "/ocr/job/result/",
            vec![job("J", "validating"), job("J", "done")],
        );
        let client = client(&mock, 30, 1);

        let result = client.wait_for_job_done("B", "J").await.unwrap();
        assert_eq!(result.status, JobState::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_error_aborts_wait() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(
            Method::GET,
            "/ocr/job/result/",
            vec![job("J", "processing"), HttpResponse::new(404, "not found")],
        );
        let client = client(&mock, 30, 1);

        let err = client.wait_for_job_done("B", "J").await.unwrap_err();
        assert!(matches!(err, Error::Query { status: 404, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_waits_each_job_in_order() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(
            Method::GET,
            "/ocr/batch/status/B",
            vec![batch("processing", &[]), batch("done", &["J1", "J2", "J3"])],
        );
        mock.respond(Method::GET, "/ocr/job/result/B/J1", vec![job("J1", "done")]);
        mock.respond(Method::GET, "/ocr/job/result/B/J2", vec![job("J2", "error")]);
        mock.respond(Method::GET, "/ocr/job/result/B/J3", vec![job("J3", "done")]);
        let client = client(&mock, 30, 1);

        let status = client.wait_for_batch_done("B", true).await.unwrap();
        assert_eq!(status.status, JobState::Done);

        let job_fetches: Vec<_> = mock
            .requests()
            .into_iter()
            .filter(|r| r.url.contains("/ocr/job/result/"))
            .map(|r| r.url)
            .collect();
        assert_eq!(
            job_fetches,
            vec![
                "http://api.local/v2/ocr/job/result/B/J1",
                "http://api.local/v2/ocr/job/result/B/J2",
                "http://api.local/v2/ocr/job/result/B/J3",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_without_wait_jobs_skips_jobs() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(Method::GET, "/ocr/batch/status/B", vec![batch("done", &["J1"])]);
        let client = client(&mock, 30, 1);

        client.wait_for_batch_done("B", false).await.unwrap();
        assert_eq!(mock.count(Method::GET, "/ocr/job/result/"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_job_timeout_aborts_batch() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(Method::GET, "/ocr/batch/status/B", vec![batch("done", &["J1", "J2"])]);
        mock.respond(Method::GET, "/ocr/job/result/B/J1", vec![job("J1", "processing")]);
        mock.respond(Method::GET, "/ocr/job/result/B/J2", vec![job("J2", "done")]);
        let client = client(&mock, 2, 1);

        let err = client.wait_for_batch_done("B", true).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(mock.count(Method::GET, "/ocr/job/result/B/J2"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_sleep() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(Method::GET, "/ocr/job/result/", vec![job("J", "processing")]);
        let client = client(&mock, 600, 10);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(25)).await;
            trigger.cancel();
        });

        let err = client
            .wait_for_job_done_cancellable("B", "J", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        // t=0,10,20 then cancelled at 25
        assert_eq!(mock.count(Method::GET, "/ocr/job/result/"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_and_wait_job_uses_id_as_both_keys() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_json(
            Method::POST,
            "/ocr/job/rg",
            json!({
                "id": "K",
                "status_url": "http://api.local/v2/ocr/job/result/K",
                "exp": 100,
                "urls": {"document": "http://s3.local/document"},
            }),
        );
        mock.respond(Method::PUT, "s3.local", vec![HttpResponse::new(200, "")]);
        mock.respond(Method::GET, "/ocr/job/result/K/K", vec![job("K", "done")]);
        let client = client(&mock, 30, 1);

        let result = client
            .create_and_wait_job("rg", &Submission::bytes(b"doc".to_vec()))
            .await
            .unwrap();
        assert_eq!(result.job_ksuid, "K");
    }
}
