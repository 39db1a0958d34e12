use crate::client::{Client, QueryParams, check_status, decode};
use crate::config::{RETURN_ATTRIBUTE, RETURN_REQUEST, RETURN_STORAGE};
use crate::error::{Error, Result};
use crate::models::{BatchInfo, BatchResultStorage, BatchStatus, JobInfo, JobResult, JobsPage};
use serde::de::DeserializeOwned;

impl Client {
    /// Status (and once done, result) of one job. For a standalone job pass its id
    /// as both keys.
    pub async fn get_job_result(&self, batch_ksuid: &str, job_ksuid: &str) -> Result<JobResult> {
        let url = self.api_url(&["ocr", "job", "result", batch_ksuid, job_ksuid]);
        self.query(&url, &QueryParams::new()).await
    }

    pub async fn get_batch_status(&self, batch_ksuid: &str) -> Result<BatchStatus> {
        let url = self.api_url(&["ocr", "batch", "status", batch_ksuid]);
        self.query(&url, &QueryParams::new()).await
    }

    pub async fn get_job_info(&self, job_id: &str) -> Result<JobInfo> {
        let url = self.api_url(&["ocr", "job", "info", job_id]);
        self.query(&url, &QueryParams::new()).await
    }

    pub async fn get_batch_info(&self, batch_id: &str) -> Result<BatchInfo> {
        let url = self.api_url(&["ocr", "batch", "info", batch_id]);
        self.query(&url, &QueryParams::new()).await
    }

    /// Results of every job in a batch, returned in the response body
    pub async fn get_batch_result(&self, batch_ksuid: &str) -> Result<Vec<JobResult>> {
        let url = self.api_url(&["ocr", "batch", "result", batch_ksuid]);
        let params = QueryParams::new().with(RETURN_ATTRIBUTE, RETURN_REQUEST);
        self.query(&url, &params).await
    }

    /// Same results, but written to object storage by the server. Returns where.
    pub async fn get_batch_result_storage(
        &self,
        batch_ksuid: &str,
        params: &QueryParams,
    ) -> Result<BatchResultStorage> {
        let url = self.api_url(&["ocr", "batch", "result", batch_ksuid]);
        let mut params = params.clone();
        params.insert(RETURN_ATTRIBUTE, RETURN_STORAGE);
        self.query(&url, &params).await
    }

    /// Every job created between `start` and `end`, following `nextPageToken` until the
    /// server stops sending one. Server order is kept within and across pages.
    pub async fn get_jobs(&self, start: &str, end: &str) -> Result<Vec<JobResult>> {
        let url = self.api_url(&["ocr", "job", "results"]);
        let mut params = QueryParams::new()
            .with("startDate", start)
            .with("endDate", end);

        let mut jobs = Vec::new();
        loop {
            let page: JobsPage = self.query(&url, &params).await?;
            tracing::debug!("Fetched page with {} jobs", page.jobs.len());
            jobs.extend(page.jobs);

            match page.next_page_token {
                Some(token) if !token.is_empty() => params.insert("nextPageToken", token),
                _ => break,
            }
        }

        Ok(jobs)
    }

    async fn query<T: DeserializeOwned>(&self, url: &str, params: &QueryParams) -> Result<T> {
        let response = self.get(url, params).await?;
        let response = check_status(response, |status, body| Error::Query { status, body })?;
        decode(&response)
    }
}
