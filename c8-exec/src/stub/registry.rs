//! Server-side async job registry.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::RwLock;

use c8_domain::{JobStatus, Request, Response};

/// One stored job.
#[derive(Debug, Clone)]
pub(crate) struct JobRecord {
    pub(crate) status: JobStatus,
    /// Request still to run while the job is held pending
    pub(crate) request: Option<Request>,
    /// Stored response once the job has run
    pub(crate) response: Option<Response>,
    pub(crate) created_at: DateTime<Utc>,
}

/// Outcome of a result fetch.
#[derive(Debug)]
pub(crate) enum Fetch {
    Missing,
    Pending,
    Cancelled,
    Done(Response),
}

/// Jobs by numeric id, in submission order.
pub(crate) struct JobRegistry {
    jobs: RwLock<BTreeMap<u64, JobRecord>>,
    counter: RwLock<u64>,
}

impl JobRegistry {
    pub(crate) fn new() -> Self {
        Self {
            jobs: RwLock::new(BTreeMap::new()),
            counter: RwLock::new(0),
        }
    }

    /// Store a job that already ran.
    pub(crate) fn store_done(&self, response: Response) -> String {
        self.insert(JobRecord {
            status: JobStatus::Done,
            request: None,
            response: Some(response),
            created_at: Utc::now(),
        })
    }

    /// Store a job whose request runs later.
    pub(crate) fn store_pending(&self, request: Request) -> String {
        self.insert(JobRecord {
            status: JobStatus::Pending,
            request: Some(request),
            response: None,
            created_at: Utc::now(),
        })
    }

    fn insert(&self, record: JobRecord) -> String {
        let id = {
            let mut counter = self.counter.write().unwrap();
            *counter += 1;
            *counter
        };
        self.jobs.write().unwrap().insert(id, record);
        id.to_string()
    }

    pub(crate) fn status(&self, id: &str) -> Option<JobStatus> {
        let id = parse_id(id)?;
        self.jobs.read().unwrap().get(&id).map(|record| record.status)
    }

    /// Fetch a result. Failed results are removed on fetch; successful ones
    /// only when `consume` is set.
    pub(crate) fn fetch(&self, id: &str, consume: bool) -> Fetch {
        let Some(id) = parse_id(id) else {
            return Fetch::Missing;
        };

        let mut jobs = self.jobs.write().unwrap();
        let Some(record) = jobs.get(&id) else {
            return Fetch::Missing;
        };

        match (record.status, &record.response) {
            (JobStatus::Pending, _) => Fetch::Pending,
            (JobStatus::Cancelled, _) => Fetch::Cancelled,
            (JobStatus::Done, None) => Fetch::Missing,
            (JobStatus::Done, Some(response)) => {
                let response = response.clone();
                if consume || !response.is_success() {
                    jobs.remove(&id);
                }
                Fetch::Done(response)
            },
        }
    }

    /// Cancel a pending job. False if missing or no longer pending.
    pub(crate) fn cancel(&self, id: &str) -> bool {
        let Some(id) = parse_id(id) else {
            return false;
        };

        let mut jobs = self.jobs.write().unwrap();
        match jobs.get_mut(&id) {
            Some(record) if record.status == JobStatus::Pending => {
                record.status = JobStatus::Cancelled;
                record.request = None;
                true
            },
            _ => false,
        }
    }

    pub(crate) fn remove(&self, id: &str) -> bool {
        parse_id(id)
            .map(|id| self.jobs.write().unwrap().remove(&id).is_some())
            .unwrap_or(false)
    }

    pub(crate) fn clear_all(&self) -> usize {
        let mut jobs = self.jobs.write().unwrap();
        let removed = jobs.len();
        jobs.clear();
        removed
    }

    /// Remove records created before `stamp`.
    pub(crate) fn clear_expired(&self, stamp: DateTime<Utc>) -> usize {
        let mut jobs = self.jobs.write().unwrap();
        let before = jobs.len();
        jobs.retain(|_, record| record.created_at >= stamp);
        before - jobs.len()
    }

    /// Up to `count` ids with the given status, oldest first.
    pub(crate) fn list(&self, status: JobStatus, count: usize) -> Vec<String> {
        self.jobs
            .read()
            .unwrap()
            .iter()
            .filter(|(_, record)| record.status == status)
            .take(count)
            .map(|(id, _)| id.to_string())
            .collect()
    }

    /// Requests of held jobs, oldest first.
    pub(crate) fn pending_requests(&self) -> Vec<(String, Request)> {
        self.jobs
            .read()
            .unwrap()
            .iter()
            .filter(|(_, record)| record.status == JobStatus::Pending)
            .filter_map(|(id, record)| record.request.clone().map(|r| (id.to_string(), r)))
            .collect()
    }

    /// Finish a held job. Ignored if it was cancelled or cleared meanwhile.
    pub(crate) fn complete(&self, id: &str, response: Response) -> bool {
        let Some(id) = parse_id(id) else {
            return false;
        };

        let mut jobs = self.jobs.write().unwrap();
        match jobs.get_mut(&id) {
            Some(record) if record.status == JobStatus::Pending => {
                record.status = JobStatus::Done;
                record.request = None;
                record.response = Some(response);
                true
            },
            _ => false,
        }
    }

    /// Overwrite a job's status regardless of transition rules.
    pub(crate) fn force_status(&self, id: &str, status: JobStatus) {
        if let Some(id) = parse_id(id) {
            if let Some(record) = self.jobs.write().unwrap().get_mut(&id) {
                record.status = status;
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.jobs.read().unwrap().len()
    }
}

fn parse_id(id: &str) -> Option<u64> {
    id.parse().ok()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use c8_domain::Method;
    use serde_json::json;

    fn request() -> Request {
        Request::builder(Method::Get, "/_api/collection").build()
    }

    #[test]
    fn test_ids_are_issued_in_order() {
        let registry = JobRegistry::new();

        let first = registry.store_done(Response::new(200, json!({})));
        let second = registry.store_pending(request());

        assert_eq!(first, "1");
        assert_eq!(second, "2");
        assert_eq!(registry.list(JobStatus::Done, 10), vec!["1".to_string()]);
        assert_eq!(registry.list(JobStatus::Pending, 10), vec!["2".to_string()]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_failed_result_is_removed_on_fetch() {
        let registry = JobRegistry::new();
        let ok = registry.store_done(Response::new(200, json!({"result": [1]})));
        let failed = registry.store_done(Response::error(400, 1501, "syntax error"));

        assert!(matches!(registry.fetch(&ok, false), Fetch::Done(_)));
        assert!(matches!(registry.fetch(&ok, false), Fetch::Done(_)));

        assert!(matches!(registry.fetch(&failed, false), Fetch::Done(_)));
        assert!(matches!(registry.fetch(&failed, false), Fetch::Missing));

        assert!(matches!(registry.fetch(&ok, true), Fetch::Done(_)));
        assert!(matches!(registry.fetch(&ok, true), Fetch::Missing));
    }

    #[test]
    fn test_cancel_only_pending() {
        let registry = JobRegistry::new();
        let pending = registry.store_pending(request());
        let done = registry.store_done(Response::new(200, json!({})));

        assert!(registry.cancel(&pending));
        assert!(!registry.cancel(&pending));
        assert!(!registry.cancel(&done));
        assert!(!registry.cancel("nope"));
        assert_eq!(registry.status(&pending), Some(JobStatus::Cancelled));
        assert!(matches!(registry.fetch(&pending, false), Fetch::Cancelled));
    }

    #[test]
    fn test_complete_skips_cancelled_jobs() {
        let registry = JobRegistry::new();
        let id = registry.store_pending(request());
        registry.cancel(&id);

        assert!(!registry.complete(&id, Response::new(200, json!({}))));
        assert!(registry.pending_requests().is_empty());
    }

    #[test]
    fn test_clear_expired_and_all() {
        let registry = JobRegistry::new();
        registry.store_done(Response::new(200, json!({})));
        let cutoff = Utc::now() + chrono::Duration::seconds(1);

        assert_eq!(registry.clear_expired(cutoff), 1);

        registry.store_done(Response::new(200, json!({})));
        registry.store_pending(request());
        assert_eq!(registry.clear_all(), 2);
        assert_eq!(registry.len(), 0);
    }
}
