// Enqueue Use Case

use crate::domain::{Job, JobId, JobPayload, JobType};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, JobRepository, TimeProvider};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Maximum length of a job type name
pub const MAX_JOB_TYPE_LEN: usize = 64;

/// Maximum serialized payload size (1 MiB)
pub const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Enqueue request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueRequest {
    /// Pre-assigned id, for callers that must reference the job before it exists
    #[serde(default)]
    pub job_id: Option<JobId>,
    pub job_type: String,
    pub payload: serde_json::Value,
}

/// Validate request shape before touching the store
pub fn validate_request(req: &EnqueueRequest) -> Result<()> {
    if req.job_type.is_empty() {
        return Err(AppError::Validation("job type cannot be empty".to_string()));
    }
    if req.job_type.len() > MAX_JOB_TYPE_LEN {
        return Err(AppError::Validation(format!(
            "job type too long: {} > {}",
            req.job_type.len(),
            MAX_JOB_TYPE_LEN
        )));
    }
    if !req
        .job_type
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(AppError::Validation(format!(
            "job type must be alphanumeric with '.', '_' or '-': {}",
            req.job_type
        )));
    }
    if let Some(id) = &req.job_id {
        if id.is_empty() {
            return Err(AppError::Validation("job id cannot be empty".to_string()));
        }
    }

    let payload_len = serde_json::to_vec(&req.payload)?.len();
    if payload_len > MAX_PAYLOAD_BYTES {
        return Err(AppError::Validation(format!(
            "payload too large: {} bytes",
            payload_len
        )));
    }
    Ok(())
}

/// Insert a new QUEUED job and return its id
///
/// # Errors
/// - AppError::Validation on a malformed request
/// - AppError::Database when the store write fails
pub async fn execute(
    job_repo: &dyn JobRepository,
    id_provider: &dyn IdProvider,
    time_provider: &dyn TimeProvider,
    req: EnqueueRequest,
) -> Result<JobId> {
    validate_request(&req)?;

    let job_id = req.job_id.unwrap_or_else(|| id_provider.generate_id());
    let created_at = time_provider.now_millis();

    let job = Job::new(
        job_id.clone(),
        created_at,
        JobType::new(req.job_type),
        JobPayload::new(req.payload),
    );
    job_repo.insert(&job).await?;

    info!(job_id = %job.id, job_type = %job.job_type, "Job enqueued");
    Ok(job_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(job_type: &str) -> EnqueueRequest {
        EnqueueRequest {
            job_id: None,
            job_type: job_type.to_string(),
            payload: json!({}),
        }
    }

    #[test]
    fn test_validate_job_type_empty() {
        let result = validate_request(&request(""));
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_validate_job_type_too_long() {
        let result = validate_request(&request(&"a".repeat(MAX_JOB_TYPE_LEN + 1)));
        assert!(result.unwrap_err().to_string().contains("too long"));
    }

    #[test]
    fn test_validate_job_type_invalid_chars() {
        let result = validate_request(&request("scan directory!"));
        assert!(result.unwrap_err().to_string().contains("alphanumeric"));
    }

    #[test]
    fn test_validate_payload_too_large() {
        let mut req = request("scan.directory");
        req.payload = json!({ "blob": "x".repeat(MAX_PAYLOAD_BYTES) });
        let result = validate_request(&req);
        assert!(result.unwrap_err().to_string().contains("too large"));
    }

    #[test]
    fn test_validate_scan_type_ok() {
        assert!(validate_request(&request("scan.directory")).is_ok());
    }
}
