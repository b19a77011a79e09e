use crate::types::{JudgeJob, JudgeReport};
use redis::{AsyncCommands, RedisResult};

/// Redis queue semantics shared by the match service and the judge worker.
/// Key names are deterministic so both sides never drift.

pub const QUEUE_KEY: &str = "codeduel:queue";
pub const RESULT_PREFIX: &str = "codeduel:result";
pub const CANCEL_PREFIX: &str = "codeduel:cancel";

/// Results and cancel flags expire after 24 hours
pub const KEY_TTL_SECONDS: u64 = 86400;

pub fn result_key(job_id: &uuid::Uuid) -> String {
    format!("{}:{}", RESULT_PREFIX, job_id)
}

pub fn cancel_key(job_id: &uuid::Uuid) -> String {
    format!("{}:{}", CANCEL_PREFIX, job_id)
}

fn serde_error(context: &'static str, e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, context, e.to_string()))
}

/// Push a submission onto the judge queue (RPUSH, FIFO with BLPOP)
pub async fn push_job(
    conn: &mut redis::aio::ConnectionManager,
    job: &JudgeJob,
) -> RedisResult<()> {
    let payload = serde_json::to_string(job).map_err(|e| serde_error("serialization error", e))?;
    conn.rpush(QUEUE_KEY, payload).await
}

/// Pop the next submission, waiting at most `timeout_seconds`
pub async fn pop_job(
    conn: &mut redis::aio::ConnectionManager,
    timeout_seconds: f64,
) -> RedisResult<Option<JudgeJob>> {
    let result: Option<(String, String)> = conn.blpop(QUEUE_KEY, timeout_seconds).await?;

    match result {
        Some((_key, payload)) => {
            let job: JudgeJob =
                serde_json::from_str(&payload).map_err(|e| serde_error("deserialization error", e))?;
            Ok(Some(job))
        }
        None => Ok(None),
    }
}

pub async fn store_report(
    conn: &mut redis::aio::ConnectionManager,
    report: &JudgeReport,
) -> RedisResult<()> {
    let payload = serde_json::to_string(report).map_err(|e| serde_error("serialization error", e))?;
    let _: () = conn.set_ex(result_key(&report.job_id), payload, KEY_TTL_SECONDS).await?;
    Ok(())
}

pub async fn get_report(
    conn: &mut redis::aio::ConnectionManager,
    job_id: &uuid::Uuid,
) -> RedisResult<Option<JudgeReport>> {
    let payload: Option<String> = conn.get(result_key(job_id)).await?;

    match payload {
        Some(data) => {
            let report: JudgeReport =
                serde_json::from_str(&data).map_err(|e| serde_error("deserialization error", e))?;
            Ok(Some(report))
        }
        None => Ok(None),
    }
}

/// Flag a submission as abandoned; the worker terminates it at its next check
pub async fn cancel_job(
    conn: &mut redis::aio::ConnectionManager,
    job_id: &uuid::Uuid,
) -> RedisResult<()> {
    let _: () = conn.set_ex(cancel_key(job_id), "1", KEY_TTL_SECONDS).await?;
    Ok(())
}

pub async fn is_job_cancelled(
    conn: &mut redis::aio::ConnectionManager,
    job_id: &uuid::Uuid,
) -> RedisResult<bool> {
    conn.exists(cancel_key(job_id)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_result_key_deterministic() {
        let id = Uuid::new_v4();
        assert_eq!(result_key(&id), result_key(&id));
        assert!(result_key(&id).starts_with("codeduel:result:"));
    }

    #[test]
    fn test_cancel_key_format() {
        let id = Uuid::new_v4();
        let key = cancel_key(&id);
        assert!(key.starts_with("codeduel:cancel:"));
        assert!(key.ends_with(&id.to_string()));
    }
}
