use chrono::Utc;
use codeduel_common::redis;
use codeduel_common::types::{JobStatus, JudgeJob, JudgeReport, JudgingResult};
use codeduel_judge::{ExecutionService, Judge, JudgeError};
use ::redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// BLPOP timeout; bounds how long shutdown waits on an idle queue
const POP_TIMEOUT_SECONDS: f64 = 5.0;
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub fn build_report(job_id: uuid::Uuid, outcome: Result<JudgingResult, JudgeError>) -> JudgeReport {
    let (status, result, error) = match outcome {
        Ok(result) => (JobStatus::Completed, Some(result), None),
        Err(JudgeError::Cancelled) => (JobStatus::Cancelled, None, None),
        Err(e) => (JobStatus::Failed, None, Some(e.to_string())),
    };

    JudgeReport {
        job_id,
        status,
        result,
        error,
        judged_at: Utc::now(),
    }
}

/// Polls the job's cancel flag and fires `token` once it is set
fn spawn_cancel_watcher(
    mut conn: ConnectionManager,
    job_id: uuid::Uuid,
    token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(CANCEL_POLL_INTERVAL) => {}
            }

            match redis::is_job_cancelled(&mut conn, &job_id).await {
                Ok(true) => {
                    info!(job_id = %job_id, "Cancellation requested");
                    token.cancel();
                    return;
                }
                Ok(false) => {}
                Err(e) => debug!(job_id = %job_id, error = %e, "Cancel flag check failed"),
            }
        }
    })
}

#[instrument(skip_all, fields(job_id = %job.id, language = %job.language))]
async fn process_job(
    judge: &Judge<ExecutionService>,
    conn: &mut ConnectionManager,
    job: JudgeJob,
    shutdown: &CancellationToken,
) {
    let job_id = job.id;
    info!(
        test_cases = job.test_cases.len(),
        source_size = job.code.len(),
        time_limit_ms = ?job.time_limit_ms,
        "Received job"
    );

    match redis::is_job_cancelled(conn, &job_id).await {
        Ok(true) => {
            info!("Job was cancelled before judging");
            persist(conn, &build_report(job_id, Err(JudgeError::Cancelled))).await;
            return;
        }
        Ok(false) => {}
        Err(e) => warn!(error = %e, "Cancel flag check failed, judging anyway"),
    }

    let job_cancel = shutdown.child_token();
    let watcher = spawn_cancel_watcher(conn.clone(), job_id, job_cancel.clone());

    let start = std::time::Instant::now();
    let outcome = judge.judge_job(&job, &job_cancel).await;
    watcher.abort();

    // Interrupted by shutdown rather than by the match service: hand the job
    // back so another worker picks it up
    if matches!(outcome, Err(JudgeError::Cancelled)) && shutdown.is_cancelled() {
        warn!("Shutdown interrupted job, requeueing");
        if let Err(e) = redis::push_job(conn, &job).await {
            error!(error = %e, "Failed to requeue job");
        }
        return;
    }

    let report = build_report(job_id, outcome);
    info!(
        status = ?report.status,
        score = report.result.as_ref().map(|r| r.score),
        execution_ms = start.elapsed().as_millis() as u64,
        "Job finished"
    );
    if let Some(e) = &report.error {
        error!(error = %e, "Judging failed");
    }

    persist(conn, &report).await;
}

async fn persist(conn: &mut ConnectionManager, report: &JudgeReport) {
    match redis::store_report(conn, report).await {
        Ok(()) => info!(job_id = %report.job_id, "Report persisted to Redis"),
        // Non-fatal - worker continues
        Err(e) => error!(job_id = %report.job_id, error = %e, "Failed to persist report"),
    }
}

pub async fn run(
    judge: Arc<Judge<ExecutionService>>,
    mut conn: ConnectionManager,
    shutdown: CancellationToken,
) {
    info!("Worker loop started on {}", redis::QUEUE_KEY);

    while !shutdown.is_cancelled() {
        let popped = tokio::select! {
            popped = redis::pop_job(&mut conn, POP_TIMEOUT_SECONDS) => popped,
            _ = shutdown.cancelled() => break,
        };

        match popped {
            Ok(Some(job)) => process_job(&judge, &mut conn, job, &shutdown).await,
            Ok(None) => continue,
            Err(e) => {
                error!(error = %e, "Redis error");
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    _ = shutdown.cancelled() => break,
                }
            }
        }
    }

    info!("Worker loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeduel_judge::ExecutionError;

    #[test]
    fn test_completed_report() {
        let result = JudgingResult {
            score: 7.5,
            passed_tests: 2,
            total_tests: 3,
            outcomes: vec![],
        };
        let id = uuid::Uuid::new_v4();
        let report = build_report(id, Ok(result.clone()));
        assert_eq!(report.job_id, id);
        assert_eq!(report.status, JobStatus::Completed);
        assert_eq!(report.result, Some(result));
        assert!(report.error.is_none());
    }

    #[test]
    fn test_cancelled_report() {
        let report = build_report(uuid::Uuid::new_v4(), Err(JudgeError::Cancelled));
        assert_eq!(report.status, JobStatus::Cancelled);
        assert!(report.result.is_none());
        assert!(report.error.is_none());
    }

    #[test]
    fn test_infrastructure_failure_report() {
        let err = JudgeError::Infrastructure {
            test_index: 2,
            source: ExecutionError::RateLimited,
        };
        let report = build_report(uuid::Uuid::new_v4(), Err(err));
        assert_eq!(report.status, JobStatus::Failed);
        assert!(report.error.unwrap().contains('2'));
    }

    #[test]
    fn test_report_serializes_status_lowercase() {
        let report = build_report(uuid::Uuid::new_v4(), Err(JudgeError::Cancelled));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "cancelled");
    }
}
