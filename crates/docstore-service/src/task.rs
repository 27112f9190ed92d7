use crate::error::{ServiceError, ServiceResult, Target};

/// Run repository work on tokio's blocking pool.
///
/// A panic or cancellation of the blocking task surfaces as
/// [`ServiceError::Worker`].
pub(crate) async fn run_blocking<R, F>(op: &'static str, target: Target, f: F) -> ServiceResult<R>
where
    F: FnOnce() -> ServiceResult<R> + Send + 'static,
    R: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => Err(ServiceError::worker(op, target, e)),
    }
}
