//! Placeholder `CREATE_POST` handler — the actual third-party posting
//! interaction is explicitly out of scope (spec.md §1 "treated as a
//! plug-in job handler"). Production deployments register their own
//! `JobHandler` here in place of this one; this repo only owns the
//! contract and the queueing/scheduling/control-plane machinery around
//! whatever implementation gets plugged in.

use async_trait::async_trait;

use dispatch_core::{ErrorCode, HandlerContext, HandlerOutcome, Job, JobHandler};

pub struct UnimplementedCreatePostHandler;

#[async_trait]
impl JobHandler for UnimplementedCreatePostHandler {
    async fn handle(&self, job: &Job, ctx: &HandlerContext) -> HandlerOutcome {
        ctx.log(
            tracing::Level::WARN,
            "no CREATE_POST handler plugged in; failing job as UNKNOWN",
        );
        HandlerOutcome::Err {
            error_code: ErrorCode::Unknown,
            message: format!(
                "CREATE_POST has no registered handler (job {}, payload {})",
                job.id, job.payload
            ),
        }
    }

    // System-adjacent placeholder; keep the default concurrency of 1 since
    // the real posting handler this stands in for is per-user-session
    // bound (spec.md §4.3).
    fn concurrency(&self) -> usize {
        1
    }
}
