use crate::chart_version::FreshnessChecker;
use crate::cmd::helm::HelmError;
use crate::helm::ChartRequest;
use crate::runtime::TaskSupervisor;
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;

#[derive(Error, Debug)]
pub enum DeclareError {
    #[error(transparent)]
    Helm(#[from] HelmError),

    #[error("release `{release_name}` has been rejected: {msg}")]
    Rejected { release_name: String, msg: String },
}

/// What the engine reports back once a release is declared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeclaredRelease {
    pub release_name: String,
    pub chart: String,
    pub namespace: String,
    pub version: Option<String>,
}

impl From<&ChartRequest> for DeclaredRelease {
    fn from(request: &ChartRequest) -> Self {
        DeclaredRelease {
            release_name: request.release_name().to_string(),
            chart: request.chart().to_string(),
            namespace: request.namespace().to_string(),
            version: request.version().map(|v| v.to_string()),
        }
    }
}

/// Boundary with the engine reconciling releases.
pub trait ReleaseDeclarator: Send + Sync {
    fn declare(&self, request: &ChartRequest) -> Result<DeclaredRelease, DeclareError>;
}

impl<F> ReleaseDeclarator for F
where
    F: Fn(&ChartRequest) -> Result<DeclaredRelease, DeclareError> + Send + Sync,
{
    fn declare(&self, request: &ChartRequest) -> Result<DeclaredRelease, DeclareError> {
        self(request)
    }
}

/// Declares `request` through `declarator`, checking its chart version freshness on the side.
///
/// The check only runs when the request pins a version and a repository. It never delays
/// nor fails the declaration, its outcome is only logged.
pub fn declare_with_freshness_check<D>(
    declarator: &D,
    request: &ChartRequest,
    checker: &Arc<FreshnessChecker>,
    supervisor: &TaskSupervisor,
) -> Result<DeclaredRelease, DeclareError>
where
    D: ReleaseDeclarator + ?Sized,
{
    schedule_freshness_check(request, checker, supervisor);
    declarator.declare(request)
}

fn schedule_freshness_check(request: &ChartRequest, checker: &Arc<FreshnessChecker>, supervisor: &TaskSupervisor) {
    if request.freshness_target().is_none() {
        debug!(
            "No freshness check for release '{}', version or repository missing.",
            request.release_name()
        );
        return;
    }

    let span = info_span!(
        "freshness_check",
        release = request.release_name(),
        chart = request.chart()
    );
    let checker = checker.clone();
    let request = request.clone();

    supervisor.spawn_detached(
        &format!("freshness-check-{}", request.release_name()),
        async move {
            checker.check_release(&request).await;
        }
        .instrument(span),
    );
}

/// Any declarator, with freshness checks.
pub struct WatchedDeclarator<D> {
    inner: D,
    checker: Arc<FreshnessChecker>,
    supervisor: Arc<TaskSupervisor>,
}

impl<D: ReleaseDeclarator> WatchedDeclarator<D> {
    pub fn new(inner: D, checker: Arc<FreshnessChecker>, supervisor: Arc<TaskSupervisor>) -> WatchedDeclarator<D> {
        WatchedDeclarator {
            inner,
            checker,
            supervisor,
        }
    }

    pub fn supervisor(&self) -> &Arc<TaskSupervisor> {
        &self.supervisor
    }
}

impl<D: ReleaseDeclarator> ReleaseDeclarator for WatchedDeclarator<D> {
    fn declare(&self, request: &ChartRequest) -> Result<DeclaredRelease, DeclareError> {
        declare_with_freshness_check(&self.inner, request, &self.checker, &self.supervisor)
    }
}
