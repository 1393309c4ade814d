//! Command handlers. Each builds a report from the plugin host.

use trellis_plugins::{LoadOutcome, PluginError, PluginHost};

use crate::errors::AppError;
use crate::output::{BlockedView, CandidateView, ListReport, PlanReport, PluginView, ScanReport};

pub(crate) fn scan(host: &PluginHost) -> ScanReport {
    ScanReport {
        candidates: host.scan().iter().map(CandidateView::from).collect(),
    }
}

pub(crate) fn list(host: &PluginHost) -> ListReport {
    let LoadOutcome { catalog, errors } = host.load_all(host.scan());
    ListReport {
        plugins: catalog.iter().map(PluginView::from).collect(),
        errors: messages(&errors),
    }
}

/// Resolves `ids`, or the configured selection when `ids` is empty.
pub(crate) fn plan(host: &PluginHost, ids: &[String]) -> Result<PlanReport, AppError> {
    let LoadOutcome { catalog, errors } = host.load_all(host.scan());
    let requested = if ids.is_empty() {
        host.requested_ids(&catalog)?
    } else {
        ids.to_vec()
    };
    let resolution = host.resolve(&catalog, &requested);
    let plan = resolution.plan();
    Ok(PlanReport {
        requested,
        order: plan.ids().to_vec(),
        waves: plan.waves(),
        failures: messages(resolution.failures()),
        blocked: resolution
            .blocked()
            .iter()
            .filter_map(BlockedView::from_error)
            .collect(),
        load_errors: messages(&errors),
    })
}

fn messages(errors: &[PluginError]) -> Vec<String> {
    errors.iter().map(ToString::to_string).collect()
}
