//! Hook invocation with panic capture and optional time limits.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crate::context::PluginContext;
use crate::error::PluginError;
use crate::plugin::{HookError, HookPhase, Plugin};

/// Runs one hook of `entry` on behalf of plugin `id`.
///
/// Without a limit the hook runs on the calling thread. With a limit it runs
/// on a dedicated thread; if the limit elapses the context is revoked and
/// the thread is abandoned.
pub(super) fn run(
    id: &str,
    phase: HookPhase,
    entry: &Arc<dyn Plugin>,
    context: &PluginContext,
    limit: Option<Duration>,
) -> Result<(), PluginError> {
    let result = match limit {
        None => invoke(entry.as_ref(), phase, context),
        Some(limit) => invoke_with_limit(Arc::clone(entry), phase, context, limit),
    };
    result.map_err(|source| PluginError::hook(id, phase, source))
}

fn invoke(entry: &dyn Plugin, phase: HookPhase, context: &PluginContext) -> Result<(), HookError> {
    panic::catch_unwind(AssertUnwindSafe(|| match phase {
        HookPhase::Configure => entry.configure(context),
        HookPhase::Activate => entry.activate(context),
        HookPhase::Deactivate => entry.deactivate(context),
    }))
    .unwrap_or_else(|_| Err(HookError::panicked()))
}

fn invoke_with_limit(
    entry: Arc<dyn Plugin>,
    phase: HookPhase,
    context: &PluginContext,
    limit: Duration,
) -> Result<(), HookError> {
    let (sender, receiver) = mpsc::channel();
    let worker_context = context.clone();
    let spawned = thread::Builder::new()
        .name(format!("trellis-{}-{}", phase.as_str(), context.plugin_id()))
        .spawn(move || {
            let result = invoke(entry.as_ref(), phase, &worker_context);
            if sender.send(result).is_err() {
                tracing::debug!(
                    target: "trellis::lifecycle",
                    event = "hook_result_discarded",
                    plugin = worker_context.plugin_id(),
                    phase = %phase,
                    "hook finished after its time limit"
                );
            }
        });
    if let Err(error) = spawned {
        return Err(HookError::with_source("failed to spawn hook thread", error));
    }

    match receiver.recv_timeout(limit) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            context.revoke();
            Err(HookError::timed_out(limit))
        }
        Err(RecvTimeoutError::Disconnected) => Err(HookError::panicked()),
    }
}
