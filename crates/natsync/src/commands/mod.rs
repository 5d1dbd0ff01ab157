//! Command handlers and the helpers they share.

pub mod allocation;
pub mod config_cmd;
pub mod rules;
pub mod server;

use natsync_config::{Loader, Settings};
use natsync_core::{ReconcileReport, Reconciler, RouterSettings};
use tracing::warn;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

/// Load file + env + keyring settings honoring the global flags.
pub fn load_settings(global: &GlobalOpts) -> Result<Settings, CliError> {
    let mut loader = Loader::new().keyring(!global.no_keyring);
    if let Some(path) = &global.config {
        loader = loader.path(path);
    }
    Ok(loader.load()?)
}

/// A reconciler for the configured router, or `None` when the router is
/// not configured (logged, not an error).
pub fn reconciler(global: &GlobalOpts) -> Result<Option<Reconciler>, CliError> {
    let settings = load_settings(global)?;
    match RouterSettings::resolve(&settings)? {
        Some(router) => Ok(Some(Reconciler::new(router))),
        None => {
            warn!(
                path = %settings.path.display(),
                "router not configured (ip, user and pass are required); nothing to do"
            );
            Ok(None)
        }
    }
}

/// Print a report and turn rejected commands into a non-zero exit.
pub fn finish(report: &ReconcileReport, global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_report(&global.output, report, output::should_color(&global.color))?;
    output::print_output(&out, global.quiet);
    if report.is_clean() {
        Ok(())
    } else {
        Err(CliError::PartialFailure {
            failed: report.failed,
        })
    }
}
