pub mod cli;
pub mod diagnostics;
pub mod dispatch;
pub mod logging;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use ctlpanel_app::{App, DetachedOps};
use tracing::debug;

use crate::cli::Cli;
use crate::diagnostics::{DiagnosticsSession, Trail};

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let diagnostics = DiagnosticsSession::initialize(cli.diagnostics)?;
    logging::init_logging(cli.verbose, diagnostics.path().map(|path| path.as_path()))?;
    if let Some(path) = diagnostics.path() {
        debug!(path = %path.display(), "diagnostics enabled");
    }

    let app = App::from_user_config(Arc::new(DetachedOps::new()))?;
    let result = dispatch::run_with_deps(cli, &app, &diagnostics);
    if let Err(error) = &result {
        diagnostics.record(&Trail::CommandFailed(format!("{error:#}")));
    }
    result
}
