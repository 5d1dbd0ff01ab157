//! Server command handlers.

use natsync_core::{LifecycleAction, Server};

use crate::cli::{GlobalOpts, ServerArgs, ServerCommand};
use crate::error::CliError;

pub async fn handle(args: ServerArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let Some(reconciler) = super::reconciler(global)? else {
        return Ok(());
    };

    let report = match args.command {
        ServerCommand::Add {
            server,
            allocations,
        } => {
            let server = Server::new(server).with_allocations(allocations);
            reconciler
                .reconcile_server(&server, LifecycleAction::Add)
                .await?
        }
        ServerCommand::Remove { server } => {
            reconciler
                .reconcile_server(&Server::new(server), LifecycleAction::Remove)
                .await?
        }
    };

    super::finish(&report, global)
}
