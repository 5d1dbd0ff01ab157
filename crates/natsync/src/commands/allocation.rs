//! Allocation command handlers.

use natsync_core::{Allocation, LifecycleAction, Server};

use crate::cli::{AllocationArgs, AllocationCommand, GlobalOpts};
use crate::error::CliError;

pub async fn handle(args: AllocationArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let Some(reconciler) = super::reconciler(global)? else {
        return Ok(());
    };

    let report = match args.command {
        AllocationCommand::Add(target) => {
            let server = Server::new(&target.server);
            reconciler
                .reconcile_allocation(&target.allocation(), &server, LifecycleAction::Add)
                .await?
        }
        AllocationCommand::Remove(target) => {
            let server = Server::new(&target.server);
            reconciler
                .reconcile_allocation(&target.allocation(), &server, LifecycleAction::Remove)
                .await?
        }
        AllocationCommand::Move {
            from,
            to,
            address,
            port,
        } => {
            if from == to {
                return Err(CliError::Validation {
                    field: "--to".into(),
                    reason: "the allocation already belongs to that server".into(),
                });
            }
            reconciler
                .reassign_allocation(
                    &Allocation::new(address, port),
                    &Server::new(from),
                    &Server::new(to),
                )
                .await?
        }
    };

    super::finish(&report, global)
}
