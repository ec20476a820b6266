//! Purpose: Hold top-level CLI command dispatch for `beacon`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Each collection maps to exactly one entity type; dispatch is the only place that matches on it.

use super::*;
use beacon_store::entities::{BeaconNotification, CommunityPost, JournalEntry, MoodLog};

pub(super) fn dispatch_command(command: Command) -> Result<RunOutcome, FetchError> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "beacon", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Page {
            collection,
            remote,
            pages,
            all,
            page_size,
        } => {
            serve::init_tracing("warn");
            let client = remote_client(&remote)?;
            let budget = if all {
                PageBudget::All
            } else {
                PageBudget::Pages(pages)
            };
            let value = match collection {
                Collection::Journal => {
                    page_collection::<JournalEntry>(&client, page_size, budget)?
                }
                Collection::Moods => page_collection::<MoodLog>(&client, page_size, budget)?,
                Collection::Beacons => {
                    page_collection::<BeaconNotification>(&client, page_size, budget)?
                }
                Collection::Community => {
                    page_collection::<CommunityPost>(&client, page_size, budget)?
                }
            };
            emit_json(value);
            Ok(RunOutcome::ok())
        }
        Command::Show {
            collection,
            id,
            remote,
        } => {
            serve::init_tracing("warn");
            let client = remote_client(&remote)?;
            let value = match collection {
                Collection::Journal => show_item::<JournalEntry>(&client, &id)?,
                Collection::Moods => show_item::<MoodLog>(&client, &id)?,
                Collection::Beacons => show_item::<BeaconNotification>(&client, &id)?,
                Collection::Community => show_item::<CommunityPost>(&client, &id)?,
            };
            emit_json(value);
            Ok(RunOutcome::ok())
        }
        Command::Serve(args) => {
            serve::init_tracing("info");
            let config = serve::ServeConfig {
                bind: args.bind,
                token: args.token,
                allow_non_loopback: args.allow_non_loopback,
                seed: args.seed,
                max_take: args.max_take,
            };
            let runtime = build_runtime()?;
            runtime.block_on(serve::serve(config))?;
            Ok(RunOutcome::ok())
        }
    }
}
