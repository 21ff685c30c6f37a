//! Checkpoint command - manual rollback of sync checkpoints

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Confirm;
use ibank_core::services::LogEvent;
use ibank_core::{AccountKey, BankKind};

use super::{get_context, log_event};
use crate::output;

#[derive(Subcommand)]
pub enum CheckpointCommands {
    /// Forget the checkpoint so the next sync uses the bank's default window
    Reset {
        /// Bank: fio or citibank
        bank: BankKind,
        /// Only this account (all accounts of the bank otherwise)
        #[arg(short, long)]
        account: Option<u32>,
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

pub fn run(command: CheckpointCommands) -> Result<()> {
    match command {
        CheckpointCommands::Reset {
            bank,
            account,
            force,
        } => reset(bank, account, force),
    }
}

fn reset(bank: BankKind, account: Option<u32>, force: bool) -> Result<()> {
    let ctx = get_context()?;

    let target = match account {
        Some(index) => AccountKey::new(bank, index).to_string(),
        None => format!("all {} accounts", bank),
    };

    if !force {
        println!(
            "\n{}",
            format!("This will reset the sync checkpoint of {}.", target).yellow()
        );
        println!(
            "{}\n",
            "The next sync re-downloads the bank's default window.".dimmed()
        );

        if !Confirm::new()
            .with_prompt("Are you sure?")
            .default(false)
            .interact()?
        {
            println!("{}\n", "Cancelled".dimmed());
            return Ok(());
        }
    }

    let cleared = match account {
        Some(index) => usize::from(ctx.store.clear(&AccountKey::new(bank, index))?),
        None => ctx.store.clear_bank(bank)?,
    };

    log_event(
        ctx.logger.as_deref(),
        LogEvent::new("checkpoint_reset")
            .with_command("checkpoint reset")
            .with_bank(bank.as_str())
            .with_account(target.clone()),
    );

    if cleared == 0 {
        output::info(&format!("No checkpoint stored for {}", target));
    } else {
        output::success(&format!("Reset {} checkpoint(s) of {}", cleared, target));
    }

    Ok(())
}
