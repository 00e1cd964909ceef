mod backend;
mod catalog;
mod cli;
mod commands;
mod executor;
mod model;
mod projection;
mod resolver;
mod storage;
mod ui;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let command = args.command.unwrap_or(cli::Command::Tui);
    match command {
        cli::Command::Init => commands::init(),
        cli::Command::Seed { force } => commands::seed(force),
        cli::Command::Stages => commands::stages(),
        cli::Command::List {
            search,
            owner,
            stage,
        } => commands::list(search, owner, stage),
        cli::Command::AddDeal {
            title,
            customer,
            value,
            probability,
            owner,
            stage,
        } => commands::add_deal(title, customer, value, probability, owner, stage),
        cli::Command::AddLead { name, value, owner } => commands::add_lead(name, value, owner),
        cli::Command::Move { entity_id, stage } => commands::move_entity(entity_id, stage),
        cli::Command::Tui => commands::tui(),
    }
}
