use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "pipeboard", version, about = "Terminal sales-pipeline board")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize a project CRM store in the current directory
    Init,
    /// Populate the store with demo deals, leads and a partial pipeline
    Seed {
        /// Overwrite existing entities
        #[arg(long)]
        force: bool,
    },
    /// Show the resolved stage catalog (canonical key, label, backend id)
    Stages,
    /// List the board, one section per stage
    List {
        /// Filter by free-text search over titles and names
        #[arg(long)]
        search: Option<String>,
        /// Filter by assigned owner
        #[arg(long)]
        owner: Option<String>,
        /// Show a single stage column
        #[arg(long)]
        stage: Option<String>,
    },
    /// Add a deal
    AddDeal {
        /// Deal title
        title: String,
        /// Customer name
        #[arg(long, default_value = "Unknown")]
        customer: String,
        /// Deal value
        #[arg(long, default_value_t = 0.0)]
        value: f64,
        /// Win probability (0-100)
        #[arg(long, default_value_t = 50)]
        probability: u8,
        /// Assigned owner
        #[arg(long)]
        owner: Option<String>,
        /// Starting stage key (defaults to lead)
        #[arg(long)]
        stage: Option<String>,
    },
    /// Add a lead
    AddLead {
        /// Lead name
        name: String,
        /// Estimated value
        #[arg(long, default_value_t = 0.0)]
        value: f64,
        /// Assigned owner
        #[arg(long)]
        owner: Option<String>,
    },
    /// Move a deal or lead to a target stage
    Move {
        /// Entity id to move
        entity_id: String,
        /// Target stage key or label
        stage: String,
    },
    /// Launch the interactive board TUI
    Tui,
}
