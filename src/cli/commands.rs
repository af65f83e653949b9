use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "adapt", about = concat!("adapt v", env!("CARGO_PKG_VERSION"), " - onboarding tracks from the command line"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Run as if started in this directory
    #[arg(short = 'C', long = "store-dir", global = true, env = "ADAPT_DIR")]
    pub store_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a track store in the current directory
    Init,
    /// Create a new track
    New(NewArgs),
    /// List all tracks
    List,
    /// Show a track with its milestones, stages and checklists
    Show(TrackArg),
    /// Milestone management
    Milestone(MilestoneCmd),
    /// Stage management
    Stage(StageCmd),
    /// Mark a stage completed (linked checklist items follow)
    Complete(CompleteArgs),
    /// Mark a stage not completed
    Reopen(ReopenArgs),
    /// Checklist items of goal stages
    Item(ItemCmd),
    /// Show completion and coin progress
    Progress(TrackArg),
    /// Validate track integrity
    Check(TrackArg),
    /// Import a track from a JSON file
    Import(ImportArgs),
    /// Print a track as JSON
    Export(TrackArg),
}

#[derive(Args)]
pub struct TrackArg {
    /// Track ID
    pub track: String,
}

#[derive(Args)]
pub struct NewArgs {
    /// Track title
    pub title: String,
    /// Track description
    #[arg(long, short)]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Milestones
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct MilestoneCmd {
    #[command(subcommand)]
    pub action: MilestoneAction,
}

#[derive(Subcommand)]
pub enum MilestoneAction {
    /// Add a milestone (bottom by default)
    Add(MilestoneAddArgs),
    /// Change milestone fields
    Edit(MilestoneEditArgs),
    /// Remove a milestone and its stages
    Rm(MilestoneRmArgs),
    /// Move a milestone to a new position (0-indexed)
    Mv(MilestoneMvArgs),
}

#[derive(Args)]
pub struct MilestoneAddArgs {
    /// Track ID
    pub track: String,
    /// Milestone title
    pub title: String,
    /// Insert at the top
    #[arg(long)]
    pub top: bool,
    /// Insert after this milestone ID
    #[arg(long, conflicts_with = "top")]
    pub after: Option<String>,
    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<String>,
    /// End date (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<String>,
}

#[derive(Args)]
pub struct MilestoneEditArgs {
    /// Track ID
    pub track: String,
    /// Milestone ID
    pub id: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    /// Start date (YYYY-MM-DD, or "none" to clear)
    #[arg(long)]
    pub start: Option<String>,
    /// End date (YYYY-MM-DD, or "none" to clear)
    #[arg(long)]
    pub end: Option<String>,
}

#[derive(Args)]
pub struct MilestoneRmArgs {
    /// Track ID
    pub track: String,
    /// Milestone ID
    pub id: String,
}

#[derive(Args)]
pub struct MilestoneMvArgs {
    /// Track ID
    pub track: String,
    /// Milestone ID
    pub id: String,
    /// New position (0-indexed)
    pub position: usize,
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct StageCmd {
    #[command(subcommand)]
    pub action: StageAction,
}

#[derive(Subcommand)]
pub enum StageAction {
    /// Add a stage to a milestone (bottom by default)
    Add(StageAddArgs),
    /// Change stage fields
    Edit(StageEditArgs),
    /// Remove a stage
    Rm(StageRmArgs),
    /// Move a stage within its milestone or into another one
    Mv(StageMvArgs),
}

#[derive(Args)]
pub struct StageAddArgs {
    /// Track ID
    pub track: String,
    /// Milestone ID
    pub milestone: String,
    /// Stage type (presentation, goal, survey, meeting)
    pub kind: String,
    /// Stage title
    pub title: String,
    /// Coins awarded on completion
    #[arg(long)]
    pub coins: Option<i64>,
    /// Mark the stage as required
    #[arg(long)]
    pub required: bool,
    /// Insert at the top
    #[arg(long)]
    pub top: bool,
    /// Insert after this stage ID
    #[arg(long, conflicts_with = "top")]
    pub after: Option<String>,
}

#[derive(Args)]
pub struct StageEditArgs {
    /// Track ID
    pub track: String,
    /// Stage ID
    pub id: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub coins: Option<i64>,
    /// Set required (true/false)
    #[arg(long)]
    pub required: Option<bool>,
}

#[derive(Args)]
pub struct StageRmArgs {
    /// Track ID
    pub track: String,
    /// Stage ID
    pub id: String,
}

#[derive(Args)]
pub struct StageMvArgs {
    /// Track ID
    pub track: String,
    /// Stage ID
    pub id: String,
    /// New position in the destination milestone (0-indexed)
    pub position: usize,
    /// Destination milestone (default: the stage's own milestone)
    #[arg(long = "to")]
    pub to: Option<String>,
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct CompleteArgs {
    /// Track ID
    pub track: String,
    /// Stage ID
    pub stage: String,
    /// Who completed it (default: [user] name from adapt.toml)
    #[arg(long)]
    pub by: Option<String>,
}

#[derive(Args)]
pub struct ReopenArgs {
    /// Track ID
    pub track: String,
    /// Stage ID
    pub stage: String,
}

// ---------------------------------------------------------------------------
// Checklist items
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ItemCmd {
    #[command(subcommand)]
    pub action: ItemAction,
}

#[derive(Subcommand)]
pub enum ItemAction {
    /// Add a checklist item to a goal stage
    Add(ItemAddArgs),
    /// Check or uncheck a manual item
    Toggle(ItemRefArgs),
    /// Remove a checklist item
    Rm(ItemRefArgs),
}

#[derive(Args)]
pub struct ItemAddArgs {
    /// Track ID
    pub track: String,
    /// Goal stage ID
    pub stage: String,
    /// Item text
    pub text: String,
    /// Mirror the completion of this stage (same milestone)
    #[arg(long)]
    pub link: Option<String>,
}

#[derive(Args)]
pub struct ItemRefArgs {
    /// Track ID
    pub track: String,
    /// Goal stage ID
    pub stage: String,
    /// Item ID
    pub item: String,
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct ImportArgs {
    /// Path to a track JSON file (with or without an id)
    pub file: String,
}
