use std::path::PathBuf;

use calvault_sdk::{EntityId, EventType, GroupType};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "calvault",
    about = "Versioned, content-addressed calendar vault",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Vault directory
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Open without writing anything
    #[arg(long, global = true)]
    pub read_only: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a vault and its default configuration
    Init,
    /// Show counts and lock state
    Status,
    /// Show who holds the write lock
    Lock,
    /// Manage event groups
    Group(GroupArgs),
    /// Manage events
    Event(EventArgs),
    /// Inspect or empty the trash
    Trash(TrashArgs),
    /// Remove blobs no history refers to
    Gc(GcArgs),
    /// Reconcile orphaned front files and blobs
    Fsck,
    /// Write groups and events as JSON
    Export(ExportArgs),
    /// Read groups and events from an export file
    Import(ImportArgs),
}

#[derive(Args)]
pub struct GroupArgs {
    #[command(subcommand)]
    pub action: GroupAction,
}

#[derive(Subcommand)]
pub enum GroupAction {
    /// List groups in order
    List,
    /// Create a group
    Add {
        title: String,
        #[arg(long = "type", default_value = "group")]
        group_type: GroupType,
        #[arg(long)]
        color: Option<String>,
    },
    Enable {
        id: EntityId,
    },
    Disable {
        id: EntityId,
    },
    /// Delete a group, moving its events to the trash
    Delete {
        id: EntityId,
    },
}

#[derive(Args)]
pub struct EventArgs {
    #[command(subcommand)]
    pub action: EventAction,
}

#[derive(Subcommand)]
pub enum EventAction {
    /// Create an event in a group
    Add {
        group: EntityId,
        summary: String,
        /// Defaults to the group's default event type
        #[arg(long = "type")]
        event_type: Option<EventType>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Change fields of an event, adding a revision
    Edit {
        id: EntityId,
        #[arg(long)]
        summary: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long = "type")]
        event_type: Option<EventType>,
    },
    /// Print an event, optionally at an older revision
    Show {
        id: EntityId,
        /// Revision hash or unique prefix
        #[arg(long)]
        revision: Option<String>,
    },
    /// List revisions, newest first
    History {
        id: EntityId,
        /// Show what changed in each revision
        #[arg(long)]
        diff: bool,
    },
    /// Delete an event permanently
    Delete {
        id: EntityId,
    },
    /// Move an event to the trash
    Trash {
        id: EntityId,
    },
    /// Move a trashed event back into a group
    Restore {
        id: EntityId,
        #[arg(long)]
        to: EntityId,
    },
}

#[derive(Args)]
pub struct TrashArgs {
    #[command(subcommand)]
    pub action: TrashAction,
}

#[derive(Subcommand)]
pub enum TrashAction {
    List,
    /// Delete every trashed event
    Empty,
}

#[derive(Args)]
pub struct GcArgs {
    /// Report what would be removed
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct ExportArgs {
    /// Export only these groups
    #[arg(long)]
    pub group: Vec<EntityId>,
    /// Output file; stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct ImportArgs {
    pub file: PathBuf,
}
