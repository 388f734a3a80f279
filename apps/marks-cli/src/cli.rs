use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "marks", version, about = "Personal bookmarks, kept in sync")]
pub struct Cli {
    /// Base URL of the marks API. Overrides MARKS_API_URL.
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Exchange an identity token for a session.
    Login {
        /// Token issued by the identity provider.
        id_token: String,
    },
    /// End the current session.
    Logout,
    /// Show who is signed in.
    Whoami,
    /// List your bookmarks, newest first.
    List,
    /// Add a bookmark.
    Add {
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long, default_value = "")]
        url: String,
    },
    /// Delete a bookmark after confirmation.
    Delete {
        /// Id of the bookmark to delete.
        id: String,
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
    /// Print the list and keep it updated until interrupted.
    Watch,
}
