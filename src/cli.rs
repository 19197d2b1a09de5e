//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// blotter blog engine CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Blog root directory (default: current directory)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Config file name (default: blog.toml)
    #[arg(short = 'C', long, default_value = "blog.toml")]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve the blog, picking up content edits on every request
    Serve {
        /// Interface to bind on
        #[arg(short, long)]
        interface: Option<String>,

        /// The port you should provide
        #[arg(short, long)]
        port: Option<u16>,

        /// Compile templates once and never check them for changes
        #[arg(long)]
        production: bool,
    },

    /// Load all content once and report parse errors
    Check,

    /// Create a new post dated today
    New {
        /// Post title; the file name is derived from it
        title: String,

        /// Category of the new post
        #[arg(short, long)]
        category: Option<String>,

        /// Document type (file extension), e.g. md or html
        #[arg(short = 't', long = "type", default_value = "md")]
        kind: String,
    },
}
