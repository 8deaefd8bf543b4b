//! CLI module - Command-line interface for propcast
//!
//! This module provides a structured CLI using clap for argument parsing.

mod commands;

use clap::{Parser, Subcommand};

use crate::domain::{Role, UsageKind};

/// propcast - account service for the property price prediction tool
#[derive(Parser)]
#[command(name = "propcast")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API server (default)
    #[command(alias = "daemon", alias = "-d")]
    Serve,

    /// Create an account
    #[command(alias = "add")]
    CreateAccount {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        role: Option<Role>,
    },

    /// Show an account by username
    #[command(alias = "info")]
    Show {
        username: String,
    },

    /// Increment a usage counter for an account
    RecordUsage {
        /// Account ID (UUID)
        id: String,
        /// predictions_made or models_trained
        kind: UsageKind,
    },

    /// Create default config file
    #[command(alias = "--init")]
    Init,
}

pub use commands::*;
