use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "portal")]
#[command(about = "Career portal session client")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,
}

#[derive(Args)]
pub struct Credentials {
    #[arg(long)]
    pub email: String,

    #[arg(long)]
    pub password: String,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an account and its profile
    Signup {
        #[command(flatten)]
        credentials: Credentials,

        #[arg(long)]
        name: String,

        #[arg(long)]
        location: Option<String>,

        #[arg(long)]
        profession: Option<String>,

        /// e.g. "student" or "professional"
        #[arg(long)]
        user_type: Option<String>,
    },

    /// Log in and print the session
    Login {
        #[command(flatten)]
        credentials: Credentials,
    },

    /// Sign in with a Google ID token obtained elsewhere
    Google {
        #[arg(long)]
        id_token: String,
    },

    /// Update profile fields
    Update {
        #[command(flatten)]
        credentials: Credentials,

        #[arg(long)]
        bio: Option<String>,

        #[arg(long)]
        location: Option<String>,

        /// Comma-separated; replaces the stored list
        #[arg(long, value_delimiter = ',')]
        skills: Option<Vec<String>>,
    },

    /// Upload a profile picture and save its URL
    Avatar {
        #[command(flatten)]
        credentials: Credentials,

        #[arg(long)]
        image: PathBuf,
    },

    /// Score a resume PDF
    Ats {
        #[command(flatten)]
        credentials: Credentials,

        #[arg(long)]
        resume: PathBuf,

        #[arg(long)]
        job_title: Option<String>,

        #[arg(long)]
        company: Option<String>,
    },

    /// List subscription plans
    Plans,
}
