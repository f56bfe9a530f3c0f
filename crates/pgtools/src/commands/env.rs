//! `pgtools env ...`: manage environment files.

use clap::{Args, Subcommand};
use std::path::PathBuf;

use super::Context;
use pgtools_core::services::environment::environment_file_name;
use pgtools_core::{DbConfig, PgToolsError, SslMode};

#[derive(Subcommand, Debug)]
pub enum EnvCommand {
    /// List environments; the selected one is marked with `*`
    List,
    /// Create or replace an environment
    Add(AddArgs),
    /// Remove an environment
    Rm { name: String },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Environment name
    pub name: String,

    #[arg(long, default_value = "localhost")]
    pub host: String,

    #[arg(short = 'p', long, default_value_t = 5432)]
    pub port: u16,

    #[arg(short = 'U', long, default_value = "postgres")]
    pub user: String,

    #[arg(long, default_value = "")]
    pub password: String,

    /// disable, prefer, require, verify-ca or verify-full
    #[arg(long, default_value = "prefer")]
    pub sslmode: String,

    #[arg(long)]
    pub sslrootcert: Option<PathBuf>,

    #[arg(long)]
    pub sslclientcert: Option<PathBuf>,

    #[arg(long)]
    pub sslclientkey: Option<PathBuf>,

    /// Free-form description
    #[arg(long)]
    pub comment: Option<String>,

    /// Maintenance database (default postgres)
    #[arg(long)]
    pub defaultdb: Option<String>,
}

impl AddArgs {
    pub fn to_config(&self) -> DbConfig {
        let mut config = DbConfig::new(&self.host, &self.user);
        config.port = self.port;
        config.password = self.password.clone();
        config.sslmode = SslMode::parse(&self.sslmode);
        config.sslrootcert = self.sslrootcert.clone();
        config.sslclientcert = self.sslclientcert.clone();
        config.sslclientkey = self.sslclientkey.clone();
        config.description = self.comment.clone();
        config.defaultdb = self.defaultdb.clone();
        config
    }
}

pub fn run(ctx: &Context, command: EnvCommand) -> Result<(), PgToolsError> {
    let store = ctx.store()?;
    match command {
        EnvCommand::List => {
            let selected = environment_file_name(&ctx.env);
            for name in store.list()? {
                let marker = if environment_file_name(&name) == selected { "*" } else { " " };
                println!("{marker} {name}");
            }
        }
        EnvCommand::Add(args) => {
            let path = store.save(&args.name, &args.to_config())?;
            println!("Environment {} saved to {}", args.name, path.display());
        }
        EnvCommand::Rm { name } => {
            store.remove(&name)?;
            println!("Environment {name} removed");
        }
    }
    Ok(())
}
