use crate::config::ServerConfig;
use crate::script::{parse, ScriptEngine};
use crate::server::{ResponseContext, SessionStore, SmartServer};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "smartserve")]
#[command(about = "Smart Script application server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server with the given configuration file
    Serve {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Parse a script and print the reconstructed document tree
    Tree { script: PathBuf },
    /// Execute a script and write its output to stdout
    Run {
        script: PathBuf,

        /// Request parameters, repeatable as `--param key=value`
        #[arg(short, long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },
}

pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    match &cli.command {
        Commands::Serve { config } => {
            let config = ServerConfig::from_file(config)?;
            let handle = SmartServer::new(config)?.start()?;
            handle
                .join()
                .map_err(|e| anyhow!("server terminated abnormally: {e:?}"))
        }
        Commands::Tree { script } => {
            let source = std::fs::read_to_string(script)
                .with_context(|| format!("cannot read {}", script.display()))?;
            let tree = parse(&source)
                .map_err(|e| anyhow!("unable to parse document: {e}"))?;
            println!("{tree}");
            Ok(())
        }
        Commands::Run { script, params } => {
            let source = std::fs::read_to_string(script)
                .with_context(|| format!("cannot read {}", script.display()))?;
            let tree = parse(&source)
                .map_err(|e| anyhow!("unable to parse document: {e}"))?;

            let mut request_params = HashMap::new();
            for pair in params {
                match pair.split_once('=') {
                    Some((key, value)) => {
                        request_params.insert(key.to_string(), Some(value.to_string()))
                    }
                    None => request_params.insert(pair.clone(), None),
                };
            }

            let mut ctx = ResponseContext::new(
                Box::new(std::io::stdout()),
                request_params,
                SessionStore::default(),
                Vec::new(),
            );
            ScriptEngine::new(&tree)
                .execute(&mut ctx)
                .map_err(|e| anyhow!("script failed: {e}"))?;
            ctx.flush().map_err(|e| anyhow!("flush failed: {e}"))?;
            Ok(())
        }
    }
}
