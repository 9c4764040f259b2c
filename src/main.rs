//! Argonbox - command line entry point
//!
//! Hashes or verifies a password through the configured sandbox backend.
//! Results are printed as JSON on stdout; logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;

use argonbox::{Argon2Service, Argon2Variant, Config, HashRequest, init_tracing};

/// Argonbox CLI arguments
#[derive(Parser, Debug)]
#[command(name = "argonbox", version)]
#[command(about = "Argon2 password hashing in an isolated WebAssembly sandbox")]
struct Cli {
    /// Directory holding default.toml, {ENV}.toml and local.toml
    #[arg(long, global = true, default_value = "config")]
    config_dir: PathBuf,

    /// Sandbox backend: "auto", "wasm" or "native"
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Compiled Argon2 module to run
    #[arg(long, global = true)]
    image: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Hash a password
    Hash {
        #[arg(long, env = "ARGONBOX_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long)]
        salt: String,

        /// Iterations
        #[arg(long)]
        time: Option<u32>,

        /// Working memory in KiB
        #[arg(long)]
        mem: Option<u32>,

        #[arg(long)]
        parallelism: Option<u32>,

        /// Raw hash length in bytes
        #[arg(long)]
        hash_len: Option<u32>,

        /// argon2d, argon2i or argon2id
        #[arg(long)]
        variant: Option<Argon2Variant>,
    },

    /// Check a password against an encoded hash
    Verify {
        #[arg(long, env = "ARGONBOX_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long)]
        encoded: String,

        /// Require the encoded hash to use this variant
        #[arg(long)]
        variant: Option<Argon2Variant>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = Config::load_from_dir(&cli.config_dir).with_context(|| {
        format!(
            "Failed to load configuration from {}",
            cli.config_dir.display()
        )
    })?;
    if let Some(backend) = &cli.backend {
        config.sandbox.backend = backend.clone();
    }
    if let Some(image) = &cli.image {
        config.sandbox.image_path = Some(image.clone());
    }
    if cli.verbose {
        config.logging.level = "debug".to_string();
        config.logging.format = "pretty".to_string();
    }

    init_tracing(&config.logging)?;

    let service = Argon2Service::from_config(&config).context("Failed to set up the hasher")?;

    match cli.command {
        Command::Hash {
            password,
            salt,
            time,
            mem,
            parallelism,
            hash_len,
            variant,
        } => {
            let request = HashRequest {
                time_cost: time,
                memory_cost_kib: mem,
                parallelism,
                hash_length: hash_len,
                variant,
                ..HashRequest::new(&password, &salt)
            };
            let result = service.hash(&request).await?;
            let output = json!({
                "backend": service.backend_name(),
                "hash_hex": result.hash_hex,
                "encoded": result.encoded,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(ExitCode::SUCCESS)
        }

        Command::Verify {
            password,
            encoded,
            variant,
        } => {
            let matches = service.verify(&password, &encoded, variant).await?;
            let output = json!({
                "backend": service.backend_name(),
                "matches": matches,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(if matches {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
