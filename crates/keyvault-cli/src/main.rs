mod cli;
mod config;
mod storage;

use clap::Parser;
use color_eyre::Result;
use keyvault_core::{keys::SigningKeyConfig, store::AsymmetricKeyStore};
use keyvault_crypto::{
    jwk::SigningKeyManager, keyed_cipher::generate_secret, random::OsRandom, token,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Command, ConfigCommand, KeysCommand, SecretCommand, TokenCommand};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command {
        Command::Version => print_version(),
        Command::Config(ConfigCommand::Init) => init_config(&config)?,
        Command::Secret(SecretCommand::Generate) => println!("{}", generate_secret(&OsRandom)?),
        Command::Encrypt { plaintext } => {
            let cipher = storage::cipher_from_config(&config)?;
            println!("{}", cipher.encrypt(plaintext.join(" ").as_bytes())?);
        }
        Command::Decrypt { envelope } => {
            let cipher = storage::cipher_from_config(&config)?;
            let plaintext = cipher.decrypt(envelope.trim())?;
            println!("{}", String::from_utf8_lossy(&plaintext));
        }
        Command::Keys(cmd) => run_keys(cmd, &config).await?,
        Command::Token(cmd) => run_token(cmd, &config).await?,
    }

    Ok(())
}

fn init_tracing() {
    // Logs go to stderr so command output stays pipeable.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("keyvault {}", env!("CARGO_PKG_VERSION"));
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

async fn run_keys(cmd: KeysCommand, config: &config::Config) -> Result<()> {
    let manager = storage::manager_from_config(config).await?;
    match cmd {
        KeysCommand::Init => {
            let count = manager.store().get_all().await?.len();
            println!("Signing keys: {count}");
        }
        KeysCommand::Rotate => {
            let rotation = rotation_config(config);
            let record = manager.generate_key(&rotation).await?;
            info!(kid = record.id, "rotated signing key");
            println!("New signing key: {}", record.id);
        }
        KeysCommand::Jwks => print_jwks(&manager).await?,
    }
    Ok(())
}

/// Rotation reuses the parameters of the last configured slot.
fn rotation_config(config: &config::Config) -> SigningKeyConfig {
    config
        .signing_key_configs()
        .last()
        .cloned()
        .unwrap_or_default()
}

async fn print_jwks<S: AsymmetricKeyStore>(manager: &SigningKeyManager<S>) -> Result<()> {
    let jwks = manager.get_public_keys().await?;
    println!("{}", serde_json::to_string_pretty(&jwks)?);
    Ok(())
}

async fn run_token(cmd: TokenCommand, config: &config::Config) -> Result<()> {
    let manager = storage::manager_from_config(config).await?;
    match cmd {
        TokenCommand::Sign { claims } => {
            let claims: serde_json::Value = serde_json::from_str(&claims)?;
            let key = manager.get_signing_key().await?;
            println!("{}", token::sign(&key, &claims)?);
        }
        TokenCommand::Verify { token: signed } => {
            let jwks = manager.get_public_keys().await?;
            let claims = token::verify(signed.trim(), &jwks)?;
            println!("{}", serde_json::to_string_pretty(&claims)?);
        }
    }
    Ok(())
}
