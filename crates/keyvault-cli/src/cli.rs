use clap::{Parser, Subcommand};

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "keyvault",
    about = "Encrypt secrets at rest and manage token signing keys",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print version and exit.
    Version,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Symmetric secrets for the key list.
    #[command(subcommand)]
    Secret(SecretCommand),
    /// Encrypt text with the active secret and print the envelope.
    Encrypt { plaintext: Vec<String> },
    /// Decrypt an envelope produced under any configured secret.
    Decrypt { envelope: String },
    /// Manage token signing keys.
    #[command(subcommand)]
    Keys(KeysCommand),
    /// Sign or verify tokens.
    #[command(subcommand)]
    Token(TokenCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SecretCommand {
    /// Print a new random 32-character secret.
    Generate,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum KeysCommand {
    /// Generate any configured signing keys that are missing.
    Init,
    /// Generate a new signing key; older keys stay published.
    Rotate,
    /// Print the public key set as JSON.
    Jwks,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum TokenCommand {
    /// Sign JSON claims with the newest signing key.
    Sign { claims: String },
    /// Verify a token against the published keys and print its claims.
    Verify { token: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_encrypt_with_multiple_words() {
        let cli = Cli::try_parse_from(["keyvault", "encrypt", "hello", "world"])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Command::Encrypt {
                plaintext: vec!["hello".into(), "world".into()]
            }
        );
    }

    #[test]
    fn parses_keys_rotate_subcommand() {
        let cli =
            Cli::try_parse_from(["keyvault", "keys", "rotate"]).expect("parse should succeed");
        assert_eq!(cli.command, Command::Keys(KeysCommand::Rotate));
    }

    #[test]
    fn parses_token_verify_subcommand() {
        let cli = Cli::try_parse_from(["keyvault", "token", "verify", "a.b.c"])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Command::Token(TokenCommand::Verify {
                token: "a.b.c".into()
            })
        );
    }

    #[test]
    fn parses_config_init_subcommand() {
        let cli =
            Cli::try_parse_from(["keyvault", "config", "init"]).expect("parse should succeed");
        assert_eq!(cli.command, Command::Config(ConfigCommand::Init));
    }

    #[test]
    fn requires_a_subcommand() {
        assert!(Cli::try_parse_from(["keyvault"]).is_err());
    }
}
