//! Command-line interface definition and argument parsing
//!
//! This module uses clap to define and parse command-line arguments.

use crate::config::{Config, ConfigError, SettingsFile};
use crate::constants::DEFAULT_SETTINGS_FILE;
use crate::conversation::ReductionPolicy;
use clap::Parser;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, Lines};

/// Command-line arguments for chatline
#[derive(Parser, Debug, Default)]
#[command(
    name = "chatline",
    about = "Interactive chat with an LLM in your terminal",
    version,
    long_about = "chatline keeps a running conversation with a chat-completion model, reports token usage after every reply, and keeps only the most recent exchanges in memory."
)]
pub struct Cli {
    /// Ask a single question and exit instead of starting an interactive session
    pub query: Option<String>,

    /// The model to use (e.g. gpt-4o, azure/<deployment>, echo)
    #[arg(long)]
    pub model: Option<String>,

    /// System prompt establishing the assistant persona
    #[arg(long)]
    pub system: Option<String>,

    /// Maximum tokens to generate per reply
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0-2)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Nucleus sampling mass (0-1)
    #[arg(long)]
    pub top_p: Option<f32>,

    #[arg(long, allow_hyphen_values = true)]
    pub frequency_penalty: Option<f32>,

    #[arg(long, allow_hyphen_values = true)]
    pub presence_penalty: Option<f32>,

    /// Number of recent exchanges to keep in memory (0 keeps only the system prompt)
    #[arg(long)]
    pub keep_pairs: Option<usize>,

    /// JSON settings file (defaults to ./appsettings.json when present)
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short)]
    pub verbose: bool,
}

/// Build the application's Config from defaults, settings file,
/// environment and the parsed flags, in that order
pub fn cli_to_config<F>(cli: &Cli, env_lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = Config::new();

    let file = match &cli.settings {
        Some(path) => Some(SettingsFile::load(path)?),
        None => SettingsFile::load_optional(Path::new(DEFAULT_SETTINGS_FILE))?,
    };
    if let Some(file) = file {
        config.apply_settings_file(file);
    }

    config.apply_env(env_lookup);

    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    if let Some(system) = &cli.system {
        config.settings.system_prompt = Some(system.clone());
    }
    if cli.max_tokens.is_some() {
        config.settings.max_tokens = cli.max_tokens;
    }
    if cli.temperature.is_some() {
        config.settings.temperature = cli.temperature;
    }
    if cli.top_p.is_some() {
        config.settings.top_p = cli.top_p;
    }
    if cli.frequency_penalty.is_some() {
        config.settings.frequency_penalty = cli.frequency_penalty;
    }
    if cli.presence_penalty.is_some() {
        config.settings.presence_penalty = cli.presence_penalty;
    }
    if let Some(keep_pairs) = cli.keep_pairs {
        config.reduction = ReductionPolicy::new(keep_pairs);
    }

    config.validate()?;
    Ok(config)
}

/// One read from the interactive prompt
#[derive(Debug, PartialEq, Eq)]
pub enum PromptInput {
    Prompt(String),
    /// The line could not be decoded; it has been skipped
    Unreadable(String),
    /// Empty line or end of input
    Done,
}

/// Read the next prompt line
pub async fn read_prompt<R>(lines: &mut Lines<R>) -> io::Result<PromptInput>
where
    R: AsyncBufRead + Unpin,
{
    match lines.next_line().await {
        Ok(Some(line)) if line.is_empty() => Ok(PromptInput::Done),
        Ok(Some(line)) => Ok(PromptInput::Prompt(line)),
        Ok(None) => Ok(PromptInput::Done),
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            Ok(PromptInput::Unreadable(e.to_string()))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "chatline",
            "--model",
            "echo",
            "--temperature",
            "0.2",
            "--frequency-penalty",
            "-0.5",
            "--keep-pairs",
            "0",
            "what is rust?",
        ])
        .unwrap();

        assert_eq!(cli.model.as_deref(), Some("echo"));
        assert_eq!(cli.temperature, Some(0.2));
        assert_eq!(cli.frequency_penalty, Some(-0.5));
        assert_eq!(cli.keep_pairs, Some(0));
        assert_eq!(cli.query.as_deref(), Some("what is rust?"));
    }

    #[test]
    fn test_flags_override_file_and_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"model": "gpt-4o", "temperature": 0.1, "keepPairs": 5}}"#).unwrap();

        let cli = Cli {
            model: Some("echo".to_string()),
            keep_pairs: Some(1),
            settings: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let config = cli_to_config(&cli, |key| {
            (key == "CHATLINE_MODEL").then(|| "gpt-4.1".to_string())
        })
        .unwrap();

        assert_eq!(config.model, "echo");
        assert_eq!(config.settings.temperature, Some(0.1));
        assert_eq!(config.reduction.target_pair_count, 1);
    }

    #[test]
    fn test_explicit_missing_settings_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli {
            settings: Some(dir.path().join("nope.json")),
            ..Default::default()
        };
        assert!(matches!(
            cli_to_config(&cli, |_| None),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_invalid_flag_value_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli {
            top_p: Some(1.5),
            settings: Some(write_empty_settings(dir.path())),
            ..Default::default()
        };
        assert!(matches!(
            cli_to_config(&cli, |_| None),
            Err(ConfigError::InvalidSetting { name: "top_p", .. })
        ));
    }

    #[tokio::test]
    async fn test_read_prompt_skips_undecodable_lines() {
        use tokio::io::{AsyncBufReadExt, BufReader};

        let input: &[u8] = b"hello\n\xff\xfe\nworld\n\nignored\n";
        let mut lines = BufReader::new(input).lines();

        assert_eq!(
            read_prompt(&mut lines).await.unwrap(),
            PromptInput::Prompt("hello".to_string())
        );
        assert!(matches!(
            read_prompt(&mut lines).await.unwrap(),
            PromptInput::Unreadable(_)
        ));
        assert_eq!(
            read_prompt(&mut lines).await.unwrap(),
            PromptInput::Prompt("world".to_string())
        );
        assert_eq!(read_prompt(&mut lines).await.unwrap(), PromptInput::Done);
    }

    #[tokio::test]
    async fn test_read_prompt_end_of_input() {
        use tokio::io::{AsyncBufReadExt, BufReader};

        let input: &[u8] = b"";
        let mut lines = BufReader::new(input).lines();
        assert_eq!(read_prompt(&mut lines).await.unwrap(), PromptInput::Done);
    }

    fn write_empty_settings(dir: &Path) -> PathBuf {
        let path = dir.join("settings.json");
        std::fs::write(&path, "{}").unwrap();
        path
    }
}
