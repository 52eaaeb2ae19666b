//! chatline - interactive LLM chat console
//!
//! Reads prompts from stdin, sends the running conversation to the
//! configured model, prints each reply with its token usage, and keeps
//! only the most recent exchanges in memory.

use std::io::{self, Write};

use anyhow::Context;
use chatline::cli::{cli_to_config, read_prompt, Cli, PromptInput};
use chatline::constants::{FORMAT_BOLD, FORMAT_CYAN, FORMAT_GRAY, FORMAT_RESET, PROMPT_LABEL};
use chatline::conversation::{format_token_stats, print_assistant_response, print_token_stats};
use chatline::llm::create_backend;
use chatline::session::{ChatSession, UsageTotals};
use clap::Parser;
use crossterm::{
    cursor, execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli_to_config(&cli, |key| std::env::var(key).ok())
        .context("Error loading configuration")?;
    let backend = create_backend(&config).context("Failed to create completion backend")?;
    let mut session = ChatSession::new(backend, config.settings.clone(), config.reduction);

    ctrlc::set_handler(move || {
        eprintln!("\nOperation interrupted by user");
        std::process::exit(130); // Standard exit code for Ctrl+C termination
    })
    .context("Failed to set Ctrl+C handler")?;

    match cli.query {
        Some(query) => run_single_query_mode(&mut session, &query).await,
        None => run_interactive_mode(&mut session).await,
    }
}

/// Route diagnostics to stderr so they never mix with chat output
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Run the read-complete-print loop until an empty prompt or end of input
async fn run_interactive_mode(session: &mut ChatSession) -> anyhow::Result<()> {
    println!(
        "Chatting with {} ({}). Submit an empty prompt to quit.",
        session.backend().model(),
        session.backend().name()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n{}{}{}", FORMAT_CYAN, PROMPT_LABEL, FORMAT_RESET);
        io::stdout().flush()?;

        let prompt = match read_prompt(&mut lines).await? {
            PromptInput::Prompt(prompt) => prompt,
            PromptInput::Unreadable(reason) => {
                print_error(&format!("Could not read prompt: {}", reason))?;
                continue;
            }
            PromptInput::Done => break,
        };

        match session.exchange(&prompt).await {
            Ok(outcome) => {
                print_assistant_response(&outcome.reply);
                print_token_stats(outcome.usage.as_ref());
            }
            Err(e) => {
                print_error(&format!("Request failed: {}", e))?;
                if session.abandon_pending().is_some() {
                    debug!("Discarded unanswered prompt");
                }
            }
        }
    }

    print_session_summary(session.totals());
    Ok(())
}

/// Answer one query and exit; only the reply goes to stdout
async fn run_single_query_mode(session: &mut ChatSession, query: &str) -> anyhow::Result<()> {
    let outcome = session.exchange(query).await.context("Request failed")?;

    println!("{}", outcome.reply.trim());
    eprintln!(
        "{}{}{}",
        FORMAT_GRAY,
        format_token_stats(outcome.usage.as_ref()),
        FORMAT_RESET
    );
    Ok(())
}

fn print_error(message: &str) -> io::Result<()> {
    execute!(
        io::stderr(),
        SetForegroundColor(Color::Red),
        Print(message),
        ResetColor,
        cursor::MoveToNextLine(1),
    )
}

fn print_session_summary(totals: &UsageTotals) {
    if totals.exchanges == 0 {
        return;
    }

    let mut summary = format!(
        "Session: {} exchange(s), {} prompt / {} output / {} total tokens",
        totals.exchanges, totals.prompt_tokens, totals.completion_tokens, totals.total_tokens
    );
    if totals.unreported > 0 {
        summary.push_str(&format!(" ({} without usage)", totals.unreported));
    }
    println!("\n{}{}{}{}", FORMAT_GRAY, FORMAT_BOLD, summary, FORMAT_RESET);
}
