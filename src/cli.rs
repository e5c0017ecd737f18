/// Command-line surface: split monitor options from the watched command,
/// then hand the option region to clap.
///
/// The command's own arguments must never be read as monitor options, so
/// clap only ever sees the leading option region followed by an explicit
/// `--` and the command. `--` on the real command line ends the option
/// region outright; without it the region ends at the first token that is
/// not one of our options (a plain word, a lone `-`, or an unrecognized
/// flag), which is then passed through verbatim as the start of the command.
use crate::config::{
    MonitorConfig, OutputFormat, DEFAULT_INTERVAL_SECS, DEFAULT_STABLE_ITERATIONS,
    DEFAULT_TIMEOUT_SECS,
};
use clap::{ArgAction, Parser};

/// Run a command repeatedly and report whenever its output changes.
///
/// Exits once the output has been stable for the given number of polls,
/// once the timeout elapses, or on SIGINT/SIGTERM (a second signal kills an
/// in-flight command).
#[derive(Parser, Debug)]
#[command(
    name = "cmdmon",
    version,
    about,
    override_usage = "cmdmon [OPTIONS] [--] COMMAND [ARGS...]"
)]
pub struct Cli {
    /// Seconds to sleep between polls
    #[arg(short = 'i', long, value_name = "SECONDS", default_value_t = DEFAULT_INTERVAL_SECS)]
    interval: u64,

    /// Exit after this many consecutive polls without a change (0 = never)
    #[arg(short = 'I', long, value_name = "ITERATIONS", default_value_t = DEFAULT_STABLE_ITERATIONS)]
    stable_iterations: u64,

    /// Exit after this many seconds in total (0 = never)
    #[arg(short = 't', long, value_name = "SECONDS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Report encoding on stdout
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// More logging on stderr (repeat for more)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Command to watch, followed by its arguments
    #[arg(value_name = "COMMAND", required = true, num_args = 1..)]
    command: Vec<String>,
}

impl Cli {
    /// Parse a full argv (program name first).
    pub fn parse_argv<I>(argv: I) -> Result<(Cli, Boundary), clap::Error>
    where
        I: IntoIterator<Item = String>,
    {
        let mut argv = argv.into_iter();
        let program = argv.next().unwrap_or_else(|| "cmdmon".to_string());
        let split = split_args(argv.collect());

        let mut normalized = Vec::with_capacity(split.options.len() + split.command.len() + 2);
        normalized.push(program);
        normalized.extend(split.options);
        normalized.push("--".to_string());
        normalized.extend(split.command);

        let cli = Cli::try_parse_from(normalized)?;
        Ok((cli, split.boundary))
    }

    /// Log filter directive derived from `-v`/`-q`.
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    pub fn into_config(self) -> MonitorConfig {
        MonitorConfig::from_values(
            self.interval,
            self.stable_iterations,
            self.timeout,
            self.format,
            self.command,
        )
    }
}

/// How the option region was closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Boundary {
    /// An explicit `--`.
    Separator,
    /// Guessed: this token did not look like one of our options.
    Inferred { token: String },
    /// Ran out of arguments while still reading options.
    Exhausted,
}

/// Result of scanning the raw arguments.
#[derive(Debug, PartialEq, Eq)]
pub struct SplitArgs {
    pub options: Vec<String>,
    pub command: Vec<String>,
    pub boundary: Boundary,
}

const FLAG_SHORTS: &[char] = &['h', 'V', 'v', 'q'];
const VALUE_SHORTS: &[char] = &['i', 'I', 't'];
const FLAG_LONGS: &[&str] = &["--help", "--version", "--verbose", "--quiet"];
const VALUE_LONGS: &[&str] = &["--interval", "--stable-iterations", "--timeout", "--format"];

enum Token {
    /// One of ours; `takes_next` when its value is the following token.
    Option { takes_next: bool },
    /// Not ours: the command starts here.
    Foreign,
}

fn classify(arg: &str) -> Token {
    if let Some(long) = arg.strip_prefix("--") {
        let (name, inline_value) = match long.split_once('=') {
            Some((name, _)) => (name, true),
            None => (long, false),
        };
        let name = format!("--{name}");
        if VALUE_LONGS.contains(&name.as_str()) {
            return Token::Option {
                takes_next: !inline_value,
            };
        }
        if FLAG_LONGS.contains(&name.as_str()) && !inline_value {
            return Token::Option { takes_next: false };
        }
        return Token::Foreign;
    }

    let Some(cluster) = arg.strip_prefix('-') else {
        return Token::Foreign;
    };
    if cluster.is_empty() {
        return Token::Foreign;
    }

    // Flags may be clustered (`-vh`); a value flag ends the cluster and owns
    // the rest of the token, or the next token when nothing is attached.
    for (idx, c) in cluster.char_indices() {
        if FLAG_SHORTS.contains(&c) {
            continue;
        }
        if VALUE_SHORTS.contains(&c) {
            let attached = &cluster[idx + c.len_utf8()..];
            return Token::Option {
                takes_next: attached.is_empty(),
            };
        }
        return Token::Foreign;
    }
    Token::Option { takes_next: false }
}

/// Split raw arguments (program name excluded) into our option region and
/// the watched command.
pub fn split_args(args: Vec<String>) -> SplitArgs {
    let mut idx = 0;
    while idx < args.len() {
        let arg = &args[idx];
        if arg == "--" {
            let mut options = args;
            let command = options.split_off(idx + 1);
            options.truncate(idx);
            return SplitArgs {
                options,
                command,
                boundary: Boundary::Separator,
            };
        }
        match classify(arg) {
            Token::Option { takes_next } => {
                idx += 1;
                // A dangling value flag right before `--` is left for clap to reject.
                if takes_next && idx < args.len() && args[idx] != "--" {
                    idx += 1;
                }
            }
            Token::Foreign => {
                let token = arg.clone();
                let mut options = args;
                let command = options.split_off(idx);
                return SplitArgs {
                    options,
                    command,
                    boundary: Boundary::Inferred { token },
                };
            }
        }
    }
    SplitArgs {
        options: args,
        command: Vec::new(),
        boundary: Boundary::Exhausted,
    }
}
