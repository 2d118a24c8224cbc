//! Command-line harness for the script plugin.
//!
//! Loads settings from the environment, reads and runs the configured
//! script, then either prints the handshake descriptor, runs a single hook,
//! or lists the hook table. Logs go to stderr as JSON so the host process
//! can capture them; command output goes to stdout.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use clap::Subcommand;
use proxy_script_plugin::ExecutionContext;
use proxy_script_plugin::HookName;
use proxy_script_plugin::HookService;
use proxy_script_plugin::Record;
use proxy_script_plugin::ScriptPlugin;
use proxy_script_plugin::Settings;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "proxy-script-plugin", version, about = "Run Lua functions as database-proxy hooks")]
struct Cli {
    /// Log level used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Script to load. Takes precedence over the settings default.
    #[arg(long, env = "SCRIPT_PATH")]
    script: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the configuration handshake descriptor as JSON.
    Describe,

    /// Run one hook against the loaded script and print the reply.
    Invoke {
        /// Hook name (e.g. "onTrafficFromClient") or numeric hook id.
        hook: String,

        /// Request record as a JSON object.
        #[arg(long, default_value = "{}")]
        input: String,

        /// Advisory deadline passed to the script, in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// List every hook with its id and whether it is a notification.
    Hooks,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "plugin failed");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().json().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    if let Command::Hooks = cli.command {
        for hook in HookName::ALL {
            let line = serde_json::json!({
                "name": hook.as_str(),
                "id": hook.id(),
                "notification": hook.is_notification(),
            });
            println!("{line}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut settings = Settings::from_env().context("failed to load settings")?;
    if let Some(script) = cli.script {
        settings.script_path = script;
    }
    let plugin = load_plugin(settings)?;

    match cli.command {
        Command::Describe => {
            let descriptor = plugin.get_plugin_config(ExecutionContext::background()).await?;
            println!("{}", serde_json::to_string_pretty(&descriptor)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Invoke {
            hook,
            input,
            timeout_ms,
        } => {
            let req: Record = serde_json::from_str(&input).context("--input must be a JSON object")?;
            let ctx = match timeout_ms {
                Some(ms) => ExecutionContext::with_timeout(Duration::from_millis(ms)),
                None => ExecutionContext::background(),
            };

            let reply = match hook.parse::<i32>() {
                Ok(id) => plugin.route(id, ctx, req).await,
                Err(_) => plugin.dispatch(hook.parse::<HookName>()?, ctx, req).await,
            };

            tracing::debug!(counters = ?plugin.counters().snapshot(), "hook counters");

            let output = serde_json::json!({
                "record": reply.record,
                "error": reply.error.as_ref().map(ToString::to_string),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(if reply.is_ok() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Command::Hooks => Ok(ExitCode::SUCCESS),
    }
}

fn load_plugin(settings: Settings) -> anyhow::Result<ScriptPlugin> {
    let path = settings.script_path.clone();
    let source =
        std::fs::read_to_string(&path).with_context(|| format!("failed to read script file {}", path.display()))?;
    tracing::debug!(path = %path.display(), bytes = source.len(), "read script file");

    ScriptPlugin::load(settings, &source).with_context(|| format!("failed to load script {}", path.display()))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn script_flag_reads_script_path_env() {
        let command = Cli::command();
        let script = command.get_arguments().find(|arg| arg.get_id() == "script").expect("script arg");
        assert_eq!(script.get_env(), Some(std::ffi::OsStr::new("SCRIPT_PATH")));
    }

    #[test]
    fn invoke_parses_hook_and_input() {
        let cli = Cli::try_parse_from(["proxy-script-plugin", "--script", "x.lua", "invoke", "onBooted", "--input", "{\"a\":1}"])
            .expect("parse");
        assert_eq!(cli.script, Some(PathBuf::from("x.lua")));
        match cli.command {
            Command::Invoke { hook, input, timeout_ms } => {
                assert_eq!(hook, "onBooted");
                assert_eq!(input, "{\"a\":1}");
                assert_eq!(timeout_ms, None);
            }
            other => panic!("expected invoke, got {other:?}"),
        }
    }
}
