use anyhow::Context;
use clap::{Parser, Subcommand};
use envcfg::config::catalog::{Requirement, Setting};
use envcfg::config::render::render_env_file;
use envcfg::config::{ConfigResolver, Environment, TlsFallback};
use envcfg::observability;
use std::path::PathBuf;
use tracing::info;

const SERVICE_NAME: &str = "envcfg";

#[derive(Parser, Debug)]
#[command(name = "envcfg", version, about = "Resolve and inspect environment-driven application settings")]
struct Cli {
    /// Project root holding `env_var_prefix` and the optional `.env`
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// development, testing or production
    #[arg(long, short, global = true, env = "APP_CONFIG", default_value = "development")]
    environment: String,

    /// Fail on an unparseable TLS flag instead of keeping TLS enabled
    #[arg(long, global = true)]
    strict_tls: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve settings and report whether they are complete
    Check,
    /// Print resolved settings as JSON, secret redacted
    Show,
    /// Print the normalized variable prefix
    Prefix,
    /// List the variables consulted for the environment
    Vars,
    /// Write override-file text reproducing the resolved settings
    RenderEnv {
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Install settings-driven logging and emit one record per level
    ProbeLogging,
}

fn resolver(cli: &Cli) -> anyhow::Result<ConfigResolver> {
    let policy = if cli.strict_tls {
        TlsFallback::Reject
    } else {
        TlsFallback::Enable
    };
    let resolver = ConfigResolver::from_root(&cli.root)
        .with_context(|| format!("loading configuration from {}", cli.root.display()))?;
    Ok(resolver.with_tls_fallback(policy))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // probe-logging installs its own subscriber once settings are known
    if !matches!(cli.command, Command::ProbeLogging) {
        observability::init_tracing(SERVICE_NAME)?;
    }
    let resolver = resolver(&cli)?;

    match &cli.command {
        Command::Check => {
            let settings = resolver.resolve(&cli.environment)?;
            println!(
                "{} settings OK (mail sink {}, TLS {})",
                settings.environment,
                if settings.mail_configured() { "configured" } else { "off" },
                if settings.tls_enforced.is_enabled() { "enabled" } else { "disabled" },
            );
        }
        Command::Show => {
            let settings = resolver.resolve(&cli.environment)?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Command::Prefix => println!("{}", resolver.prefix()),
        Command::Vars => {
            let env: Environment = cli.environment.parse()?;
            for setting in Setting::ALL {
                let name = resolver.variable_name(env, setting);
                let requirement = match setting.requirement() {
                    Requirement::Required => "required".to_string(),
                    Requirement::Optional { default: Some(d) } => format!("default {d}"),
                    Requirement::Optional { default: None } => "optional".to_string(),
                };
                let state = if resolver.source().get(&name).is_some() { "set" } else { "unset" };
                println!("{name:<45} {state:<6} {requirement:<16} {:?}", setting.coercion());
            }
        }
        Command::RenderEnv { output } => {
            let settings = resolver.resolve(&cli.environment)?;
            let text = render_env_file(&settings, resolver.prefix())?;
            match output {
                Some(path) => {
                    std::fs::write(path, text)
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!(path = %path.display(), "override file written");
                }
                None => print!("{text}"),
            }
        }
        Command::ProbeLogging => probe_logging(&resolver, &cli.environment)?,
    }

    Ok(())
}

/// Settings must be resolved before logging exists, so resolution errors
/// surface on stderr through anyhow only.
fn probe_logging(resolver: &ConfigResolver, environment: &str) -> anyhow::Result<()> {
    let settings = resolver.resolve(environment)?;
    let guard = observability::init_logging(SERVICE_NAME, &settings)?;

    tracing::trace!(sink = "probe", "trace record");
    tracing::debug!(sink = "probe", "debug record");
    tracing::info!(sink = "probe", "info record");
    tracing::warn!(sink = "probe", "warning record");
    tracing::error!(sink = "probe", "error record");

    println!(
        "records emitted; file sink {} at {}, mail sink {} ({} dropped)",
        settings.logging_file_base_path.display(),
        settings.logging_file_level,
        if guard.mail_configured() { "on" } else { "off" },
        guard.dropped_alerts(),
    );
    Ok(())
}
