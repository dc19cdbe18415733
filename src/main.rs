use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::path::PathBuf;

use launchpatch::config::{
    self, ensure_parent, read_config, read_config_from_str, resolve_config_path, Config,
};
use launchpatch::error::AppError;
use launchpatch::gate::{self, TerminalInput};
use launchpatch::patch::{backup_path_for, LaunchTarget, PatchStep, Patcher, SteamLayout};
use launchpatch::process::{ProcessMonitor, SystemProcesses};
use launchpatch::report::{ConsoleReporter, Reporter};

const CLOSE_STEAM_PROMPT: &str =
    "Steam must be closed before its configuration can be edited. Close Steam, then type 'y' to continue or 'n' to cancel.";
const STEAM_RUNNING_MESSAGE: &str = "Steam is still running!";

#[derive(Parser, Debug)]
#[command(
    name = "launchpatch",
    version,
    about = "Set Steam launch options for a game on the active account"
)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    json: bool,
    /// Steam install directory; overrides steam.root from the config file.
    #[arg(long, global = true)]
    steam_root: Option<PathBuf>,
    /// Store the game was installed from. Only Steam keeps launch options.
    #[arg(long, global = true, value_enum, default_value_t = Distributor::Steam)]
    distributor: Distributor,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Show the files launchpatch reads and writes.
    Paths,
    /// Print the short id of the account that logged in last.
    Account,
    /// Print the current launch options of the configured app.
    Show,
    /// Replace the launch options of the configured app.
    Patch {
        /// New launch options, e.g. `"/path/to/loader" %command%`.
        #[arg(allow_hyphen_values = true)]
        value: String,
        /// Do not prompt; fail right away if Steam is running.
        #[arg(long)]
        yes: bool,
    },
    /// Put localconfig.vdf back from its .bak copy.
    Restore {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Init,
    Validate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
enum Distributor {
    Steam,
    Gog,
    Microsoft,
    Unknown,
}

#[derive(Debug, Clone)]
struct Context {
    config_path: PathBuf,
    steam_root: Option<PathBuf>,
    distributor: Distributor,
    json: bool,
}

#[derive(Debug, Serialize)]
struct JsonResult<T: Serialize> {
    ok: bool,
    result: Option<T>,
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_step: Option<PatchStep>,
}

fn main() -> Result<(), AppError> {
    let cli = Cli::parse();
    let ctx = build_context(&cli);
    let reporter = ConsoleReporter {
        quiet_stdout: ctx.json,
    };

    let result = match cli.command {
        Commands::Config { command } => handle_config(&ctx, command),
        Commands::Paths => handle_paths(&ctx),
        Commands::Account => handle_account(&ctx),
        Commands::Show => handle_show(&ctx),
        Commands::Patch { value, yes } => handle_patch(&ctx, &value, yes, &reporter),
        Commands::Restore { yes } => handle_restore(&ctx, yes, &reporter),
    };

    if let Err(err) = result {
        if ctx.json {
            let payload = JsonResult::<serde_json::Value> {
                ok: false,
                result: None,
                error: Some(err.to_string()),
                error_step: extract_patch_step(&err),
            };
            print_json(&payload)?;
        } else {
            reporter.error(&err.to_string());
        }
        std::process::exit(1);
    }

    Ok(())
}

fn build_context(cli: &Cli) -> Context {
    Context {
        config_path: resolve_config_path(cli.config.as_ref()),
        steam_root: cli.steam_root.clone(),
        distributor: cli.distributor,
        json: cli.json,
    }
}

fn handle_config(ctx: &Context, command: ConfigCommand) -> Result<(), AppError> {
    match command {
        ConfigCommand::Init => {
            if ctx.config_path.exists() {
                return output(ctx, json!({"path": ctx.config_path, "created": false}));
            }
            ensure_parent(&ctx.config_path)?;
            fs::write(&ctx.config_path, config::default_config_yaml())?;
            output(ctx, json!({"path": ctx.config_path, "created": true}))
        }
        ConfigCommand::Validate => {
            let content = fs::read_to_string(&ctx.config_path)?;
            let _cfg = read_config_from_str(&content)?;
            output(ctx, json!({"path": ctx.config_path, "valid": true}))
        }
    }
}

fn build_patcher(ctx: &Context, cfg: &Config) -> Result<Patcher, AppError> {
    let root = cfg.steam_root(ctx.steam_root.as_deref())?;
    Ok(Patcher::new(
        SteamLayout::new(root),
        LaunchTarget::new(cfg.steam.app_id.trim()),
        cfg.decode_options(),
    ))
}

fn handle_paths(ctx: &Context) -> Result<(), AppError> {
    let cfg = read_config(&ctx.config_path)?;
    let patcher = build_patcher(ctx, &cfg)?;
    let processes = SystemProcesses::detect()?;
    let loginusers = patcher.layout.loginusers_path();
    let (account, localconfig, account_error) = match patcher.active_account() {
        Ok(account) => {
            let localconfig = patcher.layout.localconfig_path(&account);
            (Some(account.to_string()), Some(localconfig), None)
        }
        Err(err) => (None, None, Some(err.to_string())),
    };
    let backup = localconfig.as_deref().map(backup_path_for);
    output(
        ctx,
        json!({
            "config_path": ctx.config_path,
            "config_exists": ctx.config_path.exists(),
            "steam_root": patcher.layout.root,
            "loginusers": loginusers,
            "loginusers_exists": loginusers.exists(),
            "account": account,
            "account_error": account_error,
            "localconfig": localconfig,
            "backup": backup,
            "process_name": cfg.process_name(),
            "process_probe": processes.probe_description(),
        }),
    )
}

fn handle_account(ctx: &Context) -> Result<(), AppError> {
    let cfg = read_config(&ctx.config_path)?;
    let patcher = build_patcher(ctx, &cfg)?;
    let account = patcher.active_account()?;
    output(
        ctx,
        json!({
            "account": account.as_str(),
            "loginusers": patcher.layout.loginusers_path(),
        }),
    )
}

fn handle_show(ctx: &Context) -> Result<(), AppError> {
    let cfg = read_config(&ctx.config_path)?;
    let patcher = build_patcher(ctx, &cfg)?;
    let account = patcher.active_account()?;
    let launch_options = patcher.read_launch_options(&account)?;
    output(
        ctx,
        json!({
            "account": account.as_str(),
            "app_id": patcher.target.app_id,
            "path": patcher.layout.localconfig_path(&account),
            "launch_options": launch_options,
        }),
    )
}

fn handle_patch(
    ctx: &Context,
    value: &str,
    yes: bool,
    reporter: &dyn Reporter,
) -> Result<(), AppError> {
    if ctx.distributor != Distributor::Steam {
        return skip_for_distributor(ctx, reporter);
    }
    let cfg = read_config(&ctx.config_path)?;
    let processes = SystemProcesses::detect()?;
    if !wait_for_steam_exit(&processes, &cfg.process_name(), yes, reporter)? {
        reporter.warn("Cancelled; launch options were not changed.");
        return output(ctx, json!({"changed": false, "cancelled": true}));
    }

    let patcher = build_patcher(ctx, &cfg)?;
    let account = patcher.active_account()?;
    let report = patcher.patch_launch_options(&account, value, reporter)?;
    reporter.success(&format!(
        "Launch options for app {} set in {}.",
        patcher.target.app_id,
        report.path.display()
    ));
    output(
        ctx,
        json!({
            "changed": true,
            "account": account.as_str(),
            "app_id": patcher.target.app_id,
            "path": report.path,
            "backup": report.backup_path,
            "previous": report.previous,
            "launch_options": report.value,
        }),
    )
}

fn handle_restore(ctx: &Context, yes: bool, reporter: &dyn Reporter) -> Result<(), AppError> {
    if ctx.distributor != Distributor::Steam {
        return skip_for_distributor(ctx, reporter);
    }
    let cfg = read_config(&ctx.config_path)?;
    let processes = SystemProcesses::detect()?;
    if !wait_for_steam_exit(&processes, &cfg.process_name(), yes, reporter)? {
        reporter.warn("Cancelled; nothing was restored.");
        return output(ctx, json!({"restored": false, "cancelled": true}));
    }

    let patcher = build_patcher(ctx, &cfg)?;
    let account = patcher.active_account()?;
    let path = patcher.restore_backup(&account, reporter)?;
    output(
        ctx,
        json!({
            "restored": true,
            "account": account.as_str(),
            "path": path,
            "backup": backup_path_for(&path),
        }),
    )
}

fn skip_for_distributor(ctx: &Context, reporter: &dyn Reporter) -> Result<(), AppError> {
    reporter.warn(&format!(
        "Launch options are a Steam feature; nothing to do for {:?}.",
        ctx.distributor
    ));
    output(ctx, json!({"changed": false, "distributor": ctx.distributor}))
}

/// Returns `Ok(true)` once Steam is confirmed closed, `Ok(false)` if the operator declined.
fn wait_for_steam_exit(
    monitor: &dyn ProcessMonitor,
    process_name: &str,
    yes: bool,
    reporter: &dyn Reporter,
) -> Result<bool, AppError> {
    if yes {
        if monitor.is_running(process_name) {
            return Err(AppError::Process(format!(
                "{process_name} is still running; close Steam and try again"
            )));
        }
        return Ok(true);
    }
    let mut input = TerminalInput;
    let choice = gate::await_choice(
        CLOSE_STEAM_PROMPT,
        &["y", "n"],
        || monitor.is_running(process_name),
        STEAM_RUNNING_MESSAGE,
        &mut input,
        reporter,
    )?;
    Ok(choice == "y")
}

fn extract_patch_step(err: &AppError) -> Option<PatchStep> {
    match err {
        AppError::Patch(patch_err) => Some(patch_err.step),
        _ => None,
    }
}

fn output(ctx: &Context, payload: serde_json::Value) -> Result<(), AppError> {
    if ctx.json {
        let wrapper = JsonResult {
            ok: true,
            result: Some(payload),
            error: None,
            error_step: None,
        };
        print_json(&wrapper)?;
    } else {
        print_fields(&payload);
    }
    Ok(())
}

fn print_fields(payload: &serde_json::Value) {
    let Some(fields) = payload.as_object() else {
        println!("{payload}");
        return;
    };
    for (key, value) in fields {
        match value {
            serde_json::Value::Null => println!("{key}: -"),
            serde_json::Value::String(text) => println!("{key}: {text}"),
            other => println!("{key}: {other}"),
        }
    }
}

fn print_json<T: Serialize>(payload: &T) -> Result<(), AppError> {
    let text = serde_json::to_string_pretty(payload)?;
    println!("{}", text);
    Ok(())
}
