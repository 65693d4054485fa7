use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::io::Read;
use std::path::Path;

use harness_guard_cli::audit::{AuditConfig, DecisionLog, DEFAULT_MAX_BYTES};
use harness_guard_cli::permissions::build_permission_scope;
use harness_guard_cli::security::allowlist::ALLOWED_COMMANDS;
use harness_guard_cli::security::extract::try_extract_commands;
use harness_guard_cli::security::lexer::split_command_segments;
use harness_guard_cli::security::{bash_security_hook, Decision, ToolInvocation};
use harness_guard_cli::settings::{write_settings, DEFAULT_MODEL};

/// Exit status telling the agent loop a command was blocked
const EXIT_BLOCKED: i32 = 2;

#[derive(Parser)]
#[command(name = "harness-guard-cli")]
#[command(about = "Shell command gatekeeper for autonomous coding agents", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pre-tool-use hook: read a tool invocation as JSON on stdin
    Hook {
        /// Append the decision to this JSONL log
        #[arg(short, long)]
        log_file: Option<String>,

        /// Rotate the log once it grows past this many bytes
        #[arg(long, default_value_t = DEFAULT_MAX_BYTES)]
        max_log_bytes: u64,
    },

    /// Validate a shell command line
    Validate {
        /// Command line to validate
        #[arg(short, long)]
        command: String,

        /// Append the decision to this JSONL log
        #[arg(short, long)]
        log_file: Option<String>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the programs a command line would run
    Extract {
        /// Command line to inspect
        #[arg(short, long)]
        command: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show how a command line splits into segments and pipe stages
    Segments {
        /// Command line to inspect
        #[arg(short, long)]
        command: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the permission scope for a project directory
    Permissions {
        /// Project directory (relative paths are resolved)
        #[arg(short = 'd', long)]
        project_dir: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Write the project settings file
    Settings {
        /// Project directory (created if missing)
        #[arg(short = 'd', long)]
        project_dir: String,

        /// Model strategy recorded in the settings
        #[arg(short, long, default_value = DEFAULT_MODEL)]
        model: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List allowed programs and their extra validation
    Allowlist {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show recent decisions from a decision log
    Audit {
        /// Decision log to read
        #[arg(short, long)]
        log_file: String,

        /// Number of entries to show
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version and capabilities
    Info {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Hook {
            log_file,
            max_log_bytes,
        } => {
            let mut input = String::new();
            let decision = match std::io::stdin().read_to_string(&mut input) {
                Ok(_) => match serde_json::from_str::<ToolInvocation>(&input) {
                    Ok(invocation) => {
                        let decision = bash_security_hook(&invocation);
                        if let Some(path) = &log_file {
                            let config = AuditConfig::new().with_max_bytes(max_log_bytes);
                            record_decision(
                                &DecisionLog::with_config(path, config),
                                &invocation,
                                &decision,
                            );
                        }
                        decision
                    }
                    Err(e) => Decision::block(format!("Could not parse hook input: {}", e)),
                },
                Err(e) => Decision::block(format!("Could not read hook input: {}", e)),
            };

            println!("{}", decision.to_hook_output());
            if !decision.is_allowed() {
                std::process::exit(EXIT_BLOCKED);
            }
        }

        Commands::Validate {
            command,
            log_file,
            format,
        } => {
            let invocation = ToolInvocation::shell(&command);
            let decision = bash_security_hook(&invocation);
            if let Some(path) = &log_file {
                record_decision(&DecisionLog::new(path), &invocation, &decision);
            }

            if format == "json" {
                print_json(&decision);
            } else {
                let icon = if decision.is_allowed() { "✓" } else { "✗" };
                println!("{} Command: {}", icon, command);
                println!("Decision: {}", decision.label());
                if let Some(reason) = decision.reason() {
                    println!("Reason: {}", reason);
                }
            }
        }

        Commands::Extract { command, format } => match try_extract_commands(&command) {
            Ok(commands) => {
                if format == "json" {
                    print_json(&commands);
                } else {
                    for cmd in &commands {
                        println!("{}\t{}", cmd.program, cmd.stage);
                    }
                }
            }
            Err(e) => {
                eprintln!("Error parsing command: {}", e);
                std::process::exit(1);
            }
        },

        Commands::Segments { command, format } => match split_command_segments(&command) {
            Ok(segments) => {
                if format == "json" {
                    print_json(&segments);
                } else {
                    for (i, segment) in segments.iter().enumerate() {
                        println!("[{}] {}", i + 1, segment.as_str());
                        for stage in &segment.stages {
                            println!("    | {}", stage);
                        }
                    }
                }
            }
            Err(e) => {
                eprintln!("Error parsing command: {}", e);
                std::process::exit(1);
            }
        },

        Commands::Permissions {
            project_dir,
            format,
        } => match build_permission_scope(Path::new(&project_dir)) {
            Ok(scope) => {
                if format == "json" {
                    print_json(&json!({
                        "scope": scope,
                        "rules": scope.to_rules(),
                    }));
                } else {
                    println!("Default mode: {}", scope.default_mode);
                    println!("\nAllow rules:");
                    for rule in scope.allow_rules() {
                        println!("  - {}", rule);
                    }
                }
            }
            Err(e) => {
                eprintln!("Error building permission scope: {}", e);
                std::process::exit(1);
            }
        },

        Commands::Settings {
            project_dir,
            model,
            format,
        } => match write_settings(Path::new(&project_dir), &model) {
            Ok(path) => output_result(&format, "settings_file", &path.display().to_string()),
            Err(e) => {
                eprintln!("Error writing settings: {}", e);
                std::process::exit(1);
            }
        },

        Commands::Allowlist { format } => {
            if format == "json" {
                print_json(&ALLOWED_COMMANDS);
            } else {
                println!("Allowed commands:");
                for entry in ALLOWED_COMMANDS {
                    if entry.validation.requires_extra_validation() {
                        println!("  {} ({})", entry.program, entry.validation);
                    } else {
                        println!("  {}", entry.program);
                    }
                }
            }
        }

        Commands::Audit {
            log_file,
            limit,
            format,
        } => {
            let log = DecisionLog::new(&log_file);
            let result = log
                .recent(limit)
                .and_then(|entries| log.summary().map(|summary| (entries, summary)));

            match result {
                Ok((entries, summary)) => {
                    if format == "json" {
                        print_json(&json!({
                            "summary": summary,
                            "entries": entries,
                        }));
                    } else {
                        println!(
                            "Decisions: {} total, {} allowed, {} blocked",
                            summary.total, summary.allowed, summary.blocked
                        );
                        for entry in &entries {
                            let icon = if entry.is_blocked() { "✗" } else { "✓" };
                            println!(
                                "  {} [{}] {} {}",
                                icon,
                                entry.timestamp,
                                entry.tool_name,
                                entry.command.as_deref().unwrap_or("")
                            );
                            if let Some(reason) = &entry.reason {
                                println!("      Reason: {}", reason);
                            }
                        }
                    }
                }
                Err(e) => {
                    eprintln!("Error reading decision log: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Info { format } => {
            let info = json!({
                "version": env!("CARGO_PKG_VERSION"),
                "capabilities": [
                    "hook",
                    "validate",
                    "extract",
                    "segments",
                    "permissions",
                    "settings",
                    "allowlist",
                    "audit"
                ],
                "decisions": ["allow", "block"],
                "validations": ["standard", "process_kill", "permission_change", "init_script"]
            });
            if format == "json" {
                print_json(&info);
            } else {
                println!("harness-guard-cli v{}", env!("CARGO_PKG_VERSION"));
                println!("\nCapabilities:");
                println!("  - hook: Gate a tool invocation read from stdin");
                println!("  - validate: Validate a command line against the allowlist");
                println!("  - extract: List the programs a command line would run");
                println!("  - segments: Show chained segments and pipe stages");
                println!("  - permissions: Show the project permission scope");
                println!("  - settings: Write the project settings file");
                println!("  - allowlist: List allowed programs");
                println!("  - audit: Show recent logged decisions");
            }
        }
    }
}

/// Log a decision; a failed write is reported but never changes the decision
fn record_decision(log: &DecisionLog, invocation: &ToolInvocation, decision: &Decision) {
    if let Err(e) = log.record(invocation, decision) {
        eprintln!(
            "Warning: could not write decision log {}: {}",
            log.path().display(),
            e
        );
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            std::process::exit(1);
        }
    }
}

fn output_result(format: &str, key: &str, value: &str) {
    if format == "json" {
        println!("{}", json!({ key: value }));
    } else {
        println!("{}={}", key, value);
    }
}
