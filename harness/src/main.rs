use clap::{Args, Parser, Subcommand};
use harness::{
    print_results, ConsoleNotifier, HarnessConfig, LogNotifier, LtpLiteSuite, LtpRunner,
    NotifierHub, ResultParser, SuiteError, SuiteVariables, TestResultMessage, TextResultNotifier,
    SUITE_NAME,
};
use node::{CommandExecutor, LocalExecutor, Node, SshExecutor};
use provisioner::LtpInstaller;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ltp-harness")]
#[command(about = "Install and run the Linux Test Project on a remote node")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Default)]
struct NodeArgs {
    /// Node host name or address
    #[arg(long)]
    host: Option<String>,
    /// SSH user
    #[arg(long)]
    user: Option<String>,
    /// SSH port
    #[arg(long)]
    port: Option<u16>,
    /// SSH private key
    #[arg(long)]
    identity: Option<PathBuf>,
    /// Run commands on this machine instead of over SSH
    #[arg(long)]
    local: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ltp-lite suite
    Run {
        #[command(flatten)]
        target: NodeArgs,
        /// Comma-separated tests (defaults to the lite set)
        #[arg(short, long)]
        tests: Option<String>,
        /// Comma-separated tests to skip
        #[arg(short, long)]
        skip: Option<String>,
        /// Block device for runltp; an empty value disables it
        #[arg(long)]
        drive: Option<String>,
        /// Write a text summary to this file
        #[arg(long)]
        result_file: Option<PathBuf>,
        /// Print runltp's output log after the run
        #[arg(long)]
        show_output: bool,
    },
    /// Install LTP on the node if it is missing
    Install {
        #[command(flatten)]
        target: NodeArgs,
    },
    /// Parse a local LTP result log
    Parse {
        /// Path to the result log
        log: PathBuf,
        /// LTP version recorded on each result
        #[arg(long)]
        version: Option<String>,
        /// Print the results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration
    ShowConfig {
        #[command(flatten)]
        target: NodeArgs,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match &cli.config {
        Some(path) => HarnessConfig::from_file(path)?,
        None => HarnessConfig::new(),
    };
    config.apply_process_env()?;

    match cli.command {
        Commands::Run {
            target,
            tests,
            skip,
            drive,
            result_file,
            show_output,
        } => {
            apply_node_args(&mut config, &target);
            if let Some(tests) = tests {
                config = config.with_tests(harness::split_list(&tests));
            }
            if let Some(skip) = skip {
                config = config.with_skip_tests(harness::split_list(&skip));
            }
            if let Some(drive) = drive {
                let drive = drive.trim().to_string();
                config = config.with_drive((!drive.is_empty()).then_some(drive));
            }
            if let Some(path) = result_file {
                config = config.with_result_file(path);
            }
            config.validate()?;

            let passed = run_suite(&config, target.local, show_output).await?;
            if !passed {
                std::process::exit(1);
            }
        }
        Commands::Install { target } => {
            apply_node_args(&mut config, &target);
            config.validate()?;
            let runner = build_runner(&config, target.local)?;
            runner.ensure_installed().await?;
            println!("LTP is installed at {}", runner.binary_path());
        }
        Commands::Parse { log, version, json } => {
            let content = std::fs::read_to_string(&log)?;
            let version = version.unwrap_or_else(|| config.install.git_tag.clone());
            let results = ResultParser::new(version).parse(&content)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
                return Ok(());
            }
            let messages: Vec<TestResultMessage> = results
                .iter()
                .map(|result| TestResultMessage::from_ltp_result(result, SUITE_NAME))
                .collect();
            print_results(&messages, |line| println!("{}", line));
        }
        Commands::ShowConfig { target } => {
            apply_node_args(&mut config, &target);
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn apply_node_args(config: &mut HarnessConfig, args: &NodeArgs) {
    if let Some(host) = &args.host {
        config.node.host = host.clone();
    }
    if let Some(user) = &args.user {
        config.node.user = user.clone();
    }
    if let Some(port) = args.port {
        config.node.port = port;
    }
    if let Some(identity) = &args.identity {
        config.node.identity_file = Some(identity.clone());
    }
}

fn build_runner(
    config: &HarnessConfig,
    local: bool,
) -> Result<LtpRunner, Box<dyn std::error::Error>> {
    let executor: Arc<dyn CommandExecutor> = if local {
        Arc::new(LocalExecutor::new().with_default_timeout(config.node.default_timeout()))
    } else {
        Arc::new(SshExecutor::new(config.node.clone())?)
    };
    info!("Using {} executor", executor.executor_name());

    let node = Arc::new(Node::new(executor));
    Ok(LtpRunner::new(
        node,
        config.ltp.clone(),
        LtpInstaller::new(config.install.clone()),
    ))
}

/// Returns whether every test passed.
async fn run_suite(
    config: &HarnessConfig,
    local: bool,
    show_output: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    let runner = build_runner(config, local)?;

    let mut notifiers = NotifierHub::new();
    notifiers.register(Box::new(LogNotifier));
    notifiers.register(Box::new(ConsoleNotifier::default()));
    if let Some(path) = &config.report.result_file {
        notifiers.register(Box::new(TextResultNotifier::new(path)?));
    }

    let suite = LtpLiteSuite::new(SuiteVariables::from_config(&config.suite));
    let outcome = suite.run(&runner, &mut notifiers).await;
    notifiers.finalize()?;

    if show_output {
        println!("{}", runner.read_output_log().await?);
    }

    match outcome {
        Ok(results) => {
            info!("All {} tests passed or were skipped", results.len());
            Ok(true)
        }
        Err(SuiteError::TestsFailed { names }) => {
            error!("The following tests failed: {:?}", names);
            Ok(false)
        }
        Err(other) => Err(other.into()),
    }
}
