use anyhow::{Context, Result};
use capscribe::audio::{AudioSource, RawPcmSource, WavAudioSource};
use capscribe::batch::BatchPipeline;
use capscribe::cli::{Cli, Commands, ConfigAction};
use capscribe::client::{FileTranscriber, StreamSettings, run_live};
use capscribe::config::{Config, EngineKind};
use capscribe::media::FfmpegTool;
use capscribe::server::run_server;
use capscribe::transport::{ConnectOptions, Session};
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    match cli.command {
        Commands::Serve {
            engine_cmd,
            model,
            no_punctuation,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(addr) = cli.addr {
                config.server.addr = addr;
            }
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(command) = engine_cmd {
                config.server.engine.kind = EngineKind::Command;
                config.server.engine.command = command.split_whitespace().map(String::from).collect();
            }
            if let Some(model) = model {
                config.server.engine.kind = EngineKind::Whisper;
                config.server.engine.model_path = Some(model);
            }
            if no_punctuation {
                config.server.punctuation = false;
            }
            run_server(&config.server).await?;
        }
        Commands::Transcribe {
            paths,
            split,
            timeout,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            apply_client_overrides(&mut config, cli.addr, cli.port);
            if let Some(split) = split {
                config.batch.split_duration_secs = split;
            }
            if let Some(timeout) = timeout {
                config.client.recv_timeout_secs = timeout.ceil() as u64;
            }
            config.validate()?;
            handle_transcribe(&config, &paths, cli.quiet).await?;
        }
        Commands::Live {
            input,
            stdin,
            device,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            apply_client_overrides(&mut config, cli.addr, cli.port);
            let source = live_source(input.as_deref(), stdin, device.as_deref())?;
            handle_live(&config, source, cli.quiet).await?;
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "capscribe",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Log to stderr; `RUST_LOG` wins over `-q`/`-v`.
fn init_tracing(quiet: bool, verbose: u8) {
    let default = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/capscribe/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path).with_context(|| format!("Failed to load config from {}", path.display()))?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    Ok(config.with_env_overrides())
}

fn apply_client_overrides(config: &mut Config, addr: Option<String>, port: Option<u16>) {
    if let Some(addr) = addr {
        config.client.addr = addr;
    }
    if let Some(port) = port {
        config.client.port = port;
    }
}

async fn handle_transcribe(config: &Config, paths: &[PathBuf], quiet: bool) -> Result<()> {
    let base = std::env::current_dir().context("Cannot determine working directory")?;
    let pipeline = BatchPipeline::new(
        Arc::new(FfmpegTool::from_config(&config.batch)),
        Arc::new(FileTranscriber::from_config(&config.client)),
        config.batch.clone(),
    );

    let report = pipeline.run(paths, &base).await;

    if !quiet {
        for path in &report.succeeded {
            println!("{} {}", "done".green(), path.display());
        }
        for path in &report.skipped {
            println!("{} {}", "skip".dimmed(), path.display());
        }
    }
    for (path, reason) in &report.failed {
        eprintln!("{} {}: {}", "fail".red(), path.display(), reason);
    }
    if !quiet {
        println!("{}", report.summary());
    }

    if report.total() == 0 {
        anyhow::bail!("no media files found");
    }
    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

/// The audio a live session streams: a WAV file, stdin, or the microphone.
fn live_source(input: Option<&Path>, stdin: bool, device: Option<&str>) -> Result<Box<dyn AudioSource>> {
    if let Some(path) = input {
        let source = WavAudioSource::from_path(path)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        return Ok(Box::new(source));
    }
    if stdin {
        return Ok(Box::new(RawPcmSource::stdin()));
    }
    microphone(device)
}

#[cfg(feature = "cpal-audio")]
fn microphone(device: Option<&str>) -> Result<Box<dyn AudioSource>> {
    let source = capscribe::audio::MicSource::new(device).context("Cannot open the microphone")?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "cpal-audio"))]
fn microphone(_device: Option<&str>) -> Result<Box<dyn AudioSource>> {
    anyhow::bail!("Built without microphone support (feature `cpal-audio`); use --input or --stdin")
}

async fn handle_live(config: &Config, source: Box<dyn AudioSource>, quiet: bool) -> Result<()> {

    let mut session = Session::new(
        config.client.server_addr(),
        ConnectOptions::with_attempts(config.client.connect_attempts),
    );
    let settings = StreamSettings::mic(&config.client);
    let cancel = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    let outcome = run_live(source, &mut session, &settings, cancel).await;
    session.close().await;
    let result = outcome?;

    if !quiet {
        eprintln!(
            "{}",
            format!(
                "{:.1}s of audio, {:.2}s processing",
                result.duration,
                result.processing_secs()
            )
            .dimmed()
        );
    }
    println!("{}", result.text);
    Ok(())
}

/// Handle configuration commands.
fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    let config_path = custom_path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    match action {
        ConfigAction::Show => {
            let config = Config::load_or_default(&config_path)?.with_env_overrides();
            print!(
                "{}",
                toml::to_string_pretty(&config).context("Failed to render configuration")?
            );
        }
        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
    }
    Ok(())
}
