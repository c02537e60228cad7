mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use cliphost::{config, server};
use cliphost_av::{check_tools, probe_source, require_tool, select_ladder};
use serde_json::json;

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config::validate_config(&config)?;

    tracing::info!("Starting cliphost");
    tracing::info!(
        concurrency = config.transcode.concurrency,
        max_upload = %config.storage.max_upload_size,
        "Transcode pool configured"
    );

    let ctx = server::AppContext::from_config(config).await?;
    server::start_server(ctx).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "cliphost=trace,cliphost_av=trace,cliphost_db=debug,tower_http=debug".to_string()
        } else {
            "cliphost=info,cliphost_av=info,cliphost_db=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Probe { input, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe(&input, cli.config.as_deref(), json))
        }
        Commands::CheckTools => check_tools_cmd(),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("cliphost {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn probe(input: &str, config_path: Option<&std::path::Path>, as_json: bool) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let ffprobe = require_tool("ffprobe", config.transcode.ffprobe_path.as_deref())?;
    let table = config.transcode.quality_table()?;

    let info = probe_source(&ffprobe, input).await?;
    let ladder = select_ladder(info.width, info.height, info.fps, &table);

    if as_json {
        let rungs: Vec<_> = ladder
            .rungs()
            .iter()
            .map(|r| {
                json!({
                    "width": r.width,
                    "height": r.height,
                    "framerate": r.framerate,
                    "bitrate_mbps": r.bitrate,
                })
            })
            .collect();
        let output = json!({
            "source": info,
            "aspect": ladder.aspect().as_str(),
            "rungs": rungs,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let secs = info.duration.as_secs();
    println!("Input: {}", input);
    println!("Resolution: {}x{}", info.width, info.height);
    println!("Frame rate: {} fps", info.fps);
    println!(
        "Duration: {:02}:{:02}:{:02}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60
    );
    println!("Audio tracks: {}", info.audio_tracks);
    if info.rotation != 0 {
        println!("Rotation: {} degrees", info.rotation);
    }

    println!("\nLadder ({}):", ladder.aspect().as_str());
    for rung in ladder.rungs() {
        println!(
            "  [{}] {}x{} @ {} fps, {:.1} Mbps",
            rung.index, rung.width, rung.height, rung.framerate, rung.bitrate
        );
    }

    Ok(())
}

fn check_tools_cmd() -> Result<()> {
    println!("Checking external tools...\n");

    let mut all_ok = true;
    for tool in check_tools() {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);
        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("ffmpeg and ffprobe are required to transcode uploads.");
    }

    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            config::load_config(p)?
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };
    config::validate_config(&config)?;

    println!("✓ Configuration is valid");
    println!("  Public server: {}:{}", config.server.host, config.server.port);
    println!(
        "  Internal server: {}:{}",
        config.server.internal_host, config.server.internal_port
    );
    println!("  Object root: {:?}", config.storage.root);
    println!("  Max upload: {}", config.storage.max_upload_size);
    println!("  Workers: {}", config.transcode.concurrency);
    println!("  Quality presets: {}", config.transcode.quality_presets.len());

    Ok(())
}
