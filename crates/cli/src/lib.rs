use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rfplayer_client::{available_ports, RfPlayerClient, SIMULATOR_PORT};
use rfplayer_gateway::{
    build_entities, DeviceConfig, Gateway, GatewayConfig, GatewaySignal, CONNECTION_TIMEOUT,
};
use rfplayer_profiles::ProfileRegistry;
use rfplayer_protocol::{parse_json_device, parse_packet, RfDeviceEvent, RfPlayerPacket};
use serde_json::{json, Value};
use std::io::Read;
use std::path::{Path, PathBuf};

mod output;

#[derive(Parser)]
#[command(name = "rfplayer")]
#[command(about = "Talk to RfPlayer RF gateways and test device profiles", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports
    Ports,

    /// Write a default gateway config file
    InitConfig(InitConfigArgs),

    /// Run the gateway and print events and entity updates until Ctrl-C
    Listen(ListenArgs),

    /// Send a raw command to the gateway
    Send(SendArgs),

    /// Send a pairing command (ASSOC <protocol> ID <address>)
    Pair(PairArgs),

    /// List device profiles
    Profiles(ProfilesArgs),

    /// Show the profile and entity values a recorded event resolves to
    Match(MatchArgs),
}

#[derive(Args)]
struct InitConfigArgs {
    /// Config file to create
    path: PathBuf,

    /// Serial port of the gateway
    #[arg(long, conflicts_with = "simulator")]
    port: Option<String>,

    /// Use the in-memory simulator instead of a serial port
    #[arg(long)]
    simulator: bool,

    /// Receiver protocols to enable on connect (repeatable)
    #[arg(long = "receiver")]
    receivers: Vec<String>,

    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct ConfigArg {
    /// Gateway config file
    #[arg(short, long, default_value = "rfplayer.toml")]
    config: PathBuf,
}

#[derive(Args)]
struct ListenArgs {
    #[command(flatten)]
    config: ConfigArg,

    /// Print one JSON object per line
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct SendArgs {
    #[command(flatten)]
    config: ConfigArg,

    /// Command without the ZIA++ prefix, e.g. "STATUS JSON"
    command: String,
}

#[derive(Args)]
struct PairArgs {
    #[command(flatten)]
    config: ConfigArg,

    #[arg(long)]
    protocol: String,

    #[arg(long)]
    address: String,
}

#[derive(Args)]
struct ProfilesArgs {
    /// Extra profile file, tried before the built-in profiles
    #[arg(long)]
    file: Option<PathBuf>,

    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct MatchArgs {
    /// Extra profile file, tried before the built-in profiles
    #[arg(long)]
    file: Option<PathBuf>,

    /// JSON frame or ZIA33 line; `-` reads stdin
    event: PathBuf,

    #[arg(long)]
    json: bool,
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Ports => run_ports()?,
        Commands::InitConfig(args) => run_init_config(args)?,
        Commands::Listen(args) => run_listen(args).await?,
        Commands::Send(args) => run_send(args).await?,
        Commands::Pair(args) => run_pair(args).await?,
        Commands::Profiles(args) => run_profiles(args)?,
        Commands::Match(args) => run_match(args)?,
    }
    Ok(())
}

fn run_ports() -> Result<()> {
    let ports = available_ports().context("Failed to list serial ports")?;
    if ports.is_empty() {
        log::warn!("No serial ports found");
    }
    for port in ports {
        println!("{port}");
    }
    Ok(())
}

fn run_init_config(args: InitConfigArgs) -> Result<()> {
    if args.path.exists() && !args.force {
        bail!(
            "{} already exists (use --force to overwrite)",
            args.path.display()
        );
    }
    let port = if args.simulator {
        SIMULATOR_PORT.to_string()
    } else {
        args.port
            .unwrap_or_else(|| GatewayConfig::default().port)
    };
    let mut config = GatewayConfig::new(port);
    config.receiver_protocols = args.receivers;
    config.validate()?;
    config
        .save(&args.path)
        .with_context(|| format!("Failed to write {}", args.path.display()))?;
    println!("{}", args.path.display());
    Ok(())
}

async fn run_listen(args: ListenArgs) -> Result<()> {
    let path = &args.config.config;
    let gateway = Gateway::from_config_file(path)
        .with_context(|| format!("Failed to load config {}", path.display()))?;
    let mut signals = gateway.subscribe();

    if !args.json {
        for snapshot in gateway.entities().await {
            println!("entity  {}", output::snapshot_line(&snapshot));
        }
    }

    let runner = tokio::spawn({
        let gateway = gateway.clone();
        async move { gateway.run().await }
    });

    loop {
        tokio::select! {
            signal = signals.recv() => match signal {
                Ok(signal) => print_signal(&signal, args.json),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Skipped {skipped} gateway signals");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                log::info!("Stopping");
                break;
            }
        }
    }

    gateway.shutdown();
    runner.await.context("Gateway task failed")??;
    Ok(())
}

fn print_signal(signal: &GatewaySignal, json: bool) {
    if json {
        println!("{}", output::signal_json(signal));
    } else {
        println!("{}", output::signal_line(signal));
    }
}

async fn connect_client(config_path: &Path) -> Result<RfPlayerClient> {
    let config = GatewayConfig::load(config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    let (mut client, _events) = RfPlayerClient::new(config.client_config());
    tokio::time::timeout(CONNECTION_TIMEOUT, client.connect())
        .await
        .context("Timed out connecting to RfPlayer")?
        .with_context(|| format!("Failed to connect to {}", config.port))?;
    Ok(client)
}

async fn run_send(args: SendArgs) -> Result<()> {
    let mut client = connect_client(&args.config.config).await?;
    client.send_raw_command(&args.command)?;
    client.flush_and_close().await;
    Ok(())
}

async fn run_pair(args: PairArgs) -> Result<()> {
    let mut client = connect_client(&args.config.config).await?;
    client.send_pairing_command(&args.protocol, &args.address)?;
    client.flush_and_close().await;
    println!("Pairing command sent for {} {}", args.protocol, args.address);
    Ok(())
}

fn load_registry(file: Option<&Path>) -> Result<ProfileRegistry> {
    let mut registry = ProfileRegistry::new();
    if let Some(file) = file {
        registry
            .register_file(file)
            .with_context(|| format!("Failed to load profiles from {}", file.display()))?;
    }
    registry.extend(ProfileRegistry::builtin().context("Built-in profiles are invalid")?)?;
    Ok(registry)
}

fn run_profiles(args: ProfilesArgs) -> Result<()> {
    let registry = load_registry(args.file.as_deref())?;
    for name in registry.profile_names() {
        let Some(profile) = registry.profile(name) else {
            continue;
        };
        if args.json {
            println!("{}", output::profile_json(profile));
        } else {
            let platforms: Vec<&str> = profile
                .platforms
                .platforms()
                .into_iter()
                .map(|p| p.as_str())
                .collect();
            println!("{name} [{}]", platforms.join(", "));
        }
    }
    Ok(())
}

fn read_event(path: &Path) -> Result<Value> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
    };
    let content = content.trim();
    if content.starts_with("ZIA") {
        return match parse_packet(content) {
            Some(RfPlayerPacket::Json(value)) => Ok(value),
            _ => bail!("not a ZIA33 JSON frame"),
        };
    }
    serde_json::from_str(content).context("Invalid JSON event")
}

fn run_match(args: MatchArgs) -> Result<()> {
    let registry = load_registry(args.file.as_deref())?;
    let frame = read_event(&args.event)?;
    let Some(profile_name) = registry.profile_name_for_event(&frame) else {
        bail!("No profile matches the event");
    };

    let device_id = parse_json_device(&frame)?;
    let mut device = DeviceConfig::new(&device_id.protocol, &device_id.address)
        .with_profile(profile_name);
    device.model = device_id.model.clone();
    let event = RfDeviceEvent {
        device: device_id,
        data: RfPlayerPacket::Json(frame),
    };

    let mut snapshots = Vec::new();
    for mut entity in build_entities(&device, &registry) {
        entity.apply_event(&event);
        snapshots.push(entity.snapshot());
    }

    if args.json {
        let out = json!({
            "profile": profile_name,
            "device": event.device,
            "id_string": event.id_string(),
            "entities": snapshots,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("profile {profile_name}");
        println!("device  {}", event.id_string());
        for snapshot in &snapshots {
            println!("entity  {}", output::snapshot_line(snapshot));
        }
    }
    Ok(())
}
