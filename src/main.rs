use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{eyre, Result};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use triones_led_controller::*;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Controller address (required for every command except scan)
    #[arg(short, long, global = true)]
    address: Option<String>,

    /// Discovery and connect timeout in seconds
    #[arg(short, long, global = true, default_value_t = 10)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
enum ModeArg {
    SevenColorCrossFade,
    RedGradual,
    GreenGradual,
    BlueGradual,
    YellowGradual,
    CyanGradual,
    PurpleGradual,
    WhiteGradual,
    RedGreenCrossFade,
    RedBlueCrossFade,
    GreenBlueCrossFade,
    SevenColorStrobe,
    RedStrobe,
    GreenStrobe,
    BlueStrobe,
    YellowStrobe,
    CyanStrobe,
    PurpleStrobe,
    WhiteStrobe,
    SevenColorJumping,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Mode {
        match arg {
            ModeArg::SevenColorCrossFade => Mode::SevenColorCrossFade,
            ModeArg::RedGradual => Mode::RedGradual,
            ModeArg::GreenGradual => Mode::GreenGradual,
            ModeArg::BlueGradual => Mode::BlueGradual,
            ModeArg::YellowGradual => Mode::YellowGradual,
            ModeArg::CyanGradual => Mode::CyanGradual,
            ModeArg::PurpleGradual => Mode::PurpleGradual,
            ModeArg::WhiteGradual => Mode::WhiteGradual,
            ModeArg::RedGreenCrossFade => Mode::RedGreenCrossFade,
            ModeArg::RedBlueCrossFade => Mode::RedBlueCrossFade,
            ModeArg::GreenBlueCrossFade => Mode::GreenBlueCrossFade,
            ModeArg::SevenColorStrobe => Mode::SevenColorStrobe,
            ModeArg::RedStrobe => Mode::RedStrobe,
            ModeArg::GreenStrobe => Mode::GreenStrobe,
            ModeArg::BlueStrobe => Mode::BlueStrobe,
            ModeArg::YellowStrobe => Mode::YellowStrobe,
            ModeArg::CyanStrobe => Mode::CyanStrobe,
            ModeArg::PurpleStrobe => Mode::PurpleStrobe,
            ModeArg::WhiteStrobe => Mode::WhiteStrobe,
            ModeArg::SevenColorJumping => Mode::SevenColorJumping,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Discover nearby Triones controllers
    Scan,
    /// Turn the controller on
    On,
    /// Turn the controller off
    Off,
    /// Set a static RGB color
    Color {
        /// Red value (0-255)
        #[arg(short, long, default_value_t = 255)]
        red: u8,
        /// Green value (0-255)
        #[arg(short, long, default_value_t = 255)]
        green: u8,
        /// Blue value (0-255)
        #[arg(short, long, default_value_t = 255)]
        blue: u8,
    },
    /// Switch to white-only output
    White {
        /// White intensity (0-255)
        #[arg(short, long, default_value_t = 255)]
        intensity: u8,
    },
    /// Set a static color from a hex string (e.g. "#ff0000")
    Hex {
        /// Six-hex-digit color
        color: String,
    },
    /// Start a built-in effect
    Mode {
        /// Effect to run
        #[arg(short, long, value_enum)]
        mode: ModeArg,
        /// Effect speed (0-100, 100 = fastest)
        #[arg(short, long, default_value_t = 50)]
        speed: u8,
    },
    /// Approximate a color temperature on the RGB channels
    Temp {
        /// Color temperature in Kelvin (1000-10000)
        #[arg(short, long, default_value_t = 4000)]
        kelvin: u32,
        /// Brightness (0-100)
        #[arg(short, long, default_value_t = 100)]
        brightness: u8,
    },
    /// Query and print the controller status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("triones_led_controller=info")),
        )
        .compact()
        .init();

    color_eyre::install()?;

    let cli = Cli::parse();
    let timeout = Duration::from_secs(cli.timeout);

    if let Commands::Scan = cli.command {
        let sessions = discover(timeout).await?;
        if sessions.is_empty() {
            println!("No Triones controllers found");
        }
        for session in &sessions {
            println!("{}", session.identity());
        }
        return Ok(());
    }

    let address = cli
        .address
        .ok_or_else(|| eyre!("an address is required; discover one with `trionesc scan`"))?;

    debug!("Connecting to {address}");
    let session = match connect_by_address(&address, timeout).await {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to connect to {address}: {e}");
            return Err(e.into());
        }
    };

    let result = run_command(&session, cli.command).await;
    session.disconnect().await?;
    result
}

async fn run_command(session: &LedSession<BleTransport>, command: Commands) -> Result<()> {
    match command {
        Commands::Scan => unreachable!("handled before connecting"),
        Commands::On => session.power_on().await?,
        Commands::Off => session.power_off().await?,
        Commands::Color { red, green, blue } => {
            session.power_on().await?;
            session.set_rgb(red, green, blue).await?;
        }
        Commands::White { intensity } => {
            session.power_on().await?;
            session.set_white(intensity).await?;
        }
        Commands::Hex { color } => {
            session.power_on().await?;
            session.set_color_hex(&color).await?;
        }
        Commands::Mode { mode, speed } => {
            session.power_on().await?;
            session.set_built_in_mode(mode.into(), speed).await?;
        }
        Commands::Temp { kelvin, brightness } => {
            session.power_on().await?;
            session.set_temperature(kelvin, brightness).await?;
        }
        Commands::Status => {
            let status = session.query_status().await?;
            info!("Controller status received");
            println!(
                "power: {}",
                if status.is_on { "on" } else { "off" }
            );
            println!("mode:  {} (speed {})", status.mode, status.speed);
            println!("color: {} (white {})", status.rgb_hex(), status.color.white);
        }
    }
    Ok(())
}
