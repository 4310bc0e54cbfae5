use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use log::{error, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use voltage_sms::{
    discovery::{list_ports, select_port},
    encoding::preview,
    error::EXIT_OK,
    CallEvent, CallbackLogger, EncodingMode, JsonlWriter, MessageRecord, ModemConfig, ModemSession,
    PortSelection, SerialTransport, SmsResult,
};

#[derive(Debug, Parser)]
#[command(name = "sms-gateway")]
#[command(about = "Send and receive SMS through a SIMCom modem")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    modem: ModemArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct ModemArgs {
    /// Serial port (e.g. /dev/ttyUSB2, COM10) or "auto"; defaults to $PORT
    #[arg(long, global = true)]
    port: Option<PortSelection>,

    /// Line speed; defaults to $BAUD or 115200
    #[arg(long, global = true)]
    baud: Option<u32>,

    /// Per-read timeout in milliseconds; defaults to $READ_TIMEOUT_MS or 1000
    #[arg(long = "read-timeout-ms", global = true)]
    read_timeout_ms: Option<u64>,

    /// Log every line to and from the modem
    #[arg(long, global = true)]
    echo: bool,

    /// Print each modem line with its classification
    #[arg(long, global = true)]
    interpret: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List serial ports and the one auto-detection would pick
    Ports,
    /// Put the modem into SMS push mode and exit
    Init(InitArgs),
    /// Log incoming SMS until interrupted
    Receive(ReceiveArgs),
    /// Report incoming calls until interrupted
    Calls,
    /// Send one SMS
    Send(SendArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    /// Also enable ring and caller id reporting
    #[arg(long)]
    calls: bool,
}

#[derive(Debug, Args)]
struct ReceiveArgs {
    /// Append received messages to this JSON Lines file; defaults to $JSONL_PATH
    #[arg(long = "json-out")]
    json_out: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct SendArgs {
    /// Destination number, digits with optional leading +
    recipient: String,
    message: String,

    /// auto, native (gsm) or unicode (ucs2)
    #[arg(long, default_value = "auto")]
    encoding: EncodingMode,

    /// Append the sent message to this JSON Lines file; defaults to $JSONL_PATH
    #[arg(long = "json-out")]
    json_out: Option<PathBuf>,
}

impl ModemArgs {
    fn config(&self) -> SmsResult<ModemConfig> {
        let mut config = ModemConfig::from_env()?;
        if let Some(port) = &self.port {
            config.port = port.clone();
        }
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
        if let Some(ms) = self.read_timeout_ms {
            config.read_timeout = Duration::from_millis(ms);
            config.timings.line_timeout = config.read_timeout;
        }
        config.line_logging = self.echo;
        config.validate()?;
        Ok(config)
    }
}

fn json_out_path(flag: &Option<PathBuf>) -> Option<PathBuf> {
    flag.clone().or_else(|| {
        std::env::var("JSONL_PATH")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from)
    })
}

async fn open_session(args: &ModemArgs) -> SmsResult<ModemSession<SerialTransport>> {
    let config = args.config()?;
    let session = ModemSession::open(&config).await?;
    if args.interpret {
        return Ok(session.with_logger(CallbackLogger::console()));
    }
    Ok(session)
}

/// Cancel `token` on Ctrl+C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Stopped by user (Ctrl+C)");
            token.cancel();
        }
    });
}

fn run_ports() -> SmsResult<()> {
    let ports = list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }

    let selected = select_port(&ports).map(|port| port.device.clone());
    for port in &ports {
        let marker = if Some(&port.device) == selected.as_ref() { "*" } else { " " };
        println!(
            "{} {:<16} {:<40} {}",
            marker,
            port.device,
            port.description.as_deref().unwrap_or("-"),
            port.manufacturer.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn run_init(modem: &ModemArgs, args: &InitArgs) -> SmsResult<()> {
    let session = open_session(modem).await?;
    session.initialize_sms_push().await?;
    if args.calls {
        session.initialize_call_reporting().await?;
    }
    session.close().await
}

async fn run_receive(modem: &ModemArgs, args: &ReceiveArgs) -> SmsResult<()> {
    let mut writer = match json_out_path(&args.json_out) {
        Some(path) => Some(JsonlWriter::open(path).await?),
        None => None,
    };

    let session = open_session(modem).await?;
    session.initialize_sms_push().await?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let (tx, mut rx) = mpsc::channel(32);
    let receiver = {
        let session = session.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { session.receive(&cancel, tx).await })
    };

    while let Some(message) = rx.recv().await {
        println!("{} @ {}: {}", message.sender, message.timestamp, message.text);
        if let Some(writer) = writer.as_mut() {
            if let Err(e) = writer.append(&MessageRecord::from(message)).await {
                error!("Failed to write {}: {}", writer.path().display(), e);
            }
        }
    }

    let result = receiver
        .await
        .map_err(|e| voltage_sms::SmsError::io(format!("Receive task failed: {}", e)))?;
    session.close().await?;
    result.map(|_| ())
}

async fn run_calls(modem: &ModemArgs) -> SmsResult<()> {
    let session = open_session(modem).await?;
    session.initialize_call_reporting().await?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let (tx, mut rx) = mpsc::channel(8);
    let listener = {
        let session = session.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { session.listen_calls(&cancel, tx).await })
    };

    while let Some(event) = rx.recv().await {
        match event {
            CallEvent::Ring => println!("RING"),
            CallEvent::CallerId(caller) if caller.number.is_empty() => println!("Caller: withheld"),
            CallEvent::CallerId(caller) => println!("Caller: {}", caller.number),
        }
    }

    let result = listener
        .await
        .map_err(|e| voltage_sms::SmsError::io(format!("Call listener failed: {}", e)))?;
    session.close().await?;
    result.map(|_| ())
}

async fn run_send(modem: &ModemArgs, args: &SendArgs) -> SmsResult<()> {
    let (rendered, lossy) = preview(&args.message);
    if lossy {
        warn!("Message contains characters outside the GSM character set");
        println!("Will be sent as: {}", rendered);
    }
    if args.encoding == EncodingMode::Unicode {
        warn!("Unicode transmission is not supported; sending GSM text with substitutions");
    }

    let session = open_session(modem).await?;
    let outcome = session.send_sms(&args.recipient, &args.message, args.encoding).await;
    session.close().await?;

    let outcome = outcome?;
    println!("{}: {}", args.recipient, outcome);
    outcome.into_result()?;

    if let Some(path) = json_out_path(&args.json_out) {
        let mut writer = JsonlWriter::open(path).await?;
        writer.append(&MessageRecord::sent(&args.recipient, &args.message)).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match &cli.command {
        Commands::Ports => run_ports(),
        Commands::Init(args) => run_init(&cli.modem, args).await,
        Commands::Receive(args) => run_receive(&cli.modem, args).await,
        Commands::Calls => run_calls(&cli.modem).await,
        Commands::Send(args) => run_send(&cli.modem, args).await,
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_OK as u8),
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
