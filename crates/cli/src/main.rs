use clap::{Parser, Subcommand};
use livechat::connector::{BotReply, Connector};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

const REPLY_BUFFER: usize = 64;

#[derive(Parser)]
#[command(name = "livechat")]
#[command(about = "Live-chat bridge CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Check the capabilities file (required keys, chat user signing secret, JSON contexts). No network calls.
    Validate {
        /// Capabilities file path (default: LIVECHAT_CAPS_PATH or ~/.livechat/caps.json)
        #[arg(long, short, value_name = "PATH")]
        caps: Option<std::path::PathBuf>,
    },

    /// Open a live-chat session and chat interactively. Each input line is sent as a user message; bot replies are printed as they arrive.
    Chat {
        /// Capabilities file path (default: LIVECHAT_CAPS_PATH or ~/.livechat/caps.json)
        #[arg(long, short, value_name = "PATH")]
        caps: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("livechat {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Validate { caps }) => {
            if let Err(e) = run_validate(caps) {
                log::error!("validate failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat { caps }) => {
            if let Err(e) = run_chat(caps).await {
                log::error!("chat failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_validate(caps_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let (caps, path) = livechat::config::load_capabilities(caps_path)?;
    caps.validate()?;
    println!(
        "capabilities at {} are valid (api: {})",
        path.display(),
        caps.base_url()?
    );
    Ok(())
}

async fn run_chat(caps_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let (caps, path) = livechat::config::load_capabilities(caps_path)?;
    log::info!("loaded capabilities from {}", path.display());

    let (tx, rx) = mpsc::channel(REPLY_BUFFER);
    let mut connector = Connector::new(caps, tx);
    let session = connector.start().await?;
    println!(
        "connected: conversation {} (type /quit to exit)",
        session.conversation_id
    );

    let printer = tokio::spawn(print_replies(rx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }
        if let Err(e) = connector.send_user_utterance(input).await {
            eprintln!("send error: {}", e);
        }
    }

    connector.stop();
    printer.abort();
    Ok(())
}

async fn print_replies(mut rx: mpsc::Receiver<BotReply>) {
    while let Some(reply) = rx.recv().await {
        match reply {
            BotReply::Message(m) => {
                println!("< {}", m.message_text.trim());
                for b in &m.buttons {
                    println!("  [{}] {}", b.text, b.payload);
                }
            }
            BotReply::Text(t) => eprintln!("! {}", t),
        }
    }
}
