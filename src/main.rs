use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tagchat::chat::{FeedKind, Message, Session};
use tagchat::config::{Backend, Config};
use tagchat::util::{fit_to_width, strip_control_chars};
use tagchat::video;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Columns reserved for the author name in each printed line.
const AUTHOR_WIDTH: usize = 16;

/// Get the config file path (~/.config/tagchat/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("tagchat")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(
    name = "tagchat",
    about = "Live chat from a wykop.pl tag stream, with stream URL resolution"
)]
struct Args {
    /// Tag stream URL, e.g. https://wykop.pl/tag/mecz/wszystkie
    #[arg(long, value_name = "URL")]
    chat: Option<String>,

    /// Video page URL to resolve into a playable stream URL
    #[arg(long, value_name = "URL")]
    video: Option<String>,

    /// Config file (default: ~/.config/tagchat/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Chat backend: api or scrape
    #[arg(long)]
    backend: Option<Backend>,

    /// Feed kind used when the URL names none: best or all
    #[arg(long)]
    kind: Option<FeedKind>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the chat transcript
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.chat.is_none() && args.video.is_none() {
        anyhow::bail!("Nothing to do: pass --chat and/or --video");
    }

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    if let Some(backend) = args.backend {
        config.chat.backend = backend;
    }
    if let Some(kind) = args.kind {
        config.chat.kinds.default_kind = Some(kind);
    }

    let client = reqwest::Client::builder()
        .user_agent(concat!("tagchat/", env!("CARGO_PKG_VERSION")))
        .pool_max_idle_per_host(2)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .context("Failed to build HTTP client")?;

    if let Some(page) = &args.video {
        let stream = video::resolve(&client, page, &config.video)
            .await
            .with_context(|| format!("Failed to resolve video stream for {page}"))?;
        println!("{stream}");
    }

    let Some(chat_url) = &args.chat else {
        return Ok(());
    };

    let session = Session::start(chat_url, &config.chat, client)
        .await
        .with_context(|| format!("Failed to start chat for {chat_url}"))?;
    eprintln!(
        "Watching #{} ({}) via {}",
        session.target().tag,
        session.target().kind,
        session.backend()
    );

    run_chat(session).await
}

/// Prints messages until the session ends or a signal arrives.
async fn run_chat(mut session: Session) -> Result<()> {
    let mut degraded = session.degraded();
    let mut watching_degraded = true;

    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate())?;
    #[cfg(unix)]
    let mut sigint = signal(SignalKind::interrupt())?;

    let stdout = std::io::stdout();

    loop {
        #[cfg(unix)]
        let sigterm_fut = sigterm.recv();
        #[cfg(not(unix))]
        let sigterm_fut = std::future::pending::<Option<()>>();

        #[cfg(unix)]
        let sigint_fut = sigint.recv();
        #[cfg(not(unix))]
        let sigint_fut = std::future::pending::<Option<()>>();

        tokio::select! {
            biased;

            _ = sigterm_fut => {
                tracing::info!("Received SIGTERM, shutting down");
                break;
            }

            _ = sigint_fut => {
                tracing::info!("Received SIGINT, shutting down");
                break;
            }

            changed = degraded.changed(), if watching_degraded => {
                match changed {
                    Ok(()) => {
                        if *degraded.borrow_and_update() {
                            eprintln!("Chat source unavailable, still trying...");
                        } else {
                            eprintln!("Chat source reachable again");
                        }
                    }
                    Err(_) => watching_degraded = false,
                }
            }

            next = session.next() => {
                match next {
                    Some(message) => {
                        let mut out = stdout.lock();
                        writeln!(out, "{}", render_line(&message))?;
                        out.flush()?;
                    }
                    None => break,
                }
            }
        }
    }

    session.cancel().await.context("Chat session ended")?;
    Ok(())
}

/// Formats one message as `author: text [image-url]`.
fn render_line(message: &Message) -> String {
    let author = fit_to_width(&strip_control_chars(&message.author), AUTHOR_WIDTH);
    let mut line = format!("{author}:");
    if let Some(text) = &message.text {
        line.push(' ');
        line.push_str(&strip_control_chars(text));
    }
    if let Some(image) = &message.image_url {
        line.push_str(" [");
        line.push_str(&strip_control_chars(image));
        line.push(']');
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(author: &str, text: Option<&str>, image: Option<&str>) -> Message {
        Message {
            id: "1".into(),
            timestamp: None,
            author: author.into(),
            text: text.map(String::from),
            image_url: image.map(String::from),
        }
    }

    #[test]
    fn test_render_text_only() {
        let line = render_line(&message("kibic", Some("gol!"), None));
        assert_eq!(line, format!("{:<16}: gol!", "kibic"));
    }

    #[test]
    fn test_render_image_only() {
        let line = render_line(&message("kibic", None, Some("https://img.example.com/a.jpg")));
        assert!(line.ends_with(": [https://img.example.com/a.jpg]"));
    }

    #[test]
    fn test_render_strips_escape_sequences() {
        let line = render_line(&message("evil\x1b[31m", Some("a\x1b[2Jb"), None));
        assert!(!line.contains('\x1b'));
    }

    #[test]
    fn test_render_truncates_long_author() {
        let line = render_line(&message("a_very_long_username_indeed", Some("x"), None));
        assert!(line.starts_with("a_very_long_use…:"));
    }
}
