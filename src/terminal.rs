//! Line-based front-end: renders the view to stdout and reads commands from stdin.

use std::sync::Arc;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use color_eyre::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::{watch, Mutex};
use tracing::debug;

use crate::capture::{ImageOrigin, ImagePicker, MimeFilter};
use crate::presenter::ViewState;
use crate::queue::PipelineHandle;

const HELP: &str = "commands: capture (c), gallery (g), help (h), quit (q)";

/// Shared stdin so the command loop and the picker never race for input.
pub struct Console {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl Console {
    pub fn stdin() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    /// `None` once stdin is closed.
    pub async fn read_line(&self, prompt: &str) -> Result<Option<String>> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(prompt.as_bytes()).await?;
        stdout.flush().await?;

        let mut lines = self.lines.lock().await;
        Ok(lines.next_line().await?.map(|line| line.trim().to_string()))
    }
}

/// Gallery stand-in: asks for a path on the console.
pub struct TerminalPicker {
    console: Arc<Console>,
}

impl TerminalPicker {
    pub fn new(console: Arc<Console>) -> Self {
        Self { console }
    }
}

#[async_trait]
impl ImagePicker for TerminalPicker {
    async fn pick_image(&self, filter: &MimeFilter) -> Result<Option<Utf8PathBuf>> {
        let prompt = format!("{filter} file (blank to cancel): ");
        let answer = self.console.read_line(&prompt).await?;
        Ok(answer.filter(|path| !path.is_empty()).map(Into::into))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Capture,
    Gallery,
    Help,
    Quit,
    Unknown(String),
}

fn parse_command(input: &str) -> Option<Command> {
    let command = match input.trim().to_lowercase().as_str() {
        "" => return None,
        "c" | "capture" => Command::Capture,
        "g" | "gallery" => Command::Gallery,
        "h" | "help" | "?" => Command::Help,
        "q" | "quit" | "exit" => Command::Quit,
        _ => Command::Unknown(input.trim().to_string()),
    };
    Some(command)
}

fn render(view: &ViewState) -> String {
    let camera = match &view.camera_notice {
        _ if view.camera_enabled() => "Camera ready.",
        Some(notice) => notice.as_str(),
        None => "Waiting for camera permission...",
    };
    let selected = view
        .selected_image
        .as_ref()
        .map(|image| {
            let origin = match image.origin() {
                ImageOrigin::Camera => "camera",
                ImageOrigin::Gallery => "gallery",
            };
            format!("\nImage ({origin}): {image}")
        })
        .unwrap_or_default();

    format!("\n[{camera}]{selected}\n{}\n", view.display_text)
}

/// Prints the view every time it changes, until the presenter stops.
pub async fn render_loop(mut view: watch::Receiver<ViewState>) {
    loop {
        let rendered = render(&view.borrow_and_update());
        println!("{rendered}");
        if view.changed().await.is_err() {
            break;
        }
    }
}

pub async fn run(console: Arc<Console>, pipeline: PipelineHandle) -> Result<()> {
    println!("{HELP}");
    while let Some(line) = console.read_line("> ").await? {
        match parse_command(&line) {
            None => continue,
            Some(Command::Capture) => {
                let pipeline = pipeline.clone();
                tokio::spawn(async move { pipeline.capture().await });
            }
            Some(Command::Gallery) => pipeline.pick().await,
            Some(Command::Help) => println!("{HELP}"),
            Some(Command::Quit) => break,
            Some(Command::Unknown(other)) => println!("unknown command {other:?}\n{HELP}"),
        }
    }
    debug!("input closed");
    Ok(())
}
