use std::sync::Arc;

use capture::screen::ScreenCamera;
use capture::ImageSource;
use color_eyre::Result;
use permission::{PermissionGate, ScreenCapturePermission};
use presenter::Presenter;
use queue::{PipelineHandle, WorkQueue};
use recognition::ocr::OcrsRecognizer;
use recognition::Recognizer;
use terminal::{Console, TerminalPicker};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod capture;
mod configuration;
mod error;
mod format;
mod permission;
mod presenter;
mod queue;
mod recognition;
mod terminal;
#[cfg(test)]
mod testing;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    info!("starting up");

    let configuration = configuration::load()?;
    debug!("{configuration:?}");

    let (presenter, presenter_handle, view) =
        Presenter::new(configuration.placeholder_text.clone());
    tokio::spawn(presenter.run());
    tokio::spawn(terminal::render_loop(view));

    let console = Arc::new(Console::stdin());
    let gate = PermissionGate::new(Arc::new(ScreenCapturePermission));
    let image_source = Arc::new(ImageSource::new(
        Arc::new(ScreenCamera::new(configuration.display_index)),
        Arc::new(TerminalPicker::new(Arc::clone(&console))),
        gate.subscribe(),
        configuration.capture_directory.clone(),
    ));

    let engine = Arc::new(OcrsRecognizer::new(
        configuration.detection_model.clone(),
        configuration.recognition_model.clone(),
        configuration.block_gap_ratio,
    ));
    let recognizer = Arc::new(Recognizer::new(engine, configuration.format.clone()));
    let work_queue = WorkQueue::new(
        recognizer,
        presenter_handle.clone(),
        configuration.supersede,
        configuration.discard_captures,
    );
    let pipeline = PipelineHandle::new(image_source, work_queue.sender(), presenter_handle);
    tokio::spawn(work_queue.start());

    // Held for the whole session; dropping it releases the camera.
    let preview = pipeline.start_camera(&gate).await;
    terminal::run(console, pipeline).await?;
    drop(preview);

    info!("shutting down");
    Ok(())
}
