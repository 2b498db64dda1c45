mod fs_store;
mod settings;
mod svg_export;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use regionmark_core::EngineConfig;
use regionmark_geometry::Size;
use regionmark_session::{
    CanvasFeedback, Command, DocumentLifecycle, InputEvent, Notice, SaveFeedback, Session,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use fs_store::FsBackend;

/// Freehand region annotation over large raster images
#[derive(Parser, Debug)]
#[command(name = "regionmark")]
#[command(version, about, long_about = None)]
struct Args {
    /// Directory holding images/ and annotations/
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Engine config file (JSON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List the image catalog
    List,
    /// Print the layers and shapes annotated on an image
    Show {
        image_id: String,
    },
    /// Feed recorded input events through the canvas for one image and save
    Replay {
        /// Catalog index of the image to annotate
        index: usize,
        /// JSON array of input events, positions in view space
        events: PathBuf,
        /// Container width in view pixels
        #[arg(long, default_value_t = 1280.0)]
        width: f64,
        /// Container height in view pixels
        #[arg(long, default_value_t = 800.0)]
        height: f64,
    },
    /// Render an image's annotations as an SVG overlay
    ExportSvg {
        image_id: String,
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = settings::load_config(args.config.as_deref())?;
    let data_dir = args.data_dir.clone().unwrap_or_else(settings::default_data_dir);
    let backend = Arc::new(FsBackend::new(data_dir));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(async move {
        match args.command {
            Cmd::List => list(backend, config).await,
            Cmd::Show { image_id } => show(backend, config, &image_id).await,
            Cmd::Replay {
                index,
                events,
                width,
                height,
            } => replay(backend, config, index, &events, Size::new(width, height)).await,
            Cmd::ExportSvg { image_id, out } => export(backend, config, &image_id, &out).await,
        }
    })
}

async fn catalog(backend: Arc<FsBackend>, config: EngineConfig) -> Result<DocumentLifecycle<FsBackend>> {
    let mut lifecycle = DocumentLifecycle::new(backend, config);
    lifecycle.refresh_catalog().await?;
    Ok(lifecycle)
}

async fn list(backend: Arc<FsBackend>, config: EngineConfig) -> Result<()> {
    let lifecycle = catalog(backend, config).await?;
    for (index, info) in lifecycle.catalog().iter().enumerate() {
        println!("{index:>4}  {:<24} {:>6}x{:<6} {}", info.id, info.width, info.height, info.name);
    }
    Ok(())
}

async fn show(backend: Arc<FsBackend>, config: EngineConfig, image_id: &str) -> Result<()> {
    let mut lifecycle = catalog(backend, config).await?;
    let outcome = lifecycle.open_id(image_id).await?;
    let doc = lifecycle.store().document();
    println!("{} ({}x{}) {:?}", doc.image_id, doc.image_size.w, doc.image_size.h, outcome);
    if let Some(annotator) = doc.meta.annotator_name() {
        println!("  annotated by {annotator}");
    }
    for layer in doc.layers.iter().rev() {
        let flags = match (layer.visible, layer.locked) {
            (true, false) => "",
            (true, true) => " [locked]",
            (false, false) => " [hidden]",
            (false, true) => " [hidden, locked]",
        };
        println!("  {} (z={}){}", layer.name, layer.z, flags);
        for shape in &layer.shapes {
            println!(
                "    {} {:>3} pts  area {:.4}  {}  {}",
                shape.id,
                shape.points.len(),
                shape.area(),
                shape.color,
                shape.label.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}

async fn replay(
    backend: Arc<FsBackend>,
    config: EngineConfig,
    index: usize,
    events_path: &Path,
    container: Size,
) -> Result<()> {
    let content = std::fs::read_to_string(events_path)
        .with_context(|| format!("Failed to read from {:?}", events_path))?;
    let events: Vec<InputEvent> =
        serde_json::from_str(&content).with_context(|| format!("Malformed events file {:?}", events_path))?;

    let mut lifecycle = catalog(backend, config).await?;
    lifecycle.open_index(index).await?;
    let session = Session::new(lifecycle, container);

    let (commands, rx) = mpsc::channel(events.len() + 2);
    let (tx, mut notices) = mpsc::unbounded_channel();
    for event in events {
        commands.send(Command::Input(event)).await?;
    }
    commands.send(Command::Save).await?;
    commands.send(Command::Shutdown).await?;

    let session = session.run(rx, tx).await;

    let mut failed = false;
    while let Ok(notice) = notices.try_recv() {
        match notice {
            Notice::Canvas(CanvasFeedback::Committed { layer_id, shape_id }) => {
                println!("committed {shape_id} to layer {layer_id}");
            }
            Notice::Canvas(CanvasFeedback::Rejected(reason)) => println!("rejected: {reason}"),
            Notice::Canvas(CanvasFeedback::Selected(hit)) => match hit {
                Some((layer, shape)) => println!("selected {shape} in layer {layer}"),
                None => println!("selection cleared"),
            },
            Notice::Canvas(CanvasFeedback::Refused(e)) | Notice::Refused(e) => println!("refused: {e}"),
            Notice::Save(SaveFeedback::Saved { image_id }) => println!("saved {image_id}"),
            Notice::Save(SaveFeedback::Failed { image_id, message }) => {
                eprintln!("save of {image_id} failed: {message}");
                failed = true;
            }
            Notice::Opened { image_id, outcome } => println!("opened {image_id} ({outcome:?})"),
            Notice::Error(message) => eprintln!("error: {message}"),
        }
    }

    let doc = session.store().document();
    println!("{}: {} shapes in {} layers", doc.image_id, doc.shape_count(), doc.layers.len());
    if failed {
        bail!("annotations for {} were not saved", doc.image_id);
    }
    Ok(())
}

async fn export(backend: Arc<FsBackend>, config: EngineConfig, image_id: &str, out: &Path) -> Result<()> {
    let mut lifecycle = catalog(backend, config).await?;
    lifecycle.open_id(image_id).await?;
    svg_export::save_svg(lifecycle.store().document(), out)?;
    tracing::info!(image = image_id, path = %out.display(), "svg exported");
    Ok(())
}
