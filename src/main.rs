use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{LevelFilter, info};
use simplelog::{Config, SimpleLogger, WriteLogger};

use folio::document::{DocumentHandle, MupdfDocument};
use folio::geometry::Rotation;
use folio::panic_handler;
use folio::settings::{self, Settings};
use folio::{HeadlessHost, Viewer};

#[derive(Parser)]
#[command(name = "folio", about = "Viewport-driven PDF page renderer and search tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Settings file (defaults to <config dir>/folio/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output file path (enables file logging when specified)
    #[arg(long, global = true)]
    log: Option<PathBuf>,

    /// Level for the log file
    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,
}

#[derive(Subcommand)]
enum Command {
    /// Print page count and page sizes
    Info {
        file: PathBuf,
    },

    /// Render the pages visible in a viewport to PNG files
    Render {
        file: PathBuf,

        /// Viewport width in pixels
        #[arg(long, default_value_t = 1200)]
        width: i32,

        /// Viewport height in pixels
        #[arg(long, default_value_t = 900)]
        height: i32,

        /// Zoom factor (1.0 = 100%)
        #[arg(long, default_value_t = 1.0)]
        zoom: f32,

        /// Clockwise rotation in degrees, a multiple of 90
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        rotate: i32,

        /// Page to scroll to (1-based)
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Use the zoom factor as-is instead of fitting pages to the width
        #[arg(long)]
        no_fit: bool,

        /// Directory for the PNG files
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,

        /// How long to wait for rendering to finish
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,
    },

    /// Print every occurrence of a term with its canvas rectangle
    Search {
        file: PathBuf,

        term: String,

        /// Viewport width in pixels
        #[arg(long, default_value_t = 1200)]
        width: i32,
    },
}

fn init_logging(cli: &Cli) -> Result<()> {
    if let Some(path) = &cli.log {
        let file = File::create(path)
            .with_context(|| format!("failed to create log file {}", path.display()))?;
        WriteLogger::init(cli.log_level, Config::default(), file)?;
    } else {
        SimpleLogger::init(LevelFilter::Warn, Config::default())?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;
    panic_handler::initialize_panic_handler();

    let settings = settings::load_settings(cli.config.as_deref());

    match cli.command {
        Command::Info { file } => cmd_info(&file),
        Command::Render {
            file,
            width,
            height,
            zoom,
            rotate,
            page,
            no_fit,
            out_dir,
            timeout_ms,
        } => {
            let Some(rotation) = Rotation::from_degrees(rotate) else {
                bail!("rotation must be a multiple of 90 degrees, got {rotate}");
            };
            let options = RenderOptions {
                width,
                height,
                zoom,
                rotation,
                page,
                fit_to_width: !no_fit,
                out_dir,
                timeout: Duration::from_millis(timeout_ms),
            };
            cmd_render(&file, settings, &options)
        }
        Command::Search { file, term, width } => cmd_search(&file, &term, width, settings),
    }
}

fn cmd_info(file: &Path) -> Result<()> {
    let doc = MupdfDocument::open(file)?;
    let count = doc.page_count()?;
    println!("{}: {count} pages", file.display());
    for page in 0..count {
        let size = doc.page_size(page)?;
        println!("  page {:>4}: {:.1} x {:.1}", page + 1, size.width, size.height);
    }
    doc.close();
    Ok(())
}

struct RenderOptions {
    width: i32,
    height: i32,
    zoom: f32,
    rotation: Rotation,
    page: usize,
    fit_to_width: bool,
    out_dir: PathBuf,
    timeout: Duration,
}

fn open_viewer(
    file: &Path,
    settings: Settings,
    width: i32,
    height: i32,
) -> Result<Viewer<HeadlessHost>> {
    let mut viewer = Viewer::new(HeadlessHost::new(), settings);
    viewer.resize(width, height);
    viewer
        .load_path(file)
        .with_context(|| format!("cannot view {}", file.display()))?;
    Ok(viewer)
}

fn cmd_render(file: &Path, settings: Settings, options: &RenderOptions) -> Result<()> {
    let settings = Settings {
        fit_to_width: options.fit_to_width,
        ..settings
    };
    let mut viewer = open_viewer(file, settings, options.width, options.height)?;

    viewer.set_zoom(options.zoom)?;
    for _ in 0..options.rotation.degrees() / 90 {
        viewer.rotate();
    }
    viewer.goto_page_entry(&options.page.to_string())?;

    if !viewer.wait_until_idle(options.timeout) {
        bail!(
            "rendering did not finish within {:?} ({} job(s) pending)",
            options.timeout,
            viewer.pending_jobs()
        );
    }

    let written = viewer
        .host()
        .save_rasters(&options.out_dir, viewer.visible_pages())
        .with_context(|| format!("failed to write PNG files to {}", options.out_dir.display()))?;
    for path in &written {
        println!("{}", path.display());
    }

    let stats = viewer.stats();
    info!(
        "Rendered {} page(s): {} job(s), {} stale, {} failed",
        written.len(),
        stats.jobs_submitted,
        stats.stale_discarded,
        stats.render_failures
    );
    println!("{}", viewer.status());
    Ok(())
}

fn cmd_search(file: &Path, term: &str, width: i32, settings: Settings) -> Result<()> {
    let mut viewer = open_viewer(file, settings, width, 0)?;

    viewer.search(term);
    let hits = viewer.search_state().hits().to_vec();

    if hits.is_empty() {
        println!("no hits for {term:?}");
        return Ok(());
    }
    for (index, hit) in hits.iter().enumerate() {
        match viewer.hit_rect(hit) {
            Some(rect) => println!(
                "{:>4}: page {:>4}  x={:.1} y={:.1} w={:.1} h={:.1}",
                index + 1,
                hit.page + 1,
                rect.x,
                rect.y,
                rect.width,
                rect.height
            ),
            None => println!("{:>4}: page {:>4}", index + 1, hit.page + 1),
        }
    }
    Ok(())
}
