#![warn(unused_extern_crates)]
use anyhow::Result;
use clap::Parser;
use fitbooth::booth::Booth;
use fitbooth::config::Layout;
use fitbooth::error::BoothError;
use fitbooth::export::{SystemPrinter, save_download};
use fitbooth::face::OnnxFaceEngine;
use fitbooth::kiosk::{Kiosk, PhotoSource};
use fitbooth::session::Session;
use num_cpus::get as get_cpu_count;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct CmdArgs {
    /// Storage root holding refs/, uploads/, outputs/ and models/
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    root: PathBuf,

    /// Camera index to capture from. Uses the last camera found if unset
    #[arg(short, long)]
    camera: Option<u32>,

    /// Use this image as the user photo instead of the camera
    #[arg(short, long, value_name = "FILE")]
    photo: Option<PathBuf>,

    /// Swap the photo onto this outfit and exit without starting the kiosk
    #[arg(short, long, requires = "photo")]
    outfit: Option<String>,

    /// Where downloads are written. Defaults to the outputs directory in kiosk mode
    #[arg(short, long, value_name = "DIR")]
    download_dir: Option<PathBuf>,

    /// Max threads used by each face model
    #[arg(short = 't', long = "threads")]
    max_threads: Option<usize>,

    /// Print the outfit catalog and exit
    #[arg(short, long)]
    list: bool,
}

fn main() -> Result<()> {
    let args = CmdArgs::parse();
    let layout = Layout::new(&args.root);
    layout.ensure_dirs()?;

    let kiosk_mode = !args.list && args.outfit.is_none();
    init_logging(&layout, kiosk_mode)?;

    if args.list {
        return list_catalog(&layout);
    }

    let total_threads = get_cpu_count();
    let threads = args
        .max_threads
        .unwrap_or(total_threads / 2)
        .min(total_threads)
        .max(1);

    let engine = match OnnxFaceEngine::load(&layout, threads) {
        Ok(engine) => engine,
        Err(e) => {
            error!("{e}");
            return Err(e.into());
        }
    };

    let outputs = layout.outputs.clone();
    let booth = Booth::new(layout, &engine, SystemPrinter);

    match (args.outfit, args.photo) {
        (Some(outfit), Some(photo)) => {
            one_shot(&booth, &outfit, &photo, args.download_dir.as_deref())
        }
        (_, photo) => {
            let download_dir = args.download_dir.unwrap_or(outputs);
            let source = match photo {
                Some(path) => PhotoSource::File(path),
                None => PhotoSource::Camera(args.camera),
            };
            Kiosk::new(booth, source, download_dir, StdRng::from_entropy()).run()
        }
    }
}

/// In kiosk mode the terminal belongs to the UI, so logs go to a file.
fn init_logging(layout: &Layout, to_file: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env();
    let builder = tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_env_filter(filter);

    if to_file {
        let log = File::create(layout.outputs.join("booth.log"))?;
        builder.with_ansi(false).with_writer(Mutex::new(log)).init();
    } else {
        builder.init();
    }
    Ok(())
}

fn list_catalog(layout: &Layout) -> Result<()> {
    let catalog = fitbooth::catalog::Catalog::new(layout.refs.clone());
    let entries = catalog.scan()?;
    if entries.is_empty() {
        return Err(BoothError::CatalogEmpty(layout.refs.clone()).into());
    }

    for entry in entries {
        println!(
            "{:<12} {:<12} {:>3} images  {}",
            entry.id,
            entry.display_name(),
            entry.candidate_images.len(),
            entry
                .representative
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| String::from("-")),
        );
    }
    Ok(())
}

fn one_shot(
    booth: &Booth<OnnxFaceEngine, SystemPrinter>,
    outfit: &str,
    photo: &Path,
    download_dir: Option<&Path>,
) -> Result<()> {
    let mut session = Session::new();
    let mut rng = StdRng::from_entropy();

    booth.select(&mut session, outfit);
    booth.capture_file(&mut session, photo)?;
    let view = booth.render(&mut session, &mut rng)?;
    for warning in &view.warnings {
        warn!("{warning}");
    }

    let result = booth.swap(&mut session)?;
    if let Some(dir) = download_dir {
        save_download(&booth.download(&session)?, dir)?;
    }
    info!("Result at {:?}", result.saved_path);
    println!("{}", result.saved_path.display());
    Ok(())
}
