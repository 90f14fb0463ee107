use anyhow::{anyhow, Context, Result};
use asciivid::{
    write_details, CancelToken, ConversionConfig, ConversionOptions, ConversionPipeline,
    ConversionResult, JobState, RunId, RunOutcome, RunRegistry, RunScheduler, SchedulerError,
    Settings,
};
use clap::Parser;
use dialoguer::Confirm;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::cell::OnceCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Convert videos into ASCII-art text frames, rendered images and MP4."
)]
struct Args {
    /// Input video files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory. With several inputs each run gets a subdirectory
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Characters per row (10-240)
    #[arg(long)]
    width: Option<u32>,

    /// normal, inverted, dots, gradient, blocks, thick or thin
    #[arg(long)]
    style: Option<String>,

    #[arg(long)]
    brightness: Option<f32>,

    #[arg(long)]
    contrast: Option<f32>,

    #[arg(long)]
    gamma: Option<f32>,

    /// Background colour as #RRGGBB
    #[arg(long)]
    bg: Option<String>,

    /// Text colour as #RRGGBB
    #[arg(long)]
    fg: Option<String>,

    /// green, amber, blue, purple, white or monochrome; overrides --bg/--fg
    #[arg(long)]
    palette: Option<String>,

    /// Frame rate of the assembled video (1-60)
    #[arg(long)]
    fps: Option<u32>,

    /// H.264 quality, 0 (lossless) to 51
    #[arg(long)]
    crf: Option<u8>,

    /// low, medium, high or 4k
    #[arg(long)]
    resolution: Option<String>,

    /// Also write frame_NNNNNN.txt files
    #[arg(long, default_value_t = false)]
    txt: bool,

    /// Skip rendering PNG frames (implies no video)
    #[arg(long, default_value_t = false)]
    no_png: bool,

    /// Skip video assembly
    #[arg(long, default_value_t = false)]
    no_mp4: bool,

    /// Base name of the assembled video
    #[arg(long)]
    name: Option<String>,

    /// Maximum number of conversions running at once
    #[arg(long)]
    jobs: Option<usize>,

    /// Settings file (.toml or .json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// error, warn, info, debug or trace
    #[arg(long)]
    log_level: Option<String>,

    /// Keep file paths out of error messages
    #[arg(long, default_value_t = false)]
    quiet: bool,

    /// Overwrite existing frames without asking
    #[arg(long, short, default_value_t = false)]
    yes: bool,
}

fn conversion_options(defaults: ConversionOptions, args: &Args) -> ConversionOptions {
    let mut opts = defaults;
    if let Some(width) = args.width {
        opts = opts.with_width(width);
    }
    if let Some(style) = &args.style {
        opts = opts.with_style(style);
    }
    let brightness = args.brightness.unwrap_or(opts.brightness);
    let contrast = args.contrast.unwrap_or(opts.contrast);
    let gamma = args.gamma.unwrap_or(opts.gamma);
    opts = opts.with_corrections(brightness, contrast, gamma);
    if let Some(bg) = &args.bg {
        opts.bg_color = bg.clone();
    }
    if let Some(fg) = &args.fg {
        opts.text_color = fg.clone();
    }
    if let Some(palette) = &args.palette {
        opts = opts.with_palette(palette);
    }
    if let Some(resolution) = &args.resolution {
        opts = opts.with_resolution(resolution);
    }
    let (fps, crf) = (args.fps.unwrap_or(opts.fps), args.crf.unwrap_or(opts.crf));
    opts = opts.with_encoding(fps, crf);
    let txt = opts.save_txt || args.txt;
    let png = opts.save_png && !args.no_png;
    let mp4 = opts.save_mp4 && !args.no_mp4;
    opts = opts.with_outputs(txt, png, mp4);
    if let Some(name) = &args.name {
        opts = opts.with_video_name(name);
    }
    opts
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(level) = &args.log_level {
        settings.log_level = level.clone();
    }
    if args.quiet {
        settings.quiet_errors = true;
    }
    if let Some(jobs) = args.jobs {
        settings.max_concurrent_jobs = jobs;
    }

    env_logger::Builder::new()
        .filter_level(settings.log_filter())
        .init();

    let options = conversion_options(settings.defaults.clone(), &args);
    let config = options.build().context("invalid conversion options")?;

    let interrupted = CancelToken::new();
    {
        let interrupted = interrupted.clone();
        if let Err(e) = ctrlc::set_handler(move || interrupted.cancel()) {
            log::warn!("Cannot install Ctrl-C handler: {}", e);
        }
    }

    if args.inputs.len() == 1 {
        run_single(&args.inputs[0], args.out.as_deref(), config, &settings, args.yes, &interrupted)
    } else {
        run_many(&args.inputs, args.out.as_deref(), config, &settings, &interrupted)
    }
}

fn run_single(
    input: &Path,
    out: Option<&Path>,
    config: ConversionConfig,
    settings: &Settings,
    assume_yes: bool,
    interrupted: &CancelToken,
) -> Result<()> {
    let output_dir = match out {
        Some(dir) => dir.to_path_buf(),
        None => {
            let stem = input
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("video");
            settings.results_dir.join(stem)
        }
    };
    if !prepare_output_dir(&output_dir, assume_yes)? {
        println!("Operation cancelled.");
        return Ok(());
    }

    let mut pipeline = ConversionPipeline::new(&output_dir, config, settings.pipeline())
        .map_err(|e| anyhow!(e.user_message(settings.quiet_errors)))?;

    let bar: OnceCell<ProgressBar> = OnceCell::new();
    let sink = |_progress: f32, done: u64, total: u64| {
        let pb = bar.get_or_init(|| {
            let pb = ProgressBar::new(total);
            pb.set_style(bar_style());
            pb.set_message("Converting frames");
            pb
        });
        pb.set_length(total.max(done));
        pb.set_position(done);
    };

    println!("Converting {}...", input.display());
    let outcome = pipeline.run_path(input, &sink, interrupted);
    if let Some(pb) = bar.get() {
        pb.finish_with_message("Done");
    }

    match outcome {
        RunOutcome::Done(result) => {
            let details = write_details(&result, &output_dir)
                .map_err(|e| anyhow!(e.user_message(settings.quiet_errors)))?;
            print_summary(&output_dir, &result);
            log::debug!("Details written to {}", details.display());
            Ok(())
        }
        RunOutcome::Cancelled(result) => {
            println!(
                "Cancelled after {} frames in {}",
                result.frames_count,
                output_dir.display()
            );
            Ok(())
        }
        RunOutcome::Failed(err) => Err(anyhow!(err.user_message(settings.quiet_errors))),
    }
}

fn run_many(
    inputs: &[PathBuf],
    out: Option<&Path>,
    config: ConversionConfig,
    settings: &Settings,
    interrupted: &CancelToken,
) -> Result<()> {
    let mut scheduler_config = settings.scheduler();
    if let Some(dir) = out {
        scheduler_config.results_dir = dir.to_path_buf();
    }
    fs::create_dir_all(&scheduler_config.results_dir).with_context(|| {
        format!(
            "creating results dir {}",
            scheduler_config.results_dir.display()
        )
    })?;

    let registry = Arc::new(RunRegistry::new());
    let mut scheduler = RunScheduler::new(Arc::clone(&registry), scheduler_config);
    let multi = MultiProgress::new();
    let mut bars: HashMap<RunId, ProgressBar> = HashMap::new();

    for input in inputs {
        let id = loop {
            match scheduler.submit(input, config.clone()) {
                Ok(id) => break id,
                Err(SchedulerError::QueueFull(_)) => {
                    // Wait for a slot instead of dropping the input.
                    refresh_bars(&registry, &bars);
                    thread::sleep(Duration::from_millis(200));
                }
                Err(e) => return Err(e.into()),
            }
            if interrupted.is_cancelled() {
                scheduler.cancel_all();
                scheduler.shutdown();
                return Err(anyhow!("interrupted"));
            }
        };
        let pb = multi.add(ProgressBar::new(0));
        pb.set_style(bar_style());
        pb.set_message(input.display().to_string());
        bars.insert(id, pb);
    }

    let mut cancel_sent = false;
    loop {
        if interrupted.is_cancelled() && !cancel_sent {
            scheduler.cancel_all();
            cancel_sent = true;
        }
        refresh_bars(&registry, &bars);
        if registry.list().iter().all(|s| s.state.is_terminal()) {
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }
    scheduler.shutdown();

    let mut failed = 0usize;
    for status in registry.list() {
        match status.state {
            JobState::Completed => {
                if let Some(result) = &status.result {
                    print_summary(&status.output_dir, result);
                }
            }
            JobState::Failed => {
                failed += 1;
                eprintln!(
                    "{} ({}): {}",
                    status.input.display(),
                    status.id,
                    status.error.as_deref().unwrap_or("failed")
                );
            }
            JobState::Cancelled => println!("{} ({}): cancelled", status.input.display(), status.id),
            JobState::Pending | JobState::Processing => {}
        }
    }
    if failed > 0 {
        return Err(anyhow!("{} of {} conversions failed", failed, inputs.len()));
    }
    Ok(())
}

fn refresh_bars(registry: &RunRegistry, bars: &HashMap<RunId, ProgressBar>) {
    for (id, pb) in bars {
        let Some(status) = registry.get(id) else {
            continue;
        };
        if pb.is_finished() {
            continue;
        }
        pb.set_length(status.total_frames.max(status.frames_processed));
        pb.set_position(status.frames_processed);
        if status.state.is_terminal() {
            pb.finish_with_message(status.message);
        }
    }
}

/// Creates `dir` and clears old `frame_*` artifacts, asking first unless `assume_yes`.
/// Returns false if the user declined.
fn prepare_output_dir(dir: &Path, assume_yes: bool) -> Result<bool> {
    fs::create_dir_all(dir).with_context(|| format!("creating output dir {}", dir.display()))?;

    let existing: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.file_name().to_str().is_some_and(|name| {
                name.starts_with("frame_") && (name.ends_with(".png") || name.ends_with(".txt"))
            })
        })
        .map(|e| e.into_path())
        .collect();
    if existing.is_empty() {
        return Ok(true);
    }

    if !assume_yes
        && !Confirm::new()
            .with_prompt(format!(
                "Output directory {} already contains frames. Overwrite?",
                dir.display()
            ))
            .default(false)
            .interact()?
    {
        return Ok(false);
    }

    for path in existing {
        fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))?;
    }
    Ok(true)
}

fn print_summary(dir: &Path, result: &ConversionResult) {
    println!("\nASCII conversion complete in {}", dir.display());
    println!("  Frames: {}", result.frames_count);
    if result.txt_files_count > 0 {
        println!("  Text files: {}", result.txt_files_count);
    }
    if result.png_files_count > 0 {
        println!("  Images: {}", result.png_files_count);
    }
    if let Some(mp4) = &result.mp4_file {
        println!("  Video: {}", mp4.display());
    }
    for warning in &result.warnings {
        println!("  Warning: {}", warning);
    }
}
