use anyhow::{Context, Result};
use burn_ndarray::{NdArray, NdArrayDevice};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use atlasprop_pipeline::dti::DTI_SETUP;
use atlasprop_pipeline::naming;
use atlasprop_pipeline::{
    run_batch, AtlasConfig, BatchReport, DtiInputs, DtiStage, PipelineConfig, StageError, SubjectOutcome,
    SubjectSummary, T2Inputs, T2Products, T2Stage,
};
use atlasprop_registration::SmoothnessLevel;

mod discover;

type Backend = NdArray<f32>;

#[derive(Parser)]
#[command(name = "atlasprop")]
#[command(about = "Propagate the Allen mouse brain atlas into T2 and DTI scans")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the atlas resources (overrides the configuration)
    #[arg(long, global = true)]
    lib_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the atlas to one brain-extracted T2 volume
    T2 {
        /// Path to the `*Bet.nii.gz` T2 volume
        #[arg(short, long)]
        input: PathBuf,

        /// Deformable smoothness level (1 to 4)
        #[arg(short, long)]
        smoothness: Option<u8>,
    },

    /// Propagate atlas labels into one brain-extracted DTI volume
    Dti {
        /// Path to the preprocessed DTI volume
        #[arg(short, long)]
        input: PathBuf,

        /// Session whose atlas-space lesion mask to use (for example: P5)
        #[arg(short, long)]
        reference_day: Option<String>,
    },

    /// Run the T2 stage on every `T2w/*Bet.nii.gz` below a directory
    BatchT2 {
        root: PathBuf,

        #[arg(short, long)]
        smoothness: Option<u8>,

        /// Worker threads (default: all cores)
        #[arg(short, long)]
        threads: Option<usize>,
    },

    /// Run the DTI stage on every `DTI/*Bet.nii.gz` below a directory
    BatchDti {
        root: PathBuf,

        #[arg(short, long)]
        reference_day: Option<String>,

        #[arg(short, long)]
        threads: Option<usize>,
    },

    /// Print the effective configuration as JSON
    ShowConfig,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref(), cli.lib_dir.as_deref())?;

    match cli.command {
        Commands::T2 { input, smoothness } => {
            apply_smoothness(&mut config, smoothness)?;
            let summary = run_t2(&config, &input)?;
            report_subject(&summary);
        }
        Commands::Dti { input, reference_day } => {
            apply_reference_day(&mut config, reference_day);
            let summary = run_dti(&config, &input)?;
            report_subject(&summary);
        }
        Commands::BatchT2 { root, smoothness, threads } => {
            apply_smoothness(&mut config, smoothness)?;
            let inputs = discover::find_t2_inputs(&root)?;
            let report = batch(&config, inputs, threads, run_t2)?;
            finish_batch(&report)?;
        }
        Commands::BatchDti { root, reference_day, threads } => {
            apply_reference_day(&mut config, reference_day);
            let inputs = discover::find_dti_inputs(&root)?;
            let report = batch(&config, inputs, threads, run_dti)?;
            finish_batch(&report)?;
        }
        Commands::ShowConfig => {
            println!("{}", config.to_json_string()?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>, lib_dir: Option<&Path>) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = lib_dir {
        config.atlas = AtlasConfig::from_lib_dir(dir);
    }
    Ok(config)
}

fn apply_smoothness(config: &mut PipelineConfig, level: Option<u8>) -> Result<()> {
    if let Some(level) = level {
        let smoothness = SmoothnessLevel::try_from(level)?;
        config.t2.deformable = config.t2.deformable.with_smoothness(smoothness);
    }
    Ok(())
}

fn apply_reference_day(config: &mut PipelineConfig, day: Option<String>) {
    if day.is_some() {
        config.dti.reference_session = day;
    }
}

fn run_t2(config: &PipelineConfig, input: &Path) -> Result<SubjectSummary, StageError> {
    let dir = input.parent().unwrap_or(Path::new("."));
    let mut inputs = T2Inputs::new(input);
    match discover::find_with_suffix(dir, naming::LESION_MASK) {
        Ok(masks) => {
            if let Some(mask) = masks.into_iter().next() {
                inputs = inputs.with_lesion_mask(mask);
            }
        }
        Err(e) => warn!("lesion mask lookup in {}: {:#}", dir.display(), e),
    }

    let device = NdArrayDevice::default();
    let output = T2Stage::new(&config.niftyreg, &config.atlas, &config.t2).run::<Backend>(&inputs, &device)?;
    Ok(SubjectSummary::from_run(&output.run))
}

fn run_dti(config: &PipelineConfig, input: &Path) -> Result<SubjectSummary, StageError> {
    let setup = |e: anyhow::Error| {
        let subject = naming::base_name(input).unwrap_or_else(|_| input.display().to_string());
        StageError::new(subject, DTI_SETUP, atlasprop_pipeline::PipelineError::invalid_input(format!("{:#}", e)))
    };
    let device = NdArrayDevice::default();

    let session = discover::t2_session(input).map_err(setup)?;
    let products = T2Products::<Backend>::load(&config.niftyreg, &session, &device)
        .context("loading structural products")
        .map_err(setup)?;
    let reference = discover::reference_mask(input, config.dti.reference_session.as_deref());

    let inputs = DtiInputs::new(input);
    let output = DtiStage::new(&config.niftyreg, &config.atlas, &config.dti).run(&inputs, &products, &reference, &device)?;
    info!("lesion mask source: {:?}", output.mask_source);
    Ok(SubjectSummary::from_run(&output.run))
}

fn batch<F>(config: &PipelineConfig, inputs: Vec<PathBuf>, threads: Option<usize>, job: F) -> Result<BatchReport>
where
    F: Fn(&PipelineConfig, &Path) -> SubjectOutcome + Sync + Send,
{
    if inputs.is_empty() {
        anyhow::bail!("no input volumes found");
    }
    let pb = ProgressBar::new(inputs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} subjects ({eta}) {msg}")?
            .progress_chars("#>-"),
    );

    let report = run_batch(
        inputs,
        threads.or(config.threads),
        |input| job(config, &input),
        |outcome| {
            match outcome {
                Ok(summary) => pb.set_message(summary.subject.clone()),
                Err(e) => pb.println(format!("FAILED {}", e)),
            }
            pb.inc(1);
        },
    )?;
    pb.finish_with_message("done");
    Ok(report)
}

fn report_subject(summary: &SubjectSummary) {
    println!("{}: {} files written", summary.subject, summary.artifacts);
    for skipped in &summary.skipped {
        println!("  skipped {}: {}", skipped.step, skipped.reason);
    }
}

fn finish_batch(report: &BatchReport) -> Result<()> {
    for summary in report.succeeded() {
        report_subject(summary);
    }
    for failure in report.failed() {
        println!("FAILED {}", failure);
    }
    if !report.is_success() {
        anyhow::bail!("{} of {} subjects failed", report.failure_count(), report.outcomes.len());
    }
    Ok(())
}
