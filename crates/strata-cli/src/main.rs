//! strata CLI - slice pre-sectioned widgets into a motion stream
//!
//! Reads a JSON job holding settings and each widget's raw layers, runs
//! the slicing pipeline and the print assembler, and writes the result
//! as JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use strata_geom::Vec3;
use strata_print::{print_widgets, ColorRamp, PrintLayer};
use strata_slicer::{
    slice_widgets, CancelToken, MeshRef, NoProgress, PrecomputedSlicer, RawLayer, Settings, Widget,
};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "FDM layer derivation and toolpath assembly", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Slice a job and write its motion stream
    Slice {
        /// Input job file (.json)
        job: PathBuf,
        /// Output file (.json)
        #[arg(short, long)]
        output: PathBuf,
        /// Speed color ramp: default or dark
        #[arg(long, default_value = "default")]
        ramp: String,
        /// Include render groups in the output
        #[arg(long)]
        render: bool,
        /// Render prints as hairlines
        #[arg(long)]
        thin: bool,
    },
    /// Summarize a job file
    Info {
        /// Input job file (.json)
        job: PathBuf,
    },
}

/// One widget of a job.
#[derive(Debug, Deserialize)]
struct JobWidget {
    id: u32,
    #[serde(default = "origin")]
    position: Vec3,
    layers: Vec<RawLayer>,
}

/// A slicing job.
#[derive(Debug, Deserialize)]
struct Job {
    #[serde(default)]
    settings: Settings,
    widgets: Vec<JobWidget>,
}

fn origin() -> Vec3 {
    Vec3::zeros()
}

#[derive(Serialize)]
struct LayersOnly<'a> {
    layers: &'a [PrintLayer],
}

fn init_logging() {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Slice {
            job,
            output,
            ramp,
            render,
            thin,
        } => {
            let ramp = ColorRamp::from_name(&ramp)
                .ok_or_else(|| anyhow::anyhow!("Unknown color ramp: {}", ramp))?;
            slice_job(&job, &output, ramp, render, thin)?;
        }
        Commands::Info { job } => {
            show_info(&job)?;
        }
    }

    Ok(())
}

fn load_job(path: &Path) -> Result<Job> {
    let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let job: Job = serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))?;
    Ok(job)
}

fn slice_job(input: &Path, output: &Path, ramp: ColorRamp, render: bool, thin: bool) -> Result<()> {
    let job = load_job(input)?;

    let mut raw = PrecomputedSlicer::new();
    let mut widgets: Vec<Widget> = Vec::with_capacity(job.widgets.len());
    for w in job.widgets {
        let mesh = MeshRef(format!("widget-{}", w.id));
        raw.insert(mesh.clone(), w.layers);
        widgets.push(Widget::new(w.id, mesh).at(w.position));
    }

    let cancel = CancelToken::new();
    let results = slice_widgets(&mut widgets, &job.settings, &raw, &cancel, |id, p| {
        debug!(widget = id, fraction = p.fraction, stage = p.stage, "slicing");
    });
    for (widget, result) in widgets.iter().zip(results) {
        result.with_context(|| format!("slicing widget {}", widget.id))?;
        info!(widget = widget.id, layers = widget.slices.len(), "sliced");
    }

    let print = print_widgets(&widgets, &job.settings, ramp, thin, &mut NoProgress)?;
    let motions: usize = print.layers.iter().map(|l| l.motions.len()).sum();
    info!(layers = print.layers.len(), motions, purges = print.purges, "assembled");

    let json = if render {
        serde_json::to_string_pretty(&print)?
    } else {
        serde_json::to_string_pretty(&LayersOnly {
            layers: &print.layers,
        })?
    };
    fs::write(output, json)?;
    println!("Wrote {} layers to {}", print.layers.len(), output.display());
    Ok(())
}

fn show_info(path: &Path) -> Result<()> {
    let job = load_job(path)?;
    let process = &job.settings.process;
    println!("Job: {}", path.display());
    println!("  Extruders: {}", job.settings.device.extruders.len());
    println!(
        "  Layer height: {} (first {})",
        process.layer_height, process.first_layer_height
    );
    println!("  Fill: {} at {}", process.fill.pattern, process.fill.density);
    println!("  Widgets: {}", job.widgets.len());
    for w in &job.widgets {
        let top = w.layers.last().map_or(0.0, |l| l.z);
        println!(
            "    #{} at ({}, {}): {} layers, top {}",
            w.id,
            w.position.x,
            w.position.y,
            w.layers.len(),
            top
        );
    }
    Ok(())
}
