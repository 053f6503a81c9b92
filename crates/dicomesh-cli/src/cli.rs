use clap::{Args, Parser, Subcommand};
use dicomesh_core::models::{AnnotationKind, ConversionOptions, Point3, TissueType, Vector3};
use std::path::PathBuf;

/// dicomesh - turn DICOM series into printable meshes
#[derive(Parser, Debug)]
#[command(name = "dicomesh")]
#[command(
    about = "Stage DICOM series, run dicom2stl and keep notes on the meshes",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    /// Output results in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Show planned actions without executing them
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Configuration file (defaults to ./dicomesh.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding one sub-directory per conversion job
    #[arg(long, global = true, value_name = "DIR")]
    pub conversions_root: Option<PathBuf>,

    /// Directory holding the bundled sample series
    #[arg(long, global = true, value_name = "DIR")]
    pub samples_root: Option<PathBuf>,

    /// Name of the conversion executable to look up on PATH
    #[arg(long, global = true, value_name = "NAME")]
    pub tool: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the bundled sample series
    Samples,

    /// Stage DICOM slices or zip archives into a new job
    Ingest(IngestArgs),

    /// Copy a bundled sample series into a new job
    StageSample(StageSampleArgs),

    /// Run the conversion tool on a staged job
    Run(RunArgs),

    /// Stage inputs and run the conversion in one step
    Convert(ConvertArgs),

    /// Show recent conversions
    History(HistoryArgs),

    /// Show one job in detail
    Show(ShowArgs),

    /// Manage 3-D annotations on a job's mesh
    Annotate(AnnotateArgs),

    /// Manage image snapshots of a job's mesh
    Snapshot(SnapshotArgs),

    /// Show the effective configuration and where each value came from
    Config,

    /// Run health checks and diagnostics
    Doctor(DoctorArgs),
}

/// Conversion flags shared by `run` and `convert`
#[derive(Args, Debug, Clone)]
pub struct OptionsArgs {
    /// Tissue preset (soft_tissue, bone, skin, fat)
    #[arg(long = "type", value_name = "TISSUE", default_value = "soft_tissue")]
    pub tissue_type: TissueType,

    /// Keep every connected component instead of only the largest
    #[arg(long)]
    pub keep_all: bool,

    /// Smoothing iterations
    #[arg(long, default_value = "25")]
    pub smooth: u32,

    /// Fraction of triangles kept by decimation, in (0, 1]
    #[arg(long, default_value = "0.9")]
    pub reduce: f64,

    /// Components smaller than this fraction are removed, in [0, 1]
    #[arg(long, default_value = "0.05")]
    pub clean_small: f64,

    /// Resample anisotropic volumes before meshing
    #[arg(long)]
    pub anisotropic: bool,
}

impl From<OptionsArgs> for ConversionOptions {
    fn from(args: OptionsArgs) -> Self {
        ConversionOptions {
            tissue_type: args.tissue_type,
            keep_largest: !args.keep_all,
            smooth_iterations: args.smooth,
            reduce_factor: args.reduce,
            clean_small_factor: args.clean_small,
            anisotropic_volume: args.anisotropic,
        }
    }
}

#[derive(Parser, Debug)]
pub struct IngestArgs {
    /// DICOM slices and/or zip archives
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct StageSampleArgs {
    /// Sample name as listed by `dicomesh samples`
    pub name: String,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Identifier of a staged job
    pub job_id: String,

    #[command(flatten)]
    pub options: OptionsArgs,
}

#[derive(Parser, Debug)]
pub struct ConvertArgs {
    /// Convert a bundled sample instead of local files
    #[arg(long, conflicts_with = "files", required_unless_present = "files")]
    pub sample: Option<String>,

    /// DICOM slices and/or zip archives
    pub files: Vec<PathBuf>,

    #[command(flatten)]
    pub options: OptionsArgs,
}

#[derive(Parser, Debug)]
pub struct HistoryArgs {
    /// Number of runs to show (defaults to the configured recent_limit)
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,
}

#[derive(Parser, Debug)]
pub struct ShowArgs {
    pub job_id: String,

    /// Include the tool's full stdout and stderr
    #[arg(long)]
    pub logs: bool,
}

#[derive(Parser, Debug)]
pub struct AnnotateArgs {
    #[command(subcommand)]
    pub command: AnnotateCommand,
}

#[derive(Subcommand, Debug)]
pub enum AnnotateCommand {
    /// Attach an annotation to a job
    Add(AnnotateAddArgs),

    /// List annotations of some jobs, or of every job
    List(ListArgs),

    /// Delete one annotation
    Remove(RemoveArgs),
}

#[derive(Parser, Debug)]
pub struct AnnotateAddArgs {
    pub job_id: String,

    /// marker, arrow or label
    #[arg(long, default_value = "marker")]
    pub kind: AnnotationKind,

    /// Anchor point as x,y,z
    #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
    pub at: Point3,

    /// Arrow direction as u,v,w
    #[arg(long, value_parser = parse_vector, allow_hyphen_values = true)]
    pub direction: Option<Vector3>,

    /// Arrow tip as x,y,z; overrides --direction
    #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
    pub tip: Option<Point3>,

    /// Marker or arrow label, or the text of a label
    #[arg(long, default_value = "")]
    pub text: String,

    #[arg(long)]
    pub color: Option<String>,

    #[arg(long, default_value = "")]
    pub notes: String,

    /// Font size of a label
    #[arg(long)]
    pub size: Option<f64>,
}

#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Jobs to list; every job when omitted
    pub job_ids: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct RemoveArgs {
    pub job_id: String,
    pub id: String,
}

#[derive(Parser, Debug)]
pub struct SnapshotArgs {
    #[command(subcommand)]
    pub command: SnapshotCommand,
}

#[derive(Subcommand, Debug)]
pub enum SnapshotCommand {
    /// Store an image captured from a job's mesh
    Add(SnapshotAddArgs),

    /// List snapshots of some jobs, or of every job
    List(ListArgs),

    /// Show a snapshot, optionally writing its image to a file
    Show(SnapshotShowArgs),
}

#[derive(Parser, Debug)]
pub struct SnapshotAddArgs {
    pub job_id: String,

    /// Image file to store
    pub image: PathBuf,

    /// Image with 2-D drawings composited on top
    #[arg(long)]
    pub overlay: Option<PathBuf>,

    /// JSON file with the 2-D shapes drawn on the overlay
    #[arg(long, requires = "overlay")]
    pub shapes: Option<PathBuf>,

    #[arg(long, default_value = "")]
    pub notes: String,
}

#[derive(Parser, Debug)]
pub struct SnapshotShowArgs {
    pub snapshot_id: String,

    /// Write the image (the overlay when present) to this file
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct DoctorArgs {
    /// Show detailed diagnostic information
    #[arg(long)]
    pub verbose: bool,
}

fn parse_triple(s: &str) -> Result<(f64, f64, f64), String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [a, b, c] = parts[..] else {
        return Err(format!("expected three comma-separated numbers, got '{}'", s));
    };

    let number = |part: &str| {
        part.parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .ok_or_else(|| format!("'{}' is not a number", part))
    };
    Ok((number(a)?, number(b)?, number(c)?))
}

fn parse_point(s: &str) -> Result<Point3, String> {
    parse_triple(s).map(|(x, y, z)| Point3::new(x, y, z))
}

fn parse_vector(s: &str) -> Result<Vector3, String> {
    parse_triple(s).map(|(u, v, w)| Vector3::new(u, v, w))
}
