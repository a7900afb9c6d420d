use anyhow::Result;
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Tolerance below which `|dir . n| / |dir|` flags a ray as parallel to a triangle.
pub const EPS_PARALLEL: f64 = 1e-10;
/// Barycentric tolerance for boundary grazes in ray-triangle tests.
pub const EPS_BARY: f64 = 1e-10;
/// Ray-parameter tolerance below which the ray origin counts as lying on the surface.
pub const EPS_ORIGIN: f64 = 1e-10;
/// Vertex snapping tolerance, relative to the diagonal of the box being clipped.
pub const SNAP_TOL_REL: f64 = 1e-10;
/// Cell-classification tolerance, relative to the smallest cell extent.
/// Shrinks the cell box so that touch-only contact is not an intersection.
pub const CLASSIFY_TOL_REL: f64 = 1e-8;
/// Relative weight threshold for point elimination: points with
/// `w < EPS_REL_WEIGHT * max(w)` are removed in one sweep.
pub const EPS_REL_WEIGHT: f64 = 1e-4;
/// Absolute weight threshold for the final prune of surviving points.
pub const EPS_ABS_WEIGHT: f64 = 1e-14;
/// Residual above which a trimmed cell is emptied instead of published.
pub const RESIDUAL_HARD_CUTOFF: f64 = 1e-2;
/// Maximum number of point-elimination iterations per fitting attempt.
pub const MAX_ELIMINATION_ITERATIONS: usize = 1000;
/// Fewest interior points the elimination is allowed to keep.
pub const MIN_NUM_POINTS: usize = 4;
/// Maximum number of outer moment-fitting retries with doubled seeding density.
pub const MAX_SEEDING_RETRIES: usize = 4;
/// Inward nudge for face-center containment tests, relative to the cell extent.
pub const FACE_NUDGE_REL: f64 = 1e-6;
/// Deepest octree refinement level used when seeding interior points.
pub const MAX_OCTREE_LEVEL: usize = 8;

/// Quadrature rule selection for untrimmed cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum IntegrationMethod {
    Gauss,
    #[serde(rename = "GGQ_Optimal")]
    GgqOptimal,
    #[serde(rename = "GGQ_Reduced1")]
    GgqReduced1,
    #[serde(rename = "GGQ_Reduced2")]
    GgqReduced2,
}

impl IntegrationMethod {
    /// True for the multi-cell rules assembled over element strips.
    pub fn is_ggq(&self) -> bool {
        !matches!(self, IntegrationMethod::Gauss)
    }
}

/// Kind of a boundary-condition surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ConditionKind {
    Neumann,
    Dirichlet,
}

/// A boundary-condition surface given as an STL file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConditionSettings {
    pub input_filename: String,
    pub kind: ConditionKind,
}

/// Runtime configuration for the application.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub input_filename: String,
    pub lower_bound_xyz: [f64; 3],
    pub upper_bound_xyz: [f64; 3],
    /// Parametric box for IGA mappings. Defaults to the physical box.
    pub lower_bound_uvw: Option<[f64; 3]>,
    pub upper_bound_uvw: Option<[f64; 3]>,
    pub number_of_elements: [usize; 3],
    pub polynomial_order: [usize; 3],
    #[serde(default = "default_integration_method")]
    pub integration_method: IntegrationMethod,
    #[serde(default = "default_true")]
    pub embedding_flag: bool,
    #[serde(default = "default_min_element_volume_ratio")]
    pub min_element_volume_ratio: f64,
    #[serde(default = "default_min_num_boundary_triangles")]
    pub min_num_boundary_triangles: usize,
    #[serde(default = "default_moment_fitting_residual")]
    pub moment_fitting_residual: f64,
    #[serde(default = "default_point_distribution_factor")]
    pub init_point_distribution_factor: usize,
    #[serde(default = "default_true")]
    pub neglect_elements_if_mesh_is_flawed: bool,
    #[serde(default = "default_true")]
    pub b_spline_mesh: bool,
    #[serde(default)]
    pub echo_level: usize,
    #[serde(default = "default_output_directory")]
    pub output_directory_name: String,
    #[serde(default)]
    pub conditions: Vec<ConditionSettings>,
}

fn default_integration_method() -> IntegrationMethod {
    IntegrationMethod::Gauss
}

fn default_true() -> bool {
    true
}

fn default_min_element_volume_ratio() -> f64 {
    1e-3
}

fn default_min_num_boundary_triangles() -> usize {
    1000
}

fn default_moment_fitting_residual() -> f64 {
    1e-10
}

fn default_point_distribution_factor() -> usize {
    2
}

fn default_output_directory() -> String {
    "cutcell_output".to_string()
}

impl Settings {
    /// Parametric box, falling back to the physical box when absent.
    pub fn bounds_uvw(&self) -> ([f64; 3], [f64; 3]) {
        (
            self.lower_bound_uvw.unwrap_or(self.lower_bound_xyz),
            self.upper_bound_uvw.unwrap_or(self.upper_bound_xyz),
        )
    }

    /// Total number of grid cells.
    pub fn total_elements(&self) -> usize {
        self.number_of_elements[0] * self.number_of_elements[1] * self.number_of_elements[2]
    }
}

/// Load settings from a TOML file, apply `CUTCELL_`-prefixed environment
/// overrides, then command-line overrides.
pub fn load_config(args: &CliArgs) -> Result<Settings> {
    let settings: Config = Config::builder()
        .add_source(File::from(Path::new(&args.config)).required(true))
        .add_source(Environment::with_prefix("cutcell"))
        .build()?;

    let mut config: Settings = settings.try_deserialize()?;
    apply_cli_overrides(&mut config, args);

    validate_config(&config)?;

    Ok(config)
}

/// Load settings from a TOML file only (no CLI parsing). Used by tests.
pub fn load_config_file(config_file: &Path) -> Result<Settings> {
    let settings: Config = Config::builder()
        .add_source(File::from(config_file).required(true))
        .build()?;

    let config: Settings = settings.try_deserialize()?;
    validate_config(&config)?;

    Ok(config)
}

fn apply_cli_overrides(config: &mut Settings, args: &CliArgs) {
    if let Some(ref geo) = args.geo {
        config.input_filename = geo.clone();
    }
    if let Some(method) = args.method {
        config.integration_method = method;
    }
    if let Some(order) = args.order {
        config.polynomial_order = [order, order, order];
    }
    if let Some(residual) = args.residual {
        config.moment_fitting_residual = residual;
    }
    if let Some(echo) = args.echo {
        config.echo_level = echo;
    }
    if let Some(ref output) = args.output {
        config.output_directory_name = output.clone();
    }
}

pub fn validate_config(config: &Settings) -> Result<()> {
    for d in 0..3 {
        anyhow::ensure!(
            config.lower_bound_xyz[d] < config.upper_bound_xyz[d],
            "lower_bound_xyz must be strictly below upper_bound_xyz"
        );
        anyhow::ensure!(
            config.number_of_elements[d] > 0,
            "number_of_elements must be positive in every direction"
        );
        anyhow::ensure!(
            (1..=4).contains(&config.polynomial_order[d]),
            "polynomial_order must lie in 1..=4"
        );
    }
    let (lo_uvw, hi_uvw) = config.bounds_uvw();
    for d in 0..3 {
        anyhow::ensure!(
            lo_uvw[d] < hi_uvw[d],
            "lower_bound_uvw must be strictly below upper_bound_uvw"
        );
    }
    anyhow::ensure!(
        config.min_element_volume_ratio >= 0.0,
        "min_element_volume_ratio must be non-negative"
    );
    anyhow::ensure!(
        config.moment_fitting_residual > 0.0,
        "moment_fitting_residual must be positive"
    );
    anyhow::ensure!(
        config.init_point_distribution_factor > 0,
        "init_point_distribution_factor must be positive"
    );
    Ok(())
}

fn parse_integration_method(s: &str) -> Result<IntegrationMethod, String> {
    match s {
        "Gauss" => Ok(IntegrationMethod::Gauss),
        "GGQ_Optimal" => Ok(IntegrationMethod::GgqOptimal),
        "GGQ_Reduced1" => Ok(IntegrationMethod::GgqReduced1),
        "GGQ_Reduced2" => Ok(IntegrationMethod::GgqReduced2),
        _ => Err(format!(
            "unknown integration method '{}'. Expected one of: Gauss, GGQ_Optimal, GGQ_Reduced1, GGQ_Reduced2",
            s
        )),
    }
}

#[derive(Parser, Debug)]
#[command(version, about = "CUTCELL - Moment-fitted cubature for embedded solids")]
pub struct CliArgs {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// File path to the input geometry. Overrides `input_filename`.
    /// Only the STL format (ASCII or binary) is supported.
    #[arg(short, long)]
    geo: Option<String>,

    /// Quadrature rule for untrimmed cells: Gauss, GGQ_Optimal, GGQ_Reduced1 or GGQ_Reduced2.
    #[arg(short, long, value_parser = parse_integration_method)]
    method: Option<IntegrationMethod>,

    /// Isotropic polynomial order (1..=4). Overrides `polynomial_order` on all axes.
    #[arg(short = 'p', long)]
    order: Option<usize>,

    /// Target moment-fitting residual for trimmed cells.
    #[arg(short, long)]
    residual: Option<f64>,

    /// Logging verbosity. 0 is silent; 1 prints the run banner and progress
    /// bar and dumps VTK/STL debug output; 2 adds per-cell diagnostics and
    /// phase timings.
    #[arg(short, long)]
    echo: Option<usize>,

    /// Directory for VTK/STL debug output.
    #[arg(short, long)]
    output: Option<String>,
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Settings:
  - Input: {}
  - Grid: {:?} cells over {:?} .. {:?}
  - Polynomial Order: {:?}
  - Integration Method: {:?}
  - Moment Fitting Residual: {:e}
  - Min Element Volume Ratio: {:e}
  ",
            self.input_filename,
            self.number_of_elements,
            self.lower_bound_xyz,
            self.upper_bound_xyz,
            self.polynomial_order,
            self.integration_method,
            self.moment_fitting_residual,
            self.min_element_volume_ratio,
        )
    }
}
