// main.rs — `bilateral` command-line driver.
//
//   bilateral src/shaders/bilateral.wgsl --input input.bin --golden goldenOutput.bin
//   bilateral --software --threads 4
//
// Loads the input frame, filters it on the accelerator (or on the CPU with
// `--software`), scores the result against the golden frame and prints
// `MSE : <score>` on stdout. Any fatal error exits non-zero.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use env_logger::Env;
use log::{debug, info};

use bilateral_accel::bilateral::{bilateral_filter_into, FilterConfig};
use bilateral_accel::coefficients::{gaussian_coefficients, Coefficients};
use bilateral_accel::gpu::{AcceleratorConfig, AcceleratorContext, DeviceProfile};
use bilateral_accel::image::Image;
use bilateral_accel::io::{read_raw_image, write_raw_image};
use bilateral_accel::plan::{ExecutionPlan, PixelMapping};
use bilateral_accel::timing::ScopedTimer;
use bilateral_accel::validate::score_against_file;

/// Bilateral filter on a 320×240 f32 frame, on an accelerator or the CPU.
#[derive(Parser, Debug)]
#[command(name = "bilateral", version, about)]
struct Cli {
    /// WGSL kernel file to build for the accelerator
    #[arg(env = "BILATERAL_KERNEL", required_unless_present = "software")]
    kernel: Option<PathBuf>,

    /// Input frame: raw little-endian f32, 320×240 samples
    #[arg(long, env = "BILATERAL_INPUT", default_value = "input.bin")]
    input: PathBuf,

    /// Golden reference frame, same format as the input
    #[arg(long, env = "BILATERAL_GOLDEN", default_value = "goldenOutput.bin")]
    golden: PathBuf,

    /// Platform vendor to run on (case-insensitive substring, e.g. "nvidia")
    #[arg(long, env = "BILATERAL_VENDOR")]
    vendor: Option<String>,

    /// Accept CPU/software adapters (llvmpipe, lavapipe, WARP) as devices
    #[arg(long, env = "BILATERAL_ALLOW_SOFTWARE_ADAPTER")]
    allow_software_adapter: bool,

    /// Device profile for limits and workgroup size
    #[arg(long, value_enum, env = "BILATERAL_PROFILE", default_value = "native")]
    profile: ProfileArg,

    /// How the CPU filter spreads rows over threads
    #[arg(long, value_enum, env = "BILATERAL_CPU_MAPPING")]
    cpu_mapping: Option<MappingArg>,

    /// Run the CPU filter instead of the accelerator
    #[arg(long, env = "BILATERAL_SOFTWARE")]
    software: bool,

    /// Also run the CPU filter and log the largest difference
    #[arg(long, env = "BILATERAL_COMPARE_SOFTWARE", conflicts_with = "software")]
    compare_software: bool,

    /// Worker threads for the CPU filter (default: one per core)
    #[arg(long, env = "BILATERAL_THREADS")]
    threads: Option<usize>,

    /// Write the filtered frame here (raw little-endian f32)
    #[arg(long, env = "BILATERAL_OUTPUT")]
    output: Option<PathBuf>,

    /// Log level; RUST_LOG applies when unset
    #[arg(long, value_enum, env = "BILATERAL_LOG_LEVEL")]
    log_level: Option<LogLevel>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProfileArg {
    Native,
    Embedded,
}

impl From<ProfileArg> for DeviceProfile {
    fn from(p: ProfileArg) -> Self {
        match p {
            ProfileArg::Native => DeviceProfile::Native,
            ProfileArg::Embedded => DeviceProfile::Embedded,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MappingArg {
    Sequential,
    RowParallel,
}

impl From<MappingArg> for PixelMapping {
    fn from(m: MappingArg) -> Self {
        match m {
            MappingArg::Sequential => PixelMapping::Sequential,
            MappingArg::RowParallel => PixelMapping::RowParallel,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    if let Some(level) = cli.log_level {
        logger.filter_level(level.into());
    }
    logger.init();

    if let Some(n) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
            .context("failed to configure the CPU thread pool")?;
    }

    let cfg = FilterConfig::CANONICAL;
    let plan = execution_plan(&cli);
    info!("execution plan: {plan}");
    let coeffs = gaussian_coefficients(cfg.radius);
    debug!("coefficients: {:?}", coeffs.as_slice());

    let input = {
        let _t = ScopedTimer::new("load_time");
        read_raw_image(&cli.input, cfg.width, cfg.height).context("failed to load input frame")?
    };

    let output = if cli.software {
        info!("running software filter");
        run_software(&input, &coeffs, &cfg, plan.mapping)
    } else {
        let kernel = cli.kernel.as_deref().context("no kernel file given")?;
        run_accelerated(&accelerator_config(&cli, &plan), kernel, &input, &coeffs, cfg)?
    };

    if cli.compare_software {
        let reference = run_software(&input, &coeffs, &cfg, plan.mapping);
        info!("max |accelerated - software| = {:e}", output.max_abs_diff(&reference));
    }

    if let Some(path) = &cli.output {
        write_raw_image(path, &output).context("failed to write output frame")?;
        info!("wrote {}", path.display());
    }

    let score = {
        let _t = ScopedTimer::new("compare_time");
        score_against_file(&output, &cli.golden).context("failed to load golden frame")?
    };
    debug!("max abs diff vs golden: {}", score.max_abs_diff);
    println!("{score}");
    Ok(())
}

/// One plan per run: the profile picks the defaults, `--cpu-mapping`
/// overrides the CPU half.
fn execution_plan(cli: &Cli) -> ExecutionPlan {
    let plan = ExecutionPlan::for_profile(cli.profile.into());
    match cli.cpu_mapping {
        Some(m) => plan.with_mapping(m.into()),
        None => plan,
    }
}

fn accelerator_config(cli: &Cli, plan: &ExecutionPlan) -> AcceleratorConfig {
    AcceleratorConfig {
        vendor: cli.vendor.clone(),
        allow_software: cli.allow_software_adapter,
        profile: cli.profile.into(),
        workgroup: Some(plan.workgroup),
        ..Default::default()
    }
}

fn run_software(input: &Image, coeffs: &Coefficients, cfg: &FilterConfig, mapping: PixelMapping) -> Image {
    let mut out = Image::new(cfg.width, cfg.height);
    let _t = ScopedTimer::new("filter_time");
    debug!("software filter, {mapping} mapping");
    bilateral_filter_into(&mut out, input, coeffs, cfg, mapping);
    out
}

fn run_accelerated(
    acc: &AcceleratorConfig,
    kernel: &Path,
    input: &Image,
    coeffs: &Coefficients,
    cfg: FilterConfig,
) -> Result<Image> {
    let ctx = AcceleratorContext::new(acc, kernel).context("accelerator setup failed")?;
    info!("{ctx}");

    let mut session = ctx.session(cfg).context("buffer allocation failed")?;
    let output = {
        let _t = ScopedTimer::new("filter_time");
        session.filter(input, coeffs).context("accelerated filter failed")?
    };
    session.release();
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bilateral_accel::bilateral::bilateral_filter;
    use bilateral_accel::plan::WorkgroupSize;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("bilateral").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_plan_defaults_from_profile() {
        let plan = execution_plan(&parse(&["--software"]));
        assert_eq!(plan, ExecutionPlan::for_profile(DeviceProfile::Native));

        let cli = parse(&["kernel.wgsl", "--profile", "embedded"]);
        let plan = execution_plan(&cli);
        assert_eq!(plan.mapping, PixelMapping::RowParallel);
        assert_eq!(plan.workgroup, WorkgroupSize { x: 8, y: 8 });
    }

    #[test]
    fn test_cpu_mapping_flag_reaches_plan() {
        let plan = execution_plan(&parse(&["--software", "--cpu-mapping", "sequential"]));
        assert_eq!(plan.mapping, PixelMapping::Sequential);
        assert_eq!(plan.workgroup, WorkgroupSize { x: 16, y: 8 });
    }

    #[test]
    fn test_plan_workgroup_reaches_accelerator_config() {
        let cli = parse(&["kernel.wgsl", "--profile", "embedded", "--vendor", "xilinx"]);
        let acc = accelerator_config(&cli, &execution_plan(&cli));
        assert_eq!(acc.workgroup, Some(WorkgroupSize { x: 8, y: 8 }));
        assert_eq!(acc.profile, DeviceProfile::Embedded);
        assert_eq!(acc.vendor.as_deref(), Some("xilinx"));
    }

    #[test]
    fn test_software_run_matches_for_every_mapping() {
        let cfg = FilterConfig::new(24, 16, 2);
        let coeffs = gaussian_coefficients(cfg.radius);
        let input = Image::from_fn(24, 16, |x, y| if (x + y) % 7 == 0 { 0.0 } else { 0.3 + 0.01 * x as f32 });
        let expected = bilateral_filter(&input, &coeffs, &cfg);
        for mapping in [PixelMapping::Sequential, PixelMapping::RowParallel] {
            let out = run_software(&input, &coeffs, &cfg, mapping);
            assert_eq!(out.as_slice(), expected.as_slice(), "{mapping}");
        }
    }
}
