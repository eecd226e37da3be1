use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the ALB monitor workspace",
    long_about = "A unified CLI for packaging handler artifacts, synthesizing\n\
                  the stacks, and running CI checks in the ALB monitor workspace."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Zip handler sources into the resources/ layout the stacks expect
    PackageHandlers {
        /// Directory with one sub-directory per handler plus the layer
        #[arg(long, default_value = "handlers")]
        source: PathBuf,
        /// Resources directory the synthesizer reads zips from
        #[arg(long, default_value = "resources")]
        output: PathBuf,
    },
    /// Synthesize the cloud assembly into cdk.out
    Synth {
        /// ARN of the monitored target group
        #[arg(long, env = "ELB_TARGET_GROUP_ARN")]
        target_group_arn: String,
    },
    /// Run CI checks (fmt, clippy, tests, synth smoke test)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting, clippy, and tests
    Check,
    /// Package placeholder handlers and synthesize
    Synth,
    /// Run check + synth
    All,
}

/// Handler packages: (source sub-directory, zip path under resources/, prefix inside the zip).
const PACKAGES: [(&str, &str, &str); 3] = [
    (
        "alb_alarm_lambda_handler",
        "lambda/alb_alarm_lambda_handler.zip",
        "",
    ),
    (
        "alb_alarm_check_lambda_handler",
        "lambda/alb_alarm_check_lambda_handler.zip",
        "",
    ),
    // Python layers are unpacked under /opt; modules must sit in python/.
    ("elb_load_monitor", "lambda_layer/elb_load_monitor.zip", "python"),
];

const SMOKE_TARGET_GROUP_ARN: &str =
    "arn:aws:elasticloadbalancing:us-east-1:123456789012:targetgroup/smoke/0000000000000000";

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn cargo(args: &[&str]) -> ExitStatus {
    eprintln!("+ cargo {}", args.join(" "));
    Command::new("cargo")
        .args(args)
        .status()
        .expect("failed to execute cargo")
}

fn run_cargo(args: &[&str]) {
    let status = cargo(args);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn package_handlers(source: &Path, output: &Path) {
    step("Package handler zip artifacts");

    for (name, zip_path, prefix) in PACKAGES {
        let source_dir = source.join(name);
        if !source_dir.is_dir() {
            panic!(
                "expected handler sources at '{}'; each handler lives in its own directory",
                source_dir.display()
            );
        }

        let zip_path = output.join(zip_path);
        if let Some(parent) = zip_path.parent() {
            fs::create_dir_all(parent).expect("failed to create resources directory");
        }
        let entries = package_directory_zip(&source_dir, &zip_path, prefix);
        eprintln!("- {} ({entries} files)", zip_path.display());
    }
}

fn package_directory_zip(source_dir: &Path, zip_path: &Path, prefix: &str) -> usize {
    let mut files = Vec::new();
    collect_files(source_dir, &mut files);
    files.sort();

    let file = fs::File::create(zip_path).expect("failed to create handler zip");
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for path in &files {
        let relative = path
            .strip_prefix(source_dir)
            .expect("collected file should be under source dir");
        let relative = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let entry_name = if prefix.is_empty() {
            relative
        } else {
            format!("{prefix}/{relative}")
        };

        let contents = fs::read(path).expect("failed to read handler source");
        zip.start_file(entry_name, options)
            .expect("failed to start zip entry");
        zip.write_all(&contents)
            .expect("failed to write zip entry");
    }
    zip.finish().expect("failed to finish handler zip");
    files.len()
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) {
    let entries = fs::read_dir(dir).expect("failed to read handler directory");
    for entry in entries {
        let path = entry.expect("failed to read directory entry").path();
        let skip = path
            .file_name()
            .map(|name| name == "__pycache__" || name.to_string_lossy().ends_with(".pyc"))
            .unwrap_or(false);
        if skip {
            continue;
        }
        if path.is_dir() {
            collect_files(&path, files);
        } else {
            files.push(path);
        }
    }
}

fn synth(target_group_arn: &str) {
    step("Synthesize cloud assembly");
    let context = format!("elbTargetGroupArn={target_group_arn}");
    run_cargo(&[
        "run",
        "-p",
        "alb_monitor_app",
        "--bin",
        "alb-monitor",
        "--",
        "synth",
        "-c",
        &context,
        "--output",
        "cdk.out",
    ]);
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_check() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&[
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ]);

    step("Test alb_monitor_core");
    run_cargo(&["test", "-p", "alb_monitor_core"]);

    step("Test alb_monitor_app");
    run_cargo(&["test", "-p", "alb_monitor_app"]);
}

fn ci_synth() {
    let scratch = std::env::temp_dir().join("alb_monitor_ci_handlers");
    for (name, _, _) in PACKAGES {
        let dir = scratch.join(name);
        fs::create_dir_all(&dir).expect("failed to create placeholder handler dir");
        fs::write(dir.join(format!("{name}.py")), "def lambda_handler(event, context):\n    return None\n")
            .expect("failed to write placeholder handler");
    }
    package_handlers(&scratch, Path::new("resources"));
    synth(SMOKE_TARGET_GROUP_ARN);
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::PackageHandlers { source, output } => {
            package_handlers(&source, &output);
        }
        Commands::Synth { target_group_arn } => {
            synth(&target_group_arn);
        }
        Commands::Ci { job } => {
            match job {
                CiJob::Check => ci_check(),
                CiJob::Synth => ci_synth(),
                CiJob::All => {
                    ci_check();
                    ci_synth();
                }
            }
            eprintln!("\nCI job passed.");
        }
    }
}
