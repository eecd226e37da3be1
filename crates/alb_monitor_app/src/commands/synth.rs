use std::path::{Path, PathBuf};

use alb_monitor_core::app::{
    synthesize, AppConfig, CloudAssembly, StackEnvironment, STACK_ARTIFACT_TYPE,
};
use alb_monitor_core::context::SynthContext;
use alb_monitor_core::parameters::ParameterOverride;
use alb_monitor_core::stacks::{cloudwatch, monitor};
use anyhow::{bail, Context};
use clap::Args;

#[derive(Debug, Clone, Args)]
pub struct SynthArgs {
    /// Context value, e.g. `-c elbTargetGroupArn=arn:aws:...` (repeatable)
    #[arg(short = 'c', long = "context", value_name = "KEY=VALUE")]
    pub context: Vec<String>,
    /// JSON file with a top-level "context" object (cdk.json layout)
    #[arg(long, value_name = "PATH")]
    pub context_file: Option<PathBuf>,
    /// Deploy-time parameter value, optionally scoped to one stack (repeatable)
    #[arg(long = "parameters", value_name = "[STACK:]KEY=VALUE")]
    pub parameters: Vec<String>,
    /// Directory containing lambda/ and lambda_layer/ zip packages
    #[arg(long, default_value = "resources", env = "ALB_MONITOR_RESOURCES_DIR")]
    pub resources_dir: PathBuf,
    #[arg(long, default_value = monitor::DEFAULT_STACK_NAME)]
    pub monitor_stack_name: String,
    #[arg(long, default_value = cloudwatch::DEFAULT_STACK_NAME)]
    pub cloudwatch_stack_name: String,
    /// Target account; leave unset for an environment-agnostic assembly
    #[arg(long, env = "CDK_DEFAULT_ACCOUNT")]
    pub account: Option<String>,
    #[arg(long, env = "CDK_DEFAULT_REGION")]
    pub region: Option<String>,
}

pub fn build_config(args: &SynthArgs) -> anyhow::Result<AppConfig> {
    let mut context = SynthContext::new();
    if let Some(path) = &args.context_file {
        context
            .merge_file(path)
            .with_context(|| format!("failed to load context file {}", path.display()))?;
    }
    for pair in &args.context {
        context.set_pair(pair)?;
    }

    let parameter_overrides = args
        .parameters
        .iter()
        .map(|raw| ParameterOverride::parse(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let environment = match (&args.account, &args.region) {
        (Some(account), Some(region)) => Some(StackEnvironment {
            account: account.clone(),
            region: region.clone(),
        }),
        (None, None) => None,
        _ => bail!("--account and --region must be given together"),
    };

    let mut config = AppConfig::new(&args.resources_dir, context);
    config.monitor_stack_name = args.monitor_stack_name.clone();
    config.cloudwatch_stack_name = args.cloudwatch_stack_name.clone();
    config.parameter_overrides = parameter_overrides;
    config.environment = environment;
    Ok(config)
}

pub fn synthesize_from_args(args: &SynthArgs) -> anyhow::Result<CloudAssembly> {
    let config = build_config(args)?;
    synthesize(&config).context("synthesis failed")
}

pub fn run(args: &SynthArgs, output: &Path) -> anyhow::Result<PathBuf> {
    let assembly = synthesize_from_args(args)?;
    assembly
        .write_to(output)
        .with_context(|| format!("failed to write cloud assembly to {}", output.display()))
}

/// One line per stack in deployment order: `name` or `name (after a, b)`.
pub fn list(args: &SynthArgs) -> anyhow::Result<Vec<String>> {
    let manifest = synthesize_from_args(args)?.manifest();
    Ok(manifest
        .stacks_in_deployment_order()
        .into_iter()
        .map(|name| {
            let after: Vec<&str> = manifest.artifacts[name]
                .dependencies
                .iter()
                .filter(|dependency| {
                    manifest
                        .artifacts
                        .get(dependency.as_str())
                        .is_some_and(|artifact| artifact.artifact_type == STACK_ARTIFACT_TYPE)
                })
                .map(String::as_str)
                .collect();
            if after.is_empty() {
                name.to_string()
            } else {
                format!("{name} (after {})", after.join(", "))
            }
        })
        .collect())
}
