use std::path::PathBuf;

use alb_monitor_app::adapters::asset_store::AssetStore;
use alb_monitor_app::commands::{check_env, publish, synth};
use alb_monitor_core::app::StackEnvironment;
use aws_sdk_s3::primitives::ByteStream;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "alb-monitor",
    about = "Synthesize and publish the ALB target group monitor stacks",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the cloud assembly (templates, manifests, staged assets)
    Synth {
        #[command(flatten)]
        args: synth::SynthArgs,
        /// Output directory
        #[arg(short, long, default_value = "cdk.out")]
        output: PathBuf,
    },
    /// List stacks in deployment order
    List {
        #[command(flatten)]
        args: synth::SynthArgs,
    },
    /// Upload staged assets to the bootstrap bucket
    Publish {
        /// Cloud assembly directory produced by `synth`
        #[arg(long, default_value = "cdk.out")]
        assembly: PathBuf,
        #[arg(long, env = "CDK_DEFAULT_ACCOUNT")]
        account: String,
        #[arg(long, env = "CDK_DEFAULT_REGION")]
        region: String,
    },
    /// Validate the controller environment of the current process
    CheckEnv,
}

struct S3AssetStore {
    s3_client: aws_sdk_s3::Client,
}

impl AssetStore for S3AssetStore {
    fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, String> {
        let bucket = bucket.to_string();
        let object_key = key.to_string();
        let client = self.s3_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                match client.head_object().bucket(bucket).key(object_key).send().await {
                    Ok(_) => Ok(true),
                    Err(error)
                        if error
                            .as_service_error()
                            .map(|service_error| service_error.is_not_found())
                            .unwrap_or(false) =>
                    {
                        Ok(false)
                    }
                    Err(error) => Err(format!("failed to check object in s3: {error}")),
                }
            })
        })
    }

    fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), String> {
        let bucket = bucket.to_string();
        let object_key = key.to_string();
        let body_bytes = body.to_vec();
        let client = self.s3_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                client
                    .put_object()
                    .bucket(bucket)
                    .key(object_key)
                    .body(ByteStream::from(body_bytes))
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| format!("failed to write object to s3: {error}"))
            })
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("alb_monitor=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Synth { args, output } => {
            let manifest = synth::run(&args, &output)?;
            println!("{}", manifest.display());
        }
        Commands::List { args } => {
            for line in synth::list(&args)? {
                println!("{line}");
            }
        }
        Commands::Publish {
            assembly,
            account,
            region,
        } => {
            let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                .region(aws_config::Region::new(region.clone()))
                .load()
                .await;
            let store = S3AssetStore {
                s3_client: aws_sdk_s3::Client::new(&aws_config),
            };
            let environment = StackEnvironment { account, region };
            let report = publish::publish_assets(&assembly, &environment, &store)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::CheckEnv => {
            println!("{}", check_env::run()?);
        }
    }

    Ok(())
}
