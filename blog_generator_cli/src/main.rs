use blog_generator_cli::{
    config::{GeneratorConfig, PipelineConfig},
    pipeline::BatchPipeline,
    remote::RemoteBlogClient,
    submission, utils, Batch, BatchResult,
};
use clap::Parser;
use dotenv::dotenv;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate blog posts from selected paragraphs of web pages", long_about = None)]
struct Args {
    /// URL to scrape (repeat for several blogs)
    #[arg(short, long = "url")]
    urls: Vec<String>,

    /// Comma-separated paragraph indices for the matching --url
    #[arg(short, long = "indices")]
    indices: Vec<String>,

    /// File with one URL per line
    #[arg(long, conflicts_with = "urls")]
    urls_file: Option<PathBuf>,

    /// File with one comma-separated index set per line
    #[arg(long, conflicts_with = "indices")]
    indices_file: Option<PathBuf>,

    /// Target number of words for each blog
    #[arg(short, long, default_value_t = 400)]
    words: u32,

    /// Maximum number of jobs processed at once
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Attempts per stage for transient failures
    #[arg(long)]
    retries: Option<u32>,

    /// Directory for blog_post_N.txt files and results.json
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Send the batch to a running server instead of generating locally
    #[arg(long)]
    remote: Option<String>,

    /// Print the full result as JSON instead of a report
    #[arg(long)]
    json: bool,
}

impl Args {
    fn batch(&self) -> blog_generator_cli::Result<Batch> {
        match (&self.urls_file, &self.indices_file) {
            (Some(urls), Some(indices)) => submission::from_lines(
                &std::fs::read_to_string(urls)?,
                &std::fs::read_to_string(indices)?,
                self.words,
            ),
            (None, None) => submission::build_batch(&self.urls, &self.indices, self.words),
            _ => Err(blog_generator_cli::Error::validation(
                "--urls-file and --indices-file must be used together",
            )),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(result) if result.failure_count() == 0 => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(2),
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> blog_generator_cli::Result<BatchResult> {
    let batch = args.batch()?;
    if batch.is_empty() {
        return Err(blog_generator_cli::Error::validation("no URLs given"));
    }

    let mut config = PipelineConfig::from_env()?;
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(retries) = args.retries {
        config.retry.max_attempts = retries;
    }
    config.validate()?;

    let result = match &args.remote {
        Some(base_url) => {
            let timeout = config
                .batch_timeout
                .unwrap_or(config.fetch_timeout + config.generation_timeout * batch.len() as u32);
            RemoteBlogClient::new(base_url, timeout)?.generate(&batch).await?
        }
        None => {
            let generator = GeneratorConfig::from_env()?.build(config.generation_timeout)?;
            let pipeline = BatchPipeline::from_config(config, generator)?;

            let cancel = CancellationToken::new();
            let on_ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received, cancelling batch");
                    on_ctrl_c.cancel();
                }
            });

            println!("⏳ Generating {} blog(s)...", batch.len());
            pipeline.run_with_cancel(batch, cancel).await?
        }
    };

    std::fs::create_dir_all(&args.output_dir)?;
    utils::save_json(&result, &args.output_dir.join("results.json"))?;
    let written = utils::write_blog_files(&result, &args.output_dir)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", utils::render_report(&result));
        for path in &written {
            println!("✅ {} created.", path.display());
        }
    }
    tracing::debug!(elapsed = ?(result.finished_at - result.started_at).to_std().unwrap_or(Duration::ZERO), "done");

    Ok(result)
}
