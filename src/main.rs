use anyhow::{Result, anyhow};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use ultraocr::{
    CancellationToken, Client, ClientConfig, DocumentSource, Encoding, QueryParams,
    ReqwestTransport, Submission, config, encode_base64,
};

#[derive(Parser, Debug)]
#[command(name = "ultraocr")]
#[command(about = "send documents to UltraOCR and wait for the results")]
struct Args {
    /// Client ID used to fetch tokens
    #[arg(long, env = "ULTRAOCR_CLIENT_ID")]
    client_id: String,

    /// Client secret used to fetch tokens
    #[arg(long, env = "ULTRAOCR_CLIENT_SECRET", hide_env_values = true)]
    client_secret: String,

    /// Token lifetime in minutes
    #[arg(long, env = "ULTRAOCR_TOKEN_EXPIRATION", default_value_t = config::DEFAULT_EXPIRATION_TIME)]
    token_expiration: u64,

    /// API base URL [env: ULTRAOCR_BASE_URL]
    #[arg(long)]
    base_url: Option<String>,

    /// Auth API base URL [env: ULTRAOCR_AUTH_BASE_URL]
    #[arg(long)]
    auth_base_url: Option<String>,

    /// Seconds between status checks while waiting [env: ULTRAOCR_POLL_INTERVAL]
    #[arg(long)]
    interval: Option<u64>,

    /// Seconds to wait before giving up [env: ULTRAOCR_TIMEOUT]
    #[arg(long)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct SubmitArgs {
    /// Service (document type), e.g. "rg" or "cnh"
    service: String,

    /// Document to send
    file: PathBuf,

    /// Metadata as a JSON object (JSON array for batches)
    #[arg(long)]
    metadata: Option<String>,

    /// Extra query parameters, key=value, repeatable
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Send the file base64 encoded
    #[arg(long)]
    base64: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a job through a signed upload URL
    SendJob {
        #[command(flatten)]
        submit: SubmitArgs,

        /// Selfie for facematch (sets facematch=true)
        #[arg(long)]
        facematch: Option<PathBuf>,

        /// Extra document (sets extra-document=true)
        #[arg(long)]
        extra_document: Option<PathBuf>,

        /// Wait for the job to finish and print its result
        #[arg(long)]
        wait: bool,
    },
    /// Create a batch through a signed upload URL
    SendBatch {
        #[command(flatten)]
        submit: SubmitArgs,

        /// Wait for the batch to finish
        #[arg(long)]
        wait: bool,

        /// When waiting, also wait for every job in the batch
        #[arg(long, requires = "wait")]
        wait_jobs: bool,
    },
    /// Create a job with the document inline in the request
    SendSingleStep {
        #[command(flatten)]
        submit: SubmitArgs,

        #[arg(long)]
        facematch: Option<PathBuf>,

        #[arg(long)]
        extra_document: Option<PathBuf>,
    },
    /// Fetch a job's status/result once
    Result { batch_ksuid: String, job_ksuid: String },
    /// Fetch a batch's status once
    BatchStatus { batch_ksuid: String },
    /// Poll a job until it is done
    WaitJob { batch_ksuid: String, job_ksuid: String },
    /// Poll a batch until it is done
    WaitBatch {
        batch_ksuid: String,
        #[arg(long)]
        wait_jobs: bool,
    },
    /// List jobs created in a date range (YYYY-MM-DD)
    Jobs { start: String, end: String },
    JobInfo { job_id: String },
    BatchInfo { batch_id: String },
    /// Results of every job in a batch
    BatchResult { batch_ksuid: String },
    /// Have the server write the batch results to storage and print where
    BatchResultStorage {
        batch_ksuid: String,
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
}

fn parse_param(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected key=value, got '{}'", raw))?;
    Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // logs go to stderr, stdout is for the JSON output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ultraocr=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let client = build_client(&args)?;

    // ctrl-c stops a wait cleanly instead of killing us mid-request
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling");
                cancel.cancel();
            }
        }
    });

    run(&client, args.command, &cancel).await
}

fn build_client(args: &Args) -> Result<Client> {
    // environment first, flags win
    let mut client_config = ClientConfig::from_env();
    if let Some(url) = &args.base_url {
        client_config.base_url = config::normalize_url(url);
    }
    if let Some(url) = &args.auth_base_url {
        client_config.auth_base_url = config::normalize_url(url);
    }
    if let Some(timeout) = args.timeout {
        client_config.timeout = Duration::from_secs(timeout);
    }
    if let Some(interval) = args.interval {
        client_config.interval = Duration::from_secs(interval);
    }

    tracing::info!("Using UltraOCR at {}", client_config.base_url);

    let transport = Arc::new(ReqwestTransport::new()?);
    Ok(Client::from_config(client_config, transport).with_auto_refresh(
        &args.client_id,
        &args.client_secret,
        args.token_expiration,
    ))
}

async fn run(client: &Client, command: Command, cancel: &CancellationToken) -> Result<()> {
    match command {
        Command::SendJob {
            submit,
            facematch,
            extra_document,
            wait,
        } => {
            let service = submit.service.clone();
            let submission =
                with_secondaries(build_submission(submit).await?, facematch, extra_document)
                    .await?;
            let created = client.send_job(&service, &submission).await?;
            if wait {
                print_json(
                    &client
                        .wait_for_job_done_cancellable(&created.id, &created.id, cancel)
                        .await?,
                )
            } else {
                print_json(&created)
            }
        }
        Command::SendBatch {
            submit,
            wait,
            wait_jobs,
        } => {
            let service = submit.service.clone();
            let submission = build_submission(submit).await?;
            let created = client.send_batch(&service, &submission).await?;
            if wait {
                print_json(
                    &client
                        .wait_for_batch_done_cancellable(&created.id, wait_jobs, cancel)
                        .await?,
                )
            } else {
                print_json(&created)
            }
        }
        Command::SendSingleStep {
            submit,
            facematch,
            extra_document,
        } => {
            let service = submit.service.clone();
            let submission =
                with_secondaries(build_submission(submit).await?, facematch, extra_document)
                    .await?;
            print_json(&client.send_job_single_step(&service, &submission).await?)
        }
        Command::Result {
            batch_ksuid,
            job_ksuid,
        } => print_json(&client.get_job_result(&batch_ksuid, &job_ksuid).await?),
        Command::BatchStatus { batch_ksuid } => {
            print_json(&client.get_batch_status(&batch_ksuid).await?)
        }
        Command::WaitJob {
            batch_ksuid,
            job_ksuid,
        } => print_json(
            &client
                .wait_for_job_done_cancellable(&batch_ksuid, &job_ksuid, cancel)
                .await?,
        ),
        Command::WaitBatch {
            batch_ksuid,
            wait_jobs,
        } => print_json(
            &client
                .wait_for_batch_done_cancellable(&batch_ksuid, wait_jobs, cancel)
                .await?,
        ),
        Command::Jobs { start, end } => print_json(&client.get_jobs(&start, &end).await?),
        Command::JobInfo { job_id } => print_json(&client.get_job_info(&job_id).await?),
        Command::BatchInfo { batch_id } => print_json(&client.get_batch_info(&batch_id).await?),
        Command::BatchResult { batch_ksuid } => {
            print_json(&client.get_batch_result(&batch_ksuid).await?)
        }
        Command::BatchResultStorage {
            batch_ksuid,
            params,
        } => {
            let params: QueryParams = params.into_iter().collect();
            print_json(
                &client
                    .get_batch_result_storage(&batch_ksuid, &params)
                    .await?,
            )
        }
    }
}

async fn build_submission(args: SubmitArgs) -> Result<Submission> {
    let mut submission = if args.base64 {
        // the api wants base64 text, so encode up front and flag it
        Submission::bytes(read_base64(&args.file).await?).base64()
    } else {
        Submission::file(args.file)
    };

    if let Some(raw) = args.metadata {
        let metadata: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| anyhow!("invalid --metadata JSON: {}", e))?;
        submission = submission.with_metadata(metadata);
    }

    let params: QueryParams = args.params.into_iter().collect();
    Ok(submission.with_params(params))
}

// passing a secondary file implies the matching flag, no need to also pass --param
async fn with_secondaries(
    mut submission: Submission,
    facematch: Option<PathBuf>,
    extra_document: Option<PathBuf>,
) -> Result<Submission> {
    let base64 = submission.encoding() == Encoding::Base64;

    if let Some(path) = facematch {
        submission = submission
            .with_facematch(secondary_source(path, base64).await?)
            .with_param(config::KEY_FACEMATCH, config::FLAG_TRUE);
    }
    if let Some(path) = extra_document {
        submission = submission
            .with_extra_document(secondary_source(path, base64).await?)
            .with_param(config::KEY_EXTRA, config::FLAG_TRUE);
    }
    Ok(submission)
}

async fn secondary_source(path: PathBuf, base64: bool) -> Result<DocumentSource> {
    if base64 {
        Ok(DocumentSource::bytes(read_base64(&path).await?))
    } else {
        Ok(DocumentSource::path(path))
    }
}

async fn read_base64(path: &Path) -> Result<Vec<u8>> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| anyhow!("failed to read {}: {}", path.display(), e))?;
    Ok(encode_base64(&raw).into_bytes())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
