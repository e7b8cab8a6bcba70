use chrono::Utc;
use clap::{Parser, Subcommand};
use resume_search_core::{
    discover_resume_files, object_path_for, AnswerOptions, Clients, IngestOutcome, PipelineConfig,
    QueryFilter, TokenSource,
};
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "resume-search", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Embedding service base URL
    #[arg(long, env = "RESUME_EMBEDDING_ENDPOINT", default_value = "http://localhost:9001")]
    embedding_endpoint: String,

    /// Embedding model resource name
    #[arg(long, env = "RESUME_EMBEDDING_MODEL", default_value = "models/embedding-001")]
    embedding_model: String,

    /// Generative model service base URL
    #[arg(long, env = "RESUME_MODEL_ENDPOINT", default_value = "http://localhost:9002")]
    model_endpoint: String,

    /// Generative model resource name
    #[arg(long, env = "RESUME_MODEL_NAME", default_value = "models/generative-001")]
    model_name: String,

    /// Vector index service base URL
    #[arg(long, env = "RESUME_VECTOR_ENDPOINT", default_value = "http://localhost:9003")]
    vector_endpoint: String,

    /// Index resource used for datapoint writes
    #[arg(long, env = "RESUME_VECTOR_INDEX", default_value = "indexes/resumes")]
    vector_index: String,

    /// Index endpoint resource used for queries
    #[arg(long, env = "RESUME_VECTOR_INDEX_ENDPOINT", default_value = "indexEndpoints/resumes")]
    vector_index_endpoint: String,

    /// Deployed index id inside the index endpoint
    #[arg(long, env = "RESUME_DEPLOYED_INDEX", default_value = "resumes_deployed")]
    deployed_index: String,

    /// Candidate record store base URL
    #[arg(long, env = "RESUME_STORE_ENDPOINT", default_value = "http://localhost:9004")]
    store_endpoint: String,

    /// Candidate record collection name
    #[arg(long, env = "RESUME_STORE_COLLECTION", default_value = "candidates")]
    store_collection: String,

    /// Fixed bearer token for the remote services
    #[arg(long, env = "RESUME_AUTH_TOKEN")]
    auth_token: Option<String>,

    /// URL that returns {"access_token", "expires_in"}; used when no fixed token is set
    #[arg(long, env = "RESUME_TOKEN_URL")]
    token_url: Option<String>,

    /// Embedding dimensionality; must match the deployed index
    #[arg(long, default_value = "768")]
    dimensions: usize,

    /// Per-request timeout in seconds for all remote calls
    #[arg(long, default_value = "30")]
    request_timeout_secs: u64,
}

impl Cli {
    fn pipeline_config(&self) -> PipelineConfig {
        let token = if let Some(token) = &self.auth_token {
            TokenSource::Static(token.clone())
        } else if let Some(url) = &self.token_url {
            TokenSource::Url(url.clone())
        } else {
            TokenSource::None
        };

        PipelineConfig {
            embedding_endpoint: self.embedding_endpoint.clone(),
            embedding_model: self.embedding_model.clone(),
            model_endpoint: self.model_endpoint.clone(),
            model_name: self.model_name.clone(),
            vector_endpoint: self.vector_endpoint.clone(),
            vector_index: self.vector_index.clone(),
            vector_index_endpoint: self.vector_index_endpoint.clone(),
            deployed_index: self.deployed_index.clone(),
            store_endpoint: self.store_endpoint.clone(),
            store_collection: self.store_collection.clone(),
            token,
            dimensions: self.dimensions,
            request_timeout_secs: self.request_timeout_secs,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a folder of resume PDFs for one recruiter batch.
    Ingest {
        /// Folder that contains resume PDFs, searched recursively.
        #[arg(long)]
        folder: String,
        /// Recruiter tenant id the batch belongs to.
        #[arg(long)]
        recruiter_uuid: String,
        /// Batch tag, e.g. an upload date or campaign name.
        #[arg(long)]
        batch_tag: String,
    },
    /// Ask a question over previously ingested resumes.
    Ask {
        /// Recruiter question in plain language.
        #[arg(long)]
        query: String,
        /// Restrict the search to one recruiter tenant.
        #[arg(long)]
        recruiter_uuid: Option<String>,
        /// Restrict the search to one ingestion batch.
        #[arg(long)]
        batch_tag: Option<String>,
        /// Number of candidate records to ground the answer on.
        #[arg(long, default_value = "5")]
        top_k: usize,
        /// Print the best candidate's stored profile under the answer.
        #[arg(long, default_value_t = false)]
        show_profile: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let clients = Clients::build(&cli.pipeline_config())
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "resume-search boot"
    );

    match cli.command {
        Command::Ingest {
            folder,
            recruiter_uuid,
            batch_tag,
        } => {
            let base = Path::new(&folder);
            let files = discover_resume_files(base);
            if files.is_empty() {
                println!("no pdf files found in {folder}");
                return Ok(());
            }

            let ingestor = clients.ingestor();
            let mut ingested = 0usize;
            let mut skipped = 0usize;
            let mut failed = 0usize;

            for file in files {
                let object_path = object_path_for(&recruiter_uuid, &batch_tag, &file, base);
                let bytes = match std::fs::read(&file) {
                    Ok(bytes) => bytes,
                    Err(error) => {
                        warn!(path = %file.display(), %error, "skipping unreadable file");
                        failed += 1;
                        continue;
                    }
                };

                match ingestor.ingest_object(&object_path, &bytes).await {
                    Ok(IngestOutcome::Ingested {
                        candidate_id,
                        chunks_indexed,
                    }) => {
                        ingested += 1;
                        println!(
                            "ingested {} -> {candidate_id} ({chunks_indexed} chunks)",
                            file.display()
                        );
                    }
                    Ok(IngestOutcome::Skipped { reason }) => {
                        skipped += 1;
                        println!("skipped {}: {reason}", file.display());
                    }
                    Err(error) => {
                        failed += 1;
                        warn!(path = %file.display(), %error, "ingestion failed");
                        println!("failed {}: {error}", file.display());
                    }
                }
            }

            println!(
                "{ingested} ingested, {skipped} skipped, {failed} failed at {}",
                Utc::now().to_rfc3339()
            );
        }
        Command::Ask {
            query,
            recruiter_uuid,
            batch_tag,
            top_k,
            show_profile,
        } => {
            let filter = QueryFilter {
                recruiter_uuid,
                batch_tag,
            };
            let options = AnswerOptions { top_k };

            match clients.ask(&query, &filter, &options).await {
                Ok(report) => {
                    if report.degraded {
                        println!("note: this answer was assembled without model validation");
                    }
                    println!("{}", report.answer.text);
                    if let Some(best) = &report.answer.best_candidate_id {
                        println!("best candidate: {best}");
                        if show_profile {
                            print_profile(&clients, best).await;
                        }
                    }
                }
                Err(error) => {
                    warn!(%error, "query failed");
                    println!("no answer is available right now, please try again");
                }
            }
        }
    }

    Ok(())
}

async fn print_profile(clients: &Clients, candidate_id: &str) {
    match clients.store.fetch(candidate_id).await {
        Ok(Some(record)) => {
            println!("  name: {}", record.profile.name);
            if !record.profile.email.is_empty() {
                println!("  email: {}", record.profile.email);
            }
            if !record.profile.skills.is_empty() {
                println!("  skills: {}", record.profile.skills.join(", "));
            }
            println!("  experience: {} years", record.profile.experience_years());
            println!("  source: {}", record.source_path);
        }
        Ok(None) => println!("  profile record not found"),
        Err(error) => warn!(%error, "could not fetch the best candidate's profile"),
    }
}
