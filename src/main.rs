use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::io::BufReader;

use sentiment_agent::agent::{AgentLlm, OpenAiCompatibleProvider, SentimentService};
use sentiment_agent::chat::{terminal, ChatSession, HttpAgentApi};
use sentiment_agent::core::{config, logging, Settings};
use sentiment_agent::evaluation::{self, interactive, DEFAULT_INPUT, DEFAULT_OUTPUT};
use sentiment_agent::pipelines::sentiment::{
    DeviceSelectable, SentimentAnalysisPipeline, SentimentAnalysisPipelineBuilder,
    SentimentModernBertModel,
};
use sentiment_agent::server::{self, AppState};

type Service = SentimentService<SentimentAnalysisPipeline<SentimentModernBertModel>>;

#[derive(Parser)]
#[command(
    version,
    about = "Sentiment-aware customer support agent",
    long_about = "Classifies customer messages with a ModernBERT sentiment model, asks an LLM \
                  for the next support action, evaluates the classifier on labelled CSV data \
                  and serves predictions over HTTP."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify one or more texts and print the predictions as JSON
    Classify {
        #[arg(required = true)]
        texts: Vec<String>,
    },

    /// Classify a message and ask the LLM what the agent should do next
    Advise { message: String },

    /// Run batch evaluation on a labelled CSV, then the interactive loop
    Evaluate {
        /// Labelled input CSV (columns: text, expected_sentiment)
        #[arg(long, default_value = DEFAULT_INPUT)]
        input: PathBuf,

        /// Where annotated rows are written
        #[arg(long, default_value = DEFAULT_OUTPUT)]
        output: PathBuf,

        /// Stop after the batch run
        #[arg(long)]
        no_interactive: bool,
    },

    /// Classify lines typed on stdin until 'quit' or 'exit'
    Interactive {
        #[arg(long, default_value = DEFAULT_OUTPUT)]
        output: PathBuf,
    },

    /// Chat with the support agent service
    Chat {
        /// Agent-run endpoint (defaults to AGENT_API_URL)
        #[arg(long)]
        url: Option<String>,

        /// Print each raw JSON reply before rendering it
        #[arg(long)]
        debug: bool,
    },

    /// Serve the sentiment HTTP API
    Serve {
        /// Listen address (defaults to BIND_ADDR)
        #[arg(long)]
        bind: Option<String>,
    },
}

async fn load_service(settings: &Settings) -> anyhow::Result<Service> {
    tracing::info!(model = %settings.model_name, device = settings.device.as_str(), "loading sentiment model");
    let pipeline = SentimentAnalysisPipelineBuilder::modernbert_repo(&settings.model_name)
        .device_request(settings.device.to_request())
        .build()
        .await?;
    Ok(SentimentService::new(pipeline, settings.max_tokens))
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "unable to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

async fn run_interactive(service: &Service, output: &std::path::Path) -> anyhow::Result<()> {
    println!(
        "\n{}",
        "Interactive Sentiment Classifier (ModernBERT)".bright_cyan().bold()
    );
    let stdin = interactive::detached_reader(std::io::stdin())?;
    interactive::run(service, stdin, &mut std::io::stdout(), ctrl_c(), output).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let dotenv = config::load_dotenv()?;
    let settings = Settings::from_lookup(|key| std::env::var(key).ok())?;
    logging::init(&settings.log_level)?;
    if let Some(path) = dotenv {
        tracing::debug!(path = %path.display(), "loaded .env");
    }

    match cli.command {
        Commands::Classify { texts } => {
            let service = load_service(&settings).await?;
            for prediction in service.predict_batch(&texts) {
                println!("{}", serde_json::to_string_pretty(&prediction)?);
            }
        }

        Commands::Advise { message } => {
            let service = load_service(&settings).await?;
            let prediction = service.predict(&message);
            let llm = AgentLlm::new(OpenAiCompatibleProvider::from_settings(&settings)?);
            let advice = llm
                .reason(
                    prediction.model_output.as_str(),
                    prediction.confidence_score,
                    &message,
                )
                .await?;

            println!("{} {}", "Sentiment:".bold(), prediction.model_output);
            println!("{} {}%", "Confidence:".bold(), prediction.confidence_score);
            println!("\n{}\n{advice}", "Next action:".bright_magenta().bold());
        }

        Commands::Evaluate {
            input,
            output,
            no_interactive,
        } => {
            let service = load_service(&settings).await?;
            if input.exists() {
                println!("Running batch inference on {}...", input.display());
                let result = evaluation::run_batch(&service, &input, &output)?;
                println!("\nResults saved to {}", output.display());
                println!("\n{}", result.report);
            } else {
                tracing::warn!(input = %input.display(), "input CSV not found, skipping batch run");
            }
            if !no_interactive {
                run_interactive(&service, &output).await?;
            }
        }

        Commands::Interactive { output } => {
            let service = load_service(&settings).await?;
            run_interactive(&service, &output).await?;
        }

        Commands::Chat { url, debug } => {
            let url = url.unwrap_or_else(|| settings.agent_api_url.clone());
            let api = HttpAgentApi::new(url.clone(), Duration::from_secs(settings.agent_timeout_secs))?;
            let mut session = ChatSession::new(api, settings.agent_user_id.clone());
            let stdin = BufReader::new(tokio::io::stdin());
            terminal::run(&mut session, stdin, &url, debug).await?;
        }

        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| settings.bind_addr.clone());
            let service = load_service(&settings).await?;
            server::serve(AppState::new(service, settings), &bind).await?;
        }
    }

    Ok(())
}
