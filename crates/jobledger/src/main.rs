//! `JobLedger` - job-application tracking from email
//!
//! Command line front end: ingest mails, confirm their labels and inspect the
//! tracked jobs.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use jobledger_core::{
    AnyNotifier, Classification, ClassificationService, Config, ConsensusExtractor, Error,
    IncomingMail, JobReconciler, JobRecord, JobRepository, Mail, MailRepository, NoopNotifier, OllamaClient,
    Triage, WebhookNotifier,
};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Service = ClassificationService<OllamaClient, AnyNotifier>;

/// Command-line arguments for jobledger
#[derive(Parser, Debug)]
#[command(name = "jobledger")]
#[command(about = "Track job applications from your inbox")]
#[command(version)]
struct Args {
    /// Configuration file (defaults to <config dir>/jobledger/config.json)
    #[arg(short, long, global = true, env = "JOBLEDGER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest a mail from a JSON file ({from, to, subject, text?, html?, date?})
    Ingest {
        /// Mail file
        file: PathBuf,
        /// Label suggested by triage
        #[arg(long, value_enum)]
        label: Option<Label>,
        /// Trust the suggested label enough to skip extraction for regular mail
        #[arg(long, requires = "label")]
        trusted: bool,
    },
    /// Confirm the label of a stored mail
    Confirm {
        /// Full hash or short id of the mail
        id: String,
        /// Confirmed label
        #[arg(value_enum)]
        label: Label,
    },
    /// List tracked jobs, most recently updated first
    Jobs {
        /// Page number, starting at 0
        #[arg(long, default_value_t = 0)]
        page: u32,
        /// Jobs per page
        #[arg(long, default_value_t = 10)]
        page_size: u32,
    },
    /// Show the most recently updated job
    Latest,
    /// List mails waiting for confirmation
    Pending {
        /// Maximum number of mails
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Show a stored mail
    Show {
        /// Full hash or short id of the mail
        id: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Label {
    /// Not about a job application
    Regular,
    /// A job application update
    Job,
}

impl From<Label> for Classification {
    fn from(label: Label) -> Self {
        match label {
            Label::Regular => Self::RegularMail,
            Label::Job => Self::JobUpdate,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jobledger=info,jobledger_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config = Config::load(args.config.as_deref())
        .await
        .context("Failed to load configuration")?;
    debug!(?config, "Configuration loaded");

    let service = open_service(&config).await?;

    match args.command {
        Command::Ingest {
            file,
            label,
            trusted,
        } => ingest(&service, &file, label, trusted).await,
        Command::Confirm { id, label } => confirm(&service, &id, label).await,
        Command::Jobs { page, page_size } => list_jobs(&service, page, page_size).await,
        Command::Latest => latest_job(&service).await,
        Command::Pending { limit } => pending(&service, limit).await,
        Command::Show { id } => show(&service, &id).await,
    }
}

/// Wire the stores, model client and notifier together.
async fn open_service(config: &Config) -> Result<Service> {
    if let Some(parent) = config.database_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let db_path = config
        .database_path
        .to_str()
        .context("Database path is not valid UTF-8")?;

    let mails = MailRepository::new(db_path)
        .await
        .with_context(|| format!("Failed to open database {db_path}"))?;
    let jobs = JobRepository::with_pool(mails.pool().clone())
        .await
        .context("Failed to prepare job tables")?;

    let client = OllamaClient::new(&config.ollama_host, config.request_timeout())
        .context("Failed to create model client")?;
    let extractor =
        ConsensusExtractor::new(client, config.model.as_str()).with_policy(config.consensus_policy());

    let notifier = match &config.webhook_url {
        Some(url) => AnyNotifier::Webhook(
            WebhookNotifier::new(url.as_str(), config.request_timeout())
                .context("Failed to create webhook client")?,
        ),
        None => AnyNotifier::Noop(NoopNotifier),
    };

    info!(
        database = %config.database_path.display(),
        model = %config.model,
        endpoint = extractor.client().endpoint(),
        notifications = config.webhook_url.is_some(),
        "JobLedger ready"
    );

    Ok(
        ClassificationService::new(extractor, JobReconciler::new(jobs), mails, notifier)
            .with_max_sessions(config.max_sessions),
    )
}

async fn ingest(service: &Service, file: &Path, label: Option<Label>, trusted: bool) -> Result<()> {
    let contents = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let incoming: IncomingMail = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not a valid mail file", file.display()))?;
    let mut mail = Mail::try_from(incoming)?;

    let triage = Triage {
        label: label.map(Into::into),
        trusted,
    };
    let transition = service.ingest(&mut mail, triage).await;

    println!("{}  {}", mail.short_id(), mail);
    println!("{}: {transition}", mail.classification.display_name());
    Ok(())
}

async fn confirm(service: &Service, id: &str, label: Label) -> Result<()> {
    let mut mail = find_mail(service, id).await?;
    let transition = service.confirm(&mut mail, label.into()).await;

    println!("{}  {}", mail.short_id(), mail);
    println!("Confirmed as {}: {transition}", mail.classification.display_name());
    Ok(())
}

async fn list_jobs(service: &Service, page: u32, page_size: u32) -> Result<()> {
    let jobs = service.reconciler().jobs();
    let total = jobs.count().await?;
    let records = jobs.list(page, page_size.max(1)).await?;

    if records.is_empty() {
        println!("No jobs on page {page} ({total} tracked)");
        return Ok(());
    }

    println!("{}", page_heading(page, page_size, total));
    for record in &records {
        print_job(record);
    }
    Ok(())
}

async fn latest_job(service: &Service) -> Result<()> {
    match service.reconciler().jobs().latest().await? {
        Some(record) => print_job(&record),
        None => println!("No jobs tracked yet"),
    }
    Ok(())
}

async fn pending(service: &Service, limit: u32) -> Result<()> {
    let mails = service.mails().list_unverified(limit).await?;
    if mails.is_empty() {
        println!("Nothing to confirm");
        return Ok(());
    }

    for mail in &mails {
        println!(
            "{}  [{}]  {}",
            mail.short_id(),
            mail.classification.display_name(),
            mail
        );
    }
    Ok(())
}

async fn show(service: &Service, id: &str) -> Result<()> {
    let mail = find_mail(service, id).await?;

    println!("Id:             {}", mail.short_id());
    println!("Hash:           {}", mail.hash);
    println!("From:           {}", mail.from);
    println!("To:             {}", mail.to);
    println!("Subject:        {}", mail.subject);
    println!("Date:           {}", format_date(&mail.received_at));
    println!(
        "Classification: {}{}",
        mail.classification.display_name(),
        if mail.verified { " (confirmed)" } else { "" }
    );
    match &mail.job {
        Some(job) => println!("Job:            {job}"),
        None if mail.parsed => println!("Job:            parsed"),
        None => println!("Job:            -"),
    }
    println!();
    println!("{}", mail.sanitized_text());
    Ok(())
}

async fn find_mail(service: &Service, id: &str) -> Result<Mail> {
    service
        .mails()
        .find_by_short_id(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("mail {id}")).into())
}

fn print_job(record: &JobRecord) {
    println!(
        "{:<10} {} - {}  (updated {}, {} mail{})",
        record.status.as_str(),
        record.key.title,
        record.key.company,
        format_date(&record.last_updated),
        record.mail_hashes.len(),
        if record.mail_hashes.len() == 1 { "" } else { "s" }
    );
    if let Some(job_id) = &record.job_id {
        println!("           id: {job_id}");
    }
    if let Some(link) = &record.link {
        println!("           {link}");
    }
}

/// Heading for one page of jobs; pages are shown counting from 1.
fn page_heading(page: u32, page_size: u32, total: u64) -> String {
    let pages = total.div_ceil(u64::from(page_size.max(1)));
    format!(
        "Jobs, page {} of {pages} ({total} tracked)",
        u64::from(page) + 1
    )
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_heading() {
        assert_eq!(page_heading(0, 10, 25), "Jobs, page 1 of 3 (25 tracked)");
        assert_eq!(page_heading(2, 0, 2), "Jobs, page 3 of 2 (2 tracked)");
    }

    #[test]
    fn test_page_heading_last_page_number() {
        assert_eq!(
            page_heading(u32::MAX, 10, 1),
            "Jobs, page 4294967296 of 1 (1 tracked)"
        );
    }
}
