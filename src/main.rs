use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use axum::http::HeaderName;
use chrono::{FixedOffset, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use student_id_portal::config::{self, ProxyRule, ServerConfig};
use student_id_portal::export::ExportFormat;
use student_id_portal::source::{FileRecordSource, HttpRecordSource, RecordSource, SourceQuery};
use student_id_portal::view::{self, FilterSortConfig, RecordViewModel, SortDirection, SortKey};
use student_id_portal::{export, report, server, stats, submission};

#[derive(Parser)]
#[command(name = "student-id-portal")]
#[command(about = "Student ID card submissions: dashboard views, exports and the frontend server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Origin of the student records backend
    #[arg(long, env = "PORTAL_API_BASE", default_value = config::DEFAULT_UPSTREAM)]
    api_base: String,
    /// Bearer token sent with authenticated requests
    #[arg(long, env = "PORTAL_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// Read records from a JSON snapshot instead of the backend
    #[arg(long)]
    from_file: Option<PathBuf>,
    /// Records requested per fetch
    #[arg(long, default_value_t = 100)]
    fetch_size: u32,
    /// Reference time zone for "today" and exported times
    #[arg(long, env = "PORTAL_UTC_OFFSET", default_value = "+00:00", value_parser = config::parse_utc_offset)]
    utc_offset: FixedOffset,
}

#[derive(Args)]
struct FilterArgs {
    /// Case-insensitive name search
    #[arg(long, default_value = "")]
    search: String,
    /// Exact section
    #[arg(long, default_value = "")]
    section: String,
    /// Exact study type
    #[arg(long, default_value = "")]
    study_type: String,
    #[arg(long, value_enum, default_value_t = SortKey::SubmittedAt)]
    sort: SortKey,
    #[arg(long, value_enum, default_value_t = SortDirection::Descending)]
    order: SortDirection,
}

impl FilterArgs {
    fn to_config(&self) -> FilterSortConfig {
        let mut config = FilterSortConfig::default();
        config.set_search_term(self.search.as_str());
        config.set_section_filter(self.section.as_str());
        config.set_study_type_filter(self.study_type.as_str());
        config.set_sort_key(self.sort);
        config.set_sort_direction(self.order);
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the built frontend and proxy backend routes
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: IpAddr,
        #[arg(long, env = "PORT", default_value_t = 3000)]
        port: u16,
        /// Directory holding the built single-page app
        #[arg(long, default_value = "dist")]
        static_dir: PathBuf,
        /// Upstream for the default /api and /student rules
        #[arg(long, env = "PORTAL_API_BASE", default_value = config::DEFAULT_UPSTREAM)]
        upstream: String,
        /// Proxy rule as /prefix=https://origin (repeatable, replaces the defaults)
        #[arg(long = "proxy")]
        proxy: Vec<ProxyRule>,
        /// Request header forwarded upstream (repeatable, replaces the defaults)
        #[arg(long = "forward-header", value_parser = config::parse_header_name)]
        forward_headers: Vec<HeaderName>,
    },
    /// Print one page of the filtered submissions
    List {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value_t = 1)]
        page: usize,
        /// Rows per page (1-1000)
        #[arg(long, default_value = "10")]
        page_size: String,
    },
    /// Print dashboard counters
    Stats {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Export the filtered submissions to a dated spreadsheet
    Export {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        #[arg(long, value_enum, default_value_t = ExportFormat::Xlsx)]
        format: ExportFormat,
        /// File name stem; the date is appended
        #[arg(long)]
        stem: Option<String>,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Show one student's stored submission and what is still missing
    Lookup {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long)]
        exam_code: String,
    },
}

async fn load_model(
    args: &SourceArgs,
    client: &reqwest::Client,
    config: FilterSortConfig,
) -> RecordViewModel {
    let mut model = RecordViewModel::new(config);
    let query = SourceQuery {
        page: None,
        page_size: Some(args.fetch_size),
        sort: Some("time_desc".to_string()),
    };

    let ticket = model.begin_fetch();
    let outcome = match &args.from_file {
        Some(path) => FileRecordSource::new(path).fetch(&query).await,
        None => {
            HttpRecordSource::new(client.clone(), &args.api_base, args.token.clone())
                .fetch(&query)
                .await
        }
    };
    model.accept_fetch(ticket, outcome);

    if let Some(error) = model.last_error() {
        eprintln!("Could not load records ({error}); showing an empty list.");
    }
    model
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("student_id_portal=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::builder()
        .user_agent(concat!("student-id-portal/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .build()
        .context("failed to build HTTP client")?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            static_dir,
            upstream,
            proxy,
            forward_headers,
        } => {
            let rules = if proxy.is_empty() {
                config::default_rules(&upstream)
            } else {
                proxy
            };
            let forward_headers = if forward_headers.is_empty() {
                config::DEFAULT_FORWARD_HEADERS
                    .iter()
                    .map(|name| HeaderName::from_static(*name))
                    .collect()
            } else {
                forward_headers
            };

            server::serve(
                ServerConfig {
                    listen: SocketAddr::new(host, port),
                    static_dir,
                    rules,
                    forward_headers,
                },
                client,
            )
            .await
            .context("server stopped")?;
        }
        Commands::List {
            source,
            filters,
            page,
            page_size,
        } => {
            let mut config = filters.to_config();
            if let Err(error) = config.set_page_size_input(&page_size) {
                warn!(%error, kept = config.page_size(), "ignoring page size");
                eprintln!("{error}; keeping {} rows per page.", config.page_size());
            }
            config.set_current_page(page);

            let model = load_model(&source, &client, config).await;
            let filtered = model.view();
            let slice = view::paginate(
                &filtered,
                model.config().current_page(),
                model.config().page_size(),
            );

            println!(
                "Showing {} of {} students.",
                filtered.len(),
                model.records().len()
            );
            if slice.items.is_empty() {
                println!("No students match these filters.");
            }
            for (offset, record) in slice.items.iter().enumerate() {
                println!(
                    "{:>4}. {} ({}) {} / {} submitted {}",
                    slice.start_index + offset + 1,
                    record.name,
                    record.exam_code,
                    record.section,
                    record.study_type,
                    record.submitted_at.as_deref().unwrap_or("-")
                );
            }
            println!(
                "Page {} of {} (rows {}-{}).",
                slice.page_number,
                slice.total_pages,
                if slice.total_items == 0 { 0 } else { slice.start_index + 1 },
                slice.end_index
            );
        }
        Commands::Stats { source } => {
            let model = load_model(&source, &client, FilterSortConfig::default()).await;
            let stats = stats::compute_statistics(model.records(), Utc::now(), &source.utc_offset);

            println!("Submitted students: {}", stats.total);
            println!("Sections: {}", stats.distinct_sections);
            println!("Submitted today: {}", stats.submitted_today);
        }
        Commands::Export {
            source,
            filters,
            out_dir,
            format,
            stem,
        } => {
            let model = load_model(&source, &client, filters.to_config()).await;
            let filtered = model.view();
            let (selection, default_stem) = export::export_selection(model.records(), &filtered);
            let rows = export::build_export_rows(&selection, &source.utc_offset);
            let today = Utc::now().with_timezone(&source.utc_offset).date_naive();

            let path = export::export_rows(
                rows,
                out_dir,
                stem.unwrap_or_else(|| default_stem.to_string()),
                today,
                format,
            )
            .await?;
            println!("Exported {} students to {}.", selection.len(), path.display());
        }
        Commands::Report {
            source,
            filters,
            out,
        } => {
            let model = load_model(&source, &client, filters.to_config()).await;
            let now = Utc::now();
            let stats = stats::compute_statistics(model.records(), now, &source.utc_offset);
            let report = report::build_report(
                model.config(),
                &stats,
                &model.view(),
                now,
                &source.utc_offset,
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Lookup { source, exam_code } => {
            let backend = HttpRecordSource::new(client, &source.api_base, source.token);
            let lookup = backend
                .lookup(&exam_code)
                .await
                .with_context(|| format!("failed to look up exam code {exam_code}"))?;
            let draft = submission::SubmissionDraft::from_lookup(&lookup);

            println!("Exam code: {exam_code}");
            println!("Section: {}", lookup.section.as_deref().unwrap_or("-"));
            println!("Study type: {}", lookup.study_type.as_deref().unwrap_or("-"));
            println!("Birth date: {}", lookup.birth_date.as_deref().unwrap_or("-"));
            println!("Photo: {}", draft.image().unwrap_or("-"));

            let missing = draft.readiness();
            if missing.is_empty() {
                println!("Submission complete.");
            } else {
                for item in missing {
                    println!("Missing: {}", item.describe());
                }
            }
        }
    }

    Ok(())
}
