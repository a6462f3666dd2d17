use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

// Import from memolint-core
use memolint_core::{
    render_text, to_json, verify_citations, CitationType, FactSanitizer, LookupStatus, MemoProcessor,
    MemoTemplate, OverallAssessment, ParseError, PlanRequest, QaReport, ValidationConfig,
    VerificationReport,
};

// Import CLI utilities
use memolint_cli::{paths, source_lookup, GuidanceSearch, PublicSourceLookup, SearchHit};

/// Every report is `ready` or `needs_revision`
const EXIT_OK: u8 = 0;
/// At least one report has `major_issues`
const EXIT_MAJOR_ISSUES: u8 = 1;
/// A memo could not be read or decoded
const EXIT_ERROR: u8 = 2;

#[derive(Parser)]
#[command(name = "memolint", version)]
#[command(about = "Validate citations and section structure of tax research memos")]
struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate citations and structure of one or more memos
    Validate(ValidateArgs),

    /// QA one memo and print the text report
    Qa {
        /// Memo to check
        file: PathBuf,

        /// Path to custom config file (YAML format)
        #[arg(short, long)]
        config: Option<String>,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a memo, then look its code, regulation, IRS guidance and
    /// OECD citations up online
    Verify {
        /// Memo to check
        file: PathBuf,

        /// Per-request timeout in seconds
        #[arg(long, default_value_t = source_lookup::DEFAULT_TIMEOUT.as_secs())]
        timeout: u64,

        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,

        /// Path to custom config file (YAML format)
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Replace confidential facts with placeholders
    Sanitize {
        /// Facts file to sanitize
        file: PathBuf,

        /// Write sanitized text here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the redaction report (JSON) here
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Client name to replace with [Client Entity A]
        #[arg(long)]
        client: Option<String>,
    },

    /// Write a blank memo with every required section, or a research plan
    Template {
        /// Matter title
        #[arg(short, long)]
        matter: String,

        /// Question presented
        #[arg(short, long)]
        question: String,

        #[arg(long)]
        author: Option<String>,

        #[arg(short, long, value_enum, default_value_t = TemplateKind::Memo)]
        kind: TemplateKind,

        /// Write the template here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a research plan seeded with sanitized facts and jurisdictions
    Plan {
        /// Matter title
        #[arg(short, long)]
        matter: String,

        /// Research question
        #[arg(short, long)]
        question: String,

        /// Sanitized facts file
        #[arg(short, long)]
        facts: Option<PathBuf>,

        /// Jurisdiction or regime involved (repeatable)
        #[arg(short, long = "jurisdiction")]
        jurisdictions: Vec<String>,

        /// Write the plan here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Search Internal Revenue Bulletin indexes on irs.gov
    SearchIrs {
        /// Term to look for in guidance titles (e.g. "951A")
        term: String,

        /// Only this bulletin year; otherwise the most recent years
        #[arg(short, long)]
        year: Option<i32>,

        /// How many recent years to search without --year
        #[arg(long, default_value_t = 5)]
        years: i32,

        #[command(flatten)]
        search: SearchArgs,
    },

    /// Search OECD Pillar Two guidance
    SearchOecd {
        /// Keyword to look for in document titles (e.g. "GloBE")
        keyword: String,

        #[command(flatten)]
        search: SearchArgs,
    },

    /// Print the default configuration as YAML
    ShowConfig,
}

#[derive(Args)]
struct ValidateArgs {
    /// Memos to validate
    #[arg(required = true)]
    files: Vec<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Path to custom config file (YAML format)
    #[arg(short, long)]
    config: Option<String>,

    /// Print per-stage timings
    #[arg(long)]
    profile: bool,

    /// Skip the report cache and validate from scratch
    #[arg(long)]
    skip_cache: bool,
}

#[derive(Args)]
struct SearchArgs {
    /// Save all hits as JSON here
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = source_lookup::DEFAULT_TIMEOUT.as_secs())]
    timeout: u64,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TemplateKind {
    Memo,
    ResearchPlan,
}

/// Hits listed on the console; `--output` keeps them all
const SEARCH_DISPLAY_LIMIT: usize = 10;

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli.command) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("❌ {e:#}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn setup_logging(verbosity: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbosity {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn run(command: Command) -> Result<u8> {
    match command {
        Command::Validate(args) => validate(args),
        Command::Qa { file, config, output } => validate(ValidateArgs {
            files: vec![file],
            format: Format::Text,
            output,
            config,
            profile: false,
            skip_cache: false,
        }),
        Command::Verify {
            file,
            timeout,
            format,
            config,
        } => verify(&file, Duration::from_secs(timeout), format, config.as_deref()),
        Command::Sanitize {
            file,
            output,
            report,
            client,
        } => sanitize(&file, output.as_deref(), report.as_deref(), client),
        Command::Template {
            matter,
            question,
            author,
            kind,
            output,
        } => {
            let template = match kind {
                TemplateKind::Memo => MemoTemplate::blank_memo(&matter, &question, author.as_deref(), None),
                TemplateKind::ResearchPlan => MemoTemplate::research_plan(&PlanRequest {
                    matter: &matter,
                    question: &question,
                    ..Default::default()
                }),
            };
            emit(&template, output.as_deref())?;
            Ok(EXIT_OK)
        }
        Command::Plan {
            matter,
            question,
            facts,
            jurisdictions,
            output,
        } => plan(&matter, &question, facts.as_deref(), &jurisdictions, output.as_deref()),
        Command::SearchIrs {
            term,
            year,
            years,
            search,
        } => {
            eprintln!("🔍 Searching IRS.gov for: {term}");
            let client = GuidanceSearch::new(Duration::from_secs(search.timeout));
            let hits = match year {
                Some(year) => client.search_irb(year, &term)?,
                None => {
                    use chrono::Datelike;
                    let current = chrono::Local::now().year();
                    client.search_irb_years((current - years.max(1) + 1..=current).rev(), &term)
                }
            };
            report_hits(&hits, search.output.as_deref())
        }
        Command::SearchOecd { keyword, search } => {
            eprintln!("🔍 Searching OECD for: {keyword}");
            let client = GuidanceSearch::new(Duration::from_secs(search.timeout));
            let hits = client.search_oecd(&keyword)?;
            report_hits(&hits, search.output.as_deref())
        }
        Command::ShowConfig => {
            print!("{}", ValidationConfig::default().to_yaml()?);
            Ok(EXIT_OK)
        }
    }
}

/// Create MemoProcessor with the report cache unless skipped
fn create_processor(config_path: Option<&str>, skip_cache: bool, profile: bool) -> Result<MemoProcessor> {
    let config = ValidationConfig::load_with_fallback(config_path);
    match config_path {
        Some(path) => eprintln!("📋 Loaded config from: {path}"),
        None => eprintln!("📋 Using default config"),
    }

    if skip_cache {
        return Ok(MemoProcessor::new(config)?.with_profiling(profile));
    }

    let cache_dir = paths::cache_dir()?;
    tracing::debug!("Report cache at {}", cache_dir.display());
    let processor = match MemoProcessor::new_with_cache(config.clone(), &cache_dir) {
        Ok(processor) => processor,
        Err(e) => {
            eprintln!("⚠️  Report cache unavailable ({e:#}), validating without it");
            MemoProcessor::new(config)?
        }
    };
    Ok(processor.with_profiling(profile))
}

fn validate(args: ValidateArgs) -> Result<u8> {
    let processor = create_processor(args.config.as_deref(), args.skip_cache, args.profile)?;

    let results = if let [file] = args.files.as_slice() {
        eprintln!("📄 Validating: {}", file.display());
        vec![processor.validate_file(file)]
    } else {
        eprintln!("📄 Validating {} memos", args.files.len());
        processor.validate_batch(&args.files)
    };

    let mut reports = Vec::with_capacity(results.len());
    let mut failed = false;
    for result in results {
        match result {
            Ok(report) => {
                print_status(&report);
                reports.push(report);
            }
            Err(e) => {
                eprintln!("❌ {e}");
                failed = true;
            }
        }
    }

    let rendered = match args.format {
        Format::Text => reports.iter().map(render_text).collect::<Vec<_>>().join("\n"),
        Format::Json => match reports.as_slice() {
            [report] => to_json(report)?,
            _ => serde_json::to_string_pretty(&reports).context("Failed to serialize reports")?,
        },
    };
    if !reports.is_empty() {
        emit(&rendered, args.output.as_deref())?;
    }

    Ok(exit_code(&reports, failed))
}

fn verify(file: &Path, timeout: Duration, format: Format, config_path: Option<&str>) -> Result<u8> {
    let processor = create_processor(config_path, false, false)?;
    eprintln!("📄 Validating: {}", file.display());
    let report = match processor.validate_file(file) {
        Ok(report) => report,
        Err(e) => return Ok(parse_failure(&e)),
    };
    print_status(&report);

    let checkable: Vec<_> = report
        .citations
        .iter()
        .filter(|citation| {
            matches!(
                citation.citation_type,
                CitationType::Irc
                    | CitationType::TreasuryReg
                    | CitationType::IrsNoticeOrRuling
                    | CitationType::Oecd
            )
        })
        .cloned()
        .collect();
    eprintln!("🔎 Looking up {} citations (timeout {}s)", checkable.len(), timeout.as_secs());

    let lookup = PublicSourceLookup::new(timeout);
    let verification = verify_citations(&report.document_id, &checkable, &lookup);

    match format {
        Format::Json => {
            let json = serde_json::to_string_pretty(&verification)
                .context("Failed to serialize verification report")?;
            println!("{json}");
        }
        Format::Text => print!("{}", render_verification(&verification)),
    }

    Ok(exit_code(std::slice::from_ref(&report), false))
}

fn render_verification(verification: &VerificationReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "CITATION LOOKUP: {} ({})\n",
        verification.document_id,
        verification.checked_at.format("%Y-%m-%d %H:%M UTC")
    ));
    for entry in &verification.entries {
        let glyph = match entry.status {
            LookupStatus::Exists => "✓",
            LookupStatus::NotFound => "✗",
            LookupStatus::Unknown => "?",
        };
        out.push_str(&format!("  {glyph} {} ({})", entry.raw_text, entry.section));
        if let Some(url) = &entry.source_url {
            out.push_str(&format!(" {url}"));
        }
        if let Some(note) = &entry.note {
            out.push_str(&format!(" [{note}]"));
        }
        out.push('\n');
    }
    out.push_str(&format!(
        "{} found, {} not found, {} unknown\n",
        verification.exists, verification.not_found, verification.unknown
    ));
    out
}

fn plan(
    matter: &str,
    question: &str,
    facts_path: Option<&Path>,
    jurisdictions: &[String],
    output: Option<&Path>,
) -> Result<u8> {
    let facts = match facts_path {
        Some(path) => Some(fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?),
        None => {
            eprintln!("💡 Pass --facts with a sanitized facts file to fill in section 2");
            None
        }
    };
    let plan = MemoTemplate::research_plan(&PlanRequest {
        matter,
        question,
        jurisdictions,
        facts: facts.as_deref(),
        date: None,
    });
    emit(&plan, output)?;
    Ok(EXIT_OK)
}

fn report_hits(hits: &[SearchHit], output: Option<&Path>) -> Result<u8> {
    if hits.is_empty() {
        eprintln!("   No results found");
        return Ok(EXIT_OK);
    }
    eprintln!("✓ Found {} results", hits.len());
    for (i, hit) in hits.iter().take(SEARCH_DISPLAY_LIMIT).enumerate() {
        println!("{:>3}. {}", i + 1, hit.title);
        println!("     {}", hit.url);
        match hit.year {
            Some(year) => println!("     {} ({year})", hit.kind.label()),
            None => println!("     {}", hit.kind.label()),
        }
    }
    if let Some(path) = output {
        let json = serde_json::to_string_pretty(hits).context("Failed to serialize search results")?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        eprintln!("💾 Results saved to: {}", path.display());
    }
    Ok(EXIT_OK)
}

fn sanitize(file: &Path, output: Option<&Path>, report_path: Option<&Path>, client: Option<String>) -> Result<u8> {
    let text = fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;

    let mut sanitizer = FactSanitizer::new();
    if let Some(client) = client {
        sanitizer = sanitizer.with_client(client);
    }
    let (sanitized, redactions) = sanitizer.sanitize(&text);

    eprintln!("🔒 {} redactions", redactions.total_redactions);
    eprintln!("   - Entities: {}", redactions.entities_redacted);
    eprintln!("   - People: {}", redactions.people_redacted);
    eprintln!("   - Amounts: {}", redactions.amounts_redacted);
    eprintln!("   - Emails: {}", redactions.emails_redacted);
    eprintln!("   - Dates: {}", redactions.dates_redacted);

    emit(&sanitized, output)?;
    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&redactions).context("Failed to serialize redaction report")?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        eprintln!("💾 Redaction report saved to: {}", path.display());
    }
    Ok(EXIT_OK)
}

fn print_status(report: &QaReport) {
    let glyph = match report.overall_assessment {
        OverallAssessment::Ready => "✅",
        OverallAssessment::NeedsRevision => "⚠️ ",
        OverallAssessment::MajorIssues => "❌",
    };
    eprintln!(
        "{glyph} {}: {} ({}/{} checks passed, {} citations)",
        report.document_id, report.overall_assessment, report.checks_passed, report.checks_total, report.total_citations
    );
}

fn parse_failure(e: &ParseError) -> u8 {
    eprintln!("❌ {e}");
    EXIT_ERROR
}

fn exit_code(reports: &[QaReport], failed: bool) -> u8 {
    if failed {
        EXIT_ERROR
    } else if reports
        .iter()
        .any(|report| report.overall_assessment == OverallAssessment::MajorIssues)
    {
        EXIT_MAJOR_ISSUES
    } else {
        EXIT_OK
    }
}

/// Write to a file, or stdout when no path is given
fn emit(content: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("💾 Saved to: {}", path.display());
        }
        None if content.ends_with('\n') => print!("{content}"),
        None => println!("{content}"),
    }
    Ok(())
}
