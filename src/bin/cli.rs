use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use rxlookup::auth::{AccessToken, TokenPair};
use rxlookup::cookbook::{walk_to_price, Walk};
use rxlookup::prelude::*;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rxcli")]
#[command(about = "Pharmacy pricing CLI - look up insurance selections, drugs and net prices", long_about = None)]
struct Cli {
    /// Use the built-in sample catalog instead of the pricing API
    #[arg(long, global = true)]
    mock: bool,
    /// Path to a TOML config file (defaults to the user config, then environment)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Refresh token used when the config enables authentication
    #[arg(long, global = true, env = "RXLOOKUP_REFRESH_TOKEN", hide_env_values = true)]
    refresh_token: Option<String>,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search BINs by code or carrier name
    Bins { text: String },
    /// List the PCNs under a BIN
    Pcns { bin_id: i64 },
    /// List the RxGroups under a PCN
    RxGroups { pcn_id: i64 },
    /// Search drugs by name
    Drugs(DrugsArgs),
    /// Search drug classes by name
    Classes(ClassesArgs),
    /// Net price of an NDC under one insurance id (0 for no insurance)
    Price { ndc: String, insurance_id: i64 },
    /// Compare an NDC's net price across insurance ids
    Compare(CompareArgs),
    /// Alternatives for an NDC, split into insured and uninsured tables
    Alternatives(AlternativesArgs),
    /// Walk the full selection chain and price the first matching NDC
    Walk(WalkArgs),
}

#[derive(Args)]
struct ScopeArgs {
    /// Limit results to an RxGroup
    #[arg(long, conflicts_with_all = ["pcn", "bin"])]
    rx_group: Option<i64>,
    /// Limit results to a PCN
    #[arg(long, conflicts_with = "bin")]
    pcn: Option<i64>,
    /// Limit results to a BIN
    #[arg(long)]
    bin: Option<i64>,
}

impl ScopeArgs {
    fn scope(&self) -> Option<InsuranceScope> {
        self.rx_group
            .map(InsuranceScope::RxGroup)
            .or(self.pcn.map(InsuranceScope::Pcn))
            .or(self.bin.map(InsuranceScope::Bin))
    }
}

#[derive(Args)]
struct DrugsArgs {
    text: String,
    #[command(flatten)]
    scope: ScopeArgs,
    /// Page number, starting at 1
    #[arg(long, default_value_t = 1)]
    page: u32,
}

#[derive(Args)]
struct ClassesArgs {
    text: String,
    #[command(flatten)]
    scope: ScopeArgs,
    /// Classification version tag
    #[arg(long)]
    version: Option<String>,
    #[arg(long, default_value_t = 1)]
    page: u32,
}

#[derive(Args)]
struct CompareArgs {
    ndc: String,
    /// Insurance ids, optionally labelled as LABEL=ID
    #[arg(required = true)]
    insurance: Vec<String>,
}

#[derive(Args)]
struct AlternativesArgs {
    ndc: String,
    /// Write both tables to a .json, .jsonl or .csv file
    #[arg(long)]
    export: Option<PathBuf>,
}

#[derive(Args)]
struct WalkArgs {
    /// BIN code or carrier name
    #[arg(long, default_value = "610591")]
    bin: String,
    #[arg(long, default_value = "CMK")]
    pcn: String,
    #[arg(long, default_value = "CMK-STD")]
    rx_group: String,
    #[arg(long, default_value = "Atorvastatin")]
    drug: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match cli.config.as_deref() {
        Some(path) => RxConfig::from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => RxConfig::load(),
    };
    let api = backend(&cli, &config)?;
    let json = cli.json;

    match cli.command {
        Commands::Bins { text } => {
            let bins = with_spinner("Searching BINs", api.search_bins(&text)).await?;
            emit(json, &bins, |bin| format!("{:>6} | {} | {}", bin.id, bin.code, bin.display_name()))?;
        }
        Commands::Pcns { bin_id } => {
            let pcns = with_spinner("Loading PCNs", api.pcns_for_bin(bin_id)).await?;
            emit(json, &pcns, |pcn| format!("{:>6} | {}", pcn.id, pcn.code))?;
        }
        Commands::RxGroups { pcn_id } => {
            let groups = with_spinner("Loading RxGroups", api.rx_groups_for_pcn(pcn_id)).await?;
            emit(json, &groups, |group| format!("{:>6} | {}", group.id, group.name))?;
        }
        Commands::Drugs(args) => {
            let request = lookup_request(&args.text, args.page, args.scope.scope(), &config);
            let drugs = with_spinner("Searching drugs", api.search_drugs(&request)).await?;
            emit(json, &drugs, |drug| format!("{} | {}", drug.ndc, drug.label()))?;
        }
        Commands::Classes(args) => {
            let request = lookup_request(&args.text, args.page, args.scope.scope(), &config);
            let version = args.version.map(ClassVersion).unwrap_or_default();
            let classes = with_spinner("Searching drug classes", api.search_drug_classes(&request, &version)).await?;
            emit(json, &classes, |class| format!("{:>6} | {} ({})", class.id, class.name, class.version_tag))?;
        }
        Commands::Price { ndc, insurance_id } => {
            let ndc = Ndc::new(&ndc)?;
            let quote = with_spinner("Pricing", api.pricing_detail(&ndc, insurance_id)).await?;
            let state = match quote {
                Some(quote) => QuoteState::Ready(quote),
                None => QuoteState::Unavailable(UnavailableReason::NotPriced),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&state.quote())?);
            } else {
                println!("{} under {}: {}", ndc, insurance_id, state.display());
            }
        }
        Commands::Compare(args) => {
            let ndc = Ndc::new(&args.ndc)?;
            let insurance = args
                .insurance
                .iter()
                .map(|raw| parse_insurance(raw))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let comparison = with_spinner("Comparing", InsuranceComparison::collect(&api, ndc, &insurance)).await;
            emit(json, comparison.rows(), |row| {
                format!("{:>8} | {} ({})", price_text(row.net_price), row.label, row.insurance_id)
            })?;
            if let Some(spread) = comparison.spread() {
                eprintln!("Spread: ${}", spread.round_dp(2));
            }
        }
        Commands::Alternatives(args) => {
            let ndc = Ndc::new(&args.ndc)?;
            let rows = with_spinner("Loading alternatives", api.alternatives(&ndc)).await?;
            let view = split_alternatives(rows);
            if let Some(path) = args.export.as_deref() {
                let format = view.export(path)?;
                println!("Exported {} rows as {:?} to {}", view.len(), format, path.display());
            } else if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                print_alternatives(&view);
            }
        }
        Commands::Walk(args) => {
            let mut session = SearchSession::new(api, &config);
            let walk = Walk { bin: &args.bin, pcn: &args.pcn, rx_group: &args.rx_group, drug: &args.drug };
            let quote = walk_to_price(&mut session, &walk).await?;
            let chain = session.chain();
            if let (Some(bin), Some(pcn), Some(group)) = (chain.bin(), chain.pcn(), chain.rx_group()) {
                println!("Insurance: {} / {} / {}", bin.display_name(), pcn.code, group.name);
            }
            if let Some(drug) = chain.drug() {
                println!("Drug:      {}", drug.label());
            }
            let options: Vec<String> = chain.ndc_options().iter().map(|ndc| ndc.to_string()).collect();
            println!("NDCs:      {}", options.join(", "));
            println!("Net price: {}", quote.display());
        }
    }
    Ok(())
}

fn backend(cli: &Cli, config: &RxConfig) -> anyhow::Result<Arc<dyn PricingApi>> {
    if cli.mock {
        return Ok(Arc::new(MockPricingApi::sample()));
    }
    let store: Option<Arc<dyn TokenStore>> = match (config.auth.enabled, cli.refresh_token.as_deref()) {
        (false, _) => None,
        (true, Some(refresh)) => {
            // An already-expired access token makes the first request refresh
            let pair = TokenPair {
                access: AccessToken::new("", Some(chrono::Utc::now())),
                refresh_token: refresh.to_string(),
            };
            Some(Arc::new(MemoryTokenStore::with_pair(pair)))
        }
        (true, None) => bail!("authentication is enabled but no refresh token was given (use --refresh-token or RXLOOKUP_REFRESH_TOKEN)"),
    };
    Ok(Arc::new(HttpPricingApi::new(config.clone(), store)?))
}

fn lookup_request(text: &str, page: u32, scope: Option<InsuranceScope>, config: &RxConfig) -> LookupRequest {
    let mut cursor = rxlookup::pagination::Cursor::first();
    for _ in 1..page.max(1) {
        cursor = cursor.next();
    }
    let request = LookupRequest::new(text.trim(), config.page_size).page(cursor);
    match scope {
        Some(scope) => request.scoped(scope),
        None => request,
    }
}

fn parse_insurance(raw: &str) -> anyhow::Result<(String, i64)> {
    let (label, id) = match raw.split_once('=') {
        Some((label, id)) => (label.trim().to_string(), id.trim()),
        None => (format!("insurance {}", raw.trim()), raw.trim()),
    };
    let id: i64 = id.parse().with_context(|| format!("invalid insurance id {:?}", raw))?;
    Ok((label, id))
}

fn price_text(price: Option<rust_decimal::Decimal>) -> String {
    price
        .map(|p| format!("${}", p.round_dp(2)))
        .unwrap_or_else(|| "n/a".to_string())
}

fn emit<T: Serialize>(json: bool, rows: &[T], line: impl Fn(&T) -> String) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(rows)?);
    } else {
        for row in rows {
            println!("{}", line(row));
        }
        println!("Total: {}", rows.len());
    }
    Ok(())
}

fn print_alternatives(view: &AlternativesView) {
    println!("Insured ({})", view.insured.len());
    for row in &view.insured {
        if let Coverage::Insured { bin_id, pcn_id } = row.coverage {
            println!("  {} | {} | BIN {} PCN {} | {}", row.ndc, row.name, bin_id, pcn_id, price_text(row.net_price));
        }
    }
    println!("Uninsured ({})", view.uninsured.len());
    for row in &view.uninsured {
        println!("  {} | {} | {}", row.ndc, row.name, price_text(row.net_price));
    }
}

#[cfg(feature = "progress")]
async fn with_spinner<F: std::future::Future>(message: &'static str, work: F) -> F::Output {
    use indicatif::{ProgressBar, ProgressStyle};

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    let output = work.await;
    spinner.finish_and_clear();
    output
}

#[cfg(not(feature = "progress"))]
async fn with_spinner<F: std::future::Future>(_message: &'static str, work: F) -> F::Output {
    work.await
}
