//! recon-runner: headless runner for the payment reconciliation engine.
//!
//! Usage:
//!   recon-runner seed   --db run.db --seed 42 --payments 500
//!   recon-runner run    --db run.db [--provider stripe] [--since 2026-01-01T00:00:00Z]
//!                       [--format json|csv] [--notify]
//!   recon-runner report --db run.db --run-id recon-<uuid> [--format json|csv]
//!   recon-runner runs   --db run.db [--provider stripe] [--limit 20]

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};
use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;
use recon_core::{
    alert::{Alerter, LogMailer},
    config::ReconConfig,
    engine::ReconEngine,
    matcher::RecordFilter,
    model::{Payment, PaymentWebhook},
    report::{self, JsonReport},
    store::ReconStore,
};
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("help");
    let db = arg_value(&args, "--db").unwrap_or_else(|| ":memory:".to_string());
    log::debug!("command={command} db={db}");

    match command {
        "seed" => seed(&args, &db),
        "run" => run(&args, &db),
        "report" => report_run(&args, &db),
        "runs" => list_runs(&args, &db),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("recon-runner — payment reconciliation engine");
    println!();
    println!("  recon-runner seed   --db run.db --seed 42 --payments 500");
    println!("  recon-runner run    --db run.db [--provider P] [--since RFC3339]");
    println!("                      [--format json|csv] [--notify]");
    println!("  recon-runner report --db run.db --run-id ID [--format json|csv]");
    println!("  recon-runner runs   --db run.db [--provider P] [--limit 20]");
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].clone())
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str, default: T) -> T {
    arg_value(args, flag)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn open_store(db: &str) -> Result<ReconStore> {
    let store = ReconStore::open(db)?;
    store.migrate()?;
    Ok(store)
}

enum ReportFormat {
    Json,
    Csv,
}

/// Caller-side validation: reject bad input before a run is started.
fn parse_format(args: &[String]) -> Result<ReportFormat> {
    match arg_value(args, "--format").as_deref() {
        None | Some("json") => Ok(ReportFormat::Json),
        Some("csv") => Ok(ReportFormat::Csv),
        Some(other) => bail!("unknown format '{other}' (expected json or csv)"),
    }
}

fn parse_since(args: &[String]) -> Result<Option<DateTime<Utc>>> {
    match arg_value(args, "--since") {
        None => Ok(None),
        Some(raw) => Ok(Some(
            DateTime::parse_from_rfc3339(&raw)
                .map_err(|e| anyhow::anyhow!("invalid --since '{raw}': {e}"))?
                .with_timezone(&Utc),
        )),
    }
}

// ── seed ───────────────────────────────────────────────────────────

/// Deterministic demo dataset: a known mix of matched, orphaned,
/// missing-webhook and mismatched records across two providers.
fn seed(args: &[String], db: &str) -> Result<()> {
    let seed = parse_arg(args, "--seed", 42u64);
    let count = parse_arg(args, "--payments", 200usize);
    let store = open_store(db)?;
    let mut rng = Pcg64Mcg::seed_from_u64(seed);

    let providers = ["stripe", "adyen"];
    let currencies = ["USD", "EUR", "GBP"];
    let base = Utc::now() - Duration::days(30);

    let mut webhooks = 0usize;
    for i in 0..count {
        let provider = providers[(rng.next_u64() % providers.len() as u64) as usize];
        let currency = currencies[(rng.next_u64() % currencies.len() as u64) as usize];
        let amount = 100 + (rng.next_u64() % 99_900) as i64;
        let created_at = base + Duration::minutes((rng.next_u64() % (30 * 24 * 60)) as i64);
        let txn = format!("txn-{seed}-{i:06}");

        // 0-69 matched pair, 70-84 payment only (missing webhook),
        // 85-94 mismatched pair, 95-99 webhook only (orphan).
        let roll = rng.next_u64() % 100;

        if roll < 95 {
            store.insert_payment(&Payment {
                id: format!("pay-{seed}-{i:06}"),
                provider: provider.to_string(),
                transaction_id: txn.clone(),
                reference: Some(format!("order-{i:06}")),
                amount,
                currency: currency.to_string(),
                status: "succeeded".to_string(),
                created_at,
            })?;
        }

        if roll < 70 || roll >= 85 {
            let webhook_amount = if (85..95).contains(&roll) {
                amount + 1 + (rng.next_u64() % 500) as i64
            } else {
                amount
            };
            store.insert_webhook(&PaymentWebhook {
                id: format!("wh-{seed}-{i:06}"),
                provider: provider.to_string(),
                transaction_id: txn,
                amount: webhook_amount,
                currency: currency.to_string(),
                event_type: "payment.succeeded".to_string(),
                received_at: created_at + Duration::seconds(30),
            })?;
            webhooks += 1;
        }
    }

    println!(
        "seeded {db}: {} payments, {webhooks} webhooks (seed {seed})",
        store.payment_count()?
    );
    Ok(())
}

// ── run ────────────────────────────────────────────────────────────

fn run(args: &[String], db: &str) -> Result<()> {
    let format = parse_format(args)?;
    let since = parse_since(args)?;
    let provider = arg_value(args, "--provider");
    let notify = args.iter().any(|a| a == "--notify");

    let store = open_store(db)?;
    let config = ReconConfig::from_env();
    let engine = ReconEngine::new(store, config.clone());

    let outcome = engine.start_reconciliation_run(RecordFilter { provider, since })?;

    match format {
        ReportFormat::Json => {
            println!("{}", JsonReport::from_outcome(&outcome).to_json_string()?)
        }
        ReportFormat::Csv => {
            eprintln!("attachment: {}", report::csv_filename(&outcome.run.id));
            print!("{}", report::csv_from_outcome(&outcome)?);
        }
    }

    if notify {
        let alerter = Alerter::new(config.alert_recipients, Box::new(LogMailer));
        alerter.alert_run(&outcome.run, "on-demand reconciliation run");
    }
    Ok(())
}

// ── report (historical, from persisted bounded samples) ────────────

fn report_run(args: &[String], db: &str) -> Result<()> {
    let format = parse_format(args)?;
    let run_id =
        arg_value(args, "--run-id").ok_or_else(|| anyhow::anyhow!("--run-id is required"))?;

    let store = open_store(db)?;
    let run = store.get_run(&run_id)?;

    match format {
        ReportFormat::Json => println!("{}", JsonReport::from_run(&run).to_json_string()?),
        ReportFormat::Csv => {
            eprintln!("attachment: {}", report::csv_filename(&run.id));
            print!("{}", report::csv_from_run(&run)?);
        }
    }
    Ok(())
}

// ── runs (history listing) ─────────────────────────────────────────

fn list_runs(args: &[String], db: &str) -> Result<()> {
    let provider = arg_value(args, "--provider");
    let since = parse_since(args)?;
    let limit = parse_arg(args, "--limit", 20u32);

    let store = open_store(db)?;
    let runs = store.recent_runs(provider.as_deref(), since, limit)?;

    if runs.is_empty() {
        println!("no runs recorded");
        return Ok(());
    }
    for run in &runs {
        let s = &run.summary;
        println!(
            "{}  {}  provider={}  started={}  matched={} orphaned={} missing={} mismatched={}",
            run.id,
            run.status.as_str(),
            run.provider.as_deref().unwrap_or("all"),
            run.started_at.to_rfc3339(),
            s.matched_count,
            s.orphaned_webhook_count,
            s.missing_webhook_count,
            s.amount_mismatch_count,
        );
    }
    Ok(())
}
