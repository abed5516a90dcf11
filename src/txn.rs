use std::fs;
use std::io::prelude::*;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::prelude::*;
use clap::ArgMatches;
use tracing::{error, info};

use crate::ledger::Translator;
use crate::settings::Settings;
use crate::upstream::{revolut::RevolutClient, RecordKind, TransactionSource};

const FILE_EXTENSION: &str = "beancount";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub kind: RecordKind,
    pub path: PathBuf,
    pub success: usize,
    pub total: usize,
}

/// Pulls the last `days_back` days of records and writes every one that
/// translates cleanly to a new ledger file. Records that fail translation are
/// logged and left out; only fetch and write failures abort the batch.
#[tracing::instrument(skip(source, translator, output_dir, output))]
pub async fn sync_batch<S: TransactionSource + Send>(
    source: &mut S,
    translator: &Translator,
    days_back: i64,
    kind: RecordKind,
    output_dir: &Path,
    output: Option<PathBuf>,
    now: DateTime<Local>,
) -> Result<SyncReport> {
    let (from, to) = window(now, days_back)?;

    info!("Pulling {} from {} to {}.", kind.noun(), from, to);
    let records = source.records(kind, from, to).await?;
    let total = records.len();

    let mut entries = Vec::with_capacity(total);
    for raw in &records {
        match translator.translate_raw(raw) {
            Ok(Some(entry)) => entries.push(entry.to_string()),
            Ok(None) => {}
            Err(e) => error!(id = e.record_id(), "skipping record: {}", e),
        }
    }

    let path = output.unwrap_or_else(|| {
        output_dir.join(format!(
            "{}_{}.{}",
            kind.file_prefix(),
            now.format("%Y%m%d_%H%M%S"),
            FILE_EXTENSION
        ))
    });
    write_ledger(&path, kind, now, &entries)
        .with_context(|| format!("failed to write {}", path.display()))?;

    info!("Wrote {}/{} {} to {}.", entries.len(), total, kind.noun(), path.display());
    Ok(SyncReport {
        kind,
        path,
        success: entries.len(),
        total,
    })
}

/// The `[now - days_back, now]` fetch window in UTC.
fn window(now: DateTime<Local>, days_back: i64) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    if days_back < 0 {
        return Err(anyhow!("days to look back must not be negative, got {}", days_back));
    }

    let to = now.with_timezone(&Utc);
    let from = chrono::Duration::try_days(days_back)
        .and_then(|span| to.checked_sub_signed(span))
        .ok_or_else(|| anyhow!("cannot look back {} days", days_back))?;

    Ok((from, to))
}

fn write_ledger(path: &Path, kind: RecordKind, now: DateTime<Local>, entries: &[String]) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    let mut fd = fs::File::create(path)?;
    writeln!(fd, "; {} - {}", kind.header_label(), now.format("%Y-%m-%d %H:%M"))?;
    writeln!(fd, "; Imported {} {}", entries.len(), kind.noun())?;
    for entry in entries {
        writeln!(fd)?;
        write!(fd, "{}", entry)?;
    }
    fd.flush()?;

    Ok(())
}

fn kinds(value: &str) -> Result<Vec<RecordKind>> {
    match value {
        "transactions" => Ok(vec![RecordKind::Transactions]),
        "exchanges" => Ok(vec![RecordKind::Exchanges]),
        "all" => Ok(vec![RecordKind::Transactions, RecordKind::Exchanges]),
        other => Err(anyhow!("unknown record kind {:?}", other)),
    }
}

pub(crate) async fn run(matches: &ArgMatches, settings: Settings) -> Result<()> {
    let days = match matches.value_of("days") {
        Some(d) => d.parse::<i64>().context("--days must be a whole number")?,
        None => settings.sync_days,
    };
    let kinds = kinds(matches.value_of("kind").unwrap_or("transactions"))?;
    let output = matches.value_of("output").map(PathBuf::from);
    if output.is_some() && kinds.len() > 1 {
        return Err(anyhow!("--output can only be used with a single --kind"));
    }

    let translator = settings.translator();
    let auth = revolut_oauth::OAuthClient::new(settings.oauth_config())?;
    let mut client = RevolutClient::new(auth)?;

    for kind in kinds {
        let report = sync_batch(
            &mut client,
            &translator,
            days,
            kind,
            &settings.ledger_dir,
            output.clone(),
            Local::now(),
        )
        .await?;

        println!("{}", report.path.display());
        println!("{}/{} {}", report.success, report.total, kind.noun());
    }

    Ok(())
}
