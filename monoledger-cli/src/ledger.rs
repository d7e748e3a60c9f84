//! Ledger sinks: a local CSV file, or the first sheet of a Google spreadsheet
//! (`gsheets` feature).

use anyhow::{Context, Result};
#[cfg(not(feature = "gsheets"))]
use anyhow::bail;
use async_trait::async_trait;
use monoledger_core::{LedgerRow, LedgerSink, LEDGER_HEADER};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::{Config, LedgerKind};

pub fn build_sink(config: &Config) -> Result<Arc<dyn LedgerSink>> {
    match config.ledger.kind {
        LedgerKind::Csv => Ok(Arc::new(CsvLedger::new(&config.ledger.csv_path))),
        #[cfg(feature = "gsheets")]
        LedgerKind::Sheets => {
            let key = config
                .ledger
                .service_account_key
                .clone()
                .context("ledger.service_account_key is not set")?;
            let sheet_id = config
                .ledger
                .sheet_id
                .clone()
                .context("ledger.sheet_id is not set")?;
            Ok(Arc::new(sheets::GoogleSheetsLedger::new(key, sheet_id)))
        }
        #[cfg(not(feature = "gsheets"))]
        LedgerKind::Sheets => bail!(
            "ledger.kind = \"sheets\" needs a build with `--features gsheets`; use ledger.kind = \"csv\" otherwise"
        ),
    }
}

/// Appends rows to a CSV file, keeping `LEDGER_HEADER` as its first line.
pub struct CsvLedger {
    path: PathBuf,
    /// Serializes writers within this process.
    lock: Mutex<()>,
}

impl CsvLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn blocking<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<()> + Send + 'static,
    {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || f(&path))
            .await
            .context("csv writer task panicked")?
    }
}

#[async_trait]
impl LedgerSink for CsvLedger {
    fn name(&self) -> &str {
        "csv"
    }

    async fn append(&self, row: &LedgerRow) -> Result<()> {
        let cells = row.cells();
        self.blocking(move |path| {
            ensure_header(path)?;
            let file = OpenOptions::new()
                .append(true)
                .open(path)
                .with_context(|| format!("open {}", path.display()))?;
            let mut w = csv::Writer::from_writer(file);
            w.write_record(&cells)?;
            w.flush().with_context(|| format!("write {}", path.display()))?;
            Ok(())
        })
        .await
    }

    async fn verify(&self) -> Result<()> {
        self.blocking(|path| {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
            }
            ensure_header(path)?;
            info!(path = %path.display(), "csv ledger is writable");
            Ok(())
        })
        .await
    }
}

/// Make `LEDGER_HEADER` the first record, inserting it above existing rows
/// when the file starts with something else.
fn ensure_header(path: &Path) -> Result<()> {
    let existing = read_records(path)?;
    let has_header = existing
        .first()
        .is_some_and(|first| first.iter().eq(LEDGER_HEADER.iter().copied()));
    if has_header {
        return Ok(());
    }

    let mut w = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("create {}", path.display()))?;
    w.write_record(LEDGER_HEADER)?;
    for record in &existing {
        w.write_record(record)?;
    }
    w.flush().with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn read_records(path: &Path) -> Result<Vec<csv::StringRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut r = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("read {}", path.display()))?;
    let mut out = Vec::new();
    for record in r.records() {
        out.push(record.with_context(|| format!("parse {}", path.display()))?);
    }
    Ok(out)
}

#[cfg(feature = "gsheets")]
mod sheets {
    use anyhow::{Context, Result};
    use async_trait::async_trait;
    use google_sheets4::api::{Scope, ValueRange};
    use google_sheets4::Sheets;
    use hyper::client::HttpConnector;
    use hyper_rustls::HttpsConnector;
    use monoledger_core::{LedgerRow, LedgerSink, LEDGER_HEADER};
    use serde_json::Value;
    use std::path::PathBuf;
    use tokio::sync::OnceCell;
    use tracing::{debug, info};

    // Use the oauth2 version re-exported by google-sheets4 to avoid version mismatches.
    use google_sheets4::oauth2;

    type Hub = Sheets<HttpsConnector<HttpConnector>>;

    /// Writes to the first sheet of a spreadsheet with a service account.
    pub struct GoogleSheetsLedger {
        key_path: PathBuf,
        sheet_id: String,
        hub: OnceCell<Hub>,
    }

    impl GoogleSheetsLedger {
        pub fn new(key_path: PathBuf, sheet_id: String) -> Self {
            Self {
                key_path,
                sheet_id,
                hub: OnceCell::new(),
            }
        }

        async fn hub(&self) -> Result<&Hub> {
            self.hub
                .get_or_try_init(|| async {
                    let key = oauth2::read_service_account_key(&self.key_path)
                        .await
                        .with_context(|| format!("reading service account key {}", self.key_path.display()))?;
                    let auth = oauth2::ServiceAccountAuthenticator::builder(key)
                        .build()
                        .await
                        .context("service account auth creds are not valid")?;
                    let connector = hyper_rustls::HttpsConnectorBuilder::new()
                        .with_native_roots()
                        .https_or_http()
                        .enable_http1()
                        .build();
                    Ok(Sheets::new(hyper::Client::builder().build(connector), auth))
                })
                .await
        }

        async fn first_sheet_title(&self) -> Result<String> {
            let (_, doc) = self
                .hub()
                .await?
                .spreadsheets()
                .get(&self.sheet_id)
                .add_scope(Scope::Spreadsheet)
                .doit()
                .await
                .context("service account has no access to the spreadsheet")?;
            doc.sheets
                .unwrap_or_default()
                .into_iter()
                .find_map(|s| s.properties.and_then(|p| p.title))
                .context("spreadsheet has no sheets")
        }

        async fn ensure_header(&self, title: &str) -> Result<()> {
            let hub = self.hub().await?;
            let range = format!("'{title}'!A1:F1");
            let (_, current) = hub
                .spreadsheets()
                .values_get(&self.sheet_id, &range)
                .add_scope(Scope::Spreadsheet)
                .doit()
                .await
                .context("reading header row")?;
            let first = current
                .values
                .and_then(|rows| rows.into_iter().next())
                .unwrap_or_default();
            if first.iter().map(|v| v.as_str().unwrap_or_default()).eq(LEDGER_HEADER.iter().copied()) {
                return Ok(());
            }

            debug!(sheet = title, "rewriting header row");
            let header = ValueRange {
                values: Some(vec![LEDGER_HEADER.iter().map(|h| Value::from(*h)).collect()]),
                ..Default::default()
            };
            hub.spreadsheets()
                .values_update(header, &self.sheet_id, &range)
                .value_input_option("RAW")
                .add_scope(Scope::Spreadsheet)
                .doit()
                .await
                .context("writing header row")?;
            Ok(())
        }
    }

    #[async_trait]
    impl LedgerSink for GoogleSheetsLedger {
        fn name(&self) -> &str {
            "google-sheets"
        }

        async fn append(&self, row: &LedgerRow) -> Result<()> {
            let title = self.first_sheet_title().await?;
            self.ensure_header(&title).await?;

            let body = ValueRange {
                values: Some(vec![row.cells().into_iter().map(Value::from).collect()]),
                ..Default::default()
            };
            self.hub()
                .await?
                .spreadsheets()
                .values_append(body, &self.sheet_id, &format!("'{title}'!A:F"))
                .value_input_option("USER_ENTERED")
                .insert_data_option("INSERT_ROWS")
                .add_scope(Scope::Spreadsheet)
                .doit()
                .await
                .context("appending row")?;
            Ok(())
        }

        async fn verify(&self) -> Result<()> {
            let title = self.first_sheet_title().await?;
            info!(sheet = %title, "service account has access to the spreadsheet");
            Ok(())
        }
    }
}
