//! Subcommand implementations.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use miette::{IntoDiagnostic, Result, WrapErr};
use serde_json::json;
use tracing::info;

use tidepool_query::{CollectionQuery, paginate};
use tidepool_service::{
    CollectionService, ExportFormat, ExportOptions, ImportSchema, validate_import,
};
use tidepool_store::{Document, FilterCriteria, MemoryRepository, SortCriteria};
use tidepool_sync::{CacheStore, CollectionView, SubscriptionManager, SyncConfig};

use crate::source::{collection_key, load_documents, read_rows};

/// Inputs of `tidepool query`.
pub struct QueryArgs {
    pub search: Option<String>,
    pub fields: Vec<String>,
    pub filters: Vec<FilterCriteria>,
    pub sort: Option<SortCriteria>,
    pub page: Option<usize>,
    pub page_size: usize,
}

/// Collection plumbing shared by the subcommands that read documents.
struct Session {
    key: String,
    repository: Arc<MemoryRepository<Document>>,
    cache: Arc<CacheStore>,
    subscriptions: SubscriptionManager<Document>,
    config: SyncConfig,
}

impl Session {
    async fn open(file: &Path, config: SyncConfig) -> Result<Self> {
        let documents = load_documents(file).await?;
        let cache = CacheStore::new();
        Ok(Self {
            key: collection_key(file),
            repository: Arc::new(MemoryRepository::with_records(documents)),
            subscriptions: SubscriptionManager::new(Arc::clone(&cache)),
            cache,
            config,
        })
    }

    async fn view(&self) -> Result<CollectionView<Document>> {
        let view = CollectionView::open(
            &self.key,
            self.repository.clone(),
            Arc::clone(&self.cache),
            &self.subscriptions,
            self.config.clone(),
        )
        .await;
        if let Some(err) = view.state().error {
            return Err(err).into_diagnostic();
        }
        Ok(view)
    }
}

pub async fn query(file: &Path, config: SyncConfig, args: QueryArgs) -> Result<()> {
    let session = Session::open(file, config).await?;
    let view = session.view().await?;
    let items = view.state().items;

    let mut query = CollectionQuery::new(args.fields);
    if let Some(search) = args.search {
        query.set_query(search);
    }
    for criteria in args.filters {
        query.add_filter(criteria);
    }
    if let Some(sort) = args.sort {
        query.set_sort(sort);
    }

    let result = query.apply(&items);
    info!(
        key = %session.key,
        total = result.total,
        matched = result.matched,
        "query complete"
    );

    let output = match args.page {
        Some(page) => {
            let page = paginate(&result.items, page, args.page_size);
            json!({
                "page": page.page,
                "pageSize": page.page_size,
                "total": page.total,
                "totalPages": page.total_pages,
                "items": page.items,
            })
        }
        None => serde_json::to_value(&result.items).into_diagnostic()?,
    };

    view.detach().await;
    print_json(&output)
}

pub async fn export(
    file: &Path,
    format: ExportFormat,
    fields: Option<Vec<String>>,
    filters: Vec<FilterCriteria>,
    output: Option<PathBuf>,
) -> Result<()> {
    let documents = load_documents(file).await?;
    let service = CollectionService::new(Arc::new(MemoryRepository::with_records(documents)));

    let mut options = ExportOptions::new(format);
    if let Some(fields) = fields {
        options = options.with_fields(fields);
    }
    let bytes = service
        .export_items(&options, &filters)
        .await
        .into_diagnostic()?;

    match output {
        Some(path) => {
            tokio::fs::write(&path, &bytes)
                .await
                .into_diagnostic()
                .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), bytes = bytes.len(), %format, "export written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes).into_diagnostic()?;
            writeln!(stdout).into_diagnostic()?;
        }
    }
    Ok(())
}

/// Returns whether every row passed.
pub async fn validate(file: &Path, required: Vec<String>, optional: Vec<String>) -> Result<bool> {
    let rows = read_rows(file).await?;
    let schema = ImportSchema::new(required).with_optional(optional);
    let result = validate_import(rows, &schema);
    info!(
        accepted = result.data.len(),
        errors = result.errors.len(),
        warnings = result.warnings.len(),
        "validation complete"
    );
    print_json(&serde_json::to_value(&result).into_diagnostic()?)?;
    Ok(result.is_valid())
}

/// Load the collection twice; the second load is served from the cache
/// while it is fresh.
pub async fn stats(file: &Path, config: SyncConfig) -> Result<()> {
    let session = Session::open(file, config).await?;
    let first = session.view().await?;
    let second = session.view().await?;

    let stats = session.cache.stats();
    let entries: Vec<_> = stats
        .entries
        .iter()
        .map(|entry| {
            json!({
                "key": entry.key,
                "ageMs": entry.age.as_millis() as u64,
                "count": entry.len,
            })
        })
        .collect();
    let output = json!({
        "size": stats.size,
        "entries": entries,
        "sharedSnapshot": Arc::ptr_eq(&first.state().items, &second.state().items),
        "realtime": session.config.realtime,
        "liveConsumers": session.subscriptions.consumer_count(&session.key),
    });

    first.detach().await;
    second.detach().await;
    print_json(&output)
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{}", text);
    Ok(())
}
