//! Command implementations
//!
//! Everything here is blocking; `main` runs it off the async runtime so the
//! Ctrl-C listener stays responsive.

use anyhow::{Context, Result, anyhow};
use log::{info, warn};
use mail::{
    CancellationToken, Email, FileAttachmentSink, FilenameSchema, GmailClient, LabelRemote,
    MetadataSearchTask, ProcessAction, ProcessingOrchestrator, ProcessingServices,
    REMOVED_LABEL_NAME, RemovedLabelResolver, Settings, compose_basic_query, default_token_source,
    run_until_cancelled, select_all, selection_caption, user_label_names,
};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use crate::cli::{Commands, ProcessArgs, SearchArgs};
use crate::report;

/// Load settings and credentials, then dispatch `command`
pub fn run(command: Commands, cancel: CancellationToken) -> Result<()> {
    let mut settings = Settings::load()?;
    let client = Arc::new(GmailClient::new(default_token_source()?));

    match command {
        Commands::Labels => list_labels(&client),
        Commands::Search(args) => {
            let emails = search(&client, &mut settings, &args, &cancel)?;
            report::print_emails(&emails);
            Ok(())
        }
        Commands::Process(args) => process(&client, &mut settings, args, &cancel),
    }
}

fn list_labels(client: &GmailClient) -> Result<()> {
    let labels = client.list_labels()?;
    for name in user_label_names(&labels) {
        println!("{}", name);
    }
    Ok(())
}

/// Run a metadata search, keeping partial results on cancellation
fn search(
    client: &Arc<GmailClient>,
    settings: &mut Settings,
    args: &SearchArgs,
    cancel: &CancellationToken,
) -> Result<Vec<Email>> {
    let query = match &args.query {
        Some(raw) => raw.clone(),
        None => compose_basic_query(
            args.min_size_mb.unwrap_or(settings.min_size_mb),
            args.labels.as_slice(),
        ),
    };
    if let Err(e) = settings.save_search_query(query.as_str()) {
        warn!("Could not remember search query: {:#}", e);
    }

    let page_size = args.page_size.unwrap_or(settings.page_size);
    let mut task = MetadataSearchTask::start(client.clone(), query.as_str(), page_size)?;
    info!("Searching '{}': {}", query, task.status_text());

    let found = run_until_cancelled(&mut task, cancel, |p| {
        info!(
            "Search: completed {} of {} batches, {}%",
            p.current,
            p.total,
            p.percent()
        )
    })?;

    Ok(match found {
        Some(emails) => emails,
        None => {
            if cancel.is_cancelled() {
                warn!("Search cancelled after {}", task.status_text());
            }
            task.into_emails()
        }
    })
}

fn process(
    client: &Arc<GmailClient>,
    settings: &mut Settings,
    args: ProcessArgs,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut emails = search(client, settings, &args.search, cancel)?;
    if cancel.is_cancelled() {
        report::print_emails(&emails);
        return Ok(());
    }
    if emails.is_empty() {
        println!("no emails matched the query");
        return Ok(());
    }

    select_all(&mut emails, true);
    println!("{}", selection_caption(&emails));

    if let Some(dir) = &args.target_dir {
        settings.save_target_directory(dir)?;
    }
    if let Some(schema) = &args.schema {
        settings.save_filename_schema(FilenameSchema::new(schema))?;
    }
    settings.add_metadata |= args.add_metadata;
    settings.backup |= args.backup;

    let action = ProcessAction::from(args.action);
    let removed_label = if action.deletes() {
        let resolver =
            RemovedLabelResolver::with_cached(REMOVED_LABEL_NAME, settings.removed_label_id.clone());
        let id = resolver.get_or_create(client.as_ref())?;
        if settings.removed_label_id.as_ref() != Some(&id) {
            settings.save_removed_label_id(id.clone())?;
        }
        Some(id)
    } else {
        None
    };

    let config = settings.process_configuration(action, removed_label)?;
    let target = config.target_directory().to_path_buf();
    let services =
        ProcessingServices::new(client.clone(), Arc::new(FileAttachmentSink::new()), config);

    // The orchestrator runs on its own thread; this one only reports
    let (tx, rx) = mpsc::channel();
    let mut orchestrator = ProcessingOrchestrator::new(services, cancel.clone()).with_events(tx);
    let worker = thread::Builder::new()
        .name("detach-worker".to_string())
        .spawn(move || {
            let summary = orchestrator.run(&mut emails);
            (emails, summary)
        })
        .context("Failed to start worker thread")?;

    for event in rx {
        report::print_event(&event);
    }

    let (emails, summary) = worker
        .join()
        .map_err(|_| anyhow!("Worker thread panicked"))?;
    // Show where every email ended up even when the run was aborted
    report::print_emails(&emails);
    let summary = summary?;
    report::print_summary(&summary);

    if args.open
        && let Err(e) = open::that(&target)
    {
        warn!("Failed to open {}: {}", target.display(), e);
    }
    Ok(())
}
