//! Console output for search results and processing progress

use mail::{Email, EmailStatus, ProgressEvent, RunState, RunSummary, selection_caption};

const SUBJECT_WIDTH: usize = 40;
const FROM_WIDTH: usize = 28;

/// Print the results table followed by the selection caption
pub fn print_emails(emails: &[Email]) {
    if emails.is_empty() {
        println!("no emails matched the query");
        return;
    }

    println!(
        "{:>4}  {:<10}  {:<w_from$}  {:<w_subj$}  {:>6}  {:<10}  NOTE",
        "#",
        "DATE",
        "FROM",
        "SUBJECT",
        "SIZE",
        "STATUS",
        w_from = FROM_WIDTH,
        w_subj = SUBJECT_WIDTH
    );
    for (i, email) in emails.iter().enumerate() {
        println!(
            "{:>4}  {:<10}  {:<w_from$}  {:<w_subj$}  {:>4}MB  {:<10}  {}",
            i + 1,
            email.received_at.format("%Y-%m-%d"),
            truncate(&email.from.display(), FROM_WIDTH),
            truncate(&email.subject, SUBJECT_WIDTH),
            email.size_in_megabytes(),
            status_label(email.status()),
            email.note().unwrap_or(""),
            w_from = FROM_WIDTH,
            w_subj = SUBJECT_WIDTH
        );
    }
    println!("{}", selection_caption(emails));
}

pub fn print_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::EmailStatusChanged {
            index,
            id,
            status,
            note,
        } => match note {
            Some(note) => println!("[{}] {} {}: {}", index + 1, id, status_label(*status), note),
            None => println!("[{}] {} {}", index + 1, id, status_label(*status)),
        },
        ProgressEvent::Progress(counters) => println!("{}", counters.status_text()),
        // Per-step progress is only interesting in the debug log
        ProgressEvent::Step { index, progress } => {
            log::debug!(
                "[{}] step {} of {}",
                index + 1,
                progress.current,
                progress.total
            );
        }
        ProgressEvent::Finished(_) => {}
    }
}

pub fn print_summary(summary: &RunSummary) {
    let outcome = match summary.state {
        RunState::Completed => "Done",
        RunState::CancelledPartial => "Cancelled",
        RunState::Failed => "Failed",
        RunState::Idle | RunState::Running => "Stopped",
    };
    println!("{}: {}", outcome, summary.counters.status_text());
    if summary.counters.items_cancelled > 0 {
        println!(
            "{} email(s) stopped before completion",
            summary.counters.items_cancelled
        );
    }
}

fn status_label(status: EmailStatus) -> &'static str {
    match status {
        EmailStatus::ToProcess => "selected",
        EmailStatus::Ignored => "-",
        EmailStatus::Processing => "working",
        EmailStatus::Processed => "done",
        EmailStatus::Failed => "failed",
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(3)).collect();
        out.push_str("...");
        out
    }
}
