//! Per-message processing task
//!
//! Breaks the processing of one email into a fixed sequence of steps
//! chosen from the run configuration:
//!
//! 1. fetch the attachment part list
//! 2. back up the original message (delete runs with backup enabled)
//! 3. save each part (download runs)
//! 4. remove the parts remotely (delete runs)
//! 5. apply the removed label (delete runs)
//!
//! The first failing step ends the task; later steps never run, so a failed
//! removal is never followed by the removed label.

use anyhow::Context;
use log::debug;
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;

use super::{LongTask, StepProgress, StepResult};
use crate::error::{ReplacementNotTrashedError, TaskError};
use crate::models::{BYTES_IN_MEGABYTE, Email, MessageId};
use crate::processing::ProcessingServices;
use crate::remote::{AttachmentPart, PartRemoval};
use crate::storage::avoid_collision;

/// Sub-directory of the target directory that holds message backups
const BACKUP_DIR: &str = "backup";

/// One step of an [`EmailProcessingTask`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStep {
    FetchParts,
    Backup,
    SavePart(usize),
    RemoveParts,
    ApplyLabel,
}

impl fmt::Display for ProcessStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStep::FetchParts => write!(f, "fetch attachment list"),
            ProcessStep::Backup => write!(f, "back up message"),
            ProcessStep::SavePart(i) => write!(f, "save attachment {}", i + 1),
            ProcessStep::RemoveParts => write!(f, "remove attachments"),
            ProcessStep::ApplyLabel => write!(f, "apply removed label"),
        }
    }
}

/// Outcome of processing one email
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessEmailResult {
    /// Id the email had when the task started
    pub id: MessageId,
    /// Id afterwards; differs from `id` when removal rewrote the message
    pub final_id: MessageId,
    /// Bytes saved locally, or bytes removed for delete-only runs
    pub bytes: u64,
    pub saved_files: Vec<PathBuf>,
    pub backup_file: Option<PathBuf>,
    pub removed_parts: usize,
}

impl ProcessEmailResult {
    /// Outcome detail for the email's note column
    pub fn summary(&self) -> String {
        if self.saved_files.is_empty() && self.removed_parts == 0 {
            return "No attachments found".to_string();
        }
        let mut parts = Vec::new();
        if !self.saved_files.is_empty() {
            parts.push(format!("saved {}", self.saved_files.len()));
        }
        if self.removed_parts > 0 {
            parts.push(format!("removed {}", self.removed_parts));
        }
        format!("{} attachment(s)", parts.join(", "))
    }
}

/// Processes a single email according to a run configuration
pub struct EmailProcessingTask {
    email: Email,
    services: ProcessingServices,
    steps: VecDeque<ProcessStep>,
    steps_done: usize,
    parts: Vec<AttachmentPart>,
    saved: Vec<Option<PathBuf>>,
    backup_file: Option<PathBuf>,
    current_id: MessageId,
    bytes: u64,
    mutated: bool,
    failed: bool,
}

impl EmailProcessingTask {
    pub fn new(email: &Email, services: ProcessingServices) -> Self {
        let config = &services.config;
        let steps = if config.downloads() || config.deletes() {
            VecDeque::from([ProcessStep::FetchParts])
        } else {
            VecDeque::new()
        };

        Self {
            current_id: email.id.clone(),
            email: email.clone(),
            services,
            steps,
            steps_done: 0,
            parts: Vec::new(),
            saved: Vec::new(),
            backup_file: None,
            bytes: 0,
            mutated: false,
            failed: false,
        }
    }

    pub fn email_id(&self) -> &MessageId {
        &self.email.id
    }

    /// Id of the remote message as it stands now
    ///
    /// Differs from [`email_id`](Self::email_id) once removal has stored a
    /// rewritten copy, even if a later step failed.
    pub fn current_id(&self) -> &MessageId {
        &self.current_id
    }

    /// Files written so far, in part order
    pub fn saved_files(&self) -> Vec<PathBuf> {
        self.saved.iter().flatten().cloned().collect()
    }

    /// The step the next `take_step` call will perform
    pub fn next_step(&self) -> Option<ProcessStep> {
        if self.failed {
            None
        } else {
            self.steps.front().copied()
        }
    }

    /// Whether the task may be abandoned without leaving the remote
    /// message half-modified
    pub fn can_stop_early(&self) -> bool {
        !self.mutated
    }

    pub fn progress(&self) -> StepProgress {
        StepProgress::new(self.steps_done, self.number_of_steps())
    }

    /// Steps still expected before the part list is known
    fn unplanned_estimate(&self) -> usize {
        let config = &self.services.config;
        let mut estimate = 0;
        if config.backup() {
            estimate += 1;
        }
        if config.deletes() {
            estimate += 2;
        }
        estimate
    }

    /// Queue the remaining steps once the part list is known
    fn plan_after_fetch(&mut self) {
        if self.parts.is_empty() {
            return;
        }
        let config = &self.services.config;
        if config.backup() {
            self.steps.push_back(ProcessStep::Backup);
        }
        if config.downloads() {
            self.steps
                .extend((0..self.parts.len()).map(ProcessStep::SavePart));
        }
        if config.deletes() {
            self.steps.push_back(ProcessStep::RemoveParts);
            self.steps.push_back(ProcessStep::ApplyLabel);
        }
    }

    fn run_step(&mut self, step: ProcessStep) -> anyhow::Result<()> {
        match step {
            ProcessStep::FetchParts => {
                self.parts = self.services.attachments.get_parts(&self.current_id)?;
                self.saved = vec![None; self.parts.len()];
                debug!("{}: {} attachment part(s)", self.current_id, self.parts.len());
                self.plan_after_fetch();
            }
            ProcessStep::Backup => {
                let raw = self.services.attachments.fetch_raw(&self.current_id)?;
                let name = format!(
                    "{}_{}.eml",
                    self.email.received_at.format("%Y-%m-%d"),
                    self.email.id
                );
                let target = self
                    .services
                    .config
                    .target_directory()
                    .join(BACKUP_DIR)
                    .join(name);
                let path = avoid_collision(&target, |p| self.services.sink.exists(p));
                self.services.sink.save(&raw, &path)?;
                self.backup_file = Some(path);
            }
            ProcessStep::SavePart(index) => {
                let part = self
                    .parts
                    .get(index)
                    .with_context(|| format!("no attachment part {}", index))?;
                let data = self
                    .services
                    .attachments
                    .download_part(&self.current_id, part)?;
                let name = self
                    .services
                    .config
                    .filename_schema()
                    .render(&self.email, part, index);
                let target = self.services.config.target_directory().join(name);
                let path = avoid_collision(&target, |p| self.services.sink.exists(p));
                let written = self.services.sink.save(&data, &path)?;
                debug!("{}: saved {} bytes to {}", self.current_id, written, path.display());
                self.bytes += written;
                self.saved[index] = Some(path);
            }
            ProcessStep::RemoveParts => {
                let removals: Vec<PartRemoval> = self
                    .parts
                    .iter()
                    .zip(&self.saved)
                    .map(|(part, saved)| PartRemoval {
                        part_id: part.part_id.clone(),
                        placeholder: placeholder_text(
                            part,
                            saved.as_ref(),
                            self.services.config.add_metadata(),
                        ),
                    })
                    .collect();
                // From here on the remote message is modified; the label
                // step must follow even if the driver asks to stop.
                self.mutated = true;
                let new_id = match self
                    .services
                    .attachments
                    .remove_parts(&self.current_id, &removals)
                {
                    Ok(id) => id,
                    Err(e) => {
                        if let Some(replaced) = e.downcast_ref::<ReplacementNotTrashedError>() {
                            self.current_id = replaced.replacement.clone();
                        }
                        return Err(e);
                    }
                };
                if !self.services.config.downloads() {
                    self.bytes += self.parts.iter().map(|p| p.size_bytes).sum::<u64>();
                }
                self.current_id = new_id;
            }
            ProcessStep::ApplyLabel => {
                let label = self
                    .services
                    .config
                    .removed_label_id()
                    .context("no removed label configured")?;
                self.services.labels.apply_label(&self.current_id, label)?;
            }
        }
        Ok(())
    }

    fn result(&self) -> ProcessEmailResult {
        let removed_parts = if self.services.config.deletes() {
            self.parts.len()
        } else {
            0
        };
        ProcessEmailResult {
            id: self.email.id.clone(),
            final_id: self.current_id.clone(),
            bytes: self.bytes,
            saved_files: self.saved_files(),
            backup_file: self.backup_file.clone(),
            removed_parts,
        }
    }
}

impl LongTask for EmailProcessingTask {
    type Output = ProcessEmailResult;

    fn number_of_steps(&self) -> usize {
        let planned = self.steps_done + self.steps.len();
        if self.steps_done == 0 && !self.steps.is_empty() {
            planned + self.unplanned_estimate()
        } else {
            planned
        }
    }

    fn has_more_steps(&self) -> bool {
        self.next_step().is_some()
    }

    fn take_step(&mut self) -> Result<StepResult<ProcessEmailResult>, TaskError> {
        let Some(step) = self.next_step() else {
            return Err(TaskError::Exhausted);
        };
        self.steps.pop_front();

        if let Err(source) = self.run_step(step) {
            self.failed = true;
            self.steps.clear();
            return Err(TaskError::Message {
                id: self.email.id.clone(),
                source: source.context(format!("Failed to {}", step)),
            });
        }
        self.steps_done += 1;

        if self.steps.is_empty() {
            Ok(StepResult::Complete(self.result()))
        } else {
            Ok(StepResult::Continue(self.progress()))
        }
    }
}

/// Text left in the message where an attachment used to be
fn placeholder_text(part: &AttachmentPart, saved: Option<&PathBuf>, add_metadata: bool) -> String {
    let name = if part.filename.is_empty() {
        "unnamed attachment"
    } else {
        part.filename.as_str()
    };
    if !add_metadata {
        return format!("[Attachment removed: {}]", name);
    }

    let mut text = format!(
        "[Attachment removed: {}]\r\nType: {}\r\nSize: {}",
        name,
        part.mime_type,
        format_size(part.size_bytes)
    );
    if let Some(path) = saved {
        text.push_str(&format!("\r\nSaved to: {}", path.display()));
    }
    text
}

fn format_size(bytes: u64) -> String {
    if bytes >= BYTES_IN_MEGABYTE {
        format!("{:.1} MB", bytes as f64 / BYTES_IN_MEGABYTE as f64)
    } else {
        format!("{} KB", bytes.div_ceil(1024))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Label, LabelId};
    use crate::processing::{ProcessAction, ProcessConfiguration};
    use crate::remote::{AttachmentRemote, LabelRemote};
    use crate::storage::{FilenameSchema, InMemoryAttachmentSink};
    use anyhow::{Result, anyhow, bail};
    use chrono::{TimeZone, Utc};
    use std::sync::{Arc, Mutex};

    /// Records every remote call; removal or labeling can be made to fail
    #[derive(Default)]
    struct FakeRemote {
        parts: Vec<AttachmentPart>,
        fail_remove: bool,
        fail_trash: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeRemote {
        fn with_parts(names: &[&str]) -> Self {
            let parts = names
                .iter()
                .enumerate()
                .map(|(i, name)| AttachmentPart {
                    part_id: (i + 1).to_string(),
                    filename: name.to_string(),
                    mime_type: "application/pdf".to_string(),
                    size_bytes: 1000,
                    attachment_id: Some(format!("att{}", i)),
                })
                .collect();
            Self {
                parts,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl AttachmentRemote for FakeRemote {
        fn get_parts(&self, id: &MessageId) -> Result<Vec<AttachmentPart>> {
            self.calls.lock().unwrap().push(format!("parts:{}", id));
            Ok(self.parts.clone())
        }

        fn download_part(&self, id: &MessageId, part: &AttachmentPart) -> Result<Vec<u8>> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("download:{}:{}", id, part.part_id));
            Ok(vec![7u8; part.size_bytes as usize])
        }

        fn fetch_raw(&self, id: &MessageId) -> Result<Vec<u8>> {
            self.calls.lock().unwrap().push(format!("raw:{}", id));
            Ok(b"Subject: hi\r\n\r\nbody".to_vec())
        }

        fn remove_parts(&self, id: &MessageId, removals: &[PartRemoval]) -> Result<MessageId> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("remove:{}:{}", id, removals.len()));
            if self.fail_remove {
                bail!("insert rejected");
            }
            let new_id = MessageId::new(format!("{}-new", id));
            if self.fail_trash {
                return Err(anyhow!("trash refused").context(ReplacementNotTrashedError {
                    original: id.clone(),
                    replacement: new_id,
                }));
            }
            Ok(new_id)
        }
    }

    impl LabelRemote for FakeRemote {
        fn list_labels(&self) -> Result<Vec<Label>> {
            Ok(Vec::new())
        }

        fn create_label(&self, name: &str) -> Result<LabelId> {
            Ok(LabelId::new(name))
        }

        fn apply_label(&self, id: &MessageId, label: &LabelId) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("label:{}:{}", id, label));
            Ok(())
        }
    }

    fn make_email() -> Email {
        Email::builder(MessageId::new("m1"))
            .subject("Scans")
            .received_at(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
            .size_bytes(5000)
            .selected()
            .build()
    }

    fn services(
        remote: &Arc<FakeRemote>,
        sink: &Arc<InMemoryAttachmentSink>,
        config: ProcessConfiguration,
    ) -> ProcessingServices {
        ProcessingServices {
            attachments: remote.clone(),
            labels: remote.clone(),
            sink: sink.clone(),
            config: Arc::new(config),
        }
    }

    fn delete_config(action: ProcessAction) -> ProcessConfiguration {
        ProcessConfiguration::removing(
            action,
            "/out",
            FilenameSchema::new("{filename}"),
            LabelId::new("Label_9"),
        )
        .unwrap()
    }

    fn run(task: &mut EmailProcessingTask) -> Result<ProcessEmailResult, TaskError> {
        loop {
            if let StepResult::Complete(result) = task.take_step()? {
                return Ok(result);
            }
        }
    }

    #[test]
    fn test_download_saves_every_part() {
        let remote = Arc::new(FakeRemote::with_parts(&["a.pdf", "a.pdf"]));
        let sink = Arc::new(InMemoryAttachmentSink::new());
        let config = ProcessConfiguration::download("/out", FilenameSchema::new("{filename}"));
        let mut task = EmailProcessingTask::new(&make_email(), services(&remote, &sink, config));

        assert_eq!(task.number_of_steps(), 1);
        let result = run(&mut task).unwrap();

        assert_eq!(result.bytes, 2000);
        assert_eq!(result.removed_parts, 0);
        assert_eq!(result.final_id, MessageId::new("m1"));
        assert_eq!(
            sink.paths(),
            vec![PathBuf::from("/out/a (1).pdf"), PathBuf::from("/out/a.pdf")]
        );
        assert_eq!(result.summary(), "saved 2 attachment(s)");
        assert!(!task.has_more_steps());
    }

    #[test]
    fn test_download_and_delete_step_order() {
        let remote = Arc::new(FakeRemote::with_parts(&["x.pdf"]));
        let sink = Arc::new(InMemoryAttachmentSink::new());
        let config = delete_config(ProcessAction::DownloadAndDelete).with_backup(true);
        let mut task = EmailProcessingTask::new(&make_email(), services(&remote, &sink, config));

        assert_eq!(task.number_of_steps(), 4);
        task.take_step().unwrap();
        assert_eq!(task.number_of_steps(), 5);
        assert_eq!(task.next_step(), Some(ProcessStep::Backup));

        let result = run(&mut task).unwrap();
        assert_eq!(
            remote.calls(),
            vec![
                "parts:m1",
                "raw:m1",
                "download:m1:1",
                "remove:m1:1",
                "label:m1-new:Label_9"
            ]
        );
        assert_eq!(result.final_id, MessageId::new("m1-new"));
        assert_eq!(result.backup_file, Some(PathBuf::from("/out/backup/2024-01-02_m1.eml")));
        assert_eq!(result.summary(), "saved 1, removed 1 attachment(s)");
    }

    #[test]
    fn test_failed_removal_skips_label() {
        let mut fake = FakeRemote::with_parts(&["x.pdf"]);
        fake.fail_remove = true;
        let remote = Arc::new(fake);
        let sink = Arc::new(InMemoryAttachmentSink::new());
        let config = delete_config(ProcessAction::Delete);
        let mut task = EmailProcessingTask::new(&make_email(), services(&remote, &sink, config));

        let err = run(&mut task).unwrap_err();
        assert_eq!(err.message_id(), Some(&MessageId::new("m1")));
        assert!(err.note().contains("insert rejected"));
        assert!(err.note().contains("remove attachments"));
        assert!(!task.has_more_steps());
        assert!(matches!(task.take_step(), Err(TaskError::Exhausted)));
        assert!(remote.calls().iter().all(|c| !c.starts_with("label:")));
    }

    #[test]
    fn test_replacement_id_kept_when_trash_fails() {
        let mut fake = FakeRemote::with_parts(&["x.pdf"]);
        fake.fail_trash = true;
        let remote = Arc::new(fake);
        let sink = Arc::new(InMemoryAttachmentSink::new());
        let config = delete_config(ProcessAction::Delete);
        let mut task = EmailProcessingTask::new(&make_email(), services(&remote, &sink, config));

        let err = run(&mut task).unwrap_err();
        assert!(err.note().contains("Inserted m1-new but failed to trash m1"));
        assert_eq!(task.email_id(), &MessageId::new("m1"));
        assert_eq!(task.current_id(), &MessageId::new("m1-new"));
        assert!(!task.can_stop_early());
        assert!(remote.calls().iter().all(|c| !c.starts_with("label:")));
    }

    #[test]
    fn test_cannot_stop_after_removal() {
        let remote = Arc::new(FakeRemote::with_parts(&["x.pdf"]));
        let sink = Arc::new(InMemoryAttachmentSink::new());
        let config = delete_config(ProcessAction::Delete);
        let mut task = EmailProcessingTask::new(&make_email(), services(&remote, &sink, config));

        task.take_step().unwrap();
        assert!(task.can_stop_early());
        task.take_step().unwrap();
        assert!(!task.can_stop_early());
        assert_eq!(task.next_step(), Some(ProcessStep::ApplyLabel));
    }

    #[test]
    fn test_delete_only_counts_removed_bytes() {
        let remote = Arc::new(FakeRemote::with_parts(&["x.pdf", "y.pdf"]));
        let sink = Arc::new(InMemoryAttachmentSink::new());
        let config = delete_config(ProcessAction::Delete);
        let mut task = EmailProcessingTask::new(&make_email(), services(&remote, &sink, config));

        let result = run(&mut task).unwrap();
        assert_eq!(result.bytes, 2000);
        assert!(sink.paths().is_empty());
    }

    #[test]
    fn test_no_attachments_completes_after_fetch() {
        let remote = Arc::new(FakeRemote::default());
        let sink = Arc::new(InMemoryAttachmentSink::new());
        let config = delete_config(ProcessAction::Delete);
        let mut task = EmailProcessingTask::new(&make_email(), services(&remote, &sink, config));

        let result = task.take_step().unwrap();
        match result {
            StepResult::Complete(r) => assert_eq!(r.summary(), "No attachments found"),
            other => panic!("expected completion, got {:?}", other),
        }
        assert_eq!(remote.calls(), vec!["parts:m1"]);
    }

    #[test]
    fn test_placeholder_with_metadata() {
        let part = AttachmentPart {
            part_id: "1".to_string(),
            filename: "big.zip".to_string(),
            mime_type: "application/zip".to_string(),
            size_bytes: 3 * BYTES_IN_MEGABYTE,
            attachment_id: None,
        };
        let saved = PathBuf::from("/out/big.zip");
        let text = placeholder_text(&part, Some(&saved), true);
        assert!(text.starts_with("[Attachment removed: big.zip]"));
        assert!(text.contains("Size: 3.0 MB"));
        assert!(text.contains("Saved to: /out/big.zip"));
        assert_eq!(
            placeholder_text(&part, None, false),
            "[Attachment removed: big.zip]"
        );
    }
}
