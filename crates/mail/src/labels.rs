//! Removed-label resolution
//!
//! Messages whose attachments were removed are tagged with a user label so
//! they can be found later. The label is looked up by name and created on
//! first use; the id is then cached for the rest of the session.

use anyhow::Result;
use log::info;
use std::sync::Mutex;

use crate::error::LabelExistsError;
use crate::models::LabelId;
use crate::remote::LabelRemote;

/// Default name of the removed label
pub const REMOVED_LABEL_NAME: &str = "Attachments removed";

/// Session-scoped get-or-create cache for the removed label id
pub struct RemovedLabelResolver {
    name: String,
    cached: Mutex<Option<LabelId>>,
}

impl RemovedLabelResolver {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cached: Mutex::new(None),
        }
    }

    /// Start from an id persisted by an earlier session
    pub fn with_cached(name: impl Into<String>, id: Option<LabelId>) -> Self {
        Self {
            name: name.into(),
            cached: Mutex::new(id),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The cached id, if one has been resolved
    pub fn cached(&self) -> Option<LabelId> {
        self.cached.lock().ok().and_then(|guard| guard.clone())
    }

    /// Return the label id, creating the label if the mailbox lacks it
    ///
    /// A concurrent creation elsewhere shows up as [`LabelExistsError`];
    /// that counts as success and the existing label is looked up instead.
    pub fn get_or_create(&self, labels: &dyn LabelRemote) -> Result<LabelId> {
        let mut cached = self
            .cached
            .lock()
            .map_err(|_| anyhow::anyhow!("removed label cache poisoned"))?;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let id = match labels.find_label_by_name(&self.name)? {
            Some(id) => id,
            None => match labels.create_label(&self.name) {
                Ok(id) => {
                    info!("Created label '{}' ({})", self.name, id);
                    id
                }
                Err(e) if e.downcast_ref::<LabelExistsError>().is_some() => labels
                    .find_label_by_name(&self.name)?
                    .ok_or_else(|| {
                        anyhow::anyhow!("label '{}' exists but could not be found", self.name)
                    })?,
                Err(e) => return Err(e),
            },
        };

        *cached = Some(id.clone());
        Ok(id)
    }
}

impl Default for RemovedLabelResolver {
    fn default() -> Self {
        Self::new(REMOVED_LABEL_NAME)
    }
}
