use std::collections::{BTreeMap, HashSet};

use relay_logging::{relay_debug, relay_info, relay_trace, relay_warn};

use crate::{
    DocumentId, DocumentStatus, Effect, Scope, StatusNotice, TrackedDocument, UpdateSource,
};

/// Error text reported for a failed document whose notice carried none.
pub const FAILURE_FALLBACK: &str = "document processing failed";

/// Failed lookups after which a document is no longer waited for.
pub const MAX_LOOKUP_FAILURES: u32 = 5;

/// Candidate status change for one document, tagged with its channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub document_id: DocumentId,
    pub workspace_id: String,
    pub conversation_id: Option<String>,
    pub status: DocumentStatus,
    pub message: Option<String>,
    pub error: Option<String>,
    pub source: UpdateSource,
}

impl StatusUpdate {
    pub fn from_notice(notice: StatusNotice, source: UpdateSource) -> Self {
        Self {
            document_id: notice.document_id,
            workspace_id: notice.workspace_id,
            conversation_id: notice.conversation_id,
            status: notice.status,
            message: notice.message,
            error: notice.error,
            source,
        }
    }
}

/// Single owner of per-document status for the active scope.
///
/// Push and pull updates may arrive in any order; an update is applied only
/// if it does not move a document backwards, and the first terminal status
/// is final.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reconciler {
    scope: Option<Scope>,
    documents: BTreeMap<DocumentId, TrackedDocument>,
    lookup_failures: BTreeMap<DocumentId, u32>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    pub fn activate(&mut self, scope: Scope) {
        self.scope = Some(scope);
    }

    pub fn document(&self, id: &str) -> Option<&TrackedDocument> {
        self.documents.get(id)
    }

    pub fn status_of(&self, id: &str) -> Option<DocumentStatus> {
        self.documents.get(id).map(|doc| doc.status)
    }

    pub fn documents(&self) -> impl Iterator<Item = &TrackedDocument> {
        self.documents.values()
    }

    /// Records a document the client has just started uploading.
    pub fn track_upload(&mut self, document_id: DocumentId, conversation_id: Option<String>) {
        let Some(scope) = &self.scope else {
            relay_debug!("upload {} started with no active scope", document_id);
            return;
        };
        let workspace_id = scope.workspace_id.clone();
        let conversation_id = conversation_id.or_else(|| scope.conversation_id.clone());
        self.documents
            .entry(document_id.clone())
            .or_insert_with(|| TrackedDocument {
                id: document_id,
                workspace_id,
                conversation_id,
                status: DocumentStatus::Pending,
                message: None,
                error: None,
                last_source: UpdateSource::Upload,
            });
    }

    pub fn apply_update(&mut self, update: StatusUpdate) -> Vec<Effect> {
        let Some(scope) = &self.scope else {
            relay_debug!("dropping update for {}: no active scope", update.document_id);
            return Vec::new();
        };
        if !scope.contains(&update.workspace_id, update.conversation_id.as_deref()) {
            relay_debug!(
                "dropping update for {} from workspace {} (conversation {:?}): outside {}",
                update.document_id,
                update.workspace_id,
                update.conversation_id,
                scope.workspace_id
            );
            return Vec::new();
        }

        let Some(doc) = self.documents.get_mut(&update.document_id) else {
            let doc = TrackedDocument {
                id: update.document_id.clone(),
                workspace_id: update.workspace_id,
                conversation_id: update.conversation_id,
                status: update.status,
                message: update.message,
                error: update.error,
                last_source: update.source,
            };
            let effects = settle_if_terminal(&doc);
            self.documents.insert(update.document_id, doc);
            return effects;
        };

        if update.status < doc.status {
            relay_debug!(
                "rejecting {} -> {} for {} from {:?}: behind current status",
                doc.status,
                update.status,
                doc.id,
                update.source
            );
            return Vec::new();
        }
        if doc.status.is_terminal() && update.status != doc.status {
            relay_warn!(
                "document {} already settled as {}; ignoring conflicting {} from {:?}",
                doc.id,
                doc.status,
                update.status,
                update.source
            );
            return Vec::new();
        }

        let first_terminal = !doc.status.is_terminal() && update.status.is_terminal();
        self.lookup_failures.remove(&doc.id);
        doc.status = update.status;
        doc.last_source = update.source;
        if update.message.is_some() {
            doc.message = update.message;
        }
        if update.error.is_some() {
            doc.error = update.error;
        }
        if doc.conversation_id.is_none() {
            doc.conversation_id = update.conversation_id;
        }

        if first_terminal {
            settle_if_terminal(doc)
        } else {
            relay_trace!("document {} now {}", doc.id, doc.status);
            Vec::new()
        }
    }

    /// Tracked documents that are still unsettled yet absent from a pull
    /// answer listing every non-terminal document. They have settled on the
    /// backend without this client hearing about it.
    pub fn unsettled_missing_from(&self, pending: &[StatusNotice]) -> Vec<DocumentId> {
        let listed: HashSet<&str> = pending
            .iter()
            .map(|notice| notice.document_id.as_str())
            .collect();
        self.documents
            .values()
            .filter(|doc| !doc.status.is_terminal() && !listed.contains(doc.id.as_str()))
            .map(|doc| doc.id.clone())
            .collect()
    }

    /// Counts a failed status lookup for `id` and reports whether the
    /// document is still worth waiting for. After [`MAX_LOOKUP_FAILURES`] the
    /// document is dropped.
    pub fn record_lookup_failure(&mut self, id: &str) -> bool {
        match self.documents.get(id) {
            Some(doc) if !doc.status.is_terminal() => {}
            _ => return false,
        }
        let count = self.lookup_failures.entry(id.to_string()).or_insert(0);
        *count += 1;
        let failures = *count;
        if failures < MAX_LOOKUP_FAILURES {
            return true;
        }
        relay_warn!("giving up on document {} after {} failed lookups", id, failures);
        self.untrack(id);
        false
    }

    /// Stops tracking a document, e.g. one whose upload never completed.
    pub fn untrack(&mut self, id: &str) -> Option<TrackedDocument> {
        self.lookup_failures.remove(id);
        let removed = self.documents.remove(id);
        if removed.is_some() {
            relay_debug!("no longer tracking document {}", id);
        }
        removed
    }

    /// Forgets every document belonging to `scope`.
    pub fn reset(&mut self, scope: &Scope) {
        let before = self.documents.len();
        self.documents.retain(|_, doc| doc.workspace_id != scope.workspace_id);
        let documents = &self.documents;
        self.lookup_failures.retain(|id, _| documents.contains_key(id));
        if self.scope.as_ref() == Some(scope) {
            self.scope = None;
        }
        relay_info!(
            "reset workspace {}: dropped {} tracked documents",
            scope.workspace_id,
            before - self.documents.len()
        );
    }
}

fn settle_if_terminal(doc: &TrackedDocument) -> Vec<Effect> {
    if !doc.status.is_terminal() {
        return Vec::new();
    }
    let error = match doc.status {
        DocumentStatus::Failed => Some(
            doc.error
                .clone()
                .or_else(|| doc.message.clone())
                .unwrap_or_else(|| FAILURE_FALLBACK.to_string()),
        ),
        _ => None,
    };
    relay_info!("document {} settled as {}", doc.id, doc.status);
    vec![Effect::DocumentSettled {
        document_id: doc.id.clone(),
        status: doc.status,
        error,
    }]
}
