//! Firestore QuerySnapshot and DocumentChange types

use super::document_snapshot::DocumentSnapshot;
use super::timestamp::Timestamp;

/// Result set of a listened query at one consistent point in time
#[derive(Debug, Clone)]
pub struct QuerySnapshot {
    /// Matching documents in query order
    pub documents: Vec<DocumentSnapshot>,

    /// Differences from the previous snapshot of the same listener
    ///
    /// For the first snapshot every document is reported as added.
    pub changes: Vec<DocumentChange>,

    /// Time at which the result set was consistent
    pub read_time: Option<Timestamp>,
}

impl QuerySnapshot {
    /// Check if the query result is empty
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Get the number of documents in the snapshot
    pub fn len(&self) -> usize {
        self.documents.len()
    }
}

/// Kind of change a document went through between two snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentChangeKind {
    /// Document entered the result set
    Added,
    /// Document stayed in the result set with new contents
    Modified,
    /// Document left the result set
    Removed,
}

/// A change to a document in a query snapshot
#[derive(Debug, Clone)]
pub struct DocumentChange {
    /// Type of change
    pub kind: DocumentChangeKind,

    /// The document after the change (before it, for removals)
    pub document: DocumentSnapshot,

    /// Position in the previous snapshot (`None` if added)
    pub old_index: Option<usize>,

    /// Position in the new snapshot (`None` if removed)
    pub new_index: Option<usize>,
}
