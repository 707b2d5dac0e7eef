use crate::fs::entry::EntryRef;

/// Read-only description of a matched dispatch, handed to the handler.
///
/// Borrowed values are valid only for the duration of the handler call;
/// handlers that need to retain the path or captures must copy them.
pub struct RouteMetadata {
    path: String,
    captures: Vec<String>,
    parent: Option<EntryRef>,
    new_parent: Option<EntryRef>,
    new_path: Option<String>,
}

impl RouteMetadata {
    pub(crate) fn new(path: &str, captures: Vec<String>) -> Self {
        Self {
            path: path.to_string(),
            captures,
            parent: None,
            new_parent: None,
            new_path: None,
        }
    }

    pub(crate) fn with_parent(mut self, parent: EntryRef) -> Self {
        self.parent = Some(parent);
        self
    }

    pub(crate) fn with_rename(mut self, new_parent: EntryRef, new_path: &str) -> Self {
        self.new_parent = Some(new_parent);
        self.new_path = Some(new_path.to_string());
        self
    }

    /// The absolute path that matched the route's pattern.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Number of parenthesized groups in the route's pattern.
    pub fn num_captures(&self) -> usize {
        self.captures.len()
    }

    /// Captured substrings, one per group in declaration order.
    pub fn captures(&self) -> &[String] {
        &self.captures
    }

    /// Parent of the matched entry, write-locked by the caller for the
    /// duration of the dispatch. Create, mknod, mkdir, and rename only.
    pub fn parent(&self) -> Option<&EntryRef> {
        self.parent.as_ref()
    }

    /// Parent of the rename destination, write-locked by the caller for
    /// the duration of the dispatch. Rename only.
    pub fn new_parent(&self) -> Option<&EntryRef> {
        self.new_parent.as_ref()
    }

    /// Path the entry is being renamed to. Rename only.
    pub fn new_path(&self) -> Option<&str> {
        self.new_path.as_deref()
    }
}
