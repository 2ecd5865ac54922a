//! Editor adapter
//!
//! Bridges the replicated document to a rendering widget. The widget is
//! reached through the [`RenderSurface`] capability: it receives blocks to
//! render and selections to show, and reports edits and selection changes
//! back through the adapter. Selections are stored as sticky indices so
//! they stay on the same text while remote edits land around them.

use crate::assist::{AiEditRequest, EditMode};
use crate::awareness::CursorRange;
use crate::crdt::{Block, Document, LocalOp, StickyIndex, Update};
use crate::error::{Result, SyncError};
use crate::session::{Notification, Outgoing, PeerSession, SessionEvent};
use crate::{ClientId, Millis};
use std::collections::VecDeque;
use tracing::debug;

/// Default character limit
pub const DEFAULT_MAX_LENGTH: usize = 20_000;

/// Capability provided by the rich-text widget
pub trait RenderSurface {
    /// Replace the rendered content
    fn render(&mut self, blocks: &[Block]);

    /// Show the local selection (character positions)
    fn set_selection(&mut self, anchor: usize, head: usize);

    /// Show other participants' cursors
    fn render_cursors(&mut self, _cursors: &[RemoteCursor]) {}

    /// Text shown while the document is empty
    fn set_placeholder(&mut self, _text: &str) {}
}

/// Another participant's cursor, resolved to positions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCursor {
    pub client: ClientId,
    pub name: String,
    pub color: String,
    pub anchor: usize,
    pub head: usize,
}

/// Where the edited document comes from
#[derive(Debug, Default)]
pub enum CollaborationSource {
    /// Local-only document
    #[default]
    Absent,
    /// Document owned by a peer session
    Shared(PeerSession),
}

#[derive(Debug)]
pub struct EditorConfig {
    pub placeholder: String,
    pub max_length: usize,
    pub collaboration_source: CollaborationSource,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            placeholder: "Start writing...".to_string(),
            max_length: DEFAULT_MAX_LENGTH,
            collaboration_source: CollaborationSource::Absent,
        }
    }
}

/// Something the host UI should react to
#[derive(Debug)]
pub enum EditorEvent {
    /// The local selection moved; `text` is the selected text
    SelectionChanged {
        anchor: usize,
        head: usize,
        text: String,
    },
    /// Forwarded from the peer session
    Session(Notification),
}

enum Source {
    Local(Document),
    Shared(PeerSession),
}

pub struct EditorAdapter<S: RenderSurface> {
    surface: S,
    source: Source,
    placeholder: String,
    max_length: usize,
    /// (anchor, head)
    selection: Option<(StickyIndex, StickyIndex)>,
    events: VecDeque<EditorEvent>,
}

impl<S: RenderSurface> EditorAdapter<S> {
    /// Attach `surface` and render the current document
    pub fn new(mut surface: S, config: EditorConfig) -> Self {
        let source = match config.collaboration_source {
            CollaborationSource::Absent => Source::Local(Document::new(crate::session::random_client_id())),
            CollaborationSource::Shared(session) => Source::Shared(session),
        };
        surface.set_placeholder(&config.placeholder);

        let mut adapter = Self {
            surface,
            source,
            placeholder: config.placeholder,
            max_length: config.max_length,
            selection: None,
            events: VecDeque::new(),
        };
        adapter.rerender();
        adapter
    }

    pub fn document(&self) -> &Document {
        match &self.source {
            Source::Local(doc) => doc,
            Source::Shared(session) => session.document(),
        }
    }

    pub fn session(&self) -> Option<&PeerSession> {
        match &self.source {
            Source::Local(_) => None,
            Source::Shared(session) => Some(session),
        }
    }

    pub fn session_mut(&mut self) -> Option<&mut PeerSession> {
        match &mut self.source {
            Source::Local(_) => None,
            Source::Shared(session) => Some(session),
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Current selection as (anchor, head) positions
    pub fn selection(&self) -> Option<(usize, usize)> {
        let (anchor, head) = self.selection?;
        let doc = self.document();
        Some((doc.resolve_sticky(&anchor), doc.resolve_sticky(&head)))
    }

    /// Selected text (empty for a caret or no selection)
    pub fn selection_text(&self) -> String {
        match self.selection() {
            Some((anchor, head)) => self
                .document()
                .text_range(anchor.min(head), anchor.max(head)),
            None => String::new(),
        }
    }

    /// Selection reported by the widget
    pub fn on_selection_change(&mut self, anchor: usize, head: usize) {
        let len = self.document().len();
        let (anchor, head) = (anchor.min(len), head.min(len));
        let sticky = {
            let doc = self.document();
            (doc.sticky_index(anchor), doc.sticky_index(head))
        };
        self.selection = Some(sticky);

        if let Source::Shared(session) = &mut self.source {
            session.set_cursor(Some(CursorRange {
                anchor: sticky.0,
                head: sticky.1,
            }));
        }
        let text = self.selection_text();
        self.events.push_back(EditorEvent::SelectionChanged { anchor, head, text });
    }

    /// The widget lost focus
    pub fn clear_selection(&mut self) {
        self.selection = None;
        if let Source::Shared(session) = &mut self.source {
            session.set_cursor(None);
        }
    }

    /// Structural edits typed into the widget, applied as one update
    pub fn apply_edits(&mut self, ops: Vec<LocalOp>) -> Result<Update> {
        self.check_length(&ops)?;
        let update = match &mut self.source {
            Source::Local(doc) => doc.apply_local_batch(ops),
            Source::Shared(session) => session.apply_local(ops)?,
        };
        Ok(update)
    }

    /// Insert at the caret (document end without a selection)
    pub fn insert_at_cursor(&mut self, text: &str) -> Result<Update> {
        let pos = match self.selection() {
            Some((_, head)) => head,
            None => self.document().len(),
        };
        let update = self.apply_edits(vec![LocalOp::insert(pos, text)])?;
        self.rerender();
        Ok(update)
    }

    /// Replace the selected text; produces exactly one update
    pub fn replace_selection(&mut self, text: &str) -> Result<Update> {
        let (start, end) = match self.selection() {
            Some((anchor, head)) => (anchor.min(head), anchor.max(head)),
            None => {
                let len = self.document().len();
                (len, len)
            }
        };

        let mut ops = Vec::with_capacity(2);
        if end > start {
            ops.push(LocalOp::delete(start, end - start));
        }
        if !text.is_empty() {
            ops.push(LocalOp::insert(start, text));
        }
        let update = self.apply_edits(ops)?;

        let caret = start + text.chars().count();
        self.on_selection_change(caret, caret);
        self.rerender();
        Ok(update)
    }

    /// Accept an AI suggestion for the current selection
    pub fn apply_suggestion(&mut self, suggestion: &str) -> Result<Update> {
        debug!(chars = suggestion.chars().count(), "applying suggestion");
        self.replace_selection(suggestion)
    }

    /// AI edit request for the current selection; `None` when nothing is selected
    pub fn selection_request(
        &self,
        mode: EditMode,
        instruction: Option<String>,
    ) -> Option<AiEditRequest> {
        let selection = self.selection_text();
        if selection.is_empty() {
            return None;
        }
        Some(AiEditRequest::new(mode, selection, instruction))
    }

    /// Drive the session and re-render on remote changes
    ///
    /// Returns the frames to publish. Local-only editors return nothing.
    pub fn pump(&mut self, now: Millis) -> Vec<Outgoing> {
        let (notifications, outgoing) = match &mut self.source {
            Source::Local(_) => return Vec::new(),
            Source::Shared(session) => {
                session.process(now);
                (session.take_notifications(), session.take_outgoing())
            }
        };

        let mut rerender = false;
        let mut cursors = false;
        for notification in notifications {
            match notification {
                Notification::DocumentChanged => rerender = true,
                Notification::AwarenessChanged(_)
                | Notification::PeerJoined(_)
                | Notification::PeerLeft(_) => cursors = true,
                _ => {}
            }
            self.events.push_back(EditorEvent::Session(notification));
        }
        if rerender {
            self.rerender();
        } else if cursors {
            self.render_cursors();
        }
        outgoing
    }

    /// Hand a frame received from the relay to the session
    pub fn receive_frame(&mut self, frame: bytes::Bytes) {
        if let Source::Shared(session) = &mut self.source {
            session.enqueue(SessionEvent::Frame(frame));
        }
    }

    pub fn take_events(&mut self) -> Vec<EditorEvent> {
        self.events.drain(..).collect()
    }

    fn check_length(&self, ops: &[LocalOp]) -> Result<()> {
        let mut length = self.document().len();
        for op in ops {
            match op {
                LocalOp::Insert { text, .. } => length += text.chars().count(),
                LocalOp::Delete { index, len } => {
                    let available = length.saturating_sub(*index);
                    length -= (*len).min(available);
                }
                LocalOp::Format { .. } => {}
            }
        }
        if length > self.max_length {
            return Err(SyncError::LengthLimit {
                length,
                limit: self.max_length,
            });
        }
        Ok(())
    }

    fn rerender(&mut self) {
        let blocks = self.document().blocks();
        self.surface.render(&blocks);
        if let Some((anchor, head)) = self.selection() {
            self.surface.set_selection(anchor, head);
        }
        self.render_cursors();
    }

    fn render_cursors(&mut self) {
        let cursors = self.remote_cursors();
        self.surface.render_cursors(&cursors);
    }

    /// Other participants' cursors resolved against the current document
    pub fn remote_cursors(&self) -> Vec<RemoteCursor> {
        let Source::Shared(session) = &self.source else {
            return Vec::new();
        };
        let doc = session.document();
        let mut cursors: Vec<RemoteCursor> = session
            .awareness()
            .states()
            .values()
            .filter(|p| p.client != session.client_id())
            .filter_map(|p| {
                let cursor = p.state.cursor?;
                Some(RemoteCursor {
                    client: p.client,
                    name: p.state.name.clone(),
                    color: p.state.color.clone(),
                    anchor: doc.resolve_sticky(&cursor.anchor),
                    head: doc.resolve_sticky(&cursor.head),
                })
            })
            .collect();
        cursors.sort_by_key(|c| c.client);
        cursors
    }
}
