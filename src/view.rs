//! Master-detail view controller: which panel is visible, and for which
//! commission, independent of the data layer.

use uuid::Uuid;

/// The single visible panel. Only one mode at a time; no stacking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanelMode {
    #[default]
    None,
    Detail,
    Create,
    Edit,
    Search,
    History,
}

/// What the caller must do when a panel closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed,
    /// Label-relevant data changed while the detail panel was open; prompt
    /// the user to reprint before discarding.
    PromptReprint,
}

/// Selection and panel state. Label-dirtiness is derived state living here,
/// never persisted.
#[derive(Debug, Default)]
pub struct ViewController {
    mode: PanelMode,
    active: Option<Uuid>,
    edit_origin: Option<Uuid>,
    label_dirty: bool,
}

impl ViewController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> PanelMode {
        self.mode
    }

    pub fn active_commission(&self) -> Option<Uuid> {
        self.active
    }

    pub fn open_detail(&mut self, id: Uuid) {
        self.mode = PanelMode::Detail;
        self.active = Some(id);
        self.edit_origin = None;
        self.label_dirty = false;
    }

    pub fn open_create(&mut self) {
        self.mode = PanelMode::Create;
        self.active = None;
        self.edit_origin = None;
    }

    /// Opens the edit panel. When the detail panel for the same commission is
    /// open, the originating detail context is remembered and restored after
    /// a successful save.
    pub fn open_edit(&mut self, id: Uuid) {
        self.edit_origin = match (self.mode, self.active) {
            (PanelMode::Detail, Some(current)) if current == id => Some(id),
            _ => None,
        };
        self.mode = PanelMode::Edit;
        self.active = Some(id);
    }

    pub fn open_search(&mut self) {
        self.mode = PanelMode::Search;
        self.active = None;
        self.edit_origin = None;
    }

    pub fn open_history(&mut self) {
        self.mode = PanelMode::History;
        self.active = None;
        self.edit_origin = None;
    }

    /// Called after a save completes: returns to the originating detail view
    /// when there is one, otherwise to the bare list.
    pub fn save_completed(&mut self) {
        match self.edit_origin.take() {
            Some(origin) => {
                self.mode = PanelMode::Detail;
                self.active = Some(origin);
            }
            None => {
                self.mode = PanelMode::None;
                self.active = None;
            }
        }
    }

    /// Marks label-relevant data (backorder flag, item note) as changed.
    pub fn mark_label_dirty(&mut self) {
        if self.mode == PanelMode::Detail {
            self.label_dirty = true;
        }
    }

    pub fn is_label_dirty(&self) -> bool {
        self.label_dirty
    }

    /// Closes the visible panel and clears the selection.
    pub fn close(&mut self) -> CloseOutcome {
        let outcome = if self.label_dirty {
            CloseOutcome::PromptReprint
        } else {
            CloseOutcome::Closed
        };
        self.mode = PanelMode::None;
        self.active = None;
        self.edit_origin = None;
        self.label_dirty = false;
        outcome
    }

    /// Clears the selection if it points at the given commission, e.g. after
    /// its return completed.
    pub fn clear_selection_of(&mut self, id: Uuid) {
        if self.active == Some(id) {
            self.close();
        }
    }
}
