//! Render state - data structure sent from App layer to UI for rendering

use crate::messages::ui_events::Section;
use crate::panes::PaneId;
use crate::render::Tab;

/// One pane as the UI draws it
#[derive(Debug, Clone, PartialEq)]
pub struct PaneView {
    pub id: PaneId,
    pub title: String,
    pub summary: String,
    pub tabs: Vec<Tab>,
    pub active_tab: Tab,
    pub follow_latest: bool,
    pub focused: bool,
    pub loading: bool,
    pub body: String,
    pub scroll: u16,
}

/// Complete state needed by the UI to render
#[derive(Debug, Clone, Default)]
pub struct RenderState {
    // Sidebar
    pub section: Section,
    pub items: Vec<String>,
    pub selected: usize,

    // Environment
    pub environment: Option<String>,

    // Panes
    pub panes: Vec<PaneView>,

    // Workflow step list, when one has run
    pub workflow: Option<String>,

    // Status line
    pub status: String,
    pub is_loading: bool,

    // Popups
    pub show_help: bool,
    pub export: Option<String>,
}
