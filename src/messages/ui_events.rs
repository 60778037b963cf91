//! UI events - messages from UI layer to App layer

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Events generated from user input in the UI layer
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    // Sidebar navigation
    NextSection,
    PrevSection,
    SelectNext,
    SelectPrev,
    /// Send the selected request, run the selected workflow or replay the
    /// selected history entry
    Activate,

    // Execution
    SendRequest,
    CompareRequest,
    CancelRequest,
    CycleEnvironment,

    // Panes
    NextTab,
    PrevTab,
    ToggleSplit,
    TogglePin,
    FocusNextPane,
    ScrollUp,
    ScrollDown,
    Resize(u16),

    // Compare rows
    CompareNext,
    ComparePrev,

    // cURL
    ExportCurl,
    CloseExport,

    // Popups
    ToggleHelp,
    CloseHelp,

    // System
    Quit,
}

/// Sidebar sections
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Section {
    #[default]
    Requests,
    Workflows,
    History,
}

impl Section {
    pub fn next(&self) -> Section {
        match self {
            Section::Requests => Section::Workflows,
            Section::Workflows => Section::History,
            Section::History => Section::Requests,
        }
    }

    pub fn prev(&self) -> Section {
        match self {
            Section::Requests => Section::History,
            Section::Workflows => Section::Requests,
            Section::History => Section::Workflows,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Section::Requests => "Requests",
            Section::Workflows => "Workflows",
            Section::History => "History",
        }
    }
}

/// Convert a key event to a UiEvent based on which popup is open
pub fn key_to_ui_event(key: KeyEvent, show_help: bool, show_export: bool) -> Option<UiEvent> {
    use crossterm::event::KeyEventKind;

    if key.kind != KeyEventKind::Press {
        return None;
    }

    // Global Ctrl shortcuts
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('x') => return Some(UiEvent::CancelRequest),
            KeyCode::Char('c') => return Some(UiEvent::Quit),
            _ => {}
        }
    }

    // Popups swallow everything else
    if show_help {
        return Some(UiEvent::CloseHelp);
    }
    if show_export {
        return Some(UiEvent::CloseExport);
    }

    match key.code {
        KeyCode::Char('q') => Some(UiEvent::Quit),
        KeyCode::Char('?') => Some(UiEvent::ToggleHelp),
        KeyCode::Left => Some(UiEvent::PrevSection),
        KeyCode::Right => Some(UiEvent::NextSection),
        KeyCode::Up => Some(UiEvent::SelectPrev),
        KeyCode::Down => Some(UiEvent::SelectNext),
        KeyCode::Enter => Some(UiEvent::Activate),
        KeyCode::Char('s') => Some(UiEvent::SendRequest),
        KeyCode::Char('c') => Some(UiEvent::CompareRequest),
        KeyCode::Char('x') => Some(UiEvent::CancelRequest),
        KeyCode::Char('e') => Some(UiEvent::CycleEnvironment),
        KeyCode::Tab => Some(UiEvent::NextTab),
        KeyCode::BackTab => Some(UiEvent::PrevTab),
        KeyCode::Char('v') => Some(UiEvent::ToggleSplit),
        KeyCode::Char('p') => Some(UiEvent::TogglePin),
        KeyCode::Char('f') => Some(UiEvent::FocusNextPane),
        KeyCode::Char('k') | KeyCode::PageUp => Some(UiEvent::ScrollUp),
        KeyCode::Char('j') | KeyCode::PageDown => Some(UiEvent::ScrollDown),
        KeyCode::Char(']') => Some(UiEvent::CompareNext),
        KeyCode::Char('[') => Some(UiEvent::ComparePrev),
        KeyCode::Char('y') => Some(UiEvent::ExportCurl),
        _ => None,
    }
}
