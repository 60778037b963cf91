//! Pane/snapshot model
//!
//! A pane either follows the newest snapshot or stays pinned to the one it
//! shows. With two panes at least one of them follows.

use std::sync::Arc;

use crate::constants::DIFF_UNAVAILABLE;
use crate::render::diff::{diff_snapshots, diffable};
use crate::render::{ResponseSnapshot, Tab};

const NO_RESPONSE: &str = "No response yet";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaneId {
    Primary,
    Secondary,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Viewport {
    pub offset: u16,
    pub height: u16,
}

#[derive(Clone, Debug)]
pub struct ResponsePaneState {
    pub id: PaneId,
    pub active_tab: Tab,
    pub follow_latest: bool,
    pub snapshot: Option<Arc<ResponseSnapshot>>,
    pub viewport: Viewport,
}

impl ResponsePaneState {
    fn new(id: PaneId) -> Self {
        ResponsePaneState {
            id,
            active_tab: Tab::Pretty,
            follow_latest: true,
            snapshot: None,
            viewport: Viewport::default(),
        }
    }

    pub fn active_tab(&self) -> Tab {
        self.active_tab
    }

    pub fn snapshot(&self) -> Option<&Arc<ResponseSnapshot>> {
        self.snapshot.as_ref()
    }

    pub fn follow_latest(&self) -> bool {
        self.follow_latest
    }

    fn show(&mut self, snapshot: Option<Arc<ResponseSnapshot>>) {
        self.snapshot = snapshot;
        self.viewport.offset = 0;
    }
}

/// Compare context the panes can show: the rendered table and the pair
/// used for the diff tab
#[derive(Clone, Debug)]
struct CompareView {
    table: String,
    focused: Option<Arc<ResponseSnapshot>>,
    baseline: Option<Arc<ResponseSnapshot>>,
}

#[derive(Debug)]
pub struct PaneSet {
    primary: ResponsePaneState,
    secondary: Option<ResponsePaneState>,
    focused: PaneId,
    latest: Option<Arc<ResponseSnapshot>>,
    compare: Option<CompareView>,
}

impl Default for PaneSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PaneSet {
    pub fn new() -> Self {
        PaneSet {
            primary: ResponsePaneState::new(PaneId::Primary),
            secondary: None,
            focused: PaneId::Primary,
            latest: None,
            compare: None,
        }
    }

    pub fn pane(&self, id: PaneId) -> Option<&ResponsePaneState> {
        match id {
            PaneId::Primary => Some(&self.primary),
            PaneId::Secondary => self.secondary.as_ref(),
        }
    }

    fn pane_mut(&mut self, id: PaneId) -> Option<&mut ResponsePaneState> {
        match id {
            PaneId::Primary => Some(&mut self.primary),
            PaneId::Secondary => self.secondary.as_mut(),
        }
    }

    pub fn panes(&self) -> impl Iterator<Item = &ResponsePaneState> {
        std::iter::once(&self.primary).chain(self.secondary.as_ref())
    }

    pub fn focused(&self) -> PaneId {
        self.focused
    }

    pub fn is_split(&self) -> bool {
        self.secondary.is_some()
    }

    pub fn latest(&self) -> Option<&Arc<ResponseSnapshot>> {
        self.latest.as_ref()
    }

    pub fn active_tab(&self, id: PaneId) -> Option<Tab> {
        self.pane(id).map(|p| p.active_tab)
    }

    pub fn snapshot(&self, id: PaneId) -> Option<&Arc<ResponseSnapshot>> {
        self.pane(id).and_then(|p| p.snapshot.as_ref())
    }

    pub fn follow_latest(&self, id: PaneId) -> Option<bool> {
        self.pane(id).map(|p| p.follow_latest)
    }

    /// A new snapshot reached its stream: following panes switch to it,
    /// pinned panes keep what they show
    pub fn publish(&mut self, snapshot: Arc<ResponseSnapshot>) {
        self.latest = Some(snapshot.clone());
        let following = std::iter::once(&mut self.primary)
            .chain(self.secondary.as_mut())
            .filter(|p| p.follow_latest);
        for pane in following {
            pane.show(Some(snapshot.clone()));
        }
    }

    /// Open or collapse the split. A new secondary starts pinned on the
    /// pretty tab showing the live snapshot. Collapsing leaves the primary
    /// as it was, except that a pinned primary goes back to following.
    pub fn toggle_split(&mut self) {
        match self.secondary.take() {
            Some(_) => {
                self.focused = PaneId::Primary;
                if !self.primary.follow_latest {
                    self.primary.follow_latest = true;
                    self.primary.show(self.latest.clone());
                }
            }
            None => {
                let mut secondary = ResponsePaneState::new(PaneId::Secondary);
                secondary.snapshot = self.latest.clone();
                // Somebody has to keep tracking new results
                secondary.follow_latest = !self.primary.follow_latest;
                self.secondary = Some(secondary);
            }
        }
    }

    /// Pin or unpin `id`. Pinning in split mode hands following to the
    /// other pane, which jumps to the latest snapshot.
    pub fn toggle_pin(&mut self, id: PaneId) {
        let latest = self.latest.clone();
        let Some(pane) = self.pane_mut(id) else {
            return;
        };
        pane.follow_latest = !pane.follow_latest;
        if pane.follow_latest {
            pane.show(latest);
            return;
        }

        let other = match id {
            PaneId::Primary => PaneId::Secondary,
            PaneId::Secondary => PaneId::Primary,
        };
        if let Some(other) = self.pane_mut(other) {
            other.follow_latest = true;
            other.show(latest);
        }
    }

    pub fn focus_next(&mut self) {
        if self.is_split() {
            self.focused = match self.focused {
                PaneId::Primary => PaneId::Secondary,
                PaneId::Secondary => PaneId::Primary,
            };
        }
    }

    pub fn set_tab(&mut self, id: PaneId, tab: Tab) {
        if let Some(pane) = self.pane_mut(id) {
            pane.active_tab = tab;
            pane.viewport.offset = 0;
        }
    }

    /// Move `id` to the next tab it can show
    pub fn cycle_tab(&mut self, id: PaneId, forward: bool) {
        let tabs = self.available_tabs(id);
        let Some(current) = self.active_tab(id) else {
            return;
        };
        if tabs.is_empty() {
            return;
        }
        let at = tabs.iter().position(|t| *t == current);
        let next = match (at, forward) {
            (Some(i), true) => tabs[(i + 1) % tabs.len()],
            (Some(i), false) => tabs[(i + tabs.len() - 1) % tabs.len()],
            (None, _) => tabs[0],
        };
        self.set_tab(id, next);
    }

    pub fn scroll(&mut self, id: PaneId, delta: i32) {
        if let Some(pane) = self.pane_mut(id) {
            let offset = i32::from(pane.viewport.offset) + delta;
            pane.viewport.offset = offset.clamp(0, i32::from(u16::MAX)) as u16;
        }
    }

    pub fn set_viewport_height(&mut self, height: u16) {
        self.primary.viewport.height = height;
        if let Some(secondary) = self.secondary.as_mut() {
            secondary.viewport.height = height;
        }
    }

    /// Install the compare table and the focused/baseline pair
    pub fn set_compare(
        &mut self,
        table: String,
        focused: Option<Arc<ResponseSnapshot>>,
        baseline: Option<Arc<ResponseSnapshot>>,
    ) {
        self.compare = Some(CompareView {
            table,
            focused,
            baseline,
        });
    }

    pub fn clear_compare(&mut self) {
        self.compare = None;
    }

    fn pane_pair(&self) -> Option<(&Arc<ResponseSnapshot>, &Arc<ResponseSnapshot>)> {
        let secondary = self.secondary.as_ref()?;
        let a = self.primary.snapshot.as_ref()?;
        let b = secondary.snapshot.as_ref()?;
        diffable(a, b).then_some((a, b))
    }

    fn compare_pair(&self) -> Option<(&Arc<ResponseSnapshot>, &Arc<ResponseSnapshot>)> {
        let view = self.compare.as_ref()?;
        let a = view.baseline.as_ref()?;
        let b = view.focused.as_ref()?;
        diffable(a, b).then_some((a, b))
    }

    /// Two distinct ready snapshots exist, either across panes or between
    /// the focused compare row and the baseline
    pub fn diff_available(&self) -> bool {
        self.pane_pair().is_some() || self.compare_pair().is_some()
    }

    pub fn available_tabs(&self, id: PaneId) -> Vec<Tab> {
        let mut tabs = match self.snapshot(id) {
            Some(snapshot) => snapshot.tabs(),
            None => vec![Tab::Pretty],
        };
        if self.compare.is_some() && !tabs.contains(&Tab::Compare) {
            tabs.push(Tab::Compare);
        }
        if self.diff_available() {
            tabs.push(Tab::Diff);
        }
        tabs.sort();
        tabs
    }

    /// Text for the active tab of `id`
    pub fn projection(&self, id: PaneId) -> String {
        let Some(pane) = self.pane(id) else {
            return String::new();
        };
        match pane.active_tab {
            Tab::Diff => match self.pane_pair().or_else(|| self.compare_pair()) {
                Some((a, b)) => diff_snapshots(Some(a), Some(b)),
                None => DIFF_UNAVAILABLE.to_string(),
            },
            Tab::Compare => match &self.compare {
                Some(view) => view.table.clone(),
                None => String::from("No comparison yet"),
            },
            tab => match &pane.snapshot {
                Some(snapshot) => snapshot
                    .projection(tab)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Nothing to show on the {} tab", tab.title())),
                None => NO_RESPONSE.to_string(),
            },
        }
    }
}
