// ── Binding engine ──
//
// Connects a resolved layout to the entity store. A single store listener
// flips per-widget dirty flags through an entity → widget index; the
// foreground loop pulls draw commands for whatever is dirty on the page
// being shown. Taps are hit-tested top-most first and turned into hub
// commands or local actions.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use haslate_api::{HubHandle, ServiceCall};
use haslate_config::WidgetStyle;
use tracing::{debug, warn};

use crate::layout::{Layout, Point, Rect};
use crate::model::EntityId;
use crate::store::{EntityStore, ListenerId};
use crate::widget::{LocalAction, WidgetAction, WidgetBehavior, WidgetContent};

/// Where widget activations send their hub commands.
pub trait CommandSink: Send + Sync {
    /// Queue `call`, returning its correlation id.
    fn submit(&self, call: ServiceCall) -> Result<u64, haslate_api::Error>;
}

impl CommandSink for HubHandle {
    fn submit(&self, call: ServiceCall) -> Result<u64, haslate_api::Error> {
        HubHandle::submit(self, call)
    }
}

/// One widget to (re)draw.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCommand {
    pub index: usize,
    pub rect: Rect,
    pub content: WidgetContent,
    pub style: Arc<WidgetStyle>,
}

/// Result of a tap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// Nothing there, or the widget ignores taps.
    Ignored,
    Submitted { id: u64 },
    /// The command could not be queued (typically: not connected).
    Dropped { reason: String },
    Local(LocalAction),
}

/// Dirty flags for every widget on every page.
struct DirtySet {
    flags: Vec<Vec<AtomicBool>>,
    /// Which (page, widget) slots read each entity.
    bound: HashMap<EntityId, Vec<(usize, usize)>>,
}

impl DirtySet {
    fn new(layout: &Layout) -> Self {
        let mut bound: HashMap<EntityId, Vec<(usize, usize)>> = HashMap::new();
        let flags = layout
            .pages
            .iter()
            .enumerate()
            .map(|(p, page)| {
                page.widgets
                    .iter()
                    .enumerate()
                    .map(|(w, instance)| {
                        for id in instance.widget.bindings() {
                            bound.entry(id).or_default().push((p, w));
                        }
                        AtomicBool::new(true)
                    })
                    .collect()
            })
            .collect();
        Self { flags, bound }
    }

    fn mark_entity(&self, id: &EntityId) {
        for &(p, w) in self.bound.get(id).into_iter().flatten() {
            if let Some(flag) = self.flags.get(p).and_then(|page| page.get(w)) {
                flag.store(true, Ordering::Release);
            }
        }
    }

    fn mark_page(&self, page: usize) {
        for flag in self.flags.get(page).into_iter().flatten() {
            flag.store(true, Ordering::Release);
        }
    }

    fn page(&self, page: usize) -> &[AtomicBool] {
        self.flags.get(page).map(Vec::as_slice).unwrap_or_default()
    }
}

pub struct BindingEngine {
    layout: Layout,
    store: Arc<EntityStore>,
    sink: Arc<dyn CommandSink>,
    dirty: Arc<DirtySet>,
    listener: ListenerId,
    page: usize,
}

impl BindingEngine {
    pub fn new(layout: Layout, store: Arc<EntityStore>, sink: Arc<dyn CommandSink>) -> Self {
        let dirty = Arc::new(DirtySet::new(&layout));
        let marker = Arc::clone(&dirty);
        let listener = store.on_change(move |id| marker.mark_entity(id));
        debug!(
            pages = layout.page_count(),
            bound_entities = dirty.bound.len(),
            "binding engine ready"
        );
        Self {
            layout,
            store,
            sink,
            dirty,
            listener,
            page: 0,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn page_index(&self) -> usize {
        self.page
    }

    pub fn page_name(&self) -> Option<&str> {
        self.layout.page(self.page).map(|p| p.name.as_str())
    }

    /// Whether any widget on the current page needs a redraw.
    pub fn is_dirty(&self) -> bool {
        self.dirty
            .page(self.page)
            .iter()
            .any(|f| f.load(Ordering::Acquire))
    }

    /// Draw commands for dirty widgets of the current page, in z-order.
    /// Clears their flags.
    pub fn take_frame(&self) -> Vec<DrawCommand> {
        self.frame(|flag| flag.swap(false, Ordering::AcqRel))
    }

    /// Draw commands for every widget of the current page. Clears all
    /// flags of the page.
    pub fn full_frame(&self) -> Vec<DrawCommand> {
        self.frame(|flag| {
            flag.store(false, Ordering::Release);
            true
        })
    }

    fn frame(&self, mut take: impl FnMut(&AtomicBool) -> bool) -> Vec<DrawCommand> {
        let Some(page) = self.layout.page(self.page) else {
            return Vec::new();
        };
        page.widgets
            .iter()
            .zip(self.dirty.page(self.page))
            .filter(|(_, flag)| take(flag))
            .map(|(instance, _)| DrawCommand {
                index: instance.index,
                rect: instance.rect,
                content: instance.widget.render(&self.store),
                style: Arc::clone(&instance.style),
            })
            .collect()
    }

    // ── Pages ────────────────────────────────────────────────────────

    /// Switch to page `index`; out-of-range indices are ignored.
    pub fn show_page(&mut self, index: usize) -> bool {
        if index >= self.layout.page_count() {
            return false;
        }
        self.page = index;
        self.dirty.mark_page(index);
        debug!(page = index, "showing page");
        true
    }

    pub fn next_page(&mut self) {
        let count = self.layout.page_count();
        if count > 0 {
            self.show_page((self.page + 1) % count);
        }
    }

    pub fn previous_page(&mut self) {
        let count = self.layout.page_count();
        if count > 0 {
            self.show_page((self.page + count - 1) % count);
        }
    }

    // ── Input ────────────────────────────────────────────────────────

    /// Activate the top-most widget under `point` on the current page.
    ///
    /// Hub commands are submitted without touching the widget; it changes
    /// only when the hub reports the new state.
    pub fn activate_at(&self, point: Point) -> Activation {
        let hit = self
            .layout
            .page(self.page)
            .and_then(|page| page.widgets.iter().rev().find(|w| w.rect.contains(point)));
        let Some(instance) = hit else {
            return Activation::Ignored;
        };

        match instance.widget.activate(&self.store) {
            WidgetAction::None => Activation::Ignored,
            WidgetAction::Local(action) => Activation::Local(action),
            WidgetAction::Command(call) => {
                let service = format!("{}.{}", call.domain, call.service);
                match self.sink.submit(call) {
                    Ok(id) => {
                        debug!(id, %service, widget = instance.index, "command submitted");
                        Activation::Submitted { id }
                    }
                    Err(e) => {
                        warn!(error = %e, %service, "command dropped");
                        Activation::Dropped {
                            reason: e.to_string(),
                        }
                    }
                }
            }
        }
    }
}

impl Drop for BindingEngine {
    fn drop(&mut self) {
        self.store.remove_listener(self.listener);
    }
}
