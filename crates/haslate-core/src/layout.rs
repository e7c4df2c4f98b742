// ── Layout resolution ──
//
// Maps the logical grid of each configured page onto screen pixels and
// builds the widget behind every item. Pure: the same configuration and
// screen size always give the same layout.

use std::sync::Arc;

use haslate_config::{ApplicationConfig, GridSpec, WidgetKind, WidgetSpec, WidgetStyle};
use serde::Serialize;

use crate::error::{CoreError, LayoutError};
use crate::widget::Widget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Pixel rectangle; `x + width` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x
            && p.y >= self.y
            && p.x - self.x < self.width
            && p.y - self.y < self.height
    }
}

/// One placed widget.
#[derive(Debug, Clone)]
pub struct WidgetInstance {
    /// Position in the page's item list; also its z-order.
    pub index: usize,
    pub rect: Rect,
    pub kind: WidgetKind,
    pub widget: Widget,
    pub style: Arc<WidgetStyle>,
}

#[derive(Debug, Clone)]
pub struct PageLayout {
    pub name: String,
    pub widgets: Vec<WidgetInstance>,
}

#[derive(Debug, Clone)]
pub struct Layout {
    pub screen: ScreenSize,
    pub pages: Vec<PageLayout>,
}

impl Layout {
    pub fn page(&self, index: usize) -> Option<&PageLayout> {
        self.pages.get(index)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Cell dimensions and the padding that centres the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cells {
    width: u32,
    height: u32,
    pad_x: u32,
    pad_y: u32,
}

fn cells(grid: GridSpec, screen: ScreenSize) -> Result<Cells, LayoutError> {
    let too_small = || LayoutError::ScreenTooSmall {
        width: screen.width,
        height: screen.height,
        columns: grid.columns,
        rows: grid.rows,
    };
    let (columns, rows) = (u32::from(grid.columns), u32::from(grid.rows));
    if columns == 0 || rows == 0 {
        return Err(too_small());
    }
    let (width, height) = (screen.width / columns, screen.height / rows);
    if width == 0 || height == 0 {
        return Err(too_small());
    }
    Ok(Cells {
        width,
        height,
        pad_x: (screen.width % columns) / 2,
        pad_y: (screen.height % rows) / 2,
    })
}

fn place(
    spec: &WidgetSpec,
    grid: GridSpec,
    cells: Cells,
    page: usize,
    index: usize,
) -> Result<Rect, LayoutError> {
    let out_of_bounds = |reason: String| LayoutError::OutOfBounds {
        page,
        index,
        reason,
    };
    let (col, row) = (u32::from(spec.at.col), u32::from(spec.at.row));
    let (w, h) = (u32::from(spec.size.width), u32::from(spec.size.height));

    if col == 0 || row == 0 {
        return Err(out_of_bounds(format!("cells are 1-based, got [{col}, {row}]")));
    }
    if w == 0 || h == 0 {
        return Err(out_of_bounds(format!("size [{w}, {h}] is empty")));
    }
    if col + w - 1 > u32::from(grid.columns) || row + h - 1 > u32::from(grid.rows) {
        return Err(out_of_bounds(format!(
            "[{col}, {row}] size [{w}, {h}] exceeds the {}x{} grid",
            grid.columns, grid.rows
        )));
    }

    Ok(Rect {
        x: (col - 1) * cells.width + cells.pad_x,
        y: (row - 1) * cells.height + cells.pad_y,
        width: w * cells.width,
        height: h * cells.height,
    })
}

/// Resolve every page of `config` for a screen of `screen` pixels.
pub fn resolve(config: &ApplicationConfig, screen: ScreenSize) -> Result<Layout, CoreError> {
    let cells = cells(config.grid, screen)?;

    let pages = config
        .pages
        .iter()
        .enumerate()
        .map(|(page, page_config)| {
            let widgets = page_config
                .items
                .iter()
                .enumerate()
                .map(|(index, spec)| {
                    let rect = place(spec, config.grid, cells, page, index)?;
                    let widget = Widget::build(spec).map_err(|reason| {
                        LayoutError::InvalidWidget {
                            page,
                            index,
                            reason,
                        }
                    })?;
                    Ok(WidgetInstance {
                        index,
                        rect,
                        kind: spec.kind,
                        widget,
                        style: Arc::new(spec.style.clone()),
                    })
                })
                .collect::<Result<Vec<_>, LayoutError>>()?;
            Ok(PageLayout {
                name: page_config.name.clone(),
                widgets,
            })
        })
        .collect::<Result<Vec<_>, LayoutError>>()?;

    tracing::debug!(
        pages = pages.len(),
        width = screen.width,
        height = screen.height,
        "resolved layout"
    );
    Ok(Layout { screen, pages })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use haslate_config::Config;
    use pretty_assertions::assert_eq;

    use super::*;

    fn app(yaml_items: &str) -> ApplicationConfig {
        let yaml = format!(
            "application:\n  hub_uri: wss://hub.local/api/websocket\n  hub_token: t\n  grid: [12, 8]\n  pages:\n    - name: main\n      items:\n{yaml_items}"
        );
        Config::from_yaml_str(&yaml).unwrap().application
    }

    fn rects(layout: &Layout) -> Vec<Rect> {
        layout.pages[0].widgets.iter().map(|w| w.rect).collect()
    }

    const SCREEN: ScreenSize = ScreenSize::new(1200, 800);

    #[test]
    fn spans_cover_whole_cells() {
        let config = app(
            "        - at: [7, 1]\n          size: [6, 1]\n          type: empty\n        - at: [1, 1]\n          type: empty\n",
        );
        let layout = resolve(&config, SCREEN).unwrap();
        assert_eq!(
            rects(&layout),
            [
                Rect {
                    x: 600,
                    y: 0,
                    width: 600,
                    height: 100
                },
                Rect {
                    x: 0,
                    y: 0,
                    width: 100,
                    height: 100
                },
            ]
        );
    }

    #[test]
    fn out_of_grid_item_is_rejected() {
        let config = app("        - at: [12, 8]\n          size: [2, 2]\n          type: empty\n");
        let err = resolve(&config, SCREEN).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Layout(LayoutError::OutOfBounds { page: 0, index: 0, .. })
        ));
    }

    #[test]
    fn remainder_becomes_padding() {
        let config = app("        - at: [1, 1]\n          type: empty\n");
        let layout = resolve(&config, ScreenSize::new(1205, 803)).unwrap();
        assert_eq!(
            rects(&layout)[0],
            Rect {
                x: 2,
                y: 1,
                width: 100,
                height: 100
            }
        );
    }

    #[test]
    fn tiny_screen_is_rejected() {
        let config = app("        - at: [1, 1]\n          type: empty\n");
        assert!(matches!(
            resolve(&config, ScreenSize::new(11, 800)),
            Err(CoreError::Layout(LayoutError::ScreenTooSmall { .. }))
        ));
    }

    #[test]
    fn malformed_widget_is_reported_with_position() {
        let config = app(
            "        - at: [1, 1]\n          type: empty\n        - at: [2, 1]\n          type: hass_sensor\n",
        );
        let err = resolve(&config, SCREEN).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Layout(LayoutError::InvalidWidget { page: 0, index: 1, .. })
        ));
    }

    #[test]
    fn resolution_is_deterministic() {
        let config = app(
            "        - at: [3, 2]\n          size: [2, 3]\n          type: datetime\n        - at: [1, 1]\n          type: battery\n          format: percent\n",
        );
        let a = resolve(&config, SCREEN).unwrap();
        let b = resolve(&config, SCREEN).unwrap();
        assert_eq!(rects(&a), rects(&b));
    }

    #[test]
    fn rect_contains_is_half_open() {
        let r = Rect {
            x: 10,
            y: 10,
            width: 5,
            height: 5,
        };
        assert!(r.contains(Point::new(10, 10)));
        assert!(r.contains(Point::new(14, 14)));
        assert!(!r.contains(Point::new(15, 10)));
        assert!(!r.contains(Point::new(9, 12)));
    }
}
