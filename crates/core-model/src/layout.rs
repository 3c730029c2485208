//! Screen geometry for one or two file panes and the prompt line.
//!
//! Coordinates are terminal cells (`u16`). Each pane is a status row followed
//! by `rows_per_file` data rows; the prompt occupies the bottom rows. With two
//! panes the bottom pane starts right after the top one, so an odd remainder
//! of rows ends up as blank space above the prompt.

use core_config::ConfigContext;
use core_events::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutRegion {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl LayoutRegion {
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaneRegions {
    pub status: LayoutRegion,
    pub data: LayoutRegion,
}

#[derive(Debug, Clone)]
pub struct Layout {
    panes: Vec<PaneRegions>,
    prompt: LayoutRegion,
}

impl Layout {
    pub fn from_context(ctx: ConfigContext) -> Self {
        let width = ctx.viewport_columns;
        let rows = ctx.rows_per_file();
        let pane_count = if ctx.two_files { 2 } else { 1 };
        let mut y = 0u16;
        let mut panes = Vec::with_capacity(pane_count);
        for _ in 0..pane_count {
            let status = LayoutRegion::new(0, y, width, ctx.status_rows);
            y = y.saturating_add(ctx.status_rows);
            let data = LayoutRegion::new(0, y, width, rows);
            y = y.saturating_add(rows);
            panes.push(PaneRegions { status, data });
        }
        let prompt_y = ctx.viewport_rows.saturating_sub(ctx.prompt_rows);
        Self {
            panes,
            prompt: LayoutRegion::new(0, prompt_y, width, ctx.prompt_rows),
        }
    }

    pub fn pane(&self, side: Side) -> Option<&PaneRegions> {
        self.panes.get(side.index())
    }

    pub fn panes(&self) -> &[PaneRegions] {
        &self.panes
    }

    pub fn prompt(&self) -> &LayoutRegion {
        &self.prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_panes_stack_above_prompt() {
        let l = Layout::from_context(ConfigContext::new(80, 25, 1, 1, true));
        let top = l.pane(Side::Top).unwrap();
        let bottom = l.pane(Side::Bottom).unwrap();
        assert_eq!(top.status.y, 0);
        assert_eq!((top.data.y, top.data.height), (1, 11));
        assert_eq!(bottom.status.y, 12);
        assert_eq!((bottom.data.y, bottom.data.height), (13, 11));
        assert_eq!(l.prompt().y, 24);
    }

    #[test]
    fn single_pane_takes_all_rows() {
        let l = Layout::from_context(ConfigContext::new(80, 24, 1, 1, false));
        assert_eq!(l.panes().len(), 1);
        assert!(l.pane(Side::Bottom).is_none());
        assert_eq!(l.pane(Side::Top).unwrap().data.height, 22);
    }
}
