use std::borrow::Cow;

use crate::surface::DrawSurface;
use crate::types::{Margins, Mm, Size};

/// Marker appended to a truncated text preview.
pub const ELLIPSIS: &str = "...";

/// Mutable per-report layout state. Owned by one generation for its whole
/// lifetime; never shared across concurrent generations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutCursor {
    /// 1-based page the cursor sits on.
    pub page: usize,
    /// Distance from the page top, in millimetres.
    pub y: Mm,
}

/// Page geometry shared by the planner and the assembler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub page_size: Size,
    pub margins: Margins,
}

impl PageGeometry {
    pub fn content_width(&self) -> Mm {
        (self.page_size.width - self.margins.left - self.margins.right).max(Mm::ZERO)
    }

    pub fn left(&self) -> Mm {
        self.margins.left
    }

    pub fn right(&self) -> Mm {
        self.page_size.width - self.margins.right
    }

    pub fn top(&self) -> Mm {
        self.margins.top
    }

    /// Lowest y a content block may extend to; the footer zone lies below.
    pub fn printable_bottom(&self) -> Mm {
        self.page_size.height - self.margins.bottom
    }
}

/// Advances a [`LayoutCursor`] block by block, breaking pages on the surface
/// as reserved heights run out of room.
///
/// Every block is reserved atomically: `reserve` either places it at the
/// current origin or breaks to a fresh page first, so a block never
/// straddles a page boundary.
pub struct LayoutPlanner {
    geometry: PageGeometry,
    cursor: LayoutCursor,
    document_start_reserve: Mm,
}

impl LayoutPlanner {
    pub fn new(geometry: PageGeometry, document_start_reserve: Mm) -> Self {
        Self {
            geometry,
            cursor: LayoutCursor {
                page: 1,
                y: geometry.top(),
            },
            document_start_reserve,
        }
    }

    pub fn cursor(&self) -> LayoutCursor {
        self.cursor
    }

    pub fn geometry(&self) -> PageGeometry {
        self.geometry
    }

    /// Reserves `height` of vertical space and returns the block's top-edge
    /// y coordinate, breaking the page first when the block would cross the
    /// printable bottom. Blocks taller than a whole page are placed at the
    /// top of a fresh page rather than failing.
    pub fn reserve<S: DrawSurface + ?Sized>(&mut self, surface: &mut S, height: Mm) -> Mm {
        let height = height.max(Mm::ZERO);
        if self.cursor.y + height > self.geometry.printable_bottom()
            && self.cursor.y > self.geometry.top()
        {
            self.break_page(surface, "block_overflow");
        }
        let origin = self.cursor.y;
        self.cursor.y += height;
        origin
    }

    /// Pre-emptive break before a document section header: when less than
    /// the configured reserve remains, the next document starts on a fresh
    /// page instead of squeezing a title against the page bottom.
    pub fn ensure_document_start<S: DrawSurface + ?Sized>(&mut self, surface: &mut S) {
        if self.cursor.y > self.geometry.page_size.height - self.document_start_reserve {
            self.break_page(surface, "document_start");
        }
    }

    fn break_page<S: DrawSurface + ?Sized>(&mut self, surface: &mut S, reason: &str) {
        surface.new_page();
        self.cursor.page += 1;
        self.cursor.y = self.geometry.top();
        log::debug!(
            "page break ({reason}): now on page {} of surface with {} pages",
            self.cursor.page,
            surface.page_count()
        );
    }
}

/// Truncates preview text to `budget` characters, appending an ellipsis
/// marker when anything was cut. Splits on character boundaries.
pub fn truncate_preview(text: &str, budget: usize) -> Cow<'_, str> {
    match text.char_indices().nth(budget) {
        None => Cow::Borrowed(text),
        Some((cut, _)) => {
            let mut out = String::with_capacity(cut + ELLIPSIS.len());
            out.push_str(&text[..cut]);
            out.push_str(ELLIPSIS);
            Cow::Owned(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::RecordingSurface;

    fn planner() -> LayoutPlanner {
        LayoutPlanner::new(
            PageGeometry {
                page_size: Size::a4(),
                margins: Margins::all(20.0),
            },
            Mm::from_f32(120.0),
        )
    }

    #[test]
    fn reserve_advances_without_breaking_while_room_remains() {
        let mut surface = RecordingSurface::new(Size::a4());
        let mut planner = planner();
        let origin = planner.reserve(&mut surface, Mm::from_f32(15.0));
        assert_eq!(origin, Mm::from_f32(20.0));
        assert_eq!(planner.cursor().y, Mm::from_f32(35.0));
        assert_eq!(planner.cursor().page, 1);
        assert_eq!(surface.page_count(), 1);
    }

    #[test]
    fn reserve_breaks_when_block_would_cross_printable_bottom() {
        let mut surface = RecordingSurface::new(Size::a4());
        let mut planner = planner();
        // Fill the page to 20 + 24 * 10 = 260mm.
        for _ in 0..24 {
            planner.reserve(&mut surface, Mm::from_f32(10.0));
        }
        assert_eq!(planner.cursor().page, 1);
        // 260 + 30 > 277: must land at the top of page 2.
        let origin = planner.reserve(&mut surface, Mm::from_f32(30.0));
        assert_eq!(origin, Mm::from_f32(20.0));
        assert_eq!(planner.cursor().page, 2);
        assert_eq!(surface.page_count(), 2);
    }

    #[test]
    fn cursor_never_exceeds_printable_bottom_before_a_break() {
        let mut surface = RecordingSurface::new(Size::a4());
        let mut planner = planner();
        let bottom = planner.geometry().printable_bottom();
        for _ in 0..200 {
            let h = Mm::from_f32(17.0);
            let origin = planner.reserve(&mut surface, h);
            assert!(origin + h <= bottom, "block [{:?}+{:?}] crossed {:?}", origin, h, bottom);
        }
    }

    #[test]
    fn atomic_blocks_start_and_end_on_the_same_page() {
        let mut surface = RecordingSurface::new(Size::a4());
        let mut planner = planner();
        let image_block = Mm::from_f32(100.0);
        for _ in 0..10 {
            let page_before = planner.cursor().page;
            let origin = planner.reserve(&mut surface, image_block);
            // A break may have happened before placement, never after.
            assert!(planner.cursor().page >= page_before);
            assert!(origin + image_block <= planner.geometry().printable_bottom());
            assert_eq!(planner.cursor().y, origin + image_block);
        }
    }

    #[test]
    fn overfull_block_is_placed_at_the_top_of_a_fresh_page() {
        let mut surface = RecordingSurface::new(Size::a4());
        let mut planner = planner();
        planner.reserve(&mut surface, Mm::from_f32(10.0));
        let origin = planner.reserve(&mut surface, Mm::from_f32(400.0));
        assert_eq!(origin, Mm::from_f32(20.0));
        assert_eq!(planner.cursor().page, 2);
        // The next reserve breaks again rather than drawing off-page.
        planner.reserve(&mut surface, Mm::from_f32(10.0));
        assert_eq!(planner.cursor().page, 3);
    }

    #[test]
    fn document_start_break_fires_near_the_page_bottom() {
        let mut surface = RecordingSurface::new(Size::a4());
        let mut planner = planner();
        // 297 - 120 = 177: cursor at 180 is inside the reserve zone.
        for _ in 0..16 {
            planner.reserve(&mut surface, Mm::from_f32(10.0));
        }
        assert_eq!(planner.cursor().y, Mm::from_f32(180.0));
        planner.ensure_document_start(&mut surface);
        assert_eq!(planner.cursor().page, 2);
        assert_eq!(planner.cursor().y, Mm::from_f32(20.0));
    }

    #[test]
    fn document_start_is_a_no_op_with_room() {
        let mut surface = RecordingSurface::new(Size::a4());
        let mut planner = planner();
        planner.reserve(&mut surface, Mm::from_f32(30.0));
        planner.ensure_document_start(&mut surface);
        assert_eq!(planner.cursor().page, 1);
    }

    #[test]
    fn truncation_appends_ellipsis_only_when_cut() {
        let short = "brief text";
        assert!(matches!(truncate_preview(short, 300), Cow::Borrowed(_)));

        let long = "x".repeat(350);
        let cut = truncate_preview(&long, 300);
        assert_eq!(cut.chars().count(), 303);
        assert!(cut.ends_with(ELLIPSIS));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "é".repeat(10);
        let cut = truncate_preview(&text, 5);
        assert_eq!(cut.chars().count(), 8);
        assert!(cut.starts_with("ééééé"));
    }
}
