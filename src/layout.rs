use crate::config::PageLayout;

/// Grid slot assigned to one rendered badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub page: usize,
    pub col: u32,
    pub row: u32,
}

/// Badges that fit on one page, per row and per column. Clamped to at
/// least 1x1 so a badge larger than the page still renders (clipped)
/// instead of looping forever.
pub fn capacity(page: &PageLayout) -> (u32, u32) {
    let (page_w, page_h) = page.page_mm();
    let per_row = axis_capacity(page_w, page.margin_mm, page.badge_width_mm, page.gap_mm);
    let per_col = axis_capacity(page_h, page.margin_mm, page.badge_height_mm, page.gap_mm);
    (per_row, per_col)
}

fn axis_capacity(page_mm: f32, margin_mm: f32, badge_mm: f32, gap_mm: f32) -> u32 {
    let effective = badge_mm + gap_mm;
    if effective <= 0.0 {
        return 1;
    }
    let fit = ((page_mm - 2.0 * margin_mm + gap_mm) / effective).floor();
    if fit < 1.0 { 1 } else { fit as u32 }
}

/// Row-major slot for the `index`-th rendered badge: columns advance
/// first, then rows, then pages.
pub fn place(index: usize, per_row: u32, per_col: u32) -> Placement {
    let per_row = per_row.max(1) as usize;
    let per_col = per_col.max(1) as usize;
    let per_page = per_row * per_col;
    Placement {
        page: index / per_page,
        col: (index % per_row) as u32,
        row: ((index / per_row) % per_col) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Orientation, PageFormat};

    fn layout(badge_w: f32, badge_h: f32, margin: f32, gap: f32) -> PageLayout {
        PageLayout {
            orientation: Orientation::Landscape,
            format: PageFormat::A4,
            badge_width_mm: badge_w,
            badge_height_mm: badge_h,
            margin_mm: margin,
            gap_mm: gap,
        }
    }

    #[test]
    fn a4_landscape_fits_three_by_one_90x140_badges() {
        // 297x210 page, 10mm margins: floor(277/90) = 3 across,
        // floor(190/140) = 1 down.
        let (per_row, per_col) = capacity(&layout(90.0, 140.0, 10.0, 0.0));
        assert_eq!((per_row, per_col), (3, 1));
    }

    #[test]
    fn gap_reduces_capacity() {
        let (without_gap, _) = capacity(&layout(90.0, 140.0, 10.0, 0.0));
        let (with_gap, _) = capacity(&layout(90.0, 140.0, 10.0, 10.0));
        assert_eq!(without_gap, 3);
        assert_eq!(with_gap, 2);
    }

    #[test]
    fn oversized_badge_still_yields_one_per_page() {
        let (per_row, per_col) = capacity(&layout(400.0, 400.0, 10.0, 0.0));
        assert_eq!((per_row, per_col), (1, 1));
    }

    #[test]
    fn degenerate_zero_badge_clamps_to_one() {
        let (per_row, per_col) = capacity(&layout(0.0, 0.0, 0.0, 0.0));
        assert_eq!((per_row, per_col), (1, 1));
    }

    #[test]
    fn two_by_two_grid_overflows_to_second_page_at_fifth_badge() {
        let expected = [
            Placement { page: 0, col: 0, row: 0 },
            Placement { page: 0, col: 1, row: 0 },
            Placement { page: 0, col: 0, row: 1 },
            Placement { page: 0, col: 1, row: 1 },
            Placement { page: 1, col: 0, row: 0 },
        ];
        for (index, want) in expected.iter().enumerate() {
            assert_eq!(place(index, 2, 2), *want, "index {index}");
        }
    }

    #[test]
    fn page_is_non_decreasing_and_slots_cycle() {
        let (per_row, per_col) = (3u32, 2u32);
        let period = (per_row * per_col) as usize;
        let mut last_page = 0usize;
        for index in 0..50 {
            let p = place(index, per_row, per_col);
            assert!(p.page >= last_page);
            last_page = p.page;
            let again = place(index + period, per_row, per_col);
            assert_eq!((p.col, p.row), (again.col, again.row));
            assert_eq!(again.page, p.page + 1);
        }
    }
}
