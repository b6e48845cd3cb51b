//! Pixel regions
//!
//! A region is a set of integer pixels stored as y-sorted bands of
//! non-overlapping rectangles. Every rectangle in a band shares the band's
//! top and bottom, rectangles within a band are sorted by x and never touch,
//! and vertically adjacent bands with identical spans are merged.

use smallvec::SmallVec;

use crate::primitives::IRect;

/// Boolean operation combining a region (`self`) with an operand
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RegionOp {
    /// `self - operand`
    Difference,
    #[default]
    Intersect,
    Union,
    Xor,
    /// `operand - self`
    ReverseDifference,
    /// `operand`
    Replace,
}

impl RegionOp {
    fn keep(self, in_self: bool, in_operand: bool) -> bool {
        match self {
            RegionOp::Difference => in_self && !in_operand,
            RegionOp::Intersect => in_self && in_operand,
            RegionOp::Union => in_self || in_operand,
            RegionOp::Xor => in_self != in_operand,
            RegionOp::ReverseDifference => in_operand && !in_self,
            RegionOp::Replace => in_operand,
        }
    }
}

type Spans = SmallVec<[(i32, i32); 8]>;

/// A set of pixels
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Region {
    rects: Vec<IRect>,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rect(rect: IRect) -> Self {
        let mut region = Self::new();
        region.set_rect(rect);
        region
    }

    /// Union of every rectangle
    pub fn from_rects(rects: &[IRect]) -> Self {
        let mut region = Self::new();
        for rect in rects {
            region.op_rect(*rect, RegionOp::Union);
        }
        region
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// True when the region is exactly one rectangle
    pub fn is_rect(&self) -> bool {
        self.rects.len() == 1
    }

    /// True when the region needs more than one rectangle
    pub fn is_complex(&self) -> bool {
        self.rects.len() > 1
    }

    pub fn rects(&self) -> &[IRect] {
        &self.rects
    }

    pub fn bounds(&self) -> IRect {
        let Some(first) = self.rects.first() else {
            return IRect::default();
        };
        let mut bounds = *first;
        for r in &self.rects[1..] {
            bounds.left = bounds.left.min(r.left);
            bounds.right = bounds.right.max(r.right);
            bounds.bottom = bounds.bottom.max(r.bottom);
        }
        bounds
    }

    pub fn set_empty(&mut self) {
        self.rects.clear();
    }

    pub fn set_rect(&mut self, rect: IRect) {
        self.rects.clear();
        if !rect.is_empty() {
            self.rects.push(rect);
        }
    }

    pub fn translate(&mut self, dx: i32, dy: i32) {
        for r in &mut self.rects {
            r.left += dx;
            r.right += dx;
            r.top += dy;
            r.bottom += dy;
        }
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        self.rects
            .iter()
            .any(|r| x >= r.left && x < r.right && y >= r.top && y < r.bottom)
    }

    /// True when every pixel of `rect` is in the region
    pub fn contains_rect(&self, rect: IRect) -> bool {
        if rect.is_empty() {
            return true;
        }
        let mut remaining = Region::from_rect(rect);
        remaining.op(self, RegionOp::Difference);
        remaining.is_empty()
    }

    /// `self = self op rect`. Returns whether the result is non-empty.
    pub fn op_rect(&mut self, rect: IRect, op: RegionOp) -> bool {
        let operand = Region::from_rect(rect);
        self.op(&operand, op)
    }

    /// `self = self op other`. Returns whether the result is non-empty.
    pub fn op(&mut self, other: &Region, op: RegionOp) -> bool {
        self.rects = combine(&self.rects, &other.rects, op);
        !self.is_empty()
    }

    /// Build from a list of horizontal pixel runs `(y, x_start, x_end)`
    pub fn from_runs(runs: &[(i32, i32, i32)]) -> Self {
        let mut rows: Vec<(i32, i32, i32)> = runs
            .iter()
            .copied()
            .filter(|(_, x0, x1)| x1 > x0)
            .collect();
        rows.sort_unstable();

        let mut rects = Vec::new();
        let mut i = 0;
        while i < rows.len() {
            let y = rows[i].0;
            let mut spans = Spans::new();
            while i < rows.len() && rows[i].0 == y {
                push_span(&mut spans, rows[i].1, rows[i].2);
                i += 1;
            }
            append_band(&mut rects, y, y + 1, &spans);
        }
        Region { rects }
    }
}

/// Append `[x0, x1)` to sorted spans, merging overlap with the last one
fn push_span(spans: &mut Spans, x0: i32, x1: i32) {
    if let Some(last) = spans.last_mut() {
        if x0 <= last.1 {
            last.1 = last.1.max(x1);
            return;
        }
    }
    spans.push((x0, x1));
}

fn band_spans(rects: &[IRect], y0: i32, y1: i32) -> Spans {
    let mut spans = Spans::new();
    for r in rects {
        if r.top <= y0 && r.bottom >= y1 {
            push_span(&mut spans, r.left, r.right);
        }
    }
    spans
}

fn combine_spans(a: &Spans, b: &Spans, op: RegionOp) -> Spans {
    let mut edges: SmallVec<[i32; 16]> = SmallVec::new();
    for &(x0, x1) in a.iter().chain(b.iter()) {
        edges.push(x0);
        edges.push(x1);
    }
    edges.sort_unstable();
    edges.dedup();

    let inside = |spans: &Spans, x: i32| spans.iter().any(|&(s0, s1)| x >= s0 && x < s1);
    let mut out = Spans::new();
    for w in edges.windows(2) {
        let (x0, x1) = (w[0], w[1]);
        if op.keep(inside(a, x0), inside(b, x0)) {
            push_span(&mut out, x0, x1);
        }
    }
    out
}

/// Append a band, merging it into the previous band when the spans match
fn append_band(rects: &mut Vec<IRect>, top: i32, bottom: i32, spans: &Spans) {
    if spans.is_empty() {
        return;
    }
    let prev_start = {
        let Some(last) = rects.last() else {
            rects.extend(spans.iter().map(|&(l, r)| IRect::new(l, top, r, bottom)));
            return;
        };
        let prev_top = last.top;
        rects.iter().rposition(|r| r.top != prev_top).map_or(0, |i| i + 1)
    };
    let prev = &rects[prev_start..];
    let same = prev[0].bottom == top
        && prev.len() == spans.len()
        && prev
            .iter()
            .zip(spans.iter())
            .all(|(r, &(l, rr))| r.left == l && r.right == rr);
    if same {
        for r in &mut rects[prev_start..] {
            r.bottom = bottom;
        }
    } else {
        rects.extend(spans.iter().map(|&(l, r)| IRect::new(l, top, r, bottom)));
    }
}

fn combine(a: &[IRect], b: &[IRect], op: RegionOp) -> Vec<IRect> {
    let mut ys: Vec<i32> = a
        .iter()
        .chain(b.iter())
        .flat_map(|r| [r.top, r.bottom])
        .collect();
    ys.sort_unstable();
    ys.dedup();

    let mut rects = Vec::new();
    for w in ys.windows(2) {
        let (y0, y1) = (w[0], w[1]);
        let spans = combine_spans(&band_spans(a, y0, y1), &band_spans(b, y0, y1), op);
        append_band(&mut rects, y0, y1, &spans);
    }
    rects
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_of_adjacent_rects_coalesces() {
        let region = Region::from_rects(&[IRect::new(0, 0, 10, 5), IRect::new(0, 5, 10, 10)]);
        assert!(region.is_rect());
        assert_eq!(region.bounds(), IRect::new(0, 0, 10, 10));
    }

    #[test]
    fn test_difference_punches_hole() {
        let mut region = Region::from_rect(IRect::new(0, 0, 30, 30));
        region.op_rect(IRect::new(10, 10, 20, 20), RegionOp::Difference);
        assert_eq!(region.rects().len(), 4);
        assert!(!region.contains_point(15, 15));
        assert!(region.contains_point(5, 15));
        assert_eq!(region.bounds(), IRect::new(0, 0, 30, 30));
    }

    #[test]
    fn test_intersect_empty_when_disjoint() {
        let mut region = Region::from_rect(IRect::new(0, 0, 10, 10));
        assert!(!region.op_rect(IRect::new(20, 20, 30, 30), RegionOp::Intersect));
        assert!(region.is_empty());
    }

    #[test]
    fn test_xor_and_reverse_difference() {
        let mut xor = Region::from_rect(IRect::new(0, 0, 10, 10));
        xor.op_rect(IRect::new(5, 0, 15, 10), RegionOp::Xor);
        assert_eq!(xor.rects(), &[IRect::new(0, 0, 5, 10), IRect::new(10, 0, 15, 10)]);

        let mut rev = Region::from_rect(IRect::new(0, 0, 10, 10));
        rev.op_rect(IRect::new(5, 0, 15, 10), RegionOp::ReverseDifference);
        assert_eq!(rev.rects(), &[IRect::new(10, 0, 15, 10)]);
    }

    #[test]
    fn test_from_runs_merges_rows() {
        let region = Region::from_runs(&[(0, 0, 4), (1, 0, 4), (2, 1, 3)]);
        assert_eq!(region.rects(), &[IRect::new(0, 0, 4, 2), IRect::new(1, 2, 3, 3)]);
        assert!(region.contains_rect(IRect::new(0, 0, 4, 2)));
        assert!(!region.contains_rect(IRect::new(0, 0, 4, 3)));
    }
}
