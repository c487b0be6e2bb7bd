use crate::model::*;

/// Free sub-spans of `window` on a room: the window minus every
/// non-cancelled stay, clamped to the window.
pub fn free_spans(rs: &RoomState, window: &Span) -> Vec<Span> {
    let occupied: Vec<Span> = rs
        .overlapping(window)
        .filter(|r| r.status.occupies_room())
        .map(|r| Span::new(r.span.start.max(window.start), r.span.end.min(window.end)))
        .collect();
    // `overlapping` yields in start order, and clamping keeps it.
    let occupied = merge_overlapping(&occupied);
    subtract_intervals(&[*window], &occupied)
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// Subtract sorted, disjoint `to_remove` spans from sorted, disjoint `base` spans.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}
