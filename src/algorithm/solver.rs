//! Backtracking constraint solver: domain preparation from preexisting
//! tiles, AC-3 arc-consistency establishment, and a heap-allocated explicit
//! search stack with LRV/LCV ordering and trail-based undo.

use std::collections::{HashMap, VecDeque};

use crate::algorithm::connectivity::{ConnectivityMode, ConnectivityTable, Direction};
use crate::algorithm::tiles::{TileHandle, UniqueTileTable};
use crate::io::error::{CoreError, Result};
use crate::spatial::grid::{BorderSide, Region, neighbor_offset};
use crate::spatial::index_set::IndexSet;

fn border_flag(flags: [bool; 4], side: BorderSide) -> bool {
    match side {
        BorderSide::Top => flags[0],
        BorderSide::Bottom => flags[1],
        BorderSide::Left => flags[2],
        BorderSide::Right => flags[3],
    }
}

fn is_border_cell(region: &Region, local: [i32; 2]) -> bool {
    [BorderSide::Top, BorderSide::Bottom, BorderSide::Left, BorderSide::Right]
        .into_iter()
        .any(|side| region.on_border(local, side))
}

/// The result of preparing a generation region from preexisting tiles:
/// per-cell initial domains, eagerly committed singletons, and the
/// high-priority border-cell list with the domain it was recorded with.
pub struct PreparedState {
    /// Per-cell candidate domain, indexed by `y * width + x`.
    pub domains: Vec<IndexSet>,
    /// Per-cell committed tile index, if singleton or later assigned.
    pub committed: Vec<Option<usize>>,
    /// Cell indices recorded as high-priority during preparation.
    pub high_priority: Vec<usize>,
    /// Each high-priority cell's domain snapshot at the moment it was
    /// recorded, used to pin preferred values during search.
    pub high_priority_candidates: HashMap<usize, Vec<usize>>,
}

/// Computes each cell's initial domain as the intersection, across layers,
/// of the tile indices whose layer value matches the preexisting tile at
/// that position on that layer. Singleton domains are committed eagerly;
/// non-full non-empty domains on the region border are flagged high-priority.
pub fn prepare<H: TileHandle>(
    region: &Region,
    layer_count: usize,
    unique_count: usize,
    preexisting: &dyn Fn(usize, [i32; 2]) -> Option<H>,
    tiles: &UniqueTileTable<H>,
) -> PreparedState {
    let area = region.area();
    let mut domains = Vec::with_capacity(area);
    let mut committed = vec![None; area];
    let mut high_priority = Vec::new();
    let mut high_priority_candidates = HashMap::new();

    for (idx, local) in region.iter_local().enumerate() {
        let mut domain = IndexSet::full(unique_count);
        for layer in 0..layer_count {
            if let Some(handle) = preexisting(layer, local) {
                let mut matching = IndexSet::empty(unique_count);
                for (tile_idx, tile) in tiles.iter() {
                    if tile.layers.get(layer).and_then(Option::as_ref) == Some(&handle) {
                        matching.insert(tile_idx.get());
                    }
                }
                domain = domain.intersect(&matching);
            }
        }

        if domain.count() == 1 {
            if let Some(value) = domain.get_dense(0) {
                if let Some(slot) = committed.get_mut(idx) {
                    *slot = Some(value);
                }
            }
        } else if domain.count() > 0 && domain.count() < unique_count && is_border_cell(region, local) {
            high_priority.push(idx);
            high_priority_candidates.insert(idx, domain.as_slice().to_vec());
        }

        domains.push(domain);
    }

    PreparedState {
        domains,
        committed,
        high_priority,
        high_priority_candidates,
    }
}

struct SolveContext<'a> {
    region: Region,
    mode: ConnectivityMode,
    start_y: i32,
    border_flags: [bool; 4],
    connectivity: &'a ConnectivityTable,
    domains: Vec<IndexSet>,
    committed: Vec<Option<usize>>,
}

impl SolveContext<'_> {
    fn local_of(&self, idx: usize) -> [i32; 2] {
        let width = self.region.size[0].max(1);
        [(idx % width) as i32, (idx / width) as i32]
    }

    fn neighbor_index(&self, idx: usize, d: Direction) -> Option<usize> {
        let world = self.region.to_world(self.local_of(idx));
        let neighbor_world = neighbor_offset(world, self.mode, self.start_y, d)?;
        let local = self.region.to_local(neighbor_world)?;
        let width = self.region.size[0];
        Some(local[1] as usize * width + local[0] as usize)
    }

    fn violated_enforced_sides(&self, idx: usize, d: Direction) -> Vec<BorderSide> {
        let world = self.region.to_world(self.local_of(idx));
        let Some(neighbor_world) = neighbor_offset(world, self.mode, self.start_y, d) else {
            return Vec::new();
        };
        let raw = [
            neighbor_world[0] - self.region.origin[0],
            neighbor_world[1] - self.region.origin[1],
        ];
        let mut sides = Vec::new();
        if raw[1] < 0 {
            sides.push(BorderSide::Bottom);
        }
        if raw[1] >= self.region.size[1] as i32 {
            sides.push(BorderSide::Top);
        }
        if raw[0] < 0 {
            sides.push(BorderSide::Left);
        }
        if raw[0] >= self.region.size[0] as i32 {
            sides.push(BorderSide::Right);
        }
        sides.retain(|&side| border_flag(self.border_flags, side));
        sides
    }
}

fn revise(ctx: &mut SolveContext, p: usize, d: Direction, trail: &mut Vec<(usize, usize)>) -> bool {
    let Some(n) = ctx.neighbor_index(p, d) else {
        return revise_border(ctx, p, d, trail);
    };
    let candidates: Vec<usize> = ctx.domains.get(p).map(IndexSet::as_slice).unwrap_or(&[]).to_vec();
    let neighbor_committed = ctx.committed.get(n).copied().flatten();
    let mut changed = false;
    for a in candidates {
        let supported = if let Some(b) = neighbor_committed {
            ctx.connectivity.get(d, a, b)
        } else {
            ctx.domains
                .get(n)
                .is_some_and(|dom| dom.iter().any(|b| ctx.connectivity.get(d, a, b)))
        };
        if !supported {
            if let Some(dom) = ctx.domains.get_mut(p) {
                if dom.remove(a) {
                    trail.push((p, a));
                    changed = true;
                }
            }
        }
    }
    changed
}

fn revise_border(ctx: &mut SolveContext, p: usize, d: Direction, trail: &mut Vec<(usize, usize)>) -> bool {
    let sides = ctx.violated_enforced_sides(p, d);
    if sides.is_empty() {
        return false;
    }
    let candidates: Vec<usize> = ctx.domains.get(p).map(IndexSet::as_slice).unwrap_or(&[]).to_vec();
    let mut changed = false;
    for a in candidates {
        let supported = sides.iter().all(|&side| ctx.connectivity.get_border(side, a));
        if !supported {
            if let Some(dom) = ctx.domains.get_mut(p) {
                if dom.remove(a) {
                    trail.push((p, a));
                    changed = true;
                }
            }
        }
    }
    changed
}

fn ac3(ctx: &mut SolveContext, mut queue: VecDeque<(usize, Direction)>, trail: &mut Vec<(usize, usize)>) -> bool {
    while let Some((p, d)) = queue.pop_front() {
        let changed = revise(ctx, p, d, trail);
        if ctx.domains.get(p).is_some_and(IndexSet::is_empty) {
            return false;
        }
        if changed {
            for &dd in ctx.mode.directions() {
                if let Some(n) = ctx.neighbor_index(p, dd) {
                    queue.push_back((n, dd.opposite()));
                } else {
                    queue.push_back((p, dd));
                }
            }
        }
    }
    true
}

fn establish_full(ctx: &mut SolveContext, trail: &mut Vec<(usize, usize)>) -> bool {
    let mut queue = VecDeque::new();
    for p in 0..ctx.domains.len() {
        for &d in ctx.mode.directions() {
            queue.push_back((p, d));
        }
    }
    ac3(ctx, queue, trail)
}

fn propagate_from_commit(ctx: &mut SolveContext, pos: usize, trail: &mut Vec<(usize, usize)>) -> bool {
    let mut queue = VecDeque::new();
    for &d in ctx.mode.directions() {
        if let Some(n) = ctx.neighbor_index(pos, d) {
            queue.push_back((n, d.opposite()));
        }
    }
    ac3(ctx, queue, trail)
}

fn revert_to(ctx: &mut SolveContext, trail: &mut Vec<(usize, usize)>, mark: usize) {
    while trail.len() > mark {
        if let Some((p, v)) = trail.pop() {
            if let Some(dom) = ctx.domains.get_mut(p) {
                dom.insert(v);
            }
        }
    }
}

struct Frame {
    cell: usize,
    candidates: Vec<usize>,
    cursor: usize,
    trail_mark: usize,
    from_high_priority: bool,
}

fn lcv_neighbor_domains(ctx: &SolveContext, cell: usize) -> Vec<(Direction, Vec<usize>)> {
    let mut pairs = Vec::new();
    for &d in ctx.mode.directions() {
        if let Some(n) = ctx.neighbor_index(cell, d) {
            let dom = match ctx.committed.get(n).copied().flatten() {
                Some(b) => vec![b],
                None => ctx.domains.get(n).map(|d| d.as_slice().to_vec()).unwrap_or_default(),
            };
            pairs.push((d, dom));
        }
    }
    pairs
}

fn order_values(
    ctx: &SolveContext,
    cell: usize,
    from_high_priority: bool,
    preferred: &[Option<usize>],
    high_priority_candidates: &HashMap<usize, Vec<usize>>,
) -> Vec<usize> {
    let mut values: Vec<usize> = ctx.domains.get(cell).map(IndexSet::as_slice).unwrap_or(&[]).to_vec();
    let pinned: Vec<usize> = if from_high_priority {
        high_priority_candidates.get(&cell).cloned().unwrap_or_default()
    } else {
        preferred.get(cell).copied().flatten().into_iter().collect()
    };
    let owned_pairs = lcv_neighbor_domains(ctx, cell);
    let neighbor_domains: Vec<(Direction, &[usize])> = owned_pairs.iter().map(|(d, v)| (*d, v.as_slice())).collect();

    values.sort_by(|&a, &b| {
        let pinned_a = pinned.contains(&a);
        let pinned_b = pinned.contains(&b);
        match (pinned_a, pinned_b) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => {
                let cost_a = ctx.connectivity.lcv_cost(a, &neighbor_domains);
                let cost_b = ctx.connectivity.lcv_cost(b, &neighbor_domains);
                cost_a.cmp(&cost_b)
            }
        }
    });
    values
}

fn select_var(
    ctx: &SolveContext,
    high_priority: &IndexSet,
    normal: &IndexSet,
    noise: &[f32],
    preferred: &[Option<usize>],
) -> Option<(usize, bool)> {
    if !high_priority.is_empty() {
        let pick = high_priority.iter().min_by(|&a, &b| {
            let key_a = hp_key(ctx, a, noise);
            let key_b = hp_key(ctx, b, noise);
            key_a.total_cmp(&key_b)
        })?;
        return Some((pick, true));
    }
    if !normal.is_empty() {
        let pick = normal.iter().min_by(|&a, &b| {
            let key_a = normal_key(ctx, a, noise, preferred);
            let key_b = normal_key(ctx, b, noise, preferred);
            key_a.total_cmp(&key_b)
        })?;
        return Some((pick, false));
    }
    None
}

fn hp_key(ctx: &SolveContext, cell: usize, noise: &[f32]) -> f32 {
    #[allow(clippy::cast_precision_loss)]
    let size = ctx.domains.get(cell).map(IndexSet::count).unwrap_or(0) as f32;
    let n = noise.get(cell).copied().unwrap_or(0.0);
    let border_bonus = if is_border_cell(&ctx.region, ctx.local_of(cell)) {
        -1_000_000.0
    } else {
        0.0
    };
    size + n + border_bonus
}

fn normal_key(ctx: &SolveContext, cell: usize, noise: &[f32], preferred: &[Option<usize>]) -> f32 {
    #[allow(clippy::cast_precision_loss)]
    let size = ctx.domains.get(cell).map(IndexSet::count).unwrap_or(0) as f32;
    let n = noise.get(cell).copied().unwrap_or(0.0);
    let has_preferred = preferred
        .get(cell)
        .copied()
        .flatten()
        .is_some_and(|v| ctx.domains.get(cell).is_some_and(|dom| dom.contains(v)));
    size + n + if has_preferred { -1.0 } else { 0.0 }
}

fn run_search(
    ctx: &mut SolveContext,
    high_priority: &mut IndexSet,
    normal: &mut IndexSet,
    high_priority_candidates: &HashMap<usize, Vec<usize>>,
    preferred: &[Option<usize>],
    noise: &[f32],
    trail: &mut Vec<(usize, usize)>,
) -> bool {
    let Some((first_cell, first_hp)) = select_var(ctx, high_priority, normal, noise, preferred) else {
        return true;
    };
    if first_hp {
        high_priority.remove(first_cell);
    } else {
        normal.remove(first_cell);
    }
    let mut stack = vec![Frame {
        cell: first_cell,
        candidates: order_values(ctx, first_cell, first_hp, preferred, high_priority_candidates),
        cursor: 0,
        trail_mark: trail.len(),
        from_high_priority: first_hp,
    }];

    'outer: while let Some(frame) = stack.last_mut() {
        loop {
            let Some(&value) = frame.candidates.get(frame.cursor) else {
                break;
            };
            frame.cursor += 1;
            let trail_mark = trail.len();
            frame.trail_mark = trail_mark;
            if let Some(slot) = ctx.committed.get_mut(frame.cell) {
                *slot = Some(value);
            }
            let cell = frame.cell;
            if propagate_from_commit(ctx, cell, trail) {
                match select_var(ctx, high_priority, normal, noise, preferred) {
                    Some((next_cell, next_hp)) => {
                        if next_hp {
                            high_priority.remove(next_cell);
                        } else {
                            normal.remove(next_cell);
                        }
                        stack.push(Frame {
                            cell: next_cell,
                            candidates: order_values(ctx, next_cell, next_hp, preferred, high_priority_candidates),
                            cursor: 0,
                            trail_mark: trail.len(),
                            from_high_priority: next_hp,
                        });
                        continue 'outer;
                    }
                    None => return true,
                }
            }
            revert_to(ctx, trail, trail_mark);
            if let Some(slot) = ctx.committed.get_mut(cell) {
                *slot = None;
            }
        }
        break;
    }

    while let Some(popped) = stack.pop() {
        if let Some(slot) = ctx.committed.get_mut(popped.cell) {
            *slot = None;
        }
        if popped.from_high_priority {
            high_priority.insert(popped.cell);
        } else {
            normal.insert(popped.cell);
        }
        let Some(parent) = stack.last_mut() else {
            return false;
        };
        revert_to(ctx, trail, parent.trail_mark);
        if let Some(slot) = ctx.committed.get_mut(parent.cell) {
            *slot = None;
        }
        if parent.cursor < parent.candidates.len() {
            return continue_parent(ctx, &mut stack, high_priority, normal, high_priority_candidates, preferred, noise, trail);
        }
    }
    false
}

fn continue_parent(
    ctx: &mut SolveContext,
    stack: &mut Vec<Frame>,
    high_priority: &mut IndexSet,
    normal: &mut IndexSet,
    high_priority_candidates: &HashMap<usize, Vec<usize>>,
    preferred: &[Option<usize>],
    noise: &[f32],
    trail: &mut Vec<(usize, usize)>,
) -> bool {
    'outer: while let Some(frame) = stack.last_mut() {
        loop {
            let Some(&value) = frame.candidates.get(frame.cursor) else {
                break;
            };
            frame.cursor += 1;
            let trail_mark = trail.len();
            frame.trail_mark = trail_mark;
            if let Some(slot) = ctx.committed.get_mut(frame.cell) {
                *slot = Some(value);
            }
            let cell = frame.cell;
            if propagate_from_commit(ctx, cell, trail) {
                match select_var(ctx, high_priority, normal, noise, preferred) {
                    Some((next_cell, next_hp)) => {
                        if next_hp {
                            high_priority.remove(next_cell);
                        } else {
                            normal.remove(next_cell);
                        }
                        stack.push(Frame {
                            cell: next_cell,
                            candidates: order_values(ctx, next_cell, next_hp, preferred, high_priority_candidates),
                            cursor: 0,
                            trail_mark: trail.len(),
                            from_high_priority: next_hp,
                        });
                        continue 'outer;
                    }
                    None => return true,
                }
            }
            revert_to(ctx, trail, trail_mark);
            if let Some(slot) = ctx.committed.get_mut(cell) {
                *slot = None;
            }
        }
        let popped = match stack.pop() {
            Some(f) => f,
            None => return false,
        };
        if let Some(slot) = ctx.committed.get_mut(popped.cell) {
            *slot = None;
        }
        if popped.from_high_priority {
            high_priority.insert(popped.cell);
        } else {
            normal.insert(popped.cell);
        }
        let Some(new_parent) = stack.last_mut() else {
            return false;
        };
        revert_to(ctx, trail, new_parent.trail_mark);
        if let Some(slot) = ctx.committed.get_mut(new_parent.cell) {
            *slot = None;
        }
    }
    false
}

/// Solves a prepared region: runs AC-3 establishment, then backtracking
/// search with LRV variable ordering and LCV value ordering. On initial
/// establishment failure, retries once with every domain reset to full
/// when `forceful` is set, consuming the original high-priority list as a
/// preference rather than a hard constraint.
///
/// # Errors
///
/// Returns [`CoreError::Unsatisfiable`] if establishment fails and
/// `forceful` is not set, or [`CoreError::BorderImpossible`] if it fails
/// even with `forceful` set.
#[allow(clippy::too_many_arguments)]
pub fn solve(
    region: &Region,
    mode: ConnectivityMode,
    start_y: i32,
    border_flags: [bool; 4],
    connectivity: &ConnectivityTable,
    prepared: PreparedState,
    preferred: &[Option<usize>],
    noise: &[f32],
    forceful: bool,
) -> Result<Vec<Option<usize>>> {
    let unique_count = connectivity.unique_count();
    let mut ctx = SolveContext {
        region: *region,
        mode,
        start_y,
        border_flags,
        connectivity,
        domains: prepared.domains,
        committed: prepared.committed,
    };
    let mut trail = Vec::new();
    let area = ctx.domains.len();

    let mut high_priority = IndexSet::empty(area);
    for &cell in &prepared.high_priority {
        high_priority.insert(cell);
    }
    let mut normal = IndexSet::empty(area);
    for idx in 0..area {
        if ctx.committed.get(idx).copied().flatten().is_none() && !high_priority.contains(idx) {
            normal.insert(idx);
        }
    }

    if establish_full(&mut ctx, &mut trail) {
        if run_search(
            &mut ctx,
            &mut high_priority,
            &mut normal,
            &prepared.high_priority_candidates,
            preferred,
            noise,
            &mut trail,
        ) {
            return Ok(ctx.committed);
        }
        return Err(CoreError::Unsatisfiable);
    }

    if !forceful {
        return Err(CoreError::Unsatisfiable);
    }

    trail.clear();
    ctx.domains = (0..area).map(|_| IndexSet::full(unique_count)).collect();
    ctx.committed = vec![None; area];
    let mut high_priority = IndexSet::empty(area);
    for &cell in &prepared.high_priority {
        high_priority.insert(cell);
    }
    let mut normal = IndexSet::empty(area);
    for idx in 0..area {
        if !high_priority.contains(idx) {
            normal.insert(idx);
        }
    }

    if !establish_full(&mut ctx, &mut trail) {
        return Err(CoreError::BorderImpossible);
    }
    if run_search(
        &mut ctx,
        &mut high_priority,
        &mut normal,
        &prepared.high_priority_candidates,
        preferred,
        noise,
        &mut trail,
    ) {
        Ok(ctx.committed)
    } else {
        Err(CoreError::BorderImpossible)
    }
}
