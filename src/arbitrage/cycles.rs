//! Triangular and multi-hop cycle search over the market graph.
//!
//! Two interchangeable strategies:
//! - exhaustive triangle enumeration, O(V^3), for small graphs and testing
//! - bounded-depth search from a set of base tokens, for larger graphs
//!
//! Both feed the same evaluation, filtering and dedup pipeline.

use std::collections::HashMap;

use smallvec::SmallVec;
use time::OffsetDateTime;
use tracing::{debug, instrument};

use super::scanner::{CycleStrategy, ScanOutcome, ScannerConfig};
use super::types::{
    CycleLeg, OpportunityCandidate, OpportunityKind, QualityTier, RejectedCandidate,
    RejectionReason,
};
use crate::market::MarketGraph;

/// Fewest hops a cycle may have; two-hop round trips are direct spreads.
pub const MIN_CYCLE_HOPS: usize = 3;

/// Edge indices forming a closed path.
pub type CyclePath = SmallVec<[usize; 6]>;

/// Result of one cycle search.
#[derive(Debug, Clone, Default)]
pub struct CycleScanOutcome {
    /// Candidates and rejections.
    pub outcome: ScanOutcome,
    /// Strategy that actually ran.
    pub strategy: CycleStrategy,
    /// Closed cycles found before filtering.
    pub raw_cycles: usize,
    /// Accepted candidates collapsed by dedup.
    pub duplicates_collapsed: usize,
}

/// Quality tier for a cycle from profit and liquidity.
pub fn cycle_quality(profit_pct: f64, min_liquidity_usd: f64) -> QualityTier {
    if profit_pct > 2.0 && min_liquidity_usd > 200_000.0 {
        QualityTier::High
    } else if profit_pct > 1.0 && min_liquidity_usd > 100_000.0 {
        QualityTier::Medium
    } else {
        QualityTier::Low
    }
}

/// Pick the strategy for a graph of this size.
pub fn resolve_strategy(graph: &MarketGraph, config: &ScannerConfig) -> CycleStrategy {
    match config.strategy {
        CycleStrategy::Auto if graph.vertex_count() < config.exhaustive_vertex_limit => {
            CycleStrategy::Exhaustive
        }
        CycleStrategy::Auto => CycleStrategy::Bounded,
        explicit => explicit,
    }
}

/// Search the graph for cycles, evaluate, filter and dedup them.
#[instrument(skip_all, fields(vertices = graph.vertex_count()))]
pub fn find_cycles(graph: &MarketGraph, config: &ScannerConfig) -> CycleScanOutcome {
    let strategy = resolve_strategy(graph, config);
    let paths = match strategy {
        CycleStrategy::Bounded => bounded_search(graph, &config.base_tokens, config.max_depth),
        _ => enumerate_triangles(graph),
    };

    let now = OffsetDateTime::now_utc();
    let mut outcome = ScanOutcome::default();

    for path in &paths {
        let candidate = cycle_candidate(graph, path, now);
        match check_cycle(&candidate, config) {
            Ok(()) => outcome.candidates.push(candidate),
            Err(reason) => {
                if reason.is_data_error() {
                    outcome.data_errors += 1;
                }
                outcome
                    .rejected
                    .push(RejectedCandidate::from_candidate(&candidate, reason));
            }
        }
    }

    let before = outcome.candidates.len();
    outcome.candidates = dedup_candidates(std::mem::take(&mut outcome.candidates));
    let duplicates_collapsed = before - outcome.candidates.len();

    debug!(
        strategy = %strategy,
        raw = paths.len(),
        accepted = outcome.candidates.len(),
        collapsed = duplicates_collapsed,
        "Cycle search complete"
    );

    CycleScanOutcome {
        outcome,
        strategy,
        raw_cycles: paths.len(),
        duplicates_collapsed,
    }
}

/// Every triangle A->B->C->A using the best edge per hop.
///
/// Each triangle is emitted once per direction, starting from its lowest
/// vertex index; the other rotations are identical after dedup.
pub fn enumerate_triangles(graph: &MarketGraph) -> Vec<CyclePath> {
    let n = graph.vertex_count();
    let mut best: HashMap<(usize, usize), usize> = HashMap::new();
    for (from, edges) in graph.best_neighbour_edges().into_iter().enumerate() {
        for e in edges {
            best.insert((from, graph.edge(e).to), e);
        }
    }

    let mut cycles = Vec::new();
    for a in 0..n {
        for b in (a + 1)..n {
            let Some(&ab) = best.get(&(a, b)) else {
                continue;
            };
            for c in (a + 1)..n {
                if c == b {
                    continue;
                }
                let (Some(&bc), Some(&ca)) = (best.get(&(b, c)), best.get(&(c, a))) else {
                    continue;
                };
                cycles.push(SmallVec::from_slice(&[ab, bc, ca]));
            }
        }
    }
    cycles
}

/// Depth-first search from each base token, keeping the best cycle per base.
pub fn bounded_search(graph: &MarketGraph, base_tokens: &[String], max_depth: usize) -> Vec<CyclePath> {
    let neighbours = graph.best_neighbour_edges();
    let mut cycles = Vec::new();

    for symbol in base_tokens {
        let Some(base) = graph.vertex(symbol) else {
            debug!(token = %symbol, "Base token not in graph");
            continue;
        };

        let mut search = DepthSearch {
            graph,
            neighbours: &neighbours,
            base,
            max_depth,
            visited: vec![false; graph.vertex_count()],
            path: SmallVec::new(),
            best: None,
        };
        search.visited[base] = true;
        search.descend(base, 1.0);

        if let Some((_, path)) = search.best {
            cycles.push(path);
        }
    }
    cycles
}

struct DepthSearch<'a> {
    graph: &'a MarketGraph,
    neighbours: &'a [Vec<usize>],
    base: usize,
    max_depth: usize,
    visited: Vec<bool>,
    path: CyclePath,
    best: Option<(f64, CyclePath)>,
}

impl DepthSearch<'_> {
    fn descend(&mut self, vertex: usize, product: f64) {
        let depth = self.path.len();
        if depth >= self.max_depth {
            return;
        }

        let (graph, neighbours) = (self.graph, self.neighbours);
        for &e in &neighbours[vertex] {
            let edge = graph.edge(e);
            let next_product = product * edge.rate;

            if edge.to == self.base {
                if depth + 1 >= MIN_CYCLE_HOPS {
                    let improves = self
                        .best
                        .as_ref()
                        .map_or(true, |(best, _)| next_product > *best);
                    if improves {
                        let mut closed = self.path.clone();
                        closed.push(e);
                        self.best = Some((next_product, closed));
                    }
                }
                continue;
            }

            if self.visited[edge.to] {
                continue;
            }

            self.visited[edge.to] = true;
            self.path.push(e);
            self.descend(edge.to, next_product);
            self.path.pop();
            self.visited[edge.to] = false;
        }
    }
}

/// Turn a closed path into a candidate with profit and liquidity figures.
pub fn cycle_candidate(
    graph: &MarketGraph,
    path: &[usize],
    now: OffsetDateTime,
) -> OpportunityCandidate {
    let mut legs = Vec::with_capacity(path.len());
    let mut token_path = Vec::with_capacity(path.len() + 1);
    let mut venue_path = Vec::with_capacity(path.len());
    let mut total_rate = 1.0;
    let mut min_liquidity = f64::INFINITY;

    if let Some(&first) = path.first() {
        token_path.push(graph.symbol(graph.edge(first).from).to_string());
    }

    for &e in path {
        let edge = graph.edge(e);
        total_rate *= edge.rate;
        min_liquidity = min_liquidity.min(edge.liquidity_usd);
        token_path.push(graph.symbol(edge.to).to_string());
        venue_path.push(edge.venue.clone());
        legs.push(CycleLeg {
            from: graph.symbol(edge.from).to_string(),
            to: graph.symbol(edge.to).to_string(),
            venue: edge.venue.clone(),
            rate: edge.rate,
            liquidity_usd: edge.liquidity_usd,
        });
    }

    if path.is_empty() {
        min_liquidity = 0.0;
    }

    let gross_profit_pct = (total_rate - 1.0) * 100.0;

    OpportunityCandidate {
        kind: OpportunityKind::Triangular {
            token_path,
            venue_path,
            edges: legs,
        },
        gross_profit_pct,
        min_liquidity_usd: min_liquidity,
        quality_tier: cycle_quality(gross_profit_pct, min_liquidity),
        timestamp: now,
    }
}

/// Apply the cycle filters in order; first match wins.
pub fn check_cycle(
    candidate: &OpportunityCandidate,
    config: &ScannerConfig,
) -> Result<(), RejectionReason> {
    let profit = candidate.gross_profit_pct;

    if profit.is_nan() || profit <= 0.0 {
        return Err(RejectionReason::NonPositiveProfit);
    }
    if profit < config.min_profit_pct {
        return Err(RejectionReason::BelowProfitFloor);
    }
    if profit > config.max_realistic_profit_pct {
        return Err(RejectionReason::UnrealisticProfit);
    }
    if candidate.min_liquidity_usd < config.min_liquidity_usd {
        return Err(RejectionReason::InsufficientLiquidity);
    }
    if !config.allow_single_venue_cycles && candidate.kind.venues().len() < 2 {
        return Err(RejectionReason::SingleVenueCycle);
    }
    Ok(())
}

/// Collapse candidates sharing a (token set, venue set) signature, keeping
/// the most profitable. Order of first appearance is preserved.
///
/// Two cycles over the same tokens and venues in a different order or
/// direction share a signature and collapse too.
pub fn dedup_candidates(candidates: Vec<OpportunityCandidate>) -> Vec<OpportunityCandidate> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<OpportunityCandidate> = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let signature = candidate.signature();
        match slots.get(&signature) {
            Some(&slot) => {
                if candidate.gross_profit_pct > kept[slot].gross_profit_pct {
                    kept[slot] = candidate;
                }
            }
            None => {
                slots.insert(signature, kept.len());
                kept.push(candidate);
            }
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{GraphConfig, PriceSnapshot, VenueQuote};

    fn graph(snapshot: &PriceSnapshot) -> MarketGraph {
        MarketGraph::build(snapshot, &GraphConfig::default()).0
    }

    fn path(graph: &MarketGraph, tokens: &[&str]) -> Vec<usize> {
        tokens
            .windows(2)
            .map(|w| {
                let from = graph.vertex(w[0]).unwrap();
                let to = graph.vertex(w[1]).unwrap();
                graph.best_edge(from, to).unwrap()
            })
            .collect()
    }

    fn triangle(r1: f64, r2: f64, r3: f64) -> PriceSnapshot {
        PriceSnapshot::new()
            .with_rate("AAA/BBB", "uniswap", r1)
            .with_rate("BBB/CCC", "sushi", r2)
            .with_rate("CCC/AAA", "curve", r3)
    }

    #[test]
    fn losing_cycle_is_non_positive_profit() {
        let g = graph(&triangle(0.5, 2.1, 0.95));
        let candidate = cycle_candidate(
            &g,
            &path(&g, &["AAA", "BBB", "CCC", "AAA"]),
            OffsetDateTime::now_utc(),
        );

        assert!((candidate.gross_profit_pct - (-0.25)).abs() < 1e-9);
        assert_eq!(
            check_cycle(&candidate, &ScannerConfig::default()),
            Err(RejectionReason::NonPositiveProfit)
        );
    }

    #[test]
    fn winning_cycle_is_accepted() {
        let g = graph(&triangle(2.0, 3.0, 0.18));
        let candidate = cycle_candidate(
            &g,
            &path(&g, &["AAA", "BBB", "CCC", "AAA"]),
            OffsetDateTime::now_utc(),
        );

        assert!((candidate.gross_profit_pct - 8.0).abs() < 1e-9);
        assert_eq!(candidate.min_liquidity_usd, 100_000.0);
        assert_eq!(check_cycle(&candidate, &ScannerConfig::default()), Ok(()));
        assert_eq!(candidate.kind.venues().len(), 3);
    }

    #[test]
    fn filters_apply_in_order() {
        let config = ScannerConfig::default();

        let g = graph(&triangle(2.0, 3.0, 0.1668));
        let small = cycle_candidate(&g, &path(&g, &["AAA", "BBB", "CCC", "AAA"]), OffsetDateTime::now_utc());
        assert_eq!(check_cycle(&small, &config), Err(RejectionReason::BelowProfitFloor));

        let g = graph(&triangle(2.0, 3.0, 0.2));
        let huge = cycle_candidate(&g, &path(&g, &["AAA", "BBB", "CCC", "AAA"]), OffsetDateTime::now_utc());
        assert_eq!(check_cycle(&huge, &config), Err(RejectionReason::UnrealisticProfit));

        let shallow = triangle(2.0, 3.0, 0.18).with_quote(
            "AAA/BBB",
            "uniswap",
            VenueQuote::with_metadata(2.0, 10_000.0, 0.0),
        );
        let g = graph(&shallow);
        let thin = cycle_candidate(&g, &path(&g, &["AAA", "BBB", "CCC", "AAA"]), OffsetDateTime::now_utc());
        assert_eq!(check_cycle(&thin, &config), Err(RejectionReason::InsufficientLiquidity));
    }

    #[test]
    fn single_venue_cycle_rejected_unless_allowed() {
        let snapshot = PriceSnapshot::new()
            .with_rate("AAA/BBB", "uniswap", 2.0)
            .with_rate("BBB/CCC", "uniswap", 3.0)
            .with_rate("CCC/AAA", "uniswap", 0.18);
        let g = graph(&snapshot);
        let candidate = cycle_candidate(&g, &path(&g, &["AAA", "BBB", "CCC", "AAA"]), OffsetDateTime::now_utc());

        assert_eq!(
            check_cycle(&candidate, &ScannerConfig::default()),
            Err(RejectionReason::SingleVenueCycle)
        );

        let permissive = ScannerConfig {
            allow_single_venue_cycles: true,
            ..Default::default()
        };
        assert_eq!(check_cycle(&candidate, &permissive), Ok(()));
    }

    #[test]
    fn exhaustive_search_finds_each_direction_once() {
        let g = graph(&triangle(2.0, 3.0, 0.18));

        let paths = enumerate_triangles(&g);
        assert_eq!(paths.len(), 2);

        let config = ScannerConfig {
            strategy: CycleStrategy::Exhaustive,
            ..Default::default()
        };
        let result = find_cycles(&g, &config);

        assert_eq!(result.strategy, CycleStrategy::Exhaustive);
        assert_eq!(result.outcome.candidates.len(), 1);
        assert!((result.outcome.candidates[0].gross_profit_pct - 8.0).abs() < 1e-9);
        assert_eq!(result.outcome.rejected.len(), 1);
        assert_eq!(
            result.outcome.rejected[0].reason,
            RejectionReason::NonPositiveProfit
        );
    }

    #[test]
    fn bounded_search_closes_cycle_at_base_token() {
        let g = graph(&triangle(2.0, 3.0, 0.18));

        let paths = bounded_search(&g, &["AAA".to_string(), "ZZZ".to_string()], 3);
        assert_eq!(paths.len(), 1);

        let candidate = cycle_candidate(&g, &paths[0], OffsetDateTime::now_utc());
        match &candidate.kind {
            OpportunityKind::Triangular { token_path, .. } => {
                assert_eq!(token_path, &["AAA", "BBB", "CCC", "AAA"]);
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn bounded_search_respects_depth() {
        let snapshot = PriceSnapshot::new()
            .with_rate("AAA/BBB", "uniswap", 2.0)
            .with_rate("BBB/CCC", "sushi", 3.0)
            .with_rate("CCC/DDD", "curve", 1.0)
            .with_rate("DDD/AAA", "balancer", 0.18);
        let g = graph(&snapshot);

        assert!(bounded_search(&g, &["AAA".to_string()], 3).is_empty());

        let paths = bounded_search(&g, &["AAA".to_string()], 4);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].len(), 4);
    }

    #[test]
    fn auto_strategy_switches_on_graph_size() {
        let g = graph(&triangle(2.0, 3.0, 0.18));
        let config = ScannerConfig {
            exhaustive_vertex_limit: 3,
            ..Default::default()
        };
        assert_eq!(resolve_strategy(&g, &config), CycleStrategy::Bounded);

        let config = ScannerConfig::default();
        assert_eq!(resolve_strategy(&g, &config), CycleStrategy::Exhaustive);
    }

    #[test]
    fn dedup_keeps_most_profitable() {
        let g = graph(&triangle(2.0, 3.0, 0.18));
        let now = OffsetDateTime::now_utc();
        let forward = cycle_candidate(&g, &path(&g, &["AAA", "BBB", "CCC", "AAA"]), now);
        let rotated = cycle_candidate(&g, &path(&g, &["BBB", "CCC", "AAA", "BBB"]), now);
        let mut weaker = forward.clone();
        weaker.gross_profit_pct = 1.0;

        let kept = dedup_candidates(vec![weaker, rotated, forward]);

        assert_eq!(kept.len(), 1);
        assert!((kept[0].gross_profit_pct - 8.0).abs() < 1e-9);
    }

    #[test]
    fn cycle_quality_tiers() {
        assert_eq!(cycle_quality(2.5, 250_000.0), QualityTier::High);
        assert_eq!(cycle_quality(2.5, 150_000.0), QualityTier::Medium);
        assert_eq!(cycle_quality(1.5, 150_000.0), QualityTier::Medium);
        assert_eq!(cycle_quality(1.5, 50_000.0), QualityTier::Low);
        assert_eq!(cycle_quality(0.5, 500_000.0), QualityTier::Low);
    }
}
