//! Directed market multigraph built from a price snapshot.
//!
//! Vertices are tokens, interned to integer indices. Every valid quote adds a
//! forward edge and its algebraic inverse; quotes for the same pair from
//! different venues become parallel edges. The graph is rebuilt from scratch
//! every tick.

use std::collections::HashMap;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, instrument};

use super::types::{PricePoint, PriceSnapshot, Token};
use crate::error::DataError;
use crate::metrics;

/// Drop reasons kept per build for diagnostics.
const MAX_DROP_SAMPLES: usize = 20;

/// Graph construction settings.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Rates above this are rejected as corrupt.
    pub max_sane_rate: f64,
    /// Liquidity annotation for quotes without metadata.
    pub default_liquidity_usd: f64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_sane_rate: 1_000_000.0,
            default_liquidity_usd: 100_000.0,
        }
    }
}

impl From<&crate::config::Config> for GraphConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            max_sane_rate: config.max_sane_rate,
            default_liquidity_usd: config.default_liquidity_usd,
        }
    }
}

/// A directed, venue-tagged conversion between two tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    /// Source vertex.
    pub from: usize,
    /// Target vertex.
    pub to: usize,
    /// Venue quoting this rate.
    pub venue: String,
    /// Units of `to` received per unit of `from`. Finite and > 0.
    pub rate: f64,
    /// Pool liquidity in USD.
    pub liquidity_usd: f64,
    /// Recent volume in USD.
    pub volume_usd: f64,
    /// True for the synthesized reverse edge.
    pub inverse: bool,
}

/// All venue quotes for one unordered token pair.
///
/// The first key seen for the pair fixes its direction. Quotes keyed the
/// other way round contribute their inverse edge, so every listed edge runs
/// `base -> quote`.
#[derive(Debug, Clone)]
pub struct PairQuotes {
    /// Canonical pair key, as first received from the feed.
    pub pair: String,
    /// Base token vertex.
    pub base: usize,
    /// Quote token vertex.
    pub quote: usize,
    /// Indices of `base -> quote` edges, one per venue. A venue quoting both
    /// directions is listed once, with the quote seen first.
    pub edges: Vec<usize>,
}

/// Observability summary of one graph build.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    /// Distinct tokens.
    pub vertex_count: usize,
    /// Directed edges, inverses included.
    pub edge_count: usize,
    /// Quotes rejected as data errors.
    pub dropped_edges: usize,
    /// Quotes seen in the snapshot.
    pub total_quotes: usize,
    /// First few drop reasons.
    #[serde(skip)]
    pub drop_samples: Vec<DataError>,
}

impl BuildReport {
    /// Percentage of quotes that produced edges (0 for an empty snapshot).
    pub fn data_quality_score(&self) -> f64 {
        if self.total_quotes == 0 {
            return 0.0;
        }
        let valid = self.total_quotes.saturating_sub(self.dropped_edges);
        valid as f64 / self.total_quotes as f64 * 100.0
    }

    fn record_drop(&mut self, err: DataError) {
        self.dropped_edges += 1;
        metrics::inc_edges_dropped();
        debug!(error = %err, "Dropping quote");
        if self.drop_samples.len() < MAX_DROP_SAMPLES {
            self.drop_samples.push(err);
        }
    }
}

/// Token multigraph with adjacency lists over an edge arena.
#[derive(Debug, Clone, Default)]
pub struct MarketGraph {
    tokens: Vec<Token>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
    adjacency: Vec<Vec<usize>>,
    pairs: Vec<PairQuotes>,
    pair_index: HashMap<(usize, usize), usize>,
}

impl MarketGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a snapshot, dropping invalid quotes.
    #[instrument(skip_all, fields(pairs = snapshot.pair_count()))]
    pub fn build(snapshot: &PriceSnapshot, config: &GraphConfig) -> (Self, BuildReport) {
        let mut graph = Self::new();
        let mut report = BuildReport::default();

        for point in snapshot.price_points(OffsetDateTime::now_utc()) {
            report.total_quotes += 1;
            let added = point.and_then(|point| graph.add_point(&point, config));
            if let Err(err) = added {
                report.record_drop(err);
            }
        }

        report.vertex_count = graph.vertex_count();
        report.edge_count = graph.edge_count();

        debug!(
            vertices = report.vertex_count,
            edges = report.edge_count,
            dropped = report.dropped_edges,
            "Market graph built"
        );

        (graph, report)
    }

    /// Validate a price point and add its forward and inverse edges.
    pub fn add_point(&mut self, point: &PricePoint, config: &GraphConfig) -> Result<(), DataError> {
        let PricePoint {
            pair,
            base,
            quote,
            venue,
            ..
        } = point;
        let rate = point.rate;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(DataError::InvalidRate {
                pair: pair.to_string(),
                venue: venue.to_string(),
                rate,
            });
        }
        if rate > config.max_sane_rate {
            return Err(DataError::RateAboveCeiling {
                pair: pair.to_string(),
                venue: venue.to_string(),
                rate,
                ceiling: config.max_sane_rate,
            });
        }
        let inverse_rate = 1.0 / rate;
        if !inverse_rate.is_finite() || inverse_rate <= 0.0 {
            return Err(DataError::InvalidRate {
                pair: pair.to_string(),
                venue: venue.to_string(),
                rate,
            });
        }

        let liquidity_usd = point
            .liquidity_usd
            .filter(|l| l.is_finite() && *l >= 0.0)
            .unwrap_or(config.default_liquidity_usd);
        let volume_usd = point.volume_usd.filter(|v| v.is_finite() && *v >= 0.0).unwrap_or(0.0);

        let from = self.intern(base);
        let to = self.intern(quote);

        let forward = self.push_edge(Edge {
            from,
            to,
            venue: venue.to_string(),
            rate,
            liquidity_usd,
            volume_usd,
            inverse: false,
        });
        let inverse = self.push_edge(Edge {
            from: to,
            to: from,
            venue: venue.to_string(),
            rate: inverse_rate,
            liquidity_usd,
            volume_usd,
            inverse: true,
        });

        // A reverse-keyed quote joins the existing pair through its inverse edge.
        let (slot, aligned) = if let Some(&slot) = self.pair_index.get(&(from, to)) {
            (slot, forward)
        } else if let Some(&slot) = self.pair_index.get(&(to, from)) {
            (slot, inverse)
        } else {
            self.pairs.push(PairQuotes {
                pair: pair.to_string(),
                base: from,
                quote: to,
                edges: Vec::new(),
            });
            self.pair_index.insert((from, to), self.pairs.len() - 1);
            (self.pairs.len() - 1, forward)
        };

        let listed = self.pairs[slot]
            .edges
            .iter()
            .any(|&e| self.edges[e].venue == *venue);
        if !listed {
            self.pairs[slot].edges.push(aligned);
        }

        Ok(())
    }

    fn intern(&mut self, symbol: &str) -> usize {
        if let Some(&idx) = self.index.get(symbol) {
            return idx;
        }
        let idx = self.tokens.len();
        self.tokens.push(Token::from_symbol(symbol));
        self.index.insert(symbol.to_string(), idx);
        self.adjacency.push(Vec::new());
        idx
    }

    fn push_edge(&mut self, edge: Edge) -> usize {
        let idx = self.edges.len();
        self.adjacency[edge.from].push(idx);
        self.edges.push(edge);
        idx
    }

    /// Number of distinct tokens.
    pub fn vertex_count(&self) -> usize {
        self.tokens.len()
    }

    /// Number of directed edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Token at a vertex index.
    pub fn token(&self, vertex: usize) -> &Token {
        &self.tokens[vertex]
    }

    /// Symbol at a vertex index.
    pub fn symbol(&self, vertex: usize) -> &str {
        &self.tokens[vertex].symbol
    }

    /// Vertex index for a symbol.
    pub fn vertex(&self, symbol: &str) -> Option<usize> {
        self.index.get(&symbol.trim().to_uppercase()).copied()
    }

    /// Edge by index.
    pub fn edge(&self, idx: usize) -> &Edge {
        &self.edges[idx]
    }

    /// All edges.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Venue quotes grouped by unordered token pair.
    pub fn pairs(&self) -> &[PairQuotes] {
        &self.pairs
    }

    /// Indices of edges leaving a vertex.
    pub fn outgoing(&self, vertex: usize) -> &[usize] {
        &self.adjacency[vertex]
    }

    /// Highest-rate edge between two vertices across all venues.
    pub fn best_edge(&self, from: usize, to: usize) -> Option<usize> {
        self.adjacency[from]
            .iter()
            .copied()
            .filter(|&e| self.edges[e].to == to)
            .max_by(|&a, &b| self.edges[a].rate.total_cmp(&self.edges[b].rate))
    }

    /// For each vertex, the best edge to each distinct neighbour.
    pub fn best_neighbour_edges(&self) -> Vec<Vec<usize>> {
        self.adjacency
            .iter()
            .map(|out| {
                let mut best: HashMap<usize, usize> = HashMap::new();
                for &e in out {
                    let to = self.edges[e].to;
                    match best.get(&to) {
                        Some(&cur) if self.edges[cur].rate >= self.edges[e].rate => {}
                        _ => {
                            best.insert(to, e);
                        }
                    }
                }
                let mut edges: Vec<usize> = best.into_values().collect();
                edges.sort_unstable();
                edges
            })
            .collect()
    }
}
