// grammar.rs — Track/Index model of an analysed ADP grammar
//
// The synthesizer's view of a grammar: its tracks (input axes with their
// running row/column indices), its nonterminals with the table indices
// each one needs per track, and the evaluation order. Grammars are built
// programmatically or loaded from a JSON manifest written by the front end.
//
// Preconditions: none.
// Postconditions: `validate` reports every inconsistency that would make
//                 loop construction or call injection read undefined data.
// Failure modes: manifest I/O or JSON errors (`ManifestError`); metadata
//                inconsistencies become diagnostics.
// Side effects: `load_manifest` reads one file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::checkpoint::LOADED_SUFFIX;
use crate::diag::{codes, Diagnostic};
use crate::id::{track_ids, TrackId};
use crate::synth::OPENMP_SYMBOL;
use crate::tiling::generated_identifiers;

// ── Model ───────────────────────────────────────────────────────────────────

/// One input sequence axis and its running indices.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Track {
    /// Sequence variable, e.g. `t_0_seq`.
    pub seq: String,
    /// Left running index (row), e.g. `t_0_i`.
    pub left: String,
    /// Right running index (column), e.g. `t_0_j`.
    pub right: String,
}

impl Track {
    /// Conventional names for track `k`: `t_k_seq`, `t_k_i`, `t_k_j`.
    pub fn standard(k: usize) -> Self {
        Track {
            seq: format!("t_{k}_seq"),
            left: format!("t_{k}_i"),
            right: format!("t_{k}_j"),
        }
    }
}

/// A table index a nonterminal requires on one side of one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSlot {
    pub var: String,
    /// Structurally fixed (always 0 or the sequence length) and elided from
    /// the table; never matched against loop scope.
    pub deleted: bool,
}

impl IndexSlot {
    pub fn live(var: impl Into<String>) -> Self {
        IndexSlot {
            var: var.into(),
            deleted: false,
        }
    }

    pub fn deleted(var: impl Into<String>) -> Self {
        IndexSlot {
            var: var.into(),
            deleted: true,
        }
    }
}

/// The indices a nonterminal's table uses on one track.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDim {
    pub left: Option<IndexSlot>,
    pub right: Option<IndexSlot>,
}

/// Index shape of a tabulated nonterminal on one track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dims {
    Both,
    RowOnly,
    ColumnOnly,
    Constant,
}

impl TableDim {
    pub fn new(left: Option<IndexSlot>, right: Option<IndexSlot>) -> Self {
        TableDim { left, right }
    }

    pub fn shaped(track: &Track, dims: Dims) -> Self {
        let left = Some(IndexSlot::live(&track.left));
        let right = Some(IndexSlot::live(&track.right));
        match dims {
            Dims::Both => TableDim::new(left, right),
            Dims::RowOnly => TableDim::new(left, None),
            Dims::ColumnOnly => TableDim::new(None, right),
            Dims::Constant => TableDim::default(),
        }
    }

    /// Required slots that take part in scope matching, left before right.
    pub fn live_slots(&self) -> impl Iterator<Item = (Side, &IndexSlot)> {
        [(Side::Left, &self.left), (Side::Right, &self.right)]
            .into_iter()
            .filter_map(|(side, slot)| slot.as_ref().map(|s| (side, s)))
            .filter(|(_, s)| !s.deleted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nonterminal {
    pub name: String,
    pub tabulated: bool,
    callee: Option<String>,
    /// One entry per track.
    pub tables: Vec<TableDim>,
}

impl Nonterminal {
    pub fn tabulated(name: impl Into<String>, tables: Vec<TableDim>) -> Self {
        Nonterminal {
            name: name.into(),
            tabulated: true,
            callee: None,
            tables,
        }
    }

    pub fn untabulated(name: impl Into<String>) -> Self {
        Nonterminal {
            name: name.into(),
            tabulated: false,
            callee: None,
            tables: Vec::new(),
        }
    }

    pub fn with_callee(mut self, callee: impl Into<String>) -> Self {
        self.callee = Some(callee.into());
        self
    }

    /// Name of the tabulating evaluation function, `nt_tabulate_<name>`
    /// unless the front end supplied one.
    pub fn callee(&self) -> String {
        self.callee
            .clone()
            .unwrap_or_else(|| format!("nt_tabulate_{}", self.name))
    }

    /// Number of required, non-elided indices across all tracks.
    pub fn live_index_count(&self) -> usize {
        self.tables.iter().map(|t| t.live_slots().count()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grammar {
    pub name: String,
    pub tracks: Vec<Track>,
    pub nonterminals: Vec<Nonterminal>,
    /// Evaluation (topological) order by name; empty means declaration order.
    pub order: Vec<String>,
}

impl Grammar {
    /// A grammar with `tracks` conventionally named tracks and no nonterminals.
    pub fn new(name: impl Into<String>, tracks: usize) -> Self {
        Grammar {
            name: name.into(),
            tracks: (0..tracks).map(Track::standard).collect(),
            nonterminals: Vec::new(),
            order: Vec::new(),
        }
    }

    pub fn with_nonterminal(mut self, nt: Nonterminal) -> Self {
        self.nonterminals.push(nt);
        self
    }

    /// Add a tabulated nonterminal with one index shape per track.
    pub fn with_tabulated(self, name: &str, dims: &[Dims]) -> Self {
        let tables = self
            .tracks
            .iter()
            .zip(dims)
            .map(|(track, d)| TableDim::shaped(track, *d))
            .collect();
        self.with_nonterminal(Nonterminal::tabulated(name, tables))
    }

    pub fn with_order(mut self, order: &[&str]) -> Self {
        self.order = order.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn track(&self, id: TrackId) -> &Track {
        &self.tracks[id.index()]
    }

    pub fn track_ids(&self) -> impl DoubleEndedIterator<Item = TrackId> {
        track_ids(self.tracks.len())
    }

    /// True for names of row/column loop variables; tile counters are not.
    pub fn is_running_index(&self, name: &str) -> bool {
        self.tracks.iter().any(|t| t.left == name || t.right == name)
    }

    /// Nonterminals in evaluation order. Names the order does not know are
    /// skipped; `validate` reports them.
    pub fn evaluation_order(&self) -> Vec<&Nonterminal> {
        if self.order.is_empty() {
            return self.nonterminals.iter().collect();
        }
        self.order
            .iter()
            .filter_map(|name| self.nonterminals.iter().find(|nt| &nt.name == name))
            .collect()
    }

    pub fn tabulated_in_order(&self) -> Vec<&Nonterminal> {
        self.evaluation_order()
            .into_iter()
            .filter(|nt| nt.tabulated)
            .collect()
    }
}

// ── Validation ──────────────────────────────────────────────────────────────

/// Check the Track/Index metadata before any loop is built.
pub fn validate(grammar: &Grammar) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    let subject = format!("grammar '{}'", grammar.name);

    if grammar.tracks.is_empty() {
        diags.push(
            Diagnostic::error(codes::E0100, "grammar declares no tracks").with_subject(&subject),
        );
        return diags;
    }

    let mut seen_indices = HashSet::new();
    for (k, track) in grammar.tracks.iter().enumerate() {
        for name in [&track.left, &track.right] {
            if !seen_indices.insert(name.as_str()) {
                diags.push(
                    Diagnostic::error(
                        codes::E0103,
                        format!("running index '{}' is used by more than one track side", name),
                    )
                    .with_subject(format!("track {}", k)),
                );
            }
            if is_generated_identifier(name) {
                diags.push(
                    Diagnostic::error(
                        codes::E0109,
                        format!(
                            "running index '{}' collides with an identifier of the generated code",
                            name
                        ),
                    )
                    .with_subject(format!("track {}", k))
                    .with_hint("rename the running index"),
                );
            }
        }
    }

    let mut seen_nts = HashSet::new();
    for nt in &grammar.nonterminals {
        if !seen_nts.insert(nt.name.as_str()) {
            diags.push(
                Diagnostic::error(codes::E0104, "nonterminal is declared twice")
                    .with_subject(nt_subject(nt)),
            );
        }
        if nt.tabulated {
            validate_tables(grammar, nt, &mut diags);
        }
    }

    if !grammar.order.is_empty() {
        validate_order(grammar, &mut diags);
    }

    if !grammar.nonterminals.iter().any(|nt| nt.tabulated) {
        diags.push(
            Diagnostic::warning(
                codes::W0100,
                "no tabulated nonterminals; the traversal will be empty",
            )
            .with_subject(&subject),
        );
    }
    diags
}

/// True for names the generated code declares itself: tile variables,
/// tile-progress counters, build-time symbols and any `<var>_loaded` flag.
pub fn is_generated_identifier(name: &str) -> bool {
    name.ends_with(LOADED_SUFFIX)
        || name == OPENMP_SYMBOL
        || generated_identifiers().iter().any(|g| g == name)
}

fn nt_subject(nt: &Nonterminal) -> String {
    format!("nonterminal '{}'", nt.name)
}

fn validate_tables(grammar: &Grammar, nt: &Nonterminal, diags: &mut Vec<Diagnostic>) {
    if nt.tables.len() != grammar.track_count() {
        diags.push(
            Diagnostic::error(
                codes::E0101,
                format!(
                    "declares table indices for {} track(s) but the grammar has {}",
                    nt.tables.len(),
                    grammar.track_count()
                ),
            )
            .with_subject(nt_subject(nt)),
        );
        return;
    }
    for (track, table) in grammar.tracks.iter().zip(&nt.tables) {
        for (side, slot) in table.live_slots() {
            let expected = match side {
                Side::Left => &track.left,
                Side::Right => &track.right,
            };
            if &slot.var != expected {
                diags.push(
                    Diagnostic::error(
                        codes::E0102,
                        format!(
                            "{} index '{}' is not the running index of its track",
                            match side {
                                Side::Left => "left",
                                Side::Right => "right",
                            },
                            slot.var
                        ),
                    )
                    .with_subject(nt_subject(nt))
                    .with_hint(format!("expected '{}'", expected)),
                );
            }
        }
    }
}

fn validate_order(grammar: &Grammar, diags: &mut Vec<Diagnostic>) {
    let mut listed = HashSet::new();
    for name in &grammar.order {
        if !grammar.nonterminals.iter().any(|nt| &nt.name == name) {
            diags.push(
                Diagnostic::error(codes::E0105, "evaluation order names an unknown nonterminal")
                    .with_subject(format!("nonterminal '{}'", name)),
            );
        }
        if !listed.insert(name.as_str()) {
            diags.push(
                Diagnostic::error(codes::E0106, "evaluation order lists nonterminal twice")
                    .with_subject(format!("nonterminal '{}'", name)),
            );
        }
    }
    for nt in grammar.nonterminals.iter().filter(|nt| nt.tabulated) {
        if !listed.contains(nt.name.as_str()) {
            diags.push(
                Diagnostic::error(
                    codes::E0108,
                    "tabulated nonterminal is missing from the evaluation order",
                )
                .with_subject(nt_subject(nt)),
            );
        }
    }
}

// ── Manifest ────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: invalid grammar manifest: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GrammarManifest {
    name: String,
    tracks: TrackList,
    #[serde(default)]
    nonterminals: Vec<NonterminalManifest>,
    #[serde(default)]
    order: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TrackList {
    Count(usize),
    Explicit(Vec<Track>),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NonterminalManifest {
    name: String,
    #[serde(default = "default_tabulated")]
    tabulated: bool,
    #[serde(default)]
    callee: Option<String>,
    #[serde(default)]
    tables: Vec<TableManifest>,
}

fn default_tabulated() -> bool {
    true
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TableManifest {
    #[serde(default)]
    left: Option<SlotManifest>,
    #[serde(default)]
    right: Option<SlotManifest>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SlotManifest {
    Name(String),
    Full {
        var: String,
        #[serde(default)]
        deleted: bool,
    },
}

impl From<SlotManifest> for IndexSlot {
    fn from(m: SlotManifest) -> Self {
        match m {
            SlotManifest::Name(var) => IndexSlot::live(var),
            SlotManifest::Full { var, deleted } => IndexSlot { var, deleted },
        }
    }
}

impl From<GrammarManifest> for Grammar {
    fn from(m: GrammarManifest) -> Self {
        let tracks = match m.tracks {
            TrackList::Count(n) => (0..n).map(Track::standard).collect(),
            TrackList::Explicit(tracks) => tracks,
        };
        let nonterminals = m
            .nonterminals
            .into_iter()
            .map(|nt| Nonterminal {
                name: nt.name,
                tabulated: nt.tabulated,
                callee: nt.callee,
                tables: nt
                    .tables
                    .into_iter()
                    .map(|t| TableDim::new(t.left.map(Into::into), t.right.map(Into::into)))
                    .collect(),
            })
            .collect();
        Grammar {
            name: m.name,
            tracks,
            nonterminals,
            order: m.order,
        }
    }
}

/// Parse a grammar manifest from JSON text.
pub fn parse_manifest(text: &str) -> Result<Grammar, serde_json::Error> {
    let manifest: GrammarManifest = serde_json::from_str(text)?;
    Ok(manifest.into())
}

/// Read and parse a manifest file. Returns the grammar and the raw text
/// (the text feeds build provenance).
pub fn load_manifest(path: &Path) -> Result<(Grammar, String), ManifestError> {
    let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let grammar = parse_manifest(&text).map_err(|source| ManifestError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    Ok((grammar, text))
}
