// SPDX-License-Identifier: Apache-2.0
//! The user-authored block graph and its topological walk order.
//!
//! A [`Patch`] is pure data: block instances keyed by id, each with a
//! type name and a set of input connections. The compiler frontend
//! (`crate::compiler`) walks a patch in [`topological_order`] order,
//! invoking each block's `lower` only after every block it reads from has
//! already been lowered.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::diagnostics::{DiagnosticSink, Severity, TargetRef};

/// Where one input port's value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// Wired to another block's output port.
    Connected {
        /// The upstream block's id.
        block_id: String,
        /// The upstream output port's id.
        port_id: String,
    },
    /// Nothing connected; the block's own default applies.
    Disconnected,
}

/// One block instance in a patch.
#[derive(Debug, Clone)]
pub struct PatchBlockInstance {
    /// The registered block type this instance is built from.
    pub type_name: String,
    /// This instance's input wiring, keyed by input port id.
    pub inputs: BTreeMap<String, InputSource>,
}

/// A complete user-authored block graph.
#[derive(Debug, Clone, Default)]
pub struct Patch {
    /// Block instances, keyed by patch-assigned block id.
    pub blocks: BTreeMap<String, PatchBlockInstance>,
    /// Element count of each instance domain referenced by this patch's
    /// fields, keyed by instance id. A domain absent here has zero lanes.
    pub instance_domains: BTreeMap<String, u32>,
}

impl Patch {
    /// An empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn upstream_of(&self, block_id: &str) -> BTreeSet<&str> {
        self.blocks
            .get(block_id)
            .into_iter()
            .flat_map(|b| b.inputs.values())
            .filter_map(|src| match src {
                InputSource::Connected { block_id, .. } => Some(block_id.as_str()),
                InputSource::Disconnected => None,
            })
            .collect()
    }
}

/// Computes a lowering order for `patch`'s blocks: every block appears after
/// every block it reads from.
///
/// Ties (multiple blocks simultaneously ready) break on lexical block id, so
/// the same patch always produces the same order — this is what lets the
/// scheduler's later tie-breaks (§4.5) compose with a deterministic walk.
///
/// # Errors
/// Returns a `GraphSpan` diagnostic naming every block on an unbroken
/// dependency cycle if the patch's connections are not acyclic.
pub fn topological_order(patch: &Patch, diagnostics: &mut DiagnosticSink) -> Result<Vec<String>, ()> {
    let mut in_degree: BTreeMap<&str, usize> = patch
        .blocks
        .keys()
        .map(|id| (id.as_str(), 0))
        .collect();
    let mut downstream: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for block_id in patch.blocks.keys() {
        for upstream in patch.upstream_of(block_id) {
            if patch.blocks.contains_key(upstream) {
                *in_degree.get_mut(block_id.as_str()).expect("key present") += 1;
                downstream.entry(upstream).or_default().push(block_id.as_str());
            }
        }
    }

    let mut ready: VecDeque<&str> = in_degree
        .iter()
        .filter(|&(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();
    ready.make_contiguous().sort_unstable();

    let mut order = Vec::with_capacity(patch.blocks.len());
    let mut remaining = in_degree.clone();

    while let Some(id) = pop_lexically_smallest(&mut ready) {
        order.push(id.to_string());
        if let Some(targets) = downstream.get(id) {
            let mut newly_ready = Vec::new();
            for &target in targets {
                let deg = remaining.get_mut(target).expect("key present");
                *deg -= 1;
                if *deg == 0 {
                    newly_ready.push(target);
                }
            }
            newly_ready.sort_unstable();
            for target in newly_ready {
                ready.push_back(target);
            }
        }
    }

    if order.len() == patch.blocks.len() {
        Ok(order)
    } else {
        let cyclic: Vec<String> = remaining
            .into_iter()
            .filter(|&(_, deg)| deg > 0)
            .map(|(id, _)| id.to_string())
            .collect();
        diagnostics.push(
            "DependencyCycle",
            Severity::Fatal,
            "patch contains a dependency cycle",
            format!("the following blocks form an unbroken cycle: {cyclic:?}"),
            TargetRef::GraphSpan {
                block_ids: cyclic,
            },
        );
        Err(())
    }
}

fn pop_lexically_smallest<'a>(ready: &mut VecDeque<&'a str>) -> Option<&'a str> {
    if ready.is_empty() {
        return None;
    }
    let (idx, _) = ready
        .iter()
        .enumerate()
        .min_by_key(|&(_, &id)| id)
        .expect("non-empty");
    ready.remove(idx)
}
