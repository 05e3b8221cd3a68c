//! Control-flow graph of one method body
//!
//! Nodes are stored in program-counter order in a single vector and refer to
//! each other by [`NodeIndex`]. Predecessor lists are kept for merge analysis;
//! reachability only walks forward edges from the entry node and from the
//! handlers of live exception regions.
//!
//! ## Passes
//!
//! - **Build**: decode, link successors and targets, validate every target
//! - **Reachability**: breadth-first from entry, handlers seeded to a fixpoint
//! - **Emit**: re-encode survivors with renumbered offsets and remapped regions

use firmil_types::{ClauseKind, ExceptionRegion};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::collections::VecDeque;
use tracing::debug;

use crate::error::{BytecodeResult, TranslationError};
use crate::instruction::{Instruction, decode_method};

/// Index of a node in its graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    /// Position in the node vector
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Role flags of a node; both may be set at once
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeRole {
    /// Carries explicit branch targets
    pub is_branch: bool,
    /// Targeted by some branch
    pub is_branch_target: bool,
}

impl NodeRole {
    /// Neither a branch nor a target
    pub fn is_normal(&self) -> bool {
        !self.is_branch && !self.is_branch_target
    }
}

/// One instruction with its edges
#[derive(Debug, Clone)]
pub struct Node {
    /// Decoded instruction
    pub instruction: Instruction,
    /// Fallthrough successor; `None` for unconditional branches, returns and throws
    pub successor: Option<NodeIndex>,
    /// Explicit branch targets in operand order
    pub targets: SmallVec<[NodeIndex; 2]>,
    /// Nodes with an edge into this one
    pub predecessors: SmallVec<[NodeIndex; 2]>,
    /// Branch / target flags
    pub role: NodeRole,
    falls_off_end: bool,
    reachable: bool,
}

impl Node {
    fn new(instruction: Instruction) -> Self {
        Self {
            instruction,
            successor: None,
            targets: SmallVec::new(),
            predecessors: SmallVec::new(),
            role: NodeRole::default(),
            falls_off_end: false,
            reachable: false,
        }
    }

    /// Result of the last reachability pass
    #[inline]
    pub fn is_reachable(&self) -> bool {
        self.reachable
    }

    fn edges(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.successor.into_iter().chain(self.targets.iter().copied())
    }
}

/// Rebuilt method body
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedBody {
    /// Re-encoded instruction bytes
    pub code: Vec<u8>,
    /// Regions remapped onto the rebuilt offsets, declaration order kept
    pub regions: Vec<ExceptionRegion>,
    /// Instructions kept
    pub instruction_count: usize,
    /// Instructions pruned
    pub removed: usize,
}

/// Control-flow graph of a method body
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    nodes: Vec<Node>,
    regions: Vec<ExceptionRegion>,
    live_regions: Vec<bool>,
    code_length: u32,
    by_offset: FxHashMap<u32, NodeIndex>,
}

impl ControlFlowGraph {
    /// Decode `code` and link every instruction
    pub fn build(code: &[u8], regions: &[ExceptionRegion]) -> BytecodeResult<Self> {
        let instructions = decode_method(code)?;
        let code_length = code.len() as u32;
        let by_offset: FxHashMap<u32, NodeIndex> = instructions
            .iter()
            .enumerate()
            .map(|(i, ins)| (ins.offset, NodeIndex(i as u32)))
            .collect();
        let mut nodes: Vec<Node> = instructions.into_iter().map(Node::new).collect();
        let count = nodes.len();

        for i in 0..count {
            let node = &mut nodes[i];
            let flow = node.instruction.opcode.flow();
            if flow.falls_through() {
                if i + 1 < count {
                    node.successor = Some(NodeIndex(i as u32 + 1));
                } else {
                    node.falls_off_end = true;
                }
            }
            node.role.is_branch = flow.has_targets();
            for target in node.instruction.branch_targets() {
                let offset = node.instruction.offset;
                if target < 0 || target >= i64::from(code_length) {
                    return Err(TranslationError::BranchOutOfRange {
                        offset,
                        target,
                        length: code_length,
                    });
                }
                let target = target as u32;
                let index = *by_offset
                    .get(&target)
                    .ok_or(TranslationError::MisalignedTarget { offset, target })?;
                node.targets.push(index);
            }
        }

        for i in 0..count {
            let from = NodeIndex(i as u32);
            let edges: SmallVec<[NodeIndex; 4]> = nodes[i].edges().collect();
            let targets = nodes[i].targets.clone();
            for to in edges {
                let preds = &mut nodes[to.index()].predecessors;
                if !preds.contains(&from) {
                    preds.push(from);
                }
            }
            for to in targets {
                nodes[to.index()].role.is_branch_target = true;
            }
        }

        for (index, region) in regions.iter().enumerate() {
            let mut starts: SmallVec<[u32; 3]> =
                SmallVec::from_slice(&[region.try_offset, region.handler_offset]);
            if region.kind == ClauseKind::Filter {
                starts.push(region.class_or_filter);
            }
            for offset in starts {
                if !by_offset.contains_key(&offset) {
                    return Err(TranslationError::RegionOutOfRange { index, offset });
                }
            }
            for end in [region.try_end(), region.handler_end()] {
                if end > code_length {
                    return Err(TranslationError::RegionOutOfRange { index, offset: end });
                }
            }
        }

        Ok(Self {
            nodes,
            regions: regions.to_vec(),
            live_regions: vec![false; regions.len()],
            code_length,
            by_offset,
        })
    }

    /// Mark every node reachable from the entry or from a live handler
    ///
    /// A region is live when its protected range contains a reachable node;
    /// its handler (and filter) entry is then seeded. Returns the number of
    /// reachable nodes.
    pub fn compute_reachability(&mut self) -> BytecodeResult<usize> {
        for node in &mut self.nodes {
            node.reachable = false;
        }
        self.live_regions.iter_mut().for_each(|live| *live = false);

        let mut queue = VecDeque::new();
        mark(&mut self.nodes, NodeIndex(0), &mut queue);
        loop {
            while let Some(index) = queue.pop_front() {
                let node = &self.nodes[index.index()];
                if node.falls_off_end {
                    return Err(TranslationError::FallsOffEnd {
                        offset: node.instruction.offset,
                    });
                }
                let edges: SmallVec<[NodeIndex; 4]> = node.edges().collect();
                for next in edges {
                    mark(&mut self.nodes, next, &mut queue);
                }
            }

            let mut seeded = false;
            for (r, region) in self.regions.iter().enumerate() {
                if self.live_regions[r] {
                    continue;
                }
                let protects_live_code = self
                    .nodes
                    .iter()
                    .any(|n| n.reachable && region.protects(n.instruction.offset));
                if !protects_live_code {
                    continue;
                }
                self.live_regions[r] = true;
                seeded = true;
                let mut entries: SmallVec<[u32; 2]> = SmallVec::from_slice(&[region.handler_offset]);
                if region.kind == ClauseKind::Filter {
                    entries.push(region.class_or_filter);
                }
                for offset in entries {
                    if let Some(&index) = self.by_offset.get(&offset) {
                        mark(&mut self.nodes, index, &mut queue);
                    }
                }
            }
            if !seeded {
                break;
            }
        }

        Ok(self.nodes.iter().filter(|n| n.reachable).count())
    }

    /// All nodes in program-counter order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Node by index
    pub fn node(&self, index: NodeIndex) -> Option<&Node> {
        self.nodes.get(index.index())
    }

    /// Node starting at a byte offset
    pub fn node_at(&self, offset: u32) -> Option<NodeIndex> {
        self.by_offset.get(&offset).copied()
    }

    /// Reachable nodes in program-counter order
    pub fn reachable(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.reachable)
    }

    /// Declared regions with their liveness from the last reachability pass
    pub fn regions(&self) -> impl Iterator<Item = (&ExceptionRegion, bool)> {
        self.regions.iter().zip(self.live_regions.iter().copied())
    }

    /// Length of the original body
    pub fn code_length(&self) -> u32 {
        self.code_length
    }

    /// Re-encode the reachable instructions, tokens unchanged
    pub fn prune(&self) -> BytecodeResult<EmittedBody> {
        self.emit(|_| Ok::<_, TranslationError>(None))
    }

    /// Re-encode the reachable instructions
    ///
    /// `patch` is called for every token-bearing instruction and may return a
    /// replacement token. Displacements are recomputed against the rebuilt
    /// offsets; removal only shortens distances, so short forms stay valid.
    pub fn emit<F, E>(&self, mut patch: F) -> Result<EmittedBody, E>
    where
        F: FnMut(&Instruction) -> Result<Option<u32>, E>,
        E: From<TranslationError>,
    {
        let mut new_offsets: Vec<Option<u32>> = vec![None; self.nodes.len()];
        let mut cursor = 0u32;
        for (i, node) in self.nodes.iter().enumerate() {
            if node.reachable {
                new_offsets[i] = Some(cursor);
                cursor += node.instruction.length;
            }
        }
        let new_length = cursor;
        let remap = |old: u32| -> u32 {
            let start = self.nodes.partition_point(|n| n.instruction.offset < old);
            new_offsets[start..]
                .iter()
                .find_map(|o| *o)
                .unwrap_or(new_length)
        };

        let mut code = Vec::with_capacity(new_length as usize);
        let mut kept = 0usize;
        for (i, node) in self.nodes.iter().enumerate() {
            let Some(at) = new_offsets[i] else {
                continue;
            };
            let next = i64::from(at + node.instruction.length);
            let targets: SmallVec<[i64; 2]> = node
                .targets
                .iter()
                .map(|t| i64::from(remap(self.nodes[t.index()].instruction.offset)) - next)
                .collect();
            let token = match node.instruction.token() {
                Some(_) => patch(&node.instruction)?,
                None => None,
            };
            node.instruction.encode(&mut code, &targets, token)?;
            kept += 1;
        }

        let regions = self
            .regions()
            .filter(|(_, live)| *live)
            .map(|(region, _)| {
                let try_offset = remap(region.try_offset);
                let handler_offset = remap(region.handler_offset);
                let class_or_filter = if region.kind == ClauseKind::Filter {
                    remap(region.class_or_filter)
                } else {
                    region.class_or_filter
                };
                ExceptionRegion {
                    kind: region.kind,
                    try_offset,
                    try_length: remap(region.try_end()) - try_offset,
                    handler_offset,
                    handler_length: remap(region.handler_end()) - handler_offset,
                    class_or_filter,
                }
            })
            .collect();

        let removed = self.nodes.len() - kept;
        if removed > 0 {
            debug!(removed, kept, "pruned unreachable instructions");
        }
        Ok(EmittedBody {
            code,
            regions,
            instruction_count: kept,
            removed,
        })
    }
}

fn mark(nodes: &mut [Node], index: NodeIndex, queue: &mut VecDeque<NodeIndex>) {
    let node = &mut nodes[index.index()];
    if !node.reachable {
        node.reachable = true;
        queue.push_back(index);
    }
}
